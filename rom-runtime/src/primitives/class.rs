use rom_core::{RuntimeResult, Visibility};

use crate::primitives::{expect_module, split_receiver, PrimitiveFn};
use crate::runtime::Runtime;
use crate::value::Value;
use crate::expect_args;

pub static INSTANCE_PRIMITIVES: &[(&str, PrimitiveFn, Visibility)] = &[
    ("new", self::new, Visibility::Public),
    ("allocate", self::allocate, Visibility::Public),
    ("superclass", self::superclass, Visibility::Public),
];

fn new(runtime: &Runtime, args: Vec<Value>) -> RuntimeResult<Value> {
    const SIGNATURE: &str = "Class#new";

    let (receiver, rest) = split_receiver(SIGNATURE, args)?;
    let class = expect_module(SIGNATURE, &receiver)?;
    runtime.new_instance(class, rest).map(Value::Object)
}

fn allocate(runtime: &Runtime, args: Vec<Value>) -> RuntimeResult<Value> {
    const SIGNATURE: &str = "Class#allocate";

    expect_args!(SIGNATURE, args, [
        Value::Module(class) => class,
    ]);

    runtime.allocate(class).map(Value::Object)
}

fn superclass(runtime: &Runtime, args: Vec<Value>) -> RuntimeResult<Value> {
    const SIGNATURE: &str = "Class#superclass";

    expect_args!(SIGNATURE, args, [
        Value::Module(class) => class,
    ]);

    Ok(runtime
        .real_superclass(class)
        .map_or(Value::Nil, Value::Module))
}
