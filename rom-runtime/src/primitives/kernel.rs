use rom_core::{CallType, RuntimeError, RuntimeResult, Visibility};

use crate::expect_args;
use crate::primitives::{expect_module, expect_symbols, split_receiver, symbols_array, PrimitiveFn};
use crate::runtime::Runtime;
use crate::value::Value;

pub static INSTANCE_PRIMITIVES: &[(&str, PrimitiveFn, Visibility)] = &[
    ("initialize", self::initialize, Visibility::Private),
    ("initialize_copy", self::initialize_copy, Visibility::Private),
    ("method_missing", self::method_missing, Visibility::Private),
    ("object_id", self::object_id, Visibility::Public),
    ("__id__", self::object_id, Visibility::Public),
    ("class", self::class, Visibility::Public),
    ("freeze", self::freeze, Visibility::Public),
    ("frozen?", self::is_frozen, Visibility::Public),
    ("taint", self::taint, Visibility::Public),
    ("tainted?", self::is_tainted, Visibility::Public),
    ("dup", self::dup, Visibility::Public),
    ("clone", self::clone, Visibility::Public),
    ("instance_variable_get", self::instance_variable_get, Visibility::Public),
    ("instance_variable_set", self::instance_variable_set, Visibility::Public),
    ("instance_variables", self::instance_variables, Visibility::Public),
    ("respond_to?", self::respond_to, Visibility::Public),
    ("singleton_methods", self::singleton_methods, Visibility::Public),
    ("extend", self::extend, Visibility::Public),
    ("is_a?", self::is_a, Visibility::Public),
    ("kind_of?", self::is_a, Visibility::Public),
    ("equal?", self::eq, Visibility::Public),
    ("==", self::eq, Visibility::Public),
    ("inspect", self::inspect, Visibility::Public),
    ("send", self::send, Visibility::Public),
    ("__send__", self::send, Visibility::Public),
];

fn initialize(_: &Runtime, _: Vec<Value>) -> RuntimeResult<Value> {
    Ok(Value::Nil)
}

fn initialize_copy(runtime: &Runtime, args: Vec<Value>) -> RuntimeResult<Value> {
    const SIGNATURE: &str = "Kernel#initialize_copy";

    expect_args!(SIGNATURE, args, [
        object => object,
        original => original,
    ]);

    if runtime.real_class_of(&object) != runtime.real_class_of(&original) {
        return Err(RuntimeError::Type(
            "initialize_copy should take same class object".to_string(),
        ));
    }
    Ok(object)
}

fn method_missing(runtime: &Runtime, args: Vec<Value>) -> RuntimeResult<Value> {
    const SIGNATURE: &str = "Kernel#method_missing";

    let (receiver, rest) = split_receiver(SIGNATURE, args)?;
    let name = rest
        .first()
        .and_then(Value::as_symbol)
        .ok_or_else(|| RuntimeError::Argument("no id given".to_string()))?;
    Err(runtime.undefined_method(&receiver, name, "undefined"))
}

fn object_id(runtime: &Runtime, args: Vec<Value>) -> RuntimeResult<Value> {
    const SIGNATURE: &str = "Kernel#object_id";

    expect_args!(SIGNATURE, args, [
        object => object,
    ]);

    Ok(Value::Integer(runtime.id_of(&object)))
}

fn class(runtime: &Runtime, args: Vec<Value>) -> RuntimeResult<Value> {
    const SIGNATURE: &str = "Kernel#class";

    expect_args!(SIGNATURE, args, [
        object => object,
    ]);

    Ok(Value::Module(runtime.real_class_of(&object)))
}

fn freeze(runtime: &Runtime, args: Vec<Value>) -> RuntimeResult<Value> {
    const SIGNATURE: &str = "Kernel#freeze";

    expect_args!(SIGNATURE, args, [
        object => object,
    ]);

    runtime.freeze(&object)?;
    Ok(object)
}

fn is_frozen(runtime: &Runtime, args: Vec<Value>) -> RuntimeResult<Value> {
    const SIGNATURE: &str = "Kernel#frozen?";

    expect_args!(SIGNATURE, args, [
        object => object,
    ]);

    Ok(Value::Boolean(runtime.is_frozen(&object)))
}

fn taint(runtime: &Runtime, args: Vec<Value>) -> RuntimeResult<Value> {
    const SIGNATURE: &str = "Kernel#taint";

    expect_args!(SIGNATURE, args, [
        object => object,
    ]);

    runtime.taint(&object)?;
    Ok(object)
}

fn is_tainted(runtime: &Runtime, args: Vec<Value>) -> RuntimeResult<Value> {
    const SIGNATURE: &str = "Kernel#tainted?";

    expect_args!(SIGNATURE, args, [
        object => object,
    ]);

    Ok(Value::Boolean(runtime.is_tainted(&object)))
}

fn dup(runtime: &Runtime, args: Vec<Value>) -> RuntimeResult<Value> {
    const SIGNATURE: &str = "Kernel#dup";

    expect_args!(SIGNATURE, args, [
        object => object,
    ]);

    runtime.dup(&object)
}

fn clone(runtime: &Runtime, args: Vec<Value>) -> RuntimeResult<Value> {
    const SIGNATURE: &str = "Kernel#clone";

    expect_args!(SIGNATURE, args, [
        object => object,
    ]);

    runtime.clone_value(&object)
}

fn instance_variable_get(runtime: &Runtime, args: Vec<Value>) -> RuntimeResult<Value> {
    const SIGNATURE: &str = "Kernel#instance_variable_get";

    expect_args!(SIGNATURE, args, [
        object => object,
        Value::Symbol(name) => name,
    ]);

    let name = runtime.symbol_name(name);
    let Some(obj) = runtime.heap_object(&object) else {
        return Ok(Value::Nil);
    };
    Ok(runtime
        .instance_variable_get(&obj, &name)?
        .unwrap_or(Value::Nil))
}

fn instance_variable_set(runtime: &Runtime, args: Vec<Value>) -> RuntimeResult<Value> {
    const SIGNATURE: &str = "Kernel#instance_variable_set";

    expect_args!(SIGNATURE, args, [
        object => object,
        Value::Symbol(name) => name,
        value => value,
    ]);

    let name = runtime.symbol_name(name);
    let obj = runtime.heap_object(&object).ok_or_else(|| {
        RuntimeError::frozen(runtime.module_name(runtime.class_of(&object)))
    })?;
    runtime.instance_variable_set(&obj, &name, value.clone())?;
    Ok(value)
}

fn instance_variables(runtime: &Runtime, args: Vec<Value>) -> RuntimeResult<Value> {
    const SIGNATURE: &str = "Kernel#instance_variables";

    expect_args!(SIGNATURE, args, [
        object => object,
    ]);

    let names = runtime
        .heap_object(&object)
        .map(|obj| runtime.instance_variable_names(&obj))
        .unwrap_or_default();
    Ok(symbols_array(runtime, names))
}

fn respond_to(runtime: &Runtime, args: Vec<Value>) -> RuntimeResult<Value> {
    const SIGNATURE: &str = "Kernel#respond_to?";

    let (receiver, rest) = split_receiver(SIGNATURE, args)?;
    let (name, include_private) = match rest.as_slice() {
        [Value::Symbol(name)] => (*name, false),
        [Value::Symbol(name), flag] => (*name, flag.is_truthy()),
        _ => {
            return Err(RuntimeError::Argument(format!(
                "'{SIGNATURE}': expected a symbol and an optional flag"
            )))
        }
    };

    let class = runtime.class_of(&receiver);
    let name = runtime.symbol_name(name);
    Ok(Value::Boolean(runtime.is_method_bound(
        class,
        &name,
        !include_private,
    )))
}

fn singleton_methods(runtime: &Runtime, args: Vec<Value>) -> RuntimeResult<Value> {
    const SIGNATURE: &str = "Kernel#singleton_methods";

    expect_args!(SIGNATURE, args, [
        object => object,
    ]);

    Ok(symbols_array(runtime, runtime.singleton_methods(&object)))
}

fn extend(runtime: &Runtime, args: Vec<Value>) -> RuntimeResult<Value> {
    const SIGNATURE: &str = "Kernel#extend";

    let (receiver, modules) = split_receiver(SIGNATURE, args)?;
    if modules.is_empty() {
        return Err(RuntimeError::Argument(
            "wrong number of arguments (0 for 1)".to_string(),
        ));
    }
    for module in modules.iter().rev() {
        let module = expect_module(SIGNATURE, module)?;
        runtime.extend_object(&receiver, module)?;
    }
    Ok(receiver)
}

fn is_a(runtime: &Runtime, args: Vec<Value>) -> RuntimeResult<Value> {
    const SIGNATURE: &str = "Kernel#is_a?";

    expect_args!(SIGNATURE, args, [
        object => object,
        Value::Module(module) => module,
    ]);

    Ok(Value::Boolean(runtime.is_kind_of(&object, module)))
}

fn eq(_: &Runtime, args: Vec<Value>) -> RuntimeResult<Value> {
    const SIGNATURE: &str = "Kernel#==";

    expect_args!(SIGNATURE, args, [
        a => a,
        b => b,
    ]);

    Ok(Value::Boolean(a == b))
}

fn inspect(runtime: &Runtime, args: Vec<Value>) -> RuntimeResult<Value> {
    const SIGNATURE: &str = "Kernel#inspect";

    expect_args!(SIGNATURE, args, [
        object => object,
    ]);

    Ok(Value::from(runtime.inspect(&object)))
}

fn send(runtime: &Runtime, args: Vec<Value>) -> RuntimeResult<Value> {
    const SIGNATURE: &str = "Kernel#send";

    let (receiver, rest) = split_receiver(SIGNATURE, args)?;
    let Some((name, rest)) = rest.split_first() else {
        return Err(RuntimeError::Argument("no method name given".to_string()));
    };
    let name = expect_symbols(SIGNATURE, std::slice::from_ref(name))?[0];
    runtime.call_method_interned(&receiver, name, rest.to_vec(), CallType::Functional, None)
}
