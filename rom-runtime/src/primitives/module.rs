use rom_core::{RuntimeError, RuntimeResult, Visibility};

use crate::expect_args;
use crate::primitives::{expect_module, expect_symbols, modules_array, split_receiver, symbols_array, PrimitiveFn};
use crate::runtime::Runtime;
use crate::value::Value;

pub static INSTANCE_PRIMITIVES: &[(&str, PrimitiveFn, Visibility)] = &[
    ("name", self::name, Visibility::Public),
    ("to_s", self::name, Visibility::Public),
    ("ancestors", self::ancestors, Visibility::Public),
    ("include", self::include, Visibility::Private),
    ("included_modules", self::included_modules, Visibility::Public),
    ("include?", self::does_include, Visibility::Public),
    ("instance_methods", self::instance_methods, Visibility::Public),
    ("public_instance_methods", self::instance_methods, Visibility::Public),
    ("private_instance_methods", self::private_instance_methods, Visibility::Public),
    ("method_defined?", self::is_method_defined, Visibility::Public),
    ("remove_method", self::remove_method, Visibility::Private),
    ("undef_method", self::undef_method, Visibility::Private),
    ("alias_method", self::alias_method, Visibility::Private),
    ("const_get", self::const_get, Visibility::Public),
    ("const_set", self::const_set, Visibility::Public),
    ("const_defined?", self::is_const_defined, Visibility::Public),
    ("constants", self::constants, Visibility::Public),
    ("class_variable_get", self::class_variable_get, Visibility::Public),
    ("class_variable_set", self::class_variable_set, Visibility::Public),
    ("class_variables", self::class_variables, Visibility::Public),
    ("attr_reader", self::attr_reader, Visibility::Private),
    ("attr_writer", self::attr_writer, Visibility::Private),
    ("attr_accessor", self::attr_accessor, Visibility::Private),
    ("public", self::public, Visibility::Private),
    ("private", self::private, Visibility::Private),
    ("protected", self::protected, Visibility::Private),
    ("module_function", self::module_function, Visibility::Private),
];

fn name(runtime: &Runtime, args: Vec<Value>) -> RuntimeResult<Value> {
    const SIGNATURE: &str = "Module#name";

    expect_args!(SIGNATURE, args, [
        Value::Module(module) => module,
    ]);

    Ok(runtime
        .module(module)
        .name()
        .map_or(Value::Nil, Value::from))
}

fn ancestors(runtime: &Runtime, args: Vec<Value>) -> RuntimeResult<Value> {
    const SIGNATURE: &str = "Module#ancestors";

    expect_args!(SIGNATURE, args, [
        Value::Module(module) => module,
    ]);

    Ok(modules_array(runtime.ancestors(module)))
}

fn include(runtime: &Runtime, args: Vec<Value>) -> RuntimeResult<Value> {
    const SIGNATURE: &str = "Module#include";

    let (receiver, modules) = split_receiver(SIGNATURE, args)?;
    let target = expect_module(SIGNATURE, &receiver)?;
    if modules.is_empty() {
        return Err(RuntimeError::Argument(
            "wrong number of arguments (0 for 1)".to_string(),
        ));
    }
    // The first argument ends up nearest to the receiver.
    for module in modules.iter().rev() {
        let module = expect_module(SIGNATURE, module)?;
        runtime.include_module(target, module)?;
    }
    Ok(receiver)
}

fn included_modules(runtime: &Runtime, args: Vec<Value>) -> RuntimeResult<Value> {
    const SIGNATURE: &str = "Module#included_modules";

    expect_args!(SIGNATURE, args, [
        Value::Module(module) => module,
    ]);

    Ok(modules_array(runtime.included_modules(module)))
}

fn does_include(runtime: &Runtime, args: Vec<Value>) -> RuntimeResult<Value> {
    const SIGNATURE: &str = "Module#include?";

    expect_args!(SIGNATURE, args, [
        Value::Module(module) => module,
        Value::Module(other) => other,
    ]);

    if !runtime.module(other).is_module() {
        return Err(RuntimeError::Type(format!(
            "wrong argument type {} (expected Module)",
            runtime.module_name(runtime.real_class_of(&Value::Module(other)))
        )));
    }
    Ok(Value::Boolean(runtime.includes_module(module, other)))
}

fn listing(
    signature: &str,
    runtime: &Runtime,
    args: Vec<Value>,
    visibilities: &[Visibility],
) -> RuntimeResult<Value> {
    let (receiver, rest) = split_receiver(signature, args)?;
    let module = expect_module(signature, &receiver)?;
    let include_inherited = match rest.as_slice() {
        [] => true,
        [flag] => flag.is_truthy(),
        _ => {
            return Err(RuntimeError::Argument(format!(
                "'{signature}': too many arguments"
            )))
        }
    };
    Ok(symbols_array(
        runtime,
        runtime.instance_methods(module, visibilities, include_inherited),
    ))
}

fn instance_methods(runtime: &Runtime, args: Vec<Value>) -> RuntimeResult<Value> {
    listing(
        "Module#instance_methods",
        runtime,
        args,
        &[Visibility::Public, Visibility::Protected],
    )
}

fn private_instance_methods(runtime: &Runtime, args: Vec<Value>) -> RuntimeResult<Value> {
    listing(
        "Module#private_instance_methods",
        runtime,
        args,
        &[Visibility::Private, Visibility::ModuleFunction],
    )
}

fn is_method_defined(runtime: &Runtime, args: Vec<Value>) -> RuntimeResult<Value> {
    const SIGNATURE: &str = "Module#method_defined?";

    expect_args!(SIGNATURE, args, [
        Value::Module(module) => module,
        Value::Symbol(name) => name,
    ]);

    let name = runtime.symbol_name(name);
    Ok(Value::Boolean(runtime.is_method_bound(module, &name, true)))
}

/// Apply `op` to each symbol argument in order, returning the receiver.
fn for_each_name(
    signature: &str,
    runtime: &Runtime,
    args: Vec<Value>,
    op: impl Fn(&Runtime, rom_core::ModuleId, &str) -> RuntimeResult<()>,
) -> RuntimeResult<Value> {
    let (receiver, rest) = split_receiver(signature, args)?;
    let module = expect_module(signature, &receiver)?;
    for name in expect_symbols(signature, &rest)? {
        op(runtime, module, &runtime.symbol_name(name))?;
    }
    Ok(receiver)
}

fn remove_method(runtime: &Runtime, args: Vec<Value>) -> RuntimeResult<Value> {
    for_each_name("Module#remove_method", runtime, args, |rt, module, name| {
        rt.remove_method(module, name)
    })
}

fn undef_method(runtime: &Runtime, args: Vec<Value>) -> RuntimeResult<Value> {
    for_each_name("Module#undef_method", runtime, args, |rt, module, name| {
        rt.undef_method(module, name)
    })
}

fn alias_method(runtime: &Runtime, args: Vec<Value>) -> RuntimeResult<Value> {
    const SIGNATURE: &str = "Module#alias_method";

    expect_args!(SIGNATURE, args, [
        receiver @ Value::Module(_) => receiver,
        Value::Symbol(new_name) => new_name,
        Value::Symbol(old_name) => old_name,
    ]);

    let module = expect_module(SIGNATURE, &receiver)?;
    runtime.alias_method(
        module,
        &runtime.symbol_name(new_name),
        &runtime.symbol_name(old_name),
    )?;
    Ok(receiver)
}

fn const_get(runtime: &Runtime, args: Vec<Value>) -> RuntimeResult<Value> {
    const SIGNATURE: &str = "Module#const_get";

    expect_args!(SIGNATURE, args, [
        Value::Module(module) => module,
        Value::Symbol(name) => name,
    ]);

    runtime.get_constant(module, &runtime.symbol_name(name))
}

fn const_set(runtime: &Runtime, args: Vec<Value>) -> RuntimeResult<Value> {
    const SIGNATURE: &str = "Module#const_set";

    expect_args!(SIGNATURE, args, [
        Value::Module(module) => module,
        Value::Symbol(name) => name,
        value => value,
    ]);

    runtime.set_constant(module, &runtime.symbol_name(name), value.clone())?;
    Ok(value)
}

fn is_const_defined(runtime: &Runtime, args: Vec<Value>) -> RuntimeResult<Value> {
    const SIGNATURE: &str = "Module#const_defined?";

    expect_args!(SIGNATURE, args, [
        Value::Module(module) => module,
        Value::Symbol(name) => name,
    ]);

    Ok(Value::Boolean(
        runtime.is_constant_defined(module, &runtime.symbol_name(name)),
    ))
}

fn constants(runtime: &Runtime, args: Vec<Value>) -> RuntimeResult<Value> {
    const SIGNATURE: &str = "Module#constants";

    expect_args!(SIGNATURE, args, [
        Value::Module(module) => module,
    ]);

    Ok(symbols_array(runtime, runtime.constants(module)))
}

fn class_variable_get(runtime: &Runtime, args: Vec<Value>) -> RuntimeResult<Value> {
    const SIGNATURE: &str = "Module#class_variable_get";

    expect_args!(SIGNATURE, args, [
        Value::Module(module) => module,
        Value::Symbol(name) => name,
    ]);

    runtime.class_variable_get(module, &runtime.symbol_name(name))
}

fn class_variable_set(runtime: &Runtime, args: Vec<Value>) -> RuntimeResult<Value> {
    const SIGNATURE: &str = "Module#class_variable_set";

    expect_args!(SIGNATURE, args, [
        Value::Module(module) => module,
        Value::Symbol(name) => name,
        value => value,
    ]);

    runtime.class_variable_set(module, &runtime.symbol_name(name), value.clone())?;
    Ok(value)
}

fn class_variables(runtime: &Runtime, args: Vec<Value>) -> RuntimeResult<Value> {
    const SIGNATURE: &str = "Module#class_variables";

    expect_args!(SIGNATURE, args, [
        Value::Module(module) => module,
    ]);

    Ok(symbols_array(runtime, runtime.class_variables(module)))
}

fn attr_reader(runtime: &Runtime, args: Vec<Value>) -> RuntimeResult<Value> {
    for_each_name("Module#attr_reader", runtime, args, |rt, module, name| {
        rt.define_attr(module, name, true, false)
    })
}

fn attr_writer(runtime: &Runtime, args: Vec<Value>) -> RuntimeResult<Value> {
    for_each_name("Module#attr_writer", runtime, args, |rt, module, name| {
        rt.define_attr(module, name, false, true)
    })
}

fn attr_accessor(runtime: &Runtime, args: Vec<Value>) -> RuntimeResult<Value> {
    for_each_name("Module#attr_accessor", runtime, args, |rt, module, name| {
        rt.define_attr(module, name, true, true)
    })
}

fn change_visibility(
    signature: &str,
    runtime: &Runtime,
    args: Vec<Value>,
    visibility: Visibility,
) -> RuntimeResult<Value> {
    let (receiver, rest) = split_receiver(signature, args)?;
    let module = expect_module(signature, &receiver)?;
    let names: Vec<_> = expect_symbols(signature, &rest)?
        .into_iter()
        .map(|it| runtime.symbol_name(it))
        .collect();
    let names: Vec<&str> = names.iter().map(|it| it.as_ref()).collect();
    if visibility == Visibility::ModuleFunction {
        runtime.module_function(module, &names)?;
    } else {
        runtime.set_visibility(module, &names, visibility)?;
    }
    Ok(receiver)
}

fn public(runtime: &Runtime, args: Vec<Value>) -> RuntimeResult<Value> {
    change_visibility("Module#public", runtime, args, Visibility::Public)
}

fn private(runtime: &Runtime, args: Vec<Value>) -> RuntimeResult<Value> {
    change_visibility("Module#private", runtime, args, Visibility::Private)
}

fn protected(runtime: &Runtime, args: Vec<Value>) -> RuntimeResult<Value> {
    change_visibility("Module#protected", runtime, args, Visibility::Protected)
}

fn module_function(runtime: &Runtime, args: Vec<Value>) -> RuntimeResult<Value> {
    change_visibility(
        "Module#module_function",
        runtime,
        args,
        Visibility::ModuleFunction,
    )
}
