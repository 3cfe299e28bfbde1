/// Primitives for the **Class** class.
pub mod class;
/// Primitives for the **Kernel** module.
pub mod kernel;
/// Primitives for the **Module** class.
pub mod module;

use std::sync::Arc;

use rom_core::{Interned, ModuleId, RuntimeError, RuntimeResult, Visibility};

use crate::method::{Callable, DynamicMethod};
use crate::runtime::Runtime;
use crate::value::Value;

/// A built-in primitive (just a bare function pointer). The receiver comes first.
pub type PrimitiveFn = fn(runtime: &Runtime, args: Vec<Value>) -> RuntimeResult<Value>;

/// Macro for checking and destructuring arguments passed to primitives.
#[macro_export]
macro_rules! expect_args {
    ($signature:expr, $args:expr, [ $( $ptrn:pat $( => $name:ident )? ),* $(,)? ]) => {
        #[allow(unused_mut)]
        let ($($(mut $name,)?)*) = {
            #[allow(unused_variables, unused_mut)]
            let mut iter = $args.into_iter();
            $(#[allow(unreachable_patterns)]
            $(let $name =)? match iter.next() {
                Some($ptrn) => {$($name)?},
                Some(_) => return Err(rom_core::RuntimeError::Argument(format!("'{}': wrong type", $signature))),
                None => return Err(rom_core::RuntimeError::Argument(format!("'{}': missing argument", $signature))),
            };)*
            if iter.next().is_some() {
                return Err(rom_core::RuntimeError::Argument(format!("'{}': too many arguments", $signature)));
            }
            ($($($name,)?)*)
        };
    };
}

/// Install every primitive into the core modules.
pub(crate) fn install(runtime: &Runtime) {
    let core = *runtime.core();
    install_table(runtime, core.kernel, self::kernel::INSTANCE_PRIMITIVES);
    install_table(runtime, core.module, self::module::INSTANCE_PRIMITIVES);
    install_table(runtime, core.class, self::class::INSTANCE_PRIMITIVES);
}

fn install_table(runtime: &Runtime, module: ModuleId, table: &[(&str, PrimitiveFn, Visibility)]) {
    for (name, func, visibility) in table {
        let method = DynamicMethod::new(
            runtime.next_method_serial(),
            runtime.intern(name),
            *visibility,
            module,
            Callable::Native(Arc::new(*func)),
        );
        runtime.install_method(module, method);
    }
}

/// Split off the receiver from the arguments of a variadic primitive.
pub(crate) fn split_receiver(signature: &str, args: Vec<Value>) -> RuntimeResult<(Value, Vec<Value>)> {
    let mut iter = args.into_iter();
    let receiver = iter
        .next()
        .ok_or_else(|| RuntimeError::Argument(format!("'{signature}': missing receiver")))?;
    Ok((receiver, iter.collect()))
}

/// Expect every argument to be a symbol.
pub(crate) fn expect_symbols(signature: &str, args: &[Value]) -> RuntimeResult<Vec<Interned>> {
    args.iter()
        .map(|it| {
            it.as_symbol().ok_or_else(|| {
                RuntimeError::Type(format!("'{signature}': expected a symbol"))
            })
        })
        .collect()
}

/// Expect a module value.
pub(crate) fn expect_module(signature: &str, value: &Value) -> RuntimeResult<ModuleId> {
    value
        .as_module()
        .ok_or_else(|| RuntimeError::Type(format!("'{signature}': expected a class or module")))
}

/// A list of module values.
pub(crate) fn modules_array(modules: Vec<ModuleId>) -> Value {
    Value::array(modules.into_iter().map(Value::Module))
}

/// A list of symbol values.
pub(crate) fn symbols_array(runtime: &Runtime, names: Vec<String>) -> Value {
    Value::array(names.iter().map(|it| Value::Symbol(runtime.intern(it))))
}
