use rom_runtime::{CallType, Callable, ErrorKind, ModuleId, Runtime, Value};

fn constant(value: i64) -> Callable {
    Callable::Constant(Value::Integer(value))
}

fn call(runtime: &Runtime, receiver: &Value, name: &str) -> Option<Value> {
    runtime
        .call_method(receiver, name, vec![], CallType::Normal, None)
        .ok()
}

fn instance(runtime: &Runtime, class: ModuleId) -> Value {
    Value::Object(runtime.new_instance(class, vec![]).unwrap())
}

#[test]
fn singleton_methods_stay_private_to_one_object() {
    let runtime = Runtime::default();
    let c = runtime.define_class("C", None).unwrap();
    let (a, b) = (instance(&runtime, c), instance(&runtime, c));

    runtime.define_singleton_method(&a, "baz", constant(1)).unwrap();
    assert_eq!(call(&runtime, &a, "baz"), Some(Value::Integer(1)));
    assert_eq!(call(&runtime, &b, "baz"), None);

    let singleton = runtime.singleton_class_of(&a).unwrap();
    assert_eq!(runtime.singleton_class_of(&a).unwrap(), singleton);
    assert!(runtime.module(singleton).is_singleton());
    assert_eq!(runtime.module(singleton).superclass(), Some(c));
    assert!(runtime.module(c).subclasses().contains(&singleton));
    assert_eq!(runtime.real_class_of(&a), c);
    assert_eq!(runtime.singleton_methods(&a), ["baz"]);
    assert!(runtime.singleton_methods(&b).is_empty());
}

#[test]
fn singleton_creation_propagates_flags() {
    let runtime = Runtime::default();
    let c = runtime.define_class("C", None).unwrap();
    let obj = instance(&runtime, c);
    runtime.taint(&obj).unwrap();
    runtime.freeze(&obj).unwrap();

    let singleton = runtime.singleton_class_of(&obj).unwrap();
    let record = runtime.module(singleton);
    assert!(record.object().is_tainted());
    assert!(record.object().is_frozen());

    let err = runtime
        .define_singleton_method(&obj, "x", constant(1))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FrozenViolation);
}

#[test]
fn immediates_have_no_singleton_class() {
    let runtime = Runtime::default();
    let core = *runtime.core();

    assert_eq!(runtime.singleton_class_of(&Value::Nil).unwrap(), core.nil);
    assert_eq!(
        runtime.singleton_class_of(&Value::Boolean(true)).unwrap(),
        core.true_class
    );
    for value in [Value::Integer(1), Value::Symbol(runtime.intern("s"))] {
        let err = runtime.singleton_class_of(&value).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeError);
    }
}

#[test]
fn clones_get_their_own_singleton_class() {
    let runtime = Runtime::default();
    let c = runtime.define_class("C", None).unwrap();
    let original = instance(&runtime, c);
    runtime.define_singleton_method(&original, "baz", constant(1)).unwrap();

    let copy = runtime.clone_value(&original).unwrap();
    assert_eq!(call(&runtime, &copy, "baz"), Some(Value::Integer(1)));
    assert_ne!(
        runtime.singleton_class_of(&copy).unwrap(),
        runtime.singleton_class_of(&original).unwrap()
    );

    runtime.define_singleton_method(&original, "baz", constant(2)).unwrap();
    assert_eq!(call(&runtime, &original, "baz"), Some(Value::Integer(2)));
    assert_eq!(call(&runtime, &copy, "baz"), Some(Value::Integer(1)));

    runtime.define_singleton_method(&copy, "qux", constant(3)).unwrap();
    assert_eq!(call(&runtime, &original, "qux"), None);
}

#[test]
fn clones_keep_extensions_separate() {
    let runtime = Runtime::default();
    let c = runtime.define_class("C", None).unwrap();
    let m = runtime.define_module("M").unwrap();
    let n = runtime.define_module("N").unwrap();
    runtime.define_method(m, "from_m", constant(1)).unwrap();
    runtime.define_method(n, "from_n", constant(2)).unwrap();

    let original = instance(&runtime, c);
    runtime.extend_object(&original, m).unwrap();
    let copy = runtime.clone_value(&original).unwrap();
    assert_eq!(call(&runtime, &copy, "from_m"), Some(Value::Integer(1)));

    runtime.extend_object(&copy, n).unwrap();
    assert_eq!(call(&runtime, &copy, "from_n"), Some(Value::Integer(2)));
    assert_eq!(call(&runtime, &original, "from_n"), None);
}

#[test]
fn dup_and_clone_copy_state_differently() {
    let runtime = Runtime::default();
    let c = runtime.define_class("C", None).unwrap();
    let original = instance(&runtime, c);
    let obj = runtime.heap_object(&original).unwrap();
    runtime.instance_variable_set(&obj, "@x", Value::Integer(1)).unwrap();
    runtime.define_singleton_method(&original, "baz", constant(1)).unwrap();
    runtime.taint(&original).unwrap();
    runtime.freeze(&original).unwrap();
    let id = runtime.id_of(&original);

    let dup = runtime.dup(&original).unwrap();
    let clone = runtime.clone_value(&original).unwrap();

    for copy in [&dup, &clone] {
        let copy_obj = runtime.heap_object(copy).unwrap();
        assert_eq!(
            runtime.instance_variable_get(&copy_obj, "@x").unwrap(),
            Some(Value::Integer(1))
        );
        assert!(runtime.is_tainted(copy));
        assert_ne!(runtime.id_of(copy), id);
        assert_eq!(runtime.real_class_of(copy), c);
    }

    assert!(!runtime.is_frozen(&dup));
    assert!(runtime.is_frozen(&clone));
    assert_eq!(call(&runtime, &dup, "baz"), None);
    assert_eq!(call(&runtime, &clone, "baz"), Some(Value::Integer(1)));
}

#[test]
fn immediates_cannot_be_copied() {
    let runtime = Runtime::default();

    let err = runtime.dup(&Value::Integer(1)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeError);
    assert_eq!(err.to_string(), "can't dup Integer");

    let err = runtime.clone_value(&Value::Nil).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeError);
}

#[test]
fn module_copies_are_independent() {
    let runtime = Runtime::default();
    let m = runtime.define_module("M").unwrap();
    runtime.define_method(m, "foo", constant(1)).unwrap();
    runtime.set_constant(m, "LIMIT", Value::Integer(10)).unwrap();
    runtime
        .define_singleton_method(&Value::Module(m), "build", constant(5))
        .unwrap();

    let copy = runtime.clone_value(&Value::Module(m)).unwrap();
    let copy_id = copy.as_module().unwrap();
    assert_ne!(copy_id, m);
    assert_eq!(runtime.get_constant(copy_id, "LIMIT").unwrap(), Value::Integer(10));
    assert_eq!(call(&runtime, &copy, "build"), Some(Value::Integer(5)));

    runtime.define_method(m, "foo", constant(2)).unwrap();
    let c = runtime.define_class("C", None).unwrap();
    runtime.include_module(c, copy_id).unwrap();
    assert_eq!(call(&runtime, &instance(&runtime, c), "foo"), Some(Value::Integer(1)));

    let dup = runtime.dup(&Value::Module(m)).unwrap();
    assert_eq!(call(&runtime, &dup, "build"), None);
}

#[test]
fn class_copies_keep_their_superclass() {
    let runtime = Runtime::default();
    let base = runtime.define_class("Base", None).unwrap();
    let derived = runtime.define_class("Derived", Some(base)).unwrap();
    runtime.define_method(base, "inherited", constant(1)).unwrap();
    runtime.define_method(derived, "own", constant(2)).unwrap();

    let copy = runtime.dup(&Value::Module(derived)).unwrap();
    let copy_id = copy.as_module().unwrap();
    assert_eq!(runtime.real_superclass(copy_id), Some(base));

    let obj = instance(&runtime, copy_id);
    assert_eq!(call(&runtime, &obj, "own"), Some(Value::Integer(2)));
    assert_eq!(call(&runtime, &obj, "inherited"), Some(Value::Integer(1)));
    assert!(runtime.module(copy_id).name().is_none());
}

#[test]
fn kernel_primitives_copy_through_dispatch() {
    let runtime = Runtime::default();
    let c = runtime.define_class("C", None).unwrap();
    let original = instance(&runtime, c);
    runtime.define_singleton_method(&original, "baz", constant(1)).unwrap();

    let copy = call(&runtime, &original, "clone").unwrap();
    assert_eq!(call(&runtime, &copy, "baz"), Some(Value::Integer(1)));

    let listed = call(&runtime, &original, "singleton_methods").unwrap();
    assert_eq!(listed.as_array().map(<[Value]>::len), Some(1));

    let m = runtime.define_module("M").unwrap();
    runtime.define_method(m, "mixed", constant(4)).unwrap();
    runtime
        .call_method(&original, "extend", vec![Value::Module(m)], CallType::Normal, None)
        .unwrap();
    assert_eq!(call(&runtime, &original, "mixed"), Some(Value::Integer(4)));
    assert_eq!(call(&runtime, &copy, "mixed"), None);
}
