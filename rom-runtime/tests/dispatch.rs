use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use rom_runtime::{
    CallType, Callable, ErrorKind, ModuleId, Runtime, RuntimeConfig, RuntimeError, Value,
    Visibility,
};

fn constant(value: i64) -> Callable {
    Callable::Constant(Value::Integer(value))
}

fn call(runtime: &Runtime, receiver: &Value, name: &str) -> Result<Value, RuntimeError> {
    runtime.call_method(receiver, name, vec![], CallType::Normal, None)
}

fn instance(runtime: &Runtime, class: ModuleId) -> Value {
    Value::Object(runtime.new_instance(class, vec![]).unwrap())
}

fn owner_name(runtime: &Runtime, class: ModuleId, name: &str) -> Option<String> {
    runtime
        .method_owner(class, name)
        .map(|it| runtime.module_name(it))
}

#[test]
fn own_methods_shadow_later_mixins() {
    let runtime = Runtime::default();
    let a = runtime.define_class("A", None).unwrap();
    let m = runtime.define_module("M").unwrap();

    runtime.define_method(a, "foo", constant(1)).unwrap();
    runtime.define_method(m, "foo", constant(2)).unwrap();
    runtime.define_method(m, "bar", constant(3)).unwrap();
    runtime.include_module(a, m).unwrap();

    let obj = instance(&runtime, a);
    assert_eq!(call(&runtime, &obj, "foo").unwrap(), Value::Integer(1));
    assert_eq!(call(&runtime, &obj, "bar").unwrap(), Value::Integer(3));
    assert_eq!(owner_name(&runtime, a, "foo").as_deref(), Some("A"));
    assert_eq!(owner_name(&runtime, a, "bar").as_deref(), Some("M"));
}

#[test]
fn redefinition_reaches_every_cached_class() {
    let runtime = Runtime::default();
    let c = runtime.define_class("C", None).unwrap();
    let d = runtime.define_class("D", Some(c)).unwrap();
    let e = runtime.define_class("E", Some(d)).unwrap();
    runtime.define_method(c, "bar", constant(1)).unwrap();

    let objects = [instance(&runtime, c), instance(&runtime, d), instance(&runtime, e)];
    for obj in &objects {
        assert_eq!(call(&runtime, obj, "bar").unwrap(), Value::Integer(1));
    }

    runtime.define_method(c, "bar", constant(2)).unwrap();
    for obj in &objects {
        assert_eq!(call(&runtime, obj, "bar").unwrap(), Value::Integer(2));
    }

    // A definition lower in the chain shadows the cached ancestor method.
    runtime.define_method(d, "bar", constant(3)).unwrap();
    assert_eq!(call(&runtime, &objects[0], "bar").unwrap(), Value::Integer(2));
    assert_eq!(call(&runtime, &objects[1], "bar").unwrap(), Value::Integer(3));
    assert_eq!(call(&runtime, &objects[2], "bar").unwrap(), Value::Integer(3));
}

#[test]
fn include_invalidates_cached_misses() {
    let runtime = Runtime::default();
    let c = runtime.define_class("C", None).unwrap();
    let d = runtime.define_class("D", Some(c)).unwrap();
    let m = runtime.define_module("M").unwrap();
    runtime.define_method(m, "foo", constant(7)).unwrap();

    let obj = instance(&runtime, d);
    let err = call(&runtime, &obj, "foo").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UndefinedMethod);

    runtime.include_module(c, m).unwrap();
    assert_eq!(call(&runtime, &obj, "foo").unwrap(), Value::Integer(7));
}

#[test]
fn module_edits_are_visible_through_wrappers() {
    let runtime = Runtime::default();
    let a = runtime.define_class("A", None).unwrap();
    let b = runtime.define_class("B", None).unwrap();
    let m = runtime.define_module("M").unwrap();
    runtime.include_module(a, m).unwrap();
    runtime.include_module(b, m).unwrap();

    let (x, y) = (instance(&runtime, a), instance(&runtime, b));
    assert!(call(&runtime, &x, "late").is_err());

    runtime.define_method(m, "late", constant(5)).unwrap();
    assert_eq!(call(&runtime, &x, "late").unwrap(), Value::Integer(5));
    assert_eq!(call(&runtime, &y, "late").unwrap(), Value::Integer(5));

    runtime.remove_method(m, "late").unwrap();
    assert!(call(&runtime, &x, "late").is_err());
}

#[test]
fn removal_only_looks_at_the_own_table() {
    let runtime = Runtime::default();
    let c = runtime.define_class("C", None).unwrap();
    let d = runtime.define_class("D", Some(c)).unwrap();
    runtime.define_method(c, "foo", constant(1)).unwrap();
    runtime.define_method(d, "foo", constant(2)).unwrap();

    let err = runtime.remove_method(d, "nope").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NameError);

    let obj = instance(&runtime, d);
    assert_eq!(call(&runtime, &obj, "foo").unwrap(), Value::Integer(2));
    runtime.remove_method(d, "foo").unwrap();
    assert_eq!(call(&runtime, &obj, "foo").unwrap(), Value::Integer(1));

    let err = runtime.remove_method(d, "foo").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NameError);
}

#[test]
fn undef_hides_ancestor_definitions() {
    let runtime = Runtime::default();
    let c = runtime.define_class("C", None).unwrap();
    let d = runtime.define_class("D", Some(c)).unwrap();
    runtime.define_method(c, "foo", constant(1)).unwrap();

    let err = runtime.undef_method(d, "foo").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NameError);

    runtime.define_method(d, "foo", constant(2)).unwrap();
    runtime.undef_method(d, "foo").unwrap();

    let obj = instance(&runtime, d);
    match call(&runtime, &obj, "foo").unwrap_err() {
        RuntimeError::UndefinedMethod { name, reason, .. } => {
            assert_eq!(name, "foo");
            assert_eq!(reason, "undefined");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(runtime.search_method(d, "foo").is_none());
    assert_eq!(
        call(&runtime, &instance(&runtime, c), "foo").unwrap(),
        Value::Integer(1)
    );
}

#[test]
fn aliases_keep_the_old_behavior() {
    let runtime = Runtime::default();
    let c = runtime.define_class("C", None).unwrap();
    runtime.define_method(c, "foo", constant(1)).unwrap();
    runtime.alias_method(c, "old_foo", "foo").unwrap();
    runtime.define_method(c, "foo", constant(2)).unwrap();

    let obj = instance(&runtime, c);
    assert_eq!(call(&runtime, &obj, "foo").unwrap(), Value::Integer(2));
    assert_eq!(call(&runtime, &obj, "old_foo").unwrap(), Value::Integer(1));

    let err = runtime.alias_method(c, "x", "missing").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NameError);

    // Modules may alias what every object responds to.
    let m = runtime.define_module("M").unwrap();
    runtime.alias_method(m, "identity", "object_id").unwrap();
}

#[test]
fn call_sites_enforce_visibility() {
    let runtime = Runtime::default();
    let c = runtime.define_class("C", None).unwrap();
    let other = runtime.define_class("Other", None).unwrap();
    runtime.define_method(c, "secret", constant(1)).unwrap();
    runtime.define_method(c, "guarded", constant(2)).unwrap();
    runtime.set_visibility(c, &["secret"], Visibility::Private).unwrap();
    runtime.set_visibility(c, &["guarded"], Visibility::Protected).unwrap();

    let obj = instance(&runtime, c);
    match call(&runtime, &obj, "secret").unwrap_err() {
        RuntimeError::UndefinedMethod { reason, .. } => assert_eq!(reason, "private"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(runtime.send(&obj, "secret", vec![]).unwrap(), Value::Integer(1));

    let peer = instance(&runtime, c);
    let stranger = instance(&runtime, other);
    let ok = runtime.call_method(&obj, "guarded", vec![], CallType::Normal, Some(&peer));
    assert_eq!(ok.unwrap(), Value::Integer(2));
    match runtime
        .call_method(&obj, "guarded", vec![], CallType::Normal, Some(&stranger))
        .unwrap_err()
    {
        RuntimeError::UndefinedMethod { reason, .. } => assert_eq!(reason, "protected"),
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(runtime.method_visibility(c, "secret"), Some(Visibility::Private));
    assert!(!runtime.is_method_bound(c, "secret", true));
    assert!(runtime.is_method_bound(c, "secret", false));
}

#[test]
fn inherited_methods_change_visibility_through_super() {
    let runtime = Runtime::default();
    let c = runtime.define_class("C", None).unwrap();
    let d = runtime.define_class("D", Some(c)).unwrap();
    runtime.define_method(c, "foo", constant(9)).unwrap();
    runtime.set_visibility(d, &["foo"], Visibility::Private).unwrap();

    assert!(call(&runtime, &instance(&runtime, d), "foo").is_err());
    assert_eq!(
        runtime.send(&instance(&runtime, d), "foo", vec![]).unwrap(),
        Value::Integer(9)
    );
    assert_eq!(
        call(&runtime, &instance(&runtime, c), "foo").unwrap(),
        Value::Integer(9)
    );

    let err = runtime
        .set_visibility(d, &["missing"], Visibility::Private)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NameError);
}

#[test]
fn custom_method_missing_receives_the_name() {
    let runtime = Runtime::default();
    let c = runtime.define_class("C", None).unwrap();
    runtime
        .define_method(
            c,
            "method_missing",
            Callable::native(|_, args| Ok(args.get(1).cloned().unwrap_or(Value::Nil))),
        )
        .unwrap();

    let obj = instance(&runtime, c);
    let value = call(&runtime, &obj, "anything").unwrap();
    assert_eq!(value, Value::Symbol(runtime.intern("anything")));
}

#[test]
fn native_methods_get_the_receiver_first() {
    let runtime = Runtime::default();
    let c = runtime.define_class("C", None).unwrap();
    runtime
        .define_method(
            c,
            "initialize",
            Callable::native(|runtime, args| {
                let obj = runtime.heap_object(&args[0]).unwrap();
                runtime.instance_variable_set(&obj, "@size", args[1].clone())?;
                Ok(Value::Nil)
            }),
        )
        .unwrap();
    runtime.define_attr(c, "size", true, true).unwrap();

    let obj = Value::Object(runtime.new_instance(c, vec![Value::Integer(3)]).unwrap());
    assert_eq!(call(&runtime, &obj, "size").unwrap(), Value::Integer(3));
    runtime
        .call_method(&obj, "size=", vec![Value::Integer(4)], CallType::Normal, None)
        .unwrap();
    assert_eq!(call(&runtime, &obj, "size").unwrap(), Value::Integer(4));

    let err = runtime
        .call_method(&obj, "size", vec![Value::Nil], CallType::Normal, None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArgumentError);
    assert_eq!(runtime.method_visibility(c, "initialize"), Some(Visibility::Private));
}

#[test]
fn module_functions_are_private_copies() {
    let runtime = Runtime::default();
    let m = runtime.define_module("Util").unwrap();
    runtime.define_method(m, "helper", constant(11)).unwrap();
    runtime.module_function(m, &["helper"]).unwrap();

    assert_eq!(call(&runtime, &Value::Module(m), "helper").unwrap(), Value::Integer(11));

    let c = runtime.define_class("C", None).unwrap();
    runtime.include_module(c, m).unwrap();
    let obj = instance(&runtime, c);
    assert!(call(&runtime, &obj, "helper").is_err());
    assert_eq!(runtime.send(&obj, "helper", vec![]).unwrap(), Value::Integer(11));

    let err = runtime.module_function(c, &["helper"]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeError);
}

#[test]
fn instance_method_listing_follows_resolution_order() {
    let runtime = Runtime::default();
    let c = runtime.define_class("C", None).unwrap();
    let d = runtime.define_class("D", Some(c)).unwrap();
    runtime.define_method(c, "a", constant(1)).unwrap();
    runtime.define_method(c, "b", constant(1)).unwrap();
    runtime.define_method(d, "c", constant(1)).unwrap();
    runtime.define_method(d, "b", constant(1)).unwrap();
    runtime.undef_method(d, "b").unwrap();
    runtime.set_visibility(d, &["c"], Visibility::Private).unwrap();

    let public = [Visibility::Public, Visibility::Protected];
    let own = runtime.instance_methods(d, &public, false);
    assert!(own.is_empty());

    let all = runtime.instance_methods(d, &public, true);
    assert!(all.contains(&"a".to_string()));
    assert!(!all.contains(&"b".to_string()));
    assert!(!all.contains(&"c".to_string()));
    assert!(all.contains(&"object_id".to_string()));

    let private = runtime.instance_methods(d, &[Visibility::Private], false);
    assert_eq!(private, ["c"]);
}

#[test]
fn class_methods_are_inherited() {
    let runtime = Runtime::default();
    let a = runtime.define_class("A", None).unwrap();
    let b = runtime.define_class("B", Some(a)).unwrap();
    runtime
        .define_singleton_method(&Value::Module(a), "build", constant(42))
        .unwrap();

    assert_eq!(call(&runtime, &Value::Module(b), "build").unwrap(), Value::Integer(42));

    let made = call(&runtime, &Value::Module(b), "new").unwrap();
    assert_eq!(runtime.real_class_of(&made), b);
}

#[test]
fn primitives_answer_through_dispatch() {
    let runtime = Runtime::default();
    let c = runtime.define_class("C", None).unwrap();
    let m = runtime.define_module("M").unwrap();
    let obj = instance(&runtime, c);
    let sym = |name: &str| Value::Symbol(runtime.intern(name));

    runtime
        .send(&Value::Module(c), "include", vec![Value::Module(m)])
        .unwrap();
    let ancestors = call(&runtime, &Value::Module(c), "ancestors").unwrap();
    assert_eq!(ancestors.as_array().map(<[Value]>::len), Some(4));

    runtime
        .send(&Value::Module(c), "attr_accessor", vec![sym("name")])
        .unwrap();
    runtime
        .call_method(&obj, "name=", vec![Value::from("rom")], CallType::Normal, None)
        .unwrap();
    assert_eq!(call(&runtime, &obj, "name").unwrap(), Value::from("rom"));

    let responds = runtime
        .call_method(&obj, "respond_to?", vec![sym("name")], CallType::Normal, None)
        .unwrap();
    assert_eq!(responds, Value::Boolean(true));

    let kind = runtime
        .call_method(&obj, "is_a?", vec![Value::Module(m)], CallType::Normal, None)
        .unwrap();
    assert_eq!(kind, Value::Boolean(true));

    assert_eq!(
        call(&runtime, &obj, "class").unwrap(),
        Value::Module(c)
    );
    assert_eq!(
        runtime
            .call_method(&obj, "send", vec![sym("name")], CallType::Normal, None)
            .unwrap(),
        Value::from("rom")
    );
    assert_eq!(
        call(&runtime, &Value::Module(c), "superclass").unwrap(),
        Value::Module(runtime.core().object)
    );
}

#[test]
fn disabling_the_cache_changes_nothing_observable() {
    for enabled in [true, false] {
        let runtime = Runtime::new(RuntimeConfig::default().with_method_cache(enabled));
        let c = runtime.define_class("C", None).unwrap();
        let d = runtime.define_class("D", Some(c)).unwrap();
        let obj = instance(&runtime, d);

        runtime.define_method(c, "v", constant(1)).unwrap();
        assert_eq!(call(&runtime, &obj, "v").unwrap(), Value::Integer(1));
        runtime.define_method(d, "v", constant(2)).unwrap();
        assert_eq!(call(&runtime, &obj, "v").unwrap(), Value::Integer(2));
        runtime.remove_method(d, "v").unwrap();
        assert_eq!(call(&runtime, &obj, "v").unwrap(), Value::Integer(1));

        let stats = runtime.cache_stats();
        if enabled {
            assert!(stats.hits > 0);
        } else {
            assert_eq!(stats.entries, 0);
            assert_eq!(stats.hits, 0);
        }
    }
}

#[test]
fn frozen_and_secure_method_tables() {
    let runtime = Runtime::default();
    let c = runtime.define_class("C", None).unwrap();
    runtime.freeze(&Value::Module(c)).unwrap();
    let err = runtime.define_method(c, "x", constant(1)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FrozenViolation);

    let runtime = Runtime::new(RuntimeConfig::default().with_safe_level(4));
    let object = runtime.core().object;
    let err = runtime.define_method(object, "x", constant(1)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SecurityViolation);
}

#[test]
fn alias_of_a_visibility_override_reaches_the_inherited_body() {
    let runtime = Runtime::default();
    let c = runtime.define_class("C", None).unwrap();
    let d = runtime.define_class("D", Some(c)).unwrap();
    runtime.define_method(c, "foo", constant(9)).unwrap();

    runtime.set_visibility(d, &["foo"], Visibility::Private).unwrap();
    runtime.alias_method(d, "bar", "foo").unwrap();

    let obj = instance(&runtime, d);
    assert_eq!(runtime.send(&obj, "bar", vec![]).unwrap(), Value::Integer(9));
    assert_eq!(runtime.send(&obj, "foo", vec![]).unwrap(), Value::Integer(9));
    let err = call(&runtime, &obj, "foo").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UndefinedMethod);
}

#[test]
fn concurrent_redefinition_leaves_no_stale_entries() {
    const READERS: usize = 4;
    const ROUNDS: i64 = 200;

    let runtime = Runtime::default();
    let c = runtime.define_class("C", None).unwrap();
    let d = runtime.define_class("D", Some(c)).unwrap();
    let e = runtime.define_class("E", Some(d)).unwrap();
    runtime.define_method(c, "foo", constant(0)).unwrap();
    let done = AtomicBool::new(false);

    thread::scope(|scope| {
        for _ in 0..READERS {
            let (runtime, done) = (&runtime, &done);
            scope.spawn(move || {
                while !done.load(Ordering::Acquire) {
                    for class in [c, d, e] {
                        assert!(runtime.search_method(class, "foo").is_some());
                        runtime.search_method(class, "bar");
                    }
                }
            });
        }

        scope.spawn(|| {
            for round in 1..=ROUNDS {
                runtime.define_method(c, "foo", constant(round)).unwrap();
                if round % 25 == 0 {
                    let mixin = runtime.define_module(&format!("Mixin{round}")).unwrap();
                    runtime.define_method(mixin, "bar", constant(round)).unwrap();
                    runtime.include_module(d, mixin).unwrap();
                }
            }
            done.store(true, Ordering::Release);
        });
    });

    for class in [c, d, e] {
        for name in ["foo", "bar"] {
            let cached = runtime.search_method(class, name).map(|it| it.serial());
            let fresh = runtime
                .search_method_uncached(class, runtime.intern(name))
                .filter(|it| !it.is_undefined())
                .map(|it| it.serial());
            assert_eq!(cached, fresh, "{name} from {}", runtime.module_name(class));
        }
        let foo = runtime.search_method(class, "foo").unwrap();
        assert!(matches!(foo.callable(), Callable::Constant(Value::Integer(ROUNDS))));
    }
    assert!(runtime.search_method(c, "bar").is_none());
    assert_eq!(call(&runtime, &instance(&runtime, e), "bar").unwrap(), Value::Integer(ROUNDS));
}
