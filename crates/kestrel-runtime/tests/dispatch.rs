//! Call-site and field-site behavior against a live registry
//!
//! Tests cover:
//! - Cache hits returning the identical target
//! - Invalidation through metaclass versions and registry generations
//! - Overlays ranking between own and inherited methods and bypassing the cache
//! - The missing-method hook and dispatch failures
//! - Concurrent resolution through one site

use kestrel_runtime::invoke::call_method;
use kestrel_runtime::metaclass::FieldSlot;
use kestrel_runtime::{
    activate, invoke, CallSite, FieldSite, Implementation, Instance, MetaClass, MetaClassRegistry, MethodTarget,
    NativeInvoker, Overlay, OverlayKind, PropertyMode, RuntimeError, Value,
};
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::thread;

fn text(reply: &'static str) -> impl Fn(&mut dyn kestrel_runtime::Invoker, &Value, &[Value]) -> kestrel_runtime::RuntimeResult<Value> {
    move |_, _, _| Ok(Value::string(reply))
}

/// `Animal` with `speak`, and `Dog extends Animal`
fn zoo() -> MetaClassRegistry {
    let registry = MetaClassRegistry::with_builtins();
    let animal = MetaClass::new("Animal", Some("Object"));
    animal.add_method(MethodTarget::native("Animal", "speak", &[], "String", text("...")));
    registry.register(Arc::new(animal));
    registry.register(Arc::new(MetaClass::new("Dog", Some("Animal"))));
    registry
}

fn instance(class: &str) -> Value {
    Value::Object(Arc::new(Instance::new(class, FxHashMap::default())))
}

fn speak(registry: &MetaClassRegistry, site: &CallSite, receiver: &Value) -> String {
    let target = site.resolve(registry, receiver, &[]).unwrap();
    let mut invoker = NativeInvoker::new(registry);
    invoke(&mut invoker, &target, receiver, &[]).unwrap().to_string()
}

#[test]
fn test_repeated_call_returns_identical_target() {
    let registry = zoo();
    let site = CallSite::new("speak", 0);
    let dog = instance("Dog");
    let first = site.resolve(&registry, &dog, &[]).unwrap();
    for _ in 0..10 {
        let again = site.resolve(&registry, &dog, &[]).unwrap();
        assert!(Arc::ptr_eq(&first, &again));
    }
    assert_eq!(site.counters().misses(), 1);
    assert_eq!(site.counters().hits(), 10);
}

#[test]
fn test_method_added_to_class_invalidates() {
    let registry = zoo();
    let site = CallSite::new("speak", 0);
    let dog = instance("Dog");
    assert_eq!(speak(&registry, &site, &dog), "...");

    registry
        .require("Dog")
        .unwrap()
        .add_method(MethodTarget::native("Dog", "speak", &[], "String", text("woof")));
    assert_eq!(speak(&registry, &site, &dog), "woof");
    assert_eq!(site.counters().misses(), 2);
}

#[test]
fn test_method_added_to_superclass_invalidates_subclass_entries() {
    let registry = zoo();
    let site = CallSite::new("speak", 0);
    let dog = instance("Dog");
    speak(&registry, &site, &dog);
    speak(&registry, &site, &dog);
    assert_eq!(site.counters().hits(), 1);

    // Replacing the inherited method must be seen through the subclass
    registry
        .require("Animal")
        .unwrap()
        .add_method(MethodTarget::native("Animal", "speak", &[], "String", text("grr")));
    assert_eq!(speak(&registry, &site, &dog), "grr");
    assert_eq!(site.counters().misses(), 2);
}

#[test]
fn test_removed_method_stops_resolving() {
    let registry = zoo();
    let site = CallSite::new("speak", 0);
    let dog = instance("Dog");
    speak(&registry, &site, &dog);
    assert_eq!(registry.require("Animal").unwrap().remove_method("speak", 0), 1);
    assert!(matches!(
        site.resolve(&registry, &dog, &[]),
        Err(RuntimeError::NoSuchMethod { .. })
    ));
}

#[test]
fn test_class_replacement_bumps_generation() {
    let registry = zoo();
    let site = CallSite::new("speak", 0);
    let dog = instance("Dog");
    speak(&registry, &site, &dog);
    let before = registry.generation();

    let replacement = MetaClass::new("Dog", Some("Animal"));
    replacement.add_method(MethodTarget::native("Dog", "speak", &[], "String", text("arf")));
    registry.register(Arc::new(replacement));

    assert!(registry.generation() > before);
    assert_eq!(speak(&registry, &site, &dog), "arf");
}

#[test]
fn test_overlay_wins_and_bypasses_cache() {
    let registry = zoo();
    let site = CallSite::new("speak", 0);
    let dog = instance("Dog");
    speak(&registry, &site, &dog);

    let overlay = Overlay::new(OverlayKind::Category, "Loud")
        .with_method("Animal", MethodTarget::native("Animal", "speak", &[], "String", text("LOUD")));
    {
        let _guard = activate(overlay);
        assert_eq!(speak(&registry, &site, &dog), "LOUD");
        assert_eq!(site.counters().overlay_bypasses(), 1);
    }
    assert_eq!(speak(&registry, &site, &dog), "...");
    assert_eq!(site.counters().hits(), 1);
}

#[test]
fn test_own_method_beats_overlay_on_same_class() {
    let registry = zoo();
    let site = CallSite::new("speak", 0);
    let animal = instance("Animal");
    let overlay = Overlay::new(OverlayKind::Category, "Loud")
        .with_method("Animal", MethodTarget::native("Animal", "speak", &[], "String", text("LOUD")));
    let _guard = activate(overlay);
    assert_eq!(speak(&registry, &site, &animal), "...");
    // Dog inherits speak, so the overlay on Animal is found first
    assert_eq!(speak(&registry, &site, &instance("Dog")), "LOUD");
}

#[test]
fn test_own_getter_beats_overlay_getter() {
    let registry = MetaClassRegistry::with_builtins();
    let bean = MetaClass::new("Bean", Some("Object"));
    bean.add_method(MethodTarget::native("Bean", "getName", &[], "String", text("own")));
    registry.register(Arc::new(bean));
    let overlay = Overlay::new(OverlayKind::Trait, "Named")
        .with_method("Bean", MethodTarget::native("Bean", "getName", &[], "String", text("overlay")));
    let _guard = activate(overlay);

    let mut invoker = NativeInvoker::new(&registry);
    let site = FieldSite::new("name", PropertyMode::Get);
    assert_eq!(site.get(&mut invoker, &instance("Bean")).unwrap().to_string(), "own");
}

#[test]
fn test_overlay_is_scoped_to_its_thread() {
    let registry = Arc::new(zoo());
    let overlay = Overlay::new(OverlayKind::Trait, "Fetching")
        .with_method("Dog", MethodTarget::native("Dog", "fetch", &[], "String", text("ball")));
    let _guard = activate(overlay);

    let site = CallSite::new("fetch", 0);
    assert_eq!(speak(&registry, &site, &instance("Dog")), "ball");

    let shared = Arc::clone(&registry);
    let outcome = thread::spawn(move || {
        let site = CallSite::new("fetch", 0);
        site.resolve(&shared, &instance("Dog"), &[]).map(|_| ())
    })
    .join()
    .unwrap();
    assert!(matches!(outcome, Err(RuntimeError::NoSuchMethod { .. })));
}

#[test]
fn test_missing_method_hook_receives_name_and_arguments() {
    let registry = MetaClassRegistry::with_builtins();
    let ghost = MetaClass::new("Ghost", Some("Object"));
    ghost.set_missing_method(Some(MethodTarget::native(
        "Ghost",
        "methodMissing",
        &["String", "Object"],
        "Object",
        |_, _, args| Ok(Value::string(&format!("{}{}", args[0], args[1]))),
    )));
    registry.register(Arc::new(ghost));

    let site = CallSite::new("boo", 2);
    let receiver = instance("Ghost");
    let args = [Value::Int(1), Value::string("x")];
    let target = site.resolve(&registry, &receiver, &args).unwrap();
    assert!(matches!(target.implementation, Implementation::MissingMethod(_)));

    let mut invoker = NativeInvoker::new(&registry);
    let reply = invoke(&mut invoker, &target, &receiver, &args).unwrap();
    assert_eq!(reply.to_string(), "boo[1, x]");
}

#[test]
fn test_overload_selection_prefers_specific_parameters() {
    let registry = MetaClassRegistry::with_builtins();
    let printer = MetaClass::new("Printer", Some("Object"));
    printer.add_method(MethodTarget::native("Printer", "show", &["Object"], "String", text("object")));
    printer.add_method(MethodTarget::native("Printer", "show", &["String"], "String", text("string")));
    registry.register(Arc::new(printer));

    let site = CallSite::new("show", 1);
    let receiver = instance("Printer");
    let mut invoker = NativeInvoker::new(&registry);
    for (arg, expected) in [(Value::string("s"), "string"), (Value::Int(1), "object")] {
        let args = [arg];
        let target = site.resolve(&registry, &receiver, &args).unwrap();
        assert_eq!(invoke(&mut invoker, &target, &receiver, &args).unwrap().to_string(), expected);
    }
    assert_eq!(site.entry_count(), 2);
}

#[test]
fn test_concurrent_resolution_agrees() {
    let registry = Arc::new(zoo());
    registry
        .require("Dog")
        .unwrap()
        .add_method(MethodTarget::native("Dog", "speak", &[], "String", text("woof")));
    let site = Arc::new(CallSite::new("speak", 0));

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let registry = Arc::clone(&registry);
            let site = Arc::clone(&site);
            thread::spawn(move || {
                let receiver = if worker % 2 == 0 { instance("Dog") } else { instance("Animal") };
                let expected = if worker % 2 == 0 { "Dog" } else { "Animal" };
                for _ in 0..500 {
                    let target = site.resolve(&registry, &receiver, &[]).unwrap();
                    assert_eq!(target.owner, expected);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let counters = site.counters();
    assert_eq!(counters.hits() + counters.misses(), 8 * 500);
    assert!(site.entry_count() <= 2);
}

#[test]
fn test_concurrent_resolution_survives_invalidation() {
    let registry = Arc::new(zoo());
    let site = Arc::new(CallSite::new("speak", 0));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let site = Arc::clone(&site);
            thread::spawn(move || {
                let dog = instance("Dog");
                for _ in 0..500 {
                    site.resolve(&registry, &dog, &[]).unwrap();
                }
            })
        })
        .collect();
    for _ in 0..100 {
        site.invalidate();
        registry.require("Animal").unwrap().bump_version();
    }
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(speak(&registry, &site, &instance("Dog")), "...");
}

#[test]
fn test_field_site_reads_and_coerces_writes() {
    let registry = MetaClassRegistry::with_builtins();
    let point = MetaClass::new("Point", Some("Object"));
    point.add_field(FieldSlot {
        name: "x".into(),
        descriptor: "int".into(),
        is_static: false,
    });
    registry.register(Arc::new(point));

    let mut fields = FxHashMap::default();
    fields.insert("x".to_string(), Value::Int(3));
    let p = Value::Object(Arc::new(Instance::new("Point", fields)));

    let mut invoker = NativeInvoker::new(&registry);
    let read = FieldSite::new("x", PropertyMode::Get);
    assert!(matches!(read.get(&mut invoker, &p).unwrap(), Value::Int(3)));
    assert!(matches!(read.get(&mut invoker, &p).unwrap(), Value::Int(3)));
    assert_eq!(read.hits(), 1);

    let write = FieldSite::new("x", PropertyMode::Set);
    write.set(&mut invoker, &p, Value::Long(7)).unwrap();
    assert!(matches!(read.get(&mut invoker, &p).unwrap(), Value::Int(7)));

    let missing = FieldSite::new("y", PropertyMode::Get);
    assert!(matches!(
        missing.get(&mut invoker, &p),
        Err(RuntimeError::NoSuchProperty { .. })
    ));
}

#[test]
fn test_field_site_falls_back_to_getter() {
    let registry = MetaClassRegistry::with_builtins();
    let bean = MetaClass::new("Bean", Some("Object"));
    bean.add_method(MethodTarget::native("Bean", "getName", &[], "String", text("kestrel")));
    registry.register(Arc::new(bean));

    let mut invoker = NativeInvoker::new(&registry);
    let site = FieldSite::new("name", PropertyMode::Get);
    assert_eq!(site.get(&mut invoker, &instance("Bean")).unwrap().to_string(), "kestrel");
    assert_eq!(call_method(&mut invoker, &instance("Bean"), "getName", &[]).unwrap().to_string(), "kestrel");
}
