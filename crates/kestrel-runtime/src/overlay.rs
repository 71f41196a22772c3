//! Thread-scoped method overlays
//!
//! An overlay adds methods to existing classes for the dynamic extent of an
//! [`OverlayGuard`]. Overlays are visible only on the activating thread.
//! A method the receiver's own class declares still wins; an overlay method
//! is found before anything inherited from a superclass. While any overlay
//! is active, call sites resolve fresh instead of installing cache entries.

use crate::metaclass::{MetaClass, MethodTarget};
use crate::registry::MetaClassRegistry;
use crate::value::Value;
use std::cell::{Cell, RefCell};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::trace;

/// Where an overlay comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayKind {
    /// `use(Category) { ... }` style scoped extension
    Category,
    /// Trait methods applied to a receiver
    Trait,
}

/// Named set of methods keyed by target class
#[derive(Debug, Clone)]
pub struct Overlay {
    kind: OverlayKind,
    name: String,
    methods: Vec<(String, Arc<MethodTarget>)>,
}

impl Overlay {
    /// Empty overlay
    pub fn new(kind: OverlayKind, name: &str) -> Self {
        Self {
            kind,
            name: name.to_string(),
            methods: Vec::new(),
        }
    }

    /// Add `target` to `class` and its subclasses
    pub fn with_method(mut self, class: &str, target: MethodTarget) -> Self {
        self.methods.push((class.to_string(), Arc::new(target)));
        self
    }

    /// Overlay kind
    pub fn kind(&self) -> OverlayKind {
        self.kind
    }

    /// Overlay name
    pub fn name(&self) -> &str {
        &self.name
    }

    fn lookup(
        &self,
        registry: &MetaClassRegistry,
        chain: &[Arc<MetaClass>],
        name: &str,
        args: &[Value],
        static_only: bool,
    ) -> Option<Arc<MethodTarget>> {
        let matches = |target: &Arc<MethodTarget>| {
            target.name == name && (!static_only || target.is_static) && target.accepts(registry, args)
        };
        for class in chain {
            let found = self
                .methods
                .iter()
                .find(|(owner, target)| owner == class.name() && matches(target));
            if let Some((_, target)) = found {
                return Some(Arc::clone(target));
            }
        }
        let class = chain.first()?;
        self.methods
            .iter()
            .find(|(owner, target)| registry.is_subclass(class.name(), owner) && matches(target))
            .map(|(_, target)| Arc::clone(target))
    }
}

thread_local! {
    static ACTIVE: RefCell<Vec<(u64, Arc<Overlay>)>> = const { RefCell::new(Vec::new()) };
    static NEXT_ID: Cell<u64> = const { Cell::new(0) };
}

/// Keeps an overlay active until dropped
///
/// Not `Send`: the overlay belongs to the thread that activated it.
#[derive(Debug)]
pub struct OverlayGuard {
    id: u64,
    _thread_bound: PhantomData<*const ()>,
}

/// Activate `overlay` on the current thread
pub fn activate(overlay: Overlay) -> OverlayGuard {
    let id = NEXT_ID.with(|next| {
        let id = next.get();
        next.set(id + 1);
        id
    });
    trace!(overlay = %overlay.name, id, "overlay activated");
    ACTIVE.with(|active| active.borrow_mut().push((id, Arc::new(overlay))));
    OverlayGuard {
        id,
        _thread_bound: PhantomData,
    }
}

impl Drop for OverlayGuard {
    fn drop(&mut self) {
        let id = self.id;
        ACTIVE.with(|active| active.borrow_mut().retain(|(entry, _)| *entry != id));
        trace!(id, "overlay deactivated");
    }
}

/// Whether any overlay is active on this thread
pub fn is_active() -> bool {
    ACTIVE.with(|active| !active.borrow().is_empty())
}

/// Active overlays, most recently activated first
pub fn active() -> Vec<Arc<Overlay>> {
    ACTIVE.with(|active| active.borrow().iter().rev().map(|(_, o)| Arc::clone(o)).collect())
}

/// First overlay method for `name` on `class` or an ancestor
///
/// The most recently activated overlay wins; within one overlay the
/// nearest class in the superclass chain wins.
pub fn find(
    registry: &MetaClassRegistry,
    class: &Arc<MetaClass>,
    name: &str,
    args: &[Value],
    static_only: bool,
) -> Option<Arc<MethodTarget>> {
    if !is_active() {
        return None;
    }
    let chain = registry.superclass_chain(class);
    active()
        .iter()
        .find_map(|overlay| overlay.lookup(registry, &chain, name, args, static_only))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shout(label: &'static str) -> MethodTarget {
        MethodTarget::native("StringCategory", "shout", &[], "String", move |_, receiver, _| {
            Ok(Value::string(&format!("{}:{}", label, receiver)))
        })
    }

    #[test]
    fn test_guard_scopes_activation() {
        assert!(!is_active());
        {
            let _guard = activate(Overlay::new(OverlayKind::Category, "Loud").with_method("String", shout("a")));
            assert!(is_active());
            assert_eq!(active().len(), 1);
        }
        assert!(!is_active());
    }

    #[test]
    fn test_most_recent_overlay_wins() {
        let registry = MetaClassRegistry::with_builtins();
        let string = registry.require("String").unwrap();
        let _outer = activate(Overlay::new(OverlayKind::Category, "Outer").with_method("String", shout("outer")));
        let inner = activate(Overlay::new(OverlayKind::Trait, "Inner").with_method("Object", shout("inner")));

        let target = find(&registry, &string, "shout", &[], false).unwrap();
        assert_eq!(target.owner, "StringCategory");
        let mut invoker = crate::invoke::NativeInvoker::new(&registry);
        let result = crate::invoke::invoke(&mut invoker, &target, &Value::string("x"), &[]).unwrap();
        assert_eq!(result.to_string(), "inner:x");

        drop(inner);
        let target = find(&registry, &string, "shout", &[], false).unwrap();
        let result = crate::invoke::invoke(&mut invoker, &target, &Value::string("x"), &[]).unwrap();
        assert_eq!(result.to_string(), "outer:x");
    }

    #[test]
    fn test_overlays_do_not_cross_threads() {
        let _guard = activate(Overlay::new(OverlayKind::Category, "Local").with_method("String", shout("a")));
        let seen = std::thread::spawn(is_active).join().unwrap();
        assert!(!seen);
        assert!(is_active());
    }

    #[test]
    fn test_unrelated_class_does_not_match() {
        let registry = MetaClassRegistry::with_builtins();
        let integer = registry.require("Integer").unwrap();
        let _guard = activate(Overlay::new(OverlayKind::Category, "Loud").with_method("String", shout("a")));
        assert!(find(&registry, &integer, "shout", &[], false).is_none());
    }
}
