//! Monomorphic caches for dynamic property access
//!
//! `obj.name` resolves to a declared field first, then to a `getName` or
//! `isName` method (`setName` for writes). The resolution is cached for one
//! receiver class under the same validity rule as call sites.

use crate::invoke::{invoke, Invoker};
use crate::metaclass::{MetaClass, MethodTarget};
use crate::overlay;
use crate::registry::{ChainStamp, MetaClassRegistry};
use crate::value::{box_for, default_boxed, unbox_for, Value};
use crate::{RuntimeError, RuntimeResult};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Read or write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyMode {
    /// `obj.name`
    Get,
    /// `obj.name = value`
    Set,
}

/// How a property is reached
#[derive(Debug, Clone)]
pub enum PropertyAccess {
    /// Declared field
    Field {
        /// Declaring class
        owner: String,
        /// Field name
        name: String,
        /// Field type name
        descriptor: String,
        /// Whether the field lives on the class
        is_static: bool,
    },
    /// `getX()` or `isX()`
    Getter(Arc<MethodTarget>),
    /// `setX(value)`
    Setter(Arc<MethodTarget>),
}

#[derive(Debug)]
struct FieldEntry {
    class: Arc<MetaClass>,
    static_receiver: bool,
    stamp: ChainStamp,
    access: PropertyAccess,
}

/// One dynamic property access site
#[derive(Debug)]
pub struct FieldSite {
    name: String,
    mode: PropertyMode,
    cache: RwLock<Option<FieldEntry>>,
    hits: AtomicU64,
}

fn accessor_name(prefix: &str, property: &str) -> String {
    let mut chars = property.chars();
    match chars.next() {
        Some(first) => format!("{}{}{}", prefix, first.to_uppercase(), chars.as_str()),
        None => prefix.to_string(),
    }
}

impl FieldSite {
    /// Site accessing property `name`
    pub fn new(name: &str, mode: PropertyMode) -> Self {
        Self {
            name: name.to_string(),
            mode,
            cache: RwLock::new(None),
            hits: AtomicU64::new(0),
        }
    }

    /// Property name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lookups answered from the cache
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// How this site's property is reached on `receiver`
    ///
    /// `value` is the value being written, used to pick a setter overload.
    pub fn resolve(
        &self,
        registry: &MetaClassRegistry,
        receiver: &Value,
        value: Option<&Value>,
    ) -> RuntimeResult<PropertyAccess> {
        let (class, static_receiver) = registry.class_of(receiver).map_err(|err| match err {
            RuntimeError::NullReceiver { .. } => RuntimeError::NullReceiver {
                member: format!("property {}", self.name),
            },
            other => other,
        })?;
        if overlay::is_active() {
            return self.resolve_fresh(registry, &class, static_receiver, value);
        }

        if let Some(entry) = self.cache.read().as_ref() {
            if Arc::ptr_eq(&entry.class, &class)
                && entry.static_receiver == static_receiver
                && entry.stamp.is_current(registry)
            {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(entry.access.clone());
            }
        }

        let stamp = registry.stamp(&class);
        let access = self.resolve_fresh(registry, &class, static_receiver, value)?;
        debug!(property = %self.name, class = %class.name(), "field site installed");
        *self.cache.write() = Some(FieldEntry {
            class,
            static_receiver,
            stamp,
            access: access.clone(),
        });
        Ok(access)
    }

    fn resolve_fresh(
        &self,
        registry: &MetaClassRegistry,
        class: &Arc<MetaClass>,
        static_receiver: bool,
        value: Option<&Value>,
    ) -> RuntimeResult<PropertyAccess> {
        let chain = registry.superclass_chain(class);
        for meta in &chain {
            if let Some(field) = meta.field(&self.name) {
                if field.is_static || !static_receiver {
                    return Ok(PropertyAccess::Field {
                        owner: meta.name().to_string(),
                        name: field.name,
                        descriptor: field.descriptor,
                        is_static: field.is_static,
                    });
                }
            }
        }

        let find = |method: &str, args: &[Value]| {
            class
                .select(registry, method, args, static_receiver)
                .or_else(|| overlay::find(registry, class, method, args, static_receiver))
                .or_else(|| {
                    chain
                        .iter()
                        .skip(1)
                        .find_map(|meta| meta.select(registry, method, args, static_receiver))
                })
        };
        let found = match self.mode {
            PropertyMode::Get => find(&accessor_name("get", &self.name), &[])
                .or_else(|| find(&accessor_name("is", &self.name), &[]))
                .map(PropertyAccess::Getter),
            PropertyMode::Set => {
                let arg = value.cloned().unwrap_or_default();
                find(&accessor_name("set", &self.name), &[arg]).map(PropertyAccess::Setter)
            }
        };
        found.ok_or_else(|| RuntimeError::NoSuchProperty {
            receiver: class.name().to_string(),
            property: self.name.clone(),
        })
    }

    /// Read the property from `receiver`
    pub fn get(&self, invoker: &mut dyn Invoker, receiver: &Value) -> RuntimeResult<Value> {
        let access = self.resolve(invoker.registry(), receiver, None)?;
        match access {
            PropertyAccess::Field {
                owner,
                name,
                descriptor,
                is_static,
            } => {
                if is_static {
                    let class = invoker.registry().require(&owner)?;
                    return Ok(class.get_static(&name).unwrap_or_else(|| default_boxed(&descriptor)));
                }
                match receiver {
                    Value::Object(instance) => Ok(instance.get(&name).unwrap_or_else(|| default_boxed(&descriptor))),
                    other => Err(RuntimeError::NoSuchProperty {
                        receiver: other.class_name().to_string(),
                        property: name,
                    }),
                }
            }
            PropertyAccess::Getter(target) => invoke(invoker, &target, receiver, &[]),
            PropertyAccess::Setter(_) => Err(RuntimeError::NoSuchProperty {
                receiver: receiver.class_name().to_string(),
                property: self.name.clone(),
            }),
        }
    }

    /// Write `value` to the property of `receiver`
    pub fn set(&self, invoker: &mut dyn Invoker, receiver: &Value, value: Value) -> RuntimeResult<()> {
        let access = self.resolve(invoker.registry(), receiver, Some(&value))?;
        match access {
            PropertyAccess::Field {
                owner,
                name,
                descriptor,
                is_static,
            } => {
                let stored = box_for(unbox_for(value, &descriptor)?, &descriptor)?;
                if is_static {
                    invoker.registry().require(&owner)?.set_static(&name, stored);
                    return Ok(());
                }
                match receiver {
                    Value::Object(instance) => {
                        instance.set(&name, stored);
                        Ok(())
                    }
                    other => Err(RuntimeError::NoSuchProperty {
                        receiver: other.class_name().to_string(),
                        property: name,
                    }),
                }
            }
            PropertyAccess::Setter(target) => invoke(invoker, &target, receiver, &[value]).map(|_| ()),
            PropertyAccess::Getter(_) => Err(RuntimeError::NoSuchProperty {
                receiver: receiver.class_name().to_string(),
                property: self.name.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoke::NativeInvoker;
    use crate::metaclass::FieldSlot;
    use crate::value::Instance;
    use rustc_hash::FxHashMap;

    fn point_registry() -> MetaClassRegistry {
        let registry = MetaClassRegistry::with_builtins();
        let point = MetaClass::new("Point", Some("Object"));
        point.add_field(FieldSlot {
            name: "x".into(),
            descriptor: "int".into(),
            is_static: false,
        });
        point.add_field(FieldSlot {
            name: "origin".into(),
            descriptor: "boolean".into(),
            is_static: true,
        });
        point.add_method(MethodTarget::native("Point", "getLabel", &[], "String", |_, _, _| {
            Ok(Value::string("p"))
        }));
        registry.register(Arc::new(point));
        registry
    }

    fn point() -> Value {
        let mut fields = FxHashMap::default();
        fields.insert("x".to_string(), Value::Int(0));
        Value::Object(Arc::new(Instance::new("Point", fields)))
    }

    #[test]
    fn test_field_read_and_write() {
        let registry = point_registry();
        let mut invoker = NativeInvoker::new(&registry);
        let p = point();
        let write = FieldSite::new("x", PropertyMode::Set);
        write.set(&mut invoker, &p, Value::Long(12)).unwrap();
        let read = FieldSite::new("x", PropertyMode::Get);
        assert!(matches!(read.get(&mut invoker, &p).unwrap(), Value::Int(12)));
        assert!(matches!(read.get(&mut invoker, &p).unwrap(), Value::Int(12)));
        assert_eq!(read.hits(), 1);
    }

    #[test]
    fn test_static_field_through_class_receiver() {
        let registry = point_registry();
        let mut invoker = NativeInvoker::new(&registry);
        let class = Value::class("Point");
        FieldSite::new("origin", PropertyMode::Set)
            .set(&mut invoker, &class, Value::Int(1))
            .unwrap();
        let value = FieldSite::new("origin", PropertyMode::Get).get(&mut invoker, &class).unwrap();
        assert!(matches!(value, Value::Boolean(true)));
        assert!(FieldSite::new("x", PropertyMode::Get).get(&mut invoker, &class).is_err());
    }

    #[test]
    fn test_getter_fallback_and_missing_property() {
        let registry = point_registry();
        let mut invoker = NativeInvoker::new(&registry);
        let label = FieldSite::new("label", PropertyMode::Get).get(&mut invoker, &point()).unwrap();
        assert_eq!(label.to_string(), "p");
        let err = FieldSite::new("z", PropertyMode::Get).get(&mut invoker, &point()).unwrap_err();
        assert_eq!(err.to_string(), "No such property: z for class: Point");
        let range = Value::Range(Arc::new(crate::range::ObjectRange::new(Value::Int(1), Value::Int(3)).unwrap()));
        let from = FieldSite::new("from", PropertyMode::Get).get(&mut invoker, &range).unwrap();
        assert!(from.equals(&Value::Int(1)));
    }

    #[test]
    fn test_new_field_invalidates_cached_getter() {
        let registry = point_registry();
        let mut invoker = NativeInvoker::new(&registry);
        let p = point();
        let site = FieldSite::new("label", PropertyMode::Get);
        site.get(&mut invoker, &p).unwrap();
        registry.require("Point").unwrap().add_field(FieldSlot {
            name: "label".into(),
            descriptor: "String".into(),
            is_static: false,
        });
        assert!(site.get(&mut invoker, &p).unwrap().is_null());
        assert_eq!(site.hits(), 0);
    }

    #[test]
    fn test_accessor_names() {
        assert_eq!(accessor_name("get", "name"), "getName");
        assert_eq!(accessor_name("is", "empty"), "isEmpty");
    }
}
