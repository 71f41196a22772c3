//! Process-wide metaclass registry

use crate::builtins;
use crate::metaclass::MetaClass;
use crate::value::{single_char, Value};
use crate::{RuntimeError, RuntimeResult};
use dashmap::DashMap;
use kestrel_types::PrimitiveKind;
use once_cell::sync::Lazy;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Longest superclass chain followed before assuming a cycle
const MAX_CHAIN: usize = 64;

static GLOBAL: Lazy<Arc<MetaClassRegistry>> = Lazy::new(|| Arc::new(MetaClassRegistry::with_builtins()));

/// Metaclasses by name
///
/// The generation counter moves whenever a registered metaclass is
/// replaced, which invalidates every cached dispatch at once.
#[derive(Debug, Default)]
pub struct MetaClassRegistry {
    classes: DashMap<String, Arc<MetaClass>>,
    generation: AtomicU64,
}

/// Superclass chain pinned at the versions seen when it was captured
///
/// Checking it costs one atomic load per class and never touches the map.
/// Adding or removing a method anywhere in the chain, or replacing any
/// registered class, makes it stale.
#[derive(Debug, Clone)]
pub struct ChainStamp {
    generation: u64,
    versions: Vec<(Arc<MetaClass>, u64)>,
}

impl ChainStamp {
    /// Whether nothing in the chain has changed since capture
    pub fn is_current(&self, registry: &MetaClassRegistry) -> bool {
        registry.generation() == self.generation
            && self.versions.iter().all(|(meta, version)| meta.version() == *version)
    }

    /// Receiver class the chain starts at
    pub fn class(&self) -> Option<&Arc<MetaClass>> {
        self.versions.first().map(|(meta, _)| meta)
    }
}

impl MetaClassRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in classes
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        builtins::install(&registry);
        registry
    }

    /// Shared registry with the built-in classes
    pub fn global() -> Arc<MetaClassRegistry> {
        Arc::clone(&GLOBAL)
    }

    /// Add a metaclass, replacing any previous one with the same name
    pub fn register(&self, class: Arc<MetaClass>) -> Option<Arc<MetaClass>> {
        let name = class.name().to_string();
        let previous = self.classes.insert(name.clone(), class);
        if previous.is_some() {
            let generation = self.bump_generation();
            debug!(class = %name, generation, "metaclass replaced");
        }
        previous
    }

    /// Metaclass by name
    pub fn get(&self, name: &str) -> Option<Arc<MetaClass>> {
        self.classes.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Metaclass by name, failing when absent
    pub fn require(&self, name: &str) -> RuntimeResult<Arc<MetaClass>> {
        self.get(name).ok_or_else(|| RuntimeError::ClassNotFound(name.to_string()))
    }

    /// Whether `name` is registered
    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// Number of registered metaclasses
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Current registry generation
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Invalidate every cached dispatch
    pub fn bump_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Metaclass that dispatches calls on `value`
    ///
    /// A class literal is a static receiver: it dispatches to the named
    /// class and only sees static methods.
    pub fn class_of(&self, value: &Value) -> RuntimeResult<(Arc<MetaClass>, bool)> {
        match value {
            Value::Null => Err(RuntimeError::NullReceiver {
                member: "method".to_string(),
            }),
            Value::Class(name) => Ok((self.require(name)?, true)),
            other => Ok((self.require(other.class_name())?, false)),
        }
    }

    /// `class` followed by its registered superclasses
    pub fn superclass_chain(&self, class: &Arc<MetaClass>) -> Vec<Arc<MetaClass>> {
        let mut chain = vec![Arc::clone(class)];
        let mut current = Arc::clone(class);
        while let Some(parent) = current.superclass().and_then(|name| self.get(name)) {
            if chain.len() >= MAX_CHAIN || chain.iter().any(|c| Arc::ptr_eq(c, &parent)) {
                break;
            }
            chain.push(Arc::clone(&parent));
            current = parent;
        }
        chain
    }

    /// Versions of `class` and its superclasses as of now
    ///
    /// The generation is read first, so a replacement racing with the
    /// capture leaves the stamp already stale.
    pub fn stamp(&self, class: &Arc<MetaClass>) -> ChainStamp {
        let generation = self.generation();
        let versions = self
            .superclass_chain(class)
            .into_iter()
            .map(|meta| {
                let version = meta.version();
                (meta, version)
            })
            .collect();
        ChainStamp { generation, versions }
    }

    /// Whether `class` is `ancestor` or extends or implements it
    pub fn is_subclass(&self, class: &str, ancestor: &str) -> bool {
        if class == ancestor || ancestor == "Object" {
            return true;
        }
        let mut queue = VecDeque::from([class.to_string()]);
        let mut seen = Vec::new();
        while let Some(name) = queue.pop_front() {
            if name == ancestor {
                return true;
            }
            if seen.contains(&name) || seen.len() >= MAX_CHAIN {
                continue;
            }
            if let Some(meta) = self.get(&name) {
                queue.extend(meta.superclass().map(str::to_string));
                queue.extend(meta.interfaces().iter().cloned());
            }
            seen.push(name);
        }
        false
    }

    /// Whether `value` is an instance of the type `type_name`
    pub fn is_instance(&self, value: &Value, type_name: &str) -> bool {
        if value.is_null() {
            return false;
        }
        if matches!(type_name, "def" | "Object") {
            return true;
        }
        if let Some(component) = type_name.strip_suffix("[]") {
            return match value {
                Value::Array(array) => {
                    array.component() == component
                        || (PrimitiveKind::from_name(array.component()).is_none()
                            && PrimitiveKind::from_name(component).is_none()
                            && self.is_subclass(array.component(), component))
                }
                _ => false,
            };
        }
        match PrimitiveKind::from_name(type_name) {
            Some(PrimitiveKind::Boolean) => matches!(value, Value::Boolean(_)),
            Some(PrimitiveKind::Char) => match value {
                Value::Char(_) => true,
                Value::Str(s) => single_char(s).is_some(),
                _ => false,
            },
            Some(PrimitiveKind::Void) => false,
            Some(_) => value.is_numeric(),
            None => self.is_subclass(value.class_name(), type_name),
        }
    }
}
