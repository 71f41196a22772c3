//! Metaclasses: versioned method and field tables
//!
//! Every change to a metaclass's tables increments its metadata version.
//! Call sites stamp cached entries with that version and treat any
//! difference as a miss.

use crate::invoke::Invoker;
use crate::registry::MetaClassRegistry;
use crate::value::Value;
use crate::RuntimeResult;
use kestrel_bytecode::MethodDescriptor;
use kestrel_types::PrimitiveKind;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Native method body: `(invoker, receiver, args) -> result`
pub type NativeFn = Arc<dyn Fn(&mut dyn Invoker, &Value, &[Value]) -> RuntimeResult<Value> + Send + Sync>;

/// How a method target runs
#[derive(Clone)]
pub enum Implementation {
    /// Rust function
    Native(NativeFn),
    /// Method of a loaded class, by index into its method table
    Bytecode {
        /// Index into the owner's methods
        method: usize,
    },
    /// Forward to a missing-method hook as `(name, [args])`
    MissingMethod(Arc<MethodTarget>),
}

impl fmt::Debug for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Implementation::Native(_) => f.write_str("Native"),
            Implementation::Bytecode { method } => write!(f, "Bytecode({})", method),
            Implementation::MissingMethod(hook) => write!(f, "MissingMethod({}.{})", hook.owner, hook.name),
        }
    }
}

/// A resolved, invocable method
#[derive(Debug, Clone)]
pub struct MethodTarget {
    /// Declaring class
    pub owner: String,
    /// Method name
    pub name: String,
    /// Parameter type names
    pub params: Vec<String>,
    /// Return type name
    pub return_type: String,
    /// Whether the method ignores its receiver
    pub is_static: bool,
    /// Whether the method takes any number of arguments
    pub variadic: bool,
    /// Body
    pub implementation: Implementation,
}

impl MethodTarget {
    /// Native instance method
    pub fn native<F>(owner: &str, name: &str, params: &[&str], return_type: &str, body: F) -> Self
    where
        F: Fn(&mut dyn Invoker, &Value, &[Value]) -> RuntimeResult<Value> + Send + Sync + 'static,
    {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
            params: params.iter().map(|p| p.to_string()).collect(),
            return_type: return_type.to_string(),
            is_static: false,
            variadic: false,
            implementation: Implementation::Native(Arc::new(body)),
        }
    }

    /// Method of a loaded class
    pub fn bytecode(owner: &str, name: &str, descriptor: &MethodDescriptor, is_static: bool, method: usize) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
            params: descriptor.params.clone(),
            return_type: descriptor.return_type.clone(),
            is_static,
            variadic: false,
            implementation: Implementation::Bytecode { method },
        }
    }

    /// Target that forwards `name` to a missing-method hook
    pub fn missing(name: &str, hook: Arc<MethodTarget>) -> Self {
        Self {
            owner: hook.owner.clone(),
            name: name.to_string(),
            params: Vec::new(),
            return_type: "Object".to_string(),
            is_static: hook.is_static,
            variadic: true,
            implementation: Implementation::MissingMethod(hook),
        }
    }

    /// Mark as static
    pub fn into_static(mut self) -> Self {
        self.is_static = true;
        self
    }

    /// Accept any number of arguments
    pub fn into_variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    /// Declared parameter count
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// `(param,...)return` form
    pub fn descriptor(&self) -> String {
        format!("({}){}", self.params.join(","), self.return_type)
    }

    /// Whether the arguments fit the declared parameter types
    pub fn accepts(&self, registry: &MetaClassRegistry, args: &[Value]) -> bool {
        if self.variadic {
            return true;
        }
        self.params.len() == args.len()
            && self
                .params
                .iter()
                .zip(args)
                .all(|(param, arg)| param_accepts(registry, param, arg))
    }

    /// Parameters narrower than `Object`; more specific overloads win
    fn specificity(&self) -> usize {
        self.params.iter().filter(|p| !matches!(p.as_str(), "Object" | "def")).count()
    }
}

fn param_accepts(registry: &MetaClassRegistry, param: &str, arg: &Value) -> bool {
    match PrimitiveKind::from_name(param) {
        Some(PrimitiveKind::Boolean) => matches!(arg, Value::Boolean(_) | Value::Int(_)),
        Some(_) => arg.is_numeric(),
        None if arg.is_null() => true,
        None => registry.is_instance(arg, param),
    }
}

/// Key of a method table entry; variadic methods have no arity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodKey {
    /// Method name
    pub name: String,
    /// Parameter count
    pub arity: Option<usize>,
}

impl MethodKey {
    /// Key for a fixed arity
    pub fn new(name: &str, arity: usize) -> Self {
        Self {
            name: name.to_string(),
            arity: Some(arity),
        }
    }

    fn of(target: &MethodTarget) -> Self {
        Self {
            name: target.name.clone(),
            arity: if target.variadic { None } else { Some(target.arity()) },
        }
    }
}

/// Declared field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSlot {
    /// Field name
    pub name: String,
    /// Type name
    pub descriptor: String,
    /// Whether the field belongs to the class
    pub is_static: bool,
}

/// Runtime class metadata
pub struct MetaClass {
    name: String,
    superclass: Option<String>,
    interfaces: Vec<String>,
    methods: RwLock<FxHashMap<MethodKey, Vec<Arc<MethodTarget>>>>,
    fields: RwLock<Vec<FieldSlot>>,
    statics: Mutex<FxHashMap<String, Value>>,
    missing_method: RwLock<Option<Arc<MethodTarget>>>,
    version: AtomicU64,
}

impl fmt::Debug for MetaClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetaClass")
            .field("name", &self.name)
            .field("superclass", &self.superclass)
            .field("version", &self.version())
            .finish()
    }
}

impl MetaClass {
    /// Empty metaclass
    pub fn new(name: &str, superclass: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            superclass: superclass.map(str::to_string),
            interfaces: Vec::new(),
            methods: RwLock::new(FxHashMap::default()),
            fields: RwLock::new(Vec::new()),
            statics: Mutex::new(FxHashMap::default()),
            missing_method: RwLock::new(None),
            version: AtomicU64::new(0),
        }
    }

    /// Declare implemented interfaces
    pub fn with_interfaces(mut self, interfaces: &[&str]) -> Self {
        self.interfaces = interfaces.iter().map(|i| i.to_string()).collect();
        self
    }

    /// Class name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Direct superclass name
    pub fn superclass(&self) -> Option<&str> {
        self.superclass.as_deref()
    }

    /// Implemented interface names
    pub fn interfaces(&self) -> &[String] {
        &self.interfaces
    }

    /// Current metadata version
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Force cached entries stamped with this class to miss
    pub fn bump_version(&self) -> u64 {
        let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(class = %self.name, version, "metaclass version bumped");
        version
    }

    /// Add a method, replacing one with the same name and parameter types
    pub fn add_method(&self, target: MethodTarget) -> Arc<MethodTarget> {
        let target = Arc::new(target);
        {
            let mut methods = self.methods.write();
            let overloads = methods.entry(MethodKey::of(&target)).or_default();
            overloads.retain(|m| m.params != target.params || m.is_static != target.is_static);
            overloads.push(Arc::clone(&target));
        }
        debug!(class = %self.name, method = %target.name, arity = target.arity(), "method added");
        self.bump_version();
        target
    }

    /// Remove every overload of `name` with `arity` parameters
    pub fn remove_method(&self, name: &str, arity: usize) -> usize {
        let removed = self
            .methods
            .write()
            .remove(&MethodKey::new(name, arity))
            .map(|overloads| overloads.len())
            .unwrap_or(0);
        if removed > 0 {
            debug!(class = %self.name, method = name, arity, "method removed");
            self.bump_version();
        }
        removed
    }

    /// Overloads declared directly on this class, fixed arity first
    pub fn methods(&self, name: &str, arity: usize) -> Vec<Arc<MethodTarget>> {
        let methods = self.methods.read();
        let mut found: Vec<Arc<MethodTarget>> = methods
            .get(&MethodKey::new(name, arity))
            .cloned()
            .unwrap_or_default();
        if let Some(variadic) = methods.get(&MethodKey {
            name: name.to_string(),
            arity: None,
        }) {
            found.extend(variadic.iter().cloned());
        }
        found
    }

    /// Whether any overload of `name` is declared here
    pub fn has_method(&self, name: &str) -> bool {
        self.methods.read().keys().any(|key| key.name == name)
    }

    /// Number of declared methods
    pub fn method_count(&self) -> usize {
        self.methods.read().values().map(Vec::len).sum()
    }

    /// Most specific declared overload accepting `args`
    ///
    /// A class receiver only sees static methods.
    pub fn select(
        &self,
        registry: &MetaClassRegistry,
        name: &str,
        args: &[Value],
        static_only: bool,
    ) -> Option<Arc<MethodTarget>> {
        let mut best: Option<Arc<MethodTarget>> = None;
        for candidate in self.methods(name, args.len()) {
            if static_only && !candidate.is_static {
                continue;
            }
            if !candidate.accepts(registry, args) {
                continue;
            }
            let better = match &best {
                None => true,
                Some(current) => candidate.specificity() > current.specificity(),
            };
            if better {
                best = Some(candidate);
            }
        }
        best
    }

    /// Install or clear the missing-method hook
    pub fn set_missing_method(&self, hook: Option<MethodTarget>) {
        *self.missing_method.write() = hook.map(Arc::new);
        self.bump_version();
    }

    /// Missing-method hook, if declared
    pub fn missing_method(&self) -> Option<Arc<MethodTarget>> {
        self.missing_method.read().clone()
    }

    /// Declare a field
    pub fn add_field(&self, field: FieldSlot) {
        {
            let mut fields = self.fields.write();
            fields.retain(|f| f.name != field.name);
            fields.push(field);
        }
        self.bump_version();
    }

    /// Field declared directly on this class
    pub fn field(&self, name: &str) -> Option<FieldSlot> {
        self.fields.read().iter().find(|f| f.name == name).cloned()
    }

    /// Every declared field
    pub fn fields(&self) -> Vec<FieldSlot> {
        self.fields.read().clone()
    }

    /// Value of a static field
    pub fn get_static(&self, name: &str) -> Option<Value> {
        self.statics.lock().get(name).cloned()
    }

    /// Store a static field
    pub fn set_static(&self, name: &str, value: Value) {
        self.statics.lock().insert(name.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(owner: &str, name: &str, params: &[&str], result: i32) -> MethodTarget {
        MethodTarget::native(owner, name, params, "int", move |_, _, _| Ok(Value::Int(result)))
    }

    #[test]
    fn test_every_table_change_bumps_version() {
        let class = MetaClass::new("Widget", Some("Object"));
        assert_eq!(class.version(), 0);
        class.add_method(constant("Widget", "size", &[], 1));
        assert_eq!(class.version(), 1);
        class.add_field(FieldSlot {
            name: "count".into(),
            descriptor: "int".into(),
            is_static: false,
        });
        assert_eq!(class.version(), 2);
        assert_eq!(class.remove_method("size", 0), 1);
        assert_eq!(class.version(), 3);
        assert_eq!(class.remove_method("size", 0), 0);
        assert_eq!(class.version(), 3);
        class.set_static("LIMIT", Value::Int(3));
        assert_eq!(class.version(), 3);
    }

    #[test]
    fn test_same_signature_replaces() {
        let class = MetaClass::new("Widget", None);
        class.add_method(constant("Widget", "size", &[], 1));
        let replacement = class.add_method(constant("Widget", "size", &[], 2));
        assert_eq!(class.method_count(), 1);
        let found = class.methods("size", 0);
        assert!(Arc::ptr_eq(&found[0], &replacement));
    }

    #[test]
    fn test_select_prefers_specific_overloads() {
        let registry = MetaClassRegistry::with_builtins();
        let class = MetaClass::new("Printer", Some("Object"));
        class.add_method(constant("Printer", "show", &["Object"], 1));
        class.add_method(constant("Printer", "show", &["String"], 2));
        class.add_method(constant("Printer", "show", &["int"], 3));

        let pick = |arg: Value| {
            class
                .select(&registry, "show", &[arg], false)
                .map(|t| t.params[0].clone())
        };
        assert_eq!(pick(Value::string("x")).as_deref(), Some("String"));
        assert_eq!(pick(Value::Int(1)).as_deref(), Some("int"));
        assert_eq!(pick(Value::list(vec![])).as_deref(), Some("Object"));
        assert!(class.select(&registry, "show", &[], false).is_none());
        assert!(class.select(&registry, "show", &[Value::Int(1)], true).is_none());
    }

    #[test]
    fn test_variadic_matches_any_arity() {
        let registry = MetaClassRegistry::new();
        let class = MetaClass::new("Closure", None);
        class.add_method(constant("Closure", "call", &[], 0).into_variadic());
        assert!(class.select(&registry, "call", &[Value::Int(1), Value::Int(2)], false).is_some());
        assert!(class.has_method("call"));
    }
}
