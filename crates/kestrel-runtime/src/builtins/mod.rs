//! Built-in classes and their native methods
//!
//! Every method the checker treats as built in has a native counterpart
//! here, so statically bound and dynamically dispatched calls reach the
//! same behavior.

mod collections;
mod helpers;
mod lang;

pub use helpers::{display, iterate};

use crate::invoke::Invoker;
use crate::metaclass::{MetaClass, MethodTarget};
use crate::registry::MetaClassRegistry;
use crate::value::Value;
use crate::{RuntimeError, RuntimeResult};
use std::sync::Arc;
use tracing::debug;

/// Register every built-in class
pub fn install(registry: &MetaClassRegistry) {
    lang::install(registry);
    collections::install(registry);
    helpers::install(registry);
    debug!(classes = registry.len(), "builtin classes installed");
}

fn define(registry: &MetaClassRegistry, name: &str, superclass: Option<&str>, interfaces: &[&str]) -> Arc<MetaClass> {
    let class = Arc::new(MetaClass::new(name, superclass).with_interfaces(interfaces));
    registry.register(Arc::clone(&class));
    class
}

fn native<F>(class: &MetaClass, name: &str, params: &[&str], return_type: &str, body: F)
where
    F: Fn(&mut dyn Invoker, &Value, &[Value]) -> RuntimeResult<Value> + Send + Sync + 'static,
{
    class.add_method(MethodTarget::native(class.name(), name, params, return_type, body));
}

fn static_native<F>(class: &MetaClass, name: &str, params: &[&str], return_type: &str, body: F)
where
    F: Fn(&mut dyn Invoker, &Value, &[Value]) -> RuntimeResult<Value> + Send + Sync + 'static,
{
    class.add_method(MethodTarget::native(class.name(), name, params, return_type, body).into_static());
}

fn arg(args: &[Value], index: usize) -> RuntimeResult<&Value> {
    args.get(index).ok_or_else(|| RuntimeError::IllegalArgument(format!("missing argument {}", index)))
}

fn index_arg(args: &[Value], index: usize) -> RuntimeResult<i64> {
    arg(args, index)?.to_index()
}

fn int_result(value: usize) -> Value {
    Value::Int(i32::try_from(value).unwrap_or(i32::MAX))
}

fn ordering_result(ordering: std::cmp::Ordering) -> Value {
    Value::Int(ordering as i32)
}
