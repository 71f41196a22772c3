//! Console output and the `Helpers` statics the emitter calls directly

use super::{arg, define, static_native};
use crate::callsite::resolve_uncached;
use crate::invoke::{call_method, invoke, Invoker};
use crate::metaclass::Implementation;
use crate::registry::MetaClassRegistry;
use crate::value::{ListCursor, Value, VecCursor};
use crate::RuntimeResult;
use std::sync::Arc;

pub(super) fn install(registry: &MetaClassRegistry) {
    let console = define(registry, "Console", Some("Object"), &[]);
    static_native(&console, "println", &["Object"], "void", |invoker, _, args| {
        let text = display(invoker, arg(args, 0)?)?;
        invoker.write_output(&format!("{}\n", text))?;
        Ok(Value::Null)
    });
    static_native(&console, "println", &[], "void", |invoker, _, _| {
        invoker.write_output("\n")?;
        Ok(Value::Null)
    });
    static_native(&console, "print", &["Object"], "void", |invoker, _, args| {
        let text = display(invoker, arg(args, 0)?)?;
        invoker.write_output(&text)?;
        Ok(Value::Null)
    });

    let helpers = define(registry, "Helpers", Some("Object"), &[]);
    static_native(&helpers, "iterator", &["Object"], "Iterator", |invoker, _, args| {
        iterate(invoker, arg(args, 0)?)
    });
    static_native(&helpers, "concat", &["Object", "Object"], "String", |invoker, _, args| {
        let left = display(invoker, arg(args, 0)?)?;
        let right = display(invoker, arg(args, 1)?)?;
        Ok(Value::from(left + &right))
    });
    static_native(&helpers, "equals", &["Object", "Object"], "boolean", |invoker, _, args| {
        equals(invoker, arg(args, 0)?, arg(args, 1)?).map(Value::Boolean)
    });
}

/// Text of a value as printed, using a user-defined `toString`
pub fn display(invoker: &mut dyn Invoker, value: &Value) -> RuntimeResult<String> {
    match value {
        Value::Object(_) => Ok(call_method(invoker, value, "toString", &[])?.to_string()),
        Value::List(_) | Value::Tuple(_) => {
            let elements = value.sequence()?.unwrap_or_default();
            let parts = elements
                .iter()
                .map(|element| display(invoker, element))
                .collect::<RuntimeResult<Vec<_>>>()?;
            Ok(format!("[{}]", parts.join(", ")))
        }
        other => Ok(other.to_string()),
    }
}

/// Equality that honors a user-defined `equals` on the left operand
fn equals(invoker: &mut dyn Invoker, left: &Value, right: &Value) -> RuntimeResult<bool> {
    if let Value::Object(_) = left {
        let args = [right.clone()];
        let target = resolve_uncached(invoker.registry(), left, "equals", &args)?;
        if let Implementation::Bytecode { .. } = target.implementation {
            return Ok(invoke(invoker, &target, left, &args)?.is_truthy());
        }
    }
    Ok(left.equals(right))
}

/// Iterator over anything a `for` loop accepts
///
/// Null iterates as empty. A value that is neither a sequence nor
/// iterable iterates as itself, once.
pub fn iterate(invoker: &mut dyn Invoker, value: &Value) -> RuntimeResult<Value> {
    Ok(match value {
        Value::Null => Value::iterator(VecCursor::new(Vec::new())),
        Value::List(list) => Value::iterator(ListCursor::new(Arc::clone(list))),
        Value::Range(range) => Value::iterator(range.step_cursor(1)?),
        Value::Tuple(_) | Value::Array(_) => Value::iterator(VecCursor::new(value.sequence()?.unwrap_or_default())),
        Value::Str(s) => Value::iterator(VecCursor::new(s.chars().map(|c| Value::from(c.to_string())).collect())),
        Value::Iterator(_) => value.clone(),
        Value::Enumeration(cursor) => Value::Iterator(Arc::clone(cursor)),
        Value::Object(instance) => {
            let registry = invoker.registry();
            if registry.is_subclass(instance.class(), "Iterator") {
                value.clone()
            } else if registry
                .superclass_chain(&registry.require(instance.class())?)
                .iter()
                .any(|class| !class.methods("iterator", 0).is_empty())
            {
                call_method(invoker, value, "iterator", &[])?
            } else {
                Value::iterator(VecCursor::new(vec![value.clone()]))
            }
        }
        other => Value::iterator(VecCursor::new(vec![other.clone()])),
    })
}
