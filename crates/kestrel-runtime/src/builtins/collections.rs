//! Lists, ranges, tuples, arrays, iterators and closures

use super::lang::normalize_index;
use super::{arg, define, index_arg, int_result, native};
use crate::builtins::iterate;
use crate::range::ObjectRange;
use crate::registry::MetaClassRegistry;
use crate::tuple::Tuple;
use crate::value::{exhausted, CursorRef, ListRef, Value};
use crate::{RuntimeError, RuntimeResult};
use std::sync::Arc;

pub(super) fn install(registry: &MetaClassRegistry) {
    define(registry, "Collection", Some("Object"), &["Iterable"]);
    install_list(registry);
    install_range(registry);
    install_tuple(registry);
    install_array(registry);
    install_cursors(registry);
    install_closure(registry);
}

fn elements(receiver: &Value) -> RuntimeResult<Vec<Value>> {
    receiver
        .sequence()?
        .ok_or_else(|| receiver.cast_error("List"))
}

fn mutable(receiver: &Value) -> RuntimeResult<&ListRef> {
    match receiver {
        Value::List(list) => Ok(list),
        other => Err(RuntimeError::Unsupported(format!(
            "Cannot modify an immutable {}",
            other.class_name()
        ))),
    }
}

fn element_at(values: &[Value], index: i64) -> RuntimeResult<Value> {
    Ok(values[normalize_index(index, values.len())?].clone())
}

fn install_list(registry: &MetaClassRegistry) {
    let list = define(registry, "List", Some("Object"), &["Collection", "Iterable"]);
    native(&list, "size", &[], "int", |_, receiver, _| Ok(int_result(elements(receiver)?.len())));
    native(&list, "isEmpty", &[], "boolean", |_, receiver, _| {
        Ok(Value::Boolean(elements(receiver)?.is_empty()))
    });
    native(&list, "contains", &["Object"], "boolean", |_, receiver, args| {
        let needle = arg(args, 0)?;
        Ok(Value::Boolean(elements(receiver)?.iter().any(|e| e.equals(needle))))
    });
    native(&list, "get", &["int"], "Object", |_, receiver, args| {
        let values = elements(receiver)?;
        let index = index_arg(args, 0)?;
        usize::try_from(index)
            .ok()
            .and_then(|i| values.get(i))
            .cloned()
            .ok_or(RuntimeError::IndexOutOfBounds {
                index,
                size: values.len(),
            })
    });
    native(&list, "getAt", &["Object"], "Object", |_, receiver, args| {
        let values = elements(receiver)?;
        match arg(args, 0)? {
            Value::Range(range) => {
                let picked = range
                    .to_vec()?
                    .iter()
                    .map(|index| element_at(&values, index.to_index()?))
                    .collect::<RuntimeResult<Vec<_>>>()?;
                Ok(Value::list(picked))
            }
            index => element_at(&values, index.to_index()?),
        }
    });
    native(&list, "first", &[], "Object", |_, receiver, _| element_at(&elements(receiver)?, 0));
    native(&list, "last", &[], "Object", |_, receiver, _| element_at(&elements(receiver)?, -1));
    native(&list, "set", &["int", "Object"], "Object", |_, receiver, args| {
        let mut values = mutable(receiver)?.write();
        let index = index_arg(args, 0)?;
        let size = values.len();
        let slot = usize::try_from(index)
            .ok()
            .and_then(|i| values.get_mut(i))
            .ok_or(RuntimeError::IndexOutOfBounds { index, size })?;
        Ok(std::mem::replace(slot, arg(args, 1)?.clone()))
    });
    native(&list, "putAt", &["Object", "Object"], "void", |_, receiver, args| {
        let mut values = mutable(receiver)?.write();
        let index = index_arg(args, 0)?;
        let value = arg(args, 1)?.clone();
        if index >= 0 && index as usize >= values.len() {
            // Writing past the end pads with nulls
            values.resize(index as usize, Value::Null);
            values.push(value);
        } else {
            let at = normalize_index(index, values.len())?;
            values[at] = value;
        }
        Ok(Value::Null)
    });
    native(&list, "add", &["Object"], "boolean", |_, receiver, args| {
        mutable(receiver)?.write().push(arg(args, 0)?.clone());
        Ok(Value::Boolean(true))
    });
    native(&list, "remove", &["int"], "Object", |_, receiver, args| {
        let mut values = mutable(receiver)?.write();
        let at = normalize_index(index_arg(args, 0)?, values.len())?;
        Ok(values.remove(at))
    });
    native(&list, "plus", &["Object"], "List", |_, receiver, args| {
        let mut values = elements(receiver)?;
        let other = arg(args, 0)?;
        match other.sequence()? {
            Some(more) => values.extend(more),
            None => values.push(other.clone()),
        }
        Ok(Value::list(values))
    });
    native(&list, "join", &["String"], "String", |invoker, receiver, args| {
        let separator = arg(args, 0)?.to_string();
        let parts = elements(receiver)?
            .iter()
            .map(|value| super::display(invoker, value))
            .collect::<RuntimeResult<Vec<_>>>()?;
        Ok(Value::from(parts.join(&separator)))
    });
    native(&list, "iterator", &[], "Iterator", |invoker, receiver, _| iterate(invoker, receiver));
}

fn range_of(receiver: &Value) -> RuntimeResult<&Arc<ObjectRange>> {
    match receiver {
        Value::Range(range) => Ok(range),
        other => Err(other.cast_error("Range")),
    }
}

fn install_range(registry: &MetaClassRegistry) {
    let range = define(registry, "Range", Some("List"), &[]);
    native(&range, "getFrom", &[], "Object", |_, receiver, _| Ok(range_of(receiver)?.from().clone()));
    native(&range, "getTo", &[], "Object", |_, receiver, _| Ok(range_of(receiver)?.to().clone()));
    native(&range, "isReverse", &[], "boolean", |_, receiver, _| {
        Ok(Value::Boolean(range_of(receiver)?.is_reverse()))
    });
    native(&range, "size", &[], "int", |_, receiver, _| Ok(int_result(range_of(receiver)?.size()?)));
    native(&range, "get", &["int"], "Object", |_, receiver, args| {
        range_of(receiver)?.get(index_arg(args, 0)?)
    });
    native(&range, "getAt", &["int"], "Object", |_, receiver, args| {
        range_of(receiver)?.get(index_arg(args, 0)?)
    });
    native(&range, "contains", &["Object"], "boolean", |_, receiver, args| {
        Ok(Value::Boolean(range_of(receiver)?.contains(arg(args, 0)?)?))
    });
    native(&range, "containsWithinBounds", &["Object"], "boolean", |_, receiver, args| {
        Ok(Value::Boolean(range_of(receiver)?.contains_within_bounds(arg(args, 0)?)?))
    });
    native(&range, "step", &["int"], "List", |_, receiver, args| {
        let step = i32::try_from(index_arg(args, 0)?)
            .map_err(|_| RuntimeError::IllegalArgument("step out of range".to_string()))?;
        Ok(Value::list(range_of(receiver)?.step(step)?))
    });
    native(&range, "subList", &["int", "int"], "Range", |_, receiver, args| {
        let sub = range_of(receiver)?.sub_list(index_arg(args, 0)?, index_arg(args, 1)?)?;
        Ok(Value::Range(Arc::new(sub)))
    });
}

fn install_tuple(registry: &MetaClassRegistry) {
    let tuple = define(registry, "Tuple", Some("List"), &["Comparable"]);
    let tuple_of = |receiver: &Value| -> RuntimeResult<Arc<Tuple>> {
        match receiver {
            Value::Tuple(tuple) => Ok(Arc::clone(tuple)),
            other => Err(other.cast_error("Tuple")),
        }
    };
    native(&tuple, "subTuple", &["int", "int"], "Tuple", move |_, receiver, args| {
        let sub = tuple_of(receiver)?.sub_tuple(index_arg(args, 0)?, index_arg(args, 1)?)?;
        Ok(Value::Tuple(Arc::new(sub)))
    });
    native(&tuple, "compareTo", &["Object"], "int", |_, receiver, args| {
        Ok(super::ordering_result(receiver.compare(arg(args, 0)?)?))
    });
}

fn install_array(registry: &MetaClassRegistry) {
    let array = define(registry, "Array", Some("Object"), &["Iterable"]);
    let array_of = |receiver: &Value| match receiver {
        Value::Array(array) => Ok(Arc::clone(array)),
        other => Err(other.cast_error("Array")),
    };
    native(&array, "size", &[], "int", move |_, receiver, _| Ok(int_result(array_of(receiver)?.len())));
    native(&array, "getLength", &[], "int", move |_, receiver, _| Ok(int_result(array_of(receiver)?.len())));
    native(&array, "getAt", &["int"], "Object", move |_, receiver, args| {
        let array = array_of(receiver)?;
        let at = normalize_index(index_arg(args, 0)?, array.len())?;
        array.get_boxed(at as i64)
    });
    native(&array, "putAt", &["int", "Object"], "void", move |_, receiver, args| {
        let array = array_of(receiver)?;
        let at = normalize_index(index_arg(args, 0)?, array.len())?;
        array.set_boxed(at as i64, arg(args, 1)?.clone())?;
        Ok(Value::Null)
    });
    native(&array, "contains", &["Object"], "boolean", move |_, receiver, args| {
        let needle = arg(args, 0)?;
        Ok(Value::Boolean(array_of(receiver)?.boxed_elements()?.iter().any(|e| e.equals(needle))))
    });
    native(&array, "iterator", &[], "Iterator", |invoker, receiver, _| iterate(invoker, receiver));
}

fn cursor_of(receiver: &Value) -> RuntimeResult<&CursorRef> {
    match receiver {
        Value::Iterator(cursor) | Value::Enumeration(cursor) => Ok(cursor),
        other => Err(other.cast_error("Iterator")),
    }
}

fn has_next(receiver: &Value) -> RuntimeResult<Value> {
    Ok(Value::Boolean(cursor_of(receiver)?.lock().has_next()?))
}

fn next_value(receiver: &Value) -> RuntimeResult<Value> {
    let mut cursor = cursor_of(receiver)?.lock();
    if !cursor.has_next()? {
        return Err(exhausted());
    }
    cursor.next_value()
}

fn install_cursors(registry: &MetaClassRegistry) {
    let iterator = define(registry, "Iterator", Some("Object"), &["Iterable"]);
    native(&iterator, "hasNext", &[], "boolean", |_, receiver, _| has_next(receiver));
    native(&iterator, "next", &[], "Object", |_, receiver, _| next_value(receiver));
    native(&iterator, "iterator", &[], "Iterator", |_, receiver, _| Ok(receiver.clone()));

    let enumeration = define(registry, "Enumeration", Some("Object"), &[]);
    native(&enumeration, "hasMoreElements", &[], "boolean", |_, receiver, _| has_next(receiver));
    native(&enumeration, "nextElement", &[], "Object", |_, receiver, _| next_value(receiver));
    native(&enumeration, "iterator", &[], "Iterator", |_, receiver, _| match receiver {
        Value::Enumeration(cursor) => Ok(Value::Iterator(Arc::clone(cursor))),
        other => Err(other.cast_error("Enumeration")),
    });
}

fn install_closure(registry: &MetaClassRegistry) {
    let closure = define(registry, "Closure", Some("Object"), &[]);
    closure.add_method(
        crate::metaclass::MethodTarget::native("Closure", "call", &[], "Object", |invoker, receiver, args| {
            match receiver {
                Value::Closure(closure) => invoker.call_closure(closure, args),
                other => Err(other.cast_error("Closure")),
            }
        })
        .into_variadic(),
    );
    native(&closure, "getMaximumNumberOfParameters", &[], "int", |_, receiver, _| match receiver {
        Value::Closure(closure) => Ok(int_result(closure.param_count())),
        other => Err(other.cast_error("Closure")),
    });
}

#[cfg(test)]
mod tests {
    use crate::invoke::{call_method, NativeInvoker};
    use crate::registry::MetaClassRegistry;
    use crate::value::{ArrayValue, Value, VecCursor};
    use std::sync::Arc;

    #[test]
    fn test_put_at_pads_lists() {
        let registry = MetaClassRegistry::with_builtins();
        let mut invoker = NativeInvoker::new(&registry);
        let list = Value::list(vec![Value::Int(1)]);
        call_method(&mut invoker, &list, "putAt", &[Value::Int(3), Value::Int(4)]).unwrap();
        assert_eq!(list.to_string(), "[1, null, null, 4]");
        call_method(&mut invoker, &list, "putAt", &[Value::Int(-1), Value::Int(5)]).unwrap();
        assert_eq!(list.to_string(), "[1, null, null, 5]");
    }

    #[test]
    fn test_array_access_boxes() {
        let registry = MetaClassRegistry::with_builtins();
        let mut invoker = NativeInvoker::new(&registry);
        let array = Value::Array(Arc::new(ArrayValue::new("char", 2)));
        call_method(&mut invoker, &array, "putAt", &[Value::Int(0), Value::string("k")]).unwrap();
        let first = call_method(&mut invoker, &array, "getAt", &[Value::Int(0)]).unwrap();
        assert!(matches!(first, Value::Char('k')));
        let length = call_method(&mut invoker, &array, "getLength", &[]).unwrap();
        assert!(matches!(length, Value::Int(2)));
    }

    #[test]
    fn test_iterator_protocol() {
        let registry = MetaClassRegistry::with_builtins();
        let mut invoker = NativeInvoker::new(&registry);
        let iterator = Value::iterator(VecCursor::new(vec![Value::Int(1)]));
        let more = call_method(&mut invoker, &iterator, "hasNext", &[]).unwrap();
        assert!(more.is_truthy());
        assert!(call_method(&mut invoker, &iterator, "next", &[]).unwrap().equals(&Value::Int(1)));
        assert!(call_method(&mut invoker, &iterator, "next", &[]).is_err());

        let enumeration = Value::enumeration(VecCursor::new(vec![Value::string("e")]));
        let element = call_method(&mut invoker, &enumeration, "nextElement", &[]).unwrap();
        assert_eq!(element.to_string(), "e");
    }

    #[test]
    fn test_list_index_by_range() {
        let registry = MetaClassRegistry::with_builtins();
        let mut invoker = NativeInvoker::new(&registry);
        let list = Value::list(vec![Value::Int(10), Value::Int(20), Value::Int(30)]);
        let range = Value::Range(Arc::new(
            crate::range::ObjectRange::new(Value::Int(1), Value::Int(2)).unwrap(),
        ));
        let picked = call_method(&mut invoker, &list, "getAt", &[range]).unwrap();
        assert_eq!(picked.to_string(), "[20, 30]");
    }
}
