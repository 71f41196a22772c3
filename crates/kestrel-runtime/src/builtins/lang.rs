//! Object, the numeric tower, characters, booleans and strings

use super::{arg, define, index_arg, int_result, native, ordering_result, static_native};
use crate::builtins::display;
use crate::numeric::{self, ArithOp};
use crate::registry::MetaClassRegistry;
use crate::value::Value;
use crate::{RuntimeError, RuntimeResult};
use kestrel_types::NumericKind;

const NUMBER_CLASSES: &[&str] = &[
    "Integer",
    "Long",
    "Short",
    "Byte",
    "Float",
    "Double",
    "BigInteger",
    "BigDecimal",
];

pub(super) fn install(registry: &MetaClassRegistry) {
    install_object(registry);
    for marker in ["Comparable", "CharSequence", "Iterable"] {
        define(registry, marker, Some("Object"), &[]);
    }
    define(registry, "Class", Some("Object"), &[]);
    define(registry, "Reference", Some("Object"), &[]);
    install_numbers(registry);
    install_character(registry);
    install_boolean(registry);
    install_string(registry);
}

fn install_object(registry: &MetaClassRegistry) {
    let object = define(registry, "Object", None, &[]);
    native(&object, "toString", &[], "String", |_, receiver, _| {
        Ok(Value::from(receiver.to_string()))
    });
    native(&object, "equals", &["Object"], "boolean", |_, receiver, args| {
        Ok(Value::Boolean(receiver.equals(arg(args, 0)?)))
    });
    native(&object, "hashCode", &[], "int", |_, receiver, _| Ok(Value::Int(receiver.hash_code())));
}

fn arithmetic(receiver: &Value, args: &[Value], op: ArithOp) -> RuntimeResult<Value> {
    let other = arg(args, 0)?;
    match (op, other) {
        (ArithOp::Add, Value::Str(s)) => Ok(Value::from(format!("{}{}", receiver, s))),
        _ => numeric::arithmetic(op, receiver, other),
    }
}

fn compare_to(receiver: &Value, args: &[Value]) -> RuntimeResult<Value> {
    Ok(ordering_result(receiver.compare(arg(args, 0)?)?))
}

fn install_arithmetic(class: &crate::metaclass::MetaClass) {
    for op in [ArithOp::Add, ArithOp::Sub, ArithOp::Mul, ArithOp::Div, ArithOp::Rem] {
        native(class, op.method_name(), &["Object"], "Object", move |_, receiver, args| {
            arithmetic(receiver, args, op)
        });
    }
    native(class, "negative", &[], "Object", |_, receiver, _| numeric::negate(receiver));
    native(class, "next", &[], "Object", |_, receiver, _| numeric::next(receiver));
    native(class, "previous", &[], "Object", |_, receiver, _| numeric::previous(receiver));
    native(class, "compareTo", &["Object"], "int", |_, receiver, args| compare_to(receiver, args));
}

fn install_numbers(registry: &MetaClassRegistry) {
    let number = define(registry, "Number", Some("Object"), &["Comparable"]);
    install_arithmetic(&number);
    let conversions = [
        ("intValue", "int", NumericKind::Int),
        ("longValue", "long", NumericKind::Long),
        ("floatValue", "float", NumericKind::Float),
        ("doubleValue", "double", NumericKind::Double),
    ];
    for (name, return_type, kind) in conversions {
        native(&number, name, &[], return_type, move |_, receiver, _| {
            numeric::convert(receiver, kind)
        });
    }
    native(&number, "abs", &[], "Object", |_, receiver, _| {
        match numeric::compare(receiver, &Value::Int(0)) {
            Some(std::cmp::Ordering::Less) => numeric::negate(receiver),
            _ => Ok(receiver.clone()),
        }
    });

    for name in NUMBER_CLASSES {
        define(registry, name, Some("Number"), &[]);
    }
    if let Some(integer) = registry.get("Integer") {
        static_native(&integer, "parseInt", &["String"], "int", |_, _, args| {
            let text = arg(args, 0)?.to_string();
            text.trim()
                .parse::<i32>()
                .map(Value::Int)
                .map_err(|_| RuntimeError::IllegalArgument(format!("For input string: \"{}\"", text)))
        });
    }
}

fn install_character(registry: &MetaClassRegistry) {
    let character = define(registry, "Character", Some("Object"), &["Comparable"]);
    install_arithmetic(&character);
    native(&character, "isDigit", &[], "boolean", |_, receiver, _| {
        Ok(Value::Boolean(matches!(receiver, Value::Char(c) if c.is_ascii_digit())))
    });
    native(&character, "isLetter", &[], "boolean", |_, receiver, _| {
        Ok(Value::Boolean(matches!(receiver, Value::Char(c) if c.is_alphabetic())))
    });
}

fn install_boolean(registry: &MetaClassRegistry) {
    let boolean = define(registry, "Boolean", Some("Object"), &["Comparable"]);
    native(&boolean, "compareTo", &["Object"], "int", |_, receiver, args| compare_to(receiver, args));
    native(&boolean, "and", &["Object"], "boolean", |_, receiver, args| {
        Ok(Value::Boolean(receiver.is_truthy() && arg(args, 0)?.is_truthy()))
    });
    native(&boolean, "or", &["Object"], "boolean", |_, receiver, args| {
        Ok(Value::Boolean(receiver.is_truthy() || arg(args, 0)?.is_truthy()))
    });
}

fn text(receiver: &Value) -> RuntimeResult<Vec<char>> {
    match receiver {
        Value::Str(s) => Ok(s.chars().collect()),
        other => Err(other.cast_error("String")),
    }
}

/// Index into a sequence of `size`, counting from the end when negative
pub(super) fn normalize_index(index: i64, size: usize) -> RuntimeResult<usize> {
    let resolved = if index < 0 { index + size as i64 } else { index };
    usize::try_from(resolved)
        .ok()
        .filter(|i| *i < size)
        .ok_or(RuntimeError::IndexOutOfBounds { index, size })
}

fn substring(chars: &[char], from: i64, to: i64) -> RuntimeResult<Value> {
    let size = chars.len();
    let bound = |index: i64| {
        usize::try_from(index)
            .ok()
            .filter(|i| *i <= size)
            .ok_or(RuntimeError::IndexOutOfBounds { index, size })
    };
    let (start, end) = (bound(from)?, bound(to)?);
    if start > end {
        return Err(RuntimeError::IndexOutOfBounds { index: from, size });
    }
    Ok(Value::from(chars[start..end].iter().collect::<String>()))
}

fn install_string(registry: &MetaClassRegistry) {
    let string = define(registry, "String", Some("Object"), &["Comparable", "CharSequence"]);
    native(&string, "length", &[], "int", |_, receiver, _| Ok(int_result(text(receiver)?.len())));
    native(&string, "size", &[], "int", |_, receiver, _| Ok(int_result(text(receiver)?.len())));
    native(&string, "isEmpty", &[], "boolean", |_, receiver, _| {
        Ok(Value::Boolean(text(receiver)?.is_empty()))
    });
    native(&string, "charAt", &["int"], "char", |_, receiver, args| {
        let chars = text(receiver)?;
        let index = index_arg(args, 0)?;
        usize::try_from(index)
            .ok()
            .and_then(|i| chars.get(i))
            .map(|c| Value::Char(*c))
            .ok_or(RuntimeError::IndexOutOfBounds {
                index,
                size: chars.len(),
            })
    });
    native(&string, "getAt", &["Object"], "Object", |_, receiver, args| {
        let chars = text(receiver)?;
        match arg(args, 0)? {
            Value::Range(range) => {
                let indices = range.to_vec()?;
                let mut out = String::new();
                for index in indices {
                    out.push(chars[normalize_index(index.to_index()?, chars.len())?]);
                }
                Ok(Value::from(out))
            }
            index => {
                let at = normalize_index(index.to_index()?, chars.len())?;
                Ok(Value::from(chars[at].to_string()))
            }
        }
    });
    native(&string, "substring", &["int", "int"], "String", |_, receiver, args| {
        substring(&text(receiver)?, index_arg(args, 0)?, index_arg(args, 1)?)
    });
    native(&string, "substring", &["int"], "String", |_, receiver, args| {
        let chars = text(receiver)?;
        let end = chars.len() as i64;
        substring(&chars, index_arg(args, 0)?, end)
    });
    native(&string, "toUpperCase", &[], "String", |_, receiver, _| {
        Ok(Value::from(receiver.to_string().to_uppercase()))
    });
    native(&string, "toLowerCase", &[], "String", |_, receiver, _| {
        Ok(Value::from(receiver.to_string().to_lowercase()))
    });
    native(&string, "trim", &[], "String", |_, receiver, _| {
        Ok(Value::from(receiver.to_string().trim()))
    });
    native(&string, "reverse", &[], "String", |_, receiver, _| {
        Ok(Value::from(text(receiver)?.iter().rev().collect::<String>()))
    });
    native(&string, "contains", &["Object"], "boolean", |_, receiver, args| {
        Ok(Value::Boolean(receiver.to_string().contains(&arg(args, 0)?.to_string())))
    });
    native(&string, "startsWith", &["String"], "boolean", |_, receiver, args| {
        Ok(Value::Boolean(receiver.to_string().starts_with(&arg(args, 0)?.to_string())))
    });
    native(&string, "endsWith", &["String"], "boolean", |_, receiver, args| {
        Ok(Value::Boolean(receiver.to_string().ends_with(&arg(args, 0)?.to_string())))
    });
    native(&string, "plus", &["Object"], "String", |invoker, receiver, args| {
        let suffix = display(invoker, arg(args, 0)?)?;
        Ok(Value::from(format!("{}{}", receiver, suffix)))
    });
    native(&string, "multiply", &["Object"], "String", |_, receiver, args| {
        let count = usize::try_from(index_arg(args, 0)?)
            .map_err(|_| RuntimeError::IllegalArgument("repeat count must not be negative".to_string()))?;
        Ok(Value::from(receiver.to_string().repeat(count)))
    });
    native(&string, "next", &[], "String", |_, receiver, _| numeric::next(receiver));
    native(&string, "previous", &[], "String", |_, receiver, _| numeric::previous(receiver));
    native(&string, "compareTo", &["Object"], "int", |_, receiver, args| compare_to(receiver, args));
    static_native(&string, "valueOf", &["Object"], "String", |invoker, _, args| {
        Ok(Value::from(display(invoker, arg(args, 0)?)?))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_index() {
        assert_eq!(normalize_index(0, 3).unwrap(), 0);
        assert_eq!(normalize_index(-1, 3).unwrap(), 2);
        assert!(normalize_index(3, 3).is_err());
        assert!(normalize_index(-4, 3).is_err());
    }

    #[test]
    fn test_substring_bounds() {
        let chars: Vec<char> = "kestrel".chars().collect();
        assert_eq!(substring(&chars, 0, 3).unwrap().to_string(), "kes");
        assert_eq!(substring(&chars, 7, 7).unwrap().to_string(), "");
        assert!(substring(&chars, 3, 2).is_err());
        assert!(substring(&chars, 0, 8).is_err());
    }
}
