//! Immutable tuples of up to sixteen elements

use crate::value::Value;
use crate::{RuntimeError, RuntimeResult};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// Largest supported arity
pub const MAX_ARITY: usize = 16;

/// Immutable fixed-arity sequence
#[derive(Debug, Clone, Default)]
pub struct Tuple {
    elements: Vec<Value>,
}

impl Tuple {
    /// Tuple over `elements`, failing above [`MAX_ARITY`]
    pub fn new(elements: Vec<Value>) -> RuntimeResult<Self> {
        if elements.len() > MAX_ARITY {
            return Err(RuntimeError::IllegalArgument(format!(
                "Tuple arity {} exceeds the maximum of {}",
                elements.len(),
                MAX_ARITY
            )));
        }
        Ok(Self { elements })
    }

    /// Number of elements
    pub fn size(&self) -> usize {
        self.elements.len()
    }

    /// Whether the tuple has no elements
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Borrowed elements
    pub fn elements(&self) -> &[Value] {
        &self.elements
    }

    /// Element at `index`
    pub fn get(&self, index: i64) -> RuntimeResult<Value> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.elements.get(i))
            .cloned()
            .ok_or(RuntimeError::IndexOutOfBounds {
                index,
                size: self.elements.len(),
            })
    }

    /// Whether any element equals `value`
    pub fn contains(&self, value: &Value) -> bool {
        self.elements.iter().any(|e| e.equals(value))
    }

    /// Elements `from..to` as a new tuple
    pub fn sub_tuple(&self, from: i64, to: i64) -> RuntimeResult<Tuple> {
        let size = self.elements.len();
        let start = usize::try_from(from)
            .ok()
            .filter(|s| *s <= size)
            .ok_or(RuntimeError::IndexOutOfBounds { index: from, size })?;
        let end = usize::try_from(to)
            .ok()
            .filter(|e| *e <= size)
            .ok_or(RuntimeError::IndexOutOfBounds { index: to, size })?;
        if start > end {
            return Err(RuntimeError::IllegalArgument(format!(
                "fromIndex({}) > toIndex({})",
                from, to
            )));
        }
        Ok(Self {
            elements: self.elements[start..end].to_vec(),
        })
    }

    /// This tuple followed by `value`, or by the elements of a tuple
    pub fn concat(&self, value: &Value) -> RuntimeResult<Tuple> {
        let mut elements = self.elements.clone();
        match value {
            Value::Tuple(other) => elements.extend(other.elements.iter().cloned()),
            other => elements.push(other.clone()),
        }
        Self::new(elements)
    }

    /// The first `index` elements and the rest
    pub fn split_at(&self, index: i64) -> RuntimeResult<(Tuple, Tuple)> {
        let size = self.elements.len() as i64;
        Ok((self.sub_tuple(0, index)?, self.sub_tuple(index, size)?))
    }

    /// Lexicographic comparison; a proper prefix sorts first
    pub fn compare(&self, other: &Tuple) -> RuntimeResult<Ordering> {
        for (a, b) in self.elements.iter().zip(&other.elements) {
            let ordering = match (a, b) {
                (Value::Null, Value::Null) => Ordering::Equal,
                (Value::Null, _) => Ordering::Less,
                (_, Value::Null) => Ordering::Greater,
                (a, b) => a.compare(b)?,
            };
            if ordering != Ordering::Equal {
                return Ok(ordering);
            }
        }
        Ok(self.elements.len().cmp(&other.elements.len()))
    }
}

impl PartialEq for Tuple {
    fn eq(&self, other: &Self) -> bool {
        self.elements.len() == other.elements.len()
            && self.elements.iter().zip(&other.elements).all(|(a, b)| a.equals(b))
    }
}

impl Hash for Tuple {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.elements.len().hash(state);
        for element in &self.elements {
            element.hash_into(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn tuple(values: Vec<Value>) -> Tuple {
        Tuple::new(values).unwrap()
    }

    fn hash(t: &Tuple) -> u64 {
        let mut hasher = DefaultHasher::new();
        t.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_arity_limit() {
        assert!(Tuple::new(vec![Value::Null; 16]).is_ok());
        assert!(Tuple::new(vec![Value::Null; 17]).is_err());
        assert!(Tuple::new(vec![]).unwrap().is_empty());
    }

    #[test]
    fn test_get_and_contains() {
        let t = tuple(vec![Value::Int(1), Value::string("b")]);
        assert_eq!(t.size(), 2);
        assert!(matches!(t.get(0).unwrap(), Value::Int(1)));
        assert!(matches!(t.get(2), Err(RuntimeError::IndexOutOfBounds { index: 2, size: 2 })));
        assert!(t.get(-1).is_err());
        assert!(t.contains(&Value::Long(1)));
        assert!(!t.contains(&Value::string("c")));
    }

    #[test]
    fn test_sub_tuple_concat_and_split() {
        let t = tuple(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        let sub = t.sub_tuple(1, 3).unwrap();
        assert_eq!(sub.size(), 2);
        assert!(matches!(sub.get(0).unwrap(), Value::Int(2)));
        assert!(t.sub_tuple(2, 1).is_err());
        assert!(t.sub_tuple(0, 4).is_err());

        let joined = t.concat(&Value::Tuple(std::sync::Arc::new(sub))).unwrap();
        assert_eq!(joined.size(), 5);
        let pushed = t.concat(&Value::string("x")).unwrap();
        assert_eq!(pushed.size(), 4);

        let full = tuple(vec![Value::Null; 16]);
        assert!(full.concat(&Value::Int(1)).is_err());

        let (head, tail) = t.split_at(1).unwrap();
        assert_eq!(head.size(), 1);
        assert_eq!(tail.size(), 2);
    }

    #[test]
    fn test_ordering() {
        let a = tuple(vec![Value::Int(1), Value::string("a")]);
        let b = tuple(vec![Value::Int(1), Value::string("b")]);
        let prefix = tuple(vec![Value::Int(1)]);
        assert_eq!(a.compare(&b).unwrap(), Ordering::Less);
        assert_eq!(prefix.compare(&a).unwrap(), Ordering::Less);
        assert_eq!(a.compare(&a.clone()).unwrap(), Ordering::Equal);
        let nulls = tuple(vec![Value::Null]);
        assert_eq!(nulls.compare(&prefix).unwrap(), Ordering::Less);
    }

    #[test]
    fn test_equality_and_hashing_by_elements() {
        let a = tuple(vec![Value::Int(1), Value::Double(2.0)]);
        let b = tuple(vec![Value::Long(1), Value::Int(2)]);
        assert_eq!(a, b);
        assert_eq!(hash(&a), hash(&b));
        assert_ne!(a, tuple(vec![Value::Int(1)]));
    }
}
