//! Runtime values
//!
//! Slot values follow the instruction set: `boolean`, `byte`, `short`,
//! `char` and `int` locals hold [`Value::Int`], while `long`, `float` and
//! `double` have their own variants. Everything else is a reference. Boxed
//! primitives keep their own variant so dynamic code sees `true` rather
//! than `1`.

use crate::decimal::BigDecimal;
use crate::numeric;
use crate::range::ObjectRange;
use crate::tuple::Tuple;
use crate::{RuntimeError, RuntimeResult};
use kestrel_types::PrimitiveKind;
use num_bigint::BigInt;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Pull-style cursor behind iterator and enumeration values
pub trait Cursor: Send {
    /// Whether another element is available
    fn has_next(&mut self) -> RuntimeResult<bool>;

    /// Next element, failing when exhausted
    fn next_value(&mut self) -> RuntimeResult<Value>;
}

/// Shared cursor handle
pub type CursorRef = Arc<Mutex<Box<dyn Cursor>>>;

/// Shared mutable list
pub type ListRef = Arc<RwLock<Vec<Value>>>;

/// A runtime value
#[derive(Clone, Default)]
pub enum Value {
    /// Null reference
    #[default]
    Null,
    /// Boxed boolean
    Boolean(bool),
    /// Boxed byte
    Byte(i8),
    /// Boxed short
    Short(i16),
    /// Boxed character
    Char(char),
    /// Int slot or boxed integer
    Int(i32),
    /// Long slot or boxed long
    Long(i64),
    /// Float slot or boxed float
    Float(f32),
    /// Double slot or boxed double
    Double(f64),
    /// Arbitrary-precision integer
    BigInteger(Arc<BigInt>),
    /// Arbitrary-precision decimal
    BigDecimal(Arc<BigDecimal>),
    /// Immutable string
    Str(Arc<str>),
    /// Mutable list
    List(ListRef),
    /// Inclusive or exclusive range
    Range(Arc<ObjectRange>),
    /// Immutable tuple
    Tuple(Arc<Tuple>),
    /// Fixed-length array
    Array(Arc<ArrayValue>),
    /// Instance of a loaded class
    Object(Arc<Instance>),
    /// Closure over captured cells
    Closure(Arc<Closure>),
    /// Iterator
    Iterator(CursorRef),
    /// Enumeration
    Enumeration(CursorRef),
    /// Cell holding a captured local
    Ref(Arc<Mutex<Value>>),
    /// Class literal, also the receiver of static calls
    Class(Arc<str>),
}

/// Instance of a loaded class
pub struct Instance {
    class: String,
    fields: Mutex<FxHashMap<String, Value>>,
}

impl Instance {
    /// Instance with the given initial field values
    pub fn new(class: impl Into<String>, fields: FxHashMap<String, Value>) -> Self {
        Self {
            class: class.into(),
            fields: Mutex::new(fields),
        }
    }

    /// Runtime class name
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Field value, `None` when the field does not exist
    pub fn get(&self, name: &str) -> Option<Value> {
        self.fields.lock().get(name).cloned()
    }

    /// Overwrite a field
    pub fn set(&self, name: &str, value: Value) {
        self.fields.lock().insert(name.to_string(), value);
    }

    /// Whether the instance carries `name`
    pub fn has(&self, name: &str) -> bool {
        self.fields.lock().contains_key(name)
    }
}

/// Fixed-length array; primitive components hold slot values
pub struct ArrayValue {
    component: String,
    elements: RwLock<Vec<Value>>,
}

impl ArrayValue {
    /// Array of `length` default values
    pub fn new(component: impl Into<String>, length: usize) -> Self {
        let component = component.into();
        let initial = default_slot(&component);
        Self {
            elements: RwLock::new(vec![initial; length]),
            component,
        }
    }

    /// Array over existing slot values
    pub fn from_values(component: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            component: component.into(),
            elements: RwLock::new(values),
        }
    }

    /// Component type name
    pub fn component(&self) -> &str {
        &self.component
    }

    /// Type name, for example `int[]`
    pub fn type_name(&self) -> String {
        format!("{}[]", self.component)
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.elements.read().len()
    }

    /// Whether the array has no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self, index: i64, size: usize) -> RuntimeResult<usize> {
        usize::try_from(index)
            .ok()
            .filter(|i| *i < size)
            .ok_or(RuntimeError::IndexOutOfBounds { index, size })
    }

    /// Slot value at `index`
    pub fn get(&self, index: i64) -> RuntimeResult<Value> {
        let elements = self.elements.read();
        let at = self.check(index, elements.len())?;
        Ok(elements[at].clone())
    }

    /// Store a slot value at `index`
    pub fn set(&self, index: i64, value: Value) -> RuntimeResult<()> {
        let mut elements = self.elements.write();
        let at = self.check(index, elements.len())?;
        elements[at] = value;
        Ok(())
    }

    /// Element at `index` in boxed form
    pub fn get_boxed(&self, index: i64) -> RuntimeResult<Value> {
        box_for(self.get(index)?, &self.component)
    }

    /// Store a value of any representation at `index`
    pub fn set_boxed(&self, index: i64, value: Value) -> RuntimeResult<()> {
        let slot = unbox_for(value, &self.component)?;
        self.set(index, slot)
    }

    /// Snapshot of every element in boxed form
    pub fn boxed_elements(&self) -> RuntimeResult<Vec<Value>> {
        let elements = self.elements.read().clone();
        elements
            .into_iter()
            .map(|value| box_for(value, &self.component))
            .collect()
    }
}

/// Closure over a synthetic method
///
/// The method takes the captured cells first, then the declared parameters.
pub struct Closure {
    /// Class declaring the synthetic method
    pub owner: String,
    /// Synthetic method name
    pub method: String,
    /// Synthetic method descriptor
    pub descriptor: String,
    /// Enclosing instance, null in a static context
    pub this: Value,
    /// Captured cells
    pub captures: Vec<Value>,
}

impl Closure {
    /// Declared parameter count, excluding captures
    pub fn param_count(&self) -> usize {
        kestrel_bytecode::MethodDescriptor::parse(&self.descriptor)
            .map(|d| d.arity().saturating_sub(self.captures.len()))
            .unwrap_or(0)
    }
}

/// Cursor over an owned sequence
pub struct VecCursor(std::vec::IntoIter<Value>);

impl VecCursor {
    /// Cursor yielding `values` in order
    pub fn new(values: Vec<Value>) -> Self {
        Self(values.into_iter())
    }
}

impl Cursor for VecCursor {
    fn has_next(&mut self) -> RuntimeResult<bool> {
        Ok(self.0.len() > 0)
    }

    fn next_value(&mut self) -> RuntimeResult<Value> {
        self.0.next().ok_or_else(exhausted)
    }
}

/// Cursor reading a live list, so appends during iteration are seen
pub struct ListCursor {
    list: ListRef,
    index: usize,
}

impl ListCursor {
    /// Cursor at the start of `list`
    pub fn new(list: ListRef) -> Self {
        Self { list, index: 0 }
    }
}

impl Cursor for ListCursor {
    fn has_next(&mut self) -> RuntimeResult<bool> {
        Ok(self.index < self.list.read().len())
    }

    fn next_value(&mut self) -> RuntimeResult<Value> {
        let value = self.list.read().get(self.index).cloned().ok_or_else(exhausted)?;
        self.index += 1;
        Ok(value)
    }
}

pub(crate) fn exhausted() -> RuntimeError {
    RuntimeError::Unsupported("next() called on an exhausted iterator".to_string())
}

impl Value {
    /// String value
    pub fn string(text: &str) -> Self {
        Value::Str(Arc::from(text))
    }

    /// New mutable list
    pub fn list(values: Vec<Value>) -> Self {
        Value::List(Arc::new(RwLock::new(values)))
    }

    /// Iterator value over a cursor
    pub fn iterator(cursor: impl Cursor + 'static) -> Self {
        Value::Iterator(Arc::new(Mutex::new(Box::new(cursor))))
    }

    /// Enumeration value over a cursor
    pub fn enumeration(cursor: impl Cursor + 'static) -> Self {
        Value::Enumeration(Arc::new(Mutex::new(Box::new(cursor))))
    }

    /// Class literal
    pub fn class(name: &str) -> Self {
        Value::Class(Arc::from(name))
    }

    /// Arbitrary-precision integer
    pub fn big_integer(value: BigInt) -> Self {
        Value::BigInteger(Arc::new(value))
    }

    /// Arbitrary-precision decimal
    pub fn big_decimal(value: BigDecimal) -> Self {
        Value::BigDecimal(Arc::new(value))
    }

    /// Whether this is the null reference
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Runtime class name
    pub fn class_name(&self) -> &str {
        match self {
            Value::Null => "NullObject",
            Value::Boolean(_) => "Boolean",
            Value::Byte(_) => "Byte",
            Value::Short(_) => "Short",
            Value::Char(_) => "Character",
            Value::Int(_) => "Integer",
            Value::Long(_) => "Long",
            Value::Float(_) => "Float",
            Value::Double(_) => "Double",
            Value::BigInteger(_) => "BigInteger",
            Value::BigDecimal(_) => "BigDecimal",
            Value::Str(_) => "String",
            Value::List(_) => "List",
            Value::Range(_) => "Range",
            Value::Tuple(_) => "Tuple",
            Value::Array(_) => "Array",
            Value::Object(instance) => instance.class(),
            Value::Closure(_) => "Closure",
            Value::Iterator(_) => "Iterator",
            Value::Enumeration(_) => "Enumeration",
            Value::Ref(_) => "Reference",
            Value::Class(_) => "Class",
        }
    }

    /// Borrowed string contents
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Whether the value takes part in numeric arithmetic
    pub fn is_numeric(&self) -> bool {
        numeric::kind_of(self).is_some()
    }

    /// Integer index from any integral value
    pub fn to_index(&self) -> RuntimeResult<i64> {
        match self {
            Value::Byte(_) | Value::Short(_) | Value::Int(_) | Value::Long(_) | Value::BigInteger(_) => {
                numeric::as_i64(self).ok_or_else(|| self.cast_error("int"))
            }
            Value::Null => Err(RuntimeError::NullPointer("index is null".to_string())),
            _ => Err(self.cast_error("int")),
        }
    }

    /// Cast failure naming this value
    pub fn cast_error(&self, target: &str) -> RuntimeError {
        RuntimeError::ClassCast {
            value: self.to_string(),
            class: self.type_name(),
            target: target.to_string(),
        }
    }

    /// Class name, with the component for arrays
    pub fn type_name(&self) -> String {
        match self {
            Value::Array(array) => array.type_name(),
            other => other.class_name().to_string(),
        }
    }

    /// Truth of a value in a condition
    ///
    /// Null, `false`, zero, empty strings and collections and exhausted
    /// iterators are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Byte(v) => *v != 0,
            Value::Short(v) => *v != 0,
            Value::Char(c) => *c != '\0',
            Value::Int(v) => *v != 0,
            Value::Long(v) => *v != 0,
            Value::Float(v) => *v != 0.0,
            Value::Double(v) => *v != 0.0,
            Value::BigInteger(v) => v.sign() != num_bigint::Sign::NoSign,
            Value::BigDecimal(v) => !v.is_zero(),
            Value::Str(s) => !s.is_empty(),
            Value::List(list) => !list.read().is_empty(),
            Value::Range(range) => range.size().map(|n| n > 0).unwrap_or(true),
            Value::Tuple(tuple) => !tuple.is_empty(),
            Value::Array(array) => !array.is_empty(),
            Value::Iterator(cursor) | Value::Enumeration(cursor) => cursor.lock().has_next().unwrap_or(false),
            Value::Ref(cell) => cell.lock().is_truthy(),
            Value::Object(_) | Value::Closure(_) | Value::Class(_) => true,
        }
    }

    /// Elements of a list-like value, `None` for anything else
    pub fn sequence(&self) -> RuntimeResult<Option<Vec<Value>>> {
        Ok(match self {
            Value::List(list) => Some(list.read().clone()),
            Value::Tuple(tuple) => Some(tuple.elements().to_vec()),
            Value::Range(range) => Some(range.to_vec()?),
            Value::Array(array) => Some(array.boxed_elements()?),
            _ => None,
        })
    }

    /// Same underlying object, or equal scalars
    pub fn identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::List(a), Value::List(b)) => Arc::ptr_eq(a, b),
            (Value::Range(a), Value::Range(b)) => Arc::ptr_eq(a, b),
            (Value::Tuple(a), Value::Tuple(b)) => Arc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Closure(a), Value::Closure(b)) => Arc::ptr_eq(a, b),
            (Value::Iterator(a), Value::Iterator(b)) | (Value::Enumeration(a), Value::Enumeration(b)) => {
                Arc::ptr_eq(a, b)
            }
            (Value::Ref(a), Value::Ref(b)) => Arc::ptr_eq(a, b),
            (a, b) => a.equals(b),
        }
    }

    fn address(&self) -> usize {
        match self {
            Value::List(a) => Arc::as_ptr(a) as *const () as usize,
            Value::Array(a) => Arc::as_ptr(a) as *const () as usize,
            Value::Object(a) => Arc::as_ptr(a) as *const () as usize,
            Value::Closure(a) => Arc::as_ptr(a) as *const () as usize,
            Value::Iterator(a) | Value::Enumeration(a) => Arc::as_ptr(a) as *const () as usize,
            Value::Ref(a) => Arc::as_ptr(a) as *const () as usize,
            _ => 0,
        }
    }

    /// Value equality: numbers compare by value across kinds, a char equals
    /// the one-character string, list-like values compare element-wise and
    /// objects by identity
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Null, _) | (_, Value::Null) => false,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Char(c), Value::Str(s)) | (Value::Str(s), Value::Char(c)) => single_char(s) == Some(*c),
            (Value::Class(a), Value::Class(b)) => a == b,
            (Value::Ref(a), Value::Ref(b)) => Arc::ptr_eq(a, b),
            _ if self.is_numeric() && other.is_numeric() => {
                numeric::compare(self, other) == Some(Ordering::Equal)
            }
            _ => match (self.sequence(), other.sequence()) {
                (Ok(Some(a)), Ok(Some(b))) => {
                    a.len() == b.len() && a.iter().zip(&b).all(|(x, y)| x.equals(y))
                }
                _ => {
                    let address = self.address();
                    address != 0 && address == other.address()
                }
            },
        }
    }

    /// Natural ordering of comparable values
    pub fn compare(&self, other: &Value) -> RuntimeResult<Ordering> {
        if let Some(ordering) = numeric::compare(self, other) {
            return Ok(ordering);
        }
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
            (Value::Char(c), Value::Str(s)) => Ok(c.to_string().as_str().cmp(s)),
            (Value::Str(s), Value::Char(c)) => Ok((**s).cmp(c.to_string().as_str())),
            (Value::Boolean(a), Value::Boolean(b)) => Ok(a.cmp(b)),
            (Value::Tuple(a), Value::Tuple(b)) => a.compare(b),
            _ => Err(RuntimeError::Incomparable {
                left: self.type_name(),
                right: other.type_name(),
            }),
        }
    }

    /// Feed the value to a hasher, consistent with [`Value::equals`] for
    /// numbers and list-like values
    pub fn hash_into<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Null => 0u8.hash(state),
            Value::Boolean(b) => b.hash(state),
            Value::Str(s) => s.hash(state),
            Value::Class(name) => name.hash(state),
            _ if self.is_numeric() => match numeric::as_exact_i64(self) {
                Some(whole) => whole.hash(state),
                None => numeric::as_f64(self).unwrap_or(f64::NAN).to_bits().hash(state),
            },
            _ => match self.sequence() {
                Ok(Some(elements)) => {
                    elements.len().hash(state);
                    for element in &elements {
                        element.hash_into(state);
                    }
                }
                _ => self.address().hash(state),
            },
        }
    }

    /// 32-bit hash code
    pub fn hash_code(&self) -> i32 {
        let mut hasher = rustc_hash::FxHasher::default();
        self.hash_into(&mut hasher);
        let full = hasher.finish();
        (full ^ (full >> 32)) as i32
    }
}

pub(crate) fn single_char(s: &str) -> Option<char> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

fn default_slot(type_name: &str) -> Value {
    match PrimitiveKind::from_name(type_name) {
        Some(PrimitiveKind::Long) => Value::Long(0),
        Some(PrimitiveKind::Float) => Value::Float(0.0),
        Some(PrimitiveKind::Double) => Value::Double(0.0),
        Some(PrimitiveKind::Void) | None => Value::Null,
        Some(_) => Value::Int(0),
    }
}

/// Default boxed value of a field of type `type_name`
pub fn default_boxed(type_name: &str) -> Value {
    match PrimitiveKind::from_name(type_name) {
        Some(PrimitiveKind::Boolean) => Value::Boolean(false),
        Some(PrimitiveKind::Byte) => Value::Byte(0),
        Some(PrimitiveKind::Short) => Value::Short(0),
        Some(PrimitiveKind::Char) => Value::Char('\0'),
        _ => default_slot(type_name),
    }
}

/// Convert any value to the slot form of `kind`
///
/// Lenient: numbers narrow or widen as needed, characters and one-character
/// strings become their code point, and null becomes `false` for booleans.
pub fn unbox(value: Value, kind: PrimitiveKind) -> RuntimeResult<Value> {
    let value = match value {
        Value::Ref(cell) => cell.lock().clone(),
        other => other,
    };
    if kind == PrimitiveKind::Void {
        return Ok(value);
    }
    if kind == PrimitiveKind::Boolean {
        return Ok(Value::Int(i32::from(value.is_truthy())));
    }
    let value = match value {
        Value::Null => {
            return Err(RuntimeError::NullPointer(format!(
                "cannot unbox null to {}",
                kind.name()
            )))
        }
        Value::Boolean(b) => Value::Int(i32::from(b)),
        Value::Str(ref s) => match single_char(s) {
            Some(c) => Value::Int(c as i32),
            None => return Err(value.cast_error(kind.name())),
        },
        other => other,
    };
    if !value.is_numeric() {
        return Err(value.cast_error(kind.name()));
    }
    let whole = || numeric::as_i64_wrapping(&value);
    Ok(match kind {
        PrimitiveKind::Byte => Value::Int(i32::from(whole() as i8)),
        PrimitiveKind::Short => Value::Int(i32::from(whole() as i16)),
        PrimitiveKind::Char => Value::Int((whole() as u32 & 0x1F_FFFF) as i32),
        PrimitiveKind::Int => Value::Int(whole() as i32),
        PrimitiveKind::Long => Value::Long(whole()),
        PrimitiveKind::Float => Value::Float(numeric::as_f64(&value).unwrap_or(0.0) as f32),
        PrimitiveKind::Double => Value::Double(numeric::as_f64(&value).unwrap_or(0.0)),
        PrimitiveKind::Boolean | PrimitiveKind::Void => value,
    })
}

/// Convert a slot value of `kind` to its boxed form
pub fn box_slot(value: Value, kind: PrimitiveKind) -> RuntimeResult<Value> {
    Ok(match (kind, value) {
        (PrimitiveKind::Boolean, Value::Int(v)) => Value::Boolean(v != 0),
        (PrimitiveKind::Byte, Value::Int(v)) => Value::Byte(v as i8),
        (PrimitiveKind::Short, Value::Int(v)) => Value::Short(v as i16),
        (PrimitiveKind::Char, Value::Int(v)) => Value::Char(char::from_u32(v as u32).unwrap_or('\u{FFFD}')),
        (_, value) => value,
    })
}

/// [`unbox`] for primitive type names; other names pass the value through
pub fn unbox_for(value: Value, type_name: &str) -> RuntimeResult<Value> {
    match PrimitiveKind::from_name(type_name) {
        Some(kind) => unbox(value, kind),
        None => Ok(value),
    }
}

/// [`box_slot`] for primitive type names; other names pass the value through
pub fn box_for(value: Value, type_name: &str) -> RuntimeResult<Value> {
    match PrimitiveKind::from_name(type_name) {
        Some(kind) => box_slot(value, kind),
        None => Ok(value),
    }
}

/// Render a float the way the JVM does: `1.0`, `0.001`, `1.0E10`
fn format_floating(value: f64, shortest: String, scientific: String) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    let magnitude = value.abs();
    if magnitude == 0.0 || (1e-3..1e7).contains(&magnitude) {
        if shortest.contains('.') {
            shortest
        } else {
            format!("{}.0", shortest)
        }
    } else {
        let (mantissa, exponent) = scientific.split_once('e').unwrap_or((scientific.as_str(), "0"));
        if mantissa.contains('.') {
            format!("{}E{}", mantissa, exponent)
        } else {
            format!("{}.0E{}", mantissa, exponent)
        }
    }
}

fn join(f: &mut fmt::Formatter<'_>, values: &[Value]) -> fmt::Result {
    f.write_str("[")?;
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", value)?;
    }
    f.write_str("]")
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Byte(v) => write!(f, "{}", v),
            Value::Short(v) => write!(f, "{}", v),
            Value::Char(c) => write!(f, "{}", c),
            Value::Int(v) => write!(f, "{}", v),
            Value::Long(v) => write!(f, "{}", v),
            Value::Float(v) => f.write_str(&format_floating(f64::from(*v), v.to_string(), format!("{:e}", v))),
            Value::Double(v) => f.write_str(&format_floating(*v, v.to_string(), format!("{:e}", v))),
            Value::BigInteger(v) => write!(f, "{}", v),
            Value::BigDecimal(v) => write!(f, "{}", v),
            Value::Str(s) => f.write_str(s),
            Value::List(list) => join(f, &list.read()),
            Value::Range(range) => write!(f, "{}", range),
            Value::Tuple(tuple) => join(f, tuple.elements()),
            Value::Array(array) => match array.boxed_elements() {
                Ok(elements) => join(f, &elements),
                Err(_) => f.write_str("[?]"),
            },
            Value::Object(instance) => write!(f, "{}@{:x}", instance.class(), self.address()),
            Value::Closure(closure) => write!(f, "{}${}@{:x}", closure.owner, closure.method, self.address()),
            Value::Iterator(_) | Value::Enumeration(_) => {
                write!(f, "{}@{:x}", self.class_name(), self.address())
            }
            Value::Ref(cell) => write!(f, "{}", cell.lock()),
            Value::Class(name) => write!(f, "class {}", name),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Char(c) => write!(f, "{:?}", c),
            other => write!(f, "{}({})", other.class_name(), other),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Long(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<char> for Value {
    fn from(value: char) -> Self {
        Value::Char(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::string(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(Arc::from(value))
    }
}
