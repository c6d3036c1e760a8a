//! Managed values as seen from native code

use std::fmt;
use std::rc::Rc;

/// Identity of a managed object inside a host runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What kind of object an `ObjectId` names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Plain,
    Function,
    /// `Uint8Array` over external memory
    TypedArray,
}

/// Result of `typeof`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub enum ValueType {
    Undefined = 0,
    Null = 1,
    Boolean = 2,
    Number = 3,
    String = 4,
    Symbol = 5,
    Object = 6,
    Function = 7,
    External = 8,
    BigInt = 9,
}

/// A managed value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    BigInt(i64),
    String(Rc<str>),
    Object(ObjectId),
}

impl Value {
    pub fn string(s: &str) -> Self {
        Value::String(Rc::from(s))
    }

    /// Object identity, if this is an object or function
    #[inline]
    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            Value::Object(id) => Some(*id),
            _ => None,
        }
    }

    #[inline]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }
}

impl From<ObjectId> for Value {
    fn from(id: ObjectId) -> Self {
        Value::Object(id)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_object() {
        assert_eq!(Value::Object(ObjectId(7)).as_object(), Some(ObjectId(7)));
        assert_eq!(Value::Null.as_object(), None);
        assert_eq!(Value::string("x").as_object(), None);
    }

    #[test]
    fn test_conversions() {
        assert_eq!(Value::from(3i32), Value::Number(3.0));
        assert_eq!(Value::from(u32::MAX), Value::Number(4294967295.0));
        assert_eq!(Value::from("hi"), Value::String(Rc::from("hi")));
        assert!(Value::default().is_undefined());
    }
}
