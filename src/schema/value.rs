use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// A dynamic value stored in story flags, choice requirements and
/// choice mutations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    String(String),
    Float(f64),
    Int(i64),
    Bool(bool),
}

impl Value {
    /// Numeric reading of the value. Bools count as 0/1, strings as 0.
    pub fn as_number(&self) -> f64 {
        match self {
            Self::String(_) => 0.0,
            Self::Float(f) => *f,
            Self::Int(i) => *i as f64,
            Self::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    /// Returns true for `true`, non-zero numbers and non-empty strings.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::String(s) => !s.is_empty(),
            Self::Float(f) => *f != 0.0,
            Self::Int(i) => *i != 0,
            Self::Bool(b) => *b,
        }
    }
}

/// Flag key → value mapping, used for choice requirements and mutations.
pub type StateMap = FxHashMap<String, Value>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_reading() {
        assert_eq!(Value::Int(2).as_number(), 2.0);
        assert_eq!(Value::Bool(true).as_number(), 1.0);
        assert_eq!(Value::Bool(false).as_number(), 0.0);
        assert_eq!(Value::String("x".to_string()).as_number(), 0.0);
        assert!((Value::Float(0.5).as_number() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn truthiness() {
        assert!(Value::Bool(true).is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(Value::Int(3).is_truthy());
        assert!(!Value::String(String::new()).is_truthy());
    }

    #[test]
    fn int_and_float_are_distinct() {
        assert_ne!(Value::Int(1), Value::Float(1.0));
        assert_eq!(Value::Int(1), Value::Int(1));
    }
}
