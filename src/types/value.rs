//! The unified scalar value type. Trimmed from the teacher's multimodal
//! `Value` (which also carried `Tensor`/`Spatial`/`TextDoc` variants for
//! vector and spatial workloads) down to the five logical types this spec
//! defines: Integer, Real, Text, Boolean, Null.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    Integer(i64),
    Real(f64),
    Text(String),
    Boolean(bool),
    Null,
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "Integer",
            Value::Real(_) => "Real",
            Value::Text(_) => "Text",
            Value::Boolean(_) => "Boolean",
            Value::Null => "Null",
        }
    }

    /// Total ordering over values used for index keys, where `Null` sorts
    /// before everything else and mismatched non-null types are compared
    /// by their textual form as a last resort (so a `BTreeMap<Value, _>`
    /// key never panics on ordering).
    pub fn cmp_total(&self, other: &Self) -> Ordering {
        use Value::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Null, _) => Ordering::Less,
            (_, Null) => Ordering::Greater,
            (Integer(a), Integer(b)) => a.cmp(b),
            (Real(a), Real(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Integer(a), Real(b)) => (*a as f64).partial_cmp(b).unwrap_or(Ordering::Equal),
            (Real(a), Integer(b)) => a.partial_cmp(&(*b as f64)).unwrap_or(Ordering::Equal),
            (Text(a), Text(b)) => a.cmp(b),
            (Boolean(a), Boolean(b)) => a.cmp(b),
            (a, b) => format!("{:?}", a).cmp(&format!("{:?}", b)),
        }
    }
}

impl Eq for Value {}

/// Consistent with the derived `PartialEq`/`Eq` (exact variant and field
/// match, not `cmp_total`'s cross-type numeric coercion): `Real`'s bit
/// pattern is hashed via `to_bits` since `f64` has no `Hash` impl of its
/// own.
impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Integer(i) => i.hash(state),
            Value::Real(f) => f.to_bits().hash(state),
            Value::Text(s) => s.hash(state),
            Value::Boolean(b) => b.hash(state),
            Value::Null => {}
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp_total(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_total(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_sorts_first() {
        assert!(Value::Null < Value::Integer(-1000));
    }

    #[test]
    fn integer_real_compare_numerically() {
        assert!(Value::Integer(2) < Value::Real(2.5));
    }
}
