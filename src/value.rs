//! Cell values as SQLite stores them.

use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use std::cmp::Ordering;
use std::fmt;

/// Core value types for SQLite cells
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    fn class_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Integer(_) | Value::Real(_) => 1,
            Value::Text(_) => 2,
            Value::Blob(_) => 3,
        }
    }
}

// Integers and reals compare numerically, so `Integer(1) == Real(1.0)`.
// Ordering across storage classes is NULL < numeric < TEXT < BLOB.
impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Real(a), Value::Real(b)) => compare_reals(*a, *b),
            (Value::Integer(a), Value::Real(b)) => compare_integer_real(*a, *b),
            (Value::Real(a), Value::Integer(b)) => compare_integer_real(*b, *a).reverse(),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Blob(a), Value::Blob(b)) => a.cmp(b),
            _ => self.class_rank().cmp(&other.class_rank()),
        }
    }
}

// -0.0 equals 0.0; NaN sorts by sign beyond every number.
fn compare_reals(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or_else(|| a.total_cmp(&b))
}

// Exact for every i64: the real is truncated into integer range instead of
// the integer being rounded to the nearest f64.
fn compare_integer_real(i: i64, r: f64) -> Ordering {
    const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;
    if r.is_nan() {
        return if r.is_sign_negative() {
            Ordering::Greater
        } else {
            Ordering::Less
        };
    }
    if r >= TWO_POW_63 {
        return Ordering::Less;
    }
    if r < -TWO_POW_63 {
        return Ordering::Greater;
    }
    let whole = r.trunc();
    i.cmp(&(whole as i64)).then_with(|| {
        if r > whole {
            Ordering::Less
        } else if r < whole {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    })
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Real(r) => write!(f, "{}", r),
            Value::Text(s) => write!(f, "'{}'", s),
            Value::Blob(b) => write!(f, "<blob {} bytes>", b.len()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Integer(v.into())
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let value = match self {
            Value::Null => ValueRef::Null,
            Value::Integer(i) => ValueRef::Integer(*i),
            Value::Real(r) => ValueRef::Real(*r),
            Value::Text(s) => ValueRef::Text(s.as_bytes()),
            Value::Blob(b) => ValueRef::Blob(b),
        };
        Ok(ToSqlOutput::Borrowed(value))
    }
}

impl FromSql for Value {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Ok(match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(r) => Value::Real(r),
            ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Value::Blob(b.to_vec()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_classes_order_null_numeric_text_blob() {
        let mut values = vec![
            Value::Blob(vec![0]),
            Value::Text("a".into()),
            Value::Real(2.5),
            Value::Null,
            Value::Integer(1),
        ];
        values.sort();
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Integer(1),
                Value::Real(2.5),
                Value::Text("a".into()),
                Value::Blob(vec![0]),
            ]
        );
    }

    #[test]
    fn integers_and_reals_compare_numerically() {
        assert_eq!(Value::Integer(3), Value::Real(3.0));
        assert!(Value::Integer(2) < Value::Real(2.5));
    }

    #[test]
    fn integer_real_comparison_is_exact_beyond_f64_precision() {
        let big = 1_i64 << 53;
        assert_eq!(Value::Integer(big), Value::Real(big as f64));
        assert!(Value::Integer(big + 1) > Value::Real(big as f64));
        assert!(Value::Real(big as f64) < Value::Integer(big + 1));
        assert!(Value::Integer(i64::MAX) < Value::Real(9_223_372_036_854_775_808.0));
        assert!(Value::Integer(i64::MIN) == Value::Real(-9_223_372_036_854_775_808.0));
        assert!(Value::Integer(-2) > Value::Real(-2.5));
        assert!(Value::Integer(0) < Value::Real(f64::INFINITY));
        assert_eq!(Value::Real(-0.0), Value::Real(0.0));
        assert_eq!(Value::Integer(0), Value::Real(-0.0));
    }

    #[test]
    fn sorting_mixed_large_numbers_is_consistent() {
        let big = 1_i64 << 53;
        let mut values = vec![
            Value::Integer(big + 1),
            Value::Real(big as f64),
            Value::Integer(big),
            Value::Real(0.5),
            Value::Integer(-1),
        ];
        values.sort();
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
        assert!(matches!(values[0], Value::Integer(-1)));
        assert!(matches!(values[4], Value::Integer(i) if i == big + 1));
    }

    #[test]
    fn option_converts_to_null() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::Text("x".into()));
    }
}
