//! Object Size Estimation Module
//!
//! Pluggable approximation of how many bytes a cached value occupies.
//! The engine keeps its memory counter incrementally from these
//! estimates; the accounting is approximate by design, never exact.

use serde_json::Value;

use crate::value::CacheValue;

// == Size Estimator Trait ==
/// Estimates the in-memory size of a value in bytes.
pub trait SizeEstimator: Send + Sync + std::fmt::Debug {
    /// Returns the approximate byte size of `value`.
    fn estimate(&self, value: &CacheValue) -> usize;
}

// == Structural Estimator ==
/// Default estimator that walks the structure of the JSON value.
///
/// The per-node constants approximate the allocation overhead of each
/// shape; they are not meant to be exact.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuralEstimator;

const NULL_SIZE: usize = 8;
const BOOL_SIZE: usize = 9;
const NUMBER_SIZE: usize = 16;
const STRING_OVERHEAD: usize = 24;
const ARRAY_OVERHEAD: usize = 24;
const OBJECT_OVERHEAD: usize = 40;
const OBJECT_KEY_OVERHEAD: usize = 16;

impl SizeEstimator for StructuralEstimator {
    fn estimate(&self, value: &CacheValue) -> usize {
        match value {
            Value::Null => NULL_SIZE,
            Value::Bool(_) => BOOL_SIZE,
            Value::Number(_) => NUMBER_SIZE,
            Value::String(s) => STRING_OVERHEAD + s.len(),
            Value::Array(items) => {
                ARRAY_OVERHEAD + items.iter().map(|v| self.estimate(v)).sum::<usize>()
            }
            Value::Object(map) => {
                OBJECT_OVERHEAD
                    + map
                        .iter()
                        .map(|(k, v)| OBJECT_KEY_OVERHEAD + k.len() + self.estimate(v))
                        .sum::<usize>()
            }
        }
    }
}

// == Fixed Estimator ==
/// Estimator that charges a constant size for every value, yielding
/// fixed-size accounting (the memory budget degenerates into a second
/// entry-count budget).
#[derive(Debug, Clone, Copy)]
pub struct FixedEstimator(pub usize);

impl SizeEstimator for FixedEstimator {
    fn estimate(&self, _value: &CacheValue) -> usize {
        self.0
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_structural_scalars() {
        let est = StructuralEstimator;
        assert_eq!(est.estimate(&json!(null)), NULL_SIZE);
        assert_eq!(est.estimate(&json!(true)), BOOL_SIZE);
        assert_eq!(est.estimate(&json!(123)), NUMBER_SIZE);
        assert_eq!(est.estimate(&json!("abcd")), STRING_OVERHEAD + 4);
    }

    #[test]
    fn test_structural_array_sums_elements() {
        let est = StructuralEstimator;
        let expected = ARRAY_OVERHEAD + 2 * NUMBER_SIZE;
        assert_eq!(est.estimate(&json!([1, 2])), expected);
    }

    #[test]
    fn test_structural_object_counts_keys() {
        let est = StructuralEstimator;
        let expected = OBJECT_OVERHEAD + OBJECT_KEY_OVERHEAD + 2 + NUMBER_SIZE;
        assert_eq!(est.estimate(&json!({"id": 7})), expected);
    }

    #[test]
    fn test_structural_larger_values_cost_more() {
        let est = StructuralEstimator;
        assert!(est.estimate(&json!("a longer string value")) > est.estimate(&json!("a")));
    }

    #[test]
    fn test_fixed_estimator_is_constant() {
        let est = FixedEstimator(64);
        assert_eq!(est.estimate(&json!(null)), 64);
        assert_eq!(est.estimate(&json!("a very long string indeed")), 64);
        assert_eq!(est.estimate(&json!({"a": [1, 2, 3]})), 64);
    }
}
