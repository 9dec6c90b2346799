//! Condition filtering over thread views
//!
//! Exact matching only: no type coercion, no fuzzy match, no expressions.
//! Array-valued fields (sphere_id) match when any element matches.

use std::cmp::Ordering;

use serde_json::Value;

use super::ast::{Condition, Operator};
use crate::threads::ThreadView;

/// Evaluates conditions against thread views
pub struct ConditionFilter;

impl ConditionFilter {
    /// True if the view matches all conditions
    pub fn matches(view: &ThreadView, conditions: &[Condition]) -> bool {
        conditions
            .iter()
            .all(|c| Self::matches_condition(view, c))
    }

    fn matches_condition(view: &ThreadView, condition: &Condition) -> bool {
        let actual = view.get(&condition.field).filter(|v| !v.is_null());

        if condition.op == Operator::Exists {
            return actual.is_some() == condition.value.as_bool().unwrap_or(true);
        }

        // Missing and null never match
        let Some(actual) = actual else {
            return false;
        };

        match condition.op {
            Operator::Eq => Self::eq_match(actual, &condition.value),
            Operator::Ne => !Self::eq_match(actual, &condition.value),
            Operator::In => match &condition.value {
                Value::Array(items) => items.iter().any(|item| Self::eq_match(actual, item)),
                _ => false,
            },
            Operator::Between => match &condition.value {
                Value::Array(bounds) if bounds.len() == 2 => {
                    Self::between_match(actual, &bounds[0], &bounds[1])
                }
                _ => false,
            },
            Operator::Contains => Self::contains_match(actual, &condition.value),
            Operator::Exists => true,
        }
    }

    /// Exact equality; membership for array fields
    fn eq_match(actual: &Value, expected: &Value) -> bool {
        match actual {
            Value::Array(items) => items.iter().any(|item| item == expected),
            _ => actual == expected,
        }
    }

    fn between_match(actual: &Value, low: &Value, high: &Value) -> bool {
        let in_range = |v: &Value| {
            matches!(
                Self::compare(v, low),
                Some(Ordering::Greater | Ordering::Equal)
            ) && matches!(Self::compare(v, high), Some(Ordering::Less | Ordering::Equal))
        };
        match actual {
            Value::Array(items) => items.iter().any(in_range),
            _ => in_range(actual),
        }
    }

    /// Substring on strings, membership on arrays
    fn contains_match(actual: &Value, needle: &Value) -> bool {
        match (actual, needle) {
            (Value::Array(items), _) => items.contains(needle),
            (Value::String(hay), Value::String(n)) => hay.contains(n.as_str()),
            _ => false,
        }
    }

    /// Same-type comparison only (numbers or strings)
    fn compare(actual: &Value, bound: &Value) -> Option<Ordering> {
        match (actual, bound) {
            (Value::Number(a), Value::Number(b)) => {
                if let (Some(ai), Some(bi)) = (a.as_i64(), b.as_i64()) {
                    return Some(ai.cmp(&bi));
                }
                a.as_f64()?.partial_cmp(&b.as_f64()?)
            }
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threads::{DecisionThread, ThreadView};
    use chrono::Utc;
    use serde_json::json;

    fn view(spheres: &[&str], correlation: Option<&str>) -> ThreadView {
        let now = Utc::now();
        DecisionThread {
            id: "decision:r1".into(),
            key: "r1".into(),
            root_id: "r1".into(),
            correlation_id: correlation.map(str::to_string),
            spheres: spheres.iter().map(|s| s.to_string()).collect(),
            session_id: None,
            branches: Vec::new(),
            created_at: now,
            updated_at: now,
        }
        .view()
    }

    #[test]
    fn test_array_field_membership() {
        let v = view(&["home", "work"], None);
        assert!(ConditionFilter::matches(&v, &[Condition::eq("sphere_id", "work")]));
        assert!(!ConditionFilter::matches(&v, &[Condition::eq("sphere_id", "play")]));
        assert!(ConditionFilter::matches(
            &v,
            &[Condition::in_list("sphere_id", vec!["play", "home"])]
        ));
    }

    #[test]
    fn test_no_type_coercion() {
        let v = view(&["work"], None);
        assert!(ConditionFilter::matches(&v, &[Condition::eq("branch_count", 0)]));
        assert!(!ConditionFilter::matches(&v, &[Condition::eq("branch_count", "0")]));
    }

    #[test]
    fn test_between_inclusive() {
        let v = view(&["work"], None);
        assert!(ConditionFilter::matches(&v, &[Condition::between("node_count", 1, 1)]));
        assert!(!ConditionFilter::matches(&v, &[Condition::between("node_count", 2, 9)]));
        assert!(!ConditionFilter::matches(&v, &[Condition::between("node_count", "1", "9")]));
    }

    #[test]
    fn test_exists_treats_null_as_absent() {
        let without = view(&["work"], None);
        let with = view(&["work"], Some("c1"));
        let present = Condition::exists("correlation_id", true);
        let absent = Condition::exists("correlation_id", false);

        assert!(!ConditionFilter::matches(&without, &[present.clone()]));
        assert!(ConditionFilter::matches(&without, &[absent.clone()]));
        assert!(ConditionFilter::matches(&with, &[present]));
        assert!(!ConditionFilter::matches(&with, &[absent]));
    }

    #[test]
    fn test_null_never_matches() {
        let v = view(&["work"], None);
        assert!(!ConditionFilter::matches(
            &v,
            &[Condition::new("correlation_id", Operator::Eq, json!(null))]
        ));
        assert!(!ConditionFilter::matches(&v, &[Condition::ne("correlation_id", "c1")]));
    }

    #[test]
    fn test_contains() {
        let v = view(&["work"], None);
        assert!(ConditionFilter::matches(&v, &[Condition::contains("thread_id", "r1")]));
        assert!(ConditionFilter::matches(&v, &[Condition::contains("sphere_id", "work")]));
        assert!(!ConditionFilter::matches(&v, &[Condition::contains("thread_id", "zz")]));
    }

    #[test]
    fn test_conditions_are_anded() {
        let v = view(&["work"], None);
        let conditions = vec![
            Condition::eq("sphere_id", "work"),
            Condition::eq("status", "abandoned"),
        ];
        assert!(!ConditionFilter::matches(&v, &conditions));
    }
}
