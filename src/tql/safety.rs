//! Safety analysis for TQL queries
//!
//! A query is safe if:
//! - it names an explicit scope (`==`/`in` on sphere_id, session_id or thread_id)
//! - every field is on the whitelist of the target kind
//! - no field is derived (sentiment, score, ranking, ...)
//! - no field is qualified with another thread kind
//! - every operand has the shape its operator needs
//!
//! Analysis runs to completion before a single thread is read.

use std::collections::BTreeSet;

use serde_json::Value;

use super::ast::{Condition, Operator, TqlQuery};
use super::errors::UnsafeQueryError;
use crate::threads::ThreadKind;

/// Fields that pin a query to a scope
pub const SCOPE_FIELDS: &[&str] = &["sphere_id", "session_id", "thread_id"];

const DERIVED_FIELDS: &[&str] = &[
    "sentiment",
    "score",
    "rank",
    "ranking",
    "quality",
    "confidence",
    "relevance",
    "intent",
    "best",
    "correctness",
    "importance",
    "priority",
];

/// True for names that could only be filled by inference
pub fn is_derived_field(field: &str) -> bool {
    let name = field
        .rsplit_once('.')
        .map(|(_, f)| f)
        .unwrap_or(field)
        .to_ascii_lowercase();
    DERIVED_FIELDS.contains(&name.as_str())
        || name.ends_with("_score")
        || name.ends_with("_rank")
        || name.ends_with("_sentiment")
}

/// Proof that a query passed analysis, with fields resolved to bare names
#[derive(Debug, Clone)]
pub struct SafetyProof {
    pub query: TqlQuery,
    /// Spheres the caller asked for; empty when scoped by session or thread
    pub scope_spheres: BTreeSet<String>,
}

/// Validates queries against the per-kind whitelists
#[derive(Debug, Default, Clone, Copy)]
pub struct SafetyValidator;

impl SafetyValidator {
    pub fn new() -> Self {
        Self
    }

    /// Returns a proof if safe, or the first rule broken
    pub fn validate(&self, query: &TqlQuery) -> Result<SafetyProof, UnsafeQueryError> {
        let kind = query.from;

        // 1. Limit, when given, must be positive
        if query.limit == Some(0) {
            return Err(UnsafeQueryError::malformed("limit must be positive"));
        }

        // 2. Resolve every field to a bare, whitelisted name
        let mut resolved = query.clone();
        for condition in &mut resolved.conditions {
            condition.field = Self::resolve(&condition.field, kind)?;
        }
        if let Some(order) = &mut resolved.order_by {
            order.field = Self::resolve(&order.field, kind)?;
        }
        if let Some(group) = &mut resolved.group_by {
            *group = Self::resolve(group, kind)?;
        }
        for field in &mut resolved.show {
            *field = Self::resolve(field, kind)?;
        }

        // 3. Operand shapes
        for condition in &resolved.conditions {
            Self::check_operand(condition)?;
        }

        // 4. Explicit scope
        let scoping: Vec<&Condition> = resolved
            .conditions
            .iter()
            .filter(|c| c.op.is_scoping() && SCOPE_FIELDS.contains(&c.field.as_str()))
            .collect();
        if scoping.is_empty() {
            return Err(UnsafeQueryError::scope_required());
        }

        let scope_spheres = scoping
            .iter()
            .filter(|c| c.field == "sphere_id")
            .flat_map(|c| match &c.value {
                Value::Array(items) => items.clone(),
                other => vec![other.clone()],
            })
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();

        Ok(SafetyProof {
            query: resolved,
            scope_spheres,
        })
    }

    /// Strips a same-kind qualifier and checks the whitelist
    fn resolve(field: &str, kind: ThreadKind) -> Result<String, UnsafeQueryError> {
        if is_derived_field(field) {
            return Err(UnsafeQueryError::derived_field(field));
        }

        let bare = match field.split_once('.') {
            Some((prefix, rest)) => match prefix.parse::<ThreadKind>() {
                Ok(k) if k == kind => rest,
                Ok(_) => return Err(UnsafeQueryError::hidden_join(field, kind.as_str())),
                Err(_) => return Err(UnsafeQueryError::not_whitelisted(field, kind.as_str())),
            },
            None => field,
        };

        if !kind.allows(bare) {
            return Err(UnsafeQueryError::not_whitelisted(field, kind.as_str()));
        }
        Ok(bare.to_string())
    }

    fn check_operand(condition: &Condition) -> Result<(), UnsafeQueryError> {
        let field = &condition.field;
        let scalar = |v: &Value| !matches!(v, Value::Array(_) | Value::Object(_));

        match (&condition.op, &condition.value) {
            (Operator::Eq | Operator::Ne, v) if scalar(v) => Ok(()),
            (Operator::In, Value::Array(items)) if !items.is_empty() && items.iter().all(scalar) => {
                Ok(())
            }
            (Operator::Between, Value::Array(bounds)) => match bounds.as_slice() {
                [Value::Number(_), Value::Number(_)] | [Value::String(_), Value::String(_)] => {
                    Ok(())
                }
                _ => Err(UnsafeQueryError::invalid_operand(
                    field,
                    "between needs two numbers or two strings",
                )),
            },
            (Operator::Exists, Value::Bool(_)) => Ok(()),
            (Operator::Contains, v) if scalar(v) && !v.is_null() => Ok(()),
            (op, _) => Err(UnsafeQueryError::invalid_operand(
                field,
                format!("operand does not fit '{}'", op.as_str()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tql::ast::OrderBy;
    use crate::tql::UnsafeQueryCode;
    use serde_json::json;

    fn code_of(query: &TqlQuery) -> UnsafeQueryCode {
        SafetyValidator::new().validate(query).unwrap_err().code()
    }

    #[test]
    fn test_scoped_query_passes() {
        let query = TqlQuery::new(ThreadKind::Decision)
            .with_condition(Condition::in_list("sphere_id", vec!["work", "home"]))
            .with_condition(Condition::eq("status", "open"));

        let proof = SafetyValidator::new().validate(&query).unwrap();
        assert_eq!(proof.scope_spheres.len(), 2);
        assert!(proof.scope_spheres.contains("work"));
    }

    #[test]
    fn test_unscoped_query_rejected() {
        let query =
            TqlQuery::new(ThreadKind::Decision).with_condition(Condition::eq("status", "open"));
        assert_eq!(code_of(&query), UnsafeQueryCode::ScopeRequired);

        // != does not scope
        let query =
            TqlQuery::new(ThreadKind::Decision).with_condition(Condition::ne("sphere_id", "work"));
        assert_eq!(code_of(&query), UnsafeQueryCode::ScopeRequired);
    }

    #[test]
    fn test_session_scope_has_no_spheres() {
        let query =
            TqlQuery::new(ThreadKind::Temporal).with_condition(Condition::eq("session_id", "s1"));
        let proof = SafetyValidator::new().validate(&query).unwrap();
        assert!(proof.scope_spheres.is_empty());
    }

    #[test]
    fn test_field_off_whitelist_rejected() {
        let query = TqlQuery::new(ThreadKind::Fact)
            .in_sphere("work")
            .with_condition(Condition::eq("branch_count", 1));
        assert_eq!(code_of(&query), UnsafeQueryCode::FieldNotWhitelisted);
    }

    #[test]
    fn test_derived_fields_rejected_everywhere() {
        let base = TqlQuery::new(ThreadKind::Decision).in_sphere("work");

        let query = base.clone().with_condition(Condition::eq("sentiment", "happy"));
        assert_eq!(code_of(&query), UnsafeQueryCode::DerivedField);

        let query = base.clone().with_order(OrderBy::desc("relevance_score"));
        assert_eq!(code_of(&query), UnsafeQueryCode::DerivedField);

        let query = base.with_show(&["thread_id", "decision.rank"]);
        assert_eq!(code_of(&query), UnsafeQueryCode::DerivedField);
    }

    #[test]
    fn test_hidden_join_rejected() {
        let query = TqlQuery::new(ThreadKind::Decision)
            .in_sphere("work")
            .with_condition(Condition::eq("evolution.status", "paused"));
        assert_eq!(code_of(&query), UnsafeQueryCode::HiddenJoin);
    }

    #[test]
    fn test_same_kind_qualifier_is_stripped() {
        let query = TqlQuery::new(ThreadKind::Decision)
            .with_condition(Condition::eq("decision.sphere_id", "work"));
        let proof = SafetyValidator::new().validate(&query).unwrap();
        assert_eq!(proof.query.conditions[0].field, "sphere_id");
    }

    #[test]
    fn test_operand_shapes() {
        let base = TqlQuery::new(ThreadKind::Decision).in_sphere("work");

        let bad_between = base
            .clone()
            .with_condition(Condition::new("branch_count", Operator::Between, json!([1])));
        assert_eq!(code_of(&bad_between), UnsafeQueryCode::InvalidOperand);

        let mixed_between = base
            .clone()
            .with_condition(Condition::between("branch_count", 1, "5"));
        assert_eq!(code_of(&mixed_between), UnsafeQueryCode::InvalidOperand);

        let empty_in = TqlQuery::new(ThreadKind::Decision)
            .with_condition(Condition::in_list::<String>("sphere_id", vec![]));
        assert_eq!(code_of(&empty_in), UnsafeQueryCode::InvalidOperand);

        let exists_string = base.with_condition(Condition::new(
            "correlation_id",
            Operator::Exists,
            json!("yes"),
        ));
        assert_eq!(code_of(&exists_string), UnsafeQueryCode::InvalidOperand);
    }

    #[test]
    fn test_zero_limit_rejected() {
        let query = TqlQuery::new(ThreadKind::Decision)
            .in_sphere("work")
            .with_limit(0);
        assert_eq!(code_of(&query), UnsafeQueryCode::Malformed);
    }
}
