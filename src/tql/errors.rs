//! TQL safety errors
//!
//! Error codes:
//! - TQL_SCOPE_REQUIRED
//! - TQL_FIELD_NOT_WHITELISTED
//! - TQL_DERIVED_FIELD
//! - TQL_HIDDEN_JOIN
//! - TQL_MALFORMED
//! - TQL_INVALID_OPERAND
//!
//! Every one of them means nothing was executed.

use std::fmt;

/// Which safety rule a query broke
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsafeQueryCode {
    /// No `==`/`in` condition on sphere_id, session_id or thread_id
    ScopeRequired,
    /// Field outside the kind's whitelist
    FieldNotWhitelisted,
    /// Sentiment, score, ranking or any other inferred field
    DerivedField,
    /// Field qualified with another thread kind
    HiddenJoin,
    /// Query text or structure could not be understood
    Malformed,
    /// Operand shape does not fit the operator
    InvalidOperand,
}

impl UnsafeQueryCode {
    pub fn code(&self) -> &'static str {
        match self {
            UnsafeQueryCode::ScopeRequired => "TQL_SCOPE_REQUIRED",
            UnsafeQueryCode::FieldNotWhitelisted => "TQL_FIELD_NOT_WHITELISTED",
            UnsafeQueryCode::DerivedField => "TQL_DERIVED_FIELD",
            UnsafeQueryCode::HiddenJoin => "TQL_HIDDEN_JOIN",
            UnsafeQueryCode::Malformed => "TQL_MALFORMED",
            UnsafeQueryCode::InvalidOperand => "TQL_INVALID_OPERAND",
        }
    }

    /// The rule, as shown to the caller
    pub fn rule(&self) -> &'static str {
        match self {
            UnsafeQueryCode::ScopeRequired => "queries must name an explicit scope",
            UnsafeQueryCode::FieldNotWhitelisted => "only whitelisted fields may be used",
            UnsafeQueryCode::DerivedField => "no derived or inferred fields",
            UnsafeQueryCode::HiddenJoin => "no joins across thread kinds",
            UnsafeQueryCode::Malformed => "query must be well formed",
            UnsafeQueryCode::InvalidOperand => "operands must match their operator",
        }
    }
}

impl fmt::Display for UnsafeQueryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A query refused before execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsafeQueryError {
    code: UnsafeQueryCode,
    message: String,
    field: Option<String>,
}

impl UnsafeQueryError {
    pub fn scope_required() -> Self {
        Self {
            code: UnsafeQueryCode::ScopeRequired,
            message: "add a == or in condition on sphere_id, session_id or thread_id".into(),
            field: None,
        }
    }

    pub fn not_whitelisted(field: impl Into<String>, kind: &str) -> Self {
        let f = field.into();
        Self {
            code: UnsafeQueryCode::FieldNotWhitelisted,
            message: format!("field '{}' is not available on {} threads", f, kind),
            field: Some(f),
        }
    }

    pub fn derived_field(field: impl Into<String>) -> Self {
        let f = field.into();
        Self {
            code: UnsafeQueryCode::DerivedField,
            message: format!("field '{}' would require inference", f),
            field: Some(f),
        }
    }

    pub fn hidden_join(field: impl Into<String>, kind: &str) -> Self {
        let f = field.into();
        Self {
            code: UnsafeQueryCode::HiddenJoin,
            message: format!("field '{}' reaches outside {} threads", f, kind),
            field: Some(f),
        }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        Self {
            code: UnsafeQueryCode::Malformed,
            message: reason.into(),
            field: None,
        }
    }

    pub fn invalid_operand(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            code: UnsafeQueryCode::InvalidOperand,
            message: reason.into(),
            field: Some(field.into()),
        }
    }

    pub fn code(&self) -> UnsafeQueryCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }
}

impl fmt::Display for UnsafeQueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unsafe query [{}] {}: {}",
            self.code.code(),
            self.code.rule(),
            self.message
        )
    }
}

impl std::error::Error for UnsafeQueryError {}
