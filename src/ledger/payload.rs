//! Typed event payloads
//!
//! One variant per known event type, plus [`EventPayload::Opaque`] for types
//! the ledger does not know yet. A typed variant is only valid on events of its
//! own type; an opaque payload is only valid on unknown types.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::audit::AuditCategory;
use crate::error::{Error, Result};

pub const SESSION_START: &str = "session.start";
pub const SESSION_END: &str = "session.end";
pub const DECISION_MAKE: &str = "decision.make";
pub const DECISION_BRANCH: &str = "decision.branch";
pub const DECISION_ABANDON: &str = "decision.abandon";
pub const ARTIFACT_CREATE: &str = "artifact.create";
pub const ARTIFACT_UPDATE: &str = "artifact.update";
pub const ARTIFACT_BRANCH: &str = "artifact.branch";
pub const ARTIFACT_PAUSE: &str = "artifact.pause";
pub const ARTIFACT_RESUME: &str = "artifact.resume";
pub const MEETING_RECORD: &str = "meeting.record";
pub const REPLAY_CAPTURE: &str = "replay.capture";
pub const CONCEPT_LINK: &str = "concept.link";
pub const CONSENT_GRANT: &str = "consent.grant";
pub const LINK_REMOVE: &str = "thread.link.remove";
pub const AGENT_ACTION: &str = "agent.action";
pub const HALT_RESET: &str = "audit.halt.reset";

/// Every event type with a typed payload
pub const KNOWN_TYPES: &[&str] = &[
    SESSION_START,
    SESSION_END,
    DECISION_MAKE,
    DECISION_BRANCH,
    DECISION_ABANDON,
    ARTIFACT_CREATE,
    ARTIFACT_UPDATE,
    ARTIFACT_BRANCH,
    ARTIFACT_PAUSE,
    ARTIFACT_RESUME,
    MEETING_RECORD,
    REPLAY_CAPTURE,
    CONCEPT_LINK,
    CONSENT_GRANT,
    LINK_REMOVE,
    AGENT_ACTION,
    HALT_RESET,
];

/// Returns true if the type has a typed payload variant
pub fn is_known_type(event_type: &str) -> bool {
    KNOWN_TYPES.contains(&event_type)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMarker {
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    /// Events sequenced in the session, markers excluded
    #[serde(default)]
    pub event_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionMade {
    pub title: String,
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionBranched {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

/// Free-form note attached to an abandon, pause or resume
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusNote {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactCreated {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactUpdated {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactBranched {
    pub branch: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingRecorded {
    pub title: String,
    #[serde(default)]
    pub participants: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayCaptured {
    pub replay_id: String,
}

/// Declared reach of a concept
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConceptScope {
    #[default]
    Personal,
    Team,
    Sphere,
    Global,
}

impl ConceptScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConceptScope::Personal => "personal",
            ConceptScope::Team => "team",
            ConceptScope::Sphere => "sphere",
            ConceptScope::Global => "global",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptLinked {
    pub concept: String,
    #[serde(default)]
    pub scope: ConceptScope,
    #[serde(default)]
    pub items: Vec<String>,
}

/// Permission for results to cross from one sphere into another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentGranted {
    pub from_sphere: String,
    pub to_sphere: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRemoval {
    pub link_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentActed {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

/// Operator reset of the halt gate. `evidence` lists the failing ids the
/// operator acknowledged; later audits do not halt again on those alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HaltResetRecord {
    pub operator_id: String,
    pub reason: String,
    pub category: AuditCategory,
    pub check_id: String,
    pub description: String,
    #[serde(default)]
    pub evidence: Vec<String>,
}

/// Payload union keyed by event type
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    SessionStart(SessionMarker),
    SessionEnd(SessionSummary),
    DecisionMake(DecisionMade),
    DecisionBranch(DecisionBranched),
    DecisionAbandon(StatusNote),
    ArtifactCreate(ArtifactCreated),
    ArtifactUpdate(ArtifactUpdated),
    ArtifactBranch(ArtifactBranched),
    ArtifactPause(StatusNote),
    ArtifactResume(StatusNote),
    MeetingRecord(MeetingRecorded),
    ReplayCapture(ReplayCaptured),
    ConceptLink(ConceptLinked),
    ConsentGrant(ConsentGranted),
    LinkRemove(LinkRemoval),
    AgentAction(AgentActed),
    HaltReset(HaltResetRecord),
    /// Payload of an event type without a typed variant
    Opaque(Value),
}

impl EventPayload {
    /// Empty opaque payload
    pub fn empty() -> Self {
        EventPayload::Opaque(Value::Object(Default::default()))
    }

    /// The event type this variant belongs to; `None` for opaque payloads
    pub fn expected_type(&self) -> Option<&'static str> {
        let t = match self {
            EventPayload::SessionStart(_) => SESSION_START,
            EventPayload::SessionEnd(_) => SESSION_END,
            EventPayload::DecisionMake(_) => DECISION_MAKE,
            EventPayload::DecisionBranch(_) => DECISION_BRANCH,
            EventPayload::DecisionAbandon(_) => DECISION_ABANDON,
            EventPayload::ArtifactCreate(_) => ARTIFACT_CREATE,
            EventPayload::ArtifactUpdate(_) => ARTIFACT_UPDATE,
            EventPayload::ArtifactBranch(_) => ARTIFACT_BRANCH,
            EventPayload::ArtifactPause(_) => ARTIFACT_PAUSE,
            EventPayload::ArtifactResume(_) => ARTIFACT_RESUME,
            EventPayload::MeetingRecord(_) => MEETING_RECORD,
            EventPayload::ReplayCapture(_) => REPLAY_CAPTURE,
            EventPayload::ConceptLink(_) => CONCEPT_LINK,
            EventPayload::ConsentGrant(_) => CONSENT_GRANT,
            EventPayload::LinkRemove(_) => LINK_REMOVE,
            EventPayload::AgentAction(_) => AGENT_ACTION,
            EventPayload::HaltReset(_) => HALT_RESET,
            EventPayload::Opaque(_) => return None,
        };
        Some(t)
    }

    /// Check that this payload may be carried by an event of `event_type`
    pub fn check_type(&self, event_type: &str) -> Result<()> {
        match self.expected_type() {
            Some(expected) if expected == event_type => Ok(()),
            Some(expected) => Err(Error::validation(format!(
                "payload for '{}' attached to event of type '{}'",
                expected, event_type
            ))),
            None if is_known_type(event_type) => Err(Error::validation(format!(
                "event type '{}' requires a typed payload",
                event_type
            ))),
            None => Ok(()),
        }
    }

    /// Decode untyped input into the variant for `event_type`.
    ///
    /// Unknown types become [`EventPayload::Opaque`]; a known type whose body
    /// does not decode is a validation error.
    pub fn from_json(event_type: &str, value: Value) -> Result<Self> {
        let payload = match event_type {
            SESSION_START => EventPayload::SessionStart(decode(event_type, value)?),
            SESSION_END => EventPayload::SessionEnd(decode(event_type, value)?),
            DECISION_MAKE => EventPayload::DecisionMake(decode(event_type, value)?),
            DECISION_BRANCH => EventPayload::DecisionBranch(decode(event_type, value)?),
            DECISION_ABANDON => EventPayload::DecisionAbandon(decode(event_type, value)?),
            ARTIFACT_CREATE => EventPayload::ArtifactCreate(decode(event_type, value)?),
            ARTIFACT_UPDATE => EventPayload::ArtifactUpdate(decode(event_type, value)?),
            ARTIFACT_BRANCH => EventPayload::ArtifactBranch(decode(event_type, value)?),
            ARTIFACT_PAUSE => EventPayload::ArtifactPause(decode(event_type, value)?),
            ARTIFACT_RESUME => EventPayload::ArtifactResume(decode(event_type, value)?),
            MEETING_RECORD => EventPayload::MeetingRecord(decode(event_type, value)?),
            REPLAY_CAPTURE => EventPayload::ReplayCapture(decode(event_type, value)?),
            CONCEPT_LINK => EventPayload::ConceptLink(decode(event_type, value)?),
            CONSENT_GRANT => EventPayload::ConsentGrant(decode(event_type, value)?),
            LINK_REMOVE => EventPayload::LinkRemove(decode(event_type, value)?),
            AGENT_ACTION => EventPayload::AgentAction(decode(event_type, value)?),
            HALT_RESET => EventPayload::HaltReset(decode(event_type, value)?),
            _ => EventPayload::Opaque(value),
        };
        Ok(payload)
    }

    /// Untyped JSON form, as written on the wire
    pub fn to_json(&self) -> Result<Value> {
        let encoded = match self {
            EventPayload::SessionStart(p) => serde_json::to_value(p),
            EventPayload::SessionEnd(p) => serde_json::to_value(p),
            EventPayload::DecisionMake(p) => serde_json::to_value(p),
            EventPayload::DecisionBranch(p) => serde_json::to_value(p),
            EventPayload::DecisionAbandon(p) => serde_json::to_value(p),
            EventPayload::ArtifactCreate(p) => serde_json::to_value(p),
            EventPayload::ArtifactUpdate(p) => serde_json::to_value(p),
            EventPayload::ArtifactBranch(p) => serde_json::to_value(p),
            EventPayload::ArtifactPause(p) => serde_json::to_value(p),
            EventPayload::ArtifactResume(p) => serde_json::to_value(p),
            EventPayload::MeetingRecord(p) => serde_json::to_value(p),
            EventPayload::ReplayCapture(p) => serde_json::to_value(p),
            EventPayload::ConceptLink(p) => serde_json::to_value(p),
            EventPayload::ConsentGrant(p) => serde_json::to_value(p),
            EventPayload::LinkRemove(p) => serde_json::to_value(p),
            EventPayload::AgentAction(p) => serde_json::to_value(p),
            EventPayload::HaltReset(p) => serde_json::to_value(p),
            EventPayload::Opaque(v) => return Ok(v.clone()),
        };
        encoded.map_err(|e| {
            Error::validation(format!(
                "payload for '{}' does not encode: {}",
                self.expected_type().unwrap_or("opaque"),
                e
            ))
        })
    }
}

fn decode<T: DeserializeOwned>(event_type: &str, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| {
        Error::validation(format!("malformed payload for '{}': {}", event_type, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use serde_json::json;

    #[test]
    fn test_from_json_typed() {
        let payload =
            EventPayload::from_json("decision.make", json!({"title": "Pick vendor"})).unwrap();
        match payload {
            EventPayload::DecisionMake(d) => {
                assert_eq!(d.title, "Pick vendor");
                assert!(d.options.is_empty());
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_is_opaque() {
        let payload = EventPayload::from_json("xr.scene.render", json!({"nodes": 3})).unwrap();
        assert_eq!(payload, EventPayload::Opaque(json!({"nodes": 3})));
        assert!(payload.check_type("xr.scene.render").is_ok());
    }

    #[test]
    fn test_malformed_known_payload_rejected() {
        let err = EventPayload::from_json("consent.grant", json!({"fromSphere": 1})).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Validation);
    }

    #[test]
    fn test_variant_must_match_type() {
        let payload = EventPayload::SessionStart(SessionMarker {
            session_id: "s1".into(),
        });
        assert!(payload.check_type("session.start").is_ok());
        assert!(payload.check_type("session.end").is_err());
    }

    #[test]
    fn test_known_type_rejects_opaque() {
        let err = EventPayload::empty().check_type("decision.make").unwrap_err();
        assert_eq!(err.code(), ErrorCode::Validation);
    }

    #[test]
    fn test_to_json_uses_camel_case() {
        let payload = EventPayload::ConsentGrant(ConsentGranted {
            from_sphere: "personal".into(),
            to_sphere: "work".into(),
        });
        assert_eq!(
            payload.to_json().unwrap(),
            json!({"fromSphere": "personal", "toSphere": "work"})
        );
    }
}
