//! The fixed global check catalogue: six categories, three checks each

use super::check::{AuditCategory, AuditCheck, CheckScope, Finding};
use super::predicates::{self as p, AuditContext};

type Predicate = fn(&AuditContext<'_>) -> Finding;

/// Static description of one global check
pub struct CheckDefinition {
    pub id: &'static str,
    pub category: AuditCategory,
    pub description: &'static str,
    pub guard: &'static str,
    pub predicate: Predicate,
}

impl CheckDefinition {
    pub fn pending(&self) -> AuditCheck {
        AuditCheck::new(
            self.id,
            self.category,
            self.description,
            self.guard,
            CheckScope::Global,
        )
    }
}

pub const CATALOGUE: [CheckDefinition; 18] = [
    // DATA_LEAKAGE
    CheckDefinition {
        id: "DL-1",
        category: AuditCategory::DataLeakage,
        description: "Query results stay inside the requested spheres unless consent was granted",
        guard: "cross-sphere exposure through queries",
        predicate: p::consented_results,
    },
    CheckDefinition {
        id: "DL-2",
        category: AuditCategory::DataLeakage,
        description: "Events marked private never appear in shared threads",
        guard: "private activity leaking to a team",
        predicate: p::private_stays_private,
    },
    CheckDefinition {
        id: "DL-3",
        category: AuditCategory::DataLeakage,
        description: "Linked spheres have consent in at least one direction",
        guard: "unnoticed coupling between spheres",
        predicate: p::links_have_consent,
    },
    // AUTHORITY_CONFUSION
    CheckDefinition {
        id: "AC-1",
        category: AuditCategory::AuthorityConfusion,
        description: "Every agent event names the acting agent",
        guard: "anonymous agent actions",
        predicate: p::agents_identified,
    },
    CheckDefinition {
        id: "AC-2",
        category: AuditCategory::AuthorityConfusion,
        description: "Consent is only granted by users",
        guard: "agents or the system granting themselves access",
        predicate: p::consent_from_users,
    },
    CheckDefinition {
        id: "AC-3",
        category: AuditCategory::AuthorityConfusion,
        description: "Agent decisions are caused by a prior event",
        guard: "agents deciding unprompted",
        predicate: p::agent_decisions_prompted,
    },
    // COGNITIVE_INFLUENCE
    CheckDefinition {
        id: "CI-1",
        category: AuditCategory::CognitiveInfluence,
        description: "Agents attach no ranking, score or steering labels",
        guard: "hidden ranking of options",
        predicate: p::no_agent_ranking,
    },
    CheckDefinition {
        id: "CI-2",
        category: AuditCategory::CognitiveInfluence,
        description: "Every live decision event is kept in a decision thread",
        guard: "silently dropped alternatives",
        predicate: p::decisions_retained,
    },
    CheckDefinition {
        id: "CI-3",
        category: AuditCategory::CognitiveInfluence,
        description: "No session is dominated by agent activity",
        guard: "agents crowding out the user",
        predicate: p::session_agent_share,
    },
    // MEMORY_DISTORTION
    CheckDefinition {
        id: "MD-1",
        category: AuditCategory::MemoryDistortion,
        description: "Stored events match their append-time digests",
        guard: "mutation of recorded history",
        predicate: p::digests_intact,
    },
    CheckDefinition {
        id: "MD-2",
        category: AuditCategory::MemoryDistortion,
        description: "Session sequence numbers strictly increase",
        guard: "reordered or replayed history",
        predicate: p::sequences_monotonic,
    },
    CheckDefinition {
        id: "MD-3",
        category: AuditCategory::MemoryDistortion,
        description: "Causal parents refer to events the ledger has seen",
        guard: "fabricated provenance",
        predicate: p::causes_known,
    },
    // AGENT_DRIFT
    CheckDefinition {
        id: "AD-1",
        category: AuditCategory::AgentDrift,
        description: "Agents act on targets in the sphere they work in",
        guard: "agents wandering across spheres",
        predicate: p::agents_in_sphere,
    },
    CheckDefinition {
        id: "AD-2",
        category: AuditCategory::AgentDrift,
        description: "Agent events carry a correlation id or a cause",
        guard: "untraceable agent activity",
        predicate: p::agents_linked,
    },
    CheckDefinition {
        id: "AD-3",
        category: AuditCategory::AgentDrift,
        description: "Agent events happen inside a session",
        guard: "background activity nobody opened",
        predicate: p::agents_in_session,
    },
    // USER_DEPENDENCY
    CheckDefinition {
        id: "UD-1",
        category: AuditCategory::UserDependency,
        description: "Finished sessions were closed",
        guard: "sessions left running unattended",
        predicate: p::sessions_closed,
    },
    CheckDefinition {
        id: "UD-2",
        category: AuditCategory::UserDependency,
        description: "Agents do not produce most of the ledger",
        guard: "users handing their work over to agents",
        predicate: p::global_agent_share,
    },
    CheckDefinition {
        id: "UD-3",
        category: AuditCategory::UserDependency,
        description: "Users make at least as many decisions as agents",
        guard: "decision making drifting to agents",
        predicate: p::users_decide,
    },
];

/// Id of the blind-spot check for a sphere
pub fn sphere_check_id(sphere: &str) -> String {
    format!("SPHERE-{}", sphere)
}

/// Fresh PENDING blind-spot check for a sphere
pub fn sphere_check(sphere: &str) -> AuditCheck {
    AuditCheck::new(
        sphere_check_id(sphere),
        AuditCategory::AgentDrift,
        format!("Sphere {} has user presence wherever agents act", sphere),
        "agent activity in spheres no user watches",
        CheckScope::Sphere(sphere.to_string()),
    )
}
