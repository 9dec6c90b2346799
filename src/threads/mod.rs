//! Thread deriver
//!
//! Maintains seven typed thread views over the ledger plus the triple-layer
//! partition (inter-sphere links, personal threads, team clusters). Views are
//! update-only: a thread is never merged with another, re-scored or labelled.

mod deriver;
mod layers;
mod types;

pub use deriver::{SharedDeriver, ThreadDeriver};
pub use layers::{
    CollectiveCluster, InterSphereLink, LinkBasis, PersonalSegment, PersonalThread, RemovedLink,
    SegmentKind,
};
pub use types::{
    thread_id, BranchKind, CollectiveThread, ConceptualThread, ContextThread, DecisionBranch,
    DecisionThread, EvolutionStatus, EvolutionStep, EvolutionThread, FactKind, FactNode,
    FactThread, TemporalEdge, TemporalNode, TemporalRelation, TemporalThread, Thread, ThreadKind,
    ThreadView, Visibility, COMMON_FIELDS,
};
