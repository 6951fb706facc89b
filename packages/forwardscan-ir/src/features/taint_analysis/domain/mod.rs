// Domain layer - pure data for the URL-forward taint analysis
//
// - signature:   roles the catalog assigns to calls
// - flow_node:   value-flow graph nodes and edges
// - guard:       decomposed boolean tests
// - taint_value: taint lattice with provenance
// - finding:     barrier evaluations and findings

mod finding;
mod flow_node;
mod guard;
mod signature;
mod taint_value;

pub use finding::{
    AppliedBarrier, BarrierEvaluation, BarrierRule, BarrierVerdict, Finding, PathStep,
    UnstableReason, Verdict,
};
pub use flow_node::{EdgeKind, FlowEdge, FlowNode, GuardId, GuardTag, NodeKind};
pub use guard::{GuardAtom, GuardCondition, GuardOperand, GuardOperator};
pub use signature::{CallRole, CallSignature, SanitizerKind};
pub use taint_value::{Check, DecodeLevel, PrecedingOps, TaintState, TaintValue};
