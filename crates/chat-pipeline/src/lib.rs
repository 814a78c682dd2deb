//! The nine-stage request pipeline (L0..L9) plus the two orchestrators
//! that sequence them. Each `lN_*` module is independently testable and
//! knows nothing about HTTP; `orchestrator` is the only module that
//! wires a full request end to end.

pub mod l0_gateway;
pub mod l1_sanitize;
pub mod l2_classifier;
pub mod l2l3_fused;
pub mod l3_intent;
pub mod l4_router;
pub mod l5_context;
pub mod l5_semantic;
pub mod l6_generator;
pub mod l7_revision;
pub mod l8_safety;
pub mod l9_response;
pub mod orchestrator;
pub mod tools;
pub mod types;

pub use l5_semantic::SemanticRetriever;
pub use orchestrator::{FastPipelineOrchestrator, OrchestratorDeps, PipelineOrchestrator};
