// PftLens - app/mod.rs
//
// Application layer: rule-table loading, batch orchestration, and the
// command-backed second-opinion collaborator.
// Dependencies: core layer.

pub mod batch;
pub mod opinion_cmd;
pub mod tables_mgr;
