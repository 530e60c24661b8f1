//! Workflow execution
//!
//! The coordinator gates and records workflow runs; the two pipelines
//! (parallel drafts + synthesis, sequential stages) execute translate jobs;
//! the cancellation module propagates a user cancel through every layer in
//! order; workers are the poll loops that claim jobs from the ledger.

pub mod cancellation;
pub mod coordinator;
pub mod draft_pipeline;
pub mod guards;
pub mod stage_pipeline;
pub mod worker;
