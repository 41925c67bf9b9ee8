//! Scheduling and essay-scoring core of the essay platform, plus the
//! line-delimited JSON sidecar that serves it.

pub mod config;
pub mod db;
pub mod grading;
pub mod ipc;
pub mod schedule;
pub mod store;
pub mod telemetry;

pub use grading::{
    average_final_scores, resolve_divergence, DivergenceResult, FinalScores, GradingPair,
};
pub use schedule::{resolve_status, Status, TimedEvent};
