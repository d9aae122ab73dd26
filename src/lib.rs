// THEORY:
// This file is the main entry point for the `cumulus_vision` library crate.
// It exposes the cloud-detection engine as a small public API: build a
// `CloudPipeline` from a `RunConfig` and a `FeatureScorer`, feed it a strip
// and the border crossings, and receive the probability map, one verdict per
// crossing, and the spread-aware selection of crossings worth a closer look.
//
// The analyzers in `core_modules` are usable on their own (the parallel
// pipeline drives `GridManager` directly), but most consumers only need the
// pipeline types re-exported here.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;
pub mod report;

pub use crate::config::RunConfig;
pub use crate::error::{CumulusError, Result, ScoreError};
pub use crate::pipeline::{CloudPipeline, RunOutcome};
