//! Carbon-aware VM placement evaluation
//!
//! This crate compares placement policies for simulated datacenters on
//! completion, energy and carbon. A policy picks a host for every VM, an
//! engine executes the experiment, and the evaluation harness turns the
//! outcome into per-run records and cross-run statistics.

pub mod carbon_aware;
pub mod config;
pub mod engine;
pub mod error;
pub mod evaluation;
pub mod scheduler;

pub use crate::config::EvaluationConfig;
pub use crate::error::{Error, Result};
