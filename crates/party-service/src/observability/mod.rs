//! Observability module for the party service.
//!
//! Metric definitions live in [`metrics`]; tracing targets follow the
//! `party.<component>` convention.

pub mod metrics;
