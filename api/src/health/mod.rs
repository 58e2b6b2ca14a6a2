//! Liveness and readiness probes

pub mod handlers;

use serde::Serialize;

use crate::observability::LifecycleState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessStatus {
    /// Serving traffic and exporting spans
    Ready,
    /// Serving traffic, spans stay in-process
    Degraded,
    /// Not serving, or shutting down
    NotReady,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    pub status: ReadinessStatus,
    pub tracer: LifecycleState,
    pub tracer_strategy: &'static str,
    pub version: &'static str,
}
