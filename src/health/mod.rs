// src/health/mod.rs
mod aggregator;
mod liveness;
mod logs;
mod probe;
mod report;
mod resources;
mod supervisor;

pub use aggregator::{collect, run_health_check, Aggregator, PendingProbe};
pub use liveness::{EndpointAttempt, LivenessProbe, LivenessStatus};
pub use logs::{LogFileStatus, LogProbe};
pub use probe::{Probe, ProbeOutcome, ProbeResult};
pub use report::{HealthReport, ReportStatus};
pub use resources::{ResourceProbe, ResourceUsage};
pub use supervisor::{interpret_listing, ProcessStatus, SupervisorError, SupervisorProbe};
