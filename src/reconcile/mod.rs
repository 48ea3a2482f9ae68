//! Keeps each device's remote block rule in line with its schedule.

use thiserror::Error;

use crate::router::source::SourceError;
use crate::router::GatewayError;

pub mod reconciler;
pub mod runner;

pub use reconciler::{reconcile, ReconcileOutcome};
pub use runner::{CycleReport, DeviceFailure, ReconcileRunner};

/// Reconciliation errors for a single device
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Rule source error: {0}")]
    Source(#[from] SourceError),
}

/// Result type for reconciliation
pub type ReconcileResult<T> = Result<T, ReconcileError>;
