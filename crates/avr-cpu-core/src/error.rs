use thiserror::Error;

use crate::features::Features;
use crate::snapshot::SnapshotError;

pub type Result<T> = std::result::Result<T, CpuError>;

#[derive(Debug, Error)]
pub enum CpuError {
    #[error("unknown CPU model {0:?}")]
    UnknownModel(String),

    #[error("invalid feature set {features:?}: {reason}")]
    Misconfiguration {
        features: Features,
        reason: &'static str,
    },

    #[error("interrupt line {0} out of range")]
    InvalidInterruptLine(u32),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}
