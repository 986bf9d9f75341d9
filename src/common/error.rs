// src/common/error.rs

use core::fmt::Debug;

use super::types::Runmode;

/// Driver error, generic over the bus implementation's error type.
///
/// Validation and state-machine failures are rejected at the dispatch
/// boundary without touching the sensor; `Io` aborts the in-progress
/// request with no partial state commit.
#[derive(Debug, thiserror::Error)]
pub enum Db8131aError<E = ()>
where
    E: Debug,
{
    /// Underlying bus error from the `SensorBus` implementation.
    #[error("bus error: {0:?}")]
    Io(E),

    /// Bounded wait exhausted (stream-off watchdog, power sequencing).
    #[error("operation timed out")]
    Timeout,

    /// Control id not part of the dispatch surface.
    #[error("unknown control id {0:#010x}")]
    UnknownControl(u32),

    /// Control value outside the control's declared bounds.
    #[error("value {value} out of range [{min}, {max}] for control {id:#010x}")]
    OutOfRange { id: u32, value: i32, min: i32, max: i32 },

    /// Register-table index outside the category's declared size.
    #[error("index {index} out of bounds for {category} ({size} tables)")]
    BadTableIndex {
        category: &'static str,
        index: usize,
        size: usize,
    },

    /// Setting has no register table on this board variant.
    #[error("{0} not supported on this board variant")]
    NotSupported(&'static str),

    /// Request is not legal in the current run mode.
    #[error("{op} rejected in run mode {runmode:?}")]
    InvalidState { op: &'static str, runmode: Runmode },

    /// Autofocus operation owned by a different caller.
    #[error("autofocus is owned by another caller")]
    PermissionDenied,

    /// Probed chip did not identify as a DB8131A.
    #[error("chip id {id:#06x} rev {rev:#04x} is not a DB8131A")]
    WrongChip { id: u16, rev: u8 },

    /// Board power-sequencing callback failed.
    #[error("power sequencing failed: {0}")]
    Power(&'static str),
}

impl<E: Debug> Db8131aError<E> {
    /// True for the errors a caller can fix by issuing a different request
    /// (bad argument or wrong mode), as opposed to hardware faults.
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            Db8131aError::UnknownControl(_)
                | Db8131aError::OutOfRange { .. }
                | Db8131aError::BadTableIndex { .. }
                | Db8131aError::NotSupported(_)
                | Db8131aError::InvalidState { .. }
                | Db8131aError::PermissionDenied
        )
    }
}
