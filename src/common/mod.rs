// src/common/mod.rs

pub mod error;
pub mod flags;
pub mod hal_traits;
pub mod timing;
pub mod types;

// --- Re-export key types for easier access ---

pub use error::Db8131aError;
pub use flags::{AfStatus, DebugMask};
pub use hal_traits::{CamClock, SensorBus, StdClock};
pub use types::{
    CaptureSize, Ev, Exif, FlashMode, FocusMode, FormatMode, FpsIndex, FrameSize, ImageEffect,
    Iso, Level, Metering, OperatingMode, PixFormat, PixelFormat, PreflashPhase, PreviewSize,
    Runmode, SceneMode, StreamCmd, WhiteBalanceMode, WideRequest,
};

#[cfg(feature = "impl-hal")]
pub use hal_traits::HalI2cBus;
