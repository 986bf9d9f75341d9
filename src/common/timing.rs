// src/common/timing.rs

use core::time::Duration;

// Values are from the EVT1.1 firmware bring-up; the search counts bound
// every polling loop in the driver so no background handler can spin
// unbounded against a wedged sensor.

// === Generic polling ===

/// Cadence for short status polls (stream-off, power settle).
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);
/// Upper bound on a capture-completion wait.
pub const CAPTURE_POLL_TIMEOUT: Duration = Duration::from_millis(1000);

// === Frame timing ===

/// Maximum time for one frame in normal light.
pub const ONE_FRAME_DELAY_NORMAL: Duration = Duration::from_millis(66);
/// Maximum time for one frame in low light (minimum 10 fps).
pub const ONE_FRAME_DELAY_LOW: Duration = Duration::from_millis(100);
/// Maximum time for one frame in night mode (6 fps).
pub const ONE_FRAME_DELAY_NIGHT: Duration = Duration::from_millis(166);

// === Light level ===

/// Light level at or below which auto flash must fire.
pub const FLASH_LOW_LIGHT_LEVEL: u32 = 0x4A;

// === Autofocus search ===

/// Poll cadence of the AF sweep.
pub const AF_SEARCH_DELAY: Duration = Duration::from_millis(33);
/// Poll budget for the coarse (first-pass) search.
pub const FIRST_AF_SEARCH_COUNT: u32 = 220;
/// Poll budget for the fine (second-pass) search.
pub const SECOND_AF_SEARCH_COUNT: u32 = 220;

// === Auto-exposure stabilization ===

/// Poll cadence while waiting for AE to stabilize before capture.
pub const AE_STABLE_SEARCH_DELAY: Duration = Duration::from_millis(33);
/// Poll budget for AE stabilization; exhaustion is recorded, not fatal.
pub const AE_STABLE_SEARCH_COUNT: u32 = 22;

// === Stream-off watchdog ===

/// Poll budget for stream-off confirmation; exhaustion is fatal.
pub const STREAMOFF_CHK_COUNT: u32 = 150;
