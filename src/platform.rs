// src/platform.rs

use core::fmt;

use crate::common::flags::DebugMask;
use crate::regs::RegBank;

/// Board power-sequencing callback: `true` powers the sensor up, `false`
/// powers it down. Errors abort the bind/reset in progress.
pub type PowerHook = Box<dyn FnMut(bool) -> Result<(), &'static str> + Send>;

/// Board-supplied configuration consumed once at bind time.
///
/// Stands in for the platform-data record the host passes alongside the
/// device: master clock, power sequencing and the board-variant feature
/// switches.
pub struct PlatformData {
    /// Master clock into the sensor, in Hz.
    pub mclk_hz: u32,
    /// GPIO/regulator sequencing, owned by the board.
    pub power: Option<PowerHook>,
    /// Board has an AF actuator wired up.
    pub af_supported: bool,
    /// Board has a flash LED wired up.
    pub flash_supported: bool,
    /// Confirm stream-off by polling instead of a fixed frame delay.
    pub streamoff_watchdog: bool,
    /// Issue whole tables as single bus transactions.
    pub burst_writes: bool,
    /// I2C trace gating.
    pub debug: DebugMask,
}

impl Default for PlatformData {
    fn default() -> Self {
        PlatformData {
            mclk_hz: 24_000_000,
            power: None,
            af_supported: false,
            flash_supported: false,
            streamoff_watchdog: false,
            burst_writes: true,
            debug: DebugMask::NONE,
        }
    }
}

impl fmt::Debug for PlatformData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformData")
            .field("mclk_hz", &self.mclk_hz)
            .field("power", &self.power.is_some())
            .field("af_supported", &self.af_supported)
            .field("flash_supported", &self.flash_supported)
            .field("streamoff_watchdog", &self.streamoff_watchdog)
            .field("burst_writes", &self.burst_writes)
            .field("debug", &self.debug)
            .finish()
    }
}

/// Capability descriptor resolved once at bind time.
///
/// Everything the board variant and the compiled register bank decide is
/// folded in here, so the selector and dispatch consult one record instead
/// of scattered conditionals.
#[derive(Debug, Copy, Clone)]
pub struct Capabilities {
    pub af: bool,
    pub flash: bool,
    /// Dedicated night-AF table compiled into the bank.
    pub night_af: bool,
    /// Low-light capture table compiled into the bank.
    pub lowlight_capture: bool,
    pub streamoff_watchdog: bool,
    pub burst_writes: bool,
}

impl Capabilities {
    /// Combines the board feature flags with what the register bank
    /// actually carries: a board flag without a table degrades to
    /// unsupported rather than a missing-table failure at runtime.
    pub fn resolve(pdata: &PlatformData, bank: &RegBank) -> Capabilities {
        Capabilities {
            af: pdata.af_supported,
            flash: pdata.flash_supported,
            night_af: pdata.af_supported && bank.af_night_normal_mode.is_some(),
            lowlight_capture: bank.set_lowlight_cap.is_some(),
            streamoff_watchdog: pdata.streamoff_watchdog,
            burst_writes: pdata.burst_writes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::tables::EVT1_1;

    #[test]
    fn capabilities_follow_board_flags() {
        let pdata = PlatformData {
            af_supported: true,
            flash_supported: true,
            ..PlatformData::default()
        };
        let caps = Capabilities::resolve(&pdata, &EVT1_1);
        assert!(caps.af);
        assert!(caps.flash);
        assert!(caps.night_af, "EVT1.1 bank carries the night AF table");
        assert!(caps.lowlight_capture);

        let plain = Capabilities::resolve(&PlatformData::default(), &EVT1_1);
        assert!(!plain.af);
        assert!(!plain.flash);
        assert!(!plain.night_af, "night AF requires the AF actuator");
    }
}
