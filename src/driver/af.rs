// src/driver/af.rs

use log::{debug, info, warn};

use crate::common::error::Db8131aError;
use crate::common::flags::AfStatus;
use crate::common::hal_traits::{CamClock, SensorBus};
use crate::common::timing;
use crate::common::types::{FlashMode, FocusMode, PreflashPhase, Runmode, SceneMode};
use crate::platform::Capabilities;
use crate::regs::{status, RegBank, RegTable, REG_PAGE};

use super::{arg, controls, lock, Caller, CtrlState, Db8131a};

// AF window geometry; constants instead of sensor readback.
const FIRST_WINSIZE_X: u32 = 512;
const FIRST_WINSIZE_Y: u32 = 568;
const SCND_WINSIZE_X: u32 = 230;
const SCND_WINSIZE_Y: u32 = 306;

// AF engine command values, page 0x05 register 0x10.
const AF_CMD_OFF: u8 = 0x00;
const AF_CMD_SINGLE: u8 = 0x01;
const AF_CMD_FINE: u8 = 0x03;

/// Focus sub-state; owned by the autofocus lock.
#[derive(Debug)]
pub(crate) struct FocusState<I> {
    pub mode: FocusMode,
    pub status: AfStatus,
    /// First instant the AF window looked stable.
    pub win_stable_first: Option<I>,
    pub win_settled: bool,
    pub pos: (u32, u32),
    pub start: bool,
    pub touch: bool,
    /// Cancel acknowledged and the AF registers rewritten.
    pub reset_done: bool,
}

impl<I> Default for FocusState<I> {
    fn default() -> Self {
        FocusState {
            mode: FocusMode::Auto,
            status: AfStatus::NONE,
            win_stable_first: None,
            win_settled: false,
            pos: (0, 0),
            start: false,
            touch: false,
            reset_done: false,
        }
    }
}

/// Focus state plus ownership tracking, guarded by the autofocus lock so
/// an in-flight sweep never contends with unrelated control traffic.
#[derive(Debug)]
pub(crate) struct AfTrack<I> {
    pub focus: FocusState<I>,
    /// Caller whose AF operation is outstanding; `None` whenever no sweep
    /// is in flight.
    pub owner: Option<Caller>,
    pub cancel_requested: bool,
}

impl<I> Default for AfTrack<I> {
    fn default() -> Self {
        AfTrack {
            focus: FocusState::default(),
            owner: None,
            cancel_requested: false,
        }
    }
}

impl<I> AfTrack<I> {
    /// Clears everything except the user-selected mode and touch position.
    pub(crate) fn reset(&mut self) {
        let mode = self.focus.mode;
        let pos = self.focus.pos;
        self.focus = FocusState { mode, pos, ..FocusState::default() };
        self.owner = None;
        self.cancel_requested = false;
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum SweepOutcome {
    Success,
    Failed,
    Cancelled,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum PassResult {
    Focused,
    Failed,
    Exhausted,
    Cancelled,
}

impl<B, C> Db8131a<B, C>
where
    B: SensorBus + Send + 'static,
    C: CamClock + Send + Sync + 'static,
{
    /// AF start request from `caller`. Claims ownership, arms the sensor's
    /// AF engine and enqueues the background sweep; the caller polls the
    /// result through the AF-result control.
    pub(crate) fn af_start_from(&self, caller: Caller) -> Result<(), Db8131aError<B::Error>> {
        let inner = &self.inner;
        if !inner.caps.af {
            return Err(Db8131aError::NotSupported("autofocus"));
        }
        let mut ctrl = lock(&inner.ctrl);
        if !matches!(ctrl.runmode, Runmode::Running | Runmode::Recording) {
            return Err(Db8131aError::InvalidState {
                op: "af start",
                runmode: ctrl.runmode,
            });
        }

        let (mode, touch) = {
            let mut af = lock(&inner.af);
            if af.focus.status.contains(AfStatus::DOING) {
                if af.owner != Some(caller) {
                    return Err(Db8131aError::PermissionDenied);
                }
                // This caller's sweep is already in flight.
                return Ok(());
            }
            af.focus.status = AfStatus::DOING;
            af.focus.start = true;
            af.focus.reset_done = false;
            af.focus.win_settled = false;
            af.focus.win_stable_first = Some(inner.clock.now());
            af.focus.touch = af.focus.mode == FocusMode::Touch;
            af.owner = Some(caller);
            af.cancel_requested = false;
            (af.focus.mode, af.focus.touch)
        };

        let armed: Result<(), Db8131aError<B::Error>> = (|| {
            if inner.caps.flash && !ctrl.flash.ignore_flash && af_needs_preflash(&*ctrl) {
                let pre_start = &inner.regs.af_pre_flash_start;
                ctrl.write_table(&inner.clock, pre_start)?;
                let ae_set = &inner.regs.flash_ae_set;
                ctrl.write_table(&inner.clock, ae_set)?;
                ctrl.flash.preflash = PreflashPhase::On;
            }
            let mode_table = af_mode_table(inner.regs, &inner.caps, ctrl.scene, mode);
            ctrl.write_table(&inner.clock, mode_table)?;
            let start_table = &inner.regs.single_af_start;
            ctrl.write_table(&inner.clock, start_table)?;
            Ok(())
        })();
        drop(ctrl);

        if let Err(e) = armed {
            let mut af = lock(&inner.af);
            af.focus.status = AfStatus::FAILED;
            af.focus.start = false;
            af.owner = None;
            return Err(e);
        }

        debug!("af start ({mode:?}, touch {touch}) by {caller:?}");
        let drv = self.clone();
        self.wq.queue(move || drv.af_sweep());
        if touch {
            let drv = self.clone();
            self.wq.queue(move || drv.af_window_job());
        }
        Ok(())
    }

    /// AF cancel request. For an in-flight sweep owned by a different
    /// caller this is denied; for the owner it latches `CANCELLED` next to
    /// `DOING` and lets the sweep wind down at its next poll tick. With no
    /// sweep in flight the AF registers are rewritten immediately.
    pub(crate) fn af_stop_from(&self, caller: Caller) -> Result<(), Db8131aError<B::Error>> {
        let inner = &self.inner;
        if !inner.caps.af {
            return Err(Db8131aError::NotSupported("autofocus"));
        }
        let mut ctrl = lock(&inner.ctrl);
        let mut af = lock(&inner.af);

        if af.focus.status.contains(AfStatus::DOING) {
            if af.owner != Some(caller) {
                return Err(Db8131aError::PermissionDenied);
            }
            af.cancel_requested = true;
            af.focus.status.insert(AfStatus::CANCELLED);
            af.focus.start = false;
            debug!("af cancel latched by {caller:?}");
            return Ok(());
        }

        // Idle cancel: acknowledge by rewriting the AF registers now.
        let af_off = &inner.regs.af_off;
        ctrl.write_table(&inner.clock, af_off)?;
        let mode_table = af_mode_table(inner.regs, &inner.caps, ctrl.scene, af.focus.mode);
        ctrl.write_table(&inner.clock, mode_table)?;
        af.focus.status = AfStatus::CANCELLED;
        af.focus.reset_done = true;
        af.focus.start = false;
        af.owner = None;
        Ok(())
    }

    pub(crate) fn set_focus_mode(&self, value: i32) -> Result<(), Db8131aError<B::Error>> {
        let inner = &self.inner;
        if !inner.caps.af {
            return Err(Db8131aError::NotSupported("autofocus"));
        }
        let mode = arg::<_, B::Error>(controls::CtrlId::FocusMode, value, controls::focus_mode_from(value))?;
        let mut ctrl = lock(&inner.ctrl);
        ctrl.require_ready("focus mode")?;
        let table = af_mode_table(inner.regs, &inner.caps, ctrl.scene, mode);
        ctrl.write_table(&inner.clock, table)?;
        drop(ctrl);
        let mut af = lock(&inner.af);
        af.focus.mode = mode;
        Ok(())
    }

    pub(crate) fn set_object_position(
        &self,
        x: Option<u32>,
        y: Option<u32>,
    ) -> Result<(), Db8131aError<B::Error>> {
        let inner = &self.inner;
        if !inner.caps.af {
            return Err(Db8131aError::NotSupported("autofocus"));
        }
        let mut af = lock(&inner.af);
        if let Some(x) = x {
            af.focus.pos.0 = x;
        }
        if let Some(y) = y {
            af.focus.pos.1 = y;
        }
        Ok(())
    }

    /// Background AF sweep: coarse pass, fine pass, bounded polling.
    /// Always clears the owning caller on exit so a new start is
    /// permitted.
    pub(crate) fn af_sweep(&self) {
        let inner = &self.inner;
        let outcome = self.run_af_passes();

        {
            let mut ctrl = lock(&inner.ctrl);
            if ctrl.flash.preflash == PreflashPhase::On {
                let pre_end = &inner.regs.af_pre_flash_end;
                if let Err(e) = ctrl.write_table(&inner.clock, pre_end) {
                    warn!("af: pre-flash end failed: {e}");
                }
                let ae_clear = &inner.regs.flash_ae_clear;
                if let Err(e) = ctrl.write_table(&inner.clock, ae_clear) {
                    warn!("af: flash AE restore failed: {e}");
                }
                ctrl.flash.preflash = PreflashPhase::Off;
            }
            if outcome == SweepOutcome::Cancelled {
                let af_off = &inner.regs.af_off;
                if let Err(e) = ctrl.write_table(&inner.clock, af_off) {
                    warn!("af: off table failed during cancel: {e}");
                }
            }
        }

        let mut af = lock(&inner.af);
        af.focus.status = match outcome {
            SweepOutcome::Success => AfStatus::SUCCESS,
            SweepOutcome::Failed => AfStatus::FAILED,
            SweepOutcome::Cancelled => AfStatus::CANCELLED,
        };
        if outcome == SweepOutcome::Cancelled {
            af.focus.reset_done = true;
        }
        af.focus.start = false;
        af.owner = None;
        af.cancel_requested = false;
        info!("af finished: {:?}", af.focus.status);
    }

    fn run_af_passes(&self) -> SweepOutcome {
        match self.af_poll_pass(timing::FIRST_AF_SEARCH_COUNT) {
            PassResult::Focused => {}
            PassResult::Cancelled => return SweepOutcome::Cancelled,
            PassResult::Failed | PassResult::Exhausted => return SweepOutcome::Failed,
        }
        if self.arm_fine_pass().is_err() {
            return SweepOutcome::Failed;
        }
        match self.af_poll_pass(timing::SECOND_AF_SEARCH_COUNT) {
            PassResult::Focused => SweepOutcome::Success,
            PassResult::Cancelled => SweepOutcome::Cancelled,
            PassResult::Failed | PassResult::Exhausted => SweepOutcome::Failed,
        }
    }

    fn af_poll_pass(&self, budget: u32) -> PassResult {
        let inner = &self.inner;
        for _ in 0..budget {
            if lock(&inner.af).cancel_requested {
                return PassResult::Cancelled;
            }
            let read = {
                let mut ctrl = lock(&inner.ctrl);
                ctrl.read_page_reg(0x02, status::AF_STATUS)
            };
            match read {
                Ok(status::AF_FOCUSED) => return PassResult::Focused,
                Ok(status::AF_FAILED) => return PassResult::Failed,
                Ok(_) => {}
                Err(e) => {
                    warn!("af: status read failed: {e}");
                    return PassResult::Failed;
                }
            }
            inner
                .clock
                .delay_ms(timing::AF_SEARCH_DELAY.as_millis() as u32);
        }
        PassResult::Exhausted
    }

    fn arm_fine_pass(&self) -> Result<(), Db8131aError<B::Error>> {
        let mut ctrl = lock(&self.inner.ctrl);
        ctrl.bus.write_reg(REG_PAGE, 0x05).map_err(Db8131aError::Io)?;
        ctrl.bus.write_reg(0x10, AF_CMD_FINE).map_err(Db8131aError::Io)
    }

    /// Secondary handler: waits for the AF window to settle (one frame
    /// delay from the start instant) and then programs the touch window.
    /// Runs as its own unit of work so it never blocks the sweep cadence.
    pub(crate) fn af_window_job(&self) {
        let inner = &self.inner;
        let Some(first) = lock(&inner.af).focus.win_stable_first else {
            return;
        };
        let settle = lock(&inner.ctrl).one_frame_delay;
        let poll_ms = timing::POLL_INTERVAL.as_millis() as u32;
        let budget = (3 * settle.as_millis() as u32 / poll_ms) + 1;

        for _ in 0..budget {
            if lock(&inner.af).cancel_requested {
                return;
            }
            if inner.clock.elapsed_since(first) >= settle {
                let pos = lock(&inner.af).focus.pos;
                {
                    let mut ctrl = lock(&inner.ctrl);
                    if let Err(e) = write_af_window(&mut *ctrl, pos) {
                        warn!("af window write failed: {e}");
                        return;
                    }
                }
                let mut af = lock(&inner.af);
                af.focus.win_settled = true;
                debug!("af window settled at ({}, {})", pos.0, pos.1);
                return;
            }
            inner.clock.delay_ms(poll_ms);
        }
        warn!("af window did not settle");
    }
}

fn af_needs_preflash<B, I>(ctrl: &CtrlState<B, I>) -> bool {
    match ctrl.flash.mode {
        FlashMode::On | FlashMode::Torch => true,
        FlashMode::Auto => ctrl.light_level <= timing::FLASH_LOW_LIGHT_LEVEL,
        FlashMode::Off => false,
    }
}

/// Focus-mode table selection; night scenes take the dedicated table when
/// the board variant carries it.
fn af_mode_table<'a>(
    regs: &'a RegBank,
    caps: &Capabilities,
    scene: SceneMode,
    mode: FocusMode,
) -> &'a RegTable {
    match mode {
        FocusMode::Macro => &regs.af_macro_mode,
        FocusMode::Auto | FocusMode::Touch => {
            if scene == SceneMode::Night && caps.night_af {
                if let Some(table) = regs.af_night_normal_mode.as_ref() {
                    return table;
                }
            }
            &regs.af_normal_mode
        }
    }
}

/// Programs first and second AF windows centered on the touch position.
fn write_af_window<B: SensorBus, I: Copy>(
    ctrl: &mut CtrlState<B, I>,
    pos: (u32, u32),
) -> Result<(), Db8131aError<B::Error>> {
    let (fx, fy) = window_origin(pos, FIRST_WINSIZE_X, FIRST_WINSIZE_Y);
    let (sx, sy) = window_origin(pos, SCND_WINSIZE_X, SCND_WINSIZE_Y);
    let bus = &mut ctrl.bus;
    bus.write_reg(REG_PAGE, 0x05).map_err(Db8131aError::Io)?;
    for (reg, value) in [
        (0x30, (fx >> 8) as u8),
        (0x31, (fx & 0xFF) as u8),
        (0x32, (fy >> 8) as u8),
        (0x33, (fy & 0xFF) as u8),
        (0x34, (sx >> 8) as u8),
        (0x35, (sx & 0xFF) as u8),
        (0x36, (sy >> 8) as u8),
        (0x37, (sy & 0xFF) as u8),
    ] {
        bus.write_reg(reg, value).map_err(Db8131aError::Io)?;
    }
    Ok(())
}

fn window_origin(pos: (u32, u32), width: u32, height: u32) -> (u16, u16) {
    (
        pos.0.saturating_sub(width / 2).min(u32::from(u16::MAX)) as u16,
        pos.1.saturating_sub(height / 2).min(u32::from(u16::MAX)) as u16,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::controls::CtrlId;
    use crate::driver::testutil::*;
    use crate::platform::PlatformData;

    const SEARCHING: u8 = status::AF_SEARCHING;
    const FOCUSED: u8 = status::AF_FOCUSED;

    fn af_pdata() -> PlatformData {
        PlatformData { af_supported: true, ..PlatformData::default() }
    }

    fn other_caller() -> Caller {
        std::thread::spawn(|| Caller::current())
            .join()
            .expect("caller probe thread")
    }

    fn running_af_driver() -> TestDriver {
        let drv = init_idle_driver(af_pdata());
        start_preview(&drv);
        drv
    }

    #[test]
    fn af_start_requires_streaming() {
        let drv = init_idle_driver(af_pdata());
        let err = drv.af_start_from(Caller::current()).unwrap_err();
        assert!(matches!(
            err,
            Db8131aError::InvalidState { runmode: Runmode::Init, .. }
        ));
    }

    #[test]
    fn af_start_claims_ownership_and_arms_the_engine() {
        let drv = running_af_driver();
        let me = Caller::current();
        drv.af_start_from(me).unwrap();
        {
            let af = lock(&drv.inner.af);
            assert_eq!(af.focus.status, AfStatus::DOING);
            assert_eq!(af.owner, Some(me));
            assert!(af.focus.start);
            assert!(!af.focus.reset_done);
        }
        let ctrl = lock(&drv.inner.ctrl);
        // Normal-mode table then the single AF trigger.
        assert!(ctrl.bus.wrote(0x20, 0x01));
        assert!(ctrl.bus.wrote(0x10, AF_CMD_SINGLE));
    }

    #[test]
    fn af_restart_by_owner_is_idempotent_while_doing() {
        let drv = running_af_driver();
        let me = Caller::current();
        drv.af_start_from(me).unwrap();
        let writes = lock(&drv.inner.ctrl).bus.writes.len();
        drv.af_start_from(me).unwrap();
        assert_eq!(
            lock(&drv.inner.ctrl).bus.writes.len(),
            writes,
            "second start from the owner must not re-arm"
        );
    }

    #[test]
    fn af_start_while_doing_from_other_thread_is_denied() {
        let drv = running_af_driver();
        drv.af_start_from(Caller::current()).unwrap();
        let err = drv.af_start_from(other_caller()).unwrap_err();
        assert!(matches!(err, Db8131aError::PermissionDenied));
    }

    #[test]
    fn af_cancel_from_other_thread_is_denied() {
        let drv = running_af_driver();
        drv.af_start_from(Caller::current()).unwrap();
        let err = drv.af_stop_from(other_caller()).unwrap_err();
        assert!(matches!(err, Db8131aError::PermissionDenied));
        // The sweep is still owned and marked in progress.
        assert!(lock(&drv.inner.af).focus.status.contains(AfStatus::DOING));
    }

    #[test]
    fn sweep_succeeds_after_stability_polls() {
        let drv = running_af_driver();
        {
            let mut ctrl = lock(&drv.inner.ctrl);
            ctrl.bus.stage_read(
                0x02,
                status::AF_STATUS,
                &[
                    SEARCHING, SEARCHING, SEARCHING, SEARCHING, SEARCHING, FOCUSED,
                    SEARCHING, FOCUSED,
                ],
            );
        }
        drv.af_start_from(Caller::current()).unwrap();
        drv.af_sweep();

        let af = lock(&drv.inner.af);
        assert_eq!(af.focus.status, AfStatus::SUCCESS);
        assert_eq!(af.owner, None, "initiating id clears on completion");
        assert!(!af.focus.start);
        drop(af);
        assert_eq!(
            drv.g_ctrl(CtrlId::AutoFocusResult.raw()).unwrap(),
            i32::from(AfStatus::SUCCESS.bits())
        );
        // The fine pass was armed between the two passes.
        assert!(lock(&drv.inner.ctrl).bus.wrote(0x10, AF_CMD_FINE));
    }

    #[test]
    fn sweep_exhaustion_reports_failed_status_not_error() {
        let drv = running_af_driver();
        {
            let mut ctrl = lock(&drv.inner.ctrl);
            ctrl.bus.stage_read(0x02, status::AF_STATUS, &[SEARCHING]);
        }
        drv.af_start_from(Caller::current()).unwrap();
        drv.af_sweep();

        let af = lock(&drv.inner.af);
        assert_eq!(af.focus.status, AfStatus::FAILED);
        assert_eq!(af.owner, None);
    }

    #[test]
    fn cancel_latches_then_sweep_finishes_it() {
        let drv = running_af_driver();
        {
            let mut ctrl = lock(&drv.inner.ctrl);
            ctrl.bus.stage_read(0x02, status::AF_STATUS, &[SEARCHING]);
        }
        let me = Caller::current();
        drv.af_start_from(me).unwrap();
        drv.af_stop_from(me).unwrap();
        {
            let af = lock(&drv.inner.af);
            // DOING and the latched CANCELLED coexist until the sweep exits.
            assert!(af.focus.status.contains(AfStatus::DOING));
            assert!(af.focus.status.contains(AfStatus::CANCELLED));
            assert!(!af.focus.reset_done);
        }

        drv.af_sweep();
        let af = lock(&drv.inner.af);
        assert_eq!(af.focus.status, AfStatus::CANCELLED);
        assert!(af.focus.reset_done);
        assert_eq!(af.owner, None);
        drop(af);
        // Cancel path rewrote the AF-off table.
        assert!(lock(&drv.inner.ctrl).bus.wrote(0x10, AF_CMD_OFF));
    }

    #[test]
    fn idle_cancel_resets_immediately() {
        let drv = running_af_driver();
        drv.af_stop_from(Caller::current()).unwrap();
        let af = lock(&drv.inner.af);
        assert_eq!(af.focus.status, AfStatus::CANCELLED);
        assert!(af.focus.reset_done);
        assert_eq!(af.owner, None);
    }

    #[test]
    fn terminal_status_allows_a_fresh_start() {
        let drv = running_af_driver();
        {
            let mut ctrl = lock(&drv.inner.ctrl);
            ctrl.bus.stage_read(0x02, status::AF_STATUS, &[SEARCHING]);
        }
        drv.af_start_from(Caller::current()).unwrap();
        drv.af_sweep();
        assert_eq!(lock(&drv.inner.af).focus.status, AfStatus::FAILED);

        // A different thread may start now that the sweep is terminal.
        let other = other_caller();
        drv.af_start_from(other).unwrap();
        let af = lock(&drv.inner.af);
        assert_eq!(af.focus.status, AfStatus::DOING);
        assert_eq!(af.owner, Some(other));
    }

    #[test]
    fn touch_window_programs_after_settling() {
        let drv = running_af_driver();
        drv.s_ctrl(CtrlId::FocusMode.raw(), 2).unwrap(); // touch
        drv.s_ctrl(CtrlId::ObjectPositionX.raw(), 400).unwrap();
        drv.s_ctrl(CtrlId::ObjectPositionY.raw(), 300).unwrap();
        drv.af_start_from(Caller::current()).unwrap();
        assert!(lock(&drv.inner.af).focus.touch);

        drv.af_window_job();
        let af = lock(&drv.inner.af);
        assert!(af.focus.win_settled);
        drop(af);
        let ctrl = lock(&drv.inner.ctrl);
        // First window origin: 400 - 512/2 saturates to 144; 300 - 284 = 16.
        assert!(ctrl.bus.wrote(0x31, 144));
        assert!(ctrl.bus.wrote(0x33, 16));
        // Second window origin: 400 - 115 = 285, 300 - 153 = 147.
        assert!(ctrl.bus.wrote(0x35, (285u16 & 0xFF) as u8));
        assert!(ctrl.bus.wrote(0x37, 147));
    }

    #[test]
    fn night_scene_uses_the_night_af_table() {
        let regs = &crate::regs::tables::EVT1_1;
        let caps = Capabilities::resolve(&af_pdata(), regs);
        let table = af_mode_table(regs, &caps, SceneMode::Night, FocusMode::Auto);
        assert_eq!(table.name, "AF_NIGHT_NORMAL_MODE");
        let table = af_mode_table(regs, &caps, SceneMode::None, FocusMode::Auto);
        assert_eq!(table.name, "AF_NORMAL_MODE");
        let table = af_mode_table(regs, &caps, SceneMode::Night, FocusMode::Macro);
        assert_eq!(table.name, "AF_MACRO_MODE");
    }
}
