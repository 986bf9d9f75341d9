// src/driver/mod.rs

pub mod af;
pub mod controls;
pub(crate) mod worker;

use core::time::Duration;
use std::sync::{Arc, Mutex, MutexGuard};

use arrayvec::ArrayVec;
use log::{debug, error, info, warn};

use crate::common::error::Db8131aError;
use crate::common::flags::{AfStatus, DebugMask};
use crate::common::hal_traits::{CamClock, SensorBus};
use crate::common::timing;
use crate::common::types::{
    exif_flash, find_framesize, Ev, Exif, FlashMode, FormatMode, FpsIndex, FrameSize,
    ImageEffect, Iso, Level, Metering, OperatingMode, PixFormat, PreflashPhase, Runmode,
    SceneMode, StreamCmd, WhiteBalanceMode, WideRequest, CAPTURE_FRAMESIZES,
    PREVIEW_FRAMESIZES,
};
use crate::platform::{Capabilities, PlatformData, PowerHook};
use crate::regs::{self, status, tables, Category, RegBank, RegTable, REG_DELAY, REG_PAGE};

use controls::CtrlId;

/// Identity of the thread driving a control request; stands in for the
/// process id the host kernel would report.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Caller(std::thread::ThreadId);

impl Caller {
    pub fn current() -> Caller {
        Caller(std::thread::current().id())
    }
}

/// Preview-path bookkeeping.
#[derive(Debug)]
pub(crate) struct PreviewState {
    pub frmsize: &'static FrameSize,
    pub update_frmsize: bool,
    pub fast_ae: bool,
}

/// Capture-path bookkeeping.
#[derive(Debug)]
pub(crate) struct CaptureState {
    pub frmsize: &'static FrameSize,
    /// Capture tables pre-selected while still previewing.
    pub pre_req: bool,
    pub ae_manual_mode: bool,
    pub lowlux_night: bool,
    /// Capture register state is on the sensor.
    pub ready: bool,
}

/// AE gain/offset backup while the flash overrides metering.
#[derive(Debug, Default, Copy, Clone)]
pub(crate) struct AeGainOffset {
    pub ae_auto: u32,
    pub ae_now: u32,
    pub ersc_auto: u32,
    pub ersc_now: u32,
    pub ae_ofsetval: u32,
    pub ae_maxdiff: u32,
}

#[derive(Debug)]
pub(crate) struct FlashState {
    pub ae_offset: AeGainOffset,
    pub mode: FlashMode,
    pub preflash: PreflashPhase,
    /// Settle time before AWB may be unlocked after the flash fired.
    pub awb_delay: Duration,
    /// AE scale backup while flash metering is active.
    pub ae_scl: u32,
    pub on: bool,
    pub ignore_flash: bool,
    pub ae_flash_lock: bool,
}

impl Default for FlashState {
    fn default() -> Self {
        FlashState {
            ae_offset: AeGainOffset::default(),
            mode: FlashMode::Off,
            preflash: PreflashPhase::None,
            awb_delay: Duration::from_millis(210),
            ae_scl: 0,
            on: false,
            ignore_flash: false,
            ae_flash_lock: false,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct ExposureState {
    pub val: Ev,
    pub ae_lock: bool,
}

#[derive(Debug, Default)]
pub(crate) struct WhiteBalanceState {
    pub mode: WhiteBalanceMode,
    pub awb_lock: bool,
}

/// Current ISP tuning selections, mirrored after each applied table.
#[derive(Debug, Default)]
pub(crate) struct TuningState {
    pub metering: Metering,
    pub iso: Iso,
    pub effect: ImageEffect,
    pub saturation: Level,
    pub contrast: Level,
    pub sharpness: Level,
}

/// Stream timing bookkeeping for frame-delay estimates.
#[derive(Debug)]
pub(crate) struct StreamTime<I> {
    pub before: Option<I>,
    pub current: Option<I>,
}

impl<I> Default for StreamTime<I> {
    fn default() -> Self {
        StreamTime { before: None, current: None }
    }
}

/// Everything guarded by the general control lock: run mode, the bus, and
/// all non-focus sub-state. Mutation only happens while the lock is held.
pub(crate) struct CtrlState<B, I> {
    pub bus: B,
    pub power: Option<PowerHook>,
    pub debug: DebugMask,
    pub burst: bool,
    pub mclk_hz: u32,

    pub runmode: Runmode,
    pub oprmode: OperatingMode,
    pub movie_mode: bool,
    pub vt_mode: bool,
    pub req_fmt: Option<PixFormat>,
    pub scene: SceneMode,
    pub wide_cmd: WideRequest,
    pub return_to_preview: bool,

    pub preview: PreviewState,
    pub capture: CaptureState,
    pub flash: FlashState,
    pub exposure: ExposureState,
    pub wb: WhiteBalanceState,
    pub tuning: TuningState,

    pub req_fps: FpsIndex,
    pub fps: u32,
    pub light_level: u32,
    pub one_frame_delay: Duration,
    pub exif: Exif,
    pub stream_time: StreamTime<I>,

    pub initialized: bool,
    /// The stream-off watchdog gave up; only a reset clears this.
    pub stream_fault: bool,
}

const BURST_CHUNK: usize = 32;

impl<B: SensorBus, I: Copy> CtrlState<B, I> {
    /// Applies a whole register table, honoring delay markers. Burst mode
    /// folds consecutive pairs into single transactions; the fallback
    /// issues them one by one. Any bus failure aborts immediately.
    pub(crate) fn write_table(
        &mut self,
        clock: &impl CamClock,
        table: &RegTable,
    ) -> Result<(), Db8131aError<B::Error>> {
        if self.debug.contains(DebugMask::I2C_BURSTS) {
            debug!("write_regs: {} ({} pairs)", table.name, table.len());
        }
        if self.burst {
            let mut chunk = ArrayVec::<(u8, u8), BURST_CHUNK>::new();
            for &(addr, value) in table.regs {
                if addr == REG_DELAY {
                    self.flush_burst(&mut chunk)?;
                    clock.delay_ms(u32::from(value));
                    continue;
                }
                if chunk.is_full() {
                    self.flush_burst(&mut chunk)?;
                }
                chunk.push((addr, value));
            }
            self.flush_burst(&mut chunk)?;
        } else {
            for &(addr, value) in table.regs {
                if addr == REG_DELAY {
                    clock.delay_ms(u32::from(value));
                    continue;
                }
                if self.debug.contains(DebugMask::I2C) {
                    debug!("write_reg: {addr:#04x} <- {value:#04x}");
                }
                self.bus.write_reg(addr, value).map_err(Db8131aError::Io)?;
            }
        }
        Ok(())
    }

    fn flush_burst(
        &mut self,
        chunk: &mut ArrayVec<(u8, u8), BURST_CHUNK>,
    ) -> Result<(), Db8131aError<B::Error>> {
        if chunk.is_empty() {
            return Ok(());
        }
        self.bus.write_burst(chunk).map_err(Db8131aError::Io)?;
        chunk.clear();
        Ok(())
    }

    /// Points the map at `page` and reads one register back.
    pub(crate) fn read_page_reg(
        &mut self,
        page: u8,
        reg: u8,
    ) -> Result<u8, Db8131aError<B::Error>> {
        self.bus.write_reg(REG_PAGE, page).map_err(Db8131aError::Io)?;
        self.bus.read_reg(reg).map_err(Db8131aError::Io)
    }

    /// Issues a status-pointer table, then reads the addressed register.
    pub(crate) fn read_status_reg(
        &mut self,
        clock: &impl CamClock,
        pointer: &RegTable,
        reg: u8,
    ) -> Result<u8, Db8131aError<B::Error>> {
        self.write_table(clock, pointer)?;
        self.bus.read_reg(reg).map_err(Db8131aError::Io)
    }

    fn require_ready(&self, op: &'static str) -> Result<(), Db8131aError<B::Error>> {
        if self.runmode == Runmode::Notready {
            return Err(Db8131aError::InvalidState { op, runmode: self.runmode });
        }
        Ok(())
    }
}

/// Shared per-device record; exactly one per bound sensor.
pub(crate) struct Inner<B: SensorBus, C: CamClock> {
    pub ctrl: Mutex<CtrlState<B, C::Instant>>,
    pub af: Mutex<af::AfTrack<C::Instant>>,
    pub clock: C,
    pub regs: &'static RegBank,
    pub caps: Capabilities,
}

/// Driver handle for one DB8131A sensor.
///
/// Cloning shares the same sensor state; all entry points may be called
/// from any thread. Two coarse locks serialize access: the general control
/// lock (run mode, tuning, the bus) and the autofocus lock (focus state
/// and the initiating caller), so an in-flight AF poll can proceed
/// alongside unrelated control traffic.
pub struct Db8131a<B: SensorBus, C: CamClock> {
    pub(crate) inner: Arc<Inner<B, C>>,
    pub(crate) wq: Arc<worker::Workqueue>,
}

impl<B: SensorBus, C: CamClock> Clone for Db8131a<B, C> {
    fn clone(&self) -> Self {
        Db8131a {
            inner: Arc::clone(&self.inner),
            wq: Arc::clone(&self.wq),
        }
    }
}

impl<B: SensorBus, C: CamClock> core::fmt::Debug for Db8131a<B, C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Db8131a").finish_non_exhaustive()
    }
}

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl<B, C> Db8131a<B, C>
where
    B: SensorBus + Send + 'static,
    C: CamClock + Send + Sync + 'static,
{
    /// Binds the driver to a powered board: runs the power hook, probes
    /// the chip id and resolves the capability descriptor. The sensor is
    /// left in `Notready` until [`Db8131a::init`].
    pub fn bind(
        mut bus: B,
        clock: C,
        mut pdata: PlatformData,
    ) -> Result<Self, Db8131aError<B::Error>> {
        let bank = &tables::EVT1_1;
        let caps = Capabilities::resolve(&pdata, bank);
        let mut power = pdata.power.take();

        if let Some(hook) = power.as_mut() {
            hook(true).map_err(Db8131aError::Power)?;
            clock.delay_ms(timing::POLL_INTERVAL.as_millis() as u32);
        }

        match probe_chip(&mut bus) {
            Ok(()) => {}
            Err(e) => {
                if let Some(hook) = power.as_mut() {
                    let _ = hook(false);
                }
                return Err(e);
            }
        }

        let ctrl = CtrlState {
            bus,
            power,
            debug: pdata.debug,
            burst: caps.burst_writes,
            mclk_hz: pdata.mclk_hz,
            runmode: Runmode::Notready,
            oprmode: OperatingMode::Video,
            movie_mode: false,
            vt_mode: false,
            req_fmt: None,
            scene: SceneMode::None,
            wide_cmd: WideRequest::None,
            return_to_preview: false,
            preview: PreviewState {
                frmsize: &PREVIEW_FRAMESIZES[2],
                update_frmsize: true,
                fast_ae: false,
            },
            capture: CaptureState {
                frmsize: &CAPTURE_FRAMESIZES[1],
                pre_req: false,
                ae_manual_mode: false,
                lowlux_night: false,
                ready: false,
            },
            flash: FlashState::default(),
            exposure: ExposureState::default(),
            wb: WhiteBalanceState::default(),
            tuning: TuningState::default(),
            req_fps: FpsIndex::Auto,
            fps: 0,
            light_level: u32::MAX,
            one_frame_delay: timing::ONE_FRAME_DELAY_NORMAL,
            exif: Exif::default(),
            stream_time: StreamTime::default(),
            initialized: false,
            stream_fault: false,
        };

        info!(
            "db8131a bound: mclk {} Hz, af={}, flash={}",
            pdata.mclk_hz, caps.af, caps.flash
        );

        Ok(Db8131a {
            inner: Arc::new(Inner {
                ctrl: Mutex::new(ctrl),
                af: Mutex::new(af::AfTrack::default()),
                clock,
                regs: bank,
                caps,
            }),
            wq: Arc::new(worker::Workqueue::new("db8131a-wq", 2)),
        })
    }

    /// Board-variant capabilities resolved at bind time.
    pub fn capabilities(&self) -> Capabilities {
        self.inner.caps
    }

    /// Writes the init sequence (VT variant when VT mode was selected)
    /// and moves `Notready` to `Init`. Re-init from `Init` is allowed.
    pub fn init(&self) -> Result<(), Db8131aError<B::Error>> {
        let inner = &self.inner;
        let mut ctrl = lock(&inner.ctrl);
        if ctrl.runmode.is_active() || ctrl.runmode.is_stopping() {
            return Err(Db8131aError::InvalidState {
                op: "init",
                runmode: ctrl.runmode,
            });
        }
        let table = if ctrl.vt_mode { &inner.regs.init_vt } else { &inner.regs.init };
        ctrl.write_table(&inner.clock, table)?;
        ctrl.runmode = Runmode::Init;
        ctrl.initialized = true;
        ctrl.stream_fault = false;
        ctrl.capture.ready = false;
        ctrl.capture.pre_req = false;
        ctrl.preview.update_frmsize = true;
        drop(ctrl);

        let mut af = lock(&inner.af);
        af.reset();
        info!("init done ({})", table.name);
        Ok(())
    }

    /// Full reset: stops any stream, power-cycles through the board hook
    /// and drops back to `Notready`. A fresh `init` is required afterwards.
    pub fn reset(&self) -> Result<(), Db8131aError<B::Error>> {
        let inner = &self.inner;
        {
            let mut af = lock(&inner.af);
            af.cancel_requested = true;
        }
        let mut ctrl = lock(&inner.ctrl);
        if ctrl.runmode.is_active() {
            // Best effort; the sensor is about to lose power anyway.
            let stream_stop = &inner.regs.stream_stop;
            if let Err(e) = ctrl.write_table(&inner.clock, stream_stop) {
                warn!("reset: stream stop failed: {e}");
            }
        }
        if let Some(hook) = ctrl.power.as_mut() {
            hook(false).map_err(Db8131aError::Power)?;
            inner.clock.delay_ms(timing::POLL_INTERVAL.as_millis() as u32);
            hook(true).map_err(Db8131aError::Power)?;
        }
        ctrl.runmode = Runmode::Notready;
        ctrl.initialized = false;
        ctrl.stream_fault = false;
        ctrl.capture.ready = false;
        ctrl.capture.pre_req = false;
        ctrl.exif = Exif::default();
        drop(ctrl);

        let mut af = lock(&inner.af);
        af.reset();
        info!("reset done");
        Ok(())
    }

    /// Format negotiation. Preview requests select the preview frame size
    /// (flagging a pending size table write), capture requests select the
    /// capture frame size and switch the operating mode to image; a
    /// capture format negotiated while previewing arms fast capture.
    pub fn s_fmt(&self, fmt: &PixFormat) -> Result<(), Db8131aError<B::Error>> {
        let inner = &self.inner;
        let mut ctrl = lock(&inner.ctrl);
        match fmt.mode {
            FormatMode::Preview => {
                let frmsize = find_framesize(&PREVIEW_FRAMESIZES, fmt.width, fmt.height);
                if frmsize.index != ctrl.preview.frmsize.index {
                    ctrl.preview.frmsize = frmsize;
                    ctrl.preview.update_frmsize = true;
                }
                ctrl.oprmode = OperatingMode::Video;
            }
            FormatMode::Capture => {
                let frmsize = find_framesize(&CAPTURE_FRAMESIZES, fmt.width, fmt.height);
                ctrl.capture.frmsize = frmsize;
                ctrl.wide_cmd = wide_request(frmsize, ctrl.wide_cmd);
                ctrl.oprmode = OperatingMode::Image;
                if ctrl.runmode == Runmode::Running {
                    // Fast capture: pre-select the capture tables while the
                    // preview is still up.
                    ctrl.capture.pre_req = true;
                    let capture_table =
                        inner.regs.table(Category::CaptureMode, frmsize.index)?;
                    ctrl.write_table(&inner.clock, capture_table)?;
                    ctrl.capture.ready = true;
                }
            }
        }
        ctrl.req_fmt = Some(*fmt);
        debug!(
            "s_fmt: {:?} {}x{} -> index {}",
            fmt.mode, fmt.width, fmt.height,
            match fmt.mode {
                FormatMode::Preview => ctrl.preview.frmsize.index,
                FormatMode::Capture => ctrl.capture.frmsize.index,
            }
        );
        Ok(())
    }

    /// Frame-rate negotiation; only rates with a register table are
    /// accepted. Applied immediately once the sensor is initialized,
    /// otherwise stored for the next stream start.
    pub fn s_frame_rate(&self, fps: u32) -> Result<(), Db8131aError<B::Error>> {
        let inner = &self.inner;
        let idx = FpsIndex::from_fps(fps).ok_or(Db8131aError::OutOfRange {
            id: CtrlId::FrameRate.raw(),
            value: fps as i32,
            min: 0,
            max: 30,
        })?;
        let mut ctrl = lock(&inner.ctrl);
        ctrl.req_fps = idx;
        if ctrl.initialized {
            let table = inner.regs.table(Category::Fps, idx as usize)?;
            ctrl.write_table(&inner.clock, table)?;
            ctrl.fps = idx.fps();
        }
        Ok(())
    }

    /// Stream on/off, the only driver of run-mode transitions.
    pub fn s_stream(&self, cmd: StreamCmd) -> Result<(), Db8131aError<B::Error>> {
        match cmd {
            StreamCmd::Start => self.stream_on(),
            StreamCmd::Stop => self.stream_off(),
        }
    }

    fn stream_on(&self) -> Result<(), Db8131aError<B::Error>> {
        let inner = &self.inner;
        let mut ctrl = lock(&inner.ctrl);
        if ctrl.stream_fault {
            return Err(Db8131aError::InvalidState {
                op: "stream on (stream fault latched)",
                runmode: ctrl.runmode,
            });
        }
        if ctrl.runmode != Runmode::Init {
            return Err(Db8131aError::InvalidState {
                op: "stream on",
                runmode: ctrl.runmode,
            });
        }
        match (ctrl.oprmode, ctrl.movie_mode) {
            (OperatingMode::Image, _) => self.start_capture(&mut ctrl),
            (OperatingMode::Video, true) => self.start_recording(&mut ctrl),
            (OperatingMode::Video, false) => self.start_preview(&mut ctrl),
        }
    }

    fn start_preview(
        &self,
        ctrl: &mut CtrlState<B, C::Instant>,
    ) -> Result<(), Db8131aError<B::Error>> {
        let inner = &self.inner;
        if ctrl.preview.update_frmsize {
            let index = ctrl.preview.frmsize.index;
            let table = inner.regs.table(Category::PreviewSize, index)?;
            ctrl.write_table(&inner.clock, table)?;
            ctrl.preview.update_frmsize = false;
        }
        if ctrl.fps != ctrl.req_fps.fps() {
            let table = inner.regs.table(Category::Fps, ctrl.req_fps as usize)?;
            ctrl.write_table(&inner.clock, table)?;
            ctrl.fps = ctrl.req_fps.fps();
        }
        if ctrl.preview.fast_ae {
            // Coming back from a capture: free AE/AWB before the preview
            // table so exposure recovers within the first frames.
            if ctrl.exposure.ae_lock {
                let ae_lock_off = &inner.regs.ae_lock_off;
                ctrl.write_table(&inner.clock, ae_lock_off)?;
                ctrl.exposure.ae_lock = false;
            }
            if ctrl.wb.awb_lock {
                let awb_lock_off = &inner.regs.awb_lock_off;
                ctrl.write_table(&inner.clock, awb_lock_off)?;
                ctrl.wb.awb_lock = false;
            }
        }
        let mode_table = if ctrl.return_to_preview {
            &inner.regs.return_preview_mode
        } else {
            &inner.regs.preview_mode
        };
        ctrl.write_table(&inner.clock, mode_table)?;
        ctrl.return_to_preview = false;
        ctrl.preview.fast_ae = false;
        ctrl.stream_time.before = ctrl.stream_time.current;
        ctrl.stream_time.current = Some(inner.clock.now());
        ctrl.runmode = Runmode::Running;
        info!("preview started ({})", mode_table.name);
        Ok(())
    }

    fn start_recording(
        &self,
        ctrl: &mut CtrlState<B, C::Instant>,
    ) -> Result<(), Db8131aError<B::Error>> {
        let inner = &self.inner;
        if ctrl.preview.update_frmsize {
            let index = ctrl.preview.frmsize.index;
            let table = inner.regs.table(Category::PreviewSize, index)?;
            ctrl.write_table(&inner.clock, table)?;
            ctrl.preview.update_frmsize = false;
        }
        let camcorder_on = &inner.regs.camcorder_on;
        ctrl.write_table(&inner.clock, camcorder_on)?;
        ctrl.stream_time.before = ctrl.stream_time.current;
        ctrl.stream_time.current = Some(inner.clock.now());
        ctrl.runmode = Runmode::Recording;
        info!("recording started");
        Ok(())
    }

    fn start_capture(
        &self,
        ctrl: &mut CtrlState<B, C::Instant>,
    ) -> Result<(), Db8131aError<B::Error>> {
        let inner = &self.inner;

        let light = self.read_light_level(ctrl)?;
        ctrl.light_level = light;
        ctrl.one_frame_delay = one_frame_delay(ctrl.scene, light);
        ctrl.capture.lowlux_night =
            ctrl.scene == SceneMode::Night && light <= timing::FLASH_LOW_LIGHT_LEVEL;
        // Night captures run a fixed long exposure; AE will not converge.
        ctrl.capture.ae_manual_mode = ctrl.capture.lowlux_night;

        match ctrl.wide_cmd {
            WideRequest::Change => {
                let change_wide = &inner.regs.change_wide_cap;
                ctrl.write_table(&inner.clock, change_wide)?;
            }
            WideRequest::Restore => {
                let restore = &inner.regs.restore_cap;
                ctrl.write_table(&inner.clock, restore)?;
            }
            WideRequest::None => {}
        }
        ctrl.wide_cmd = WideRequest::None;

        if ctrl.capture.lowlux_night {
            if let Some(lowlight) = inner.regs.set_lowlight_cap.as_ref() {
                if inner.caps.lowlight_capture {
                    ctrl.write_table(&inner.clock, lowlight)?;
                }
            }
        }

        let fired = self.flash_for_capture(ctrl)?;

        if !(ctrl.capture.pre_req && ctrl.capture.ready) {
            let index = ctrl.capture.frmsize.index;
            let table = inner.regs.table(Category::CaptureMode, index)?;
            ctrl.write_table(&inner.clock, table)?;
        }
        ctrl.capture.ready = true;

        if !ctrl.capture.ae_manual_mode && !ctrl.exposure.ae_lock && !self.wait_ae_stable(ctrl)? {
            warn!("capture: AE did not stabilize, capturing anyway");
        }

        self.update_exif(ctrl, fired)?;

        ctrl.stream_time.before = ctrl.stream_time.current;
        ctrl.stream_time.current = Some(inner.clock.now());
        ctrl.runmode = Runmode::Capturing;
        info!(
            "capture started: {}x{}, light {:#04x}, flash fired {}",
            ctrl.capture.frmsize.width, ctrl.capture.frmsize.height, light, fired
        );
        Ok(())
    }

    /// Fires the main flash when policy and light level call for it.
    /// Returns whether it fired.
    fn flash_for_capture(
        &self,
        ctrl: &mut CtrlState<B, C::Instant>,
    ) -> Result<bool, Db8131aError<B::Error>> {
        let inner = &self.inner;
        if !inner.caps.flash || ctrl.flash.ignore_flash {
            return Ok(false);
        }
        let fire = match ctrl.flash.mode {
            FlashMode::On | FlashMode::Torch => true,
            FlashMode::Auto => ctrl.light_level <= timing::FLASH_LOW_LIGHT_LEVEL,
            FlashMode::Off => false,
        };
        if !fire {
            return Ok(false);
        }
        // Back up the AE scale, then let the flash override metering.
        let gain = ctrl.read_status_reg(&inner.clock, &inner.regs.get_iso, status::ISO_GAIN)?;
        ctrl.flash.ae_scl = u32::from(gain);
        ctrl.flash.ae_offset.ae_now = u32::from(gain);
        let flash_ae_set = &inner.regs.flash_ae_set;
        ctrl.write_table(&inner.clock, flash_ae_set)?;
        let flash_start = &inner.regs.flash_start;
        ctrl.write_table(&inner.clock, flash_start)?;
        ctrl.flash.on = true;
        ctrl.flash.ae_flash_lock = true;
        Ok(true)
    }

    /// Ends a flash capture: flash off, AE restored, AWB settle delay.
    fn flash_after_capture(
        &self,
        ctrl: &mut CtrlState<B, C::Instant>,
    ) -> Result<(), Db8131aError<B::Error>> {
        let inner = &self.inner;
        if !ctrl.flash.on {
            return Ok(());
        }
        let flash_end = &inner.regs.flash_end;
        ctrl.write_table(&inner.clock, flash_end)?;
        let flash_ae_clear = &inner.regs.flash_ae_clear;
        ctrl.write_table(&inner.clock, flash_ae_clear)?;
        ctrl.flash.ae_scl = 0;
        ctrl.flash.on = false;
        ctrl.flash.ae_flash_lock = false;
        if ctrl.wb.mode == WhiteBalanceMode::Auto {
            inner.clock.delay_ms(ctrl.flash.awb_delay.as_millis() as u32);
        }
        Ok(())
    }

    /// Bounded AE-convergence poll before capture. Exhaustion is reported
    /// as `false`, never as an error.
    fn wait_ae_stable(
        &self,
        ctrl: &mut CtrlState<B, C::Instant>,
    ) -> Result<bool, Db8131aError<B::Error>> {
        let inner = &self.inner;
        ctrl.write_table(&inner.clock, &inner.regs.get_ae_stable)?;
        for _ in 0..timing::AE_STABLE_SEARCH_COUNT {
            let v = ctrl.bus.read_reg(status::AE_STABLE).map_err(Db8131aError::Io)?;
            if v == status::AE_STABLE_DONE {
                return Ok(true);
            }
            inner
                .clock
                .delay_ms(timing::AE_STABLE_SEARCH_DELAY.as_millis() as u32);
        }
        Ok(false)
    }

    fn read_light_level(
        &self,
        ctrl: &mut CtrlState<B, C::Instant>,
    ) -> Result<u32, Db8131aError<B::Error>> {
        let inner = &self.inner;
        ctrl.write_table(&inner.clock, &inner.regs.get_light_level)?;
        let hi = ctrl.bus.read_reg(status::LIGHT_LEVEL_HI).map_err(Db8131aError::Io)?;
        let lo = ctrl.bus.read_reg(status::LIGHT_LEVEL_LO).map_err(Db8131aError::Io)?;
        Ok(u32::from(hi) << 8 | u32::from(lo))
    }

    /// Refreshes the EXIF snapshot from the sensor's gain and shutter
    /// readback.
    fn update_exif(
        &self,
        ctrl: &mut CtrlState<B, C::Instant>,
        flash_fired: bool,
    ) -> Result<(), Db8131aError<B::Error>> {
        let inner = &self.inner;
        let gain =
            ctrl.read_status_reg(&inner.clock, &inner.regs.get_iso, status::ISO_GAIN)?;
        ctrl.write_table(&inner.clock, &inner.regs.get_shutterspeed)?;
        let hi = ctrl.bus.read_reg(status::SHUTTER_HI).map_err(Db8131aError::Io)?;
        let lo = ctrl.bus.read_reg(status::SHUTTER_LO).map_err(Db8131aError::Io)?;
        let shutter = u32::from(hi) << 8 | u32::from(lo);

        ctrl.exif.iso = iso_from_gain(gain);
        ctrl.exif.exp_time_den = if shutter == 0 {
            0
        } else {
            (ctrl.mclk_hz / 4096 / shutter).clamp(1, u32::from(u16::MAX)) as u16
        };
        ctrl.exif.flash = match ctrl.flash.mode {
            FlashMode::Off => exif_flash::MODE_SUPPRESSION,
            FlashMode::Auto => exif_flash::MODE_AUTO,
            FlashMode::On | FlashMode::Torch => exif_flash::MODE_FIRING,
        };
        if flash_fired {
            ctrl.exif.flash |= exif_flash::FIRED;
        }
        Ok(())
    }

    fn stream_off(&self) -> Result<(), Db8131aError<B::Error>> {
        let inner = &self.inner;
        let mut ctrl = lock(&inner.ctrl);
        let Some(stop_mode) = ctrl.runmode.stop_state() else {
            // Stopping an already-stopped stream is not an error.
            if ctrl.runmode == Runmode::Init || ctrl.runmode == Runmode::Notready {
                return Ok(());
            }
            return Err(Db8131aError::InvalidState {
                op: "stream off",
                runmode: ctrl.runmode,
            });
        };
        let was = ctrl.runmode;

        // Ask a running AF sweep to wind down; it observes the flag at its
        // next poll tick.
        {
            let mut af = lock(&inner.af);
            if af.focus.status.contains(AfStatus::DOING) {
                af.cancel_requested = true;
                af.focus.status.insert(AfStatus::CANCELLED);
            }
        }

        if was == Runmode::Recording {
            let camcorder_off = &inner.regs.camcorder_off;
            ctrl.write_table(&inner.clock, camcorder_off)?;
        }
        if was == Runmode::Capturing {
            self.flash_after_capture(&mut ctrl)?;
            ctrl.capture.ready = false;
            ctrl.capture.pre_req = false;
            ctrl.return_to_preview = true;
            ctrl.preview.fast_ae = true;
        }
        let stream_stop = &inner.regs.stream_stop;
        ctrl.write_table(&inner.clock, stream_stop)?;
        ctrl.runmode = stop_mode;
        debug!("stream off: {was:?} -> {stop_mode:?}");

        if inner.caps.streamoff_watchdog {
            drop(ctrl);
            let drv = self.clone();
            if !self.wq.queue(move || drv.streamoff_watchdog()) {
                return Err(Db8131aError::Timeout);
            }
        } else {
            // No watchdog on this board: one frame delay covers the drain.
            let wait = ctrl.one_frame_delay;
            inner.clock.delay_ms(wait.as_millis() as u32);
            ctrl.runmode = Runmode::Init;
            info!("stream off complete ({was:?})");
        }
        Ok(())
    }

    /// Background stream-off confirmation: polls the stream state until
    /// the pipeline drains. Exhaustion is fatal and latches a stream
    /// fault only `reset` clears.
    pub(crate) fn streamoff_watchdog(&self) {
        let inner = &self.inner;
        for _ in 0..timing::STREAMOFF_CHK_COUNT {
            {
                let mut ctrl = lock(&inner.ctrl);
                if !ctrl.runmode.is_stopping() {
                    return;
                }
                match ctrl.read_page_reg(0x02, status::STREAM_STATE) {
                    Ok(0) => {
                        ctrl.runmode = Runmode::Init;
                        info!("stream off confirmed");
                        return;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("streamoff watchdog: read failed: {e}");
                    }
                }
            }
            inner
                .clock
                .delay_ms(timing::POLL_INTERVAL.as_millis() as u32);
        }
        let mut ctrl = lock(&inner.ctrl);
        ctrl.stream_fault = true;
        error!(
            "streamoff watchdog: sensor did not stop within {} polls",
            timing::STREAMOFF_CHK_COUNT
        );
    }

    /// Control dispatch entry: translates an (id, value) request into a
    /// state mutation plus register writes. Invalid values and requests
    /// illegal in the current run mode are rejected with state untouched.
    pub fn s_ctrl(&self, raw_id: u32, value: i32) -> Result<(), Db8131aError<B::Error>> {
        let id = CtrlId::from_raw(raw_id).ok_or(Db8131aError::UnknownControl(raw_id))?;
        controls::validate_set(id, value)?;

        // Focus controls are routed through the AF engine and its lock.
        match id {
            CtrlId::SetAutoFocus => {
                return if value == 1 {
                    self.af_start_from(Caller::current())
                } else {
                    self.af_stop_from(Caller::current())
                };
            }
            CtrlId::FocusMode => return self.set_focus_mode(value),
            CtrlId::ObjectPositionX => return self.set_object_position(Some(value as u32), None),
            CtrlId::ObjectPositionY => return self.set_object_position(None, Some(value as u32)),
            _ => {}
        }

        let inner = &self.inner;
        let mut ctrl = lock(&inner.ctrl);
        debug!("s_ctrl {id:?} = {value} (runmode {:?})", ctrl.runmode);
        match id {
            CtrlId::VtMode => {
                ctrl.vt_mode = value == 1;
            }
            CtrlId::SensorMode => {
                ctrl.movie_mode = value == 1;
            }
            CtrlId::FlashMode => {
                if !inner.caps.flash {
                    return Err(Db8131aError::NotSupported("flash"));
                }
                let mode = arg::<_, B::Error>(id, value, controls::flash_mode_from(value))?;
                ctrl.flash.mode = mode;
            }
            CtrlId::Brightness => {
                ctrl.require_ready("brightness")?;
                let ev = arg::<_, B::Error>(id, value, controls::ev_from(value))?;
                let table = inner.regs.table(Category::Ev, ev.index())?;
                ctrl.write_table(&inner.clock, table)?;
                ctrl.exposure.val = ev;
            }
            CtrlId::Metering => {
                ctrl.require_ready("metering")?;
                let m = arg::<_, B::Error>(id, value, controls::metering_from(value))?;
                let table = inner.regs.table(Category::Metering, m as usize)?;
                ctrl.write_table(&inner.clock, table)?;
                ctrl.tuning.metering = m;
            }
            CtrlId::Iso => {
                ctrl.require_ready("iso")?;
                let iso = arg::<_, B::Error>(id, value, controls::iso_from(value))?;
                let table = inner.regs.table(Category::Iso, iso as usize)?;
                ctrl.write_table(&inner.clock, table)?;
                ctrl.tuning.iso = iso;
            }
            CtrlId::Effect => {
                ctrl.require_ready("effect")?;
                let fx = arg::<_, B::Error>(id, value, controls::effect_from(value))?;
                let table = inner.regs.table(Category::Effect, fx as usize)?;
                ctrl.write_table(&inner.clock, table)?;
                ctrl.tuning.effect = fx;
            }
            CtrlId::WhiteBalance => {
                ctrl.require_ready("white balance")?;
                let wb = arg::<_, B::Error>(id, value, controls::wb_from(value))?;
                let table = inner.regs.table(Category::WhiteBalance, wb as usize)?;
                ctrl.write_table(&inner.clock, table)?;
                ctrl.wb.mode = wb;
            }
            CtrlId::SceneMode => {
                ctrl.require_ready("scene mode")?;
                let scene = arg::<_, B::Error>(id, value, controls::scene_from(value))?;
                let table = inner.regs.table(Category::SceneMode, scene as usize)?;
                ctrl.write_table(&inner.clock, table)?;
                ctrl.scene = scene;
            }
            CtrlId::Saturation => {
                ctrl.require_ready("saturation")?;
                let level = arg::<_, B::Error>(id, value, controls::level_from(value))?;
                let table = inner.regs.table(Category::Saturation, level.index())?;
                ctrl.write_table(&inner.clock, table)?;
                ctrl.tuning.saturation = level;
            }
            CtrlId::Contrast => {
                ctrl.require_ready("contrast")?;
                let level = arg::<_, B::Error>(id, value, controls::level_from(value))?;
                let table = inner.regs.table(Category::Contrast, level.index())?;
                ctrl.write_table(&inner.clock, table)?;
                ctrl.tuning.contrast = level;
            }
            CtrlId::Sharpness => {
                ctrl.require_ready("sharpness")?;
                let level = arg::<_, B::Error>(id, value, controls::level_from(value))?;
                let table = inner.regs.table(Category::Sharpness, level.index())?;
                ctrl.write_table(&inner.clock, table)?;
                ctrl.tuning.sharpness = level;
            }
            CtrlId::FrameRate => {
                let idx = arg::<_, B::Error>(id, value, controls::fps_from(value))?;
                ctrl.req_fps = idx;
                if ctrl.initialized {
                    let table = inner.regs.table(Category::Fps, idx as usize)?;
                    ctrl.write_table(&inner.clock, table)?;
                    ctrl.fps = idx.fps();
                }
            }
            CtrlId::AeLock => {
                ctrl.require_ready("ae lock")?;
                let on = value == 1;
                if on != ctrl.exposure.ae_lock {
                    let table = if on { &inner.regs.ae_lock_on } else { &inner.regs.ae_lock_off };
                    ctrl.write_table(&inner.clock, table)?;
                    ctrl.exposure.ae_lock = on;
                }
            }
            CtrlId::AwbLock => {
                ctrl.require_ready("awb lock")?;
                let on = value == 1;
                if on != ctrl.wb.awb_lock {
                    let table =
                        if on { &inner.regs.awb_lock_on } else { &inner.regs.awb_lock_off };
                    ctrl.write_table(&inner.clock, table)?;
                    ctrl.wb.awb_lock = on;
                }
            }
            CtrlId::SetAutoFocus
            | CtrlId::FocusMode
            | CtrlId::ObjectPositionX
            | CtrlId::ObjectPositionY => unreachable!("routed to the AF engine above"),
            CtrlId::AutoFocusResult
            | CtrlId::ExifExptime
            | CtrlId::ExifIso
            | CtrlId::ExifFlash
            | CtrlId::LightLevel
            | CtrlId::CheckEsd => unreachable!("rejected by validate_set"),
        }
        Ok(())
    }

    /// Control query entry. Status values (AF result, EXIF, light level)
    /// are how background handlers report back to the host.
    pub fn g_ctrl(&self, raw_id: u32) -> Result<i32, Db8131aError<B::Error>> {
        let id = CtrlId::from_raw(raw_id).ok_or(Db8131aError::UnknownControl(raw_id))?;
        let inner = &self.inner;
        let value = match id {
            CtrlId::AutoFocusResult => i32::from(lock(&inner.af).focus.status.bits()),
            CtrlId::ExifExptime => i32::from(lock(&inner.ctrl).exif.exp_time_den),
            CtrlId::ExifIso => i32::from(lock(&inner.ctrl).exif.iso),
            CtrlId::ExifFlash => i32::from(lock(&inner.ctrl).exif.flash),
            CtrlId::LightLevel => {
                let mut ctrl = lock(&inner.ctrl);
                if ctrl.runmode.is_active() {
                    let light = self.read_light_level(&mut ctrl)?;
                    ctrl.light_level = light;
                }
                ctrl.light_level as i32
            }
            CtrlId::CheckEsd => {
                let mut ctrl = lock(&inner.ctrl);
                ctrl.require_ready("esd check")?;
                let v = ctrl.read_status_reg(
                    &inner.clock,
                    &inner.regs.get_esd_status,
                    status::ESD_STATUS,
                )?;
                if v != 0 {
                    warn!("esd check: fault {v:#04x}");
                }
                i32::from(v != 0)
            }
            CtrlId::VtMode => i32::from(lock(&inner.ctrl).vt_mode),
            CtrlId::SensorMode => i32::from(lock(&inner.ctrl).movie_mode),
            CtrlId::Brightness => i32::from(lock(&inner.ctrl).exposure.val.value()),
            CtrlId::Metering => lock(&inner.ctrl).tuning.metering as i32,
            CtrlId::Iso => lock(&inner.ctrl).tuning.iso as i32,
            CtrlId::Effect => lock(&inner.ctrl).tuning.effect as i32,
            CtrlId::WhiteBalance => lock(&inner.ctrl).wb.mode as i32,
            CtrlId::SceneMode => lock(&inner.ctrl).scene as i32,
            CtrlId::Saturation => i32::from(lock(&inner.ctrl).tuning.saturation.value()),
            CtrlId::Contrast => i32::from(lock(&inner.ctrl).tuning.contrast.value()),
            CtrlId::Sharpness => i32::from(lock(&inner.ctrl).tuning.sharpness.value()),
            CtrlId::FrameRate => lock(&inner.ctrl).fps as i32,
            CtrlId::AeLock => i32::from(lock(&inner.ctrl).exposure.ae_lock),
            CtrlId::AwbLock => i32::from(lock(&inner.ctrl).wb.awb_lock),
            CtrlId::FocusMode => lock(&inner.af).focus.mode as i32,
            CtrlId::SetAutoFocus => i32::from(lock(&inner.af).focus.start),
            CtrlId::ObjectPositionX => lock(&inner.af).focus.pos.0 as i32,
            CtrlId::ObjectPositionY => lock(&inner.af).focus.pos.1 as i32,
            CtrlId::FlashMode => lock(&inner.ctrl).flash.mode as i32,
        };
        Ok(value)
    }

    /// Current run mode, mainly for host bookkeeping and tests.
    pub fn runmode(&self) -> Runmode {
        lock(&self.inner.ctrl).runmode
    }
}

/// Decodes a validated raw value; failure means the value had no register
/// table despite being inside the declared bounds.
fn arg<T, E: core::fmt::Debug>(
    id: CtrlId,
    value: i32,
    decoded: Option<T>,
) -> Result<T, Db8131aError<E>> {
    decoded.ok_or_else(|| {
        let (min, max) = id
            .desc()
            .map(|d| (d.min, d.max))
            .unwrap_or((0, 0));
        Db8131aError::OutOfRange { id: id.raw(), value, min, max }
    })
}

fn probe_chip<B: SensorBus>(bus: &mut B) -> Result<(), Db8131aError<B::Error>> {
    bus.write_reg(REG_PAGE, 0x00).map_err(Db8131aError::Io)?;
    let hi = bus.read_reg(status::CHIP_ID_HI).map_err(Db8131aError::Io)?;
    let lo = bus.read_reg(status::CHIP_ID_LO).map_err(Db8131aError::Io)?;
    let rev = bus.read_reg(status::CHIP_REV).map_err(Db8131aError::Io)?;
    let id = u16::from(hi) << 8 | u16::from(lo);
    if id != regs::CHIP_ID {
        return Err(Db8131aError::WrongChip { id, rev });
    }
    match rev {
        regs::CHIP_REV => {}
        regs::CHIP_REV_OLD => warn!("old silicon revision {rev:#04x}"),
        _ => return Err(Db8131aError::WrongChip { id, rev }),
    }
    Ok(())
}

fn iso_from_gain(gain: u8) -> u16 {
    match gain {
        0..=0x25 => 50,
        0x26..=0x45 => 100,
        0x46..=0x85 => 200,
        _ => 400,
    }
}

fn one_frame_delay(scene: SceneMode, light_level: u32) -> Duration {
    if scene == SceneMode::Night {
        timing::ONE_FRAME_DELAY_NIGHT
    } else if light_level <= timing::FLASH_LOW_LIGHT_LEVEL {
        timing::ONE_FRAME_DELAY_LOW
    } else {
        timing::ONE_FRAME_DELAY_NORMAL
    }
}

/// Wide capture request derivation: switching to a wide aspect class asks
/// for the wide tables, switching back asks for a restore.
fn wide_request(frmsize: &FrameSize, previous: WideRequest) -> WideRequest {
    let wide = frmsize.ratio() >= crate::common::types::frmratio::D1;
    match (wide, previous) {
        (true, _) => WideRequest::Change,
        (false, WideRequest::Change) => WideRequest::Restore,
        (false, other) => other,
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct MockBusError;

    /// Scripted bus: logs writes, serves staged reads per (page, reg),
    /// optionally failing after a set number of transactions.
    pub struct MockBus {
        pub writes: Vec<(u8, u8)>,
        pub bursts: Vec<usize>,
        pub page: u8,
        reads: HashMap<(u8, u8), Vec<u8>>,
        pub fail_after: Option<usize>,
        pub ops: usize,
    }

    impl MockBus {
        pub fn new() -> MockBus {
            MockBus {
                writes: Vec::new(),
                bursts: Vec::new(),
                page: 0,
                reads: HashMap::new(),
                fail_after: None,
                ops: 0,
            }
        }

        /// Stages a healthy chip-id probe.
        pub fn with_chip_id() -> MockBus {
            let mut bus = MockBus::new();
            bus.stage_read(0x00, status::CHIP_ID_HI, &[0x61]);
            bus.stage_read(0x00, status::CHIP_ID_LO, &[0x00]);
            bus.stage_read(0x00, status::CHIP_REV, &[regs::CHIP_REV]);
            bus
        }

        /// Queues read values for (page, reg); the last value is sticky.
        pub fn stage_read(&mut self, page: u8, reg: u8, values: &[u8]) {
            self.reads.insert((page, reg), values.to_vec());
        }

        fn bump(&mut self) -> Result<(), MockBusError> {
            self.ops += 1;
            match self.fail_after {
                Some(limit) if self.ops > limit => Err(MockBusError),
                _ => Ok(()),
            }
        }

        pub fn wrote(&self, addr: u8, value: u8) -> bool {
            self.writes.iter().any(|&w| w == (addr, value))
        }
    }

    impl SensorBus for MockBus {
        type Error = MockBusError;

        fn write_reg(&mut self, addr: u8, value: u8) -> Result<(), MockBusError> {
            self.bump()?;
            if addr == REG_PAGE {
                self.page = value;
            }
            self.writes.push((addr, value));
            Ok(())
        }

        fn write_burst(&mut self, regs: &[(u8, u8)]) -> Result<(), MockBusError> {
            self.bump()?;
            self.bursts.push(regs.len());
            for &(addr, value) in regs {
                if addr == REG_PAGE {
                    self.page = value;
                }
                self.writes.push((addr, value));
            }
            Ok(())
        }

        fn read_reg(&mut self, addr: u8) -> Result<u8, MockBusError> {
            self.bump()?;
            match self.reads.get_mut(&(self.page, addr)) {
                Some(values) if values.len() > 1 => Ok(values.remove(0)),
                Some(values) => values.first().copied().ok_or(MockBusError),
                None => Ok(0),
            }
        }
    }

    /// Virtual clock: delays advance time instantly, with an optional real
    /// sleep so concurrent tests get interleaving.
    pub struct MockClock {
        now_ms: AtomicU64,
        pub real_sleep_us: u64,
    }

    impl MockClock {
        pub fn new() -> MockClock {
            MockClock { now_ms: AtomicU64::new(0), real_sleep_us: 0 }
        }
    }

    impl CamClock for MockClock {
        type Instant = u64;

        fn now(&self) -> u64 {
            self.now_ms.load(Ordering::SeqCst)
        }

        fn delay_ms(&self, ms: u32) {
            self.now_ms.fetch_add(u64::from(ms), Ordering::SeqCst);
            if self.real_sleep_us > 0 {
                std::thread::sleep(Duration::from_micros(self.real_sleep_us));
            }
        }

        fn elapsed_since(&self, earlier: u64) -> Duration {
            Duration::from_millis(self.now().saturating_sub(earlier))
        }
    }

    pub type TestDriver = Db8131a<MockBus, MockClock>;

    pub fn bind_test_driver(pdata: PlatformData) -> TestDriver {
        Db8131a::bind(MockBus::with_chip_id(), MockClock::new(), pdata)
            .expect("bind with staged chip id")
    }

    pub fn init_test_driver(pdata: PlatformData) -> TestDriver {
        let drv = bind_test_driver(pdata);
        drv.init().expect("init");
        drv
    }

    /// Driver whose workqueue accepts jobs but never runs them, so tests
    /// can drive the background handlers deterministically by hand.
    pub fn init_idle_driver(pdata: PlatformData) -> TestDriver {
        let mut drv = bind_test_driver(pdata);
        drv.wq = Arc::new(worker::Workqueue::new("db8131a-idle", 0));
        drv.init().expect("init");
        drv
    }

    /// Drives the driver into preview.
    pub fn start_preview(drv: &TestDriver) {
        drv.s_fmt(&PixFormat {
            width: 640,
            height: 480,
            pixel: crate::common::types::PixelFormat::Yuv422,
            mode: FormatMode::Preview,
        })
        .expect("s_fmt");
        drv.s_stream(StreamCmd::Start).expect("stream on");
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::*;
    use super::*;
    use crate::common::types::PixelFormat;

    fn af_pdata() -> PlatformData {
        PlatformData { af_supported: true, ..PlatformData::default() }
    }

    #[test]
    fn bind_rejects_foreign_chip() {
        let mut bus = MockBus::new();
        bus.stage_read(0x00, status::CHIP_ID_HI, &[0x26]);
        bus.stage_read(0x00, status::CHIP_ID_LO, &[0x40]);
        bus.stage_read(0x00, status::CHIP_REV, &[0x01]);
        let err = Db8131a::bind(bus, MockClock::new(), PlatformData::default()).unwrap_err();
        assert!(matches!(err, Db8131aError::WrongChip { id: 0x2640, .. }));
    }

    #[test]
    fn bind_accepts_old_revision() {
        let mut bus = MockBus::with_chip_id();
        bus.stage_read(0x00, status::CHIP_REV, &[regs::CHIP_REV_OLD]);
        assert!(Db8131a::bind(bus, MockClock::new(), PlatformData::default()).is_ok());
    }

    #[test]
    fn init_writes_init_table_and_enters_init() {
        let drv = bind_test_driver(PlatformData::default());
        assert_eq!(drv.runmode(), Runmode::Notready);
        drv.init().unwrap();
        assert_eq!(drv.runmode(), Runmode::Init);
        let ctrl = lock(&drv.inner.ctrl);
        // Soft reset from the INIT table reached the bus.
        assert!(ctrl.bus.wrote(0x03, 0x82));
    }

    #[test]
    fn vt_mode_selects_vt_init() {
        let drv = bind_test_driver(PlatformData::default());
        drv.s_ctrl(CtrlId::VtMode.raw(), 1).unwrap();
        drv.init().unwrap();
        let ctrl = lock(&drv.inner.ctrl);
        // The VT table locks 15 fps; the normal table never writes 0x16=0x01
        // together with 0x14=0x02.
        assert!(ctrl.bus.wrote(0x14, 0x02));
        assert!(ctrl.bus.wrote(0x16, 0x01));
    }

    #[test]
    fn stream_on_requires_init() {
        let drv = bind_test_driver(PlatformData::default());
        let err = drv.s_stream(StreamCmd::Start).unwrap_err();
        assert!(matches!(
            err,
            Db8131aError::InvalidState { runmode: Runmode::Notready, .. }
        ));
    }

    #[test]
    fn preview_cycle_walks_the_stop_state() {
        let drv = init_test_driver(PlatformData::default());
        start_preview(&drv);
        assert_eq!(drv.runmode(), Runmode::Running);
        {
            let ctrl = lock(&drv.inner.ctrl);
            assert_eq!(ctrl.preview.frmsize.width, 640);
            assert!(!ctrl.preview.update_frmsize);
        }
        drv.s_stream(StreamCmd::Stop).unwrap();
        // No watchdog configured: the stop completes synchronously.
        assert_eq!(drv.runmode(), Runmode::Init);
    }

    #[test]
    fn running_to_recording_needs_a_stop_first() {
        let drv = init_test_driver(PlatformData::default());
        start_preview(&drv);
        drv.s_ctrl(CtrlId::SensorMode.raw(), 1).unwrap();
        let err = drv.s_stream(StreamCmd::Start).unwrap_err();
        assert!(matches!(
            err,
            Db8131aError::InvalidState { runmode: Runmode::Running, .. }
        ));

        drv.s_stream(StreamCmd::Stop).unwrap();
        drv.s_stream(StreamCmd::Start).unwrap();
        assert_eq!(drv.runmode(), Runmode::Recording);
    }

    #[test]
    fn capture_reads_light_level_and_updates_exif() {
        let drv = init_test_driver(PlatformData::default());
        {
            let mut ctrl = lock(&drv.inner.ctrl);
            ctrl.bus.stage_read(0x02, status::LIGHT_LEVEL_HI, &[0x00]);
            ctrl.bus.stage_read(0x02, status::LIGHT_LEVEL_LO, &[0x80]);
            ctrl.bus.stage_read(0x02, status::AE_STABLE, &[0x00, 0x00, 0x01]);
            ctrl.bus.stage_read(0x02, status::ISO_GAIN, &[0x30]);
            ctrl.bus.stage_read(0x02, status::SHUTTER_HI, &[0x01]);
            ctrl.bus.stage_read(0x02, status::SHUTTER_LO, &[0x00]);
        }
        drv.s_fmt(&PixFormat {
            width: 1280,
            height: 960,
            pixel: PixelFormat::Yuv422,
            mode: FormatMode::Capture,
        })
        .unwrap();
        drv.s_stream(StreamCmd::Start).unwrap();
        assert_eq!(drv.runmode(), Runmode::Capturing);

        assert_eq!(drv.g_ctrl(CtrlId::ExifIso.raw()).unwrap(), 100);
        let den = drv.g_ctrl(CtrlId::ExifExptime.raw()).unwrap();
        assert_eq!(den, (24_000_000 / 4096 / 256) as i32);
        // No flash hardware: suppression is reported.
        assert_eq!(
            drv.g_ctrl(CtrlId::ExifFlash.raw()).unwrap(),
            i32::from(exif_flash::MODE_SUPPRESSION)
        );
        assert_eq!(drv.g_ctrl(CtrlId::LightLevel.raw()).unwrap(), 0x80);
    }

    #[test]
    fn dispatch_validates_before_touching_state() {
        let drv = init_test_driver(PlatformData::default());
        let before = lock(&drv.inner.ctrl).bus.writes.len();

        let err = drv.s_ctrl(CtrlId::Brightness.raw(), 9).unwrap_err();
        assert!(matches!(err, Db8131aError::OutOfRange { value: 9, .. }));
        let err = drv.s_ctrl(0xdead_beef, 1).unwrap_err();
        assert!(matches!(err, Db8131aError::UnknownControl(0xdead_beef)));
        let err = drv.s_ctrl(CtrlId::AutoFocusResult.raw(), 1).unwrap_err();
        assert!(matches!(err, Db8131aError::UnknownControl(_)));

        let ctrl = lock(&drv.inner.ctrl);
        assert_eq!(ctrl.bus.writes.len(), before, "rejected requests wrote nothing");
        assert_eq!(ctrl.exposure.val.value(), 0);
    }

    #[test]
    fn brightness_applies_the_ev_table() {
        let drv = init_test_driver(PlatformData::default());
        drv.s_ctrl(CtrlId::Brightness.raw(), 2).unwrap();
        let ctrl = lock(&drv.inner.ctrl);
        assert_eq!(ctrl.exposure.val.value(), 2);
        // EV_P2 writes AE target 0x4C.
        assert!(ctrl.bus.wrote(0x38, 0x4C));
    }

    #[test]
    fn locks_rejected_before_init() {
        let drv = bind_test_driver(PlatformData::default());
        let err = drv.s_ctrl(CtrlId::AeLock.raw(), 1).unwrap_err();
        assert!(matches!(
            err,
            Db8131aError::InvalidState { runmode: Runmode::Notready, .. }
        ));
        let err = drv.s_ctrl(CtrlId::AwbLock.raw(), 1).unwrap_err();
        assert!(matches!(err, Db8131aError::InvalidState { .. }));
    }

    #[test]
    fn ae_lock_round_trip_writes_both_tables() {
        let drv = init_test_driver(PlatformData::default());
        drv.s_ctrl(CtrlId::AeLock.raw(), 1).unwrap();
        drv.s_ctrl(CtrlId::AeLock.raw(), 1).unwrap(); // no-op repeat
        drv.s_ctrl(CtrlId::AeLock.raw(), 0).unwrap();
        let ctrl = lock(&drv.inner.ctrl);
        assert!(ctrl.bus.wrote(0x30, 0x01));
        assert!(ctrl.bus.wrote(0x30, 0x00));
        assert!(!ctrl.exposure.ae_lock);
    }

    #[test]
    fn burst_mode_folds_tables_into_transactions() {
        let drv = init_test_driver(PlatformData::default());
        let bursts = lock(&drv.inner.ctrl).bus.bursts.len();
        assert!(bursts > 0, "init used burst transactions");
    }

    #[test]
    fn burst_disabled_falls_back_to_single_writes() {
        let pdata = PlatformData { burst_writes: false, ..PlatformData::default() };
        let drv = init_test_driver(pdata);
        let ctrl = lock(&drv.inner.ctrl);
        assert!(ctrl.bus.bursts.is_empty());
        // INIT has 32 real pairs (34 minus 2 delay markers), plus the
        // probe's page select at bind.
        assert_eq!(ctrl.bus.writes.len(), 33);
    }

    #[test]
    fn write_failure_keeps_last_known_good_state() {
        let drv = init_test_driver(PlatformData::default());
        drv.s_ctrl(CtrlId::Brightness.raw(), 1).unwrap();
        {
            let mut ctrl = lock(&drv.inner.ctrl);
            let ops = ctrl.bus.ops;
            ctrl.bus.fail_after = Some(ops); // next transaction fails
        }
        let err = drv.s_ctrl(CtrlId::Brightness.raw(), -3).unwrap_err();
        assert!(matches!(err, Db8131aError::Io(_)));
        let ctrl = lock(&drv.inner.ctrl);
        assert_eq!(
            ctrl.exposure.val.value(),
            1,
            "failed apply must not move the cached value"
        );
    }

    #[test]
    fn frame_rate_without_table_is_rejected() {
        let drv = init_test_driver(PlatformData::default());
        assert!(drv.s_frame_rate(15).is_ok());
        let err = drv.s_frame_rate(24).unwrap_err();
        assert!(matches!(err, Db8131aError::OutOfRange { value: 24, .. }));
        assert_eq!(drv.g_ctrl(CtrlId::FrameRate.raw()).unwrap(), 15);
    }

    #[test]
    fn flash_mode_needs_flash_hardware() {
        let drv = init_test_driver(PlatformData::default());
        let err = drv.s_ctrl(CtrlId::FlashMode.raw(), 1).unwrap_err();
        assert!(matches!(err, Db8131aError::NotSupported("flash")));

        let pdata = PlatformData { flash_supported: true, ..PlatformData::default() };
        let drv = init_test_driver(pdata);
        drv.s_ctrl(CtrlId::FlashMode.raw(), 1).unwrap();
        assert_eq!(drv.g_ctrl(CtrlId::FlashMode.raw()).unwrap(), 1);
    }

    #[test]
    fn af_needs_af_hardware() {
        let drv = init_test_driver(PlatformData::default());
        let err = drv.s_ctrl(CtrlId::SetAutoFocus.raw(), 1).unwrap_err();
        assert!(matches!(err, Db8131aError::NotSupported("autofocus")));
    }

    #[test]
    fn ae_stable_exhaustion_is_not_fatal() {
        let drv = init_test_driver(af_pdata());
        {
            let mut ctrl = lock(&drv.inner.ctrl);
            ctrl.bus.stage_read(0x02, status::AE_STABLE, &[0x00]); // never stable
        }
        drv.s_fmt(&PixFormat {
            width: 640,
            height: 480,
            pixel: PixelFormat::Yuv422,
            mode: FormatMode::Capture,
        })
        .unwrap();
        drv.s_stream(StreamCmd::Start).unwrap();
        assert_eq!(drv.runmode(), Runmode::Capturing);
    }

    #[test]
    fn streamoff_watchdog_confirms_quiescence() {
        let pdata = PlatformData { streamoff_watchdog: true, ..PlatformData::default() };
        let drv = init_idle_driver(pdata);
        {
            let mut ctrl = lock(&drv.inner.ctrl);
            ctrl.bus.stage_read(0x02, status::STREAM_STATE, &[0x01, 0x01, 0x00]);
        }
        start_preview(&drv);
        drv.s_stream(StreamCmd::Stop).unwrap();
        assert_eq!(drv.runmode(), Runmode::RunningStop);
        drv.streamoff_watchdog();
        assert_eq!(drv.runmode(), Runmode::Init);
    }

    #[test]
    fn streamoff_watchdog_timeout_latches_a_fault() {
        let pdata = PlatformData { streamoff_watchdog: true, ..PlatformData::default() };
        let drv = init_idle_driver(pdata);
        {
            let mut ctrl = lock(&drv.inner.ctrl);
            ctrl.bus.stage_read(0x02, status::STREAM_STATE, &[0x01]); // never drains
        }
        start_preview(&drv);
        drv.s_stream(StreamCmd::Stop).unwrap();
        drv.streamoff_watchdog();
        assert_eq!(drv.runmode(), Runmode::RunningStop);
        let err = drv.s_stream(StreamCmd::Start).unwrap_err();
        assert!(matches!(err, Db8131aError::InvalidState { .. }));
        // Reset clears the fault.
        drv.reset().unwrap();
        assert_eq!(drv.runmode(), Runmode::Notready);
    }

    #[test]
    fn fast_capture_pre_selects_the_capture_table() {
        let drv = init_test_driver(PlatformData::default());
        start_preview(&drv);
        drv.s_fmt(&PixFormat {
            width: 1280,
            height: 960,
            pixel: PixelFormat::Yuv422,
            mode: FormatMode::Capture,
        })
        .unwrap();
        let ctrl = lock(&drv.inner.ctrl);
        assert!(ctrl.capture.pre_req);
        assert!(ctrl.capture.ready);
        // 1MP capture window already on the sensor.
        assert!(ctrl.bus.wrote(0x20, 0x05));
    }

    #[test]
    fn wide_capture_requests_change_then_restore() {
        assert_eq!(
            wide_request(&FrameSize { index: 0, width: 1600, height: 960 }, WideRequest::None),
            WideRequest::Change
        );
        assert_eq!(
            wide_request(&FrameSize { index: 0, width: 640, height: 480 }, WideRequest::Change),
            WideRequest::Restore
        );
        assert_eq!(
            wide_request(&FrameSize { index: 0, width: 640, height: 480 }, WideRequest::None),
            WideRequest::None
        );
    }

    #[test]
    fn iso_mapping_covers_the_gain_range() {
        assert_eq!(iso_from_gain(0x10), 50);
        assert_eq!(iso_from_gain(0x30), 100);
        assert_eq!(iso_from_gain(0x50), 200);
        assert_eq!(iso_from_gain(0xF0), 400);
    }
}
