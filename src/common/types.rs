// src/common/types.rs

use core::fmt;

/// Top-level operational state of the sensor.
///
/// Every active mode has a matching `*Stop` state so background handlers
/// can observe "stopping" distinctly from "stopped" and abort cleanly.
/// Transitions are driven exclusively by stream/capture/record requests;
/// there is no edge directly connecting two active states.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Runmode {
    Notready,
    Init,
    /// Previewing.
    Running,
    RunningStop,
    Capturing,
    CapturingStop,
    /// Camcorder mode.
    Recording,
    RecordingStop,
}

impl Runmode {
    /// Preview, capture or record is streaming frames.
    pub const fn is_active(self) -> bool {
        matches!(self, Runmode::Running | Runmode::Capturing | Runmode::Recording)
    }

    /// A stream-off has been issued but quiescence is not yet confirmed.
    pub const fn is_stopping(self) -> bool {
        matches!(
            self,
            Runmode::RunningStop | Runmode::CapturingStop | Runmode::RecordingStop
        )
    }

    /// The stop state paired with an active mode.
    pub(crate) const fn stop_state(self) -> Option<Runmode> {
        match self {
            Runmode::Running => Some(Runmode::RunningStop),
            Runmode::Capturing => Some(Runmode::CapturingStop),
            Runmode::Recording => Some(Runmode::RecordingStop),
            _ => None,
        }
    }
}

/// Sensor operating mode requested by the host.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OperatingMode {
    /// Preview / camcorder streaming.
    Video,
    /// Still capture.
    Image,
}

/// Host stream on/off request.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StreamCmd {
    Stop,
    Start,
}

/// Pending wide-ratio capture table swap.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum WideRequest {
    #[default]
    None,
    Change,
    Restore,
}

/// Pixel format codes the sensor can emit.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PixelFormat {
    Yuv422,
    Jpeg,
}

/// Whether a format request targets the preview or the capture path.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FormatMode {
    Preview,
    Capture,
}

/// Format negotiation request from the host.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PixFormat {
    pub width: u32,
    pub height: u32,
    pub pixel: PixelFormat,
    pub mode: FormatMode,
}

/// Preview frame sizes with a compiled-in register table.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PreviewSize {
    /// 320x240
    Qvga,
    /// 352x288
    Cif,
    /// 640x480
    Vga,
}

pub const PREVIEW_SIZE_COUNT: usize = 3;

/// Capture frame sizes with a compiled-in register table.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CaptureSize {
    /// 640x480
    Vga,
    /// 1280x960
    OneMp,
}

pub const CAPTURE_SIZE_COUNT: usize = 2;

/// Frame-size descriptor: table index plus pixel dimensions.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FrameSize {
    pub index: usize,
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    /// Aspect-ratio class, `width * 10 / height`.
    pub const fn ratio(&self) -> u32 {
        frame_ratio(self.width, self.height)
    }
}

pub const fn frame_ratio(width: u32, height: u32) -> u32 {
    width * 10 / height
}

/// Named aspect-ratio classes.
pub mod frmratio {
    /// 1:1
    pub const SQUARE: u32 = 10;
    /// 11:9
    pub const QCIF: u32 = 12;
    /// 4:3
    pub const VGA: u32 = 13;
    /// 3:2
    pub const D1: u32 = 15;
    /// 5:3
    pub const WVGA: u32 = 16;
    /// 16:9
    pub const HD: u32 = 17;
}

pub static PREVIEW_FRAMESIZES: [FrameSize; PREVIEW_SIZE_COUNT] = [
    FrameSize { index: PreviewSize::Qvga as usize, width: 320, height: 240 },
    FrameSize { index: PreviewSize::Cif as usize, width: 352, height: 288 },
    FrameSize { index: PreviewSize::Vga as usize, width: 640, height: 480 },
];

pub static CAPTURE_FRAMESIZES: [FrameSize; CAPTURE_SIZE_COUNT] = [
    FrameSize { index: CaptureSize::Vga as usize, width: 640, height: 480 },
    FrameSize { index: CaptureSize::OneMp as usize, width: 1280, height: 960 },
];

/// Picks the frame size for a requested geometry: exact match first, then
/// the largest entry sharing the request's aspect-ratio class, then the
/// largest entry overall.
pub fn find_framesize<const N: usize>(
    sizes: &'static [FrameSize; N],
    width: u32,
    height: u32,
) -> &'static FrameSize {
    if let Some(exact) = sizes
        .iter()
        .find(|f| f.width == width && f.height == height)
    {
        return exact;
    }
    let want_ratio = frame_ratio(width, height);
    let mut best = &sizes[0];
    let mut best_ratio_match = best.ratio() == want_ratio;
    for f in &sizes[1..] {
        let ratio_match = f.ratio() == want_ratio;
        if (ratio_match && !best_ratio_match)
            || (ratio_match == best_ratio_match && f.width > best.width)
        {
            best = f;
            best_ratio_match = ratio_match;
        }
    }
    best
}

/// Frame-rate settings with a compiled-in register table. `Auto` lets the
/// sensor pick by light level.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FpsIndex {
    Auto,
    Fps7,
    Fps10,
    Fps12,
    Fps15,
    Fps25,
    Fps30,
}

pub const FPS_COUNT: usize = 7;

impl FpsIndex {
    /// Maps a requested frame rate to a table index. 0 selects auto.
    pub fn from_fps(fps: u32) -> Option<FpsIndex> {
        match fps {
            0 => Some(FpsIndex::Auto),
            7 => Some(FpsIndex::Fps7),
            10 => Some(FpsIndex::Fps10),
            12 => Some(FpsIndex::Fps12),
            15 => Some(FpsIndex::Fps15),
            25 => Some(FpsIndex::Fps25),
            30 => Some(FpsIndex::Fps30),
            _ => None,
        }
    }

    pub const fn fps(self) -> u32 {
        match self {
            FpsIndex::Auto => 0,
            FpsIndex::Fps7 => 7,
            FpsIndex::Fps10 => 10,
            FpsIndex::Fps12 => 12,
            FpsIndex::Fps15 => 15,
            FpsIndex::Fps25 => 25,
            FpsIndex::Fps30 => 30,
        }
    }
}

/// Exposure value, EV-4 .. EV+4.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Ev(i8);

pub const EV_COUNT: usize = 9;

impl Ev {
    pub const MIN: i8 = -4;
    pub const MAX: i8 = 4;

    pub fn new(value: i8) -> Option<Ev> {
        (Self::MIN..=Self::MAX).contains(&value).then_some(Ev(value))
    }

    pub const fn value(self) -> i8 {
        self.0
    }

    /// Table index: EV-4 maps to 0.
    pub const fn index(self) -> usize {
        (self.0 - Self::MIN) as usize
    }
}

impl Default for Ev {
    fn default() -> Self {
        Ev(0)
    }
}

/// Exposure metering window.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Metering {
    #[default]
    Matrix,
    CenterWeighted,
    Spot,
}

pub const METERING_COUNT: usize = 3;

/// ISO sensitivity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Iso {
    #[default]
    Auto,
    Iso100,
    Iso200,
    Iso400,
}

pub const ISO_COUNT: usize = 4;

/// Image effect applied by the sensor ISP.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ImageEffect {
    #[default]
    None,
    Mono,
    Sepia,
    Negative,
    Aqua,
}

pub const EFFECT_COUNT: usize = 5;

/// White-balance preset.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum WhiteBalanceMode {
    #[default]
    Auto,
    Daylight,
    Cloudy,
    Incandescent,
    Fluorescent,
}

pub const WHITE_BALANCE_COUNT: usize = 5;

/// Scene preset.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum SceneMode {
    #[default]
    None,
    Portrait,
    Landscape,
    Sports,
    Party,
    Beach,
    Sunset,
    Night,
    Text,
}

pub const SCENE_MODE_COUNT: usize = 9;

/// Five-step adjustment level (-2 .. +2) shared by saturation, contrast
/// and sharpness.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Level(i8);

pub const LEVEL_COUNT: usize = 5;

impl Level {
    pub const MIN: i8 = -2;
    pub const MAX: i8 = 2;

    pub fn new(value: i8) -> Option<Level> {
        (Self::MIN..=Self::MAX)
            .contains(&value)
            .then_some(Level(value))
    }

    pub const fn value(self) -> i8 {
        self.0
    }

    pub const fn index(self) -> usize {
        (self.0 - Self::MIN) as usize
    }
}

impl Default for Level {
    fn default() -> Self {
        Level(0)
    }
}

/// Focus mode requested by the host.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum FocusMode {
    #[default]
    Auto,
    Macro,
    /// Touch-to-focus: window follows the reported object position.
    Touch,
}

/// Flash firing policy.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum FlashMode {
    #[default]
    Off,
    Auto,
    On,
    Torch,
}

/// Pre-flash phase while metering for a flash capture.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum PreflashPhase {
    #[default]
    None,
    Off,
    On,
}

/// EXIF snapshot captured alongside a still image.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Exif {
    /// Exposure time as 1/n s.
    pub exp_time_den: u16,
    pub iso: u16,
    /// EXIF flash field bits, see [`exif_flash`].
    pub flash: u16,
}

/// EXIF flash field bit values.
pub mod exif_flash {
    pub const FIRED: u16 = 0x01;
    pub const MODE_FIRING: u16 = 0x01 << 3;
    pub const MODE_SUPPRESSION: u16 = 0x02 << 3;
    pub const MODE_AUTO: u16 = 0x03 << 3;
}

impl fmt::Display for Runmode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_classes_match_named_constants() {
        assert_eq!(frame_ratio(640, 480), frmratio::VGA);
        assert_eq!(frame_ratio(320, 240), frmratio::VGA);
        assert_eq!(frame_ratio(352, 288), frmratio::QCIF);
        assert_eq!(frame_ratio(720, 480), frmratio::D1);
        assert_eq!(frame_ratio(800, 480), frmratio::WVGA);
        assert_eq!(frame_ratio(1280, 720), frmratio::HD);
        assert_eq!(frame_ratio(600, 600), frmratio::SQUARE);
    }

    #[test]
    fn find_framesize_prefers_exact_then_ratio() {
        let vga = find_framesize(&PREVIEW_FRAMESIZES, 640, 480);
        assert_eq!(vga.index, PreviewSize::Vga as usize);

        // 800x600 is 4:3 but not an exact entry; the largest 4:3 entry wins.
        let nearest = find_framesize(&PREVIEW_FRAMESIZES, 800, 600);
        assert_eq!(nearest.index, PreviewSize::Vga as usize);

        // 16:9 has no entry at all; fall back to the largest table entry.
        let fallback = find_framesize(&PREVIEW_FRAMESIZES, 1280, 720);
        assert_eq!(fallback.index, PreviewSize::Vga as usize);

        let cap = find_framesize(&CAPTURE_FRAMESIZES, 1280, 960);
        assert_eq!(cap.index, CaptureSize::OneMp as usize);
    }

    #[test]
    fn ev_index_is_offset_from_minimum() {
        assert_eq!(Ev::new(-4).unwrap().index(), 0);
        assert_eq!(Ev::new(0).unwrap().index(), 4);
        assert_eq!(Ev::new(4).unwrap().index(), 8);
        assert!(Ev::new(5).is_none());
        assert!(Ev::new(-5).is_none());
    }

    #[test]
    fn fps_lookup_round_trips() {
        for idx in [
            FpsIndex::Auto,
            FpsIndex::Fps7,
            FpsIndex::Fps10,
            FpsIndex::Fps12,
            FpsIndex::Fps15,
            FpsIndex::Fps25,
            FpsIndex::Fps30,
        ] {
            assert_eq!(FpsIndex::from_fps(idx.fps()), Some(idx));
        }
        assert_eq!(FpsIndex::from_fps(24), None);
    }

    #[test]
    fn stop_states_pair_with_active_modes() {
        assert_eq!(Runmode::Running.stop_state(), Some(Runmode::RunningStop));
        assert_eq!(Runmode::Capturing.stop_state(), Some(Runmode::CapturingStop));
        assert_eq!(Runmode::Recording.stop_state(), Some(Runmode::RecordingStop));
        assert_eq!(Runmode::Init.stop_state(), None);
        assert!(Runmode::RunningStop.is_stopping());
        assert!(!Runmode::RunningStop.is_active());
    }
}
