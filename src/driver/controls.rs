// src/driver/controls.rs

use core::fmt::Debug;

use crate::common::error::Db8131aError;
use crate::common::types::{
    Ev, FlashMode, FocusMode, FpsIndex, ImageEffect, Iso, Level, Metering, SceneMode,
    WhiteBalanceMode,
};

/// Base of the device-private control range. The numeric layout is part of
/// the host ABI and must not change between releases.
pub const CID_BASE: u32 = 0x0800_0000;

/// Camera controls accepted by the dispatch entry.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CtrlId {
    // set controls
    VtMode,
    SensorMode,
    Brightness,
    Metering,
    Iso,
    Effect,
    WhiteBalance,
    SceneMode,
    Saturation,
    Contrast,
    Sharpness,
    FrameRate,
    AeLock,
    AwbLock,
    FocusMode,
    SetAutoFocus,
    ObjectPositionX,
    ObjectPositionY,
    FlashMode,
    // get controls
    AutoFocusResult,
    ExifExptime,
    ExifIso,
    ExifFlash,
    LightLevel,
    CheckEsd,
}

/// All dispatchable controls, in raw-id order.
pub const ALL_CTRLS: [CtrlId; 25] = [
    CtrlId::VtMode,
    CtrlId::SensorMode,
    CtrlId::Brightness,
    CtrlId::Metering,
    CtrlId::Iso,
    CtrlId::Effect,
    CtrlId::WhiteBalance,
    CtrlId::SceneMode,
    CtrlId::Saturation,
    CtrlId::Contrast,
    CtrlId::Sharpness,
    CtrlId::FrameRate,
    CtrlId::AeLock,
    CtrlId::AwbLock,
    CtrlId::FocusMode,
    CtrlId::SetAutoFocus,
    CtrlId::ObjectPositionX,
    CtrlId::ObjectPositionY,
    CtrlId::FlashMode,
    CtrlId::AutoFocusResult,
    CtrlId::ExifExptime,
    CtrlId::ExifIso,
    CtrlId::ExifFlash,
    CtrlId::LightLevel,
    CtrlId::CheckEsd,
];

impl CtrlId {
    pub const fn raw(self) -> u32 {
        CID_BASE
            + match self {
                CtrlId::VtMode => 0,
                CtrlId::SensorMode => 1,
                CtrlId::Brightness => 2,
                CtrlId::Metering => 3,
                CtrlId::Iso => 4,
                CtrlId::Effect => 5,
                CtrlId::WhiteBalance => 6,
                CtrlId::SceneMode => 7,
                CtrlId::Saturation => 8,
                CtrlId::Contrast => 9,
                CtrlId::Sharpness => 10,
                CtrlId::FrameRate => 11,
                CtrlId::AeLock => 12,
                CtrlId::AwbLock => 13,
                CtrlId::FocusMode => 14,
                CtrlId::SetAutoFocus => 15,
                CtrlId::ObjectPositionX => 16,
                CtrlId::ObjectPositionY => 17,
                CtrlId::FlashMode => 18,
                CtrlId::AutoFocusResult => 19,
                CtrlId::ExifExptime => 20,
                CtrlId::ExifIso => 21,
                CtrlId::ExifFlash => 22,
                CtrlId::LightLevel => 23,
                CtrlId::CheckEsd => 24,
            }
    }

    pub fn from_raw(raw: u32) -> Option<CtrlId> {
        let offset = raw.checked_sub(CID_BASE)?;
        match offset {
            0 => Some(CtrlId::VtMode),
            1 => Some(CtrlId::SensorMode),
            2 => Some(CtrlId::Brightness),
            3 => Some(CtrlId::Metering),
            4 => Some(CtrlId::Iso),
            5 => Some(CtrlId::Effect),
            6 => Some(CtrlId::WhiteBalance),
            7 => Some(CtrlId::SceneMode),
            8 => Some(CtrlId::Saturation),
            9 => Some(CtrlId::Contrast),
            10 => Some(CtrlId::Sharpness),
            11 => Some(CtrlId::FrameRate),
            12 => Some(CtrlId::AeLock),
            13 => Some(CtrlId::AwbLock),
            14 => Some(CtrlId::FocusMode),
            15 => Some(CtrlId::SetAutoFocus),
            16 => Some(CtrlId::ObjectPositionX),
            17 => Some(CtrlId::ObjectPositionY),
            18 => Some(CtrlId::FlashMode),
            19 => Some(CtrlId::AutoFocusResult),
            20 => Some(CtrlId::ExifExptime),
            21 => Some(CtrlId::ExifIso),
            22 => Some(CtrlId::ExifFlash),
            23 => Some(CtrlId::LightLevel),
            24 => Some(CtrlId::CheckEsd),
            _ => None,
        }
    }

    /// Declared bounds and default for a settable control; `None` for
    /// get-only controls.
    pub const fn desc(self) -> Option<CtrlDesc> {
        let (min, max, default) = match self {
            CtrlId::VtMode => (0, 1, 0),
            CtrlId::SensorMode => (0, 1, 0),
            CtrlId::Brightness => (Ev::MIN as i32, Ev::MAX as i32, 0),
            CtrlId::Metering => (0, 2, 0),
            CtrlId::Iso => (0, 3, 0),
            CtrlId::Effect => (0, 4, 0),
            CtrlId::WhiteBalance => (0, 4, 0),
            CtrlId::SceneMode => (0, 8, 0),
            CtrlId::Saturation | CtrlId::Contrast | CtrlId::Sharpness => {
                (Level::MIN as i32, Level::MAX as i32, 0)
            }
            CtrlId::FrameRate => (0, 30, 0),
            CtrlId::AeLock | CtrlId::AwbLock => (0, 1, 0),
            CtrlId::FocusMode => (0, 2, 0),
            CtrlId::SetAutoFocus => (0, 1, 0),
            CtrlId::ObjectPositionX | CtrlId::ObjectPositionY => (0, 2048, 0),
            CtrlId::FlashMode => (0, 3, 0),
            CtrlId::AutoFocusResult
            | CtrlId::ExifExptime
            | CtrlId::ExifIso
            | CtrlId::ExifFlash
            | CtrlId::LightLevel
            | CtrlId::CheckEsd => return None,
        };
        Some(CtrlDesc { id: self, min, max, default })
    }
}

/// Declared range and default of one control.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CtrlDesc {
    pub id: CtrlId,
    pub min: i32,
    pub max: i32,
    pub default: i32,
}

/// Validation failure, before any state mutation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CtrlError {
    Unknown(u32),
    OutOfRange { id: u32, value: i32, min: i32, max: i32 },
    GetOnly(u32),
}

impl<E: Debug> From<CtrlError> for Db8131aError<E> {
    fn from(e: CtrlError) -> Self {
        match e {
            CtrlError::Unknown(id) => Db8131aError::UnknownControl(id),
            CtrlError::OutOfRange { id, value, min, max } => {
                Db8131aError::OutOfRange { id, value, min, max }
            }
            // Writing a read-only control is an argument error too.
            CtrlError::GetOnly(id) => Db8131aError::UnknownControl(id),
        }
    }
}

/// Range-checks a raw set request against the control table.
pub fn validate_set(id: CtrlId, value: i32) -> Result<(), CtrlError> {
    let Some(desc) = id.desc() else {
        return Err(CtrlError::GetOnly(id.raw()));
    };
    if value < desc.min || value > desc.max {
        return Err(CtrlError::OutOfRange {
            id: id.raw(),
            value,
            min: desc.min,
            max: desc.max,
        });
    }
    Ok(())
}

// Raw-value decoding. Values arrive range-checked, so these only translate.

pub(crate) fn ev_from(value: i32) -> Option<Ev> {
    Ev::new(value as i8)
}

pub(crate) fn level_from(value: i32) -> Option<Level> {
    Level::new(value as i8)
}

pub(crate) fn metering_from(value: i32) -> Option<Metering> {
    match value {
        0 => Some(Metering::Matrix),
        1 => Some(Metering::CenterWeighted),
        2 => Some(Metering::Spot),
        _ => None,
    }
}

pub(crate) fn iso_from(value: i32) -> Option<Iso> {
    match value {
        0 => Some(Iso::Auto),
        1 => Some(Iso::Iso100),
        2 => Some(Iso::Iso200),
        3 => Some(Iso::Iso400),
        _ => None,
    }
}

pub(crate) fn effect_from(value: i32) -> Option<ImageEffect> {
    match value {
        0 => Some(ImageEffect::None),
        1 => Some(ImageEffect::Mono),
        2 => Some(ImageEffect::Sepia),
        3 => Some(ImageEffect::Negative),
        4 => Some(ImageEffect::Aqua),
        _ => None,
    }
}

pub(crate) fn wb_from(value: i32) -> Option<WhiteBalanceMode> {
    match value {
        0 => Some(WhiteBalanceMode::Auto),
        1 => Some(WhiteBalanceMode::Daylight),
        2 => Some(WhiteBalanceMode::Cloudy),
        3 => Some(WhiteBalanceMode::Incandescent),
        4 => Some(WhiteBalanceMode::Fluorescent),
        _ => None,
    }
}

pub(crate) fn scene_from(value: i32) -> Option<SceneMode> {
    match value {
        0 => Some(SceneMode::None),
        1 => Some(SceneMode::Portrait),
        2 => Some(SceneMode::Landscape),
        3 => Some(SceneMode::Sports),
        4 => Some(SceneMode::Party),
        5 => Some(SceneMode::Beach),
        6 => Some(SceneMode::Sunset),
        7 => Some(SceneMode::Night),
        8 => Some(SceneMode::Text),
        _ => None,
    }
}

pub(crate) fn focus_mode_from(value: i32) -> Option<FocusMode> {
    match value {
        0 => Some(FocusMode::Auto),
        1 => Some(FocusMode::Macro),
        2 => Some(FocusMode::Touch),
        _ => None,
    }
}

pub(crate) fn flash_mode_from(value: i32) -> Option<FlashMode> {
    match value {
        0 => Some(FlashMode::Off),
        1 => Some(FlashMode::Auto),
        2 => Some(FlashMode::On),
        3 => Some(FlashMode::Torch),
        _ => None,
    }
}

pub(crate) fn fps_from(value: i32) -> Option<FpsIndex> {
    u32::try_from(value).ok().and_then(FpsIndex::from_fps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_ids_round_trip() {
        for id in ALL_CTRLS {
            assert_eq!(CtrlId::from_raw(id.raw()), Some(id));
        }
        assert_eq!(CtrlId::from_raw(CtrlId::CheckEsd.raw()), Some(CtrlId::CheckEsd));
        assert_eq!(CtrlId::from_raw(CID_BASE + 25), None);
        assert_eq!(CtrlId::from_raw(0), None);
    }

    #[test]
    fn validation_enforces_declared_bounds() {
        assert!(validate_set(CtrlId::Brightness, 4).is_ok());
        assert!(validate_set(CtrlId::Brightness, -4).is_ok());
        assert_eq!(
            validate_set(CtrlId::Brightness, 5),
            Err(CtrlError::OutOfRange {
                id: CtrlId::Brightness.raw(),
                value: 5,
                min: -4,
                max: 4
            })
        );
        assert_eq!(
            validate_set(CtrlId::AutoFocusResult, 1),
            Err(CtrlError::GetOnly(CtrlId::AutoFocusResult.raw()))
        );
    }

    #[test]
    fn decoders_accept_the_validated_range() {
        for v in 0..=2 {
            assert!(metering_from(v).is_some());
        }
        for v in 0..=8 {
            assert!(scene_from(v).is_some());
        }
        assert!(fps_from(15).is_some());
        assert!(fps_from(24).is_none(), "24 fps has no register table");
    }
}
