// src/regs/mod.rs

use core::fmt::Debug;

use crate::common::error::Db8131aError;

pub mod tables;

/// Delay marker: a pair whose address byte is `REG_DELAY` is not written to
/// the bus; its value byte is a wait in milliseconds. Bursts are split at
/// markers.
pub const REG_DELAY: u8 = 0xE7;

/// Page-select register; the map is banked behind it.
pub const REG_PAGE: u8 = 0xFF;

/// Read-back registers, valid once the matching `get_*` table has pointed
/// the sensor at the status page.
pub mod status {
    /// Chip id, page 0x00.
    pub const CHIP_ID_HI: u8 = 0x00;
    pub const CHIP_ID_LO: u8 = 0x01;
    pub const CHIP_REV: u8 = 0x02;

    /// AE convergence flag, page 0x02.
    pub const AE_STABLE: u8 = 0x0E;
    pub const AE_STABLE_DONE: u8 = 0x01;

    /// AF engine state, page 0x02.
    pub const AF_STATUS: u8 = 0x10;
    pub const AF_SEARCHING: u8 = 0x01;
    pub const AF_FOCUSED: u8 = 0x02;
    pub const AF_FAILED: u8 = 0x04;

    /// Scene luminance estimate, page 0x02, big-endian pair.
    pub const LIGHT_LEVEL_HI: u8 = 0x12;
    pub const LIGHT_LEVEL_LO: u8 = 0x13;

    /// Analog gain and shutter readback for EXIF, page 0x02.
    pub const ISO_GAIN: u8 = 0x14;
    pub const SHUTTER_HI: u8 = 0x15;
    pub const SHUTTER_LO: u8 = 0x16;

    /// ESD self-check result, page 0x02; zero means healthy.
    pub const ESD_STATUS: u8 = 0x18;

    /// Streaming state, page 0x02; zero once the pipeline has drained.
    pub const STREAM_STATE: u8 = 0x1A;
}

/// Expected chip identification.
pub const CHIP_ID: u16 = 0x6100;
pub const CHIP_REV: u8 = 0x06;
pub const CHIP_REV_OLD: u8 = 0x04;

/// An immutable named sequence of (register, value) pairs. Contents are
/// compile-time constant; the name survives for trace logging.
#[derive(Debug, Copy, Clone)]
pub struct RegTable {
    pub name: &'static str,
    pub regs: &'static [(u8, u8)],
}

impl RegTable {
    pub const fn len(&self) -> usize {
        self.regs.len()
    }

    pub const fn is_empty(&self) -> bool {
        self.regs.is_empty()
    }
}

/// Indexed register-table categories.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Category {
    Ev,
    Metering,
    Iso,
    Effect,
    WhiteBalance,
    PreviewSize,
    SceneMode,
    Saturation,
    Contrast,
    Sharpness,
    Fps,
    CaptureMode,
}

impl Category {
    pub const fn name(self) -> &'static str {
        match self {
            Category::Ev => "ev",
            Category::Metering => "metering",
            Category::Iso => "iso",
            Category::Effect => "effect",
            Category::WhiteBalance => "white_balance",
            Category::PreviewSize => "preview_size",
            Category::SceneMode => "scene_mode",
            Category::Saturation => "saturation",
            Category::Contrast => "contrast",
            Category::Sharpness => "sharpness",
            Category::Fps => "fps",
            Category::CaptureMode => "capture_mode",
        }
    }
}

/// Out-of-bounds category lookup.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SelectError {
    pub category: &'static str,
    pub index: usize,
    pub size: usize,
}

impl<E: Debug> From<SelectError> for Db8131aError<E> {
    fn from(e: SelectError) -> Self {
        Db8131aError::BadTableIndex {
            category: e.category,
            index: e.index,
            size: e.size,
        }
    }
}

/// The master table-of-tables for one firmware build.
///
/// Indexed categories are dense arrays selected by enum discriminant;
/// board-variant singletons that may be compiled out are `Option`s, and
/// the capability descriptor resolved at bind time decides whether they
/// are consulted at all.
pub struct RegBank {
    pub ev: [RegTable; crate::common::types::EV_COUNT],
    pub metering: [RegTable; crate::common::types::METERING_COUNT],
    pub iso: [RegTable; crate::common::types::ISO_COUNT],
    pub effect: [RegTable; crate::common::types::EFFECT_COUNT],
    pub white_balance: [RegTable; crate::common::types::WHITE_BALANCE_COUNT],
    pub preview_size: [RegTable; crate::common::types::PREVIEW_SIZE_COUNT],
    pub scene_mode: [RegTable; crate::common::types::SCENE_MODE_COUNT],
    pub saturation: [RegTable; crate::common::types::LEVEL_COUNT],
    pub contrast: [RegTable; crate::common::types::LEVEL_COUNT],
    pub sharpness: [RegTable; crate::common::types::LEVEL_COUNT],
    pub fps: [RegTable; crate::common::types::FPS_COUNT],
    pub capture_mode: [RegTable; crate::common::types::CAPTURE_SIZE_COUNT],

    // Flash / AE coordination
    pub flash_start: RegTable,
    pub flash_end: RegTable,
    pub af_pre_flash_start: RegTable,
    pub af_pre_flash_end: RegTable,
    pub flash_ae_set: RegTable,
    pub flash_ae_clear: RegTable,
    pub ae_lock_on: RegTable,
    pub ae_lock_off: RegTable,
    pub awb_lock_on: RegTable,
    pub awb_lock_off: RegTable,
    pub restore_cap: RegTable,
    pub change_wide_cap: RegTable,
    pub set_lowlight_cap: Option<RegTable>,

    // AF
    pub af_macro_mode: RegTable,
    pub af_normal_mode: RegTable,
    pub af_night_normal_mode: Option<RegTable>,
    pub af_off: RegTable,
    pub hd_af_start: RegTable,
    pub hd_first_af_start: RegTable,
    pub single_af_start: RegTable,

    // Init
    pub init: RegTable,
    pub init_vt: RegTable,

    // Status-page pointers
    pub get_light_level: RegTable,
    pub get_esd_status: RegTable,
    pub get_iso: RegTable,
    pub get_ae_stable: RegTable,
    pub get_shutterspeed: RegTable,

    // Mode transitions
    pub preview_mode: RegTable,
    pub preview_hd_mode: RegTable,
    pub return_preview_mode: RegTable,
    pub camcorder_on: RegTable,
    pub camcorder_off: RegTable,
    pub stream_stop: RegTable,
}

impl RegBank {
    fn category_slice(&self, cat: Category) -> &[RegTable] {
        match cat {
            Category::Ev => &self.ev,
            Category::Metering => &self.metering,
            Category::Iso => &self.iso,
            Category::Effect => &self.effect,
            Category::WhiteBalance => &self.white_balance,
            Category::PreviewSize => &self.preview_size,
            Category::SceneMode => &self.scene_mode,
            Category::Saturation => &self.saturation,
            Category::Contrast => &self.contrast,
            Category::Sharpness => &self.sharpness,
            Category::Fps => &self.fps,
            Category::CaptureMode => &self.capture_mode,
        }
    }

    /// Declared size of a category.
    pub fn category_size(&self, cat: Category) -> usize {
        self.category_slice(cat).len()
    }

    /// O(1) bounded lookup; indices at or past the category size fail
    /// without touching adjacent tables.
    pub fn table(&self, cat: Category, index: usize) -> Result<&RegTable, SelectError> {
        let slice = self.category_slice(cat);
        slice.get(index).ok_or(SelectError {
            category: cat.name(),
            index,
            size: slice.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{Ev, PreviewSize};

    #[test]
    fn in_range_lookup_is_stable_and_nonempty() {
        let bank = &tables::EVT1_1;
        for cat in [
            Category::Ev,
            Category::Metering,
            Category::Iso,
            Category::Effect,
            Category::WhiteBalance,
            Category::PreviewSize,
            Category::SceneMode,
            Category::Saturation,
            Category::Contrast,
            Category::Sharpness,
            Category::Fps,
            Category::CaptureMode,
        ] {
            let size = bank.category_size(cat);
            assert!(size > 0);
            for index in 0..size {
                let table = bank.table(cat, index).unwrap();
                assert!(!table.is_empty(), "{}[{index}] is empty", cat.name());
                // Same index, same table.
                let again = bank.table(cat, index).unwrap();
                assert_eq!(table.name, again.name);
            }
        }
    }

    #[test]
    fn out_of_range_lookup_is_rejected() {
        let bank = &tables::EVT1_1;
        let err = bank.table(Category::PreviewSize, 3).unwrap_err();
        assert_eq!(
            err,
            SelectError { category: "preview_size", index: 3, size: 3 }
        );
        assert!(bank.table(Category::Ev, usize::MAX).is_err());
    }

    #[test]
    fn enum_indices_select_the_matching_table() {
        let bank = &tables::EVT1_1;
        let vga = bank
            .table(Category::PreviewSize, PreviewSize::Vga as usize)
            .unwrap();
        assert!(vga.name.contains("VGA"));

        let ev0 = bank.table(Category::Ev, Ev::default().index()).unwrap();
        assert!(ev0.name.contains("EV_0"));
    }

    #[test]
    fn delay_markers_carry_sane_waits() {
        let bank = &tables::EVT1_1;
        for table in [&bank.init, &bank.init_vt, &bank.stream_stop, &bank.af_off] {
            for &(addr, value) in table.regs {
                if addr == REG_DELAY {
                    assert!(value > 0 && value <= 200, "{}: delay {value} ms", table.name);
                }
            }
        }
    }

    #[test]
    fn mode_tables_begin_with_a_page_select() {
        let bank = &tables::EVT1_1;
        for table in [
            &bank.preview_mode,
            &bank.return_preview_mode,
            &bank.camcorder_on,
            &bank.camcorder_off,
            &bank.stream_stop,
        ] {
            assert_eq!(table.regs[0].0, REG_PAGE, "{} must select its page", table.name);
        }
    }
}
