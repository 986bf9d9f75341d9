// src/regs/tables.rs

//! Compiled-in register tables for firmware EVT1.1.
//!
//! The map is banked: every table selects its page through `REG_PAGE`
//! before touching banked registers. A pair whose address is `REG_DELAY`
//! is a wait in milliseconds, not a write.

use super::{RegBank, RegTable, REG_DELAY, REG_PAGE};

macro_rules! regset {
    ($table:ident) => {
        RegTable {
            name: stringify!($table),
            regs: &$table,
        }
    };
}

// === Exposure value (AE target / bias), page 0x01 ===

static EV_M4: [(u8, u8); 3] = [(REG_PAGE, 0x01), (0x38, 0x28), (0x39, 0x82)];
static EV_M3: [(u8, u8); 3] = [(REG_PAGE, 0x01), (0x38, 0x2E), (0x39, 0x81)];
static EV_M2: [(u8, u8); 3] = [(REG_PAGE, 0x01), (0x38, 0x34), (0x39, 0x81)];
static EV_M1: [(u8, u8); 3] = [(REG_PAGE, 0x01), (0x38, 0x3A), (0x39, 0x80)];
static EV_0: [(u8, u8); 3] = [(REG_PAGE, 0x01), (0x38, 0x40), (0x39, 0x00)];
static EV_P1: [(u8, u8); 3] = [(REG_PAGE, 0x01), (0x38, 0x46), (0x39, 0x00)];
static EV_P2: [(u8, u8); 3] = [(REG_PAGE, 0x01), (0x38, 0x4C), (0x39, 0x01)];
static EV_P3: [(u8, u8); 3] = [(REG_PAGE, 0x01), (0x38, 0x52), (0x39, 0x01)];
static EV_P4: [(u8, u8); 3] = [(REG_PAGE, 0x01), (0x38, 0x58), (0x39, 0x02)];

// === Metering window weights, page 0x01 ===

static METERING_MATRIX: [(u8, u8); 5] =
    [(REG_PAGE, 0x01), (0x40, 0x11), (0x41, 0x11), (0x42, 0x11), (0x43, 0x11)];
static METERING_CENTER: [(u8, u8); 5] =
    [(REG_PAGE, 0x01), (0x40, 0x01), (0x41, 0x34), (0x42, 0x43), (0x43, 0x10)];
static METERING_SPOT: [(u8, u8); 5] =
    [(REG_PAGE, 0x01), (0x40, 0x00), (0x41, 0x06), (0x42, 0x60), (0x43, 0x00)];

// === ISO (analog gain ceiling), page 0x01 ===

static ISO_AUTO: [(u8, u8); 3] = [(REG_PAGE, 0x01), (0x2A, 0x00), (0x2B, 0x80)];
static ISO_100: [(u8, u8); 3] = [(REG_PAGE, 0x01), (0x2A, 0x01), (0x2B, 0x10)];
static ISO_200: [(u8, u8); 3] = [(REG_PAGE, 0x01), (0x2A, 0x01), (0x2B, 0x20)];
static ISO_400: [(u8, u8); 3] = [(REG_PAGE, 0x01), (0x2A, 0x01), (0x2B, 0x40)];

// === ISP image effect, page 0x01 ===

static EFFECT_NONE: [(u8, u8); 3] = [(REG_PAGE, 0x01), (0x60, 0x00), (0x61, 0x00)];
static EFFECT_MONO: [(u8, u8); 3] = [(REG_PAGE, 0x01), (0x60, 0x01), (0x61, 0x00)];
static EFFECT_SEPIA: [(u8, u8); 3] = [(REG_PAGE, 0x01), (0x60, 0x03), (0x61, 0x2B)];
static EFFECT_NEGATIVE: [(u8, u8); 3] = [(REG_PAGE, 0x01), (0x60, 0x05), (0x61, 0x00)];
static EFFECT_AQUA: [(u8, u8); 3] = [(REG_PAGE, 0x01), (0x60, 0x03), (0x61, 0x5C)];

// === White balance, page 0x01 ===

static WB_AUTO: [(u8, u8); 2] = [(REG_PAGE, 0x01), (0x4E, 0x00)];
static WB_DAYLIGHT: [(u8, u8); 6] = [
    (REG_PAGE, 0x01),
    (0x4E, 0x01),
    (0x50, 0x5A),
    (0x51, 0x40),
    (0x52, 0x40),
    (0x53, 0x4C),
];
static WB_CLOUDY: [(u8, u8); 6] = [
    (REG_PAGE, 0x01),
    (0x4E, 0x01),
    (0x50, 0x62),
    (0x51, 0x40),
    (0x52, 0x40),
    (0x53, 0x45),
];
static WB_INCANDESCENT: [(u8, u8); 6] = [
    (REG_PAGE, 0x01),
    (0x4E, 0x01),
    (0x50, 0x40),
    (0x51, 0x40),
    (0x52, 0x40),
    (0x53, 0x70),
];
static WB_FLUORESCENT: [(u8, u8); 6] = [
    (REG_PAGE, 0x01),
    (0x4E, 0x01),
    (0x50, 0x4A),
    (0x51, 0x40),
    (0x52, 0x40),
    (0x53, 0x60),
];

// === Preview scaler, page 0x03 ===

static PREVIEW_SZ_QVGA: [(u8, u8); 6] = [
    (REG_PAGE, 0x03),
    (0x10, 0x01),
    (0x11, 0x40),
    (0x12, 0x00),
    (0x13, 0xF0),
    (0x14, 0x02),
];
static PREVIEW_SZ_CIF: [(u8, u8); 6] = [
    (REG_PAGE, 0x03),
    (0x10, 0x01),
    (0x11, 0x60),
    (0x12, 0x01),
    (0x13, 0x20),
    (0x14, 0x02),
];
static PREVIEW_SZ_VGA: [(u8, u8); 6] = [
    (REG_PAGE, 0x03),
    (0x10, 0x02),
    (0x11, 0x80),
    (0x12, 0x01),
    (0x13, 0xE0),
    (0x14, 0x01),
];

// === Scene presets, page 0x01 ===

static SCENE_OFF: [(u8, u8); 2] = [(REG_PAGE, 0x01), (0x70, 0x00)];
static SCENE_PORTRAIT: [(u8, u8); 3] = [(REG_PAGE, 0x01), (0x70, 0x01), (0x68, 0x30)];
static SCENE_LANDSCAPE: [(u8, u8); 4] =
    [(REG_PAGE, 0x01), (0x70, 0x02), (0x64, 0x50), (0x68, 0x50)];
static SCENE_SPORTS: [(u8, u8); 3] = [(REG_PAGE, 0x01), (0x70, 0x03), (0x2A, 0x01)];
static SCENE_PARTY: [(u8, u8); 4] =
    [(REG_PAGE, 0x01), (0x70, 0x04), (0x64, 0x48), (0x2B, 0x20)];
static SCENE_BEACH: [(u8, u8); 4] =
    [(REG_PAGE, 0x01), (0x70, 0x05), (0x38, 0x46), (0x64, 0x48)];
static SCENE_SUNSET: [(u8, u8); 4] =
    [(REG_PAGE, 0x01), (0x70, 0x06), (0x4E, 0x01), (0x50, 0x58)];
static SCENE_NIGHT: [(u8, u8); 4] =
    [(REG_PAGE, 0x01), (0x70, 0x07), (0x2C, 0x18), (0x2D, 0x60)];
static SCENE_TEXT: [(u8, u8); 3] = [(REG_PAGE, 0x01), (0x70, 0x08), (0x68, 0x60)];

// === Saturation / contrast / sharpness, page 0x01 ===

static SATURATION_M2: [(u8, u8); 2] = [(REG_PAGE, 0x01), (0x64, 0x20)];
static SATURATION_M1: [(u8, u8); 2] = [(REG_PAGE, 0x01), (0x64, 0x30)];
static SATURATION_0: [(u8, u8); 2] = [(REG_PAGE, 0x01), (0x64, 0x40)];
static SATURATION_P1: [(u8, u8); 2] = [(REG_PAGE, 0x01), (0x64, 0x50)];
static SATURATION_P2: [(u8, u8); 2] = [(REG_PAGE, 0x01), (0x64, 0x60)];

static CONTRAST_M2: [(u8, u8); 2] = [(REG_PAGE, 0x01), (0x66, 0x20)];
static CONTRAST_M1: [(u8, u8); 2] = [(REG_PAGE, 0x01), (0x66, 0x30)];
static CONTRAST_0: [(u8, u8); 2] = [(REG_PAGE, 0x01), (0x66, 0x40)];
static CONTRAST_P1: [(u8, u8); 2] = [(REG_PAGE, 0x01), (0x66, 0x50)];
static CONTRAST_P2: [(u8, u8); 2] = [(REG_PAGE, 0x01), (0x66, 0x60)];

static SHARPNESS_M2: [(u8, u8); 2] = [(REG_PAGE, 0x01), (0x68, 0x10)];
static SHARPNESS_M1: [(u8, u8); 2] = [(REG_PAGE, 0x01), (0x68, 0x28)];
static SHARPNESS_0: [(u8, u8); 2] = [(REG_PAGE, 0x01), (0x68, 0x40)];
static SHARPNESS_P1: [(u8, u8); 2] = [(REG_PAGE, 0x01), (0x68, 0x58)];
static SHARPNESS_P2: [(u8, u8); 2] = [(REG_PAGE, 0x01), (0x68, 0x70)];

// === Frame rate (vertical blanking divider + banding filter), page 0x00 ===

static FPS_AUTO: [(u8, u8); 4] =
    [(REG_PAGE, 0x00), (0x14, 0x00), (0x15, 0x00), (0x16, 0x01)];
static FPS_7: [(u8, u8); 4] = [(REG_PAGE, 0x00), (0x14, 0x04), (0x15, 0x4C), (0x16, 0x00)];
static FPS_10: [(u8, u8); 4] = [(REG_PAGE, 0x00), (0x14, 0x03), (0x15, 0x00), (0x16, 0x00)];
static FPS_12: [(u8, u8); 4] = [(REG_PAGE, 0x00), (0x14, 0x02), (0x15, 0x80), (0x16, 0x00)];
static FPS_15: [(u8, u8); 4] = [(REG_PAGE, 0x00), (0x14, 0x02), (0x15, 0x00), (0x16, 0x00)];
static FPS_25: [(u8, u8); 4] = [(REG_PAGE, 0x00), (0x14, 0x01), (0x15, 0x33), (0x16, 0x00)];
static FPS_30: [(u8, u8); 4] = [(REG_PAGE, 0x00), (0x14, 0x01), (0x15, 0x00), (0x16, 0x00)];

// === Still capture windowing, page 0x03 ===

static CAPTURE_VGA: [(u8, u8); 7] = [
    (REG_PAGE, 0x03),
    (0x20, 0x02),
    (0x21, 0x80),
    (0x22, 0x01),
    (0x23, 0xE0),
    (0x24, 0x01),
    (REG_DELAY, 10),
];
static CAPTURE_1MP: [(u8, u8); 7] = [
    (REG_PAGE, 0x03),
    (0x20, 0x05),
    (0x21, 0x00),
    (0x22, 0x03),
    (0x23, 0xC0),
    (0x24, 0x00),
    (REG_DELAY, 10),
];

// === Flash / AE coordination, page 0x06 ===

static FLASH_START: [(u8, u8); 4] =
    [(REG_PAGE, 0x06), (0x10, 0x01), (0x11, 0x3F), (REG_DELAY, 5)];
static FLASH_END: [(u8, u8); 3] = [(REG_PAGE, 0x06), (0x10, 0x00), (0x11, 0x00)];
static AF_PRE_FLASH_START: [(u8, u8); 4] =
    [(REG_PAGE, 0x06), (0x10, 0x01), (0x11, 0x18), (REG_DELAY, 5)];
static AF_PRE_FLASH_END: [(u8, u8); 3] = [(REG_PAGE, 0x06), (0x10, 0x00), (0x11, 0x00)];
static FLASH_AE_SET: [(u8, u8); 4] =
    [(REG_PAGE, 0x01), (0x3C, 0x01), (0x3D, 0x2C), (0x3E, 0x10)];
static FLASH_AE_CLEAR: [(u8, u8); 4] =
    [(REG_PAGE, 0x01), (0x3C, 0x00), (0x3D, 0x00), (0x3E, 0x00)];

static AE_LOCK_ON: [(u8, u8); 2] = [(REG_PAGE, 0x02), (0x30, 0x01)];
static AE_LOCK_OFF: [(u8, u8); 2] = [(REG_PAGE, 0x02), (0x30, 0x00)];
static AWB_LOCK_ON: [(u8, u8); 2] = [(REG_PAGE, 0x02), (0x31, 0x01)];
static AWB_LOCK_OFF: [(u8, u8); 2] = [(REG_PAGE, 0x02), (0x31, 0x00)];

static RESTORE_CAP: [(u8, u8); 4] =
    [(REG_PAGE, 0x03), (0x26, 0x00), (0x27, 0x00), (REG_DELAY, 5)];
static CHANGE_WIDE_CAP: [(u8, u8); 4] =
    [(REG_PAGE, 0x03), (0x26, 0x01), (0x27, 0x3C), (REG_DELAY, 5)];
static SET_LOWLIGHT_CAP: [(u8, u8); 4] =
    [(REG_PAGE, 0x01), (0x2C, 0x14), (0x2D, 0x50), (REG_DELAY, 5)];

// === Autofocus engine, page 0x05 ===

static AF_MACRO_MODE: [(u8, u8); 5] = [
    (REG_PAGE, 0x05),
    (0x20, 0x02),
    (0x21, 0x30),
    (0x22, 0xC8),
    (REG_DELAY, 10),
];
static AF_NORMAL_MODE: [(u8, u8); 5] = [
    (REG_PAGE, 0x05),
    (0x20, 0x01),
    (0x21, 0x00),
    (0x22, 0xFF),
    (REG_DELAY, 10),
];
static AF_NIGHT_NORMAL_MODE: [(u8, u8); 5] = [
    (REG_PAGE, 0x05),
    (0x20, 0x01),
    (0x21, 0x00),
    (0x23, 0x04),
    (REG_DELAY, 10),
];
static AF_OFF: [(u8, u8); 4] =
    [(REG_PAGE, 0x05), (0x10, 0x00), (0x24, 0x01), (REG_DELAY, 5)];
static HD_AF_START: [(u8, u8); 4] =
    [(REG_PAGE, 0x05), (0x12, 0x01), (0x10, 0x03), (REG_DELAY, 5)];
static HD_FIRST_AF_START: [(u8, u8); 5] = [
    (REG_PAGE, 0x05),
    (0x12, 0x01),
    (0x13, 0x01),
    (0x10, 0x03),
    (REG_DELAY, 5),
];
static SINGLE_AF_START: [(u8, u8); 3] = [(REG_PAGE, 0x05), (0x10, 0x01), (REG_DELAY, 5)];

// === Init sequences, page 0x00 then tuning pages ===

static INIT: [(u8, u8); 34] = [
    (REG_PAGE, 0x00),
    (0x08, 0x00), // stream off while configuring
    (0x03, 0x82), // soft reset
    (REG_DELAY, 10),
    (0x03, 0x02),
    (0x04, 0x11), // PLL pre-divider
    (0x05, 0x50), // PLL multiplier
    (0x06, 0x02), // system clock divider
    (0x0A, 0xC3), // pad drive strength
    (0x0B, 0x7F), // clock gating
    (REG_PAGE, 0x01),
    (0x20, 0x00), // AE on, auto banding
    (0x2A, 0x00), // gain ceiling auto
    (0x38, 0x40), // AE target
    (0x4E, 0x00), // AWB auto
    (0x60, 0x00), // effect off
    (0x64, 0x40), // saturation mid
    (0x66, 0x40), // contrast mid
    (0x68, 0x40), // sharpness mid
    (0x70, 0x00), // scene off
    (REG_PAGE, 0x02),
    (0x30, 0x00), // AE unlocked
    (0x31, 0x00), // AWB unlocked
    (REG_PAGE, 0x03),
    (0x10, 0x02), // VGA preview window
    (0x11, 0x80),
    (0x12, 0x01),
    (0x13, 0xE0),
    (0x14, 0x01),
    (0x16, 0x00), // YUV422 output
    (REG_PAGE, 0x00),
    (0x14, 0x00), // fps auto
    (0x15, 0x00),
    (REG_DELAY, 100),
];

/// Video-telephony init: capped frame rate, banding filter forced on.
static INIT_VT: [(u8, u8); 14] = [
    (REG_PAGE, 0x00),
    (0x08, 0x00),
    (0x03, 0x82),
    (REG_DELAY, 10),
    (0x03, 0x02),
    (0x04, 0x11),
    (0x05, 0x50),
    (0x14, 0x02), // lock to 15 fps
    (0x15, 0x00),
    (0x16, 0x01),
    (REG_PAGE, 0x01),
    (0x20, 0x01),
    (0x38, 0x3C),
    (REG_DELAY, 100),
];

// === Status-page pointers ===

static GET_LIGHT_LEVEL: [(u8, u8); 2] = [(REG_PAGE, 0x02), (0x1F, 0x01)];
static GET_ESD_STATUS: [(u8, u8); 2] = [(REG_PAGE, 0x02), (0x1F, 0x05)];
static GET_ISO: [(u8, u8); 2] = [(REG_PAGE, 0x02), (0x1F, 0x02)];
static GET_AE_STABLE: [(u8, u8); 2] = [(REG_PAGE, 0x02), (0x1F, 0x03)];
static GET_SHUTTERSPEED: [(u8, u8); 2] = [(REG_PAGE, 0x02), (0x1F, 0x04)];

// === Mode transitions ===

static PREVIEW_MODE: [(u8, u8); 4] = [
    (REG_PAGE, 0x00),
    (0x09, 0x00), // full-rate readout
    (0x08, 0x01), // stream on
    (REG_DELAY, 5),
];
static PREVIEW_HD_MODE: [(u8, u8); 4] = [
    (REG_PAGE, 0x00),
    (0x09, 0x01), // HD crop readout
    (0x08, 0x01),
    (REG_DELAY, 5),
];
static RETURN_PREVIEW_MODE: [(u8, u8); 4] =
    [(REG_PAGE, 0x03), (0x25, 0x00), (REG_PAGE, 0x00), (0x08, 0x01)];
static CAMCORDER_ON: [(u8, u8); 4] = [
    (REG_PAGE, 0x00),
    (0x18, 0x01), // fixed-rate exposure
    (0x08, 0x01),
    (REG_DELAY, 5),
];
static CAMCORDER_OFF: [(u8, u8); 3] =
    [(REG_PAGE, 0x00), (0x18, 0x00), (REG_DELAY, 5)];
static STREAM_STOP: [(u8, u8); 3] = [(REG_PAGE, 0x00), (0x08, 0x00), (REG_DELAY, 5)];

/// Master bank for firmware EVT1.1.
pub static EVT1_1: RegBank = RegBank {
    ev: [
        regset!(EV_M4),
        regset!(EV_M3),
        regset!(EV_M2),
        regset!(EV_M1),
        regset!(EV_0),
        regset!(EV_P1),
        regset!(EV_P2),
        regset!(EV_P3),
        regset!(EV_P4),
    ],
    metering: [
        regset!(METERING_MATRIX),
        regset!(METERING_CENTER),
        regset!(METERING_SPOT),
    ],
    iso: [
        regset!(ISO_AUTO),
        regset!(ISO_100),
        regset!(ISO_200),
        regset!(ISO_400),
    ],
    effect: [
        regset!(EFFECT_NONE),
        regset!(EFFECT_MONO),
        regset!(EFFECT_SEPIA),
        regset!(EFFECT_NEGATIVE),
        regset!(EFFECT_AQUA),
    ],
    white_balance: [
        regset!(WB_AUTO),
        regset!(WB_DAYLIGHT),
        regset!(WB_CLOUDY),
        regset!(WB_INCANDESCENT),
        regset!(WB_FLUORESCENT),
    ],
    preview_size: [
        regset!(PREVIEW_SZ_QVGA),
        regset!(PREVIEW_SZ_CIF),
        regset!(PREVIEW_SZ_VGA),
    ],
    scene_mode: [
        regset!(SCENE_OFF),
        regset!(SCENE_PORTRAIT),
        regset!(SCENE_LANDSCAPE),
        regset!(SCENE_SPORTS),
        regset!(SCENE_PARTY),
        regset!(SCENE_BEACH),
        regset!(SCENE_SUNSET),
        regset!(SCENE_NIGHT),
        regset!(SCENE_TEXT),
    ],
    saturation: [
        regset!(SATURATION_M2),
        regset!(SATURATION_M1),
        regset!(SATURATION_0),
        regset!(SATURATION_P1),
        regset!(SATURATION_P2),
    ],
    contrast: [
        regset!(CONTRAST_M2),
        regset!(CONTRAST_M1),
        regset!(CONTRAST_0),
        regset!(CONTRAST_P1),
        regset!(CONTRAST_P2),
    ],
    sharpness: [
        regset!(SHARPNESS_M2),
        regset!(SHARPNESS_M1),
        regset!(SHARPNESS_0),
        regset!(SHARPNESS_P1),
        regset!(SHARPNESS_P2),
    ],
    fps: [
        regset!(FPS_AUTO),
        regset!(FPS_7),
        regset!(FPS_10),
        regset!(FPS_12),
        regset!(FPS_15),
        regset!(FPS_25),
        regset!(FPS_30),
    ],
    capture_mode: [regset!(CAPTURE_VGA), regset!(CAPTURE_1MP)],

    flash_start: regset!(FLASH_START),
    flash_end: regset!(FLASH_END),
    af_pre_flash_start: regset!(AF_PRE_FLASH_START),
    af_pre_flash_end: regset!(AF_PRE_FLASH_END),
    flash_ae_set: regset!(FLASH_AE_SET),
    flash_ae_clear: regset!(FLASH_AE_CLEAR),
    ae_lock_on: regset!(AE_LOCK_ON),
    ae_lock_off: regset!(AE_LOCK_OFF),
    awb_lock_on: regset!(AWB_LOCK_ON),
    awb_lock_off: regset!(AWB_LOCK_OFF),
    restore_cap: regset!(RESTORE_CAP),
    change_wide_cap: regset!(CHANGE_WIDE_CAP),
    set_lowlight_cap: Some(regset!(SET_LOWLIGHT_CAP)),

    af_macro_mode: regset!(AF_MACRO_MODE),
    af_normal_mode: regset!(AF_NORMAL_MODE),
    af_night_normal_mode: Some(regset!(AF_NIGHT_NORMAL_MODE)),
    af_off: regset!(AF_OFF),
    hd_af_start: regset!(HD_AF_START),
    hd_first_af_start: regset!(HD_FIRST_AF_START),
    single_af_start: regset!(SINGLE_AF_START),

    init: regset!(INIT),
    init_vt: regset!(INIT_VT),

    get_light_level: regset!(GET_LIGHT_LEVEL),
    get_esd_status: regset!(GET_ESD_STATUS),
    get_iso: regset!(GET_ISO),
    get_ae_stable: regset!(GET_AE_STABLE),
    get_shutterspeed: regset!(GET_SHUTTERSPEED),

    preview_mode: regset!(PREVIEW_MODE),
    preview_hd_mode: regset!(PREVIEW_HD_MODE),
    return_preview_mode: regset!(RETURN_PREVIEW_MODE),
    camcorder_on: regset!(CAMCORDER_ON),
    camcorder_off: regset!(CAMCORDER_OFF),
    stream_stop: regset!(STREAM_STOP),
};
