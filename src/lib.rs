// src/lib.rs

//! Control core for the DB8131A 3MP camera sensor (Samsung LSI, firmware
//! EVT1.1).
//!
//! The crate models the sensor side of a camera stack: compiled-in
//! register tables, the run-mode state machine, control dispatch and the
//! background autofocus engine. The host video framework and the physical
//! I2C bus stay behind the [`SensorBus`]/[`CamClock`] traits, so the same
//! core drives real hardware and scripted test buses.
//!
//! ```no_run
//! use db8131a::{Db8131a, PlatformData, StdClock, StreamCmd};
//! # struct Bus;
//! # impl db8131a::SensorBus for Bus {
//! #     type Error = ();
//! #     fn write_reg(&mut self, _: u8, _: u8) -> Result<(), ()> { Ok(()) }
//! #     fn write_burst(&mut self, _: &[(u8, u8)]) -> Result<(), ()> { Ok(()) }
//! #     fn read_reg(&mut self, _: u8) -> Result<u8, ()> { Ok(0) }
//! # }
//! # fn demo(bus: Bus) -> Result<(), db8131a::Db8131aError<()>> {
//! let sensor = Db8131a::bind(bus, StdClock, PlatformData::default())?;
//! sensor.init()?;
//! sensor.s_stream(StreamCmd::Start)?;
//! # Ok(())
//! # }
//! ```

pub mod common;
pub mod driver;
pub mod platform;
pub mod regs;

// Re-export the surface a host integration needs.
pub use common::error::Db8131aError;
pub use common::flags::{AfStatus, DebugMask};
pub use common::hal_traits::{CamClock, SensorBus, StdClock};
pub use common::types::{
    FormatMode, FpsIndex, PixFormat, PixelFormat, Runmode, StreamCmd,
};
pub use driver::controls::{CtrlDesc, CtrlId};
pub use driver::{Caller, Db8131a};
pub use platform::{Capabilities, PlatformData, PowerHook};
pub use regs::{RegBank, RegTable};

#[cfg(feature = "impl-hal")]
pub use common::hal_traits::HalI2cBus;
