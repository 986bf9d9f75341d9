// src/common/hal_traits.rs

use core::fmt::Debug;
use core::time::Duration;

/// Abstraction over the sensor's register bus (I2C, write-acknowledged,
/// no read-back verification beyond explicit status-register reads).
///
/// The driver issues whole tables through `write_burst` where the
/// hardware path supports it and falls back to per-pair `write_reg`
/// otherwise; implementations only need to move bytes.
pub trait SensorBus {
    /// Associated error type for bus transfer failures.
    type Error: Debug;

    /// Writes a single (register, value) pair in one transaction.
    fn write_reg(&mut self, addr: u8, value: u8) -> Result<(), Self::Error>;

    /// Writes a run of (register, value) pairs as one bus transaction.
    ///
    /// Delay markers are stripped by the driver before this is called; the
    /// slice only ever carries real register pairs.
    fn write_burst(&mut self, regs: &[(u8, u8)]) -> Result<(), Self::Error>;

    /// Reads back a single status register.
    fn read_reg(&mut self, addr: u8) -> Result<u8, Self::Error>;
}

/// Time source for delays, poll cadences and window-stability bookkeeping.
///
/// Kept behind a trait so tests can drive the AF search and the stream-off
/// watchdog with a virtual clock instead of sleeping through 220 polls.
pub trait CamClock {
    /// Opaque monotonic timestamp.
    type Instant: Copy + Debug + Send;

    fn now(&self) -> Self::Instant;

    /// Blocks the calling thread for at least `ms` milliseconds.
    fn delay_ms(&self, ms: u32);

    fn elapsed_since(&self, earlier: Self::Instant) -> Duration;
}

/// Wall-clock implementation used on real hardware.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdClock;

impl CamClock for StdClock {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn delay_ms(&self, ms: u32) {
        std::thread::sleep(Duration::from_millis(u64::from(ms)));
    }

    fn elapsed_since(&self, earlier: Self::Instant) -> Duration {
        earlier.elapsed()
    }
}

/// `SensorBus` over any embedded-hal 1.0 I2C peripheral.
///
/// Burst writes are flattened into a single I2C write transaction, split
/// into chunks when a table exceeds the internal buffer.
#[cfg(feature = "impl-hal")]
pub struct HalI2cBus<I2C> {
    i2c: I2C,
    address: u8,
}

#[cfg(feature = "impl-hal")]
impl<I2C> HalI2cBus<I2C> {
    /// Seven-bit peripheral address of the sensor (0x45 on reference
    /// boards).
    pub fn new(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    /// Recovers the wrapped peripheral.
    pub fn release(self) -> I2C {
        self.i2c
    }
}

#[cfg(feature = "impl-hal")]
impl<I2C> SensorBus for HalI2cBus<I2C>
where
    I2C: embedded_hal::i2c::I2c,
{
    type Error = I2C::Error;

    fn write_reg(&mut self, addr: u8, value: u8) -> Result<(), Self::Error> {
        self.i2c.write(self.address, &[addr, value])
    }

    fn write_burst(&mut self, regs: &[(u8, u8)]) -> Result<(), Self::Error> {
        const CHUNK_PAIRS: usize = 64;
        for chunk in regs.chunks(CHUNK_PAIRS) {
            let mut payload = arrayvec::ArrayVec::<u8, { CHUNK_PAIRS * 2 }>::new();
            for &(addr, value) in chunk {
                payload.push(addr);
                payload.push(value);
            }
            self.i2c.write(self.address, &payload)?;
        }
        Ok(())
    }

    fn read_reg(&mut self, addr: u8) -> Result<u8, Self::Error> {
        let mut out = [0u8; 1];
        self.i2c.write_read(self.address, &[addr], &mut out)?;
        Ok(out[0])
    }
}
