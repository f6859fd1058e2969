//! An [`embedded-hal`]-based block-device driver for SPI NOR flash chips.
//!
//! The driver identifies the chip through its JEDEC ID, discovers addressing
//! width and erase granularity from the chip's SFDP table (falling back to
//! caller-provided defaults when the table is missing), and exposes a
//! byte-addressable read/program/erase interface suitable for a filesystem
//! layer.
//!
//! Writes are split at page boundaries internally, so callers may program
//! any byte range without knowing the chip's page size.
//!
//! [`embedded-hal`]: https://docs.rs/embedded-hal/

#![doc(html_root_url = "https://docs.rs/spi-nor-bdev/0.1.0")]
#![warn(missing_debug_implementations, rust_2018_idioms)]
#![cfg_attr(not(test), no_std)]

#[macro_use]
mod log;
pub mod command;
mod error;
pub mod id;
pub mod prelude;
pub mod series25;
pub mod sfdp;

#[cfg(test)]
mod mock;

pub use crate::error::Error;

use embedded_hal::blocking::spi::Transfer;
use embedded_hal::digital::v2::OutputPin;

/// A trait for reading operations from a memory chip.
pub trait Read<SPI: Transfer<u8>, CS: OutputPin> {
    /// Reads bytes from a memory chip.
    ///
    /// # Parameters
    /// * `addr`: The address to start reading at.
    /// * `buf`: The buffer to read `buf.len()` bytes into.
    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), Error<SPI, CS>>;
}

/// A trait for writing and erasing operations on a memory chip.
pub trait BlockDevice<SPI: Transfer<u8>, CS: OutputPin> {
    /// Total capacity of the chip in bytes.
    fn size(&self) -> u32;

    /// Size of the smallest erasable unit in bytes.
    fn sector_size(&self) -> u32;

    /// Erases the sector containing `addr`.
    ///
    /// # Parameters
    /// * `addr`: Any address inside the sector. The chip ignores the lower
    ///   bits, so it does not need to be on a sector boundary.
    fn erase(&mut self, addr: u32) -> Result<(), Error<SPI, CS>>;

    /// Writes bytes onto the memory chip. This method is supposed to assume that the sectors
    /// it is writing to have already been erased and should not do any erasing themselves.
    ///
    /// # Parameters
    /// * `addr`: The address to write to.
    /// * `data`: The bytes to write to `addr`.
    fn write_bytes(&mut self, addr: u32, data: &[u8]) -> Result<(), Error<SPI, CS>>;

    /// Erases `amount` consecutive sectors, starting with the one containing `addr`.
    fn erase_sectors(&mut self, addr: u32, amount: usize) -> Result<(), Error<SPI, CS>> {
        let sector = self.sector_size();
        let base = addr - addr % sector;
        for c in 0..amount as u32 {
            self.erase(base.wrapping_add(c.wrapping_mul(sector)))?;
        }
        Ok(())
    }
}
