use crate::id::Identification;
use core::fmt::{self, Debug, Display};
use embedded_hal::blocking::spi::Transfer;
use embedded_hal::digital::v2::OutputPin;

/// The error type used by this library.
///
/// This can encapsulate an SPI or GPIO error, and adds its own protocol errors
/// on top of that.
#[non_exhaustive]
pub enum Error<SPI: Transfer<u8>, CS: OutputPin> {
    /// An SPI transfer failed.
    ///
    /// Chip-select has been released again by the time this is returned.
    Spi(SPI::Error),

    /// A GPIO could not be set.
    Gpio(CS::Error),

    /// The chip still reported a write or erase in progress after the whole
    /// status poll budget was used up.
    ///
    /// The driver stays usable; the next operation starts from scratch.
    Timeout,

    /// A geometry override or the poll budget was zero.
    InvalidConfig,

    /// The JEDEC identification does not encode a capacity this driver can
    /// represent, and no size override was given.
    ///
    /// This is also what a missing or unpowered chip usually looks like
    /// (`ff ff ff`).
    UnknownCapacity(Identification),
}

impl<SPI: Transfer<u8>, CS: OutputPin> Debug for Error<SPI, CS>
where
    SPI::Error: Debug,
    CS::Error: Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Spi(spi) => write!(f, "Error::Spi({:?})", spi),
            Error::Gpio(gpio) => write!(f, "Error::Gpio({:?})", gpio),
            Error::Timeout => f.write_str("Error::Timeout"),
            Error::InvalidConfig => f.write_str("Error::InvalidConfig"),
            Error::UnknownCapacity(id) => write!(f, "Error::UnknownCapacity({:?})", id),
        }
    }
}

impl<SPI: Transfer<u8>, CS: OutputPin> Display for Error<SPI, CS>
where
    SPI::Error: Display,
    CS::Error: Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Spi(spi) => write!(f, "SPI error: {}", spi),
            Error::Gpio(gpio) => write!(f, "GPIO error: {}", gpio),
            Error::Timeout => f.write_str("timed out waiting for the chip to become ready"),
            Error::InvalidConfig => f.write_str("invalid flash configuration"),
            Error::UnknownCapacity(id) => {
                write!(f, "cannot derive flash capacity from JEDEC ID {:?}", id)
            }
        }
    }
}
