//! Convenience re-export of the traits needed to use a flash driver.

pub use crate::BlockDevice as _spi_nor_bdev_BlockDevice;
pub use crate::Read as _spi_nor_bdev_Read;
