//! Serial Flash Discoverable Parameters (JESD216).
//!
//! Only the fields needed for block-device use are decoded: the length and
//! location of the first parameter table (the JEDEC basic flash parameter
//! table), and from that table the 4 KiB-class erase size and the supported
//! address width. The layout targeted is the original JESD216 revision, whose
//! basic table is the shortest one still containing those fields.

use crate::command::AddressWidth;

/// Length of the SFDP header plus the first parameter header.
pub const HEADER_LEN: usize = 16;

/// Largest basic table prefix that is ever read.
pub const SCRATCH_LEN: usize = 128;

/// A basic table must be at least this long to contain the erase size byte.
pub const BASIC_TABLE_MIN_LEN: usize = 29;

/// The SFDP header followed by the first parameter header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    bytes: [u8; HEADER_LEN],
}

impl Header {
    pub fn new(bytes: [u8; HEADER_LEN]) -> Self {
        Header { bytes }
    }

    /// Length of the first parameter table in bytes, capped at [`SCRATCH_LEN`].
    pub fn table_len(&self) -> usize {
        (usize::from(self.bytes[11]) * 4).min(SCRATCH_LEN)
    }

    /// SFDP address of the first parameter table.
    pub fn table_pointer(&self) -> u32 {
        u32::from(self.bytes[12]) | u32::from(self.bytes[13]) << 8 | u32::from(self.bytes[14]) << 16
    }

    /// Whether the first parameter table is long enough to be decoded.
    pub fn has_basic_table(&self) -> bool {
        self.table_len() >= BASIC_TABLE_MIN_LEN
    }
}

/// Geometry decoded from the basic flash parameter table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasicParams {
    /// Smallest erase unit in bytes.
    pub sector_size: u32,
    /// Address width to use for data commands.
    pub address_width: AddressWidth,
}

impl BasicParams {
    /// Decodes the basic table.
    ///
    /// Returns `None` if `table` is shorter than [`BASIC_TABLE_MIN_LEN`], or
    /// if the erase size exponent cannot describe a real sector (an erased or
    /// absent table reads back as all `0xFF`).
    pub fn parse(table: &[u8]) -> Option<Self> {
        if table.len() < BASIC_TABLE_MIN_LEN {
            return None;
        }

        let sector_size = 1u32.checked_shl(u32::from(table[28]))?;
        // DWORD 1 bits 18:17: 0 = 3-byte only, 1 = 3- or 4-byte, 2 = 4-byte only
        let address_width = if (table[2] >> 1) & 0x03 != 0 {
            AddressWidth::FourByte
        } else {
            AddressWidth::ThreeByte
        };

        Some(BasicParams {
            sector_size,
            address_width,
        })
    }
}
