//! JEDEC identification.

use core::fmt;

/// Chips whose JEDEC capacity code is not log2 of their size in bytes.
///
/// Entries are `(memory type, capacity code, size in bytes)`.
const IRREGULAR_CAPACITIES: &[(u8, u8, u32)] = &[
    // Adesto AT25SF041
    (0x84, 0x01, 512 * 1024),
    // Atmel / Renesas AT25DF081
    (0x1F, 0x01, 1024 * 1024),
];

/// 3-Byte JEDEC manufacturer and device identification.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Identification {
    /// `[manufacturer, memory type, capacity code]`
    bytes: [u8; 3],
}

impl Identification {
    /// Build an Identification from the 3 bytes returned by the `0x9F` command.
    pub fn from_jedec_id(bytes: [u8; 3]) -> Identification {
        Self { bytes }
    }

    /// The JEDEC manufacturer code for this chip.
    pub fn mfr_code(&self) -> u8 {
        self.bytes[0]
    }

    /// The manufacturer-specific memory type.
    pub fn memory_type(&self) -> u8 {
        self.bytes[1]
    }

    /// The capacity code. For most chips this is log2 of the size in bytes.
    pub fn capacity_code(&self) -> u8 {
        self.bytes[2]
    }

    /// The manufacturer-specific device ID for this chip.
    pub fn device_id(&self) -> &[u8] {
        self.bytes[1..].as_ref()
    }

    /// Chip capacity in bytes, as far as the ID tells.
    ///
    /// Returns `None` when the capacity code does not fit a `u32`, which also
    /// covers a floating bus reading back `ff ff ff`.
    pub fn capacity(&self) -> Option<u32> {
        IRREGULAR_CAPACITIES
            .iter()
            .find(|(ty, code, _)| *ty == self.memory_type() && *code == self.capacity_code())
            .map(|&(_, _, size)| size)
            .or_else(|| 1u32.checked_shl(u32::from(self.capacity_code())))
    }
}

impl fmt::Debug for Identification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Identification")
            .field(&format_args!(
                "[{:02x}, {:02x}, {:02x}]",
                self.bytes[0], self.bytes[1], self.bytes[2]
            ))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_jedec_id() {
        let ident = Identification::from_jedec_id([0xEF, 0x40, 0x18]);
        assert_eq!(0xEF, ident.mfr_code());
        assert_eq!(0x40, ident.memory_type());
        assert_eq!(0x18, ident.capacity_code());
        assert_eq!(ident.device_id(), &[0x40, 0x18]);
    }

    #[test]
    fn capacity_is_power_of_two() {
        // W25Q128JV
        let ident = Identification::from_jedec_id([0xEF, 0x40, 0x18]);
        assert_eq!(ident.capacity(), Some(16 * 1024 * 1024));
        // W25Q80DV
        let ident = Identification::from_jedec_id([0xEF, 0x40, 0x14]);
        assert_eq!(ident.capacity(), Some(1024 * 1024));
    }

    #[test]
    fn capacity_of_irregular_parts() {
        let adesto = Identification::from_jedec_id([0x1F, 0x84, 0x01]);
        assert_eq!(adesto.capacity(), Some(512 * 1024));

        let atmel = Identification::from_jedec_id([0x1F, 0x1F, 0x01]);
        assert_eq!(atmel.capacity(), Some(1024 * 1024));

        // Same capacity code, but not listed: plain power of two.
        let other = Identification::from_jedec_id([0x1F, 0x45, 0x01]);
        assert_eq!(other.capacity(), Some(2));
    }

    #[test]
    fn capacity_out_of_range() {
        assert_eq!(Identification::from_jedec_id([0xEF, 0x40, 0x20]).capacity(), None);
        assert_eq!(Identification::from_jedec_id([0xFF, 0xFF, 0xFF]).capacity(), None);
        assert_eq!(
            Identification::from_jedec_id([0xEF, 0x40, 0x1F]).capacity(),
            Some(1 << 31)
        );
    }

    #[test]
    fn debug_is_hex() {
        let ident = Identification::from_jedec_id([0xEF, 0x40, 0x18]);
        assert_eq!(format!("{:?}", ident), "Identification([ef, 40, 18])");
    }
}
