//! Command framing for 25-series NOR flash.
//!
//! Every addressed command is one opcode byte followed by a big-endian
//! address of 3 or 4 bytes. Which opcodes are used for reading, programming
//! and erasing depends on the address width, so both are tied together in
//! [`AddressWidth::command_set`].

/// Opcodes that are the same regardless of address width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum Opcode {
    /// Read 8-bit manufacturer ID, memory type and capacity code.
    ReadJedecId = 0x9F,
    /// Set the write enable latch.
    WriteEnable = 0x06,
    /// Read the 8-bit status register.
    ReadStatus = 0x05,
    /// Read the Serial Flash Discoverable Parameters area.
    ReadSfdp = 0x5A,
    /// Read the factory-programmed unique ID.
    ReadUniqueId = 0x4B,
}

/// Number of address bytes sent after an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressWidth {
    /// 24-bit addresses, up to 16 MiB.
    ThreeByte,
    /// 32-bit addresses.
    FourByte,
}

impl AddressWidth {
    /// Number of address bytes in a command frame.
    pub fn bytes(self) -> usize {
        match self {
            AddressWidth::ThreeByte => 3,
            AddressWidth::FourByte => 4,
        }
    }

    /// The opcodes used with this address width.
    pub fn command_set(self) -> &'static CommandSet {
        match self {
            AddressWidth::ThreeByte => &CommandSet::THREE_BYTE,
            AddressWidth::FourByte => &CommandSet::FOUR_BYTE,
        }
    }
}

impl Default for AddressWidth {
    fn default() -> Self {
        AddressWidth::ThreeByte
    }
}

/// Opcodes for the addressed data commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSet {
    /// Normal-speed read.
    pub read: u8,
    /// Page program.
    pub page_program: u8,
    /// 4 KiB sector erase.
    pub sector_erase: u8,
}

impl CommandSet {
    /// Commands taking a 3-byte address.
    pub const THREE_BYTE: CommandSet = CommandSet {
        read: 0x03,
        page_program: 0x02,
        sector_erase: 0x20,
    };

    /// Dedicated 4-byte address commands. These work without switching the
    /// chip into its 4-byte address mode.
    pub const FOUR_BYTE: CommandSet = CommandSet {
        read: 0x13,
        page_program: 0x12,
        sector_erase: 0x21,
    };
}

/// An opcode followed by its address, ready to be clocked out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Frame {
    buf: [u8; 5],
    len: usize,
}

impl Frame {
    pub(crate) fn new(opcode: u8, addr: u32, width: AddressWidth) -> Self {
        let be = addr.to_be_bytes();
        let mut buf = [opcode, 0, 0, 0, 0];
        let len = 1 + width.bytes();
        buf[1..len].copy_from_slice(&be[4 - width.bytes()..]);
        Frame { buf, len }
    }

    pub(crate) fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.buf[..self.len]
    }

    #[cfg(test)]
    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}
