//! A simulated 25-series NOR chip for driver tests.
//!
//! The chip decodes every byte clocked while chip-select is asserted and
//! applies program/erase effects when chip-select is released, like the real
//! parts do. Each released transaction is recorded as one frame of MOSI bytes.

use embedded_hal::blocking::spi::{Transfer, Write};
use embedded_hal::digital::v2::OutputPin;
use std::cell::RefCell;
use std::convert::Infallible;
use std::rc::Rc;

pub const PAGE: usize = 256;
pub const SECTOR: usize = 4096;
pub const MEM_LEN: usize = 64 * 1024;

/// Where the basic parameter table lives in the simulated SFDP area.
pub const TABLE_PTR: usize = 0x30;

/// The error returned by a faulted transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusFault;

#[derive(Debug)]
pub struct Chip {
    pub mem: Vec<u8>,
    pub sfdp: Vec<u8>,
    pub id: [u8; 3],
    pub uid: [u8; 8],
    /// Status polls reporting BUSY after each program or erase.
    pub busy_polls: u32,
    /// Report BUSY forever.
    pub stuck_busy: bool,
    /// Fail the next transfer or write.
    pub fault: bool,
    pub status_reads: u32,
    pub frames: Vec<Vec<u8>>,
    pub selected: bool,
    busy_left: u32,
    wel: bool,
    txn: Vec<u8>,
}

fn addr_len(opcode: u8) -> Option<usize> {
    match opcode {
        0x03 | 0x02 | 0x20 | 0x5A => Some(3),
        0x13 | 0x12 | 0x21 => Some(4),
        _ => None,
    }
}

fn be_addr(bytes: &[u8]) -> usize {
    bytes.iter().fold(0, |acc, &b| acc << 8 | usize::from(b))
}

impl Chip {
    /// A blank chip without SFDP: the whole area reads back `0xFF`.
    pub fn new(id: [u8; 3]) -> Self {
        Chip {
            mem: vec![0xFF; MEM_LEN],
            sfdp: Vec::new(),
            id,
            uid: [0xD1, 0x61, 0x1C, 0x02, 0x43, 0x37, 0x28, 0x2A],
            busy_polls: 0,
            stuck_busy: false,
            fault: false,
            status_reads: 0,
            frames: Vec::new(),
            selected: false,
            busy_left: 0,
            wel: false,
            txn: Vec::new(),
        }
    }

    /// Adds an SFDP area whose basic table is `table_dwords` long, with the
    /// given erase size exponent and DWORD 1 byte 2.
    pub fn with_sfdp(mut self, table_dwords: u8, erase_exp: u8, addr_bits: u8) -> Self {
        let table_len = usize::from(table_dwords) * 4;
        let mut sfdp = vec![0u8; TABLE_PTR + table_len.max(29)];
        sfdp[..4].copy_from_slice(b"SFDP");
        sfdp[4] = 0x00;
        sfdp[5] = 0x01;
        sfdp[7] = 0xFF;
        sfdp[10] = 0x01;
        sfdp[11] = table_dwords;
        sfdp[12] = TABLE_PTR as u8;
        let table = &mut sfdp[TABLE_PTR..];
        table[0] = 0xE5;
        table[1] = 0x20;
        table[2] = addr_bits;
        table[28] = erase_exp;
        self.sfdp = sfdp;
        self
    }

    /// Addressed frames with the given opcode, as `(address, data length)`.
    pub fn frames_with(&self, opcode: u8) -> Vec<(u32, usize)> {
        let width = addr_len(opcode).expect("not an addressed opcode");
        self.frames
            .iter()
            .filter(|f| f[0] == opcode)
            .map(|f| (be_addr(&f[1..=width]) as u32, f.len() - 1 - width))
            .collect()
    }

    pub fn opcodes(&self) -> Vec<u8> {
        self.frames.iter().map(|f| f[0]).collect()
    }

    fn status(&mut self) -> u8 {
        self.status_reads += 1;
        let wel = if self.wel { 0x02 } else { 0x00 };
        if self.stuck_busy {
            0x01 | wel
        } else if self.busy_left > 0 {
            self.busy_left -= 1;
            0x01 | wel
        } else {
            wel
        }
    }

    fn clock(&mut self, mosi: u8) -> u8 {
        assert!(self.selected, "bus clocked with chip-select released");
        self.txn.push(mosi);
        let i = self.txn.len() - 1;
        match self.txn[0] {
            0x05 if i == 1 => self.status(),
            0x9F if (1..=3).contains(&i) => self.id[i - 1],
            0x4B if i >= 5 && i < 13 => self.uid[i - 5],
            0x5A if i >= 5 => {
                let addr = be_addr(&self.txn[1..4]) + i - 5;
                self.sfdp.get(addr).copied().unwrap_or(0xFF)
            }
            0x03 if i >= 4 => self.mem[(be_addr(&self.txn[1..4]) + i - 4) % MEM_LEN],
            0x13 if i >= 5 => self.mem[(be_addr(&self.txn[1..5]) + i - 5) % MEM_LEN],
            _ => 0xFF,
        }
    }

    fn select(&mut self) {
        assert!(!self.selected, "chip-select asserted twice");
        self.selected = true;
        self.txn.clear();
    }

    fn deselect(&mut self) {
        if !self.selected {
            return;
        }
        self.selected = false;
        let txn = std::mem::take(&mut self.txn);
        if txn.is_empty() {
            return;
        }

        let op = txn[0];
        match (op, addr_len(op)) {
            (0x06, _) => self.wel = true,
            (0x02, Some(w)) | (0x12, Some(w)) if self.wel && txn.len() > w => {
                let addr = be_addr(&txn[1..=w]);
                let page_base = addr - addr % PAGE;
                for (k, byte) in txn[1 + w..].iter().enumerate() {
                    // The column address wraps within the page.
                    let idx = (page_base + (addr % PAGE + k) % PAGE) % MEM_LEN;
                    self.mem[idx] &= byte;
                }
                self.wel = false;
                self.busy_left = self.busy_polls;
            }
            (0x20, Some(w)) | (0x21, Some(w)) if self.wel && txn.len() > w => {
                let addr = be_addr(&txn[1..=w]) % MEM_LEN;
                let base = addr - addr % SECTOR;
                self.mem[base..base + SECTOR].iter_mut().for_each(|b| *b = 0xFF);
                self.wel = false;
                self.busy_left = self.busy_polls;
            }
            _ => {}
        }
        self.frames.push(txn);
    }
}

#[derive(Debug)]
pub struct Spi(Rc<RefCell<Chip>>);

#[derive(Debug)]
pub struct Cs(Rc<RefCell<Chip>>);

/// Wires `chip` up to a bus and a chip-select pin.
pub fn attach(chip: Chip) -> (Rc<RefCell<Chip>>, Spi, Cs) {
    let chip = Rc::new(RefCell::new(chip));
    (chip.clone(), Spi(chip.clone()), Cs(chip))
}

impl Transfer<u8> for Spi {
    type Error = BusFault;

    fn transfer<'w>(&mut self, words: &'w mut [u8]) -> Result<&'w [u8], BusFault> {
        let mut chip = self.0.borrow_mut();
        if std::mem::take(&mut chip.fault) {
            return Err(BusFault);
        }
        for word in words.iter_mut() {
            *word = chip.clock(*word);
        }
        Ok(words)
    }
}

impl Write<u8> for Spi {
    type Error = BusFault;

    fn write(&mut self, words: &[u8]) -> Result<(), BusFault> {
        let mut chip = self.0.borrow_mut();
        if std::mem::take(&mut chip.fault) {
            return Err(BusFault);
        }
        for &word in words {
            chip.clock(word);
        }
        Ok(())
    }
}

impl OutputPin for Cs {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Infallible> {
        self.0.borrow_mut().select();
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.0.borrow_mut().deselect();
        Ok(())
    }
}
