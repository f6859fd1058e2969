//! Driver for 25-series SPI NOR flash chips.

use crate::command::{AddressWidth, CommandSet, Frame, Opcode};
use crate::id::Identification;
use crate::sfdp::{self, BasicParams, Header};
use crate::{BlockDevice, Error, Read};
use bitflags::bitflags;
use embedded_hal::blocking::spi::{Transfer, Write};
use embedded_hal::digital::v2::OutputPin;

bitflags! {
    /// Status register bits.
    pub struct Status: u8 {
        /// Erase or write in progress.
        const BUSY = 1 << 0;
        /// Status of the **W**rite **E**nable **L**atch.
        const WEL = 1 << 1;
        /// The 3 protection region bits.
        const PROT = 0b00011100;
        /// **S**tatus **R**egister **W**rite **D**isable bit.
        const SRWD = 1 << 7;
    }
}

/// Program page size used unless overridden.
pub const DEFAULT_PAGE_SIZE: u32 = 256;

/// Erase unit used when SFDP does not provide one.
pub const DEFAULT_SECTOR_SIZE: u32 = 4096;

/// Status polls before a write or erase is considered timed out.
///
/// One poll takes at least about 5 µs at 120 MHz, so this waits ~500 ms. A
/// sector erase takes about 100 ms worst case, a page program less than 1 ms.
pub const DEFAULT_POLL_BUDGET: u32 = 100_000;

/// Construction parameters for [`Flash`].
///
/// `sector_size` and `address_width` are only used when the chip has no
/// usable SFDP basic parameter table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Chip size in bytes. `None` derives it from the JEDEC ID.
    pub size: Option<u32>,
    pub page_size: u32,
    pub sector_size: u32,
    pub address_width: AddressWidth,
    /// Number of status polls after a program or erase before giving up.
    pub poll_budget: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            size: None,
            page_size: DEFAULT_PAGE_SIZE,
            sector_size: DEFAULT_SECTOR_SIZE,
            address_width: AddressWidth::ThreeByte,
            poll_budget: DEFAULT_POLL_BUDGET,
        }
    }
}

impl Config {
    pub fn with_size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_sector_size(mut self, sector_size: u32) -> Self {
        self.sector_size = sector_size;
        self
    }

    pub fn with_address_width(mut self, address_width: AddressWidth) -> Self {
        self.address_width = address_width;
        self
    }

    pub fn with_poll_budget(mut self, poll_budget: u32) -> Self {
        self.poll_budget = poll_budget;
        self
    }

    fn is_valid(&self) -> bool {
        self.page_size > 0 && self.sector_size > 0 && self.poll_budget > 0 && self.size != Some(0)
    }
}

/// Where the erase size and address width of a [`Geometry`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometrySource {
    /// Decoded from the chip's SFDP basic parameter table.
    Sfdp,
    /// No usable SFDP table; taken from the [`Config`].
    Fallback,
}

/// Layout of a flash chip, fixed once the driver is initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// Total capacity in bytes.
    pub capacity: u32,
    /// Bytes that can be programmed with a single page program command.
    pub page_size: u32,
    /// Smallest erasable unit in bytes.
    pub sector_size: u32,
    pub address_width: AddressWidth,
    pub source: GeometrySource,
}

/// Driver for 25-series SPI NOR flash chips.
///
/// # Type Parameters
///
/// * **`SPI`**: The SPI master to which the flash chip is attached.
/// * **`CS`**: The **C**hip-**S**elect line attached to the `\CS`/`\CE` pin of
///   the flash chip.
#[derive(Debug)]
pub struct Flash<SPI: Transfer<u8>, CS: OutputPin> {
    spi: SPI,
    cs: CS,
    id: Identification,
    geometry: Geometry,
    poll_budget: u32,
}

impl<SPI, CS> Flash<SPI, CS>
where
    SPI: Transfer<u8> + Write<u8, Error = <SPI as Transfer<u8>>::Error>,
    CS: OutputPin,
{
    /// Creates a new 25-series flash driver with the default [`Config`].
    ///
    /// # Parameters
    ///
    /// * **`spi`**: An SPI master. Must be configured to operate in the correct
    ///   mode for the device.
    /// * **`cs`**: The **C**hip-**S**elect Pin connected to the `\CS`/`\CE` pin
    ///   of the flash chip. Will be driven low when accessing the device.
    pub fn init(spi: SPI, cs: CS) -> Result<Self, Error<SPI, CS>> {
        Self::init_with(spi, cs, Config::default())
    }

    /// Creates a new 25-series flash driver and probes the chip's geometry.
    ///
    /// The chip is polled until ready, then identified through its JEDEC ID
    /// (unless `config.size` is set, the capacity comes from there) and its
    /// SFDP table. A missing or short SFDP table is not an error: the sector
    /// size and address width from `config` are used instead.
    pub fn init_with(spi: SPI, cs: CS, config: Config) -> Result<Self, Error<SPI, CS>> {
        if !config.is_valid() {
            return Err(Error::InvalidConfig);
        }

        let mut this = Self {
            spi,
            cs,
            id: Identification::from_jedec_id([0; 3]),
            geometry: Geometry {
                capacity: config.size.unwrap_or(0),
                page_size: config.page_size,
                sector_size: config.sector_size,
                address_width: config.address_width,
                source: GeometrySource::Fallback,
            },
            poll_budget: config.poll_budget,
        };
        this.cs.set_high().map_err(Error::Gpio)?;

        // A previous user may have left an erase running.
        this.wait_done()?;

        this.id = this.read_jedec_id()?;
        this.geometry.capacity = match config.size {
            Some(size) => size,
            None => this.id.capacity().ok_or(Error::UnknownCapacity(this.id))?,
        };

        match this.probe_sfdp()? {
            Some(params) => {
                this.geometry.sector_size = params.sector_size;
                this.geometry.address_width = params.address_width;
                this.geometry.source = GeometrySource::Sfdp;
            }
            None => warn!(
                "Flash::init: no usable SFDP basic table, using {} byte sectors and {:?} addressing",
                config.sector_size, config.address_width
            ),
        }

        info!("Flash::init: {:?}, {:?}", this.id, this.geometry);
        Ok(this)
    }

    /// Reads the SFDP header and, if it is long enough, the basic table.
    fn probe_sfdp(&mut self) -> Result<Option<BasicParams>, Error<SPI, CS>> {
        let mut header = [0; sfdp::HEADER_LEN];
        self.read_sfdp(0, &mut header)?;
        let header = Header::new(header);
        if !header.has_basic_table() {
            debug!("SFDP: basic table too short ({} bytes)", header.table_len());
            return Ok(None);
        }

        let mut scratch = [0; sfdp::SCRATCH_LEN];
        let table = &mut scratch[..header.table_len()];
        self.read_sfdp(header.table_pointer(), table)?;
        Ok(BasicParams::parse(table))
    }

    /// Runs one chip-select framed transaction: `frame`, then the data phase.
    fn transaction<F>(&mut self, frame: &mut [u8], data: F) -> Result<(), Error<SPI, CS>>
    where
        F: FnOnce(&mut SPI) -> Result<(), <SPI as Transfer<u8>>::Error>,
    {
        // If the SPI transfer fails, make sure to disable CS anyways
        self.cs.set_low().map_err(Error::Gpio)?;
        let spi_result = match self.spi.transfer(frame) {
            Ok(_) => data(&mut self.spi),
            Err(e) => Err(e),
        };
        self.cs.set_high().map_err(Error::Gpio)?;
        spi_result.map_err(Error::Spi)
    }

    fn command(&mut self, bytes: &mut [u8]) -> Result<(), Error<SPI, CS>> {
        self.transaction(bytes, |_| Ok(()))
    }

    /// Reads the JEDEC manufacturer/device identification.
    pub fn read_jedec_id(&mut self) -> Result<Identification, Error<SPI, CS>> {
        let mut buf = [Opcode::ReadJedecId as u8, 0, 0, 0];
        self.command(&mut buf)?;

        // Skip buf[0] (SPI read response byte)
        Ok(Identification::from_jedec_id([buf[1], buf[2], buf[3]]))
    }

    /// Reads the 64-bit factory-programmed unique ID.
    pub fn read_unique_id(&mut self) -> Result<[u8; 8], Error<SPI, CS>> {
        // Opcode followed by 4 dummy bytes
        let mut cmd_buf = [Opcode::ReadUniqueId as u8, 0, 0, 0, 0];
        let mut uid = [0; 8];
        self.transaction(&mut cmd_buf, |spi| spi.transfer(&mut uid).map(|_| ()))?;
        Ok(uid)
    }

    /// Reads `buf.len()` bytes of the SFDP area starting at `addr`.
    ///
    /// SFDP is always addressed with 3 bytes, followed by 8 dummy clocks.
    pub fn read_sfdp(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), Error<SPI, CS>> {
        let mut frame = Frame::new(Opcode::ReadSfdp as u8, addr, AddressWidth::ThreeByte);
        self.transaction(frame.as_bytes_mut(), |spi| {
            spi.transfer(&mut [0])?;
            spi.transfer(buf).map(|_| ())
        })
    }

    /// Reads the status register.
    pub fn read_status(&mut self) -> Result<Status, Error<SPI, CS>> {
        let mut buf = [Opcode::ReadStatus as u8, 0];
        self.command(&mut buf)?;

        Ok(Status::from_bits_truncate(buf[1]))
    }

    fn write_enable(&mut self) -> Result<(), Error<SPI, CS>> {
        let mut cmd_buf = [Opcode::WriteEnable as u8];
        self.command(&mut cmd_buf)?;
        Ok(())
    }

    /// Polls the status register until BUSY clears, at most `poll_budget` times.
    fn wait_done(&mut self) -> Result<(), Error<SPI, CS>> {
        for _ in 0..self.poll_budget {
            if !self.read_status()?.contains(Status::BUSY) {
                return Ok(());
            }
        }

        warn!("Flash: still busy after {} status polls", self.poll_budget);
        Err(Error::Timeout)
    }

    /// The JEDEC identification read during initialization.
    pub fn identification(&self) -> Identification {
        self.id
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn page_size(&self) -> u32 {
        self.geometry.page_size
    }

    pub fn address_width(&self) -> AddressWidth {
        self.geometry.address_width
    }

    /// Opcodes used for reading, programming and erasing. Determined by the
    /// address width.
    pub fn command_set(&self) -> &'static CommandSet {
        self.geometry.address_width.command_set()
    }

    /// Returns the SPI and chip select objects so they can be used elsewhere.
    pub fn release(self) -> (SPI, CS) {
        (self.spi, self.cs)
    }

    fn frame(&self, opcode: u8, addr: u32) -> Frame {
        Frame::new(opcode, addr, self.geometry.address_width)
    }
}

impl<SPI, CS> Read<SPI, CS> for Flash<SPI, CS>
where
    SPI: Transfer<u8> + Write<u8, Error = <SPI as Transfer<u8>>::Error>,
    CS: OutputPin,
{
    /// Reads flash contents into `buf`, starting at `addr`.
    ///
    /// Note that `addr` is not fully decoded: Flash chips will typically only
    /// look at the lowest `N` bits needed to encode their size, which means
    /// that the contents are "mirrored" to addresses that are a multiple of the
    /// flash size.
    ///
    /// # Parameters
    ///
    /// * `addr`: Address to start reading at. Needs no alignment.
    /// * `buf`: Destination buffer to fill. Nothing is sent if it is empty.
    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), Error<SPI, CS>> {
        if buf.is_empty() {
            return Ok(());
        }

        let mut frame = self.frame(self.command_set().read, addr);
        self.transaction(frame.as_bytes_mut(), |spi| spi.transfer(buf).map(|_| ()))
    }
}

impl<SPI, CS> BlockDevice<SPI, CS> for Flash<SPI, CS>
where
    SPI: Transfer<u8> + Write<u8, Error = <SPI as Transfer<u8>>::Error>,
    CS: OutputPin,
{
    fn size(&self) -> u32 {
        self.geometry.capacity
    }

    fn sector_size(&self) -> u32 {
        self.geometry.sector_size
    }

    fn erase(&mut self, addr: u32) -> Result<(), Error<SPI, CS>> {
        self.write_enable()?;
        let mut frame = self.frame(self.command_set().sector_erase, addr);
        self.command(frame.as_bytes_mut())?;
        self.wait_done()
    }

    /// Programs `data` starting at `addr`.
    ///
    /// The chip wraps around within a page instead of advancing to the next
    /// one, so every page program is cut at the next page boundary.
    fn write_bytes(&mut self, addr: u32, data: &[u8]) -> Result<(), Error<SPI, CS>> {
        let page_size = self.geometry.page_size;
        let mut addr = addr;
        let mut rest = data;
        while !rest.is_empty() {
            let room = (page_size - addr % page_size) as usize;
            let (chunk, tail) = rest.split_at(room.min(rest.len()));

            self.write_enable()?;
            let mut frame = self.frame(self.command_set().page_program, addr);
            self.transaction(frame.as_bytes_mut(), |spi| spi.write(chunk))?;
            self.wait_done()?;

            addr = addr.wrapping_add(chunk.len() as u32);
            rest = tail;
        }
        Ok(())
    }
}
