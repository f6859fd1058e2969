use log::{error, info};

use structopt::StructOpt;

pub use linux_embedded_hal::sysfs_gpio::Direction;
pub use linux_embedded_hal::{spidev, spidev::SpiModeFlags, Pin as Pindev, Spidev};

use simplelog::{LevelFilter, TermLogger, TerminalMode};

use ihex::{Reader, Record};

use spi_nor_bdev::command::AddressWidth;
use spi_nor_bdev::series25::{Config, Flash};
use spi_nor_bdev::{BlockDevice, Read};

type BoxError = Box<dyn std::error::Error + 'static>;

#[derive(Debug, PartialEq, StructOpt)]
struct Options {
    #[structopt(subcommand)]
    operation: Operations,

    /// SPI device
    #[structopt(long, default_value = "/dev/spidev0.0", env = "SPI_DEV")]
    spi_dev: String,

    /// SPI baud rate
    #[structopt(long, default_value = "1000000", env = "SPI_BAUD")]
    spi_baud: u32,

    /// Chip Select (output) pin
    #[structopt(long, default_value = "8", env = "CS_PIN")]
    cs_pin: u64,

    /// Configure log level
    #[structopt(long, default_value = "info", env = "LOG_LEVEL")]
    log_level: LevelFilter,

    /// Flash size in bytes, instead of deriving it from the JEDEC ID
    #[structopt(long)]
    size: Option<u32>,

    /// Program page size in bytes
    #[structopt(long, default_value = "256")]
    page_size: u32,

    /// Sector size in bytes, used if the chip has no SFDP table
    #[structopt(long, default_value = "4096")]
    sector_size: u32,

    /// Use 4-byte addressing if the chip has no SFDP table
    #[structopt(long)]
    addr4b: bool,

    /// Status polls before a write or erase times out
    #[structopt(long, default_value = "100000")]
    poll_budget: u32,
}

#[derive(Debug, PartialEq, StructOpt)]
pub enum Operations {
    /// Read device information
    Info,
    /// Read data from the device
    Read {
        /// Flash address for read start in hex
        #[structopt(parse(try_from_str = parse_hex))]
        address: u32,
        /// Length of flash read in bytes
        #[structopt()]
        length: u32,
    },
    /// Write data to the specified address
    Write {
        /// Flash address for write start in hex
        #[structopt(parse(try_from_str = parse_hex))]
        address: u32,

        // Data to write in hexadecimal
        #[structopt(long)]
        data: HexData,
    },
    /// Erase sector(s) starting at the specified address
    Erase {
        /// Flash address in the first sector to erase, in hex
        #[structopt(parse(try_from_str = parse_hex))]
        address: u32,

        /// Number of sectors to erase
        #[structopt(long, default_value = "1")]
        count: u32,
    },
    /// Dump flash into a hex file
    Dump {
        /// Flash address for read start in hex
        #[structopt(parse(try_from_str = parse_hex))]
        address: u32,

        /// Length of flash read in bytes
        #[structopt()]
        length: u32,

        /// Output ihex file
        #[structopt(long, default_value = "dump.ihex")]
        file: String,
    },
    /// Load flash from a hex file. The target sectors must be erased.
    Load {
        /// Input ihex file
        file: String,
    },
}

#[derive(Debug, PartialEq)]
pub struct HexData(Vec<u8>);

impl std::str::FromStr for HexData {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        hex::decode(s).map(HexData)
    }
}

fn parse_hex(s: &str) -> Result<u32, std::num::ParseIntError> {
    u32::from_str_radix(s.trim_start_matches("0x"), 16)
}

/// Flattens errors that don't implement `std::error::Error`.
fn flash_error<E: std::fmt::Debug>(e: E) -> BoxError {
    format!("{:?}", e).into()
}

impl Options {
    fn config(&self) -> Config {
        let mut config = Config::default()
            .with_page_size(self.page_size)
            .with_sector_size(self.sector_size)
            .with_poll_budget(self.poll_budget)
            .with_address_width(if self.addr4b {
                AddressWidth::FourByte
            } else {
                AddressWidth::ThreeByte
            });
        if let Some(size) = self.size {
            config = config.with_size(size);
        }
        config
    }
}

fn main() -> Result<(), BoxError> {
    // Load options
    let opts = Options::from_args();

    // Setup logging
    TermLogger::init(opts.log_level, simplelog::Config::default(), TerminalMode::Mixed)?;

    // Connect and configure GPIO pin
    let cs_pin = Pindev::new(opts.cs_pin);

    cs_pin.export()?;
    cs_pin.set_direction(Direction::Out)?;

    // Connect and configure SPI device
    let mut spi = Spidev::open(&opts.spi_dev)?;

    let mut spi_config = spidev::SpidevOptions::new();
    spi_config.mode(SpiModeFlags::SPI_MODE_0 | SpiModeFlags::SPI_NO_CS);
    spi_config.max_speed_hz(opts.spi_baud);
    spi.configure(&spi_config)?;

    // Instantiate SPI flash
    let mut flash = match Flash::init_with(spi, cs_pin, opts.config()) {
        Ok(f) => f,
        Err(e) => {
            error!("Error initialising flash: {:?}", e);
            return Ok(());
        }
    };

    // Perform the requested operation
    match &opts.operation {
        Operations::Info => {
            info!("Flash ID: {:?}", flash.identification());
            info!("Geometry: {:?}", flash.geometry());
            match flash.read_unique_id() {
                Ok(uid) => info!("Unique ID: {}", hex::encode(uid)),
                Err(e) => error!("Unique ID read error: {:?}", e),
            }
        }
        Operations::Read { address, length } => {
            info!("Reading {} bytes from address 0x{:08x}", length, address);

            let mut buff = vec![0u8; *length as usize];
            flash.read(*address, &mut buff).map_err(flash_error)?;

            info!("Read: {:02x?}", buff);
        }
        Operations::Write { address, data } => {
            info!("Writing {} bytes to address 0x{:08x}", data.0.len(), address);

            flash.write_bytes(*address, &data.0).map_err(flash_error)?;

            info!("Write complete");
        }
        Operations::Erase { address, count } => {
            info!(
                "Erasing {} sectors of {} bytes at address 0x{:08x}",
                count,
                flash.sector_size(),
                address
            );

            flash.erase_sectors(*address, *count as usize).map_err(flash_error)?;

            info!("Sector erase complete")
        }
        Operations::Dump { address, length, file } => {
            info!("Reading {} bytes from address 0x{:08x} to file {}", length, address, &file);

            let mut buff = vec![0u8; *length as usize];
            flash.read(*address, &mut buff).map_err(flash_error)?;

            let records = ihex_records(*address, &buff);
            let data = ihex::create_object_file_representation(&records).map_err(flash_error)?;

            std::fs::write(file, data)?;

            info!("Dump complete");
        }
        Operations::Load { file } => {
            info!("Loading file {}", file);

            let data = std::fs::read_to_string(&file)?;

            // Offsets are relative to the last extended linear address record.
            let mut base: u32 = 0;
            for record in Reader::new(&data) {
                match record {
                    Ok(Record::Data { offset, value }) => {
                        let address = base + u32::from(offset);
                        info!("Writing {} bytes at address 0x{:08x}", value.len(), address);
                        flash.write_bytes(address, &value).map_err(flash_error)?;
                    }
                    Ok(Record::ExtendedLinearAddress(upper)) => base = u32::from(upper) << 16,
                    Ok(Record::EndOfFile) => (),
                    Err(e) => {
                        error!("Reader error: {:?}", e);
                        return Ok(());
                    }
                    Ok(record) => {
                        error!("Unrecognised record: {:?}", record);
                        return Ok(());
                    }
                }
            }

            info!("Load complete");
        }
    }

    Ok(())
}

/// Splits `data` read from `address` into 32-byte data records, adding
/// extended linear address records whenever the upper 16 bits change.
fn ihex_records(address: u32, data: &[u8]) -> Vec<Record> {
    let mut records = Vec::new();
    let mut upper = None;
    let mut addr = address;
    let mut rest = data;
    while !rest.is_empty() {
        // A record must not cross a 64 KiB boundary.
        let room = 0x1_0000 - (addr & 0xFFFF) as usize;
        let (chunk, tail) = rest.split_at(rest.len().min(32).min(room));

        if upper != Some(addr >> 16) {
            upper = Some(addr >> 16);
            records.push(Record::ExtendedLinearAddress((addr >> 16) as u16));
        }
        records.push(Record::Data {
            offset: addr as u16,
            value: chunk.to_vec(),
        });

        addr += chunk.len() as u32;
        rest = tail;
    }
    records.push(Record::EndOfFile);
    records
}
