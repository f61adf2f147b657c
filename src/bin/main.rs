use std::path::PathBuf;
use std::process::ExitCode;

use clap::{
    Parser,
    Subcommand,
};
use k210_flash::config::{
    BACKUP_CONFIG_ADDRESS,
    MAIN_CONFIG_ADDRESS,
};
use k210_flash::logger::StderrLogger;
use k210_flash::region::{
    crc32_region,
    hash_region,
};
use k210_flash::{
    analyze,
    validate_sector,
    AppSector,
    ConfigSector,
    DumpFile,
    FileSystem,
    Geometry,
    Profile,
    FLASH_SIZE,
};

#[derive(Parser)]
#[command(name = "k210-flash")]
#[command(about = "K210 SPI flash layout parser and validator", long_about = None)]
struct Cli {
    /// Config entry ranges to validate against
    #[arg(short, long, global = true, value_enum, default_value_t = Profile::Kboot)]
    profile: Profile,

    /// More output on stderr, repeat for more
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check every region of a 16 MiB flash dump
    Analyze {
        /// Flash dump file path
        dump: PathBuf,
    },
    /// Parse the config sector
    Config {
        /// Flash dump file path
        dump: PathBuf,

        /// Parse the backup config at 0x5000 instead of the main one
        #[arg(long)]
        backup: bool,
    },
    /// Validate the sector at one of the fixed bootloader or firmware addresses
    Sector {
        /// Flash dump file path
        dump: PathBuf,

        #[arg(value_parser = parse_number)]
        address: u32,
    },
    /// Walk an application image at any address in the app range
    App {
        /// Flash dump file path
        dump: PathBuf,

        #[arg(value_parser = parse_number)]
        address: u32,
    },
    /// Reconstruct the objects of the filing system
    Spiffs {
        /// Flash dump file path
        dump: PathBuf,
    },
    /// sha256 of a range
    Hash {
        /// Flash dump file path
        dump: PathBuf,

        #[arg(short, long, default_value = "0", value_parser = parse_number)]
        begin: u32,

        /// Bytes to hash, defaults to the rest of the flash
        #[arg(short, long, value_parser = parse_number)]
        length: Option<u32>,
    },
    /// CRC32 of a range
    Crc32 {
        /// Flash dump file path
        dump: PathBuf,

        #[arg(short, long, default_value = "0", value_parser = parse_number)]
        begin: u32,

        /// Bytes to checksum, defaults to the rest of the flash
        #[arg(short, long, value_parser = parse_number)]
        length: Option<u32>,
    },
}

fn parse_number(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| e.to_string())
    } else {
        s.parse::<u32>().map_err(|e| e.to_string())
    }
}

fn status(valid: bool) -> ExitCode {
    if valid {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    StderrLogger::new(StderrLogger::level_for_verbosity(cli.verbose)).init()?;

    match cli.command {
        Commands::Analyze { dump } => {
            let mut flash = DumpFile::open(&dump)?;
            let report = analyze(&mut flash, cli.profile)?;
            println!("{report}");
            Ok(status(report.is_valid()))
        }
        Commands::Config { dump, backup } => {
            let address = if backup {
                BACKUP_CONFIG_ADDRESS
            } else {
                MAIN_CONFIG_ADDRESS
            };
            let mut flash = DumpFile::open(&dump)?;
            let config = ConfigSector::read(&mut flash, address, cli.profile)?;
            println!("config sector at 0x{address:x}:\n{config}");
            Ok(ExitCode::SUCCESS)
        }
        Commands::Sector { dump, address } => {
            let mut flash = DumpFile::open(&dump)?;
            let check = validate_sector(&mut flash, address)?;
            match &check.mismatch {
                None => println!(
                    "SPI flash from 0x{address:x} to 0x{:x}-1 is valid.",
                    address + check.bytes_read
                ),
                Some(mismatch) => println!("SPI flash at 0x{address:x} is INVALID: {mismatch}"),
            }
            if let Some(app) = &check.app {
                println!("payload sha256: {}", hex::encode(app.payload_sha256));
            }
            Ok(status(check.is_valid()))
        }
        Commands::App { dump, address } => {
            let mut flash = DumpFile::open(&dump)?;
            let app = AppSector::validate(&mut flash, address, cli.profile)?;
            println!("address: 0x{:x}, block size: 0x{:x}", app.address, app.block_size);
            println!("app size: {0} 0x{0:x}", app.declared_size);
            println!("sector size: {0} 0x{0:x}", app.total_size);
            println!("payload sha256: {}", hex::encode(app.payload_sha256));
            println!("payload crc32: {:08x}", app.payload_crc32);
            if let Some(mismatch) = &app.mismatch {
                println!("INVALID: {mismatch}");
            }
            Ok(status(app.is_valid()))
        }
        Commands::Spiffs { dump } => {
            let mut flash = DumpFile::open(&dump)?;
            let fs = FileSystem::scan(&mut flash, &Geometry::default())?;
            println!("{fs}");
            Ok(ExitCode::SUCCESS)
        }
        Commands::Hash {
            dump,
            begin,
            length,
        } => {
            let length = length.unwrap_or(FLASH_SIZE.saturating_sub(begin));
            let mut flash = DumpFile::open(&dump)?;
            let sha256 = hash_region(&mut flash, begin, length)?;
            println!(
                "sha256 hash of SPI flash from 0x{begin:x} to 0x{:x}-1 is:\n{}",
                begin.saturating_add(length),
                hex::encode(sha256)
            );
            Ok(ExitCode::SUCCESS)
        }
        Commands::Crc32 {
            dump,
            begin,
            length,
        } => {
            let length = length.unwrap_or(FLASH_SIZE.saturating_sub(begin));
            let mut flash = DumpFile::open(&dump)?;
            let crc = crc32_region(&mut flash, begin, length)?;
            println!(
                "crc32 of SPI flash from 0x{begin:x} to 0x{:x}-1 is: {crc:08x}",
                begin.saturating_add(length)
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}
