mod logger;

use clap::{Parser, Subcommand};
use hal::storage::FileFlash;
use hal::{
    build_inventory, DeviceConfig, Inventory, Layout, OtaConfig, OtaSession, UpdateComplete,
    ValidationRecord, DEFAULT_PLATFORM_ID,
};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "host-demo", about = "Inspect and update a flash image file.")]
struct Args {
    /// Increase log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Partition preset of the device
    #[arg(long, default_value = "modular", value_parser = parse_layout, global = true)]
    layout: Layout,

    /// Platform id the device reports
    #[arg(long, default_value_t = DEFAULT_PLATFORM_ID, global = true)]
    platform_id: u16,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate every partition of a flash image and print the results
    Inventory {
        /// Flash image file; addresses map to file offsets
        image: PathBuf,
    },
    /// Stream a payload into the OTA window of a flash image
    Flash {
        /// Flash image file; created if missing
        image: PathBuf,
        /// Payload to transfer
        payload: PathBuf,
        /// Target address; defaults to the start of the OTA window
        #[arg(long, value_parser = parse_address)]
        address: Option<u32>,
    },
    /// Print the OTA window and transfer hints
    Window,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    logger::StderrLogger::init(logger::level_for(args.verbose))
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

    let config = DeviceConfig::new(args.layout, args.platform_id, OtaConfig::default());

    match &args.command {
        Command::Inventory { image } => {
            let inventory = run_inventory(image, &config)?;
            println!(
                "platform={} layout={} modules={}",
                inventory.platform_id(),
                config.layout,
                inventory.records().len()
            );
            for record in inventory.records() {
                println!("{}", describe(record));
            }
        }
        Command::Flash {
            image,
            payload,
            address,
        } => {
            let data = fs::read(payload)?;
            let (outcome, written) = run_flash(image, &data, &config.ota, *address)?;
            let marker = if outcome == UpdateComplete::Error { "❌" } else { "✅" };
            println!("{marker} transfer finished: {written} bytes, {outcome}");
        }
        Command::Window => {
            let window = config.ota.window;
            println!(
                "address={:#x} length={:#x} chunk_size={} timeout={}",
                window.address, window.length, config.ota.chunk_size, config.ota.session_timeout
            );
        }
    }

    Ok(())
}

fn run_inventory(image: &Path, config: &DeviceConfig) -> Result<Inventory, Box<dyn std::error::Error>> {
    let capacity = usize::try_from(fs::metadata(image)?.len())?;
    let flash = FileFlash::new(image.to_path_buf(), capacity).map_err(to_io_error)?;
    Ok(build_inventory(config.partition_table(), &flash, config.platform_id))
}

/// Runs one OTA session over `data` and returns the outcome and bytes written.
fn run_flash(
    image: &Path,
    data: &[u8],
    ota: &OtaConfig,
    address: Option<u32>,
) -> Result<(UpdateComplete, usize), Box<dyn std::error::Error>> {
    let start = address.unwrap_or(ota.window.address);
    let length = u32::try_from(data.len())?;
    let end = u64::from(start) + u64::from(length);
    let window_end = u64::from(ota.window.address) + u64::from(ota.window.length);
    if start < ota.window.address || end > window_end {
        return Err(format!(
            "payload {start:#x}+{length:#x} does not fit the OTA window {:#x}+{:#x}",
            ota.window.address, ota.window.length
        )
        .into());
    }

    let existing = fs::metadata(image).map(|m| m.len()).unwrap_or(0);
    let capacity = usize::try_from(existing.max(window_end))?;
    let flash = FileFlash::new(image.to_path_buf(), capacity).map_err(to_io_error)?;

    let mut session = OtaSession::new(flash, *ota);
    session.begin(start, length);

    let chunk = usize::from(session.chunk_size().max(1));
    let mut written = 0;
    for piece in data.chunks(chunk) {
        let at = start + written as u32;
        written += session.write(piece, at, piece.len()).map_err(to_io_error)?;
    }
    Ok((session.end(), written))
}

fn describe(record: &ValidationRecord) -> String {
    let bounds = &record.bounds;
    let mut line = format!(
        "{:?}/{} {:?} {:#x}..{:#x}",
        bounds.function, bounds.index, bounds.store, bounds.start_address, bounds.end_address
    );
    match record.header() {
        Some(header) => {
            line.push_str(&format!(
                " version={} platform={}",
                header.module_version, header.platform_id
            ));
            if let Some(suffix) = record.suffix() {
                line.push_str(&format!(" sha256={}", hex::encode(suffix.sha256)));
            }
        }
        None => line.push_str(" empty"),
    }
    if record.is_valid() {
        line.push_str(" valid");
    } else {
        let reasons: Vec<String> = record.failures().map(|e| e.to_string()).collect();
        line.push_str(&format!(" invalid ({})", reasons.join(", ")));
    }
    line
}

fn parse_layout(s: &str) -> Result<Layout, String> {
    s.parse()
        .map_err(|_| format!("unknown layout `{s}` (expected modular or monolithic)"))
}

fn parse_address(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|_| format!("invalid address `{s}`"))
}

fn to_io_error(err: hal::Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("flash error: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hal::image::ModuleImage;
    use hal::ModuleFunction;
    use std::io::Write;

    const IMAGE_LEN: usize = 0x40000;

    fn place(buf: &mut [u8], image: &ModuleImage) {
        let blob = image.encode().unwrap();
        let at = image.start_address() as usize;
        buf[at..at + blob.len()].copy_from_slice(&blob);
    }

    #[test]
    fn inventory_reports_flashed_modules() {
        let mut bytes = vec![0xFFu8; IMAGE_LEN];
        place(
            &mut bytes,
            &ModuleImage::new(ModuleFunction::Bootloader, 0, 3, DEFAULT_PLATFORM_ID, 0x3C000).body(vec![1; 64]),
        );
        place(
            &mut bytes,
            &ModuleImage::new(ModuleFunction::SystemPart, 1, 5, DEFAULT_PLATFORM_ID, 0x18000)
                .body(vec![2; 256])
                .dependency(ModuleFunction::Bootloader, 0, 2),
        );
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&bytes).unwrap();

        let config = DeviceConfig::default();
        let inventory = run_inventory(file.path(), &config).unwrap();
        let records = inventory.records();
        assert_eq!(records.len(), 4);
        assert!(records[0].is_valid());
        assert!(records[1].is_valid());
        assert!(describe(&records[1]).contains("version=5"));
        // The factory slot lies past the end of this image.
        assert!(!records[3].is_valid());
        assert!(describe(&records[3]).contains("invalid"));
    }

    #[test]
    fn inventory_flags_foreign_platform() {
        let mut bytes = vec![0xFFu8; IMAGE_LEN];
        place(
            &mut bytes,
            &ModuleImage::new(ModuleFunction::Bootloader, 0, 1, 7, 0x3C000),
        );
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&bytes).unwrap();

        let inventory = run_inventory(file.path(), &DeviceConfig::default()).unwrap();
        let boot = &inventory.records()[0];
        assert!(!boot.is_valid());
        assert_eq!(
            boot.failures().collect::<Vec<_>>(),
            vec![hal::Error::PlatformMismatch]
        );
    }

    #[test]
    fn flash_streams_payload_into_window() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("flash.bin");
        let payload: Vec<u8> = (0..1500u32).map(|i| (i % 251) as u8).collect();
        let ota = OtaConfig::default();

        let (outcome, written) = run_flash(&image, &payload, &ota, None).unwrap();
        assert_eq!(outcome, UpdateComplete::AppliedPendingRestart);
        assert_eq!(written, payload.len());

        let bytes = fs::read(&image).unwrap();
        let at = ota.window.address as usize;
        assert_eq!(&bytes[at..at + payload.len()], &payload[..]);
        assert_eq!(bytes.len(), at + ota.window.length as usize);
    }

    #[test]
    fn flash_refuses_payload_outside_window() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("flash.bin");
        let ota = OtaConfig::default();

        assert!(run_flash(&image, &[0; 16], &ota, Some(0x1000)).is_err());
        let too_big = vec![0u8; ota.window.length as usize + 1];
        assert!(run_flash(&image, &too_big, &ota, None).is_err());
        assert!(!image.exists());
    }

    #[test]
    fn parses_cli() {
        let args = Args::parse_from(["host-demo", "-vv", "--layout", "monolithic", "window"]);
        assert_eq!(args.verbose, 2);
        assert_eq!(args.layout, Layout::Monolithic);
        assert!(matches!(args.command, Command::Window));
        assert!(Args::try_parse_from(["host-demo", "--layout", "hybrid", "window"]).is_err());
    }
}
