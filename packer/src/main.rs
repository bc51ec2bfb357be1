use clap::{Parser, ValueEnum};
use hal::image::ModuleImage;
use hal::{Layout, ModuleFunction, PartitionTable, DEFAULT_PLATFORM_ID};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Function {
    None,
    Bootloader,
    MonoFirmware,
    SystemPart,
    UserPart,
}

impl From<Function> for ModuleFunction {
    fn from(value: Function) -> Self {
        match value {
            Function::None => ModuleFunction::None,
            Function::Bootloader => ModuleFunction::Bootloader,
            Function::MonoFirmware => ModuleFunction::MonoFirmware,
            Function::SystemPart => ModuleFunction::SystemPart,
            Function::UserPart => ModuleFunction::UserPart,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "packer",
    about = "Wrap a firmware body into a module image (header, suffix, CRC)."
)]
struct Args {
    /// Path to the raw firmware body
    #[arg(value_name = "BODY")]
    body: PathBuf,

    /// Role of the module
    #[arg(long, value_enum)]
    function: Function,

    /// Index distinguishing modules with the same role
    #[arg(long, default_value_t = 0)]
    index: u8,

    /// Module version
    #[arg(long = "module-version", default_value_t = 1)]
    module_version: u16,

    /// Platform the module is built for
    #[arg(long, default_value_t = DEFAULT_PLATFORM_ID)]
    platform_id: u16,

    /// Partition preset used to look up the start address
    #[arg(long, default_value = "modular", value_parser = parse_layout)]
    layout: Layout,

    /// Explicit start address (hex with 0x prefix, or decimal); overrides the preset
    #[arg(long, value_parser = parse_address)]
    start_address: Option<u32>,

    /// Role of the module this one depends on
    #[arg(long, value_enum, default_value = "none")]
    dep_function: Function,

    /// Index of the dependency
    #[arg(long, default_value_t = 0)]
    dep_index: u8,

    /// Minimum version of the dependency
    #[arg(long, default_value_t = 0)]
    dep_version: u16,

    /// Optional hex-encoded 32-byte hash carried in the suffix
    #[arg(long, value_name = "HEX32")]
    suffix_hash_hex: Option<String>,

    /// Header flags byte
    #[arg(long, default_value_t = 0)]
    flags: u8,

    /// Output file path
    #[arg(short, long)]
    out: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let body = fs::read(&args.body)?;
    let image = build_image(&args, body)?;
    let header = image.header().map_err(to_io_error)?;
    let blob = image.encode().map_err(to_io_error)?;

    let out_path = args.out.clone().unwrap_or_else(|| default_out_path(&args.body));
    fs::write(&out_path, &blob)?;

    println!(
        "✅ packed module: function={:?} index={} version={} platform={} range={:#x}..{:#x} -> {}",
        header.function,
        header.index,
        header.module_version,
        header.platform_id,
        header.module_start_address,
        header.module_end_address,
        out_path.display()
    );

    Ok(())
}

fn build_image(args: &Args, body: Vec<u8>) -> Result<ModuleImage, Box<dyn std::error::Error>> {
    let function = ModuleFunction::from(args.function);
    let start_address = match args.start_address {
        Some(address) => address,
        None => PartitionTable::for_layout(args.layout)
            .find_bounds(function, args.index)
            .map(|p| p.start_address)
            .ok_or_else(|| {
                format!(
                    "no {} partition for {:?}/{}; pass --start-address",
                    args.layout, function, args.index
                )
            })?,
    };

    let mut image = ModuleImage::new(
        function,
        args.index,
        args.module_version,
        args.platform_id,
        start_address,
    )
    .body(body)
    .flags(args.flags);

    if args.dep_function != Function::None {
        image = image.dependency(args.dep_function.into(), args.dep_index, args.dep_version);
    }
    if let Some(hex_hash) = args.suffix_hash_hex.as_deref() {
        image = image.suffix_hash(parse_hex32(hex_hash)?);
    }
    Ok(image)
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

fn parse_hex32(hex: &str) -> Result<[u8; 32], io::Error> {
    let bytes = hex::decode(hex.trim()).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidInput, "suffix_hash_hex not valid hex")
    })?;
    let arr: [u8; 32] = bytes.try_into().map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidInput, "suffix_hash_hex must be 32 bytes")
    })?;
    Ok(arr)
}

fn default_out_path(input: &Path) -> PathBuf {
    let mut out = input.to_path_buf();
    out.set_extension("module.bin");
    out
}

fn to_io_error(err: hal::Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("image error: {err}"))
}
