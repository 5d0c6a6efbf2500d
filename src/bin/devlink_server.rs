//! devlink server binary.
//!
//! Serves the control device and, when a register file is given, the
//! memory-mapped register device.
//!
//! Usage:
//!   cargo run --release --bin devlink_server -- [OPTIONS]

use std::io;
#[cfg(unix)]
use std::path::PathBuf;

use devlink::device::{Device, DeviceManager, Registers};
use devlink::network::{Server, ServerConfig};

struct Options {
    server: ServerConfig,
    registers: Option<String>,
    registers_size: usize,
    verbose: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            registers: None,
            registers_size: 4096,
            verbose: false,
        }
    }
}

fn run_server(options: Options) -> io::Result<()> {
    println!("devlink server v{}", devlink::device::VERSION);
    println!("=====================\n");

    let mut devices: Vec<Box<dyn Device>> = Vec::new();
    if let Some(path) = &options.registers {
        let registers = Registers::open(path, options.registers_size)?;
        println!("Registers: {} ({} bytes)", path, registers.size());
        devices.push(Box::new(registers));
    }

    let manager = DeviceManager::new(devices)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
    for dev in manager.devices() {
        let desc = dev.descriptor();
        println!("  #{} {} ({} operations)", desc.id, desc.tag, desc.operations.len());
    }

    let mut server = Server::bind(&options.server, manager)?;
    println!("\nListening on {}", server.local_addr()?);
    #[cfg(unix)]
    if let Some(path) = &options.server.unix_path {
        println!("Unix socket: {}", path.display());
    }
    println!("Waiting for connections...\n");

    server.run()
}

fn print_usage() {
    println!("devlink server\n");
    println!("Usage: devlink_server [OPTIONS]\n");
    println!("Options:");
    println!("  -b, --bind <ADDR>         Bind address (default: 0.0.0.0:36000)");
    #[cfg(unix)]
    println!("  -u, --unix <PATH>         Also listen on a Unix socket");
    println!("  -r, --registers <PATH>    Serve a register file");
    println!("      --size <BYTES>        Register window size (default: 4096)");
    println!("  -v, --verbose             Verbose output");
    println!("  -h, --help                Show this help");
}

fn parse_args() -> Result<Options, String> {
    let args: Vec<String> = std::env::args().collect();
    let mut options = Options::default();

    let value = |i: usize| {
        args.get(i + 1)
            .cloned()
            .ok_or_else(|| format!("missing value for {}", args[i]))
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" | "-b" => {
                options.server.bind_addr = value(i)?;
                i += 1;
            }
            #[cfg(unix)]
            "--unix" | "-u" => {
                options.server.unix_path = Some(PathBuf::from(value(i)?));
                i += 1;
            }
            "--registers" | "-r" => {
                options.registers = Some(value(i)?);
                i += 1;
            }
            "--size" => {
                let raw = value(i)?;
                options.registers_size = raw
                    .parse()
                    .map_err(|_| format!("invalid register size '{}'", raw))?;
                i += 1;
            }
            "--verbose" | "-v" => {
                options.verbose = true;
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => return Err(format!("unknown option '{}'", other)),
        }
        i += 1;
    }

    Ok(options)
}

fn main() {
    let options = match parse_args() {
        Ok(options) => options,
        Err(e) => {
            eprintln!("error: {}", e);
            print_usage();
            std::process::exit(2);
        }
    };
    devlink::logger::init(options.verbose);

    if let Err(e) = run_server(options) {
        eprintln!("server error: {}", e);
        std::process::exit(1);
    }
}
