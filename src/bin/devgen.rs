//! Marshalling generator.
//!
//! Usage:
//!   devgen --config devgen.toml
//!   devgen --output generated drivers/math.hpp drivers/dev_mem.hpp

use std::path::PathBuf;

use devlink::devgen::{self, GeneratorConfig};

#[derive(Default)]
struct Options {
    config: Option<PathBuf>,
    output: Option<PathBuf>,
    pragma: Option<String>,
    headers: Vec<PathBuf>,
    verbose: bool,
}

fn print_usage() {
    println!("devgen: device marshalling generator\n");
    println!("Usage: devgen --config <FILE>");
    println!("       devgen --output <DIR> <HEADER>...\n");
    println!("Options:");
    println!("  -c, --config <FILE>    TOML configuration");
    println!("  -o, --output <DIR>     Output directory");
    println!("  -p, --pragma <NAME>    Pragma namespace (default: devlink)");
    println!("  -v, --verbose          Verbose output");
    println!("  -h, --help             Show this help");
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
            "--config" | "-c" => {
                options.config = Some(PathBuf::from(value(i)?));
                i += 1;
            }
            "--output" | "-o" => {
                options.output = Some(PathBuf::from(value(i)?));
                i += 1;
            }
            "--pragma" | "-p" => {
                options.pragma = Some(value(i)?);
                i += 1;
            }
            "--verbose" | "-v" => {
                options.verbose = true;
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            flag if flag.starts_with('-') => return Err(format!("unknown option '{}'", flag)),
            header => options.headers.push(PathBuf::from(header)),
        }
        i += 1;
    }

    Ok(options)
}

fn config_from(options: Options) -> Result<GeneratorConfig, String> {
    let mut config = match (options.config, options.output) {
        (Some(path), None) if options.headers.is_empty() => {
            GeneratorConfig::load(&path).map_err(|e| e.to_string())?
        }
        (None, Some(output)) if !options.headers.is_empty() => {
            GeneratorConfig::new(output, options.headers)
        }
        _ => return Err("expected either --config <FILE> or --output <DIR> with headers".to_string()),
    };
    if let Some(pragma) = options.pragma {
        config.pragma = pragma;
    }
    Ok(config)
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

    let config = match config_from(options) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(2);
        }
    };

    match devgen::generate(&config) {
        Ok(generated) => {
            for dev in generated.table.user_devices() {
                println!("#{} {} ({} operations)", dev.id, dev.tag, dev.operations.len());
            }
            println!("Output: {}", config.output_dir.display());
        }
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    }
}
