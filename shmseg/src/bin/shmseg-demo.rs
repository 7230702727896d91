//! Creates (or attaches to) a shared memory segment, exercises it, then
//! closes and unlinks it.
//!
//! # Usage
//!
//! ```sh
//! shmseg-demo --name /myshm --size 1024
//! ```
//!
//! Prints `<name> <size> <created|attached>` on stdout once the segment is
//! open. Exits 1 if the segment cannot be created; every later failure is
//! reported on stderr but leaves the exit status at 0.

use shmseg::{InitStrategy, ShmOptions, ShmSegment};

/// Default segment name.
const DEFAULT_NAME: &str = "/myshm";

/// Default segment size in bytes.
const DEFAULT_SIZE: u64 = 1024;

struct DemoConfig {
    name: String,
    size: u64,
    opts: ShmOptions,
    /// Leave the name in the namespace on exit.
    keep: bool,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            size: DEFAULT_SIZE,
            opts: ShmOptions::default(),
            keep: false,
        }
    }
}

fn main() {
    shmseg::init_tracing();

    let args: Vec<String> = std::env::args().collect();
    let config = match parse_args(&args) {
        Ok(config) => config,
        Err(msg) => {
            eprintln!("shmseg-demo: {msg}");
            print_usage();
            std::process::exit(2);
        }
    };

    let segment =
        match ShmSegment::create_or_open_with(&config.name, config.size, &config.opts) {
            Ok(segment) => segment,
            Err(e) => {
                eprintln!("shmseg-demo: {e}");
                std::process::exit(1);
            }
        };

    println!(
        "{} {} {}",
        segment.name(),
        segment.size(),
        if segment.created() { "created" } else { "attached" }
    );

    if let Err(e) = exercise(&segment) {
        eprintln!("shmseg-demo: {e}");
    }

    if config.keep {
        return;
    }

    // Closes the descriptor before removing the name.
    if let Err(e) = segment.unlink() {
        eprintln!("shmseg-demo: {e}");
    }
}

/// Writes `i % 256` to every byte and reads it back.
fn exercise(segment: &ShmSegment) -> shmseg::Result<()> {
    let map = segment.map()?;

    // SAFETY: this demo is the only writer while the slice is alive.
    let bytes = unsafe { map.as_mut_slice() };
    for (i, byte) in bytes.iter_mut().enumerate() {
        *byte = (i % 256) as u8;
    }
    let mismatches = bytes
        .iter()
        .enumerate()
        .filter(|&(i, &b)| b != (i % 256) as u8)
        .count();
    if mismatches > 0 {
        eprintln!("shmseg-demo: {mismatches} byte(s) did not read back");
    }
    Ok(())
}

fn parse_args(args: &[String]) -> Result<DemoConfig, String> {
    let mut config = DemoConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--name" | "-n" => {
                i += 1;
                config.name = args.get(i).ok_or("missing value for --name")?.clone();
            }
            "--size" | "-s" => {
                i += 1;
                let value = args.get(i).ok_or("missing value for --size")?;
                config.size = value
                    .parse()
                    .map_err(|e| format!("invalid --size `{value}`: {e}"))?;
            }
            "--mode" | "-m" => {
                i += 1;
                let value = args.get(i).ok_or("missing value for --mode")?;
                let bits = u32::from_str_radix(value.trim_start_matches("0o"), 8)
                    .map_err(|e| format!("invalid --mode `{value}`: {e}"))?;
                config.opts = config.opts.mode_bits(bits);
            }
            "--exclusive" | "-x" => {
                config.opts = config.opts.strategy(InitStrategy::ExclusiveCreate);
            }
            "--keep" | "-k" => config.keep = true,
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            arg => return Err(format!("unknown argument: {arg}")),
        }
        i += 1;
    }

    Ok(config)
}

fn print_usage() {
    eprintln!(
        r#"shmseg-demo - create, exercise and unlink a POSIX shared memory segment

USAGE:
    shmseg-demo [OPTIONS]

OPTIONS:
    -n, --name <NAME>   Segment name (default: /myshm)
    -s, --size <BYTES>  Size requested if the segment is new (default: 1024)
    -m, --mode <OCTAL>  Permission bits for a new segment (default: 666)
    -x, --exclusive     Use O_EXCL so only the creator sizes the segment
    -k, --keep          Do not unlink the segment on exit
    -h, --help          Print this help message

ENVIRONMENT:
    RUST_LOG            Log filter (default: shmseg=info)
"#
    );
}
