// Command-line front end: decrypt a volume to a file, or just verify
// its header against a password.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use log::{debug, error, info, LevelFilter};

use veradump::{Volume, VolumeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Decrypt the whole data region into the output file.
    Dump,
    /// Validate the header with the password and report its fields.
    VerifyHeader,
}

#[derive(Parser)]
#[command(name = "veradump", about = "decrypt and dump the volume data to output file")]
struct Args {
    /// Volume file to read.
    #[arg(long)]
    input: PathBuf,

    /// Destination for the decrypted data (dump mode).
    #[arg(long)]
    output: Option<PathBuf>,

    /// Volume password. Prompted for when not given.
    #[arg(long)]
    password: Option<String>,

    /// Enable more logging.
    #[arg(long)]
    verbose: bool,

    #[arg(long, value_enum, default_value = "dump")]
    mode: Mode,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), VolumeError> {
    let password = match args.password {
        Some(p) => p,
        None => rpassword::prompt_password("Volume password: ")?,
    };

    debug!("input file {}", args.input.display());
    let mut volume = Volume::open_path(&args.input, &password)?;
    print_volume_header_info(&volume);

    match args.mode {
        Mode::VerifyHeader => Ok(()),
        Mode::Dump => {
            let output = args.output.ok_or_else(|| {
                VolumeError::InvalidArgument("--output is required in dump mode".to_string())
            })?;
            debug!("output file {}", output.display());
            let mut sink = BufWriter::new(File::create(&output)?);

            let total = volume.master_key_encryption_size();
            let mut last_report = Instant::now();
            volume.read_data_bytes(&mut sink, 0, total, |bytes| {
                // Log the first and last callback and otherwise at most
                // every two seconds.
                if bytes == 0 || bytes == total || last_report.elapsed() >= Duration::from_secs(2)
                {
                    last_report = Instant::now();
                    info!("read {} bytes", bytes);
                }
                Ok(())
            })?;
            info!("decrypted {} bytes to {}", total, output.display());
            Ok(())
        }
    }
}

fn print_volume_header_info<R>(volume: &Volume<R>) {
    debug!("magic {}", volume.magic());
    debug!("header version {}", volume.header_version());
    debug!("min program version {}", volume.min_program_version());
    debug!("volume size {}", volume.volume_size());
    debug!("master key scope offset {}", volume.master_key_scope_offset());
    debug!("sector size {}", volume.sector_size());
    debug!(
        "master key encryption size {}",
        volume.master_key_encryption_size()
    );
    debug!("flags {:#010x}", volume.flags());
}
