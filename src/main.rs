use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process;

use sniff_driver::{run_session, CancelToken, NativeService, Parameters, SniffError};

use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn};

/// Sniffer capture driver
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct SniffRun {
    #[clap(subcommand)]
    pub subcommand: Options,
}

#[derive(Debug, Subcommand)]
pub enum Options {
    /// Capture, decode and write the decoded rows to a file
    Run(RunCommand),
}

#[derive(Debug, Args)]
pub struct RunCommand {
    /// Path of the vendor library (libsniff_ez / libminisniff)
    #[clap(short, long, value_parser)]
    library: Option<PathBuf>,

    /// Output file path
    #[clap(short, long, value_parser, default_value = sniff_driver::parameters::DEFAULT_OUTPUT)]
    output: String,

    /// Capture buffer size requested from the hardware, in bytes
    #[clap(short, long, value_parser, default_value_t = sniff_driver::parameters::DEFAULT_BUFFER_SIZE)]
    buffer_size: u32,

    /// Hardware status queries before giving up
    #[clap(long, value_parser, default_value_t = 6)]
    ready_attempts: u32,

    /// Milliseconds between completion polls (default depends on the library)
    #[clap(short, long, value_parser)]
    poll_interval_ms: Option<u64>,

    /// Seconds the capture may run, 0 waits forever
    #[clap(long, value_parser, default_value_t = 3600)]
    capture_timeout: u64,

    /// Seconds the decode may run, 0 waits forever
    #[clap(long, value_parser, default_value_t = 3600)]
    decode_timeout: u64,

    /// Debug logging
    #[clap(short, long)]
    verbose: bool,
}

fn main() {
    let args = SniffRun::parse();
    match args.subcommand {
        Options::Run(run_command) => {
            init_logging(run_command.verbose);
            if let Err(e) = run(run_command) {
                error!("{}", e);
                println!("Error: {}", e);
                process::exit(if e.is_hardware() { 2 } else { 1 });
            }
        }
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let level = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| level.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn run(run_command: RunCommand) -> Result<(), SniffError> {
    let mut parameters = Parameters::new();
    if let Some(library) = run_command.library {
        parameters.set_library_path(library);
    }
    parameters.set_file_path(run_command.output);
    parameters.set_buffer_size(run_command.buffer_size);
    parameters.set_ready_attempts(run_command.ready_attempts);
    if let Some(poll_interval_ms) = run_command.poll_interval_ms {
        parameters.set_poll_interval_ms(poll_interval_ms);
    }
    parameters.set_capture_timeout(run_command.capture_timeout);
    parameters.set_decode_timeout(run_command.decode_timeout);

    let mut service = NativeService::load(parameters.library_path.as_deref())?;
    info!("Driving sniffer through {}", service.path().display());

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_token.cancel()) {
        warn!("failed to set Ctrl+C handler: {}", e);
    }

    let mut output = BufWriter::new(File::create(&parameters.file_path)?);
    let report = run_session(&mut service, &parameters, &cancel, &mut output, |progress| {
        print!("{} ", progress);
        let _ = io::stdout().flush();
    })?;
    println!();

    report.to_formatted_table().printstd();
    Ok(())
}
