//! disk-xfer receiver - receives raw disk sectors over a serial link and
//! writes them to an output file.

use anyhow::{Context, Result};
use clap::Parser;
use console::{style, Term};
use diskxfer_core::error::Result as CoreResult;
use diskxfer_core::receiver::{BlockOutcome, ReceiverFsm, SectorSink};
use env_logger::Env;
use log::debug;
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

mod serial;

use serial::NativeSerialPort;

/// How long to wait without a new accepted block, after at least one block
/// has been accepted, before concluding the sender has finished.
const SILENCE_TIMEOUT: Duration = Duration::from_millis(3000);

/// disk-xfer receiver: writes incoming sectors to a file.
#[derive(Parser)]
#[command(name = "diskxfer-recv")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Serial device to receive from.
    serial_path: String,

    /// File to write received sectors to.
    output_file: PathBuf,

    /// Baud rate for the serial link.
    #[arg(default_value = "115200")]
    baud: u32,

    /// Suppress the per-block status strip.
    #[arg(long)]
    quiet: bool,

    /// Verbose output level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Writes each block to its linear offset in the output file.
struct FileSink {
    file: File,
}

impl SectorSink for FileSink {
    fn write_block(&mut self, block_number: u32, data: &[u8]) -> CoreResult<()> {
        let offset = u64::from(block_number) * 512;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        Ok(())
    }
}

/// Prints one character per block, wrapping at the terminal width, the
/// portable equivalent of `rx-unix`'s `print_block_status`.
struct StatusStrip {
    term: Term,
    column: usize,
    enabled: bool,
}

impl StatusStrip {
    fn new(enabled: bool) -> Self {
        Self { term: Term::stdout(), column: 0, enabled }
    }

    fn push(&mut self, outcome: BlockOutcome) {
        if !self.enabled {
            return;
        }
        let ch = match outcome {
            BlockOutcome::Accepted(_) => style("A").green().to_string(),
            BlockOutcome::Nacked(_) => style("N").red().to_string(),
            BlockOutcome::Resynced(_) => style("S").yellow().to_string(),
            BlockOutcome::DuplicateAcked(_) => style(".").dim().to_string(),
        };
        print!("{ch}");
        let _ = std::io::stdout().flush();

        let (_, width) = self.term.size();
        self.column += 1;
        if self.column >= width as usize {
            println!();
            self.column = 0;
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    ctrlc::set_handler(diskxfer_core::abort::request_global_abort)
        .context("failed to install Ctrl-C handler")?;

    println!(
        "{} listening on {} @ {} baud -> {}",
        style("diskxfer-recv").cyan().bold(),
        cli.serial_path,
        cli.baud,
        cli.output_file.display()
    );

    let mut port = NativeSerialPort::open(&cli.serial_path, cli.baud)
        .with_context(|| format!("failed to open serial port: {}", cli.serial_path))?;

    let file = File::create(&cli.output_file)
        .with_context(|| format!("failed to create output file: {}", cli.output_file.display()))?;
    let mut sink = FileSink { file };

    let mut fsm = ReceiverFsm::new(&mut port, &mut sink);
    let mut strip = StatusStrip::new(!cli.quiet);
    let abort = diskxfer_core::abort::AbortContext::global();

    let mut last_progress_at = Instant::now();
    let mut accepted_any = false;

    loop {
        if abort.is_requested() {
            println!("\n{}", style("aborted by user").yellow());
            break;
        }

        let outcomes = fsm.tick().context("receive loop failed")?;
        if !outcomes.is_empty() {
            last_progress_at = Instant::now();
        }
        for outcome in outcomes {
            debug!("{outcome:?}");
            if matches!(outcome, BlockOutcome::Accepted(_)) {
                accepted_any = true;
            }
            strip.push(outcome);
        }

        if accepted_any && last_progress_at.elapsed() >= SILENCE_TIMEOUT {
            println!("\n{}", style("transfer complete (silence after last block)").green());
            break;
        }
    }

    println!(
        "received {} block(s)",
        fsm.next_expected()
    );

    Ok(())
}
