//! disk-xfer sender - transmits raw disk sectors over a serial link.

use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use diskxfer_core::abort::AbortContext;
use diskxfer_core::device::{BlockDevice, FileBlockDevice};
use diskxfer_core::sender::{SenderFsm, SenderOutcome};
use env_logger::Env;
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use std::io::BufRead;
use std::path::PathBuf;

mod report;
mod serial;

use serial::NativeSerialPort;

/// disk-xfer sender: sends raw sectors from a block device over serial.
#[derive(Parser)]
#[command(name = "diskxfer-send")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Drive letter, used only as a display label and as the default
    /// image-file stem.
    #[arg(default_value = "C")]
    drive: String,

    /// First sector to send.
    #[arg(default_value = "0")]
    start_sector: u64,

    /// Baud rate for the serial link.
    #[arg(default_value = "115200")]
    baud: u32,

    /// Serial device to send over.
    #[arg(long)]
    port: String,

    /// Backing image file. Defaults to `<drive>.img`.
    #[arg(long)]
    image: Option<PathBuf>,

    /// Disk geometry: heads, used only for the CHS display.
    #[arg(long, default_value = "2")]
    heads: u8,

    /// Disk geometry: sectors per track, used only for the CHS display.
    #[arg(long, default_value = "18")]
    sectors_per_track: u32,

    /// Write the final report to this path in addition to stdout.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Verbose output level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
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

    let image_path = cli
        .image
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("{}.img", cli.drive)));

    let mut device = FileBlockDevice::open_with_derived_geometry(
        &image_path,
        cli.heads,
        cli.sectors_per_track,
    )
    .with_context(|| format!("failed to open image file: {}", image_path.display()))?;
    let geometry = device.geometry().context("failed to query device geometry")?;

    if cli.start_sector >= geometry.total_sectors() {
        anyhow::bail!(
            "start sector {} is beyond the disk's {} sectors",
            cli.start_sector,
            geometry.total_sectors()
        );
    }

    println!(
        "{} drive {} ({} sectors) -> {} @ {} baud",
        style("diskxfer-send").cyan().bold(),
        cli.drive,
        geometry.total_sectors(),
        cli.port,
        cli.baud
    );

    let mut port = NativeSerialPort::open(&cli.port, cli.baud)
        .with_context(|| format!("failed to open serial port: {}", cli.port))?;

    let total_blocks = geometry.total_sectors().saturating_sub(cli.start_sector);
    let progress_bar = ProgressBar::new(total_blocks);
    #[allow(clippy::unwrap_used)]
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] block {pos}/{len}")
            .unwrap()
            .progress_chars("#>-"),
    );

    println!("{} waiting for receiver...", style("...").dim());
    println!("{} press Enter any time for a live status line", style("tip:").dim());

    // A dedicated stdin-watcher thread, the printable-keypress counterpart
    // to the Ctrl-C abort handler: pressing Enter requests an on-demand
    // status line without touching the transfer loop directly.
    std::thread::spawn(|| {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            if line.is_err() {
                break;
            }
            diskxfer_core::status::request_global_status();
        }
    });

    let abort = AbortContext::global();
    let mut fsm = SenderFsm::new(&mut device, &mut port, geometry, cli.start_sector, cli.baud, abort);
    fsm.set_status_request_context(diskxfer_core::status::StatusRequestContext::global());
    let summary = fsm
        .run_with_progress(|completed, total| progress_bar.set_position(completed.min(total)))
        .context("transfer failed")?;
    progress_bar.finish_and_clear();

    let read_log = fsm.read_log();
    let report_text = report::render(&summary, read_log, geometry, cli.start_sector, cli.baud);
    print!("{report_text}");

    if let Some(path) = &cli.report {
        std::fs::write(path, &report_text)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        println!("report written to {}", path.display());
    }

    match summary.outcome {
        SenderOutcome::Completed => {
            info!("transfer completed successfully");
            Ok(())
        },
        SenderOutcome::Aborted => {
            anyhow::bail!("transfer aborted before completion");
        },
    }
}
