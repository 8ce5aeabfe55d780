//! End-of-transfer report rendering (spec.md §3 "original_source"
//! supplement: a saved human-readable report).
//!
//! Grounded on `tx-msdos/src/utils.c`'s `print_status`/`print_bad_sectors_status`
//! table layout, re-expressed with `format!` instead of fixed-width `printf`.

use diskxfer_core::device::Geometry;
use diskxfer_core::readlog::ReadLog;
use diskxfer_core::sender::{SenderOutcome, TransferSummary};

/// Render the final transfer report as plain text.
#[must_use]
pub fn render(
    summary: &TransferSummary,
    read_log: &ReadLog,
    geometry: Geometry,
    start_sector: u64,
    baud: u32,
) -> String {
    let mut out = String::new();
    let separator = "-".repeat(60);

    out.push_str(&separator);
    out.push('\n');
    out.push_str(&format!(
        " SOURCE : start sector {start_sector}, geometry {}C/{}H/{}S\n",
        geometry.cylinders, geometry.heads, geometry.sectors_per_track
    ));
    out.push_str(&separator);
    out.push('\n');

    let end_chs = geometry.to_chs(start_sector + summary.blocks_completed);
    out.push_str(&format!(
        " END    : block {} of {} | C:{} H:{} S:{}\n",
        summary.blocks_completed,
        geometry.total_sectors().saturating_sub(start_sector),
        end_chs.cylinder,
        end_chs.head,
        end_chs.sector,
    ));

    let outcome = match summary.outcome {
        SenderOutcome::Completed => "completed",
        SenderOutcome::Aborted => "aborted by user",
    };
    out.push_str(&format!(" OUTCOME: {outcome}\n"));
    out.push_str(&format!(" MD5    : {}\n", hex(&summary.md5_digest)));
    out.push_str(&separator);
    out.push('\n');

    let kbps = summary.bytes_per_second / 1024.0;
    out.push_str(&format!(
        " RATE   : {kbps:.2} kB/s (baud {baud}), {} bytes transferred\n",
        summary.total_bytes_read
    ));
    out.push_str(&separator);
    out.push('\n');

    if read_log.is_empty() {
        out.push_str("No bad sectors encountered.\n");
    } else {
        out.push_str("Bad Sectors...\n");
        out.push_str(&separator);
        out.push('\n');
        for entry in read_log.iterate() {
            out.push_str(&format!(
                " sector {:<10} status 0x{:02X} retries {:<4} {}\n",
                entry.sector, entry.status_code, entry.retry_count, entry.status_message
            ));
        }
        out.push_str(&separator);
        out.push('\n');
    }

    out
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
