//! FIX-log extraction: stream lines through the correlator into CSV.

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;

use tracing::info;

use crate::core::{Error, MatchedFill, Result};

use super::correlator::FillCorrelator;
use super::message::FixMessage;

/// CSV emitter for matched fills.
///
/// The fixed nine-column header is written exactly once at construction,
/// before any fill is seen, so an empty stream still produces a header-only
/// file. Rows follow in match order, one at a time, cells verbatim.
pub struct FillWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> FillWriter<W> {
    pub fn new(out: W) -> Result<Self> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(out);
        writer.write_record(MatchedFill::CSV_HEADER)?;
        Ok(Self { writer })
    }

    pub fn write(&mut self, fill: &MatchedFill) -> Result<()> {
        self.writer.serialize(fill)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Counters reported after an extract run.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtractStats {
    /// Input lines read, including skipped ones
    pub lines: u64,
    /// Matched fills emitted
    pub matched: u64,
    /// Orders still pending at stream end (discarded, not an error)
    pub unmatched_orders: usize,
}

/// Stream `input` through the correlator, emitting matched fills to `out`.
///
/// Lines are decoded lossily: invalid UTF-8 byte sequences are replaced,
/// never fatal. Malformed records are dropped silently; only I/O failures
/// abort the run.
pub fn extract<R: Read, W: Write>(input: R, out: W) -> Result<ExtractStats> {
    let mut reader = BufReader::new(input);
    let mut correlator = FillCorrelator::new();
    let mut writer = FillWriter::new(out)?;
    let mut stats = ExtractStats::default();

    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        stats.lines += 1;

        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\n', '\r']);
        if line.is_empty() {
            continue;
        }

        let msg = FixMessage::from_line(line);
        if let Some(fill) = correlator.on_message(&msg) {
            writer.write(&fill)?;
            stats.matched += 1;
        }
    }

    writer.flush()?;
    stats.unmatched_orders = correlator.pending_len();
    Ok(stats)
}

/// File front end. The missing-input check runs before the output file is
/// created, so a failed run leaves nothing behind.
pub fn extract_file(input: &Path, output: &Path) -> Result<ExtractStats> {
    if !input.is_file() {
        return Err(Error::InputNotFound(input.to_path_buf()));
    }
    let infile = File::open(input)?;
    let outfile = File::create(output)?;
    let stats = extract(infile, outfile)?;
    info!(
        lines = stats.lines,
        matched = stats.matched,
        unmatched_orders = stats.unmatched_orders,
        "extract complete"
    );
    Ok(stats)
}
