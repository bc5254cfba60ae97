use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::domain::{LedgerRecord, is_ledger_header, ledger_header};
use crate::error::KiraError;
use crate::fs_util::rewrite_atomic;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FilterReport {
    pub kept: usize,
    pub excluded: usize,
    pub malformed: usize,
}

/// Regenerates `filtered` from scratch with the ledger rows whose biome,
/// latitude and longitude are all resolved. Rows narrower than the schema are
/// dropped silently. A missing ledger produces a header-only file.
pub fn rebuild_filtered(ledger: &Path, filtered: &Path) -> Result<FilterReport, KiraError> {
    let reader = match File::open(ledger) {
        Ok(file) => Some(BufReader::new(file)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
        Err(err) => return Err(KiraError::ledger_io(ledger, err)),
    };

    let report = rewrite_atomic(filtered, |out| {
        let mut report = FilterReport::default();
        writeln!(out, "{}", ledger_header()).map_err(|err| KiraError::ledger_io(filtered, err))?;
        let Some(reader) = reader else {
            return Ok(report);
        };
        let mut first = true;
        for raw in reader.split(b'\n') {
            let bytes = raw.map_err(|err| KiraError::ledger_io(ledger, err))?;
            let line = String::from_utf8_lossy(&bytes);
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            if std::mem::take(&mut first) && is_ledger_header(line) {
                continue;
            }
            match LedgerRecord::parse(line) {
                Some(record) if record.is_geolocated() => {
                    writeln!(out, "{line}").map_err(|err| KiraError::ledger_io(filtered, err))?;
                    report.kept += 1;
                }
                Some(_) => report.excluded += 1,
                None => report.malformed += 1,
            }
        }
        Ok(report)
    })?;

    info!(
        filtered = %filtered.display(),
        kept = report.kept,
        "filtered view rebuilt"
    );
    Ok(report)
}
