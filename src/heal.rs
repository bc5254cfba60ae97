use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::biosample::{BiosampleClient, BiosampleMetadata};
use crate::coords::format_coordinate;
use crate::domain::{HealColumn, LedgerColumn, LedgerRecord, is_ledger_header, is_unresolved};
use crate::error::KiraError;
use crate::fs_util::rewrite_atomic;
use crate::taxonomy::LineageResolver;

/// Field groups a healing pass is allowed to fill. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealScope(BTreeSet<HealColumn>);

impl HealScope {
    pub fn all() -> Self {
        Self(HealColumn::ALL.into_iter().collect())
    }

    /// An empty selection means every column.
    pub fn from_columns(columns: impl IntoIterator<Item = HealColumn>) -> Self {
        let set: BTreeSet<HealColumn> = columns.into_iter().collect();
        if set.is_empty() { Self::all() } else { Self(set) }
    }

    pub fn contains(&self, column: HealColumn) -> bool {
        self.0.contains(&column)
    }

    pub fn columns(&self) -> impl Iterator<Item = HealColumn> + '_ {
        self.0.iter().copied()
    }
}

impl Default for HealScope {
    fn default() -> Self {
        Self::all()
    }
}

#[derive(Debug, Clone, Default)]
pub struct HealOptions {
    pub scope: HealScope,
    /// Log only rows that actually improved.
    pub changed_only: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FieldTally {
    pub lineage: usize,
    pub location: usize,
    pub biome: usize,
    pub latlon: usize,
}

impl FieldTally {
    fn record(&mut self, column: HealColumn) {
        match column {
            HealColumn::Lineage => self.lineage += 1,
            HealColumn::Location => self.location += 1,
            HealColumn::Biome => self.biome += 1,
            HealColumn::Latlon => self.latlon += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowHealOutcome {
    pub accession: String,
    pub improved: Vec<HealColumn>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HealReport {
    /// Well-formed data rows examined.
    pub checked: usize,
    /// Rows where at least one field was filled.
    pub updated: usize,
    pub filled: FieldTally,
    /// One entry per row selected for healing.
    pub rows: Vec<RowHealOutcome>,
}

/// A row is selected when any requested column is unresolved.
pub fn needs_healing(record: &LedgerRecord, scope: &HealScope) -> bool {
    scope.columns().any(|column| record.column_unresolved(column))
}

fn needs_biosample(record: &LedgerRecord, scope: &HealScope) -> bool {
    scope
        .columns()
        .filter(HealColumn::needs_biosample)
        .any(|column| record.column_unresolved(column))
}

/// Writes newly resolved values into unresolved requested fields only.
/// Returns the column groups that changed.
pub fn merge_healed(
    record: &mut LedgerRecord,
    scope: &HealScope,
    lineage: Option<String>,
    metadata: Option<&BiosampleMetadata>,
) -> Vec<HealColumn> {
    let mut improved = Vec::new();

    if scope.contains(HealColumn::Lineage) && record.is_unresolved(LedgerColumn::Lineage) {
        if let Some(lineage) = lineage.filter(|value| !is_unresolved(value)) {
            record.set(LedgerColumn::Lineage, lineage);
            improved.push(HealColumn::Lineage);
        }
    }

    let Some(metadata) = metadata else {
        return improved;
    };

    if scope.contains(HealColumn::Location) && record.is_unresolved(LedgerColumn::Location) {
        if let Some(location) = metadata
            .location
            .as_deref()
            .filter(|value| !is_unresolved(value))
        {
            record.set(LedgerColumn::Location, location.to_string());
            improved.push(HealColumn::Location);
        }
    }

    if scope.contains(HealColumn::Biome)
        && record.is_unresolved(LedgerColumn::Biome)
        && metadata.biome.is_resolved()
    {
        record.set(LedgerColumn::Biome, metadata.biome.to_string());
        improved.push(HealColumn::Biome);
    }

    if scope.contains(HealColumn::Latlon) {
        let mut changed = false;
        if let Some(latitude) = metadata.coordinates.latitude {
            if record.is_unresolved(LedgerColumn::Latitude) {
                record.set(LedgerColumn::Latitude, format_coordinate(latitude));
                changed = true;
            }
        }
        if let Some(longitude) = metadata.coordinates.longitude {
            if record.is_unresolved(LedgerColumn::Longitude) {
                record.set(LedgerColumn::Longitude, format_coordinate(longitude));
                changed = true;
            }
        }
        if changed {
            improved.push(HealColumn::Latlon);
        }
    }

    improved
}

/// Heals one record in place, consulting the collaborators only for what is
/// both requested and missing. BioSample is queried at most once.
pub fn heal_record<L, B>(
    record: &mut LedgerRecord,
    scope: &HealScope,
    lineage: &L,
    biosample: &B,
) -> Vec<HealColumn>
where
    L: LineageResolver + ?Sized,
    B: BiosampleClient + ?Sized,
{
    let new_lineage = if scope.contains(HealColumn::Lineage)
        && record.is_unresolved(LedgerColumn::Lineage)
    {
        record.tax_id().and_then(|tax_id| lineage.resolve(tax_id))
    } else {
        None
    };
    let metadata = needs_biosample(record, scope).then(|| biosample.fetch(record.accession()));
    merge_healed(record, scope, new_lineage, metadata.as_ref())
}

/// Rewrites the ledger at `path`, filling unresolved fields within the
/// requested scope. Header and malformed lines pass through unchanged; blank
/// lines are dropped. The file is replaced atomically.
pub fn heal_ledger<L, B>(
    path: &Path,
    options: &HealOptions,
    lineage: &L,
    biosample: &B,
) -> Result<HealReport, KiraError>
where
    L: LineageResolver + ?Sized,
    B: BiosampleClient + ?Sized,
{
    if !path.exists() {
        return Ok(HealReport::default());
    }
    let file = File::open(path).map_err(|err| KiraError::ledger_io(path, err))?;
    let reader = BufReader::new(file);

    let report = rewrite_atomic(path, |out| {
        let mut report = HealReport::default();
        let mut first = true;
        for raw in reader.split(b'\n') {
            let bytes = raw.map_err(|err| KiraError::ledger_io(path, err))?;
            let line = String::from_utf8_lossy(&bytes);
            if line.trim().is_empty() {
                continue;
            }
            let header = first && is_ledger_header(&line);
            first = false;

            let record = if header {
                None
            } else {
                LedgerRecord::parse(&line)
            };
            let Some(mut record) = record else {
                write_line(out, path, &line)?;
                continue;
            };

            report.checked += 1;
            if !needs_healing(&record, &options.scope) {
                write_line(out, path, &line)?;
                continue;
            }

            let improved = heal_record(&mut record, &options.scope, lineage, biosample);
            if improved.is_empty() {
                if !options.changed_only {
                    info!(accession = record.accession(), "heal: no improvement");
                }
                write_line(out, path, &line)?;
            } else {
                report.updated += 1;
                for column in &improved {
                    report.filled.record(*column);
                }
                info!(
                    accession = record.accession(),
                    improved = %join_columns(&improved),
                    "heal: improved"
                );
                write_line(out, path, &record.to_tsv_line())?;
            }
            report.rows.push(RowHealOutcome {
                accession: record.accession().to_string(),
                improved,
            });
        }
        Ok(report)
    })?;

    info!(
        checked = report.checked,
        updated = report.updated,
        "heal finished"
    );
    Ok(report)
}

fn write_line(out: &mut dyn Write, path: &Path, line: &str) -> Result<(), KiraError> {
    writeln!(out, "{line}").map_err(|err| KiraError::ledger_io(path, err))
}

fn join_columns(columns: &[HealColumn]) -> String {
    columns
        .iter()
        .map(HealColumn::as_str)
        .collect::<Vec<_>>()
        .join(",")
}
