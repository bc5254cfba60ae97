use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::biosample::BiosampleClient;
use crate::domain::{Row, SummaryRecord};
use crate::error::KiraError;
use crate::filtered::{FilterReport, rebuild_filtered};
use crate::fs_util::filtered_path_for;
use crate::heal::{HealOptions, HealReport, heal_ledger};
use crate::input::read_accessions;
use crate::ledger::{Ledger, ensure_header};
use crate::summary::SummaryClient;
use crate::taxonomy::LineageResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum RunMode {
    /// Ingest new accessions, optionally healing the ledger afterwards.
    Ingest { heal_after: bool },
    /// Heal the existing ledger only; the input list is not read.
    HealOnly,
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub input: Utf8PathBuf,
    pub output: Utf8PathBuf,
    pub resume: Option<Utf8PathBuf>,
    pub detect_input_header: bool,
    pub mode: RunMode,
    pub heal: HealOptions,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub skipped_already: usize,
    pub processed_now: usize,
    /// Accessions whose summary lookup failed; retried on the next run.
    pub failed: usize,
    /// Accessions whose summary had no usable record.
    pub empty: usize,
    pub rows_appended: usize,
    pub biome_filled: usize,
    pub lat_lon_filled: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub mode: RunMode,
    pub ingest: Option<IngestReport>,
    pub heal: Option<HealReport>,
    pub filtered: FilterReport,
    pub output: String,
    pub filtered_output: String,
    pub started_at: String,
    pub finished_at: String,
}

/// What one enrichment call produced, tallied by the caller.
#[derive(Debug, Clone)]
pub struct EnrichedRow {
    pub row: Row,
    pub biome_found: bool,
    pub lat_lon_found: bool,
}

/// Drives ingestion, healing and the filtered rebuild over injected
/// collaborators.
pub struct App<S: SummaryClient, L: LineageResolver, B: BiosampleClient> {
    summary: S,
    lineage: L,
    biosample: B,
}

impl<S: SummaryClient, L: LineageResolver, B: BiosampleClient> App<S, L, B> {
    pub fn new(summary: S, lineage: L, biosample: B) -> Self {
        Self {
            summary,
            lineage,
            biosample,
        }
    }

    pub fn run(&self, options: &RunOptions) -> Result<RunReport, KiraError> {
        let started_at = Utc::now().to_rfc3339();
        let output = options.output.as_path();
        let filtered_output = filtered_path_for(output);

        let (ingest, heal) = match options.mode {
            RunMode::HealOnly => {
                ensure_header(output.as_std_path())?;
                (None, Some(self.heal(output, &options.heal)?))
            }
            RunMode::Ingest { heal_after } => {
                let ingest = self.ingest(options)?;
                let heal = if heal_after {
                    Some(self.heal(output, &options.heal)?)
                } else {
                    None
                };
                (Some(ingest), heal)
            }
        };

        let filtered = rebuild_filtered(output.as_std_path(), filtered_output.as_std_path())?;

        Ok(RunReport {
            mode: options.mode,
            ingest,
            heal,
            filtered,
            output: output.to_string(),
            filtered_output: filtered_output.to_string(),
            started_at,
            finished_at: Utc::now().to_rfc3339(),
        })
    }

    /// Appends rows for every input accession not yet in the ledger.
    ///
    /// An accession counts as processed only once at least one row for it was
    /// appended; summary failures are logged and left for the next run.
    pub fn ingest(&self, options: &RunOptions) -> Result<IngestReport, KiraError> {
        let accessions =
            read_accessions(options.input.as_std_path(), options.detect_input_header)?;
        let mut ledger = Ledger::open(options.output.as_std_path())?;
        if let Some(resume) = &options.resume {
            let added = ledger.merge_resume(resume.as_std_path())?;
            debug!(resume = %resume, added, "merged resume accessions");
        }
        info!(
            input = accessions.len(),
            known = ledger.len(),
            "starting ingest"
        );

        let mut report = IngestReport::default();
        for accession in &accessions {
            let accession = accession.as_str();
            if ledger.has(accession) {
                report.skipped_already += 1;
                continue;
            }

            let records = match self.summary.fetch(accession) {
                Ok(records) => records,
                Err(err) => {
                    warn!(accession, error = %err, "genome summary failed, skipping");
                    report.failed += 1;
                    continue;
                }
            };
            if records.is_empty() {
                warn!(accession, "no summary lines returned");
                report.empty += 1;
                continue;
            }

            let mut wrote_any = false;
            for record in records {
                let enriched = self.enrich(accession, record);
                ledger.append(&enriched.row)?;
                wrote_any = true;
                report.rows_appended += 1;
                report.biome_filled += usize::from(enriched.biome_found);
                report.lat_lon_filled += usize::from(enriched.lat_lon_found);
            }
            if wrote_any {
                ledger.mark_processed(accession);
                report.processed_now += 1;
                debug!(accession, "processed");
            }
        }

        info!(
            skipped = report.skipped_already,
            processed = report.processed_now,
            failed = report.failed,
            "ingest finished"
        );
        Ok(report)
    }

    /// Adds lineage and BioSample context to one summary record.
    pub fn enrich(&self, accession: &str, summary: SummaryRecord) -> EnrichedRow {
        let lineage = summary
            .tax_id()
            .and_then(|tax_id| self.lineage.resolve(tax_id));
        let metadata = self.biosample.fetch(accession);
        EnrichedRow {
            biome_found: metadata.has_biome_description,
            lat_lon_found: metadata.coordinates.is_available(),
            row: Row {
                summary,
                lineage,
                location: metadata.location,
                biome: metadata.biome,
                latitude: metadata.coordinates.latitude,
                longitude: metadata.coordinates.longitude,
            },
        }
    }

    pub fn heal(&self, ledger: &Utf8Path, options: &HealOptions) -> Result<HealReport, KiraError> {
        info!(
            ledger = %ledger,
            columns = %options
                .scope
                .columns()
                .map(|column| column.as_str())
                .collect::<Vec<_>>()
                .join(","),
            "healing ledger"
        );
        heal_ledger(ledger.as_std_path(), options, &self.lineage, &self.biosample)
    }
}
