use std::collections::HashMap;
use std::fs;
use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};

use kira_assembly_metadata::app::{App, RunMode, RunOptions};
use kira_assembly_metadata::biome::Biome;
use kira_assembly_metadata::biosample::{BiosampleClient, BiosampleMetadata};
use kira_assembly_metadata::coords::LatLon;
use kira_assembly_metadata::domain::{HealColumn, SummaryRecord, TaxId, ledger_header};
use kira_assembly_metadata::error::KiraError;
use kira_assembly_metadata::heal::{HealOptions, HealScope};
use kira_assembly_metadata::summary::SummaryClient;
use kira_assembly_metadata::taxonomy::LineageResolver;

type Calls = Arc<Mutex<Vec<String>>>;

fn summary_fields(accession: &str, tax_id: &str) -> Vec<String> {
    [
        accession,
        "Escherichia coli",
        "",
        tax_id,
        "Complete Genome",
        "PRJNA1",
        "SAMN1",
        "50.5",
        "4600000",
        "Illumina",
        "2020-01-01",
        "2019",
        "soil isolate",
    ]
    .iter()
    .map(|field| field.to_string())
    .collect()
}

#[derive(Default)]
struct MockSummary {
    records: HashMap<String, usize>,
    failing: Vec<String>,
    /// Replaced by a directory on the first fetch, so appends to it fail.
    break_ledger: Option<Utf8PathBuf>,
    calls: Calls,
}

impl MockSummary {
    fn with(accessions: &[(&str, usize)]) -> Self {
        Self {
            records: accessions
                .iter()
                .map(|(accession, count)| (accession.to_string(), *count))
                .collect(),
            ..Self::default()
        }
    }
}

impl SummaryClient for MockSummary {
    fn fetch(&self, accession: &str) -> Result<Vec<SummaryRecord>, KiraError> {
        self.calls.lock().unwrap().push(accession.to_string());
        if let Some(ledger) = &self.break_ledger {
            if ledger.is_file() {
                fs::remove_file(ledger).unwrap();
                fs::create_dir(ledger).unwrap();
            }
        }
        if self.failing.iter().any(|failing| failing == accession) {
            return Err(KiraError::SummaryCommand {
                accession: accession.to_string(),
                message: "boom".to_string(),
            });
        }
        let count = self.records.get(accession).copied().unwrap_or(0);
        Ok((0..count)
            .map(|idx| {
                let accession = if idx == 0 {
                    accession.to_string()
                } else {
                    format!("{accession}-{idx}")
                };
                SummaryRecord::from_fields(&summary_fields(&accession, "562")).unwrap()
            })
            .collect())
    }
}

#[derive(Default)]
struct MockLineage {
    lineage: Option<String>,
    calls: Arc<Mutex<usize>>,
}

impl LineageResolver for MockLineage {
    fn resolve(&self, _tax_id: TaxId) -> Option<String> {
        *self.calls.lock().unwrap() += 1;
        self.lineage.clone()
    }
}

#[derive(Default)]
struct MockBiosample {
    metadata: BiosampleMetadata,
    calls: Calls,
}

impl BiosampleClient for MockBiosample {
    fn fetch(&self, accession: &str) -> BiosampleMetadata {
        self.calls.lock().unwrap().push(accession.to_string());
        self.metadata.clone()
    }
}

fn marine() -> BiosampleMetadata {
    BiosampleMetadata {
        location: Some("Pacific Ocean".to_string()),
        biome: Biome::Marine,
        coordinates: LatLon {
            latitude: Some(12.34),
            longitude: Some(-56.78),
        },
        has_biome_description: true,
    }
}

fn lineage() -> MockLineage {
    MockLineage {
        lineage: Some("root; Bacteria; Escherichia coli".to_string()),
        ..MockLineage::default()
    }
}

fn write_input(dir: &Utf8Path, accessions: &[&str]) -> Utf8PathBuf {
    let path = dir.join("input.tsv");
    let mut content = String::from("Assembly Accession\tOrganism Name\n");
    for accession in accessions {
        content.push_str(accession);
        content.push_str("\tsomething\n");
    }
    fs::write(&path, content).unwrap();
    path
}

fn options(dir: &Utf8Path, input: Utf8PathBuf, mode: RunMode) -> RunOptions {
    RunOptions {
        input,
        output: dir.join("meta.tsv"),
        resume: None,
        detect_input_header: true,
        mode,
        heal: HealOptions::default(),
    }
}

fn ingest() -> RunMode {
    RunMode::Ingest { heal_after: false }
}

fn tempdir() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, path)
}

fn data_lines(path: &Utf8Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .skip(1)
        .map(str::to_string)
        .collect()
}

#[test]
fn ingest_writes_enriched_rows_and_filtered_view() {
    let (_temp, dir) = tempdir();
    let input = write_input(&dir, &["GCF_1.1", "GCF_2.1"]);
    let app = App::new(
        MockSummary::with(&[("GCF_1.1", 1), ("GCF_2.1", 1)]),
        lineage(),
        MockBiosample {
            metadata: marine(),
            ..MockBiosample::default()
        },
    );

    let report = app.run(&options(&dir, input, ingest())).unwrap();
    let ingest = report.ingest.unwrap();
    assert_eq!(ingest.processed_now, 2);
    assert_eq!(ingest.biome_filled, 2);
    assert_eq!(ingest.lat_lon_filled, 2);
    assert!(report.heal.is_none());
    assert_eq!(report.filtered.kept, 2);

    let ledger = fs::read_to_string(dir.join("meta.tsv")).unwrap();
    let lines: Vec<&str> = ledger.lines().collect();
    assert_eq!(lines[0], ledger_header());
    let columns: Vec<&str> = lines[1].split('\t').collect();
    assert_eq!(columns.len(), 18);
    assert_eq!(columns[0], "GCF_1.1");
    assert_eq!(columns[4], "root; Bacteria; Escherichia coli");
    assert_eq!(columns[14], "Pacific Ocean");
    assert_eq!(columns[15], "Marine");
    assert_eq!(columns[16], "12.34");
    assert_eq!(columns[17], "-56.78");

    let filtered = fs::read_to_string(dir.join("filtered_meta.tsv")).unwrap();
    assert_eq!(filtered, ledger);
}

#[test]
fn rerun_is_idempotent_and_skips_known_accessions() {
    let (_temp, dir) = tempdir();
    let input = write_input(&dir, &["GCF_1.1", "GCF_2.1"]);
    let summary = MockSummary::with(&[("GCF_1.1", 1), ("GCF_2.1", 1)]);
    let calls = summary.calls.clone();
    let app = App::new(summary, lineage(), MockBiosample::default());
    let options = options(&dir, input, ingest());

    app.run(&options).unwrap();
    let first = fs::read(dir.join("meta.tsv")).unwrap();
    let report = app.run(&options).unwrap();
    let second = fs::read(dir.join("meta.tsv")).unwrap();

    assert_eq!(first, second);
    assert_eq!(report.ingest.unwrap().skipped_already, 2);
    assert_eq!(calls.lock().unwrap().len(), 2);
    assert_eq!(
        fs::read_to_string(dir.join("meta.tsv"))
            .unwrap()
            .matches("Assembly Accession")
            .count(),
        1
    );
}

#[test]
fn resume_accessions_are_never_fetched() {
    let (_temp, dir) = tempdir();
    let input = write_input(&dir, &["GCF_1.1", "GCF_2.1"]);
    let resume = dir.join("previous.tsv");
    fs::write(&resume, format!("{}\nGCF_1.1\tx\n", ledger_header())).unwrap();

    let summary = MockSummary::with(&[("GCF_1.1", 1), ("GCF_2.1", 1)]);
    let calls = summary.calls.clone();
    let app = App::new(summary, lineage(), MockBiosample::default());
    let mut options = options(&dir, input, ingest());
    options.resume = Some(resume);

    let report = app.run(&options).unwrap();
    assert_eq!(*calls.lock().unwrap(), vec!["GCF_2.1".to_string()]);
    let ingest = report.ingest.unwrap();
    assert_eq!(ingest.skipped_already, 1);
    assert_eq!(ingest.processed_now, 1);
}

#[test]
fn summary_failure_skips_accession_and_continues() {
    let (_temp, dir) = tempdir();
    let input = write_input(&dir, &["GCF_bad.1", "GCF_2.1"]);
    let mut summary = MockSummary::with(&[("GCF_2.1", 1)]);
    summary.failing = vec!["GCF_bad.1".to_string()];
    let app = App::new(summary, lineage(), MockBiosample::default());

    let report = app.run(&options(&dir, input, ingest())).unwrap();
    let ingest = report.ingest.unwrap();
    assert_eq!(ingest.failed, 1);
    assert_eq!(ingest.processed_now, 1);
    let lines = data_lines(&dir.join("meta.tsv"));
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("GCF_2.1\t"));
}

#[test]
fn empty_summary_is_retried_next_run() {
    let (_temp, dir) = tempdir();
    let input = write_input(&dir, &["GCF_none.1"]);
    let summary = MockSummary::default();
    let calls = summary.calls.clone();
    let app = App::new(summary, lineage(), MockBiosample::default());
    let options = options(&dir, input, ingest());

    let report = app.run(&options).unwrap();
    assert_eq!(report.ingest.unwrap().empty, 1);
    app.run(&options).unwrap();
    assert_eq!(calls.lock().unwrap().len(), 2);
    assert!(data_lines(&dir.join("meta.tsv")).is_empty());
}

#[test]
fn every_summary_record_becomes_a_row() {
    let (_temp, dir) = tempdir();
    let input = write_input(&dir, &["GCF_1.1"]);
    let biosample = MockBiosample::default();
    let biosample_calls = biosample.calls.clone();
    let app = App::new(MockSummary::with(&[("GCF_1.1", 3)]), lineage(), biosample);

    let report = app.run(&options(&dir, input, ingest())).unwrap();
    let ingest = report.ingest.unwrap();
    assert_eq!(ingest.rows_appended, 3);
    assert_eq!(ingest.processed_now, 1);
    assert_eq!(data_lines(&dir.join("meta.tsv")).len(), 3);
    assert!(
        biosample_calls
            .lock()
            .unwrap()
            .iter()
            .all(|accession| accession == "GCF_1.1")
    );
    assert_eq!(report.filtered.kept, 0);
    assert_eq!(report.filtered.excluded, 3);
}

#[test]
fn missing_input_is_fatal_before_the_ledger_exists() {
    let (_temp, dir) = tempdir();
    let app = App::new(
        MockSummary::default(),
        lineage(),
        MockBiosample::default(),
    );
    let result = app.run(&options(&dir, dir.join("absent.tsv"), ingest()));
    assert_matches!(result, Err(KiraError::InputNotFound(_)));
    assert!(!dir.join("meta.tsv").exists());
}

fn unresolved_ledger(dir: &Utf8Path) -> Utf8PathBuf {
    let path = dir.join("meta.tsv");
    let resolved = summary_fields("GCF_done.1", "562");
    let mut done: Vec<String> = resolved[..4].to_vec();
    done.push("root; Bacteria".to_string());
    done.extend(resolved[4..].iter().cloned());
    done.extend(["Peru", "Terrestrial", "1.0", "2.0"].map(String::from));

    let pending = summary_fields("GCF_todo.1", "562");
    let mut todo: Vec<String> = pending[..4].to_vec();
    todo.push("Unknown".to_string());
    todo.extend(pending[4..].iter().cloned());
    todo.extend(["Unknown", "Unknown", "Unknown", "Unknown"].map(String::from));

    let content = format!(
        "{}\n{}\nbroken\tline\n{}\n",
        ledger_header(),
        done.join("\t"),
        todo.join("\t")
    );
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn heal_only_fills_missing_fields_without_reading_input() {
    let (_temp, dir) = tempdir();
    let ledger = unresolved_ledger(&dir);
    let summary = MockSummary::default();
    let summary_calls = summary.calls.clone();
    let biosample = MockBiosample {
        metadata: marine(),
        ..MockBiosample::default()
    };
    let biosample_calls = biosample.calls.clone();
    let app = App::new(summary, lineage(), biosample);

    let report = app
        .run(&options(&dir, dir.join("absent.tsv"), RunMode::HealOnly))
        .unwrap();
    assert!(report.ingest.is_none());
    let heal = report.heal.unwrap();
    assert_eq!(heal.checked, 2);
    assert_eq!(heal.updated, 1);
    assert_eq!(heal.filled.lineage, 1);
    assert_eq!(heal.filled.latlon, 1);
    assert!(summary_calls.lock().unwrap().is_empty());
    assert_eq!(*biosample_calls.lock().unwrap(), vec!["GCF_todo.1".to_string()]);

    let lines = data_lines(&ledger);
    assert_eq!(lines.len(), 3);
    assert!(lines[0].ends_with("Peru\tTerrestrial\t1.0\t2.0"));
    assert_eq!(lines[1], "broken\tline");
    let healed: Vec<&str> = lines[2].split('\t').collect();
    assert_eq!(healed[4], "root; Bacteria; Escherichia coli");
    assert_eq!(&healed[14..], ["Pacific Ocean", "Marine", "12.34", "-56.78"]);

    assert_eq!(report.filtered.kept, 2);
    assert_eq!(report.filtered.malformed, 1);
}

#[test]
fn heal_scope_limits_columns_and_lookups() {
    let (_temp, dir) = tempdir();
    let ledger = unresolved_ledger(&dir);
    let lineage = lineage();
    let lineage_calls = lineage.calls.clone();
    let app = App::new(
        MockSummary::default(),
        lineage,
        MockBiosample {
            metadata: marine(),
            ..MockBiosample::default()
        },
    );
    let mut options = options(&dir, dir.join("absent.tsv"), RunMode::HealOnly);
    options.heal = HealOptions {
        scope: HealScope::from_columns([HealColumn::Biome]),
        changed_only: true,
    };

    let report = app.run(&options).unwrap();
    let heal = report.heal.unwrap();
    assert_eq!(heal.filled.biome, 1);
    assert_eq!(heal.filled.lineage, 0);
    assert_eq!(*lineage_calls.lock().unwrap(), 0);

    let healed_line = data_lines(&ledger).pop().unwrap();
    let healed: Vec<&str> = healed_line.split('\t').collect();
    assert_eq!(healed[4], "Unknown");
    assert_eq!(&healed[14..], ["Unknown", "Marine", "Unknown", "Unknown"]);
}

#[test]
fn heal_never_downgrades_resolved_rows() {
    let (_temp, dir) = tempdir();
    let ledger = unresolved_ledger(&dir);
    let before = data_lines(&ledger);
    let app = App::new(
        MockSummary::default(),
        MockLineage::default(),
        MockBiosample::default(),
    );

    let report = app
        .run(&options(&dir, dir.join("absent.tsv"), RunMode::HealOnly))
        .unwrap();
    assert_eq!(report.heal.unwrap().updated, 0);
    assert_eq!(data_lines(&ledger), before);
}

#[test]
fn heal_after_ingest_revisits_the_ledger() {
    let (_temp, dir) = tempdir();
    let input = write_input(&dir, &["GCF_1.1"]);
    let biosample = MockBiosample::default();
    let biosample_calls = biosample.calls.clone();
    let app = App::new(
        MockSummary::with(&[("GCF_1.1", 1)]),
        MockLineage::default(),
        biosample,
    );

    let report = app
        .run(&options(&dir, input, RunMode::Ingest { heal_after: true }))
        .unwrap();
    let heal = report.heal.unwrap();
    assert_eq!(heal.checked, 1);
    assert_eq!(heal.updated, 0);
    assert_eq!(heal.rows.len(), 1);
    assert_eq!(biosample_calls.lock().unwrap().len(), 2);
}

#[test]
fn multiline_location_stays_one_row() {
    let (_temp, dir) = tempdir();
    let input = write_input(&dir, &["GCF_1.1"]);
    let mut metadata = marine();
    metadata.location = Some("USA:\nCalifornia".to_string());
    let app = App::new(
        MockSummary::with(&[("GCF_1.1", 1)]),
        lineage(),
        MockBiosample {
            metadata,
            ..MockBiosample::default()
        },
    );

    let report = app.run(&options(&dir, input, ingest())).unwrap();
    assert_eq!(report.filtered.kept, 1);
    assert_eq!(report.filtered.malformed, 0);
    let lines = data_lines(&dir.join("meta.tsv"));
    assert_eq!(lines.len(), 1);
    let columns: Vec<&str> = lines[0].split('\t').collect();
    assert_eq!(columns.len(), 18);
    assert_eq!(columns[14], "USA: California");
}

#[test]
fn unterminated_ledger_tail_does_not_swallow_new_rows() {
    let (_temp, dir) = tempdir();
    let ledger = unresolved_ledger(&dir);
    let content = fs::read_to_string(&ledger).unwrap();
    fs::write(&ledger, content.trim_end_matches('\n')).unwrap();
    let input = write_input(&dir, &["GCF_new.1"]);
    let summary = MockSummary::with(&[("GCF_new.1", 1)]);
    let calls = summary.calls.clone();
    let app = App::new(summary, lineage(), MockBiosample::default());
    let options = options(&dir, input, ingest());

    app.run(&options).unwrap();
    let first = fs::read(&ledger).unwrap();
    app.run(&options).unwrap();

    assert_eq!(fs::read(&ledger).unwrap(), first);
    assert_eq!(*calls.lock().unwrap(), vec!["GCF_new.1".to_string()]);
    let lines = data_lines(&ledger);
    assert_eq!(lines.len(), 4);
    assert!(lines[2].starts_with("GCF_todo.1\t"));
    assert_eq!(lines[2].split('\t').count(), 18);
    assert!(lines[3].starts_with("GCF_new.1\t"));
}

#[test]
fn ledger_write_failure_stops_the_run() {
    let (_temp, dir) = tempdir();
    let input = write_input(&dir, &["GCF_1.1", "GCF_2.1"]);
    let mut summary = MockSummary::with(&[("GCF_1.1", 1), ("GCF_2.1", 1)]);
    summary.break_ledger = Some(dir.join("meta.tsv"));
    let calls = summary.calls.clone();
    let app = App::new(summary, lineage(), MockBiosample::default());

    let result = app.run(&options(&dir, input, ingest()));
    assert_matches!(result, Err(KiraError::LedgerIo { .. }));
    assert_eq!(*calls.lock().unwrap(), vec!["GCF_1.1".to_string()]);
    assert!(!dir.join("filtered_meta.tsv").exists());
}
