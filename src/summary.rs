use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;

use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::domain::{SummaryRecord, is_ledger_header};
use crate::error::KiraError;

/// `dataformat` columns, in ledger order minus the lineage column.
pub const SUMMARY_FIELDS: &str = "accession,organism-name,organism-common-name,organism-tax-id,\
assminfo-level,assminfo-bioproject,assminfo-biosample-accession,\
assmstats-gc-percent,assmstats-total-sequence-len,assminfo-sequencing-tech,\
assminfo-release-date,assminfo-biosample-collection-date,assminfo-biosample-description-title";

/// Produces the raw genome summary records for an accession. Zero, one or
/// several records are all valid answers.
pub trait SummaryClient: Send + Sync {
    fn fetch(&self, accession: &str) -> Result<Vec<SummaryRecord>, KiraError>;
}

/// Runs `datasets summary genome accession <acc> --as-json-lines` piped into
/// `dataformat tsv genome --fields ...`.
#[derive(Clone)]
pub struct DatasetsCliClient {
    datasets: Option<PathBuf>,
    dataformat: Option<PathBuf>,
}

impl DatasetsCliClient {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            datasets: config
                .datasets_bin
                .clone()
                .or_else(|| find_in_path("datasets")),
            dataformat: config
                .dataformat_bin
                .clone()
                .or_else(|| find_in_path("dataformat")),
        }
    }

    pub fn tools_available(&self) -> bool {
        self.datasets.is_some() && self.dataformat.is_some()
    }

    fn run_pipeline(&self, accession: &str) -> Result<String, KiraError> {
        let datasets = self
            .datasets
            .as_ref()
            .ok_or_else(|| KiraError::MissingTool("datasets".to_string()))?;
        let dataformat = self
            .dataformat
            .as_ref()
            .ok_or_else(|| KiraError::MissingTool("dataformat".to_string()))?;
        let failed = |message: String| KiraError::SummaryCommand {
            accession: accession.to_string(),
            message,
        };

        let mut producer = Command::new(datasets)
            .args(["summary", "genome", "accession", accession, "--as-json-lines"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| failed(format!("spawn {}: {err}", datasets.display())))?;
        let producer_stdout = producer
            .stdout
            .take()
            .ok_or_else(|| failed("datasets stdout unavailable".to_string()))?;
        let producer_stderr = producer.stderr.take().map(|mut stderr| {
            thread::spawn(move || {
                let mut buffer = Vec::new();
                let _ = stderr.read_to_end(&mut buffer);
                buffer
            })
        });

        let consumer = Command::new(dataformat)
            .args(["tsv", "genome", "--fields", SUMMARY_FIELDS])
            .stdin(Stdio::from(producer_stdout))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| failed(format!("spawn {}: {err}", dataformat.display())));
        let consumer = match consumer {
            Ok(consumer) => consumer,
            Err(err) => {
                let _ = producer.kill();
                let _ = producer.wait();
                return Err(err);
            }
        };

        let consumer_output = consumer
            .wait_with_output()
            .map_err(|err| failed(err.to_string()))?;
        let producer_status = producer.wait().map_err(|err| failed(err.to_string()))?;
        let producer_stderr = producer_stderr
            .and_then(|reader| reader.join().ok())
            .unwrap_or_default();

        check_status(datasets, producer_status, &producer_stderr).map_err(failed)?;
        check_status(dataformat, consumer_output.status, &consumer_output.stderr)
            .map_err(failed)?;
        Ok(String::from_utf8_lossy(&consumer_output.stdout).into_owned())
    }
}

impl SummaryClient for DatasetsCliClient {
    fn fetch(&self, accession: &str) -> Result<Vec<SummaryRecord>, KiraError> {
        debug!(accession, "running datasets summary");
        let stdout = self.run_pipeline(accession)?;
        Ok(parse_summary_tsv(accession, &stdout))
    }
}

fn check_status(program: &Path, status: ExitStatus, stderr: &[u8]) -> Result<(), String> {
    if status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(stderr).trim().to_string();
    if stderr.is_empty() {
        Err(format!("command failed: {} ({status})", program.display()))
    } else {
        Err(stderr)
    }
}

/// Splits `dataformat` TSV output into records, dropping the header on the
/// first non-blank line and any line narrower than the summary schema.
pub fn parse_summary_tsv(accession: &str, stdout: &str) -> Vec<SummaryRecord> {
    let mut records = Vec::new();
    let mut first = true;
    for line in stdout.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if std::mem::take(&mut first) && is_ledger_header(line) {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        match SummaryRecord::from_fields(&fields) {
            Some(record) => records.push(record),
            None => warn!(accession, line, "unexpected summary line"),
        }
    }
    records
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.is_file() {
            return Some(exe);
        }
        let plain = path.join(name);
        if plain.is_file() {
            return Some(plain);
        }
    }
    None
}
