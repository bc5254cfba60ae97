use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::domain::{Row, is_ledger_header, ledger_header};
use crate::error::KiraError;
use crate::fs_util::file_has_content;

/// The append-only metadata TSV plus the accessions it already holds.
///
/// One process per ledger: there is no locking, and two runs writing the same
/// file concurrently is unsupported.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    processed: HashSet<String>,
}

impl Ledger {
    /// Opens (or creates) the ledger, writing the header only when the file is
    /// missing or empty, and loads the processed accessions.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, KiraError> {
        let path = path.into();
        ensure_header(&path)?;
        terminate_last_line(&path)?;
        let processed = load_accessions(&path)?;
        debug!(
            ledger = %path.display(),
            accessions = processed.len(),
            "ledger opened"
        );
        Ok(Self { path, processed })
    }

    /// Adds accessions from a previously produced TSV of the same layout.
    /// A missing resume file contributes nothing.
    pub fn merge_resume(&mut self, resume: &Path) -> Result<usize, KiraError> {
        if !resume.exists() {
            warn!(resume = %resume.display(), "resume file not found, ignoring");
            return Ok(0);
        }
        let accessions = load_accessions(resume)?;
        let before = self.processed.len();
        self.processed.extend(accessions);
        Ok(self.processed.len() - before)
    }

    pub fn has(&self, accession: &str) -> bool {
        self.processed.contains(accession)
    }

    pub fn len(&self) -> usize {
        self.processed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processed.is_empty()
    }

    /// Appends one row. Write failures are returned, never swallowed.
    pub fn append(&mut self, row: &Row) -> Result<(), KiraError> {
        self.append_line(&row.to_tsv_line())
    }

    fn append_line(&mut self, line: &str) -> Result<(), KiraError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|err| KiraError::ledger_io(&self.path, err))?;
        writeln!(file, "{line}").map_err(|err| KiraError::ledger_io(&self.path, err))?;
        file.flush()
            .map_err(|err| KiraError::ledger_io(&self.path, err))?;
        Ok(())
    }

    pub fn mark_processed(&mut self, accession: &str) {
        self.processed.insert(accession.to_string());
    }
}

/// Writes the header when `path` is missing or empty; a file with content is
/// left untouched.
pub fn ensure_header(path: &Path) -> Result<(), KiraError> {
    if file_has_content(path) {
        return Ok(());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| KiraError::ledger_io(path, err))?;
    }
    let mut file = File::create(path).map_err(|err| KiraError::ledger_io(path, err))?;
    writeln!(file, "{}", ledger_header()).map_err(|err| KiraError::ledger_io(path, err))?;
    Ok(())
}

/// Appends a newline when the file's last line lacks one, so the next row
/// starts on its own line.
pub fn terminate_last_line(path: &Path) -> Result<(), KiraError> {
    if !file_has_content(path) {
        return Ok(());
    }
    let mut file = OpenOptions::new()
        .read(true)
        .append(true)
        .open(path)
        .map_err(|err| KiraError::ledger_io(path, err))?;
    file.seek(SeekFrom::End(-1))
        .map_err(|err| KiraError::ledger_io(path, err))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)
        .map_err(|err| KiraError::ledger_io(path, err))?;
    if last[0] != b'\n' {
        warn!(ledger = %path.display(), "last ledger line was unterminated");
        writeln!(file).map_err(|err| KiraError::ledger_io(path, err))?;
    }
    Ok(())
}

/// Accessions found in the first column of a ledger-shaped TSV.
///
/// The first non-blank line is skipped when it is a header; blank lines are
/// ignored. A missing or empty file yields an empty set.
pub fn load_accessions(path: &Path) -> Result<HashSet<String>, KiraError> {
    let mut processed = HashSet::new();
    if !file_has_content(path) {
        return Ok(processed);
    }
    let file = File::open(path).map_err(|err| KiraError::ledger_io(path, err))?;
    let reader = BufReader::new(file);
    let mut first = true;
    for line in reader.split(b'\n') {
        let bytes = line.map_err(|err| KiraError::ledger_io(path, err))?;
        let line = String::from_utf8_lossy(&bytes);
        if line.trim().is_empty() {
            continue;
        }
        if first {
            first = false;
            if is_ledger_header(&line) {
                continue;
            }
        }
        let accession = line.split('\t').next().unwrap_or_default().trim();
        if !accession.is_empty() {
            processed.insert(accession.to_string());
        }
    }
    Ok(processed)
}
