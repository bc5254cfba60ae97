use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum KiraError {
    #[error("input accession list not found: {0}")]
    #[diagnostic(help("pass a TSV whose first column holds assembly accessions"))]
    InputNotFound(PathBuf),

    #[error("failed to read input accession list {path}: {message}")]
    InputRead { path: PathBuf, message: String },

    #[error("ledger write failed at {path}: {message}")]
    LedgerIo { path: PathBuf, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid delay: {0} (expected a non-negative number of seconds)")]
    InvalidDelay(String),

    #[error("invalid assembly accession: {0}")]
    InvalidAccession(String),

    #[error("invalid taxonomy id: {0}")]
    InvalidTaxId(String),

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("genome summary failed for {accession}: {message}")]
    SummaryCommand { accession: String, message: String },

    #[error("Entrez request failed: {0}")]
    EntrezHttp(String),

    #[error("Entrez returned status {status}: {message}")]
    EntrezStatus { status: u16, message: String },
}

impl KiraError {
    pub fn ledger_io(path: impl Into<PathBuf>, err: impl ToString) -> Self {
        KiraError::LedgerIo {
            path: path.into(),
            message: err.to_string(),
        }
    }
}
