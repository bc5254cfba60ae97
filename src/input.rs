use std::fs;
use std::path::Path;

use crate::domain::Accession;
use crate::error::KiraError;

/// Header heuristic for the input accession list.
pub fn is_header_line(line: &str) -> bool {
    let lowered = line.trim().to_lowercase();
    lowered.starts_with("assembly accession")
        || (lowered.contains("assembly") && lowered.contains("accession"))
        || (lowered.contains("organism") && lowered.contains("tax id"))
}

/// Reads accessions from the first column of `path`, in file order.
///
/// With `detect_header`, a first non-blank line that looks like a header is
/// dropped. A missing or unreadable file is an error.
pub fn read_accessions(path: &Path, detect_header: bool) -> Result<Vec<Accession>, KiraError> {
    if !path.is_file() {
        return Err(KiraError::InputNotFound(path.to_path_buf()));
    }
    let bytes = fs::read(path).map_err(|err| KiraError::InputRead {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    Ok(parse_accessions(&String::from_utf8_lossy(&bytes), detect_header))
}

pub fn parse_accessions(content: &str, detect_header: bool) -> Vec<Accession> {
    let mut accessions = Vec::new();
    let mut first = true;
    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if first {
            first = false;
            if detect_header && is_header_line(line) {
                continue;
            }
        }
        let token = if line.contains('\t') {
            line.split('\t').next()
        } else {
            line.split_whitespace().next()
        };
        if let Some(accession) = token.and_then(|token| token.parse::<Accession>().ok()) {
            accessions.push(accession);
        }
    }
    accessions
}
