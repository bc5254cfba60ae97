use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::KiraError;

/// Replaces `path` with whatever `fill` writes, all or nothing.
///
/// The content goes to a temporary file in the destination directory; only a
/// fully written temp file is renamed over `path`. When `fill` fails the temp
/// file is discarded and the existing file is left as it was.
pub fn rewrite_atomic<T, F>(path: &Path, fill: F) -> Result<T, KiraError>
where
    F: FnOnce(&mut dyn Write) -> Result<T, KiraError>,
{
    let parent = parent_dir(path);
    fs::create_dir_all(&parent).map_err(|err| KiraError::Filesystem(err.to_string()))?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("kira-am");
    let temp = tempfile::Builder::new()
        .prefix(&format!(".{file_name}."))
        .suffix(".tmp")
        .tempfile_in(&parent)
        .map_err(|err| KiraError::Filesystem(err.to_string()))?;

    let value = {
        let mut writer = BufWriter::new(temp.as_file());
        let value = fill(&mut writer)?;
        writer
            .flush()
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        value
    };
    temp.as_file()
        .sync_all()
        .map_err(|err| KiraError::Filesystem(err.to_string()))?;
    temp.persist(path)
        .map_err(|err| KiraError::Filesystem(err.to_string()))?;
    Ok(value)
}

pub fn file_has_content(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}

/// Sibling path named `filtered_<file name>`.
pub fn filtered_path_for(output: &Utf8Path) -> Utf8PathBuf {
    let name = output.file_name().unwrap_or_default();
    match output.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent.join(format!("filtered_{name}")),
        _ => Utf8PathBuf::from(format!("filtered_{name}")),
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
