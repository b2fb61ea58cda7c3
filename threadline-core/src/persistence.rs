//! File persistence helpers shared by the memory log and the thread index.
//!
//! Two primitives:
//! - [`write_atomically`] writes into a temporary file in the target's
//!   directory, syncs it, and renames it over the target. A crash at any
//!   point leaves either the old file or the new one, never a torn file.
//! - [`read_jsonl`] reads newline-delimited JSON, skipping (and counting)
//!   malformed lines instead of failing the whole load.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{Result, ThreadlineError};

/// Records read from a JSONL file plus the number of lines skipped.
#[derive(Debug)]
pub struct JsonlRead<T> {
    /// Successfully decoded records, in file order.
    pub records: Vec<T>,
    /// Lines that were not valid records.
    pub skipped: usize,
}

/// Replace `path` with whatever `write` produces, atomically.
///
/// The parent directory is created if missing.
///
/// # Errors
///
/// Returns [`ThreadlineError::Io`] if the temporary file cannot be created,
/// written, synced or renamed, or whatever error `write` returns. On error
/// the original file is untouched.
pub fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        write(&mut writer)?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| ThreadlineError::Io(e.error))?;
    Ok(())
}

/// Atomically replace `path` with one JSON line per item.
///
/// # Errors
///
/// Returns an error if an item fails to serialize or the file cannot be
/// written.
pub fn write_jsonl<T: Serialize>(path: &Path, items: &[T]) -> Result<()> {
    write_atomically(path, |out| {
        for item in items {
            serde_json::to_writer(&mut *out, item)?;
            out.write_all(b"\n")?;
        }
        Ok(())
    })
}

/// Append one JSON record as a single line and flush it.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn append_jsonl<T: Serialize>(file: &mut File, item: &T) -> Result<()> {
    let mut line = serde_json::to_vec(item)?;
    line.push(b'\n');
    file.write_all(&line)?;
    file.flush()?;
    Ok(())
}

/// Open `path` for appending, creating it (and its directory) if needed.
///
/// # Errors
///
/// Returns [`ThreadlineError::Io`] on filesystem failures.
pub fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

/// Read a JSONL file, skipping blank and malformed lines.
///
/// A missing file reads as empty.
///
/// # Errors
///
/// Returns [`ThreadlineError::Io`] if the file exists but cannot be read.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<JsonlRead<T>> {
    let mut bytes = Vec::new();
    match File::open(path) {
        Ok(mut file) => {
            file.read_to_end(&mut bytes)?;
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No file to read yet");
            return Ok(JsonlRead {
                records: Vec::new(),
                skipped: 0,
            });
        }
        Err(e) => return Err(e.into()),
    }

    let mut records = Vec::new();
    let mut skipped = 0;
    for (idx, line) in bytes.split(|&b| b == b'\n').enumerate() {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        match serde_json::from_slice::<T>(line) {
            Ok(record) => records.push(record),
            Err(e) => {
                skipped += 1;
                warn!(path = %path.display(), line = idx + 1, error = %e, "Skipping malformed record");
            }
        }
    }

    Ok(JsonlRead { records, skipped })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Row {
        n: u32,
    }

    #[test]
    fn jsonl_round_trip_skips_garbage() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("rows.jsonl");
        write_jsonl(&path, &[Row { n: 1 }, Row { n: 2 }]).expect("write");

        let mut file = open_append(&path).expect("open");
        file.write_all(b"{not json}\n\n").expect("garbage");
        append_jsonl(&mut file, &Row { n: 3 }).expect("append");

        let read: JsonlRead<Row> = read_jsonl(&path).expect("read");
        assert_eq!(read.records, vec![Row { n: 1 }, Row { n: 2 }, Row { n: 3 }]);
        assert_eq!(read.skipped, 1);
    }

    #[test]
    fn missing_file_reads_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let read: JsonlRead<Row> = read_jsonl(&dir.path().join("absent.jsonl")).expect("read");
        assert!(read.records.is_empty());
        assert_eq!(read.skipped, 0);
    }

    #[test]
    fn failed_write_leaves_original_intact() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("doc.json");
        fs::write(&path, b"original").expect("seed");

        let result = write_atomically(&path, |out| {
            out.write_all(b"half-writ")?;
            Err(ThreadlineError::Serialization("boom".into()))
        });
        assert!(result.is_err());
        assert_eq!(fs::read(&path).expect("read"), b"original");

        // No stray temp files survive the failure.
        let leftovers = fs::read_dir(dir.path()).expect("dir").count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn atomic_write_creates_parent_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested/deeper/doc.json");
        write_atomically(&path, |out| Ok(out.write_all(b"{}")?)).expect("write");
        assert_eq!(fs::read(&path).expect("read"), b"{}");
    }
}
