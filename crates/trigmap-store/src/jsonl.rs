//! JSONL snapshots: one `kind`-tagged record per line.
//!
//! The portable interchange format for a monitoring-store snapshot. Blank
//! lines and `#` comments are skipped on read; writes go through a temp file
//! and rename so readers never observe a half-written snapshot.

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use trigmap_kernel::{
    DependencyEdge, Event, HistoryPoint, Host, HostGroup, IconMap, Image, Item, Maintenance,
    Sysmap, Trigger, User, UserMacro,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreRecord {
    Host(Host),
    HostGroup(HostGroup),
    Item(Item),
    Trigger(Trigger),
    Dependency(DependencyEdge),
    Event(Event),
    Maintenance(Maintenance),
    Map(Sysmap),
    IconMap(IconMap),
    Image(Image),
    UserMacro(UserMacro),
    History(HistoryPoint),
    User(User),
}

pub fn read_records(reader: impl BufRead) -> Result<Vec<StoreRecord>, JsonlError> {
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = line.map_err(|e| JsonlError::Io(line_no, e.to_string()))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let record = serde_json::from_str(trimmed)
            .map_err(|e| JsonlError::Parse(line_no, e.to_string()))?;
        records.push(record);
    }
    Ok(records)
}

pub fn write_records(writer: &mut impl Write, records: &[StoreRecord]) -> Result<(), JsonlError> {
    for record in records {
        let line =
            serde_json::to_string(record).map_err(|e| JsonlError::Serialize(e.to_string()))?;
        writeln!(writer, "{line}").map_err(|e| JsonlError::Io(0, e.to_string()))?;
    }
    Ok(())
}

pub fn read_records_from_path(path: impl AsRef<Path>) -> Result<Vec<StoreRecord>, JsonlError> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| io_error(path, e))?;
    reject_corrupt_bytes(path, &bytes)?;
    read_records(BufReader::new(bytes.as_slice()))
}

/// Replace the snapshot at `path` atomically (temp file, fsync, rename,
/// directory fsync).
pub fn write_records_to_path(
    path: impl AsRef<Path>,
    records: &[StoreRecord],
) -> Result<(), JsonlError> {
    let path = path.as_ref();
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(parent) = parent {
        fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
    }

    let tmp_path = staging_path(path);
    if let Err(error) = write_staged(&tmp_path, records) {
        let _ = fs::remove_file(&tmp_path);
        return Err(error);
    }
    if let Err(error) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(JsonlError::Io(
            0,
            format!("{} -> {}: {error}", tmp_path.display(), path.display()),
        ));
    }

    if let Some(parent) = parent {
        File::open(parent)
            .and_then(|dir| dir.sync_all())
            .map_err(|e| io_error(parent, e))?;
    }
    Ok(())
}

fn write_staged(tmp_path: &Path, records: &[StoreRecord]) -> Result<(), JsonlError> {
    let file = File::create(tmp_path).map_err(|e| io_error(tmp_path, e))?;
    let mut writer = BufWriter::new(file);
    write_records(&mut writer, records)?;
    let file = writer
        .into_inner()
        .map_err(|e| JsonlError::Io(0, format!("{}: {e}", tmp_path.display())))?;
    file.sync_all().map_err(|e| io_error(tmp_path, e))
}

fn staging_path(path: &Path) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let mut staged: OsString = path.as_os_str().to_os_string();
    staged.push(format!(".tmp.{}.{nanos}", std::process::id()));
    PathBuf::from(staged)
}

fn reject_corrupt_bytes(path: &Path, bytes: &[u8]) -> Result<(), JsonlError> {
    if bytes.contains(&0) {
        return Err(JsonlError::Corrupt(format!(
            "{}: contains NUL byte(s)",
            path.display()
        )));
    }
    if std::str::from_utf8(bytes).is_err() {
        return Err(JsonlError::Corrupt(format!(
            "{}: contains non-UTF-8 byte sequence(s)",
            path.display()
        )));
    }
    Ok(())
}

fn io_error(path: &Path, err: std::io::Error) -> JsonlError {
    JsonlError::Io(0, format!("{}: {err}", path.display()))
}

#[derive(Debug, thiserror::Error)]
pub enum JsonlError {
    #[error("line {0}: I/O error: {1}")]
    Io(usize, String),

    #[error("line {0}: parse error: {1}")]
    Parse(usize, String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("corrupted snapshot: {0}")]
    Corrupt(String),
}
