//! Tabular status projection.
//!
//! The projection is a copy of the source collection with one boolean
//! column per extractor identity, `true` where the checkpoint holds a
//! vector for that row. It exists for people and spreadsheets; the
//! checkpoint stays authoritative.

use sonara_core::util::files::atomic_write;
use sonara_core::{Error, ItemCollection, Result};
use std::collections::HashMap;
use std::path::Path;

use crate::checkpoint::CheckpointRecord;

const STATUS_SUFFIX: &str = "_extracted";

/// Write the projection for `record` to `path`.
///
/// An existing column with the same name is replaced in place; otherwise the
/// column is appended. Status columns that other extractor identities left
/// in a previous projection at `path` are kept, matched by `id_column`.
pub fn write_status(
    path: &Path,
    id_column: &str,
    collection: &ItemCollection,
    record: &CheckpointRecord,
) -> Result<()> {
    let column = record.identity().status_column();
    let headers = collection.headers();
    let existing = headers.iter().position(|h| *h == column);
    let carried = previous_status_columns(path, id_column, |name| {
        name != column && !headers.iter().any(|h| h == name)
    });

    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header_row: Vec<&str> = headers.iter().map(String::as_str).collect();
    header_row.extend(carried.iter().map(|(name, _)| name.as_str()));
    if existing.is_none() {
        header_row.push(&column);
    }
    writer.write_record(&header_row)?;

    for row in 0..collection.len() {
        let flag = if record.is_extracted(row) { "true" } else { "false" };
        let Some(source) = collection.record(row) else {
            continue;
        };
        let id = collection.id(row).unwrap_or_default();
        let mut fields: Vec<&str> = source.iter().collect();
        fields.resize(headers.len(), "");
        for (_, flags) in &carried {
            fields.push(flags.get(id).map_or("false", String::as_str));
        }
        match existing {
            Some(index) => fields[index] = flag,
            None => fields.push(flag),
        }
        writer.write_record(&fields)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| Error::operation(format!("Failed to flush status projection: {e}")))?;
    atomic_write(path, &bytes)?;

    tracing::debug!(
        path = %path.display(),
        column = %column,
        kept = carried.len(),
        "Wrote status projection"
    );
    Ok(())
}

/// Status columns of a previous projection, in file order, keyed by id.
///
/// Only `*_extracted` columns accepted by `keep` are returned. A missing or
/// unreadable projection yields nothing.
fn previous_status_columns(
    path: &Path,
    id_column: &str,
    keep: impl Fn(&str) -> bool,
) -> Vec<(String, HashMap<String, String>)> {
    if !path.exists() {
        return Vec::new();
    }
    match read_status_columns(path, id_column, keep) {
        Ok(columns) => columns,
        Err(e) => {
            tracing::debug!(error = %e, "Previous status projection not readable; starting over");
            Vec::new()
        }
    }
}

fn read_status_columns(
    path: &Path,
    id_column: &str,
    keep: impl Fn(&str) -> bool,
) -> Result<Vec<(String, HashMap<String, String>)>> {
    let file = std::fs::File::open(path).map_err(|e| Error::io_with_path(e, path))?;
    let mut reader = csv::Reader::from_reader(file);
    let headers = reader.headers()?.clone();

    let id_index = headers
        .iter()
        .position(|h| h == id_column)
        .ok_or_else(|| Error::not_found(format!("Column '{id_column}' not in {}", path.display())))?;
    let indices: Vec<usize> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| h.ends_with(STATUS_SUFFIX) && keep(*h))
        .map(|(i, _)| i)
        .collect();

    let mut columns: Vec<(String, HashMap<String, String>)> = indices
        .iter()
        .map(|&i| (headers[i].to_string(), HashMap::new()))
        .collect();
    for record in reader.records() {
        let record = record?;
        let id = record.get(id_index).unwrap_or_default().trim();
        for (&index, (_, flags)) in indices.iter().zip(columns.iter_mut()) {
            let value = record.get(index).unwrap_or_default().trim().to_string();
            flags.insert(id.to_string(), value);
        }
    }
    Ok(columns)
}

/// Read the status flags of `column` from a projection, keyed by identifier.
pub fn read_status(path: &Path, id_column: &str, column: &str) -> Result<HashMap<String, bool>> {
    let file = std::fs::File::open(path).map_err(|e| Error::io_with_path(e, path))?;
    let mut reader = csv::Reader::from_reader(file);
    let headers = reader.headers()?.clone();

    let find = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| Error::not_found(format!("Column '{name}' not in {}", path.display())))
    };
    let id_index = find(id_column)?;
    let flag_index = find(column)?;

    let mut flags = HashMap::new();
    for record in reader.records() {
        let record = record?;
        let id = record.get(id_index).unwrap_or_default().trim().to_string();
        let flag = record
            .get(flag_index)
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));
        flags.insert(id, flag);
    }
    Ok(flags)
}

/// Compare a previous projection with the checkpoint.
///
/// Returns the number of identifiers whose flag disagrees. Disagreement is
/// logged but never fatal. A missing projection counts as no disagreement.
pub fn reconcile(path: &Path, id_column: &str, record: &CheckpointRecord) -> usize {
    if !path.exists() {
        return 0;
    }
    let column = record.identity().status_column();
    let flags = match read_status(path, id_column, &column) {
        Ok(flags) => flags,
        Err(e) => {
            tracing::debug!(error = %e, "Status projection not usable for reconciliation");
            return 0;
        }
    };

    let checkpoint: HashMap<&str, bool> = record
        .iter()
        .map(|(_, entry)| (entry.id.as_str(), entry.extracted()))
        .collect();

    let mismatches = flags
        .iter()
        .filter(|(id, flag)| checkpoint.get(id.as_str()).copied().unwrap_or(false) != **flag)
        .count();

    if mismatches > 0 {
        tracing::warn!(
            mismatches,
            column = %column,
            "Status projection disagrees with checkpoint; checkpoint wins"
        );
    }
    mismatches
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::checkpoint::{CheckpointIdentity, RowOutcome};
    use sonara_core::{FeatureVector, LoadOptions};
    use tempfile::tempdir;

    fn collection(csv: &str) -> ItemCollection {
        ItemCollection::from_reader(csv.as_bytes(), &LoadOptions::default()).unwrap()
    }

    fn record() -> CheckpointRecord {
        let mut record = CheckpointRecord::new(CheckpointIdentity::new("basic", "color"));
        record
            .merge([
                RowOutcome::extracted(0, "a", FeatureVector::new(vec![1.0]).unwrap()),
                RowOutcome::absent(1, "b"),
            ])
            .unwrap();
        record
    }

    #[test]
    fn test_appends_status_column() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("status.csv");
        let items = collection("id,name\na,One\nb,Two\nc,Three\n");

        write_status(&path, "id", &items, &record()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "id,name,basic_color_extracted");
        assert_eq!(lines[1], "a,One,true");
        assert_eq!(lines[2], "b,Two,false");
        assert_eq!(lines[3], "c,Three,false");
    }

    #[test]
    fn test_replaces_existing_column() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("status.csv");
        let items = collection("id,basic_color_extracted,name\na,false,One\nb,true,Two\n");

        write_status(&path, "id", &items, &record()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "id,basic_color_extracted,name");
        assert_eq!(lines[1], "a,true,One");
        assert_eq!(lines[2], "b,false,Two");
    }

    #[test]
    fn test_read_and_reconcile() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("status.csv");
        let items = collection("id,name\na,One\nb,Two\n");
        let record = record();

        write_status(&path, "id", &items, &record).unwrap();
        let flags = read_status(&path, "id", "basic_color_extracted").unwrap();
        assert!(flags["a"]);
        assert!(!flags["b"]);
        assert_eq!(reconcile(&path, "id", &record), 0);

        let empty = CheckpointRecord::new(CheckpointIdentity::new("basic", "color"));
        assert_eq!(reconcile(&path, "id", &empty), 1);
    }

    #[test]
    fn test_keeps_other_identity_columns() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("status.csv");
        let items = collection("id,name\na,One\nb,Two\nc,Three\n");
        std::fs::write(
            &path,
            "id,name,deep_resnet50_extracted,notes\nb,Two,true,x\na,One,false,y\n",
        )
        .unwrap();

        write_status(&path, "id", &items, &record()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "id,name,deep_resnet50_extracted,basic_color_extracted");
        assert_eq!(lines[1], "a,One,false,true");
        assert_eq!(lines[2], "b,Two,true,false");
        assert_eq!(lines[3], "c,Three,false,false");
    }

    #[test]
    fn test_unreadable_previous_projection_is_replaced() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("status.csv");
        let items = collection("id,name\na,One\n");
        std::fs::write(&path, "key,deep_resnet50_extracted\na,true\n").unwrap();

        write_status(&path, "id", &items, &record()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().next().unwrap(), "id,name,basic_color_extracted");
    }

    #[test]
    fn test_read_missing_column() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("status.csv");
        std::fs::write(&path, "id,name\na,One\n").unwrap();

        let err = read_status(&path, "id", "deep_resnet50_extracted").unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(reconcile(&path, "id", &record()), 0);
    }
}
