//! Full-document snapshot serialization.
//!
//! One format serves both concerns: the on-disk save file and the
//! `docSync` payload that bootstraps joiners. A snapshot is the entire
//! character sequence in document order, tombstones and sentinels
//! included, as self-describing JSON.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::id::CharId;
use crate::woot::Document;

/// Errors from reading or writing snapshots.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot io: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed snapshot: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("snapshot missing the {0} sentinel")]
    MissingSentinel(&'static str),
}

/// Write the entire sequence to `path`, tombstones and sentinels included.
pub fn save(path: impl AsRef<Path>, doc: &Document) -> Result<(), SnapshotError> {
    let json = serde_json::to_string_pretty(doc)?;
    fs::write(path, json)?;
    Ok(())
}

/// Reconstruct a document from `path`.
///
/// Tombstones and ids are preserved; a snapshot minted by a different
/// site remains valid locally, and the loading replica keeps generating
/// ids under its own site once one is assigned.
pub fn load(path: impl AsRef<Path>) -> Result<Document, SnapshotError> {
    let raw = fs::read_to_string(path)?;
    let mut doc: Document = serde_json::from_str(&raw)?;
    validate(&doc)?;
    doc.rebase_clock();
    Ok(doc)
}

fn validate(doc: &Document) -> Result<(), SnapshotError> {
    let chars = doc.characters();
    if chars.first().map(|c| &c.id) != Some(&CharId::Start) {
        return Err(SnapshotError::MissingSentinel("start"));
    }
    if chars.last().map(|c| &c.id) != Some(&CharId::End) {
        return Err(SnapshotError::MissingSentinel("end"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_doc() -> Document {
        let mut doc = Document::new();
        doc.set_site_id(1);
        for (i, ch) in "cat\ndog".chars().enumerate() {
            doc.insert(i + 1, ch).unwrap();
        }
        // Leave a tombstone behind.
        doc.delete(4);
        doc
    }

    #[test]
    fn save_then_load_roundtrips_characters_exactly() {
        let doc = sample_doc();
        let file = tempfile::NamedTempFile::new().unwrap();

        save(file.path(), &doc).unwrap();
        let loaded = load(file.path()).unwrap();

        assert_eq!(loaded.characters(), doc.characters());
        assert_eq!(loaded.content(), "catdog");
        assert_eq!(loaded.length(), doc.length());
    }

    #[test]
    fn loaded_snapshot_rebases_the_clock_for_its_site() {
        let doc = sample_doc();
        let file = tempfile::NamedTempFile::new().unwrap();
        save(file.path(), &doc).unwrap();

        let mut loaded = load(file.path()).unwrap();
        loaded.set_site_id(1);
        let (character, _) = loaded.insert(1, '!').unwrap();
        // Seven characters were minted by site 1 before the save.
        assert_eq!(character.id, CharId::site(1, 8));
    }

    #[test]
    fn load_rejects_a_snapshot_without_sentinels() {
        let file = tempfile::NamedTempFile::new().unwrap();
        fs::write(
            file.path(),
            r#"{"characters":[{"id":"1.1","value":"a","visible":true,"prev_id":"start","next_id":"end"}]}"#,
        )
        .unwrap();
        assert!(matches!(
            load(file.path()),
            Err(SnapshotError::MissingSentinel("start"))
        ));
    }

    #[test]
    fn load_rejects_garbage() {
        let file = tempfile::NamedTempFile::new().unwrap();
        fs::write(file.path(), "not json").unwrap();
        assert!(matches!(
            load(file.path()),
            Err(SnapshotError::Malformed(_))
        ));
    }

    #[test]
    fn load_surfaces_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.json");
        assert!(matches!(load(missing), Err(SnapshotError::Io(_))));
    }
}
