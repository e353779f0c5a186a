//! Deterministic jar reading and writing.
//!
//! Jars written here are byte-for-byte reproducible: entries are sorted by
//! name, every entry carries the DOS epoch (1980-01-01) as its timestamp and
//! `0644` permissions, and no platform-dependent extra fields are emitted.

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use crate::error::UtilError;

fn jar_err(path: &Path, e: impl std::fmt::Display) -> UtilError {
    UtilError::Jar {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}

/// A set of jar entries keyed by entry name, where the first insert wins.
#[derive(Debug, Default, Clone)]
pub struct JarEntries {
    entries: BTreeMap<String, Vec<u8>>,
}

impl JarEntries {
    /// Create an empty entry set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry unless one with the same name already exists.
    ///
    /// Returns `false` when the name was already taken; the existing bytes
    /// are kept.
    pub fn insert(&mut self, name: &str, bytes: Vec<u8>) -> bool {
        match self.entries.entry(name.to_owned()) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(bytes);
                true
            }
            std::collections::btree_map::Entry::Occupied(_) => false,
        }
    }

    /// Bytes of the named entry, if present.
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize the entries into jar bytes.
    ///
    /// # Errors
    /// Returns an error if the zip encoder fails.
    pub fn to_bytes(&self, label: &Path) -> Result<Vec<u8>, UtilError> {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default())
            .unix_permissions(0o644);

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, bytes) in &self.entries {
            writer
                .start_file(name.as_str(), options)
                .map_err(|e| jar_err(label, e))?;
            writer.write_all(bytes).map_err(|e| jar_err(label, e))?;
        }
        let cursor = writer.finish().map_err(|e| jar_err(label, e))?;
        Ok(cursor.into_inner())
    }

    /// Write the entries to `path` as a deterministic jar.
    ///
    /// # Errors
    /// Returns an error if encoding fails or the file cannot be written.
    pub fn write_to(&self, path: &Path) -> Result<(), UtilError> {
        let bytes = self.to_bytes(path)?;
        crate::fs::write_atomic(path, &bytes)
    }
}

/// Read every file entry of the jar at `path`, in archive order.
///
/// Directory entries are skipped.
///
/// # Errors
/// Returns an error if the file cannot be opened or is not a valid zip.
pub fn read_entries(path: &Path) -> Result<Vec<(String, Vec<u8>)>, UtilError> {
    let file = std::fs::File::open(path).map_err(|source| UtilError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mut archive = ZipArchive::new(file).map_err(|e| jar_err(path, e))?;

    let mut out = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(|e| jar_err(path, e))?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_owned();
        let mut bytes = Vec::new();
        entry
            .read_to_end(&mut bytes)
            .map_err(|e| jar_err(path, format!("{name}: {e}")))?;
        out.push((name, bytes));
    }
    Ok(out)
}

/// List the file entry names of the jar at `path`, in archive order.
///
/// # Errors
/// Returns an error if the file cannot be opened or is not a valid zip.
pub fn entry_names(path: &Path) -> Result<Vec<String>, UtilError> {
    Ok(read_entries(path)?
        .into_iter()
        .map(|(name, _)| name)
        .collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn first_insert_wins() {
        let mut entries = JarEntries::new();
        assert!(entries.insert("com/example/Api.class", b"first".to_vec()));
        assert!(!entries.insert("com/example/Api.class", b"second".to_vec()));
        assert_eq!(entries.get("com/example/Api.class"), Some(&b"first"[..]));
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn written_entries_are_sorted() {
        let tmp = tempfile::tempdir().unwrap();
        let jar = tmp.path().join("out.jar");
        let mut entries = JarEntries::new();
        entries.insert("z/Last.class", b"z".to_vec());
        entries.insert("a/First.class", b"a".to_vec());
        entries.write_to(&jar).unwrap();

        assert_eq!(
            entry_names(&jar).unwrap(),
            vec!["a/First.class".to_owned(), "z/Last.class".to_owned()]
        );
    }

    #[test]
    fn insertion_order_does_not_change_bytes() {
        let mut forward = JarEntries::new();
        forward.insert("a/A.class", b"aaaa".to_vec());
        forward.insert("b/B.class", b"bbbb".to_vec());

        let mut reverse = JarEntries::new();
        reverse.insert("b/B.class", b"bbbb".to_vec());
        reverse.insert("a/A.class", b"aaaa".to_vec());

        let label = Path::new("test.jar");
        assert_eq!(
            forward.to_bytes(label).unwrap(),
            reverse.to_bytes(label).unwrap()
        );
    }

    #[test]
    fn read_entries_returns_content() {
        let tmp = tempfile::tempdir().unwrap();
        let jar = tmp.path().join("lib.jar");
        let mut entries = JarEntries::new();
        entries.insert("okio/Buffer.class", vec![0xCA, 0xFE, 0xBA, 0xBE]);
        entries.write_to(&jar).unwrap();

        let read = read_entries(&jar).unwrap();
        assert_eq!(
            read,
            vec![("okio/Buffer.class".to_owned(), vec![0xCA, 0xFE, 0xBA, 0xBE])]
        );
    }

    #[test]
    fn empty_jar_is_readable() {
        let tmp = tempfile::tempdir().unwrap();
        let jar = tmp.path().join("empty.jar");
        JarEntries::new().write_to(&jar).unwrap();
        assert!(read_entries(&jar).unwrap().is_empty());
    }

    #[test]
    fn read_entries_rejects_non_zip() {
        let tmp = tempfile::tempdir().unwrap();
        let jar = tmp.path().join("broken.jar");
        std::fs::write(&jar, b"not a zip").unwrap();
        let err = read_entries(&jar).unwrap_err().to_string();
        assert!(err.contains("cannot process jar"), "error was: {err}");
    }
}
