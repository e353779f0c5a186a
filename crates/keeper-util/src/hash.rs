//! SHA-256 digests over bytes, files, directory trees and value lists.

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::UtilError;

fn hex(hasher: Sha256) -> String {
    format!("{:x}", hasher.finalize())
}

/// Length-prefix `part` so adjacent parts cannot run together.
fn update_part(hasher: &mut Sha256, part: &[u8]) {
    hasher.update(u64::try_from(part.len()).unwrap_or(u64::MAX).to_le_bytes());
    hasher.update(part);
}

pub fn sha256_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex(hasher)
}

/// Digest of a file's contents, streamed.
///
/// # Errors
/// Returns an error if the file cannot be opened or read.
pub fn sha256_file(path: &Path) -> Result<String, UtilError> {
    let io_err = |source| UtilError::Io {
        path: path.display().to_string(),
        source,
    };
    let mut file = std::fs::File::open(path).map_err(io_err)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher).map_err(io_err)?;
    Ok(hex(hasher))
}

/// Digest of every file under `dir` with the given `extension`.
///
/// The file set comes from [`crate::fs::collect_files`], the same walk used
/// to package class directories. Files are taken in order of their
/// `/`-separated path relative to `dir`, and each path is hashed with its
/// contents, so a class moving to another package changes the digest even
/// when its bytes do not.
///
/// # Errors
/// Returns an error if `dir` cannot be walked or a file cannot be read.
pub fn sha256_dir(dir: &Path, extension: &str) -> Result<String, UtilError> {
    let mut files: Vec<(String, std::path::PathBuf)> = crate::fs::collect_files(dir, extension)?
        .into_iter()
        .map(|p| {
            let relative = p
                .strip_prefix(dir)
                .unwrap_or(&p)
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            (relative, p)
        })
        .collect();
    files.sort();

    let mut hasher = Sha256::new();
    for (relative, path) in &files {
        update_part(&mut hasher, relative.as_bytes());
        update_part(&mut hasher, sha256_file(path)?.as_bytes());
    }
    Ok(hex(hasher))
}

/// Digest of an ordered list of values.
pub fn sha256_multi(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        update_part(&mut hasher, part.as_bytes());
    }
    hex(hasher)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn empty_input_digest() {
        assert_eq!(
            sha256_bytes(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn file_digest_matches_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("r8.jar");
        fs::write(&file, b"PK\x03\x04").unwrap();
        assert_eq!(sha256_file(&file).unwrap(), sha256_bytes(b"PK\x03\x04"));
        assert!(sha256_file(&dir.path().join("missing.jar")).is_err());
    }

    #[test]
    fn dir_digest_ignores_creation_order() {
        let first = tempfile::tempdir().unwrap();
        fs::write(first.path().join("B.class"), b"b").unwrap();
        fs::write(first.path().join("A.class"), b"a").unwrap();

        let second = tempfile::tempdir().unwrap();
        fs::write(second.path().join("A.class"), b"a").unwrap();
        fs::write(second.path().join("B.class"), b"b").unwrap();

        assert_eq!(
            sha256_dir(first.path(), "class").unwrap(),
            sha256_dir(second.path(), "class").unwrap()
        );
    }

    #[test]
    fn dir_digest_sees_moved_class() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a")).unwrap();
        fs::create_dir_all(dir.path().join("b")).unwrap();
        fs::write(dir.path().join("a/Api.class"), b"x").unwrap();
        let before = sha256_dir(dir.path(), "class").unwrap();

        fs::rename(dir.path().join("a/Api.class"), dir.path().join("b/Api.class")).unwrap();
        assert_ne!(before, sha256_dir(dir.path(), "class").unwrap());
    }

    #[test]
    fn dir_digest_skips_other_files() {
        let dir = tempfile::tempdir().unwrap();
        let empty = sha256_dir(dir.path(), "class").unwrap();
        fs::write(dir.path().join("R.txt"), b"resources").unwrap();
        assert_eq!(sha256_dir(dir.path(), "class").unwrap(), empty);
    }

    #[test]
    fn dir_digest_sees_changes_under_glob_metacharacters() {
        let tmp = tempfile::tempdir().unwrap();
        let classes = tmp.path().join("proj[1]").join("cls*?");
        fs::create_dir_all(&classes).unwrap();
        fs::write(classes.join("Api.class"), b"v1").unwrap();
        let before = sha256_dir(&classes, "class").unwrap();

        fs::write(classes.join("Api.class"), b"v2-changed").unwrap();
        assert_ne!(before, sha256_dir(&classes, "class").unwrap());
    }

    #[test]
    fn multi_digest_is_ordered_and_unambiguous() {
        assert_ne!(sha256_multi(&["app", "test"]), sha256_multi(&["test", "app"]));
        assert_ne!(sha256_multi(&["ab", "c"]), sha256_multi(&["a", "bc"]));
    }
}
