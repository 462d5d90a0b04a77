//! Whole-file replacement.
//!
//! New contents go to a temp file in the target's directory, are synced, then
//! renamed over the target. A reader sees either the old file or the new one;
//! if anything fails before the rename the original is left as it was and the
//! temp file is removed on drop.

use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

use crate::error::{MetaError, Result};

pub fn replace_file(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    if let Ok(meta) = fs::metadata(path) {
        tmp.as_file().set_permissions(meta.permissions())?;
    }

    tmp.persist(path).map_err(|e| MetaError::WriteAtomicity {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    tracing::trace!(file = %path.display(), bytes = contents.len(), "replaced");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn replaces_existing_contents() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("photo.jpg");
        fs::write(&path, b"old").unwrap();

        replace_file(&path, b"new contents").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"new contents");
    }

    #[test]
    fn leaves_no_temp_files_behind() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("photo.jpg");
        fs::write(&path, b"old").unwrap();

        replace_file(&path, b"new").unwrap();

        let names: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec!["photo.jpg"]);
    }

    #[test]
    fn creates_missing_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("sidecar.xmp");

        replace_file(&path, b"<x/>").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"<x/>");
    }

    #[test]
    fn missing_directory_is_io_error_and_creates_nothing() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nope").join("photo.jpg");

        let err = replace_file(&path, b"x").unwrap_err();

        assert!(matches!(err, MetaError::Io(_)));
        assert!(!path.exists());
    }
}
