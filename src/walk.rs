//! Spec file discovery.
//!
//! Input paths may be files or directories; directories are walked
//! recursively for `*.http` and `*.hitspec` files.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

const EXTENSIONS: &[&str] = &["http", "hitspec"];

/// Expands `paths` to the sorted list of spec files. A missing path is
/// a configuration error; a directory without spec files contributes
/// nothing.
pub fn collect_spec_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if !path.exists() {
            return Err(Error::Config(format!("no such path: {}", path.display())));
        }
        if path.is_dir() {
            walk_dir(path, &mut files)?;
        } else {
            files.push(path.clone());
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

fn walk_dir(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            walk_dir(&path, files)?;
        } else if path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| EXTENSIONS.contains(&e))
            .unwrap_or(false)
        {
            files.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walks_directories_recursively() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("a.http"), "").unwrap();
        std::fs::write(dir.path().join("nested/b.hitspec"), "").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();

        let files = collect_spec_files(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("a.http"));
        assert!(files[1].ends_with("nested/b.hitspec"));
    }

    #[test]
    fn test_explicit_file_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("x.http");
        std::fs::write(&file, "").unwrap();
        let files = collect_spec_files(&[file.clone()]).unwrap();
        assert_eq!(files, vec![file]);
    }

    #[test]
    fn test_missing_path_is_config_error() {
        let err = collect_spec_files(&[PathBuf::from("/nope/missing.http")]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
