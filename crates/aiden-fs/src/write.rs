use crate::FsError;
use std::path::Path;

/// Write a text file, creating missing parent directories.
pub fn write_file(path: &Path, content: &str) -> Result<(), FsError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, content)?;
    tracing::debug!(path = %path.display(), bytes = content.len(), "file written");
    Ok(())
}

pub fn mkdir(path: &Path, recursive: bool) -> Result<(), FsError> {
    if recursive {
        std::fs::create_dir_all(path)?;
    } else {
        std::fs::create_dir(path).map_err(|e| FsError::from_io(e, path))?;
    }
    Ok(())
}

/// Remove a file or a whole directory tree. Missing paths are not an error.
pub fn remove(path: &Path) -> Result<(), FsError> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    if metadata.is_dir() {
        std::fs::remove_dir_all(path)?;
    } else {
        std::fs::remove_file(path)?;
    }
    tracing::debug!(path = %path.display(), "path removed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read_file;
    use tempfile::TempDir;

    #[test]
    fn write_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a").join("b").join("c.txt");
        write_file(&path, "deep").unwrap();
        assert_eq!(read_file(&path).unwrap(), "deep");
    }

    #[test]
    fn mkdir_non_recursive_needs_parent() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("x").join("y");
        assert!(mkdir(&nested, false).is_err());
        mkdir(&nested, true).unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn remove_deletes_trees_and_tolerates_missing() {
        let dir = TempDir::new().unwrap();
        let tree = dir.path().join("tree");
        write_file(&tree.join("inner").join("f.txt"), "x").unwrap();
        remove(&tree).unwrap();
        assert!(!tree.exists());
        remove(&tree).unwrap();
    }
}
