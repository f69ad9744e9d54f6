use crate::FsError;
use aiden_proto::{DirEntry, EntryKind};
use std::path::Path;

/// List a directory: directories first, then by name.
pub fn read_dir(path: &Path) -> Result<Vec<DirEntry>, FsError> {
    let metadata = std::fs::metadata(path).map_err(|e| FsError::from_io(e, path))?;
    if !metadata.is_dir() {
        return Err(FsError::NotADirectory(path.display().to_string()));
    }

    let mut entries = Vec::new();
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let metadata = entry.metadata()?;
        let kind = if file_type.is_symlink() {
            EntryKind::Symlink
        } else if metadata.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        let modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64);

        entries.push(DirEntry {
            name: entry.file_name().to_string_lossy().to_string(),
            kind,
            size: metadata.is_file().then(|| metadata.len()),
            modified,
        });
    }
    entries.sort_by(|a, b| {
        let dir_order = |e: &DirEntry| if e.kind == EntryKind::Directory { 0 } else { 1 };
        dir_order(a).cmp(&dir_order(b)).then(a.name.cmp(&b.name))
    });
    Ok(entries)
}

pub fn exists(path: &Path) -> bool {
    path.exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn directories_sort_before_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.txt"), "bb").unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        fs::create_dir(dir.path().join("zeta")).unwrap();

        let entries = read_dir(dir.path()).unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "a.txt", "b.txt"]);
        assert_eq!(entries[0].kind, EntryKind::Directory);
        assert_eq!(entries[0].size, None);
        assert_eq!(entries[2].size, Some(2));
    }

    #[test]
    fn listing_a_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("f.txt");
        fs::write(&file, "").unwrap();
        assert!(matches!(read_dir(&file), Err(FsError::NotADirectory(_))));
        assert!(matches!(
            read_dir(&dir.path().join("missing")),
            Err(FsError::NotFound(_))
        ));
    }

    #[test]
    fn exists_reports_presence() {
        let dir = TempDir::new().unwrap();
        assert!(exists(dir.path()));
        assert!(!exists(&dir.path().join("ghost")));
    }
}
