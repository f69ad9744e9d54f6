use crate::FsError;
use std::path::Path;

/// Default max file size: 10 MB
const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Read a UTF-8 text file with a default 10 MB size limit.
pub fn read_file(path: &Path) -> Result<String, FsError> {
    read_file_with_limit(path, DEFAULT_MAX_FILE_SIZE)
}

pub fn read_file_with_limit(path: &Path, max_size: u64) -> Result<String, FsError> {
    let metadata = std::fs::metadata(path).map_err(|e| FsError::from_io(e, path))?;
    let size = metadata.len();
    if size > max_size {
        return Err(FsError::FileTooLarge {
            size,
            max: max_size,
        });
    }

    let bytes = std::fs::read(path).map_err(|e| FsError::from_io(e, path))?;
    // NUL in the first 8 KiB marks the file as binary
    if bytes.iter().take(8192).any(|&b| b == 0) {
        return Err(FsError::Binary(path.display().to_string()));
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn read_text_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hello.txt");
        fs::write(&path, "hello world").unwrap();
        assert_eq!(read_file(&path).unwrap(), "hello world");
    }

    #[test]
    fn read_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let result = read_file(&dir.path().join("nope.txt"));
        assert!(matches!(result, Err(FsError::NotFound(_))));
    }

    #[test]
    fn read_binary_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("binary.bin");
        fs::write(&path, [0u8, 1, 2, 3]).unwrap();
        let err = read_file(&path).unwrap_err();
        assert_eq!(err.error_code(), "FS_BINARY_FILE");
    }

    #[test]
    fn read_file_too_large() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.txt");
        fs::write(&path, "x".repeat(200)).unwrap();
        assert!(matches!(
            read_file_with_limit(&path, 100),
            Err(FsError::FileTooLarge { size: 200, max: 100 })
        ));
        assert!(read_file_with_limit(&path, 200).is_ok());
    }

    #[test]
    fn read_utf8_lossy() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mixed.txt");
        fs::write(&path, [0x48, 0x69, 0xFF]).unwrap();
        assert_eq!(read_file(&path).unwrap(), "Hi\u{FFFD}");
    }
}
