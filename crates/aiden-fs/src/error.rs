#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("Path not found: {0}")]
    NotFound(String),
    #[error("Not a directory: {0}")]
    NotADirectory(String),
    #[error("Binary file cannot be read as text: {0}")]
    Binary(String),
    #[error("File too large: {size} bytes (max {max} bytes)")]
    FileTooLarge { size: u64, max: u64 },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FsError {
    pub fn error_code(&self) -> &'static str {
        match self {
            FsError::NotFound(_) => "FS_NOT_FOUND",
            FsError::NotADirectory(_) => "FS_NOT_A_DIRECTORY",
            FsError::Binary(_) => "FS_BINARY_FILE",
            FsError::FileTooLarge { .. } => "FS_FILE_TOO_LARGE",
            FsError::Io(_) => "FS_IO_ERROR",
        }
    }

    pub(crate) fn from_io(err: std::io::Error, path: &std::path::Path) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            FsError::NotFound(path.display().to_string())
        } else {
            FsError::Io(err)
        }
    }
}
