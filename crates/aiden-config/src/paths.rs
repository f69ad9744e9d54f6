use std::path::{Path, PathBuf};

/// Base directory for everything the host writes to disk.
///
/// `ConfigPaths::new()` resolves `~/.aiden`; tests use `ConfigPaths::with_base()`
/// with an isolated directory.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    base: PathBuf,
}

impl ConfigPaths {
    /// Create paths rooted at `~/.aiden`. Fails when the home directory
    /// cannot be determined.
    pub fn new() -> anyhow::Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?;
        Ok(Self {
            base: home.join(".aiden"),
        })
    }

    pub fn with_base(base: PathBuf) -> Self {
        Self { base }
    }

    pub fn config_dir(&self) -> &Path {
        &self.base
    }

    pub fn config_path(&self) -> PathBuf {
        self.base.join("config.toml")
    }

    pub fn database_path(&self) -> PathBuf {
        self.base.join("aiden.db")
    }

    pub fn token_path(&self) -> PathBuf {
        self.base.join("auth_token")
    }

    pub fn pid_path(&self) -> PathBuf {
        self.base.join("aidend.pid")
    }

    pub fn ensure_config_dir(&self) -> anyhow::Result<PathBuf> {
        if !self.base.exists() {
            std::fs::create_dir_all(&self.base)?;
        }
        Ok(self.base.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_accessors_return_expected_filenames() {
        let base = PathBuf::from("/base");
        let paths = ConfigPaths::with_base(base.clone());

        assert_eq!(paths.config_dir(), base.as_path());
        assert_eq!(paths.config_path(), base.join("config.toml"));
        assert_eq!(paths.database_path(), base.join("aiden.db"));
        assert_eq!(paths.token_path(), base.join("auth_token"));
        assert_eq!(paths.pid_path(), base.join("aidend.pid"));
    }

    #[test]
    fn ensure_config_dir_creates_nested_directory() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("nested").join("aiden");
        let paths = ConfigPaths::with_base(base.clone());

        assert!(!base.exists());
        assert_eq!(paths.ensure_config_dir().unwrap(), base);
        assert!(base.exists());
        // second call is a no-op
        paths.ensure_config_dir().unwrap();
    }

    #[test]
    fn new_resolves_under_home() {
        let paths = ConfigPaths::new().unwrap();
        assert!(paths.config_dir().ends_with(".aiden"));
    }
}
