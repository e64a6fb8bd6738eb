use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::idgate::{config::GateConfig, store::FileStore};

/// Arguments shared by every subcommand.
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub api_url: String,
    pub store_path: PathBuf,
    pub timeout: Option<Duration>,
}

/// `$HOME/.idgate/session.json`, when a home directory is known.
#[must_use]
pub fn default_store_path() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .filter(|home| !home.is_empty())
        .map(|home| PathBuf::from(home).join(".idgate").join("session.json"))
}

impl GlobalArgs {
    #[must_use]
    pub fn new(api_url: String, store_path: PathBuf) -> Self {
        Self {
            api_url,
            store_path,
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// # Errors
    /// Returns an error if the API URL is invalid.
    pub fn config(&self) -> Result<GateConfig> {
        let config = GateConfig::new(&self.api_url)
            .with_context(|| format!("invalid --api-url {}", self.api_url))?;
        Ok(match self.timeout {
            Some(timeout) => config.with_request_timeout(timeout),
            None => config,
        })
    }

    /// # Errors
    /// Returns an error if the session file cannot be opened.
    pub fn open_store(&self) -> Result<Arc<FileStore>> {
        let store = FileStore::open(&self.store_path)
            .map_err(|err| anyhow!("cannot open {}: {err}", self.store_path.display()))?;
        Ok(Arc::new(store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_args() -> Result<()> {
        let args = GlobalArgs::new(
            "https://api.gemnet.lk".to_string(),
            PathBuf::from("/tmp/session.json"),
        );
        assert_eq!(args.api_url, "https://api.gemnet.lk");
        assert_eq!(args.timeout, None);
        assert_eq!(args.config()?.request_timeout(), Duration::from_secs(30));
        Ok(())
    }

    #[test]
    fn test_timeout_overrides_request_timeout() -> Result<()> {
        let args = GlobalArgs::new(
            "http://localhost:9091".to_string(),
            PathBuf::from("/tmp/session.json"),
        )
        .with_timeout(Some(Duration::from_secs(5)));
        assert_eq!(args.config()?.request_timeout(), Duration::from_secs(5));
        Ok(())
    }

    #[test]
    fn test_invalid_url() {
        let args = GlobalArgs::new("ftp://gemnet.lk".to_string(), PathBuf::from("/tmp/s.json"));
        assert!(args.config().is_err());
    }

    #[test]
    fn test_default_store_path() {
        temp_env::with_var("HOME", Some("/home/nimal"), || {
            assert_eq!(
                default_store_path(),
                Some(PathBuf::from("/home/nimal/.idgate/session.json"))
            );
        });
        temp_env::with_var("HOME", None::<&str>, || {
            assert_eq!(default_store_path(), None);
        });
    }

    #[test]
    fn test_open_store_creates_parent() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let args = GlobalArgs::new(
            "http://localhost:9091".to_string(),
            dir.path().join("nested").join("session.json"),
        );
        args.open_store()?;
        assert!(dir.path().join("nested").is_dir());
        Ok(())
    }
}
