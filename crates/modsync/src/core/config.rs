//! Configuration types for the synchronizer

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::manifest::Side;
use crate::source::Location;

/// Default cache file name, relative to the pack folder
pub const DEFAULT_CACHE_FILE: &str = "modsync.json";

pub const DEFAULT_CURSEFORGE_API: &str = "https://api.curseforge.com/";

/// Transport and worker pool tuning
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Maximum silence on a response body before the request fails
    pub read_timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
    /// Size of the download worker pool
    pub max_concurrent_downloads: usize,
    /// Concurrent metadata fetches during the metadata phase
    pub max_concurrent_metadata: usize,
    /// Base URL of the CurseForge API, used for `metadata:curseforge` downloads
    pub curseforge_api_base: String,
    pub curseforge_api_key: Option<String>,
}

impl SyncConfig {
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_max_concurrent_downloads(mut self, workers: usize) -> Self {
        self.max_concurrent_downloads = workers.max(1);
        self
    }

    pub fn with_max_concurrent_metadata(mut self, workers: usize) -> Self {
        self.max_concurrent_metadata = workers.max(1);
        self
    }

    pub fn with_curseforge_api<S: Into<String>>(mut self, api_base: S) -> Self {
        self.curseforge_api_base = api_base.into();
        self
    }

    pub fn with_curseforge_api_key(mut self, api_key: Option<String>) -> Self {
        self.curseforge_api_key = api_key.filter(|key| !key.is_empty());
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(30),
            user_agent: concat!("modsync/", env!("CARGO_PKG_VERSION")).to_string(),
            max_concurrent_downloads: 10,
            max_concurrent_metadata: 10,
            curseforge_api_base: DEFAULT_CURSEFORGE_API.to_string(),
            curseforge_api_key: None,
        }
    }
}

/// What to synchronize and where
#[derive(Debug, Clone)]
pub struct UpdateOptions {
    pub pack_location: Location,
    pub pack_folder: PathBuf,
    pub cache_file: PathBuf,
    pub side: Side,
    /// MultiMC instance folder holding `mmc-pack.json`; no launcher check when unset
    pub launcher_folder: Option<PathBuf>,
}

impl UpdateOptions {
    pub fn new<P: Into<PathBuf>>(pack_location: Location, pack_folder: P) -> Self {
        Self {
            pack_location,
            pack_folder: pack_folder.into(),
            cache_file: PathBuf::from(DEFAULT_CACHE_FILE),
            side: Side::Client,
            launcher_folder: None,
        }
    }

    pub fn with_side(mut self, side: Side) -> Self {
        self.side = side;
        self
    }

    pub fn with_cache_file<P: Into<PathBuf>>(mut self, cache_file: P) -> Self {
        self.cache_file = cache_file.into();
        self
    }

    pub fn with_launcher_folder<P: Into<PathBuf>>(mut self, folder: P) -> Self {
        self.launcher_folder = Some(folder.into());
        self
    }

    /// Launcher instance folder; relative paths start at the pack folder
    pub fn launcher_path(&self) -> Option<PathBuf> {
        self.launcher_folder
            .as_ref()
            .map(|folder| self.pack_folder.join(folder))
    }

    /// Cache file path; relative names live inside the pack folder
    pub fn cache_path(&self) -> PathBuf {
        self.pack_folder.join(&self.cache_file)
    }

    pub fn pack_folder(&self) -> &Path {
        &self.pack_folder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_path_is_relative_to_pack_folder_unless_absolute() {
        let location = Location::parse("https://example.com/pack.toml").unwrap();
        let options = UpdateOptions::new(location.clone(), "/srv/pack");
        assert_eq!(options.cache_path(), PathBuf::from("/srv/pack/modsync.json"));

        let options = UpdateOptions::new(location, "/srv/pack").with_cache_file("/var/cache/pack.json");
        assert_eq!(options.cache_path(), PathBuf::from("/var/cache/pack.json"));
    }

    #[test]
    fn launcher_folder_is_relative_to_pack_folder() {
        let location = Location::parse("https://example.com/pack.toml").unwrap();
        let options = UpdateOptions::new(location, "/srv/instance/.minecraft");
        assert_eq!(options.launcher_path(), None);

        let options = options.with_launcher_folder("..");
        assert_eq!(
            options.launcher_path(),
            Some(PathBuf::from("/srv/instance/.minecraft/.."))
        );
    }

    #[test]
    fn empty_curseforge_key_counts_as_none() {
        let config = SyncConfig::default().with_curseforge_api_key(Some(String::new()));
        assert_eq!(config.curseforge_api_key, None);
        assert_eq!(config.curseforge_api_base, DEFAULT_CURSEFORGE_API);
    }

    #[test]
    fn worker_counts_never_drop_to_zero() {
        let config = SyncConfig::default()
            .with_max_concurrent_downloads(0)
            .with_max_concurrent_metadata(0);
        assert_eq!(config.max_concurrent_downloads, 1);
        assert_eq!(config.max_concurrent_metadata, 1);
        assert_eq!(SyncConfig::default().read_timeout, Duration::from_secs(30));
    }
}
