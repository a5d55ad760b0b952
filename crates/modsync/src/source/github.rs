use once_cell::sync::Lazy;
use percent_encoding::percent_decode_str;
use regex::Regex;
use url::Url;

use super::archive::{ArchiveEntry, ArchiveLayout};
use super::Location;

/// `/<owner>/<repo>/blob/<ref>/<path>`
static BLOB_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^/([\w.-]+)/([\w.-]+)/blob/([\w.-]+)/(.+)$").expect("blob path pattern is valid")
});

/// Repository files addressed by their github.com blob URL, served from the repository zipball
#[derive(Debug, Clone)]
pub struct GithubLayout {
    api_base: Url,
}

impl GithubLayout {
    /// Use a different API endpoint for zipball downloads
    pub fn with_api_base(api_base: Url) -> Self {
        Self { api_base }
    }
}

impl Default for GithubLayout {
    fn default() -> Self {
        Self {
            api_base: Url::parse("https://api.github.com/").expect("static API url is valid"),
        }
    }
}

impl ArchiveLayout for GithubLayout {
    fn name(&self) -> &'static str {
        "github-archive"
    }

    fn locate(&self, location: &Location) -> Option<ArchiveEntry> {
        let url = location.as_url();
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }
        if !matches!(url.host_str(), Some("github.com" | "www.github.com")) {
            return None;
        }

        let captures = BLOB_PATH.captures(url.path())?;
        let (owner, repo, reference) = (&captures[1], &captures[2], &captures[3]);
        let path = percent_decode_str(&captures[4]).decode_utf8().ok()?;

        let archive = self
            .api_base
            .join(&format!("repos/{}/{}/zipball/{}", owner, repo, reference))
            .ok()?;

        Some(ArchiveEntry {
            identity: format!("{}/{}/{}", owner, repo, reference),
            archive: Location::from_url(archive),
            path: path.into_owned(),
        })
    }
}
