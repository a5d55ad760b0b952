//! Download links for files hosted on CurseForge
//!
//! Metadata in `metadata:curseforge` mode names a project and a file instead of a URL. All files
//! of a run are looked up with one batched request. Files whose authors opted out of third-party
//! downloads come back without a link; a second request fetches their project pages so the user
//! can be told where to download them by hand.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use super::http::{build_client, request_error};
use super::Location;
use crate::core::config::SyncConfig;
use crate::core::error::{Result, SyncError};
use crate::manifest::PackPath;

const API_KEY_HEADER: &str = "x-api-key";

/// One file that needs its download link looked up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurseForgeLookup {
    /// Index entry the link is for
    pub key: PackPath,
    pub name: String,
    pub project_id: u32,
    pub file_id: u32,
    /// Where the file belongs on disk, for manual download instructions
    pub destination: PathBuf,
}

/// Outcome of a batch lookup, per index entry
#[derive(Debug, Default)]
pub struct CurseForgeResolution {
    pub links: HashMap<PackPath, Location>,
    pub failures: Vec<(PackPath, SyncError)>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FilesRequest<'a> {
    file_ids: &'a [u32],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ModsRequest<'a> {
    mod_ids: &'a [u32],
}

#[derive(Deserialize)]
struct Listing<T> {
    data: Vec<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiFile {
    id: u32,
    mod_id: u32,
    #[serde(default)]
    download_url: Option<String>,
}

#[derive(Deserialize)]
struct ApiProject {
    id: u32,
    #[serde(default)]
    name: String,
    #[serde(default)]
    links: Option<ApiLinks>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiLinks {
    #[serde(default)]
    website_url: String,
}

pub struct CurseForgeClient {
    client: Client,
    api_base: Url,
    api_key: Option<String>,
    read_timeout: Duration,
}

impl CurseForgeClient {
    pub fn new(config: &SyncConfig) -> Result<Self> {
        let api_base = Url::parse(&config.curseforge_api_base).map_err(|e| SyncError::Configuration {
            message: format!("invalid CurseForge API base '{}': {}", config.curseforge_api_base, e),
            suggestion: Some("Use an absolute http(s) URL".to_string()),
        })?;
        if config.curseforge_api_key.is_none() {
            debug!("No CurseForge API key configured, requests are sent without one");
        }

        Ok(Self {
            client: build_client(config)?,
            api_base,
            api_key: config.curseforge_api_key.clone(),
            read_timeout: config.read_timeout,
        })
    }

    /// Look up download links for every file in one go.
    ///
    /// An `Err` means the API could not be asked at all; per-file problems are reported in
    /// [`CurseForgeResolution::failures`].
    pub async fn resolve(&self, lookups: &[CurseForgeLookup]) -> Result<CurseForgeResolution> {
        let mut by_file: BTreeMap<u32, Vec<&CurseForgeLookup>> = BTreeMap::new();
        for lookup in lookups {
            by_file.entry(lookup.file_id).or_default().push(lookup);
        }

        let file_ids: Vec<u32> = by_file.keys().copied().collect();
        let files: Listing<ApiFile> = self
            .post("v1/mods/files", &FilesRequest { file_ids: &file_ids })
            .await?;

        let mut resolution = CurseForgeResolution::default();
        for file in files.data {
            let Some(requested) = by_file.get(&file.id) else {
                warn!("CurseForge answered with file {} of project {} which was not asked for", file.id, file.mod_id);
                continue;
            };
            // no link: the project opted out of third-party downloads
            let Some(download_url) = file.download_url else {
                continue;
            };
            match Url::parse(&download_url) {
                Ok(url) => {
                    for lookup in requested {
                        resolution
                            .links
                            .insert(lookup.key.clone(), Location::from_url(url.clone()));
                    }
                }
                Err(source) => {
                    for lookup in requested {
                        resolution.failures.push((
                            lookup.key.clone(),
                            SyncError::InvalidLocation {
                                location: download_url.clone(),
                                source,
                            },
                        ));
                    }
                }
            }
        }

        // files without a link, plus file types the API does not list at all
        let unresolved: Vec<&CurseForgeLookup> = {
            let settled: HashSet<&PackPath> = resolution
                .links
                .keys()
                .chain(resolution.failures.iter().map(|(key, _)| key))
                .collect();
            lookups.iter().filter(|l| !settled.contains(&l.key)).collect()
        };
        if !unresolved.is_empty() {
            let mut project_ids: Vec<u32> = unresolved.iter().map(|l| l.project_id).collect();
            project_ids.sort_unstable();
            project_ids.dedup();

            let projects: Listing<ApiProject> = self
                .post("v1/mods", &ModsRequest { mod_ids: &project_ids })
                .await?;
            let pages: HashMap<u32, ApiProject> =
                projects.data.into_iter().map(|p| (p.id, p)).collect();

            for lookup in unresolved {
                let error = match pages.get(&lookup.project_id) {
                    Some(project) => {
                        let website = project
                            .links
                            .as_ref()
                            .map(|links| links.website_url.trim_end_matches('/'))
                            .unwrap_or_default();
                        debug!("{} ({}) is not available through the API", project.name, lookup.project_id);
                        SyncError::ManualDownload {
                            file: lookup.name.clone(),
                            url: format!("{}/files/{}", website, lookup.file_id),
                            destination: lookup.destination.clone(),
                        }
                    }
                    None => SyncError::Protocol {
                        location: format!("curseforge:{}/{}", lookup.project_id, lookup.file_id),
                        reason: "project is not known to the CurseForge API".to_string(),
                    },
                };
                resolution.failures.push((lookup.key.clone(), error));
            }
        }

        info!(
            "Resolved {} of {} CurseForge downloads",
            resolution.links.len(),
            lookups.len()
        );
        Ok(resolution)
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, endpoint: &str, body: &B) -> Result<T> {
        let url = self
            .api_base
            .join(endpoint)
            .map_err(|source| SyncError::InvalidLocation {
                location: format!("{}{}", self.api_base, endpoint),
                source,
            })?;
        let location = url.to_string();
        let payload = serde_json::to_vec(body).map_err(|e| SyncError::Protocol {
            location: location.clone(),
            reason: format!("cannot encode request: {}", e),
        })?;

        let response = self
            .authenticated(self.client.post(url))
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await
            .map_err(|e| request_error(&location, self.read_timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::HttpStatus {
                location,
                status: status.as_u16(),
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| request_error(&location, self.read_timeout, e))?;
        debug!("CurseForge {} answered with {} bytes", endpoint, text.len());

        serde_json::from_str(&text).map_err(|e| SyncError::Protocol {
            location,
            reason: format!("unexpected response: {}", e),
        })
    }

    fn authenticated(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header(API_KEY_HEADER, key),
            None => request,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn lookup(key: &str, project_id: u32, file_id: u32) -> CurseForgeLookup {
        CurseForgeLookup {
            key: PackPath::new(key).unwrap(),
            name: key.to_string(),
            project_id,
            file_id,
            destination: PathBuf::from("/srv/pack").join(key),
        }
    }

    fn client(server: &MockServer) -> CurseForgeClient {
        let config = SyncConfig::default()
            .with_curseforge_api(format!("{}/", server.uri()))
            .with_curseforge_api_key(Some("test-key".to_string()));
        CurseForgeClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn links_are_resolved_in_one_batch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/mods/files"))
            .and(header("x-api-key", "test-key"))
            .and(body_json(json!({ "fileIds": [11, 22] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    { "id": 22, "modId": 2, "downloadUrl": "https://edge.forgecdn.net/files/22/b.jar" },
                    { "id": 11, "modId": 1, "downloadUrl": "https://edge.forgecdn.net/files/11/a.jar" }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/mods"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let resolution = client(&server)
            .resolve(&[lookup("mods/a.pw.toml", 1, 11), lookup("mods/b.pw.toml", 2, 22)])
            .await
            .unwrap();

        assert!(resolution.failures.is_empty());
        assert_eq!(
            resolution.links[&PackPath::new("mods/b.pw.toml").unwrap()].to_string(),
            "https://edge.forgecdn.net/files/22/b.jar"
        );
        assert_eq!(resolution.links.len(), 2);
    }

    #[tokio::test]
    async fn files_without_links_point_at_their_project_page() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/mods/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    { "id": 11, "modId": 1, "downloadUrl": "https://edge.forgecdn.net/files/11/a.jar" },
                    { "id": 22, "modId": 2, "downloadUrl": null }
                ]
            })))
            .mount(&server)
            .await;
        // file 33 is missing from the answer entirely, project 3 is unknown
        Mock::given(method("POST"))
            .and(path("/v1/mods"))
            .and(body_json(json!({ "modIds": [2, 3] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    { "id": 2, "name": "Thing", "links": { "websiteUrl": "https://www.curseforge.com/minecraft/mc-mods/thing" } }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let resolution = client(&server)
            .resolve(&[
                lookup("mods/a.pw.toml", 1, 11),
                lookup("mods/thing.pw.toml", 2, 22),
                lookup("shaderpacks/s.pw.toml", 3, 33),
            ])
            .await
            .unwrap();

        assert_eq!(resolution.links.len(), 1);
        assert_eq!(resolution.failures.len(), 2);
        let (key, manual) = &resolution.failures[0];
        assert_eq!(key.as_str(), "mods/thing.pw.toml");
        match manual {
            SyncError::ManualDownload { url, destination, .. } => {
                assert_eq!(url, "https://www.curseforge.com/minecraft/mc-mods/thing/files/22");
                assert_eq!(destination, &PathBuf::from("/srv/pack/mods/thing.pw.toml"));
            }
            other => panic!("unexpected error {other}"),
        }
        assert!(matches!(&resolution.failures[1].1, SyncError::Protocol { .. }));
    }

    #[tokio::test]
    async fn refused_request_fails_the_whole_batch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/mods/files"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server)
            .resolve(&[lookup("mods/a.pw.toml", 1, 11)])
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SyncError::HttpStatus { status: 403, .. }));
    }
}
