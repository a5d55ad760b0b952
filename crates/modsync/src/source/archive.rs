//! Files served out of a remotely hosted zip archive
//!
//! Each archive is downloaded once per run and then read forward-only. Entries that are passed
//! over while looking for a requested path are decompressed into memory so that later requests
//! for them are answered without touching the archive again; an entry's bytes are dropped as
//! soon as they have been served.
//!
//! Per archive there is a single scan cursor behind an async mutex, so at most one request
//! advances a given archive at a time. Inflating happens on the blocking pool, never on the
//! executor. Already-extracted entries sit in a concurrent map and are
//! served without waiting for that mutex. Distinct archives never contend.

use std::io::{Cursor, Read};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::io::AsyncReadExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use zip::result::{ZipError, ZipResult};
use zip::ZipArchive;

use super::{ByteStream, Location, SourceHandler};
use crate::core::error::{Result, SyncError};

/// Where a location lives inside an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Canonical key; locations with the same identity share one download
    pub identity: String,
    pub archive: Location,
    /// Path of the entry inside the archive, after any root folder is stripped
    pub path: String,
}

/// Maps locations onto archives for one hosting service
pub trait ArchiveLayout: Send + Sync {
    fn name(&self) -> &'static str;

    /// `None` when the location is not served from an archive by this layout
    fn locate(&self, location: &Location) -> Option<ArchiveEntry>;

    /// Whether every entry name starts with a wrapper folder that is not part of the path
    fn strips_root_folder(&self) -> bool {
        true
    }
}

pub struct ArchiveHandler<L> {
    layout: L,
    transport: Arc<dyn SourceHandler>,
    archives: DashMap<String, Arc<ArchiveReader>>,
}

impl<L: ArchiveLayout> ArchiveHandler<L> {
    /// `transport` fetches the archive itself
    pub fn new(layout: L, transport: Arc<dyn SourceHandler>) -> Self {
        Self {
            layout,
            transport,
            archives: DashMap::new(),
        }
    }

    fn reader_for(&self, entry: &ArchiveEntry) -> Arc<ArchiveReader> {
        self.archives
            .entry(entry.identity.clone())
            .or_insert_with(|| {
                Arc::new(ArchiveReader::new(
                    entry.archive.clone(),
                    self.layout.strips_root_folder(),
                ))
            })
            .clone()
    }
}

#[async_trait]
impl<L: ArchiveLayout + 'static> SourceHandler for ArchiveHandler<L> {
    fn name(&self) -> &'static str {
        self.layout.name()
    }

    fn matches(&self, location: &Location) -> bool {
        self.layout.locate(location).is_some()
    }

    async fn open(&self, location: &Location) -> Result<ByteStream> {
        let entry = self.layout.locate(location).ok_or_else(|| SyncError::Protocol {
            location: location.to_string(),
            reason: format!("not served by {}", self.layout.name()),
        })?;

        let reader = self.reader_for(&entry);
        let bytes = reader.read_entry(self.transport.as_ref(), &entry.path).await?;
        Ok(Box::new(Cursor::new(bytes)))
    }
}

enum ScanState {
    /// Archive not downloaded yet
    Unscanned,
    /// Entries before `next` have been handed out or cached
    Scanning {
        archive: ZipArchive<Cursor<Bytes>>,
        next: usize,
    },
    /// Every entry has been read; the archive bytes are gone
    Exhausted,
    /// Download or scan failed; the reason is replayed instead of refetching
    Failed(String),
}

struct ArchiveReader {
    archive: Location,
    strip_root: bool,
    cursor: Mutex<ScanState>,
    extracted: Arc<DashMap<String, Bytes>>,
}

impl ArchiveReader {
    fn new(archive: Location, strip_root: bool) -> Self {
        Self {
            archive,
            strip_root,
            cursor: Mutex::new(ScanState::Unscanned),
            extracted: Arc::new(DashMap::new()),
        }
    }

    async fn read_entry(&self, transport: &dyn SourceHandler, path: &str) -> Result<Bytes> {
        if let Some((_, bytes)) = self.extracted.remove(path) {
            return Ok(bytes);
        }

        let mut state = self.cursor.lock().await;
        // whoever held the cursor before us may have scanned past the entry
        if let Some((_, bytes)) = self.extracted.remove(path) {
            return Ok(bytes);
        }

        loop {
            // a request dropped mid-step leaves the archive failed rather than half-read
            let current = std::mem::replace(
                &mut *state,
                ScanState::Failed("scan was interrupted".to_string()),
            );
            match current {
                ScanState::Unscanned => {
                    let opened = match self.download(transport).await {
                        Ok(bytes) => ZipArchive::new(Cursor::new(bytes))
                            .map_err(|source| self.unreadable(source)),
                        Err(e) => Err(e),
                    };
                    match opened {
                        Ok(archive) => {
                            debug!("{} holds {} entries", self.archive, archive.len());
                            *state = ScanState::Scanning { archive, next: 0 };
                        }
                        Err(e) => {
                            *state = ScanState::Failed(e.to_string());
                            return Err(e);
                        }
                    }
                }
                ScanState::Scanning { archive, next } => {
                    match self.scan(archive, next, path).await {
                        Ok((found, Some((archive, next)))) => {
                            *state = ScanState::Scanning { archive, next };
                            if let Some(bytes) = found {
                                return Ok(bytes);
                            }
                        }
                        Ok((found, None)) => {
                            debug!("Reached the end of {}", self.archive);
                            *state = ScanState::Exhausted;
                            if let Some(bytes) = found {
                                return Ok(bytes);
                            }
                        }
                        Err(e) => {
                            warn!("Giving up on archive {}: {}", self.archive, e);
                            *state = ScanState::Failed(e.to_string());
                            return Err(e);
                        }
                    }
                }
                ScanState::Exhausted => {
                    *state = ScanState::Exhausted;
                    return Err(SyncError::Protocol {
                        location: format!("{}#{}", self.archive, path),
                        reason: "entry not found in archive".to_string(),
                    });
                }
                ScanState::Failed(reason) => {
                    let err = SyncError::Protocol {
                        location: format!("{}#{}", self.archive, path),
                        reason: format!("archive unavailable: {}", reason),
                    };
                    *state = ScanState::Failed(reason);
                    return Err(err);
                }
            }
        }
    }

    /// Inflate entries on the blocking pool until `path` turns up or the archive runs out.
    ///
    /// Hands the archive back with its new position, or `None` once every entry was read.
    async fn scan(
        &self,
        mut archive: ZipArchive<Cursor<Bytes>>,
        mut next: usize,
        path: &str,
    ) -> Result<ScanStep> {
        let extracted = self.extracted.clone();
        let strip_root = self.strip_root;
        let wanted = path.to_string();

        let (archive, next, found) = tokio::task::spawn_blocking(move || {
            let found = scan_until(&mut archive, &mut next, strip_root, &wanted, &extracted);
            (archive, next, found)
        })
        .await
        .map_err(|e| SyncError::Protocol {
            location: self.archive.to_string(),
            reason: format!("archive scan aborted: {}", e),
        })?;

        let found = found.map_err(|source| self.unreadable(source))?;
        if next < archive.len() {
            Ok((found, Some((archive, next))))
        } else {
            Ok((found, None))
        }
    }

    fn unreadable(&self, source: ZipError) -> SyncError {
        SyncError::Archive {
            location: self.archive.to_string(),
            source,
        }
    }

    async fn download(&self, transport: &dyn SourceHandler) -> Result<Bytes> {
        info!("Downloading archive {}", self.archive);
        let mut stream = transport.open(&self.archive).await?;
        let mut buffer = Vec::new();
        stream
            .read_to_end(&mut buffer)
            .await
            .map_err(|source| SyncError::TransportIo {
                location: self.archive.to_string(),
                source,
            })?;
        debug!("Archive {} is {} bytes", self.archive, buffer.len());
        Ok(Bytes::from(buffer))
    }
}

/// Entry found by a scan step, and the archive to keep scanning if entries remain
type ScanStep = (Option<Bytes>, Option<(ZipArchive<Cursor<Bytes>>, usize)>);

/// Decompress file entries from `next` onwards, parking the ones that are not `wanted`
fn scan_until(
    archive: &mut ZipArchive<Cursor<Bytes>>,
    next: &mut usize,
    strip_root: bool,
    wanted: &str,
    extracted: &DashMap<String, Bytes>,
) -> ZipResult<Option<Bytes>> {
    while *next < archive.len() {
        let mut file = archive.by_index(*next)?;
        *next += 1;
        if file.is_dir() {
            continue;
        }

        let raw_name = file.name().to_string();
        let name = if strip_root {
            match raw_name.split_once('/') {
                Some((_, rest)) => rest.to_string(),
                None => continue,
            }
        } else {
            raw_name
        };

        // sizes in the headers are remote input, so the buffer grows with what actually inflates
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;
        let contents = Bytes::from(contents);
        if name == wanted {
            return Ok(Some(contents));
        }
        extracted.insert(name, contents);
    }
    Ok(None)
}
