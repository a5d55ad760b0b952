//! Per-file reconciliation
//!
//! A [`DownloadTask`] carries one index entry through four states:
//!
//! ```text
//! Constructed -> CacheJoined -> MetadataResolved -> Finished(outcome)
//! ```
//!
//! Any step may fail instead, which moves the task straight to `Finished(Failed)` and makes
//! every later step a no-op. The cache entry the task started from is snapshotted when the
//! cache is joined; a failed task hands that snapshot back so the cache never records
//! half-applied state.

use std::path::Path;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use super::ui::{FailureReport, OptionChoice};
use crate::core::error::{FileOperation, Result, SyncError};
use crate::core::files;
use crate::core::metrics::SyncMetrics;
use crate::hash::{Digest, DigestingReader, Hasher, HasherRegistry};
use crate::manifest::{CacheEntry, FileIndexEntry, FileMetadata, PackPath, Side};
use crate::source::{CurseForgeLookup, Location, SourceResolver};

const UNNAMED: &str = "unnamed file";
const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Everything a task needs from the run, borrowed for the duration of one phase
#[derive(Clone, Copy)]
pub struct TaskContext<'a> {
    pub resolver: &'a SourceResolver,
    pub hashers: &'a HasherRegistry,
    /// Location of the file index; entry paths resolve against it
    pub index_location: &'a Location,
    pub pack_folder: &'a Path,
    pub metrics: &'a SyncMetrics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Constructed,
    CacheJoined,
    MetadataResolved,
    Finished(TaskOutcome),
}

/// How a task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Cache already matched the index; nothing touched
    UpToDate,
    /// A matching file was already at the destination and was adopted
    AlreadyPresent,
    Downloaded,
    /// Destination exists and the entry must not overwrite it
    Preserved,
    /// Wrong side or optional and disabled; any previous file was removed
    Excluded,
    Failed,
}

/// What a finished task contributes back to the run
#[derive(Debug)]
pub struct TaskReport {
    pub key: PackPath,
    pub name: String,
    pub outcome: TaskOutcome,
    /// Entry to store under `key`, or `None` to drop it from the cache
    pub entry: Option<CacheEntry>,
    pub failure: Option<SyncError>,
}

pub struct DownloadTask {
    entry: FileIndexEntry,
    side: Side,
    state: TaskState,
    /// Digest the index declares for the entry
    declared: Option<Digest>,
    working: CacheEntry,
    /// Cache entry as it was before this run touched it
    backup: Option<CacheEntry>,
    invalidated: bool,
    up_to_date: bool,
    metadata_required: bool,
    newly_optional: bool,
    metadata: Option<FileMetadata>,
    /// Payload link looked up from a provider API for this run
    provider_link: Option<Location>,
    failure: Option<SyncError>,
}

impl DownloadTask {
    /// Create a task for an index entry, filling in the index-wide digest algorithm
    pub fn new(mut entry: FileIndexEntry, index_algorithm: &str, side: Side) -> Self {
        entry.inherit_algorithm(index_algorithm);
        Self {
            entry,
            side,
            state: TaskState::Constructed,
            declared: None,
            working: CacheEntry::default(),
            backup: None,
            invalidated: false,
            up_to_date: false,
            metadata_required: true,
            newly_optional: false,
            metadata: None,
            provider_link: None,
            failure: None,
        }
    }

    /// Cache key of the task: the path of the index entry
    pub fn key(&self) -> &PackPath {
        &self.entry.file
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Force a re-fetch regardless of what the cache says
    pub fn invalidate(&mut self) {
        debug_assert_eq!(self.state, TaskState::Constructed);
        self.invalidated = true;
    }

    /// Seed the task from the previous run's cache entry, if any
    pub fn join_cache(&mut self, cached: Option<CacheEntry>, hashers: &HasherRegistry) {
        if self.is_finished() {
            return;
        }

        let declared = match hashers.digest_of(self.entry.algorithm(), &self.entry.hash) {
            Ok(digest) => digest,
            Err(e) => return self.fail(e),
        };

        if let Some(cached) = cached {
            self.backup = Some(cached.clone());
            self.working = cached;

            if !self.invalidated && self.working.hash.as_ref() == Some(&declared) {
                self.up_to_date = true;
                // an unchanged optional file still has to be offered with its description
                self.metadata_required = self.working.is_optional;
            }
        }

        self.declared = Some(declared);
        self.state = TaskState::CacheJoined;
    }

    /// Fetch and verify the metadata document of a metafile entry when it is needed
    pub async fn resolve_metadata(&mut self, ctx: &TaskContext<'_>) {
        if self.is_finished() {
            return;
        }

        if self.entry.metafile && self.metadata_required {
            let metadata = match self.fetch_metadata(ctx).await {
                Ok(fetched) => fetched,
                Err(e) => return self.fail(e),
            };

            if metadata.option.is_optional() {
                if self.working.is_optional {
                    self.newly_optional = false;
                } else {
                    self.working.option_value = metadata.option.default_value();
                    self.newly_optional = true;
                }
            }
            self.working.is_optional = metadata.option.is_optional();
            self.working.only_other_side = !metadata.side.includes(self.side);

            self.metadata = Some(metadata);
        }

        self.state = TaskState::MetadataResolved;
    }

    async fn fetch_metadata(&self, ctx: &TaskContext<'_>) -> Result<FileMetadata> {
        let location = ctx.resolver.resolve(ctx.index_location, self.entry.file.as_str())?;
        let hasher = ctx.hashers.hasher_for(self.entry.algorithm())?;
        let (text, actual) = fetch_document(ctx.resolver, &location, hasher.as_ref()).await?;

        let expected = self
            .declared
            .as_ref()
            .ok_or_else(|| SyncError::Protocol {
                location: location.to_string(),
                reason: "entry digest was never parsed".to_string(),
            })?;
        if &actual != expected {
            return Err(SyncError::MetadataIntegrity {
                file: self.entry.file.to_string(),
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }

        let metadata = FileMetadata::parse(&text, &location.to_string())?;
        debug!("Resolved metadata for {} from {}", self.entry.file, location);
        Ok(metadata)
    }

    /// CurseForge ids for a payload that still has to be fetched and has no link yet.
    ///
    /// A file that is already in place needs no link; this is also how a file the user saved
    /// by hand gets picked up on the next run.
    pub async fn curseforge_lookup(&mut self, ctx: &TaskContext<'_>) -> Option<CurseForgeLookup> {
        if self.is_finished() || self.up_to_date || self.is_excluded() {
            return None;
        }
        let meta = self.metadata.as_ref().filter(|m| m.download.is_curseforge())?;
        let ids = meta.curseforge_ids();
        let destination = match self.entry.destination(Some(meta)) {
            Ok(destination) => destination,
            Err(e) => {
                self.fail(e);
                return None;
            }
        };
        let Some((project_id, file_id)) = ids else {
            self.fail(SyncError::Protocol {
                location: self.entry.file.to_string(),
                reason: "CurseForge download without an [update.curseforge] section".to_string(),
            });
            return None;
        };

        let target = destination.to_fs_path(ctx.pack_folder);
        if self.satisfied_on_disk(&target, ctx.hashers).await {
            debug!("{} is already in place, no link needed", destination);
            return None;
        }

        Some(CurseForgeLookup {
            key: self.entry.file.clone(),
            name: self.display_name(),
            project_id,
            file_id,
            destination: target,
        })
    }

    /// Use a link found by a provider lookup as the payload location
    pub fn set_provider_link(&mut self, link: Location) {
        self.provider_link = Some(link);
    }

    /// Fail the task before its download, e.g. because its link could not be looked up
    pub fn reject(&mut self, error: SyncError) {
        if !self.is_finished() {
            self.fail(error);
        }
    }

    async fn satisfied_on_disk(&self, target: &Path, hashers: &HasherRegistry) -> bool {
        if self.entry.preserve && matches!(tokio::fs::try_exists(target).await, Ok(true)) {
            return true;
        }
        let Ok(expected) = self.expected_payload(hashers) else {
            return false;
        };
        let Ok(hasher) = hashers.hasher_for(expected.algorithm()) else {
            return false;
        };
        matches!(files::digest_file(target, hasher.as_ref()).await, Ok(ref d) if d == &expected)
    }

    /// Bring the file on disk in line with the entry
    pub async fn download(&mut self, ctx: &TaskContext<'_>) {
        if self.is_finished() {
            return;
        }

        match self.reconcile(ctx).await {
            Ok(outcome) => {
                match outcome {
                    TaskOutcome::UpToDate => ctx.metrics.record_up_to_date(),
                    TaskOutcome::AlreadyPresent => ctx.metrics.record_already_present(),
                    TaskOutcome::Preserved => ctx.metrics.record_preserved(),
                    TaskOutcome::Excluded => ctx.metrics.record_excluded(),
                    TaskOutcome::Downloaded | TaskOutcome::Failed => {}
                }
                self.state = TaskState::Finished(outcome);
            }
            Err(e) => self.fail(e),
        }
    }

    async fn reconcile(&mut self, ctx: &TaskContext<'_>) -> Result<TaskOutcome> {
        if self.is_excluded() {
            if let Some(previous) = self.working.cached_location.take() {
                let path = previous.to_fs_path(ctx.pack_folder);
                if files::delete_if_exists(&path).await? {
                    debug!("Removed excluded file {}", previous);
                }
            }
            return Ok(TaskOutcome::Excluded);
        }

        if self.up_to_date {
            return Ok(TaskOutcome::UpToDate);
        }

        let destination = self.entry.destination(self.metadata.as_ref())?;
        let target = destination.to_fs_path(ctx.pack_folder);
        let expected = self.expected_payload(ctx.hashers)?;
        let exists = tokio::fs::try_exists(&target)
            .await
            .map_err(|e| SyncError::file_system(&target, FileOperation::Metadata, e))?;

        if self.entry.preserve && exists {
            debug!("Keeping existing {}", destination);
            self.record(destination, expected);
            return Ok(TaskOutcome::Preserved);
        }

        let hasher = ctx.hashers.hasher_for(expected.algorithm())?;
        if exists && matches!(files::digest_file(&target, hasher.as_ref()).await, Ok(ref d) if d == &expected) {
            debug!("{} already matches, adopting it", destination);
            self.retire_previous(&destination, ctx.pack_folder).await;
            self.record(destination, expected);
            return Ok(TaskOutcome::AlreadyPresent);
        }

        let source = self.payload_location(ctx)?;
        let written = fetch_verified(ctx.resolver, &source, hasher.as_ref(), &expected, &destination, &target).await?;
        ctx.metrics.record_downloaded(written);

        self.retire_previous(&destination, ctx.pack_folder).await;
        self.record(destination, expected);
        Ok(TaskOutcome::Downloaded)
    }

    /// Digest the payload must have: the metadata's for metafiles, the index's otherwise
    fn expected_payload(&self, hashers: &HasherRegistry) -> Result<Digest> {
        match &self.metadata {
            Some(meta) => hashers.digest_of(&meta.download.hash_format, &meta.download.hash),
            None if self.entry.metafile => Err(SyncError::Protocol {
                location: self.entry.file.to_string(),
                reason: "metadata was not resolved".to_string(),
            }),
            None => self.declared.clone().ok_or_else(|| SyncError::Protocol {
                location: self.entry.file.to_string(),
                reason: "entry digest was never parsed".to_string(),
            }),
        }
    }

    fn payload_location(&self, ctx: &TaskContext<'_>) -> Result<Location> {
        match &self.metadata {
            Some(meta) if meta.download.is_curseforge() => {
                self.provider_link.clone().ok_or_else(|| SyncError::Protocol {
                    location: self.entry.file.to_string(),
                    reason: "CurseForge download link was not looked up".to_string(),
                })
            }
            Some(meta) => {
                let url = meta.download.direct_url(self.entry.file.as_str())?;
                Location::parse(url)
            }
            None => ctx.resolver.resolve(ctx.index_location, self.entry.file.as_str()),
        }
    }

    /// Remove the file of a previous run if it lived somewhere else
    async fn retire_previous(&self, destination: &PackPath, pack_folder: &Path) {
        let Some(previous) = &self.working.cached_location else {
            return;
        };
        if previous == destination {
            return;
        }
        if let Err(e) = files::delete_if_exists(&previous.to_fs_path(pack_folder)).await {
            warn!("Could not remove old copy of {} at {}: {}", destination, previous, e);
        }
    }

    fn record(&mut self, destination: PackPath, payload: Digest) {
        self.working.hash = self.declared.clone();
        self.working.is_optional = self.is_optional();
        self.working.cached_location = Some(destination);
        if self.entry.metafile {
            self.working.linked_file_hash = Some(payload);
        }
    }

    fn fail(&mut self, error: SyncError) {
        debug!("Task for {} failed: {}", self.entry.file, error);
        self.failure = Some(error);
        self.state = TaskState::Finished(TaskOutcome::Failed);
    }

    fn is_finished(&self) -> bool {
        matches!(self.state, TaskState::Finished(_))
    }

    fn is_excluded(&self) -> bool {
        if !self.correct_side() {
            return true;
        }
        let chosen = self.working.option_value;
        match &self.metadata {
            Some(meta) => !meta.option.includes(chosen),
            // metadata was not needed this run; go by what the cache recorded
            None => self.working.is_optional && !chosen,
        }
    }

    pub fn failed(&self) -> bool {
        self.failure.is_some()
    }

    pub fn is_optional(&self) -> bool {
        self.metadata.as_ref().is_some_and(|m| m.option.is_optional())
    }

    /// Optional now but not in the previous run, so the user has not chosen yet
    pub fn is_newly_optional(&self) -> bool {
        self.is_optional() && self.newly_optional
    }

    pub fn correct_side(&self) -> bool {
        self.metadata.as_ref().map_or(true, |m| m.side.includes(self.side))
    }

    pub fn display_name(&self) -> String {
        self.entry
            .display_name(self.metadata.as_ref())
            .unwrap_or_else(|e| {
                debug!("{}", e);
                UNNAMED.to_string()
            })
    }

    /// Detach the failure of a task that did not get past the metadata phase
    pub fn into_failure(self) -> Option<FailureReport> {
        let name = self.display_name();
        self.failure.map(|error| FailureReport { name, error })
    }

    /// Conclude the task; a failed task hands back the entry it started from
    pub fn finish(self) -> TaskReport {
        let name = self.display_name();
        let outcome = match self.state {
            TaskState::Finished(outcome) => outcome,
            _ => TaskOutcome::Failed,
        };
        let entry = if self.failure.is_some() { self.backup } else { Some(self.working) };
        TaskReport {
            key: self.entry.file,
            name,
            outcome,
            entry,
            failure: self.failure,
        }
    }
}

impl OptionChoice for DownloadTask {
    fn name(&self) -> String {
        self.display_name()
    }

    fn description(&self) -> Option<&str> {
        self.metadata.as_ref().and_then(|m| m.option.description())
    }

    fn value(&self) -> bool {
        self.working.option_value
    }

    fn set_value(&mut self, value: bool) {
        // turning a file back on needs a download even if its digest did not change
        if value && !self.working.option_value {
            self.up_to_date = false;
        }
        self.working.option_value = value;
    }
}

/// Read a whole text document, digesting it on the way
pub(crate) async fn fetch_document(
    resolver: &SourceResolver,
    location: &Location,
    hasher: &dyn Hasher,
) -> Result<(String, Digest)> {
    let stream = resolver.open(location).await?;
    let mut reader = DigestingReader::new(stream, hasher.start());
    let mut text = String::new();
    reader
        .read_to_string(&mut text)
        .await
        .map_err(|source| SyncError::TransportIo {
            location: location.to_string(),
            source,
        })?;
    let digest = reader.finish().await.map_err(|source| SyncError::TransportIo {
        location: location.to_string(),
        source,
    })?;
    Ok((text, digest))
}

/// Stream a payload into a temp file beside `target` and move it into place only if it verifies
async fn fetch_verified(
    resolver: &SourceResolver,
    origin: &Location,
    hasher: &dyn Hasher,
    expected: &Digest,
    destination: &PackPath,
    target: &Path,
) -> Result<u64> {
    let stream = resolver.open(origin).await?;
    files::ensure_parent_dir(target).await?;
    let temp = files::temp_path_beside(target)?;

    let mut reader = DigestingReader::new(stream, hasher.start());
    let mut out = tokio::fs::File::create(&temp)
        .await
        .map_err(|e| SyncError::file_system(&*temp, FileOperation::Create, e))?;
    let written = copy_to_file(&mut reader, &mut out, origin, &temp).await?;
    drop(out);

    let actual = reader.finish().await.map_err(|source| SyncError::TransportIo {
        location: origin.to_string(),
        source,
    })?;
    if &actual != expected {
        // temp path is removed on drop
        return Err(SyncError::PayloadIntegrity {
            file: destination.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }

    files::persist(temp, target)?;
    debug!("Wrote {} ({} bytes) from {}", destination, written, origin);
    Ok(written)
}

/// Copy a payload stream into its temp file.
///
/// Read failures belong to the source and write failures to the local disk.
async fn copy_to_file<R, W>(reader: &mut R, out: &mut W, origin: &Location, temp: &Path) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    let mut written = 0u64;
    loop {
        let read = reader
            .read(&mut buffer)
            .await
            .map_err(|source| SyncError::TransportIo {
                location: origin.to_string(),
                source,
            })?;
        if read == 0 {
            break;
        }
        out.write_all(&buffer[..read])
            .await
            .map_err(|e| SyncError::file_system(temp, FileOperation::Write, e))?;
        written += read as u64;
    }
    out.flush()
        .await
        .map_err(|e| SyncError::file_system(temp, FileOperation::Write, e))?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Optionality;
    use crate::source::FileHandler;
    use tempfile::tempdir;

    const HELLO_SHA256: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    fn entry(file: &str, hash: &str) -> FileIndexEntry {
        FileIndexEntry {
            file: PackPath::new(file).unwrap(),
            hash: hash.to_string(),
            hash_format: None,
            alias: None,
            metafile: false,
            preserve: false,
        }
    }

    fn sha256(hex: &str) -> Digest {
        HasherRegistry::with_defaults().digest_of("sha256", hex).unwrap()
    }

    struct Fixture {
        remote: tempfile::TempDir,
        pack: tempfile::TempDir,
        resolver: SourceResolver,
        hashers: HasherRegistry,
        index: Location,
        metrics: SyncMetrics,
    }

    impl Fixture {
        fn new() -> Self {
            let remote = tempdir().unwrap();
            let index = Location::from_path(&remote.path().join("index.toml")).unwrap();
            Self {
                remote,
                pack: tempdir().unwrap(),
                resolver: SourceResolver::new().register(FileHandler),
                hashers: HasherRegistry::with_defaults(),
                index,
                metrics: SyncMetrics::default(),
            }
        }

        fn ctx(&self) -> TaskContext<'_> {
            TaskContext {
                resolver: &self.resolver,
                hashers: &self.hashers,
                index_location: &self.index,
                pack_folder: self.pack.path(),
                metrics: &self.metrics,
            }
        }

        fn publish(&self, path: &str, contents: &str) {
            let target = self.remote.path().join(path);
            std::fs::create_dir_all(target.parent().unwrap()).unwrap();
            std::fs::write(target, contents).unwrap();
        }
    }

    async fn run(task: &mut DownloadTask, fixture: &Fixture, cached: Option<CacheEntry>) {
        task.join_cache(cached, &fixture.hashers);
        task.resolve_metadata(&fixture.ctx()).await;
        task.download(&fixture.ctx()).await;
    }

    #[tokio::test]
    async fn fresh_entry_is_downloaded_and_recorded() {
        let fixture = Fixture::new();
        fixture.publish("config/a.txt", "hello world");
        let mut task = DownloadTask::new(entry("config/a.txt", HELLO_SHA256), "sha256", Side::Client);

        run(&mut task, &fixture, None).await;

        assert_eq!(task.state(), TaskState::Finished(TaskOutcome::Downloaded));
        let written = std::fs::read_to_string(fixture.pack.path().join("config/a.txt")).unwrap();
        assert_eq!(written, "hello world");

        let report = task.finish();
        let entry = report.entry.unwrap();
        assert_eq!(entry.hash, Some(sha256(HELLO_SHA256)));
        assert_eq!(entry.cached_location.unwrap().as_str(), "config/a.txt");
        assert_eq!(fixture.metrics.snapshot().bytes_downloaded, 11);
    }

    #[tokio::test]
    async fn matching_cache_entry_is_left_alone() {
        let fixture = Fixture::new();
        let cached = CacheEntry {
            hash: Some(sha256(HELLO_SHA256)),
            cached_location: Some(PackPath::new("a.txt").unwrap()),
            ..CacheEntry::default()
        };
        let mut task = DownloadTask::new(entry("a.txt", HELLO_SHA256), "sha256", Side::Client);

        run(&mut task, &fixture, Some(cached.clone())).await;

        assert_eq!(task.state(), TaskState::Finished(TaskOutcome::UpToDate));
        assert_eq!(task.finish().entry, Some(cached));
    }

    #[tokio::test]
    async fn invalidated_entry_refetches_despite_matching_cache() {
        let fixture = Fixture::new();
        fixture.publish("a.txt", "hello world");
        let cached = CacheEntry {
            hash: Some(sha256(HELLO_SHA256)),
            cached_location: Some(PackPath::new("a.txt").unwrap()),
            ..CacheEntry::default()
        };
        let mut task = DownloadTask::new(entry("a.txt", HELLO_SHA256), "sha256", Side::Client);
        task.invalidate();

        run(&mut task, &fixture, Some(cached)).await;

        assert_eq!(task.state(), TaskState::Finished(TaskOutcome::Downloaded));
        assert!(fixture.pack.path().join("a.txt").exists());
    }

    #[tokio::test]
    async fn payload_mismatch_writes_nothing_and_restores_the_snapshot() {
        let fixture = Fixture::new();
        fixture.publish("a.txt", "tampered");
        std::fs::write(fixture.pack.path().join("a.txt"), "old contents").unwrap();
        let cached = CacheEntry {
            hash: Some(sha256(&"0".repeat(64))),
            cached_location: Some(PackPath::new("a.txt").unwrap()),
            ..CacheEntry::default()
        };
        let mut task = DownloadTask::new(entry("a.txt", HELLO_SHA256), "sha256", Side::Client);

        run(&mut task, &fixture, Some(cached.clone())).await;

        let report = task.finish();
        assert_eq!(report.outcome, TaskOutcome::Failed);
        assert!(matches!(report.failure, Some(SyncError::PayloadIntegrity { .. })));
        assert_eq!(report.entry, Some(cached));
        let on_disk = std::fs::read_to_string(fixture.pack.path().join("a.txt")).unwrap();
        assert_eq!(on_disk, "old contents");
        let leftovers: Vec<_> = std::fs::read_dir(fixture.pack.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[tokio::test]
    async fn matching_file_on_disk_is_adopted_without_fetching() {
        let fixture = Fixture::new();
        std::fs::write(fixture.pack.path().join("a.txt"), "hello world").unwrap();
        let mut task = DownloadTask::new(entry("a.txt", HELLO_SHA256), "sha256", Side::Client);

        // nothing published remotely: a fetch would fail
        run(&mut task, &fixture, None).await;

        assert_eq!(task.state(), TaskState::Finished(TaskOutcome::AlreadyPresent));
    }

    #[tokio::test]
    async fn preserved_file_is_never_overwritten() {
        let fixture = Fixture::new();
        fixture.publish("options.txt", "hello world");
        std::fs::write(fixture.pack.path().join("options.txt"), "user settings").unwrap();
        let mut index_entry = entry("options.txt", HELLO_SHA256);
        index_entry.preserve = true;
        let mut task = DownloadTask::new(index_entry, "sha256", Side::Client);

        run(&mut task, &fixture, None).await;

        assert_eq!(task.state(), TaskState::Finished(TaskOutcome::Preserved));
        let on_disk = std::fs::read_to_string(fixture.pack.path().join("options.txt")).unwrap();
        assert_eq!(on_disk, "user settings");

        // bookkeeping follows the index even though the file was never checked
        let entry = task.finish().entry.unwrap();
        assert_eq!(entry.cached_location.unwrap().as_str(), "options.txt");
        assert_eq!(entry.hash, Some(sha256(HELLO_SHA256)));
        assert_eq!(entry.linked_file_hash, None);
    }

    #[tokio::test]
    async fn preserved_metafile_records_both_digests() {
        let fixture = Fixture::new();
        let document = format!(
            "filename = \"options.txt\"\n\n[download]\nurl = \"https://example.com/options.txt\"\nhash-format = \"sha256\"\nhash = \"{}\"\n",
            HELLO_SHA256
        );
        let mut index_entry = metafile(&fixture, "config/options.pw.toml", &document);
        index_entry.preserve = true;
        let declared = fixture.hashers.hasher_for("sha256").unwrap().digest_bytes(document.as_bytes());
        let target = fixture.pack.path().join("config/options.txt");
        std::fs::create_dir_all(target.parent().unwrap()).unwrap();
        std::fs::write(&target, "user settings").unwrap();
        let mut task = DownloadTask::new(index_entry, "sha256", Side::Client);

        run(&mut task, &fixture, None).await;

        assert_eq!(task.state(), TaskState::Finished(TaskOutcome::Preserved));
        let entry = task.finish().entry.unwrap();
        assert_eq!(entry.hash, Some(declared));
        assert_eq!(entry.linked_file_hash, Some(sha256(HELLO_SHA256)));
        assert_eq!(entry.cached_location.unwrap().as_str(), "config/options.txt");
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "user settings");
    }

    struct FullDisk;

    impl AsyncWrite for FullDisk {
        fn poll_write(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            _buf: &[u8],
        ) -> std::task::Poll<std::io::Result<usize>> {
            std::task::Poll::Ready(Err(std::io::Error::other("no space left on device")))
        }

        fn poll_flush(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }

        fn poll_shutdown(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }
    }

    struct DroppedConnection;

    impl AsyncRead for DroppedConnection {
        fn poll_read(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            _buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset",
            )))
        }
    }

    #[tokio::test]
    async fn disk_errors_are_not_blamed_on_the_source() {
        let origin = Location::parse("https://example.com/mods/a.jar").unwrap();
        let temp = Path::new("/pack/mods/.modsync-a.part");

        let mut payload: &[u8] = b"payload";
        let err = copy_to_file(&mut payload, &mut FullDisk, &origin, temp).await.err().unwrap();
        assert!(matches!(
            &err,
            SyncError::FileSystem { operation: FileOperation::Write, path, .. } if path == temp
        ));

        let mut sink = Vec::new();
        let err = copy_to_file(&mut DroppedConnection, &mut sink, &origin, temp).await.err().unwrap();
        assert!(matches!(err, SyncError::TransportIo { location, .. } if location == origin.to_string()));
    }

    fn metafile(fixture: &Fixture, path: &str, document: &str) -> FileIndexEntry {
        fixture.publish(path, document);
        let digest = fixture.hashers.hasher_for("sha256").unwrap().digest_bytes(document.as_bytes());
        FileIndexEntry {
            metafile: true,
            ..entry(path, digest.value())
        }
    }

    #[tokio::test]
    async fn metadata_with_wrong_digest_fails_the_task() {
        let fixture = Fixture::new();
        fixture.publish("mods/a.pw.toml", "filename = \"a.jar\"");
        let index_entry = FileIndexEntry {
            metafile: true,
            ..entry("mods/a.pw.toml", HELLO_SHA256)
        };
        let mut task = DownloadTask::new(index_entry, "sha256", Side::Client);

        task.join_cache(None, &fixture.hashers);
        task.resolve_metadata(&fixture.ctx()).await;

        assert!(task.failed());
        let report = task.into_failure().unwrap();
        assert!(matches!(report.error, SyncError::MetadataIntegrity { .. }));
    }

    #[tokio::test]
    async fn server_only_metadata_excludes_and_removes_the_file_on_a_client() {
        let fixture = Fixture::new();
        let document = format!(
            "name = \"Server Thing\"\nfilename = \"thing.jar\"\nside = \"server\"\n\n[download]\nurl = \"https://example.com/thing.jar\"\nhash-format = \"sha256\"\nhash = \"{}\"\n",
            HELLO_SHA256
        );
        let index_entry = metafile(&fixture, "mods/thing.pw.toml", &document);
        std::fs::create_dir_all(fixture.pack.path().join("mods")).unwrap();
        std::fs::write(fixture.pack.path().join("mods/thing.jar"), "old").unwrap();
        let cached = CacheEntry {
            hash: Some(sha256(&"1".repeat(64))),
            cached_location: Some(PackPath::new("mods/thing.jar").unwrap()),
            ..CacheEntry::default()
        };
        let mut task = DownloadTask::new(index_entry, "sha256", Side::Client);

        run(&mut task, &fixture, Some(cached)).await;

        assert!(!task.correct_side());
        assert_eq!(task.state(), TaskState::Finished(TaskOutcome::Excluded));
        assert!(!fixture.pack.path().join("mods/thing.jar").exists());
        let entry = task.finish().entry.unwrap();
        assert!(entry.only_other_side);
        assert_eq!(entry.cached_location, None);
    }

    #[tokio::test]
    async fn newly_optional_entry_takes_the_declared_default() {
        let fixture = Fixture::new();
        let document = format!(
            "name = \"Shaders\"\nfilename = \"shaders.zip\"\n\n[option]\noptional = true\ndefault = false\ndescription = \"Pretty lights\"\n\n[download]\nurl = \"https://example.com/shaders.zip\"\nhash-format = \"sha256\"\nhash = \"{}\"\n",
            HELLO_SHA256
        );
        let index_entry = metafile(&fixture, "shaderpacks/shaders.pw.toml", &document);
        let mut task = DownloadTask::new(index_entry, "sha256", Side::Client);

        task.join_cache(None, &fixture.hashers);
        task.resolve_metadata(&fixture.ctx()).await;

        assert!(task.is_newly_optional());
        assert!(!task.value());
        assert_eq!(OptionChoice::description(&task), Some("Pretty lights"));
        assert_eq!(task.display_name(), "Shaders");
        assert!(matches!(
            task.metadata.as_ref().map(|m| &m.option),
            Some(Optionality::Optional { .. })
        ));

        task.download(&fixture.ctx()).await;
        assert_eq!(task.state(), TaskState::Finished(TaskOutcome::Excluded));
    }

    #[tokio::test]
    async fn known_optional_entry_keeps_the_previous_choice() {
        let fixture = Fixture::new();
        let document = format!(
            "filename = \"shaders.zip\"\n\n[option]\noptional = true\ndefault = false\n\n[download]\nurl = \"https://example.com/shaders.zip\"\nhash-format = \"sha256\"\nhash = \"{}\"\n",
            HELLO_SHA256
        );
        let index_entry = metafile(&fixture, "shaderpacks/shaders.pw.toml", &document);
        let cached = CacheEntry {
            is_optional: true,
            option_value: true,
            ..CacheEntry::default()
        };
        let mut task = DownloadTask::new(index_entry, "sha256", Side::Client);

        task.join_cache(Some(cached), &fixture.hashers);
        task.resolve_metadata(&fixture.ctx()).await;

        assert!(task.is_optional());
        assert!(!task.is_newly_optional());
        assert!(task.value());
    }

    #[test]
    fn enabling_a_disabled_option_rearms_the_download() {
        let mut task = DownloadTask::new(entry("a.txt", HELLO_SHA256), "sha256", Side::Client);
        task.up_to_date = true;
        task.working.option_value = false;

        task.set_value(false);
        assert!(task.up_to_date);
        task.set_value(true);
        assert!(!task.up_to_date);
    }

    #[test]
    fn unsupported_entry_algorithm_fails_at_join() {
        let mut index_entry = entry("a.txt", "abc");
        index_entry.hash_format = Some("crc32".into());
        let mut task = DownloadTask::new(index_entry, "sha256", Side::Client);

        task.join_cache(None, &HasherRegistry::with_defaults());

        assert!(task.failed());
        assert_eq!(task.state(), TaskState::Finished(TaskOutcome::Failed));
        let report = task.finish();
        assert!(matches!(report.failure, Some(SyncError::UnsupportedAlgorithm { .. })));
        assert!(report.entry.is_none());
    }
}
