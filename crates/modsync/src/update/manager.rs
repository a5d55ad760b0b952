use std::collections::{BTreeSet, HashMap};

use futures::stream::{self, StreamExt};
use tracing::{debug, info, info_span, warn, Instrument};

use super::launcher::{sync_multimc, LauncherStatus};
use super::task::{fetch_document, DownloadTask, TaskContext};
use super::ui::{FailureDecision, FailureReport, InstallProgress, OptionChoice, UserInterface};
use crate::core::config::{SyncConfig, UpdateOptions};
use crate::core::error::{Result, SyncError};
use crate::core::files;
use crate::core::metrics::{SyncMetrics, UpdateSummary};
use crate::hash::{Digest, HasherRegistry, DEFAULT_ALGORITHM};
use crate::manifest::{Cache, FileIndex, PackDescriptor, PackPath};
use crate::source::{CurseForgeClient, Location, SourceResolver};

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Pack digest matched the cache and every tracked file was on disk
    AlreadyUpToDate,
    Completed(UpdateSummary),
    /// The user cancelled; the cache was not written
    Cancelled,
    /// The user chose to leave the installation as it is; the cache was not written
    Ignored,
}

impl UpdateOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, UpdateOutcome::Cancelled)
    }
}

/// Runs one synchronization of a pack folder against its remote pack
pub struct UpdateManager<'a> {
    options: UpdateOptions,
    config: SyncConfig,
    resolver: &'a SourceResolver,
    hashers: &'a HasherRegistry,
    ui: &'a dyn UserInterface,
}

impl<'a> UpdateManager<'a> {
    pub fn new(
        options: UpdateOptions,
        config: SyncConfig,
        resolver: &'a SourceResolver,
        hashers: &'a HasherRegistry,
        ui: &'a dyn UserInterface,
    ) -> Self {
        Self {
            options,
            config,
            resolver,
            hashers,
            ui,
        }
    }

    pub async fn run(&self) -> Result<UpdateOutcome> {
        let span = info_span!(
            "update",
            pack = %self.options.pack_location,
            side = %self.options.side
        );
        self.run_inner().instrument(span).await
    }

    async fn run_inner(&self) -> Result<UpdateOutcome> {
        let pack_folder = self.options.pack_folder();
        let cache_path = self.options.cache_path();
        let side = self.options.side;

        let mut cache = Cache::load(&cache_path).await?;
        let side_changed = cache.cached_side != side;
        if side_changed {
            info!("Side changed from {} to {}, rechecking every file", cache.cached_side, side);
        }

        self.progress(InstallProgress::new("Loading pack file..."));
        let (pack, pack_digest) = self.fetch_pack().await?;

        if let Some(folder) = self.options.launcher_path() {
            self.progress(InstallProgress::new("Loading MultiMC pack file..."));
            match sync_multimc(&folder, &pack.versions, self.ui).await? {
                LauncherStatus::Cancelled => {
                    info!("Cancelled while updating launcher components");
                    return Ok(UpdateOutcome::Cancelled);
                }
                LauncherStatus::NotFound => info!("MultiMC not detected in {}", folder.display()),
                status => debug!(?status, "Launcher check finished"),
            }
        }

        let missing = cache.missing_on_disk(pack_folder);
        if !missing.is_empty() {
            info!("{} tracked files are missing on disk", missing.len());
        }

        if cache.pack_file_hash.as_ref() == Some(&pack_digest) && missing.is_empty() && !side_changed {
            info!("Pack {} is already up to date", pack.name);
            self.progress(InstallProgress::new("Modpack is already up to date!"));
            return Ok(UpdateOutcome::AlreadyUpToDate);
        }

        info!(
            "Updating {} {}",
            pack.name,
            pack.version.as_deref().unwrap_or_default()
        );
        let index_location = self.resolver.resolve(&self.options.pack_location, &pack.index.file)?;
        let declared_index = self.hashers.digest_of(&pack.index.hash_format, &pack.index.hash)?;

        if cache.index_file_hash.as_ref() == Some(&declared_index) && missing.is_empty() && !side_changed {
            info!("File index unchanged, only recording the new pack digest");
            cache.pack_file_hash = Some(pack_digest);
            cache.cached_side = side;
            cache.save(&cache_path).await?;
            return Ok(UpdateOutcome::Completed(UpdateSummary::default()));
        }

        self.progress(InstallProgress::new("Loading index file..."));
        let index = self.fetch_index(&index_location, &declared_index).await?;

        prune_cache(&mut cache, &index, pack_folder).await;

        let mut tasks = Vec::with_capacity(index.files.len());
        for entry in index.files {
            let mut task = DownloadTask::new(entry, &index.hash_format, side);
            if side_changed || missing.contains(task.key()) {
                task.invalidate();
            }
            let cached = cache.cached_files.get(task.key()).cloned();
            task.join_cache(cached, self.hashers);
            tasks.push(task);
        }

        let metrics = SyncMetrics::default();
        let ctx = TaskContext {
            resolver: self.resolver,
            hashers: self.hashers,
            index_location: &index_location,
            pack_folder,
            metrics: &metrics,
        };
        let total = tasks.len();
        let mut errors_occurred = false;

        self.progress(InstallProgress::new(format!("Resolving metadata for {} files...", total)));
        let (mut tasks, failed) = self.resolve_metadata(tasks, &ctx).await;
        if !failed.is_empty() {
            errors_occurred = true;
            for _ in &failed {
                metrics.record_failed();
            }
            match self.ui.present_failures(&failed, total, true) {
                FailureDecision::Continue => {}
                FailureDecision::Cancel => return Ok(UpdateOutcome::Cancelled),
                FailureDecision::Ignore => return Ok(UpdateOutcome::Ignored),
            }
        }

        if tasks
            .iter()
            .filter(|t| t.correct_side())
            .any(DownloadTask::is_newly_optional)
        {
            let mut choices: Vec<&mut dyn OptionChoice> = tasks
                .iter_mut()
                .filter(|t| t.is_optional() && t.correct_side())
                .map(|t| t as &mut dyn OptionChoice)
                .collect();
            if self.ui.present_options(&mut choices) {
                info!("Cancelled while choosing optional files");
                return Ok(UpdateOutcome::Cancelled);
            }
        }

        let (tasks, failed) = self.resolve_curseforge(tasks, &ctx).await;
        if !failed.is_empty() {
            errors_occurred = true;
            for _ in &failed {
                metrics.record_failed();
            }
            match self.ui.present_failures(&failed, total, true) {
                FailureDecision::Continue => {}
                FailureDecision::Cancel => return Ok(UpdateOutcome::Cancelled),
                FailureDecision::Ignore => return Ok(UpdateOutcome::Ignored),
            }
        }

        let download_total = tasks.len();
        let mut completed = 0;
        let mut failures = Vec::new();
        let ctx = &ctx;
        let mut downloads = stream::iter(tasks)
            .map(|mut task| async move {
                task.download(ctx).await;
                task
            })
            .buffer_unordered(self.config.max_concurrent_downloads);

        while let Some(task) = downloads.next().await {
            completed += 1;
            let report = task.finish();
            self.progress(InstallProgress::with_step(
                format!("{} ({:?})", report.name, report.outcome),
                completed,
                download_total,
            ));

            match report.entry {
                Some(entry) => {
                    cache.cached_files.insert(report.key, entry);
                }
                None => {
                    cache.cached_files.remove(&report.key);
                }
            }
            if let Some(error) = report.failure {
                metrics.record_failed();
                failures.push(FailureReport {
                    name: report.name,
                    error,
                });
            }
        }
        drop(downloads);

        if !failures.is_empty() {
            errors_occurred = true;
            match self.ui.present_failures(&failures, download_total, true) {
                FailureDecision::Continue => {}
                FailureDecision::Cancel => return Ok(UpdateOutcome::Cancelled),
                FailureDecision::Ignore => return Ok(UpdateOutcome::Ignored),
            }
        }

        if errors_occurred {
            // force a full check next time
            cache.pack_file_hash = None;
            cache.index_file_hash = None;
        } else {
            cache.pack_file_hash = Some(pack_digest);
            cache.index_file_hash = Some(declared_index);
        }
        cache.cached_side = side;
        cache.save(&cache_path).await?;

        let summary = metrics.snapshot();
        info!(
            downloaded = summary.downloaded,
            already_present = summary.already_present,
            up_to_date = summary.up_to_date,
            excluded = summary.excluded,
            failed = summary.failed,
            bytes = summary.bytes_downloaded,
            "Update finished"
        );
        self.progress(InstallProgress::new("Finished"));
        Ok(UpdateOutcome::Completed(summary))
    }

    async fn fetch_pack(&self) -> Result<(PackDescriptor, Digest)> {
        let location = &self.options.pack_location;
        let hasher = self.hashers.hasher_for(DEFAULT_ALGORITHM)?;
        let (text, digest) = fetch_document(self.resolver, location, hasher.as_ref()).await?;
        let pack = PackDescriptor::parse(&text, &location.to_string())?;
        debug!("Pack {} hashes to {}", location, digest);
        Ok((pack, digest))
    }

    async fn fetch_index(&self, location: &Location, declared: &Digest) -> Result<FileIndex> {
        let hasher = self.hashers.hasher_for(declared.algorithm())?;
        let (text, actual) = fetch_document(self.resolver, location, hasher.as_ref()).await?;
        if &actual != declared {
            return Err(SyncError::DocumentIntegrity {
                document: "file index",
                location: location.to_string(),
                expected: declared.to_string(),
                actual: actual.to_string(),
            });
        }
        FileIndex::parse(&text, &location.to_string())
    }

    /// Fetch metadata for every task and split off the ones that failed
    async fn resolve_metadata(
        &self,
        tasks: Vec<DownloadTask>,
        ctx: &TaskContext<'_>,
    ) -> (Vec<DownloadTask>, Vec<FailureReport>) {
        let resolved: Vec<DownloadTask> = stream::iter(tasks)
            .map(|mut task| async move {
                task.resolve_metadata(ctx).await;
                task
            })
            .buffer_unordered(self.config.max_concurrent_metadata)
            .collect()
            .await;

        let (mut ok, failed) = split_failed(resolved);
        ok.sort_by(|a, b| a.key().cmp(b.key()));
        (ok, failed)
    }

    /// Look up links for CurseForge downloads and split off the files that cannot be fetched
    async fn resolve_curseforge(
        &self,
        mut tasks: Vec<DownloadTask>,
        ctx: &TaskContext<'_>,
    ) -> (Vec<DownloadTask>, Vec<FailureReport>) {
        let mut lookups = Vec::new();
        for task in tasks.iter_mut() {
            if let Some(lookup) = task.curseforge_lookup(ctx).await {
                lookups.push(lookup);
            }
        }

        if !lookups.is_empty() {
            self.progress(InstallProgress::new("Resolving CurseForge metadata..."));
            let resolved = match CurseForgeClient::new(&self.config) {
                Ok(client) => client.resolve(&lookups).await,
                Err(e) => Err(e),
            };
            match resolved {
                Ok(mut resolution) => {
                    let mut failures: HashMap<PackPath, SyncError> =
                        resolution.failures.drain(..).collect();
                    for task in tasks.iter_mut() {
                        if let Some(error) = failures.remove(task.key()) {
                            task.reject(error);
                        } else if let Some(link) = resolution.links.remove(task.key()) {
                            task.set_provider_link(link);
                        }
                    }
                }
                Err(e) => {
                    warn!("CurseForge lookup failed: {}", e);
                    let reason = format!("CurseForge lookup failed: {}", e);
                    for task in tasks.iter_mut() {
                        if let Some(lookup) = lookups.iter().find(|l| l.key == *task.key()) {
                            task.reject(SyncError::Protocol {
                                location: format!("curseforge:{}/{}", lookup.project_id, lookup.file_id),
                                reason: reason.clone(),
                            });
                        }
                    }
                }
            }
        }

        split_failed(tasks)
    }

    fn progress(&self, progress: InstallProgress) {
        debug!("{}", progress);
        self.ui.report_progress(progress);
    }
}

/// Separate failed tasks, keeping the order of the rest
fn split_failed(tasks: Vec<DownloadTask>) -> (Vec<DownloadTask>, Vec<FailureReport>) {
    let (ok, failed): (Vec<_>, Vec<_>) = tasks.into_iter().partition(|t| !t.failed());
    let failed = failed.into_iter().filter_map(DownloadTask::into_failure).collect();
    (ok, failed)
}

/// Drop files the user disabled and entries that left the index
async fn prune_cache(cache: &mut Cache, index: &FileIndex, pack_folder: &std::path::Path) {
    for (key, entry) in cache.cached_files.iter_mut() {
        if entry.is_optional && !entry.option_value {
            if let Some(location) = entry.cached_location.take() {
                if let Err(e) = files::delete_if_exists(&location.to_fs_path(pack_folder)).await {
                    warn!("Could not remove disabled file {}: {}", key, e);
                }
            }
        }
    }

    let listed: BTreeSet<&PackPath> = index.files.iter().map(|f| &f.file).collect();
    let removed: Vec<PackPath> = cache
        .cached_files
        .keys()
        .filter(|key| !listed.contains(key))
        .cloned()
        .collect();

    for key in removed {
        if let Some(entry) = cache.cached_files.remove(&key) {
            if let Some(location) = entry.cached_location {
                match files::delete_if_exists(&location.to_fs_path(pack_folder)).await {
                    Ok(_) => info!("Removed {}, no longer part of the pack", location),
                    Err(e) => warn!("Could not remove {}: {}", location, e),
                }
            }
        }
    }
}
