//! MultiMC instance versions
//!
//! A MultiMC instance pins Minecraft and its mod loader in `mmc-pack.json`. When the pack asks
//! for different versions, the outdated components are dropped and re-added with the versions
//! from the pack descriptor; MultiMC fills in the rest of their metadata on the next launch.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde_json::{json, Value};
use tracing::{debug, info};

use super::ui::{ComponentChange, LauncherDecision, UserInterface};
use crate::core::error::{FileOperation, Result, SyncError};
use crate::core::files;

pub const MULTIMC_MANIFEST: &str = "mmc-pack.json";

/// MultiMC component uid and the pack's name for it
const COMPONENTS: [(&str, &str); 5] = [
    ("net.minecraft", "minecraft"),
    ("net.minecraftforge", "forge"),
    ("net.fabricmc.fabric-loader", "fabric"),
    ("org.quiltmc.quilt-loader", "quilt"),
    ("com.mumfrey.liteloader", "liteloader"),
];

/// Mappings that must match the Minecraft version exactly
const INTERMEDIARY: &str = "net.fabricmc.intermediary";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LauncherStatus {
    /// No `mmc-pack.json`; not a MultiMC instance
    NotFound,
    Unchanged,
    Updated,
    /// Changes were needed but the user chose to leave the instance alone
    Skipped,
    Cancelled,
}

/// Bring the instance in `folder` in line with the pack's component versions
pub async fn sync_multimc(
    folder: &Path,
    versions: &BTreeMap<String, String>,
    ui: &dyn UserInterface,
) -> Result<LauncherStatus> {
    let path = folder.join(MULTIMC_MANIFEST);
    let text = match tokio::fs::read_to_string(&path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(LauncherStatus::NotFound),
        Err(e) => return Err(SyncError::file_system(&path, FileOperation::Read, e)),
    };
    let invalid = |reason: String| SyncError::LauncherManifest {
        path: path.clone(),
        reason,
    };

    let mut manifest: Value =
        serde_json::from_str(&text).map_err(|e| invalid(format!("not valid JSON: {}", e)))?;
    info!("Loaded MultiMC instance {}", path.display());

    let changes = plan_components(&mut manifest, versions).map_err(invalid)?;
    if changes.is_empty() {
        debug!("MultiMC components already match the pack");
        return Ok(LauncherStatus::Unchanged);
    }

    match ui.confirm_launcher_update(&changes) {
        LauncherDecision::Cancel => return Ok(LauncherStatus::Cancelled),
        LauncherDecision::Skip => {
            info!("Leaving {} as it is", path.display());
            return Ok(LauncherStatus::Skipped);
        }
        LauncherDecision::Update => {}
    }

    let contents = serde_json::to_vec_pretty(&manifest)
        .map_err(|e| invalid(format!("cannot encode: {}", e)))?;
    files::write_atomically(&path, &contents).await?;
    info!("Updated {} component versions in {}", changes.len(), path.display());
    Ok(LauncherStatus::Updated)
}

/// Rewrite the component list in place and describe what changed.
///
/// Components for loaders the pack does not mention are left alone.
fn plan_components(
    manifest: &mut Value,
    versions: &BTreeMap<String, String>,
) -> std::result::Result<Vec<ComponentChange>, String> {
    let object = manifest
        .as_object_mut()
        .ok_or_else(|| "top level is not an object".to_string())?;
    match object.get("formatVersion").and_then(Value::as_i64) {
        Some(1) => {}
        other => return Err(format!("unsupported format version {:?}", other)),
    }
    let components = object
        .get_mut("components")
        .and_then(Value::as_array_mut)
        .ok_or_else(|| "no components list".to_string())?;

    let mut found: HashMap<&str, Option<String>> = HashMap::new();
    components.retain(|component| {
        let uid = component.get("uid").and_then(Value::as_str);
        let Some(&(_, name)) = COMPONENTS.iter().find(|(known, _)| Some(*known) == uid) else {
            return true;
        };
        let version = component
            .get("version")
            .and_then(Value::as_str)
            .map(str::to_string);
        let keep = match versions.get(name) {
            Some(wanted) => version.as_deref() == Some(wanted.as_str()),
            None => true,
        };
        found.insert(name, version);
        keep
    });

    let mut changes = Vec::new();
    for (uid, name) in COMPONENTS {
        let Some(wanted) = versions.get(name) else {
            continue;
        };
        let current = found.get(name).cloned().flatten();
        if current.as_deref() == Some(wanted.as_str()) {
            continue;
        }
        components.push(json!({ "uid": uid, "version": wanted }));
        changes.push(ComponentChange {
            component: name.to_string(),
            current,
            wanted: Some(wanted.clone()),
        });
    }

    if let Some(minecraft) = versions.get("minecraft") {
        let stale = components.iter().position(|c| {
            c.get("uid").and_then(Value::as_str) == Some(INTERMEDIARY)
                && c.get("version").and_then(Value::as_str) != Some(minecraft.as_str())
        });
        if let Some(index) = stale {
            let removed = components.remove(index);
            changes.push(ComponentChange {
                component: "intermediary".to_string(),
                current: removed.get("version").and_then(Value::as_str).map(str::to_string),
                wanted: None,
            });
        }
    }

    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::update::ui::{FailureDecision, FailureReport, InstallProgress, OptionChoice};
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct Answer {
        decision: LauncherDecision,
        asked: Mutex<Vec<ComponentChange>>,
    }

    impl Answer {
        fn new(decision: LauncherDecision) -> Self {
            Self {
                decision,
                asked: Mutex::new(Vec::new()),
            }
        }
    }

    impl UserInterface for Answer {
        fn report_progress(&self, _progress: InstallProgress) {}

        fn present_failures(&self, _: &[FailureReport], _: usize, _: bool) -> FailureDecision {
            FailureDecision::Cancel
        }

        fn present_options(&self, _: &mut [&mut dyn OptionChoice]) -> bool {
            false
        }

        fn confirm_launcher_update(&self, changes: &[ComponentChange]) -> LauncherDecision {
            self.asked.lock().unwrap().extend_from_slice(changes);
            self.decision
        }

        fn report_fatal(&self, _error: &SyncError) {}
    }

    const INSTANCE: &str = r#"{
    "formatVersion": 1,
    "components": [
        { "uid": "org.lwjgl3", "version": "3.3.1" },
        { "uid": "net.minecraft", "version": "1.20.1", "important": true },
        { "uid": "net.fabricmc.intermediary", "version": "1.19.4" },
        { "uid": "net.fabricmc.fabric-loader", "version": "0.14.21" },
        { "uid": "net.minecraftforge", "version": "47.1.0" }
    ]
}"#;

    fn pack_versions() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("minecraft".to_string(), "1.20.1".to_string()),
            ("fabric".to_string(), "0.15.0".to_string()),
        ])
    }

    fn uids(path: &Path) -> Vec<(String, String)> {
        let manifest: Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        manifest["components"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| {
                (
                    c["uid"].as_str().unwrap().to_string(),
                    c["version"].as_str().unwrap_or_default().to_string(),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn missing_manifest_means_no_launcher() {
        let dir = tempdir().unwrap();
        let ui = Answer::new(LauncherDecision::Update);
        let status = sync_multimc(dir.path(), &pack_versions(), &ui).await.unwrap();
        assert_eq!(status, LauncherStatus::NotFound);
        assert!(ui.asked.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn outdated_loader_is_replaced_and_stale_mappings_dropped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(MULTIMC_MANIFEST);
        std::fs::write(&path, INSTANCE).unwrap();
        let ui = Answer::new(LauncherDecision::Update);

        let status = sync_multimc(dir.path(), &pack_versions(), &ui).await.unwrap();

        assert_eq!(status, LauncherStatus::Updated);
        let components = uids(&path);
        assert!(components.contains(&("org.lwjgl3".to_string(), "3.3.1".to_string())));
        assert!(components.contains(&("net.minecraft".to_string(), "1.20.1".to_string())));
        assert!(components.contains(&("net.fabricmc.fabric-loader".to_string(), "0.15.0".to_string())));
        // the pack says nothing about forge
        assert!(components.contains(&("net.minecraftforge".to_string(), "47.1.0".to_string())));
        assert!(!components.iter().any(|(uid, _)| uid == INTERMEDIARY));

        let asked = ui.asked.lock().unwrap();
        assert_eq!(asked.len(), 2);
        assert_eq!(asked[0].component, "fabric");
        assert_eq!(asked[0].current.as_deref(), Some("0.14.21"));
        assert_eq!(asked[1].component, "intermediary");
        assert_eq!(asked[1].wanted, None);
    }

    #[tokio::test]
    async fn matching_instance_is_left_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(MULTIMC_MANIFEST);
        let current = r#"{"formatVersion":1,"components":[{"uid":"net.minecraft","version":"1.20.1"},{"uid":"net.fabricmc.fabric-loader","version":"0.15.0"}]}"#;
        std::fs::write(&path, current).unwrap();
        let ui = Answer::new(LauncherDecision::Update);

        let status = sync_multimc(dir.path(), &pack_versions(), &ui).await.unwrap();

        assert_eq!(status, LauncherStatus::Unchanged);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), current);
    }

    #[tokio::test]
    async fn declining_keeps_the_file_as_it_was() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(MULTIMC_MANIFEST);
        std::fs::write(&path, INSTANCE).unwrap();

        let skipped = sync_multimc(dir.path(), &pack_versions(), &Answer::new(LauncherDecision::Skip))
            .await
            .unwrap();
        assert_eq!(skipped, LauncherStatus::Skipped);
        let cancelled = sync_multimc(dir.path(), &pack_versions(), &Answer::new(LauncherDecision::Cancel))
            .await
            .unwrap();
        assert_eq!(cancelled, LauncherStatus::Cancelled);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), INSTANCE);
    }

    #[tokio::test]
    async fn unknown_format_version_is_an_error() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(MULTIMC_MANIFEST),
            r#"{"formatVersion":2,"components":[]}"#,
        )
        .unwrap();

        let err = sync_multimc(dir.path(), &pack_versions(), &Answer::new(LauncherDecision::Update))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SyncError::LauncherManifest { reason, .. } if reason.contains("format version")));
    }
}
