//! Auto-discovery of tool manuals.
//!
//! Scans configured directories for manual descriptor files and registers
//! each one with the tool client. A descriptor that fails to parse or
//! register is logged and skipped; discovery itself only fails on IO errors
//! walking a directory tree.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::{CallTemplate, Error, Result, ToolClient};

/// File name suffixes recognized as manual descriptors.
pub const MANUAL_SUFFIXES: [&str; 5] = [
    ".utcp.json",
    ".utcp.yaml",
    ".utcp.yml",
    "openapi.json",
    "swagger.json",
];

pub struct DiscoveryLayer {
    client: Arc<dyn ToolClient>,
    paths: Vec<PathBuf>,
    registered: RwLock<Vec<PathBuf>>,
}

impl DiscoveryLayer {
    pub fn new(client: Arc<dyn ToolClient>, paths: Vec<PathBuf>) -> Self {
        Self {
            client,
            paths,
            registered: RwLock::new(Vec::new()),
        }
    }

    /// Scan every configured path and register the manuals found.
    /// Returns the number of manuals registered.
    pub async fn discover_and_register(&self) -> Result<usize> {
        let mut total = 0;

        for path in &self.paths {
            if !path.exists() {
                warn!(path = %path.display(), "Discovery path does not exist");
                continue;
            }

            let mut files = Vec::new();
            scan_dir(path, &mut files)?;
            files.sort();

            for file in files {
                match self.register_manual(&file).await {
                    Ok(()) => {
                        info!(manual = %file.display(), "Registered manual");
                        total += 1;
                    }
                    Err(e) => error!(manual = %file.display(), "Failed to register: {}", e),
                }
            }
        }

        info!(total, "Auto-discovery complete");
        Ok(total)
    }

    /// Register a single manual descriptor file with the tool client.
    ///
    /// The descriptor must parse as JSON or YAML before it is handed off.
    pub async fn register_manual(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(Error::Discovery(format!(
                "Manual not found: {}",
                path.display()
            )));
        }

        let raw = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => {
                serde_json::from_str::<serde_json::Value>(&raw)
                    .map_err(|e| Error::Discovery(format!("{}: {e}", path.display())))?;
            }
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str::<serde_yaml::Value>(&raw)
                    .map_err(|e| Error::Discovery(format!("{}: {e}", path.display())))?;
            }
            _ => {
                return Err(Error::Discovery(format!(
                    "Unsupported manual format: {}",
                    path.display()
                )))
            }
        }

        self.client
            .register_manual(CallTemplate::Text {
                name: manual_name(path),
                file_path: path.display().to_string(),
            })
            .await?;

        let mut registered = self.registered.write().await;
        registered.push(path.to_path_buf());
        Ok(())
    }

    /// Register a manual served from a remote endpoint, e.g. an OpenAPI spec.
    pub async fn register_from_url(&self, name: &str, url: &str) -> Result<()> {
        self.client
            .register_manual(CallTemplate::Http {
                name: name.to_string(),
                http_method: "GET".to_string(),
                url: url.to_string(),
                content_type: "application/json".to_string(),
            })
            .await
    }

    /// Paths of all manuals registered so far.
    pub async fn registered_manuals(&self) -> Vec<PathBuf> {
        self.registered.read().await.clone()
    }
}

fn is_manual_file(path: &Path) -> bool {
    match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => MANUAL_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)),
        None => false,
    }
}

fn scan_dir(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        // Never followed: a symlinked directory may cycle.
        if entry.file_type()?.is_symlink() && path.is_dir() {
            warn!(path = %path.display(), "Skipping symlinked directory");
            continue;
        }
        if path.is_dir() {
            scan_dir(&path, files)?;
        } else if is_manual_file(&path) {
            files.push(path);
        }
    }
    Ok(())
}

/// Derive the manual name from its file name: `betfair.utcp.json` -> `betfair`.
fn manual_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("manual");
    stem.strip_suffix(".utcp").unwrap_or(stem).to_string()
}
