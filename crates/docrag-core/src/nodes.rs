//! Loading of node files produced by the document extraction service.
//!
//! A node file is a JSON array of [`DocumentNode`]s. The document id of a file
//! is its stem (`reports/q3.json` indexes as `q3`).

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::types::DocumentNode;

pub fn load_nodes(path: &Path) -> Result<Vec<DocumentNode>> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading node file {}", path.display()))?;
    let nodes: Vec<DocumentNode> =
        serde_json::from_str(&raw).with_context(|| format!("parsing node file {}", path.display()))?;
    debug!(path = %path.display(), nodes = nodes.len(), bytes = raw.len(), "loaded node file");
    Ok(nodes)
}

/// `root` itself when it is a file, otherwise every `*.json` file below it in
/// sorted order.
pub fn discover_node_files(root: &Path) -> Vec<PathBuf> {
    if root.is_file() {
        return vec![root.to_path_buf()];
    }
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json")))
        .collect();
    files.sort();
    debug!(root = %root.display(), files = files.len(), "discovered node files");
    files
}

pub fn document_id_for(path: &Path) -> Option<String> {
    path.file_stem().map(|s| s.to_string_lossy().to_string()).filter(|s| !s.is_empty())
}
