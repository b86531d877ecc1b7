// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::{Context, Result};
use glob::glob;
use std::path::{Path, PathBuf};

use crate::pipeline::Artifact;

/// Resolve a source argument (file, directory or glob pattern) into the
/// list of local files to ship, in path order.
pub fn resolve_source_files(source: &Path) -> Result<Vec<PathBuf>> {
    let source_str = source.to_string_lossy();

    // Check if it's a glob pattern (contains *, ?, [, ])
    if source_str.contains('*') || source_str.contains('?') || source_str.contains('[') {
        let mut files = Vec::new();
        for entry in
            glob(&source_str).with_context(|| format!("Invalid glob pattern: {source_str}"))?
        {
            match entry {
                Ok(path) if path.is_file() => files.push(path),
                Ok(path) if path.is_dir() => files.extend(walk_directory(&path)?),
                Ok(_) => {}
                Err(e) => tracing::warn!("Failed to read glob entry: {}", e),
            }
        }
        files.sort();
        Ok(files)
    } else if source.is_file() {
        Ok(vec![source.to_path_buf()])
    } else if source.is_dir() {
        let mut files = walk_directory(source)?;
        files.sort();
        Ok(files)
    } else {
        anyhow::bail!("Source does not exist: {source:?}");
    }
}

// Helper function to recursively walk a directory and collect all files
pub fn walk_directory(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let metadata = entry.metadata()?;

        if metadata.is_file() {
            files.push(path);
        } else if metadata.is_dir() {
            // Recursively walk subdirectories
            files.extend(walk_directory(&path)?);
        }
        // Skip symlinks and other special files
    }

    Ok(files)
}

/// Read the resolved source files into pipeline artifacts. Each
/// artifact's relative path is taken against `base` when the file lives
/// under it, else it collapses to the bare file name.
pub async fn collect_artifacts(files: &[PathBuf], base: &Path) -> Result<Vec<Artifact>> {
    let mut artifacts = Vec::with_capacity(files.len());
    for file in files {
        let relative = file
            .strip_prefix(base)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| {
                file.file_name()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| file.clone())
            });
        let contents = tokio::fs::read(file)
            .await
            .with_context(|| format!("Failed to read {}", file.display()))?;
        artifacts.push(Artifact::new(relative, contents));
    }
    Ok(artifacts)
}

// Helper function to format bytes in human-readable format
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}
