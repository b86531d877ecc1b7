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
use clap::Parser;
use owo_colors::OwoColorize;

use bship::{
    cli::Cli,
    config::ShipConfig,
    pipeline::Uploader,
    utils::fs::{collect_artifacts, format_bytes, resolve_source_files},
    utils::init_logging,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let mut config = ShipConfig::load(&cli.config).await?;
    cli.apply_to(&mut config);
    config.validate()?;
    config.apply_auth_profile().await?;

    let files = resolve_source_files(&cli.source)?;
    if files.is_empty() {
        anyhow::bail!("No files found under {:?}", cli.source);
    }

    let base = if cli.source.is_dir() {
        cli.source.clone()
    } else {
        cli.source
            .parent()
            .map(std::path::Path::to_path_buf)
            .unwrap_or_else(|| cli.source.clone())
    };
    let artifacts = collect_artifacts(&files, &base).await?;

    let total_bytes: u64 = artifacts
        .iter()
        .filter_map(|a| a.contents.as_ref())
        .map(|c| c.len() as u64)
        .sum();
    println!(
        "\n{} {} {} file(s) ({}) to {} {}",
        "▶".cyan(),
        "Shipping".cyan().bold(),
        artifacts.len().to_string().yellow(),
        format_bytes(total_bytes).yellow(),
        config.host.green(),
        format!("({})", config.remote_path).dimmed()
    );

    let mut uploader = Uploader::new(config)
        .context("Failed to set up the upload session")?
        .on_close(|| tracing::debug!("transport closed"));

    for artifact in artifacts {
        uploader
            .push(artifact)
            .await
            .context("Upload session failed")?;
    }

    let summary = uploader.finish().await.context("Upload session failed")?;

    if summary.completed > 0 {
        println!(
            "{} {} file(s) uploaded",
            "✓".green(),
            summary.completed.to_string().green().bold()
        );
    } else {
        println!("{} {}", "!".yellow(), "No files uploaded".yellow());
    }
    if summary.failed > 0 {
        println!(
            "{} {} file(s) failed",
            "✗".red(),
            summary.failed.to_string().red().bold()
        );
        std::process::exit(1);
    }

    Ok(())
}
