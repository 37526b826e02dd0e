//! Command implementations.
//!
//! Commands return a [`CommandOutput`]; printing is left to [`render`] so the
//! commands themselves stay testable.

use depot_core::tools::Platform;
use depot_core::{Coordinate, Error, Result};
use depot_resolve::{Downloader, Resolution, ResolveOptions, repositories_from_config};
use depot_tools_archive::ToolBootstrapper;
use serde::Serialize;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::cli::{Cli, Commands};

/// Result of a command, printable as text or JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CommandOutput {
    /// A completed resolution.
    Resolution(Resolution),
    /// A single filesystem location.
    Path {
        /// The location.
        path: PathBuf,
    },
}

impl CommandOutput {
    fn path(path: PathBuf) -> Self {
        Self::Path { path }
    }

    /// Plain-text form: one path per line.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::Resolution(resolution) => resolution
                .binary_paths()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join("\n"),
            Self::Path { path } => path.display().to_string(),
        }
    }
}

/// Run the parsed command.
pub async fn execute(cli: &Cli, cancel: CancellationToken) -> Result<CommandOutput> {
    let config = cli.load_config()?;

    match &cli.command {
        Commands::Resolve { coordinates, .. } => {
            let coordinates = parse_coordinates(coordinates)?;
            if config.repositories.is_empty() {
                return Err(Error::configuration(
                    "no repositories configured; add [[repositories]] to depot.toml or pass --repo",
                ));
            }

            let downloader = Downloader::new(
                cli.local_cache(&config)?,
                repositories_from_config(&config.repositories)?,
                ResolveOptions::from_config(&config),
            );
            let resolution = downloader
                .resolve_with_cancellation(&coordinates, cancel)
                .await?;
            for conflict in &resolution.conflicts {
                warn!(
                    kept = %conflict.kept,
                    discarded = %conflict.discarded,
                    "Version conflict"
                );
            }
            Ok(CommandOutput::Resolution(resolution))
        }
        Commands::Locate {
            coordinate,
            descriptor,
        } => {
            let coordinate: Coordinate = coordinate.parse()?;
            let cache = cli.local_cache(&config)?;
            let path = if *descriptor {
                cache.locate_descriptor(&coordinate)
            } else {
                cache.locate(&coordinate)
            };
            if cache.is_absent(&coordinate) {
                warn!(%coordinate, "Not cached");
            }
            Ok(CommandOutput::path(path))
        }
        Commands::Install {
            tool,
            version,
            platform,
        } => {
            let platform = match platform {
                Some(key) => key.parse()?,
                None => Platform::current()?,
            };
            let spec = config.tool(tool)?;
            let executable = ToolBootstrapper::from_config(&config)?
                .ensure_installed_with_cancellation(tool, spec, version, &platform, cancel)
                .await?;
            Ok(CommandOutput::path(executable))
        }
        Commands::CacheDir => Ok(CommandOutput::path(
            cli.local_cache(&config)?.location().to_path_buf(),
        )),
    }
}

fn parse_coordinates(raw: &[String]) -> Result<Vec<Coordinate>> {
    raw.iter().map(|s| s.parse()).collect()
}

/// Print a command's output to stdout.
#[allow(clippy::print_stdout)]
pub fn render(output: &CommandOutput, json: bool) -> miette::Result<()> {
    if json {
        let text = serde_json::to_string_pretty(output)
            .map_err(|e| miette::miette!("Failed to serialize output: {e}"))?;
        println!("{text}");
    } else {
        let text = output.to_text();
        if !text.is_empty() {
            println!("{text}");
        }
    }
    Ok(())
}
