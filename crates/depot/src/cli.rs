//! Command-line definition.

use clap::{Parser, Subcommand};
use depot_core::{DepotConfig, Error, LocalCache, RepositoryConfig, Result};
use std::path::PathBuf;

use crate::tracing::{LogLevel, TracingFormat};

/// Resolve build artifacts into a local cache and bootstrap versioned tools.
#[derive(Parser, Debug)]
#[command(name = "depot")]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (default: nearest depot.toml).
    #[arg(long, short = 'c', global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Artifact cache root, overriding configuration and DEPOT_CACHE_DIR.
    #[arg(long, global = true, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Repository URL or directory (repeatable, in fallback order).
    /// Replaces the configured repositories.
    #[arg(long = "repo", short = 'r', global = true, value_name = "URL", action = clap::ArgAction::Append)]
    pub repositories: Vec<String>,

    /// Emit JSON instead of plain text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Logging verbosity level.
    #[arg(short = 'L', long, global = true, default_value = "warn", value_enum)]
    pub log_level: LogLevel,

    /// Log output format.
    #[arg(long, global = true, default_value = "compact", value_enum)]
    pub log_format: TracingFormat,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Resolve coordinates and their dependencies into the cache.
    Resolve {
        /// Coordinates as group:name:version.
        #[arg(required = true, value_name = "COORDINATE")]
        coordinates: Vec<String>,
        /// Re-download entries that are already cached.
        #[arg(long)]
        force: bool,
        /// Maximum concurrent downloads.
        #[arg(long, short = 'j', value_name = "N")]
        parallelism: Option<usize>,
    },
    /// Print where a coordinate is (or would be) cached.
    Locate {
        /// Coordinate as group:name:version.
        #[arg(value_name = "COORDINATE")]
        coordinate: String,
        /// Print the descriptor path instead of the binary path.
        #[arg(long)]
        descriptor: bool,
    },
    /// Install a tool version from its configured archive.
    Install {
        /// Tool name from [tools.specs].
        tool: String,
        /// Version to install.
        version: String,
        /// Target platform as os-arch (default: this machine).
        #[arg(long, value_name = "OS-ARCH")]
        platform: Option<String>,
    },
    /// Print the artifact cache root.
    CacheDir,
}

impl Cli {
    /// Load configuration and apply command-line overrides.
    pub fn load_config(&self) -> Result<DepotConfig> {
        let mut config = match &self.config {
            Some(path) => DepotConfig::load(path)?,
            None => {
                let cwd = std::env::current_dir()
                    .map_err(|e| Error::io_no_path(e, "resolve current directory"))?;
                DepotConfig::load_or_default(&cwd)?
            }
        };

        if !self.repositories.is_empty() {
            config.repositories = self
                .repositories
                .iter()
                .map(|url| RepositoryConfig::new(url.as_str()))
                .collect();
        }
        if let Commands::Resolve {
            force, parallelism, ..
        } = &self.command
        {
            config.resolve.force |= *force;
            if let Some(n) = parallelism {
                config.resolve.parallelism = *n;
            }
        }
        Ok(config)
    }

    /// Cache selected by `--cache-dir`, else by configuration.
    pub fn local_cache(&self, config: &DepotConfig) -> Result<LocalCache> {
        match &self.cache_dir {
            Some(dir) => Ok(LocalCache::new(dir)),
            None => config.local_cache(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resolve() {
        let cli = Cli::try_parse_from([
            "depot",
            "resolve",
            "g:a:1",
            "g:b:2",
            "--force",
            "-j",
            "4",
            "--repo",
            "https://one",
            "-r",
            "/srv/two",
        ])
        .unwrap();

        assert_eq!(
            cli.command,
            Commands::Resolve {
                coordinates: vec!["g:a:1".into(), "g:b:2".into()],
                force: true,
                parallelism: Some(4),
            }
        );
        assert_eq!(cli.repositories, vec!["https://one", "/srv/two"]);
        assert_eq!(cli.log_level, LogLevel::Warn);
    }

    #[test]
    fn test_resolve_requires_coordinates() {
        assert!(Cli::try_parse_from(["depot", "resolve"]).is_err());
    }

    #[test]
    fn test_parse_install() {
        let cli =
            Cli::try_parse_from(["depot", "install", "jq", "1.7", "--platform", "linux-x86_64"])
                .unwrap();
        assert_eq!(
            cli.command,
            Commands::Install {
                tool: "jq".into(),
                version: "1.7".into(),
                platform: Some("linux-x86_64".into()),
            }
        );
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["depot", "cache-dir", "--json", "-L", "debug"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.log_level, LogLevel::Debug);
        assert_eq!(cli.command, Commands::CacheDir);
    }

    #[test]
    fn test_overrides_applied() {
        let temp = tempfile::TempDir::new().unwrap();
        let config = temp.path().join("depot.toml");
        std::fs::write(
            &config,
            "[resolve]\nparallelism = 2\n\n[[repositories]]\nurl = \"https://configured\"\n",
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "depot",
            "--config",
            config.to_str().unwrap(),
            "resolve",
            "g:a:1",
            "-j",
            "16",
            "--repo",
            "https://override",
        ])
        .unwrap();
        let loaded = cli.load_config().unwrap();

        assert_eq!(loaded.resolve.parallelism, 16);
        assert_eq!(loaded.repositories.len(), 1);
        assert_eq!(loaded.repositories[0].url, "https://override");
    }

    #[test]
    fn test_cache_dir_flag_wins() {
        let cli = Cli::try_parse_from(["depot", "--cache-dir", "/tmp/flag", "cache-dir"]).unwrap();
        let cache = cli.local_cache(&DepotConfig::default()).unwrap();
        assert_eq!(cache.location(), std::path::Path::new("/tmp/flag"));
    }
}
