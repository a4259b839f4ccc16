//! File configuration for CLI defaults.
//!
//! Read from `$XDG_CONFIG_HOME/ripper/config.toml`, falling back to
//! `$HOME/.config/ripper/config.toml`. The format is a flat list of
//! `key = value` lines:
//!
//! ```text
//! # where album folders go
//! output_dir = "/data/rips"
//! concurrency = 4
//! max_retries = 5
//! overwrite = false
//! user_agent = "Mozilla/5.0 ..."
//! ```
//!
//! Values given on the command line win over values from the file.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{ArgMatches, CommandFactory, FromArgMatches, parser::ValueSource};
use ripper_core::{RetryPolicy, RipConfig};

use crate::cli::Args;

/// Values read from the config file. `None` means "not set".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// Root directory for album folders.
    pub output_dir: Option<PathBuf>,
    /// Concurrent downloads (1..=100).
    pub concurrency: Option<u8>,
    /// Attempts per file (0..=10).
    pub max_retries: Option<u8>,
    /// Replace existing files.
    pub overwrite: Option<bool>,
    /// User-Agent header for every request.
    pub user_agent: Option<String>,
}

impl FileConfig {
    /// Validates values against the same ranges the CLI enforces.
    pub fn validate(&self) -> Result<()> {
        if let Some(concurrency) = self.concurrency
            && !(1..=100).contains(&concurrency)
        {
            bail!("Invalid config value for `concurrency`: {concurrency}. Expected range: 1..=100");
        }
        if let Some(max_retries) = self.max_retries
            && max_retries > 10
        {
            bail!("Invalid config value for `max_retries`: {max_retries}. Expected range: 0..=10");
        }
        if let Some(user_agent) = &self.user_agent
            && user_agent.trim().is_empty()
        {
            bail!("Invalid config value for `user_agent`: must not be empty");
        }
        Ok(())
    }
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub path: Option<PathBuf>,
    /// Parsed file config when a config file exists.
    pub config: Option<FileConfig>,
}

/// Which options were given explicitly on the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct CliValueSources {
    pub output_dir: bool,
    pub concurrency: bool,
    pub max_retries: bool,
    pub overwrite: bool,
}

/// Parses arguments, remembering which ones came from the command line.
pub fn parse_cli_with_sources() -> (Args, CliValueSources) {
    let matches = Args::command().get_matches();
    let args = Args::from_arg_matches(&matches).unwrap_or_else(|err| err.exit());

    let sources = CliValueSources {
        output_dir: is_commandline_value(&matches, "output_dir"),
        concurrency: is_commandline_value(&matches, "concurrency"),
        max_retries: is_commandline_value(&matches, "max_retries"),
        overwrite: is_commandline_value(&matches, "overwrite"),
    };
    (args, sources)
}

fn is_commandline_value(matches: &ArgMatches, id: &str) -> bool {
    matches.value_source(id) == Some(ValueSource::CommandLine)
}

/// Merges CLI arguments and file config into a [`RipConfig`].
#[must_use]
pub fn resolve_rip_config(
    args: &Args,
    sources: &CliValueSources,
    file_config: Option<&FileConfig>,
) -> RipConfig {
    let mut config = RipConfig::default();
    let file = file_config.cloned().unwrap_or_default();

    if let Some(output_dir) = &args.output_dir {
        config.output_dir.clone_from(output_dir);
    } else if !sources.output_dir
        && let Some(output_dir) = file.output_dir
    {
        config.output_dir = output_dir;
    }

    let concurrency = match file.concurrency {
        Some(value) if !sources.concurrency => value,
        _ => args.concurrency,
    };
    config.concurrency = usize::from(concurrency);

    let max_retries = match file.max_retries {
        Some(value) if !sources.max_retries => value,
        _ => args.max_retries,
    };
    config.retry_policy = RetryPolicy::with_max_attempts(u32::from(max_retries));

    config.overwrite = match file.overwrite {
        Some(value) if !sources.overwrite => value,
        _ => args.overwrite,
    };

    if let Some(user_agent) = file.user_agent {
        config.user_agent = user_agent;
    }

    config
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/ripper/config.toml`
/// 2. `$HOME/.config/ripper/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("ripper")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("ripper")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from the default path if present.
pub fn load_default_file_config() -> Result<LoadedConfig> {
    let path = resolve_default_config_path();
    let config = match path.as_deref() {
        Some(path_ref) if path_ref.exists() => Some(load_file_config(path_ref)?),
        _ => None,
    };
    Ok(LoadedConfig { path, config })
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line_number = line_index + 1;
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_number}: expected key = value");
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let invalid = || format!("Invalid `{key}` value on line {line_number}");

        match key {
            "output_dir" => {
                cfg.output_dir = Some(PathBuf::from(
                    parse_string_literal(value).with_context(invalid)?,
                ));
            }
            "concurrency" => {
                cfg.concurrency = Some(parse_integer_u8(value).with_context(invalid)?);
            }
            "max_retries" => {
                cfg.max_retries = Some(parse_integer_u8(value).with_context(invalid)?);
            }
            "overwrite" => {
                cfg.overwrite = Some(parse_boolean(value).with_context(invalid)?);
            }
            "user_agent" => {
                cfg.user_agent = Some(parse_string_literal(value).with_context(invalid)?);
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_number}");
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u8(raw_value: &str) -> Result<u8> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<u16>()?;
    u8::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u8"))
}

fn parse_boolean(raw_value: &str) -> Result<bool> {
    match raw_value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => bail!("Expected 'true' or 'false'"),
    }
}
