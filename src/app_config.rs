//! Application configuration loading for CLI defaults.
//!
//! The file uses a flat `key = value` subset of TOML:
//!
//! ```toml
//! output_dir = "/data/downloads"
//! concurrency = 4
//! connect_timeout_secs = 10
//! read_timeout_secs = 60
//! progress_interval_ms = 500
//! verbosity = "quiet"
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use rangeget_core::EngineConfig;

use crate::cli::Args;

/// File configuration; every field is optional and CLI flags win.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// Base output directory.
    pub output_dir: Option<PathBuf>,
    /// Worker pool size (same range as CLI).
    pub concurrency: Option<u8>,
    pub connect_timeout_secs: Option<u64>,
    pub read_timeout_secs: Option<u64>,
    /// Minimum delay between progress events of one task.
    pub progress_interval_ms: Option<u64>,
    /// Default verbosity when neither `-v` nor `-q` is given.
    pub verbosity: Option<VerbositySetting>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(concurrency) = self.concurrency
            && !(1..=100).contains(&concurrency)
        {
            bail!("Invalid config value for `concurrency`: {concurrency}. Expected range: 1..=100");
        }
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("read_timeout_secs", self.read_timeout_secs)?;
        if let Some(interval) = self.progress_interval_ms
            && interval > 60_000
        {
            bail!(
                "Invalid config value for `progress_interval_ms`: {interval}. Expected range: 0..=60000"
            );
        }
        Ok(())
    }
}

fn validate_timeout_secs(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=3600).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=3600");
    }
    Ok(())
}

/// Supported config verbosity labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbositySetting {
    Default,
    Verbose,
    Quiet,
    Debug,
}

impl VerbositySetting {
    /// Log level used when `RUST_LOG` is unset.
    #[must_use]
    pub fn log_level(self) -> &'static str {
        match self {
            Self::Default => "info",
            Self::Verbose | Self::Debug => "debug",
            Self::Quiet => "error",
        }
    }
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/rangeget/config.toml`
/// 2. `$HOME/.config/rangeget/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("rangeget")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("rangeget")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from the default path; an absent file yields defaults.
pub fn load_default_file_config() -> Result<FileConfig> {
    match resolve_default_config_path() {
        Some(path) if path.exists() => load_file_config(&path),
        _ => Ok(FileConfig::default()),
    }
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
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }
        let line_no = line_index + 1;

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_no}: expected key = value");
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let context = || format!("Invalid `{key}` value on line {line_no}");

        match key {
            "output_dir" => {
                cfg.output_dir = Some(PathBuf::from(
                    parse_string_literal(value).with_context(context)?,
                ));
            }
            "concurrency" => {
                cfg.concurrency = Some(parse_integer_u8(value).with_context(context)?);
            }
            "connect_timeout_secs" => {
                cfg.connect_timeout_secs = Some(parse_integer_u64(value).with_context(context)?);
            }
            "read_timeout_secs" => {
                cfg.read_timeout_secs = Some(parse_integer_u64(value).with_context(context)?);
            }
            "progress_interval_ms" => {
                cfg.progress_interval_ms = Some(parse_integer_u64(value).with_context(context)?);
            }
            "verbosity" => {
                let parsed = parse_string_literal(value).with_context(context)?;
                cfg.verbosity = Some(parse_verbosity(&parsed).with_context(|| {
                    format!("Invalid `verbosity` value '{parsed}' on line {line_no}")
                })?);
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_no}");
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
    let value = parse_integer_u64(raw_value)?;
    u8::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u8"))
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

fn parse_verbosity(value: &str) -> Result<VerbositySetting> {
    match value {
        "default" => Ok(VerbositySetting::Default),
        "verbose" => Ok(VerbositySetting::Verbose),
        "quiet" => Ok(VerbositySetting::Quiet),
        "debug" => Ok(VerbositySetting::Debug),
        _ => bail!("Expected one of: default, verbose, quiet, debug"),
    }
}

/// Merges CLI flags over the file config over engine defaults.
pub fn build_engine_config(args: &Args, file: &FileConfig) -> EngineConfig {
    let mut config = EngineConfig::default();
    if let Some(dir) = args.output_dir.clone().or_else(|| file.output_dir.clone()) {
        config.base_dir = dir;
    }
    if let Some(concurrency) = args.concurrency.or(file.concurrency) {
        config.concurrency = usize::from(concurrency);
    }
    if let Some(secs) = args.connect_timeout.or(file.connect_timeout_secs) {
        config.connect_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = args.read_timeout.or(file.read_timeout_secs) {
        config.read_timeout = Duration::from_secs(secs);
    }
    if let Some(millis) = file.progress_interval_ms {
        config.progress_interval = Duration::from_millis(millis);
    }
    config
}

/// Default log level: quiet flag, then verbose count, then file verbosity.
pub fn resolve_default_log_level(args: &Args, file: &FileConfig) -> &'static str {
    if args.quiet {
        return "error";
    }
    match args.verbose {
        0 => file.verbosity.map_or("info", VerbositySetting::log_level),
        1 => "debug",
        _ => "trace",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_parse_config_partial_fields() {
        let cfg = parse_config_str("output_dir = \"/tmp/dl\"\nconcurrency = 4\n").unwrap();
        assert_eq!(cfg.output_dir, Some(PathBuf::from("/tmp/dl")));
        assert_eq!(cfg.concurrency, Some(4));
        assert_eq!(cfg.read_timeout_secs, None);
        assert_eq!(cfg.verbosity, None);
    }

    #[test]
    fn test_parse_config_rejects_invalid_concurrency() {
        let err = parse_config_str("concurrency = 0").unwrap_err();
        assert!(format!("{err:#}").contains("concurrency"));
        assert!(parse_config_str("concurrency = 300").is_err());
    }

    #[test]
    fn test_parse_config_rejects_numeric_values_with_trailing_tokens() {
        assert!(parse_config_str("read_timeout_secs = 10 seconds").is_err());
    }

    #[test]
    fn test_parse_config_supports_inline_comments() {
        let cfg = parse_config_str(
            "# defaults\noutput_dir = \"/tmp/#hash\" # trailing\nconcurrency = 2 # two\n",
        )
        .unwrap();
        assert_eq!(cfg.output_dir, Some(PathBuf::from("/tmp/#hash")));
        assert_eq!(cfg.concurrency, Some(2));
    }

    #[test]
    fn test_parse_config_timeout_fields() {
        let cfg = parse_config_str(
            "connect_timeout_secs = 5\nread_timeout_secs = 120\nprogress_interval_ms = 250",
        )
        .unwrap();
        assert_eq!(cfg.connect_timeout_secs, Some(5));
        assert_eq!(cfg.read_timeout_secs, Some(120));
        assert_eq!(cfg.progress_interval_ms, Some(250));
    }

    #[test]
    fn test_parse_config_rejects_invalid_timeout_value() {
        assert!(parse_config_str("connect_timeout_secs = 0").is_err());
        assert!(parse_config_str("read_timeout_secs = -1").is_err());
    }

    #[test]
    fn test_parse_config_rejects_unknown_keys() {
        let err = parse_config_str("rate_limit = 5").unwrap_err();
        assert!(err.to_string().contains("Unknown configuration key"));
    }

    #[test]
    fn test_parse_config_rejects_missing_equals() {
        assert!(parse_config_str("concurrency 4").is_err());
    }

    #[test]
    fn test_parse_config_verbosity() {
        let cfg = parse_config_str("verbosity = \"quiet\"").unwrap();
        assert_eq!(cfg.verbosity, Some(VerbositySetting::Quiet));
        assert!(parse_config_str("verbosity = \"loud\"").is_err());
        assert!(parse_config_str("verbosity = quiet").is_err());
    }

    #[test]
    fn test_build_engine_config_cli_overrides_file() {
        let args = Args::try_parse_from(["rangeget", "-c", "7", "-o", "/cli"]).unwrap();
        let file = FileConfig {
            output_dir: Some(PathBuf::from("/file")),
            concurrency: Some(2),
            read_timeout_secs: Some(90),
            progress_interval_ms: Some(100),
            ..FileConfig::default()
        };
        let config = build_engine_config(&args, &file);
        assert_eq!(config.concurrency, 7);
        assert_eq!(config.base_dir, PathBuf::from("/cli"));
        assert_eq!(config.read_timeout, Duration::from_secs(90));
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.progress_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_build_engine_config_defaults() {
        let args = Args::try_parse_from(["rangeget"]).unwrap();
        let config = build_engine_config(&args, &FileConfig::default());
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_resolve_default_log_level_priority() {
        let quiet_file = FileConfig {
            verbosity: Some(VerbositySetting::Quiet),
            ..FileConfig::default()
        };
        let args = Args::try_parse_from(["rangeget"]).unwrap();
        assert_eq!(resolve_default_log_level(&args, &FileConfig::default()), "info");
        assert_eq!(resolve_default_log_level(&args, &quiet_file), "error");

        let args = Args::try_parse_from(["rangeget", "-vv"]).unwrap();
        assert_eq!(resolve_default_log_level(&args, &quiet_file), "trace");

        let args = Args::try_parse_from(["rangeget", "-q", "-v"]).unwrap();
        assert_eq!(resolve_default_log_level(&args, &FileConfig::default()), "error");
    }
}
