//! Resolved session configuration.
//!
//! Values are layered once at startup: defaults, then the TOML config file,
//! then `<TOOL>_*` environment variables, then command-line flags. The result
//! is passed by reference into the session; nothing here is global.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{RelayError, RelayResult};
use crate::sink::{Buffering, Destination, SinkOptions, Staging};

/// Everything the relay engine needs to run one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Output destination. `None` or `-` means stdout.
    #[serde(default)]
    pub output: Option<PathBuf>,

    /// History file. `None` disables history persistence.
    #[serde(default)]
    pub history: Option<PathBuf>,

    /// Prompt shown by the terminal line editor.
    #[serde(default = "default_prompt")]
    pub prompt: String,

    /// Batch output writes instead of flushing after each one.
    #[serde(default)]
    pub buffered: bool,

    /// Stage output in a temp file and rename it into place on success.
    #[serde(default)]
    pub temp: bool,

    /// Number of history entries recalled at startup.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Log level override ("error", "warn", "info", "debug", "trace").
    #[serde(default)]
    pub log_level: Option<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            output: None,
            history: None,
            prompt: default_prompt(),
            buffered: false,
            temp: false,
            history_limit: default_history_limit(),
            log_level: None,
        }
    }
}

fn default_prompt() -> String {
    "> ".to_string()
}

fn default_history_limit() -> usize {
    500
}

/// Values given on the command line. Unset fields leave the config alone.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub output: Option<PathBuf>,
    pub history: Option<PathBuf>,
    pub prompt: Option<String>,
    pub buffered: bool,
    pub temp: bool,
}

impl RelayConfig {
    /// Resolve the full configuration for `tool`.
    ///
    /// `config_file` is the explicit `--config` path, if any; otherwise the
    /// default search paths are tried in order.
    pub fn resolve(
        tool: &str,
        config_file: Option<&Path>,
        overrides: ConfigOverrides,
    ) -> RelayResult<Self> {
        let mut config = match locate(tool, config_file) {
            Some(path) => Self::load(&path)?,
            None => {
                debug!(tool, "no config file found, using defaults");
                Self::default()
            }
        };

        let prefix = env_prefix(tool);
        config.apply_env(&prefix, |key| std::env::var(key).ok())?;
        config.apply_overrides(overrides);
        Ok(config)
    }

    /// Load configuration from a TOML file, returning defaults if the file
    /// does not exist.
    pub fn load(path: &Path) -> RelayResult<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            RelayError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let config: RelayConfig = toml::from_str(&content).map_err(|e| {
            RelayError::Config(format!("failed to parse {}: {e}", path.display()))
        })?;

        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Apply `<PREFIX>_OUTPUT`, `<PREFIX>_HISTORY`, ... using `lookup` to read
    /// variables. Empty values are ignored.
    pub fn apply_env<F>(&mut self, prefix: &str, lookup: F) -> RelayResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            let key = format!("{prefix}_{name}");
            lookup(&key).filter(|v| !v.is_empty()).map(|v| (key, v))
        };

        if let Some((_, v)) = get("OUTPUT") {
            self.output = Some(PathBuf::from(v));
        }
        if let Some((_, v)) = get("HISTORY") {
            self.history = Some(PathBuf::from(v));
        }
        if let Some((_, v)) = get("PROMPT") {
            self.prompt = v;
        }
        if let Some((key, v)) = get("BUFFERED") {
            self.buffered = parse_bool(&key, &v)?;
        }
        if let Some((key, v)) = get("TEMP") {
            self.temp = parse_bool(&key, &v)?;
        }
        if let Some((key, v)) = get("HISTORY_LIMIT") {
            self.history_limit = v
                .parse()
                .map_err(|_| RelayError::Config(format!("{key}: expected a number, got '{v}'")))?;
        }
        if let Some((_, v)) = get("LOG_LEVEL") {
            self.log_level = Some(v);
        }
        Ok(())
    }

    /// Apply command-line values on top of everything else.
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if overrides.output.is_some() {
            self.output = overrides.output;
        }
        if overrides.history.is_some() {
            self.history = overrides.history;
        }
        if let Some(prompt) = overrides.prompt {
            self.prompt = prompt;
        }
        self.buffered |= overrides.buffered;
        self.temp |= overrides.temp;
    }

    /// Where captured bytes go.
    pub fn destination(&self) -> Destination {
        match &self.output {
            Some(path) if path.as_os_str() != "-" => Destination::File(path.clone()),
            _ => Destination::Stdout,
        }
    }

    /// Sink options derived from this config.
    pub fn sink_options(&self) -> SinkOptions {
        SinkOptions {
            destination: self.destination(),
            staging: if self.temp {
                Staging::StagedTemp
            } else {
                Staging::Direct
            },
            buffering: if self.buffered {
                Buffering::Buffered
            } else {
                Buffering::Unbuffered
            },
        }
    }
}

/// The config file that [`RelayConfig::resolve`] reads, if any.
pub fn locate(tool: &str, config_file: Option<&Path>) -> Option<PathBuf> {
    match config_file {
        Some(path) => Some(path.to_path_buf()),
        None => search_paths(tool).into_iter().find(|p| p.exists()),
    }
}

/// Default config file locations for `tool`, most specific first.
pub fn search_paths(tool: &str) -> Vec<PathBuf> {
    let file_name = format!("{tool}.toml");
    let mut paths = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join(tool).join(&file_name));
    }
    paths.push(PathBuf::from(&file_name));
    paths
}

/// Environment variable prefix for `tool` (`rlexec` -> `RLEXEC`).
pub fn env_prefix(tool: &str) -> String {
    tool.to_ascii_uppercase().replace('-', "_")
}

fn parse_bool(key: &str, value: &str) -> RelayResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(RelayError::Config(format!(
            "{key}: expected a boolean, got '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn default_config_values() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.prompt, "> ");
        assert_eq!(cfg.history_limit, 500);
        assert!(!cfg.buffered);
        assert!(!cfg.temp);
        assert!(cfg.output.is_none());
        assert_eq!(cfg.destination(), Destination::Stdout);
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
output = "/tmp/out.txt"
history = "/tmp/hist"
prompt = "$ "
buffered = true
temp = true
history_limit = 20
log_level = "debug"
"#;
        let cfg: RelayConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.output, Some(PathBuf::from("/tmp/out.txt")));
        assert_eq!(cfg.history, Some(PathBuf::from("/tmp/hist")));
        assert_eq!(cfg.prompt, "$ ");
        assert!(cfg.buffered);
        assert!(cfg.temp);
        assert_eq!(cfg.history_limit, 20);
        assert_eq!(cfg.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn parse_partial_toml_config() {
        let cfg: RelayConfig = toml::from_str("buffered = true\n").unwrap();
        assert!(cfg.buffered);
        assert_eq!(cfg.prompt, "> "); // default
        assert_eq!(cfg.history_limit, 500); // default
    }

    #[test]
    fn load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = RelayConfig::load(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(cfg, RelayConfig::default());
    }

    #[test]
    fn load_malformed_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "buffered = [").unwrap();
        assert!(matches!(RelayConfig::load(&path), Err(RelayError::Config(_))));
    }

    #[test]
    fn env_overrides_file_values() {
        let vars = env(&[
            ("RLEXEC_OUTPUT", "out.log"),
            ("RLEXEC_BUFFERED", "yes"),
            ("RLEXEC_TEMP", "0"),
            ("RLEXEC_PROMPT", ""),
            ("RLTEE_HISTORY", "ignored"),
        ]);
        let mut cfg = RelayConfig {
            temp: true,
            ..Default::default()
        };
        cfg.apply_env("RLEXEC", |k| vars.get(k).cloned()).unwrap();
        assert_eq!(cfg.output, Some(PathBuf::from("out.log")));
        assert!(cfg.buffered);
        assert!(!cfg.temp);
        assert_eq!(cfg.prompt, "> ");
        assert!(cfg.history.is_none());
    }

    #[test]
    fn env_rejects_bad_bool() {
        let vars = env(&[("RLTEE_BUFFERED", "maybe")]);
        let mut cfg = RelayConfig::default();
        let err = cfg.apply_env("RLTEE", |k| vars.get(k).cloned()).unwrap_err();
        assert!(err.to_string().contains("RLTEE_BUFFERED"));
    }

    #[test]
    fn cli_overrides_win() {
        let mut cfg = RelayConfig {
            output: Some(PathBuf::from("from-file")),
            prompt: "file> ".into(),
            ..Default::default()
        };
        cfg.apply_overrides(ConfigOverrides {
            output: Some(PathBuf::from("from-cli")),
            prompt: None,
            temp: true,
            ..Default::default()
        });
        assert_eq!(cfg.output, Some(PathBuf::from("from-cli")));
        assert_eq!(cfg.prompt, "file> ");
        assert!(cfg.temp);
        assert!(!cfg.buffered);
    }

    #[test]
    fn dash_output_means_stdout() {
        let cfg = RelayConfig {
            output: Some(PathBuf::from("-")),
            ..Default::default()
        };
        assert_eq!(cfg.destination(), Destination::Stdout);
    }

    #[test]
    fn sink_options_follow_flags() {
        let cfg = RelayConfig {
            output: Some(PathBuf::from("/tmp/x")),
            buffered: true,
            temp: true,
            ..Default::default()
        };
        let opts = cfg.sink_options();
        assert_eq!(opts.destination, Destination::File(PathBuf::from("/tmp/x")));
        assert_eq!(opts.staging, Staging::StagedTemp);
        assert_eq!(opts.buffering, Buffering::Buffered);
    }

    #[test]
    fn env_prefix_is_uppercased() {
        assert_eq!(env_prefix("rlexec"), "RLEXEC");
        assert_eq!(env_prefix("my-tool"), "MY_TOOL");
    }

    #[test]
    fn explicit_config_path_is_used_as_is() {
        let path = Path::new("/nonexistent/custom.toml");
        assert_eq!(locate("rltee", Some(path)), Some(path.to_path_buf()));
    }

    #[test]
    fn search_paths_end_with_cwd_file() {
        let paths = search_paths("rltee");
        assert_eq!(paths.last(), Some(&PathBuf::from("rltee.toml")));
    }
}
