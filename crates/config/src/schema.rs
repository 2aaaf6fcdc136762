/// Config schema types (extensions, host, engines, bindings, cache, session).
use std::{collections::BTreeMap, path::PathBuf};

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RibbonConfig {
    pub extensions: ExtensionsConfig,
    pub host: HostConfig,
    pub engines: BTreeMap<String, EngineConfig>,
    pub bindings: BindingsConfig,
    pub cache: CacheConfig,
    pub session: SessionConfig,
}

impl RibbonConfig {
    /// Whether the extension with the given name is enabled.
    ///
    /// Extensions not mentioned anywhere are enabled.
    pub fn is_extension_enabled(&self, name: &str) -> bool {
        !self
            .extensions
            .disabled
            .iter()
            .any(|d| d.eq_ignore_ascii_case(name))
    }

    /// Look up the interpreter for a script language, falling back to the
    /// built-in defaults when the config does not override it.
    pub fn engine_for(&self, language: &str) -> Option<EngineConfig> {
        self.engines
            .get(language)
            .cloned()
            .or_else(|| default_engine(language))
    }
}

/// Built-in interpreter for languages that have an obvious default.
fn default_engine(language: &str) -> Option<EngineConfig> {
    match language {
        "python" => Some(EngineConfig {
            command: "python3".into(),
            args: Vec::new(),
        }),
        "ruby" => Some(EngineConfig {
            command: "ruby".into(),
            args: Vec::new(),
        }),
        _ => None,
    }
}

/// Where extensions are found and which of them load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionsConfig {
    /// Directories scanned (non-recursively) for `*.extension` and `*.lib` roots,
    /// in priority order.
    pub search_paths: Vec<PathBuf>,
    /// Names of extensions the user switched off.
    pub disabled: Vec<String>,
    /// Materialize commands flagged as beta.
    pub load_beta: bool,
    /// Extra library roots appended to every command's search paths.
    pub library_paths: Vec<PathBuf>,
}

/// Facts about the host application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Host version compared against command min/max versions.
    pub version: u32,
    /// Locale code used to pick localized titles.
    pub locale: String,
    /// Identity of the base runtime; part of every artifact key so that a
    /// runtime upgrade invalidates caches and binding modules together.
    pub runtime_hash: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            version: 2024,
            locale: "en_us".into(),
            runtime_hash: env!("CARGO_PKG_VERSION").into(),
        }
    }
}

/// How a script language is executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Binding generation limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingsConfig {
    /// Upper bound for building one extension's binding module.
    pub timeout_secs: u64,
    /// Upper bound for one command script run.
    pub handler_timeout_secs: u64,
}

impl Default for BindingsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            handler_timeout_secs: 300,
        }
    }
}

/// Parsed-tree and binding-module artifact cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Artifact directory. Defaults to `<data_dir>/cache`.
    pub dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

impl CacheConfig {
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| crate::data_dir().join("cache"))
    }
}

/// Seed values for the per-session context object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub debug: bool,
    pub values: BTreeMap<String, serde_json::Value>,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let cfg: RibbonConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, RibbonConfig::default());
        assert!(cfg.cache.enabled);
        assert_eq!(cfg.bindings.timeout_secs, 30);
    }

    #[test]
    fn disabled_match_ignores_case() {
        let cfg: RibbonConfig = toml::from_str(
            r#"
[extensions]
disabled = ["DevTools"]
"#,
        )
        .unwrap();
        assert!(!cfg.is_extension_enabled("devtools"));
        assert!(cfg.is_extension_enabled("Other"));
    }

    #[test]
    fn engine_override_wins_over_default() {
        let cfg: RibbonConfig = toml::from_str(
            r#"
[engines.python]
command = "/opt/py/bin/python"
args = ["-X", "utf8"]
"#,
        )
        .unwrap();
        let engine = cfg.engine_for("python").unwrap();
        assert_eq!(engine.command, "/opt/py/bin/python");
        assert_eq!(engine.args, vec!["-X", "utf8"]);
        assert_eq!(cfg.engine_for("ruby").unwrap().command, "ruby");
        assert!(cfg.engine_for("csharp").is_none());
    }
}
