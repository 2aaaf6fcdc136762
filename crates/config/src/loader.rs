use std::{
    path::{Path, PathBuf},
    sync::RwLock,
};

use {
    anyhow::{Context, bail},
    serde_json::Value,
    tracing::{debug, warn},
};

use crate::{env_subst::substitute_env, schema::RibbonConfig};

/// Config file names, in lookup order.
const CONFIG_FILENAMES: &[&str] = &["ribbon.toml", "ribbon.yaml", "ribbon.yml", "ribbon.json"];

const DATA_DIR_ENV: &str = "RIBBON_DATA_DIR";

static DATA_DIR_OVERRIDE: RwLock<Option<PathBuf>> = RwLock::new(None);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Toml,
    Yaml,
    Json,
}

impl Format {
    fn of(path: &Path) -> anyhow::Result<Self> {
        match path.extension().and_then(|e| e.to_str()).unwrap_or("toml") {
            "toml" => Ok(Self::Toml),
            "yaml" | "yml" => Ok(Self::Yaml),
            "json" => Ok(Self::Json),
            other => bail!("unsupported config format: .{other}"),
        }
    }

    /// Every format is normalized to a JSON value first.
    fn parse(self, raw: &str) -> anyhow::Result<Value> {
        Ok(match self {
            Self::Toml => serde_json::to_value(toml::from_str::<toml::Value>(raw)?)?,
            Self::Yaml => serde_json::to_value(serde_yaml::from_str::<serde_yaml::Value>(raw)?)?,
            Self::Json => serde_json::from_str(raw)?,
        })
    }
}

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<RibbonConfig> {
    let value = load_config_value(path)?;
    serde_json::from_value(value).with_context(|| format!("invalid config {}", path.display()))
}

/// Raw config value after `${VAR}` substitution, unknown keys included.
pub fn load_config_value(path: &Path) -> anyhow::Result<Value> {
    let format = Format::of(path)?;
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    format.parse(&substitute_env(&raw))
}

/// Load `./ribbon.*`, else the user config dir's `ribbon.*`, else defaults.
///
/// A file that fails to load is logged and replaced by defaults.
pub fn discover_and_load() -> RibbonConfig {
    let Some(path) = find_config_file() else {
        debug!("no config file found, using defaults");
        return RibbonConfig::default();
    };
    debug!(path = %path.display(), "loading config");
    load_config(&path).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
        RibbonConfig::default()
    })
}

fn find_config_file() -> Option<PathBuf> {
    let local = CONFIG_FILENAMES.iter().map(PathBuf::from);
    let global = config_dir()
        .into_iter()
        .flat_map(|dir| CONFIG_FILENAMES.iter().map(move |name| dir.join(name)));
    local.chain(global).find(|p| p.exists())
}

/// User-global config directory (`~/.config/ribbon/` on Linux).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "ribbon").map(|d| d.config_dir().to_path_buf())
}

/// Returns the path of an existing config file, or the default TOML path.
pub fn find_or_default_config_path() -> PathBuf {
    find_config_file().unwrap_or_else(|| {
        config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ribbon.toml")
    })
}

/// Write `config` as TOML to `path`, creating parent directories.
pub fn save_config(config: &RibbonConfig, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let rendered = toml::to_string_pretty(config).context("serialize config")?;
    std::fs::write(path, rendered)?;
    debug!(path = %path.display(), "saved config");
    Ok(())
}

/// Directory holding cache artifacts and command logs.
///
/// Resolution order: [`set_data_dir`] override, `RIBBON_DATA_DIR`, the
/// platform data directory, then `./.ribbon`.
pub fn data_dir() -> PathBuf {
    let overridden = DATA_DIR_OVERRIDE
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .clone();
    overridden
        .or_else(|| std::env::var_os(DATA_DIR_ENV).map(PathBuf::from))
        .or_else(|| {
            directories::ProjectDirs::from("", "", "ribbon").map(|d| d.data_dir().to_path_buf())
        })
        .unwrap_or_else(|| PathBuf::from(".ribbon"))
}

/// Override the data directory for this process.
pub fn set_data_dir(dir: PathBuf) {
    *DATA_DIR_OVERRIDE
        .write()
        .unwrap_or_else(|e| e.into_inner()) = Some(dir);
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_each_format() {
        let tmp = tempfile::tempdir().unwrap();
        for (name, body, version) in [
            ("ribbon.toml", "[host]\nversion = 2023\n", 2023),
            ("ribbon.yaml", "host:\n  version: 2022\n", 2022),
            ("ribbon.json", r#"{"host": {"version": 2021}}"#, 2021),
        ] {
            let path = tmp.path().join(name);
            std::fs::write(&path, body).unwrap();
            assert_eq!(load_config(&path).unwrap().host.version, version, "{name}");
        }
    }

    #[test]
    fn rejects_unknown_format() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ribbon.ini");
        std::fs::write(&path, "x=1").unwrap();
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn config_value_keeps_unknown_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ribbon.toml");
        std::fs::write(&path, "[extensionz]\nsearch_paths = []\n").unwrap();
        let value = load_config_value(&path).unwrap();
        assert!(value.get("extensionz").is_some());
    }

    #[test]
    fn saved_config_loads_back() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested/ribbon.toml");
        let mut config = RibbonConfig::default();
        config.extensions.disabled = vec!["Old".into()];
        save_config(&config, &path).unwrap();
        assert_eq!(load_config(&path).unwrap().extensions.disabled, vec!["Old"]);
    }
}
