//! Global configuration loader for DropScope.
//!
//! Reads `config.toml` from the data directory (`~/.dropscope/` by default)
//! and deserializes it into [`GlobalConfig`]. Falls back to defaults when the
//! file is missing or malformed.

use std::path::{Path, PathBuf};

use dropscope_types::config::GlobalConfig;

/// A loaded configuration plus anything worth telling the user about it.
///
/// Config is read before the tracing subscriber exists, so problems are
/// collected here and logged by the caller once logging is up.
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    pub config: GlobalConfig,
    pub path: PathBuf,
    pub warnings: Vec<String>,
}

/// Load global configuration from `{data_dir}/config.toml`.
///
/// - Missing file: [`GlobalConfig::default()`] with no warnings.
/// - Unreadable or unparsable file: the default, plus a warning.
/// - A relative `source.fixture_path` is resolved against `data_dir`.
pub async fn load_global_config(data_dir: &Path) -> LoadedConfig {
    let path = data_dir.join("config.toml");
    let mut loaded = LoadedConfig {
        path: path.clone(),
        ..Default::default()
    };

    let content = match tokio::fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return loaded,
        Err(err) => {
            loaded
                .warnings
                .push(format!("failed to read {}: {err}, using defaults", path.display()));
            return loaded;
        }
    };

    match toml::from_str::<GlobalConfig>(&content) {
        Ok(mut config) => {
            if let Some(fixture) = config.source.fixture_path.take() {
                config.source.fixture_path = Some(resolve_relative(data_dir, fixture));
            }
            loaded.config = config;
        }
        Err(err) => loaded
            .warnings
            .push(format!("failed to parse {}: {err}, using defaults", path.display())),
    }
    loaded
}

fn resolve_relative(base: &Path, path: PathBuf) -> PathBuf {
    if path.is_relative() {
        base.join(path)
    } else {
        path
    }
}

/// Resolve the data directory.
///
/// Priority:
/// 1. `DROPSCOPE_DATA_DIR` environment variable
/// 2. `~/.dropscope`
/// 3. `.dropscope` in the current directory
pub fn default_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("DROPSCOPE_DATA_DIR") {
        return PathBuf::from(dir);
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".dropscope");
    }
    PathBuf::from(".dropscope")
}
