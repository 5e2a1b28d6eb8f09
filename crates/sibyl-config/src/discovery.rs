//! Config discovery and layered merging.
//!
//! Two files are consulted, lowest precedence first:
//!
//! 1. `config.toml` in the user config directory (`SIBYL_CONFIG_DIR`, or
//!    the platform default such as `~/.config/sibyl`)
//! 2. `sibyl.toml` in the project directory
//!
//! A later file replaces whole sections of an earlier one, and CLI flags
//! override both. A layer that exists but cannot be read or parsed is
//! skipped with a warning instead of aborting startup.

use std::path::{Path, PathBuf};

use crate::{ConfigError, MemorySection, Result, SibylConfig};

/// Project-local config filename.
const PROJECT_CONFIG_FILE: &str = "sibyl.toml";

/// Config filename inside the user config directory.
const USER_CONFIG_FILE: &str = "config.toml";

/// Directory name under the platform config and data roots.
const APP_NAME: &str = "sibyl";

/// Overrides the user config directory (handy for tests and scratch setups).
const CONFIG_DIR_ENV: &str = "SIBYL_CONFIG_DIR";

/// Overrides where sessions and variables are stored.
const DATA_DIR_ENV: &str = "SIBYL_DATA_DIR";

// ─────────────────────────────────────────────────────────────────────────────
// Discovery Results
// ─────────────────────────────────────────────────────────────────────────────

/// One config file that discovery considered.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    /// Candidate file path.
    pub path: PathBuf,
    /// True if the file existed and parsed.
    pub loaded: bool,
}

/// Merged configuration plus a record of where it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Result of layering every discovered file.
    pub config: SibylConfig,
    /// Every candidate that was checked, lowest precedence first.
    pub sources: Vec<ConfigSource>,
    /// Layers that were skipped because they could not be read or parsed.
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    /// Paths of the files that actually contributed to `config`.
    pub fn loaded_from(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .filter(|s| s.loaded)
            .map(|s| s.path.as_path())
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Loading
// ─────────────────────────────────────────────────────────────────────────────

/// Discover and merge configuration for `project_dir` (or the working
/// directory when `None`).
pub fn load_config(project_dir: Option<&Path>) -> Result<LoadedConfig> {
    load_config_with_options(project_dir, None)
}

/// Like [`load_config`], with the user config directory pinned to
/// `config_dir` instead of resolved through the environment.
pub fn load_config_with_options(
    project_dir: Option<&Path>,
    config_dir: Option<&Path>,
) -> Result<LoadedConfig> {
    let mut config = SibylConfig::new();
    let mut warnings = Vec::new();

    let mut sources = Vec::new();
    for path in layer_candidates(project_dir, config_dir) {
        sources.push(apply_layer(&mut config, path, &mut warnings));
    }

    Ok(LoadedConfig {
        config,
        sources,
        warnings,
    })
}

/// Candidate config files, lowest precedence first.
fn layer_candidates(project_dir: Option<&Path>, config_dir: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates = Vec::with_capacity(2);

    let user = match config_dir {
        Some(dir) => Some(dir.join(USER_CONFIG_FILE)),
        None => xdg_config_path(),
    };
    candidates.extend(user);

    candidates.push(match project_dir {
        Some(dir) => dir.join(PROJECT_CONFIG_FILE),
        None => PathBuf::from(PROJECT_CONFIG_FILE),
    });

    candidates
}

/// Merge the file at `path` into `config` if it exists and parses.
fn apply_layer(
    config: &mut SibylConfig,
    path: PathBuf,
    warnings: &mut Vec<String>,
) -> ConfigSource {
    if !path.is_file() {
        return ConfigSource {
            path,
            loaded: false,
        };
    }

    match load_config_file(&path) {
        Ok(layer) => {
            config.merge(layer);
            ConfigSource { path, loaded: true }
        }
        Err(e) => {
            warnings.push(format!("skipping config layer {}: {e}", path.display()));
            ConfigSource {
                path,
                loaded: false,
            }
        }
    }
}

/// Parse the single file at `path`, without discovery or merging.
pub fn load_config_file(path: &Path) -> Result<SibylConfig> {
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    SibylConfig::from_toml(&text)
}

/// Write `config` to `path` as TOML, creating missing parent directories.
pub fn save_config(config: &SibylConfig, path: &Path) -> Result<()> {
    let write_err = |e: std::io::Error| ConfigError::WriteFile {
        path: path.display().to_string(),
        source: e,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }
    std::fs::write(path, config.to_toml()?).map_err(write_err)
}

// ─────────────────────────────────────────────────────────────────────────────
// Directory Resolution
// ─────────────────────────────────────────────────────────────────────────────

/// Path of the user config file, if a config directory can be determined.
pub fn xdg_config_path() -> Option<PathBuf> {
    xdg_config_dir().map(|d| d.join(USER_CONFIG_FILE))
}

/// The user config directory: `SIBYL_CONFIG_DIR` when set and non-empty,
/// otherwise the platform default (`~/.config/sibyl` on Linux,
/// `~/Library/Application Support/sibyl` on macOS).
pub fn xdg_config_dir() -> Option<PathBuf> {
    match std::env::var(CONFIG_DIR_ENV) {
        Ok(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
        _ => dirs::config_dir().map(|d| d.join(APP_NAME)),
    }
}

/// Where session data and logs live.
///
/// Precedence: `[memory] data_dir`, then `SIBYL_DATA_DIR`, then the
/// platform data directory (`~/.local/share/sibyl` on Linux).
pub fn resolve_data_dir(memory: &MemorySection) -> Option<PathBuf> {
    if let Some(ref dir) = memory.data_dir {
        return Some(dir.clone());
    }
    match std::env::var(DATA_DIR_ENV) {
        Ok(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
        _ => dirs::data_dir().map(|d| d.join(APP_NAME)),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    use crate::Provider;

    /// Loader pinned to two scratch directories.
    fn load_from(project: &TempDir, user: &TempDir) -> LoadedConfig {
        load_config_with_options(Some(project.path()), Some(user.path())).unwrap()
    }

    #[test]
    fn test_load_single_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[llm]
provider = "ollama"
model = "test-model"
"#,
        )
        .unwrap();

        let config = load_config_file(&path).unwrap();
        assert_eq!(config.llm().provider, Provider::Ollama);
        assert_eq!(config.llm().model, "test-model");
    }

    #[test]
    fn test_missing_file_is_a_read_error() {
        let dir = TempDir::new().unwrap();
        let err = load_config_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_bad_toml_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "llm = [unbalanced").unwrap();

        let err = load_config_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_project_layer_alone() {
        let project = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        fs::write(
            project.path().join("sibyl.toml"),
            r#"
[llm]
model = "project-model"

[memory]
max_interactions = 7
"#,
        )
        .unwrap();

        let loaded = load_from(&project, &user);
        assert_eq!(loaded.config.llm().model, "project-model");
        assert_eq!(loaded.config.memory().max_interactions, 7);
        assert_eq!(loaded.loaded_from().len(), 1);
    }

    #[test]
    fn test_nothing_to_load_yields_defaults() {
        let project = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();

        let loaded = load_from(&project, &user);
        assert!(loaded.config.llm.is_none());
        assert!(loaded.loaded_from().is_empty());
        assert!(loaded.warnings.is_empty());
    }

    #[test]
    fn test_project_section_replaces_user_section() {
        let project = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        fs::write(
            user.path().join("config.toml"),
            r#"
[llm]
model = "base-model"

[routing]
min_confidence = 0.8
"#,
        )
        .unwrap();
        fs::write(
            project.path().join("sibyl.toml"),
            r#"
[llm]
model = "project-model"
"#,
        )
        .unwrap();

        let loaded = load_from(&project, &user);
        // The project [llm] section wins wholesale.
        assert_eq!(loaded.config.llm().model, "project-model");
        // Sections the project file left alone survive from the user layer.
        assert!((loaded.config.routing().min_confidence - 0.8).abs() < 1e-6);
        assert_eq!(loaded.loaded_from().len(), 2);
    }

    #[test]
    fn test_unparseable_layer_warns_and_continues() {
        let project = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        fs::write(project.path().join("sibyl.toml"), "???").unwrap();

        let loaded = load_from(&project, &user);
        assert_eq!(loaded.warnings.len(), 1);
        assert!(loaded.warnings[0].contains("skipping config layer"));
        assert!(loaded.loaded_from().is_empty());
    }

    #[test]
    fn test_save_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("deep").join("nested").join("config.toml");

        let mut config = SibylConfig::new();
        config.llm = Some(crate::LlmSection {
            model: "saved-model".to_string(),
            ..Default::default()
        });
        save_config(&config, &path).unwrap();

        let reloaded = load_config_file(&path).unwrap();
        assert_eq!(reloaded.llm().model, "saved-model");
    }

    #[test]
    fn test_data_dir_prefers_config_value() {
        let memory = MemorySection {
            data_dir: Some(PathBuf::from("/custom/data")),
            ..Default::default()
        };
        assert_eq!(
            resolve_data_dir(&memory),
            Some(PathBuf::from("/custom/data"))
        );
    }

    #[test]
    fn test_loaded_from_lists_only_real_layers() {
        let project = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        fs::write(
            project.path().join("sibyl.toml"),
            r#"
[llm]
model = "m"
"#,
        )
        .unwrap();

        let loaded = load_from(&project, &user);
        assert_eq!(loaded.sources.len(), 2);
        let paths = loaded.loaded_from();
        assert_eq!(paths.len(), 1);
        assert!(paths[0].ends_with("sibyl.toml"));
    }
}
