use anyhow::{Context, Result};
use chorus_coordination::backend::DEFAULT_BASE_URL;
use chorus_coordination::{EngineConfig, Worker, WorkerCatalog};
use serde::Deserialize;
use std::path::Path;

/// Layout of the runner's TOML file.
///
/// ```toml
/// backend_url = "http://localhost:11434"
///
/// [engine.dispatch]
/// max_concurrency = 2
///
/// [[workers]]
/// id = "phi3:mini"
/// class = "light"
/// priority = 1
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RunnerFile {
    backend_url: Option<String>,
    engine: EngineConfig,
    workers: Vec<Worker>,
}

/// Everything the binary needs to build an orchestrator.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub backend_url: String,
    pub engine: EngineConfig,
    pub catalog: WorkerCatalog,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            backend_url: std::env::var("CHORUS_BACKEND_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.into()),
            engine: EngineConfig::from_env(),
            catalog: WorkerCatalog::default_catalog(),
        }
    }
}

impl RunnerConfig {
    /// Load from `path` when given, else defaults. Environment overrides win
    /// over file values.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: RunnerFile = toml::from_str(content).context("Failed to parse TOML")?;

        let catalog = if file.workers.is_empty() {
            WorkerCatalog::default_catalog()
        } else {
            WorkerCatalog::new(file.workers).context("Invalid [[workers]] table")?
        };

        let mut engine = file.engine;
        engine.apply_env();

        let backend_url = std::env::var("CHORUS_BACKEND_URL")
            .ok()
            .or(file.backend_url)
            .unwrap_or_else(|| DEFAULT_BASE_URL.into());

        Ok(Self {
            backend_url,
            engine,
            catalog,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_file_uses_default_catalog() {
        let config = RunnerConfig::from_toml_str("").unwrap();
        assert_eq!(config.catalog.len(), WorkerCatalog::default_catalog().len());
        assert_eq!(config.engine.dispatch.cooldown_ms, 2_000);
    }

    #[test]
    fn test_workers_and_engine_tables() {
        let config = RunnerConfig::from_toml_str(
            r#"
[engine.collaboration]
synthesis_enabled = false

[[workers]]
id = "phi3:mini"
class = "light"
priority = 1

[[workers]]
id = "codellama:7b"
class = "medium"
priority = 2
endpoint = "http://gpu-box:11434"

[workers.expertise]
domains = ["programming"]
keywords = ["code", "function"]
strength = 0.9
"#,
        )
        .unwrap();

        assert_eq!(config.catalog.ids(), vec!["phi3:mini", "codellama:7b"]);
        let coder = config.catalog.get("codellama:7b").unwrap();
        assert!(coder.expertise.covers("programming"));
        assert_eq!(coder.endpoint.as_deref(), Some("http://gpu-box:11434"));
        assert!(!config.engine.collaboration.synthesis_enabled);
        assert!(config.engine.collaboration.enable_peer_review);
    }

    #[test]
    fn test_duplicate_workers_rejected() {
        let err = RunnerConfig::from_toml_str(
            r#"
[[workers]]
id = "a"
class = "light"
priority = 1

[[workers]]
id = "a"
class = "light"
priority = 2
"#,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("Duplicate worker id"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[engine.dispatch]\nmax_concurrency = 5").unwrap();
        let config = RunnerConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.engine.dispatch.max_concurrency, 5);

        let missing = RunnerConfig::load(Some(Path::new("/nonexistent/chorus.toml")));
        assert!(missing.is_err());
    }
}
