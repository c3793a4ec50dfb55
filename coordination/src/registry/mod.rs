//! Worker Registry: static catalog of text-generation workers
//!
//! Each worker carries a resource class (used for timeouts and staging
//! footprints), a priority for default ordering, and a declarative expertise
//! profile that the task classifier scores prompts against.
//!
//! The catalog is configured once at startup and is immutable afterwards.
//! It can be built in code, loaded from TOML, or taken from
//! [`WorkerCatalog::default_catalog`].

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Errors raised while building or loading a catalog
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse catalog: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Duplicate worker id: {0}")]
    Duplicate(String),

    #[error("Invalid worker {id}: {reason}")]
    Invalid { id: String, reason: String },
}

/// Result type for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Resource class of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceClass {
    Light,
    Medium,
    Large,
}

impl ResourceClass {
    /// Ordering rank used when staging (light first)
    pub fn rank(self) -> u8 {
        match self {
            Self::Light => 1,
            Self::Medium => 2,
            Self::Large => 3,
        }
    }
}

impl std::fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Light => write!(f, "light"),
            Self::Medium => write!(f, "medium"),
            Self::Large => write!(f, "large"),
        }
    }
}

/// Declared expertise of a worker: topic domains, matching keywords, strength
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpertiseProfile {
    /// Topic tags (e.g. "programming", "translation")
    pub domains: Vec<String>,
    /// Lower-case terms whose presence in a prompt signals this expertise
    pub keywords: Vec<String>,
    /// Weight of each hit, 0.0–1.0
    pub strength: f64,
}

impl ExpertiseProfile {
    pub fn new(domains: &[&str], keywords: &[&str], strength: f64) -> Self {
        Self {
            domains: domains.iter().map(|d| d.to_string()).collect(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            strength,
        }
    }

    /// Whether this profile declares the given domain
    pub fn covers(&self, domain: &str) -> bool {
        self.domains.iter().any(|d| d == domain)
    }
}

/// One text-generation backend instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    /// Stable identifier (also the model name sent to the backend)
    pub id: String,
    pub class: ResourceClass,
    /// Lower is preferred in default ordering
    pub priority: u32,
    #[serde(default)]
    pub expertise: ExpertiseProfile,
    /// Optional per-worker base URL overriding the backend default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl Worker {
    pub fn new(id: impl Into<String>, class: ResourceClass, priority: u32) -> Self {
        Self {
            id: id.into(),
            class,
            priority,
            expertise: ExpertiseProfile::default(),
            endpoint: None,
        }
    }

    pub fn with_expertise(mut self, expertise: ExpertiseProfile) -> Self {
        self.expertise = expertise;
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn is_light(&self) -> bool {
        self.class == ResourceClass::Light
    }

    fn validate(&mut self) -> CatalogResult<()> {
        if self.id.trim().is_empty() {
            return Err(CatalogError::Invalid {
                id: self.id.clone(),
                reason: "empty id".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.expertise.strength) {
            return Err(CatalogError::Invalid {
                id: self.id.clone(),
                reason: format!(
                    "expertise strength {} outside 0.0-1.0",
                    self.expertise.strength
                ),
            });
        }
        for list in [&mut self.expertise.domains, &mut self.expertise.keywords] {
            for term in list.iter_mut() {
                *term = term.trim().to_lowercase();
            }
            let mut seen = HashSet::new();
            list.retain(|term| !term.is_empty() && seen.insert(term.clone()));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    workers: Vec<Worker>,
}

/// Ordered, immutable set of workers
#[derive(Debug, Clone)]
pub struct WorkerCatalog {
    workers: Vec<Worker>,
}

impl WorkerCatalog {
    /// Build a catalog, normalising expertise terms and rejecting duplicates
    pub fn new(workers: Vec<Worker>) -> CatalogResult<Self> {
        let mut seen = HashSet::new();
        let mut normalized = Vec::with_capacity(workers.len());
        for mut worker in workers {
            worker.validate()?;
            if !seen.insert(worker.id.clone()) {
                return Err(CatalogError::Duplicate(worker.id));
            }
            normalized.push(worker);
        }
        Ok(Self {
            workers: normalized,
        })
    }

    /// Parse the `[[workers]]` tables of a TOML document
    pub fn from_toml_str(content: &str) -> CatalogResult<Self> {
        let file: CatalogFile = toml::from_str(content)?;
        Self::new(file.workers)
    }

    /// Load a catalog from a TOML file
    pub fn load(path: &Path) -> CatalogResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// The seven-worker catalog used when no file is configured
    pub fn default_catalog() -> Self {
        let workers = vec![
            Worker::new("llama3:latest", ResourceClass::Medium, 1).with_expertise(
                ExpertiseProfile::new(
                    &["conversation", "creativity", "narrative", "general", "storytelling", "emotional"],
                    &["story", "tale", "narrative", "emotional", "feeling", "creativity", "imagine"],
                    0.75,
                ),
            ),
            Worker::new("mistral:latest", ResourceClass::Medium, 2).with_expertise(
                ExpertiseProfile::new(
                    &["analysis", "logic", "reasoning", "philosophy", "critique", "argumentation"],
                    &["analysis", "reasoning", "logic", "argument", "because", "evidence", "conclusion", "philosophy"],
                    0.8,
                ),
            ),
            Worker::new("neural-chat:latest", ResourceClass::Light, 3).with_expertise(
                ExpertiseProfile::new(
                    &["conversation", "chat", "assistance", "help", "support"],
                    &["help", "assistance", "chat", "conversation", "question", "answer"],
                    0.65,
                ),
            ),
            Worker::new("phi3:latest", ResourceClass::Light, 4).with_expertise(
                ExpertiseProfile::new(
                    &["correction", "grammar", "style", "editing", "writing", "proofreading"],
                    &["correct", "grammar", "spelling", "wording", "write", "text", "style"],
                    0.7,
                ),
            ),
            Worker::new("dolphin-mistral:latest", ResourceClass::Medium, 5).with_expertise(
                ExpertiseProfile::new(
                    &["instructions", "tasks", "procedures", "explanations", "tutorial"],
                    &["how", "steps", "instructions", "procedure", "tutorial", "explanation", "guide"],
                    0.75,
                ),
            ),
            Worker::new("qwen:14b", ResourceClass::Large, 6).with_expertise(
                ExpertiseProfile::new(
                    &["multilingual", "translation", "culture", "languages", "international", "history"],
                    &["translate", "language", "culture", "country", "history", "tradition", "international", "world"],
                    0.85,
                ),
            ),
            Worker::new("codellama:13b", ResourceClass::Large, 7).with_expertise(
                ExpertiseProfile::new(
                    &["programming", "algorithms", "debugging", "architecture", "code", "development"],
                    &["function", "variable", "class", "import", "def", "return", "if", "for", "while", "code", "program", "script"],
                    0.9,
                ),
            ),
        ];
        // Static table above has unique ids and in-range strengths.
        Self { workers }
    }

    /// Look up a worker by id
    pub fn get(&self, id: &str) -> Option<&Worker> {
        self.workers.iter().find(|w| w.id == id)
    }

    /// Whether the catalog contains `id`
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// All workers in declaration order
    pub fn workers(&self) -> &[Worker] {
        &self.workers
    }

    /// Worker ids in declaration order
    pub fn ids(&self) -> Vec<String> {
        self.workers.iter().map(|w| w.id.clone()).collect()
    }

    /// Priority of `id`, `u32::MAX` when unknown
    pub fn priority_of(&self, id: &str) -> u32 {
        self.get(id).map(|w| w.priority).unwrap_or(u32::MAX)
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

impl Default for WorkerCatalog {
    fn default() -> Self {
        Self::default_catalog()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog_populated() {
        let catalog = WorkerCatalog::default_catalog();
        assert_eq!(catalog.len(), 7);
        assert_eq!(catalog.get("phi3:latest").unwrap().class, ResourceClass::Light);
        assert_eq!(catalog.priority_of("llama3:latest"), 1);
        assert_eq!(catalog.priority_of("missing"), u32::MAX);
    }

    #[test]
    fn test_duplicate_rejected() {
        let result = WorkerCatalog::new(vec![
            Worker::new("a", ResourceClass::Light, 1),
            Worker::new("a", ResourceClass::Large, 2),
        ]);
        assert!(matches!(result, Err(CatalogError::Duplicate(id)) if id == "a"));
    }

    #[test]
    fn test_strength_out_of_range_rejected() {
        let worker = Worker::new("a", ResourceClass::Light, 1)
            .with_expertise(ExpertiseProfile::new(&["code"], &["fn"], 1.5));
        assert!(matches!(
            WorkerCatalog::new(vec![worker]),
            Err(CatalogError::Invalid { .. })
        ));
    }

    #[test]
    fn test_terms_normalized() {
        let worker = Worker::new("a", ResourceClass::Light, 1).with_expertise(
            ExpertiseProfile::new(&["Code", "code"], &[" Sort ", "list"], 0.5),
        );
        let catalog = WorkerCatalog::new(vec![worker]).unwrap();
        let expertise = &catalog.get("a").unwrap().expertise;
        assert_eq!(expertise.domains, vec!["code"]);
        assert_eq!(expertise.keywords, vec!["sort", "list"]);
    }

    #[test]
    fn test_terms_deduplicated_after_trimming() {
        let worker = Worker::new("a", ResourceClass::Light, 1).with_expertise(
            ExpertiseProfile::new(&["code"], &[" Sort ", "sort", "SORT", "  "], 0.5),
        );
        let catalog = WorkerCatalog::new(vec![worker]).unwrap();
        assert_eq!(catalog.get("a").unwrap().expertise.keywords, vec!["sort"]);
    }

    #[test]
    fn test_from_toml() {
        let toml_str = r#"
[[workers]]
id = "coder"
class = "large"
priority = 2
endpoint = "http://gpu-02:11434"

[workers.expertise]
domains = ["programming"]
keywords = ["sort", "list"]
strength = 0.9

[[workers]]
id = "chatty"
class = "light"
priority = 1
"#;
        let catalog = WorkerCatalog::from_toml_str(toml_str).unwrap();
        assert_eq!(catalog.ids(), vec!["coder", "chatty"]);
        let coder = catalog.get("coder").unwrap();
        assert!(coder.expertise.covers("programming"));
        assert_eq!(coder.endpoint.as_deref(), Some("http://gpu-02:11434"));
        assert!(catalog.get("chatty").unwrap().expertise.domains.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workers.toml");
        std::fs::write(&path, "[[workers]]\nid = \"solo\"\nclass = \"medium\"\npriority = 1\n")
            .unwrap();
        let catalog = WorkerCatalog::load(&path).unwrap();
        assert!(catalog.contains("solo"));
    }
}
