//! Spec registries and the per-process spec cache

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use super::model::{Hook, Subcommand};
use crate::error::{Error, Result};

pub type SpecFactoryFn = dyn Fn() -> Option<Subcommand> + Send + Sync;

/// What a registry hands out for a command name
#[derive(Clone, Debug)]
pub enum SpecModule {
    Tree(Subcommand),
    Factory(Hook<SpecFactoryFn>),
}

impl SpecModule {
    pub fn factory<F>(f: F) -> Self
    where
        F: Fn() -> Option<Subcommand> + Send + Sync + 'static,
    {
        SpecModule::Factory(Hook(Arc::new(f)))
    }

    pub fn into_subcommand(self) -> Option<Subcommand> {
        match self {
            SpecModule::Tree(tree) => Some(tree),
            SpecModule::Factory(factory) => factory(),
        }
    }
}

/// Catalogue of command specs keyed by command name
pub trait SpecRegistry: Send + Sync {
    fn names(&self) -> Vec<String>;
    fn lookup(&self, name: &str) -> Option<SpecModule>;
}

/// In-memory registry
#[derive(Clone, Debug, Default)]
pub struct StaticRegistry {
    modules: BTreeMap<String, SpecModule>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tree under its primary name
    pub fn with_spec(mut self, spec: Subcommand) -> Self {
        self.insert(spec.names.primary().to_string(), SpecModule::Tree(spec));
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, module: SpecModule) {
        self.modules.insert(name.into(), module);
    }
}

impl SpecRegistry for StaticRegistry {
    fn names(&self) -> Vec<String> {
        self.modules.keys().cloned().collect()
    }

    fn lookup(&self, name: &str) -> Option<SpecModule> {
        self.modules.get(name).cloned()
    }
}

const SPEC_EXTENSIONS: [&str; 3] = ["json", "yaml", "yml"];

/// Spec files (`<command>.json|yaml|yml`) in one or more directories.
///
/// Directories are indexed once; a file is only parsed when looked up.
/// Earlier directories shadow later ones.
#[derive(Clone, Debug, Default)]
pub struct DirectoryRegistry {
    files: BTreeMap<String, PathBuf>,
}

impl DirectoryRegistry {
    pub fn new<I, P>(dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut files = BTreeMap::new();
        for dir in dirs {
            let dir = dir.as_ref();
            let entries = match std::fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) => {
                    log::debug!("no specs loaded from {}: {}", dir.display(), e);
                    continue;
                }
            };
            for entry in entries.flatten() {
                let path = entry.path();
                let is_spec = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| SPEC_EXTENSIONS.contains(&e));
                if !is_spec || !path.is_file() {
                    continue;
                }
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    files.entry(stem.to_string()).or_insert(path);
                }
            }
        }
        log::debug!("indexed {} spec file(s)", files.len());
        Self { files }
    }

    pub fn path(&self, name: &str) -> Option<&Path> {
        self.files.get(name).map(PathBuf::as_path)
    }
}

impl SpecRegistry for DirectoryRegistry {
    fn names(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }

    fn lookup(&self, name: &str) -> Option<SpecModule> {
        let path = self.files.get(name)?;
        match load_spec_file(path) {
            Ok(spec) => Some(SpecModule::Tree(spec)),
            Err(e) => {
                log::debug!("failed to load spec `{}`: {}", name, e);
                None
            }
        }
    }
}

/// Parse a JSON or YAML spec file
pub fn load_spec_file(path: &Path) -> Result<Subcommand> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => Ok(serde_json::from_str(&content)?),
        Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&content)?),
        _ => Err(Error::invalid_spec(path, "expected a .json, .yaml or .yml file")),
    }
}

/// Registries consulted in order; the first hit wins
#[derive(Default)]
pub struct ChainRegistry {
    registries: Vec<Box<dyn SpecRegistry>>,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, registry: impl SpecRegistry + 'static) -> Self {
        self.registries.push(Box::new(registry));
        self
    }
}

impl SpecRegistry for ChainRegistry {
    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registries.iter().flat_map(|r| r.names()).collect();
        names.sort();
        names.dedup();
        names
    }

    fn lookup(&self, name: &str) -> Option<SpecModule> {
        self.registries.iter().find_map(|r| r.lookup(name))
    }
}

/// Resolves command names to spec trees, caching them for the process
/// lifetime. The first tree cached for a name wins; misses are not cached.
pub struct SpecLoader {
    registry: Arc<dyn SpecRegistry>,
    cache: RwLock<HashMap<String, Arc<Subcommand>>>,
}

impl SpecLoader {
    pub fn new(registry: Arc<dyn SpecRegistry>) -> Self {
        Self {
            registry,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<Subcommand>> {
        if let Some(spec) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return Some(Arc::clone(spec));
        }

        let Some(spec) = self.registry.lookup(name).and_then(SpecModule::into_subcommand) else {
            log::debug!("no spec for `{}`", name);
            return None;
        };
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        Some(Arc::clone(
            cache.entry(name.to_string()).or_insert_with(|| Arc::new(spec)),
        ))
    }

    /// Names offered as root commands
    pub fn names(&self) -> Vec<String> {
        self.registry
            .names()
            .into_iter()
            .filter(|name| !name.starts_with('@') && name != "-")
            .collect()
    }
}
