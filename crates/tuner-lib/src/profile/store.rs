//! Profile cache
//!
//! The cache is filled from its loader on first access, exactly once; later
//! `add` / `remove` calls go through the same lock. A failed load is
//! remembered and reported on every access.

use super::{builtin_profiles, PerformanceProfile};
use crate::error::ProfileError;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use tracing::{debug, info};

/// Source of the initial profile set
pub trait ProfileLoader: Send + Sync {
    fn load(&self) -> Result<Vec<PerformanceProfile>, ProfileError>;
}

/// The system-default profiles
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinProfiles;

impl ProfileLoader for BuiltinProfiles {
    fn load(&self) -> Result<Vec<PerformanceProfile>, ProfileError> {
        Ok(builtin_profiles())
    }
}

/// Built-in profiles overlaid with every `*.json` profile in a directory
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    dir: PathBuf,
}

impl DirectoryLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ProfileLoader for DirectoryLoader {
    fn load(&self) -> Result<Vec<PerformanceProfile>, ProfileError> {
        let mut profiles = builtin_profiles();
        for profile in load_profiles_from_dir(&self.dir)? {
            profiles.retain(|p| p.name != profile.name);
            profiles.push(profile);
        }
        Ok(profiles)
    }
}

/// Parse every `*.json` file in `dir`, in file-name order
pub fn load_profiles_from_dir(dir: &Path) -> Result<Vec<PerformanceProfile>, ProfileError> {
    let io_err = |source| ProfileError::Io {
        path: dir.display().to_string(),
        source,
    };

    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(io_err)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
        .collect();
    paths.sort();

    let mut profiles = Vec::with_capacity(paths.len());
    for path in paths {
        let shown = path.display().to_string();
        let content = fs::read_to_string(&path).map_err(|source| ProfileError::Io {
            path: shown.clone(),
            source,
        })?;
        let profile: PerformanceProfile =
            serde_json::from_str(&content).map_err(|source| ProfileError::Parse {
                path: shown.clone(),
                source,
            })?;
        debug!(path = %shown, profile = %profile.name, "Loaded profile");
        profiles.push(profile);
    }
    Ok(profiles)
}

type ProfileMap = HashMap<String, Arc<PerformanceProfile>>;

pub struct ProfileStore {
    loader: Box<dyn ProfileLoader>,
    cache: OnceLock<Result<RwLock<ProfileMap>, String>>,
}

impl Default for ProfileStore {
    fn default() -> Self {
        Self::new(BuiltinProfiles)
    }
}

impl std::fmt::Debug for ProfileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileStore")
            .field("loaded", &self.cache.get().is_some())
            .finish()
    }
}

impl ProfileStore {
    pub fn new(loader: impl ProfileLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            cache: OnceLock::new(),
        }
    }

    fn cache(&self) -> Result<&RwLock<ProfileMap>, ProfileError> {
        self.cache
            .get_or_init(|| {
                let profiles = self.loader.load().map_err(|e| e.to_string())?;
                info!(count = profiles.len(), "Profile cache initialized");
                Ok(RwLock::new(
                    profiles
                        .into_iter()
                        .map(|p| (p.name.clone(), Arc::new(p)))
                        .collect(),
                ))
            })
            .as_ref()
            .map_err(|e| ProfileError::Loader(e.clone()))
    }

    pub fn get(&self, name: &str) -> Result<Option<Arc<PerformanceProfile>>, ProfileError> {
        let cache = self.cache()?.read().unwrap_or_else(PoisonError::into_inner);
        Ok(cache.get(name).cloned())
    }

    /// Insert or replace; returns the replaced profile
    pub fn add(
        &self,
        profile: PerformanceProfile,
    ) -> Result<Option<Arc<PerformanceProfile>>, ProfileError> {
        let mut cache = self.cache()?.write().unwrap_or_else(PoisonError::into_inner);
        Ok(cache.insert(profile.name.clone(), Arc::new(profile)))
    }

    pub fn remove(&self, name: &str) -> Result<Option<Arc<PerformanceProfile>>, ProfileError> {
        let mut cache = self.cache()?.write().unwrap_or_else(PoisonError::into_inner);
        Ok(cache.remove(name))
    }

    pub fn names(&self) -> Result<Vec<String>, ProfileError> {
        let cache = self.cache()?.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<_> = cache.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
