//! Experiment storage
//!
//! Experiments are independent units, so the in-memory store locks per key
//! (one `DashMap` shard at a time) instead of behind one global lock.

use crate::experiment::Experiment;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

pub trait ExperimentRepository: Send + Sync {
    fn contains(&self, name: &str) -> bool;

    /// Snapshot of one experiment
    fn get(&self, name: &str) -> Option<Experiment>;

    /// Insert unless the name is taken; `false` on conflict
    fn insert(&self, name: &str, experiment: Experiment) -> bool;

    /// Run `f` against the stored experiment under its key lock; `false` if absent
    fn update(&self, name: &str, f: &mut dyn FnMut(&mut Experiment)) -> bool;

    fn remove(&self, name: &str) -> Option<Experiment>;

    fn names(&self) -> Vec<String>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bulk startup load; replaces same-named entries and returns how many were loaded
    fn load_all(&self, experiments: Vec<Experiment>) -> usize;
}

#[derive(Debug, Default)]
pub struct InMemoryExperimentStore {
    experiments: DashMap<String, Experiment>,
}

impl InMemoryExperimentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExperimentRepository for InMemoryExperimentStore {
    fn contains(&self, name: &str) -> bool {
        self.experiments.contains_key(name)
    }

    fn get(&self, name: &str) -> Option<Experiment> {
        self.experiments.get(name).map(|e| e.value().clone())
    }

    fn insert(&self, name: &str, experiment: Experiment) -> bool {
        match self.experiments.entry(name.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(experiment);
                true
            }
        }
    }

    fn update(&self, name: &str, f: &mut dyn FnMut(&mut Experiment)) -> bool {
        match self.experiments.get_mut(name) {
            Some(mut entry) => {
                f(entry.value_mut());
                true
            }
            None => false,
        }
    }

    fn remove(&self, name: &str) -> Option<Experiment> {
        self.experiments.remove(name).map(|(_, e)| e)
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.experiments.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    fn len(&self) -> usize {
        self.experiments.len()
    }

    fn load_all(&self, experiments: Vec<Experiment>) -> usize {
        let mut loaded = 0;
        for experiment in experiments {
            let Some(name) = experiment.experiment_name.clone() else {
                debug!("Skipping stored experiment without a name");
                continue;
            };
            self.experiments.insert(name, experiment);
            loaded += 1;
        }
        loaded
    }
}
