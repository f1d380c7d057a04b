//! Containment indices over micro-unit interpretive fields
//!
//! - story thread tag -> units carrying it
//! - character name -> units where it appears as `from` or `to`
//! - `summary.narrative_function` -> units with that exact value

use crate::model::{MicroUnit, MuPk};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Default, Clone)]
pub struct TagIndex {
    threads: HashMap<String, BTreeSet<MuPk>>,
    participants: HashMap<String, BTreeSet<MuPk>>,
    narrative_functions: HashMap<String, BTreeSet<MuPk>>,
}

fn add(map: &mut HashMap<String, BTreeSet<MuPk>>, key: &str, pk: MuPk) {
    map.entry(key.to_string()).or_default().insert(pk);
}

fn drop_key(map: &mut HashMap<String, BTreeSet<MuPk>>, key: &str, pk: MuPk) {
    if let Some(set) = map.get_mut(key) {
        set.remove(&pk);
        if set.is_empty() {
            map.remove(key);
        }
    }
}

fn lookup<'a>(map: &'a HashMap<String, BTreeSet<MuPk>>, key: &str) -> impl Iterator<Item = MuPk> + 'a {
    map.get(key).into_iter().flatten().copied()
}

impl TagIndex {
    pub fn insert(&mut self, unit: &MicroUnit) {
        for tag in &unit.story_threads {
            add(&mut self.threads, tag, unit.pk);
        }
        for name in unit.participants() {
            add(&mut self.participants, name, unit.pk);
        }
        if let Some(function) = &unit.summary.narrative_function {
            add(&mut self.narrative_functions, function, unit.pk);
        }
    }

    pub fn remove(&mut self, unit: &MicroUnit) {
        for tag in &unit.story_threads {
            drop_key(&mut self.threads, tag, unit.pk);
        }
        for name in unit.participants() {
            drop_key(&mut self.participants, name, unit.pk);
        }
        if let Some(function) = &unit.summary.narrative_function {
            drop_key(&mut self.narrative_functions, function, unit.pk);
        }
    }

    pub fn with_thread(&self, tag: &str) -> impl Iterator<Item = MuPk> + '_ {
        lookup(&self.threads, tag)
    }

    pub fn with_participant(&self, name: &str) -> impl Iterator<Item = MuPk> + '_ {
        lookup(&self.participants, name)
    }

    pub fn with_narrative_function(&self, function: &str) -> impl Iterator<Item = MuPk> + '_ {
        lookup(&self.narrative_functions, function)
    }

    /// All known story thread tags, sorted
    pub fn threads(&self) -> BTreeSet<&str> {
        self.threads.keys().map(String::as_str).collect()
    }
}
