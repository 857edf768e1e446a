use std::{
    any::Any,
    collections::{HashMap, HashSet},
};

/// Scratch storage a plugin writes in `pre_filter`/`pre_score` and reads
/// back in `filter`/`score`, scoped to one scheduling cycle (one task
/// being considered against one node set). Cleared between tasks.
#[derive(Default)]
pub struct CycleState {
    storage: HashMap<String, Box<dyn Any + Send + Sync>>,
    pub skip_filter_plugins: HashSet<String>,
    pub skip_score_plugins: HashSet<String>,
    pub _skip_pre_bind_plugins: HashSet<String>,
}

impl CycleState {
    pub fn read<T: 'static>(&self, key: &str) -> Option<&T> {
        let res = self.storage.get(key);
        if let Some(i) = res {
            i.downcast_ref()
        } else {
            None
        }
    }

    pub fn write(&mut self, key: &str, value: Box<dyn Any + Send + Sync>) {
        self.storage.insert(key.to_string(), value);
    }

    pub fn clear(&mut self) {
        self.storage.clear();
        self.skip_filter_plugins.clear();
        self.skip_score_plugins.clear();
    }
}
