use stac::Item;
use std::collections::HashSet;

/// Scene ids already present in the remote catalog. Rebuilt from the catalog on every run.
#[derive(Debug, Default, Clone)]
pub struct SyncState {
    ids: HashSet<String>,
}

impl SyncState {
    pub fn reconcile<'a>(items: impl IntoIterator<Item = &'a Item>) -> Self {
        Self {
            ids: items.into_iter().map(|item| item.id.clone()).collect(),
        }
    }

    pub fn contains(self: &Self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(self: &Self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(self: &Self) -> bool {
        self.ids.is_empty()
    }
}
