//! Per-provider listing state

use super::sort;
use super::types::{Entity, FetchParams, FolderEntry};
use crate::transfer::CancelScope;

/// Items the provider currently shows for one folder.
///
/// Full-listing providers keep `total == items.len()`. Paginated providers
/// store the backend-reported total, which may exceed the loaded items.
#[derive(Debug, Clone, Default)]
pub struct ListingState {
    pub items: Vec<Entity>,
    pub page: usize,
    pub total: usize,
    pub folder: Option<FolderEntry>,
    /// Parameters of the last fetch, replayed by `update_sort`
    pub fetch_info: Option<FetchParams>,
    /// Batches started by the owning provider
    pub batches: CancelScope,
}

impl ListingState {
    pub fn reset(&mut self) {
        self.items.clear();
        self.page = 0;
        self.total = 0;
        self.folder = None;
        self.fetch_info = None;
    }

    /// Whether a fetch of `folder` continues the current listing
    pub fn is_same_folder(&self, folder: &FolderEntry) -> bool {
        self.folder
            .as_ref()
            .map(|current| current.meta.id == folder.meta.id)
            .unwrap_or(false)
    }

    /// Store a fetched page. Page 0, or any page of another folder, replaces
    /// the items; later pages of the same folder append.
    pub fn apply_page(&mut self, folder: FolderEntry, params: FetchParams, items: Vec<Entity>, total: Option<usize>) {
        if params.page == 0 || !self.is_same_folder(&folder) {
            self.items = items;
        } else {
            self.items.extend(items);
        }
        self.page = params.page;
        self.total = total.unwrap_or(self.items.len());
        self.folder = Some(folder);
        self.fetch_info = Some(params);
    }

    /// Replay the last sort locally
    pub fn resort(&mut self) {
        let spec = self.fetch_info.as_ref().map(|info| info.sort).unwrap_or_default();
        let items = std::mem::take(&mut self.items);
        self.items = sort::sort(items, spec);
    }

    pub fn add(&mut self, entity: Entity, at: usize) {
        let at = at.min(self.items.len());
        self.items.insert(at, entity);
        self.total += 1;
    }

    pub fn add_many(&mut self, entities: Vec<Entity>, at: usize) {
        let at = at.min(self.items.len());
        let count = entities.len();
        self.items.splice(at..at, entities);
        self.total += count;
    }

    pub fn remove(&mut self, at: usize) -> Option<Entity> {
        if at >= self.items.len() {
            return None;
        }
        self.total = self.total.saturating_sub(1);
        Some(self.items.remove(at))
    }

    /// Remove the entity with `id`, if listed
    pub fn remove_id(&mut self, id: &str) -> Option<Entity> {
        let at = self.items.iter().position(|e| e.id() == id)?;
        self.remove(at)
    }

    /// Swap in an updated version of an already listed entity
    pub fn replace(&mut self, entity: Entity) -> bool {
        match self.items.iter_mut().find(|e| e.id() == entity.id()) {
            Some(slot) => {
                *slot = entity;
                true
            }
            None => false,
        }
    }

    pub fn find(&self, id: &str) -> Option<&Entity> {
        self.items.iter().find(|e| e.id() == id)
    }
}
