//! Client-side ordering and filtering of entity lists.
//!
//! Folders always precede files. Within each group the requested key applies;
//! keys that only make sense for files (type, size) leave folders in ascending
//! title order whatever the direction.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;

use super::types::{Entity, FetchParams, SortOrder, SortSpec, SortType};

/// Order `items` according to `spec`
pub fn sort(items: Vec<Entity>, spec: SortSpec) -> Vec<Entity> {
    let now = Utc::now();
    let (mut folders, mut files): (Vec<Entity>, Vec<Entity>) = items.into_iter().partition(Entity::is_folder);

    let folder_order = match spec.sort_type {
        SortType::Title | SortType::DateAndTime => spec.order,
        SortType::Type | SortType::Size => SortOrder::Ascending,
    };
    folders.sort_by(|a, b| directed(compare_folders(a, b, spec.sort_type, now), folder_order));
    files.sort_by(|a, b| directed(compare_files(a, b, spec.sort_type, now), spec.order));

    folders.extend(files);
    folders
}

/// Keep entities whose title contains `text`, ignoring case
pub fn search(items: Vec<Entity>, text: &str) -> Vec<Entity> {
    let needle = text.trim().to_lowercase();
    if needle.is_empty() {
        return items;
    }
    items
        .into_iter()
        .filter(|e| e.title().to_lowercase().contains(&needle))
        .collect()
}

/// Search then sort, the way full-listing providers post-process a fetch
pub fn apply(items: Vec<Entity>, params: &FetchParams) -> Vec<Entity> {
    let items = match params.search_text() {
        Some(text) => search(items, text),
        None => items,
    };
    sort(items, params.sort)
}

fn directed(ordering: Ordering, order: SortOrder) -> Ordering {
    match order {
        SortOrder::Ascending => ordering,
        SortOrder::Descending => ordering.reverse(),
    }
}

fn compare_titles(a: &Entity, b: &Entity) -> Ordering {
    a.title().cmp(b.title())
}

fn compare_folders(a: &Entity, b: &Entity, key: SortType, now: DateTime<Utc>) -> Ordering {
    match key {
        SortType::DateAndTime => {
            let left = a.meta().created.unwrap_or(now);
            let right = b.meta().created.unwrap_or(now);
            left.cmp(&right)
        }
        SortType::Title | SortType::Type | SortType::Size => compare_titles(a, b),
    }
}

fn compare_files(a: &Entity, b: &Entity, key: SortType, now: DateTime<Utc>) -> Ordering {
    match key {
        SortType::Title => compare_titles(a, b),
        SortType::Type => extension_of(a).cmp(&extension_of(b)),
        SortType::DateAndTime => {
            let left = a.meta().updated.unwrap_or(now);
            let right = b.meta().updated.unwrap_or(now);
            left.cmp(&right)
        }
        SortType::Size => content_length(a).cmp(&content_length(b)),
    }
}

fn extension_of(entity: &Entity) -> String {
    entity.as_file().and_then(|f| f.extension()).unwrap_or_default()
}

fn content_length(entity: &Entity) -> u64 {
    entity.as_file().map(|f| f.content_length).unwrap_or(0)
}
