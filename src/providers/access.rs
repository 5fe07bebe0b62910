//! Permitted-operation resolution
//!
//! Action sets are never stored on entities. They are derived on demand from
//! the entity's access level, its location and the account the provider is
//! signed in with.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use super::types::{Entity, EntityAccess, FileEntry, FolderEntry, RootFolderType, User};

/// Bitmask of operations allowed on one entity
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ActionSet(u32);

impl ActionSet {
    pub const OPEN: ActionSet = ActionSet(1 << 0);
    pub const EDIT: ActionSet = ActionSet(1 << 1);
    pub const RENAME: ActionSet = ActionSet(1 << 2);
    pub const COPY: ActionSet = ActionSet(1 << 3);
    pub const MOVE: ActionSet = ActionSet(1 << 4);
    pub const DOWNLOAD: ActionSet = ActionSet(1 << 5);
    pub const DELETE: ActionSet = ActionSet(1 << 6);
    pub const RESTORE: ActionSet = ActionSet(1 << 7);
    pub const SHARE: ActionSet = ActionSet(1 << 8);
    pub const UPLOAD: ActionSet = ActionSet(1 << 9);
    pub const EXPORT: ActionSet = ActionSet(1 << 10);
    pub const UNMOUNT: ActionSet = ActionSet(1 << 11);
    pub const DUPLICATE: ActionSet = ActionSet(1 << 12);
    pub const FAVORITE: ActionSet = ActionSet(1 << 13);

    const NAMES: [(ActionSet, &'static str); 14] = [
        (ActionSet::OPEN, "open"),
        (ActionSet::EDIT, "edit"),
        (ActionSet::RENAME, "rename"),
        (ActionSet::COPY, "copy"),
        (ActionSet::MOVE, "move"),
        (ActionSet::DOWNLOAD, "download"),
        (ActionSet::DELETE, "delete"),
        (ActionSet::RESTORE, "restore"),
        (ActionSet::SHARE, "share"),
        (ActionSet::UPLOAD, "upload"),
        (ActionSet::EXPORT, "export"),
        (ActionSet::UNMOUNT, "unmount"),
        (ActionSet::DUPLICATE, "duplicate"),
        (ActionSet::FAVORITE, "favorite"),
    ];

    pub const fn empty() -> Self {
        ActionSet(0)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// True when every action of `other` is present
    pub fn contains(&self, other: ActionSet) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: ActionSet) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: ActionSet) {
        self.0 &= !other.0;
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Names of the contained actions, in vocabulary order
    pub fn names(&self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(action, _)| self.contains(*action))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl BitOr for ActionSet {
    type Output = ActionSet;

    fn bitor(self, rhs: ActionSet) -> ActionSet {
        ActionSet(self.0 | rhs.0)
    }
}

impl BitOrAssign for ActionSet {
    fn bitor_assign(&mut self, rhs: ActionSet) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for ActionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActionSet({})", self.names().join(" | "))
    }
}

/// Which rule family an adapter applies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPolicy {
    /// Document server: ownership, roles and access levels
    Portal,
    /// Local documents: everything inside the device roots
    Device,
    /// Third-party storage where the account owns everything it can see
    Open,
}

const DOCUMENTS: &[&str] = &["docx", "doc", "odt", "rtf", "mht", "html", "htm", "epub", "fb2", "txt"];
const SPREADSHEETS: &[&str] = &["xlsx", "xls", "csv", "ods"];
const PRESENTATIONS: &[&str] = &["pptx", "ppt", "odp"];
const FORMS: &[&str] = &["docxf", "oform"];
const IMAGES: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "tif", "tiff", "ico"];
const EDITABLE: &[&str] = &[
    "docx", "xlsx", "pptx", "csv", "txt", "odt", "ods", "odp", "doc", "xls", "ppt", "rtf", "mht", "html",
    "htm", "epub", "fb2", "docxf", "oform",
];

/// Extensions the viewer can open
pub fn is_previewable(ext: &str) -> bool {
    [DOCUMENTS, SPREADSHEETS, PRESENTATIONS, FORMS, IMAGES]
        .iter()
        .any(|group| group.contains(&ext))
        || ext == "pdf"
}

/// Extensions the editor can modify
pub fn is_editable(ext: &str) -> bool {
    EDITABLE.contains(&ext)
}

/// Compute the actions permitted on `entity`.
///
/// `parent` is the folder currently listed by the provider, `user` the
/// signed-in account.
pub fn resolve(
    entity: &Entity,
    user: Option<&User>,
    parent: Option<&FolderEntry>,
    policy: AccessPolicy,
) -> ActionSet {
    if entity.meta().root_folder_type.is_trash() {
        return ActionSet::DELETE | ActionSet::RESTORE;
    }

    let rights = match policy {
        AccessPolicy::Open => Rights::all(),
        AccessPolicy::Device => device_rights(entity),
        AccessPolicy::Portal => Rights {
            read: entity.meta().access != EntityAccess::Restrict,
            edit: portal_can_edit(entity, user, parent),
            delete: portal_can_delete(entity, user, parent),
        },
    };

    let mut actions = match entity {
        Entity::File(file) => file_actions(file, rights),
        Entity::Folder(_) => folder_actions(rights),
    };

    if policy == AccessPolicy::Portal {
        actions |= portal_extras(entity, user, parent, rights);
    }

    actions
}

#[derive(Debug, Clone, Copy)]
struct Rights {
    read: bool,
    edit: bool,
    delete: bool,
}

impl Rights {
    fn all() -> Self {
        Self {
            read: true,
            edit: true,
            delete: true,
        }
    }
}

fn file_actions(file: &FileEntry, rights: Rights) -> ActionSet {
    let mut actions = ActionSet::empty();
    let ext = file.extension().unwrap_or_default();

    if rights.read {
        actions |= ActionSet::COPY | ActionSet::EXPORT | ActionSet::DOWNLOAD;
    }
    if rights.delete {
        actions.insert(ActionSet::DELETE);
        if rights.edit {
            actions.insert(ActionSet::MOVE);
        }
    }
    if rights.edit {
        actions.insert(ActionSet::RENAME);
    }
    if rights.read && is_previewable(&ext) {
        actions.insert(ActionSet::OPEN);
    }
    if rights.edit && is_editable(&ext) {
        actions.insert(ActionSet::EDIT);
    }
    actions
}

fn folder_actions(rights: Rights) -> ActionSet {
    let mut actions = ActionSet::empty();
    if rights.read && rights.edit {
        actions.insert(ActionSet::OPEN);
    }
    if rights.edit {
        actions.insert(ActionSet::RENAME);
    }
    if rights.read {
        actions.insert(ActionSet::COPY);
    }
    if rights.edit && rights.delete {
        actions.insert(ActionSet::MOVE);
    }
    if rights.delete {
        actions.insert(ActionSet::DELETE);
    }
    actions
}

fn device_rights(entity: &Entity) -> Rights {
    let root = entity.meta().root_folder_type;
    let inside = root.is_device();
    Rights {
        read: inside,
        edit: inside && root != RootFolderType::DeviceTrash,
        delete: inside,
    }
}

fn is_project_root(root: RootFolderType) -> bool {
    matches!(root, RootFolderType::Bunch | RootFolderType::Projects)
}

/// Access of a folder listed as its own parent comes from the listing folder
fn effective_access(entity: &Entity, parent: Option<&FolderEntry>) -> EntityAccess {
    match (entity, parent) {
        (Entity::Folder(folder), Some(parent)) if folder.meta.id == parent.meta.id => parent.meta.access,
        _ => entity.meta().access,
    }
}

fn portal_can_edit(entity: &Entity, user: Option<&User>, parent: Option<&FolderEntry>) -> bool {
    let Some(user) = user else {
        return false;
    };
    if user.is_visitor {
        return false;
    }

    if let Some(parent) = parent {
        if parent.meta.root_folder_type == RootFolderType::Archive && !parent.is_root() {
            return false;
        }
    }

    if let Entity::Folder(folder) = entity {
        let root = folder.meta.root_folder_type;
        if folder.is_root() {
            if root == RootFolderType::Common && !user.is_admin {
                return false;
            }
            if matches!(
                root,
                RootFolderType::Share
                    | RootFolderType::Trash
                    | RootFolderType::Favorites
                    | RootFolderType::Recent
                    | RootFolderType::Projects
                    | RootFolderType::Bunch
            ) {
                return false;
            }
        }
        if root == RootFolderType::Archive {
            return false;
        }
    }

    matches!(
        effective_access(entity, parent),
        EntityAccess::None | EntityAccess::ReadWrite
    )
}

fn portal_can_delete(entity: &Entity, user: Option<&User>, parent: Option<&FolderEntry>) -> bool {
    if let Entity::File(file) = entity {
        if file.is_editing {
            return false;
        }
    }

    let Some(user) = user else {
        return false;
    };
    if user.is_visitor {
        return false;
    }

    let access = effective_access(entity, parent);
    if matches!(
        access,
        EntityAccess::Restrict
            | EntityAccess::Varies
            | EntityAccess::Review
            | EntityAccess::Comment
            | EntityAccess::FillForms
    ) {
        return false;
    }

    let parent_is_root = parent.map(FolderEntry::is_root).unwrap_or(false);
    let parent_root = parent.map(|p| p.meta.root_folder_type);

    let in_project_root = parent_is_root && parent_root.map(is_project_root).unwrap_or(false);
    if in_project_root {
        return false;
    }

    if let Entity::Folder(folder) = entity {
        if parent_is_root && folder.is_third_party {
            return false;
        }
    }

    match parent_root {
        Some(RootFolderType::Favorites) | Some(RootFolderType::Recent) => return false,
        Some(RootFolderType::Share) => return true,
        _ => {}
    }

    let meta = entity.meta();
    let is_owner = match (&user.user_id, meta.created_by.as_ref().and_then(|u| u.user_id.as_ref())) {
        (Some(me), Some(creator)) => me == creator,
        _ => false,
    };

    access == EntityAccess::None
        || (meta.root_folder_type == RootFolderType::Common && user.is_admin)
        || is_owner
}

fn portal_extras(entity: &Entity, user: Option<&User>, parent: Option<&FolderEntry>, rights: Rights) -> ActionSet {
    let mut actions = ActionSet::empty();
    let root = entity.meta().root_folder_type;
    let parent_root = parent.map(|p| p.meta.root_folder_type);

    match entity {
        Entity::File(_) => {
            if user.map(|u| !u.is_visitor).unwrap_or(false) {
                actions.insert(ActionSet::FAVORITE);
            }
            if rights.edit && !is_project_root(root) {
                actions.insert(ActionSet::SHARE);
            }
            let blocked_parent = matches!(
                parent_root,
                Some(RootFolderType::Share) | Some(RootFolderType::Favorites) | Some(RootFolderType::Recent)
            ) || parent.map(|p| p.is_third_party).unwrap_or(false);
            if rights.read && !blocked_parent {
                actions.insert(ActionSet::DUPLICATE);
            }
        }
        Entity::Folder(folder) => {
            if rights.edit && !is_project_root(root) {
                actions.insert(ActionSet::SHARE);
            }
            let parent_is_root = parent.map(FolderEntry::is_root).unwrap_or(true);
            if folder.is_third_party && parent_is_root {
                actions.insert(ActionSet::UNMOUNT);
            }
        }
    }
    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::types::EntityMeta;

    fn file(title: &str, root: RootFolderType, access: EntityAccess) -> Entity {
        let mut meta = EntityMeta::new(format!("id-{}", title), title);
        meta.root_folder_type = root;
        meta.access = access;
        meta.parent_id = Some("10".to_string());
        Entity::File(FileEntry::new(meta, 10))
    }

    fn folder(id: &str, root: RootFolderType, parent_id: Option<&str>) -> FolderEntry {
        let mut meta = EntityMeta::new(id, format!("Folder {}", id));
        meta.root_folder_type = root;
        meta.parent_id = parent_id.map(str::to_string);
        FolderEntry::new(meta)
    }

    fn owner() -> User {
        User::new("u1", "Owner")
    }

    #[test]
    fn test_action_set_ops() {
        let mut set = ActionSet::COPY | ActionSet::MOVE;
        assert!(set.contains(ActionSet::COPY));
        assert!(!set.contains(ActionSet::DELETE));
        set.insert(ActionSet::DELETE);
        set.remove(ActionSet::COPY);
        assert_eq!(set.names(), vec!["move", "delete"]);
        assert!(ActionSet::empty().is_empty());
    }

    #[test]
    fn test_trash_is_delete_and_restore_only() {
        let user = owner();
        for policy in [AccessPolicy::Portal, AccessPolicy::Device, AccessPolicy::Open] {
            for access in [EntityAccess::ReadWrite, EntityAccess::Restrict, EntityAccess::None] {
                let entity = file("Report.docx", RootFolderType::Trash, access);
                assert_eq!(
                    resolve(&entity, Some(&user), None, policy),
                    ActionSet::DELETE | ActionSet::RESTORE
                );
            }
        }
        let entity = file("a.txt", RootFolderType::DeviceTrash, EntityAccess::None);
        assert_eq!(
            resolve(&entity, None, None, AccessPolicy::Device),
            ActionSet::DELETE | ActionSet::RESTORE
        );
    }

    #[test]
    fn test_open_policy_file_actions() {
        let entity = file("Budget.xlsx", RootFolderType::WebdavAll, EntityAccess::None);
        let actions = resolve(&entity, None, None, AccessPolicy::Open);
        for expected in [
            ActionSet::OPEN,
            ActionSet::EDIT,
            ActionSet::RENAME,
            ActionSet::COPY,
            ActionSet::MOVE,
            ActionSet::DOWNLOAD,
            ActionSet::DELETE,
        ] {
            assert!(actions.contains(expected), "{:?} missing {:?}", actions, expected);
        }
        assert!(!actions.contains(ActionSet::RESTORE));

        let archive = file("backup.zip", RootFolderType::WebdavAll, EntityAccess::None);
        let actions = resolve(&archive, None, None, AccessPolicy::Open);
        assert!(!actions.contains(ActionSet::OPEN));
        assert!(!actions.contains(ActionSet::EDIT));
    }

    #[test]
    fn test_portal_review_access_blocks_edit_and_delete_not_read() {
        let user = owner();
        let parent = folder("10", RootFolderType::User, Some("2"));
        let entity = file("Contract.docx", RootFolderType::User, EntityAccess::Review);
        let actions = resolve(&entity, Some(&user), Some(&parent), AccessPolicy::Portal);
        assert!(actions.contains(ActionSet::DOWNLOAD));
        assert!(actions.contains(ActionSet::OPEN));
        assert!(!actions.contains(ActionSet::EDIT));
        assert!(!actions.contains(ActionSet::RENAME));
        assert!(!actions.contains(ActionSet::DELETE));
    }

    #[test]
    fn test_portal_restrict_denies_read() {
        let user = owner();
        let entity = file("Secret.docx", RootFolderType::User, EntityAccess::Restrict);
        let actions = resolve(&entity, Some(&user), None, AccessPolicy::Portal);
        assert!(!actions.contains(ActionSet::DOWNLOAD));
        assert!(!actions.contains(ActionSet::COPY));
    }

    #[test]
    fn test_portal_without_user_cannot_edit_or_delete() {
        let entity = file("Notes.docx", RootFolderType::User, EntityAccess::ReadWrite);
        let actions = resolve(&entity, None, None, AccessPolicy::Portal);
        assert!(!actions.contains(ActionSet::EDIT));
        assert!(!actions.contains(ActionSet::DELETE));
        assert!(!actions.contains(ActionSet::FAVORITE));
        assert!(actions.contains(ActionSet::DOWNLOAD));
    }

    #[test]
    fn test_portal_delete_requires_ownership() {
        let user = owner();
        let parent = folder("10", RootFolderType::User, Some("2"));

        let mut mine = file("Mine.docx", RootFolderType::User, EntityAccess::ReadWrite);
        mine.meta_mut().created_by = Some(User::new("u1", "Owner"));
        assert!(resolve(&mine, Some(&user), Some(&parent), AccessPolicy::Portal).contains(ActionSet::DELETE));

        let mut theirs = file("Theirs.docx", RootFolderType::User, EntityAccess::ReadWrite);
        theirs.meta_mut().created_by = Some(User::new("u2", "Other"));
        assert!(!resolve(&theirs, Some(&user), Some(&parent), AccessPolicy::Portal).contains(ActionSet::DELETE));
    }

    #[test]
    fn test_portal_common_admin_and_shared_parent() {
        let mut admin = owner();
        admin.is_admin = true;
        let common = folder("20", RootFolderType::Common, Some("0"));
        let entity = file("Policy.docx", RootFolderType::Common, EntityAccess::ReadWrite);
        assert!(resolve(&entity, Some(&admin), Some(&common), AccessPolicy::Portal).contains(ActionSet::DELETE));
        assert!(!resolve(&entity, Some(&owner()), Some(&common), AccessPolicy::Portal).contains(ActionSet::DELETE));

        let share = folder("30", RootFolderType::Share, Some("0"));
        let shared = file("Shared.docx", RootFolderType::Share, EntityAccess::ReadWrite);
        let actions = resolve(&shared, Some(&owner()), Some(&share), AccessPolicy::Portal);
        assert!(actions.contains(ActionSet::DELETE));
        assert!(!actions.contains(ActionSet::DUPLICATE));
    }

    #[test]
    fn test_portal_editing_file_cannot_be_deleted() {
        let user = owner();
        let mut entity = file("Live.docx", RootFolderType::User, EntityAccess::None);
        if let Entity::File(f) = &mut entity {
            f.is_editing = true;
        }
        assert!(!resolve(&entity, Some(&user), None, AccessPolicy::Portal).contains(ActionSet::DELETE));
    }

    #[test]
    fn test_portal_special_root_folders_block_edit() {
        let user = owner();
        let favorites = Entity::Folder(folder("11", RootFolderType::Favorites, None));
        let actions = resolve(&favorites, Some(&user), None, AccessPolicy::Portal);
        assert!(!actions.contains(ActionSet::RENAME));
        assert!(!actions.contains(ActionSet::OPEN));

        let mut third_party = folder("40", RootFolderType::User, Some("0"));
        third_party.is_third_party = true;
        let root = folder("2", RootFolderType::User, None);
        let actions = resolve(&Entity::Folder(third_party), Some(&user), Some(&root), AccessPolicy::Portal);
        assert!(actions.contains(ActionSet::UNMOUNT));
        assert!(!actions.contains(ActionSet::DELETE));
    }

    #[test]
    fn test_device_policy_outside_device_roots() {
        let inside = file("a.docx", RootFolderType::DeviceDocuments, EntityAccess::None);
        assert!(resolve(&inside, None, None, AccessPolicy::Device).contains(ActionSet::RENAME));

        let outside = file("a.docx", RootFolderType::User, EntityAccess::None);
        assert!(resolve(&outside, None, None, AccessPolicy::Device).is_empty());
    }

    #[test]
    fn test_folder_actions_open_policy() {
        let entity = Entity::Folder(folder("/Docs", RootFolderType::NextcloudAll, Some("/")));
        let actions = resolve(&entity, None, None, AccessPolicy::Open);
        assert_eq!(
            actions,
            ActionSet::OPEN | ActionSet::RENAME | ActionSet::COPY | ActionSet::MOVE | ActionSet::DELETE
        );
    }
}
