//! Shared types for file providers
//!
//! This module contains the vocabulary every adapter produces and consumes:
//! provider tags, the entity model (files and folders), listing parameters,
//! transfer options and the error taxonomy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Supported provider backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    /// Document server REST API (paginated, server-side jobs)
    Onlyoffice,
    /// Generic WebDAV endpoint
    WebDav,
    /// Nextcloud (WebDAV under /remote.php/dav/files/<user>)
    Nextcloud,
    /// ownCloud (WebDAV under /remote.php/dav/files/<user>)
    OwnCloud,
    /// Infomaniak kDrive (WebDAV)
    KDrive,
    /// Microsoft OneDrive (OAuth2, Graph API)
    OneDrive,
    /// Documents stored on this device
    Local,
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderType::Onlyoffice => write!(f, "ONLYOFFICE"),
            ProviderType::WebDav => write!(f, "WebDAV"),
            ProviderType::Nextcloud => write!(f, "Nextcloud"),
            ProviderType::OwnCloud => write!(f, "ownCloud"),
            ProviderType::KDrive => write!(f, "kDrive"),
            ProviderType::OneDrive => write!(f, "OneDrive"),
            ProviderType::Local => write!(f, "On Device"),
        }
    }
}

/// Tags written by other clients that this crate recognizes but cannot serve
const UNSUPPORTED_TAGS: &[&str] = &["googledrive", "dropbox", "yandex", "icloud"];

impl ProviderType {
    /// Session `type` tag
    pub fn tag(&self) -> &'static str {
        match self {
            ProviderType::Onlyoffice => "onlyoffice",
            ProviderType::WebDav => "webdav",
            ProviderType::Nextcloud => "nextcloud",
            ProviderType::OwnCloud => "owncloud",
            ProviderType::KDrive => "kdrive",
            ProviderType::OneDrive => "onedrive",
            ProviderType::Local => "local",
        }
    }

    /// Resolve a session `type` tag
    pub fn from_tag(tag: &str) -> Result<Self, ProviderError> {
        let all = [
            ProviderType::Onlyoffice,
            ProviderType::WebDav,
            ProviderType::Nextcloud,
            ProviderType::OwnCloud,
            ProviderType::KDrive,
            ProviderType::OneDrive,
            ProviderType::Local,
        ];
        let lower = tag.to_ascii_lowercase();
        if let Some(found) = all.into_iter().find(|t| t.tag() == lower) {
            return Ok(found);
        }
        if UNSUPPORTED_TAGS.contains(&lower.as_str()) {
            return Err(ProviderError::Unsupported(format!("{} provider", tag)));
        }
        Err(ProviderError::InvalidConfig(format!("Unknown provider type: {}", tag)))
    }

    /// Whether this backend belongs to the WebDAV family
    pub fn is_webdav_family(&self) -> bool {
        matches!(
            self,
            ProviderType::WebDav | ProviderType::Nextcloud | ProviderType::OwnCloud | ProviderType::KDrive
        )
    }

    /// Whether sessions of this type carry an expiring token
    pub fn uses_token(&self) -> bool {
        matches!(self, ProviderType::Onlyoffice | ProviderType::OneDrive)
    }
}

/// Machine-distinguishable error kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unreachable,
    AuthExpired,
    NotFound,
    NameConflict,
    Unsupported,
    PartialFailure,
    Cancelled,
    PermissionDenied,
    InvalidConfig,
    Parse,
    Server,
    OperationFailed,
    Io,
}

/// Provider error types
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Backend unreachable: {0}")]
    Unreachable(String),

    #[error("Authorization expired: {message}{}", refresh_failure.as_ref().map(|r| format!(" (refresh failed: {})", r)).unwrap_or_default())]
    AuthExpired {
        message: String,
        refresh_failure: Option<String>,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Name already exists: {0}")]
    NameConflict(String),

    #[error("Operation not supported: {0}")]
    Unsupported(String),

    #[error("{failed} of {total} items failed, last error: {last}")]
    PartialFailure {
        failed: usize,
        total: usize,
        last: Box<ProviderError>,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Server operation failed: {0}")]
    OperationFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProviderError {
    /// Shorthand for an expired credential without refresh details
    pub fn auth_expired(message: impl Into<String>) -> Self {
        ProviderError::AuthExpired {
            message: message.into(),
            refresh_failure: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::Unreachable(_) => ErrorKind::Unreachable,
            ProviderError::AuthExpired { .. } => ErrorKind::AuthExpired,
            ProviderError::NotFound(_) => ErrorKind::NotFound,
            ProviderError::NameConflict(_) => ErrorKind::NameConflict,
            ProviderError::Unsupported(_) => ErrorKind::Unsupported,
            ProviderError::PartialFailure { .. } => ErrorKind::PartialFailure,
            ProviderError::Cancelled => ErrorKind::Cancelled,
            ProviderError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            ProviderError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            ProviderError::ParseError(_) => ErrorKind::Parse,
            ProviderError::ServerError(_) => ErrorKind::Server,
            ProviderError::OperationFailed(_) => ErrorKind::OperationFailed,
            ProviderError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            ProviderError::Io(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                ErrorKind::NameConflict
            }
            ProviderError::Io(_) => ErrorKind::Io,
        }
    }

    /// Check if this error is recoverable (can retry)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ProviderError::Unreachable(_) | ProviderError::ServerError(_) | ProviderError::AuthExpired { .. }
        )
    }

    /// Errors that end a batch instead of being recorded against one item
    pub fn is_batch_fatal(&self) -> bool {
        matches!(self, ProviderError::OperationFailed(_) | ProviderError::Cancelled)
    }
}

/// Access level granted on an entity (document server wire values)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum EntityAccess {
    #[default]
    None,
    ReadWrite,
    Read,
    Restrict,
    Varies,
    Review,
    Comment,
    FillForms,
}

impl From<i64> for EntityAccess {
    fn from(value: i64) -> Self {
        match value {
            1 => EntityAccess::ReadWrite,
            2 => EntityAccess::Read,
            3 => EntityAccess::Restrict,
            4 => EntityAccess::Varies,
            5 => EntityAccess::Review,
            6 => EntityAccess::Comment,
            7 => EntityAccess::FillForms,
            _ => EntityAccess::None,
        }
    }
}

impl From<EntityAccess> for i64 {
    fn from(value: EntityAccess) -> Self {
        match value {
            EntityAccess::None => 0,
            EntityAccess::ReadWrite => 1,
            EntityAccess::Read => 2,
            EntityAccess::Restrict => 3,
            EntityAccess::Varies => 4,
            EntityAccess::Review => 5,
            EntityAccess::Comment => 6,
            EntityAccess::FillForms => 7,
        }
    }
}

/// Logical top-level location an entity lives under
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum RootFolderType {
    #[default]
    Default,
    Common,
    Bunch,
    Trash,
    User,
    Share,
    Projects,
    Favorites,
    Recent,
    Templates,
    Privacy,
    VirtualRooms,
    Archive,
    DeviceDocuments,
    DeviceTrash,
    NextcloudAll,
    OwncloudAll,
    WebdavAll,
    OnedriveAll,
    KdriveAll,
}

impl From<i64> for RootFolderType {
    fn from(value: i64) -> Self {
        match value {
            1 => RootFolderType::Common,
            2 => RootFolderType::Bunch,
            3 => RootFolderType::Trash,
            5 => RootFolderType::User,
            6 => RootFolderType::Share,
            8 => RootFolderType::Projects,
            10 => RootFolderType::Favorites,
            11 => RootFolderType::Recent,
            12 => RootFolderType::Templates,
            13 => RootFolderType::Privacy,
            14 => RootFolderType::VirtualRooms,
            20 => RootFolderType::Archive,
            50 => RootFolderType::DeviceDocuments,
            51 => RootFolderType::DeviceTrash,
            101 => RootFolderType::NextcloudAll,
            102 => RootFolderType::OwncloudAll,
            104 => RootFolderType::WebdavAll,
            108 => RootFolderType::OnedriveAll,
            109 => RootFolderType::KdriveAll,
            _ => RootFolderType::Default,
        }
    }
}

impl From<RootFolderType> for i64 {
    fn from(value: RootFolderType) -> Self {
        match value {
            RootFolderType::Default => 0,
            RootFolderType::Common => 1,
            RootFolderType::Bunch => 2,
            RootFolderType::Trash => 3,
            RootFolderType::User => 5,
            RootFolderType::Share => 6,
            RootFolderType::Projects => 8,
            RootFolderType::Favorites => 10,
            RootFolderType::Recent => 11,
            RootFolderType::Templates => 12,
            RootFolderType::Privacy => 13,
            RootFolderType::VirtualRooms => 14,
            RootFolderType::Archive => 20,
            RootFolderType::DeviceDocuments => 50,
            RootFolderType::DeviceTrash => 51,
            RootFolderType::NextcloudAll => 101,
            RootFolderType::OwncloudAll => 102,
            RootFolderType::WebdavAll => 104,
            RootFolderType::OnedriveAll => 108,
            RootFolderType::KdriveAll => 109,
        }
    }
}

impl RootFolderType {
    /// Trash of any backend
    pub fn is_trash(&self) -> bool {
        matches!(self, RootFolderType::Trash | RootFolderType::DeviceTrash)
    }

    pub fn is_device(&self) -> bool {
        matches!(self, RootFolderType::DeviceDocuments | RootFolderType::DeviceTrash)
    }
}

/// Account the provider is authenticated as
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Department, or the backend name for third-party accounts
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_visitor: bool,
    #[serde(default)]
    pub avatar: Option<String>,
}

impl User {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            display_name: Some(display_name.into()),
            ..Default::default()
        }
    }
}

/// Fields shared by files and folders
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityMeta {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_by: Option<User>,
    #[serde(default)]
    pub updated_by: Option<User>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub root_folder_type: RootFolderType,
    #[serde(default)]
    pub provider_type: Option<ProviderType>,
    #[serde(default)]
    pub access: EntityAccess,
}

impl EntityMeta {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            ..Default::default()
        }
    }
}

/// A file listed by a provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    #[serde(flatten)]
    pub meta: EntityMeta,
    #[serde(default)]
    pub content_length: u64,
    #[serde(default)]
    pub display_content_length: String,
    /// Backend-specific pointer to the content
    #[serde(default)]
    pub view_url: Option<String>,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub is_editing: bool,
    #[serde(default)]
    pub version: u32,
}

impl FileEntry {
    pub fn new(meta: EntityMeta, content_length: u64) -> Self {
        Self {
            meta,
            content_length,
            display_content_length: human_size(content_length),
            ..Default::default()
        }
    }

    /// Lowercased extension without the dot
    pub fn extension(&self) -> Option<String> {
        file_extension(&self.meta.title)
    }
}

/// A folder listed by a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderEntry {
    #[serde(flatten)]
    pub meta: EntityMeta,
    /// -1 when unknown
    #[serde(default = "unknown_count")]
    pub files_count: i64,
    /// -1 when unknown
    #[serde(default = "unknown_count")]
    pub folders_count: i64,
    #[serde(default)]
    pub is_third_party: bool,
}

fn unknown_count() -> i64 {
    -1
}

impl Default for FolderEntry {
    fn default() -> Self {
        Self {
            meta: EntityMeta::default(),
            files_count: -1,
            folders_count: -1,
            is_third_party: false,
        }
    }
}

impl FolderEntry {
    pub fn new(meta: EntityMeta) -> Self {
        Self {
            meta,
            ..Default::default()
        }
    }

    /// Root folders have no parent (the document server reports "0")
    pub fn is_root(&self) -> bool {
        match self.meta.parent_id.as_deref() {
            None => true,
            Some(parent) => parent.is_empty() || parent == "0",
        }
    }
}

/// Listing unit: a file or a folder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Entity {
    File(FileEntry),
    Folder(FolderEntry),
}

impl Entity {
    pub fn meta(&self) -> &EntityMeta {
        match self {
            Entity::File(f) => &f.meta,
            Entity::Folder(f) => &f.meta,
        }
    }

    pub fn meta_mut(&mut self) -> &mut EntityMeta {
        match self {
            Entity::File(f) => &mut f.meta,
            Entity::Folder(f) => &mut f.meta,
        }
    }

    pub fn id(&self) -> &str {
        &self.meta().id
    }

    pub fn title(&self) -> &str {
        &self.meta().title
    }

    pub fn is_folder(&self) -> bool {
        matches!(self, Entity::Folder(_))
    }

    pub fn as_file(&self) -> Option<&FileEntry> {
        match self {
            Entity::File(f) => Some(f),
            Entity::Folder(_) => None,
        }
    }

    pub fn as_folder(&self) -> Option<&FolderEntry> {
        match self {
            Entity::Folder(f) => Some(f),
            Entity::File(_) => None,
        }
    }
}

impl From<FileEntry> for Entity {
    fn from(file: FileEntry) -> Self {
        Entity::File(file)
    }
}

impl From<FolderEntry> for Entity {
    fn from(folder: FolderEntry) -> Self {
        Entity::Folder(folder)
    }
}

/// Sort key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortType {
    Title,
    Type,
    #[default]
    DateAndTime,
    Size,
}

impl SortType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortType::Title => "title",
            SortType::Type => "type",
            SortType::DateAndTime => "dateandtime",
            SortType::Size => "size",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Ascending => "ascending",
            SortOrder::Descending => "descending",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    #[serde(rename = "type")]
    pub sort_type: SortType,
    pub order: SortOrder,
}

impl SortSpec {
    pub fn new(sort_type: SortType, order: SortOrder) -> Self {
        Self { sort_type, order }
    }
}

/// Parameters of one `fetch` call. Also kept as the listing's fetch info so a
/// sort can be replayed without going back to the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchParams {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub sort: SortSpec,
    /// Backend filter tag (document server `filterType`)
    #[serde(default)]
    pub filter: Option<String>,
    /// Zero-based page; only paginated backends look past page 0
    #[serde(default)]
    pub page: usize,
    #[serde(default)]
    pub page_size: Option<usize>,
}

impl FetchParams {
    pub fn search_text(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

/// Result of a successful fetch
#[derive(Debug, Clone, PartialEq)]
pub struct FolderListing {
    pub folder: FolderEntry,
    pub items: Vec<Entity>,
    pub total: usize,
}

/// Failed fetch. `attempted` is false when the call never reached the backend,
/// letting callers tell "empty folder" apart from "could not list".
#[derive(Error, Debug)]
#[error("{error}")]
pub struct FetchError {
    #[source]
    pub error: ProviderError,
    pub attempted: bool,
}

impl FetchError {
    pub fn attempted(error: ProviderError) -> Self {
        Self {
            error,
            attempted: true,
        }
    }

    pub fn not_attempted(error: ProviderError) -> Self {
        Self {
            error,
            attempted: false,
        }
    }
}

/// What to do when the destination already holds an entity with the same name
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictResolution {
    /// Leave the destination untouched and omit the item from the results
    #[default]
    Skip,
    Overwrite,
    /// Transfer under a disambiguated name
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    Copy,
    Move,
}

/// How a delete treats items outside the trash
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteMode {
    /// Move into the trash where the backend has one; items already in the
    /// trash are removed for good
    #[default]
    Auto,
    /// Remove immediately, bypassing the trash (used by moves across providers)
    Permanent,
}

/// Per-item result of a transfer primitive
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Transferred(Entity),
    Skipped,
}

/// Lowercased extension of a title, without the dot
pub fn file_extension(title: &str) -> Option<String> {
    let (stem, ext) = title.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

/// Human readable byte count ("1.5 MB")
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// Parse the timestamp formats backends send (RFC 3339 and RFC 2822)
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    DateTime::parse_from_rfc3339(value)
        .or_else(|_| DateTime::parse_from_rfc2822(value))
        .map(|d| d.with_timezone(&Utc))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_type_tags() {
        assert_eq!(ProviderType::from_tag("webdav").unwrap(), ProviderType::WebDav);
        assert_eq!(ProviderType::from_tag("OneDrive").unwrap(), ProviderType::OneDrive);
        assert!(matches!(
            ProviderType::from_tag("dropbox"),
            Err(ProviderError::Unsupported(_))
        ));
        assert!(matches!(
            ProviderType::from_tag("gopher"),
            Err(ProviderError::InvalidConfig(_))
        ));
        assert!(ProviderType::Nextcloud.is_webdav_family());
        assert!(!ProviderType::OneDrive.is_webdav_family());
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(ProviderError::auth_expired("token").kind(), ErrorKind::AuthExpired);
        assert_eq!(ProviderError::Cancelled.kind(), ErrorKind::Cancelled);
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(ProviderError::from(io).kind(), ErrorKind::NotFound);
        assert!(ProviderError::OperationFailed("poll".into()).is_batch_fatal());
        assert!(!ProviderError::NotFound("x".into()).is_batch_fatal());
    }

    #[test]
    fn test_auth_expired_message_includes_refresh_failure() {
        let err = ProviderError::AuthExpired {
            message: "token expired".to_string(),
            refresh_failure: Some("invalid_grant".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Authorization expired: token expired (refresh failed: invalid_grant)"
        );
    }

    #[test]
    fn test_access_and_root_wire_values() {
        let access: EntityAccess = serde_json::from_str("5").unwrap();
        assert_eq!(access, EntityAccess::Review);
        assert_eq!(serde_json::to_string(&EntityAccess::FillForms).unwrap(), "7");

        let root: RootFolderType = serde_json::from_str("51").unwrap();
        assert_eq!(root, RootFolderType::DeviceTrash);
        assert!(root.is_trash());
        let unknown: RootFolderType = serde_json::from_str("999").unwrap();
        assert_eq!(unknown, RootFolderType::Default);
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("Report.DOCX"), Some("docx".to_string()));
        assert_eq!(file_extension("archive.tar.gz"), Some("gz".to_string()));
        assert_eq!(file_extension("Makefile"), None);
        assert_eq!(file_extension(".bashrc"), None);
    }

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(1536), "1.5 KB");
        assert_eq!(human_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_folder_root_detection() {
        let mut folder = FolderEntry::new(EntityMeta::new("12", "Docs"));
        assert!(folder.is_root());
        folder.meta.parent_id = Some("0".to_string());
        assert!(folder.is_root());
        folder.meta.parent_id = Some("7".to_string());
        assert!(!folder.is_root());
        assert_eq!(folder.files_count, -1);
    }

    #[test]
    fn test_parse_timestamp() {
        assert!(parse_timestamp("2024-03-01T10:15:00.0000000+03:00").is_some());
        assert!(parse_timestamp("Tue, 05 Mar 2024 08:00:00 GMT").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }
}
