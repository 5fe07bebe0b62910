//! Bundled empty-document templates
//!
//! Layout: `<template_dir>/new/<lang-REGION>/new.<ext>`.

use std::path::{Path, PathBuf};

use super::ProviderError;
use crate::config::TemplatesConfig;

const FALLBACK_LOCALE: &str = "en-US";

#[derive(Debug, Clone)]
pub struct DocumentTemplates {
    root: PathBuf,
    locale: String,
}

impl DocumentTemplates {
    pub fn new(root: impl Into<PathBuf>, locale: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            locale: locale.into(),
        }
    }

    pub fn from_config(config: &TemplatesConfig) -> Self {
        Self::new(&config.template_dir, &config.locale)
    }

    /// Locale directory to use: exact match, then the first directory with the
    /// same language, then `en-US`
    async fn locale_dir(&self) -> PathBuf {
        let base = self.root.join("new");
        let exact = base.join(&self.locale);
        if is_dir(&exact).await {
            return exact;
        }

        let lang = self.locale.split(['-', '_']).next().unwrap_or_default().to_lowercase();
        if !lang.is_empty() {
            if let Some(dir) = same_language_dir(&base, &lang).await {
                return dir;
            }
        }

        base.join(FALLBACK_LOCALE)
    }

    /// Path of the template for `ext`
    pub async fn path_for(&self, ext: &str) -> Result<PathBuf, ProviderError> {
        let ext = ext.trim_start_matches('.').to_lowercase();
        let path = self.locale_dir().await.join(format!("new.{}", ext));
        match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => Ok(path),
            _ => Err(ProviderError::NotFound(format!("No template for .{} documents", ext))),
        }
    }

    /// Template bytes for `ext`
    pub async fn load(&self, ext: &str) -> Result<Vec<u8>, ProviderError> {
        let path = self.path_for(ext).await?;
        tracing::debug!("[Templates] Using {}", path.display());
        Ok(tokio::fs::read(&path).await?)
    }
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false)
}

async fn same_language_dir(base: &Path, lang: &str) -> Option<PathBuf> {
    let mut reader = tokio::fs::read_dir(base).await.ok()?;
    let mut candidates = Vec::new();
    while let Ok(Some(entry)) = reader.next_entry().await {
        let matches = entry
            .file_name()
            .to_str()
            .map(|name| name.to_lowercase().starts_with(lang))
            .unwrap_or(false);
        if matches && is_dir(&entry.path()).await {
            candidates.push(entry.path());
        }
    }
    candidates.sort();
    candidates.into_iter().next()
}
