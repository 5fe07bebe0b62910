// docbridge - one file-provider layer for document servers, WebDAV shares,
// OneDrive and local documents

pub mod config;
pub mod providers;
pub mod registry;
pub mod transfer;

#[cfg(test)]
mod test_support;

pub use config::CoreConfig;
pub use providers::{
    ActionSet, ConflictResolution, DeleteMode, Entity, FetchError, FetchParams, FileEntry, FileProvider, FolderEntry,
    FolderListing, ProviderError, ProviderType, TransferMode, User,
};
pub use registry::{ConnectInfo, ProviderRegistry, SharedProvider};
pub use transfer::{BatchReport, TransferEvent, TransferRequest};

use config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins over the configured default directive. Calling this twice
/// (or after the host installed its own subscriber) is harmless.
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.default_directive));
    let result = tracing_subscriber::fmt().with_env_filter(filter).with_target(true).try_init();
    if result.is_ok() {
        tracing::debug!("docbridge {} logging initialized", env!("CARGO_PKG_VERSION"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_twice() {
        let config = LoggingConfig::default();
        init_logging(&config);
        init_logging(&config);
    }
}
