//! Transfer orchestrator
//!
//! Drives multi-item copy, move and delete batches against one or two
//! providers. Items run strictly one after another; a failed item is recorded
//! and the batch continues, except for errors that end it (a server-side job
//! that failed or could not be polled). Cancellation is checked before each
//! item, so an item already in flight always completes.

use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex as StdMutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::providers::naming;
use crate::providers::{
    ConflictResolution, DeleteMode, Entity, ErrorKind, FileProvider, FolderEntry, ItemOutcome, ProviderError,
    TransferMode,
};
use crate::registry::SharedProvider;

pub type EventSender = mpsc::UnboundedSender<TransferEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<TransferEvent>;

/// Per-item state as reported to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    InFlight,
    Done,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&ProviderError> for EventError {
    fn from(error: &ProviderError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Progress notifications, delivered in order on one channel
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TransferEvent {
    Begin {
        total: usize,
    },
    Item {
        index: usize,
        title: String,
        state: ItemState,
        /// Processed items over total, 0.0 to 1.0
        progress: f64,
    },
    End {
        progress: f64,
        error: Option<EventError>,
        cancelled: bool,
    },
}

/// Copy or move request against one provider
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub items: Vec<Entity>,
    pub destination: FolderEntry,
    pub mode: TransferMode,
    pub resolution: ConflictResolution,
}

impl TransferRequest {
    pub fn new(items: Vec<Entity>, destination: FolderEntry, mode: TransferMode, resolution: ConflictResolution) -> Self {
        Self {
            items,
            destination,
            mode,
            resolution,
        }
    }
}

/// Cancellation and event channel of one running batch
#[derive(Debug, Clone, Default)]
pub struct TransferContext {
    pub cancel: CancellationToken,
    pub events: Option<EventSender>,
}

impl TransferContext {
    pub fn new(cancel: CancellationToken, events: Option<EventSender>) -> Self {
        Self { cancel, events }
    }

    fn emit(&self, event: TransferEvent) {
        if let Some(ref tx) = self.events {
            // A dropped receiver only means nobody is watching
            let _ = tx.send(event);
        }
    }
}

/// Cancellation scope of one provider. `cancel_all` stops every batch begun
/// so far; batches begun afterwards start uncancelled.
#[derive(Debug, Default)]
pub struct CancelScope {
    current: StdMutex<CancellationToken>,
}

impl CancelScope {
    /// Token for a new batch
    pub fn begin(&self) -> CancellationToken {
        let guard = self.current.lock().unwrap_or_else(|e| e.into_inner());
        guard.child_token()
    }

    pub fn cancel_all(&self) {
        let mut guard = self.current.lock().unwrap_or_else(|e| e.into_inner());
        guard.cancel();
        *guard = CancellationToken::new();
    }
}

impl Clone for CancelScope {
    /// Copies get their own scope
    fn clone(&self) -> Self {
        Self::default()
    }
}

/// Outcome of a batch
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Entities produced by successful items (skipped items are omitted)
    pub results: Vec<Entity>,
    pub total: usize,
    pub failed: usize,
    pub last_error: Option<ProviderError>,
    pub cancelled: bool,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        !self.cancelled && self.last_error.is_none()
    }

    /// Collapse into a single result. Partial results are lost; inspect the
    /// report directly to reconcile a listing.
    pub fn into_result(self) -> Result<Vec<Entity>, ProviderError> {
        if self.cancelled {
            return Err(ProviderError::Cancelled);
        }
        match self.last_error {
            None => Ok(self.results),
            Some(error) if error.is_batch_fatal() => Err(error),
            Some(error) if self.total == 1 => Err(error),
            Some(error) => Err(ProviderError::PartialFailure {
                failed: self.failed,
                total: self.total,
                last: Box::new(error),
            }),
        }
    }
}

/// Running batch spawned on the runtime
pub struct TransferHandle {
    pub events: EventReceiver,
    pub cancel: CancellationToken,
    pub join: JoinHandle<BatchReport>,
}

impl TransferHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the batch to end
    pub async fn wait(self) -> Result<BatchReport, ProviderError> {
        self.join
            .await
            .map_err(|e| ProviderError::OperationFailed(format!("Transfer task failed: {}", e)))
    }
}

/// Entities of `items` whose title exists among `existing`
pub fn conflicting(items: &[Entity], existing: &[Entity]) -> Vec<Entity> {
    items
        .iter()
        .filter(|item| existing.iter().any(|e| e.title() == item.title()))
        .cloned()
        .collect()
}

fn progress(processed: usize, total: usize) -> f64 {
    if total == 0 {
        1.0
    } else {
        processed as f64 / total as f64
    }
}

/// Run `step` over `items` sequentially, collecting a report and emitting events
async fn drive<F, Fut>(items: &[Entity], ctx: &TransferContext, label: &str, mut step: F) -> BatchReport
where
    F: FnMut(Entity) -> Fut,
    Fut: Future<Output = Result<ItemOutcome, ProviderError>>,
{
    let total = items.len();
    let mut report = BatchReport {
        total,
        ..Default::default()
    };
    let mut processed = 0;

    tracing::info!("[Transfer] {} of {} item(s) started", label, total);
    ctx.emit(TransferEvent::Begin { total });

    for (index, item) in items.iter().enumerate() {
        if ctx.cancel.is_cancelled() {
            tracing::info!("[Transfer] {} cancelled after {} of {} item(s)", label, processed, total);
            report.cancelled = true;
            break;
        }

        let title = item.title().to_string();
        ctx.emit(TransferEvent::Item {
            index,
            title: title.clone(),
            state: ItemState::InFlight,
            progress: progress(processed, total),
        });

        let (state, fatal) = match step(item.clone()).await {
            Ok(ItemOutcome::Transferred(entity)) => {
                report.results.push(entity);
                (ItemState::Done, false)
            }
            Ok(ItemOutcome::Skipped) => {
                tracing::debug!("[Transfer] Skipped existing {}", title);
                (ItemState::Skipped, false)
            }
            Err(ProviderError::Cancelled) => {
                report.cancelled = true;
                (ItemState::Failed, true)
            }
            Err(error) => {
                tracing::warn!("[Transfer] {} failed for {}: {}", label, title, error);
                let fatal = error.is_batch_fatal();
                report.failed += 1;
                report.last_error = Some(error);
                (ItemState::Failed, fatal)
            }
        };

        processed += 1;
        ctx.emit(TransferEvent::Item {
            index,
            title,
            state,
            progress: progress(processed, total),
        });

        if fatal {
            break;
        }
    }

    tracing::info!(
        "[Transfer] {} finished: {} done, {} failed{}",
        label,
        report.results.len(),
        report.failed,
        if report.cancelled { ", cancelled" } else { "" }
    );
    ctx.emit(TransferEvent::End {
        progress: 1.0,
        error: report.last_error.as_ref().map(EventError::from),
        cancelled: report.cancelled,
    });
    report
}

/// Copy or move `request.items` inside one provider
pub async fn run_transfer<P>(provider: &P, request: &TransferRequest, ctx: &TransferContext) -> BatchReport
where
    P: FileProvider + ?Sized,
{
    let dest = &request.destination;
    let (mode, resolution) = (request.mode, request.resolution);
    let label = match mode {
        TransferMode::Copy => "copy",
        TransferMode::Move => "move",
    };
    drive(&request.items, ctx, label, move |item| async move {
        provider.transfer_item(&item, dest, mode, resolution).await
    })
    .await
}

/// Delete `items` one by one
pub async fn run_delete<P>(
    provider: &P,
    items: &[Entity],
    from: &FolderEntry,
    mode: DeleteMode,
    ctx: &TransferContext,
) -> BatchReport
where
    P: FileProvider + ?Sized,
{
    tracing::debug!("[Transfer] Deleting {} item(s) from {}", items.len(), from.meta.id);
    drive(items, ctx, "delete", move |item| async move {
        provider.delete_item(&item, mode).await?;
        Ok(ItemOutcome::Transferred(item))
    })
    .await
}

/// Copy or move between two different providers. Files pass through memory;
/// folders are recreated and walked recursively. A move deletes the source
/// permanently once its copy succeeded.
pub async fn transfer_between<S, T>(source: &S, target: &T, request: &TransferRequest, ctx: &TransferContext) -> BatchReport
where
    S: FileProvider + ?Sized,
    T: FileProvider + ?Sized,
{
    let dest = &request.destination;
    let (mode, resolution) = (request.mode, request.resolution);
    drive(&request.items, ctx, "cross-provider transfer", move |item| async move {
        let outcome = copy_across(source, target, &item, dest, resolution).await?;
        if mode == TransferMode::Move && matches!(outcome, ItemOutcome::Transferred(_)) {
            source.delete_item(&item, DeleteMode::Permanent).await?;
        }
        Ok(outcome)
    })
    .await
}

type BoxedOutcome<'a> = Pin<Box<dyn Future<Output = Result<ItemOutcome, ProviderError>> + Send + 'a>>;

fn copy_across<'a, S, T>(
    source: &'a S,
    target: &'a T,
    item: &'a Entity,
    dest: &'a FolderEntry,
    resolution: ConflictResolution,
) -> BoxedOutcome<'a>
where
    S: FileProvider + ?Sized,
    T: FileProvider + ?Sized,
{
    Box::pin(async move {
        let existing = target.children(dest).await?;
        let clash = existing.iter().find(|e| e.title() == item.title());

        let mut title = item.title().to_string();
        let mut overwrite = false;
        if let Some(found) = clash {
            match resolution {
                ConflictResolution::Skip => return Ok(ItemOutcome::Skipped),
                ConflictResolution::Overwrite => overwrite = true,
                ConflictResolution::Duplicate => {
                    title = naming::unique_name(&title, |name| existing.iter().any(|e| e.title() == name));
                }
            }
            if overwrite && found.is_folder() != item.is_folder() {
                target.delete_item(found, DeleteMode::Permanent).await?;
                overwrite = false;
            }
        }

        match item {
            Entity::File(file) => {
                let data = source.download(file).await?;
                let uploaded = target.upload(dest, &title, data, overwrite).await?;
                Ok(ItemOutcome::Transferred(Entity::File(uploaded)))
            }
            Entity::Folder(folder) => {
                // Overwriting a folder merges into the existing one
                let created = match clash.and_then(Entity::as_folder) {
                    Some(existing_folder) if overwrite => existing_folder.clone(),
                    _ => target.create_folder(dest, &title).await?,
                };
                // Cancellation is honoured between top-level items only
                for child in source.children(folder).await? {
                    copy_across(source, target, &child, &created, ConflictResolution::Overwrite).await?;
                }
                Ok(ItemOutcome::Transferred(Entity::Folder(created)))
            }
        }
    })
}

/// Spawn a transfer against a shared provider. The provider is locked for one
/// item at a time, so other callers can use it between items.
pub async fn spawn_transfer(provider: SharedProvider, request: TransferRequest) -> TransferHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = provider.lock().await.listing().batches.begin();
    let ctx = TransferContext::new(cancel.clone(), Some(tx));

    let join = tokio::spawn(async move {
        let TransferRequest {
            items,
            destination,
            mode,
            resolution,
        } = request;
        let label = match mode {
            TransferMode::Copy => "copy",
            TransferMode::Move => "move",
        };
        drive(&items, &ctx, label, |item| {
            let provider = provider.clone();
            let destination = destination.clone();
            async move {
                let guard = provider.lock().await;
                guard.transfer_item(&item, &destination, mode, resolution).await
            }
        })
        .await
    });

    TransferHandle {
        events: rx,
        cancel,
        join,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{EntityMeta, FileEntry};
    use crate::test_support::{folder_entry, MemoryProvider};
    use std::sync::Arc;

    fn drain(rx: &mut EventReceiver) -> Vec<TransferEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_skip_excludes_conflicting_item() {
        let provider = MemoryProvider::new();
        let src = provider.add_folder("/", "Inbox");
        let dest = provider.add_folder("/", "Archive");
        let report_doc = provider.add_file(&src.meta.id, "Report.docx", b"new");
        let notes = provider.add_file(&src.meta.id, "Notes.txt", b"n");
        provider.add_file(&dest.meta.id, "Report.docx", b"old");

        let items = vec![report_doc.clone(), notes.clone()];
        let conflicts = provider.check_transfer(&items, &dest).await.unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].title(), "Report.docx");

        let request = TransferRequest::new(items, dest.clone(), TransferMode::Copy, ConflictResolution::Skip);
        let report = provider.transfer(&request, None).await;
        assert!(report.is_success());
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].title(), "Notes.txt");
        assert_eq!(provider.content_of(&dest.meta.id, "Report.docx").unwrap(), b"old");
    }

    #[tokio::test]
    async fn test_partial_failure_continues_and_reports() {
        let provider = MemoryProvider::new();
        let dest = provider.add_folder("/", "Dest");
        let a = provider.add_file("/", "a.txt", b"a");
        let b = provider.add_file("/", "b.txt", b"b");
        let c = provider.add_file("/", "c.txt", b"c");
        provider.fail_on("b.txt");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let request = TransferRequest::new(vec![a, b, c], dest, TransferMode::Copy, ConflictResolution::Overwrite);
        let report = provider.transfer(&request, Some(tx)).await;

        assert_eq!(report.results.len(), 2);
        assert_eq!(report.failed, 1);
        assert!(report.last_error.is_some());

        let events = drain(&mut rx);
        assert_eq!(events.first(), Some(&TransferEvent::Begin { total: 3 }));
        match events.last() {
            Some(TransferEvent::End {
                progress,
                error,
                cancelled,
            }) => {
                assert_eq!(*progress, 1.0);
                assert!(error.is_some());
                assert!(!cancelled);
            }
            other => panic!("unexpected final event {:?}", other),
        }

        match report.into_result() {
            Err(ProviderError::PartialFailure { failed, total, .. }) => {
                assert_eq!((failed, total), (1, 3));
            }
            other => panic!("expected partial failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_batch_fatal_error_stops_batch() {
        let provider = MemoryProvider::new();
        let dest = provider.add_folder("/", "Dest");
        let a = provider.add_file("/", "a.txt", b"a");
        let b = provider.add_file("/", "b.txt", b"b");
        provider.fail_fatally_on("a.txt");

        let request = TransferRequest::new(vec![a, b], dest, TransferMode::Copy, ConflictResolution::Overwrite);
        let report = provider.transfer(&request, None).await;
        assert!(report.results.is_empty());
        assert!(matches!(report.into_result(), Err(ProviderError::OperationFailed(_))));
    }

    #[tokio::test]
    async fn test_cancel_between_items() {
        let provider = Arc::new(MemoryProvider::new());
        let dest = provider.add_folder("/", "Dest");
        let a = provider.add_file("/", "a.txt", b"a");
        let b = provider.add_file("/", "b.txt", b"b");
        let gate = provider.gate_on("a.txt");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let ctx = TransferContext::new(CancellationToken::new(), Some(tx));
        let request = TransferRequest::new(vec![a, b], dest.clone(), TransferMode::Copy, ConflictResolution::Overwrite);

        let runner = {
            let provider = provider.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move { run_transfer(provider.as_ref(), &request, &ctx).await })
        };

        // Item 1 is in flight; cancel before item 2 starts
        gate.entered.notified().await;
        ctx.cancel.cancel();
        gate.release.notify_one();

        let report = runner.await.unwrap();
        assert!(report.cancelled);
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].title(), "a.txt");
        assert!(provider.content_of(&dest.meta.id, "b.txt").is_none());
        assert!(matches!(report.into_result(), Err(ProviderError::Cancelled)));

        let events = drain(&mut rx);
        assert!(matches!(events.last(), Some(TransferEvent::End { cancelled: true, .. })));
    }

    #[tokio::test]
    async fn test_cancel_during_folder_item_finishes_folder() {
        let source = Arc::new(MemoryProvider::new());
        let target = Arc::new(MemoryProvider::new());
        let docs = source.add_folder("/", "Docs");
        for name in ["a.docx", "b.docx", "c.docx"] {
            source.add_file(&docs.meta.id, name, name.as_bytes());
        }
        let loose = source.add_file("/", "loose.txt", b"l");
        let dest = target.add_folder("/", "Backup");
        let gate = target.gate_on("a.docx");

        let ctx = TransferContext::new(CancellationToken::new(), None);
        let request = TransferRequest::new(
            vec![Entity::Folder(docs.clone()), loose],
            dest.clone(),
            TransferMode::Move,
            ConflictResolution::Overwrite,
        );
        let runner = {
            let (source, target, ctx) = (source.clone(), target.clone(), ctx.clone());
            tokio::spawn(async move { transfer_between(source.as_ref(), target.as_ref(), &request, &ctx).await })
        };

        // Cancel while the first child of Docs is being uploaded
        gate.entered.notified().await;
        ctx.cancel.cancel();
        gate.release.notify_one();

        let report = runner.await.unwrap();
        assert!(report.cancelled);
        assert_eq!(report.results.len(), 1);
        let copied = target.child_id(&dest.meta.id, "Docs").unwrap();
        for name in ["a.docx", "b.docx", "c.docx"] {
            assert_eq!(target.content_of(&copied, name).unwrap(), name.as_bytes());
        }
        assert!(source.child_id("/", "Docs").is_none());
        assert!(target.content_of(&dest.meta.id, "loose.txt").is_none());
        assert!(source.child_id("/", "loose.txt").is_some());
    }

    #[tokio::test]
    async fn test_cancel_does_not_poison_later_batches() {
        let provider = MemoryProvider::new();
        let dest = provider.add_folder("/", "Dest");
        let a = provider.add_file("/", "a.txt", b"a");
        provider.cancel();
        // Batches begun after cancel() run normally
        let request = TransferRequest::new(vec![a], dest, TransferMode::Copy, ConflictResolution::Skip);
        assert!(provider.transfer(&request, None).await.is_success());
    }

    #[tokio::test]
    async fn test_delete_batch() {
        let provider = MemoryProvider::new();
        let root = folder_entry("/", None);
        let a = provider.add_file("/", "a.txt", b"a");
        let b = provider.add_file("/", "b.txt", b"b");
        let report = provider.delete(&[a, b], &root, DeleteMode::Auto, None).await;
        assert_eq!(report.results.len(), 2);
        assert!(provider.content_of("/", "a.txt").is_none());
    }

    #[tokio::test]
    async fn test_transfer_between_providers_moves_folder_tree() {
        let source = MemoryProvider::new();
        let target = MemoryProvider::new();
        let docs = source.add_folder("/", "Docs");
        let nested = source.add_folder(&docs.meta.id, "Nested");
        source.add_file(&docs.meta.id, "a.docx", b"A");
        source.add_file(&nested.meta.id, "b.docx", b"B");
        let dest = target.add_folder("/", "Backup");

        let request = TransferRequest::new(
            vec![Entity::Folder(docs.clone())],
            dest.clone(),
            TransferMode::Move,
            ConflictResolution::Duplicate,
        );
        let report = transfer_between(&source, &target, &request, &TransferContext::default()).await;
        assert!(report.is_success(), "{:?}", report.last_error);

        let copied = report.results[0].id().to_string();
        assert_eq!(target.content_of(&copied, "a.docx").unwrap(), b"A");
        let copied_nested = target.child_id(&copied, "Nested").unwrap();
        assert_eq!(target.content_of(&copied_nested, "b.docx").unwrap(), b"B");
        assert!(source.child_id("/", "Docs").is_none());
    }

    #[tokio::test]
    async fn test_transfer_between_duplicate_renames() {
        let source = MemoryProvider::new();
        let target = MemoryProvider::new();
        let file = source.add_file("/", "Report.docx", b"new");
        target.add_file("/", "Report.docx", b"old");
        let dest = folder_entry("/", None);

        let request = TransferRequest::new(vec![file], dest, TransferMode::Copy, ConflictResolution::Duplicate);
        let report = transfer_between(&source, &target, &request, &TransferContext::default()).await;
        assert_eq!(report.results[0].title(), "Report 1.docx");
        assert_eq!(target.content_of("/", "Report.docx").unwrap(), b"old");
    }

    #[tokio::test]
    async fn test_spawn_transfer_reports_events() {
        let memory = MemoryProvider::new();
        let dest = memory.add_folder("/", "Dest");
        let a = memory.add_file("/", "a.txt", b"a");
        let shared: SharedProvider = Arc::new(tokio::sync::Mutex::new(Box::new(memory) as Box<dyn FileProvider>));

        let request = TransferRequest::new(vec![a], dest, TransferMode::Move, ConflictResolution::Skip);
        let mut handle = spawn_transfer(shared.clone(), request).await;
        let mut events = Vec::new();
        while let Some(event) = handle.events.recv().await {
            events.push(event);
        }
        let report = handle.wait().await.unwrap();
        assert!(report.is_success());
        assert_eq!(events.len(), 4);

        let root = folder_entry("/", None);
        let remaining = shared.lock().await.children(&root).await.unwrap();
        let titles: Vec<&str> = remaining.iter().map(Entity::title).collect();
        assert_eq!(titles, vec!["Dest"]);
    }

    #[test]
    fn test_into_result_single_failure_is_unwrapped() {
        let report = BatchReport {
            total: 1,
            failed: 1,
            last_error: Some(ProviderError::NotFound("x".into())),
            ..Default::default()
        };
        assert!(matches!(report.into_result(), Err(ProviderError::NotFound(_))));
    }

    #[test]
    fn test_conflicting_by_title() {
        let item = Entity::File(FileEntry::new(EntityMeta::new("1", "Report.docx"), 1));
        let other = Entity::File(FileEntry::new(EntityMeta::new("9", "Report.docx"), 2));
        assert_eq!(conflicting(&[item.clone()], &[other]).len(), 1);
        assert!(conflicting(&[item], &[]).is_empty());
    }
}
