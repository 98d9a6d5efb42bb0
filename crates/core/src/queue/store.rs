//! In-memory ordered queue of work items.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

use super::types::{ItemId, ItemPatch, ItemStatus, ProgressSnapshot, QueueCounts, WorkItem};
use crate::scanner::{output_path_for, ScannedFile};

/// Reason stored when a failure carries no message.
const UNKNOWN_ERROR: &str = "unknown error";

#[derive(Debug)]
struct QueueInner {
    items: Vec<WorkItem>,
    next_id: ItemId,
}

/// Ordered collection of work items.
///
/// Every operation takes the internal lock for its whole read-modify-write,
/// so callers always observe a consistent queue. Reads hand out clones.
#[derive(Debug)]
pub struct QueueStore {
    inner: Mutex<QueueInner>,
}

impl Default for QueueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                items: Vec::new(),
                next_id: 1,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the queue with a freshly scanned batch.
    ///
    /// Ids continue from the previous batch. When `output_dir` is known every
    /// item gets `output_dir/<relative path>.mp4` as destination.
    pub fn enqueue_batch(&self, files: Vec<ScannedFile>, output_dir: Option<&Path>) -> Vec<WorkItem> {
        let mut inner = self.lock();
        let mut items = Vec::with_capacity(files.len());

        for file in files {
            let id = inner.next_id;
            inner.next_id += 1;
            items.push(WorkItem {
                id,
                name: file.name,
                output_path: output_dir.map(|dir| output_path_for(dir, &file.relative_path)),
                input_path: file.path,
                relative_path: file.relative_path,
                status: ItemStatus::Queued,
                progress: None,
                error: None,
                started_at: None,
            });
        }

        debug!(count = items.len(), "Queue replaced");
        inner.items = items.clone();
        items
    }

    /// Sets the status of one item and applies `patch`.
    ///
    /// Returns the updated item, or `None` when no item has this id.
    pub fn update_status(
        &self,
        id: ItemId,
        status: ItemStatus,
        patch: ItemPatch,
    ) -> Option<WorkItem> {
        let mut inner = self.lock();
        let item = inner.items.iter_mut().find(|item| item.id == id)?;

        item.status = status;
        if let Some(output_path) = patch.output_path {
            item.output_path = Some(output_path);
        }
        item.progress = match status {
            ItemStatus::Processing | ItemStatus::Completed => patch.progress,
            ItemStatus::Queued | ItemStatus::Failed => None,
        };
        item.error = match status {
            ItemStatus::Failed => Some(patch.error.unwrap_or_else(|| UNKNOWN_ERROR.to_string())),
            _ => None,
        };
        match status {
            ItemStatus::Queued => item.started_at = None,
            _ => {
                if let Some(started_at) = patch.started_at {
                    item.started_at = Some(started_at);
                }
            }
        }

        Some(item.clone())
    }

    /// Stores a progress snapshot on an item that is currently processing.
    pub fn update_progress(&self, id: ItemId, snapshot: ProgressSnapshot) -> bool {
        let mut inner = self.lock();
        match inner
            .items
            .iter_mut()
            .find(|item| item.id == id && item.status == ItemStatus::Processing)
        {
            Some(item) => {
                item.progress = Some(snapshot);
                true
            }
            None => false,
        }
    }

    /// Removes an item whatever its status.
    pub fn remove(&self, id: ItemId) -> bool {
        let mut inner = self.lock();
        let before = inner.items.len();
        inner.items.retain(|item| item.id != id);
        inner.items.len() != before
    }

    /// Earliest enqueued item still waiting.
    pub fn find_next_queued(&self) -> Option<WorkItem> {
        self.lock()
            .items
            .iter()
            .find(|item| item.status == ItemStatus::Queued)
            .cloned()
    }

    /// Recomputes the destination of every queued item, or clears it.
    pub fn assign_output_paths(&self, output_dir: Option<&Path>) -> usize {
        let mut inner = self.lock();
        let mut changed = 0;
        for item in inner
            .items
            .iter_mut()
            .filter(|item| item.status == ItemStatus::Queued)
        {
            item.output_path = output_dir.map(|dir| output_path_for(dir, &item.relative_path));
            changed += 1;
        }
        changed
    }

    /// Puts every processing item back in the queue with its progress cleared.
    pub fn reset_processing(&self) -> Vec<ItemId> {
        let mut inner = self.lock();
        let mut reset = Vec::new();
        for item in inner
            .items
            .iter_mut()
            .filter(|item| item.status == ItemStatus::Processing)
        {
            item.status = ItemStatus::Queued;
            item.progress = None;
            item.started_at = None;
            reset.push(item.id);
        }
        reset
    }

    pub fn get(&self, id: ItemId) -> Option<WorkItem> {
        self.lock().items.iter().find(|item| item.id == id).cloned()
    }

    /// Copy of the whole queue in order.
    pub fn snapshot(&self) -> Vec<WorkItem> {
        self.lock().items.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    pub fn counts(&self) -> QueueCounts {
        let inner = self.lock();
        let mut counts = QueueCounts::default();
        for item in &inner.items {
            match item.status {
                ItemStatus::Queued => counts.queued += 1,
                ItemStatus::Processing => counts.processing += 1,
                ItemStatus::Completed => counts.completed += 1,
                ItemStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }
}
