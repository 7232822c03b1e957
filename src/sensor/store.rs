//! # Reading Store
//!
//! Latest-reading cell of one acquisition loop. Replacement swaps a whole
//! `Arc<Reading>`, so a reader sees either the previous reading or the new
//! one, never a mix.

use std::sync::Arc;
use tokio::sync::watch;

use super::reading::Reading;

/// Latest reading of a channel.
#[derive(Debug)]
pub struct ReadingStore {
    tx: watch::Sender<Option<Arc<Reading>>>,
}

impl ReadingStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Latest published reading, if any.
    pub fn latest(&self) -> Option<Arc<Reading>> {
        self.tx.borrow().clone()
    }

    /// Receiver that is woken on every publish.
    pub fn watch(&self) -> watch::Receiver<Option<Arc<Reading>>> {
        self.tx.subscribe()
    }

    /// Replaces the stored reading. Only the owning loop calls this.
    pub(crate) fn publish(&self, reading: Arc<Reading>) {
        self.tx.send_replace(Some(reading));
    }
}

impl Default for ReadingStore {
    fn default() -> Self {
        Self::new()
    }
}
