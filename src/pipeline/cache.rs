//! Process-lifetime conversion cache keyed by content fingerprint.
//!
//! Entries are never evicted. The cached corpus is the administrator's item
//! and template library, not user uploads, so it stays small.

use crate::pipeline::encode::PageImage;
use crate::pipeline::hash::Fingerprint;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Shared, immutable page sequence for one document.
pub type PageSet = Arc<[PageImage]>;

#[derive(Debug, Default)]
pub struct ConversionCache {
    entries: RwLock<HashMap<Fingerprint, PageSet>>,
}

impl ConversionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &Fingerprint) -> Option<PageSet> {
        self.entries.read().get(key).cloned()
    }

    /// Store a sequence. A second write for the same key replaces the first;
    /// both are derived from the same bytes.
    pub fn put(&self, key: Fingerprint, pages: PageSet) {
        self.entries.write().insert(key, pages);
    }

    /// Number of pages cached for `key`, if any.
    pub fn page_count(&self, key: &Fingerprint) -> Option<usize> {
        self.entries.read().get(key).map(|p| p.len())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
