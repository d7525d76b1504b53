//! Progress reporting: callback trait, event payloads and the event bus.
//!
//! Two shapes of notification leave the library:
//!
//! * [`ProgressEvent`] — `{message, percent}` status updates.
//! * [`PageReady`] — one rendered preview page with its image as a data URI.
//!
//! Library code talks to a [`ProgressCallback`]; the host decides where the
//! events go. [`EventBus`] is the stock implementation, a Tokio broadcast
//! channel any number of observers can subscribe to. Publishing never fails:
//! with no subscribers the event is dropped.
//!
//! # Example
//!
//! ```rust
//! use offer_composer::{EventBus, PreviewEvent, ProgressCallback};
//!
//! let bus = EventBus::new(16);
//! let mut rx = bus.subscribe();
//! bus.on_progress("Converting", 20);
//! match rx.try_recv().unwrap() {
//!     PreviewEvent::Progress(p) => assert_eq!(p.percent, 20),
//!     other => panic!("unexpected {other:?}"),
//! }
//! ```

use crate::error::FragmentIssue;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

// ── Event payloads ───────────────────────────────────────────────────────────

/// Status update: `{message, percent}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub message: String,
    pub percent: u8,
}

impl ProgressEvent {
    pub fn new(message: impl Into<String>, percent: u8) -> Self {
        Self {
            message: message.into(),
            percent: percent.min(100),
        }
    }

    /// The empty event that clears a progress indicator.
    pub fn reset() -> Self {
        Self::new("", 0)
    }
}

/// Where a preview page came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageOrigin {
    Template,
    Product,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageStatus {
    Ready,
}

/// A rendered preview page, pushed as soon as it exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageReady {
    #[serde(rename = "type")]
    pub kind: PageOrigin,
    /// 1-based position in the whole composed preview.
    pub number: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    /// `data:image/jpeg;base64,…`
    pub image: String,
    /// 0-based page index inside the source document.
    pub page_index: usize,
    pub status: PageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
}

/// [`PageReady`] without the image bytes, as returned in preview summaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMetadata {
    #[serde(rename = "type")]
    pub kind: PageOrigin,
    pub number: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    pub page_index: usize,
    pub status: PageStatus,
    pub has_image: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
}

impl From<&PageReady> for PageMetadata {
    fn from(p: &PageReady) -> Self {
        Self {
            kind: p.kind,
            number: p.number,
            product_id: p.product_id.clone(),
            page_index: p.page_index,
            status: p.status,
            has_image: p.status == PageStatus::Ready && !p.image.is_empty(),
            source_file: p.source_file.clone(),
        }
    }
}

/// Everything that travels over the [`EventBus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PreviewEvent {
    Progress(ProgressEvent),
    PageReady(PageReady),
}

// ── Callback trait ───────────────────────────────────────────────────────────

/// Receives progress notifications from the pipeline and the composer.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Implementations must not block: they are called
/// inline on the conversion path.
pub trait ProgressCallback: Send + Sync {
    /// Status update with a percentage in 0..=100.
    fn on_progress(&self, message: &str, percent: u8) {
        let _ = (message, percent);
    }

    /// A preview page has been rendered.
    fn on_page_ready(&self, page: &PageReady) {
        let _ = page;
    }

    /// Something non-fatal went wrong; the work carried on.
    fn on_issue(&self, issue: &FragmentIssue) {
        let _ = issue;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgress;

impl ProgressCallback for NoopProgress {}

/// Collects [`FragmentIssue`]s and ignores everything else.
#[derive(Debug, Default)]
pub struct IssueLog {
    issues: Mutex<Vec<FragmentIssue>>,
}

impl IssueLog {
    pub fn take(&self) -> Vec<FragmentIssue> {
        std::mem::take(&mut *self.issues.lock())
    }
}

impl ProgressCallback for IssueLog {
    fn on_issue(&self, issue: &FragmentIssue) {
        self.issues.lock().push(issue.clone());
    }
}

/// Convenience alias for a shared callback.
pub type SharedProgress = Arc<dyn ProgressCallback>;

// ── Event bus ────────────────────────────────────────────────────────────────

/// Fire-and-forget broadcast of [`PreviewEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PreviewEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PreviewEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Send to every current subscriber. Dropped silently if there are none.
    pub fn publish(&self, event: PreviewEvent) {
        if self.tx.send(event).is_err() {
            trace!("No subscribers; event dropped");
        }
    }
}

impl ProgressCallback for EventBus {
    fn on_progress(&self, message: &str, percent: u8) {
        self.publish(PreviewEvent::Progress(ProgressEvent::new(message, percent)));
    }

    fn on_page_ready(&self, page: &PageReady) {
        self.publish(PreviewEvent::PageReady(page.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample_page() -> PageReady {
        PageReady {
            kind: PageOrigin::Product,
            number: 3,
            product_id: Some("crm".into()),
            image: "data:image/jpeg;base64,AAAA".into(),
            page_index: 0,
            status: PageStatus::Ready,
            source_file: None,
        }
    }

    struct Counting {
        progress: AtomicUsize,
        pages: AtomicUsize,
    }

    impl ProgressCallback for Counting {
        fn on_progress(&self, _message: &str, _percent: u8) {
            self.progress.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_ready(&self, _page: &PageReady) {
            self.pages.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgress;
        cb.on_progress("x", 50);
        cb.on_page_ready(&sample_page());
    }

    #[test]
    fn counting_callback_receives_events() {
        let cb = Counting {
            progress: AtomicUsize::new(0),
            pages: AtomicUsize::new(0),
        };
        cb.on_progress("a", 5);
        cb.on_progress("b", 10);
        cb.on_page_ready(&sample_page());
        assert_eq!(cb.progress.load(Ordering::SeqCst), 2);
        assert_eq!(cb.pages.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        let bus = EventBus::new(4);
        assert_eq!(bus.subscriber_count(), 0);
        bus.on_progress("nobody listens", 10);
    }

    #[test]
    fn every_subscriber_sees_the_event() {
        let bus = EventBus::new(4);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        bus.on_page_ready(&sample_page());
        assert!(matches!(a.try_recv(), Ok(PreviewEvent::PageReady(_))));
        assert!(matches!(b.try_recv(), Ok(PreviewEvent::PageReady(_))));
    }

    #[test]
    fn page_ready_wire_shape() {
        let json = serde_json::to_value(sample_page()).unwrap();
        assert_eq!(json["type"], "product");
        assert_eq!(json["status"], "ready");
        assert_eq!(json["product_id"], "crm");
        assert!(json.get("source_file").is_none());
    }

    #[test]
    fn metadata_drops_image() {
        let meta = PageMetadata::from(&sample_page());
        assert!(meta.has_image);
        let json = serde_json::to_value(&meta).unwrap();
        assert!(json.get("image").is_none());
    }

    #[test]
    fn percent_is_capped() {
        assert_eq!(ProgressEvent::new("over", 250).percent, 100);
    }
}
