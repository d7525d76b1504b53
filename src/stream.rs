//! Streaming preview: receive pages while the preview is still rendering.
//!
//! ## Why stream?
//!
//! A preview of a long offer takes a converter round-trip per fragment.
//! [`preview_stream`] runs [`Composer::preview`] on a background task and
//! yields every progress update and page as it happens, ending with the
//! summary (or the error) as the last item. Unlike the [`crate::EventBus`]
//! this is a private channel: nothing is dropped and nothing is shared with
//! other listeners.

use crate::compose::{Composer, PreviewSummary};
use crate::error::ComposeError;
use crate::progress::{PageReady, ProgressCallback, ProgressEvent};
use crate::template::CompositionRequest;
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::Stream;
use tracing::debug;

/// One item of a preview stream.
#[derive(Debug, Clone)]
pub enum PreviewUpdate {
    Progress(ProgressEvent),
    Page(PageReady),
    /// Always the last successful item.
    Finished(PreviewSummary),
}

/// A boxed stream of preview updates. An `Err` item is terminal.
pub type PreviewStream = Pin<Box<dyn Stream<Item = Result<PreviewUpdate, ComposeError>> + Send>>;

type Tx = mpsc::UnboundedSender<Result<PreviewUpdate, ComposeError>>;

struct ChannelSink {
    tx: Tx,
}

impl ChannelSink {
    fn send(&self, update: PreviewUpdate) {
        if self.tx.send(Ok(update)).is_err() {
            debug!("Preview stream dropped by receiver");
        }
    }
}

impl ProgressCallback for ChannelSink {
    fn on_progress(&self, message: &str, percent: u8) {
        self.send(PreviewUpdate::Progress(ProgressEvent::new(message, percent)));
    }

    fn on_page_ready(&self, page: &PageReady) {
        self.send(PreviewUpdate::Page(page.clone()));
    }
}

/// Start a preview and return its updates as a stream.
///
/// Must be called from within a Tokio runtime. Dropping the stream does not
/// cancel the conversion in flight; it only stops delivery.
pub fn preview_stream(composer: Composer, request: CompositionRequest) -> PreviewStream {
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let sink = ChannelSink { tx: tx.clone() };
        let outcome = composer.preview(&request, &sink).await;
        let _ = tx.send(outcome.map(PreviewUpdate::Finished));
    });

    Box::pin(UnboundedReceiverStream::new(rx))
}
