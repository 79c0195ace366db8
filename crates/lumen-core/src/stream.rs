// ── Reactive state stream ──
//
// Subscription handle over the controller's published state.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::session::ControllerState;

/// A subscription to controller state.
///
/// Offers point-in-time access plus change notification via
/// [`changed()`](Self::changed) or by converting into a `Stream`.
pub struct StateStream {
    current: Arc<ControllerState>,
    receiver: watch::Receiver<Arc<ControllerState>>,
}

impl StateStream {
    pub(crate) fn new(receiver: watch::Receiver<Arc<ControllerState>>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// State captured at creation or at the last `changed()`.
    pub fn current(&self) -> &Arc<ControllerState> {
        &self.current
    }

    pub fn latest(&self) -> Arc<ControllerState> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change. `None` once the controller is gone.
    pub async fn changed(&mut self) -> Option<Arc<ControllerState>> {
        self.receiver.changed().await.ok()?;
        let state = self.receiver.borrow_and_update().clone();
        self.current = state.clone();
        Some(state)
    }

    pub fn into_stream(self) -> StateWatchStream {
        StateWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter yielding each published state.
pub struct StateWatchStream {
    inner: WatchStream<Arc<ControllerState>>,
}

impl Stream for StateWatchStream {
    type Item = Arc<ControllerState>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
