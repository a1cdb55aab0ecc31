//! Server-sent bed change events.
//!
//! Each client gets its own notifier subscription feeding a channel of `EVENT_BUFFER` events.
//! The subscription is removed when the response stream is dropped, on the next publish after
//! the client has gone, or when a stalled client lets its buffer fill; the stream then ends and
//! the client reconnects and re-reads. Events carry `bed_id:revision` as their id so a client can
//! discard stale deliveries.

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use bedboard_core::{BedEvent, Delivery, SubscriptionHandle};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};

use crate::{convert, AppState};

/// Events buffered per client before it is treated as disconnected.
const EVENT_BUFFER: usize = 256;

struct SubscriptionGuard {
    state: AppState,
    handle: SubscriptionHandle,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.state.service().unsubscribe_bed_changes(self.handle);
        tracing::debug!("bed event stream {} closed", self.handle);
    }
}

fn deliver(tx: &mpsc::Sender<BedEvent>, event: &BedEvent) -> Delivery {
    match tx.try_send(event.clone()) {
        Ok(()) => Delivery::Delivered,
        Err(mpsc::error::TrySendError::Full(_)) => {
            tracing::warn!("bed event client fell {EVENT_BUFFER} events behind, disconnecting");
            Delivery::Disconnected
        }
        Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Disconnected,
    }
}

fn sse_event(event: &BedEvent) -> Result<Event, axum::Error> {
    Event::default()
        .event("bed")
        .id(format!("{}:{}", event.bed.bed_id, event.bed.revision))
        .json_data(convert::bed_event_res(event))
}

#[utoipa::path(
    get,
    path = "/beds/events",
    responses(
        (status = 200, description = "Stream of bed changes", content_type = "text/event-stream", body = api_shared::BedEventRes)
    )
)]
/// Stream every bed mutation from now on. Clients re-read `/beds` after connecting.
pub(crate) async fn bed_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let (tx, rx) = mpsc::channel::<BedEvent>(EVENT_BUFFER);
    let handle = state
        .service()
        .subscribe_bed_changes(move |event| deliver(&tx, event));
    tracing::debug!("bed event stream {} opened", handle);

    let guard = SubscriptionGuard { state, handle };
    let stream = ReceiverStream::new(rx).map(move |event| {
        let _guard = &guard;
        sse_event(&event)
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
