//! `GET /events` — server-sent events over the broadcast hub.
//! `SubscriberStream` wraps the hub's shared `broadcast::Receiver` and
//! silently skips over `Lagged` gaps (the hub's own most-recent-wins
//! eviction), so a slow SSE client sees a dropped frame as nothing more
//! than a missed update, never a stream error.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use serde_json::json;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use sentinel_broadcast::Frame;

use crate::state::AppState;

struct SubscriberStream {
    inner: BroadcastStream<Frame>,
}

impl Stream for SubscriberStream {
    type Item = Frame;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Frame>> {
        let this = self.get_mut();
        loop {
            return match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(frame))) => Poll::Ready(Some(frame)),
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(_)))) => continue,
                Poll::Ready(None) => Poll::Ready(None),
                Poll::Pending => Poll::Pending,
            };
        }
    }
}

fn frame_to_event(frame: Frame) -> Event {
    let (name, payload) = match frame {
        Frame::Keepalive => ("ping", json!({})),
        Frame::StatusSnapshot { endpoints } => ("status", json!({ "endpoints": endpoints })),
        Frame::Transition(transition) => ("transition", json!(transition)),
    };
    Event::default()
        .event(name)
        .json_data(payload)
        .unwrap_or_else(|_| Event::default().event("error").data("{}"))
}

pub async fn events(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let hub = state.broadcast();
    let (_, rx) = hub.subscribe();
    let stream = SubscriberStream {
        inner: BroadcastStream::new(rx),
    };
    let events = stream.map(|frame| Ok(frame_to_event(frame)));
    Sse::new(events).keep_alive(KeepAlive::default())
}
