//! The background context: a router running on its own thread.
//!
//! Other contexts hold a cloneable [`RouterHandle`] and talk to it only by
//! message. Requests wait for their reply with an explicit timeout.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use super::{Bus, InstallReason, Outcome, Router};
use crate::protocol::{Broadcast, Origin, Request, Response};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Could not establish connection. Receiving end does not exist.")]
    Disconnected,
    #[error("The message port closed before a response was received.")]
    ReplyDropped,
    #[error("no response within {0:?}")]
    Timeout(Duration),
}

#[derive(Debug)]
pub enum Body {
    Request(Request),
    /// Undecoded wire message, as a page script would send it.
    Json(String),
    Installed(InstallReason),
    Command {
        command: String,
        active_tab: Option<u32>,
    },
    Shutdown,
}

#[derive(Debug)]
pub struct Envelope {
    pub body: Body,
    pub origin: Origin,
    pub reply: Option<Sender<Response>>,
}

#[derive(Debug, Clone)]
pub struct RouterHandle {
    tx: Sender<Envelope>,
    bus: Bus,
}

impl RouterHandle {
    /// Send a request and wait for its single reply.
    ///
    /// # Errors
    /// Fails if the router is gone, drops the request without replying,
    /// or does not answer within `timeout`.
    pub fn request(
        &self,
        request: Request,
        origin: Origin,
        timeout: Duration,
    ) -> Result<Response, TransportError> {
        self.round_trip(Body::Request(request), origin, timeout)
    }

    /// Send an undecoded wire message and wait for a reply.
    ///
    /// # Errors
    /// See [`RouterHandle::request`]. Unknown message types never get a
    /// reply and surface as [`TransportError::ReplyDropped`]. A malformed
    /// save, load, reset or current-cell request is answered with an error
    /// [`Response`].
    pub fn request_json(
        &self,
        raw: impl Into<String>,
        origin: Origin,
        timeout: Duration,
    ) -> Result<Response, TransportError> {
        self.round_trip(Body::Json(raw.into()), origin, timeout)
    }

    /// Fire-and-forget delivery.
    ///
    /// # Errors
    /// Fails only if the router is gone.
    pub fn post(&self, request: Request, origin: Origin) -> Result<(), TransportError> {
        self.send(Body::Request(request), origin, None)
    }

    /// Fire-and-forget delivery of an undecoded wire message.
    ///
    /// # Errors
    /// Fails only if the router is gone.
    pub fn post_json(&self, raw: impl Into<String>, origin: Origin) -> Result<(), TransportError> {
        self.send(Body::Json(raw.into()), origin, None)
    }

    /// Deliver the browser's install event.
    ///
    /// # Errors
    /// Fails only if the router is gone.
    pub fn installed(&self, reason: InstallReason) -> Result<(), TransportError> {
        self.send(Body::Installed(reason), Origin::panel(), None)
    }

    /// Deliver a browser keyboard command.
    ///
    /// # Errors
    /// Fails only if the router is gone.
    pub fn command(
        &self,
        command: impl Into<String>,
        active_tab: Option<u32>,
    ) -> Result<(), TransportError> {
        self.send(
            Body::Command {
                command: command.into(),
                active_tab,
            },
            Origin::panel(),
            None,
        )
    }

    /// Listen for router broadcasts.
    pub fn subscribe(&self) -> Receiver<Broadcast> {
        self.bus.subscribe()
    }

    fn send(
        &self,
        body: Body,
        origin: Origin,
        reply: Option<Sender<Response>>,
    ) -> Result<(), TransportError> {
        self.tx
            .send(Envelope {
                body,
                origin,
                reply,
            })
            .map_err(|_| TransportError::Disconnected)
    }

    fn round_trip(
        &self,
        body: Body,
        origin: Origin,
        timeout: Duration,
    ) -> Result<Response, TransportError> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.send(body, origin, Some(reply_tx))?;
        match reply_rx.recv_timeout(timeout) {
            Ok(response) => Ok(response),
            Err(RecvTimeoutError::Timeout) => Err(TransportError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::ReplyDropped),
        }
    }
}

/// A router running on a dedicated thread.
#[derive(Debug)]
pub struct BackgroundContext {
    handle: RouterHandle,
    join: Option<JoinHandle<Router>>,
}

impl BackgroundContext {
    pub fn handle(&self) -> RouterHandle {
        self.handle.clone()
    }

    /// Stop the thread after it drains queued messages and hand the router back.
    pub fn shutdown(mut self) -> Option<Router> {
        let _ = self.handle.send(Body::Shutdown, Origin::panel(), None);
        self.join.take().and_then(|join| join.join().ok())
    }
}

impl Drop for BackgroundContext {
    fn drop(&mut self) {
        if self.join.is_some() {
            let _ = self.handle.send(Body::Shutdown, Origin::panel(), None);
        }
    }
}

/// Move `router` onto its own thread.
///
/// # Errors
/// Returns an error if the OS refuses to spawn the thread.
pub fn spawn(router: Router) -> std::io::Result<BackgroundContext> {
    let (tx, rx) = mpsc::channel();
    let bus = router.bus().clone();
    let join = std::thread::Builder::new()
        .name("sheetpad-router".to_string())
        .spawn(move || serve(router, &rx))?;
    Ok(BackgroundContext {
        handle: RouterHandle { tx, bus },
        join: Some(join),
    })
}

fn serve(mut router: Router, rx: &Receiver<Envelope>) -> Router {
    while let Ok(Envelope {
        body,
        origin,
        reply,
    }) = rx.recv()
    {
        let outcome = match body {
            Body::Shutdown => break,
            Body::Request(request) => router.handle(request, &origin),
            Body::Json(raw) => router.handle_json(&raw, &origin),
            Body::Installed(reason) => router.on_installed(reason),
            Body::Command {
                command,
                active_tab,
            } => router.on_command(&command, active_tab),
        };
        match (outcome, reply) {
            (Outcome::Responded(response), Some(reply)) => {
                if reply.send(response).is_err() {
                    debug!("requester went away before the reply");
                }
            }
            (Outcome::Responded(_), None) => {
                warn!("reply produced for a request sent without a reply channel");
            }
            // Dropping `reply` here closes the channel without a response.
            _ => {}
        }
    }
    debug!("router thread stopping");
    router
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::protocol::{CellSelection, ContentRecord};
    use crate::store::MemoryStore;
    use std::sync::Arc;

    const WAIT: Duration = Duration::from_secs(2);

    fn start() -> BackgroundContext {
        let router = Router::new(MemoryStore::new(), Arc::new(ManualClock::new(1_000)));
        spawn(router).expect("spawn router")
    }

    #[test]
    fn test_request_round_trip_over_thread() {
        let ctx = start();
        let handle = ctx.handle();
        let saved = handle
            .request(
                Request::SaveContent {
                    content: "<p>x</p>".to_string(),
                },
                Origin::panel(),
                WAIT,
            )
            .expect("save");
        assert!(saved.success);

        let loaded = handle
            .request(Request::LoadContent, Origin::panel(), WAIT)
            .expect("load");
        let record: ContentRecord = serde_json::from_value(loaded.result.unwrap()).unwrap();
        assert_eq!(record.content, "<p>x</p>");
        assert_eq!(record.last_saved, Some(1_000));
    }

    #[test]
    fn test_unknown_json_gets_no_reply_and_router_survives() {
        let ctx = start();
        let handle = ctx.handle();
        let err = handle
            .request_json(r#"{"type":"NOPE"}"#, Origin::panel(), WAIT)
            .unwrap_err();
        assert_eq!(err, TransportError::ReplyDropped);

        let reply = handle
            .request(Request::GetCurrentCell, Origin::panel(), WAIT)
            .expect("router still alive");
        assert!(reply.success);
        assert_eq!(reply.result, Some(serde_json::Value::Null));
    }

    #[test]
    fn test_json_save_requests_always_get_a_reply() {
        let ctx = start();
        let handle = ctx.handle();
        let saved = handle
            .request_json(r#"{"type":"SAVE_CONTENT"}"#, Origin::panel(), WAIT)
            .expect("empty save answered");
        assert!(saved.success);

        let rejected = handle
            .request_json(
                r#"{"type":"SAVE_CONTENT","content":null}"#,
                Origin::panel(),
                WAIT,
            )
            .expect("malformed save answered");
        assert!(!rejected.success);
        assert!(rejected.error.is_some());
    }

    #[test]
    fn test_posted_selection_is_broadcast() {
        let ctx = start();
        let handle = ctx.handle();
        let updates = handle.subscribe();
        let selection = CellSelection {
            content: "hello".to_string(),
            coordinates: None,
            bounds: crate::protocol::Bounds::default(),
            timestamp: 0,
            source_url: "https://sheet".to_string(),
            tab_id: None,
        };
        handle
            .post(
                Request::CellSelected { data: selection },
                Origin::tab(4, "https://sheet"),
            )
            .expect("post");
        match updates.recv_timeout(WAIT).expect("broadcast") {
            Broadcast::CellSelectionUpdate { data } => {
                assert_eq!(data.content, "hello");
                assert_eq!(data.tab_id, Some(4));
            }
            other => panic!("unexpected broadcast {other:?}"),
        }
    }

    #[test]
    fn test_handle_after_shutdown_is_disconnected() {
        let ctx = start();
        let handle = ctx.handle();
        let router = ctx.shutdown().expect("router returned");
        assert!(router.current_selection().is_none());
        let err = handle
            .request(Request::LoadContent, Origin::panel(), WAIT)
            .unwrap_err();
        assert_eq!(err, TransportError::Disconnected);
    }

    #[test]
    fn test_request_times_out_when_nobody_serves() {
        let (tx, _rx) = mpsc::channel();
        let handle = RouterHandle {
            tx,
            bus: Bus::new(),
        };
        let err = handle
            .request(
                Request::LoadContent,
                Origin::panel(),
                Duration::from_millis(20),
            )
            .unwrap_err();
        assert_eq!(err, TransportError::Timeout(Duration::from_millis(20)));
    }
}
