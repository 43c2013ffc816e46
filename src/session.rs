// src/session.rs
// Boundary to the external messaging client. The real transport (wire
// protocol, auth handshake, QR linking) lives in an external session
// library; this trait reduces it to a channel of events plus a few
// request/response calls, which is all the collector needs.

use crate::types::RawItem;
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Why the session closed. Collapses the client library's status codes into
/// the three cases the collector distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Session invalidated server-side; re-linking is required.
    LoggedOut,
    /// Normal mid-handshake artifact of some linking flows; the whole
    /// controller restarts silently.
    RestartRequired,
    /// Anything else, with the client's raw status code.
    Other(u16),
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Connection reached the open state.
    Connected,
    Disconnected(DisconnectReason),
    /// Out-of-band linking challenge (e.g. a scannable code). Passed through
    /// to the log unchanged, never reinterpreted here.
    LinkingChallenge(String),
    /// A live arrival.
    Item(RawItem),
    /// A progressively delivered backlog batch.
    Backlog {
        items: Vec<RawItem>,
        is_last: bool,
        progress: Option<u8>,
    },
}

#[async_trait]
pub trait SessionClient: Send {
    /// Open the session and subscribe to its event stream.
    async fn connect(&mut self) -> Result<mpsc::Receiver<SessionEvent>>;

    /// Ask the client to replay channel history since `since_ts` (unix secs).
    async fn request_backlog(&self, channel_id: &str, since_ts: i64) -> Result<()>;

    /// Download the binary payload behind an item's media handle.
    async fn fetch_media(&self, media_ref: &str) -> Result<Vec<u8>>;

    /// Tear the session down. Must be safe to call more than once.
    async fn close(&mut self);
}
