use std::{fmt, sync::Arc};

use futures::{SinkExt, StreamExt};
use serde::Serialize;
use shared::{
    domain::SessionId,
    protocol::{ControlFrame, PrimaryFrame, ServerFrame},
};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    error::ChannelError,
    store::{ChannelStatus, SessionStore},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Socket of a human-vs-engine session.
    Primary,
    /// Socket of an engine-vs-engine session; accepts playback commands.
    Control,
}

impl ChannelKind {
    fn path_segment(self) -> &'static str {
        match self {
            ChannelKind::Primary => "game",
            ChannelKind::Control => "ai-game",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKind::Primary => f.write_str("primary"),
            ChannelKind::Control => f.write_str("control"),
        }
    }
}

/// Socket URL for `kind` on session `id`, derived from the HTTP base URL.
pub fn channel_url(server_url: &str, kind: ChannelKind, id: &SessionId) -> Result<Url, ChannelError> {
    let mut url = Url::parse(server_url)?;
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => return Err(ChannelError::UnsupportedScheme(other.to_string())),
    };
    url.set_scheme(scheme)
        .map_err(|_| ChannelError::UnsupportedScheme(server_url.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| ChannelError::UnsupportedScheme(server_url.to_string()))?
        .pop_if_empty()
        .extend(["ws", kind.path_segment(), id.as_str()]);
    Ok(url)
}

pub(crate) struct PushChannel<F> {
    kind: ChannelKind,
    generation: u64,
    outbound: mpsc::UnboundedSender<F>,
    reader: JoinHandle<()>,
}

impl<F> PushChannel<F>
where
    F: Serialize + Send + 'static,
{
    pub(crate) async fn open(
        store: Arc<SessionStore>,
        kind: ChannelKind,
        server_url: &str,
        id: &SessionId,
    ) -> Result<Self, ChannelError> {
        let generation = store
            .update(|state, events| state.begin_channel(kind, events))
            .await;

        let url = match channel_url(server_url, kind, id) {
            Ok(url) => url,
            Err(err) => {
                warn!(channel = %kind, "cannot derive channel url: {err}");
                mark_failed(&store, kind, generation, err.to_string()).await;
                return Err(err);
            }
        };
        let ws_stream = match connect_async(url.as_str()).await {
            Ok((ws_stream, _)) => ws_stream,
            Err(err) => {
                let reason = err.to_string();
                warn!(channel = %kind, %url, "failed to connect: {reason}");
                mark_failed(&store, kind, generation, reason.clone()).await;
                return Err(ChannelError::Connect { kind, reason });
            }
        };
        store
            .update(|state, events| {
                state.set_channel_status(kind, generation, ChannelStatus::Connected, events)
            })
            .await;
        info!(channel = %kind, %url, generation, "channel connected");

        let (mut ws_writer, mut ws_reader) = ws_stream.split();
        let (outbound, mut queue) = mpsc::unbounded_channel::<F>();

        tokio::spawn(async move {
            while let Some(frame) = queue.recv().await {
                let text = match serde_json::to_string(&frame) {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(channel = %kind, "failed to encode outbound frame: {err}");
                        continue;
                    }
                };
                if let Err(err) = ws_writer.send(Message::Text(text)).await {
                    warn!(channel = %kind, "failed to send frame: {err}");
                    break;
                }
            }
            let _ = ws_writer.close().await;
        });

        let reader = tokio::spawn(async move {
            let mut failure = None;
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerFrame>(&text) {
                        Ok(frame) => {
                            store.apply_frame(kind, frame).await;
                        }
                        Err(err) => {
                            warn!(channel = %kind, "failed to decode server frame: {err}");
                        }
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        failure = Some(err.to_string());
                        break;
                    }
                }
            }
            let status = match failure {
                Some(reason) => ChannelStatus::Failed(reason),
                None => ChannelStatus::Disconnected,
            };
            debug!(channel = %kind, generation, ?status, "channel reader finished");
            store
                .update(|state, events| state.set_channel_status(kind, generation, status, events))
                .await;
        });

        Ok(Self {
            kind,
            generation,
            outbound,
            reader,
        })
    }

    pub(crate) fn send(&self, frame: F) -> Result<(), ChannelError> {
        if self.reader.is_finished() {
            return Err(ChannelError::Closed(self.kind));
        }
        self.outbound
            .send(frame)
            .map_err(|_| ChannelError::Closed(self.kind))
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }
}

async fn mark_failed(store: &SessionStore, kind: ChannelKind, generation: u64, reason: String) {
    store
        .update(|state, events| {
            state.set_channel_status(kind, generation, ChannelStatus::Failed(reason), events)
        })
        .await;
}

impl<F> Drop for PushChannel<F> {
    fn drop(&mut self) {
        // Dropping `outbound` lets the writer flush its queue and send Close.
        self.reader.abort();
    }
}

/// At most one open channel of each kind.
#[derive(Default)]
pub(crate) struct ChannelSlots {
    primary: Option<PushChannel<PrimaryFrame>>,
    control: Option<PushChannel<ControlFrame>>,
}

impl ChannelSlots {
    pub(crate) fn primary(&self) -> Option<&PushChannel<PrimaryFrame>> {
        self.primary.as_ref()
    }

    pub(crate) fn control(&self) -> Option<&PushChannel<ControlFrame>> {
        self.control.as_ref()
    }

    pub(crate) fn install_primary(&mut self, channel: PushChannel<PrimaryFrame>) {
        self.primary = Some(channel);
    }

    pub(crate) fn install_control(&mut self, channel: PushChannel<ControlFrame>) {
        self.control = Some(channel);
    }

    /// Closes the channel of `kind` if one is open. Returns whether one was.
    pub(crate) async fn close(&mut self, kind: ChannelKind, store: &SessionStore) -> bool {
        let closed = match kind {
            ChannelKind::Primary => self.primary.take().map(|channel| channel.generation()),
            ChannelKind::Control => self.control.take().map(|channel| channel.generation()),
        };
        if let Some(generation) = closed {
            debug!(channel = %kind, generation, "closing channel");
            store
                .update(|state, events| state.retire_channel(kind, events))
                .await;
        }
        closed.is_some()
    }

    pub(crate) async fn close_all(&mut self, store: &SessionStore) {
        self.close(ChannelKind::Primary, store).await;
        self.close(ChannelKind::Control, store).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> SessionId {
        SessionId("a1b2".to_string())
    }

    #[test]
    fn http_base_maps_to_ws_paths() {
        let url = channel_url("http://localhost:8000", ChannelKind::Primary, &id()).expect("url");
        assert_eq!(url.as_str(), "ws://localhost:8000/ws/game/a1b2");

        let url = channel_url("https://chess.example/", ChannelKind::Control, &id()).expect("url");
        assert_eq!(url.as_str(), "wss://chess.example/ws/ai-game/a1b2");
    }

    #[test]
    fn base_path_prefix_is_kept() {
        let url = channel_url("http://host/play", ChannelKind::Control, &id()).expect("url");
        assert_eq!(url.as_str(), "ws://host/play/ws/ai-game/a1b2");
    }

    #[test]
    fn other_schemes_are_rejected() {
        let err = channel_url("ftp://host", ChannelKind::Primary, &id()).expect_err("scheme");
        assert!(matches!(err, ChannelError::UnsupportedScheme(scheme) if scheme == "ftp"));
    }
}
