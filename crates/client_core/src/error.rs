use thiserror::Error;

use crate::channel::ChannelKind;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("server rejected request ({status}): {detail}")]
    Rejected { status: u16, detail: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("{0} is not available")]
    Unavailable(&'static str),
}

impl From<reqwest::Error> for CommandError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            CommandError::Malformed(err.to_string())
        } else {
            CommandError::Transport(err.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionCreateError {
    #[error("could not reach the game server: {0}")]
    Transport(String),
    #[error("server refused to create the session ({status}): {detail}")]
    Rejected { status: u16, detail: String },
    #[error("session response could not be read: {0}")]
    MalformedResponse(String),
    #[error("server returned no session")]
    EmptyResult,
}

impl From<CommandError> for SessionCreateError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::Transport(reason) => SessionCreateError::Transport(reason),
            CommandError::Rejected { status, detail } => {
                SessionCreateError::Rejected { status, detail }
            }
            CommandError::Malformed(reason) => SessionCreateError::MalformedResponse(reason),
            err @ CommandError::Unavailable(_) => SessionCreateError::Transport(err.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("server url must start with http:// or https://, got {0}")]
    UnsupportedScheme(String),
    #[error("invalid server url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("no active session to attach a {0} channel to")]
    NoSession(ChannelKind),
    #[error("failed to connect {kind} channel: {reason}")]
    Connect { kind: ChannelKind, reason: String },
    #[error("{0} channel is not open")]
    NotConnected(ChannelKind),
    #[error("{0} channel closed")]
    Closed(ChannelKind),
}
