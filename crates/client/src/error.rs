use vellum_protocol::{ProtocolError, Status};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Tungstenite(Box<tokio_tungstenite::tungstenite::Error>),
    /// The connection dropped while the request was still pending.
    #[error("connection closed before a response arrived")]
    ConnectionClosed,
    #[error("no response within {0:?}")]
    Timeout(std::time::Duration),
    /// An action was issued before the handshake reply arrived.
    #[error("session is not ready for actions yet")]
    NotReady,
    #[error("handshake rejected with status `{0}`")]
    Handshake(Status),
    #[error("engine answered `{status}` to {action}")]
    UnexpectedStatus { action: String, status: Status },
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Tungstenite(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
