use std::fmt;
use thiserror::Error;

use crate::session::SessionId;

/// Ошибка движка медиа (webrtc или его заменитель в тестах)
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct EngineError(pub String);

impl EngineError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl From<webrtc::Error> for EngineError {
    fn from(e: webrtc::Error) -> Self {
        Self(e.to_string())
    }
}

/// Шаг согласования, на котором произошёл сбой
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationStep {
    CreateOffer,
    CreateAnswer,
    SetLocal,
    SetRemote,
}

impl fmt::Display for NegotiationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NegotiationStep::CreateOffer => "createOffer()",
            NegotiationStep::CreateAnswer => "createAnswer()",
            NegotiationStep::SetLocal => "LocalDescription",
            NegotiationStep::SetRemote => "RemoteDescription",
        };
        f.write_str(s)
    }
}

/// Сбой согласования описаний; попытка согласования на этом завершена
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{step} error: {source}")]
pub struct NegotiationError {
    pub step: NegotiationStep,
    #[source]
    pub source: EngineError,
}

impl NegotiationError {
    pub fn new(step: NegotiationStep, source: EngineError) -> Self {
        Self { step, source }
    }
}

/// Ошибки адаптера сигнализации
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignalingError {
    #[error("signaling transport closed")]
    Closed,

    #[error("failed to encode signaling message: {0}")]
    Encode(String),

    #[error("failed to decode signaling message: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum CallError {
    #[error("media acquisition failed: {0}")]
    MediaAcquisition(String),

    #[error("connection setup failed: {0}")]
    ConnectionSetup(#[source] EngineError),

    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    #[error("signaling delivery failed: {0}")]
    SignalingDelivery(#[from] SignalingError),

    #[error("no provisional remote offer to accept")]
    NoRemoteOffer,

    #[error("no opponent bound to the session")]
    NoOpponent,

    #[error("existing local description is not an offer")]
    NotAnOffer,

    #[error("session {0} has been hung up")]
    Closed(SessionId),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T, E = CallError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiation_error_names_the_step() {
        let err = NegotiationError::new(NegotiationStep::CreateOffer, EngineError::new("boom"));
        assert_eq!(err.to_string(), "createOffer() error: boom");

        let call: CallError = err.into();
        assert!(matches!(
            call,
            CallError::Negotiation(NegotiationError {
                step: NegotiationStep::CreateOffer,
                ..
            })
        ));
    }
}
