use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

use crate::codec;
use crate::error::SignalingError;
use crate::peer::types::IceCandidate;
use crate::session::SessionId;

/// Причина завершения звонка
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StopReason {
    Manual,
    Other(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Manual => f.write_str("manual"),
            StopReason::Other(reason) => f.write_str(reason),
        }
    }
}

/// Входящие сообщения сигнализации для конкретной сессии
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalMessage {
    /// Собеседник принял звонок, `sdp` это его answer
    Accept { sdp: String },
    /// Закодированный кандидат собеседника
    Candidate { payload: String },
    Reject,
    Stop { reason: StopReason },
}

/// Канал сигнализации, через который сессия общается с собеседником.
///
/// Реализуется снаружи; транспорт считается надёжным, упорядоченным и уже
/// подключённым. Кодирование кандидатов принадлежит адаптеру, по умолчанию
/// это base64 от JSON.
#[async_trait]
pub trait SignalingAdapter: Send + Sync {
    async fn send_call_request(
        &self,
        opponent_id: &str,
        sdp: &str,
        session_id: &SessionId,
        avatar: &str,
    ) -> Result<(), SignalingError>;

    async fn send_accept_request(
        &self,
        opponent_id: &str,
        sdp: &str,
        session_id: &SessionId,
    ) -> Result<(), SignalingError>;

    async fn send_reject(&self, opponent_id: &str, session_id: &SessionId)
        -> Result<(), SignalingError>;

    async fn send_stop(
        &self,
        opponent_id: &str,
        reason: &StopReason,
        session_id: &SessionId,
    ) -> Result<(), SignalingError>;

    async fn send_candidate(
        &self,
        opponent_id: &str,
        candidate: &str,
        session_id: &SessionId,
    ) -> Result<(), SignalingError>;

    fn encode_candidate(&self, candidate: &IceCandidate) -> Result<String, SignalingError> {
        codec::encode_candidate(candidate)
    }

    fn decode_candidate(&self, text: &str) -> Result<IceCandidate, SignalingError> {
        codec::decode_candidate(text)
    }
}

/// ========== CHANNEL ADAPTER ==========

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Signal {
    Call { sdp: String, avatar: String },
    Accept { sdp: String },
    Reject,
    Stop { reason: StopReason },
    Candidate { candidate: String },
}

/// Одно сообщение в канале: кто, кому, в рамках какой сессии
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub from: String,
    pub to: String,
    pub session_id: SessionId,
    pub signal: Signal,
}

/// Что получатель должен сделать с конвертом
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Новый входящий звонок: создать сессию с предварительным offer
    IncomingCall {
        caller_id: String,
        avatar: String,
        session_id: SessionId,
        sdp: String,
    },
    /// Сообщение для уже существующей сессии
    Session {
        session_id: SessionId,
        message: SignalMessage,
    },
}

impl Envelope {
    pub fn to_text(&self) -> Result<String, SignalingError> {
        codec::encode_payload(self)
    }

    pub fn from_text(text: &str) -> Result<Self, SignalingError> {
        codec::decode_payload(text)
    }

    pub fn into_inbound(self) -> Inbound {
        let session_id = self.session_id;
        let message = match self.signal {
            Signal::Call { sdp, avatar } => {
                return Inbound::IncomingCall {
                    caller_id: self.from,
                    avatar,
                    session_id,
                    sdp,
                }
            }
            Signal::Accept { sdp } => SignalMessage::Accept { sdp },
            Signal::Reject => SignalMessage::Reject,
            Signal::Stop { reason } => SignalMessage::Stop { reason },
            Signal::Candidate { candidate } => SignalMessage::Candidate { payload: candidate },
        };
        Inbound::Session {
            session_id,
            message,
        }
    }
}

/// Адаптер, пишущий текстовые конверты в канал tokio.
/// Доставку до собеседника выполняет тот, кто читает канал.
#[derive(Debug, Clone)]
pub struct ChannelSignaling {
    local_id: String,
    tx: mpsc::Sender<String>,
}

impl ChannelSignaling {
    pub fn new(local_id: impl Into<String>, tx: mpsc::Sender<String>) -> Self {
        Self {
            local_id: local_id.into(),
            tx,
        }
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    async fn post(
        &self,
        to: &str,
        session_id: &SessionId,
        signal: Signal,
    ) -> Result<(), SignalingError> {
        let envelope = Envelope {
            from: self.local_id.clone(),
            to: to.to_owned(),
            session_id: session_id.clone(),
            signal,
        };
        let text = envelope.to_text()?;
        self.tx.send(text).await.map_err(|_| SignalingError::Closed)
    }
}

#[async_trait]
impl SignalingAdapter for ChannelSignaling {
    async fn send_call_request(
        &self,
        opponent_id: &str,
        sdp: &str,
        session_id: &SessionId,
        avatar: &str,
    ) -> Result<(), SignalingError> {
        let signal = Signal::Call {
            sdp: sdp.to_owned(),
            avatar: avatar.to_owned(),
        };
        self.post(opponent_id, session_id, signal).await
    }

    async fn send_accept_request(
        &self,
        opponent_id: &str,
        sdp: &str,
        session_id: &SessionId,
    ) -> Result<(), SignalingError> {
        let signal = Signal::Accept {
            sdp: sdp.to_owned(),
        };
        self.post(opponent_id, session_id, signal).await
    }

    async fn send_reject(
        &self,
        opponent_id: &str,
        session_id: &SessionId,
    ) -> Result<(), SignalingError> {
        self.post(opponent_id, session_id, Signal::Reject).await
    }

    async fn send_stop(
        &self,
        opponent_id: &str,
        reason: &StopReason,
        session_id: &SessionId,
    ) -> Result<(), SignalingError> {
        let signal = Signal::Stop {
            reason: reason.clone(),
        };
        self.post(opponent_id, session_id, signal).await
    }

    async fn send_candidate(
        &self,
        opponent_id: &str,
        candidate: &str,
        session_id: &SessionId,
    ) -> Result<(), SignalingError> {
        let signal = Signal::Candidate {
            candidate: candidate.to_owned(),
        };
        self.post(opponent_id, session_id, signal).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn call_request_becomes_incoming_call() {
        let (tx, mut rx) = mpsc::channel(4);
        let signaling = ChannelSignaling::new("alice", tx);
        let sid = SessionId::from("1700000000000");

        signaling
            .send_call_request("bob", "v=0", &sid, "alice.png")
            .await
            .unwrap();

        let envelope = Envelope::from_text(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(envelope.to, "bob");
        assert_eq!(
            envelope.into_inbound(),
            Inbound::IncomingCall {
                caller_id: "alice".into(),
                avatar: "alice.png".into(),
                session_id: sid,
                sdp: "v=0".into(),
            }
        );
    }

    #[tokio::test]
    async fn stop_keeps_its_reason() {
        let (tx, mut rx) = mpsc::channel(4);
        let signaling = ChannelSignaling::new("alice", tx);
        let sid = SessionId::from("7");

        signaling
            .send_stop("bob", &StopReason::Manual, &sid)
            .await
            .unwrap();

        let inbound = Envelope::from_text(&rx.recv().await.unwrap())
            .unwrap()
            .into_inbound();
        assert_eq!(
            inbound,
            Inbound::Session {
                session_id: sid,
                message: SignalMessage::Stop {
                    reason: StopReason::Manual
                },
            }
        );
    }

    #[tokio::test]
    async fn closed_channel_is_reported() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let signaling = ChannelSignaling::new("alice", tx);
        let err = signaling
            .send_reject("bob", &SessionId::from("7"))
            .await
            .unwrap_err();
        assert_eq!(err, SignalingError::Closed);
    }
}
