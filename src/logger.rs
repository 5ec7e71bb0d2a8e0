use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::config::LoggingConfig;
use crate::error::{CallError, NegotiationStep};
use crate::peer::types::IceCandidate;
use crate::session::SessionId;
use crate::signaling::StopReason;

/// Ёмкость канала событий звонка
pub const CALL_EVENT_CAPACITY: usize = 64;

/// Диагностический приёмник, внедряемый в сессию
pub trait DiagnosticSink: Send + Sync {
    fn trace(&self, session_id: &SessionId, msg: &str);

    /// Сбой, о котором должен узнать владелец сессии
    fn failure(&self, session_id: &SessionId, err: &CallError) {
        self.trace(session_id, &err.to_string());
    }
}

/// Логирование через tracing
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink {
    config: LoggingConfig,
}

impl TracingSink {
    pub fn new(config: LoggingConfig) -> Self {
        Self { config }
    }
}

impl DiagnosticSink for TracingSink {
    fn trace(&self, session_id: &SessionId, msg: &str) {
        if !self.config.enabled {
            return;
        }
        debug!(target: "ssc_videochat", session_id = %session_id, "{}", msg);
    }

    fn failure(&self, session_id: &SessionId, err: &CallError) {
        if !self.config.enabled {
            return;
        }
        warn!(target: "ssc_videochat", session_id = %session_id, error = %err, "call failure");
    }
}

pub fn default_sink(config: LoggingConfig) -> Arc<dyn DiagnosticSink> {
    Arc::new(TracingSink::new(config))
}

/// Печать ICE-candidate при появлении (Trickle-ICE)
pub fn dump_candidate(
    sink: &dyn DiagnosticSink,
    session_id: &SessionId,
    label: &str,
    cand: &IceCandidate,
) {
    sink.trace(
        session_id,
        &format!(
            "Trickle {label}: candidate={} sdp_mid={:?} sdp_mline_index={:?}",
            cand.candidate, cand.sdp_mid, cand.sdp_mline_index
        ),
    );
}

/// События звонка для владельца сессии (UI и т.п.)
#[derive(Debug, Clone, PartialEq)]
pub enum CallEvent {
    CallRequestSent { opponent_id: String },
    AcceptSent { opponent_id: String },
    CandidateQueued { queued: usize },
    CandidatesFlushed { count: usize },
    RemoteStreamAdded { stream_id: String },
    NegotiationFailed { step: NegotiationStep, reason: String },
    MediaAcquisitionFailed { reason: String },
    RemoteRejected,
    RemoteStopped { reason: StopReason },
    HungUp,
}

/// Рассылка событий; отсутствие подписчиков не ошибка
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<CallEvent>,
}

impl EventEmitter {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CALL_EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.tx.subscribe()
    }

    pub fn sender(&self) -> broadcast::Sender<CallEvent> {
        self.tx.clone()
    }

    pub fn emit(&self, evt: CallEvent) {
        let _ = self.tx.send(evt);
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}
