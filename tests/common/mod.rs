#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use ssc_videochat::error::{EngineError, SignalingError};
use ssc_videochat::peer::media::{LocalMediaStream, RemoteMediaSink, RemoteMediaStream};
use ssc_videochat::{
    CallError, DiagnosticSink, IceCandidate, MediaEngine, SessionDescription, SessionId,
    SignalingAdapter, StopReason,
};

/// Движок по сценарию: записывает вызовы, отвечает предсказуемыми SDP
#[derive(Default)]
pub struct FakeEngine {
    pub calls: Mutex<Vec<String>>,
    pub remote_candidates: Mutex<Vec<IceCandidate>>,
    pub closed: AtomicUsize,
    failing: HashSet<&'static str>,
    offers: AtomicUsize,
    answers: AtomicUsize,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Движок, у которого данный шаг всегда падает
    pub fn failing(step: &'static str) -> Arc<Self> {
        let mut engine = Self::default();
        engine.failing.insert(step);
        Arc::new(engine)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn record(&self, step: &'static str, detail: &str) -> Result<(), EngineError> {
        let entry = if detail.is_empty() {
            step.to_owned()
        } else {
            format!("{step}:{detail}")
        };
        self.calls.lock().unwrap().push(entry);
        if self.failing.contains(step) {
            return Err(EngineError::new(format!("{step} refused")));
        }
        Ok(())
    }
}

#[async_trait]
impl MediaEngine for FakeEngine {
    async fn create_offer(&self) -> Result<SessionDescription, EngineError> {
        self.record("create_offer", "")?;
        let n = self.offers.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SessionDescription::offer(format!("v=0 offer-{n}")))
    }

    async fn create_answer(&self) -> Result<SessionDescription, EngineError> {
        self.record("create_answer", "")?;
        let n = self.answers.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SessionDescription::answer(format!("v=0 answer-{n}")))
    }

    async fn set_local_description(&self, desc: &SessionDescription) -> Result<(), EngineError> {
        self.record("set_local", &desc.sdp)
    }

    async fn set_remote_description(
        &self,
        desc: &SessionDescription,
    ) -> Result<(), EngineError> {
        self.record("set_remote", &desc.sdp)
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), EngineError> {
        self.record("add_ice_candidate", "")?;
        self.remote_candidates.lock().unwrap().push(candidate);
        Ok(())
    }

    async fn add_local_stream(&self, stream: &LocalMediaStream) -> Result<(), EngineError> {
        self.record("add_local_stream", stream.id())
    }

    async fn close(&self) -> Result<(), EngineError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        self.record("close", "")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Call {
        opponent: String,
        sdp: String,
        session_id: SessionId,
        avatar: String,
    },
    Accept {
        opponent: String,
        sdp: String,
        session_id: SessionId,
    },
    Reject {
        opponent: String,
        session_id: SessionId,
    },
    Stop {
        opponent: String,
        reason: StopReason,
        session_id: SessionId,
    },
    Candidate {
        opponent: String,
        candidate: String,
        session_id: SessionId,
    },
}

/// Адаптер сигнализации, запоминающий всё отправленное
#[derive(Default)]
pub struct RecordingSignaling {
    sent: Mutex<Vec<Sent>>,
}

impl RecordingSignaling {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn candidates(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Candidate { candidate, .. } => Some(candidate),
                _ => None,
            })
            .collect()
    }

    fn push(&self, sent: Sent) -> Result<(), SignalingError> {
        self.sent.lock().unwrap().push(sent);
        Ok(())
    }
}

#[async_trait]
impl SignalingAdapter for RecordingSignaling {
    async fn send_call_request(
        &self,
        opponent_id: &str,
        sdp: &str,
        session_id: &SessionId,
        avatar: &str,
    ) -> Result<(), SignalingError> {
        self.push(Sent::Call {
            opponent: opponent_id.into(),
            sdp: sdp.into(),
            session_id: session_id.clone(),
            avatar: avatar.into(),
        })
    }

    async fn send_accept_request(
        &self,
        opponent_id: &str,
        sdp: &str,
        session_id: &SessionId,
    ) -> Result<(), SignalingError> {
        self.push(Sent::Accept {
            opponent: opponent_id.into(),
            sdp: sdp.into(),
            session_id: session_id.clone(),
        })
    }

    async fn send_reject(
        &self,
        opponent_id: &str,
        session_id: &SessionId,
    ) -> Result<(), SignalingError> {
        self.push(Sent::Reject {
            opponent: opponent_id.into(),
            session_id: session_id.clone(),
        })
    }

    async fn send_stop(
        &self,
        opponent_id: &str,
        reason: &StopReason,
        session_id: &SessionId,
    ) -> Result<(), SignalingError> {
        self.push(Sent::Stop {
            opponent: opponent_id.into(),
            reason: reason.clone(),
            session_id: session_id.clone(),
        })
    }

    async fn send_candidate(
        &self,
        opponent_id: &str,
        candidate: &str,
        session_id: &SessionId,
    ) -> Result<(), SignalingError> {
        self.push(Sent::Candidate {
            opponent: opponent_id.into(),
            candidate: candidate.into(),
            session_id: session_id.clone(),
        })
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub lines: Mutex<Vec<String>>,
    pub failures: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failures(&self) -> Vec<String> {
        self.failures.lock().unwrap().clone()
    }
}

impl DiagnosticSink for RecordingSink {
    fn trace(&self, _session_id: &SessionId, msg: &str) {
        self.lines.lock().unwrap().push(msg.to_owned());
    }

    fn failure(&self, _session_id: &SessionId, err: &CallError) {
        self.failures.lock().unwrap().push(err.to_string());
    }
}

#[derive(Default)]
pub struct RecordingRemoteSink {
    pub attached: Mutex<Vec<(String, usize, f32)>>,
}

impl RemoteMediaSink for RecordingRemoteSink {
    fn attach(&self, stream: &RemoteMediaStream, gain: f32) {
        self.attached
            .lock()
            .unwrap()
            .push((stream.id.clone(), stream.tracks.len(), gain));
    }
}

pub fn candidate(n: u16) -> IceCandidate {
    IceCandidate {
        candidate: format!("candidate:{n} 1 udp 2122260223 192.168.1.{n} 5000{n} typ host"),
        sdp_mid: Some("0".into()),
        sdp_mline_index: Some(0),
    }
}

pub fn encoded(n: u16) -> String {
    ssc_videochat::codec::encode_candidate(&candidate(n)).unwrap()
}
