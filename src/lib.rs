//! Звонок между двумя узлами: обмен offer/answer и trickle ICE через внешний
//! канал сигнализации.
//!
//! [`CallSession`] это машина состояний одного звонка, [`spawn_session`]
//! запускает её в отдельной задаче и отдаёт [`CallHandle`].

pub mod codec;
pub mod config;
pub mod error;
pub mod handle;
pub mod logger;
pub mod negotiator;
pub mod peer;
pub mod session;
pub mod signaling;
pub mod utils;

pub use config::CallConfig;
pub use error::{CallError, EngineError, NegotiationError, NegotiationStep, SignalingError};
pub use handle::{spawn_session, CallHandle};
pub use logger::{CallEvent, DiagnosticSink, TracingSink};
pub use negotiator::Negotiator;
pub use peer::{
    CandidateQueue, EngineEvent, IceCandidate, LocalMediaStream, MediaConstraints, MediaEngine,
    MediaSource, RemoteMediaSink, RemoteMediaStream, SdpType, SessionDescription, SessionState,
    WebRtcEngine,
};
pub use session::{CallSession, CallSessionBuilder, SessionId};
pub use signaling::{ChannelSignaling, Envelope, Inbound, SignalMessage, SignalingAdapter, StopReason};
