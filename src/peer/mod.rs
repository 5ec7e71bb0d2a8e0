pub mod connection;
pub mod engine;
pub mod ice;
pub mod media;
pub mod state;
pub mod types;

pub use connection::WebRtcEngine;
pub use engine::{EngineEvent, MediaEngine};
pub use ice::CandidateQueue;
pub use media::{LocalMediaStream, MediaConstraints, MediaSource, RemoteMediaSink, RemoteMediaStream};
pub use state::SessionState;
pub use types::{IceCandidate, SdpType, ServerConfig, SessionDescription};
