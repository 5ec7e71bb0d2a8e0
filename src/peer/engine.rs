use async_trait::async_trait;

use crate::error::EngineError;
use crate::peer::media::{LocalMediaStream, RemoteMediaStream};
use crate::peer::types::{IceCandidate, SessionDescription};

/// Ёмкость канала уведомлений движка
pub const ENGINE_EVENT_CAPACITY: usize = 64;

/// Уведомления, которые движок отдаёт сессии
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Новый локальный кандидат; `None` означает конец сбора
    LocalCandidate(Option<IceCandidate>),
    /// Пришёл удалённый поток (или новая дорожка уже известного потока)
    RemoteStream(RemoteMediaStream),
}

/// Движок реального времени, выполняющий транспортное согласование.
///
/// Кандидаты собеседника могут прийти раньше, чем установлено удалённое
/// описание: `add_ice_candidate` обязан их принять и буферизовать сам.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription, EngineError>;

    async fn create_answer(&self) -> Result<SessionDescription, EngineError>;

    async fn set_local_description(&self, desc: &SessionDescription) -> Result<(), EngineError>;

    async fn set_remote_description(&self, desc: &SessionDescription)
        -> Result<(), EngineError>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), EngineError>;

    async fn add_local_stream(&self, stream: &LocalMediaStream) -> Result<(), EngineError>;

    async fn close(&self) -> Result<(), EngineError>;
}
