use std::sync::Arc;

use crate::error::{NegotiationError, NegotiationStep};
use crate::peer::engine::MediaEngine;
use crate::peer::types::SessionDescription;

/// Ведёт движок через обмен описаниями.
///
/// Каждый шаг возвращает типизированный результат; повторов нет, любая ошибка
/// завершает текущую попытку согласования.
pub struct Negotiator<E: ?Sized> {
    engine: Arc<E>,
}

impl<E: MediaEngine + ?Sized> Negotiator<E> {
    pub fn new(engine: Arc<E>) -> Self {
        Self { engine }
    }

    pub async fn create_offer(&self) -> Result<SessionDescription, NegotiationError> {
        self.engine
            .create_offer()
            .await
            .map_err(|e| NegotiationError::new(NegotiationStep::CreateOffer, e))
    }

    pub async fn create_answer(&self) -> Result<SessionDescription, NegotiationError> {
        self.engine
            .create_answer()
            .await
            .map_err(|e| NegotiationError::new(NegotiationStep::CreateAnswer, e))
    }

    pub async fn apply_local(&self, desc: &SessionDescription) -> Result<(), NegotiationError> {
        self.engine
            .set_local_description(desc)
            .await
            .map_err(|e| NegotiationError::new(NegotiationStep::SetLocal, e))
    }

    pub async fn apply_remote(&self, desc: &SessionDescription) -> Result<(), NegotiationError> {
        self.engine
            .set_remote_description(desc)
            .await
            .map_err(|e| NegotiationError::new(NegotiationStep::SetRemote, e))
    }
}
