use serde::{Deserialize, Serialize};
use std::fmt;

/// ========== SESSION STATE ==========

/// Состояние звонка.
///
/// `Inactive`: обмен описаниями не начат либо звонок завершён; локальные
/// кандидаты копятся в очереди.
/// `Establishing`: принято удалённое описание, кандидаты уходят сразу.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Inactive,
    Establishing,
}

impl SessionState {
    /// Можно ли отправлять кандидаты прямо сейчас
    pub fn sends_candidates(self) -> bool {
        matches!(self, SessionState::Establishing)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Inactive => f.write_str("inactive"),
            SessionState::Establishing => f.write_str("establishing"),
        }
    }
}
