use crate::peer::types::ServerConfig;
use rand::Rng;
use std::sync::atomic::{AtomicI64, Ordering};

pub fn random_id() -> String {
    hex::encode(rand::rng().random::<[u8; 8]>())
}

// Функция для добавления схемы протокола к URL ICE сервера, если она отсутствует
pub fn add_ice_url_scheme(config: &ServerConfig) -> String {
    // Если url уже начинается с "turn:", "turns:" или "stun:", возвращаем как есть
    if ["turn:", "turns:", "stun:", "stuns:"]
        .iter()
        .any(|scheme| config.url.starts_with(scheme))
    {
        config.url.clone()
    } else {
        // В зависимости от типа сервера добавляем нужную схему
        let scheme = if config.r#type == "turn" {
            "turn:"
        } else {
            "stun:"
        };
        format!("{}{}", scheme, config.url)
    }
}

static LAST_TIMESTAMP_ID: AtomicI64 = AtomicI64::new(0);

/// Метка времени в миллисекундах, строго возрастающая в пределах процесса.
/// Два звонка, начатые в одну миллисекунду, получают разные значения.
pub fn monotonic_timestamp_ms() -> i64 {
    let now = chrono::Utc::now().timestamp_millis();
    let mut prev = LAST_TIMESTAMP_ID.load(Ordering::Relaxed);
    loop {
        let next = if now > prev { now } else { prev + 1 };
        match LAST_TIMESTAMP_ID.compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed)
        {
            Ok(_) => return next,
            Err(actual) => prev = actual,
        }
    }
}
