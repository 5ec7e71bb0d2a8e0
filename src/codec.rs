use base64::{engine::general_purpose, Engine as _};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use serde::{de::DeserializeOwned, Serialize};
use std::io::{Read, Write};

use crate::error::SignalingError;
use crate::peer::types::IceCandidate;

// Ограничиваем размер распаковываемых данных до 256 KiB
const MAX_DECOMPRESSED_SIZE: u64 = 256 * 1024;

/// Кандидат -> JSON -> base64
pub fn encode_candidate(candidate: &IceCandidate) -> Result<String, SignalingError> {
    let json = serde_json::to_vec(candidate).map_err(|e| SignalingError::Encode(e.to_string()))?;
    Ok(general_purpose::STANDARD.encode(json))
}

pub fn decode_candidate(s: &str) -> Result<IceCandidate, SignalingError> {
    let json = general_purpose::STANDARD
        .decode(s.trim())
        .map_err(|e| SignalingError::Decode(e.to_string()))?;
    serde_json::from_slice(&json).map_err(|e| SignalingError::Decode(e.to_string()))
}

/// Сообщение -> JSON -> gzip -> base64
pub fn encode_payload<T: Serialize>(p: &T) -> Result<String, SignalingError> {
    // 1. JSON -> bytes
    let json = serde_json::to_vec(p).map_err(|e| SignalingError::Encode(e.to_string()))?;

    // 2. GZIP compress
    let mut gz = GzEncoder::new(Vec::new(), Compression::fast());
    gz.write_all(&json)
        .map_err(|e| SignalingError::Encode(e.to_string()))?;
    let compressed = gz
        .finish()
        .map_err(|e| SignalingError::Encode(e.to_string()))?;

    // 3. base64
    Ok(general_purpose::STANDARD.encode(compressed))
}

pub fn decode_payload<T: DeserializeOwned>(s: &str) -> Result<T, SignalingError> {
    // 1. base64 -> bytes
    let compressed = general_purpose::STANDARD
        .decode(s.trim())
        .map_err(|e| SignalingError::Decode(e.to_string()))?;

    // 2. gunzip с ограничением размера для защиты от zip-bomb
    let gz = GzDecoder::new(&compressed[..]);
    let mut json = Vec::new();
    gz.take(MAX_DECOMPRESSED_SIZE + 1)
        .read_to_end(&mut json)
        .map_err(|e| SignalingError::Decode(e.to_string()))?;
    if json.len() as u64 > MAX_DECOMPRESSED_SIZE {
        return Err(SignalingError::Decode(format!(
            "payload exceeds {} bytes after decompression",
            MAX_DECOMPRESSED_SIZE
        )));
    }

    // 3. JSON -> struct
    serde_json::from_slice(&json).map_err(|e| SignalingError::Decode(e.to_string()))
}
