use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use crate::error::EngineError;
use crate::utils::random_id;

/// Какие медиа захватывать и какие запрашивать у собеседника
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }
}

type ReleaseFn = Box<dyn FnOnce() + Send + Sync>;

/// Локальный поток. Принадлежит сессии от успешного захвата до `hangup`.
///
/// Освобождение (остановка захвата) выполняется ровно один раз: явным `stop`
/// или при drop.
pub struct LocalMediaStream {
    id: String,
    tracks: Vec<Arc<TrackLocalStaticSample>>,
    on_release: Option<ReleaseFn>,
}

impl LocalMediaStream {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tracks: Vec::new(),
            on_release: None,
        }
    }

    /// Поток с дорожками под заданные ограничения (opus / vp8)
    pub fn from_constraints(constraints: &MediaConstraints) -> Self {
        let stream_id = format!("ssc-{}", random_id());
        let mut stream = Self::new(stream_id.clone());
        if constraints.audio {
            stream = stream.with_track(Arc::new(TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_OPUS.to_owned(),
                    ..Default::default()
                },
                "audio".to_owned(),
                stream_id.clone(),
            )));
        }
        if constraints.video {
            stream = stream.with_track(Arc::new(TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_VP8.to_owned(),
                    ..Default::default()
                },
                "video".to_owned(),
                stream_id,
            )));
        }
        stream
    }

    pub fn with_track(mut self, track: Arc<TrackLocalStaticSample>) -> Self {
        self.tracks.push(track);
        self
    }

    /// Колбэк, освобождающий устройство захвата
    pub fn on_release(mut self, release: impl FnOnce() + Send + Sync + 'static) -> Self {
        self.on_release = Some(Box::new(release));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[Arc<TrackLocalStaticSample>] {
        &self.tracks
    }

    pub fn has_kind(&self, kind: RTPCodecType) -> bool {
        self.tracks.iter().any(|t| t.kind() == kind)
    }

    /// Пишет захваченный сэмпл в дорожку с данным id
    pub async fn write_sample(
        &self,
        track_id: &str,
        data: Bytes,
        duration: Duration,
    ) -> Result<(), EngineError> {
        let track = self
            .tracks
            .iter()
            .find(|t| t.id() == track_id)
            .ok_or_else(|| EngineError::new(format!("no local track {track_id}")))?;
        track
            .write_sample(&Sample {
                data,
                duration,
                ..Default::default()
            })
            .await?;
        Ok(())
    }

    /// Останавливает захват и отпускает дорожки
    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for LocalMediaStream {
    fn drop(&mut self) {
        self.tracks.clear();
        if let Some(release) = self.on_release.take() {
            release();
        }
    }
}

impl fmt::Debug for LocalMediaStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalMediaStream")
            .field("id", &self.id)
            .field("tracks", &self.tracks.len())
            .finish()
    }
}

/// Удалённый поток: получен от движка, сессии не принадлежит
#[derive(Clone, Default)]
pub struct RemoteMediaStream {
    pub id: String,
    pub tracks: Vec<Arc<TrackRemote>>,
}

impl RemoteMediaStream {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tracks: Vec::new(),
        }
    }
}

impl fmt::Debug for RemoteMediaStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteMediaStream")
            .field("id", &self.id)
            .field("tracks", &self.tracks.len())
            .finish()
    }
}

/// Куда выводится удалённый поток (воспроизведение, рендер)
pub trait RemoteMediaSink: Send + Sync {
    fn attach(&self, stream: &RemoteMediaStream, gain: f32);
}

/// Источник локальных медиа (камера, микрофон)
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn acquire(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<LocalMediaStream, Box<dyn std::error::Error + Send + Sync>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn release_runs_once_on_stop() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        let stream = LocalMediaStream::new("local").on_release(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        stream.stop();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn constraints_select_tracks() {
        let stream = LocalMediaStream::from_constraints(&MediaConstraints {
            audio: true,
            video: false,
        });
        assert_eq!(stream.tracks().len(), 1);
        assert!(stream.has_kind(RTPCodecType::Audio));
        assert!(!stream.has_kind(RTPCodecType::Video));
    }

    #[tokio::test]
    async fn samples_go_to_the_named_track() {
        let stream = LocalMediaStream::from_constraints(&MediaConstraints::default());
        let frame = Bytes::from_static(&[0xf8, 0xff, 0xfe]);

        // дорожка ещё не привязана к соединению, запись просто принимается
        stream
            .write_sample("audio", frame.clone(), Duration::from_millis(20))
            .await
            .unwrap();

        let err = stream
            .write_sample("screen", frame, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("screen"));
    }
}
