use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::config::CallConfig;
use crate::error::{CallError, NegotiationError, Result};
use crate::logger::{default_sink, dump_candidate, CallEvent, DiagnosticSink, EventEmitter};
use crate::negotiator::Negotiator;
use crate::peer::engine::{EngineEvent, MediaEngine};
use crate::peer::ice::{candidate_kind, CandidateQueue};
use crate::peer::media::{LocalMediaStream, MediaSource, RemoteMediaSink, RemoteMediaStream};
use crate::peer::state::SessionState;
use crate::peer::types::{IceCandidate, SdpType, SessionDescription};
use crate::signaling::{SignalMessage, SignalingAdapter, StopReason};
use crate::utils::monotonic_timestamp_ms;

/// Идентификатор попытки звонка
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Локально сгенерированный id: метка времени в миллисекундах
    pub fn generate() -> Self {
        Self(monotonic_timestamp_ms().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Сборка сессии: исходящий звонок или входящий с предварительным offer
pub struct CallSessionBuilder<E: ?Sized, S: ?Sized> {
    engine: Arc<E>,
    signaling: Arc<S>,
    session_id: Option<SessionId>,
    opponent_id: Option<String>,
    provisional_offer: Option<String>,
    config: CallConfig,
    sink: Option<Arc<dyn DiagnosticSink>>,
    remote_sink: Option<Arc<dyn RemoteMediaSink>>,
    local_stream: Option<LocalMediaStream>,
}

impl<E, S> CallSessionBuilder<E, S>
where
    E: MediaEngine + ?Sized,
    S: SignalingAdapter + ?Sized,
{
    pub fn outgoing(engine: Arc<E>, signaling: Arc<S>) -> Self {
        Self {
            engine,
            signaling,
            session_id: None,
            opponent_id: None,
            provisional_offer: None,
            config: CallConfig::default(),
            sink: None,
            remote_sink: None,
            local_stream: None,
        }
    }

    /// Входящий звонок: id и offer пришли от вызывающей стороны
    pub fn incoming(
        engine: Arc<E>,
        signaling: Arc<S>,
        session_id: SessionId,
        offer_sdp: impl Into<String>,
    ) -> Self {
        let mut builder = Self::outgoing(engine, signaling);
        builder.session_id = Some(session_id);
        builder.provisional_offer = Some(offer_sdp.into());
        builder
    }

    pub fn session_id(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Собеседник, известный заранее (например, вызывающий во входящем звонке)
    pub fn opponent(mut self, opponent_id: impl Into<String>) -> Self {
        self.opponent_id = Some(opponent_id.into());
        self
    }

    pub fn config(mut self, config: CallConfig) -> Self {
        self.config = config;
        self
    }

    pub fn diagnostics(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn remote_sink(mut self, sink: Arc<dyn RemoteMediaSink>) -> Self {
        self.remote_sink = Some(sink);
        self
    }

    /// Уже захваченный локальный поток; добавляется в движок при `build`
    pub fn local_stream(mut self, stream: LocalMediaStream) -> Self {
        self.local_stream = Some(stream);
        self
    }

    pub async fn build(self) -> Result<CallSession<E, S>> {
        self.config.validate()?;
        let sink = self
            .sink
            .unwrap_or_else(|| default_sink(self.config.logging));
        let session_id = self.session_id.unwrap_or_else(SessionId::generate);
        sink.trace(&session_id, &format!("sessionID {}", session_id));

        let mut session = CallSession {
            session_id,
            state: SessionState::Inactive,
            opponent_id: self.opponent_id,
            opponent_avatar: None,
            local_description: None,
            remote_description: self.provisional_offer.map(SessionDescription::offer),
            candidate_queue: CandidateQueue::new(),
            negotiator: Negotiator::new(self.engine.clone()),
            engine: self.engine,
            signaling: Some(self.signaling),
            local_stream: None,
            remote_stream: None,
            remote_sink: self.remote_sink,
            config: self.config,
            sink,
            events: EventEmitter::new(),
            closed: false,
        };
        if let Some(stream) = self.local_stream {
            session.attach_local_stream(stream).await?;
        }
        Ok(session)
    }
}

/// Состояние одного звонка.
///
/// Кандидаты, найденные в `Inactive`, копятся в очереди и уходят одним сливом
/// сразу после первого применения удалённого описания; в `Establishing`
/// каждый новый кандидат отправляется немедленно.
pub struct CallSession<E: ?Sized, S: ?Sized> {
    session_id: SessionId,
    state: SessionState,
    opponent_id: Option<String>,
    opponent_avatar: Option<String>,
    local_description: Option<SessionDescription>,
    remote_description: Option<SessionDescription>,
    candidate_queue: CandidateQueue,
    negotiator: Negotiator<E>,
    engine: Arc<E>,
    signaling: Option<Arc<S>>,
    local_stream: Option<LocalMediaStream>,
    remote_stream: Option<RemoteMediaStream>,
    remote_sink: Option<Arc<dyn RemoteMediaSink>>,
    config: CallConfig,
    sink: Arc<dyn DiagnosticSink>,
    events: EventEmitter,
    closed: bool,
}

impl<E, S> CallSession<E, S>
where
    E: MediaEngine + ?Sized,
    S: SignalingAdapter + ?Sized,
{
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn opponent_id(&self) -> Option<&str> {
        self.opponent_id.as_deref()
    }

    pub fn local_description(&self) -> Option<&SessionDescription> {
        self.local_description.as_ref()
    }

    pub fn remote_description(&self) -> Option<&SessionDescription> {
        self.remote_description.as_ref()
    }

    pub fn queued_candidates(&self) -> &CandidateQueue {
        &self.candidate_queue
    }

    pub fn local_stream(&self) -> Option<&LocalMediaStream> {
        self.local_stream.as_ref()
    }

    pub fn remote_stream(&self) -> Option<&RemoteMediaStream> {
        self.remote_stream.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.events.subscribe()
    }

    pub fn event_sender(&self) -> broadcast::Sender<CallEvent> {
        self.events.sender()
    }

    // ========== PUBLIC CALL CONTROL ==========

    /// Позвонить собеседнику. Если локальный offer уже есть, он отправляется
    /// повторно тому же собеседнику, новый offer не создаётся.
    pub async fn place(&mut self, opponent_id: &str, opponent_avatar: &str) -> Result<()> {
        self.ensure_open()?;

        if let Some(local) = &self.local_description {
            if local.sdp_type != SdpType::Offer {
                return Err(self.report(CallError::NotAnOffer));
            }
            self.log("Resending call request with existing offer");
            return self.send_call_request().await;
        }

        self.opponent_id = Some(opponent_id.to_owned());
        self.opponent_avatar = Some(opponent_avatar.to_owned());

        self.log("createOffer()...");
        let offer = match self.negotiator.create_offer().await {
            Ok(offer) => offer,
            Err(e) => return Err(self.report_negotiation(e)),
        };
        self.on_local_description(offer).await
    }

    /// Принять входящий звонок: предварительный offer применяется как
    /// удалённое описание, после чего создаётся answer
    pub async fn accept(&mut self, opponent_id: &str) -> Result<()> {
        self.ensure_open()?;
        self.opponent_id = Some(opponent_id.to_owned());

        let offer = match &self.remote_description {
            Some(desc) => desc.sdp.clone(),
            None => return Err(self.report(CallError::NoRemoteOffer)),
        };
        self.set_remote_description(offer, SdpType::Offer).await
    }

    /// Отклонить звонок; состояние не меняется
    pub async fn reject(&mut self, opponent_id: &str) -> Result<()> {
        self.ensure_open()?;
        let signaling = self.signaling()?;
        if let Err(e) = signaling.send_reject(opponent_id, &self.session_id).await {
            return Err(self.report(e.into()));
        }
        self.log(&format!("Reject sent to {}", opponent_id));
        Ok(())
    }

    /// Отправить собеседнику stop. Ресурсы освобождает отдельный `hangup`.
    pub async fn terminate(&mut self, opponent_id: &str) -> Result<()> {
        self.ensure_open()?;
        let signaling = self.signaling()?;
        if let Err(e) = signaling
            .send_stop(opponent_id, &StopReason::Manual, &self.session_id)
            .await
        {
            return Err(self.report(e.into()));
        }
        self.log(&format!("Stop sent to {}", opponent_id));
        Ok(())
    }

    /// Очистка: отвязка от сигнализации, остановка локального потока,
    /// закрытие соединения. Повторный вызов ничего не делает.
    pub async fn hangup(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.state = SessionState::Inactive;
        self.signaling = None;

        if let Some(stream) = self.local_stream.take() {
            self.log(&format!("Stopping local stream {}", stream.id()));
            stream.stop();
        }
        if let Err(e) = self.engine.close().await {
            self.log(&format!("Failed to close peer connection: {}", e));
        }
        self.candidate_queue.drain();
        self.log("Hung up");
        self.events.emit(CallEvent::HungUp);
    }

    // ========== NEGOTIATION ==========

    /// Применить удалённое описание.
    ///
    /// Состояние переходит в `Establishing` до обращения к движку и не
    /// откатывается при ошибке. Очередь кандидатов сливается сразу после
    /// попытки применения, независимо от её исхода.
    pub async fn set_remote_description(&mut self, sdp: String, sdp_type: SdpType) -> Result<()> {
        self.ensure_open()?;
        self.log("RemoteDescription...");

        self.state = SessionState::Establishing;
        let desc = SessionDescription::new(sdp_type, sdp);
        let applied = self.negotiator.apply_remote(&desc).await;
        self.remote_description = Some(desc);

        self.flush_candidates().await;

        if let Err(e) = applied {
            return Err(self.report_negotiation(e));
        }
        self.log("RemoteDescription success");

        if sdp_type == SdpType::Offer {
            let answer = match self.negotiator.create_answer().await {
                Ok(answer) => answer,
                Err(e) => return Err(self.report_negotiation(e)),
            };
            return self.on_local_description(answer).await;
        }
        Ok(())
    }

    async fn on_local_description(&mut self, desc: SessionDescription) -> Result<()> {
        self.ensure_open()?;
        self.log("LocalDescription...");
        if let Err(e) = self.negotiator.apply_local(&desc).await {
            return Err(self.report_negotiation(e));
        }
        self.log("LocalDescription success");

        let sdp_type = desc.sdp_type;
        self.local_description = Some(desc);
        match sdp_type {
            SdpType::Offer => self.send_call_request().await,
            SdpType::Answer => self.send_accept_request().await,
        }
    }

    async fn send_call_request(&mut self) -> Result<()> {
        let signaling = self.signaling()?;
        let opponent = self.opponent()?;
        let avatar = self.opponent_avatar.clone().unwrap_or_default();
        let sdp = match &self.local_description {
            Some(desc) => desc.sdp.clone(),
            None => return Err(CallError::NotAnOffer),
        };

        if let Err(e) = signaling
            .send_call_request(&opponent, &sdp, &self.session_id, &avatar)
            .await
        {
            return Err(self.report(e.into()));
        }
        self.events.emit(CallEvent::CallRequestSent {
            opponent_id: opponent,
        });
        Ok(())
    }

    async fn send_accept_request(&mut self) -> Result<()> {
        let signaling = self.signaling()?;
        let opponent = self.opponent()?;
        let sdp = match &self.local_description {
            Some(desc) => desc.sdp.clone(),
            None => return Err(CallError::NotAnOffer),
        };

        if let Err(e) = signaling
            .send_accept_request(&opponent, &sdp, &self.session_id)
            .await
        {
            return Err(self.report(e.into()));
        }
        self.events.emit(CallEvent::AcceptSent {
            opponent_id: opponent,
        });
        Ok(())
    }

    // ========== CANDIDATES ==========

    /// Локальный кандидат от движка; `None` (конец сбора) игнорируется
    pub async fn on_local_candidate(&mut self, candidate: Option<IceCandidate>) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let Some(candidate) = candidate else {
            self.log("ICE candidate gathering completed");
            return Ok(());
        };
        dump_candidate(
            self.sink.as_ref(),
            &self.session_id,
            candidate_kind(&candidate),
            &candidate,
        );

        let signaling = self.signaling()?;
        let encoded = match signaling.encode_candidate(&candidate) {
            Ok(encoded) => encoded,
            Err(e) => return Err(self.report(e.into())),
        };

        if self.state.sends_candidates() {
            self.send_candidate(&encoded).await
        } else {
            self.candidate_queue.push(encoded);
            self.events.emit(CallEvent::CandidateQueued {
                queued: self.candidate_queue.len(),
            });
            Ok(())
        }
    }

    /// Кандидат собеседника. Проверки состояния нет: движок сам держит
    /// кандидаты, пришедшие до установки удалённого описания.
    pub async fn on_remote_candidate(&mut self, payload: &str) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let signaling = self.signaling()?;
        let candidate = match signaling.decode_candidate(payload) {
            Ok(candidate) => candidate,
            Err(e) => return Err(self.report(e.into())),
        };
        dump_candidate(self.sink.as_ref(), &self.session_id, "REMOTE", &candidate);

        if let Err(e) = self.engine.add_ice_candidate(candidate).await {
            return Err(self.report(CallError::ConnectionSetup(e)));
        }
        Ok(())
    }

    async fn flush_candidates(&mut self) {
        if self.candidate_queue.is_empty() {
            return;
        }
        // без собеседника слать некуда, очередь дождётся accept()
        if self.opponent_id.is_none() {
            self.log(&format!(
                "No opponent yet, keeping {} queued candidates",
                self.candidate_queue.len()
            ));
            return;
        }
        let queued = self.candidate_queue.drain();
        let count = queued.len();
        for encoded in queued {
            // ошибка уже залогирована, остальные кандидаты всё равно уходят
            let _ = self.send_candidate(&encoded).await;
        }
        self.log(&format!("Flushed {} queued candidates", count));
        self.events.emit(CallEvent::CandidatesFlushed { count });
    }

    async fn send_candidate(&mut self, encoded: &str) -> Result<()> {
        let signaling = self.signaling()?;
        let opponent = match self.opponent() {
            Ok(opponent) => opponent,
            Err(e) => return Err(self.report(e)),
        };
        if let Err(e) = signaling
            .send_candidate(&opponent, encoded, &self.session_id)
            .await
        {
            return Err(self.report(e.into()));
        }
        Ok(())
    }

    // ========== MEDIA ==========

    /// Захватить локальные медиа и передать их движку
    pub async fn acquire_local_media(&mut self, source: &dyn MediaSource) -> Result<()> {
        self.ensure_open()?;
        self.log("getUserMedia...");
        match source.acquire(&self.config.media).await {
            Ok(stream) => {
                self.log("getUserMedia success");
                self.attach_local_stream(stream).await
            }
            Err(e) => {
                let reason = e.to_string();
                self.events.emit(CallEvent::MediaAcquisitionFailed {
                    reason: reason.clone(),
                });
                Err(self.report(CallError::MediaAcquisition(reason)))
            }
        }
    }

    async fn attach_local_stream(&mut self, stream: LocalMediaStream) -> Result<()> {
        if let Err(e) = self.engine.add_local_stream(&stream).await {
            return Err(self.report(CallError::ConnectionSetup(e)));
        }
        self.log(&format!("Local stream {} added", stream.id()));
        // прежний поток, если был, освобождается здесь
        self.local_stream = Some(stream);
        Ok(())
    }

    /// Удалённый поток (или его очередная дорожка) от движка
    pub fn on_remote_stream(&mut self, stream: RemoteMediaStream) {
        if self.closed {
            return;
        }
        self.log("Remote stream added");

        let current = match self.remote_stream.take() {
            Some(mut existing) if existing.id == stream.id => {
                existing.tracks.extend(stream.tracks);
                existing
            }
            _ => stream,
        };
        if let Some(sink) = &self.remote_sink {
            sink.attach(&current, self.config.remote_output_gain);
        }
        self.events.emit(CallEvent::RemoteStreamAdded {
            stream_id: current.id.clone(),
        });
        self.remote_stream = Some(current);
    }

    // ========== DISPATCH ==========

    pub async fn handle_engine_event(&mut self, event: EngineEvent) -> Result<()> {
        match event {
            EngineEvent::LocalCandidate(candidate) => self.on_local_candidate(candidate).await,
            EngineEvent::RemoteStream(stream) => {
                self.on_remote_stream(stream);
                Ok(())
            }
        }
    }

    /// Входящее сообщение сигнализации для этой сессии
    pub async fn handle_signal(&mut self, message: SignalMessage) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        match message {
            SignalMessage::Accept { sdp } => {
                self.set_remote_description(sdp, SdpType::Answer).await
            }
            SignalMessage::Candidate { payload } => self.on_remote_candidate(&payload).await,
            SignalMessage::Reject => {
                self.log("Call rejected by opponent");
                self.events.emit(CallEvent::RemoteRejected);
                self.hangup().await;
                Ok(())
            }
            SignalMessage::Stop { reason } => {
                self.log(&format!("Call stopped by opponent: {}", reason));
                self.events.emit(CallEvent::RemoteStopped { reason });
                self.hangup().await;
                Ok(())
            }
        }
    }

    // ========== HELPERS ==========

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(CallError::Closed(self.session_id.clone()));
        }
        Ok(())
    }

    fn signaling(&self) -> Result<Arc<S>> {
        self.signaling
            .clone()
            .ok_or_else(|| CallError::Closed(self.session_id.clone()))
    }

    fn opponent(&self) -> Result<String> {
        self.opponent_id.clone().ok_or(CallError::NoOpponent)
    }

    fn log(&self, msg: &str) {
        self.sink.trace(&self.session_id, msg);
    }

    fn report(&self, err: CallError) -> CallError {
        self.sink.failure(&self.session_id, &err);
        err
    }

    fn report_negotiation(&self, err: NegotiationError) -> CallError {
        self.events.emit(CallEvent::NegotiationFailed {
            step: err.step,
            reason: err.source.to_string(),
        });
        self.report(err.into())
    }
}
