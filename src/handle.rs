use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{CallError, Result};
use crate::logger::CallEvent;
use crate::peer::engine::{EngineEvent, MediaEngine};
use crate::session::{CallSession, SessionId};
use crate::signaling::{SignalMessage, SignalingAdapter};

const COMMAND_CAPACITY: usize = 16;

enum Command {
    Place {
        opponent_id: String,
        avatar: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Accept {
        opponent_id: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Reject {
        opponent_id: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Terminate {
        opponent_id: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Hangup {
        reply: oneshot::Sender<()>,
    },
}

/// Управление сессией, работающей в своей задаче.
///
/// Команды, события движка и входящая сигнализация обрабатываются по одной,
/// в порядке поступления. Когда последний handle уничтожен, сессия кладёт
/// трубку сама.
#[derive(Clone)]
pub struct CallHandle {
    session_id: SessionId,
    tx: mpsc::Sender<Command>,
    events: broadcast::Sender<CallEvent>,
}

impl CallHandle {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.events.subscribe()
    }

    pub async fn place(&self, opponent_id: &str, avatar: &str) -> Result<()> {
        let opponent_id = opponent_id.to_owned();
        let avatar = avatar.to_owned();
        self.request(|reply| Command::Place {
            opponent_id,
            avatar,
            reply,
        })
        .await
    }

    pub async fn accept(&self, opponent_id: &str) -> Result<()> {
        let opponent_id = opponent_id.to_owned();
        self.request(|reply| Command::Accept { opponent_id, reply })
            .await
    }

    pub async fn reject(&self, opponent_id: &str) -> Result<()> {
        let opponent_id = opponent_id.to_owned();
        self.request(|reply| Command::Reject { opponent_id, reply })
            .await
    }

    pub async fn terminate(&self, opponent_id: &str) -> Result<()> {
        let opponent_id = opponent_id.to_owned();
        self.request(|reply| Command::Terminate { opponent_id, reply })
            .await
    }

    /// Повторный вызов и вызов после завершения задачи ничего не делают
    pub async fn hangup(&self) {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::Hangup { reply }).await.is_ok() {
            let _ = rx.await;
        }
    }

    async fn request(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<()>>) -> Command,
    ) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| CallError::Closed(self.session_id.clone()))?;
        rx.await
            .map_err(|_| CallError::Closed(self.session_id.clone()))?
    }
}

/// Запускает сессию в отдельной задаче
pub fn spawn_session<E, S>(
    session: CallSession<E, S>,
    engine_events: mpsc::Receiver<EngineEvent>,
    signals: mpsc::Receiver<SignalMessage>,
) -> (CallHandle, JoinHandle<()>)
where
    E: MediaEngine + ?Sized + 'static,
    S: SignalingAdapter + ?Sized + 'static,
{
    let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
    let handle = CallHandle {
        session_id: session.session_id().clone(),
        tx,
        events: session.event_sender(),
    };
    let task = tokio::spawn(run(session, rx, engine_events, signals));
    (handle, task)
}

async fn run<E, S>(
    mut session: CallSession<E, S>,
    mut commands: mpsc::Receiver<Command>,
    mut engine_events: mpsc::Receiver<EngineEvent>,
    mut signals: mpsc::Receiver<SignalMessage>,
) where
    E: MediaEngine + ?Sized,
    S: SignalingAdapter + ?Sized,
{
    loop {
        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(cmd) => execute(&mut session, cmd).await,
                None => {
                    session.hangup().await;
                }
            },
            Some(event) = engine_events.recv() => {
                // ошибки уже ушли в диагностический приёмник
                let _ = session.handle_engine_event(event).await;
            }
            Some(message) = signals.recv() => {
                let _ = session.handle_signal(message).await;
            }
        }

        if session.is_closed() {
            break;
        }
    }
}

async fn execute<E, S>(session: &mut CallSession<E, S>, cmd: Command)
where
    E: MediaEngine + ?Sized,
    S: SignalingAdapter + ?Sized,
{
    match cmd {
        Command::Place {
            opponent_id,
            avatar,
            reply,
        } => {
            let _ = reply.send(session.place(&opponent_id, &avatar).await);
        }
        Command::Accept { opponent_id, reply } => {
            let _ = reply.send(session.accept(&opponent_id).await);
        }
        Command::Reject { opponent_id, reply } => {
            let _ = reply.send(session.reject(&opponent_id).await);
        }
        Command::Terminate { opponent_id, reply } => {
            let _ = reply.send(session.terminate(&opponent_id).await);
        }
        Command::Hangup { reply } => {
            session.hangup().await;
            let _ = reply.send(());
        }
    }
}
