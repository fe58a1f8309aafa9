//! Async runtime for the turn controller.
//!
//! One tokio task owns the [`TurnController`]. It waits on three sources (user
//! commands plus completions of its own background work, the capture
//! subscription and the synthesis subscription), feeds each event through the
//! reducer, carries out the resulting effects, and publishes a
//! [`SessionSnapshot`] on a `watch` channel. An event and every follow-up it
//! produces are fully processed before the next event is taken.

use crate::alert::Alert;
use crate::capture::{CaptureEvent, SpeechCapture};
use crate::controller::{ControllerEvent, Effect, SessionSnapshot, TurnController};
use crate::error::{RecognitionError, VoiceError, VoiceResult};
use crate::session::InterviewRequest;
use crate::synthesis::{SpeechSynthesis, SynthesisEvent};
use chrono::Utc;
use pilot_core::{AnswerGateway, Language, SessionBackend};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{AbortHandle, JoinHandle, JoinSet};
use tracing::{debug, info, warn};

/// How long shutdown waits for outstanding end-of-session notifications.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// The collaborators the loop drives. The runtime is their only caller.
#[derive(Clone)]
pub struct RuntimeDeps {
    pub capture: Arc<dyn SpeechCapture>,
    pub synthesis: Arc<dyn SpeechSynthesis>,
    pub sessions: Arc<dyn SessionBackend>,
    pub answers: Arc<dyn AnswerGateway>,
}

enum Command {
    Event(ControllerEvent),
    Shutdown(oneshot::Sender<()>),
}

/// Handle to a running interview loop.
pub struct InterviewRuntime {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<SessionSnapshot>,
    alerts: Mutex<Option<mpsc::UnboundedReceiver<Alert>>>,
    worker: JoinHandle<()>,
}

impl InterviewRuntime {
    /// Start the loop on the current tokio runtime. Alerts are worded in `ui_language`.
    pub fn spawn(deps: RuntimeDeps, ui_language: Language) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let (capture_tx, capture_rx) = mpsc::unbounded_channel();
        let (synthesis_tx, synthesis_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshots) = watch::channel(SessionSnapshot::default());
        let (alert_tx, alert_rx) = mpsc::unbounded_channel();

        // registered once; adapters emit regardless of controller state
        deps.capture.subscribe(capture_tx);
        deps.synthesis.subscribe(synthesis_tx);

        let worker = Worker {
            deps,
            controller: TurnController::new(),
            ui_language,
            completion_tx,
            snapshot_tx,
            alert_tx,
            background: JoinSet::new(),
            closing: JoinSet::new(),
            answering: None,
        };
        let worker = tokio::spawn(worker.run(command_rx, completion_rx, capture_rx, synthesis_rx));
        info!("interview runtime started");

        Self {
            commands,
            snapshots,
            alerts: Mutex::new(Some(alert_rx)),
            worker,
        }
    }

    fn send(&self, event: ControllerEvent) -> VoiceResult<()> {
        self.commands
            .send(Command::Event(event))
            .map_err(|_| VoiceError::ChannelSend("interview runtime has stopped".to_string()))
    }

    /// Start button. Ignored unless idle.
    pub fn start(&self, request: InterviewRequest) -> VoiceResult<()> {
        self.send(ControllerEvent::StartPressed(request))
    }

    /// End button. Ignored when idle.
    pub fn stop(&self) -> VoiceResult<()> {
        self.send(ControllerEvent::StopPressed)
    }

    /// The single Start/End control.
    pub fn toggle(&self, request: InterviewRequest) -> VoiceResult<()> {
        self.send(ControllerEvent::TogglePressed(request))
    }

    /// Observe every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// The alert stream. Only the first caller gets it.
    pub fn take_alert_receiver(&self) -> Option<mpsc::UnboundedReceiver<Alert>> {
        self.alerts.lock().ok().and_then(|mut slot| slot.take())
    }

    /// End an active session (notifying the backend) and stop the loop.
    pub async fn shutdown(self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
        if let Err(e) = self.worker.await {
            warn!("interview runtime task failed: {}", e);
        }
        info!("interview runtime stopped");
    }
}

struct Worker {
    deps: RuntimeDeps,
    controller: TurnController,
    ui_language: Language,
    completion_tx: mpsc::UnboundedSender<ControllerEvent>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    alert_tx: mpsc::UnboundedSender<Alert>,
    /// Permission, session-open and gateway calls.
    background: JoinSet<()>,
    /// End-of-session notifications; awaited briefly on shutdown.
    closing: JoinSet<()>,
    /// Gateway call of the current turn; dropped when the session ends.
    answering: Option<AbortHandle>,
}

impl Worker {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut completions: mpsc::UnboundedReceiver<ControllerEvent>,
        mut capture: mpsc::UnboundedReceiver<CaptureEvent>,
        mut synthesis: mpsc::UnboundedReceiver<SynthesisEvent>,
    ) {
        let mut shutdown_ack = None;
        loop {
            let event = tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Event(event)) => event,
                    Some(Command::Shutdown(ack)) => {
                        shutdown_ack = Some(ack);
                        break;
                    }
                    None => break,
                },
                Some(event) = completions.recv() => event,
                Some(event) = capture.recv() => match event {
                    CaptureEvent::Result(utterance) => ControllerEvent::Utterance(utterance),
                    CaptureEvent::Error(err) => ControllerEvent::RecognitionFailed(err),
                    CaptureEvent::Started | CaptureEvent::Ended => {
                        debug!(?event, "capture");
                        continue;
                    }
                },
                Some(event) = synthesis.recv() => match event {
                    SynthesisEvent::Finished(id) => ControllerEvent::SpeechFinished(id),
                    SynthesisEvent::Failed { id, message } => ControllerEvent::SpeechFailed { id, message },
                    SynthesisEvent::Started(_) | SynthesisEvent::Cancelled(_) => {
                        debug!(?event, "synthesis");
                        continue;
                    }
                },
            };
            self.dispatch(event).await;
            // reap finished background tasks
            while self.background.try_join_next().is_some() {}
            while self.closing.try_join_next().is_some() {}
        }

        if self.controller.phase().is_engaged() {
            self.dispatch(ControllerEvent::StopPressed).await;
        }
        self.background.abort_all();
        let closing = async { while self.closing.join_next().await.is_some() {} };
        if tokio::time::timeout(CLOSE_GRACE, closing).await.is_err() {
            warn!("end-of-session notification still pending at shutdown");
        }
        if let Some(ack) = shutdown_ack {
            let _ = ack.send(());
        }
    }

    async fn dispatch(&mut self, event: ControllerEvent) {
        let mut queue = VecDeque::from([event]);
        while let Some(event) = queue.pop_front() {
            let effects = self.controller.handle(event, Utc::now());
            for effect in effects {
                if let Some(follow_up) = self.execute(effect).await {
                    queue.push_back(follow_up);
                }
            }
        }
        self.snapshot_tx.send_replace(self.controller.snapshot());
    }

    /// Carry out one effect. Synchronous outcomes come back as a follow-up event;
    /// asynchronous ones re-enter through the completion channel.
    async fn execute(&mut self, effect: Effect) -> Option<ControllerEvent> {
        match effect {
            Effect::RequestPermission { attempt } => {
                let capture = Arc::clone(&self.deps.capture);
                let tx = self.completion_tx.clone();
                self.background.spawn(async move {
                    let granted = capture.request_permission().await;
                    let _ = tx.send(ControllerEvent::PermissionResolved { attempt, granted });
                });
                None
            }
            Effect::OpenSession { attempt, request } => {
                let sessions = Arc::clone(&self.deps.sessions);
                let tx = self.completion_tx.clone();
                self.background.spawn(async move {
                    let result = sessions
                        .open_session(&request.user_id, &request.position_title, &request.resume_ref)
                        .await
                        .map_err(|e| e.to_string());
                    let _ = tx.send(ControllerEvent::SessionOpened {
                        attempt,
                        user_id: request.user_id,
                        result,
                    });
                });
                None
            }
            Effect::StartCapture { language_tag } => {
                match self.deps.capture.start(&language_tag).await {
                    Ok(()) => None,
                    Err(e) => Some(ControllerEvent::RecognitionFailed(RecognitionError::from_sdk(
                        "audio-capture",
                        e.to_string(),
                    ))),
                }
            }
            Effect::StopCapture => {
                self.deps.capture.stop().await;
                None
            }
            Effect::RequestAnswer { turn, query } => {
                let answers = Arc::clone(&self.deps.answers);
                let tx = self.completion_tx.clone();
                let handle = self.background.spawn(async move {
                    let result = answers.get_answer(&query).await;
                    let _ = tx.send(ControllerEvent::AnswerReceived { turn, result });
                });
                self.answering = Some(handle);
                None
            }
            Effect::Speak { text } => match self.deps.synthesis.speak(&text).await {
                Ok(id) => Some(ControllerEvent::SpeechIssued(id)),
                Err(e) => Some(ControllerEvent::SpeechFailed {
                    id: None,
                    message: e.to_string(),
                }),
            },
            Effect::CancelSpeech => {
                self.deps.synthesis.cancel().await;
                None
            }
            Effect::CloseSession { user_id } => {
                if let Some(answering) = self.answering.take() {
                    answering.abort();
                }
                let sessions = Arc::clone(&self.deps.sessions);
                self.closing.spawn(async move {
                    match sessions.close_session(&user_id).await {
                        Ok(()) => info!(%user_id, "backend notified of session end"),
                        Err(e) => warn!(%user_id, "endInterview failed: {}", e),
                    }
                });
                None
            }
            Effect::Alert(err) => {
                let _ = self.alert_tx.send(Alert::from_error(&err, self.ui_language));
                None
            }
        }
    }
}
