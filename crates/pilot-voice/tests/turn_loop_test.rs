//! End-to-end tests for the interview runtime with in-memory adapters.
//!
//! ## Scenarios
//! A. One full turn: question → answer → spoken → listening again.
//! B. E2003 from the backend ends the session with an InsufficientCredits alert.
//! C. no-speech restarts capture silently.
//! E. End while speaking cancels synthesis and ignores the late completion.
//! Plus: permission denied, transient retry, shutdown closing an active session,
//! and a late answer from an ended session never reaching the next one.

use pilot_core::{
    AnswerGateway, AnswerQuery, ApiError, ApiResult, GatewayError, GatewayErrorKind, Language,
    SessionBackend, DEFAULT_LANGUAGE,
};
use pilot_voice::{
    CaptureEvent, InterviewError, InterviewRequest, InterviewRuntime, Phase, RecognitionError,
    RuntimeDeps, SessionSnapshot, SpeechCapture, SpeechSynthesis, SynthesisEvent, Turn,
    UtteranceEvent, UtteranceId, UtteranceIds, VoiceResult,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Notify};

const WAIT: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

struct FakeCapture {
    granted: AtomicBool,
    starts: AtomicUsize,
    stops: AtomicUsize,
    events: Mutex<Option<mpsc::UnboundedSender<CaptureEvent>>>,
}

impl FakeCapture {
    fn new(granted: bool) -> Self {
        Self {
            granted: AtomicBool::new(granted),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            events: Mutex::new(None),
        }
    }

    fn emit(&self, event: CaptureEvent) {
        let guard = self.events.lock().unwrap();
        guard.as_ref().expect("runtime subscribed").send(event).unwrap();
    }

    fn say(&self, text: &str) {
        self.emit(CaptureEvent::Result(UtteranceEvent::final_result(text)));
    }
}

#[async_trait::async_trait]
impl SpeechCapture for FakeCapture {
    async fn request_permission(&self) -> bool {
        self.granted.load(Ordering::SeqCst)
    }

    async fn start(&self, _language_tag: &str) -> VoiceResult<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn subscribe(&self, events: mpsc::UnboundedSender<CaptureEvent>) {
        *self.events.lock().unwrap() = Some(events);
    }
}

#[derive(Default)]
struct FakeSynthesis {
    ids: UtteranceIds,
    spoken: Mutex<Vec<String>>,
    cancels: AtomicUsize,
    events: Mutex<Option<mpsc::UnboundedSender<SynthesisEvent>>>,
}

impl FakeSynthesis {
    fn finish(&self, id: UtteranceId) {
        let guard = self.events.lock().unwrap();
        guard
            .as_ref()
            .expect("runtime subscribed")
            .send(SynthesisEvent::Finished(id))
            .unwrap();
    }
}

#[async_trait::async_trait]
impl SpeechSynthesis for FakeSynthesis {
    async fn speak(&self, text: &str) -> VoiceResult<UtteranceId> {
        self.spoken.lock().unwrap().push(text.to_string());
        Ok(self.ids.next())
    }

    async fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }

    fn subscribe(&self, events: mpsc::UnboundedSender<SynthesisEvent>) {
        *self.events.lock().unwrap() = Some(events);
    }
}

#[derive(Default)]
struct FakeBackend {
    answers: Mutex<VecDeque<Result<String, GatewayError>>>,
    /// Answers released by hand, served before `answers`.
    held: Mutex<VecDeque<(Arc<Notify>, String)>>,
    questions: Mutex<Vec<AnswerQuery>>,
    opens: AtomicUsize,
    closes: AtomicUsize,
}

impl FakeBackend {
    fn with_answers(answers: Vec<Result<String, GatewayError>>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            ..Default::default()
        }
    }

    /// The next `get_answer` call returns `answer` once the gate is notified.
    fn hold(&self, answer: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.held
            .lock()
            .unwrap()
            .push_back((gate.clone(), answer.to_string()));
        gate
    }
}

#[async_trait::async_trait]
impl SessionBackend for FakeBackend {
    async fn open_session(&self, _user_id: &str, _position_title: &str, _resume_ref: &str) -> ApiResult<String> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok("iv-1".to_string())
    }

    async fn close_session(&self, _user_id: &str) -> ApiResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait::async_trait]
impl AnswerGateway for FakeBackend {
    async fn get_answer(&self, query: &AnswerQuery) -> Result<String, GatewayError> {
        self.questions.lock().unwrap().push(query.clone());
        let held = self.held.lock().unwrap().pop_front();
        if let Some((gate, answer)) = held {
            gate.notified().await;
            return Ok(answer);
        }
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(GatewayError::from(ApiError::Config("no canned answer".into()))))
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    capture: Arc<FakeCapture>,
    synthesis: Arc<FakeSynthesis>,
    backend: Arc<FakeBackend>,
    runtime: InterviewRuntime,
    snapshots: watch::Receiver<SessionSnapshot>,
}

fn harness(granted: bool, answers: Vec<Result<String, GatewayError>>) -> Harness {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let capture = Arc::new(FakeCapture::new(granted));
    let synthesis = Arc::new(FakeSynthesis::default());
    let backend = Arc::new(FakeBackend::with_answers(answers));
    let runtime = InterviewRuntime::spawn(
        RuntimeDeps {
            capture: capture.clone(),
            synthesis: synthesis.clone(),
            sessions: backend.clone(),
            answers: backend.clone(),
        },
        Language::resolve("en"),
    );
    let snapshots = runtime.subscribe();
    Harness {
        capture,
        synthesis,
        backend,
        runtime,
        snapshots,
    }
}

fn request() -> InterviewRequest {
    InterviewRequest::new(
        "user-1",
        "Backend Engineer",
        "resume.txt",
        "Jane Doe, 8 years of Rust",
        DEFAULT_LANGUAGE,
    )
}

async fn wait_for<F>(rx: &mut watch::Receiver<SessionSnapshot>, what: &str, f: F) -> SessionSnapshot
where
    F: FnMut(&SessionSnapshot) -> bool,
{
    let found = match tokio::time::timeout(WAIT, rx.wait_for(f)).await {
        Ok(Ok(snapshot)) => Some(snapshot.clone()),
        _ => None,
    };
    found.unwrap_or_else(|| panic!("timed out waiting for {}: {:?}", what, *rx.borrow()))
}

async fn eventually(what: &str, f: impl Fn() -> bool) {
    let poll = async {
        while !f() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    if tokio::time::timeout(WAIT, poll).await.is_err() {
        panic!("timed out waiting for {}", what);
    }
}

async fn listening(h: &mut Harness) {
    h.runtime.start(request()).unwrap();
    wait_for(&mut h.snapshots, "listening", |s| s.phase == Phase::Listening).await;
}

// ===========================================================================
// Scenario A: one full turn
// ===========================================================================

#[tokio::test]
async fn scenario_a_full_turn() {
    let mut h = harness(true, vec![Ok("I am...".to_string())]);
    listening(&mut h).await;
    assert!(h.runtime.snapshot().is_active);
    assert_eq!(h.runtime.snapshot().session_id.as_deref(), Some("iv-1"));

    h.capture.say("Tell me about yourself");
    wait_for(&mut h.snapshots, "speaking", |s| s.phase == Phase::Speaking).await;
    assert_eq!(*h.synthesis.spoken.lock().unwrap(), vec!["I am...".to_string()]);
    assert_eq!(h.capture.stops.load(Ordering::SeqCst), 1);

    let query = h.backend.questions.lock().unwrap()[0].clone();
    assert_eq!(query.session_id, "iv-1");
    assert_eq!(query.position_title, "Backend Engineer");

    h.synthesis.finish(UtteranceId(1));
    let snapshot = wait_for(&mut h.snapshots, "listening again", |s| {
        s.phase == Phase::Listening && !s.turns.is_empty()
    })
    .await;
    assert_eq!(
        snapshot.turns,
        vec![Turn {
            question: "Tell me about yourself".to_string(),
            answer: "I am...".to_string(),
        }]
    );
    assert_eq!(h.capture.starts.load(Ordering::SeqCst), 2);
}

// ===========================================================================
// Scenario B: insufficient credits
// ===========================================================================

#[tokio::test]
async fn scenario_b_insufficient_credits() {
    let mut h = harness(
        true,
        vec![Err(GatewayError::InsufficientCredits("Insufficient credits".to_string()))],
    );
    let mut alerts = h.runtime.take_alert_receiver().unwrap();
    assert!(h.runtime.take_alert_receiver().is_none());
    listening(&mut h).await;

    h.capture.say("Tell me about yourself");
    let snapshot = wait_for(&mut h.snapshots, "idle with error", |s| {
        s.phase == Phase::Idle && s.last_error.is_some()
    })
    .await;
    assert!(snapshot.turns.is_empty());
    assert!(!snapshot.is_active);
    match snapshot.last_error {
        Some(InterviewError::Gateway(ref e)) => assert_eq!(e.kind(), GatewayErrorKind::InsufficientCredits),
        ref other => panic!("unexpected error: {:?}", other),
    }

    let alert = tokio::time::timeout(WAIT, alerts.recv()).await.unwrap().unwrap();
    assert_eq!(alert.title, "Insufficient credits");
    eventually("endInterview", || h.backend.closes.load(Ordering::SeqCst) == 1).await;
    assert!(h.synthesis.spoken.lock().unwrap().is_empty());
}

// ===========================================================================
// Scenario C: no-speech
// ===========================================================================

#[tokio::test]
async fn scenario_c_no_speech_restarts_capture() {
    let mut h = harness(true, vec![]);
    let mut alerts = h.runtime.take_alert_receiver().unwrap();
    listening(&mut h).await;

    h.capture.emit(CaptureEvent::Error(RecognitionError::no_speech()));
    eventually("capture restart", || h.capture.starts.load(Ordering::SeqCst) == 2).await;

    let snapshot = h.runtime.snapshot();
    assert_eq!(snapshot.phase, Phase::Listening);
    assert!(snapshot.last_error.is_none());
    assert!(alerts.try_recv().is_err());
}

// ===========================================================================
// Scenario E: end while speaking
// ===========================================================================

#[tokio::test]
async fn scenario_e_end_while_speaking() {
    let mut h = harness(true, vec![Ok("I am...".to_string())]);
    listening(&mut h).await;
    h.capture.say("Tell me about yourself");
    wait_for(&mut h.snapshots, "speaking", |s| s.phase == Phase::Speaking).await;

    h.runtime.stop().unwrap();
    let snapshot = wait_for(&mut h.snapshots, "idle", |s| s.phase == Phase::Idle).await;
    assert!(snapshot.turns.is_empty());
    assert_eq!(h.synthesis.cancels.load(Ordering::SeqCst), 1);
    eventually("endInterview", || h.backend.closes.load(Ordering::SeqCst) == 1).await;

    let starts = h.capture.starts.load(Ordering::SeqCst);
    h.synthesis.finish(UtteranceId(1));
    // a later stop round-trips through the loop, so the late completion was seen first
    h.runtime.stop().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.runtime.snapshot().phase, Phase::Idle);
    assert_eq!(h.capture.starts.load(Ordering::SeqCst), starts);
    assert_eq!(h.backend.closes.load(Ordering::SeqCst), 1);
}

// ===========================================================================
// Error paths and shutdown
// ===========================================================================

#[tokio::test]
async fn permission_denied_never_opens_session() {
    let mut h = harness(false, vec![]);
    let mut alerts = h.runtime.take_alert_receiver().unwrap();
    h.runtime.start(request()).unwrap();

    let alert = tokio::time::timeout(WAIT, alerts.recv()).await.unwrap().unwrap();
    assert_eq!(alert.title, "Microphone unavailable");
    let snapshot = wait_for(&mut h.snapshots, "idle with error", |s| s.last_error.is_some()).await;
    assert_eq!(snapshot.phase, Phase::Idle);
    assert_eq!(h.backend.opens.load(Ordering::SeqCst), 0);
    assert_eq!(h.capture.starts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn transient_failure_resumes_listening_then_succeeds() {
    let mut h = harness(
        true,
        vec![
            Err(GatewayError::Transient("timeout".to_string())),
            Ok("Second try".to_string()),
        ],
    );
    listening(&mut h).await;

    h.capture.say("Why Rust?");
    eventually("capture restart", || h.capture.starts.load(Ordering::SeqCst) == 2).await;
    assert_eq!(h.runtime.snapshot().phase, Phase::Listening);
    assert!(h.runtime.snapshot().turns.is_empty());

    h.capture.say("Why Rust?");
    let snapshot = wait_for(&mut h.snapshots, "speaking", |s| s.phase == Phase::Speaking).await;
    assert_eq!(snapshot.turns.len(), 1);
    assert_eq!(snapshot.turns[0].answer, "Second try");
}

#[tokio::test]
async fn toggle_twice_ends_session() {
    let mut h = harness(true, vec![]);
    h.runtime.toggle(request()).unwrap();
    wait_for(&mut h.snapshots, "listening", |s| s.phase == Phase::Listening).await;
    h.runtime.toggle(request()).unwrap();
    wait_for(&mut h.snapshots, "idle", |s| s.phase == Phase::Idle).await;
    eventually("endInterview", || h.backend.closes.load(Ordering::SeqCst) == 1).await;
}

#[tokio::test]
async fn shutdown_closes_active_session() {
    let mut h = harness(true, vec![]);
    listening(&mut h).await;
    let backend = h.backend.clone();
    h.runtime.shutdown().await;
    assert_eq!(backend.closes.load(Ordering::SeqCst), 1);
}

// ===========================================================================
// Cancellation of an in-flight answer
// ===========================================================================

#[tokio::test]
async fn late_answer_from_ended_session_is_dropped() {
    let mut h = harness(true, vec![]);
    let old_gate = h.backend.hold("answer to old question");
    let new_gate = h.backend.hold("answer to new question");
    listening(&mut h).await;

    h.capture.say("old question");
    wait_for(&mut h.snapshots, "answering", |s| s.phase == Phase::Answering).await;
    eventually("old question sent", || h.backend.questions.lock().unwrap().len() == 1).await;

    h.runtime.stop().unwrap();
    wait_for(&mut h.snapshots, "idle", |s| s.phase == Phase::Idle).await;
    listening(&mut h).await;

    h.capture.say("new question");
    wait_for(&mut h.snapshots, "answering again", |s| s.phase == Phase::Answering).await;
    eventually("new question sent", || h.backend.questions.lock().unwrap().len() == 2).await;

    old_gate.notify_one();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let snapshot = h.runtime.snapshot();
    assert_eq!(snapshot.phase, Phase::Answering);
    assert!(snapshot.turns.is_empty());
    assert!(h.synthesis.spoken.lock().unwrap().is_empty());

    new_gate.notify_one();
    let snapshot = wait_for(&mut h.snapshots, "speaking", |s| s.phase == Phase::Speaking).await;
    assert_eq!(
        snapshot.turns,
        vec![Turn {
            question: "new question".to_string(),
            answer: "answer to new question".to_string(),
        }]
    );
    assert_eq!(
        *h.synthesis.spoken.lock().unwrap(),
        vec!["answer to new question".to_string()]
    );
}
