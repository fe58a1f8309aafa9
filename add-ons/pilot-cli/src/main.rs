//! Interview Pilot CLI: the Start/End toggle and the live transcript in a terminal.
//!
//! Usage:
//!   pilot --position "Backend Engineer" --resume resume.txt [--language zh] [--voice] [--register]
//!
//! Commands on stdin: `/start`, `/end`, `/toggle`, `/quit`. Without `--voice` any
//! other line is what the interviewer "said" (a blank line counts as silence).

use pilot_core::{env_opt_string, load_resume_digest, ApiClient, AuthTokens, Language, PilotConfig};
use pilot_voice::{
    ConsoleCapture, ConsoleSynthesis, InterviewRequest, InterviewRuntime, Phase, RuntimeDeps,
    SpeechCapture, SpeechSynthesis,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type CliResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Debug, Default, PartialEq)]
struct CliArgs {
    position: Option<String>,
    resume: Option<PathBuf>,
    language: Option<String>,
    voice: bool,
    register: bool,
}

impl CliArgs {
    fn parse(args: impl IntoIterator<Item = String>) -> Self {
        let mut parsed = CliArgs::default();
        let mut args = args.into_iter();
        while let Some(a) = args.next() {
            match a.as_str() {
                "--position" => parsed.position = args.next(),
                "--resume" => parsed.resume = args.next().map(PathBuf::from),
                "--language" => parsed.language = args.next(),
                "--voice" => parsed.voice = true,
                "--register" => parsed.register = true,
                other => eprintln!("[pilot] ignoring unknown argument {}", other),
            }
        }
        parsed
    }
}

fn usage() {
    eprintln!("Interview Pilot");
    eprintln!("  --position \"Title\"   Position you are interviewing for (required)");
    eprintln!("  --resume FILE         Résumé as .txt, .docx or .pdf (required)");
    eprintln!("  --language CODE       en, zh, es, ja, ko, fr, de, pt, ru, ar, hi (default from config)");
    eprintln!("  --voice               Use microphone + speaker (build with --features audio)");
    eprintln!("  --register            Create the PILOT_USERNAME account before signing in");
    eprintln!();
    eprintln!("Auth: PILOT_ACCESS_TOKEN + PILOT_REFRESH_TOKEN + PILOT_USER_ID,");
    eprintln!("      or PILOT_USERNAME + PILOT_PASSWORD.");
    eprintln!("Backend: PILOT__API_URL or config/pilot.toml (PILOT_CONFIG).");
}

/// Resolve the user id, installing tokens on `api`.
async fn authenticate(api: &ApiClient, register: bool) -> CliResult<String> {
    if let Some(access_token) = env_opt_string("PILOT_ACCESS_TOKEN") {
        api.set_tokens(AuthTokens {
            access_token: Some(access_token),
            refresh_token: env_opt_string("PILOT_REFRESH_TOKEN"),
        })
        .await;
        return env_opt_string("PILOT_USER_ID")
            .ok_or_else(|| "PILOT_ACCESS_TOKEN is set but PILOT_USER_ID is not".into());
    }
    match (env_opt_string("PILOT_USERNAME"), env_opt_string("PILOT_PASSWORD")) {
        (Some(username), Some(password)) => {
            let session = if register {
                api.register(&username, &password).await?
            } else {
                api.login(&username, &password).await?
            };
            session
                .user_id
                .or_else(|| env_opt_string("PILOT_USER_ID"))
                .ok_or_else(|| "login response carried no userId; set PILOT_USER_ID".into())
        }
        _ => Err("no credentials: set PILOT_ACCESS_TOKEN or PILOT_USERNAME/PILOT_PASSWORD".into()),
    }
}

struct Adapters {
    capture: Arc<dyn SpeechCapture>,
    synthesis: Arc<dyn SpeechSynthesis>,
    /// Present in console mode; typed lines are fed to it.
    console: Option<Arc<ConsoleCapture>>,
}

fn console_adapters(config: &PilotConfig) -> Adapters {
    let console = Arc::new(ConsoleCapture::new());
    Adapters {
        capture: console.clone(),
        synthesis: Arc::new(ConsoleSynthesis::new(config.speech_words_per_minute)),
        console: Some(console),
    }
}

#[cfg(feature = "audio")]
fn voice_adapters(config: &PilotConfig, language: Language) -> CliResult<Adapters> {
    use pilot_voice::{
        create_best_stt, EarConfig, MicrophoneCapture, OpenAiTts, PlaceholderTts, SpeakerSynthesis,
        SttBackend, TtsBackend,
    };

    let stt: Arc<dyn SttBackend> = Arc::from(create_best_stt());
    let tts: Arc<dyn TtsBackend> = match OpenAiTts::from_env(language) {
        Ok(tts) => Arc::new(tts),
        Err(e) => {
            warn!("TTS unavailable ({}), answers will not be played", e);
            Arc::new(PlaceholderTts)
        }
    };
    Ok(Adapters {
        capture: Arc::new(MicrophoneCapture::new(EarConfig::from_pilot(config), stt)?),
        synthesis: Arc::new(SpeakerSynthesis::new(tts)?),
        console: None,
    })
}

#[cfg(not(feature = "audio"))]
fn voice_adapters(_config: &PilotConfig, _language: Language) -> CliResult<Adapters> {
    Err("--voice needs a build with `--features audio`".into())
}

fn resume_ref(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[tokio::main]
async fn main() -> CliResult<()> {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[pilot] .env not loaded: {} (using system environment)", e);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = CliArgs::parse(std::env::args().skip(1));
    let (position, resume) = match (args.position.clone(), args.resume.clone()) {
        (Some(position), Some(resume)) => (position, resume),
        _ => {
            usage();
            return Ok(());
        }
    };

    let config = PilotConfig::load()?;
    let language = Language::resolve(args.language.as_deref().unwrap_or(&config.language));
    let resume_digest = load_resume_digest(&resume, config.resume_max_chars)?;

    let api = Arc::new(ApiClient::from_config(&config)?);
    let user_id = authenticate(&api, args.register).await?;
    info!(api_url = %config.api_url, %user_id, language = language.code, "Pilot ready");

    let adapters = if args.voice {
        voice_adapters(&config, language)?
    } else {
        console_adapters(&config)
    };
    let console = adapters.console.clone();

    let runtime = InterviewRuntime::spawn(
        RuntimeDeps {
            capture: adapters.capture,
            synthesis: adapters.synthesis,
            sessions: api.clone(),
            answers: api,
        },
        language,
    );
    let request = InterviewRequest::new(user_id, position, resume_ref(&resume), resume_digest, language);

    // transcript log
    let mut snapshots = runtime.subscribe();
    tokio::spawn(async move {
        let mut shown = 0;
        let mut phase = Phase::Idle;
        while snapshots.changed().await.is_ok() {
            let snapshot = snapshots.borrow_and_update().clone();
            if snapshot.turns.len() < shown {
                shown = 0;
            }
            for turn in &snapshot.turns[shown..] {
                println!("Q: {}", turn.question);
                println!("A: {}", turn.answer);
            }
            shown = snapshot.turns.len();
            if snapshot.phase != phase {
                phase = snapshot.phase;
                let label = if phase.is_engaged() { "End interview" } else { "Start interview" };
                println!("[{}] ({})", phase, label);
            }
        }
    });

    if let Some(mut alerts) = runtime.take_alert_receiver() {
        tokio::spawn(async move {
            while let Some(alert) = alerts.recv().await {
                eprintln!("⚠ {}", alert);
            }
        });
    }

    println!("Type /start to begin, /end to finish, /quit to exit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => line,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("CTRL-C received; shutting down");
                break;
            }
        };
        let sent = match line.trim() {
            "/start" => runtime.start(request.clone()),
            "/end" | "/stop" => runtime.stop(),
            "/toggle" => runtime.toggle(request.clone()),
            "/quit" | "/exit" => break,
            _ => {
                match console.as_ref() {
                    Some(console) if console.feed(&line) => {}
                    Some(_) => println!("(not listening; /start first)"),
                    None => println!("(voice mode: speak into the microphone)"),
                }
                Ok(())
            }
        };
        if let Err(e) = sent {
            warn!("command not delivered: {}", e);
            break;
        }
    }

    runtime.shutdown().await;
    Ok(())
}
