use std::fs;
use std::io::{self, BufRead, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tutor_contracts::chat::{parse_command, ChatCommand, CHAT_HELP_COMMANDS};
use tutor_contracts::response::StudyResponse;
use tutor_contracts::subject::Subject;
use tutor_contracts::tabs::{tab_content, tabs_for, DisplayTab};
use tutor_engine::config::{ProviderConfig, DEFAULT_REQUEST_TIMEOUT};
use tutor_engine::{
    GeminiStudyClient, MediaCapture, Phase, SessionError, StillImageCamera, StudyEngine,
};

#[derive(Debug, Parser)]
#[command(
    name = "tutor-rs",
    version,
    about = "Structured study answers from a question or a photo of an exercise"
)]
struct Cli {
    /// Log engine diagnostics to stderr (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive session driven by slash commands.
    Chat(ChatArgs),
    /// Ask one question and print the answer.
    Ask(AskArgs),
}

#[derive(Debug, Args)]
struct ProviderArgs {
    #[arg(long)]
    api_key: Option<String>,
    #[arg(long)]
    api_base: Option<String>,
    #[arg(long)]
    model: Option<String>,
    /// Request timeout in seconds.
    #[arg(long)]
    timeout: Option<u64>,
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[command(flatten)]
    provider: ProviderArgs,
    /// Image file used as the camera frame source.
    #[arg(long)]
    camera: Option<PathBuf>,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    subject: Option<String>,
}

#[derive(Debug, Parser)]
struct AskArgs {
    #[command(flatten)]
    provider: ProviderArgs,
    #[arg(long)]
    subject: String,
    #[arg(long)]
    prompt: Option<String>,
    #[arg(long)]
    image: Option<PathBuf>,
    #[arg(long)]
    events: Option<PathBuf>,
    /// Print the validated response as JSON instead of the tabs.
    #[arg(long)]
    json: bool,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("tutor-rs error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Command::Chat(args) => {
            run_chat(args)?;
            Ok(0)
        }
        Command::Ask(args) => run_ask(args),
    }
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose {
        "tutor_engine=debug,tutor_cli=debug"
    } else {
        "warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(true)
        .try_init();
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn resolve_provider_config(
    args: &ProviderArgs,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ProviderConfig> {
    let api_key = args
        .api_key
        .clone()
        .filter(|value| !value.trim().is_empty())
        .or_else(|| env("GEMINI_API_KEY"))
        .or_else(|| env("GOOGLE_API_KEY"))
        .unwrap_or_default();
    let api_base = args
        .api_base
        .clone()
        .or_else(|| env("GEMINI_API_BASE"))
        .unwrap_or_default();
    let timeout = args
        .timeout
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT);

    let config = ProviderConfig::new(api_key.trim())
        .with_api_base(&api_base)
        .with_model(args.model.as_deref().unwrap_or_default())
        .with_request_timeout(timeout);
    config.validate()?;
    Ok(config)
}

fn build_engine(
    provider: &ProviderArgs,
    camera: Option<&Path>,
    events: Option<&Path>,
) -> Result<StudyEngine> {
    let config = resolve_provider_config(provider, non_empty_env)?;
    tracing::debug!(?config, "provider configured");
    let media = match camera {
        Some(path) => MediaCapture::new(Arc::new(StillImageCamera::new(path))),
        None => MediaCapture::without_camera(),
    };
    let engine = StudyEngine::new(Arc::new(GeminiStudyClient::new(config)), media);
    Ok(match events {
        Some(path) => engine.with_journal(path),
        None => engine,
    })
}

fn parse_subject(raw: &str) -> Result<Subject> {
    raw.parse::<Subject>().map_err(|err| {
        let known: Vec<&str> = Subject::ALL.iter().map(|subject| subject.key()).collect();
        anyhow::anyhow!("{err} (expected one of {})", known.join(", "))
    })
}

fn import_image_path(engine: &mut StudyEngine, path: &Path) -> Result<()> {
    let bytes =
        fs::read(path).with_context(|| format!("failed to read image {}", path.display()))?;
    engine.import_image(&bytes)?;
    Ok(())
}

fn run_ask(args: AskArgs) -> Result<i32> {
    let subject = parse_subject(&args.subject)?;
    let mut engine = build_engine(&args.provider, None, args.events.as_deref())?;
    engine.select_subject(subject)?;
    if let Some(path) = args.image.as_deref() {
        import_image_path(&mut engine, path)?;
    }
    engine.set_prompt(args.prompt.as_deref().unwrap_or_default())?;
    engine.submit()?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match engine.wait_for_settle() {
        Phase::Result => {
            let Some(response) = engine.session().response() else {
                bail!("generation finished without a response");
            };
            if args.json {
                writeln!(out, "{}", serde_json::to_string_pretty(response)?)?;
            } else {
                render_all_tabs(&mut out, response)?;
            }
            Ok(0)
        }
        _ => {
            let detail = engine
                .session()
                .last_error()
                .map(|err| format!("{} ({})", err, err.code()))
                .unwrap_or_else(|| "generation did not complete".to_string());
            eprintln!("tutor-rs: {detail}");
            Ok(2)
        }
    }
}

fn run_chat(args: ChatArgs) -> Result<()> {
    let mut engine = build_engine(
        &args.provider,
        args.camera.as_deref(),
        args.events.as_deref(),
    )?;
    if let Some(raw) = args.subject.as_deref() {
        engine.select_subject(parse_subject(raw)?)?;
    }

    let stdin = io::stdin();
    let stdout = io::stdout();
    println!("Tutor chat started. Type /help for commands.");
    if engine.phase() == Phase::Idle {
        print_subjects(&mut stdout.lock())?;
    }

    let mut line = String::new();
    loop {
        print!("{}> ", prompt_label(&engine));
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.lock().read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let command = parse_command(line.trim_end_matches(['\n', '\r']));
        let mut out = stdout.lock();
        match apply_command(&mut engine, command, &mut out) {
            Ok(ChatFlow::Continue) => {}
            Ok(ChatFlow::Quit) => break,
            Err(err) => writeln!(out, "{}", describe_error(&err))?,
        }
    }
    engine.change_subject();
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum ChatFlow {
    Continue,
    Quit,
}

fn apply_command(
    engine: &mut StudyEngine,
    command: ChatCommand,
    out: &mut impl Write,
) -> Result<ChatFlow> {
    match command {
        ChatCommand::Noop => {}
        ChatCommand::Quit => return Ok(ChatFlow::Quit),
        ChatCommand::Help => {
            writeln!(out, "Commands: {}", CHAT_HELP_COMMANDS.join(" "))?;
        }
        ChatCommand::ListSubjects => print_subjects(out)?,
        ChatCommand::SelectSubject(raw) => {
            if raw.trim().is_empty() {
                bail!("/subject requires a subject");
            }
            let subject = parse_subject(&raw)?;
            engine.select_subject(subject)?;
            writeln!(
                out,
                "Subject set to {subject}. Type a question, /camera or /image <path>."
            )?;
        }
        ChatCommand::ChangeSubject => {
            engine.change_subject();
            print_subjects(out)?;
        }
        ChatCommand::StartCapture => {
            engine.start_capture()?;
            writeln!(out, "Camera on. /snap to take the photo, /cancel to stop.")?;
        }
        ChatCommand::CaptureFrame => {
            engine.capture_frame()?;
            writeln!(out, "Photo attached.")?;
        }
        ChatCommand::CancelCapture => {
            engine.cancel_capture()?;
            writeln!(out, "Camera off.")?;
        }
        ChatCommand::ImportImage(path) => {
            if path.is_empty() {
                bail!("/image requires a path");
            }
            if path.starts_with("data:") {
                engine.import_data_url(&path)?;
            } else {
                import_image_path(engine, Path::new(&path))?;
            }
            writeln!(out, "Image attached.")?;
        }
        ChatCommand::ClearImage => {
            engine.clear_image()?;
            writeln!(out, "Image removed.")?;
        }
        ChatCommand::SetPrompt(text) => {
            engine.set_prompt(&text)?;
        }
        ChatCommand::Submit => submit_and_render(engine, out)?,
        ChatCommand::AskFollowUp(text) => {
            engine.ask_follow_up(&text)?;
            settle_and_render(engine, out)?;
        }
        ChatCommand::Text(text) => match engine.phase() {
            Phase::Result => {
                engine.ask_follow_up(&text)?;
                settle_and_render(engine, out)?;
            }
            _ => {
                engine.set_prompt(&text)?;
                submit_and_render(engine, out)?;
            }
        },
        ChatCommand::NewQuestion => {
            engine.new_question()?;
            writeln!(out, "Ready for a new question.")?;
        }
        ChatCommand::Acknowledge => {
            engine.acknowledge()?;
            writeln!(out, "Draft kept. Edit it or /submit again.")?;
        }
        ChatCommand::SelectTab(key) => {
            engine.select_tab_key(&key)?;
            render_active_tab(engine, out)?;
        }
        ChatCommand::ShowTabs => render_active_tab(engine, out)?,
        ChatCommand::Unknown { command, .. } => {
            writeln!(out, "Unknown command: /{command}. Type /help.")?;
        }
    }
    Ok(ChatFlow::Continue)
}

fn submit_and_render(engine: &mut StudyEngine, out: &mut impl Write) -> Result<()> {
    if engine.submit()?.is_none() {
        writeln!(out, "Still working on the previous question.")?;
        return Ok(());
    }
    settle_and_render(engine, out)
}

fn settle_and_render(engine: &mut StudyEngine, out: &mut impl Write) -> Result<()> {
    writeln!(out, "Thinking...")?;
    match engine.wait_for_settle() {
        Phase::Result => render_active_tab(engine, out)?,
        Phase::Error => {
            if let Some(err) = engine.session().last_error() {
                writeln!(out, "Generation failed: {err}")?;
            }
            writeln!(out, "/ack to go back to your question.")?;
        }
        phase => writeln!(out, "Session is {phase}.")?,
    }
    Ok(())
}

fn render_active_tab(engine: &StudyEngine, out: &mut impl Write) -> Result<()> {
    let session = engine.session();
    let (Some(response), Some(active)) = (session.response(), session.active_tab()) else {
        bail!("no answer to show yet");
    };
    let strip: Vec<String> = tabs_for(response)
        .iter()
        .map(|tab| {
            if *tab == active {
                format!("[{}]", tab.key())
            } else {
                tab.key().to_string()
            }
        })
        .collect();
    writeln!(out, "{}", strip.join(" "))?;
    render_tab(out, response, active)?;
    Ok(())
}

fn render_all_tabs(out: &mut impl Write, response: &StudyResponse) -> io::Result<()> {
    for tab in tabs_for(response) {
        render_tab(out, response, tab)?;
        writeln!(out)?;
    }
    let similar = response.speed().similar();
    writeln!(
        out,
        "Practice answer: {}. {}",
        similar.correct_index() + 1,
        similar.correct_option()
    )
}

fn render_tab(out: &mut impl Write, response: &StudyResponse, tab: DisplayTab) -> io::Result<()> {
    writeln!(out, "== {} ==", tab.label())?;
    writeln!(out, "{}", tab_content(response, tab))?;
    if tab == DisplayTab::Speed {
        let similar = response.speed().similar();
        writeln!(out)?;
        writeln!(out, "Practice: {}", similar.question())?;
        for (idx, option) in similar.options().iter().enumerate() {
            writeln!(out, "  {}. {}", idx + 1, option)?;
        }
    }
    Ok(())
}

fn print_subjects(out: &mut impl Write) -> io::Result<()> {
    let subjects: Vec<&str> = Subject::ALL.iter().map(|subject| subject.key()).collect();
    writeln!(out, "Pick a subject with /subject <name>: {}", subjects.join(", "))
}

fn prompt_label(engine: &StudyEngine) -> String {
    match (engine.session().subject(), engine.phase()) {
        (None, _) => String::new(),
        (Some(subject), Phase::Ready) => subject.key().to_string(),
        (Some(subject), phase) => format!("{}:{phase}", subject.key()),
    }
}

fn describe_error(err: &anyhow::Error) -> String {
    match err.downcast_ref::<SessionError>() {
        Some(SessionError::InvalidTransition { event, phase }) => {
            format!("Can't {event} right now (session is {phase}).")
        }
        _ => format!("Error: {err:#}"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    use clap::Parser;
    use tutor_contracts::chat::{parse_command, ChatCommand};
    use tutor_contracts::response::parse;
    use tutor_engine::{MediaCapture, Phase, StudyEngine};

    use super::{
        apply_command, describe_error, render_all_tabs, resolve_provider_config, ChatFlow, Cli,
        Command, ProviderArgs,
    };

    fn provider_args() -> ProviderArgs {
        ProviderArgs {
            api_key: None,
            api_base: None,
            model: None,
            timeout: None,
        }
    }

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn flag_key_wins_over_environment() {
        let mut args = provider_args();
        args.api_key = Some("flag-key".to_string());
        let config = resolve_provider_config(&args, env_from(&[("GEMINI_API_KEY", "env")])).unwrap();
        assert_eq!(config.api_key, "flag-key");
    }

    #[test]
    fn environment_fallbacks_are_used_in_order() {
        let config = resolve_provider_config(
            &provider_args(),
            env_from(&[
                ("GOOGLE_API_KEY", "google"),
                ("GEMINI_API_BASE", "http://127.0.0.1:8080/v1beta/"),
            ]),
        )
        .unwrap();
        assert_eq!(config.api_key, "google");
        assert_eq!(config.api_base, "http://127.0.0.1:8080/v1beta");

        let config = resolve_provider_config(
            &provider_args(),
            env_from(&[("GEMINI_API_KEY", "gemini"), ("GOOGLE_API_KEY", "google")]),
        )
        .unwrap();
        assert_eq!(config.api_key, "gemini");
    }

    #[test]
    fn missing_key_or_bad_timeout_is_fatal() {
        assert!(resolve_provider_config(&provider_args(), env_from(&[])).is_err());

        let mut args = provider_args();
        args.api_key = Some("k".to_string());
        args.timeout = Some(0);
        assert!(resolve_provider_config(&args, env_from(&[])).is_err());
    }

    #[test]
    fn ask_command_parses_flags() {
        let cli = Cli::try_parse_from([
            "tutor-rs",
            "ask",
            "--subject",
            "math",
            "--prompt",
            "2+2=?",
            "--json",
            "--model",
            "gemini-2.0-flash",
        ])
        .unwrap();
        match cli.command {
            Command::Ask(args) => {
                assert_eq!(args.subject, "math");
                assert_eq!(args.prompt.as_deref(), Some("2+2=?"));
                assert!(args.json);
                assert_eq!(args.provider.model.as_deref(), Some("gemini-2.0-flash"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn chat_commands_drive_the_engine() {
        let mut engine = StudyEngine::new(
            Arc::new(stub::Canned),
            MediaCapture::without_camera(),
        );
        let mut out = Vec::new();

        let flow = apply_command(
            &mut engine,
            parse_command("/subject Math"),
            &mut out,
        )
        .unwrap();
        assert_eq!(flow, ChatFlow::Continue);
        assert_eq!(engine.phase(), Phase::Ready);

        let err = apply_command(&mut engine, parse_command("/submit"), &mut out).unwrap_err();
        assert!(describe_error(&err).contains("prompt text or an image"));

        apply_command(&mut engine, parse_command("2+2=?"), &mut out).unwrap();
        assert_eq!(engine.phase(), Phase::Result);
        apply_command(&mut engine, parse_command("/tab exam"), &mut out).unwrap();

        let rendered = String::from_utf8(out).unwrap();
        assert!(rendered.contains("[speed] mermaid step deep exam"));
        assert!(rendered.contains("== Exam prep =="));

        let err = apply_command(&mut engine, parse_command("/ack"), &mut Vec::new()).unwrap_err();
        assert_eq!(
            describe_error(&err),
            "Can't acknowledge an error right now (session is showing a result)."
        );
        assert_eq!(
            apply_command(&mut engine, ChatCommand::Quit, &mut Vec::new()).unwrap(),
            ChatFlow::Quit
        );
        assert_eq!(engine.wait(Duration::from_millis(10)), None);
    }

    #[test]
    fn image_command_reports_unreadable_and_non_image_files() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let notes = temp.path().join("notes.txt");
        std::fs::write(&notes, "not an image")?;
        let mut engine = StudyEngine::new(Arc::new(stub::Canned), MediaCapture::without_camera());
        apply_command(&mut engine, parse_command("/subject physics"), &mut Vec::new())?;

        let missing = format!("/image \"{}\"", temp.path().join("gone.png").display());
        let err = apply_command(&mut engine, parse_command(&missing), &mut Vec::new()).unwrap_err();
        assert!(describe_error(&err).contains("failed to read image"));

        let text = format!("/image \"{}\"", notes.display());
        let err = apply_command(&mut engine, parse_command(&text), &mut Vec::new()).unwrap_err();
        assert!(describe_error(&err).contains("unsupported image"));
        assert_eq!(engine.phase(), Phase::Ready);
        assert!(engine.session().draft().and_then(|draft| draft.image.as_ref()).is_none());
        Ok(())
    }

    #[test]
    fn ask_output_lists_every_tab() {
        let response = stub::answer();
        let mut out = Vec::new();
        render_all_tabs(&mut out, &response).unwrap();
        let rendered = String::from_utf8(out).unwrap();
        for heading in ["Quick answer", "Diagram", "Step by step", "Deep dive", "Exam prep"] {
            assert!(rendered.contains(&format!("== {heading} ==")), "{heading}");
        }
        assert!(rendered.contains("  2. 5"));
        assert!(rendered.ends_with("Practice answer: 2. 5\n"));
        assert!(parse(&serde_json::to_string(&response).unwrap()).is_ok());
    }

    mod stub {
        use tutor_contracts::providers::{GenerationError, StudyProvider};
        use tutor_contracts::request::StudyRequest;
        use tutor_contracts::response::{parse, StudyResponse};

        pub(super) fn answer() -> StudyResponse {
            parse(
                r#"{"speed":{"answer":"4","similar":{"question":"3+2=?","options":["6","5"],"correctIndex":1}},"mermaid":"graph TD; A-->B","step":"add","deep":"arithmetic","exam":"practice"}"#,
            )
            .unwrap()
        }

        pub(super) struct Canned;

        impl StudyProvider for Canned {
            fn name(&self) -> &str {
                "canned"
            }

            fn generate(&self, _request: &StudyRequest) -> Result<StudyResponse, GenerationError> {
                Ok(answer())
            }
        }
    }
}
