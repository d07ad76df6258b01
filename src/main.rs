use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

use al_base::config::{FocusMode, OptimizationMode};
use al_base::state::Role;

use answerline::app::{NoticeLevel, Session};
use answerline::infra::api::{ApiError, HttpBackend, LookupKind, LookupTrigger};
use answerline::infra::config::AppConfig;
use answerline::infra::logging;
use answerline::state::persistence::{PreferenceFile, errors_dir};

const POLL: Duration = Duration::from_millis(50);
const SUGGESTION_WAIT: Duration = Duration::from_secs(10);

/// Forwards lookup requests to the main loop, which only reports them.
struct ChannelLookups(Sender<(LookupKind, String)>);

impl LookupTrigger for ChannelLookups {
    fn trigger(&self, kind: LookupKind, message_id: &str) -> Result<(), ApiError> {
        self.0.send((kind, message_id.to_string())).map_err(|e| ApiError::Network(e.to_string()))
    }
}

#[derive(Default)]
struct Args {
    chat: Option<String>,
    focus: Option<FocusMode>,
    optimize: Option<OptimizationMode>,
    query: Vec<String>,
}

fn parse_args(raw: &[String]) -> Result<Args, String> {
    let mut args = Args::default();
    let mut iter = raw.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--chat" => args.chat = Some(iter.next().ok_or("--chat needs an id")?.clone()),
            "--focus" => {
                let value = iter.next().ok_or("--focus needs a mode")?;
                args.focus = Some(value.parse().map_err(|e| format!("{}", e))?);
            }
            "--optimize" => {
                let value = iter.next().ok_or("--optimize needs a mode")?;
                args.optimize = Some(value.parse().map_err(|e| format!("{}", e))?);
            }
            "-h" | "--help" => return Err(usage()),
            _ => args.query.push(arg.clone()),
        }
    }
    Ok(args)
}

fn usage() -> String {
    let focus: Vec<&str> = FocusMode::ALL.iter().map(|m| m.as_str()).collect();
    let optimize: Vec<&str> = OptimizationMode::ALL.iter().map(|m| m.as_str()).collect();
    format!(
        "usage: answerline [--chat <id>] [--focus <mode>] [--optimize <mode>] [QUERY]\n\
         focus modes: {}\n\
         optimization modes: {}\n\
         commands: /rewrite <messageId>, /quit",
        focus.join(", "),
        optimize.join(", ")
    )
}

fn main() -> io::Result<()> {
    logging::init();

    let raw: Vec<String> = std::env::args().skip(1).collect();
    let args = match parse_args(&raw) {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("{}", msg);
            std::process::exit(2);
        }
    };

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };
    let backend = match HttpBackend::new(&config.server_url) {
        Ok(backend) => Arc::new(backend),
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let (lookup_tx, lookup_rx) = mpsc::channel();
    let mut session = Session::new(
        None,
        backend.clone(),
        Arc::new(ChannelLookups(lookup_tx)),
        Arc::new(PreferenceFile::default_location()),
    )
    .with_error_log(errors_dir());
    session.configure(&config);
    if let Some(mode) = args.focus {
        session.set_focus_mode(mode);
    }
    if let Some(mode) = args.optimize {
        session.set_optimization_mode(mode);
    }

    if let Some(chat_id) = &args.chat {
        match session.load(chat_id, backend.as_ref()) {
            Ok(true) => print_transcript(&session),
            Ok(false) => {
                print_notices(&mut session);
                std::process::exit(1);
            }
            Err(e) => {
                eprintln!("could not load chat: {}", e);
                std::process::exit(1);
            }
        }
    }

    let mut out = io::stdout();
    if !args.query.is_empty() {
        let query = args.query.join(" ");
        if session.send_message(&query, None).is_ok() {
            drive_cycle(&mut session, &lookup_rx, &mut out)?;
        }
        print_notices(&mut session);
    }

    let stdin = io::stdin();
    prompt(&mut out)?;
    for line in stdin.lock().lines() {
        let line = line?;
        let started = match parse_command(&line) {
            Command::Empty => false,
            Command::Quit => break,
            Command::Usage(msg) => {
                eprintln!("{}", msg);
                false
            }
            Command::Rewrite(id) => matches!(session.rewrite(id), Ok(Some(_))),
            Command::Send(text) => session.send_message(text, None).is_ok(),
        };
        if started {
            drive_cycle(&mut session, &lookup_rx, &mut out)?;
        }
        print_notices(&mut session);
        prompt(&mut out)?;
    }
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Empty,
    Quit,
    Rewrite(&'a str),
    Send(&'a str),
    Usage(&'static str),
}

/// Interpret one line of input. Only exact command words count as commands.
fn parse_command(line: &str) -> Command<'_> {
    let input = line.trim();
    let mut words = input.split_whitespace();
    match words.next() {
        None => Command::Empty,
        Some("/quit") => Command::Quit,
        Some("/rewrite") => match (words.next(), words.next()) {
            (Some(id), None) => Command::Rewrite(id),
            _ => Command::Usage("usage: /rewrite <messageId>"),
        },
        Some(_) => Command::Send(input),
    }
}

/// Stream the open cycle to `out`, then list sources, lookups and suggestions.
fn drive_cycle(session: &mut Session, lookups: &Receiver<(LookupKind, String)>, out: &mut impl Write) -> io::Result<()> {
    let before = session.conversation().len();
    let mut printed = 0;
    while session.is_loading() {
        session.wait_stream_event(POLL);
        if let Some(msg) = session.conversation().messages().get(before)
            && msg.role == Role::Assistant
        {
            let delta: String = msg.content.chars().skip(printed).collect();
            printed += delta.chars().count();
            write!(out, "{}", delta)?;
            out.flush()?;
        }
    }
    writeln!(out)?;

    let Some(answer) = session.conversation().messages().get(before).cloned() else {
        return Ok(());
    };
    if let Some(sources) = &answer.sources {
        writeln!(out, "\nSources:")?;
        for (i, source) in sources.iter().enumerate() {
            writeln!(out, "  [{}] {} {}", i + 1, source.title().unwrap_or("untitled"), source.url().unwrap_or(""))?;
        }
    }
    while let Ok((kind, id)) = lookups.try_recv() {
        writeln!(out, "({:?} lookup requested for {})", kind, id)?;
    }
    if session.pending_side_effects() > 0 {
        session.wait_side_effects(SUGGESTION_WAIT);
    }
    if let Some(suggestions) = session.conversation().find(&answer.message_id).and_then(|m| m.suggestions.clone()) {
        writeln!(out, "\nRelated:")?;
        for suggestion in suggestions {
            writeln!(out, "  - {}", suggestion)?;
        }
    }
    writeln!(out, "[answer {}]", answer.message_id)?;
    Ok(())
}

fn print_transcript(session: &Session) {
    for msg in session.conversation().messages() {
        let who = match msg.role {
            Role::User => ">",
            Role::Assistant => "<",
        };
        println!("{} {} [{}]", who, msg.content, msg.message_id);
    }
}

fn print_notices(session: &mut Session) {
    for notice in session.take_notices() {
        match notice.level {
            NoticeLevel::Info => eprintln!("{}", notice.text),
            NoticeLevel::Error => eprintln!("error: {}", notice.text),
        }
    }
}

fn prompt(out: &mut impl Write) -> io::Result<()> {
    write!(out, "> ")?;
    out.flush()
}
