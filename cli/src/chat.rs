//! Interactive chat loop over one thread.
//!
//! Plain lines are sent as messages. Slash commands:
//!
//! ```text
//! /log                 show the conversation with message ids
//! /edit <id> <text>    replace a message and regenerate from there
//! /start               start the thread's journey
//! /open <thread-id>    switch threads
//! /quit                leave
//! ```

use std::io::{self, Write};
use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};

use parley_engine::{
    Dispatch, HttpBackend, MessageDraft, MessageId, Rejected, Session, ThreadId,
};

/// How often a running turn is polled for new events.
const FRAME_DURATION: Duration = Duration::from_millis(8);

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Input {
    Send(String),
    Edit { id: MessageId, content: String },
    Start,
    Log,
    Open(ThreadId),
    Quit,
    Empty,
    Invalid(String),
}

pub(crate) fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Send(line.to_string());
    };

    let (name, rest) = command
        .split_once(char::is_whitespace)
        .map(|(name, rest)| (name, rest.trim()))
        .unwrap_or((command, ""));
    match name {
        "quit" | "q" => Input::Quit,
        "log" => Input::Log,
        "start" => Input::Start,
        "open" if !rest.is_empty() => Input::Open(ThreadId::new(rest)),
        "edit" => match rest.split_once(char::is_whitespace) {
            Some((id, content)) if !content.trim().is_empty() => Input::Edit {
                id: MessageId::new(id),
                content: content.trim().to_string(),
            },
            _ => Input::Invalid("usage: /edit <message-id> <text>".to_string()),
        },
        "open" => Input::Invalid("usage: /open <thread-id>".to_string()),
        other => Input::Invalid(format!("unknown command /{other}")),
    }
}

pub(crate) async fn run(session: &mut Session<HttpBackend>, thread: ThreadId) -> Result<()> {
    open(session, thread).await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        let dispatched = match parse_input(&line) {
            Input::Empty => continue,
            Input::Quit => break,
            Input::Invalid(message) => {
                println!("{message}");
                continue;
            }
            Input::Log => {
                print_log(session);
                continue;
            }
            Input::Open(thread) => {
                open(session, thread).await;
                continue;
            }
            Input::Send(content) => session.send_message(MessageDraft::new(content)),
            Input::Edit { id, content } => session.edit_message(&id, MessageDraft::new(content)),
            Input::Start => session.start_journey(),
        };

        match dispatched {
            Ok(Dispatch::Started) => follow_turn(session).await?,
            Ok(Dispatch::Ignored) => println!("no such message"),
            Err(Rejected::JourneyUnavailable) => {
                println!("this thread has no journey waiting to start");
            }
            Err(rejected) => println!("{rejected}"),
        }
    }

    session.close();
    Ok(())
}

async fn open(session: &mut Session<HttpBackend>, thread: ThreadId) {
    match session.open(thread.clone()).await {
        Ok(()) => {
            println!("opened {thread}");
            print_log(session);
            if session.can_start_journey() {
                println!("(journey ready: type /start to begin)");
            }
        }
        Err(err) => println!("error: {err}"),
    }
}

/// Poll the turn until it ends, echoing the reply as it streams.
async fn follow_turn(session: &mut Session<HttpBackend>) -> Result<()> {
    let before = session.log().last().map(|m| m.id().clone());
    let mut printed = 0;
    let mut ticker = tokio::time::interval(FRAME_DURATION);
    let mut out = io::stdout();

    loop {
        ticker.tick().await;
        session.process_turn_events();

        if let Some(tail) = session.log().last()
            && tail.is_assistant()
            && Some(tail.id()) != before.as_ref()
            && tail.content().len() > printed
        {
            if printed == 0 {
                write!(out, "assistant: ")?;
            }
            write!(out, "{}", &tail.content()[printed..])?;
            out.flush()?;
            printed = tail.content().len();
        }

        if !session.is_loading() {
            break;
        }
    }

    if printed > 0 {
        writeln!(out)?;
    }
    if let Some(error) = session.error() {
        writeln!(out, "error: {}", error.message)?;
    }
    Ok(())
}

fn print_log(session: &Session<HttpBackend>) {
    for message in session.messages() {
        println!("[{}] {}: {}", message.id(), message.role(), message.content());
        for file in message.media_files() {
            println!("    attached {} ({})", file.filename, file.content_type);
        }
    }
}

fn prompt() -> io::Result<()> {
    let mut out = io::stdout();
    write!(out, "> ")?;
    out.flush()
}
