//! Command line parsing.

use anyhow::{Result, bail};

use parley_engine::{JourneyId, ThreadId};

pub(crate) const USAGE: &str = "\
usage: parley <command>

commands:
  threads                        list threads
  journeys                       list journeys
  new <name> [journey-id]        create a thread, optionally from a journey
  rename <thread-id> <name>      rename a thread
  delete <thread-id>             delete a thread
  chat <thread-id>               open a thread and chat
  help                           show this message";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    Threads,
    Journeys,
    New {
        name: String,
        journey: Option<JourneyId>,
    },
    Rename {
        thread: ThreadId,
        name: String,
    },
    Delete {
        thread: ThreadId,
    },
    Chat {
        thread: ThreadId,
    },
    Help,
}

pub(crate) fn parse<I>(args: I) -> Result<Command>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let Some(command) = args.next() else {
        return Ok(Command::Help);
    };
    let rest: Vec<String> = args.collect();

    let command = match (command.as_str(), rest.as_slice()) {
        ("threads", []) => Command::Threads,
        ("journeys", []) => Command::Journeys,
        ("new", [name]) => Command::New {
            name: name.clone(),
            journey: None,
        },
        ("new", [name, journey]) => Command::New {
            name: name.clone(),
            journey: Some(JourneyId::new(journey.as_str())),
        },
        ("rename", [thread, name]) => Command::Rename {
            thread: ThreadId::new(thread.as_str()),
            name: name.clone(),
        },
        ("delete", [thread]) => Command::Delete {
            thread: ThreadId::new(thread.as_str()),
        },
        ("chat", [thread]) => Command::Chat {
            thread: ThreadId::new(thread.as_str()),
        },
        ("help" | "-h" | "--help", _) => Command::Help,
        (other, _) => bail!("unrecognized command line: {other} {}", rest.join(" ")),
    };
    Ok(command)
}
