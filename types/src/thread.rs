use serde::{Deserialize, Serialize};

use crate::{JourneyId, Message, ThreadId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    pub name: String,
}

/// A thread template whose first message stays hidden until the journey starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Journey {
    pub id: JourneyId,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Body of a thread fetch; hydrates a session's message log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadSnapshot {
    #[serde(default)]
    pub id: Option<ThreadId>,
    #[serde(default)]
    pub name: Option<String>,
    pub messages: Vec<Message>,
}
