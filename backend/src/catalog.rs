//! Thread and journey catalog.
//!
//! Plain request/response calls with no session state behind them.

use serde::Serialize;

use crate::{BackendError, HttpBackend};
use parley_types::{Journey, JourneyId, Thread, ThreadId};

#[derive(Serialize)]
struct CreateThread<'a> {
    name: &'a str,
    journey_id: Option<&'a JourneyId>,
}

#[derive(Serialize)]
struct RenameThread<'a> {
    name: &'a str,
}

impl HttpBackend {
    pub async fn list_threads(&self) -> Result<Vec<Thread>, BackendError> {
        let request = self.client.get(self.url(&["threads"]));
        self.send_json("GET /threads", request).await
    }

    /// Create a thread, optionally seeded from a journey template.
    pub async fn create_thread(
        &self,
        name: &str,
        journey: Option<&JourneyId>,
    ) -> Result<Thread, BackendError> {
        let request = self.client.post(self.url(&["threads"])).json(&CreateThread {
            name,
            journey_id: journey,
        });
        let thread: Thread = self.send_json("POST /threads", request).await?;
        tracing::info!(thread = %thread.id, "Created thread");
        Ok(thread)
    }

    pub async fn rename_thread(&self, thread: &ThreadId, name: &str) -> Result<(), BackendError> {
        let endpoint = format!("PUT /threads/{thread}");
        let request = self
            .client
            .put(self.url(&["threads", thread.as_str()]))
            .json(&RenameThread { name });
        self.send(&endpoint, request).await?;
        Ok(())
    }

    pub async fn delete_thread(&self, thread: &ThreadId) -> Result<(), BackendError> {
        let endpoint = format!("DELETE /threads/{thread}");
        let request = self.client.delete(self.url(&["threads", thread.as_str()]));
        self.send(&endpoint, request).await?;
        tracing::info!(%thread, "Deleted thread");
        Ok(())
    }

    pub async fn list_journeys(&self) -> Result<Vec<Journey>, BackendError> {
        let request = self.client.get(self.url(&["journeys"]));
        self.send_json("GET /journeys", request).await
    }
}
