//! Append-only run event stream
//!
//! Appends for one run are serialized under a per-run async mutex holding
//! that run's [`RunSequence`]; different runs append in parallel. Replay is
//! a lazy stream paging through the repository.

use crate::capabilities::{Clock, IdSource, Repository};
use axm_events::{validate, RunSequence};
use axm_types::{AxmResult, EventId, EventPayload, RunEvent, RunId};
use dashmap::DashMap;
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct Cursor {
    loaded: bool,
    sequence: RunSequence,
}

/// Event log front end over a [`Repository`]
pub struct EventStream {
    repo: Arc<dyn Repository>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdSource>,
    cursors: DashMap<RunId, Arc<Mutex<Cursor>>>,
    page_size: usize,
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("open_runs", &self.cursors.len())
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

impl EventStream {
    /// Stream over `repo`, replaying `page_size` events per query
    #[must_use]
    pub fn new(
        repo: Arc<dyn Repository>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdSource>,
        page_size: usize,
    ) -> Self {
        Self {
            repo,
            clock,
            ids,
            cursors: DashMap::new(),
            page_size: page_size.max(1),
        }
    }

    fn cursor(&self, run_id: RunId) -> Arc<Mutex<Cursor>> {
        Arc::clone(self.cursors.entry(run_id).or_default().value())
    }

    /// Append `payload` with the run's next sequence number
    ///
    /// Suspect payloads are logged, never rejected. A failed write leaves the
    /// sequence untouched.
    pub async fn append(&self, run_id: RunId, payload: EventPayload) -> AxmResult<RunEvent> {
        let cell = self.cursor(run_id);
        let mut cursor = cell.lock().await;
        if !cursor.loaded {
            let last = self.repo.last_event(run_id).await?;
            cursor.sequence = RunSequence::resume(last.as_ref());
            cursor.loaded = true;
        }

        let saved = cursor.sequence;
        let (sequence, timestamp) = cursor.sequence.advance(self.clock.now());
        let event = RunEvent::new(
            EventId::from_uuid(self.ids.new_id()),
            run_id,
            sequence,
            timestamp,
            payload,
        );
        for warning in validate(&event) {
            warn!(run_id = %run_id, sequence, kind = ?warning.kind, "{warning}");
        }

        if let Err(err) = self.repo.append_event(event.clone()).await {
            cursor.sequence.rollback(saved);
            return Err(err);
        }
        debug!(run_id = %run_id, sequence, event_type = %event.event_type, "event appended");
        Ok(event)
    }

    /// Drop the in-memory cursor of a finished run
    pub fn forget(&self, run_id: RunId) {
        self.cursors.remove(&run_id);
    }

    /// Events with `sequence >= from_sequence`, fetched page by page
    ///
    /// The stream ends at the first short page; replaying again picks up
    /// anything appended since.
    #[must_use]
    pub fn replay(&self, run_id: RunId, from_sequence: u64) -> BoxStream<'static, AxmResult<RunEvent>> {
        let repo = Arc::clone(&self.repo);
        let page_size = self.page_size;
        stream::unfold(Some(from_sequence.max(1)), move |next| {
            let repo = Arc::clone(&repo);
            async move {
                let from = next?;
                match repo.list_events(run_id, from, page_size).await {
                    Ok(page) if page.is_empty() => None,
                    Ok(page) => {
                        let following = if page.len() < page_size {
                            None
                        } else {
                            page.last().map(|e| e.sequence + 1)
                        };
                        Some((page.into_iter().map(Ok).collect::<Vec<_>>(), following))
                    }
                    Err(err) => Some((vec![Err(err)], None)),
                }
            }
        })
        .flat_map(stream::iter)
        .boxed()
    }

    /// Every event of a run, in order
    pub async fn collect(&self, run_id: RunId) -> AxmResult<Vec<RunEvent>> {
        let mut events = Vec::new();
        let mut replay = self.replay(run_id, 1);
        while let Some(event) = replay.next().await {
            events.push(event?);
        }
        Ok(events)
    }
}
