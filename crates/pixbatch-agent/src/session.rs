use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use futures::future::BoxFuture;

use pixbatch_core::error::{PixbatchError, Result};
use pixbatch_core::traits::SessionStore;
use pixbatch_core::types::{PausedCall, SessionId, TurnEvent};

/// In-memory session store shared by every run in the process.
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<SessionId, SessionRecord>>,
}

struct SessionRecord {
    events: Vec<TurnEvent>,
    paused: Vec<PausedCall>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn with_session<T>(
        &self,
        sid: &SessionId,
        f: impl FnOnce(&mut SessionRecord) -> T,
    ) -> Result<T> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let record = sessions
            .get_mut(sid)
            .ok_or_else(|| PixbatchError::SessionNotFound(sid.to_string()))?;
        Ok(f(record))
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore for InMemorySessionStore {
    fn create(&self, sid: &SessionId) -> BoxFuture<'_, Result<()>> {
        let sid = sid.clone();
        Box::pin(async move {
            let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
            if sessions.contains_key(&sid) {
                return Err(PixbatchError::SessionExists(sid.to_string()));
            }
            sessions.insert(
                sid,
                SessionRecord {
                    events: Vec::new(),
                    paused: Vec::new(),
                },
            );
            Ok(())
        })
    }

    fn append_events(&self, sid: &SessionId, events: &[TurnEvent]) -> BoxFuture<'_, Result<()>> {
        let sid = sid.clone();
        let events = events.to_vec();
        Box::pin(async move { self.with_session(&sid, |rec| rec.events.extend(events)) })
    }

    fn load_events(&self, sid: &SessionId) -> BoxFuture<'_, Result<Vec<TurnEvent>>> {
        let sid = sid.clone();
        Box::pin(async move { self.with_session(&sid, |rec| rec.events.clone()) })
    }

    fn save_paused(&self, sid: &SessionId, call: PausedCall) -> BoxFuture<'_, Result<()>> {
        let sid = sid.clone();
        Box::pin(async move { self.with_session(&sid, |rec| rec.paused.push(call)) })
    }

    fn take_paused(
        &self,
        sid: &SessionId,
        invocation_id: &str,
        confirmation_call_id: &str,
    ) -> BoxFuture<'_, Result<Option<PausedCall>>> {
        let sid = sid.clone();
        let invocation_id = invocation_id.to_string();
        let call_id = confirmation_call_id.to_string();
        Box::pin(async move {
            self.with_session(&sid, |rec| {
                let pos = rec.paused.iter().position(|p| {
                    p.invocation_id == invocation_id && p.confirmation_call_id == call_id
                })?;
                Some(rec.paused.remove(pos))
            })
        })
    }
}
