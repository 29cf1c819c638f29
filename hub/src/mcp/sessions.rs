use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Open SSE streams keyed by session id. Each stream drains its own queue of
/// JSON-RPC responses.
#[derive(Default)]
pub struct SseSessions {
    inner: Mutex<HashMap<String, mpsc::UnboundedSender<Value>>>,
}

impl SseSessions {
    /// Register a new stream; returns its id and the receiving half.
    pub fn open(&self) -> (String, mpsc::UnboundedReceiver<Value>) {
        let id = Uuid::now_v7().simple().to_string();
        let (tx, rx) = mpsc::unbounded_channel();
        let mut sessions = self.lock();
        sessions.insert(id.clone(), tx);
        tracing::debug!(session_id = %id, open = sessions.len(), "sse session opened");
        (id, rx)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    /// Queue `message` for session `id`. Returns false when the session is
    /// unknown or its stream has gone away.
    pub fn send(&self, id: &str, message: Value) -> bool {
        let mut sessions = self.lock();
        let Some(tx) = sessions.get(id) else {
            return false;
        };
        if tx.send(message).is_ok() {
            return true;
        }
        sessions.remove(id);
        false
    }

    pub fn close(&self, id: &str) {
        if self.lock().remove(id).is_some() {
            tracing::debug!(session_id = %id, "sse session closed");
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, mpsc::UnboundedSender<Value>>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
