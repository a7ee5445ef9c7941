//! The set of sessions a node currently has open.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Callback run once when a session ends.
pub(crate) type CloseHook = Box<dyn FnOnce() + Send + 'static>;

/// Which side of a topic a session serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Publisher,
    Subscriber,
}

/// An entry in the session set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: u64,
    pub kind: SessionKind,
    pub topic: String,
    pub type_name: String,
}

/// Shared, cloneable registry of open sessions, ordered by creation.
#[derive(Debug, Clone, Default)]
pub struct SessionSet {
    sessions: Arc<Mutex<BTreeMap<u64, SessionInfo>>>,
    next_id: Arc<AtomicU64>,
}

impl SessionSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> MutexGuard<'_, BTreeMap<u64, SessionInfo>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Adds a session and returns its id.
    pub fn insert(&self, kind: SessionKind, topic: impl Into<String>, type_name: impl Into<String>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.sessions().insert(
            id,
            SessionInfo {
                id,
                kind,
                topic: topic.into(),
                type_name: type_name.into(),
            },
        );
        id
    }

    /// Removes a session; removing twice is a no-op.
    pub fn remove(&self, id: u64) -> Option<SessionInfo> {
        self.sessions().remove(&id)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.sessions().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the open sessions.
    pub fn list(&self) -> Vec<SessionInfo> {
        self.sessions().values().cloned().collect()
    }

    /// Topics with at least one session of the given kind.
    pub fn topics(&self, kind: SessionKind) -> Vec<String> {
        let mut topics: Vec<String> = Vec::new();
        for session in self.sessions().values().filter(|s| s.kind == kind) {
            if !topics.contains(&session.topic) {
                topics.push(session.topic.clone());
            }
        }
        topics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_remove() {
        let set = SessionSet::new();
        let a = set.insert(SessionKind::Publisher, "/chatter", "std_msgs/String");
        let b = set.insert(SessionKind::Subscriber, "/odom", "nav_msgs/Odometry");
        assert_ne!(a, b);
        assert_eq!(set.len(), 2);

        let clone = set.clone();
        assert_eq!(clone.remove(a).unwrap().topic, "/chatter");
        assert_eq!(set.remove(a), None);
        assert!(!set.contains(a));
        assert!(set.contains(b));
    }

    #[test]
    fn listing_keeps_creation_order() {
        let set = SessionSet::new();
        set.insert(SessionKind::Subscriber, "/b", "t");
        set.insert(SessionKind::Publisher, "/a", "t");
        set.insert(SessionKind::Publisher, "/c", "t");

        let topics: Vec<_> = set.list().into_iter().map(|s| s.topic).collect();
        assert_eq!(topics, ["/b", "/a", "/c"]);
        assert_eq!(set.topics(SessionKind::Publisher), ["/a", "/c"]);
    }
}
