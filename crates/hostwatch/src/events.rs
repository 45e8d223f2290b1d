//! Bounded in-memory log of state-change events.

use crate::transition::{Event, TransitionKind};
use std::collections::VecDeque;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Events kept before the oldest is evicted.
pub const DEFAULT_EVENT_CAPACITY: usize = 500;

/// Append-only FIFO of recent events, owned by whoever creates it.
#[derive(Debug)]
pub struct EventLog {
    events: RwLock<VecDeque<Event>>,
    capacity: usize,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: RwLock::new(VecDeque::with_capacity(capacity.min(DEFAULT_EVENT_CAPACITY))),
            capacity: capacity.max(1),
        }
    }

    pub async fn record(&self, event: Event) {
        match event.event_type {
            TransitionKind::Down => warn!(
                host = %event.host_name,
                check = event.check_index,
                check_type = %event.check_type,
                "EVENT down: {}",
                event.message
            ),
            TransitionKind::Recovered => info!(
                host = %event.host_name,
                check = event.check_index,
                check_type = %event.check_type,
                "EVENT recovered: {}",
                event.message
            ),
        }

        let mut events = self.events.write().await;
        events.push_back(event);
        while events.len() > self.capacity {
            events.pop_front();
        }
    }

    /// Most recent first, at most `limit` entries when given. A limit of
    /// zero means no limit.
    pub async fn recent(&self, limit: Option<usize>) -> Vec<Event> {
        let events = self.events.read().await;
        let limit = match limit {
            Some(n) if n > 0 => n,
            _ => events.len(),
        };
        events.iter().rev().take(limit).cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CheckType;
    use chrono::Utc;

    fn event(index: usize) -> Event {
        Event {
            timestamp: Utc::now(),
            host_name: "h".to_string(),
            check_index: index,
            check_id: None,
            check_type: CheckType::Ping,
            event_type: TransitionKind::Down,
            message: "no reply".to_string(),
            duration: None,
        }
    }

    #[tokio::test]
    async fn test_recent_is_newest_first() {
        let log = EventLog::new();
        for i in 0..5 {
            log.record(event(i)).await;
        }

        let all: Vec<usize> = log.recent(None).await.iter().map(|e| e.check_index).collect();
        assert_eq!(all, vec![4, 3, 2, 1, 0]);

        let two: Vec<usize> = log.recent(Some(2)).await.iter().map(|e| e.check_index).collect();
        assert_eq!(two, vec![4, 3]);

        assert_eq!(log.recent(Some(50)).await.len(), 5);
    }

    #[tokio::test]
    async fn test_zero_limit_returns_everything() {
        let log = EventLog::new();
        assert!(log.recent(Some(0)).await.is_empty());
        for i in 0..3 {
            log.record(event(i)).await;
        }

        let indexes: Vec<usize> = log.recent(Some(0)).await.iter().map(|e| e.check_index).collect();
        assert_eq!(indexes, vec![2, 1, 0]);
        assert_eq!(log.recent(Some(1)).await.len(), 1);
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let log = EventLog::new();
        for i in 0..DEFAULT_EVENT_CAPACITY + 3 {
            log.record(event(i)).await;
        }
        assert_eq!(log.len().await, DEFAULT_EVENT_CAPACITY);

        let events = log.recent(None).await;
        assert_eq!(events.first().unwrap().check_index, DEFAULT_EVENT_CAPACITY + 2);
        assert_eq!(events.last().unwrap().check_index, 3);
    }

    #[tokio::test]
    async fn test_small_capacity() {
        let log = EventLog::with_capacity(2);
        assert!(log.is_empty().await);
        for i in 0..3 {
            log.record(event(i)).await;
        }
        let indexes: Vec<usize> = log.recent(None).await.iter().map(|e| e.check_index).collect();
        assert_eq!(indexes, vec![2, 1]);
    }
}
