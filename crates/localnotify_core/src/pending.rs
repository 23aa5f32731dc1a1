use std::collections::VecDeque;

use tracing::warn;

use crate::config::OverflowPolicy;
use crate::notifications::NotificationInfo;

/// Notifications that arrived while no handler was installed, in arrival order.
#[derive(Debug, Default)]
pub(crate) struct PendingNotifications {
    entries: VecDeque<NotificationInfo>,
    capacity: Option<usize>,
    overflow: OverflowPolicy,
    dropped: u64,
}

impl PendingNotifications {
    pub(crate) fn new(capacity: Option<usize>, overflow: OverflowPolicy) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
            overflow,
            dropped: 0,
        }
    }

    pub(crate) fn push(&mut self, info: NotificationInfo) {
        if let Some(capacity) = self.capacity {
            if self.entries.len() >= capacity {
                self.dropped += 1;
                match self.overflow {
                    OverflowPolicy::DropOldest => {
                        match self.entries.pop_front() {
                            Some(evicted) => warn!(
                                name = %evicted.name,
                                capacity,
                                "pending buffer full, dropping oldest"
                            ),
                            // zero capacity: nothing to evict, so nothing is kept
                            None => return,
                        }
                    }
                    OverflowPolicy::DropNewest => {
                        warn!(name = %info.name, capacity, "pending buffer full, dropping newest");
                        return;
                    }
                }
            }
        }
        self.entries.push_back(info);
    }

    pub(crate) fn drain(&mut self) -> Vec<NotificationInfo> {
        self.entries.drain(..).collect()
    }

    pub(crate) fn snapshot(&self) -> Vec<NotificationInfo> {
        self.entries.iter().cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.dropped
    }
}
