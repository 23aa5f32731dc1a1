use std::collections::VecDeque;

use parking_lot::Mutex;

pub type Task = Box<dyn FnOnce() + Send>;

/// Posts work to run on a later turn of the host's run loop.
pub trait Scheduler: Send + Sync {
    fn post(&self, task: Task);
}

/// FIFO run queue driven explicitly by the owner of the run loop.
#[derive(Default)]
pub struct TaskQueue {
    tasks: Mutex<VecDeque<Task>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }

    /// Runs one tick: only the tasks queued before this call. Tasks posted
    /// while the tick runs wait for the next one.
    pub fn run_pending(&self) -> usize {
        let batch = std::mem::take(&mut *self.tasks.lock());
        let count = batch.len();
        for task in batch {
            task();
        }
        count
    }

    pub fn run_until_idle(&self) -> usize {
        let mut total = 0;
        loop {
            let ran = self.run_pending();
            if ran == 0 {
                return total;
            }
            total += ran;
        }
    }
}

impl Scheduler for TaskQueue {
    fn post(&self, task: Task) {
        self.tasks.lock().push_back(task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn tasks_posted_during_a_tick_run_on_the_next() {
        let queue = Arc::new(TaskQueue::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        let (inner_queue, inner_log) = (queue.clone(), log.clone());
        queue.post(Box::new(move || {
            inner_log.lock().push("first");
            let nested_log = inner_log.clone();
            inner_queue.post(Box::new(move || nested_log.lock().push("nested")));
        }));

        assert_eq!(queue.run_pending(), 1);
        assert_eq!(*log.lock(), vec!["first"]);
        assert_eq!(queue.len(), 1);

        assert_eq!(queue.run_until_idle(), 1);
        assert_eq!(*log.lock(), vec!["first", "nested"]);
        assert!(queue.is_empty());
    }
}
