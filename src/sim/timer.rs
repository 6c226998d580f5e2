//! Deferred callbacks on a monotonic simulation clock
//!
//! Every delayed step of the turn flow ("retry in 0.2s", "decide after the
//! agent turn settles in") is a task queued here with a cancel handle. Tasks
//! come back from [`Scheduler::advance`] in due order; ties keep insertion
//! order so runs are reproducible.

/// Handle returned by [`Scheduler::schedule`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

#[derive(Debug, Clone)]
struct Scheduled<T> {
    id: u64,
    due: f64,
    task: T,
}

/// Single-threaded timer queue
#[derive(Debug, Clone)]
pub struct Scheduler<T> {
    now: f64,
    next_id: u64,
    pending: Vec<Scheduled<T>>,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Self {
            now: 0.0,
            next_id: 0,
            pending: Vec::new(),
        }
    }

    /// Current clock in seconds
    pub fn now(&self) -> f64 {
        self.now
    }

    /// Queue `task` to run `delay` seconds from now (negative delays run on the next advance)
    pub fn schedule(&mut self, delay: f32, task: T) -> TimerHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.pending.push(Scheduled {
            id,
            due: self.now + f64::from(delay.max(0.0)),
            task,
        });
        TimerHandle(id)
    }

    /// Returns true if the task was still pending
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        let before = self.pending.len();
        self.pending.retain(|s| s.id != handle.0);
        self.pending.len() != before
    }

    /// Cancel every pending task matching `pred`, returning how many were dropped
    pub fn cancel_where(&mut self, mut pred: impl FnMut(&T) -> bool) -> usize {
        let before = self.pending.len();
        self.pending.retain(|s| !pred(&s.task));
        before - self.pending.len()
    }

    pub fn is_pending(&self, handle: TimerHandle) -> bool {
        self.pending.iter().any(|s| s.id == handle.0)
    }

    pub fn any_pending(&self, mut pred: impl FnMut(&T) -> bool) -> bool {
        self.pending.iter().any(|s| pred(&s.task))
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Advance the clock and hand back every task that came due
    pub fn advance(&mut self, dt: f32) -> Vec<T> {
        self.now += f64::from(dt.max(0.0));
        // Absorb accumulated float error from summing fixed steps
        let horizon = self.now + 1e-9;

        let mut due = Vec::new();
        let mut i = 0;
        while i < self.pending.len() {
            if self.pending[i].due <= horizon {
                due.push(self.pending.swap_remove(i));
            } else {
                i += 1;
            }
        }
        due.sort_by(|a, b| a.due.total_cmp(&b.due).then(a.id.cmp(&b.id)));
        due.into_iter().map(|s| s.task).collect()
    }
}

impl<T: PartialEq> Scheduler<T> {
    /// Replace any pending copy of `task` with a fresh one
    pub fn schedule_unique(&mut self, delay: f32, task: T) -> TimerHandle {
        self.pending.retain(|s| s.task != task);
        self.schedule(delay, task)
    }
}
