//! Deferred job queue.
//!
//! The only structure here that may be touched from more than one thread:
//! producers anywhere enqueue through a `JobSender`, the script thread drains
//! with `Context::execute_pending_jobs`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::context::Context;
use crate::errors::JsResult;

pub type JobFn = Box<dyn FnOnce(&mut Context) -> JsResult<()> + Send>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u64);

struct Job {
    id: JobId,
    run: JobFn,
}

struct JobShared {
    queue: Mutex<VecDeque<Job>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

/// Cloneable, `Send + Sync` handle for feeding work to one context.
#[derive(Clone)]
pub struct JobSender {
    shared: Arc<JobShared>,
}

impl JobSender {
    /// Queues `job`; `None` once the owning context is destroyed.
    pub fn enqueue(
        &self,
        job: impl FnOnce(&mut Context) -> JsResult<()> + Send + 'static,
    ) -> Option<JobId> {
        if self.shared.closed.load(Ordering::Acquire) {
            return None;
        }
        let id = JobId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        self.shared.queue.lock().push_back(Job {
            id,
            run: Box::new(job),
        });
        Some(id)
    }

    /// Removes a job that has not been dequeued yet.
    pub fn cancel(&self, id: JobId) -> bool {
        let mut queue = self.shared.queue.lock();
        match queue.iter().position(|j| j.id == id) {
            Some(pos) => queue.remove(pos).is_some(),
            None => false,
        }
    }

    pub fn pending(&self) -> usize {
        self.shared.queue.lock().len()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

pub(crate) struct JobQueue {
    shared: Arc<JobShared>,
}

impl JobQueue {
    pub(crate) fn new() -> Self {
        Self {
            shared: Arc::new(JobShared {
                queue: Mutex::new(VecDeque::new()),
                next_id: AtomicU64::new(1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub(crate) fn sender(&self) -> JobSender {
        JobSender {
            shared: self.shared.clone(),
        }
    }

    fn take_batch(&self) -> VecDeque<Job> {
        std::mem::take(&mut *self.shared.queue.lock())
    }

    /// Closes the queue and drops whatever was still pending.
    pub(crate) fn clear(&self) -> usize {
        self.shared.closed.store(true, Ordering::Release);
        self.take_batch().len()
    }
}

/// Outcome of one pump step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PumpStats {
    pub jobs_run: usize,
    pub jobs_failed: usize,
    pub timers_fired: usize,
    pub timers_failed: usize,
}

impl Context {
    pub fn enqueue_job(
        &mut self,
        job: impl FnOnce(&mut Context) -> JsResult<()> + Send + 'static,
    ) -> Option<JobId> {
        self.jobs.sender().enqueue(job)
    }

    /// Runs, in FIFO order, the jobs queued when the call started. Jobs
    /// queued by those jobs wait for the next pump.
    pub fn execute_pending_jobs(&mut self) -> PumpStats {
        let mut stats = PumpStats::default();
        for job in self.jobs.take_batch() {
            stats.jobs_run += 1;
            if let Err(t) = (job.run)(self) {
                stats.jobs_failed += 1;
                let e = self.catch(t);
                log::error!("{}: job {} failed: {e}", self.id(), job.id.0);
            }
        }
        stats
    }
}
