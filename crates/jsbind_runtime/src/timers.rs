//! Timer tasks drained by the host tick.

use indexmap::IndexMap;
use jsbind_core::Value;

use crate::context::Context;
use crate::jobs::PumpStats;

struct Timer {
    due: u64,
    interval: Option<u64>,
    callback: Value,
}

pub(crate) struct TimerManager {
    timers: IndexMap<u32, Timer>,
    next_id: u32,
}

fn clamp_delay(delay_ms: f64) -> u64 {
    if delay_ms.is_nan() || delay_ms <= 0.0 {
        0
    } else if delay_ms >= u32::MAX as f64 {
        u32::MAX as u64
    } else {
        delay_ms as u64
    }
}

impl TimerManager {
    pub(crate) fn new() -> Self {
        Self {
            timers: IndexMap::new(),
            next_id: 1,
        }
    }

    /// Next id not held by a live timer. Ids wrap and skip 0.
    fn allocate_id(&mut self) -> u32 {
        loop {
            let id = self.next_id;
            self.next_id = self.next_id.wrapping_add(1).max(1);
            if !self.timers.contains_key(&id) {
                return id;
            }
        }
    }

    /// Takes ownership of `callback`.
    fn schedule(&mut self, now: u64, delay: u64, repeat: bool, callback: Value) -> u32 {
        let id = self.allocate_id();
        self.timers.insert(
            id,
            Timer {
                due: now.saturating_add(delay),
                interval: repeat.then_some(delay),
                callback,
            },
        );
        id
    }

    fn cancel(&mut self, id: u32) -> Option<Value> {
        self.timers.shift_remove(&id).map(|t| t.callback)
    }

    /// Ids due at `now`, ordered by `(due, id)`.
    fn due_ids(&self, now: u64) -> Vec<u32> {
        let mut due: Vec<(u64, u32)> = self
            .timers
            .iter()
            .filter(|(_, t)| t.due <= now)
            .map(|(id, t)| (t.due, *id))
            .collect();
        due.sort_unstable();
        due.into_iter().map(|(_, id)| id).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.timers.len()
    }

    pub(crate) fn clear(&mut self) -> Vec<Value> {
        self.timers.drain(..).map(|(_, t)| t.callback).collect()
    }
}

impl Context {
    fn schedule_timer(&mut self, callback: Value, delay_ms: f64, repeat: bool) -> u32 {
        let now = self.clock().mono_millis();
        let callback = self.dup_value(callback);
        self.timers.schedule(now, clamp_delay(delay_ms), repeat, callback)
    }

    /// Borrows `callback`. Returns the timer id.
    pub fn set_timeout(&mut self, callback: Value, delay_ms: f64) -> u32 {
        self.schedule_timer(callback, delay_ms, false)
    }

    pub fn set_interval(&mut self, callback: Value, delay_ms: f64) -> u32 {
        self.schedule_timer(callback, delay_ms, true)
    }

    pub fn clear_timer(&mut self, id: u32) -> bool {
        match self.timers.cancel(id) {
            Some(cb) => {
                self.free_value(cb);
                true
            }
            None => false,
        }
    }

    /// Sets the id the next timer starts probing from. Hosts that rebuild a
    /// context and keep script-visible timer ids use it to stay clear of the
    /// old range; ids still in use are skipped.
    pub fn set_next_timer_id(&mut self, id: u32) {
        self.timers.next_id = id.max(1);
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// One host frame: drain the job queue, then fire timers due at `now_ms`.
    pub fn tick(&mut self, now_ms: u64) -> PumpStats {
        let mut stats = self.execute_pending_jobs();
        for id in self.timers.due_ids(now_ms) {
            // An earlier callback in this tick may have cleared it.
            let Some(timer) = self.timers.timers.get_mut(&id) else {
                continue;
            };
            let callback = match timer.interval {
                Some(interval) => {
                    timer.due = timer.due.saturating_add(interval.max(1)).max(now_ms.saturating_add(1));
                    let cb = timer.callback;
                    self.dup_value(cb)
                }
                None => match self.timers.cancel(id) {
                    Some(cb) => cb,
                    None => continue,
                },
            };
            stats.timers_fired += 1;
            let global = self.global_object();
            match self.call(callback, global, &[]) {
                Ok(v) => self.free_value(v),
                Err(t) => {
                    stats.timers_failed += 1;
                    let e = self.catch(t);
                    log::error!("{}: timer {id} failed: {e}", self.id());
                }
            }
            self.free_value(callback);
        }
        stats
    }

    pub fn tick_now(&mut self) -> PumpStats {
        let now = self.clock().mono_millis();
        self.tick(now)
    }
}
