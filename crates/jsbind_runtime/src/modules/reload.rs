//! Batch reload: `begin_reload`, `mark_reload`, `end_reload`.
//!
//! A reload reruns the module through its resolver against the same record
//! and the same `module` object. The body fills a staging exports object;
//! on success its keys replace those of the live exports, so anything that
//! captured `module.exports` before the reload observes the new values even
//! when the body reassigns `module.exports`. A failed run leaves the live
//! exports as they were. The first run's side effects are not undone;
//! modules that register timers or listeners clean them up from their own
//! `OnBeforeScriptReload` hooks.

use indexmap::IndexSet;
use jsbind_core::Value;

use super::cache::{ModuleIndex, ModuleState};
use super::path;
use crate::context::Context;
use crate::errors::{JsError, JsResult};
use crate::object::PropFlags;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReloadReport {
    pub reloaded: Vec<String>,
    pub failed: Vec<(String, JsError)>,
}

impl ReloadReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Default)]
pub(crate) struct ReloadBatch {
    worklist: IndexSet<ModuleIndex>,
    pub(crate) draining: bool,
    report: ReloadReport,
}

impl Context {
    /// Enters batch-reload mode. Returns `false` if a batch is already open.
    pub fn begin_reload(&mut self) -> bool {
        if self.modules.reload.is_some() {
            return false;
        }
        self.modules.reload = Some(ReloadBatch::default());
        log::debug!("{}: reload batch opened", self.id());
        true
    }

    pub fn is_reloading(&self) -> bool {
        self.modules.reload.is_some()
    }

    /// Queues a cached module for reload. Returns `false` outside a batch,
    /// for unknown ids and for ids already queued.
    pub fn mark_reload(&mut self, id: &str) -> bool {
        let Some(idx) = self
            .modules
            .lookup(id)
            .or_else(|| self.modules.lookup(&path::normalize(id)))
        else {
            log::warn!("{}: cannot mark unknown module '{id}' for reload", self.id());
            return false;
        };
        let Some(batch) = self.modules.reload.as_mut() else {
            return false;
        };
        if !batch.worklist.insert(idx) {
            return false;
        }
        if let Some(record) = self.modules.get_mut(idx) {
            if record.state == ModuleState::Loaded {
                record.state = ModuleState::ReloadPending;
            }
        }
        true
    }

    /// Drains the worklist in mark order and closes the batch. A module that
    /// fails is logged and skipped; the rest still reload.
    pub fn end_reload(&mut self) -> ReloadReport {
        let Some(batch) = self.modules.reload.as_mut() else {
            return ReloadReport::default();
        };
        batch.draining = true;
        loop {
            let next = self
                .modules
                .reload
                .as_mut()
                .and_then(|b| b.worklist.shift_remove_index(0));
            let Some(idx) = next else {
                break;
            };
            let pending = self
                .modules
                .get(idx)
                .is_some_and(|r| r.state == ModuleState::ReloadPending);
            if pending {
                self.reload_module(idx);
            }
        }
        let report = self
            .modules
            .reload
            .take()
            .map(|b| b.report)
            .unwrap_or_default();
        log::debug!(
            "{}: reload batch closed ({} reloaded, {} failed)",
            self.id(),
            report.reloaded.len(),
            report.failed.len()
        );
        report
    }

    /// Reruns one module and records the outcome in the open batch. The body
    /// runs against a fresh staging `exports`; only a successful run is
    /// copied onto the live exports object, so a failure leaves it untouched.
    pub(crate) fn reload_module(&mut self, idx: ModuleIndex) {
        let Some(record) = self.modules.get_mut(idx) else {
            return;
        };
        record.state = ModuleState::Loading;
        let id = record.id.clone();
        let resolver = record.resolver.clone();
        let module_obj = record.module_obj;
        self.put_own(module_obj, self.names.loaded, Value::FALSE, PropFlags::C_W_E);

        let result = self.module_exports(idx).and_then(|live| {
            let staging = self.new_object();
            let r = self
                .set_module_exports(idx, staging)
                .and_then(|()| resolver.reload(self, idx))
                .and_then(|()| self.commit_reload(idx, live));
            if r.is_err() {
                let restored = self.dup_value(live);
                self.put_own(module_obj, self.names.exports, restored, PropFlags::C_W_E);
            }
            self.free_value(live);
            r
        });
        self.finish_load(idx);
        let outcome = match result {
            Ok(()) => {
                log::debug!("{}: module '{id}' reloaded", self.id());
                Ok(())
            }
            Err(_) => {
                let e = self.take_js_error().unwrap_or_else(|| JsError {
                    name: "Error".to_string(),
                    message: "reload failed without an exception".to_string(),
                    stack: String::new(),
                });
                log::error!("{}: reload of '{id}' failed: {e}", self.id());
                Err(e)
            }
        };
        if let Some(batch) = self.modules.reload.as_mut() {
            match outcome {
                Ok(()) => batch.report.reloaded.push(id),
                Err(e) => batch.report.failed.push((id, e)),
            }
        }
    }

    /// Moves the staged exports onto `live` (borrowed) and points
    /// `module.exports` back at it. Exports that are not plain objects on
    /// either side replace the old value outright.
    fn commit_reload(&mut self, idx: ModuleIndex, live: Value) -> JsResult<()> {
        let staged = self.module_exports(idx)?;
        if staged == live || !self.is_plain_object(live) || !self.is_plain_object(staged) {
            self.free_value(staged);
            return Ok(());
        }
        let r = self.replace_object_contents(live, staged);
        self.free_value(staged);
        r?;
        if let Some(module_obj) = self.modules.get(idx).map(|r| r.module_obj) {
            let live = self.dup_value(live);
            self.put_own(module_obj, self.names.exports, live, PropFlags::C_W_E);
        }
        Ok(())
    }

    fn is_plain_object(&self, v: Value) -> bool {
        v.is_object() && !self.is_array(v) && !self.is_function(v)
    }
}
