//! Scoped value guard.

use std::ops::{Deref, DerefMut};

use jsbind_core::Value;
use smallvec::SmallVec;

use crate::context::Context;

/// Frees every value handed to `hold` when the scope ends, on every exit
/// path including `?` early returns.
pub struct Scope<'a> {
    ctx: &'a mut Context,
    held: SmallVec<[Value; 8]>,
}

impl<'a> Scope<'a> {
    pub(crate) fn new(ctx: &'a mut Context) -> Self {
        Self {
            ctx,
            held: SmallVec::new(),
        }
    }

    /// Registers `v` for release at scope end and returns it for borrowing.
    pub fn hold(&mut self, v: Value) -> Value {
        if v.has_ref_count() {
            self.held.push(v);
        }
        v
    }

    /// Moves `v` out of the scope; the caller owns it again.
    pub fn release(&mut self, v: Value) -> Value {
        if let Some(pos) = self.held.iter().rposition(|h| *h == v) {
            self.held.remove(pos);
        }
        v
    }

    pub fn held_count(&self) -> usize {
        self.held.len()
    }
}

impl Deref for Scope<'_> {
    type Target = Context;

    fn deref(&self) -> &Context {
        self.ctx
    }
}

impl DerefMut for Scope<'_> {
    fn deref_mut(&mut self) -> &mut Context {
        self.ctx
    }
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        while let Some(v) = self.held.pop() {
            self.ctx.free_value(v);
        }
    }
}
