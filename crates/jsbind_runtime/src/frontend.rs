//! Engine backend seam and the tagged bytecode blob format.

use jsbind_core::Value;

use crate::config::EngineKind;
use crate::context::Context;
use crate::errors::{JsResult, messages};
use crate::ErrorKind;

pub const BYTECODE_HEADER_LEN: usize = 4;

/// Turns module source or precompiled bytecode into a callable module body.
///
/// The returned function is invoked with `this = exports` and the arguments
/// `(exports, require, module, filename, dirname)`.
pub trait Frontend {
    fn kind(&self) -> EngineKind;

    fn compile_module(&self, ctx: &mut Context, filename: &str, source: &str) -> JsResult<Value>;

    /// Tag written in front of bytecode blobs; `None` disables the bytecode cache.
    fn bytecode_tag(&self) -> Option<u32> {
        None
    }

    fn load_bytecode(&self, ctx: &mut Context, filename: &str, payload: &[u8]) -> JsResult<Value> {
        let _ = payload;
        Err(ctx.throw_error(
            ErrorKind::InternalError,
            &format!("{filename}: {}", messages::BYTECODE_UNSUPPORTED),
        ))
    }
}

pub fn encode_bytecode(tag: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(BYTECODE_HEADER_LEN + payload.len());
    out.extend_from_slice(&tag.to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// Payload of `blob` when its little-endian tag matches `expected`.
pub fn decode_bytecode(blob: &[u8], expected: u32) -> Option<&[u8]> {
    if blob.len() < BYTECODE_HEADER_LEN {
        return None;
    }
    let (head, payload) = blob.split_at(BYTECODE_HEADER_LEN);
    let tag = u32::from_le_bytes([head[0], head[1], head[2], head[3]]);
    if tag != expected {
        return None;
    }
    Some(payload)
}
