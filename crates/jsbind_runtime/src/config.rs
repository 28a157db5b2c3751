//! Runtime configuration.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::errors::BridgeError;

/// Which engine backend the host asked for.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    #[default]
    QuickJs,
    ClearScript,
    Custom(String),
}

bitflags! {
    /// Host polyfills the backend already provides natively.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct EngineCapabilities: u32 {
        const FETCH = 1 << 0;
        const WEB_SOCKET = 1 << 1;
        const CONSOLE = 1 << 2;
        const URL = 1 << 3;
        const ENCODING = 1 << 4;
        const TIMERS = 1 << 5;
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub engine: EngineKind,
    pub debug_server: bool,
    pub await_debugger: bool,
    pub debug_port: u16,
    pub skip_polyfills: EngineCapabilities,
    /// Look for `<file>.bc` bytecode blobs next to module sources.
    pub bytecode_cache: bool,
    pub search_paths: Vec<String>,
    pub max_call_depth: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            engine: EngineKind::QuickJs,
            debug_server: false,
            await_debugger: false,
            debug_port: 9229,
            skip_polyfills: EngineCapabilities::empty(),
            bytecode_cache: true,
            search_paths: Vec::new(),
            max_call_depth: 512,
        }
    }
}

impl RuntimeConfig {
    pub fn from_json(text: &str) -> Result<Self, BridgeError> {
        serde_json::from_str(text).map_err(|e| BridgeError::Config(e.to_string()))
    }

    pub fn provides(&self, cap: EngineCapabilities) -> bool {
        self.skip_polyfills.contains(cap)
    }
}
