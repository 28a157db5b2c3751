//! Host capability traits for dependency injection.

use std::sync::OnceLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

pub trait Clock {
    fn unix_millis(&self) -> u64;
    fn mono_millis(&self) -> u64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn unix_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    fn mono_millis(&self) -> u64 {
        static START: OnceLock<Instant> = OnceLock::new();
        let start = START.get_or_init(Instant::now);
        start.elapsed().as_millis() as u64
    }
}

/// Pluggable file access used by module resolution.
pub trait FileSystem {
    fn exists(&self, path: &str) -> bool;
    fn get_full_path(&self, path: &str) -> Option<String>;
    fn read_all_bytes(&self, path: &str) -> Result<Vec<u8>, String>;
}

pub struct StdFileSystem;

impl FileSystem for StdFileSystem {
    fn exists(&self, path: &str) -> bool {
        std::fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
    }

    fn get_full_path(&self, path: &str) -> Option<String> {
        let canonical = std::fs::canonicalize(path).ok()?;
        Some(canonical.to_string_lossy().replace('\\', "/"))
    }

    fn read_all_bytes(&self, path: &str) -> Result<Vec<u8>, String> {
        std::fs::read(path).map_err(|e| format!("{path}: {e}"))
    }
}

/// Maps a file name onto the first search path that contains it.
pub trait PathResolver {
    fn search_paths(&self) -> &[String];
    fn add_search_path(&mut self, path: &str);
    fn resolve_path(&self, fs: &dyn FileSystem, file_name: &str) -> Option<String>;
}

#[derive(Clone, Debug, Default)]
pub struct SearchPathResolver {
    paths: Vec<String>,
}

impl SearchPathResolver {
    pub fn new(paths: impl IntoIterator<Item = String>) -> Self {
        let mut r = Self::default();
        for p in paths {
            r.add_search_path(&p);
        }
        r
    }
}

impl PathResolver for SearchPathResolver {
    fn search_paths(&self) -> &[String] {
        &self.paths
    }

    fn add_search_path(&mut self, path: &str) {
        let path = path.replace('\\', "/");
        let path = path.trim_end_matches('/');
        if !self.paths.iter().any(|p| p == path) {
            self.paths.push(path.to_string());
        }
    }

    fn resolve_path(&self, fs: &dyn FileSystem, file_name: &str) -> Option<String> {
        if fs.exists(file_name) {
            return Some(file_name.to_string());
        }
        for base in &self.paths {
            let candidate = if base.is_empty() {
                file_name.to_string()
            } else {
                format!("{base}/{file_name}")
            };
            if fs.exists(&candidate) {
                return Some(candidate);
            }
        }
        None
    }
}

pub struct Capabilities {
    pub clock: Box<dyn Clock>,
    pub fs: Box<dyn FileSystem>,
    pub path_resolver: Box<dyn PathResolver>,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            clock: Box::new(SystemClock),
            fs: Box::new(StdFileSystem),
            path_resolver: Box::new(SearchPathResolver::default()),
        }
    }
}
