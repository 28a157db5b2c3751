//! Slash-separated module path helpers.

/// Collapses `.` and `..` segments and duplicate separators. Leading `..`
/// segments of a relative path are kept.
pub fn normalize(path: &str) -> String {
    let path = path.replace('\\', "/");
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|last| *last != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            s => parts.push(s),
        }
    }
    let joined = parts.join("/");
    if absolute { format!("/{joined}") } else { joined }
}

/// Directory part of `path`; empty for a bare file name.
pub fn dirname(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(i) => &path[..i],
        None => "",
    }
}

pub fn is_relative(id: &str) -> bool {
    id == "." || id == ".." || id.starts_with("./") || id.starts_with("../")
}

/// Joins a relative `requested` id onto the directory of `parent_file`;
/// other ids are only normalized.
pub fn resolve_module_id(parent_file: Option<&str>, requested: &str) -> String {
    match parent_file {
        Some(parent) if is_relative(requested) => {
            let dir = dirname(parent);
            if dir.is_empty() {
                normalize(requested)
            } else {
                normalize(&format!("{dir}/{requested}"))
            }
        }
        _ => normalize(requested),
    }
}

pub fn extension(path: &str) -> Option<&str> {
    let file = &path[path.rfind('/').map_or(0, |i| i + 1)..];
    let dot = file.rfind('.')?;
    if dot == 0 { None } else { Some(&file[dot + 1..]) }
}
