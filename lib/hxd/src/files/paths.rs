//! Second layer of path defense: joining validated wire segments onto the
//! file root and proving the result never leaves it.

use hotline::macroman;
use hotline::path::sanitize_name;
use std::fmt;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Eq, PartialEq)]
pub enum PathError {
    /// The joined path escaped the root after normalization.
    Escape,
    /// A name reduced to nothing after sanitization.
    EmptyName,
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PathError::Escape => write!(f, "path escapes the file root"),
            PathError::EmptyName => write!(f, "empty file name"),
        }
    }
}

/// Lexical normalization: strip `.` components, refuse `..`. Wire decoding
/// already rejects both, so hitting the refusal here means a bug upstream
/// or a hand-crafted segment; either way the caller gets an error, not an
/// escape.
fn normalize(path: &Path) -> Result<PathBuf, PathError> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => (),
            Component::ParentDir => return Err(PathError::Escape),
            other => out.push(other.as_os_str()),
        }
    }
    Ok(out)
}

/// Join decoded wire segments (and an optional leaf name from a `FileName`
/// field) onto `root`. Segment bytes are Mac-Roman on the wire and UTF-8 on
/// disk. The result is guaranteed to sit under `root`.
pub fn resolve(root: &Path, segments: &[Vec<u8>], leaf: Option<&[u8]>) -> Result<PathBuf, PathError> {
    let mut path = root.to_path_buf();

    for segment in segments {
        path.push(macroman::to_utf8(segment));
    }

    if let Some(leaf) = leaf {
        let clean = sanitize_name(leaf);
        if clean.is_empty() {
            return Err(PathError::EmptyName);
        }
        path.push(macroman::to_utf8(&clean));
    }

    let normalized = normalize(&path)?;
    if !normalized.starts_with(root) {
        return Err(PathError::Escape);
    }
    Ok(normalized)
}

/// On-disk name back to wire bytes.
pub fn wire_name(path: &Path) -> Vec<u8> {
    path.file_name()
        .map(|name| macroman::from_utf8(&name.to_string_lossy()))
        .unwrap_or_default()
}
