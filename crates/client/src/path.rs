//! Remote path normalization.
//!
//! Remote paths are always `/`-separated and rooted at the File Browser
//! scope, whatever the local platform is.

use std::path::Path;

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};

use crate::ClientError;

/// Characters escaped inside a single URL path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Lexically cleans a remote path.
///
/// Collapses duplicate slashes, drops `.` segments and resolves `..`
/// against the preceding segment. `..` never climbs above the root.
/// The result always starts with `/` and never ends with one (except `/`).
pub fn clean_remote_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    format!("/{}", segments.join("/"))
}

/// Joins a destination directory and a file name into one clean remote path.
pub fn join_remote_path(directory: &str, file_name: &str) -> String {
    clean_remote_path(&format!("{directory}/{file_name}"))
}

/// Remote file name for a local item: its final path component.
pub fn remote_file_name(local_path: &Path) -> Result<String, ClientError> {
    let name = local_path.file_name().ok_or_else(|| {
        ClientError::InvalidPath(format!("{} has no file name", local_path.display()))
    })?;
    name.to_str().map(str::to_owned).ok_or_else(|| {
        ClientError::InvalidPath(format!("{} is not valid UTF-8", local_path.display()))
    })
}

/// Cleans `path` and percent-encodes each segment for use in a URL.
pub(crate) fn encode_remote_path(path: &str) -> String {
    let cleaned = clean_remote_path(path);
    cleaned
        .split('/')
        .map(|segment| utf8_percent_encode(segment, SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}
