//! Resolved resource locations and archive-internal path arithmetic.

use std::path::{Path, PathBuf};

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use serde::Serialize;

/// Bytes escaped in the path part of a `file://` URI. `/` is kept as the
/// segment separator.
const URI_PATH: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Where a resource of an opened book can be found.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Location {
    /// A file materialized on disk by directory extraction.
    File(PathBuf),
    /// An entry of an in-memory extraction, named by its archive-internal path.
    Entry(String),
}

impl Location {
    /// The string form handed to a renderer: a `file://` URI for files on
    /// disk, the bare entry name for in-memory content.
    pub fn uri(&self) -> String {
        match self {
            Location::File(path) => file_uri(path),
            Location::Entry(name) => name.clone(),
        }
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Location::File(path) => Some(path),
            Location::Entry(_) => None,
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Location::File(path) => write!(f, "{}", path.display()),
            Location::Entry(name) => f.write_str(name),
        }
    }
}

/// Render an absolute path as a `file://` URI.
pub fn file_uri(path: &Path) -> String {
    let raw = path.to_string_lossy().replace('\\', "/");
    let mut uri = String::from("file://");
    if !raw.starts_with('/') {
        uri.push('/');
    }
    uri.extend(utf8_percent_encode(&raw, URI_PATH));
    uri
}

/// Drop everything from the last `#` on.
pub fn strip_fragment(uri: &str) -> &str {
    match uri.rfind('#') {
        Some(i) => &uri[..i],
        None => uri,
    }
}

/// Directory part of an archive-internal path, without a trailing slash.
/// Empty when the path sits at the archive root.
pub fn parent_prefix(path: &str) -> &str {
    path.rfind('/').map(|i| &path[..i]).unwrap_or("")
}

/// Join a package prefix and a (possibly percent-encoded) href into a
/// normalized archive-internal name.
///
/// `.` segments are dropped and `..` pops the previous segment. Returns
/// `None` when the href climbs above the archive root or resolves to nothing.
pub fn resolve_href(prefix: &str, href: &str) -> Option<String> {
    let decoded = percent_decode_str(href)
        .decode_utf8()
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| href.to_string());

    let mut segments: Vec<&str> = Vec::new();
    for segment in prefix.split('/').chain(decoded.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            s => segments.push(s),
        }
    }

    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}
