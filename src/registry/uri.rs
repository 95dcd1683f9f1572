//! URI codec for the `gitjfs` scheme.
//!
//! ```text
//! gitjfs://FILE<absolute-dir>/          on-disk instance
//! gitjfs://DFS/<name>                   in-memory instance
//! …?root=<token>&internal-path=<path>   a path within an instance
//! ```
//!
//! Query values percent-escape `& = ? %` and leave `/` literal; a DFS name
//! is escaped the same way, so slashes in it read as path segments.

use std::path::{Path, PathBuf};

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

use crate::error::{GitFsError, Result};

pub(crate) const SCHEME_PREFIX: &str = "gitjfs://";
pub(crate) const FILE_AUTHORITY: &str = "FILE";
pub(crate) const DFS_AUTHORITY: &str = "DFS";

/// Characters escaped in query values and DFS names; `/` stays literal.
const URI_ESCAPE: &AsciiSet = &CONTROLS.add(b'&').add(b'=').add(b'?').add(b'%');

/// The authority part of a `gitjfs` URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Authority {
    File,
    Dfs,
}

/// A parsed `gitjfs` URI.
pub(crate) struct ParsedUri {
    pub authority: Authority,
    /// The raw path part, starting with `/`, query excluded.
    pub path: String,
    /// Decoded query parameters, in order.
    pub query: Vec<(String, String)>,
}

impl ParsedUri {
    /// The first value for a query parameter, if present.
    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// The URI of an on-disk instance; the directory path ends with `/`.
pub(crate) fn file_uri(dir: &Path) -> String {
    let mut path = dir.to_string_lossy().into_owned();
    if !path.ends_with('/') {
        path.push('/');
    }
    format!("{}{}{}", SCHEME_PREFIX, FILE_AUTHORITY, path)
}

/// The URI of an in-memory instance, by descriptive name.
pub(crate) fn dfs_uri(name: &str) -> String {
    format!(
        "{}{}/{}",
        SCHEME_PREFIX,
        DFS_AUTHORITY,
        utf8_percent_encode(name, URI_ESCAPE)
    )
}

/// Parse a `gitjfs` URI into authority, path and decoded query.
pub(crate) fn parse_uri(uri: &str) -> Result<ParsedUri> {
    let rest = uri
        .strip_prefix(SCHEME_PREFIX)
        .ok_or_else(|| invalid(uri, "expected the gitjfs:// scheme"))?;
    let slash = rest
        .find('/')
        .ok_or_else(|| invalid(uri, "expected a path after the authority"))?;
    let authority = match &rest[..slash] {
        FILE_AUTHORITY => Authority::File,
        DFS_AUTHORITY => Authority::Dfs,
        other => {
            return Err(invalid(
                uri,
                format!("unknown authority {:?}, expected FILE or DFS", other),
            ))
        }
    };
    let path_and_query = &rest[slash..];
    let (path, query_str) = match path_and_query.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (path_and_query, None),
    };

    let mut query = Vec::new();
    if let Some(query_str) = query_str {
        for pair in query_str.split('&') {
            if pair.is_empty() {
                continue;
            }
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| invalid(uri, format!("malformed query pair {:?}", pair)))?;
            query.push((decode(uri, key)?, decode(uri, value)?));
        }
    }

    Ok(ParsedUri {
        authority,
        path: path.to_string(),
        query,
    })
}

/// The on-disk directory a FILE URI designates.
pub(crate) fn file_uri_dir(uri: &ParsedUri, original: &str) -> Result<PathBuf> {
    if uri.authority != Authority::File {
        return Err(invalid(original, "expected the FILE authority"));
    }
    if !uri.path.ends_with('/') {
        return Err(invalid(original, "directory path must end with /"));
    }
    let trimmed = if uri.path == "/" {
        uri.path.as_str()
    } else {
        uri.path.trim_end_matches('/')
    };
    Ok(PathBuf::from(trimmed))
}

/// The repository name a DFS URI designates.
pub(crate) fn dfs_uri_name(uri: &ParsedUri, original: &str) -> Result<String> {
    if uri.authority != Authority::Dfs {
        return Err(invalid(original, "expected the DFS authority"));
    }
    let name = uri
        .path
        .strip_prefix('/')
        .ok_or_else(|| invalid(original, "expected a name after the authority"))?;
    decode(original, name)
}

fn decode(uri: &str, value: &str) -> Result<String> {
    percent_decode_str(value)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| invalid(uri, "percent-escaped value is not UTF-8"))
}

fn invalid(uri: &str, reason: impl std::fmt::Display) -> GitFsError {
    GitFsError::InvalidPath {
        reason: format!("{}: {}", uri, reason),
    }
}
