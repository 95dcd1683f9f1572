//! Revision tokens: the root component of an absolute logical path.

use std::fmt;

use crate::error::GitFsError;
use crate::repository::ObjectId;

/// The ref substituted when a relative path is made absolute.
pub const DEFAULT_REF: &str = "refs/heads/main";

/// A revision token: either a commit id or a direct ref name.
///
/// The string form is the content surrounded by slashes, e.g.
/// `/refs/heads/main/` or `/<40 hex digits>/`; [`fmt::Display`] renders the
/// content without the surrounding slashes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GitRev {
    /// A commit named directly by its id.
    CommitId(ObjectId),
    /// A commit named indirectly by a ref under `refs/`.
    Ref(String),
}

impl GitRev {
    /// The default token, [`DEFAULT_REF`].
    pub fn default_ref() -> Self {
        GitRev::Ref(DEFAULT_REF.to_string())
    }

    /// A token naming a commit directly.
    pub fn commit(id: ObjectId) -> Self {
        GitRev::CommitId(id)
    }

    /// A token naming a ref; the name is validated.
    pub fn short_ref(name: &str) -> Result<Self, GitFsError> {
        Self::validate_ref_name(name)?;
        Ok(GitRev::Ref(name.to_string()))
    }

    /// Check that a name is a valid direct ref: it starts with `refs/`, is
    /// nonempty beyond the prefix, contains no `//` or `\`, and does not end
    /// with `/`.
    pub fn validate_ref_name(name: &str) -> Result<(), GitFsError> {
        let rest = name
            .strip_prefix("refs/")
            .ok_or_else(|| invalid(name, "must start with refs/"))?;
        if rest.is_empty() {
            return Err(invalid(name, "must name something under refs/"));
        }
        if name.contains("//") {
            return Err(invalid(name, "must not contain //"));
        }
        if name.contains('\\') {
            return Err(invalid(name, "must not contain a backslash"));
        }
        if name.ends_with('/') {
            return Err(invalid(name, "must not end with /"));
        }
        Ok(())
    }

    /// Parse the string form: a slash, the content, a slash.
    pub fn from_string_form(s: &str) -> Result<Self, GitFsError> {
        let inner = s
            .strip_prefix('/')
            .and_then(|rest| rest.strip_suffix('/'))
            .ok_or_else(|| invalid(s, "root component must be surrounded by slashes"))?;
        Self::parse_token(inner)
    }

    /// Parse the bare content: 40 lowercase hex digits, or a ref name.
    pub fn parse_token(token: &str) -> Result<Self, GitFsError> {
        if token.len() == 40 && token.bytes().all(|b| b.is_ascii_hexdigit()) {
            let id = token
                .parse()
                .map_err(|e| invalid(token, format!("not a commit id: {}", e)))?;
            return Ok(GitRev::CommitId(id));
        }
        Self::validate_ref_name(token)?;
        Ok(GitRev::Ref(token.to_string()))
    }

    /// The string form: the content surrounded by slashes.
    pub fn string_form(&self) -> String {
        format!("/{}/", self)
    }

    /// Whether this token is a ref.
    pub fn is_ref(&self) -> bool {
        matches!(self, GitRev::Ref(_))
    }

    /// Whether this token is a commit id.
    pub fn is_commit_id(&self) -> bool {
        matches!(self, GitRev::CommitId(_))
    }

    /// The ref name, if this token is a ref.
    pub fn ref_name(&self) -> Option<&str> {
        match self {
            GitRev::Ref(name) => Some(name),
            GitRev::CommitId(_) => None,
        }
    }

    /// The commit id, if this token names a commit directly.
    pub fn commit_id(&self) -> Option<ObjectId> {
        match self {
            GitRev::CommitId(id) => Some(*id),
            GitRev::Ref(_) => None,
        }
    }
}

impl fmt::Display for GitRev {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GitRev::CommitId(id) => write!(f, "{}", id),
            GitRev::Ref(name) => f.write_str(name),
        }
    }
}

fn invalid(input: impl fmt::Display, reason: impl fmt::Display) -> GitFsError {
    GitFsError::InvalidPath {
        reason: format!("{}: {}", input, reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ZERO_HEX: &str = "0000000000000000000000000000000000000000";

    #[test]
    fn test_parse_commit_id_string_form() {
        let rev = GitRev::from_string_form(&format!("/{}/", ZERO_HEX)).unwrap();
        assert!(rev.is_commit_id());
        assert_eq!(rev.to_string(), ZERO_HEX);
        assert_eq!(rev.string_form(), format!("/{}/", ZERO_HEX));
    }

    #[test]
    fn test_parse_ref_string_form() {
        let rev = GitRev::from_string_form("/refs/heads/main/").unwrap();
        assert!(rev.is_ref());
        assert_eq!(rev.ref_name(), Some("refs/heads/main"));
        assert_eq!(rev.to_string(), "refs/heads/main");
        assert_eq!(rev.string_form(), "/refs/heads/main/");
    }

    #[test]
    fn test_rejects_malformed_roots() {
        for input in [
            "refs/heads/main",        // no surrounding slashes
            "/refs/heads/main",       // missing trailing slash
            "/refs//",                // empty beyond prefix would need //
            "/refs/heads//main/",     // double slash
            "/refs/heads\\main/",     // backslash
            "/refs/heads/main//",     // content ends with /
            "/heads/main/",           // not under refs/
            "/0123/",                 // too-short hex
            "/",                      // nothing
        ] {
            assert!(
                GitRev::from_string_form(input).is_err(),
                "{} should be rejected",
                input
            );
        }
    }

    #[test]
    fn test_uppercase_hex_is_tried_as_ref_and_rejected() {
        let upper = "0000000000000000000000000000000000000ABC";
        assert!(GitRev::from_string_form(&format!("/{}/", upper)).is_err());
    }

    #[test]
    fn test_default_ref() {
        let rev = GitRev::default_ref();
        assert_eq!(rev.ref_name(), Some("refs/heads/main"));
    }

    #[test]
    fn test_parse_token_roundtrip() {
        for content in [ZERO_HEX, "refs/heads/main", "refs/tags/v1.0"] {
            let rev = GitRev::parse_token(content).unwrap();
            assert_eq!(rev.to_string(), content);
        }
    }
}
