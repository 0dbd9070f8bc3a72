//! Route identifiers for extracted server functions.
//!
//! A route pathname is `"/_m/" + route_id + "/" + suffix` where `route_id` is the
//! module path relative to the project root joined with the call ordinal, either
//! verbatim (development) or digested (minified builds). Server and client builds
//! of the same call site derive the same pathname.

use sha2::{Digest, Sha256};

/// Prefix shared by server handlers and client fetchers.
pub const ROUTE_PREFIX: &str = "/_m";

/// Suffix used when no enclosing declaration names the call.
pub const FALLBACK_SUFFIX: &str = "fn";

/// Number of digest bytes kept in a hashed route id (10 hex characters).
pub const DIGEST_BYTES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteHasher {
    /// Readable `path/ordinal` ids.
    Identity,
    /// Short digests that don't leak file system layout.
    Digest,
}

impl RouteHasher {
    pub fn from_minify(minify: bool) -> Self {
        if minify {
            RouteHasher::Digest
        } else {
            RouteHasher::Identity
        }
    }

    pub fn route_id(self, relative_path: &str, ordinal: u32) -> String {
        let input = join_segments(&[relative_path, &ordinal.to_string()]);
        self.apply(&input)
    }

    pub fn apply(self, input: &str) -> String {
        match self {
            RouteHasher::Identity => input.to_string(),
            RouteHasher::Digest => digest(input),
        }
    }
}

pub fn digest(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hasher.finalize()[..DIGEST_BYTES]
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect()
}

pub fn route_pathname(route_id: &str, suffix: &str) -> String {
    join_segments(&[ROUTE_PREFIX, route_id, suffix])
}

/// Module path relative to `root`, with forward slashes and no leading separator.
pub fn relative_module_path(filename: &str, root: &str) -> String {
    let filename = filename.replace('\\', "/");
    let root = root.replace('\\', "/");
    let root = root.trim_end_matches('/');

    let relative = match filename.strip_prefix(root) {
        Some(rest) if root.is_empty() || rest.is_empty() || rest.starts_with('/') => rest,
        _ => filename.as_str(),
    };
    relative.trim_start_matches('/').to_string()
}

/// Joins path segments with `/` and normalizes `.`, `..` and repeated separators.
/// Backslashes are treated as separators on every host.
pub fn join_segments(segments: &[&str]) -> String {
    let joined = segments
        .iter()
        .filter(|segment| !segment.is_empty())
        .map(|segment| segment.replace('\\', "/"))
        .collect::<Vec<_>>()
        .join("/");
    normalize(&joined)
}

fn normalize(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if matches!(parts.last(), Some(last) if *last != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            _ => parts.push(part),
        }
    }

    let body = parts.join("/");
    if absolute {
        format!("/{}", body)
    } else if body.is_empty() {
        ".".to_string()
    } else {
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_route_id() {
        let id = RouteHasher::Identity.route_id("routes/index.ts", 0);
        assert_eq!(id, "routes/index.ts/0");
        assert_eq!(route_pathname(&id, "greet"), "/_m/routes/index.ts/0/greet");
    }

    #[test]
    fn test_digest_is_deterministic() {
        let first = RouteHasher::Digest.route_id("routes/index.ts", 3);
        let second = RouteHasher::Digest.route_id("routes/index.ts", 3);
        assert_eq!(first, second);
        assert_eq!(first.len(), DIGEST_BYTES * 2);
        assert!(first
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_ordinal_changes_digest() {
        let zero = RouteHasher::Digest.route_id("routes/index.ts", 0);
        let one = RouteHasher::Digest.route_id("routes/index.ts", 1);
        assert_ne!(zero, one);
    }

    #[test]
    fn test_backslashes_are_normalized() {
        let id = RouteHasher::Identity.route_id("routes\\admin\\users.ts", 2);
        assert_eq!(id, "routes/admin/users.ts/2");
        let pathname = route_pathname(&id, "list");
        assert!(!pathname.contains('\\'));
        assert_eq!(pathname, "/_m/routes/admin/users.ts/2/list");

        let windows = RouteHasher::Digest.route_id("routes\\admin\\users.ts", 2);
        let posix = RouteHasher::Digest.route_id("routes/admin/users.ts", 2);
        assert_eq!(windows, posix);
    }

    #[test]
    fn test_relative_module_path() {
        assert_eq!(
            relative_module_path("/app/routes/index.ts", "/app"),
            "routes/index.ts"
        );
        assert_eq!(
            relative_module_path("/app/routes/index.ts", "/app/"),
            "routes/index.ts"
        );
        assert_eq!(
            relative_module_path("C:\\work\\app\\src\\a.ts", "C:\\work\\app"),
            "src/a.ts"
        );
        // Sibling directory sharing a prefix is not inside the root.
        assert_eq!(
            relative_module_path("/application/a.ts", "/app"),
            "application/a.ts"
        );
    }

    #[test]
    fn test_join_segments_normalizes() {
        assert_eq!(join_segments(&["/_m", "a/./b", "c"]), "/_m/a/b/c");
        assert_eq!(join_segments(&["/_m", "a/../b", "fn"]), "/_m/b/fn");
        assert_eq!(join_segments(&["a//b", "", "0"]), "a/b/0");
        assert_eq!(join_segments(&["../x", "0"]), "../x/0");
        assert_eq!(join_segments(&[]), ".");
    }
}
