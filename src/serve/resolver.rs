use anyhow::Context;
use percent_encoding::percent_decode_str;
use std::path::{Path, PathBuf};

/// Index files tried, in order, when a directory is requested.
const INDEX_FILES: &[&str] = &["index.html", "index.htm"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveError {
    /// The target is undecodable, contains a NUL byte, or is not
    /// '/'-rooted. Answered with 400.
    BadTarget,
    /// The target escapes the root directory after normalization.
    /// Answered with 403.
    Traversal,
    /// Nothing exists at the resolved path. Answered with 404.
    NotFound,
}

/// Outcome of mapping a request target onto the filesystem.
#[derive(Debug, PartialEq, Eq)]
pub enum Resolved {
    /// A regular file, ready to be opened and served.
    File(PathBuf),
    /// An existing directory with no index file; the handler applies the
    /// configured directory policy.
    Directory(PathBuf),
    /// A directory requested without a trailing slash; redirect to the
    /// slash form so relative links inside it resolve correctly.
    Redirect(String),
}

/// Decodes and lexically normalizes a request target into path segments
/// relative to the root.
///
/// The query/fragment part is stripped, percent-escapes are decoded, and
/// `.` / `..` segments are folded. A `..` that would climb above the root
/// is a traversal error; the check happens after decoding and
/// normalization, so encoded escapes like `%2e%2e` cannot slip through.
pub fn normalize_target(target: &str) -> Result<Vec<String>, ResolveError> {
    let decoded = decode_target(target)?;
    normalize(&decoded)
}

fn decode_target(target: &str) -> Result<String, ResolveError> {
    let without_query = target
        .split(['?', '#'])
        .next()
        .unwrap_or(target);

    if !without_query.starts_with('/') {
        return Err(ResolveError::BadTarget);
    }

    let decoded = percent_decode_str(without_query)
        .decode_utf8()
        .map_err(|_| ResolveError::BadTarget)?;

    if decoded.contains('\0') {
        return Err(ResolveError::BadTarget);
    }

    Ok(decoded.into_owned())
}

fn normalize(decoded: &str) -> Result<Vec<String>, ResolveError> {
    let mut segments: Vec<String> = Vec::new();

    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(ResolveError::Traversal);
                }
            }
            other => segments.push(other.to_string()),
        }
    }

    Ok(segments)
}

/// Maps request targets to filesystem paths under an immutable root.
pub struct Resolver {
    root: PathBuf,
}

impl Resolver {
    /// The root is canonicalized once at startup; a missing root directory
    /// is a startup failure, not a per-request one.
    pub fn new(root: PathBuf) -> anyhow::Result<Self> {
        let root = root
            .canonicalize()
            .with_context(|| format!("root directory {} is not accessible", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn resolve(&self, target: &str) -> Result<Resolved, ResolveError> {
        let decoded = decode_target(target)?;
        let had_trailing_slash = decoded.ends_with('/');
        let segments = normalize(&decoded)?;

        let mut path = self.root.clone();
        for segment in &segments {
            path.push(segment);
        }

        // The resolved path must stay a descendant of the root. Segment
        // normalization already guarantees this; the explicit check is the
        // final line of defense for the one invariant that must never break.
        if !path.starts_with(&self.root) {
            return Err(ResolveError::Traversal);
        }

        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|_| ResolveError::NotFound)?;

        if meta.is_dir() {
            if !had_trailing_slash && !segments.is_empty() {
                return Ok(Resolved::Redirect(format!("/{}/", segments.join("/"))));
            }

            for index in INDEX_FILES {
                let candidate = path.join(index);
                match tokio::fs::metadata(&candidate).await {
                    Ok(m) if m.is_file() => return Ok(Resolved::File(candidate)),
                    _ => {}
                }
            }

            Ok(Resolved::Directory(path))
        } else {
            Ok(Resolved::File(path))
        }
    }
}
