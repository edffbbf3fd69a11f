//! Storage key generation.
//!
//! Key format: `{namespace}/{application_id}/{token}-{filename}` where `token`
//! is `{unix_millis}-{instance}{sequence}`. The instance tag is random per
//! generator and the sequence is a per-generator counter, so two uploads with
//! the same application and filename in the same millisecond still get
//! distinct keys.
//!
//! Client-supplied segments are reduced to `[A-Za-z0-9._-]` before being
//! joined, so they can never introduce extra path segments or `..`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};
use uuid::Uuid;

const MAX_APPLICATION_ID_LEN: usize = 64;
const MAX_FILENAME_LEN: usize = 200;
const DEFAULT_NAMESPACE: &str = "uploads";

/// Fully composed object key, safe to hand to any `BlobStore`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct StorageKey(String);

impl StorageKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StorageKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug)]
pub struct KeyGenerator {
    instance: String,
    sequence: AtomicU64,
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyGenerator {
    /// Create a generator with a random instance tag.
    pub fn new() -> Self {
        let tag = Uuid::new_v4().simple().to_string();
        Self::with_instance(&tag[..8])
    }

    /// Create a generator with a fixed instance tag. Useful for reproducible keys.
    pub fn with_instance(instance: &str) -> Self {
        Self {
            instance: sanitize_segment(instance, 16, "0"),
            sequence: AtomicU64::new(0),
        }
    }

    /// Compose a key for one upload.
    ///
    /// `now` is supplied by the caller. Every call consumes one sequence
    /// number, so repeated calls with identical arguments never collide.
    pub fn generate(
        &self,
        namespace: &str,
        application_id: &str,
        filename: &str,
        now: DateTime<Utc>,
    ) -> StorageKey {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let namespace = sanitize_namespace(namespace);
        let application_id = sanitize_segment(application_id, MAX_APPLICATION_ID_LEN, "default");
        let filename = sanitize_segment(filename, MAX_FILENAME_LEN, "file");

        StorageKey(format!(
            "{}/{}/{}-{}{:04x}-{}",
            namespace,
            application_id,
            now.timestamp_millis(),
            self.instance,
            seq,
            filename
        ))
    }
}

/// Sanitize each `/`-separated part of a namespace, dropping empty ones.
fn sanitize_namespace(namespace: &str) -> String {
    let parts: Vec<String> = namespace
        .split('/')
        .filter(|part| !part.trim().is_empty())
        .map(|part| sanitize_segment(part, MAX_APPLICATION_ID_LEN, "_"))
        .collect();
    if parts.is_empty() {
        DEFAULT_NAMESPACE.to_string()
    } else {
        parts.join("/")
    }
}

/// Reduce `raw` to a single safe path segment.
///
/// Keeps ASCII alphanumerics, `-`, `_` and `.`; replaces other printable
/// characters (including `/` and `\`) with `_`; drops control characters.
/// Runs of dots collapse to one and leading dots are removed, so the result
/// is never `.`, `..` or a hidden name.
pub fn sanitize_segment(raw: &str, max_len: usize, fallback: &str) -> String {
    let mut out = String::with_capacity(raw.len().min(max_len));
    for c in raw.chars() {
        if out.len() >= max_len {
            break;
        }
        if c.is_control() {
            continue;
        }
        let keep = c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.');
        let c = if keep { c } else { '_' };
        if c == '.' && out.ends_with('.') {
            continue;
        }
        out.push(c);
    }

    let trimmed = out.trim_start_matches('.');
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(millis).unwrap()
    }

    #[test]
    fn composes_expected_layout() {
        let keys = KeyGenerator::with_instance("abcd1234");
        let key = keys.generate("user-logos", "app1", "logo.png", at(1_700_000_000_123));
        assert_eq!(
            key.as_str(),
            "user-logos/app1/1700000000123-abcd12340000-logo.png"
        );

        let next = keys.generate("user-logos", "app1", "logo.png", at(1_700_000_000_123));
        assert_eq!(
            next.as_str(),
            "user-logos/app1/1700000000123-abcd12340001-logo.png"
        );
    }

    #[test]
    fn identical_arguments_at_same_instant_differ() {
        let keys = KeyGenerator::new();
        let now = at(1_700_000_000_000);
        let a = keys.generate("ns", "app1", "logo.png", now);
        let b = keys.generate("ns", "app1", "logo.png", now);
        assert_ne!(a, b);
    }

    #[test]
    fn different_timestamps_differ() {
        let a = KeyGenerator::with_instance("x").generate("ns", "app1", "logo.png", at(1));
        let b = KeyGenerator::with_instance("x").generate("ns", "app1", "logo.png", at(2));
        assert_ne!(a, b);
    }

    #[test]
    fn separate_generators_do_not_collide() {
        let now = at(42);
        let a = KeyGenerator::new().generate("ns", "app", "a.gif", now);
        let b = KeyGenerator::new().generate("ns", "app", "a.gif", now);
        assert_ne!(a, b);
    }

    #[test]
    fn concurrent_generation_is_unique() {
        use std::{collections::HashSet, sync::Arc, thread};

        let keys = Arc::new(KeyGenerator::new());
        let now = at(7);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let keys = Arc::clone(&keys);
                thread::spawn(move || {
                    (0..250)
                        .map(|_| keys.generate("ns", "app", "same.png", now))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for key in handle.join().unwrap() {
                assert!(seen.insert(key));
            }
        }
        assert_eq!(seen.len(), 2000);
    }

    #[test]
    fn traversal_is_neutralised() {
        let keys = KeyGenerator::with_instance("t");
        let key = keys.generate("user-logos", "../../etc", "../passwd", at(0));
        let segments: Vec<&str> = key.as_str().split('/').collect();
        assert_eq!(segments.len(), 3);
        assert!(segments.iter().all(|s| *s != ".." && *s != "." && !s.is_empty()));
        assert!(!key.as_str().contains(".."));
        assert_eq!(segments[1], "_._etc");
    }

    #[test]
    fn separators_and_control_characters_are_stripped() {
        assert_eq!(sanitize_segment("a/b\\c", 64, "x"), "a_b_c");
        assert_eq!(sanitize_segment("lo\u{0}go\n.png", 64, "x"), "logo.png");
        assert_eq!(sanitize_segment("my logo (1).png", 64, "x"), "my_logo__1_.png");
        assert_eq!(sanitize_segment("café.png", 64, "x"), "caf_.png");
    }

    #[test]
    fn empty_segments_fall_back() {
        assert_eq!(sanitize_segment("", 64, "file"), "file");
        assert_eq!(sanitize_segment("..", 64, "file"), "file");
        assert_eq!(sanitize_segment("\u{7}\u{8}", 64, "file"), "file");

        let key = KeyGenerator::with_instance("t").generate("//", "", "", at(0));
        assert_eq!(key.as_str(), "uploads/default/0-t0000-file");
    }

    #[test]
    fn long_segments_are_truncated() {
        let name = "a".repeat(500);
        assert_eq!(sanitize_segment(&name, MAX_FILENAME_LEN, "x").len(), MAX_FILENAME_LEN);
    }

    #[test]
    fn nested_namespace_is_preserved() {
        let key = KeyGenerator::with_instance("t").generate("media/logos/", "app", "a.png", at(0));
        assert!(key.as_str().starts_with("media/logos/app/"));
    }
}
