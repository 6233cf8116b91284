//! Storage-path resolution for email assets.
//!
//! Template and branding rows store bucket-relative object paths. The
//! renderer needs public URLs, so paths are resolved against the object
//! store's public base and cached for the lifetime of the process;
//! entries are append-only and idempotent to recompute, so the cache is
//! safe to share across concurrent requests.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::debug;

/// Resolves a stored object path to a public URL.
///
/// Behind a trait so tests can inject a fixed resolver and the renderer
/// stays a pure function of its inputs.
pub trait StorageResolver: Send + Sync {
    /// Resolve `path` to a public URL. Returns `None` for empty or
    /// unresolvable paths; absolute URLs pass through unchanged.
    fn public_url(&self, path: &str) -> Option<String>;
}

/// True when the path is already a usable URL and needs no resolution.
pub fn is_absolute_url(path: &str) -> bool {
    path.starts_with("http://") || path.starts_with("https://") || path.starts_with("data:")
}

/// Resolver for a single public bucket, with a process-wide URL cache.
pub struct BucketResolver {
    public_base: String,
    bucket: String,
    cache: RwLock<HashMap<String, String>>,
}

impl BucketResolver {
    pub fn new(public_base: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            public_base: public_base.into(),
            bucket: bucket.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn build_url(&self, path: &str) -> String {
        // Bucket keys are slash-separated segments; spaces are the only
        // characters the upstream editor lets through that need escaping.
        let encoded = path.trim_matches('/').replace(' ', "%20");
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.public_base.trim_end_matches('/'),
            self.bucket,
            encoded
        )
    }
}

impl StorageResolver for BucketResolver {
    fn public_url(&self, path: &str) -> Option<String> {
        let path = path.trim();
        if path.is_empty() {
            return None;
        }
        if is_absolute_url(path) {
            return Some(path.to_string());
        }

        if let Ok(cache) = self.cache.read() {
            if let Some(hit) = cache.get(path) {
                return Some(hit.clone());
            }
        }

        let url = self.build_url(path);
        debug!(path = path, url = %url, "storage_url_resolved");

        if let Ok(mut cache) = self.cache.write() {
            cache.insert(path.to_string(), url.clone());
        }

        Some(url)
    }
}
