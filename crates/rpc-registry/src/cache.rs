//! The local disk cache (§4.2 point 8): one JSON file per subscribe key,
//! holding the last full per-category state, written atomically
//! (write-temp + rename) so a crash mid-write never leaves a half-written
//! file for the next `lookup`/`subscribe` to trip over.

use {
    rpc_url::Url,
    std::{collections::BTreeMap, path::PathBuf},
};

#[derive(Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn file_for(&self, subscribe_key: &str) -> PathBuf {
        self.dir.join(sanitize(subscribe_key)).with_extension("json")
    }

    /// Atomically replaces the cached state for `subscribe_key` with
    /// `categories`. Creates the cache directory on first use.
    pub async fn store(
        &self,
        subscribe_key: &str,
        categories: &BTreeMap<String, Vec<Url>>,
    ) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let serialized: BTreeMap<&String, Vec<String>> = categories
            .iter()
            .map(|(category, urls)| (category, urls.iter().map(Url::to_full_string).collect()))
            .collect();
        let bytes = serde_json::to_vec(&serialized).unwrap_or_default();

        let final_path = self.file_for(subscribe_key);
        let tmp_path = final_path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &bytes).await?;
        tokio::fs::rename(&tmp_path, &final_path).await?;
        Ok(())
    }

    pub async fn load(&self, subscribe_key: &str) -> Option<BTreeMap<String, Vec<Url>>> {
        let bytes = tokio::fs::read(self.file_for(subscribe_key)).await.ok()?;
        let raw: BTreeMap<String, Vec<String>> = serde_json::from_slice(&bytes).ok()?;
        Some(
            raw.into_iter()
                .map(|(category, urls)| {
                    let parsed = urls.iter().filter_map(|s| Url::parse(s).ok()).collect();
                    (category, parsed)
                })
                .collect(),
        )
    }
}

/// Subscribe keys are full URL strings; replace path-hostile characters
/// so the cache file name is always a single path component.
fn sanitize(subscribe_key: &str) -> String {
    subscribe_key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(dir.path());
        let mut categories = BTreeMap::new();
        categories.insert(
            "providers".to_string(),
            vec![Url::new("rpc", "127.0.0.1", 20880).with_path("Hello")],
        );
        cache.store("g/Hello:1.0", &categories).await.unwrap();

        let loaded = cache.load("g/Hello:1.0").await.unwrap();
        assert_eq!(loaded["providers"].len(), 1);
        assert_eq!(loaded["providers"][0].path(), Some("Hello"));
    }

    #[tokio::test]
    async fn missing_cache_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(dir.path());
        assert!(cache.load("nothing/here:1.0").await.is_none());
    }
}
