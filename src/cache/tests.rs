#[cfg(test)]
mod tests {
    use crate::cache::{CacheEntry, CacheManager};
    use crate::config::CacheConfig;
    use serde_json::{Value, json};
    use tempfile::TempDir;

    fn create_cache(temp_dir: &TempDir, enabled: bool) -> CacheManager {
        CacheManager::new(CacheConfig {
            enabled,
            cache_dir: temp_dir.path().to_path_buf(),
            expire_hours: 1,
        })
    }

    #[test]
    fn test_hash_key_is_stable_md5() {
        let temp_dir = TempDir::new().unwrap();
        let cache = create_cache(&temp_dir, true);

        assert_eq!(cache.hash_key(""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(cache.hash_key("abc"), cache.hash_key("abc"));
        assert_ne!(cache.hash_key("abc"), cache.hash_key("abd"));
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let temp_dir = TempDir::new().unwrap();
        let cache = create_cache(&temp_dir, true);

        cache
            .set("ndex", "http://server/v3/networks/1", json!([{"nodes": []}]))
            .await
            .unwrap();
        let cached: Option<Value> = cache.get("ndex", "http://server/v3/networks/1").await.unwrap();

        assert_eq!(cached, Some(json!([{"nodes": []}])));
        let missing: Option<Value> = cache.get("ndex", "http://server/v3/networks/2").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_disabled_cache_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        let cache = create_cache(&temp_dir, false);

        cache.set("ndex", "key", json!(1)).await.unwrap();
        let cached: Option<Value> = cache.get("ndex", "key").await.unwrap();

        assert!(cached.is_none());
        assert!(!temp_dir.path().join("ndex").exists());
    }

    #[tokio::test]
    async fn test_expired_entry_is_removed() {
        let temp_dir = TempDir::new().unwrap();
        let cache = create_cache(&temp_dir, true);
        let hash = cache.hash_key("old");
        let path = temp_dir.path().join("ndex").join(format!("{}.json", hash));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let entry = CacheEntry {
            data: json!("stale"),
            timestamp: 0,
            key_hash: hash,
            key: "old".to_string(),
        };
        std::fs::write(&path, serde_json::to_string(&entry).unwrap()).unwrap();

        let cached: Option<Value> = cache.get("ndex", "old").await.unwrap();

        assert!(cached.is_none());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_corrupted_entry_is_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let cache = create_cache(&temp_dir, true);
        let hash = cache.hash_key("broken");
        let path = temp_dir.path().join("ndex").join(format!("{}.json", hash));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{not json").unwrap();

        let cached: Option<Value> = cache.get("ndex", "broken").await.unwrap();

        assert!(cached.is_none());
    }

    #[tokio::test]
    async fn test_set_reports_unwritable_cache_dir() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        let cache = CacheManager::new(CacheConfig {
            enabled: true,
            cache_dir: blocker.join("cache"),
            expire_hours: 1,
        });

        let err = cache.set("ndex", "key", json!(1)).await.unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to create cache directory"));

        // 读取不受影响，视为未命中
        let cached: Option<Value> = cache.get("ndex", "key").await.unwrap();
        assert!(cached.is_none());
    }
}
