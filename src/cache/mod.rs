use anyhow::{Context, Result};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs;
use tracing::{debug, warn};

use crate::config::CacheConfig;

/// 缓存管理器，参考网络按 `<cache_dir>/<category>/<md5(key)>.json` 存放
pub struct CacheManager {
    config: CacheConfig,
}

/// 缓存条目
#[derive(Debug, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    pub timestamp: u64,
    /// 缓存键的MD5哈希值
    pub key_hash: String,
    /// 原始缓存键（通常为下载地址）
    pub key: String,
}

impl CacheManager {
    pub fn new(config: CacheConfig) -> Self {
        Self { config }
    }

    /// 生成缓存键的MD5哈希
    pub fn hash_key(&self, key: &str) -> String {
        let mut hasher = Md5::new();
        hasher.update(key.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// 获取缓存文件路径
    fn get_cache_path(&self, category: &str, hash: &str) -> PathBuf {
        self.config
            .cache_dir
            .join(category)
            .join(format!("{}.json", hash))
    }

    /// 检查缓存是否过期
    fn is_expired(&self, timestamp: u64) -> bool {
        let expire_seconds = self.config.expire_hours * 3600;
        now_secs().saturating_sub(timestamp) > expire_seconds
    }

    /// 获取缓存，未启用、不存在、过期或损坏时返回 None
    pub async fn get<T>(&self, category: &str, key: &str) -> Result<Option<T>>
    where
        T: for<'de> Deserialize<'de>,
    {
        if !self.config.enabled {
            return Ok(None);
        }

        let hash = self.hash_key(key);
        let cache_path = self.get_cache_path(category, &hash);

        if !cache_path.exists() {
            debug!("缓存未命中: {} ({})", key, cache_path.display());
            return Ok(None);
        }

        match fs::read_to_string(&cache_path).await {
            Ok(content) => match serde_json::from_str::<CacheEntry<T>>(&content) {
                Ok(entry) => {
                    if self.is_expired(entry.timestamp) {
                        // 删除过期缓存
                        let _ = fs::remove_file(&cache_path).await;
                        debug!("缓存已过期: {}", key);
                        return Ok(None);
                    }
                    debug!("缓存命中: {}", key);
                    Ok(Some(entry.data))
                }
                Err(e) => {
                    warn!("⚠️ 缓存反序列化失败 {}: {}", cache_path.display(), e);
                    Ok(None)
                }
            },
            Err(e) => {
                warn!("⚠️ 缓存读取失败 {}: {}", cache_path.display(), e);
                Ok(None)
            }
        }
    }

    /// 设置缓存
    pub async fn set<T>(&self, category: &str, key: &str, data: T) -> Result<()>
    where
        T: Serialize,
    {
        if !self.config.enabled {
            return Ok(());
        }

        let hash = self.hash_key(key);
        let cache_path = self.get_cache_path(category, &hash);

        // 确保目录存在
        if let Some(parent) = cache_path.parent() {
            fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create cache directory: {}", parent.display())
            })?;
        }

        let entry = CacheEntry {
            data,
            timestamp: now_secs(),
            key_hash: hash,
            key: key.to_string(),
        };

        let content = serde_json::to_string(&entry)?;
        fs::write(&cache_path, content)
            .await
            .with_context(|| format!("Failed to write cache entry: {}", cache_path.display()))?;
        debug!("💾 已写入缓存: {}", cache_path.display());
        Ok(())
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

// Include tests
#[cfg(test)]
mod tests;
