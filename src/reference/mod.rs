//! 参考术语集加载 - 从 NDEx 下载（或从本地缓存读取）CORUM、GO-CC、HPA 网络

use anyhow::Result;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::CacheManager;
use crate::config::{CacheConfig, ReferenceConfig};
use crate::error::HierarchyEvalError;
use crate::network::{Cx2NetworkHelper, NetworkHelper, parse_gene_list};

/// 缓存分类
pub const CACHE_CATEGORY: &str = "ndex";

/// 参考网络节点上可能存放成员基因的属性，按优先级排列
pub const MEMBER_ATTRIBUTES: [&str; 4] = ["CD_MemberList", "genes", "members", "member"];

/// 术语描述属性
pub const DESCRIPTION_ATTRIBUTES: [&str; 2] = ["description", "Description"];

/// 参考术语集合类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReferenceCollection {
    /// 蛋白复合物
    Corum,
    /// GO 细胞组分
    GoCc,
    /// 人类蛋白图谱
    Hpa,
}

impl std::fmt::Display for ReferenceCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl ReferenceCollection {
    pub const ALL: [ReferenceCollection; 3] = [
        ReferenceCollection::Corum,
        ReferenceCollection::GoCc,
        ReferenceCollection::Hpa,
    ];

    /// 节点属性名前缀
    pub fn key(&self) -> &'static str {
        match self {
            ReferenceCollection::Corum => "CORUM",
            ReferenceCollection::GoCc => "GO_CC",
            ReferenceCollection::Hpa => "HPA",
        }
    }

    /// 只有 GO-CC 提供术语描述
    pub fn has_descriptions(&self) -> bool {
        matches!(self, ReferenceCollection::GoCc)
    }

    /// 从配置中取出对应的网络 UUID
    pub fn uuid<'a>(&self, config: &'a ReferenceConfig) -> &'a str {
        match self {
            ReferenceCollection::Corum => &config.corum,
            ReferenceCollection::GoCc => &config.go_cc,
            ReferenceCollection::Hpa => &config.hpa,
        }
    }
}

/// 单个参考术语
#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    pub id: String,
    pub genes: BTreeSet<String>,
    pub description: Option<String>,
}

/// 参考术语集，加载后只读
#[derive(Debug, Clone)]
pub struct TermSet {
    pub collection: ReferenceCollection,
    pub uuid: String,
    /// 参考网络名称
    pub name: Option<String>,
    pub terms: BTreeMap<String, Term>,
}

impl TermSet {
    /// 将参考网络的每个节点视为一个术语；同名节点的成员会合并
    pub fn from_network(
        collection: ReferenceCollection,
        uuid: &str,
        network: &dyn NetworkHelper,
    ) -> Self {
        let mut terms: BTreeMap<String, Term> = BTreeMap::new();
        for node_id in network.node_ids() {
            let genes: BTreeSet<String> = network
                .first_attribute(node_id, &MEMBER_ATTRIBUTES)
                .map(|value| parse_gene_list(&value).into_iter().collect())
                .unwrap_or_default();
            if genes.is_empty() {
                debug!("参考网络 {} 节点 {} 没有成员基因，跳过", collection, node_id);
                continue;
            }
            let id = network
                .node_name(node_id)
                .unwrap_or_else(|| node_id.to_string());
            let description = if collection.has_descriptions() {
                network
                    .first_attribute(node_id, &DESCRIPTION_ATTRIBUTES)
                    .and_then(|v| v.as_str().map(str::to_string))
            } else {
                None
            };

            let term = terms.entry(id.clone()).or_insert_with(|| Term {
                id,
                genes: BTreeSet::new(),
                description: None,
            });
            term.genes.extend(genes);
            if term.description.is_none() {
                term.description = description;
            }
        }

        Self {
            collection,
            uuid: uuid.to_string(),
            name: network.name(),
            terms,
        }
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// 参考网络加载器
pub struct ReferenceLoader {
    client: reqwest::Client,
    config: ReferenceConfig,
    cache: CacheManager,
}

impl ReferenceLoader {
    pub fn new(config: ReferenceConfig, cache_config: CacheConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            config,
            cache: CacheManager::new(cache_config),
        })
    }

    /// NDEx v3 CX2 下载地址
    pub fn network_url(&self, uuid: &str) -> String {
        network_url(&self.config.ndex_server, uuid)
    }

    /// 加载全部三个参考术语集
    pub async fn load_all(&self) -> Result<Vec<TermSet>> {
        let mut term_sets = Vec::with_capacity(ReferenceCollection::ALL.len());
        for collection in ReferenceCollection::ALL {
            term_sets.push(self.load(collection).await?);
        }
        Ok(term_sets)
    }

    /// 加载单个参考术语集
    pub async fn load(&self, collection: ReferenceCollection) -> Result<TermSet> {
        let uuid = collection.uuid(&self.config);
        info!("📥 加载参考网络 {} ({})", collection, uuid);
        let cx2 = self.fetch_network(uuid).await?;
        let network = Cx2NetworkHelper::from_value(cx2, Path::new(&self.network_url(uuid)))?;
        let term_set = TermSet::from_network(collection, uuid, &network);
        info!(
            "   ✅ {} 共 {} 个术语{}",
            collection,
            term_set.len(),
            term_set
                .name
                .as_ref()
                .map(|n| format!(" ({})", n))
                .unwrap_or_default()
        );
        Ok(term_set)
    }

    /// 获取参考网络的 CX2 JSON，优先读取缓存
    pub async fn fetch_network(&self, uuid: &str) -> Result<Value> {
        let url = self.network_url(uuid);
        if let Some(cached) = self.cache.get::<Value>(CACHE_CATEGORY, &url).await? {
            debug!("使用缓存的参考网络: {}", url);
            return Ok(cached);
        }

        let network = self
            .retry_with_backoff(|| self.download(uuid, &url))
            .await?;
        // 缓存写入失败不影响本次运行
        if let Err(err) = self.cache.set(CACHE_CATEGORY, &url, &network).await {
            warn!("⚠️ 参考网络缓存写入失败 {}: {:#}", url, err);
        }
        Ok(network)
    }

    async fn download(&self, uuid: &str, url: &str) -> Result<Value> {
        let failure = |reason: String| HierarchyEvalError::ReferenceDownload {
            server: self.config.ndex_server.clone(),
            uuid: uuid.to_string(),
            reason,
        };

        debug!("下载参考网络: {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| failure(e.to_string()))?
            .error_for_status()
            .map_err(|e| failure(e.to_string()))?;
        let body = response.text().await.map_err(|e| failure(e.to_string()))?;
        let network: Value = serde_json::from_str(&body).map_err(|e| failure(e.to_string()))?;
        Ok(network)
    }

    /// 通用重试逻辑
    async fn retry_with_backoff<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_retries = self.config.retry_attempts.max(1);
        let retry_delay_ms = self.config.retry_delay_ms;
        let mut retries = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    retries += 1;
                    if retries >= max_retries {
                        return Err(err);
                    }
                    warn!(
                        "⚠️ 下载参考网络出错，重试中 (第 {} / {}次尝试): {}",
                        retries, max_retries, err
                    );
                    tokio::time::sleep(backoff_delay(retry_delay_ms, retries)).await;
                }
            }
        }
    }
}

/// 第 `retries` 次失败后的等待时间，每次翻倍
pub fn backoff_delay(retry_delay_ms: u64, retries: u32) -> Duration {
    let factor = 1u64 << retries.saturating_sub(1).min(16);
    Duration::from_millis(retry_delay_ms.saturating_mul(factor))
}

/// 拼接 NDEx v3 网络下载地址，服务器未带协议时补全 https
pub fn network_url(ndex_server: &str, uuid: &str) -> String {
    let server = ndex_server.trim_end_matches('/');
    if server.starts_with("http://") || server.starts_with("https://") {
        format!("{}/v3/networks/{}", server, uuid)
    } else {
        format!("https://{}/v3/networks/{}", server, uuid)
    }
}
