//! 富集引擎 - 计算层级中每个社区相对于参考术语集的富集，并写入节点属性

use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use crate::config::EnrichmentConfig;
use crate::network::{AttributeValue, NetworkHelper};
use crate::reference::{ReferenceCollection, TermSet};

pub mod stats;

use stats::{benjamini_hochberg, hypergeometric_sf, jaccard_index};

/// 节点属性名后缀
pub struct AttributeSuffix;

impl AttributeSuffix {
    pub const TERMS: &'static str = "_terms";
    pub const DESCRIPTIONS: &'static str = "_descriptions";
    pub const JACCARD_INDEXES: &'static str = "_jaccard_indexes";
    pub const OVERLAP_GENES: &'static str = "_overlap_genes";
    pub const FDRS: &'static str = "_fdrs";
}

/// 层级中的一个社区
#[derive(Debug, Clone)]
pub struct Community {
    pub node_id: i64,
    pub name: Option<String>,
    pub genes: BTreeSet<String>,
}

impl Community {
    /// 从层级网络中读取所有社区
    pub fn from_network(network: &dyn NetworkHelper) -> Vec<Community> {
        network
            .node_ids()
            .into_iter()
            .map(|node_id| Community {
                node_id,
                name: network.node_name(node_id),
                genes: network.members(node_id).into_iter().collect(),
            })
            .collect()
    }

    /// 日志中使用的社区标识，无名称时为节点ID
    pub fn label(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.node_id.to_string())
    }
}

/// 单个显著术语
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentHit {
    pub term_id: String,
    pub description: Option<String>,
    pub jaccard_index: f64,
    /// 重叠基因，按字母序
    pub overlap_genes: Vec<String>,
    pub p_value: f64,
    /// BH 校正后的 p 值
    pub fdr: f64,
}

/// 一个参考集合在所有社区上的富集结果
#[derive(Debug, Clone)]
pub struct CollectionEnrichment {
    pub collection: ReferenceCollection,
    /// 检验次数（参与 FDR 校正的社区-术语对）
    pub n_tests: usize,
    /// 节点ID -> 显著术语（已排序）；每个社区都有条目
    pub hits: BTreeMap<i64, Vec<EnrichmentHit>>,
}

impl CollectionEnrichment {
    pub fn hits_for(&self, node_id: i64) -> &[EnrichmentHit] {
        self.hits.get(&node_id).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// 单次检验的中间结果
struct TestRecord<'a> {
    node_id: i64,
    term_id: &'a str,
    description: Option<&'a str>,
    jaccard_index: f64,
    overlap_genes: Vec<String>,
    p_value: f64,
}

/// 富集引擎
pub struct EnrichmentEngine {
    config: EnrichmentConfig,
}

impl EnrichmentEngine {
    pub fn new(config: EnrichmentConfig) -> Self {
        Self { config }
    }

    /// 对所有社区运行一个参考集合的富集检验
    ///
    /// 背景为所有社区成员的并集；术语与背景的交集小于 `min_comp_size` 时不参与检验。
    /// FDR 在该集合的全部社区-术语对上统一校正。
    pub fn enrich(&self, communities: &[Community], term_set: &TermSet) -> Result<CollectionEnrichment> {
        let universe: BTreeSet<String> = communities
            .iter()
            .flat_map(|c| c.genes.iter().cloned())
            .collect();
        let population = universe.len() as u64;

        let tested_terms: Vec<(&str, Option<&str>, BTreeSet<String>)> = term_set
            .terms
            .values()
            .filter_map(|term| {
                let in_universe: BTreeSet<String> =
                    term.genes.intersection(&universe).cloned().collect();
                (in_universe.len() >= self.config.min_comp_size && !in_universe.is_empty())
                    .then_some((term.id.as_str(), term.description.as_deref(), in_universe))
            })
            .collect();
        debug!(
            "{}: {} / {} 个术语满足最小大小 {}",
            term_set.collection,
            tested_terms.len(),
            term_set.len(),
            self.config.min_comp_size
        );

        let mut records: Vec<TestRecord> = Vec::new();
        for community in communities.iter().filter(|c| !c.genes.is_empty()) {
            let draws = community.genes.len() as u64;
            for (term_id, description, term_genes) in &tested_terms {
                let overlap_genes: Vec<String> =
                    community.genes.intersection(term_genes).cloned().collect();
                let p_value = hypergeometric_sf(
                    population,
                    term_genes.len() as u64,
                    draws,
                    overlap_genes.len() as u64,
                )?;
                records.push(TestRecord {
                    node_id: community.node_id,
                    term_id: *term_id,
                    description: *description,
                    jaccard_index: jaccard_index(&community.genes, term_genes),
                    overlap_genes,
                    p_value,
                });
            }
        }

        let p_values: Vec<f64> = records.iter().map(|r| r.p_value).collect();
        let fdrs = benjamini_hochberg(&p_values);

        let mut hits: BTreeMap<i64, Vec<EnrichmentHit>> = communities
            .iter()
            .map(|c| (c.node_id, Vec::new()))
            .collect();
        for (record, fdr) in records.into_iter().zip(fdrs) {
            if record.overlap_genes.is_empty()
                || fdr > self.config.max_fdr
                || record.jaccard_index < self.config.min_jaccard_index
            {
                continue;
            }
            hits.entry(record.node_id).or_default().push(EnrichmentHit {
                term_id: record.term_id.to_string(),
                description: record.description.map(str::to_string),
                jaccard_index: record.jaccard_index,
                overlap_genes: record.overlap_genes,
                p_value: record.p_value,
                fdr,
            });
        }
        for node_hits in hits.values_mut() {
            node_hits.sort_by(|a, b| {
                a.fdr
                    .total_cmp(&b.fdr)
                    .then(b.jaccard_index.total_cmp(&a.jaccard_index))
                    .then_with(|| a.term_id.cmp(&b.term_id))
            });
        }

        let n_tests = p_values.len();
        let enriched_nodes = hits.values().filter(|h| !h.is_empty()).count();
        info!(
            "   🧮 {}: {} 次检验，{} 个社区存在显著术语",
            term_set.collection, n_tests, enriched_nodes
        );

        Ok(CollectionEnrichment {
            collection: term_set.collection,
            n_tests,
            hits,
        })
    }
}

/// 将富集结果写入层级网络节点属性；没有显著术语的节点写入空列表
pub fn annotate(network: &mut dyn NetworkHelper, enrichment: &CollectionEnrichment) {
    let key = enrichment.collection.key();
    for node_id in network.node_ids() {
        let hits = enrichment.hits_for(node_id);

        network.set_node_attribute(
            node_id,
            &format!("{}{}", key, AttributeSuffix::TERMS),
            AttributeValue::ListOfString(hits.iter().map(|h| h.term_id.clone()).collect()),
        );
        if enrichment.collection.has_descriptions() {
            network.set_node_attribute(
                node_id,
                &format!("{}{}", key, AttributeSuffix::DESCRIPTIONS),
                AttributeValue::ListOfString(
                    hits.iter()
                        .map(|h| h.description.clone().unwrap_or_default())
                        .collect(),
                ),
            );
        }
        network.set_node_attribute(
            node_id,
            &format!("{}{}", key, AttributeSuffix::JACCARD_INDEXES),
            AttributeValue::ListOfDouble(hits.iter().map(|h| round3(h.jaccard_index)).collect()),
        );
        network.set_node_attribute(
            node_id,
            &format!("{}{}", key, AttributeSuffix::OVERLAP_GENES),
            AttributeValue::ListOfString(hits.iter().map(|h| h.overlap_genes.join(" ")).collect()),
        );
        network.set_node_attribute(
            node_id,
            &format!("{}{}", key, AttributeSuffix::FDRS),
            AttributeValue::ListOfDouble(hits.iter().map(|h| h.fdr).collect()),
        );
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
