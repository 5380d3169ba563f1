//! 运行器 - 串联层级加载、参考网络、富集注释、命名Agent与输出

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::instrument::WithSubscriber;
use tracing::{debug, error, info, warn};

use crate::agent::{GeneSetAgent, parse_agent_specs};
use crate::config::Config;
use crate::enrichment::{Community, EnrichmentEngine, annotate};
use crate::logging;
use crate::network::{
    AttributeValue, HIERARCHY_PARENT_NETWORK_PREFIX, NetworkFormat, NetworkHelper, hierarchy_file,
    open_hierarchy,
};
use crate::provenance::{ComputationRecord, ProvenanceMetadata, RoCrate};
use crate::reference::{ReferenceLoader, TermSet};

/// 父子边列表输出文件
pub const EDGELIST_FILE: &str = "hierarchy_edgelist.tsv";

const JSON_FORMAT: &str = "application/json";
const TSV_FORMAT: &str = "text/tab-separated-values";

/// 时间跟踪作用域
pub struct TimingScope {
    start_time: Instant,
    phase_start_times: Vec<(String, Instant)>,
    /// 按结束顺序保存的阶段耗时
    phase_durations: Vec<(String, Duration)>,
}

impl Default for TimingScope {
    fn default() -> Self {
        Self::new()
    }
}

impl TimingScope {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            phase_start_times: Vec::new(),
            phase_durations: Vec::new(),
        }
    }

    /// 开始一个新的阶段计时
    pub fn start_phase(&mut self, phase_name: &str) {
        self.phase_start_times
            .push((phase_name.to_string(), Instant::now()));
    }

    /// 结束一个阶段的计时
    pub fn end_phase(&mut self, phase_name: &str) -> Option<Duration> {
        let index = self
            .phase_start_times
            .iter()
            .position(|(name, _)| name == phase_name)?;
        let (name, start_time) = self.phase_start_times.remove(index);
        let duration = start_time.elapsed();
        self.phase_durations.push((name, duration));
        Some(duration)
    }

    pub fn get_total_duration(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn get_phase_durations(&self) -> &[(String, Duration)] {
        &self.phase_durations
    }

    /// 获取格式化的执行时间报告
    pub fn generate_timing_report(&self) -> String {
        let mut report = format!(
            "总执行时间: {:.2}秒\n",
            self.get_total_duration().as_secs_f64()
        );
        if !self.phase_durations.is_empty() {
            report.push_str("各阶段执行时间:\n");
            for (phase, duration) in &self.phase_durations {
                report.push_str(&format!("- {}: {:.3}秒\n", phase, duration.as_secs_f64()));
            }
        }
        report
    }
}

/// 时间跟踪常量
pub struct TimingKeys;

impl TimingKeys {
    pub const LOAD_HIERARCHY: &'static str = "load_hierarchy";
    pub const LOAD_REFERENCES: &'static str = "load_references";
    pub const ENRICHMENT: &'static str = "enrichment";
    pub const NAMING: &'static str = "naming";
    pub const OUTPUT: &'static str = "output";
}

/// 层级评估运行器
pub struct Runner {
    config: Config,
}

/// 写出的文件及其在 RO-Crate 中的描述
struct OutputFile {
    path: PathBuf,
    name: String,
    description: String,
    encoding_format: &'static str,
}

impl Runner {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// 注释后层级网络的输出路径，格式与输入层级一致
    pub fn annotated_hierarchy_dest_file(&self) -> Result<PathBuf> {
        let format = NetworkFormat::detect(&self.config.hierarchy_dir)?;
        Ok(hierarchy_file(&self.config.outdir, format))
    }

    /// 执行完整流程；任何错误在返回前写入 error.log
    pub async fn run(&self) -> Result<()> {
        let outdir = &self.config.outdir;
        tokio::fs::create_dir_all(outdir)
            .await
            .with_context(|| format!("Failed to create output directory: {}", outdir.display()))?;
        let dispatch = logging::build_dispatch(&self.config.logging, outdir)?;

        async {
            info!("🚀 开始层级评估: {}", self.config.hierarchy_dir.display());
            debug!("命令行: {}", self.config.command_line);
            let mut timing = TimingScope::new();
            let result = self.execute(&mut timing).await;
            match &result {
                Ok(()) => info!("🎉 层级评估完成\n{}", timing.generate_timing_report()),
                Err(err) => error!("❌ 层级评估失败: {:#}", err),
            }
            result
        }
        .with_subscriber(dispatch)
        .await
    }

    async fn execute(&self, timing: &mut TimingScope) -> Result<()> {
        let config = &self.config;

        // 尽早校验Agent参数
        let agents = parse_agent_specs(&config.llm.ollama_binary, &config.llm.ollama_prompts)?;
        let metadata = ProvenanceMetadata::resolve(&config.provenance, &config.hierarchy_dir);
        debug!("溯源信息: {:?}", metadata);

        timing.start_phase(TimingKeys::LOAD_HIERARCHY);
        let mut network = open_hierarchy(&config.hierarchy_dir)?;
        let format = network.format();
        let input_file = hierarchy_file(&config.hierarchy_dir, format);
        let communities = Community::from_network(network.as_ref());
        info!(
            "📂 已加载 {} 层级 {}：{} 个社区，{} 条边",
            format,
            network.name().unwrap_or_default(),
            communities.len(),
            network.edges().len()
        );
        timing.end_phase(TimingKeys::LOAD_HIERARCHY);

        timing.start_phase(TimingKeys::LOAD_REFERENCES);
        let loader = ReferenceLoader::new(config.references.clone(), config.cache.clone())?;
        let term_sets = loader.load_all().await?;
        timing.end_phase(TimingKeys::LOAD_REFERENCES);

        timing.start_phase(TimingKeys::ENRICHMENT);
        let engine = EnrichmentEngine::new(config.enrichment.clone());
        for term_set in &term_sets {
            let enrichment = engine.enrich(&communities, term_set)?;
            annotate(network.as_mut(), &enrichment);
        }
        timing.end_phase(TimingKeys::ENRICHMENT);

        if !agents.is_empty() {
            timing.start_phase(TimingKeys::NAMING);
            name_communities(network.as_mut(), &communities, &agents).await;
            timing.end_phase(TimingKeys::NAMING);
        }

        timing.start_phase(TimingKeys::OUTPUT);
        let outputs = self.write_outputs(network.as_ref(), format).await?;
        self.register_provenance(&metadata, &input_file, &loader, &term_sets, &outputs, &agents)?;
        timing.end_phase(TimingKeys::OUTPUT);
        Ok(())
    }

    async fn write_outputs(
        &self,
        network: &dyn NetworkHelper,
        format: NetworkFormat,
    ) -> Result<Vec<OutputFile>> {
        let outdir = &self.config.outdir;
        let mut outputs = Vec::new();

        let annotated = hierarchy_file(outdir, format);
        network.write(&annotated)?;
        info!("💾 已写出注释后的层级: {}", annotated.display());
        outputs.push(OutputFile {
            path: annotated,
            name: format!("Annotated hierarchy network ({})", format),
            description: "Hierarchy annotated with CORUM, GO-CC and HPA enrichment".to_string(),
            encoding_format: JSON_FORMAT,
        });

        let edgelist = outdir.join(EDGELIST_FILE);
        tokio::fs::write(&edgelist, render_edgelist(network))
            .await
            .with_context(|| format!("Failed to write edge list: {}", edgelist.display()))?;
        outputs.push(OutputFile {
            path: edgelist,
            name: "Hierarchy parent-child edge list".to_string(),
            description: "Tab separated parent and child community names".to_string(),
            encoding_format: TSV_FORMAT,
        });

        for parent_format in [format, other_format(format)] {
            let source = self
                .config
                .hierarchy_dir
                .join(parent_format.file_name(HIERARCHY_PARENT_NETWORK_PREFIX));
            if !source.exists() {
                continue;
            }
            let dest = outdir.join(parent_format.file_name(HIERARCHY_PARENT_NETWORK_PREFIX));
            tokio::fs::copy(&source, &dest).await.with_context(|| {
                format!("Failed to copy parent network: {}", source.display())
            })?;
            debug!("复制父网络: {}", dest.display());
            outputs.push(OutputFile {
                path: dest,
                name: format!("Hierarchy parent network ({})", parent_format),
                description: "Interaction network the hierarchy was built from".to_string(),
                encoding_format: JSON_FORMAT,
            });
            break;
        }

        Ok(outputs)
    }

    fn register_provenance(
        &self,
        metadata: &ProvenanceMetadata,
        input_file: &Path,
        loader: &ReferenceLoader,
        term_sets: &[TermSet],
        outputs: &[OutputFile],
        agents: &[Box<dyn GeneSetAgent>],
    ) -> Result<()> {
        let keywords = vec![
            metadata.project_name.clone(),
            "hierarchy".to_string(),
            "enrichment".to_string(),
        ];
        let mut ro_crate = RoCrate::new(
            metadata,
            "Hierarchy annotated with CORUM, GO-CC and HPA enrichment",
            &keywords,
        );

        let software = ro_crate.register_software(
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_DESCRIPTION"),
            env!("CARGO_PKG_VERSION"),
            env!("CARGO_PKG_REPOSITORY"),
        );

        let mut inputs = vec![ro_crate.register_dataset(
            "Input hierarchy network",
            &format!("Hierarchy from {}", self.config.hierarchy_dir.display()),
            &input_file.display().to_string(),
            JSON_FORMAT,
        )];
        for term_set in term_sets {
            inputs.push(ro_crate.register_dataset(
                &format!("{} reference network", term_set.collection),
                term_set.name.as_deref().unwrap_or(&term_set.uuid),
                &loader.network_url(&term_set.uuid),
                JSON_FORMAT,
            ));
        }

        let generated: Vec<String> = outputs
            .iter()
            .map(|output| {
                ro_crate.register_dataset(
                    &output.name,
                    &output.description,
                    &relative_name(&output.path),
                    output.encoding_format,
                )
            })
            .collect();

        let agent_names: Vec<String> = agents.iter().map(|a| a.describe()).collect();
        let description = if agent_names.is_empty() {
            "Enrichment of hierarchy communities".to_string()
        } else {
            format!(
                "Enrichment of hierarchy communities, named by {}",
                agent_names.join("; ")
            )
        };
        ro_crate.register_computation(ComputationRecord {
            name: "Hierarchy evaluation",
            description: &description,
            command_line: &self.config.command_line,
            used_software: std::slice::from_ref(&software),
            inputs: &inputs,
            outputs: &generated,
        });
        ro_crate.write(&self.config.outdir)?;
        info!("📝 已写出 RO-Crate 元数据");
        Ok(())
    }
}

/// 依次调用每个Agent为社区命名；单个失败只记录警告
async fn name_communities(
    network: &mut dyn NetworkHelper,
    communities: &[Community],
    agents: &[Box<dyn GeneSetAgent>],
) {
    for agent in agents {
        let prefix = agent.attribute_prefix();
        info!("🤖 使用 {} 为 {} 个社区命名", agent.describe(), communities.len());
        let mut named = 0;
        for community in communities.iter().filter(|c| !c.genes.is_empty()) {
            let genes: Vec<String> = community.genes.iter().cloned().collect();
            match agent.name_gene_set(&genes).await {
                Ok(Some(result)) => {
                    network.set_node_attribute(
                        community.node_id,
                        &format!("{}name", prefix),
                        AttributeValue::String(result.name),
                    );
                    network.set_node_attribute(
                        community.node_id,
                        &format!("{}confidence_score", prefix),
                        AttributeValue::Double(result.confidence_score),
                    );
                    named += 1;
                }
                Ok(None) => debug!("社区 {} 未获得名称", community.label()),
                Err(err) => warn!("⚠️ 社区 {} 命名失败: {:#}", community.label(), err),
            }
        }
        info!("   ✅ {} 个社区已命名", named);
    }
}

/// 以节点名称渲染父子边列表，无名称时使用节点ID
pub fn render_edgelist(network: &dyn NetworkHelper) -> String {
    let label = |node_id: i64| {
        network
            .node_name(node_id)
            .unwrap_or_else(|| node_id.to_string())
    };
    let mut content = String::from("parent\tchild\n");
    for (source, target) in network.edges() {
        content.push_str(&format!("{}\t{}\n", label(source), label(target)));
    }
    content
}

fn other_format(format: NetworkFormat) -> NetworkFormat {
    match format {
        NetworkFormat::Cx => NetworkFormat::Cx2,
        NetworkFormat::Cx2 => NetworkFormat::Cx,
    }
}

fn relative_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
