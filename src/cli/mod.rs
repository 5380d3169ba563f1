use crate::config::Config;
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

/// cellmaps_hierarchyeval - 对 HiDeF 层级运行 GO、CORUM 与 HPA 富集检验
#[derive(Parser, Debug)]
#[command(name = "cellmaps_hierarchyevalcmd")]
#[command(
    about = "Takes a HiDeF hierarchy file from --hierarchy_dir and runs enrichment tests for GO, CORUM, and HPA terms."
)]
#[command(version)]
pub struct Args {
    /// 输出目录
    pub outdir: PathBuf,

    /// 层级生成目录
    #[arg(long = "hierarchy_dir")]
    pub hierarchy_dir: PathBuf,

    /// 配置文件路径，命令行参数优先
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// 最大错误发现率（默认 0.05）
    #[arg(long = "max_fdr")]
    pub max_fdr: Option<f64>,

    /// 最小 Jaccard 指数（默认 0.1）
    #[arg(long = "min_jaccard_index")]
    pub min_jaccard_index: Option<f64>,

    /// 参与富集检验的最小术语大小（默认 4）
    #[arg(long = "min_comp_size")]
    pub min_comp_size: Option<usize>,

    /// CORUM 网络 UUID
    #[arg(long)]
    pub corum: Option<String>,

    /// GO-CC 网络 UUID
    #[arg(long = "go_cc")]
    pub go_cc: Option<String>,

    /// HPA 网络 UUID
    #[arg(long)]
    pub hpa: Option<String>,

    /// NDEx 服务器（默认 http://www.ndexbio.org）
    #[arg(long = "ndex_server")]
    pub ndex_server: Option<String>,

    /// 参考网络缓存目录
    #[arg(long = "reference_cache_dir")]
    pub reference_cache_dir: Option<PathBuf>,

    /// 禁用参考网络缓存
    #[arg(long = "no_cache")]
    pub no_cache: bool,

    /// ollama 可执行文件路径
    #[arg(long = "ollama_binary")]
    pub ollama_binary: Option<PathBuf>,

    /// `<MODEL NAME>` 或 `<MODEL NAME>,<PROMPT>`，PROMPT 可以是提示词文件路径或提示词本身。
    /// 提示词中的 {GENE_SET} 会被替换为基因集，并要求 LLM 在第一行输出
    /// `Process: <name>`、第二行输出 `Confidence Score: <score>`。
    /// MODEL NAME 为 FAKE 时使用假Agent
    #[arg(long = "ollama_prompts", num_args = 1..)]
    pub ollama_prompts: Vec<String>,

    /// 本次运行名称（FAIRSCAPE），未设置时使用层级目录中的名称
    #[arg(long)]
    pub name: Option<String>,

    /// 组织名称（FAIRSCAPE），未设置时使用层级目录中的组织名称
    #[arg(long = "organization_name")]
    pub organization_name: Option<String>,

    /// 项目名称（FAIRSCAPE），未设置时使用层级目录中的项目名称
    #[arg(long = "project_name")]
    pub project_name: Option<String>,

    /// 不创建 output.log 与 error.log
    #[arg(long = "skip_logging")]
    pub skip_logging: bool,

    /// tracing EnvFilter 指令（如 `cellmaps_hierarchyeval=debug`），设置后覆盖 -v
    #[arg(long)]
    pub logconf: Option<String>,

    /// 增加控制台日志详细程度：-v = WARN, -vv = INFO, -vvv = DEBUG, -vvvv = TRACE（默认 ERROR）
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// 将CLI参数转换为配置
    pub fn into_config(self) -> Result<Config> {
        let mut config = match &self.config {
            Some(config_path) => Config::from_file(config_path)?,
            None => Config::default(),
        };

        config.outdir = self.outdir;
        config.hierarchy_dir = self.hierarchy_dir;

        // 覆盖富集阈值
        if let Some(max_fdr) = self.max_fdr {
            config.enrichment.max_fdr = max_fdr;
        }
        if let Some(min_jaccard_index) = self.min_jaccard_index {
            config.enrichment.min_jaccard_index = min_jaccard_index;
        }
        if let Some(min_comp_size) = self.min_comp_size {
            config.enrichment.min_comp_size = min_comp_size;
        }

        // 覆盖参考网络配置
        if let Some(corum) = self.corum {
            config.references.corum = corum;
        }
        if let Some(go_cc) = self.go_cc {
            config.references.go_cc = go_cc;
        }
        if let Some(hpa) = self.hpa {
            config.references.hpa = hpa;
        }
        if let Some(ndex_server) = self.ndex_server {
            config.references.ndex_server = ndex_server;
        }

        // 缓存配置
        if let Some(cache_dir) = self.reference_cache_dir {
            config.cache.cache_dir = cache_dir;
        }
        if self.no_cache {
            config.cache.enabled = false;
        }

        if let Some(ollama_binary) = self.ollama_binary {
            config.llm.ollama_binary = ollama_binary;
        }
        if !self.ollama_prompts.is_empty() {
            config.llm.ollama_prompts = self.ollama_prompts;
        }

        // 溯源信息：CLI参数优先级最高
        if let Some(name) = self.name {
            config.provenance.name = Some(name);
        }
        if let Some(organization_name) = self.organization_name {
            config.provenance.organization_name = Some(organization_name);
        }
        if let Some(project_name) = self.project_name {
            config.provenance.project_name = Some(project_name);
        }

        config.logging.skip_logging = self.skip_logging || config.logging.skip_logging;
        if self.logconf.is_some() {
            config.logging.logconf = self.logconf;
        }
        config.logging.verbosity = config.logging.verbosity.max(self.verbose);

        Ok(config)
    }
}
