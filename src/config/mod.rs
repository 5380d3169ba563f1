use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// 参考网络所在的 NDEx 默认服务器
pub const DEFAULT_NDEX_SERVER: &str = "http://www.ndexbio.org";
pub const DEFAULT_CORUM_UUID: &str = "764f7471-9b79-11ed-9a1f-005056ae23aa";
pub const DEFAULT_GO_CC_UUID: &str = "f484e8ee-0b0f-11ee-aa50-005056ae23aa";
pub const DEFAULT_HPA_UUID: &str = "a6a88e2d-9c0f-11ed-9a1f-005056ae23aa";
pub const DEFAULT_OLLAMA_BINARY: &str = "/usr/local/bin/ollama";

/// 应用程序配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Config {
    /// 输出目录
    pub outdir: PathBuf,

    /// 层级网络所在目录
    pub hierarchy_dir: PathBuf,

    /// 富集分析阈值
    pub enrichment: EnrichmentConfig,

    /// 参考网络配置
    pub references: ReferenceConfig,

    /// 参考网络缓存配置
    pub cache: CacheConfig,

    /// 基因集命名Agent配置
    pub llm: LLMConfig,

    /// FAIRSCAPE 溯源信息
    pub provenance: ProvenanceConfig,

    /// 日志配置
    pub logging: LoggingConfig,

    /// 原始命令行，用于溯源记录
    pub command_line: String,
}

/// 富集分析阈值
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// 最大错误发现率
    pub max_fdr: f64,

    /// 最小 Jaccard 指数
    pub min_jaccard_index: f64,

    /// 参与富集检验的最小术语大小
    pub min_comp_size: usize,
}

/// 参考网络配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ReferenceConfig {
    /// NDEx 服务器地址
    pub ndex_server: String,

    /// CORUM 网络 UUID
    pub corum: String,

    /// GO-CC 网络 UUID
    pub go_cc: String,

    /// HPA 网络 UUID
    pub hpa: String,

    /// 重试次数
    pub retry_attempts: u32,

    /// 重试间隔（毫秒）
    pub retry_delay_ms: u64,

    /// 超时时间（秒）
    pub timeout_seconds: u64,
}

/// 缓存配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    /// 是否启用缓存
    pub enabled: bool,

    /// 缓存目录
    pub cache_dir: PathBuf,

    /// 缓存过期时间（小时）
    pub expire_hours: u64,
}

/// LLM 命名配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LLMConfig {
    /// ollama 可执行文件路径
    pub ollama_binary: PathBuf,

    /// 形如 `<MODEL>` 或 `<MODEL>,<PROMPT>` 的 Agent 描述，`FAKE` 表示假Agent
    pub ollama_prompts: Vec<String>,
}

/// FAIRSCAPE 溯源信息，未设置时从层级目录的 RO-Crate 中读取
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct ProvenanceConfig {
    pub name: Option<String>,
    pub organization_name: Option<String>,
    pub project_name: Option<String>,
}

/// 日志配置
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct LoggingConfig {
    /// 不在输出目录中创建 output.log 与 error.log
    pub skip_logging: bool,

    /// EnvFilter 指令，设置后覆盖 verbosity
    pub logconf: Option<String>,

    /// 控制台日志详细程度 (0 = ERROR ... 4 = TRACE)
    pub verbosity: u8,
}

impl Config {
    /// 从文件加载配置
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut file =
            File::open(path).context(format!("Failed to open config file: {:?}", path))?;
        let mut content = String::new();
        file.read_to_string(&mut content)
            .context("Failed to read config file")?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            outdir: PathBuf::from("."),
            hierarchy_dir: PathBuf::from("."),
            enrichment: EnrichmentConfig::default(),
            references: ReferenceConfig::default(),
            cache: CacheConfig::default(),
            llm: LLMConfig::default(),
            provenance: ProvenanceConfig::default(),
            logging: LoggingConfig::default(),
            command_line: String::new(),
        }
    }
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            max_fdr: 0.05,
            min_jaccard_index: 0.1,
            min_comp_size: 4,
        }
    }
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            ndex_server: String::from(DEFAULT_NDEX_SERVER),
            corum: String::from(DEFAULT_CORUM_UUID),
            go_cc: String::from(DEFAULT_GO_CC_UUID),
            hpa: String::from(DEFAULT_HPA_UUID),
            retry_attempts: 3,
            retry_delay_ms: 2000,
            timeout_seconds: 120,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_dir: PathBuf::from(".cellmaps_hierarchyeval/cache"),
            expire_hours: 8760,
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            ollama_binary: PathBuf::from(DEFAULT_OLLAMA_BINARY),
            ollama_prompts: vec![],
        }
    }
}
