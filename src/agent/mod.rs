//! 基因集命名Agent - 为每个社区提出名称与置信度

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::HierarchyEvalError;

/// 提示词中基因集的占位符
pub const GENE_SET_PLACEHOLDER: &str = "{GENE_SET}";

/// 假Agent的模型名
pub const FAKE_MODEL: &str = "FAKE";

/// 默认提示词
pub const DEFAULT_PROMPT: &str = "Write a critical analysis of the biological processes performed \
by this system of interacting proteins. Propose a brief name for the most prominent biological \
process performed by the system.\n\
Put the name on the first line of the analysis in the form \"Process: <name>\" and on the \
second line put a confidence score between 0 and 1 for that name in the form \
\"Confidence Score: <score>\".\n\
Be concise, do not use unnecessary words. Be specific, avoid overly general statements.\n\n\
Here are the interacting proteins: {GENE_SET}\n";

static PROCESS_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\W*process\W*:\s*(.+?)\s*$").unwrap());

static CONFIDENCE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\W*confidence\s+score\W*:[\s*_]*([0-9]*\.?[0-9]+)").unwrap()
});

/// 命名结果
#[derive(Debug, Clone, PartialEq)]
pub struct NamingResult {
    pub name: String,
    pub confidence_score: f64,
}

/// 基因集命名Agent
#[async_trait]
pub trait GeneSetAgent: Send + Sync {
    /// 写入节点属性时使用的前缀，如 `llama2_`
    fn attribute_prefix(&self) -> String;

    /// 用于日志与溯源的描述
    fn describe(&self) -> String;

    /// 为基因集命名；无法得到名称时返回 None
    async fn name_gene_set(&self, genes: &[String]) -> Result<Option<NamingResult>>;
}

/// 从 LLM 输出中解析 `Process:` 与 `Confidence Score:` 两行
pub fn parse_response(response: &str) -> Option<NamingResult> {
    let name = PROCESS_PATTERN
        .captures(response)?
        .get(1)?
        .as_str()
        .trim_matches(|c: char| c == '*' || c == '"' || c.is_whitespace())
        .to_string();
    if name.is_empty() {
        return None;
    }
    let confidence_score = CONFIDENCE_PATTERN
        .captures(response)?
        .get(1)?
        .as_str()
        .parse::<f64>()
        .ok()?;
    Some(NamingResult {
        name,
        confidence_score,
    })
}

/// 确定性的假Agent，用于测试
#[derive(Debug, Clone, Default)]
pub struct FakeGeneSetAgent;

impl FakeGeneSetAgent {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl GeneSetAgent for FakeGeneSetAgent {
    fn attribute_prefix(&self) -> String {
        format!("{}_", FAKE_MODEL)
    }

    fn describe(&self) -> String {
        "Fake gene set agent".to_string()
    }

    async fn name_gene_set(&self, genes: &[String]) -> Result<Option<NamingResult>> {
        if genes.is_empty() {
            return Ok(None);
        }
        Ok(Some(NamingResult {
            name: format!("Fake process of {} genes led by {}", genes.len(), genes[0]),
            confidence_score: 0.5,
        }))
    }
}

/// 通过命令行调用 ollama 的Agent：`<ollama_binary> run <model> <prompt>`
#[derive(Debug, Clone)]
pub struct OllamaGeneSetAgent {
    ollama_binary: PathBuf,
    model: String,
    prompt: String,
}

impl OllamaGeneSetAgent {
    pub fn new(ollama_binary: &Path, model: &str, prompt: Option<String>) -> Self {
        Self {
            ollama_binary: ollama_binary.to_path_buf(),
            model: model.to_string(),
            prompt: prompt.unwrap_or_else(|| DEFAULT_PROMPT.to_string()),
        }
    }

    /// 将基因集填入提示词
    pub fn build_prompt(&self, genes: &[String]) -> String {
        self.prompt
            .replace(GENE_SET_PLACEHOLDER, &genes.join(", "))
    }
}

#[async_trait]
impl GeneSetAgent for OllamaGeneSetAgent {
    fn attribute_prefix(&self) -> String {
        let sanitized: String = self
            .model
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        format!("{}_", sanitized)
    }

    fn describe(&self) -> String {
        format!(
            "ollama model {} via {}",
            self.model,
            self.ollama_binary.display()
        )
    }

    async fn name_gene_set(&self, genes: &[String]) -> Result<Option<NamingResult>> {
        if genes.is_empty() {
            return Ok(None);
        }
        let prompt = self.build_prompt(genes);
        debug!("🤖 调用 {} 为 {} 个基因命名", self.model, genes.len());

        let output = Command::new(&self.ollama_binary)
            .arg("run")
            .arg(&self.model)
            .arg(&prompt)
            .output()
            .await
            .with_context(|| {
                format!("Failed to run ollama binary {}", self.ollama_binary.display())
            })?;

        if !output.status.success() {
            warn!(
                "⚠️ ollama 模型 {} 执行失败 ({}): {}",
                self.model,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return Ok(None);
        }

        let response = String::from_utf8_lossy(&output.stdout);
        let result = parse_response(&response);
        if result.is_none() {
            warn!("⚠️ 无法从 {} 的输出中解析名称与置信度", self.model);
        }
        Ok(result)
    }
}

/// 解析 `--ollama_prompts` 参数为Agent列表
///
/// 每项为 `FAKE`、`<MODEL>` 或 `<MODEL>,<PROMPT>`；PROMPT 为已存在的文件路径时读取文件内容。
/// 只按第一个逗号拆分，提示词本身可以包含逗号。
pub fn parse_agent_specs(
    ollama_binary: &Path,
    specs: &[String],
) -> Result<Vec<Box<dyn GeneSetAgent>>> {
    let mut agents: Vec<Box<dyn GeneSetAgent>> = Vec::with_capacity(specs.len());
    for spec in specs {
        let (model, raw_prompt) = match spec.split_once(',') {
            Some((model, prompt)) => (model.trim(), Some(prompt)),
            None => (spec.trim(), None),
        };
        if model.is_empty() {
            return Err(HierarchyEvalError::InvalidAgentSpec(spec.clone()).into());
        }
        if model.eq_ignore_ascii_case(FAKE_MODEL) {
            debug!("创建 FAKE 基因集Agent");
            agents.push(Box::new(FakeGeneSetAgent::new()));
            continue;
        }

        let prompt = match raw_prompt {
            Some(raw) if Path::new(raw).is_file() => Some(
                std::fs::read_to_string(raw)
                    .with_context(|| format!("Failed to read prompt file: {}", raw))?,
            ),
            Some(raw) if !raw.trim().is_empty() => Some(raw.to_string()),
            _ => None,
        };
        debug!("创建 ollama 基因集Agent，模型: {}", model);
        agents.push(Box::new(OllamaGeneSetAgent::new(ollama_binary, model, prompt)));
    }
    Ok(agents)
}

// Include tests
#[cfg(test)]
mod tests;
