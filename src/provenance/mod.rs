//! 溯源记录 - 在输出目录写入 RO-Crate 元数据，登记软件、数据集与计算过程

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::ProvenanceConfig;

/// RO-Crate 元数据文件名
pub const RO_CRATE_METADATA_FILE: &str = "ro-crate-metadata.json";

const RO_CRATE_CONTEXT: &str = "https://w3id.org/ro/crate/1.1/context";
const RO_CRATE_PROFILE: &str = "https://w3id.org/ro/crate/1.1";
const ROOT_ID: &str = "./";

const NAME_KEYS: [&str; 1] = ["name"];
const ORGANIZATION_KEYS: [&str; 3] = ["organizationName", "organization-name", "organization_name"];
const PROJECT_KEYS: [&str; 3] = ["projectName", "project-name", "project_name"];

/// 本次运行的名称、组织与项目
#[derive(Debug, Clone, PartialEq)]
pub struct ProvenanceMetadata {
    pub name: String,
    pub organization_name: String,
    pub project_name: String,
}

impl ProvenanceMetadata {
    /// 命令行/配置中的值优先，其次读取层级目录中的 RO-Crate，最后使用层级目录名
    pub fn resolve(config: &ProvenanceConfig, hierarchy_dir: &Path) -> Self {
        let root = read_root_entity(hierarchy_dir);
        let fallback = hierarchy_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| hierarchy_dir.display().to_string());

        let pick = |explicit: &Option<String>, keys: &[&str]| -> String {
            explicit
                .clone()
                .or_else(|| root.as_ref().and_then(|r| string_field(r, keys)))
                .unwrap_or_else(|| fallback.clone())
        };

        Self {
            name: pick(&config.name, &NAME_KEYS),
            organization_name: pick(&config.organization_name, &ORGANIZATION_KEYS),
            project_name: pick(&config.project_name, &PROJECT_KEYS),
        }
    }
}

fn read_root_entity(dir: &Path) -> Option<Value> {
    let path = dir.join(RO_CRATE_METADATA_FILE);
    if !path.exists() {
        return None;
    }
    let parsed = fs::read_to_string(&path)
        .ok()
        .and_then(|content| serde_json::from_str::<Value>(&content).ok());
    let Some(document) = parsed else {
        warn!("⚠️ 无法解析 {}，使用默认溯源信息", path.display());
        return None;
    };
    match document.get("@graph").and_then(Value::as_array) {
        Some(graph) => graph
            .iter()
            .find(|e| e.get("@id").and_then(Value::as_str) == Some(ROOT_ID))
            .cloned(),
        // 非 @graph 形式时整个文档即为根实体
        None => Some(document),
    }
}

fn string_field(entity: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| entity.get(*key).and_then(Value::as_str))
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

/// 对其他实体的引用 `{"@id": ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRef {
    #[serde(rename = "@id")]
    pub id: String,
}

impl EntityRef {
    pub fn new(id: &str) -> Self {
        Self { id: id.to_string() }
    }
}

/// RO-Crate 图中的一个实体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CrateEntity {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@type")]
    pub entity_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub about: Option<EntityRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conforms_to: Option<EntityRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub has_part: Vec<EntityRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub used_software: Vec<EntityRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub used_dataset: Vec<EntityRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub generated: Vec<EntityRef>,
}

/// RO-Crate 元数据文档
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoCrate {
    #[serde(rename = "@context")]
    pub context: String,
    #[serde(rename = "@graph")]
    pub graph: Vec<CrateEntity>,
}

/// 计算过程的登记信息
#[derive(Debug, Clone)]
pub struct ComputationRecord<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub command_line: &'a str,
    pub used_software: &'a [String],
    pub inputs: &'a [String],
    pub outputs: &'a [String],
}

impl RoCrate {
    /// 创建只包含元数据描述与根数据集的 RO-Crate
    pub fn new(metadata: &ProvenanceMetadata, description: &str, keywords: &[String]) -> Self {
        let descriptor = CrateEntity {
            id: RO_CRATE_METADATA_FILE.to_string(),
            entity_type: "CreativeWork".to_string(),
            about: Some(EntityRef::new(ROOT_ID)),
            conforms_to: Some(EntityRef::new(RO_CRATE_PROFILE)),
            ..Default::default()
        };
        let root = CrateEntity {
            id: ROOT_ID.to_string(),
            entity_type: "Dataset".to_string(),
            name: Some(metadata.name.clone()),
            description: Some(description.to_string()),
            keywords: keywords.to_vec(),
            date_created: Some(now()),
            organization_name: Some(metadata.organization_name.clone()),
            project_name: Some(metadata.project_name.clone()),
            ..Default::default()
        };
        Self {
            context: RO_CRATE_CONTEXT.to_string(),
            graph: vec![descriptor, root],
        }
    }

    /// 登记软件，返回其 GUID
    pub fn register_software(&mut self, name: &str, description: &str, version: &str, url: &str) -> String {
        self.push(CrateEntity {
            id: new_guid("software"),
            entity_type: "SoftwareApplication".to_string(),
            name: Some(name.to_string()),
            description: Some(description.to_string()),
            version: Some(version.to_string()),
            url: Some(url.to_string()),
            date_created: Some(now()),
            ..Default::default()
        })
    }

    /// 登记数据集，`content_url` 为本地相对路径或远程 URL
    pub fn register_dataset(
        &mut self,
        name: &str,
        description: &str,
        content_url: &str,
        encoding_format: &str,
    ) -> String {
        self.push(CrateEntity {
            id: new_guid("dataset"),
            entity_type: "Dataset".to_string(),
            name: Some(name.to_string()),
            description: Some(description.to_string()),
            content_url: Some(content_url.to_string()),
            encoding_format: Some(encoding_format.to_string()),
            date_created: Some(now()),
            ..Default::default()
        })
    }

    /// 登记一次计算过程
    pub fn register_computation(&mut self, record: ComputationRecord<'_>) -> String {
        let refs = |ids: &[String]| -> Vec<EntityRef> { ids.iter().map(|id| EntityRef::new(id)).collect() };
        self.push(CrateEntity {
            id: new_guid("computation"),
            entity_type: "Computation".to_string(),
            name: Some(record.name.to_string()),
            description: Some(record.description.to_string()),
            command: Some(record.command_line.to_string()),
            date_created: Some(now()),
            used_software: refs(record.used_software),
            used_dataset: refs(record.inputs),
            generated: refs(record.outputs),
            ..Default::default()
        })
    }

    pub fn entity(&self, id: &str) -> Option<&CrateEntity> {
        self.graph.iter().find(|e| e.id == id)
    }

    pub fn root(&self) -> Option<&CrateEntity> {
        self.entity(ROOT_ID)
    }

    fn push(&mut self, entity: CrateEntity) -> String {
        let id = entity.id.clone();
        if let Some(root) = self.graph.iter_mut().find(|e| e.id == ROOT_ID) {
            root.has_part.push(EntityRef::new(&id));
        }
        debug!("📝 登记 {} {}", entity.entity_type, id);
        self.graph.push(entity);
        id
    }

    /// 写入 `<dir>/ro-crate-metadata.json`
    pub fn write(&self, dir: &Path) -> Result<()> {
        let path = dir.join(RO_CRATE_METADATA_FILE);
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content)
            .with_context(|| format!("Failed to write RO-Crate metadata: {}", path.display()))?;
        Ok(())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read RO-Crate metadata: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse RO-Crate metadata: {}", path.display()))
    }
}

fn new_guid(kind: &str) -> String {
    format!("#{}-{}", kind, Uuid::new_v4())
}

fn now() -> String {
    Utc::now().to_rfc3339()
}
