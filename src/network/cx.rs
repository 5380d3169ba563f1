//! CX (1.x) 格式网络助手

use anyhow::{Context, Result};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::HierarchyEvalError;
use crate::network::{AttributeValue, NetworkFormat, NetworkHelper};

const NODES: &str = "nodes";
const EDGES: &str = "edges";
const NODE_ATTRIBUTES: &str = "nodeAttributes";
const NETWORK_ATTRIBUTES: &str = "networkAttributes";
const META_DATA: &str = "metaData";
const STATUS: &str = "status";

#[derive(Debug, Clone)]
struct CxNode {
    id: i64,
    name: Option<String>,
}

/// 节点属性，`subnet` 对应 CX 元素中可选的 `s` 子网络ID
#[derive(Debug, Clone)]
struct CxNodeAttribute {
    name: String,
    subnet: Option<i64>,
    value: AttributeValue,
}

/// 基于 CX 片段列表的网络助手，写出时保留所有未修改的 aspect
#[derive(Debug, Clone)]
pub struct CxNetworkHelper {
    path: PathBuf,
    aspects: Vec<Value>,
    nodes: Vec<CxNode>,
    node_index: HashMap<i64, usize>,
    edges: Vec<(i64, i64)>,
    /// 每个节点的属性，保留原始顺序
    node_attributes: HashMap<i64, Vec<CxNodeAttribute>>,
    name: Option<String>,
}

impl CxNetworkHelper {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read CX network: {}", path.display()))?;
        Self::parse(&content, path)
    }

    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let invalid = |reason: String| HierarchyEvalError::InvalidNetwork {
            format: NetworkFormat::Cx.to_string(),
            path: path.to_path_buf(),
            reason,
        };

        let aspects: Vec<Value> = serde_json::from_str(content)
            .map_err(|e| invalid(format!("not a JSON aspect list: {}", e)))?;

        let mut helper = Self {
            path: path.to_path_buf(),
            aspects: Vec::new(),
            nodes: Vec::new(),
            node_index: HashMap::new(),
            edges: Vec::new(),
            node_attributes: HashMap::new(),
            name: None,
        };

        for aspect in &aspects {
            let Some(fragment) = aspect.as_object() else {
                return Err(invalid("aspect fragment is not an object".to_string()).into());
            };
            for (aspect_name, elements) in fragment {
                let elements = elements.as_array().map(Vec::as_slice).unwrap_or(&[]);
                match aspect_name.as_str() {
                    NODES => {
                        for element in elements {
                            let id = element
                                .get("@id")
                                .and_then(Value::as_i64)
                                .ok_or_else(|| invalid("node without @id".to_string()))?;
                            let name = element
                                .get("n")
                                .and_then(Value::as_str)
                                .map(str::to_string);
                            helper.node_index.insert(id, helper.nodes.len());
                            helper.nodes.push(CxNode { id, name });
                        }
                    }
                    EDGES => {
                        for element in elements {
                            let source = element.get("s").and_then(Value::as_i64);
                            let target = element.get("t").and_then(Value::as_i64);
                            match (source, target) {
                                (Some(s), Some(t)) => helper.edges.push((s, t)),
                                _ => return Err(invalid("edge without s/t".to_string()).into()),
                            }
                        }
                    }
                    NODE_ATTRIBUTES => {
                        for element in elements {
                            helper.read_node_attribute(element);
                        }
                    }
                    NETWORK_ATTRIBUTES => {
                        if let Some(name) = elements
                            .iter()
                            .find(|e| e.get("n").and_then(Value::as_str) == Some("name"))
                            .and_then(|e| e.get("v"))
                            .and_then(Value::as_str)
                        {
                            helper.name = Some(name.to_string());
                        }
                    }
                    _ => {}
                }
            }
        }

        helper.aspects = aspects;
        Ok(helper)
    }

    fn read_node_attribute(&mut self, element: &Value) {
        let (Some(name), Some(value)) = (
            element.get("n").and_then(Value::as_str),
            element.get("v"),
        ) else {
            return;
        };
        let subnet = element.get("s").and_then(Value::as_i64);
        let data_type = element.get("d").and_then(Value::as_str).unwrap_or("string");
        let Some(value) = AttributeValue::from_json(value, Some(data_type)) else {
            return;
        };

        // po 可能是单个ID或ID列表
        let owners: Vec<i64> = match element.get("po") {
            Some(Value::Array(ids)) => ids.iter().filter_map(Value::as_i64).collect(),
            Some(id) => id.as_i64().into_iter().collect(),
            None => Vec::new(),
        };
        for owner in owners {
            self.upsert_attribute(owner, name, subnet, value.clone());
        }
    }

    /// 同名且同一子网络的属性只保留最后一个值
    fn upsert_attribute(
        &mut self,
        node_id: i64,
        name: &str,
        subnet: Option<i64>,
        value: AttributeValue,
    ) {
        let attributes = self.node_attributes.entry(node_id).or_default();
        match attributes
            .iter_mut()
            .find(|a| a.name == name && a.subnet == subnet)
        {
            Some(slot) => slot.value = value,
            None => attributes.push(CxNodeAttribute {
                name: name.to_string(),
                subnet,
                value,
            }),
        }
    }

    /// 按名称查找属性：优先不带子网络的值，否则取第一个
    fn find_attribute(&self, node_id: i64, name: &str) -> Option<&CxNodeAttribute> {
        let attributes = self.node_attributes.get(&node_id)?;
        attributes
            .iter()
            .find(|a| a.name == name && a.subnet.is_none())
            .or_else(|| attributes.iter().find(|a| a.name == name))
    }

    fn node_attribute_elements(&self) -> Vec<Value> {
        let mut elements = Vec::new();
        for node in &self.nodes {
            let Some(attributes) = self.node_attributes.get(&node.id) else {
                continue;
            };
            for attribute in attributes {
                let mut element = Map::new();
                element.insert("po".to_string(), json!(node.id));
                element.insert("n".to_string(), json!(attribute.name));
                element.insert("v".to_string(), attribute.value.to_json());
                if let Some(subnet) = attribute.subnet {
                    element.insert("s".to_string(), json!(subnet));
                }
                // string 为 CX 默认类型，省略 d 字段
                if attribute.value.data_type() != "string" {
                    element.insert("d".to_string(), json!(attribute.value.data_type()));
                }
                elements.push(Value::Object(element));
            }
        }
        elements
    }

    /// 重新生成 aspect 列表：合并 nodeAttributes 片段并同步 metaData 计数
    fn render(&self) -> Vec<Value> {
        let attribute_elements = self.node_attribute_elements();
        let attribute_count = attribute_elements.len();
        let mut attribute_fragment = Some(json!({ NODE_ATTRIBUTES: attribute_elements }));

        let mut rendered = Vec::with_capacity(self.aspects.len() + 1);
        for aspect in &self.aspects {
            let Some(fragment) = aspect.as_object() else {
                continue;
            };
            if fragment.contains_key(NODE_ATTRIBUTES) {
                if let Some(f) = attribute_fragment.take() {
                    rendered.push(f);
                }
                continue;
            }
            if fragment.contains_key(STATUS)
                && let Some(f) = attribute_fragment.take()
            {
                rendered.push(f);
            }
            if let Some(meta) = fragment.get(META_DATA).and_then(Value::as_array) {
                rendered.push(json!({ META_DATA: sync_meta_data(meta, attribute_count) }));
                continue;
            }
            rendered.push(aspect.clone());
        }
        if let Some(f) = attribute_fragment.take() {
            rendered.push(f);
        }
        rendered
    }
}

fn sync_meta_data(meta: &[Value], attribute_count: usize) -> Vec<Value> {
    let mut meta = meta.to_vec();
    match meta
        .iter_mut()
        .find(|m| m.get("name").and_then(Value::as_str) == Some(NODE_ATTRIBUTES))
    {
        Some(entry) => entry["elementCount"] = json!(attribute_count),
        None => meta.push(json!({
            "name": NODE_ATTRIBUTES,
            "elementCount": attribute_count,
            "version": "1.0",
            "consistencyGroup": 1,
        })),
    }
    meta
}

impl NetworkHelper for CxNetworkHelper {
    fn format(&self) -> NetworkFormat {
        NetworkFormat::Cx
    }

    fn name(&self) -> Option<String> {
        self.name.clone()
    }

    fn node_ids(&self) -> Vec<i64> {
        self.nodes.iter().map(|n| n.id).collect()
    }

    fn node_name(&self, node_id: i64) -> Option<String> {
        self.node_index
            .get(&node_id)
            .and_then(|&i| self.nodes[i].name.clone())
    }

    fn node_attribute(&self, node_id: i64, name: &str) -> Option<AttributeValue> {
        self.find_attribute(node_id, name).map(|a| a.value.clone())
    }

    /// 覆盖 `node_attribute` 返回的那一项，保留其子网络ID
    fn set_node_attribute(&mut self, node_id: i64, name: &str, value: AttributeValue) {
        if !self.node_index.contains_key(&node_id) {
            return;
        }
        let subnet = self.find_attribute(node_id, name).and_then(|a| a.subnet);
        self.upsert_attribute(node_id, name, subnet, value);
    }

    fn edges(&self) -> Vec<(i64, i64)> {
        self.edges.clone()
    }

    fn write(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string(&self.render())?;
        fs::write(path, content).with_context(|| {
            format!(
                "Failed to write CX network {} (loaded from {})",
                path.display(),
                self.path.display()
            )
        })?;
        Ok(())
    }
}
