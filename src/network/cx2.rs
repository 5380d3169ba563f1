//! CX2 格式网络助手

use anyhow::{Context, Result};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::HierarchyEvalError;
use crate::network::{AttributeValue, NetworkFormat, NetworkHelper};

const NODES: &str = "nodes";
const EDGES: &str = "edges";
const ATTRIBUTE_DECLARATIONS: &str = "attributeDeclarations";
const NETWORK_ATTRIBUTES: &str = "networkAttributes";

/// 基于 CX2 aspect 列表的网络助手
///
/// 节点的 `v` 值在加载时会把别名还原为完整属性名，
/// 写出时节点属性声明不再带别名，其余 aspect 原样保留。
#[derive(Debug, Clone)]
pub struct Cx2NetworkHelper {
    path: PathBuf,
    aspects: Vec<Value>,
    /// 节点原始对象（id、v、x、y...）
    nodes: Vec<Map<String, Value>>,
    node_index: HashMap<i64, usize>,
    edges: Vec<(i64, i64)>,
    node_declarations: Map<String, Value>,
    name: Option<String>,
}

impl Cx2NetworkHelper {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read CX2 network: {}", path.display()))?;
        Self::parse(&content, path)
    }

    pub fn from_value(value: Value, path: &Path) -> Result<Self> {
        let aspects = match value {
            Value::Array(aspects) => aspects,
            _ => {
                return Err(HierarchyEvalError::InvalidNetwork {
                    format: NetworkFormat::Cx2.to_string(),
                    path: path.to_path_buf(),
                    reason: "not a JSON aspect list".to_string(),
                }
                .into());
            }
        };
        Self::from_aspects(aspects, path)
    }

    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let value: Value =
            serde_json::from_str(content).map_err(|e| HierarchyEvalError::InvalidNetwork {
                format: NetworkFormat::Cx2.to_string(),
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        Self::from_value(value, path)
    }

    fn from_aspects(aspects: Vec<Value>, path: &Path) -> Result<Self> {
        let invalid = |reason: &str| HierarchyEvalError::InvalidNetwork {
            format: NetworkFormat::Cx2.to_string(),
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };

        // 先读取属性声明，节点值的别名解析依赖它
        let mut aliases: HashMap<String, String> = HashMap::new();
        let mut node_declarations = Map::new();
        for aspect in &aspects {
            let Some(decls) = aspect.get(ATTRIBUTE_DECLARATIONS).and_then(Value::as_array) else {
                continue;
            };
            for decl in decls {
                if let Some(nodes) = decl.get(NODES).and_then(Value::as_object) {
                    for (name, spec) in nodes {
                        if let Some(alias) = spec.get("a").and_then(Value::as_str) {
                            aliases.insert(alias.to_string(), name.clone());
                        }
                        node_declarations.insert(name.clone(), spec.clone());
                    }
                }
            }
        }

        let mut helper = Self {
            path: path.to_path_buf(),
            aspects: Vec::new(),
            nodes: Vec::new(),
            node_index: HashMap::new(),
            edges: Vec::new(),
            node_declarations: Map::new(),
            name: None,
        };

        for aspect in &aspects {
            let Some(fragment) = aspect.as_object() else {
                return Err(invalid("aspect fragment is not an object").into());
            };
            for (aspect_name, elements) in fragment {
                let elements = elements.as_array().map(Vec::as_slice).unwrap_or(&[]);
                match aspect_name.as_str() {
                    NODES => {
                        for element in elements {
                            let mut node = element
                                .as_object()
                                .cloned()
                                .ok_or_else(|| invalid("node is not an object"))?;
                            let id = node
                                .get("id")
                                .and_then(Value::as_i64)
                                .ok_or_else(|| invalid("node without id"))?;
                            if let Some(Value::Object(values)) = node.remove("v") {
                                let resolved: Map<String, Value> = values
                                    .into_iter()
                                    .map(|(key, value)| {
                                        (aliases.get(&key).cloned().unwrap_or(key), value)
                                    })
                                    .collect();
                                node.insert("v".to_string(), Value::Object(resolved));
                            }
                            helper.node_index.insert(id, helper.nodes.len());
                            helper.nodes.push(node);
                        }
                    }
                    EDGES => {
                        for element in elements {
                            let source = element.get("s").and_then(Value::as_i64);
                            let target = element.get("t").and_then(Value::as_i64);
                            match (source, target) {
                                (Some(s), Some(t)) => helper.edges.push((s, t)),
                                _ => return Err(invalid("edge without s/t").into()),
                            }
                        }
                    }
                    NETWORK_ATTRIBUTES => {
                        if let Some(name) = elements
                            .iter()
                            .find_map(|e| e.get("name"))
                            .and_then(Value::as_str)
                        {
                            helper.name = Some(name.to_string());
                        }
                    }
                    _ => {}
                }
            }
        }

        // 节点值已展开为完整属性名，声明中去掉别名
        for spec in node_declarations.values_mut() {
            if let Some(spec) = spec.as_object_mut() {
                spec.remove("a");
            }
        }
        helper.node_declarations = node_declarations;
        helper.aspects = aspects;
        Ok(helper)
    }

    fn declared_type(&self, name: &str) -> Option<&str> {
        self.node_declarations
            .get(name)
            .and_then(|d| d.get("d"))
            .and_then(Value::as_str)
    }

    fn declared_default(&self, name: &str) -> Option<&Value> {
        self.node_declarations.get(name).and_then(|d| d.get("v"))
    }

    /// 重新生成 aspect 列表：合并 nodes 片段、更新节点属性声明
    fn render(&self) -> Vec<Value> {
        let nodes: Vec<Value> = self.nodes.iter().cloned().map(Value::Object).collect();
        let mut nodes_fragment = Some(json!({ NODES: nodes }));
        let mut has_declarations = false;

        let mut rendered = Vec::with_capacity(self.aspects.len() + 1);
        for aspect in &self.aspects {
            let Some(fragment) = aspect.as_object() else {
                continue;
            };
            if fragment.contains_key(NODES) {
                if let Some(f) = nodes_fragment.take() {
                    rendered.push(f);
                }
                continue;
            }
            if let Some(decls) = fragment.get(ATTRIBUTE_DECLARATIONS).and_then(Value::as_array) {
                has_declarations = true;
                rendered.push(json!({ ATTRIBUTE_DECLARATIONS: self.render_declarations(decls) }));
                continue;
            }
            rendered.push(aspect.clone());
        }
        if let Some(f) = nodes_fragment.take() {
            rendered.push(f);
        }
        if !has_declarations && !self.node_declarations.is_empty() {
            // 声明必须出现在 nodes 之前，紧跟 CXVersion/metaData
            let position = rendered
                .iter()
                .position(|a| a.get("CXVersion").is_none() && a.get("metaData").is_none())
                .unwrap_or(rendered.len());
            rendered.insert(
                position,
                json!({ ATTRIBUTE_DECLARATIONS: [{ NODES: self.node_declarations.clone() }] }),
            );
        }
        rendered
    }

    fn render_declarations(&self, decls: &[Value]) -> Vec<Value> {
        let mut decls = decls.to_vec();
        if decls.is_empty() {
            decls.push(json!({}));
        }
        // 只有第一个声明对象持有节点声明
        for (i, decl) in decls.iter_mut().enumerate() {
            if let Some(decl) = decl.as_object_mut() {
                if i == 0 {
                    decl.insert(
                        NODES.to_string(),
                        Value::Object(self.node_declarations.clone()),
                    );
                } else {
                    decl.remove(NODES);
                }
            }
        }
        decls
    }
}

impl NetworkHelper for Cx2NetworkHelper {
    fn format(&self) -> NetworkFormat {
        NetworkFormat::Cx2
    }

    fn name(&self) -> Option<String> {
        self.name.clone()
    }

    fn node_ids(&self) -> Vec<i64> {
        self.nodes
            .iter()
            .filter_map(|n| n.get("id").and_then(Value::as_i64))
            .collect()
    }

    fn node_name(&self, node_id: i64) -> Option<String> {
        self.node_attribute(node_id, "name")
            .and_then(|v| v.as_str().map(str::to_string))
    }

    fn node_attribute(&self, node_id: i64, name: &str) -> Option<AttributeValue> {
        let node = &self.nodes[*self.node_index.get(&node_id)?];
        let value = node
            .get("v")
            .and_then(|v| v.get(name))
            .or_else(|| self.declared_default(name))?;
        AttributeValue::from_json(value, self.declared_type(name))
    }

    fn set_node_attribute(&mut self, node_id: i64, name: &str, value: AttributeValue) {
        let Some(&index) = self.node_index.get(&node_id) else {
            return;
        };
        if self.declared_type(name) != Some(value.data_type()) {
            self.node_declarations
                .insert(name.to_string(), json!({ "d": value.data_type() }));
        }
        let node = &mut self.nodes[index];
        let values = node
            .entry("v")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Some(values) = values.as_object_mut() {
            values.insert(name.to_string(), value.to_json());
        }
    }

    fn edges(&self) -> Vec<(i64, i64)> {
        self.edges.clone()
    }

    fn write(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string(&self.render())?;
        fs::write(path, content).with_context(|| {
            format!(
                "Failed to write CX2 network {} (loaded from {})",
                path.display(),
                self.path.display()
            )
        })?;
        Ok(())
    }
}
