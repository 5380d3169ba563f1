//! 层级网络助手 - 为 CX 与 CX2 两种交换格式提供统一的节点/属性访问接口

use anyhow::Result;
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::error::HierarchyEvalError;

pub mod cx;
pub mod cx2;

pub use cx::CxNetworkHelper;
pub use cx2::Cx2NetworkHelper;

/// 层级网络文件名前缀
pub const HIERARCHY_NETWORK_PREFIX: &str = "hierarchy";

/// 层级所基于的父交互网络文件名前缀
pub const HIERARCHY_PARENT_NETWORK_PREFIX: &str = "hierarchy_parent";

pub const CX_SUFFIX: &str = ".cx";
pub const CX2_SUFFIX: &str = ".cx2";

/// 社区成员基因列表属性
pub const MEMBER_LIST_ATTRIBUTE: &str = "CD_MemberList";

/// 网络交换格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkFormat {
    Cx,
    Cx2,
}

impl std::fmt::Display for NetworkFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkFormat::Cx => write!(f, "cx"),
            NetworkFormat::Cx2 => write!(f, "cx2"),
        }
    }
}

impl NetworkFormat {
    pub fn suffix(&self) -> &'static str {
        match self {
            NetworkFormat::Cx => CX_SUFFIX,
            NetworkFormat::Cx2 => CX2_SUFFIX,
        }
    }

    /// 拼接带格式后缀的文件名
    pub fn file_name(&self, prefix: &str) -> String {
        format!("{}{}", prefix, self.suffix())
    }

    /// 根据目录中存在的层级文件判断格式，CX2 优先
    pub fn detect(hierarchy_dir: &Path) -> Result<Self, HierarchyEvalError> {
        [NetworkFormat::Cx2, NetworkFormat::Cx]
            .into_iter()
            .find(|format| {
                hierarchy_dir
                    .join(format.file_name(HIERARCHY_NETWORK_PREFIX))
                    .exists()
            })
            .ok_or_else(|| HierarchyEvalError::NoHierarchyNetwork(hierarchy_dir.to_path_buf()))
    }
}

/// 带类型的属性值，类型名称与 CX/CX2 的 `d` 字段一致
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    String(String),
    Integer(i64),
    Long(i64),
    Double(f64),
    Boolean(bool),
    ListOfString(Vec<String>),
    ListOfInteger(Vec<i64>),
    ListOfLong(Vec<i64>),
    ListOfDouble(Vec<f64>),
    ListOfBoolean(Vec<bool>),
}

impl AttributeValue {
    pub fn data_type(&self) -> &'static str {
        match self {
            AttributeValue::String(_) => "string",
            AttributeValue::Integer(_) => "integer",
            AttributeValue::Long(_) => "long",
            AttributeValue::Double(_) => "double",
            AttributeValue::Boolean(_) => "boolean",
            AttributeValue::ListOfString(_) => "list_of_string",
            AttributeValue::ListOfInteger(_) => "list_of_integer",
            AttributeValue::ListOfLong(_) => "list_of_long",
            AttributeValue::ListOfDouble(_) => "list_of_double",
            AttributeValue::ListOfBoolean(_) => "list_of_boolean",
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            AttributeValue::String(v) => Value::from(v.as_str()),
            AttributeValue::Integer(v) | AttributeValue::Long(v) => Value::from(*v),
            AttributeValue::Double(v) => Value::from(*v),
            AttributeValue::Boolean(v) => Value::from(*v),
            AttributeValue::ListOfString(v) => Value::from(v.clone()),
            AttributeValue::ListOfInteger(v) | AttributeValue::ListOfLong(v) => {
                Value::from(v.clone())
            }
            AttributeValue::ListOfDouble(v) => Value::from(v.clone()),
            AttributeValue::ListOfBoolean(v) => Value::from(v.clone()),
        }
    }

    /// 按声明的类型解析 JSON 值；未声明类型时根据 JSON 值推断
    pub fn from_json(value: &Value, data_type: Option<&str>) -> Option<Self> {
        match data_type {
            None => Self::infer(value),
            Some("string") => match value {
                Value::String(s) => Some(AttributeValue::String(s.clone())),
                Value::Null | Value::Array(_) | Value::Object(_) => None,
                other => Some(AttributeValue::String(other.to_string())),
            },
            Some("integer") => scalar_i64(value).map(AttributeValue::Integer),
            Some("long") => scalar_i64(value).map(AttributeValue::Long),
            Some("double") => scalar_f64(value).map(AttributeValue::Double),
            Some("boolean") => scalar_bool(value).map(AttributeValue::Boolean),
            Some("list_of_string") => list_of(value, |v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .map(AttributeValue::ListOfString),
            Some("list_of_integer") => list_of(value, scalar_i64).map(AttributeValue::ListOfInteger),
            Some("list_of_long") => list_of(value, scalar_i64).map(AttributeValue::ListOfLong),
            Some("list_of_double") => list_of(value, scalar_f64).map(AttributeValue::ListOfDouble),
            Some("list_of_boolean") => {
                list_of(value, scalar_bool).map(AttributeValue::ListOfBoolean)
            }
            Some(_) => Self::infer(value),
        }
    }

    fn infer(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(AttributeValue::String(s.clone())),
            Value::Bool(b) => Some(AttributeValue::Boolean(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(AttributeValue::Integer(i)),
                None => n.as_f64().map(AttributeValue::Double),
            },
            Value::Array(items) => {
                if items.iter().all(Value::is_string) {
                    list_of(value, |v| v.as_str().map(str::to_string))
                        .map(AttributeValue::ListOfString)
                } else if items.iter().all(|v| v.is_i64()) {
                    list_of(value, Value::as_i64).map(AttributeValue::ListOfInteger)
                } else if items.iter().all(Value::is_number) {
                    list_of(value, Value::as_f64).map(AttributeValue::ListOfDouble)
                } else if items.iter().all(Value::is_boolean) {
                    list_of(value, Value::as_bool).map(AttributeValue::ListOfBoolean)
                } else {
                    None
                }
            }
            Value::Null | Value::Object(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// 列表类型属性的元素个数，非列表返回 None
    pub fn list_len(&self) -> Option<usize> {
        match self {
            AttributeValue::ListOfString(v) => Some(v.len()),
            AttributeValue::ListOfInteger(v) | AttributeValue::ListOfLong(v) => Some(v.len()),
            AttributeValue::ListOfDouble(v) => Some(v.len()),
            AttributeValue::ListOfBoolean(v) => Some(v.len()),
            _ => None,
        }
    }
}

fn scalar_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn scalar_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn scalar_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => s.trim().to_lowercase().parse().ok(),
        _ => None,
    }
}

fn list_of<T>(value: &Value, convert: impl Fn(&Value) -> Option<T>) -> Option<Vec<T>> {
    value.as_array()?.iter().map(convert).collect()
}

/// 将成员属性拆分为基因列表，兼容空格/逗号分隔的字符串和字符串列表
pub fn parse_gene_list(value: &AttributeValue) -> Vec<String> {
    let mut genes: Vec<String> = Vec::new();
    let mut push = |token: &str| {
        let token = token.trim();
        if !token.is_empty() && !genes.iter().any(|g| g == token) {
            genes.push(token.to_string());
        }
    };
    match value {
        AttributeValue::String(s) => s
            .split(|c: char| c.is_whitespace() || c == ',')
            .for_each(&mut push),
        AttributeValue::ListOfString(items) => items.iter().for_each(|s| push(s)),
        _ => {}
    }
    genes
}

/// 网络助手统一接口
pub trait NetworkHelper: Send {
    /// 网络文件格式
    fn format(&self) -> NetworkFormat;

    /// 网络名称（networkAttributes 中的 name）
    fn name(&self) -> Option<String>;

    /// 所有节点ID，按文件中出现的顺序
    fn node_ids(&self) -> Vec<i64>;

    /// 节点名称
    fn node_name(&self, node_id: i64) -> Option<String>;

    fn node_attribute(&self, node_id: i64, name: &str) -> Option<AttributeValue>;

    /// 设置节点属性，已存在则覆盖；未知节点忽略
    fn set_node_attribute(&mut self, node_id: i64, name: &str, value: AttributeValue);

    /// 所有边 (source, target)；层级网络中 source 为父社区，target 为子社区
    fn edges(&self) -> Vec<(i64, i64)>;

    /// 按原格式写出网络
    fn write(&self, path: &Path) -> Result<()>;

    /// 返回候选属性中第一个存在的属性值
    fn first_attribute(&self, node_id: i64, names: &[&str]) -> Option<AttributeValue> {
        names
            .iter()
            .find_map(|name| self.node_attribute(node_id, name))
    }

    /// 社区成员基因
    fn members(&self, node_id: i64) -> Vec<String> {
        self.node_attribute(node_id, MEMBER_LIST_ATTRIBUTE)
            .map(|value| parse_gene_list(&value))
            .unwrap_or_default()
    }
}

/// 按指定格式加载网络文件
pub fn load_network(path: &Path, format: NetworkFormat) -> Result<Box<dyn NetworkHelper>> {
    let helper: Box<dyn NetworkHelper> = match format {
        NetworkFormat::Cx => Box::new(CxNetworkHelper::from_file(path)?),
        NetworkFormat::Cx2 => Box::new(Cx2NetworkHelper::from_file(path)?),
    };
    Ok(helper)
}

/// 层级网络文件路径
pub fn hierarchy_file(hierarchy_dir: &Path, format: NetworkFormat) -> PathBuf {
    hierarchy_dir.join(format.file_name(HIERARCHY_NETWORK_PREFIX))
}

/// 检测层级目录中的格式并加载对应的网络助手
pub fn open_hierarchy(hierarchy_dir: &Path) -> Result<Box<dyn NetworkHelper>> {
    let format = NetworkFormat::detect(hierarchy_dir)?;
    load_network(&hierarchy_file(hierarchy_dir, format), format)
}
