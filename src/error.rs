use std::path::PathBuf;

use thiserror::Error;

/// 层级评估过程中可识别的错误类型
#[derive(Debug, Error)]
pub enum HierarchyEvalError {
    /// 层级目录中既没有 CX2 也没有 CX 网络文件
    #[error("Input directory '{}' contains neither a cx2 nor a cx hierarchy network", .0.display())]
    NoHierarchyNetwork(PathBuf),

    /// 网络文件结构不合法
    #[error("Invalid {format} network '{}': {reason}", .path.display())]
    InvalidNetwork {
        format: String,
        path: PathBuf,
        reason: String,
    },

    /// 参考网络下载失败
    #[error("Unable to fetch reference network {uuid} from {server}: {reason}")]
    ReferenceDownload {
        server: String,
        uuid: String,
        reason: String,
    },

    /// --ollama_prompts 参数格式错误
    #[error("Invalid gene set agent spec '{0}'")]
    InvalidAgentSpec(String),
}
