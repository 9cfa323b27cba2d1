//! 错误处理模块
//!
//! 定义应用程序的统一错误类型

use std::time::Duration;
use thiserror::Error;

/// Fleet Vitals 应用程序的主要错误类型
#[derive(Error, Debug)]
pub enum MonitorError {
    /// 配置相关错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 探测相关错误
    #[error("探测错误: {0}")]
    Probe(#[from] ProbeError),

    /// 编辑/控制边界上的参数错误
    #[error("操作被拒绝: {0}")]
    Edit(#[from] EditError),

    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON序列化/反序列化错误
    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),

    /// 其他错误
    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 配置文件解析错误
    #[error("配置文件解析失败: {0}")]
    ParseError(String),

    /// 配置验证错误
    #[error("配置验证失败: {0}")]
    ValidationError(String),

    /// 配置文件不存在
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    /// 环境变量替换错误
    #[error("环境变量替换失败: {var}")]
    EnvVarError { var: String },
}

/// 编辑与控制操作错误
///
/// 在边界上同步拒绝，且不会修改任何状态。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    /// 目标不存在
    #[error("目标不存在: {0}")]
    TargetNotFound(String),

    /// 地址格式无效
    #[error("地址格式无效: {0}")]
    InvalidAddress(String),

    /// 探测间隔无效
    #[error("探测间隔无效: {0}秒")]
    InvalidInterval(u64),
}

/// 单次探测尝试的错误
///
/// 只在探测器内部流转，对外统一折叠为“不可达”。
#[derive(Error, Debug)]
pub enum ProbeError {
    /// 单次尝试超时
    #[error("探测超时: {0:?}")]
    Timeout(Duration),

    /// 目标无应答
    #[error("目标不可达: {address}")]
    Unreachable { address: String },

    /// 外部命令执行失败
    #[error("命令执行失败: {0}")]
    Command(String),

    /// 底层传输错误（DNS、权限、套接字）
    #[error("传输错误: {0}")]
    Transport(String),
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, MonitorError>;
