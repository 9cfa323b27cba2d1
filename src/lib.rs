//! Fleet Vitals - 主机可达性监控工具
//!
//! 周期性探测一组主机的主地址与带外管理地址，支持：
//! - 带重试与超时的 ping 探测
//! - 管理端点节流与名称前缀准入
//! - 主机健康分类与状态导出
//! - 配置热重载
//! - 结构化日志记录

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod monitor;

// 重新导出主要类型
pub use config::{Config, GlobalConfig};
pub use error::MonitorError;
pub use monitor::{
    Classification, Classifier, CycleScheduler, EndpointKind, EndpointState, Scheduler,
    TargetRegistry,
};

/// 应用程序版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 应用程序名称
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// 应用程序描述
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
