//! 配置数据结构定义
//!
//! 定义全局配置、主机列表以及验证逻辑

use crate::monitor::classify::{Classifier, DEFAULT_BEST_EFFORT_PREFIXES};
use crate::monitor::policy::{
    EligibilityPolicy, ProbeGate, ThrottlePolicy, DEFAULT_MANAGEMENT_SPACING_SECS,
};
use crate::monitor::prober::PingProber;
use crate::monitor::registry::validate_address;
use crate::monitor::scheduler::SchedulerSettings;
use crate::monitor::target::HostRow;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// 主配置结构，包含全局配置和主机列表
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// 全局配置项
    #[serde(default)]
    pub global: GlobalConfig,
    /// 主机列表
    #[serde(default)]
    pub hosts: Vec<HostRow>,
}

/// 全局配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlobalConfig {
    /// 探测间隔（秒）
    #[serde(default = "default_check_interval")]
    pub check_interval_seconds: u64,
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 单次探测尝试超时（秒）
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_seconds: u64,
    /// 每次探测的尝试次数
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// 单个周期内的最大并发探测数
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_probes: usize,
    /// 管理端点最小探测间隔（秒）
    #[serde(default = "default_management_spacing")]
    pub management_min_spacing_seconds: u64,
    /// 允许探测的主机名称前缀，为空表示全部允许
    #[serde(default)]
    pub probe_name_prefixes: Vec<String>,
    /// 尽力而为主机名称前缀（不区分大小写）
    #[serde(default = "default_best_effort_prefixes")]
    pub best_effort_prefixes: Vec<String>,
    /// 状态快照输出文件
    pub status_file: Option<PathBuf>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            check_interval_seconds: default_check_interval(),
            log_level: default_log_level(),
            probe_timeout_seconds: default_probe_timeout(),
            retry_attempts: default_retry_attempts(),
            max_concurrent_probes: default_max_concurrent(),
            management_min_spacing_seconds: default_management_spacing(),
            probe_name_prefixes: Vec::new(),
            best_effort_prefixes: default_best_effort_prefixes(),
            status_file: None,
        }
    }
}

impl GlobalConfig {
    /// 调度器设置
    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            gate: ProbeGate::new(
                EligibilityPolicy::new(self.probe_name_prefixes.clone()),
                ThrottlePolicy::new(self.management_min_spacing_seconds),
            ),
            attempts: self.retry_attempts,
            max_concurrent_probes: self.max_concurrent_probes,
        }
    }

    /// 分类器
    pub fn classifier(&self) -> Classifier {
        Classifier::new(self.best_effort_prefixes.clone())
    }

    /// ping 探测器
    pub fn ping_prober(&self) -> PingProber {
        PingProber::new(Duration::from_secs(self.probe_timeout_seconds))
    }
}

// 默认值函数
fn default_check_interval() -> u64 {
    10
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_probe_timeout() -> u64 {
    1
}
fn default_retry_attempts() -> u32 {
    crate::monitor::prober::DEFAULT_PROBE_ATTEMPTS
}
fn default_max_concurrent() -> usize {
    32
}
fn default_management_spacing() -> u64 {
    DEFAULT_MANAGEMENT_SPACING_SECS
}
fn default_best_effort_prefixes() -> Vec<String> {
    DEFAULT_BEST_EFFORT_PREFIXES
        .iter()
        .map(|p| p.to_string())
        .collect()
}

/// 配置验证函数
///
/// # 参数
/// * `config` - 要验证的配置
///
/// # 返回
/// * `Result<(), String>` - 验证结果，错误时返回错误信息
pub fn validate_config(config: &Config) -> Result<(), String> {
    let global = &config.global;

    if global.check_interval_seconds == 0 {
        return Err("探测间隔不能为0".to_string());
    }

    if global.probe_timeout_seconds == 0 {
        return Err("探测超时时间不能为0".to_string());
    }

    if global.max_concurrent_probes == 0 {
        return Err("最大并发探测数不能为0".to_string());
    }

    if global.retry_attempts == 0 {
        return Err("探测尝试次数不能为0".to_string());
    }

    let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_log_levels.contains(&global.log_level.as_str()) {
        return Err(format!(
            "无效的日志级别: {}，支持的级别: {:?}",
            global.log_level, valid_log_levels
        ));
    }

    // 主机列表为空是合法的，引擎空转
    let mut names = HashSet::new();
    for host in &config.hosts {
        let name = host.name.trim();
        if !name.is_empty() && !names.insert(name) {
            return Err(format!("主机名称重复: {}", name));
        }

        for (label, address) in [("主地址", &host.primary), ("管理地址", &host.management)] {
            if validate_address(address).is_err() {
                return Err(format!("主机 {} 的{}格式无效: {}", name, label, address));
            }
        }
    }

    Ok(())
}
