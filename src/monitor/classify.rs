//! 主机健康分类
//!
//! 根据两个端点的状态推导单一分类，每次读取时重新计算，不缓存。

use crate::monitor::target::{Endpoint, EndpointState, Target};
use serde::{Deserialize, Serialize};

/// 主机健康分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// 所有已配置端点都可达
    Ok,
    /// 部分已配置端点不可达
    PartialFailure,
    /// 所有已配置端点都不可达
    FullFailure,
    /// 无结论（无端点、尚未探测，或尽力而为类主机未出现故障）
    Neutral,
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Classification::Ok => write!(f, "正常"),
            Classification::PartialFailure => write!(f, "部分故障"),
            Classification::FullFailure => write!(f, "完全故障"),
            Classification::Neutral => write!(f, "-"),
        }
    }
}

impl Classification {
    /// 是否属于故障分类
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Classification::PartialFailure | Classification::FullFailure
        )
    }
}

/// 默认的尽力而为主机名称前缀
pub const DEFAULT_BEST_EFFORT_PREFIXES: &[&str] = &["micro"];

/// 分类器
///
/// 名称匹配尽力而为前缀（不区分大小写）的主机只会被标记故障，
/// 不会被标记为正常。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classifier {
    best_effort_prefixes: Vec<String>,
}

impl Classifier {
    /// 创建分类器
    pub fn new(best_effort_prefixes: Vec<String>) -> Self {
        let best_effort_prefixes = best_effort_prefixes
            .into_iter()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        Self {
            best_effort_prefixes,
        }
    }

    /// 名称是否命中尽力而为前缀
    pub fn is_best_effort(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.best_effort_prefixes
            .iter()
            .any(|p| name.starts_with(p.as_str()))
    }

    /// 计算目标的分类
    pub fn classify(&self, target: &Target) -> Classification {
        let present: Vec<&Endpoint> = [target.primary(), target.management()]
            .into_iter()
            .filter(|e| e.has_address())
            .collect();

        if self.is_best_effort(&target.name) {
            return if present.iter().any(|e| !e.state().is_up()) {
                Classification::FullFailure
            } else {
                Classification::Neutral
            };
        }

        if present.is_empty()
            || present
                .iter()
                .all(|e| e.state() == EndpointState::Unknown)
        {
            return Classification::Neutral;
        }

        // 只按已配置且不可达的端点数量判定，未探测的端点不计为故障
        let down = present
            .iter()
            .filter(|e| e.state() == EndpointState::Down)
            .count();
        if down == 0 {
            Classification::Ok
        } else if down == present.len() {
            Classification::FullFailure
        } else {
            Classification::PartialFailure
        }
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(
            DEFAULT_BEST_EFFORT_PREFIXES
                .iter()
                .map(|p| p.to_string())
                .collect(),
        )
    }
}
