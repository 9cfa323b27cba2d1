//! 探测准入策略
//!
//! 包含按端点类型的节流策略与按名称前缀的资格策略，
//! 两者在每次派发探测前共同判定。

use crate::monitor::target::{EndpointKind, Target};
use chrono::{DateTime, Duration, Utc};

/// 管理端点两次成功探测之间的默认最小间隔（秒）
pub const DEFAULT_MANAGEMENT_SPACING_SECS: u64 = 60;

/// 节流策略
///
/// 主端点每个周期都可探测；管理端点在上次成功后的间隔内不再探测。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottlePolicy {
    management_min_spacing: Duration,
}

impl ThrottlePolicy {
    /// 创建节流策略
    ///
    /// # 参数
    /// * `management_min_spacing_secs` - 管理端点最小探测间隔（秒）
    pub fn new(management_min_spacing_secs: u64) -> Self {
        let secs = i64::try_from(management_min_spacing_secs).unwrap_or(i64::MAX);
        Self {
            management_min_spacing: Duration::try_seconds(secs).unwrap_or(Duration::MAX),
        }
    }

    /// 判断本周期是否应当探测该端点
    pub fn should_probe(&self, kind: EndpointKind, target: &Target, now: DateTime<Utc>) -> bool {
        let endpoint = target.endpoint(kind);
        if !endpoint.has_address() || endpoint.is_editing() {
            return false;
        }

        match kind {
            EndpointKind::Primary => true,
            EndpointKind::Management => endpoint
                .last_success_at()
                .is_none_or(|last| now - last >= self.management_min_spacing),
        }
    }
}

impl Default for ThrottlePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MANAGEMENT_SPACING_SECS)
    }
}

/// 资格策略：只探测名称匹配前缀白名单的目标
///
/// 白名单为空时所有目标都有资格。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EligibilityPolicy {
    prefixes: Vec<String>,
}

impl EligibilityPolicy {
    /// 创建资格策略
    pub fn new(prefixes: Vec<String>) -> Self {
        let prefixes = prefixes
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        Self { prefixes }
    }

    /// 判断名称是否有资格被探测
    pub fn is_eligible(&self, name: &str) -> bool {
        self.prefixes.is_empty() || self.prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }
}

/// 准入判定结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// 派发探测
    Probe,
    /// 名称不在白名单内，整台主机跳过
    Ineligible,
    /// 端点未配置地址
    NoAddress,
    /// 端点地址正在编辑
    Editing,
    /// 管理端点仍处于节流间隔内
    Throttled,
}

impl GateDecision {
    /// 是否派发探测
    pub fn admits(&self) -> bool {
        matches!(self, GateDecision::Probe)
    }
}

/// 探测闸门：资格策略 + 节流策略
#[derive(Debug, Clone, Default)]
pub struct ProbeGate {
    /// 资格策略
    pub eligibility: EligibilityPolicy,
    /// 节流策略
    pub throttle: ThrottlePolicy,
}

impl ProbeGate {
    /// 创建探测闸门
    pub fn new(eligibility: EligibilityPolicy, throttle: ThrottlePolicy) -> Self {
        Self {
            eligibility,
            throttle,
        }
    }

    /// 判定某个端点本周期是否派发探测
    pub fn evaluate(&self, target: &Target, kind: EndpointKind, now: DateTime<Utc>) -> GateDecision {
        if !self.eligibility.is_eligible(&target.name) {
            return GateDecision::Ineligible;
        }

        let endpoint = target.endpoint(kind);
        if !endpoint.has_address() {
            GateDecision::NoAddress
        } else if endpoint.is_editing() {
            GateDecision::Editing
        } else if !self.throttle.should_probe(kind, target, now) {
            GateDecision::Throttled
        } else {
            GateDecision::Probe
        }
    }
}
