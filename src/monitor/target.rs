//! 监控目标数据模型
//!
//! 一台主机最多暴露两个可探测端点：主地址与带外管理地址（如IPMI）。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 端点类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointKind {
    /// 主网络地址
    Primary,
    /// 带外管理地址
    Management,
}

impl EndpointKind {
    /// 一个周期内的端点处理顺序
    pub const ALL: [EndpointKind; 2] = [EndpointKind::Primary, EndpointKind::Management];
}

impl std::fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndpointKind::Primary => write!(f, "primary"),
            EndpointKind::Management => write!(f, "management"),
        }
    }
}

/// 端点可达状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointState {
    /// 尚未探测，或地址为空
    #[default]
    Unknown,
    /// 最近一次探测可达
    Up,
    /// 最近一次探测不可达
    Down,
}

impl std::fmt::Display for EndpointState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndpointState::Unknown => write!(f, "unknown"),
            EndpointState::Up => write!(f, "up"),
            EndpointState::Down => write!(f, "down"),
        }
    }
}

impl EndpointState {
    /// 判断是否可达
    pub fn is_up(&self) -> bool {
        matches!(self, EndpointState::Up)
    }
}

/// 单个端点及其观测状态
///
/// 地址为空时状态恒为 `Unknown`、成功时间恒为 `None`。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Endpoint {
    address: String,
    state: EndpointState,
    last_success_at: Option<DateTime<Utc>>,
    editing: bool,
}

impl Endpoint {
    /// 创建新端点，地址首尾空白会被去除
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into().trim().to_string(),
            ..Default::default()
        }
    }

    /// 端点地址（可能为空）
    pub fn address(&self) -> &str {
        &self.address
    }

    /// 是否配置了地址
    pub fn has_address(&self) -> bool {
        !self.address.is_empty()
    }

    /// 当前状态
    pub fn state(&self) -> EndpointState {
        self.state
    }

    /// 最近一次成功探测的时间
    pub fn last_success_at(&self) -> Option<DateTime<Utc>> {
        self.last_success_at
    }

    /// 是否正在编辑地址
    pub fn is_editing(&self) -> bool {
        self.editing
    }

    pub(crate) fn set_editing(&mut self, editing: bool) {
        self.editing = editing;
    }

    /// 替换地址；地址清空时立即重置状态与时间戳
    pub(crate) fn replace_address(&mut self, address: &str) {
        self.address = address.trim().to_string();
        if self.address.is_empty() {
            self.state = EndpointState::Unknown;
            self.last_success_at = None;
        }
    }

    /// 用持久化的观测值恢复端点状态
    ///
    /// 地址为空时忽略；成功时间同样只会向前推进。
    pub(crate) fn restore(&mut self, state: EndpointState, last_success_at: Option<DateTime<Utc>>) {
        if !self.has_address() {
            return;
        }

        self.state = state;
        if let Some(at) = last_success_at {
            self.last_success_at = Some(self.last_success_at.map_or(at, |previous| previous.max(at)));
        }
    }

    /// 记录一次探测结果
    ///
    /// 成功时间只会向前推进；失败不会清除上一次成功时间。
    pub fn record_probe(&mut self, alive: bool, at: DateTime<Utc>) {
        if !self.has_address() {
            return;
        }

        if alive {
            self.state = EndpointState::Up;
            self.last_success_at = Some(match self.last_success_at {
                Some(previous) if previous > at => previous,
                _ => at,
            });
        } else {
            self.state = EndpointState::Down;
        }
    }
}

/// 监控目标：一台主机
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// 主机名称，在一次加载中唯一
    pub name: String,
    primary: Endpoint,
    management: Endpoint,
}

impl Target {
    /// 创建新的监控目标
    pub fn new(
        name: impl Into<String>,
        primary: impl Into<String>,
        management: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into().trim().to_string(),
            primary: Endpoint::new(primary),
            management: Endpoint::new(management),
        }
    }

    /// 获取指定端点
    pub fn endpoint(&self, kind: EndpointKind) -> &Endpoint {
        match kind {
            EndpointKind::Primary => &self.primary,
            EndpointKind::Management => &self.management,
        }
    }

    /// 获取指定端点（可变）
    pub fn endpoint_mut(&mut self, kind: EndpointKind) -> &mut Endpoint {
        match kind {
            EndpointKind::Primary => &mut self.primary,
            EndpointKind::Management => &mut self.management,
        }
    }

    /// 主端点
    pub fn primary(&self) -> &Endpoint {
        &self.primary
    }

    /// 管理端点
    pub fn management(&self) -> &Endpoint {
        &self.management
    }
}

/// 外部提供的一行主机数据 `(name, primary, management)`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HostRow {
    /// 主机名称
    pub name: String,
    /// 主地址
    #[serde(default)]
    pub primary: String,
    /// 管理地址
    #[serde(default)]
    pub management: String,
}

impl HostRow {
    /// 创建新的主机行
    pub fn new(
        name: impl Into<String>,
        primary: impl Into<String>,
        management: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            primary: primary.into(),
            management: management.into(),
        }
    }

    /// 转换为监控目标
    ///
    /// 名称为空或两个地址都为空的行会被丢弃。
    pub fn into_target(self) -> Option<Target> {
        let target = Target::new(self.name, self.primary, self.management);
        if target.name.is_empty() || (!target.primary.has_address() && !target.management.has_address())
        {
            return None;
        }
        Some(target)
    }
}
