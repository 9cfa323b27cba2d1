//! 监控目标集合
//!
//! 目标集合是引擎唯一的共享可变状态。每个目标的主端点与管理端点
//! 是互相独立的修改域；编辑标志充当端点级的轻量单写者锁，
//! 探测在派发前与回写时都会检查它，遇到编辑中的端点直接跳过而不等待。

use crate::error::EditError;
use crate::monitor::policy::{GateDecision, ProbeGate};
use crate::monitor::snapshot::StatusDocument;
use crate::monitor::target::{EndpointKind, HostRow, Target};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::OnceLock;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// 目标引用：按下标或按名称
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetRef {
    /// 加载顺序中的下标
    Index(usize),
    /// 目标名称
    Name(String),
}

impl From<usize> for TargetRef {
    fn from(index: usize) -> Self {
        TargetRef::Index(index)
    }
}

impl From<&str> for TargetRef {
    fn from(name: &str) -> Self {
        TargetRef::Name(name.to_string())
    }
}

impl From<String> for TargetRef {
    fn from(name: String) -> Self {
        TargetRef::Name(name)
    }
}

impl std::fmt::Display for TargetRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetRef::Index(index) => write!(f, "#{index}"),
            TargetRef::Name(name) => write!(f, "{name}"),
        }
    }
}

/// 一次已获准的探测
///
/// 记录派发时的加载代次与地址，回写时据此丢弃过期结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTicket {
    /// 加载代次
    pub epoch: u64,
    /// 目标下标
    pub index: usize,
    /// 目标名称
    pub name: String,
    /// 端点类型
    pub kind: EndpointKind,
    /// 派发时的地址
    pub address: String,
}

/// 一个周期的探测计划
#[derive(Debug, Clone, Default)]
pub struct ProbePlan {
    /// 需要派发的探测
    pub tickets: Vec<ProbeTicket>,
    /// 因资格策略跳过的目标数
    pub ineligible_targets: usize,
    /// 因编辑中跳过的端点数
    pub editing_skipped: usize,
    /// 因节流跳过的端点数
    pub throttled: usize,
}

#[derive(Debug, Default)]
struct RegistryState {
    epoch: u64,
    targets: Vec<Target>,
}

impl RegistryState {
    fn resolve(&self, target: &TargetRef) -> Result<usize, EditError> {
        match target {
            TargetRef::Index(index) if *index < self.targets.len() => Ok(*index),
            TargetRef::Name(name) => self
                .targets
                .iter()
                .position(|t| &t.name == name)
                .ok_or_else(|| EditError::TargetNotFound(name.clone())),
            other => Err(EditError::TargetNotFound(other.to_string())),
        }
    }
}

/// 目标集合
#[derive(Debug, Default)]
pub struct TargetRegistry {
    state: RwLock<RegistryState>,
}

impl TargetRegistry {
    /// 创建空的目标集合
    pub fn new() -> Self {
        Self::default()
    }

    /// 从主机行创建目标集合
    pub async fn with_rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = HostRow>,
    {
        let registry = Self::new();
        registry.load(rows).await;
        registry
    }

    /// 整体替换目标集合
    ///
    /// 名称为空、两个地址都为空或名称重复的行会被丢弃。
    /// 替换后仍在进行中的探测结果将被忽略。
    ///
    /// # 返回
    /// * `usize` - 加载的目标数量
    pub async fn load<I>(&self, rows: I) -> usize
    where
        I: IntoIterator<Item = HostRow>,
    {
        let mut seen = HashSet::new();
        let mut discarded = 0usize;
        let targets: Vec<Target> = rows
            .into_iter()
            .filter_map(|row| match row.into_target() {
                Some(target) if seen.insert(target.name.clone()) => Some(target),
                Some(target) => {
                    warn!("忽略重复的主机名称: {}", target.name);
                    discarded += 1;
                    None
                }
                None => {
                    discarded += 1;
                    None
                }
            })
            .collect();

        let count = targets.len();
        let mut state = self.state.write().await;
        state.epoch += 1;
        state.targets = targets;

        info!(
            "加载监控目标: {} 个，丢弃 {} 行，代次 {}",
            count, discarded, state.epoch
        );
        count
    }

    /// 用状态文件恢复上次运行的观测结果
    ///
    /// 只恢复名称与地址都一致、且不在编辑中的端点；不改变加载代次。
    ///
    /// # 返回
    /// * `usize` - 恢复的端点数量
    pub async fn restore(&self, document: &StatusDocument) -> usize {
        let mut state = self.state.write().await;
        let mut restored = 0usize;

        for entry in &document.targets {
            let Some(target) = state.targets.iter_mut().find(|t| t.name == entry.name) else {
                debug!("状态文件中的主机已不存在: {}", entry.name);
                continue;
            };

            let saved = [
                (
                    EndpointKind::Primary,
                    &entry.primary_address,
                    entry.primary_state,
                    entry.primary_age,
                ),
                (
                    EndpointKind::Management,
                    &entry.management_address,
                    entry.management_state,
                    entry.management_age,
                ),
            ];
            for (kind, address, endpoint_state, age) in saved {
                let endpoint = target.endpoint_mut(kind);
                if !endpoint.has_address()
                    || endpoint.is_editing()
                    || endpoint.address() != address.trim()
                {
                    continue;
                }
                endpoint.restore(endpoint_state, document.last_success_at(age));
                restored += 1;
            }
        }

        info!("从状态文件恢复 {} 个端点", restored);
        restored
    }

    /// 目标数量
    pub async fn len(&self) -> usize {
        self.state.read().await.targets.len()
    }

    /// 是否为空
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.targets.is_empty()
    }

    /// 当前加载代次
    pub async fn epoch(&self) -> u64 {
        self.state.read().await.epoch
    }

    /// 所有目标的副本
    pub async fn targets(&self) -> Vec<Target> {
        self.state.read().await.targets.clone()
    }

    /// 获取单个目标的副本
    pub async fn get(&self, target: impl Into<TargetRef>) -> Option<Target> {
        let state = self.state.read().await;
        let index = state.resolve(&target.into()).ok()?;
        state.targets.get(index).cloned()
    }

    /// 在读锁下访问目标集合
    pub async fn read<R>(&self, f: impl FnOnce(&[Target]) -> R) -> R {
        let state = self.state.read().await;
        f(&state.targets)
    }

    /// 生成一个周期的探测计划
    ///
    /// 按目标顺序、每个目标先主端点后管理端点评估准入。
    pub async fn plan(&self, gate: &ProbeGate, now: DateTime<Utc>) -> ProbePlan {
        let state = self.state.read().await;
        let mut plan = ProbePlan::default();

        for (index, target) in state.targets.iter().enumerate() {
            if !gate.eligibility.is_eligible(&target.name) {
                plan.ineligible_targets += 1;
                continue;
            }

            for kind in EndpointKind::ALL {
                match gate.evaluate(target, kind, now) {
                    GateDecision::Probe => plan.tickets.push(ProbeTicket {
                        epoch: state.epoch,
                        index,
                        name: target.name.clone(),
                        kind,
                        address: target.endpoint(kind).address().to_string(),
                    }),
                    GateDecision::Editing => plan.editing_skipped += 1,
                    GateDecision::Throttled => plan.throttled += 1,
                    GateDecision::NoAddress | GateDecision::Ineligible => {}
                }
            }
        }

        plan
    }

    /// 为单个端点申请探测许可
    ///
    /// # 返回
    /// * `Ok(None)` - 端点当前不应探测
    pub async fn ticket_for(
        &self,
        target: &TargetRef,
        kind: EndpointKind,
        gate: &ProbeGate,
        now: DateTime<Utc>,
    ) -> Result<Option<ProbeTicket>, EditError> {
        let state = self.state.read().await;
        let index = state.resolve(target)?;
        let entry = &state.targets[index];

        let decision = gate.evaluate(entry, kind, now);
        if !decision.admits() {
            debug!("跳过探测 {} {}: {:?}", entry.name, kind, decision);
            return Ok(None);
        }

        Ok(Some(ProbeTicket {
            epoch: state.epoch,
            index,
            name: entry.name.clone(),
            kind,
            address: entry.endpoint(kind).address().to_string(),
        }))
    }

    /// 回写探测结果
    ///
    /// 若期间发生了重新加载、端点进入编辑或地址已变更，则丢弃结果。
    ///
    /// # 返回
    /// * `bool` - 结果是否被采纳
    pub async fn apply(&self, ticket: &ProbeTicket, alive: bool, at: DateTime<Utc>) -> bool {
        let mut state = self.state.write().await;
        if state.epoch != ticket.epoch {
            debug!("丢弃过期代次的探测结果: {} {}", ticket.name, ticket.kind);
            return false;
        }

        let Some(target) = state.targets.get_mut(ticket.index) else {
            return false;
        };
        let endpoint = target.endpoint_mut(ticket.kind);
        if endpoint.is_editing() || endpoint.address() != ticket.address {
            debug!("端点已被编辑，丢弃探测结果: {} {}", ticket.name, ticket.kind);
            return false;
        }

        endpoint.record_probe(alive, at);
        true
    }

    /// 开始编辑端点地址，编辑期间该端点不参与探测
    pub async fn begin_edit(
        &self,
        target: impl Into<TargetRef>,
        kind: EndpointKind,
    ) -> Result<(), EditError> {
        let mut state = self.state.write().await;
        let index = state.resolve(&target.into())?;
        state.targets[index].endpoint_mut(kind).set_editing(true);
        Ok(())
    }

    /// 提交编辑：写入新地址并解除编辑标志
    ///
    /// 新地址为空时立即重置该端点状态。地址无效时拒绝且不修改任何状态。
    pub async fn commit_edit(
        &self,
        target: impl Into<TargetRef>,
        kind: EndpointKind,
        new_address: &str,
    ) -> Result<(), EditError> {
        let new_address = new_address.trim();
        validate_address(new_address)?;

        let mut state = self.state.write().await;
        let index = state.resolve(&target.into())?;
        let entry = &mut state.targets[index];
        let endpoint = entry.endpoint_mut(kind);
        endpoint.replace_address(new_address);
        endpoint.set_editing(false);

        info!(
            "更新地址: {} {} -> {}",
            entry.name,
            kind,
            if new_address.is_empty() { "(空)" } else { new_address }
        );
        Ok(())
    }

    /// 放弃编辑，只解除编辑标志
    pub async fn cancel_edit(
        &self,
        target: impl Into<TargetRef>,
        kind: EndpointKind,
    ) -> Result<(), EditError> {
        let mut state = self.state.write().await;
        let index = state.resolve(&target.into())?;
        state.targets[index].endpoint_mut(kind).set_editing(false);
        Ok(())
    }

    /// 一次性替换端点地址（开始编辑 + 提交）
    pub async fn set_address(
        &self,
        target: impl Into<TargetRef>,
        kind: EndpointKind,
        new_address: &str,
    ) -> Result<(), EditError> {
        let target = target.into();
        validate_address(new_address.trim())?;
        self.begin_edit(target.clone(), kind).await?;
        self.commit_edit(target, kind, new_address).await
    }
}

/// 主机名标签格式，首次校验时编译
static HOSTNAME_LABEL: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();

/// 校验地址格式
///
/// 空地址合法（表示不监控该端点）；否则必须是IP字面量或合法主机名。
pub fn validate_address(address: &str) -> Result<(), EditError> {
    let address = address.trim();
    if address.is_empty() || address.parse::<IpAddr>().is_ok() {
        return Ok(());
    }

    let invalid = || EditError::InvalidAddress(address.to_string());

    // 形如IPv4但解析失败的地址视为无效
    if address.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return Err(invalid());
    }

    if address.len() > 253 {
        return Err(invalid());
    }

    let label_regex = HOSTNAME_LABEL
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?$"))
        .as_ref()
        .map_err(|e| EditError::InvalidAddress(format!("{address}: {e}")))?;

    if address
        .trim_end_matches('.')
        .split('.')
        .all(|label| label_regex.is_match(label))
    {
        Ok(())
    } else {
        Err(invalid())
    }
}
