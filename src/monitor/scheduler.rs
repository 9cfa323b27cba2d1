//! 探测周期调度器
//!
//! 状态机 `Stopped -> Running -> Stopped`。启动时立即执行一个周期，
//! 之后按固定间隔触发；更改间隔只重置定时器，不会取消或重复正在进行的周期。
//! 停止只阻止后续周期，已在进行的周期会自然完成。

use crate::error::{EditError, Result};
use crate::monitor::policy::ProbeGate;
use crate::monitor::prober::Prober;
use crate::monitor::registry::{ProbeTicket, TargetRef, TargetRegistry};
use crate::monitor::target::EndpointKind;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// 周期完成回调函数类型
pub type CycleCallback = Arc<dyn Fn(&CycleReport) + Send + Sync>;

/// 单次探测完成回调函数类型
pub type ProbeCallback = Arc<dyn Fn(&ProbeEvent) + Send + Sync>;

/// 单次探测的结果记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeEvent {
    /// 目标名称
    pub target: String,
    /// 端点类型
    pub kind: EndpointKind,
    /// 探测地址
    pub address: String,
    /// 是否可达
    pub alive: bool,
    /// 探测耗时（不含排队等待）
    pub duration: Duration,
    /// 结果时间
    pub at: DateTime<Utc>,
}

/// 调度器运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    /// 已停止
    Stopped,
    /// 运行中
    Running,
}

/// 单个周期的执行报告
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// 周期ID
    pub id: Uuid,
    /// 开始时间
    pub started_at: DateTime<Utc>,
    /// 结束时间
    pub finished_at: DateTime<Utc>,
    /// 派发的探测数
    pub dispatched: usize,
    /// 可达的端点数
    pub up: usize,
    /// 不可达的端点数
    pub down: usize,
    /// 因编辑或重新加载被丢弃的结果数
    pub discarded: usize,
    /// 因资格策略跳过的目标数
    pub ineligible_targets: usize,
    /// 因编辑中跳过的端点数
    pub editing_skipped: usize,
    /// 因节流跳过的端点数
    pub throttled: usize,
    /// 探测任务异常退出的次数
    pub panicked: usize,
}

/// 调度器状态
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    /// 运行状态
    pub state: SchedulerState,
    /// 当前探测间隔
    pub interval: Option<Duration>,
    /// 已完成的周期数
    pub cycles_completed: u64,
    /// 最近一次周期报告
    pub last_cycle: Option<CycleReport>,
    /// 最后更新时间
    pub last_update: DateTime<Utc>,
}

impl SchedulerStatus {
    /// 是否运行中
    pub fn is_running(&self) -> bool {
        self.state == SchedulerState::Running
    }
}

/// 调度器设置
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// 探测闸门
    pub gate: ProbeGate,
    /// 每次探测的尝试次数
    pub attempts: u32,
    /// 单个周期内的最大并发探测数
    pub max_concurrent_probes: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            gate: ProbeGate::default(),
            attempts: crate::monitor::prober::DEFAULT_PROBE_ATTEMPTS,
            max_concurrent_probes: 32,
        }
    }
}

/// 调度器trait，定义控制接口
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// 启动调度器；运行中再次调用则以新间隔重新设定定时器
    ///
    /// # 参数
    /// * `interval_secs` - 探测间隔（秒），必须大于0
    async fn start(&self, interval_secs: u64) -> Result<()>;

    /// 停止调度器，不中断正在进行的周期
    async fn stop(&self) -> Result<()>;

    /// 修改探测间隔；停止状态下只记录新间隔
    async fn set_interval(&self, interval_secs: u64) -> Result<()>;

    /// 获取调度器状态
    async fn get_status(&self) -> SchedulerStatus;
}

/// 周期执行器，由定时任务与调度器共享
struct CycleRunner {
    registry: Arc<TargetRegistry>,
    prober: Arc<dyn Prober>,
    settings: SchedulerSettings,
    semaphore: Arc<Semaphore>,
    /// 同一时刻只允许一个周期执行
    cycle_lock: Mutex<()>,
    status: RwLock<SchedulerStatus>,
    cycle_callback: RwLock<Option<CycleCallback>>,
    probe_callback: Arc<RwLock<Option<ProbeCallback>>>,
}

/// 单个探测的结果
enum ProbeOutcome {
    Applied { alive: bool },
    Discarded,
    Panicked,
}

impl CycleRunner {
    /// 执行一个完整周期，若已有周期在执行则等待其完成
    async fn run_cycle(&self, now: DateTime<Utc>) -> CycleReport {
        let _guard = self.cycle_lock.lock().await;
        self.execute(now).await
    }

    /// 定时触发的周期，上一周期未结束时跳过本次触发
    async fn run_scheduled_cycle(&self) {
        let Ok(_guard) = self.cycle_lock.try_lock() else {
            warn!("上一个探测周期仍在进行，跳过本次触发");
            return;
        };
        self.execute(Utc::now()).await;
    }

    async fn execute(&self, now: DateTime<Utc>) -> CycleReport {
        let plan = self.registry.plan(&self.settings.gate, now).await;
        debug!(
            "开始探测周期: 派发 {}，节流 {}，编辑中 {}，无资格目标 {}",
            plan.tickets.len(),
            plan.throttled,
            plan.editing_skipped,
            plan.ineligible_targets
        );

        let handles: Vec<(ProbeTicket, JoinHandle<ProbeOutcome>)> = plan
            .tickets
            .iter()
            .cloned()
            .map(|ticket| {
                let handle = self.spawn_probe(ticket.clone(), now);
                (ticket, handle)
            })
            .collect();

        let mut report = CycleReport {
            id: Uuid::new_v4(),
            started_at: now,
            finished_at: now,
            dispatched: handles.len(),
            up: 0,
            down: 0,
            discarded: 0,
            ineligible_targets: plan.ineligible_targets,
            editing_skipped: plan.editing_skipped,
            throttled: plan.throttled,
            panicked: 0,
        };

        let tickets: Vec<ProbeTicket> = handles.iter().map(|(t, _)| t.clone()).collect();
        let results = futures::future::join_all(handles.into_iter().map(|(_, h)| h)).await;

        for (ticket, result) in tickets.iter().zip(results) {
            let outcome = match result {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("探测任务异常退出 {} {}: {}", ticket.name, ticket.kind, e);
                    self.registry.apply(ticket, false, Utc::now()).await;
                    ProbeOutcome::Panicked
                }
            };

            match outcome {
                ProbeOutcome::Applied { alive: true } => report.up += 1,
                ProbeOutcome::Applied { alive: false } => report.down += 1,
                ProbeOutcome::Discarded => report.discarded += 1,
                ProbeOutcome::Panicked => {
                    report.panicked += 1;
                    report.down += 1;
                }
            }
        }

        report.finished_at = now.max(Utc::now());
        self.finish_cycle(&report).await;
        report
    }

    /// 派发单个探测任务
    ///
    /// 结果时间记为派发时刻加上自派发起经过的时间，包含等待并发许可的时间。
    fn spawn_probe(&self, ticket: ProbeTicket, dispatched_at: DateTime<Utc>) -> JoinHandle<ProbeOutcome> {
        let registry = Arc::clone(&self.registry);
        let prober = Arc::clone(&self.prober);
        let semaphore = Arc::clone(&self.semaphore);
        let probe_callback = Arc::clone(&self.probe_callback);
        let attempts = self.settings.attempts;
        let dispatched = Instant::now();

        tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                warn!("获取并发许可失败，跳过探测: {} {}", ticket.name, ticket.kind);
                return ProbeOutcome::Discarded;
            };

            let started = Instant::now();
            let alive = prober.probe(&ticket.address, attempts).await;
            let duration = started.elapsed();
            let at = dispatched_at
                + chrono::Duration::from_std(dispatched.elapsed()).unwrap_or_default();

            let event = ProbeEvent {
                target: ticket.name.clone(),
                kind: ticket.kind,
                address: ticket.address.clone(),
                alive,
                duration,
                at,
            };
            match probe_callback.read().await.as_ref() {
                Some(callback) => callback(&event),
                None if alive => {
                    debug!("端点可达: {} {} ({})", ticket.name, ticket.kind, ticket.address)
                }
                None => warn!("端点不可达: {} {} ({})", ticket.name, ticket.kind, ticket.address),
            }

            if registry.apply(&ticket, alive, at).await {
                ProbeOutcome::Applied { alive }
            } else {
                ProbeOutcome::Discarded
            }
        })
    }

    async fn finish_cycle(&self, report: &CycleReport) {
        {
            let mut status = self.status.write().await;
            status.cycles_completed += 1;
            status.last_cycle = Some(report.clone());
            status.last_update = Utc::now();
        }

        info!(
            "探测周期完成: 派发 {}，可达 {}，不可达 {}，丢弃 {}",
            report.dispatched, report.up, report.down, report.discarded
        );

        let callback_guard = self.cycle_callback.read().await;
        if let Some(ref callback) = *callback_guard {
            callback(report);
        }
    }
}

/// 控制面状态
struct Control {
    state: SchedulerState,
    interval: Option<Duration>,
    timer: Option<JoinHandle<()>>,
}

/// 周期调度器实现
pub struct CycleScheduler {
    runner: Arc<CycleRunner>,
    control: Mutex<Control>,
}

impl CycleScheduler {
    /// 创建新的周期调度器
    ///
    /// # 参数
    /// * `registry` - 目标集合
    /// * `prober` - 探测器
    /// * `settings` - 调度器设置
    pub fn new(
        registry: Arc<TargetRegistry>,
        prober: Arc<dyn Prober>,
        settings: SchedulerSettings,
    ) -> Self {
        let max_concurrent = settings.max_concurrent_probes.max(1);
        let status = SchedulerStatus {
            state: SchedulerState::Stopped,
            interval: None,
            cycles_completed: 0,
            last_cycle: None,
            last_update: Utc::now(),
        };

        Self {
            runner: Arc::new(CycleRunner {
                registry,
                prober,
                settings,
                semaphore: Arc::new(Semaphore::new(max_concurrent)),
                cycle_lock: Mutex::new(()),
                status: RwLock::new(status),
                cycle_callback: RwLock::new(None),
                probe_callback: Arc::new(RwLock::new(None)),
            }),
            control: Mutex::new(Control {
                state: SchedulerState::Stopped,
                interval: None,
                timer: None,
            }),
        }
    }

    /// 目标集合
    pub fn registry(&self) -> &Arc<TargetRegistry> {
        &self.runner.registry
    }

    /// 设置周期完成回调
    pub async fn set_cycle_callback(&self, callback: CycleCallback) {
        let mut cb = self.runner.cycle_callback.write().await;
        *cb = Some(callback);
    }

    /// 设置单次探测完成回调
    pub async fn set_probe_callback(&self, callback: ProbeCallback) {
        let mut cb = self.runner.probe_callback.write().await;
        *cb = Some(callback);
    }

    /// 立即执行一个周期（不依赖定时器）
    ///
    /// 若已有周期在执行，则等待其完成后再执行。
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> CycleReport {
        self.runner.run_cycle(now).await
    }

    /// 等待正在进行的周期完成
    pub async fn wait_idle(&self) {
        let _guard = self.runner.cycle_lock.lock().await;
    }

    /// 是否运行中
    pub async fn is_running(&self) -> bool {
        self.control.lock().await.state == SchedulerState::Running
    }

    /// 提交地址编辑
    ///
    /// 运行中且新地址非空时，立即为该端点派发一次周期外探测。
    ///
    /// # 返回
    /// * `Option<JoinHandle<bool>>` - 周期外探测任务，结果表示是否被采纳
    pub async fn commit_edit(
        &self,
        target: impl Into<TargetRef>,
        kind: EndpointKind,
        new_address: &str,
    ) -> Result<Option<JoinHandle<bool>>> {
        let target = target.into();
        self.runner
            .registry
            .commit_edit(target.clone(), kind, new_address)
            .await?;

        if new_address.trim().is_empty() || !self.is_running().await {
            return Ok(None);
        }

        self.probe_now(&target, kind).await
    }

    /// 一次性替换端点地址（开始编辑 + 提交）
    pub async fn set_address(
        &self,
        target: impl Into<TargetRef>,
        kind: EndpointKind,
        new_address: &str,
    ) -> Result<Option<JoinHandle<bool>>> {
        let target = target.into();
        crate::monitor::registry::validate_address(new_address)?;
        self.runner.registry.begin_edit(target.clone(), kind).await?;
        self.commit_edit(target, kind, new_address).await
    }

    /// 为单个端点派发一次周期外探测，仍然经过准入判定
    pub async fn probe_now(
        &self,
        target: &TargetRef,
        kind: EndpointKind,
    ) -> Result<Option<JoinHandle<bool>>> {
        let now = Utc::now();
        let ticket = self
            .runner
            .registry
            .ticket_for(target, kind, &self.runner.settings.gate, now)
            .await?;

        Ok(ticket.map(|ticket| {
            debug!("周期外探测: {} {}", ticket.name, ticket.kind);
            let handle = self.runner.spawn_probe(ticket, now);
            tokio::spawn(async move {
                matches!(handle.await, Ok(ProbeOutcome::Applied { .. }))
            })
        }))
    }

    /// 启动时的立即周期
    ///
    /// 若上一次运行留下的周期仍在进行，等待其结束后再执行，不会被跳过。
    fn spawn_immediate_cycle(runner: Arc<CycleRunner>) {
        tokio::spawn(async move {
            runner.run_cycle(Utc::now()).await;
        });
    }

    /// 创建定时任务，首次触发在一个间隔之后
    fn spawn_timer(runner: Arc<CycleRunner>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                // 周期在独立任务中执行，取消定时器不会中断它
                let runner = Arc::clone(&runner);
                tokio::spawn(async move {
                    runner.run_scheduled_cycle().await;
                });
            }
        })
    }

    async fn publish_state(&self, state: SchedulerState, interval: Option<Duration>) {
        let mut status = self.runner.status.write().await;
        status.state = state;
        status.interval = interval;
        status.last_update = Utc::now();
    }
}

fn validate_interval(interval_secs: u64) -> std::result::Result<Duration, EditError> {
    if interval_secs == 0 {
        return Err(EditError::InvalidInterval(interval_secs));
    }
    Ok(Duration::from_secs(interval_secs))
}

#[async_trait]
impl Scheduler for CycleScheduler {
    async fn start(&self, interval_secs: u64) -> Result<()> {
        let period = validate_interval(interval_secs)?;
        let mut control = self.control.lock().await;

        let immediate = match control.state {
            SchedulerState::Stopped => {
                info!("启动探测调度器，间隔: {}秒", interval_secs);
                true
            }
            SchedulerState::Running => {
                info!("探测间隔变更为: {}秒", interval_secs);
                false
            }
        };

        if let Some(timer) = control.timer.take() {
            timer.abort();
        }
        if immediate {
            Self::spawn_immediate_cycle(Arc::clone(&self.runner));
        }
        control.timer = Some(Self::spawn_timer(Arc::clone(&self.runner), period));
        control.state = SchedulerState::Running;
        control.interval = Some(period);

        self.publish_state(SchedulerState::Running, Some(period))
            .await;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let mut control = self.control.lock().await;
        if control.state == SchedulerState::Stopped {
            debug!("探测调度器未运行");
            return Ok(());
        }

        if let Some(timer) = control.timer.take() {
            timer.abort();
        }
        control.state = SchedulerState::Stopped;

        self.publish_state(SchedulerState::Stopped, control.interval)
            .await;
        info!("探测调度器已停止");
        Ok(())
    }

    async fn set_interval(&self, interval_secs: u64) -> Result<()> {
        let period = validate_interval(interval_secs)?;
        if self.is_running().await {
            return self.start(interval_secs).await;
        }

        let mut control = self.control.lock().await;
        control.interval = Some(period);
        self.publish_state(control.state, Some(period)).await;
        Ok(())
    }

    async fn get_status(&self) -> SchedulerStatus {
        self.runner.status.read().await.clone()
    }
}

impl Drop for CycleScheduler {
    fn drop(&mut self) {
        // 只取消定时器，进行中的周期自然结束
        if let Some(timer) = self.control.get_mut().timer.take() {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeError;
    use crate::monitor::policy::{EligibilityPolicy, ThrottlePolicy};
    use crate::monitor::target::{EndpointState, HostRow};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    /// 按地址白名单应答的探测器
    struct FakeProber {
        alive: HashSet<String>,
        calls: StdMutex<Vec<String>>,
    }

    impl FakeProber {
        fn new(alive: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                alive: alive.iter().map(|a| a.to_string()).collect(),
                calls: StdMutex::new(Vec::new()),
            })
        }

        fn calls_for(&self, address: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|a| a.as_str() == address)
                .count()
        }

        fn total_calls(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Prober for FakeProber {
        async fn attempt(&self, address: &str, _t: Duration) -> std::result::Result<(), ProbeError> {
            if self.alive.contains(address) {
                Ok(())
            } else {
                Err(ProbeError::Unreachable {
                    address: address.to_string(),
                })
            }
        }

        async fn probe(&self, address: &str, _attempts: u32) -> bool {
            self.calls.lock().unwrap().push(address.to_string());
            self.alive.contains(address)
        }
    }

    /// 对指定地址直接 panic 的探测器
    struct PanickingProber {
        poison: String,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Prober for PanickingProber {
        async fn attempt(&self, _address: &str, _t: Duration) -> std::result::Result<(), ProbeError> {
            Ok(())
        }

        async fn probe(&self, address: &str, _attempts: u32) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if address == self.poison {
                panic!("probe exploded");
            }
            true
        }
    }

    /// 每次探测固定耗时的探测器
    struct SlowProber {
        delay: Duration,
    }

    #[async_trait]
    impl Prober for SlowProber {
        async fn attempt(&self, _address: &str, _t: Duration) -> std::result::Result<(), ProbeError> {
            Ok(())
        }

        async fn probe(&self, _address: &str, _attempts: u32) -> bool {
            tokio::time::sleep(self.delay).await;
            true
        }
    }

    /// 第一次探测会阻塞直到测试放行
    #[derive(Default)]
    struct HoldFirstProber {
        calls: AtomicUsize,
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl Prober for HoldFirstProber {
        async fn attempt(&self, _address: &str, _t: Duration) -> std::result::Result<(), ProbeError> {
            Ok(())
        }

        async fn probe(&self, _address: &str, _attempts: u32) -> bool {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                self.entered.notify_one();
                self.release.notified().await;
            }
            true
        }
    }

    async fn scheduler_with(rows: Vec<HostRow>, prober: Arc<dyn Prober>) -> CycleScheduler {
        let registry = Arc::new(TargetRegistry::with_rows(rows).await);
        CycleScheduler::new(registry, prober, SchedulerSettings::default())
    }

    #[tokio::test]
    async fn test_single_cycle_updates_state() {
        let prober = FakeProber::new(&["10.0.0.1"]);
        let scheduler = scheduler_with(
            vec![HostRow::new("DP-01", "10.0.0.1", "10.0.1.1")],
            prober.clone(),
        )
        .await;
        let now = Utc::now();

        let report = scheduler.run_cycle(now).await;

        assert_eq!(report.dispatched, 2);
        assert_eq!(report.up, 1);
        assert_eq!(report.down, 1);

        let target = scheduler.registry().get("DP-01").await.unwrap();
        assert_eq!(target.primary().state(), EndpointState::Up);
        assert!(target.primary().last_success_at().unwrap() >= now);
        assert_eq!(target.management().state(), EndpointState::Down);
        assert!(target.management().last_success_at().is_none());
    }

    #[tokio::test]
    async fn test_management_throttled_across_cycles() {
        let prober = FakeProber::new(&["10.0.0.1", "10.0.1.1"]);
        let scheduler = scheduler_with(
            vec![HostRow::new("node-1", "10.0.0.1", "10.0.1.1")],
            prober.clone(),
        )
        .await;
        let t0 = Utc::now();

        for offset in [0, 10, 20, 30, 40, 50] {
            scheduler
                .run_cycle(t0 + chrono::Duration::seconds(offset))
                .await;
        }
        assert_eq!(prober.calls_for("10.0.0.1"), 6);
        assert_eq!(prober.calls_for("10.0.1.1"), 1);

        scheduler
            .run_cycle(t0 + chrono::Duration::seconds(61))
            .await;
        assert_eq!(prober.calls_for("10.0.1.1"), 2);
    }

    #[tokio::test]
    async fn test_ineligible_targets_untouched() {
        let prober = FakeProber::new(&["10.0.0.1", "10.0.0.2"]);
        let registry = Arc::new(
            TargetRegistry::with_rows(vec![
                HostRow::new("DP-01", "10.0.0.1", ""),
                HostRow::new("node-1", "10.0.0.2", ""),
            ])
            .await,
        );
        let settings = SchedulerSettings {
            gate: ProbeGate::new(
                EligibilityPolicy::new(vec!["DP".to_string()]),
                ThrottlePolicy::default(),
            ),
            ..Default::default()
        };
        let scheduler = CycleScheduler::new(registry, prober.clone(), settings);

        let report = scheduler.run_cycle(Utc::now()).await;

        assert_eq!(report.ineligible_targets, 1);
        assert_eq!(prober.calls_for("10.0.0.2"), 0);
        let outsider = scheduler.registry().get("node-1").await.unwrap();
        assert_eq!(outsider.primary().state(), EndpointState::Unknown);
    }

    #[tokio::test]
    async fn test_panicking_probe_is_isolated() {
        let prober = Arc::new(PanickingProber {
            poison: "10.0.0.2".to_string(),
            calls: AtomicUsize::new(0),
        });
        let scheduler = scheduler_with(
            vec![
                HostRow::new("a", "10.0.0.1", ""),
                HostRow::new("b", "10.0.0.2", ""),
                HostRow::new("c", "10.0.0.3", ""),
            ],
            prober.clone(),
        )
        .await;

        let report = scheduler.run_cycle(Utc::now()).await;

        assert_eq!(report.panicked, 1);
        assert_eq!(report.up, 2);
        let b = scheduler.registry().get("b").await.unwrap();
        assert_eq!(b.primary().state(), EndpointState::Down);
        let c = scheduler.registry().get("c").await.unwrap();
        assert_eq!(c.primary().state(), EndpointState::Up);
    }

    #[tokio::test]
    async fn test_invalid_interval_rejected() {
        let scheduler = scheduler_with(vec![], FakeProber::new(&[])).await;

        assert!(scheduler.start(0).await.is_err());
        assert!(scheduler.set_interval(0).await.is_err());
        assert!(!scheduler.is_running().await);
        assert_eq!(scheduler.get_status().await.interval, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_runs_immediately_then_on_interval() {
        let prober = FakeProber::new(&["10.0.0.1"]);
        let scheduler =
            scheduler_with(vec![HostRow::new("DP-01", "10.0.0.1", "")], prober.clone()).await;

        scheduler.start(10).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        scheduler.wait_idle().await;
        assert_eq!(prober.total_calls(), 1);

        tokio::time::sleep(Duration::from_secs(10)).await;
        scheduler.wait_idle().await;
        assert_eq!(prober.total_calls(), 2);

        let status = scheduler.get_status().await;
        assert!(status.is_running());
        assert_eq!(status.interval, Some(Duration::from_secs(10)));
        assert_eq!(status.cycles_completed, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_rearms_without_extra_cycle() {
        let prober = FakeProber::new(&["10.0.0.1"]);
        let scheduler =
            scheduler_with(vec![HostRow::new("DP-01", "10.0.0.1", "")], prober.clone()).await;

        scheduler.start(10).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        scheduler.wait_idle().await;
        assert_eq!(prober.total_calls(), 1);

        // 改为30秒：不会立即多跑一个周期
        scheduler.set_interval(30).await.unwrap();
        tokio::time::sleep(Duration::from_secs(20)).await;
        scheduler.wait_idle().await;
        assert_eq!(prober.total_calls(), 1);

        tokio::time::sleep(Duration::from_secs(11)).await;
        scheduler.wait_idle().await;
        assert_eq!(prober.total_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_prevents_future_cycles() {
        let prober = FakeProber::new(&["10.0.0.1"]);
        let scheduler =
            scheduler_with(vec![HostRow::new("DP-01", "10.0.0.1", "")], prober.clone()).await;

        scheduler.start(5).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        scheduler.wait_idle().await;
        scheduler.stop().await.unwrap();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(prober.total_calls(), 1);
        assert!(!scheduler.get_status().await.is_running());

        // 重复停止是无操作
        assert!(scheduler.stop().await.is_ok());
    }

    #[tokio::test]
    async fn test_edit_triggers_immediate_probe_when_running() {
        let prober = FakeProber::new(&["10.0.0.1", "10.0.0.8"]);
        let scheduler =
            scheduler_with(vec![HostRow::new("DP-01", "10.0.0.1", "")], prober.clone()).await;

        // 未运行：不派发
        let handle = scheduler
            .set_address("DP-01", EndpointKind::Primary, "10.0.0.8")
            .await
            .unwrap();
        assert!(handle.is_none());

        scheduler.start(3600).await.unwrap();
        while scheduler.get_status().await.cycles_completed == 0 {
            tokio::task::yield_now().await;
        }
        let handle = scheduler
            .set_address("DP-01", EndpointKind::Management, "10.0.0.8")
            .await
            .unwrap()
            .expect("立即探测");
        assert!(handle.await.unwrap());

        let target = scheduler.registry().get("DP-01").await.unwrap();
        assert_eq!(target.management().state(), EndpointState::Up);

        // 清空地址：不派发，立即重置
        let handle = scheduler
            .set_address("DP-01", EndpointKind::Management, "")
            .await
            .unwrap();
        assert!(handle.is_none());
        let target = scheduler.registry().get("DP-01").await.unwrap();
        assert_eq!(target.management().state(), EndpointState::Unknown);

        scheduler.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_edit_does_not_mutate() {
        let scheduler =
            scheduler_with(vec![HostRow::new("DP-01", "10.0.0.1", "")], FakeProber::new(&[])).await;

        let result = scheduler
            .set_address("DP-01", EndpointKind::Primary, "not a host")
            .await;

        assert!(result.is_err());
        let target = scheduler.registry().get("DP-01").await.unwrap();
        assert_eq!(target.primary().address(), "10.0.0.1");
        assert!(!target.primary().is_editing());
    }

    #[tokio::test]
    async fn test_cycle_callback_invoked() {
        let scheduler =
            scheduler_with(vec![HostRow::new("DP-01", "10.0.0.1", "")], FakeProber::new(&[])).await;
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_for_callback = Arc::clone(&seen);
        scheduler
            .set_cycle_callback(Arc::new(move |report: &CycleReport| {
                seen_for_callback.fetch_add(report.dispatched, Ordering::SeqCst);
            }))
            .await;

        scheduler.run_cycle(Utc::now()).await;

        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_time_includes_queue_wait() {
        let registry = Arc::new(
            TargetRegistry::with_rows(vec![
                HostRow::new("a", "10.0.0.1", ""),
                HostRow::new("b", "10.0.0.2", ""),
                HostRow::new("c", "10.0.0.3", ""),
            ])
            .await,
        );
        let settings = SchedulerSettings {
            max_concurrent_probes: 1,
            ..Default::default()
        };
        let scheduler = CycleScheduler::new(
            registry,
            Arc::new(SlowProber {
                delay: Duration::from_secs(30),
            }),
            settings,
        );
        let now = Utc::now();

        let report = scheduler.run_cycle(now).await;
        assert_eq!(report.up, 3);

        let mut offsets: Vec<chrono::Duration> = scheduler
            .registry()
            .targets()
            .await
            .iter()
            .map(|t| t.primary().last_success_at().unwrap() - now)
            .collect();
        offsets.sort();

        // 逐个排队执行，第k个完成于 30k 秒
        for (k, offset) in offsets.iter().enumerate() {
            let expected = chrono::Duration::seconds(30 * (k as i64 + 1));
            assert!(*offset >= expected, "{offset} < {expected}");
            assert!(*offset < expected + chrono::Duration::seconds(1));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_stop_runs_immediate_cycle() {
        let prober = Arc::new(HoldFirstProber::default());
        let scheduler =
            scheduler_with(vec![HostRow::new("DP-01", "10.0.0.1", "")], prober.clone()).await;

        scheduler.start(100).await.unwrap();
        prober.entered.notified().await;

        // 第一个周期仍在进行时停止并重新启动
        scheduler.stop().await.unwrap();
        scheduler.start(100).await.unwrap();
        prober.release.notify_one();

        tokio::time::sleep(Duration::from_secs(50)).await;
        scheduler.wait_idle().await;

        assert_eq!(prober.calls.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.get_status().await.cycles_completed, 2);
        scheduler.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_outcome_callback_receives_results() {
        let scheduler = scheduler_with(
            vec![HostRow::new("DP-01", "10.0.0.1", "10.0.1.1")],
            FakeProber::new(&["10.0.0.1"]),
        )
        .await;
        let events = Arc::new(StdMutex::new(Vec::new()));
        let events_for_callback = Arc::clone(&events);
        scheduler
            .set_probe_callback(Arc::new(move |event: &ProbeEvent| {
                events_for_callback.lock().unwrap().push(event.clone());
            }))
            .await;
        let now = Utc::now();

        scheduler.run_cycle(now).await;

        let mut events = events.lock().unwrap().clone();
        events.sort_by_key(|e| e.address.clone());
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EndpointKind::Primary);
        assert!(events[0].alive);
        assert_eq!(events[1].kind, EndpointKind::Management);
        assert!(!events[1].alive);
        assert!(events.iter().all(|e| e.target == "DP-01" && e.at >= now));

        let target = scheduler.registry().get("DP-01").await.unwrap();
        assert_eq!(target.primary().last_success_at(), Some(events[0].at));
    }
}
