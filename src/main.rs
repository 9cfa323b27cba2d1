//! Fleet Vitals 主程序入口
//!
//! 主机可达性监控工具

use anyhow::{Context, Result};
use clap::Parser;
use fleet_vitals::cli::args::{Args, Commands};
use fleet_vitals::cli::commands::{
    CheckCommand, Command, ExportCommand, InitCommand, ValidateCommand, VersionCommand,
};
use fleet_vitals::config::{self, ConfigLoader, ConfigWatcher, TomlConfigLoader};
use fleet_vitals::logging::{LogConfig, LoggingSystem};
use fleet_vitals::monitor::{
    load_snapshot, save_snapshot, snapshot, Classifier, CycleReport, CycleScheduler, ProbeEvent,
    Scheduler, TargetRegistry,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::{broadcast, Notify, RwLock};
use tracing::{debug, error, info, warn};

/// 停止时等待进行中周期的最长时间
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.log_level {
        Some(level) => level.to_string(),
        None => configured_log_level(&args).await,
    };
    let logging = Arc::new(
        LoggingSystem::setup_logging(LogConfig::from_level_str(&level, args.verbose))
            .context("初始化日志系统失败")?,
    );

    info!("Fleet Vitals v{} 启动", fleet_vitals::VERSION);

    if let Err(e) = execute_command(&args, logging).await {
        error!("命令执行失败: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// 读取配置文件中的日志级别，读取失败时使用 info
async fn configured_log_level(args: &Args) -> String {
    TomlConfigLoader::new(true)
        .load_from_file(args.get_config_path())
        .await
        .map(|config| config.global.log_level)
        .unwrap_or_else(|_| "info".to_string())
}

/// 执行CLI命令
async fn execute_command(args: &Args, logging: Arc<LoggingSystem>) -> Result<()> {
    let result = match &args.command {
        Commands::Start {
            interval,
            max_concurrent,
        } => return start_service(args, *interval, *max_concurrent, logging).await,
        Commands::Check { .. } => CheckCommand.execute(args).await,
        Commands::Export { .. } => ExportCommand.execute(args).await,
        Commands::Init { .. } => InitCommand.execute(args).await,
        Commands::Validate { .. } => ValidateCommand.execute(args).await,
        Commands::Version { .. } => VersionCommand.execute(args).await,
    };

    result.map_err(anyhow::Error::from)
}

/// 加载配置文件并应用命令行覆盖
async fn load_and_validate_config(
    config_path: &Path,
    interval: Option<u64>,
    max_concurrent: Option<usize>,
) -> Result<config::Config> {
    if !config_path.exists() {
        return Err(anyhow::anyhow!(
            "配置文件不存在: {}\n提示：请运行 'fleet-vitals init' 创建默认配置文件",
            config_path.display()
        ));
    }

    let mut config = TomlConfigLoader::new(true)
        .load_from_file(config_path)
        .await
        .with_context(|| format!("加载配置文件失败: {}", config_path.display()))?;

    if let Some(interval_secs) = interval {
        config.global.check_interval_seconds = interval_secs;
    }
    if let Some(max_concurrent_probes) = max_concurrent {
        config.global.max_concurrent_probes = max_concurrent_probes;
    }
    config::validate_config(&config).map_err(|e| anyhow::anyhow!("命令行参数无效: {}", e))?;

    info!("配置加载完成，主机数量: {}", config.hosts.len());
    Ok(config)
}

/// 服务组件集合
struct ServiceComponents {
    registry: Arc<TargetRegistry>,
    scheduler: Arc<CycleScheduler>,
    classifier: Arc<RwLock<Classifier>>,
    /// 每个周期结束后触发状态文件写入
    cycle_done: Arc<Notify>,
}

/// 前台运行监控服务直到收到中断信号
async fn start_service(
    args: &Args,
    interval: Option<u64>,
    max_concurrent: Option<usize>,
    logging: Arc<LoggingSystem>,
) -> Result<()> {
    info!("启动监控服务...");

    let config_path = args.get_config_path();
    let config = load_and_validate_config(&config_path, interval, max_concurrent).await?;

    let components = initialize_service_components(&config, logging).await;

    // 监控器需存活到服务停止
    let _config_watcher =
        match setup_config_hot_reload(&config_path, &components, interval.is_some()) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                warn!("配置热重载不可用: {:#}", e);
                None
            }
        };

    if let Some(ref status_file) = config.global.status_file {
        restore_status_file(&components.registry, status_file).await;
        start_status_writer(&components, status_file.clone());
    }

    components
        .scheduler
        .start(config.global.check_interval_seconds)
        .await
        .context("启动探测调度器失败")?;

    info!("监控服务已启动");

    match signal::ctrl_c().await {
        Ok(()) => info!("收到中断信号，正在停止服务..."),
        Err(err) => error!("监听中断信号失败: {}", err),
    }

    components
        .scheduler
        .stop()
        .await
        .context("停止探测调度器失败")?;

    if tokio::time::timeout(SHUTDOWN_GRACE, components.scheduler.wait_idle())
        .await
        .is_err()
    {
        warn!("等待进行中的探测周期超时");
    }

    if let Some(ref status_file) = config.global.status_file {
        match write_status_file(&components.registry, &components.classifier, status_file).await {
            Ok(()) => info!("状态已保存: {}", status_file.display()),
            Err(e) => warn!("保存状态文件失败: {}", e),
        }
    }

    info!("服务已停止");
    Ok(())
}

async fn initialize_service_components(
    config: &config::Config,
    logging: Arc<LoggingSystem>,
) -> ServiceComponents {
    let registry = Arc::new(TargetRegistry::with_rows(config.hosts.clone()).await);
    let scheduler = Arc::new(CycleScheduler::new(
        Arc::clone(&registry),
        Arc::new(config.global.ping_prober()),
        config.global.scheduler_settings(),
    ));

    let probe_logging = Arc::clone(&logging);
    scheduler
        .set_probe_callback(Arc::new(move |event: &ProbeEvent| probe_logging.probe_log(event)))
        .await;

    let cycle_done = Arc::new(Notify::new());
    let notify_for_callback = Arc::clone(&cycle_done);
    scheduler
        .set_cycle_callback(Arc::new(move |report: &CycleReport| {
            logging.cycle_log(report);
            notify_for_callback.notify_one();
        }))
        .await;

    ServiceComponents {
        registry,
        scheduler,
        classifier: Arc::new(RwLock::new(config.global.classifier())),
        cycle_done,
    }
}

/// 设置配置热重载
///
/// 配置变更时整体替换目标集合；间隔变化时重新设定定时器。
fn setup_config_hot_reload(
    config_path: &Path,
    components: &ServiceComponents,
    interval_pinned: bool,
) -> Result<ConfigWatcher> {
    let (mut config_watcher, mut receiver) =
        ConfigWatcher::new(config_path, Duration::from_millis(500)).context("创建配置监控器失败")?;
    config_watcher.start().context("启动配置监控失败")?;

    let registry = Arc::clone(&components.registry);
    let scheduler = Arc::clone(&components.scheduler);
    let classifier = Arc::clone(&components.classifier);

    tokio::spawn(async move {
        loop {
            let change_event = match receiver.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("配置变更事件积压，跳过 {} 个", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            info!("检测到配置变更，版本: {}", change_event.version);
            let new_config = change_event.new_config;

            registry.load(new_config.hosts).await;
            *classifier.write().await = new_config.global.classifier();

            if interval_pinned {
                continue;
            }
            let new_interval = new_config.global.check_interval_seconds;
            let current = scheduler.get_status().await.interval;
            if current != Some(Duration::from_secs(new_interval)) {
                if let Err(e) = scheduler.set_interval(new_interval).await {
                    error!("更新探测间隔失败: {}", e);
                }
            }
        }
    });

    Ok(config_watcher)
}

/// 启动状态文件写入任务，每个周期结束后写入一次
fn start_status_writer(components: &ServiceComponents, status_file: PathBuf) {
    let registry = Arc::clone(&components.registry);
    let classifier = Arc::clone(&components.classifier);
    let cycle_done = Arc::clone(&components.cycle_done);

    tokio::spawn(async move {
        loop {
            cycle_done.notified().await;
            match write_status_file(&registry, &classifier, &status_file).await {
                Ok(()) => debug!("状态文件已更新: {}", status_file.display()),
                Err(e) => warn!("保存状态文件失败: {}", e),
            }
        }
    });
}

async fn write_status_file(
    registry: &TargetRegistry,
    classifier: &RwLock<Classifier>,
    status_file: &Path,
) -> fleet_vitals::error::Result<()> {
    let targets = registry.targets().await;
    let now = chrono::Utc::now();
    let entries = snapshot(&targets, &*classifier.read().await, now);

    save_snapshot(status_file, entries, now).await
}

/// 从状态文件恢复上次运行的观测结果，读取失败时从空状态开始
async fn restore_status_file(registry: &TargetRegistry, status_file: &Path) {
    match load_snapshot(status_file).await {
        Ok(Some(document)) => {
            registry.restore(&document).await;
        }
        Ok(None) => debug!("状态文件不存在，跳过恢复: {}", status_file.display()),
        Err(e) => warn!("读取状态文件失败，跳过恢复: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_vitals::monitor::{EndpointState, HostRow};
    use tempfile::TempDir;

    async fn registry_with_host() -> TargetRegistry {
        TargetRegistry::with_rows(vec![HostRow::new("DP-01", "10.0.0.1", "")]).await
    }

    #[tokio::test]
    async fn test_write_status_file_reports_failure() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let registry = registry_with_host().await;
        let classifier = RwLock::new(Classifier::default());

        // 父路径是普通文件，无法创建目录
        let result =
            write_status_file(&registry, &classifier, &blocker.join("status.json")).await;
        assert!(result.is_err());

        let status_file = dir.path().join("status.json");
        assert!(write_status_file(&registry, &classifier, &status_file)
            .await
            .is_ok());
        assert!(status_file.exists());
    }

    #[tokio::test]
    async fn test_restore_status_file_seeds_registry() {
        let dir = TempDir::new().unwrap();
        let status_file = dir.path().join("status.json");

        // 文件不存在或内容损坏时保持初始状态
        let registry = registry_with_host().await;
        restore_status_file(&registry, &status_file).await;
        std::fs::write(&status_file, "{").unwrap();
        restore_status_file(&registry, &status_file).await;
        let target = registry.get("DP-01").await.unwrap();
        assert_eq!(target.primary().state(), EndpointState::Unknown);

        let now = chrono::Utc::now();
        let mut previous = fleet_vitals::monitor::Target::new("DP-01", "10.0.0.1", "");
        previous
            .endpoint_mut(fleet_vitals::monitor::EndpointKind::Primary)
            .record_probe(true, now - chrono::Duration::seconds(20));
        let entries = snapshot(&[previous], &Classifier::default(), now);
        save_snapshot(&status_file, entries, now).await.unwrap();

        restore_status_file(&registry, &status_file).await;

        let target = registry.get("DP-01").await.unwrap();
        assert_eq!(target.primary().state(), EndpointState::Up);
        assert_eq!(
            target.primary().last_success_at(),
            Some(now - chrono::Duration::seconds(20))
        );
    }
}
