//! 配置文件监控模块
//!
//! 监控配置文件变更并重新加载，供运行中的引擎整体替换目标集合。

use crate::config::loader::{ConfigLoader, TomlConfigLoader};
use crate::config::types::Config;
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

/// 配置变更事件
#[derive(Debug, Clone)]
pub struct ConfigChangeEvent {
    /// 配置文件路径
    pub config_path: PathBuf,
    /// 新配置
    pub new_config: Config,
    /// 变更时间
    pub timestamp: Instant,
    /// 配置版本号
    pub version: u64,
}

/// 配置文件监控器
pub struct ConfigWatcher {
    config_path: PathBuf,
    watcher: Option<RecommendedWatcher>,
    loader: TomlConfigLoader,
    event_sender: broadcast::Sender<ConfigChangeEvent>,
    /// 防抖动延迟
    debounce_delay: Duration,
}

impl ConfigWatcher {
    /// 创建新的配置监控器
    ///
    /// # 参数
    /// * `config_path` - 配置文件路径
    /// * `debounce_delay` - 防抖动延迟时间
    ///
    /// # 返回
    /// * `Result<(Self, broadcast::Receiver<ConfigChangeEvent>)>` - 监控器和事件接收器
    pub fn new<P: AsRef<Path>>(
        config_path: P,
        debounce_delay: Duration,
    ) -> Result<(Self, broadcast::Receiver<ConfigChangeEvent>)> {
        let config_path = config_path.as_ref().to_path_buf();
        Self::validate_config_path(&config_path)?;

        let (event_sender, event_receiver) = broadcast::channel(16);
        let watcher = Self {
            config_path,
            watcher: None,
            loader: TomlConfigLoader::new(true),
            event_sender,
            debounce_delay,
        };

        Ok((watcher, event_receiver))
    }

    fn validate_config_path(path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(anyhow::anyhow!("配置文件不存在: {}", path.display()));
        }
        if !path.is_file() {
            return Err(anyhow::anyhow!("路径不是文件: {}", path.display()));
        }
        if path.extension().is_some_and(|ext| ext != "toml") {
            warn!("配置文件扩展名不是.toml: {}", path.display());
        }

        std::fs::File::open(path)
            .with_context(|| format!("无法读取配置文件 {}", path.display()))?;
        Ok(())
    }

    /// 启动配置文件监控
    pub fn start(&mut self) -> Result<()> {
        info!("启动配置文件监控: {}", self.config_path.display());

        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                // 接收端关闭时忽略
                let _ = tx.send(res);
            },
            notify::Config::default().with_poll_interval(Duration::from_secs(1)),
        )
        .context("创建文件监控器失败")?;

        // 监控所在目录，编辑器的原子替换写入也能捕获
        let watch_path = match self.config_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        watcher
            .watch(&watch_path, RecursiveMode::NonRecursive)
            .with_context(|| format!("监控目录失败: {}", watch_path.display()))?;

        self.watcher = Some(watcher);

        tokio::spawn(Self::handle_file_events(
            rx,
            self.config_path.clone(),
            self.event_sender.clone(),
            self.loader.clone(),
            self.debounce_delay,
        ));

        Ok(())
    }

    async fn handle_file_events(
        mut rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
        config_path: PathBuf,
        event_sender: broadcast::Sender<ConfigChangeEvent>,
        loader: TomlConfigLoader,
        debounce_delay: Duration,
    ) {
        let mut last_event_time: Option<Instant> = None;
        let mut version = 1u64;

        while let Some(res) = rx.recv().await {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    error!("文件监控事件错误: {}", e);
                    continue;
                }
            };

            if !Self::is_target_file_event(&event, &config_path) {
                continue;
            }

            let now = Instant::now();
            if last_event_time.is_some_and(|last| now.duration_since(last) < debounce_delay) {
                debug!("跳过重复事件（防抖动）");
                continue;
            }
            last_event_time = Some(now);

            // 等待写入完成
            tokio::time::sleep(debounce_delay).await;

            match Self::reload_config(&loader, &config_path, version).await {
                Ok(change_event) => {
                    info!("配置重载成功，版本: {}", version);
                    version += 1;
                    if event_sender.send(change_event).is_err() {
                        debug!("没有配置变更订阅者");
                    }
                }
                Err(e) => {
                    // 保留旧配置继续运行
                    error!("配置重载失败: {:#}", e);
                }
            }
        }

        debug!("配置文件监控事件通道已关闭");
    }

    /// 是否是目标文件的修改或创建事件
    fn is_target_file_event(event: &Event, target_path: &Path) -> bool {
        if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
            return false;
        }

        event
            .paths
            .iter()
            .any(|path| path == target_path || path.file_name() == target_path.file_name())
    }

    async fn reload_config(
        loader: &TomlConfigLoader,
        config_path: &Path,
        version: u64,
    ) -> Result<ConfigChangeEvent> {
        debug!("重新加载配置文件: {}", config_path.display());

        let new_config = loader
            .load_from_file(config_path)
            .await
            .context("重新加载配置失败")?;

        Ok(ConfigChangeEvent {
            config_path: config_path.to_path_buf(),
            new_config,
            timestamp: Instant::now(),
            version,
        })
    }

    /// 订阅配置变更事件
    pub fn subscribe(&self) -> broadcast::Receiver<ConfigChangeEvent> {
        self.event_sender.subscribe()
    }

    /// 停止监控
    pub fn stop(&mut self) {
        if self.watcher.take().is_some() {
            info!("配置文件监控已停止");
        }
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
