//! 可达性探测器
//!
//! 引擎只依赖 [`Prober`] 能力：给定地址与尝试次数，返回是否可达。
//! 每次尝试都有超时上限，任何错误都折叠为“不可达”。

use crate::error::ProbeError;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// 默认尝试次数
pub const DEFAULT_PROBE_ATTEMPTS: u32 = 3;

/// 默认单次尝试超时
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(1);

/// 探测器trait，定义探测接口
#[async_trait]
pub trait Prober: Send + Sync {
    /// 执行一次探测尝试
    ///
    /// # 参数
    /// * `address` - 目标地址
    /// * `attempt_timeout` - 本次尝试的超时时间
    ///
    /// # 返回
    /// * `Result<(), ProbeError>` - 成功表示目标应答
    async fn attempt(&self, address: &str, attempt_timeout: Duration) -> Result<(), ProbeError>;

    /// 单次尝试的超时上限
    fn attempt_timeout(&self) -> Duration {
        DEFAULT_ATTEMPT_TIMEOUT
    }

    /// 带重试的可达性探测
    ///
    /// 最多尝试 `attempts` 次，首次成功即返回；
    /// 全部失败、超时或出现传输错误时返回 `false`。
    async fn probe(&self, address: &str, attempts: u32) -> bool {
        let attempt_timeout = self.attempt_timeout();

        for attempt in 1..=attempts.max(1) {
            let outcome = match timeout(attempt_timeout, self.attempt(address, attempt_timeout)).await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(ProbeError::Timeout(attempt_timeout)),
            };

            match outcome {
                Ok(()) => {
                    debug!("探测成功: {} (第{}次尝试)", address, attempt);
                    return true;
                }
                Err(e) => {
                    debug!("探测尝试失败: {} (第{}次尝试) - {}", address, attempt, e);
                }
            }
        }

        false
    }
}

/// 基于系统 `ping` 命令的探测器
#[derive(Debug, Clone)]
pub struct PingProber {
    /// 单次尝试超时
    attempt_timeout: Duration,
    /// ping 可执行文件
    program: String,
}

impl PingProber {
    /// 创建新的 ping 探测器
    ///
    /// # 参数
    /// * `attempt_timeout` - 单次尝试超时
    pub fn new(attempt_timeout: Duration) -> Self {
        Self {
            attempt_timeout,
            program: "ping".to_string(),
        }
    }

    /// 指定 ping 可执行文件路径
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// 构造 ping 参数：发送一个回显请求，等待不超过超时秒数
    fn build_args(address: &str, attempt_timeout: Duration) -> Vec<String> {
        let wait_secs = attempt_timeout.as_secs().max(1);
        vec![
            "-c".to_string(),
            "1".to_string(),
            "-W".to_string(),
            wait_secs.to_string(),
            address.to_string(),
        ]
    }
}

impl Default for PingProber {
    fn default() -> Self {
        Self::new(DEFAULT_ATTEMPT_TIMEOUT)
    }
}

#[async_trait]
impl Prober for PingProber {
    async fn attempt(&self, address: &str, attempt_timeout: Duration) -> Result<(), ProbeError> {
        if address.trim().is_empty() {
            return Err(ProbeError::Transport("地址为空".to_string()));
        }

        let status = Command::new(&self.program)
            .args(Self::build_args(address, attempt_timeout))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| ProbeError::Command(format!("无法执行 {}: {}", self.program, e)))?;

        if status.success() {
            Ok(())
        } else {
            Err(ProbeError::Unreachable {
                address: address.to_string(),
            })
        }
    }

    fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }
}
