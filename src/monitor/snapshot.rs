//! 状态快照与导出记录
//!
//! 只读视图：从目标集合计算每台主机的最近成功时长、端点状态与分类，
//! 不修改任何目标状态。

use crate::monitor::classify::{Classification, Classifier};
use crate::monitor::target::{Endpoint, EndpointState, Target};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 导出表头
pub const EXPORT_HEADERS: [&str; 7] = [
    "Server Name",
    "Primary IP",
    "Management IP",
    "Primary Last Ping (s ago)",
    "Management Last Ping (s ago)",
    "Primary Status",
    "Management Status",
];

/// 缺省值占位符
pub const NOT_AVAILABLE: &str = "N/A";

/// 单台主机的快照条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// 主机名称
    pub name: String,
    /// 主地址
    pub primary_address: String,
    /// 管理地址
    pub management_address: String,
    /// 距主端点上次成功的时长
    #[serde(with = "duration_secs_opt")]
    pub primary_age: Option<Duration>,
    /// 距管理端点上次成功的时长
    #[serde(with = "duration_secs_opt")]
    pub management_age: Option<Duration>,
    /// 主端点状态
    pub primary_state: EndpointState,
    /// 管理端点状态
    pub management_state: EndpointState,
    /// 主机分类
    pub classification: Classification,
}

impl SnapshotEntry {
    /// 由目标计算快照条目
    pub fn from_target(target: &Target, classifier: &Classifier, now: DateTime<Utc>) -> Self {
        Self {
            name: target.name.clone(),
            primary_address: target.primary().address().to_string(),
            management_address: target.management().address().to_string(),
            primary_age: age_since(target.primary(), now),
            management_age: age_since(target.management(), now),
            primary_state: target.primary().state(),
            management_state: target.management().state(),
            classification: classifier.classify(target),
        }
    }
}

/// 计算快照
pub fn snapshot(targets: &[Target], classifier: &Classifier, now: DateTime<Utc>) -> Vec<SnapshotEntry> {
    targets
        .iter()
        .map(|target| SnapshotEntry::from_target(target, classifier, now))
        .collect()
}

/// 距上次成功的时长；时钟回拨时记为0
fn age_since(endpoint: &Endpoint, now: DateTime<Utc>) -> Option<Duration> {
    endpoint
        .last_success_at()
        .map(|last| (now - last).to_std().unwrap_or(Duration::ZERO))
}

/// 上次成功距今的秒数，或从未成功
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastSeen {
    /// 距今秒数
    SecondsAgo(u64),
    /// 从未成功
    Never,
}

impl LastSeen {
    fn from_age(age: Option<Duration>) -> Self {
        match age {
            Some(age) => LastSeen::SecondsAgo(age.as_secs_f64().round() as u64),
            None => LastSeen::Never,
        }
    }
}

impl std::fmt::Display for LastSeen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LastSeen::SecondsAgo(secs) => write!(f, "{secs}"),
            LastSeen::Never => write!(f, "{NOT_AVAILABLE}"),
        }
    }
}

impl Serialize for LastSeen {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            LastSeen::SecondsAgo(secs) => serializer.serialize_u64(*secs),
            LastSeen::Never => serializer.serialize_str(NOT_AVAILABLE),
        }
    }
}

/// 单台主机的导出记录，可直接序列化为表格行
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportRecord {
    /// 主机名称
    pub name: String,
    /// 主地址
    pub primary_address: String,
    /// 管理地址
    pub management_address: String,
    /// 主端点上次成功距今
    pub primary_last_seen: LastSeen,
    /// 管理端点上次成功距今
    pub management_last_seen: LastSeen,
    /// 主端点状态，无地址时为 N/A
    pub primary_status: String,
    /// 管理端点状态，无地址时为 N/A
    pub management_status: String,
}

impl ExportRecord {
    /// 由快照条目生成导出记录
    pub fn from_entry(entry: &SnapshotEntry) -> Self {
        let status = |address: &str, state: EndpointState| {
            if address.is_empty() {
                NOT_AVAILABLE.to_string()
            } else {
                state.to_string()
            }
        };

        Self {
            name: entry.name.clone(),
            primary_address: entry.primary_address.clone(),
            management_address: entry.management_address.clone(),
            primary_last_seen: LastSeen::from_age(entry.primary_age),
            management_last_seen: LastSeen::from_age(entry.management_age),
            primary_status: status(&entry.primary_address, entry.primary_state),
            management_status: status(&entry.management_address, entry.management_state),
        }
    }

    /// 按导出表头顺序输出各列
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.primary_address.clone(),
            self.management_address.clone(),
            self.primary_last_seen.to_string(),
            self.management_last_seen.to_string(),
            self.primary_status.clone(),
            self.management_status.clone(),
        ]
    }
}

/// 由快照生成导出记录
pub fn export_records(entries: &[SnapshotEntry]) -> Vec<ExportRecord> {
    entries.iter().map(ExportRecord::from_entry).collect()
}

/// 相对时间格式化，如 `12s ago`、`3m ago`、`2h ago`
pub fn format_age(age: Option<Duration>) -> String {
    let Some(age) = age else {
        return "-".to_string();
    };

    let seconds = age.as_secs();
    if seconds < 60 {
        return format!("{seconds}s ago");
    }
    let minutes = (seconds as f64 / 60.0).round() as u64;
    if minutes < 60 {
        return format!("{minutes}m ago");
    }
    let hours = (minutes as f64 / 60.0).round() as u64;
    format!("{hours}h ago")
}

/// 状态文件内容
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusDocument {
    /// 生成时间
    pub generated_at: DateTime<Utc>,
    /// 各主机快照
    pub targets: Vec<SnapshotEntry>,
}

impl StatusDocument {
    /// 由快照中的时长推算端点上次成功的时间
    pub fn last_success_at(&self, age: Option<Duration>) -> Option<DateTime<Utc>> {
        age.and_then(|age| chrono::Duration::from_std(age).ok())
            .map(|age| self.generated_at - age)
    }
}

/// 读取状态文件，文件不存在时返回 `None`
pub async fn load_snapshot(path: &Path) -> crate::error::Result<Option<StatusDocument>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = tokio::fs::read_to_string(path).await?;
    let document: StatusDocument = serde_json::from_str(&content)?;
    Ok(Some(document))
}

/// 将快照写入状态文件
///
/// 先写临时文件再重命名，读取方不会看到半写入的内容。
pub async fn save_snapshot(
    path: &Path,
    entries: Vec<SnapshotEntry>,
    generated_at: DateTime<Utc>,
) -> crate::error::Result<()> {
    let document = StatusDocument {
        generated_at,
        targets: entries,
    };
    let content = serde_json::to_string_pretty(&document)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, content).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

/// 可选时长按秒序列化
mod duration_secs_opt {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.map(|d| d.as_secs()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
