//! 命令处理逻辑
//!
//! 实现各种CLI命令的处理逻辑

use crate::cli::args::{Args, Commands, OutputFormat};
use crate::config::{Config, ConfigLoader, TomlConfigLoader};
use crate::error::Result;
use crate::monitor::snapshot::EXPORT_HEADERS;
use crate::monitor::{
    export_records, format_age, snapshot, Classification, CycleScheduler, ExportRecord,
    SnapshotEntry, TargetRegistry,
};
use async_trait::async_trait;
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;

/// 默认配置模板
const CONFIG_TEMPLATE: &str = include_str!("../../demos/fleet-vitals.toml");

/// 命令处理器trait
#[async_trait]
pub trait Command: Send + Sync {
    /// 执行命令
    async fn execute(&self, args: &Args) -> Result<()>;
}

/// 版本命令
pub struct VersionCommand;

#[async_trait]
impl Command for VersionCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Version { format } = &args.command {
            match format {
                OutputFormat::Json => {
                    let version_info = serde_json::json!({
                        "name": crate::APP_NAME,
                        "version": crate::VERSION,
                        "description": crate::APP_DESCRIPTION
                    });
                    println!("{}", serde_json::to_string_pretty(&version_info)?);
                }
                _ => {
                    println!("{} v{}", crate::APP_NAME, crate::VERSION);
                    println!("{}", crate::APP_DESCRIPTION);
                }
            }
        }
        Ok(())
    }
}

/// 初始化命令
pub struct InitCommand;

#[async_trait]
impl Command for InitCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Init { config_path, force } = &args.command {
            self.create_config_file(config_path, *force).await?;
        }
        Ok(())
    }
}

impl InitCommand {
    /// 创建配置文件
    ///
    /// # 返回
    /// * `Result<bool>` - 是否写入了文件
    pub async fn create_config_file(&self, config_path: &Path, force: bool) -> Result<bool> {
        if config_path.exists() && !force {
            eprintln!("配置文件已存在: {}", config_path.display());
            eprintln!("使用 --force 参数覆盖现有文件");
            return Ok(false);
        }

        if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(config_path, CONFIG_TEMPLATE).await?;

        println!("配置文件已创建: {}", config_path.display());
        println!("请编辑配置文件以添加您的主机");
        Ok(true)
    }
}

/// 验证命令
pub struct ValidateCommand;

#[async_trait]
impl Command for ValidateCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Validate {
            config_path,
            verbose,
        } = &args.command
        {
            let config_file = config_path
                .clone()
                .unwrap_or_else(|| args.get_config_path());
            self.validate_config_file(&config_file, *verbose).await?;
        }
        Ok(())
    }
}

impl ValidateCommand {
    async fn validate_config_file(&self, config_path: &Path, verbose: bool) -> Result<()> {
        println!("验证配置文件: {}", config_path.display());

        let loader = TomlConfigLoader::new(true);
        let config = loader.load_from_file(config_path).await?;

        println!("✓ 配置文件验证通过");
        println!("✓ 找到 {} 台主机", config.hosts.len());

        if verbose {
            let global = &config.global;
            println!("全局配置:");
            println!("  探测间隔: {}秒", global.check_interval_seconds);
            println!("  日志级别: {}", global.log_level);
            println!("  探测超时: {}秒", global.probe_timeout_seconds);
            println!("  尝试次数: {}", global.retry_attempts);
            println!("  最大并发: {}", global.max_concurrent_probes);
            println!("  管理端点间隔: {}秒", global.management_min_spacing_seconds);
            println!("  探测前缀: {:?}", global.probe_name_prefixes);

            println!("主机:");
            for (i, host) in config.hosts.iter().enumerate() {
                println!(
                    "  {}. {} 主: {} 管理: {}",
                    i + 1,
                    host.name,
                    or_dash(&host.primary),
                    or_dash(&host.management)
                );
            }
        }

        Ok(())
    }
}

/// 检测命令
pub struct CheckCommand;

#[async_trait]
impl Command for CheckCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Check { host, format } = &args.command {
            let config = load_config(args).await?;
            let mut entries = run_single_cycle(&config).await;

            if let Some(name) = host {
                entries.retain(|e| &e.name == name);
                if entries.is_empty() {
                    eprintln!("未找到名为 '{name}' 的主机");
                    return Ok(());
                }
            }

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
                OutputFormat::Table => print!("{}", render_check_table(&entries)),
                OutputFormat::Text => print!("{}", render_check_text(&entries)),
            }
        }
        Ok(())
    }
}

/// 导出命令
pub struct ExportCommand;

#[async_trait]
impl Command for ExportCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Export { format } = &args.command {
            let config = load_config(args).await?;
            let entries = run_single_cycle(&config).await;
            let records = export_records(&entries);

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
                _ => print!("{}", render_export_table(&records)),
            }
        }
        Ok(())
    }
}

async fn load_config(args: &Args) -> Result<Config> {
    TomlConfigLoader::new(true)
        .load_from_file(args.get_config_path())
        .await
}

/// 加载配置中的主机并执行一个探测周期
pub async fn run_single_cycle(config: &Config) -> Vec<SnapshotEntry> {
    let registry = Arc::new(TargetRegistry::with_rows(config.hosts.clone()).await);
    let scheduler = CycleScheduler::new(
        Arc::clone(&registry),
        Arc::new(config.global.ping_prober()),
        config.global.scheduler_settings(),
    );

    scheduler.run_cycle(Utc::now()).await;

    let targets = registry.targets().await;
    snapshot(&targets, &config.global.classifier(), Utc::now())
}

fn or_dash(value: &str) -> &str {
    if value.is_empty() {
        "-"
    } else {
        value
    }
}

fn classification_icon(classification: Classification) -> &'static str {
    match classification {
        Classification::Ok => "✓",
        Classification::PartialFailure => "!",
        Classification::FullFailure => "✗",
        Classification::Neutral => "·",
    }
}

/// 文本格式输出
pub fn render_check_text(entries: &[SnapshotEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&format!(
            "{} {} - {}\n",
            classification_icon(entry.classification),
            entry.name,
            entry.classification
        ));
        out.push_str(&format!(
            "  主: {} {} ({})\n",
            or_dash(&entry.primary_address),
            entry.primary_state,
            format_age(entry.primary_age)
        ));
        if !entry.management_address.is_empty() {
            out.push_str(&format!(
                "  管理: {} {} ({})\n",
                entry.management_address,
                entry.management_state,
                format_age(entry.management_age)
            ));
        }
    }
    out
}

/// 表格格式输出
pub fn render_check_table(entries: &[SnapshotEntry]) -> String {
    let mut out = format!(
        "{:<20} {:<10} {:<18} {:<10} {:<18} {:<10}\n",
        "主机名称", "分类", "主地址", "主上次成功", "管理地址", "管理上次成功"
    );
    out.push_str(&"-".repeat(90));
    out.push('\n');

    for entry in entries {
        out.push_str(&format!(
            "{:<20} {:<10} {:<18} {:<10} {:<18} {:<10}\n",
            entry.name,
            entry.classification.to_string(),
            or_dash(&entry.primary_address),
            format_age(entry.primary_age),
            or_dash(&entry.management_address),
            format_age(entry.management_age)
        ));
    }
    out
}

/// 导出表格：表头加每台主机一行，制表符分隔
pub fn render_export_table(records: &[ExportRecord]) -> String {
    let mut out = EXPORT_HEADERS.join("\t");
    out.push('\n');
    for record in records {
        out.push_str(&record.to_row().join("\t"));
        out.push('\n');
    }
    out
}
