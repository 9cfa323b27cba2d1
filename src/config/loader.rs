//! 配置加载器实现
//!
//! 提供TOML配置文件解析、环境变量替换和错误处理功能

use crate::config::types::{validate_config, Config};
use crate::error::{ConfigError, Result};
use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};

/// 默认配置文件名
pub const DEFAULT_CONFIG_FILE: &str = "fleet-vitals.toml";

/// 配置加载器trait，定义配置加载接口
#[async_trait]
pub trait ConfigLoader: Send + Sync {
    /// 从文件加载配置
    ///
    /// # 参数
    /// * `path` - 配置文件路径
    ///
    /// # 返回
    /// * `Result<Config>` - 加载的配置或错误
    async fn load_from_file<P: AsRef<Path> + Send>(&self, path: P) -> Result<Config>;

    /// 从字符串加载配置
    async fn load_from_string(&self, content: &str) -> Result<Config>;

    /// 验证配置
    fn validate(&self, config: &Config) -> Result<()>;
}

/// TOML配置加载器实现
#[derive(Debug, Clone)]
pub struct TomlConfigLoader {
    /// 是否启用环境变量替换
    enable_env_substitution: bool,
}

impl TomlConfigLoader {
    /// 创建新的TOML配置加载器
    ///
    /// # 参数
    /// * `enable_env_substitution` - 是否启用 `${VAR}` 环境变量替换
    pub fn new(enable_env_substitution: bool) -> Self {
        Self {
            enable_env_substitution,
        }
    }

    /// 替换字符串中的环境变量，未设置的变量视为错误
    fn substitute_env_vars(&self, content: &str) -> Result<String> {
        if !self.enable_env_substitution {
            return Ok(content.to_string());
        }

        let env_var_regex = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
            .map_err(|e| ConfigError::ParseError(format!("正则表达式错误: {}", e)))?;

        let mut result = content.to_string();
        for captures in env_var_regex.captures_iter(content) {
            let var_name = &captures[1];
            let value = std::env::var(var_name).map_err(|_| ConfigError::EnvVarError {
                var: var_name.to_string(),
            })?;
            result = result.replace(&captures[0], &value);
        }

        Ok(result)
    }

    fn parse_toml(&self, content: &str) -> Result<Config> {
        let processed_content = self.substitute_env_vars(content)?;

        let config: Config = toml::from_str(&processed_content)
            .map_err(|e| ConfigError::ParseError(format!("TOML解析失败: {}", e)))?;

        Ok(config)
    }
}

impl Default for TomlConfigLoader {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl ConfigLoader for TomlConfigLoader {
    async fn load_from_file<P: AsRef<Path> + Send>(&self, path: P) -> Result<Config> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_string_lossy().to_string(),
            }
            .into());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::ParseError(format!("读取文件失败: {}", e)))?;

        let config = self.parse_toml(&content)?;
        self.validate(&config)?;

        log::info!(
            "成功加载配置文件: {} ({} 台主机)",
            path.display(),
            config.hosts.len()
        );
        log::debug!("配置内容: {:?}", config);

        Ok(config)
    }

    async fn load_from_string(&self, content: &str) -> Result<Config> {
        let config = self.parse_toml(content)?;
        self.validate(&config)?;

        log::debug!("成功解析配置字符串");
        Ok(config)
    }

    fn validate(&self, config: &Config) -> Result<()> {
        validate_config(config).map_err(|e| ConfigError::ValidationError(e).into())
    }
}

/// 获取默认配置文件路径
///
/// 优先使用当前目录下的 `fleet-vitals.toml`，否则使用用户配置目录。
pub fn get_default_config_path() -> PathBuf {
    let local = PathBuf::from(DEFAULT_CONFIG_FILE);
    if local.exists() {
        return local;
    }

    dirs::config_dir()
        .map(|config_dir| config_dir.join("fleet-vitals").join("config.toml"))
        .unwrap_or(local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tempfile::NamedTempFile;

    const TEST_CONFIG_TOML: &str = r#"
[global]
check_interval_seconds = 30
log_level = "debug"
probe_name_prefixes = ["DP", "CDN77"]

[[hosts]]
name = "DP-01"
primary = "10.0.0.1"
management = "10.0.1.1"

[[hosts]]
name = "CDN77-lon"
primary = "lon.cdn.example.net"
"#;

    const TEST_CONFIG_WITH_ENV_VARS: &str = r#"
[global]
status_file = "${FV_TEST_STATUS_DIR}/status.json"

[[hosts]]
name = "DP-01"
primary = "${FV_TEST_PRIMARY}"
"#;

    #[tokio::test]
    async fn test_toml_parsing() {
        let loader = TomlConfigLoader::new(false);
        let config = loader.load_from_string(TEST_CONFIG_TOML).await.unwrap();

        assert_eq!(config.global.check_interval_seconds, 30);
        assert_eq!(config.global.log_level, "debug");
        assert_eq!(config.global.probe_name_prefixes, vec!["DP", "CDN77"]);
        assert_eq!(config.hosts.len(), 2);
        assert_eq!(config.hosts[1].name, "CDN77-lon");
        assert_eq!(config.hosts[1].management, "");
    }

    #[tokio::test]
    #[serial]
    async fn test_env_var_substitution() {
        env::set_var("FV_TEST_STATUS_DIR", "/var/lib/fleet-vitals");
        env::set_var("FV_TEST_PRIMARY", "10.2.0.1");

        let loader = TomlConfigLoader::new(true);
        let config = loader
            .load_from_string(TEST_CONFIG_WITH_ENV_VARS)
            .await
            .unwrap();

        assert_eq!(
            config.global.status_file,
            Some(PathBuf::from("/var/lib/fleet-vitals/status.json"))
        );
        assert_eq!(config.hosts[0].primary, "10.2.0.1");

        env::remove_var("FV_TEST_STATUS_DIR");
        env::remove_var("FV_TEST_PRIMARY");
    }

    #[tokio::test]
    #[serial]
    async fn test_env_var_substitution_missing_var() {
        env::remove_var("FV_TEST_MISSING_VAR");
        let content = r#"
[[hosts]]
name = "DP-01"
primary = "${FV_TEST_MISSING_VAR}"
"#;

        let loader = TomlConfigLoader::new(true);
        let result = loader.load_from_string(content).await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("FV_TEST_MISSING_VAR"));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), TEST_CONFIG_TOML).unwrap();

        let loader = TomlConfigLoader::new(true);
        let config = loader.load_from_file(file.path()).await.unwrap();
        assert_eq!(config.hosts.len(), 2);
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let loader = TomlConfigLoader::default();
        let result = loader.load_from_file("/nonexistent/fleet-vitals.toml").await;

        assert!(matches!(
            result,
            Err(crate::error::MonitorError::Config(ConfigError::FileNotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let loader = TomlConfigLoader::new(false);
        let result = loader
            .load_from_string("[global]\ncheck_interval_seconds = 0\n")
            .await;

        assert!(matches!(
            result,
            Err(crate::error::MonitorError::Config(ConfigError::ValidationError(_)))
        ));
    }

    #[test]
    fn test_substitute_env_vars_disabled() {
        let loader = TomlConfigLoader::new(false);
        let content = "test ${VAR} content";
        let result = loader.substitute_env_vars(content).unwrap();
        assert_eq!(result, content);
    }

    #[test]
    fn test_get_default_config_path() {
        let path = get_default_config_path();
        let path = path.to_string_lossy();
        assert!(path.ends_with(DEFAULT_CONFIG_FILE) || path.contains("fleet-vitals"));
    }
}
