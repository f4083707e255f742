//! 配置文件管理模块

use crate::core::models::AppConfig;
use crate::storage::output::write_json;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// 配置管理器
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// 创建配置管理器
    pub fn new(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    /// 获取默认配置路径
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "storycensus", "StoryCensus")
            .map(|d| d.config_dir().join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// 加载配置，文件不存在时使用默认值
    pub fn load(&self) -> Result<AppConfig> {
        if self.config_path.exists() {
            let content = std::fs::read_to_string(&self.config_path)
                .with_context(|| format!("无法读取配置: {}", self.config_path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("配置格式错误: {}", self.config_path.display()))
        } else {
            tracing::debug!("配置文件不存在，使用默认配置: {}", self.config_path.display());
            Ok(AppConfig::default())
        }
    }

    /// 保存配置
    pub fn save(&self, config: &AppConfig) -> Result<()> {
        write_json(&self.config_path, config)
    }

    /// 重置为默认配置
    pub fn reset(&self) -> Result<()> {
        self.save(&AppConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_save_load() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");

        let manager = ConfigManager::new(config_path);

        let mut config = AppConfig::default();
        config.known_batches = vec![0, 1, 2];
        config.report_suffix = "-analysis".to_string();

        manager.save(&config).unwrap();

        let loaded = manager.load().unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_and_partial_config() {
        let dir = tempdir().unwrap();
        let manager = ConfigManager::new(dir.path().join("config.json"));
        assert_eq!(manager.load().unwrap(), AppConfig::default());

        std::fs::write(manager.path(), r#"{"csv_dir": "out"}"#).unwrap();
        let loaded = manager.load().unwrap();
        assert_eq!(loaded.csv_dir, PathBuf::from("out"));
        assert_eq!(loaded.report_suffix, "-behaviors");

        manager.reset().unwrap();
        assert_eq!(manager.load().unwrap(), AppConfig::default());
    }

    #[test]
    fn test_broken_config_is_error() {
        let dir = tempdir().unwrap();
        let manager = ConfigManager::new(dir.path().join("config.json"));
        std::fs::write(manager.path(), "{not json").unwrap();
        assert!(manager.load().is_err());
    }
}
