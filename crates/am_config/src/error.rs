// crates/am_config/src/error.rs

//! 配置错误类型

use am_foundation::AmError;
use thiserror::Error;

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 解析错误
    #[error("解析错误: {0}")]
    Parse(String),

    /// 无效值
    #[error("无效值 '{key}': {value} - {reason}")]
    InvalidValue {
        /// 配置键
        key: String,
        /// 配置值
        value: String,
        /// 原因
        reason: String,
    },

    /// 缺失配置
    #[error("缺失配置: {0}")]
    Missing(String),
}

impl ConfigError {
    /// 构造无效值错误
    pub fn invalid(key: &str, value: impl ToString, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<ConfigError> for AmError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Io(e) => AmError::io_with_source("读取配置失败", e),
            ConfigError::Parse(msg) => AmError::config(msg),
            ConfigError::InvalidValue { key, value, reason } => {
                AmError::invalid_config(key, value, reason)
            }
            ConfigError::Missing(key) => AmError::config(format!("缺失配置: {key}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConfigError::invalid("grid.dx", -1.0, "必须为正");
        assert!(err.to_string().contains("grid.dx"));
        let am: AmError = err.into();
        assert!(matches!(am, AmError::InvalidConfig { .. }));
    }
}
