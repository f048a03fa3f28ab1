use crate::error::ConfigError;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 问答后端地址
    pub backend_url: String,
    /// 后端鉴权 token（可选）
    pub auth_token: Option<String>,
    /// 同时在途的请求数量上限
    pub max_concurrent: usize,
    /// 单次请求超时（秒）
    pub request_timeout_secs: u64,
    /// 待处理队列长度上限，达到后拒绝新提交
    pub max_pending: usize,
    /// 问题最大字符数
    pub max_question_len: usize,
    /// 是否拒绝重复问题
    pub reject_duplicates: bool,
    /// 逐段展示答案的间隔（毫秒）
    pub reveal_interval_ms: u64,
    /// 持久化目录
    pub store_dir: String,
    /// 会话没有上传标记时是否假定文档已就绪
    pub assume_document_ready: bool,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:8000".to_string(),
            auth_token: None,
            max_concurrent: 3,
            request_timeout_secs: 30,
            max_pending: 5,
            max_question_len: 1000,
            reject_duplicates: true,
            reveal_interval_ms: 50,
            store_dir: ".question_store".to_string(),
            assume_document_ready: true,
            verbose_logging: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            backend_url: std::env::var("BACKEND_URL").unwrap_or(default.backend_url),
            auth_token: std::env::var("BACKEND_AUTH_TOKEN").ok().filter(|v| !v.is_empty()).or(default.auth_token),
            max_concurrent: std::env::var("MAX_CONCURRENT").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_concurrent),
            request_timeout_secs: std::env::var("REQUEST_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.request_timeout_secs),
            max_pending: std::env::var("MAX_PENDING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_pending),
            max_question_len: std::env::var("MAX_QUESTION_LEN").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_question_len),
            reject_duplicates: std::env::var("REJECT_DUPLICATES").ok().and_then(|v| v.parse().ok()).unwrap_or(default.reject_duplicates),
            reveal_interval_ms: std::env::var("REVEAL_INTERVAL_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.reveal_interval_ms),
            store_dir: std::env::var("STORE_DIR").unwrap_or(default.store_dir),
            assume_document_ready: std::env::var("ASSUME_DOCUMENT_READY").ok().and_then(|v| v.parse().ok()).unwrap_or(default.assume_document_ready),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.verbose_logging),
        }
    }

    /// 从 TOML 文件加载配置，缺失字段使用默认值
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        Ok(config)
    }

    /// 检查配置是否可用
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("max_concurrent", self.max_concurrent as u64),
            ("max_pending", self.max_pending as u64),
            ("max_question_len", self.max_question_len as u64),
            ("request_timeout_secs", self.request_timeout_secs),
        ];
        for (field, value) in checks {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field: field.to_string(),
                    reason: "必须大于 0".to_string(),
                });
            }
        }
        if self.backend_url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "backend_url".to_string(),
                reason: "不能为空".to_string(),
            });
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn reveal_interval(&self) -> Duration {
        Duration::from_millis(self.reveal_interval_ms)
    }

    /// 账本相关的限制
    pub fn ledger_limits(&self) -> crate::workflow::LedgerLimits {
        crate::workflow::LedgerLimits {
            max_question_len: self.max_question_len,
            reject_duplicates: self.reject_duplicates,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_concurrent, 3);
        assert_eq!(config.max_pending, 5);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let config = Config {
            max_concurrent: 0,
            ..Config::default()
        };
        match config.validate() {
            Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, "max_concurrent"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_toml_partial_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_concurrent = 2\nreject_duplicates = false").unwrap();

        let config = Config::from_toml_file(file.path()).unwrap();
        assert_eq!(config.max_concurrent, 2);
        assert!(!config.reject_duplicates);
        assert_eq!(config.max_pending, 5);
    }

    #[test]
    fn test_toml_garbage_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_concurrent = \"lots\"").unwrap();

        assert!(matches!(
            Config::from_toml_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }
}
