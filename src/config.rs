//! 定义了客户端会话的可配置参数。
//! Defines configurable parameters for a client session.

use crate::{
    error::{Error, Result},
    protocol::{SessionId, validate_path},
};
use std::time::Duration;

/// A structure containing all configurable parameters for a client.
///
/// 包含客户端所有可配置参数的结构体。
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Comma separated `host:port` list handed to the transport.
    /// 交给传输层的以逗号分隔的 `host:port` 列表。
    pub hosts: String,

    /// Optional namespace path. Validated to start with `/`, trailing slashes
    /// stripped, and created on first use.
    /// 可选的命名空间路径。需以 `/` 开头，去除末尾斜杠，并在首次使用时自动创建。
    pub namespace: Option<String>,

    /// The session timeout negotiated with the server.
    /// 与服务端协商的会话超时时间。
    pub session_timeout: Duration,

    /// A prior session identity to resume on the first connect.
    /// 首次连接时要恢复的先前会话身份。
    pub client_id: Option<SessionId>,

    /// Upper bound on retries for the client's retry policy. `None` retries forever.
    /// 客户端重试策略的最大重试次数。`None` 表示无限重试。
    pub max_retries: Option<u32>,

    /// Backoff parameters for the retry policy.
    /// 重试策略的退避参数。
    pub retry: RetryConfig,
}

/// Backoff parameters for [`Retry`](crate::retry::Retry).
///
/// [`Retry`](crate::retry::Retry) 的退避参数。
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Delay before the first retry.
    /// 第一次重试前的延迟。
    pub initial_delay: Duration,
    /// Multiplier applied to the delay after each retry.
    /// 每次重试后延迟的乘数。
    pub backoff: u32,
    /// The delay never grows beyond this.
    /// 延迟不会超过该值。
    pub max_delay: Duration,
    /// Up to this fraction of the current delay is added as random jitter.
    /// 最多将当前延迟的该比例作为随机抖动加入。
    pub max_jitter: f64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            hosts: "127.0.0.1:2181".to_string(),
            namespace: None,
            session_timeout: Duration::from_secs(10),
            client_id: None,
            max_retries: None,
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            backoff: 2,
            max_delay: Duration::from_secs(3600),
            max_jitter: 0.8,
        }
    }
}

impl ClientConfig {
    pub fn new(hosts: impl Into<String>) -> Self {
        Self {
            hosts: hosts.into(),
            ..Self::default()
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    pub fn with_client_id(mut self, client_id: SessionId) -> Self {
        self.client_id = Some(client_id);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Checks the configuration and normalizes the namespace.
    ///
    /// 校验配置并规范化命名空间。
    pub fn validate(mut self) -> Result<Self> {
        if self.hosts.trim().is_empty() {
            return Err(Error::Configuration("hosts must not be empty".to_string()));
        }
        if self.session_timeout.is_zero() {
            return Err(Error::Configuration(
                "session timeout must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.retry.max_jitter) || self.retry.backoff == 0 {
            return Err(Error::Configuration(
                "retry backoff must be positive and jitter within [0, 1]".to_string(),
            ));
        }
        self.namespace = match self.namespace.take() {
            Some(namespace) => {
                let trimmed = namespace.trim_end_matches('/');
                if trimmed.is_empty() {
                    None
                } else {
                    validate_path(trimmed)?;
                    Some(trimmed.to_string())
                }
            }
            None => None,
        };
        Ok(self)
    }
}
