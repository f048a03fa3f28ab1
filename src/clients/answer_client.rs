//! 问答后端客户端
//!
//! 封装单次外呼：一个会话、一个问题、一个答案（或一个已分类的失败）。
//! 超时和 HTTP 状态码到错误类别的映射都在这里完成。
use crate::config::Config;
use crate::error::TransportError;
use crate::models::SessionId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// 失败类别（封闭集合）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Timeout,
    /// 会话没有对应的文档
    NotFound,
    RateLimited,
    ServerError,
    /// 响应缺少预期字段
    Malformed,
    Unknown,
}

impl ErrorKind {
    /// 面向用户的默认提示
    pub fn default_message(self) -> &'static str {
        match self {
            ErrorKind::Timeout => "The answer took too long to arrive. Please try asking again.",
            ErrorKind::NotFound => "No document was found for this session. Please upload it again.",
            ErrorKind::RateLimited => "Too many questions at once. Please wait a moment and try again.",
            ErrorKind::ServerError => "The answering service ran into a problem.",
            ErrorKind::Malformed => "The answering service sent an unexpected response.",
            ErrorKind::Unknown => "Something went wrong while fetching the answer.",
        }
    }
}

/// 一次提问的结果，永远不会以错误形式抛出
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerResult {
    Answer { text: String },
    Failure { kind: ErrorKind, message: String },
}

impl AnswerResult {
    pub fn failure(kind: ErrorKind) -> Self {
        AnswerResult::Failure {
            kind,
            message: kind.default_message().to_string(),
        }
    }
}

/// 底层传输能力
///
/// 按后端的批量接口建模；`AnswerClient` 每次只发送一个问题。
#[async_trait]
pub trait AnswerTransport: Send + Sync {
    async fn send(
        &self,
        session_id: &SessionId,
        questions: &[String],
    ) -> Result<Vec<String>, TransportError>;
}

/// 问答客户端
#[derive(Clone)]
pub struct AnswerClient {
    transport: Arc<dyn AnswerTransport>,
    timeout: Duration,
}

impl AnswerClient {
    pub fn new(transport: Arc<dyn AnswerTransport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    /// 提交一个问题
    ///
    /// # 返回
    /// 成功时返回答案文本；超时、HTTP 错误、格式错误都会被分类为 `Failure`
    pub async fn ask(&self, session_id: &SessionId, question: &str) -> AnswerResult {
        let questions = vec![question.to_string()];
        let outcome =
            tokio::time::timeout(self.timeout, self.transport.send(session_id, &questions)).await;

        match outcome {
            Err(_) => {
                warn!("请求超时 ({:?})", self.timeout);
                AnswerResult::failure(ErrorKind::Timeout)
            }
            Ok(Ok(answers)) => match answers.into_iter().next() {
                Some(text) => {
                    debug!("收到答案，长度 {} 字符", text.chars().count());
                    AnswerResult::Answer { text }
                }
                None => {
                    warn!("后端返回的 answers 为空");
                    AnswerResult::failure(ErrorKind::Malformed)
                }
            },
            Ok(Err(err)) => {
                warn!("提问失败: {}", err);
                let (kind, message) = classify(&err);
                AnswerResult::Failure { kind, message }
            }
        }
    }
}

/// 把传输错误映射为错误类别和面向用户的提示
///
/// 后端提供了 message / detail 时优先使用；否则回退到带状态码的默认提示。
pub fn classify(err: &TransportError) -> (ErrorKind, String) {
    match err {
        TransportError::Status { status, message } => {
            let kind = kind_for_status(*status);
            let message = match message {
                Some(msg) => msg.clone(),
                None => format!("{} (status {})", kind.default_message(), status),
            };
            (kind, message)
        }
        TransportError::Timeout => (ErrorKind::Timeout, ErrorKind::Timeout.default_message().to_string()),
        TransportError::Malformed(_) => (
            ErrorKind::Malformed,
            ErrorKind::Malformed.default_message().to_string(),
        ),
        TransportError::Network(_) => (
            ErrorKind::Unknown,
            ErrorKind::Unknown.default_message().to_string(),
        ),
    }
}

pub fn kind_for_status(status: u16) -> ErrorKind {
    match status {
        404 => ErrorKind::NotFound,
        408 => ErrorKind::Timeout,
        429 => ErrorKind::RateLimited,
        500..=599 => ErrorKind::ServerError,
        _ => ErrorKind::Unknown,
    }
}

/// 从错误响应体中提取 `message` 或 `detail`
pub fn extract_server_message(body: &str) -> Option<String> {
    let json: Value = serde_json::from_str(body).ok()?;
    ["message", "detail"]
        .iter()
        .filter_map(|field| json.get(field).and_then(|v| v.as_str()))
        .map(str::trim)
        .find(|msg| !msg.is_empty())
        .map(str::to_string)
}

#[derive(Serialize)]
struct RunRequest<'a> {
    session_id: &'a str,
    questions: &'a [String],
}

#[derive(Deserialize)]
struct RunResponse {
    answers: Vec<String>,
}

/// 基于 reqwest 的 HTTP 传输
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpTransport {
    pub fn new(config: &Config) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url: config.backend_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// 探测后端是否可达
    pub async fn health_check(&self) -> Result<Value, TransportError> {
        let resp = self.http.get(self.endpoint("api/v1/hackrx/test")).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                message: extract_server_message(&body),
            });
        }
        serde_json::from_str(&body).map_err(|e| TransportError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl AnswerTransport for HttpTransport {
    async fn send(
        &self,
        session_id: &SessionId,
        questions: &[String],
    ) -> Result<Vec<String>, TransportError> {
        let payload = RunRequest {
            session_id: session_id.as_str(),
            questions,
        };

        let mut request = self
            .http
            .post(self.endpoint("api/v1/hackrx/run"))
            .json(&payload);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let resp = request.send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                message: extract_server_message(&body),
            });
        }

        let parsed: RunResponse =
            serde_json::from_str(&body).map_err(|e| TransportError::Malformed(e.to_string()))?;
        Ok(parsed.answers)
    }
}
