//! Request/response wrappers over [`FeedService`].
//!
//! This is the layer that rejects empty keywords and turns "no content" into
//! a coded error. Every call yields either a payload or a [`ToolError`]; use
//! [`respond`] to flatten either into the JSON shape external callers expect.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::service::{
    CleanupReport, FeedService, HistoryEntry, IdToName, Statistics, Subscription, TrendInput,
};
use crate::storage::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    KeywordRequired,
    RssNotFound,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::KeywordRequired => "KEYWORD_REQUIRED",
            ErrorCode::RssNotFound => "RSS_NOT_FOUND",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A failure with a stable code and a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct ToolError {
    pub code: ErrorCode,
    pub message: String,
}

impl ToolError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn keyword_required() -> Self {
        Self::new(ErrorCode::KeywordRequired, "关键词不能为空")
    }
}

impl From<StoreError> for ToolError {
    fn from(err: StoreError) -> Self {
        tracing::error!(error = %err, "Feed store operation failed");
        Self::new(ErrorCode::InternalError, err.to_string())
    }
}

pub type ToolResult<T> = Result<T, ToolError>;

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionList {
    pub subscriptions: Vec<Subscription>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeywordContent {
    pub keyword: String,
    pub rss_content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeywordHistory {
    pub keyword: String,
    pub history: Vec<HistoryEntry>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerateReport {
    pub saved_files: BTreeMap<String, String>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Validation {
    pub valid: bool,
}

pub struct RssTools {
    service: FeedService,
}

impl RssTools {
    pub fn new(service: FeedService) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &FeedService {
        &self.service
    }

    pub fn subscriptions(&self) -> ToolResult<SubscriptionList> {
        let subscriptions = self.service.list_subscriptions();
        Ok(SubscriptionList {
            total: subscriptions.len(),
            subscriptions,
        })
    }

    pub fn content(&self, keyword: &str) -> ToolResult<KeywordContent> {
        if keyword.is_empty() {
            return Err(ToolError::keyword_required());
        }
        let rss_content = self.service.content_for(keyword).ok_or_else(|| {
            ToolError::new(
                ErrorCode::RssNotFound,
                format!("未找到关键词 {} 的RSS内容", keyword),
            )
        })?;
        Ok(KeywordContent {
            keyword: keyword.to_string(),
            rss_content,
        })
    }

    pub fn statistics(&self) -> ToolResult<Statistics> {
        Ok(self.service.statistics())
    }

    pub fn history(&self, keyword: &str) -> ToolResult<KeywordHistory> {
        if keyword.is_empty() {
            return Err(ToolError::keyword_required());
        }
        let history = self.service.history_for(keyword);
        Ok(KeywordHistory {
            keyword: keyword.to_string(),
            total: history.len(),
            history,
        })
    }

    pub fn generate(&self, input: &TrendInput, id_to_name: &IdToName) -> ToolResult<GenerateReport> {
        let saved_files = self.service.generate_and_persist(input, id_to_name)?;
        Ok(GenerateReport {
            total: saved_files.len(),
            saved_files,
        })
    }

    pub fn cleanup(&self, days: u64) -> ToolResult<CleanupReport> {
        Ok(self.service.cleanup(days)?)
    }

    pub fn validate(&self, xml: &str) -> ToolResult<Validation> {
        Ok(Validation {
            valid: self.service.is_valid(xml),
        })
    }
}

/// `{"success": true, ...payload}` or
/// `{"success": false, "error": {"code": ..., "message": ...}}`.
pub fn respond<T: Serialize>(result: ToolResult<T>) -> Value {
    let payload = result.and_then(|payload| {
        serde_json::to_value(payload)
            .map_err(|e| ToolError::new(ErrorCode::InternalError, e.to_string()))
    });

    match payload {
        Ok(Value::Object(mut map)) => {
            map.insert("success".to_string(), Value::Bool(true));
            Value::Object(map)
        }
        Ok(other) => json!({ "success": true, "data": other }),
        Err(err) => json!({
            "success": false,
            "error": { "code": err.code, "message": err.message },
        }),
    }
}
