//! 结构化错误信息，传递给 after-throwing 通知

use std::error::Error;

use crate::error::InterceptorChainError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    /// 错误消息
    pub message: String,

    /// 错误类型名称
    pub error_type: String,

    /// 错误源链，从直接原因到根因
    pub source_chain: Vec<String>,
}

impl ErrorInfo {
    pub fn from_error<E: Error>(error: &E) -> Self {
        let mut source_chain = Vec::new();
        let mut current = error.source();
        while let Some(source) = current {
            source_chain.push(source.to_string());
            current = source.source();
        }

        Self {
            message: error.to_string(),
            error_type: std::any::type_name::<E>().to_string(),
            source_chain,
        }
    }

    /// `anyhow::Error` 的源链取自 `chain()`，不包含错误本身
    pub fn from_anyhow(error: &anyhow::Error) -> Self {
        Self {
            message: error.to_string(),
            error_type: "anyhow::Error".to_string(),
            source_chain: error.chain().skip(1).map(|e| e.to_string()).collect(),
        }
    }

    pub fn from_chain_error(error: &InterceptorChainError) -> Self {
        match error {
            InterceptorChainError::Failed(inner) => Self::from_anyhow(inner),
            other => Self::from_error(other),
        }
    }

    pub fn simple(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error_type: "Unknown".to_string(),
            source_chain: Vec::new(),
        }
    }

    /// 根因消息，没有源链时为错误本身的消息
    pub fn root_cause(&self) -> &str {
        self.source_chain.last().unwrap_or(&self.message)
    }

    /// 完整的错误描述（包含源链）
    pub fn full_description(&self) -> String {
        if self.source_chain.is_empty() {
            self.message.clone()
        } else {
            format!("{}\nCaused by:\n  {}", self.message, self.source_chain.join("\n  "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_anyhow_source_chain() {
        let error = Err::<(), _>(anyhow::anyhow!("connection refused"))
            .context("failed to open pool")
            .context("startup failed")
            .unwrap_err();

        let info = ErrorInfo::from_anyhow(&error);
        assert_eq!(info.message, "startup failed");
        assert_eq!(info.source_chain, vec!["failed to open pool", "connection refused"]);
        assert_eq!(info.root_cause(), "connection refused");
        assert_eq!(
            info.full_description(),
            "startup failed\nCaused by:\n  failed to open pool\n  connection refused"
        );
    }

    #[test]
    fn test_protocol_error_keeps_type_name() {
        let error = InterceptorChainError::UnexpectedDeferred {
            method: "Engine::start".to_string(),
        };
        let info = ErrorInfo::from_chain_error(&error);
        assert!(info.error_type.ends_with("InterceptorChainError"));
        assert!(info.source_chain.is_empty());
        assert_eq!(info.root_cause(), info.message);
    }

    #[test]
    fn test_simple() {
        let info = ErrorInfo::simple("boom");
        assert_eq!(info.full_description(), "boom");
        assert_eq!(info.error_type, "Unknown");
    }
}
