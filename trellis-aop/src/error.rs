//! 拦截链错误类型

use thiserror::Error;

/// 拦截链错误
///
/// 目标方法和拦截器中的业务错误原样放在 [`InterceptorChainError::Failed`] 中传播，
/// 其余变体表示调用协议被破坏。
#[derive(Debug, Error)]
pub enum InterceptorChainError {
    #[error(transparent)]
    Failed(#[from] anyhow::Error),

    #[error("Interceptor '{interceptor}' called proceed() more than once for {method}")]
    ProceedCalledTwice { interceptor: String, method: String },

    #[error("Target method {method} has already been invoked")]
    TerminalAlreadyInvoked { method: String },

    #[error("Return value of {method} is not of type '{expected}'")]
    ReturnTypeMismatch { method: String, expected: &'static str },

    #[error("{method} produced a deferred value where a ready value was expected")]
    UnexpectedDeferred { method: String },

    #[error("Argument '{name}' of {method} is missing or has an unexpected type")]
    MissingArgument { method: String, name: String },
}

impl InterceptorChainError {
    pub fn failed(error: impl Into<anyhow::Error>) -> Self {
        InterceptorChainError::Failed(error.into())
    }

    /// 是否为业务错误（可被拦截器转换或吞掉）
    pub fn is_failed(&self) -> bool {
        matches!(self, InterceptorChainError::Failed(_))
    }

    /// 取出业务错误
    pub fn into_failure(self) -> Option<anyhow::Error> {
        match self {
            InterceptorChainError::Failed(e) => Some(e),
            _ => None,
        }
    }
}

pub type InvocationResult<T> = Result<T, InterceptorChainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_is_transparent() {
        let error = InterceptorChainError::failed(anyhow::anyhow!("disk full"));
        assert_eq!(error.to_string(), "disk full");
        assert!(error.is_failed());
        assert_eq!(error.into_failure().map(|e| e.to_string()), Some("disk full".to_string()));
    }

    #[test]
    fn test_protocol_errors_are_not_failures() {
        let error = InterceptorChainError::ProceedCalledTwice {
            interceptor: "retry".to_string(),
            method: "Engine::start".to_string(),
        };
        assert!(!error.is_failed());
        assert!(error.to_string().contains("retry"));
        assert!(error.into_failure().is_none());
    }
}
