//! 错误类型定义
//!
//! 容器相关错误使用 [`ContainerError`]，应用启动相关错误使用 [`ApplicationError`]。
//! 用户代码（工厂函数、生命周期回调）中的任意错误可以通过 `?` 转换为 `ContainerError::Other`。

use thiserror::Error;

/// 容器错误
#[derive(Debug, Error)]
pub enum ContainerError {
    /// 非空查找没有匹配到任何有效的候选 Bean
    #[error("No bean of type '{bean_type}' found{}", describe_qualifier(.qualifier))]
    NoSuchBean {
        bean_type: String,
        qualifier: Option<String>,
    },

    /// 单个 Bean 查找匹配到多个候选，且无法通过 primary / order 区分
    #[error("Expected a single bean of type '{bean_type}' but found {}: [{}]", .candidates.len(), .candidates.join(", "))]
    NonUniqueBean {
        bean_type: String,
        candidates: Vec<String>,
    },

    /// 循环依赖
    #[error("Circular dependency detected: {}", .chain.join(" -> "))]
    CircularDependency { chain: Vec<String> },

    /// Bean 实例化失败（构造、字段注入或 post-construct 回调出错）
    #[error("Failed to instantiate bean '{bean}': {source}")]
    BeanInstantiation {
        bean: String,
        #[source]
        source: Box<ContainerError>,
    },

    /// pre-destroy 回调失败，仅记录日志，不会中断关闭流程
    #[error("Failed to destroy bean '{bean}': {message}")]
    BeanDestruction { bean: String, message: String },

    #[error("Bean definition '{0}' is already registered")]
    BeanDefinitionAlreadyExists(String),

    #[error("Type mismatch: expected '{expected}', found '{found}'")]
    TypeMismatch { expected: String, found: String },

    /// 作用域当前不可用（例如在请求之外访问 request 作用域的 Bean）
    #[error("Scope '{scope}' is not active for bean '{bean}'")]
    ScopeNotActive { scope: String, bean: String },

    #[error("Unknown scope '{scope}' declared by bean '{bean}'")]
    UnknownScope { scope: String, bean: String },

    #[error("Dependency validation failed: {0}")]
    DependencyValidationFailed(String),

    #[error("Application context is closed")]
    ContextClosed,

    #[error("Required property '{0}' is not set")]
    MissingProperty(String),

    #[error("Failed to convert property '{key}': {message}")]
    PropertyConversion { key: String, message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn describe_qualifier(qualifier: &Option<String>) -> String {
    match qualifier {
        Some(q) => format!(" for qualifier {}", q),
        None => String::new(),
    }
}

impl ContainerError {
    /// 是否为循环依赖错误
    pub fn is_circular(&self) -> bool {
        matches!(self.root_cause(), ContainerError::CircularDependency { .. })
    }

    /// 沿着 BeanInstantiation 链找到最内层的错误
    pub fn root_cause(&self) -> &ContainerError {
        let mut current = self;
        while let ContainerError::BeanInstantiation { source, .. } = current {
            current = source;
        }
        current
    }

    /// 将依赖解析错误包装为当前 Bean 的实例化错误
    ///
    /// 循环依赖错误保持原样向上传播，调用方可以直接看到完整的依赖链
    pub(crate) fn instantiating(bean: &str, error: ContainerError) -> ContainerError {
        match error {
            e @ ContainerError::CircularDependency { .. } => e,
            e @ ContainerError::ContextClosed => e,
            other => ContainerError::BeanInstantiation {
                bean: bean.to_string(),
                source: Box::new(other),
            },
        }
    }
}

pub type ContainerResult<T> = Result<T, ContainerError>;

/// 应用启动错误
#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error("Failed to initialize logging: {0}")]
    LoggingInitFailed(String),

    #[error("Failed to load configuration '{path}': {message}")]
    ConfigLoadFailed { path: String, message: String },

    #[error("Plugin '{plugin}' failed: {message}")]
    Plugin { plugin: String, message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type ApplicationResult<T> = Result<T, ApplicationError>;
