//! 框架内置名称常量
//!
//! 上下文自动注册的核心 Bean 以及启动流程使用的默认值，保证构建器、插件和用户代码使用相同的标识符

/// Environment Bean 的名称
pub const ENVIRONMENT_BEAN_NAME: &str = "environment";

/// ApplicationEventPublisher Bean 的名称
pub const EVENT_PUBLISHER_BEAN_NAME: &str = "eventPublisher";

/// 所有由上下文自动注册的核心 Bean 名称
pub const CORE_BEAN_NAMES: &[&str] = &[ENVIRONMENT_BEAN_NAME, EVENT_PUBLISHER_BEAN_NAME];

/// 默认配置文件
pub const DEFAULT_CONFIG_FILE: &str = "application.toml";

/// 默认环境变量前缀
pub const DEFAULT_ENV_PREFIX: &str = "APP_";

/// 激活 profile 的环境变量后缀，与前缀拼接为 `APP_PROFILES_ACTIVE`
pub const PROFILES_ACTIVE_SUFFIX: &str = "PROFILES_ACTIVE";

/// 应用名称配置键
pub const APPLICATION_NAME_KEY: &str = "app.name";

/// profile 配置文件的基础优先级，第 n 个 profile 为 `base + n`
pub const PROFILE_CONFIG_PRIORITY: i32 = 10;

/// 检查名称是否属于核心 Bean
pub fn is_core_bean_name(name: &str) -> bool {
    CORE_BEAN_NAMES.contains(&name)
}
