// trellis-core: 依赖注入运行时
//
// 提供类型安全的依赖注入功能，支持：
// - 单例、原型、请求、可刷新和自定义作用域
// - 条件装配、限定符和 primary / order 选择
// - 构造函数、字段和 Provider 注入
// - 生命周期回调与事件、按依赖关系销毁、优雅关闭

pub mod app;
pub mod bean;
pub mod bean_factory;
pub mod component;
pub mod condition;
pub mod config;
pub mod constants;
pub mod context;
pub mod error;
pub mod event;
pub mod injection;
pub mod lifecycle;
pub mod logging;
pub mod plugin;
pub mod qualifier;
pub mod registry;
pub mod resolution;
pub mod scope;
pub mod shutdown;
pub mod utils;

// 重新导出常用类型
pub use app::{RunningApplication, TrellisApplication};
pub use bean::{
    BeanDefinition, BeanDefinitionBuilder, BeanIdentifier, BeanInstance, BeanRegistration,
    InjectionFailurePolicy, InjectionKind, InjectionPoint, InjectionWrapper, InterceptorBinding,
    TypeKey,
};
pub use bean_factory::{BeanFactory, BeanFactoryBuilder, DefaultListableBeanFactory, RequestScope};
pub use component::{Component, DefinitionRegistration};
pub use condition::{Condition, ConditionContext, ConditionPredicate, PropertyExpectation};
pub use config::{
    ConfigValue, Environment, EnvironmentPropertySource, MapPropertySource, OsFamily,
    PropertySource, TomlPropertySource,
};
pub use context::{ApplicationContext, ApplicationContextBuilder, ShutdownHook};
pub use error::{ApplicationError, ApplicationResult, ContainerError, ContainerResult};
pub use event::{
    ApplicationEventMulticaster, ApplicationEventPublisher, ApplicationShutdownEvent,
    ApplicationStartedEvent, ErrorHandler, Event, EventListener, FnEventListener, RefreshEvent,
    SimpleApplicationEventMulticaster, TypedEventListener, TypedEventListenerAdapter,
};
pub use injection::{BeanArguments, InjectionContext, Provider};
pub use lifecycle::{
    BeanCreatedEvent, BeanCreatedEventListener, BeanPreDestroyEvent, BeanPreDestroyEventListener,
    OnBeanCreated,
};
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use plugin::{load_plugins, ApplicationPlugin, PluginRegistry, PluginSubmission};
pub use qualifier::Qualifier;
pub use registry::{BeanDefinitionRegistry, BeanDefinitionRegistryBuilder, BeanDefinitionSupplier};
pub use scope::{CustomScope, Scope, ScopeStore};
pub use shutdown::{GracefulShutdown, GracefulShutdownCapable, ShutdownOutcome, ShutdownReport};

// 导出 async_trait、futures 和 inventory，供宏和插件使用
pub use async_trait;
pub use futures;
pub use inventory;

/// Prelude 模块，包含常用的 traits 和类型
pub mod prelude {
    pub use crate::app::{RunningApplication, TrellisApplication};
    pub use crate::bean::{BeanDefinition, BeanIdentifier, InjectionPoint, InterceptorBinding, TypeKey};
    pub use crate::bean_factory::{BeanFactory, RequestScope};
    pub use crate::component::Component;
    pub use crate::condition::Condition;
    pub use crate::config::{ConfigValue, Environment, MapPropertySource, PropertySource};
    pub use crate::context::{ApplicationContext, ApplicationContextBuilder};
    pub use crate::error::{ApplicationError, ApplicationResult, ContainerError, ContainerResult};
    pub use crate::event::{Event, EventListener, FnEventListener, TypedEventListener};
    pub use crate::injection::{BeanArguments, InjectionContext, Provider};
    pub use crate::lifecycle::{BeanCreatedEventListener, BeanPreDestroyEventListener, OnBeanCreated};
    pub use crate::logging::LoggingConfig;
    pub use crate::plugin::ApplicationPlugin;
    pub use crate::qualifier::Qualifier;
    pub use crate::scope::Scope;
    pub use crate::shutdown::GracefulShutdownCapable;
    pub use crate::{submit_component, submit_plugin};
    pub use anyhow::{anyhow, Context};
}
