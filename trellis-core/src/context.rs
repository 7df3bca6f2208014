//! 应用上下文
//!
//! `ApplicationContext` 持有 Bean 工厂、配置环境和事件发布器，负责上下文级别的生命周期：
//! 初始化、配置刷新、优雅关闭以及最终的 Bean 销毁。

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::bean::{BeanDefinition, BeanIdentifier, BeanInstance, BeanRegistration};
use crate::bean_factory::{BeanFactory, DefaultListableBeanFactory, RequestScope};
use crate::config::{Environment, PropertySource};
use crate::constants;
use crate::error::ContainerResult;
use crate::event::{
    ApplicationEventMulticaster, ApplicationEventPublisher, ApplicationShutdownEvent, Event,
    EventListener, RefreshEvent, SimpleApplicationEventMulticaster,
};
use crate::injection::{BeanArguments, Provider};
use crate::lifecycle::{BeanCreatedEventListener, BeanPreDestroyEventListener};
use crate::qualifier::Qualifier;
use crate::registry::{BeanDefinitionRegistry, BeanDefinitionRegistryBuilder, BeanDefinitionSupplier};
use crate::scope::CustomScope;
use crate::shutdown::{GracefulShutdown, GracefulShutdownCapable, ShutdownReport};

/// Shutdown hook类型
pub type ShutdownHook = Box<dyn Fn() -> ContainerResult<()> + Send + Sync>;

/// 应用上下文
pub struct ApplicationContext {
    bean_factory: Arc<DefaultListableBeanFactory>,
    environment: Arc<Environment>,
    event_publisher: Arc<ApplicationEventPublisher>,

    /// 按注册顺序执行
    shutdown_hooks: RwLock<Vec<ShutdownHook>>,

    app_name: String,
    closed: AtomicBool,
}

impl ApplicationContext {
    pub fn builder() -> ApplicationContextBuilder {
        ApplicationContextBuilder::new()
    }

    pub fn bean_factory(&self) -> &Arc<DefaultListableBeanFactory> {
        &self.bean_factory
    }

    pub fn registry(&self) -> &BeanDefinitionRegistry {
        self.bean_factory.registry()
    }

    pub fn environment(&self) -> &Arc<Environment> {
        &self.environment
    }

    pub fn event_publisher(&self) -> &Arc<ApplicationEventPublisher> {
        &self.event_publisher
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    // ========== 事件 ==========

    pub fn publish_event(&self, event: Arc<dyn Event>) {
        self.event_publisher.publish_event(event);
    }

    pub fn register_listener(&self, listener: Arc<dyn EventListener>) {
        self.event_publisher.add_listener(listener);
    }

    /// 注册 shutdown hook，在 Bean 销毁之前按注册顺序执行
    pub fn register_shutdown_hook<F>(&self, hook: F)
    where
        F: Fn() -> ContainerResult<()> + Send + Sync + 'static,
    {
        let mut hooks = self.shutdown_hooks.write();
        hooks.push(Box::new(hook));
        tracing::debug!("Registered shutdown hook, total: {}", hooks.len());
    }

    // ========== Bean 查找（委托给 BeanFactory） ==========

    pub fn get_bean<T: ?Sized + Send + Sync + 'static>(&self) -> ContainerResult<Arc<T>> {
        self.bean_factory.get_bean::<T>()
    }

    pub fn get_bean_qualified<T: ?Sized + Send + Sync + 'static>(
        &self,
        qualifier: &Qualifier,
    ) -> ContainerResult<Arc<T>> {
        self.bean_factory.get_bean_qualified::<T>(qualifier)
    }

    pub fn find_bean<T: ?Sized + Send + Sync + 'static>(
        &self,
        qualifier: Option<&Qualifier>,
    ) -> ContainerResult<Option<Arc<T>>> {
        self.bean_factory.find_bean::<T>(qualifier)
    }

    pub fn get_beans_of_type<T: ?Sized + Send + Sync + 'static>(&self) -> ContainerResult<Vec<Arc<T>>> {
        self.bean_factory.get_beans_of_type::<T>()
    }

    pub fn get_provider<T: ?Sized + Send + Sync + 'static>(&self, qualifier: Option<Qualifier>) -> Provider<T> {
        self.bean_factory.get_provider::<T>(qualifier)
    }

    /// 使用显式参数创建新实例，不经过作用域缓存
    pub fn create_bean<T: ?Sized + Send + Sync + 'static>(
        &self,
        qualifier: Option<&Qualifier>,
        arguments: BeanArguments,
    ) -> ContainerResult<Arc<T>> {
        self.bean_factory.create_bean::<T>(qualifier, arguments)
    }

    pub fn get_bean_registration<T: ?Sized + Send + Sync + 'static>(
        &self,
        qualifier: Option<&Qualifier>,
    ) -> ContainerResult<Arc<BeanRegistration>> {
        self.bean_factory.get_bean_registration::<T>(qualifier)
    }

    pub fn get_bean_definition<T: ?Sized + 'static>(
        &self,
        qualifier: Option<&Qualifier>,
    ) -> ContainerResult<Arc<BeanDefinition>> {
        self.bean_factory.get_bean_definition::<T>(qualifier)
    }

    pub fn get_bean_definitions<T: ?Sized + 'static>(&self) -> Vec<Arc<BeanDefinition>> {
        self.bean_factory.get_bean_definitions::<T>()
    }

    pub fn contains_bean<T: ?Sized + 'static>(&self) -> bool {
        self.bean_factory.contains_bean::<T>()
    }

    pub fn destroy_bean(&self, identifier: &BeanIdentifier) -> ContainerResult<bool> {
        self.bean_factory.destroy_bean(identifier)
    }

    pub fn create_request_scope(&self) -> RequestScope {
        self.bean_factory.create_request_scope()
    }

    // ========== 生命周期 ==========

    /// 校验依赖并预先创建所有非延迟的单例
    pub fn initialize(&self) -> ContainerResult<()> {
        self.validate_dependencies()?;
        let count = self.bean_factory.preinstantiate_singletons()?;
        tracing::info!("Initialized {} singleton bean(s)", count);
        Ok(())
    }

    /// 检查缺失的依赖和没有被 Provider 打断的循环依赖
    pub fn validate_dependencies(&self) -> ContainerResult<()> {
        self.bean_factory.validate_dependencies()
    }

    /// 配置变化后刷新可刷新作用域的 Bean，并发布 `RefreshEvent`
    ///
    /// `keys` 为空时刷新全部可刷新 Bean
    pub fn refresh(&self, keys: &[String]) -> Vec<BeanIdentifier> {
        let refreshed = self.bean_factory.refresh(keys);
        self.publish_event(Arc::new(RefreshEvent::new(
            keys.to_vec(),
            refreshed.iter().map(ToString::to_string).collect(),
        )));
        refreshed
    }

    /// 优雅关闭后关闭上下文
    ///
    /// 先并发等待所有 `GracefulShutdownCapable` Bean 完成，再执行 [`close`](Self::close)
    pub async fn shutdown(&self) -> ShutdownReport {
        let participants = if self.is_closed() {
            Vec::new()
        } else {
            self.bean_factory
                .get_instantiated_beans_of_type::<dyn GracefulShutdownCapable>()
        };
        let report = GracefulShutdown::shutdown_all(participants).await;
        self.close();
        report
    }

    /// 关闭上下文：发布 `ApplicationShutdownEvent`，执行 shutdown hooks，销毁所有 Bean
    ///
    /// 幂等，重复调用直接返回
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!("Closing application context '{}'", self.app_name);

        self.publish_event(Arc::new(ApplicationShutdownEvent::new(self.app_name.clone())));

        let hooks = self.shutdown_hooks.read();
        tracing::debug!("Executing {} shutdown hook(s)", hooks.len());
        for (idx, hook) in hooks.iter().enumerate() {
            match hook() {
                Ok(_) => tracing::debug!("Shutdown hook {} executed successfully", idx + 1),
                Err(e) => tracing::warn!("Shutdown hook {} failed: {}", idx + 1, e),
            }
        }
        drop(hooks);

        self.bean_factory.close();
        tracing::info!("Application context '{}' closed", self.app_name);
    }
}

impl BeanFactory for ApplicationContext {
    fn get_bean_by_name(&self, name: &str) -> ContainerResult<BeanInstance> {
        self.bean_factory.get_bean_by_name(name)
    }

    fn contains_bean_name(&self, name: &str) -> bool {
        self.bean_factory.contains_bean_name(name)
    }

    fn get_bean_names(&self) -> Vec<String> {
        self.bean_factory.get_bean_names()
    }
}

impl fmt::Debug for ApplicationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationContext")
            .field("app_name", &self.app_name)
            .field("bean_factory", &self.bean_factory)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// 应用上下文构建器
///
/// 插件在 `configure` 阶段通过 `&mut` 引用向其中添加定义、监听器和配置源
pub struct ApplicationContextBuilder {
    registry: BeanDefinitionRegistryBuilder,
    environment: Arc<Environment>,
    scan_inventory: bool,
    custom_scopes: Vec<Arc<dyn CustomScope>>,
    created_listeners: Vec<Arc<dyn BeanCreatedEventListener>>,
    pre_destroy_listeners: Vec<Arc<dyn BeanPreDestroyEventListener>>,
    event_listeners: Vec<Arc<dyn EventListener>>,
    shutdown_hooks: Vec<ShutdownHook>,
    app_name: Option<String>,
}

impl ApplicationContextBuilder {
    pub fn new() -> Self {
        Self {
            registry: BeanDefinitionRegistry::builder(),
            environment: Arc::new(Environment::new()),
            scan_inventory: false,
            custom_scopes: Vec::new(),
            created_listeners: Vec::new(),
            pre_destroy_listeners: Vec::new(),
            event_listeners: Vec::new(),
            shutdown_hooks: Vec::new(),
            app_name: None,
        }
    }

    pub fn environment(&self) -> &Arc<Environment> {
        &self.environment
    }

    /// 使用已有的 Environment 替换默认实例
    pub fn with_environment(&mut self, environment: Arc<Environment>) -> &mut Self {
        self.environment = environment;
        self
    }

    pub fn add_property_source(&mut self, source: Box<dyn PropertySource>) -> &mut Self {
        self.environment.add_property_source(source);
        self
    }

    pub fn active_profiles(&mut self, profiles: Vec<String>) -> &mut Self {
        self.environment.set_active_profiles(profiles);
        self
    }

    pub fn app_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.app_name = Some(name.into());
        self
    }

    pub fn definition(&mut self, definition: BeanDefinition) -> &mut Self {
        self.registry.register(definition);
        self
    }

    pub fn definitions(&mut self, definitions: impl IntoIterator<Item = BeanDefinition>) -> &mut Self {
        for definition in definitions {
            self.registry.register(definition);
        }
        self
    }

    pub fn supplier(&mut self, supplier: &dyn BeanDefinitionSupplier) -> &mut Self {
        self.registry.register_supplier(supplier);
        self
    }

    /// 构建时收集所有通过 `submit_component!` 提交的定义
    pub fn scan_inventory(&mut self) -> &mut Self {
        self.scan_inventory = true;
        self
    }

    pub fn register_scope(&mut self, scope: Arc<dyn CustomScope>) -> &mut Self {
        self.custom_scopes.push(scope);
        self
    }

    pub fn created_listener(&mut self, listener: Arc<dyn BeanCreatedEventListener>) -> &mut Self {
        self.created_listeners.push(listener);
        self
    }

    pub fn pre_destroy_listener(&mut self, listener: Arc<dyn BeanPreDestroyEventListener>) -> &mut Self {
        self.pre_destroy_listeners.push(listener);
        self
    }

    pub fn event_listener(&mut self, listener: Arc<dyn EventListener>) -> &mut Self {
        self.event_listeners.push(listener);
        self
    }

    pub fn shutdown_hook<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn() -> ContainerResult<()> + Send + Sync + 'static,
    {
        self.shutdown_hooks.push(Box::new(hook));
        self
    }

    /// 已添加的定义数量（不含核心 Bean 和 inventory 中的定义）
    pub fn definition_count(&self) -> usize {
        self.registry.len()
    }

    /// 构建上下文
    ///
    /// Environment 和 ApplicationEventPublisher 会作为核心 Bean 自动注册
    pub fn build(self) -> ContainerResult<Arc<ApplicationContext>> {
        let multicaster = Arc::new(SimpleApplicationEventMulticaster::new());
        for listener in self.event_listeners {
            multicaster.add_listener(listener);
        }
        let event_publisher = Arc::new(ApplicationEventPublisher::new(multicaster));

        let mut registry = self.registry;
        if self.scan_inventory {
            registry.scan_inventory();
        }
        registry
            .register(
                BeanDefinition::from_instance(Arc::clone(&self.environment))
                    .name(constants::ENVIRONMENT_BEAN_NAME)
                    .build(),
            )
            .register(
                BeanDefinition::from_instance(Arc::clone(&event_publisher))
                    .name(constants::EVENT_PUBLISHER_BEAN_NAME)
                    .build(),
            );
        let registry = registry.build()?;

        let mut factory = DefaultListableBeanFactory::builder(registry).environment(Arc::clone(&self.environment));
        for scope in self.custom_scopes {
            factory = factory.register_scope(scope);
        }
        for listener in self.created_listeners {
            factory = factory.created_listener(listener);
        }
        for listener in self.pre_destroy_listeners {
            factory = factory.pre_destroy_listener(listener);
        }
        let bean_factory = factory.build();

        let app_name = self
            .app_name
            .or_else(|| self.environment.get_string(constants::APPLICATION_NAME_KEY))
            .unwrap_or_else(|| "Application".to_string());

        tracing::debug!(
            "ApplicationContext '{}' built with {} definition(s)",
            app_name,
            bean_factory.registry().len()
        );

        Ok(Arc::new(ApplicationContext {
            bean_factory,
            environment: self.environment,
            event_publisher,
            shutdown_hooks: RwLock::new(self.shutdown_hooks),
            app_name,
            closed: AtomicBool::new(false),
        }))
    }
}

impl Default for ApplicationContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}
