use std::any::{Any, TypeId};
use std::marker::PhantomData;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::RwLock;

/// 事件 trait - 所有应用事件都必须实现此 trait
pub trait Event: Any + Send + Sync {
    /// 获取事件名称
    fn event_name(&self) -> &str;

    /// 获取事件时间戳
    fn timestamp(&self) -> SystemTime;

    /// 获取事件源（可选）
    fn source(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        None
    }

    /// 转换为 Any 引用，用于类型转换
    fn as_any(&self) -> &dyn Any;
}

/// 应用启动完成事件
///
/// 在上下文初始化完成、所有非延迟单例创建后触发
#[derive(Debug, Clone)]
pub struct ApplicationStartedEvent {
    pub app_name: String,
    /// 启动耗时（毫秒）
    pub startup_time_ms: u128,
    pub timestamp: SystemTime,
}

impl ApplicationStartedEvent {
    pub fn new(app_name: impl Into<String>, startup_time_ms: u128) -> Self {
        Self {
            app_name: app_name.into(),
            startup_time_ms,
            timestamp: SystemTime::now(),
        }
    }
}

impl Event for ApplicationStartedEvent {
    fn event_name(&self) -> &str {
        "ApplicationStartedEvent"
    }

    fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// 应用关闭事件
///
/// 在销毁 Bean 之前触发
#[derive(Debug, Clone)]
pub struct ApplicationShutdownEvent {
    pub app_name: String,
    pub timestamp: SystemTime,
}

impl ApplicationShutdownEvent {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            timestamp: SystemTime::now(),
        }
    }
}

impl Event for ApplicationShutdownEvent {
    fn event_name(&self) -> &str {
        "ApplicationShutdownEvent"
    }

    fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// 配置刷新事件
///
/// `keys` 为发生变化的配置键（为空表示全部），`refreshed` 为被销毁、等待重建的 Bean
#[derive(Debug, Clone)]
pub struct RefreshEvent {
    pub keys: Vec<String>,
    pub refreshed: Vec<String>,
    pub timestamp: SystemTime,
}

impl RefreshEvent {
    pub fn new(keys: Vec<String>, refreshed: Vec<String>) -> Self {
        Self {
            keys,
            refreshed,
            timestamp: SystemTime::now(),
        }
    }
}

impl Event for RefreshEvent {
    fn event_name(&self) -> &str {
        "RefreshEvent"
    }

    fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// 事件监听器 trait
pub trait EventListener: Send + Sync {
    /// 处理事件
    fn on_event(&self, event: Arc<dyn Event>);

    /// 获取监听器名称（用于日志）
    fn listener_name(&self) -> &str {
        "AnonymousListener"
    }

    /// 越小越先执行
    fn order(&self) -> i32 {
        0
    }

    /// 是否支持该事件（默认支持所有事件）
    fn supports_event(&self, event: &dyn Event) -> bool {
        let _ = event;
        true
    }
}

/// 类型化事件监听器 trait
pub trait TypedEventListener<E: Event>: Send + Sync {
    fn on_event(&self, event: &E);

    fn listener_name(&self) -> &str {
        "AnonymousTypedListener"
    }

    fn order(&self) -> i32 {
        0
    }
}

/// 将 `TypedEventListener<E>` 适配为 `EventListener`，只接收 `E` 类型的事件
pub struct TypedEventListenerAdapter<E: Event, L: TypedEventListener<E>> {
    listener: Arc<L>,
    _phantom: PhantomData<fn(&E)>,
}

impl<E: Event, L: TypedEventListener<E>> TypedEventListenerAdapter<E, L> {
    pub fn new(listener: Arc<L>) -> Self {
        Self {
            listener,
            _phantom: PhantomData,
        }
    }
}

impl<E: Event, L: TypedEventListener<E> + 'static> EventListener for TypedEventListenerAdapter<E, L> {
    fn on_event(&self, event: Arc<dyn Event>) {
        if let Some(typed_event) = event.as_any().downcast_ref::<E>() {
            self.listener.on_event(typed_event);
        }
    }

    fn listener_name(&self) -> &str {
        self.listener.listener_name()
    }

    fn order(&self) -> i32 {
        self.listener.order()
    }

    fn supports_event(&self, event: &dyn Event) -> bool {
        event.as_any().type_id() == TypeId::of::<E>()
    }
}

/// 基于闭包的类型化监听器
pub struct FnEventListener<E, F> {
    name: String,
    callback: F,
    order: i32,
    _phantom: PhantomData<fn(&E)>,
}

impl<E: Event, F: Fn(&E) + Send + Sync> FnEventListener<E, F> {
    pub fn new(name: impl Into<String>, callback: F) -> Self {
        Self {
            name: name.into(),
            callback,
            order: 0,
            _phantom: PhantomData,
        }
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }
}

impl<E: Event, F: Fn(&E) + Send + Sync> TypedEventListener<E> for FnEventListener<E, F> {
    fn on_event(&self, event: &E) {
        (self.callback)(event)
    }

    fn listener_name(&self) -> &str {
        &self.name
    }

    fn order(&self) -> i32 {
        self.order
    }
}

/// 错误处理器类型
///
/// 用于处理监听器执行过程中的 panic
pub type ErrorHandler = Arc<dyn Fn(&dyn EventListener, Arc<dyn Event>, &anyhow::Error) + Send + Sync>;

/// 事件多播器 trait
///
/// 负责将事件同步传播到所有注册的监听器
pub trait ApplicationEventMulticaster: Send + Sync {
    fn add_listener(&self, listener: Arc<dyn EventListener>);

    fn remove_listener(&self, listener_name: &str);

    fn remove_all_listeners(&self);

    /// 广播事件，监听器按 order 顺序执行；单个监听器 panic 不影响其他监听器
    fn multicast_event(&self, event: Arc<dyn Event>);

    fn listener_count(&self) -> usize;
}

/// 简单事件多播器实现
pub struct SimpleApplicationEventMulticaster {
    /// 按 order 排序的监听器列表，相同 order 保持注册顺序
    listeners: RwLock<Vec<Arc<dyn EventListener>>>,
    error_handler: RwLock<Option<ErrorHandler>>,
}

impl SimpleApplicationEventMulticaster {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            error_handler: RwLock::new(None),
        }
    }

    /// 设置错误处理器
    pub fn set_error_handler<F>(&self, handler: F)
    where
        F: Fn(&dyn EventListener, Arc<dyn Event>, &anyhow::Error) + Send + Sync + 'static,
    {
        *self.error_handler.write() = Some(Arc::new(handler));
    }

    pub fn remove_error_handler(&self) {
        *self.error_handler.write() = None;
    }

    fn invoke_listener(
        &self,
        listener: &Arc<dyn EventListener>,
        event: Arc<dyn Event>,
        error_handler: Option<&ErrorHandler>,
    ) {
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| listener.on_event(Arc::clone(&event)))) {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            let err = anyhow::anyhow!("Listener panicked: {}", message);
            match error_handler {
                Some(handler) => handler(listener.as_ref(), event, &err),
                None => tracing::error!(
                    "Listener '{}' panicked while handling event '{}': {}",
                    listener.listener_name(),
                    event.event_name(),
                    err
                ),
            }
        }
    }
}

impl Default for SimpleApplicationEventMulticaster {
    fn default() -> Self {
        Self::new()
    }
}

impl ApplicationEventMulticaster for SimpleApplicationEventMulticaster {
    fn add_listener(&self, listener: Arc<dyn EventListener>) {
        let mut listeners = self.listeners.write();
        let name = listener.listener_name().to_string();
        let order = listener.order();
        let position = listeners.iter().position(|l| l.order() > order).unwrap_or(listeners.len());
        listeners.insert(position, listener);
        tracing::debug!("Added event listener: {} (order: {})", name, order);
    }

    fn remove_listener(&self, listener_name: &str) {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| l.listener_name() != listener_name);
        if listeners.len() != before {
            tracing::debug!("Removed event listener: {}", listener_name);
        }
    }

    fn remove_all_listeners(&self) {
        self.listeners.write().clear();
        tracing::debug!("Removed all event listeners");
    }

    fn multicast_event(&self, event: Arc<dyn Event>) {
        // 复制监听器列表，避免回调期间持锁
        let listeners: Vec<Arc<dyn EventListener>> = self
            .listeners
            .read()
            .iter()
            .filter(|l| l.supports_event(event.as_ref()))
            .map(Arc::clone)
            .collect();

        tracing::debug!(
            "Multicasting event: {} to {} listener(s)",
            event.event_name(),
            listeners.len()
        );

        let error_handler = self.error_handler.read().clone();
        for listener in &listeners {
            self.invoke_listener(listener, Arc::clone(&event), error_handler.as_ref());
        }
    }

    fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}

/// 事件发布器
///
/// 由上下文创建并注册为 Bean，业务 Bean 通过依赖注入获取
pub struct ApplicationEventPublisher {
    multicaster: Arc<dyn ApplicationEventMulticaster>,
}

impl ApplicationEventPublisher {
    pub(crate) fn new(multicaster: Arc<dyn ApplicationEventMulticaster>) -> Self {
        Self { multicaster }
    }

    pub fn publish_event(&self, event: Arc<dyn Event>) {
        self.multicaster.multicast_event(event);
    }

    pub fn multicaster(&self) -> &Arc<dyn ApplicationEventMulticaster> {
        &self.multicaster
    }

    pub fn add_listener(&self, listener: Arc<dyn EventListener>) {
        self.multicaster.add_listener(listener);
    }

    /// 添加类型化监听器
    pub fn add_typed_listener<E, L>(&self, listener: Arc<L>)
    where
        E: Event,
        L: TypedEventListener<E> + 'static,
    {
        self.multicaster
            .add_listener(Arc::new(TypedEventListenerAdapter::<E, L>::new(listener)));
    }

    pub fn remove_listener(&self, listener_name: &str) {
        self.multicaster.remove_listener(listener_name);
    }

    pub fn listener_count(&self) -> usize {
        self.multicaster.listener_count()
    }
}
