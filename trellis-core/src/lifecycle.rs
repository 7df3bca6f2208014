//! Bean 生命周期事件
//!
//! 创建事件在 post-construct 之后、实例放入作用域之前同步触发，监听器可以替换实例；
//! 销毁前事件在 pre-destroy 回调之前同步触发。

use std::marker::PhantomData;
use std::sync::Arc;

use crate::bean::{BeanDefinition, BeanIdentifier, BeanInstance, TypeKey};
use crate::error::ContainerResult;
use crate::qualifier::Qualifier;

/// Bean 已创建事件
pub struct BeanCreatedEvent {
    identifier: BeanIdentifier,
    definition: Arc<BeanDefinition>,
    instance: BeanInstance,
}

impl BeanCreatedEvent {
    pub(crate) fn new(identifier: BeanIdentifier, definition: Arc<BeanDefinition>, instance: BeanInstance) -> Self {
        Self {
            identifier,
            definition,
            instance,
        }
    }

    pub fn identifier(&self) -> &BeanIdentifier {
        &self.identifier
    }

    pub fn definition(&self) -> &BeanDefinition {
        &self.definition
    }

    pub fn instance(&self) -> &BeanInstance {
        &self.instance
    }

    /// 以暴露的类型访问实例
    pub fn bean<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.definition.cast::<T>(&self.instance)
    }
}

/// Bean 销毁前事件
pub struct BeanPreDestroyEvent {
    identifier: BeanIdentifier,
    definition: Arc<BeanDefinition>,
    instance: BeanInstance,
}

impl BeanPreDestroyEvent {
    pub(crate) fn new(identifier: BeanIdentifier, definition: Arc<BeanDefinition>, instance: BeanInstance) -> Self {
        Self {
            identifier,
            definition,
            instance,
        }
    }

    pub fn identifier(&self) -> &BeanIdentifier {
        &self.identifier
    }

    pub fn definition(&self) -> &BeanDefinition {
        &self.definition
    }

    pub fn instance(&self) -> &BeanInstance {
        &self.instance
    }

    pub fn bean<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.definition.cast::<T>(&self.instance)
    }
}

/// Bean 创建监听器
pub trait BeanCreatedEventListener: Send + Sync {
    /// 只监听暴露该类型的 Bean，`None` 表示全部
    fn bean_type(&self) -> Option<TypeKey> {
        None
    }

    fn qualifier(&self) -> Option<Qualifier> {
        None
    }

    /// 越小越先执行
    fn order(&self) -> i32 {
        0
    }

    /// 返回 `Some` 时替换实例，替换实例必须与原实例类型相同
    fn on_created(&self, event: &BeanCreatedEvent) -> ContainerResult<Option<BeanInstance>>;
}

/// Bean 销毁前监听器
pub trait BeanPreDestroyEventListener: Send + Sync {
    fn bean_type(&self) -> Option<TypeKey> {
        None
    }

    fn order(&self) -> i32 {
        0
    }

    fn on_pre_destroy(&self, event: &BeanPreDestroyEvent) -> ContainerResult<()>;
}

/// 检查监听器的类型和限定符是否适用于该定义
pub(crate) fn listener_applies(
    bean_type: Option<TypeKey>,
    qualifier: Option<&Qualifier>,
    definition: &BeanDefinition,
) -> bool {
    let requested = bean_type.unwrap_or_else(|| definition.bean_type());
    if bean_type.is_some() && !definition.exposes(requested) {
        return false;
    }
    qualifier.map_or(true, |q| q.matches(definition, requested))
}

/// 基于闭包的类型化创建监听器
///
/// ```ignore
/// let listener = OnBeanCreated::<dyn Engine, _>::new(|engine, _event| {
///     tracing::info!("Engine ready: {}", engine.describe());
///     Ok(())
/// });
/// ```
pub struct OnBeanCreated<T: ?Sized, F> {
    callback: F,
    order: i32,
    _marker: PhantomData<fn(&T)>,
}

impl<T, F> OnBeanCreated<T, F>
where
    T: ?Sized + Send + Sync + 'static,
    F: Fn(Arc<T>, &BeanCreatedEvent) -> ContainerResult<()> + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self {
            callback,
            order: 0,
            _marker: PhantomData,
        }
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }
}

impl<T, F> BeanCreatedEventListener for OnBeanCreated<T, F>
where
    T: ?Sized + Send + Sync + 'static,
    F: Fn(Arc<T>, &BeanCreatedEvent) -> ContainerResult<()> + Send + Sync,
{
    fn bean_type(&self) -> Option<TypeKey> {
        Some(TypeKey::of::<T>())
    }

    fn order(&self) -> i32 {
        self.order
    }

    fn on_created(&self, event: &BeanCreatedEvent) -> ContainerResult<Option<BeanInstance>> {
        if let Some(bean) = event.bean::<T>() {
            (self.callback)(bean, event)?;
        }
        Ok(None)
    }
}
