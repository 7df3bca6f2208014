//! 注入上下文与延迟解析的 Provider
//!
//! 工厂函数通过 [`InjectionContext`] 解析依赖。上下文会记录创建期间解析到的依赖，
//! 用于计算销毁顺序。

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use serde::de::DeserializeOwned;

use crate::bean::{BeanDefinition, BeanIdentifier, BeanRegistration, TypeKey};
use crate::bean_factory::DefaultListableBeanFactory;
use crate::config::Environment;
use crate::error::{ContainerError, ContainerResult};
use crate::qualifier::Qualifier;
use crate::scope::{Scope, ScopeStore};

/// 创建 Bean 时显式传入的参数
#[derive(Clone, Default)]
pub struct BeanArguments {
    values: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl BeanArguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<T: Send + Sync + 'static>(mut self, name: impl Into<String>, value: T) -> Self {
        self.values.insert(name.into(), Arc::new(value));
        self
    }

    pub fn get<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        self.values
            .get(name)
            .and_then(|value| Arc::clone(value).downcast::<T>().ok())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }
}

impl fmt::Debug for BeanArguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.values.keys().collect();
        names.sort();
        f.debug_struct("BeanArguments").field("names", &names).finish()
    }
}

/// 注入上下文
pub struct InjectionContext<'a> {
    factory: &'a DefaultListableBeanFactory,
    definition: &'a Arc<BeanDefinition>,
    identifier: &'a BeanIdentifier,
    request: Option<&'a Arc<ScopeStore>>,
    arguments: Option<&'a BeanArguments>,
    dependencies: RefCell<Vec<BeanIdentifier>>,
}

impl<'a> InjectionContext<'a> {
    pub(crate) fn new(
        factory: &'a DefaultListableBeanFactory,
        definition: &'a Arc<BeanDefinition>,
        identifier: &'a BeanIdentifier,
        request: Option<&'a Arc<ScopeStore>>,
        arguments: Option<&'a BeanArguments>,
    ) -> Self {
        Self {
            factory,
            definition,
            identifier,
            request,
            arguments,
            dependencies: RefCell::new(Vec::new()),
        }
    }

    /// 获取唯一的依赖 Bean
    pub fn get_bean<T: ?Sized + Send + Sync + 'static>(&self) -> ContainerResult<Arc<T>> {
        self.require::<T>(None)
    }

    pub fn get_bean_qualified<T: ?Sized + Send + Sync + 'static>(
        &self,
        qualifier: &Qualifier,
    ) -> ContainerResult<Arc<T>> {
        self.require::<T>(Some(qualifier))
    }

    /// 可选依赖：没有候选时返回 `Ok(None)`
    pub fn find_bean<T: ?Sized + Send + Sync + 'static>(
        &self,
        qualifier: Option<&Qualifier>,
    ) -> ContainerResult<Option<Arc<T>>> {
        match self.factory.resolve_registration::<T>(qualifier, self.request)? {
            Some(registration) => {
                self.record(&registration);
                registration.cast_or_mismatch::<T>().map(Some)
            }
            None => Ok(None),
        }
    }

    /// 集合依赖，按 order 排序
    pub fn get_beans_of_type<T: ?Sized + Send + Sync + 'static>(&self) -> ContainerResult<Vec<Arc<T>>> {
        self.factory
            .resolve_all(TypeKey::of::<T>(), None, self.request)?
            .iter()
            .map(|registration| {
                self.record(registration);
                registration.cast_or_mismatch::<T>()
            })
            .collect()
    }

    /// 延迟解析的 Provider，不会在创建时形成依赖，可以打破循环依赖
    pub fn get_provider<T: ?Sized + Send + Sync + 'static>(
        &self,
        qualifier: Option<Qualifier>,
    ) -> Provider<T> {
        Provider {
            factory: self.factory.downgrade(),
            qualifier,
            owner: Some(self.identifier.clone()),
            request: self.request.map(Arc::downgrade),
            _marker: PhantomData,
        }
    }

    pub fn get_property<T: DeserializeOwned>(&self, key: &str) -> ContainerResult<Option<T>> {
        self.factory.environment().get_property(key)
    }

    pub fn get_required_property<T: DeserializeOwned>(&self, key: &str) -> ContainerResult<T> {
        self.factory.environment().get_required_property(key)
    }

    /// 显式参数（仅 `create_bean` 时存在）
    pub fn argument<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        self.arguments.and_then(|args| args.get::<T>(name))
    }

    pub fn required_argument<T: Send + Sync + 'static>(&self, name: &str) -> ContainerResult<Arc<T>> {
        self.argument::<T>(name).ok_or_else(|| {
            ContainerError::Other(anyhow::anyhow!(
                "Argument '{}' of type '{}' is required to create bean '{}'",
                name,
                TypeKey::of::<T>().short_name(),
                self.definition.name()
            ))
        })
    }

    pub fn environment(&self) -> &Environment {
        self.factory.environment()
    }

    /// 正在创建的 Bean 的定义
    pub fn definition(&self) -> &BeanDefinition {
        self.definition
    }

    pub fn identifier(&self) -> &BeanIdentifier {
        self.identifier
    }

    pub(crate) fn take_dependencies(&self) -> Vec<BeanIdentifier> {
        std::mem::take(&mut *self.dependencies.borrow_mut())
    }

    fn require<T: ?Sized + Send + Sync + 'static>(
        &self,
        qualifier: Option<&Qualifier>,
    ) -> ContainerResult<Arc<T>> {
        self.find_bean::<T>(qualifier)?.ok_or_else(|| ContainerError::NoSuchBean {
            bean_type: TypeKey::of::<T>().short_name(),
            qualifier: qualifier.map(ToString::to_string),
        })
    }

    /// 原型 Bean 不参与销毁，把它的依赖直接记到当前 Bean 上
    fn record(&self, registration: &BeanRegistration) {
        let mut dependencies = self.dependencies.borrow_mut();
        let incoming: Vec<BeanIdentifier> = if registration.definition().scope() == &Scope::Prototype {
            registration.dependencies().to_vec()
        } else {
            vec![registration.identifier().clone()]
        };
        for id in incoming {
            if !dependencies.contains(&id) {
                dependencies.push(id);
            }
        }
    }
}

/// 延迟解析的 Bean 句柄
///
/// 每次调用 `get` 都会重新解析，单例返回同一个实例，原型返回新实例。
/// 上下文关闭后返回 `ContextClosed`。
pub struct Provider<T: ?Sized> {
    factory: Weak<DefaultListableBeanFactory>,
    qualifier: Option<Qualifier>,
    owner: Option<BeanIdentifier>,
    request: Option<Weak<ScopeStore>>,
    _marker: PhantomData<fn() -> Arc<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> Provider<T> {
    pub(crate) fn detached(factory: Weak<DefaultListableBeanFactory>, qualifier: Option<Qualifier>) -> Self {
        Self {
            factory,
            qualifier,
            owner: None,
            request: None,
            _marker: PhantomData,
        }
    }

    pub fn get(&self) -> ContainerResult<Arc<T>> {
        self.find()?.ok_or_else(|| ContainerError::NoSuchBean {
            bean_type: TypeKey::of::<T>().short_name(),
            qualifier: self.qualifier.as_ref().map(ToString::to_string),
        })
    }

    pub fn find(&self) -> ContainerResult<Option<Arc<T>>> {
        let factory = self.factory.upgrade().ok_or(ContainerError::ContextClosed)?;
        let request = self.request.as_ref().and_then(Weak::upgrade);

        let Some(registration) = factory.resolve_registration::<T>(self.qualifier.as_ref(), request.as_ref())?
        else {
            return Ok(None);
        };

        if let Some(owner) = &self.owner {
            factory.record_late_dependency(owner, &registration);
        }
        registration.cast_or_mismatch::<T>().map(Some)
    }

    pub fn qualifier(&self) -> Option<&Qualifier> {
        self.qualifier.as_ref()
    }
}

impl<T: ?Sized> Clone for Provider<T> {
    fn clone(&self) -> Self {
        Self {
            factory: Weak::clone(&self.factory),
            qualifier: self.qualifier.clone(),
            owner: self.owner.clone(),
            request: self.request.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: ?Sized> fmt::Debug for Provider<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("type", &std::any::type_name::<T>())
            .field("qualifier", &self.qualifier)
            .field("owner", &self.owner)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bean_arguments() {
        let args = BeanArguments::new()
            .with("name", "v8".to_string())
            .with("cylinders", 8u32);

        assert_eq!(args.get::<String>("name").as_deref(), Some(&"v8".to_string()));
        assert_eq!(args.get::<u32>("cylinders").map(|c| *c), Some(8));
        assert!(args.get::<u64>("cylinders").is_none());
        assert!(!args.contains("displacement"));
    }
}
