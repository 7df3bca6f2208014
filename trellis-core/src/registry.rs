//! Bean 定义注册表
//!
//! 注册表在构建后不可变，查找不需要加锁。定义通过
//! [`BeanDefinitionRegistryBuilder`] 收集：手动注册、[`BeanDefinitionSupplier`]
//! 或者 inventory 提交的 [`DefinitionRegistration`]。

use std::collections::HashMap;
use std::sync::Arc;

use crate::bean::{BeanDefinition, TypeKey};
use crate::component::DefinitionRegistration;
use crate::error::{ContainerError, ContainerResult};

/// Bean 定义提供者
///
/// 按顺序、惰性地产生定义，例如代码生成器为一个模块输出的所有定义
pub trait BeanDefinitionSupplier {
    fn name(&self) -> &str;

    fn definitions(&self) -> Box<dyn Iterator<Item = BeanDefinition> + '_>;
}

/// 不可变的 Bean 定义注册表
#[derive(Debug, Default)]
pub struct BeanDefinitionRegistry {
    definitions: Vec<Arc<BeanDefinition>>,
    by_name: HashMap<String, usize>,
    by_type: HashMap<TypeKey, Vec<usize>>,
}

impl BeanDefinitionRegistry {
    pub fn builder() -> BeanDefinitionRegistryBuilder {
        BeanDefinitionRegistryBuilder::new()
    }

    /// 所有暴露 `key` 类型的定义，按注册顺序
    pub fn candidates(&self, key: TypeKey) -> Vec<Arc<BeanDefinition>> {
        self.by_type
            .get(&key)
            .map(|indexes| indexes.iter().map(|&i| Arc::clone(&self.definitions[i])).collect())
            .unwrap_or_default()
    }

    /// 按名称或别名查找
    pub fn get_by_name(&self, name: &str) -> Option<&Arc<BeanDefinition>> {
        self.by_name.get(name).map(|&i| &self.definitions[i])
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn definitions(&self) -> &[Arc<BeanDefinition>] {
        &self.definitions
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

/// 注册表构建器
#[derive(Default)]
pub struct BeanDefinitionRegistryBuilder {
    definitions: Vec<BeanDefinition>,
}

impl BeanDefinitionRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, definition: BeanDefinition) -> &mut Self {
        tracing::trace!("Registering bean definition '{}'", definition.name());
        self.definitions.push(definition);
        self
    }

    pub fn register_supplier(&mut self, supplier: &dyn BeanDefinitionSupplier) -> &mut Self {
        let before = self.definitions.len();
        self.definitions.extend(supplier.definitions());
        tracing::debug!(
            "Supplier '{}' contributed {} bean definition(s)",
            supplier.name(),
            self.definitions.len() - before
        );
        self
    }

    /// 收集所有通过 inventory 提交的定义
    pub fn scan_inventory(&mut self) -> &mut Self {
        let mut count = 0;
        for registration in inventory::iter::<DefinitionRegistration> {
            let definitions = (registration.definitions)();
            tracing::debug!(
                "  ├─ Component '{}' ({} definition(s))",
                registration.name,
                definitions.len()
            );
            count += definitions.len();
            self.definitions.extend(definitions);
        }
        tracing::info!("Scanned {} bean definition(s) from inventory", count);
        self
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// 构建不可变注册表
    ///
    /// # Errors
    ///
    /// 名称或别名重复时返回 `BeanDefinitionAlreadyExists`
    pub fn build(self) -> ContainerResult<BeanDefinitionRegistry> {
        let mut registry = BeanDefinitionRegistry::default();

        for (index, definition) in self.definitions.into_iter().enumerate() {
            let names = std::iter::once(definition.name()).chain(definition.aliases().iter().map(String::as_str));
            for name in names {
                if registry.by_name.insert(name.to_string(), index).is_some() {
                    return Err(ContainerError::BeanDefinitionAlreadyExists(name.to_string()));
                }
            }
            for exposed in definition.exposed_types() {
                registry.by_type.entry(exposed.key()).or_default().push(index);
            }
            registry.definitions.push(Arc::new(definition));
        }

        tracing::debug!("Bean definition registry built with {} definition(s)", registry.len());
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Engine: Send + Sync {}

    struct V6Engine;
    struct V8Engine;

    impl Engine for V6Engine {}
    impl Engine for V8Engine {}

    struct EngineModule;

    impl BeanDefinitionSupplier for EngineModule {
        fn name(&self) -> &str {
            "engines"
        }

        fn definitions(&self) -> Box<dyn Iterator<Item = BeanDefinition> + '_> {
            Box::new(
                vec![
                    BeanDefinition::builder(|_| Ok(V6Engine))
                        .exposes::<dyn Engine, _>(|e| e as Arc<dyn Engine>)
                        .build(),
                    BeanDefinition::builder(|_| Ok(V8Engine))
                        .alias("v8")
                        .exposes::<dyn Engine, _>(|e| e as Arc<dyn Engine>)
                        .build(),
                ]
                .into_iter(),
            )
        }
    }

    #[test]
    fn test_candidates_keep_registration_order() {
        let mut builder = BeanDefinitionRegistryBuilder::new();
        builder.register_supplier(&EngineModule);
        let registry = builder.build().unwrap();

        let names: Vec<String> = registry
            .candidates(TypeKey::of::<dyn Engine>())
            .iter()
            .map(|d| d.name().to_string())
            .collect();
        assert_eq!(names, vec!["v6Engine", "v8Engine"]);
        assert_eq!(registry.candidates(TypeKey::of::<V8Engine>()).len(), 1);
        assert!(registry.candidates(TypeKey::of::<String>()).is_empty());
    }

    #[test]
    fn test_lookup_by_alias() {
        let mut builder = BeanDefinitionRegistryBuilder::new();
        builder.register_supplier(&EngineModule);
        let registry = builder.build().unwrap();

        assert_eq!(registry.get_by_name("v8").map(|d| d.name()), Some("v8Engine"));
        assert!(registry.contains_name("v6Engine"));
        assert!(!registry.contains_name("v12Engine"));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut builder = BeanDefinitionRegistryBuilder::new();
        builder
            .register(BeanDefinition::builder(|_| Ok(V6Engine)).name("engine").build())
            .register(BeanDefinition::builder(|_| Ok(V8Engine)).alias("engine").build());

        match builder.build() {
            Err(ContainerError::BeanDefinitionAlreadyExists(name)) => assert_eq!(name, "engine"),
            other => panic!("Expected duplicate definition error, got {:?}", other),
        }
    }
}
