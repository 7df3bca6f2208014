use crate::bean::BeanDefinition;

/// 定义注册函数类型
pub type DefinitionFactory = fn() -> Vec<BeanDefinition>;

/// 组件定义注册表 - 用于 inventory 收集
///
/// 代码生成器（或手写代码）通过 [`submit_component!`](crate::submit_component) 提交，
/// 构建上下文时由 `scan_inventory` 统一收集。
pub struct DefinitionRegistration {
    pub name: &'static str,
    pub definitions: DefinitionFactory,
}

inventory::collect!(DefinitionRegistration);

/// Component trait - 可以描述自身 Bean 定义的类型
///
/// # 示例
///
/// ```ignore
/// use trellis_core::prelude::*;
///
/// struct AuditLog;
///
/// impl Component for AuditLog {
///     fn definition() -> BeanDefinition {
///         BeanDefinition::builder(|_| Ok(AuditLog)).build()
///     }
/// }
///
/// submit_component!(AuditLog);
/// ```
pub trait Component: Sized + Send + Sync + 'static {
    fn definition() -> BeanDefinition;

    /// 额外的定义，例如该组件附带的工厂 Bean
    fn additional_definitions() -> Vec<BeanDefinition> {
        Vec::new()
    }

    fn definitions() -> Vec<BeanDefinition> {
        let mut definitions = vec![Self::definition()];
        definitions.extend(Self::additional_definitions());
        definitions
    }
}

/// 提交组件定义
///
/// ```ignore
/// submit_component!(AuditLog);
/// submit_component!("engines", || vec![v6_definition(), v8_definition()]);
/// ```
#[macro_export]
macro_rules! submit_component {
    ($component:ty) => {
        $crate::inventory::submit! {
            $crate::component::DefinitionRegistration {
                name: stringify!($component),
                definitions: <$component as $crate::component::Component>::definitions,
            }
        }
    };
    ($name:expr, $definitions:expr) => {
        $crate::inventory::submit! {
            $crate::component::DefinitionRegistration {
                name: $name,
                definitions: $definitions,
            }
        }
    };
}
