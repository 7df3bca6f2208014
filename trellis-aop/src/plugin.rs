//! AOP 插件
//!
//! 在上下文构建前把 [`InterceptorRegistry`] 注册为单例 Bean，
//! 注册表会加载所有通过 inventory 提交的拦截器。
//!
//! 插件通过 inventory 自动注册，使用 `TrellisApplication` 时无需手动添加：
//!
//! ```rust,ignore
//! TrellisApplication::new("shop").run().await?;
//! ```
//!
//! 只使用显式插件时：
//!
//! ```rust,ignore
//! TrellisApplication::new("shop")
//!     .without_inventory()
//!     .plugin(Box::new(AopPlugin::new()))
//!     .run()
//!     .await?;
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use trellis_core::prelude::*;

use crate::registry::InterceptorRegistry;

/// 拦截器注册表的 Bean 名称
pub const INTERCEPTOR_REGISTRY_BEAN_NAME: &str = "interceptorRegistry";

pub struct AopPlugin {
    name: String,
    enabled: bool,
    load_inventory: bool,
}

impl AopPlugin {
    pub fn new() -> Self {
        Self {
            name: "AopPlugin".to_string(),
            enabled: true,
            load_inventory: true,
        }
    }

    /// 创建禁用的插件
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// 注册表只包含手动注册的拦截器
    pub fn without_inventory(mut self) -> Self {
        self.load_inventory = false;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Default for AopPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ApplicationPlugin for AopPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        10
    }

    fn configure(&self, builder: &mut ApplicationContextBuilder) -> ApplicationResult<()> {
        if !self.enabled {
            tracing::info!("AOP plugin is disabled, skipping initialization");
            return Ok(());
        }

        let registry = if self.load_inventory {
            InterceptorRegistry::with_inventory()
        } else {
            InterceptorRegistry::new()
        };
        tracing::info!("[AopPlugin] Loaded {} interceptor(s)", registry.len());

        builder.definition(
            BeanDefinition::from_instance(Arc::new(registry))
                .name(INTERCEPTOR_REGISTRY_BEAN_NAME)
                .build(),
        );
        Ok(())
    }

    async fn on_startup(&self, context: &Arc<ApplicationContext>) -> ApplicationResult<()> {
        if !self.enabled {
            return Ok(());
        }
        let registry = context.get_bean::<InterceptorRegistry>()?;
        tracing::info!(
            "[AopPlugin] Interception active for binding(s): {:?}",
            registry.bindings()
        );
        Ok(())
    }

    async fn on_shutdown(&self, _context: &Arc<ApplicationContext>) -> ApplicationResult<()> {
        if self.enabled {
            tracing::info!("[AopPlugin] Shutting down AOP support");
        }
        Ok(())
    }
}

trellis_core::submit_plugin!(AopPlugin);
