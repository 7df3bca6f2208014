//! 插件机制
//!
//! 插件在上下文构建前向构建器注册定义、监听器和配置源，
//! 在上下文启动后和关闭前收到回调。

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::{ApplicationContext, ApplicationContextBuilder};
use crate::error::{ApplicationError, ApplicationResult};

/// 应用插件 trait
#[async_trait]
pub trait ApplicationPlugin: Send + Sync {
    fn name(&self) -> &str;

    /// 插件优先级（数字越小优先级越高）
    fn priority(&self) -> i32 {
        100
    }

    /// 配置阶段，在上下文构建之前执行
    fn configure(&self, _builder: &mut ApplicationContextBuilder) -> ApplicationResult<()> {
        Ok(())
    }

    /// 启动阶段，在所有非延迟单例创建完成后执行
    async fn on_startup(&self, _context: &Arc<ApplicationContext>) -> ApplicationResult<()> {
        Ok(())
    }

    /// 关闭阶段，在上下文关闭之前按逆序执行
    async fn on_shutdown(&self, _context: &Arc<ApplicationContext>) -> ApplicationResult<()> {
        Ok(())
    }
}

/// 插件注册表
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<Box<dyn ApplicationPlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册插件，同名插件只保留第一个
    pub fn register(&mut self, plugin: Box<dyn ApplicationPlugin>) {
        if self.plugins.iter().any(|p| p.name() == plugin.name()) {
            tracing::debug!("Plugin '{}' already registered, skipping", plugin.name());
            return;
        }
        tracing::debug!("Registering plugin: {}", plugin.name());
        self.plugins.push(plugin);
    }

    /// 按优先级排序插件（稳定排序，同优先级保持注册顺序）
    pub fn sort_by_priority(&mut self) {
        self.plugins.sort_by_key(|p| p.priority());
    }

    pub fn plugins(&self) -> &[Box<dyn ApplicationPlugin>] {
        &self.plugins
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn configure_all(&self, builder: &mut ApplicationContextBuilder) -> ApplicationResult<()> {
        for plugin in &self.plugins {
            tracing::info!("Configuring plugin: {}", plugin.name());
            plugin.configure(builder).map_err(|e| ApplicationError::Plugin {
                plugin: plugin.name().to_string(),
                message: e.to_string(),
            })?;
        }
        Ok(())
    }

    pub async fn startup_all(&self, context: &Arc<ApplicationContext>) -> ApplicationResult<()> {
        for plugin in &self.plugins {
            tracing::info!("Starting plugin: {}", plugin.name());
            plugin.on_startup(context).await.map_err(|e| ApplicationError::Plugin {
                plugin: plugin.name().to_string(),
                message: e.to_string(),
            })?;
        }
        Ok(())
    }

    /// 逆序关闭，单个插件失败只记录日志
    pub async fn shutdown_all(&self, context: &Arc<ApplicationContext>) {
        for plugin in self.plugins.iter().rev() {
            tracing::info!("Shutting down plugin: {}", plugin.name());
            if let Err(e) = plugin.on_shutdown(context).await {
                tracing::error!("Failed to shutdown plugin {}: {}", plugin.name(), e);
            }
        }
    }
}

/// 用于全局收集插件的宏
///
/// 插件类型需要实现 `Default`
#[macro_export]
macro_rules! submit_plugin {
    ($plugin_type:ty) => {
        $crate::inventory::submit! {
            $crate::plugin::PluginSubmission {
                create: || {
                    Box::new(<$plugin_type>::default()) as Box<dyn $crate::plugin::ApplicationPlugin>
                },
            }
        }
    };
}

/// 插件提交结构
pub struct PluginSubmission {
    pub create: fn() -> Box<dyn ApplicationPlugin>,
}

inventory::collect!(PluginSubmission);

/// 从全局注册表加载所有插件
pub fn load_plugins() -> PluginRegistry {
    let mut registry = PluginRegistry::new();

    for submission in inventory::iter::<PluginSubmission> {
        registry.register((submission.create)());
    }

    registry.sort_by_priority();
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bean::BeanDefinition;
    use parking_lot::Mutex;

    struct Marker;

    struct RecordingPlugin {
        name: &'static str,
        priority: i32,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl ApplicationPlugin for RecordingPlugin {
        fn name(&self) -> &str {
            self.name
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        fn configure(&self, builder: &mut ApplicationContextBuilder) -> ApplicationResult<()> {
            self.log.lock().push(format!("configure:{}", self.name));
            if self.name == "marker" {
                builder.definition(BeanDefinition::builder(|_| Ok(Marker)).build());
            }
            Ok(())
        }

        async fn on_startup(&self, _context: &Arc<ApplicationContext>) -> ApplicationResult<()> {
            self.log.lock().push(format!("startup:{}", self.name));
            Ok(())
        }

        async fn on_shutdown(&self, _context: &Arc<ApplicationContext>) -> ApplicationResult<()> {
            self.log.lock().push(format!("shutdown:{}", self.name));
            Err(ApplicationError::Other(anyhow::anyhow!("ignored")))
        }
    }

    #[tokio::test]
    async fn test_plugin_phases_follow_priority() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = PluginRegistry::new();
        for (name, priority) in [("late", 200), ("marker", 10), ("late", 1)] {
            registry.register(Box::new(RecordingPlugin {
                name,
                priority,
                log: Arc::clone(&log),
            }));
        }
        registry.sort_by_priority();
        assert_eq!(registry.len(), 2);

        let mut builder = ApplicationContext::builder();
        registry.configure_all(&mut builder).unwrap();
        let context = builder.build().unwrap();
        assert!(context.get_bean::<Marker>().is_ok());

        registry.startup_all(&context).await.unwrap();
        registry.shutdown_all(&context).await;

        assert_eq!(
            *log.lock(),
            vec![
                "configure:marker",
                "configure:late",
                "startup:marker",
                "startup:late",
                "shutdown:late",
                "shutdown:marker",
            ]
        );
    }
}
