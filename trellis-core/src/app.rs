//! 应用启动
//!
//! `TrellisApplication` 串起完整的启动流程：日志、profile、配置文件、环境变量、
//! 插件、上下文构建、依赖校验和单例预创建。

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::config::{EnvironmentPropertySource, TomlPropertySource};
use crate::constants;
use crate::context::{ApplicationContext, ApplicationContextBuilder};
use crate::error::{ApplicationError, ApplicationResult};
use crate::event::ApplicationStartedEvent;
use crate::logging::LoggingConfig;
use crate::plugin::{load_plugins, ApplicationPlugin, PluginRegistry};
use crate::shutdown::ShutdownReport;

type Configurer = Box<dyn Fn(&mut ApplicationContextBuilder) -> ApplicationResult<()> + Send + Sync>;

/// Trellis 应用程序
pub struct TrellisApplication {
    name: String,
    config_files: Vec<String>,
    env_prefix: String,
    profiles: Vec<String>,
    show_banner: bool,

    /// 为 `None` 时从环境变量和配置文件读取；`init_logging` 为 false 时不初始化
    logging_config: Option<LoggingConfig>,
    init_logging: bool,

    /// 是否加载 inventory 中的组件和插件
    scan_inventory: bool,
    plugins: Vec<Box<dyn ApplicationPlugin>>,
    configurers: Vec<Configurer>,
}

impl TrellisApplication {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config_files: vec![constants::DEFAULT_CONFIG_FILE.to_string()],
            env_prefix: constants::DEFAULT_ENV_PREFIX.to_string(),
            profiles: Vec::new(),
            show_banner: true,
            logging_config: None,
            init_logging: true,
            scan_inventory: true,
            plugins: Vec::new(),
            configurers: Vec::new(),
        }
    }

    pub fn config_file(mut self, path: impl Into<String>) -> Self {
        self.config_files = vec![path.into()];
        self
    }

    pub fn config_files(mut self, paths: Vec<String>) -> Self {
        self.config_files = paths;
        self
    }

    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// 设置激活的 profiles，优先于 `{prefix}PROFILES_ACTIVE`
    pub fn profiles(mut self, profiles: Vec<String>) -> Self {
        self.profiles = profiles;
        self
    }

    pub fn banner(mut self, show: bool) -> Self {
        self.show_banner = show;
        self
    }

    pub fn logging(mut self, config: LoggingConfig) -> Self {
        self.logging_config = Some(config);
        self
    }

    /// 不初始化全局日志订阅者（由调用方自行设置）
    pub fn without_logging(mut self) -> Self {
        self.init_logging = false;
        self
    }

    /// 只使用显式添加的定义和插件
    pub fn without_inventory(mut self) -> Self {
        self.scan_inventory = false;
        self
    }

    pub fn plugin(mut self, plugin: Box<dyn ApplicationPlugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// 在上下文构建前修改构建器，用于注册定义和监听器
    pub fn configure<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut ApplicationContextBuilder) -> ApplicationResult<()> + Send + Sync + 'static,
    {
        self.configurers.push(Box::new(f));
        self
    }

    /// 运行应用
    pub async fn run(self) -> ApplicationResult<RunningApplication> {
        let start_time = Instant::now();

        let mut builder = ApplicationContext::builder();
        builder.app_name(self.name.clone());

        let active_profiles = self.resolve_profiles();
        self.load_configurations(&mut builder, &active_profiles)?;
        builder.add_property_source(Box::new(EnvironmentPropertySource::new(&self.env_prefix)));
        builder.active_profiles(active_profiles.clone());

        if self.init_logging {
            let config = self
                .logging_config
                .clone()
                .unwrap_or_else(|| LoggingConfig::from_env().merge_environment(builder.environment()));
            if let Err(e) = config.init() {
                // 测试中可能已经设置了全局订阅者
                tracing::debug!("{}", e);
            }
        }

        if self.show_banner {
            self.print_banner();
        }

        tracing::info!("Starting {} application", self.name);
        if active_profiles.is_empty() {
            tracing::info!("No active profiles set, using default configuration");
        } else {
            tracing::info!("Active profiles: {:?}", active_profiles);
        }
        tracing::debug!("Environment variable prefix: {}", self.env_prefix);

        let mut plugins = if self.scan_inventory {
            load_plugins()
        } else {
            PluginRegistry::new()
        };
        for plugin in self.plugins {
            plugins.register(plugin);
        }
        plugins.sort_by_priority();
        plugins.configure_all(&mut builder)?;

        for configurer in &self.configurers {
            configurer(&mut builder)?;
        }
        if self.scan_inventory {
            builder.scan_inventory();
        }

        let context = builder.build()?;
        tracing::info!("Validating dependencies and initializing non-lazy singleton beans");
        if let Err(e) = context.initialize() {
            tracing::error!("Failed to initialize application context: {}", e);
            context.close();
            return Err(ApplicationError::Container(e));
        }

        plugins.startup_all(&context).await?;

        let elapsed_ms = start_time.elapsed().as_millis();
        tracing::info!("Started {} in {}ms", self.name, elapsed_ms);
        context.publish_event(Arc::new(ApplicationStartedEvent::new(self.name.clone(), elapsed_ms)));

        Ok(RunningApplication { context, plugins })
    }

    fn resolve_profiles(&self) -> Vec<String> {
        if !self.profiles.is_empty() {
            return self.profiles.clone();
        }
        let key = format!("{}{}", self.env_prefix, constants::PROFILES_ACTIVE_SUFFIX);
        std::env::var(key)
            .map(|profiles| {
                profiles
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// 加载配置文件
    ///
    /// 优先级从低到高：`application.toml`、`application-{profile}.toml`（按 profile 顺序递增）
    fn load_configurations(
        &self,
        builder: &mut ApplicationContextBuilder,
        active_profiles: &[String],
    ) -> ApplicationResult<()> {
        for base_config in &self.config_files {
            try_load_config_file(builder, base_config, 0)?;
        }

        for (index, profile) in active_profiles.iter().enumerate() {
            for base_config in &self.config_files {
                let profile_config = profile_config_path(base_config, profile);
                try_load_config_file(builder, &profile_config, constants::PROFILE_CONFIG_PRIORITY + index as i32)?;
            }
        }

        Ok(())
    }

    fn print_banner(&self) {
        println!();
        println!(r"  _____         _ _ _     ");
        println!(r" |_   _| _ ___ | | (_)___ ");
        println!(r"   | || '_/ -_)| | | (_-< ");
        println!(r"   |_||_| \___||_|_|_/__/ ");
        println!();
        println!("  :: Trellis ::        (v{})", env!("CARGO_PKG_VERSION"));
        println!();
    }
}

impl Default for TrellisApplication {
    fn default() -> Self {
        Self::new("TrellisApplication")
    }
}

/// application.toml -> application-dev.toml
fn profile_config_path(base_path: &str, profile: &str) -> String {
    match base_path.rfind('.') {
        Some(dot_pos) => {
            let (name, ext) = base_path.split_at(dot_pos);
            format!("{}-{}{}", name, profile, ext)
        }
        None => format!("{}-{}", base_path, profile),
    }
}

/// 文件不存在时跳过；存在但无法解析时报错
fn try_load_config_file(
    builder: &mut ApplicationContextBuilder,
    config_file: &str,
    priority: i32,
) -> ApplicationResult<()> {
    if !Path::new(config_file).exists() {
        tracing::debug!("Configuration file not found: {}", config_file);
        return Ok(());
    }

    let source = TomlPropertySource::from_file(config_file).map_err(|e| ApplicationError::ConfigLoadFailed {
        path: config_file.to_string(),
        message: e.to_string(),
    })?;
    builder.add_property_source(Box::new(source.with_priority(priority)));
    tracing::info!("Loaded configuration from: {} (priority: {})", config_file, priority);
    Ok(())
}

/// 运行中的应用
pub struct RunningApplication {
    context: Arc<ApplicationContext>,
    plugins: PluginRegistry,
}

impl RunningApplication {
    pub fn context(&self) -> &Arc<ApplicationContext> {
        &self.context
    }

    /// 关闭插件，然后优雅关闭上下文
    pub async fn shutdown(self) -> ShutdownReport {
        self.plugins.shutdown_all(&self.context).await;
        self.context.shutdown().await
    }

    /// 等待 Ctrl+C 后关闭
    pub async fn wait_for_shutdown_signal(self) -> ApplicationResult<ShutdownReport> {
        tokio::signal::ctrl_c()
            .await
            .map_err(|e| ApplicationError::Other(e.into()))?;
        tracing::info!("Shutdown signal received");
        Ok(self.shutdown().await)
    }
}
