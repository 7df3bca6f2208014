use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use trellis_aop::prelude::*;
use trellis_core::futures::future::BoxFuture;
use trellis_core::futures::FutureExt;
use trellis_core::prelude::*;
use trellis_core::{ApplicationStartedEvent, Qualifier, TypedEventListenerAdapter};

// ==================== 配置 ====================

#[derive(Debug, Clone, Deserialize)]
struct GarageConfig {
    bays: u32,
    owner: String,
}

// ==================== 引擎 ====================

trait Engine: Send + Sync {
    fn cylinders(&self) -> u32;
    fn start(&self, rpm: u32) -> anyhow::Result<u32>;
}

struct V6Engine;

impl Engine for V6Engine {
    fn cylinders(&self) -> u32 {
        6
    }

    fn start(&self, rpm: u32) -> anyhow::Result<u32> {
        Ok(rpm * 6)
    }
}

impl Component for V6Engine {
    fn definition() -> BeanDefinition {
        BeanDefinition::builder(|_| Ok(V6Engine))
            .exposes::<dyn Engine, _>(|engine| engine as Arc<dyn Engine>)
            .order(1)
            .build()
    }
}

struct V8Engine {
    starts: AtomicUsize,
}

impl V8Engine {
    fn start(&self, rpm: u32) -> anyhow::Result<u32> {
        if rpm > 8000 {
            anyhow::bail!("refusing to start above redline ({} rpm)", rpm);
        }
        self.starts.fetch_add(1, Ordering::Relaxed);
        Ok(rpm * 8)
    }
}

/// V8 引擎的拦截代理
struct V8EngineProxy(InterceptedProxy<V8Engine>);

impl Engine for V8EngineProxy {
    fn cylinders(&self) -> u32 {
        8
    }

    fn start(&self, rpm: u32) -> anyhow::Result<u32> {
        let args = Arguments::new().with("rpm", rpm);
        Ok(self
            .0
            .invoke("start", args, |engine, args| engine.start(args.take::<u32>("rpm").unwrap_or(rpm)))?)
    }
}

impl Component for V8EngineProxy {
    fn definition() -> BeanDefinition {
        BeanDefinition::builder(|ctx| {
            let target = Arc::new(V8Engine {
                starts: AtomicUsize::new(0),
            });
            Ok(V8EngineProxy(InterceptedProxy::from_context(target, ctx)?))
        })
        .name("v8Engine")
        .exposes::<dyn Engine, _>(|engine| engine as Arc<dyn Engine>)
        .primary()
        .order(2)
        .intercepted_by(InterceptorBinding::new(LOGGED_BINDING))
        .intercepted_by(InterceptorBinding::new(TIMED_BINDING).attribute("threshold_ms", ConfigValue::Int(50)))
        .intercepted_by(InterceptorBinding::new("redline").members("start"))
        .pre_destroy("report", |proxy| {
            let starts = proxy.0.target().starts.load(Ordering::Relaxed);
            tracing::info!("V8 engine stopped after {} start(s)", starts);
            Ok(())
        })
        .build()
    }
}

/// 超过红线转速时限速，而不是让启动失败
#[derive(Default)]
struct RedlineInterceptor;

impl MethodInterceptor for RedlineInterceptor {
    fn name(&self) -> &str {
        "RedlineInterceptor"
    }

    fn order(&self) -> i32 {
        10
    }

    fn intercept(&self, ctx: &mut MethodInvocationContext<'_>) -> InvocationResult<ReturnValue> {
        let rpm = *ctx.argument::<u32>("rpm")?;
        if rpm > 8000 {
            tracing::warn!("Clamping {} rpm to redline for {}", rpm, ctx.method());
            ctx.arguments_mut().set("rpm", 8000u32);
        }
        ctx.proceed()
    }
}

submit_interceptor!("redline", RedlineInterceptor);

// ==================== 车库服务 ====================

struct Garage {
    config: GarageConfig,
    engine: Arc<dyn Engine>,
    spare: Arc<dyn Engine>,
    engines: Vec<Arc<dyn Engine>>,
}

impl Garage {
    fn report(&self) {
        tracing::info!("Garage owned by {} with {} bay(s)", self.config.owner, self.config.bays);
        tracing::info!("  ├─ primary engine: V{}", self.engine.cylinders());
        tracing::info!("  ├─ spare engine: V{}", self.spare.cylinders());
        let all: Vec<u32> = self.engines.iter().map(|e| e.cylinders()).collect();
        tracing::info!("  └─ all engines by order: {:?}", all);
    }
}

impl Component for Garage {
    fn definition() -> BeanDefinition {
        BeanDefinition::builder(|ctx| {
            Ok(Garage {
                config: ctx.environment().bind::<GarageConfig>("garage")?,
                engine: ctx.get_bean::<dyn Engine>()?,
                spare: ctx.get_bean_qualified::<dyn Engine>(&Qualifier::Named("v6Engine".to_string()))?,
                engines: ctx.get_beans_of_type::<dyn Engine>()?,
            })
        })
        .exposes::<dyn GracefulShutdownCapable, _>(|garage| garage as Arc<dyn GracefulShutdownCapable>)
        .injection_point(InjectionPoint::constructor::<dyn Engine>("engine"))
        .post_construct("open", |garage| {
            tracing::info!("Garage opened for {}", garage.config.owner);
            Ok(())
        })
        .pre_destroy("close", |_| {
            tracing::info!("Garage closed");
            Ok(())
        })
        .build()
    }
}

impl GracefulShutdownCapable for Garage {
    fn shutdown_name(&self) -> String {
        "garage".to_string()
    }

    fn shutdown_gracefully(&self) -> ContainerResult<BoxFuture<'static, ()>> {
        let bays = self.config.bays;
        Ok(async move {
            tokio::time::sleep(Duration::from_millis(10 * u64::from(bays))).await;
            tracing::info!("All {} bay(s) drained", bays);
        }
        .boxed())
    }
}

submit_component!(V6Engine);
submit_component!(V8EngineProxy);
submit_component!(Garage);

// ==================== 主程序 ====================

#[tokio::main]
async fn main() -> ApplicationResult<()> {
    let config_file = ["demos/app-demo/application.toml", "application.toml"]
        .into_iter()
        .find(|path| std::path::Path::new(path).exists())
        .unwrap_or("application.toml");

    let app = TrellisApplication::new("TrellisGarage")
        .config_file(config_file)
        .env_prefix("APP_")
        .configure(|builder| {
            let listener = FnEventListener::new("startupReporter", |event: &ApplicationStartedEvent| {
                tracing::info!("{} is ready ({}ms)", event.app_name, event.startup_time_ms);
            });
            builder.event_listener(Arc::new(TypedEventListenerAdapter::new(Arc::new(listener))));
            Ok(())
        })
        .run()
        .await?;

    {
        let context = app.context();
        context.get_bean::<Garage>()?.report();

        let engine = context.get_bean::<dyn Engine>()?;
        for rpm in [3000, 9500] {
            match engine.start(rpm) {
                Ok(power) => tracing::info!("Started at {} rpm, output {}", rpm, power),
                Err(e) => tracing::error!("Start failed: {:#}", e),
            }
        }
    }

    let report = app.shutdown().await;
    if !report.is_clean() {
        tracing::warn!("Shutdown finished with failures: {:?}", report.failures());
    }
    Ok(())
}
