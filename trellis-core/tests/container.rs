use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use trellis_core::prelude::*;
use trellis_core::{PropertyExpectation, Provider};

trait Engine: Send + Sync {
    fn cylinders(&self) -> u32;
}

struct V6Engine;

impl Engine for V6Engine {
    fn cylinders(&self) -> u32 {
        6
    }
}

struct V8Engine;

impl Engine for V8Engine {
    fn cylinders(&self) -> u32 {
        8
    }
}

struct Vehicle {
    engine: Arc<dyn Engine>,
}

fn v6() -> BeanDefinition {
    BeanDefinition::builder(|_| Ok(V6Engine))
        .exposes::<dyn Engine, _>(|e| e as Arc<dyn Engine>)
        .order(1)
        .build()
}

fn v8() -> BeanDefinition {
    BeanDefinition::builder(|_| Ok(V8Engine))
        .exposes::<dyn Engine, _>(|e| e as Arc<dyn Engine>)
        .primary()
        .order(2)
        .build()
}

fn vehicle() -> BeanDefinition {
    BeanDefinition::builder(|ctx| {
        Ok(Vehicle {
            engine: ctx.get_bean::<dyn Engine>()?,
        })
    })
    .injection_point(InjectionPoint::constructor::<dyn Engine>("engine"))
    .build()
}

fn context(definitions: Vec<BeanDefinition>) -> Arc<ApplicationContext> {
    let mut builder = ApplicationContext::builder();
    builder.definitions(definitions);
    builder.build().unwrap()
}

#[test]
fn singleton_is_shared_and_prototype_is_fresh() {
    struct Counter;
    struct Ticket;

    let context = context(vec![
        BeanDefinition::builder(|_| Ok(Counter)).build(),
        BeanDefinition::builder(|_| Ok(Ticket)).prototype().build(),
    ]);

    let a = context.get_bean::<Counter>().unwrap();
    let b = context.get_bean::<Counter>().unwrap();
    assert!(Arc::ptr_eq(&a, &b));

    let t1 = context.get_bean::<Ticket>().unwrap();
    let t2 = context.get_bean::<Ticket>().unwrap();
    assert!(!Arc::ptr_eq(&t1, &t2));
}

#[test]
fn primary_engine_wins_regardless_of_registration_order() {
    for definitions in [vec![v6(), v8(), vehicle()], vec![vehicle(), v8(), v6()]] {
        let context = context(definitions);

        assert_eq!(context.get_bean::<dyn Engine>().unwrap().cylinders(), 8);
        assert_eq!(context.get_bean::<Vehicle>().unwrap().engine.cylinders(), 8);

        let v6 = context
            .get_bean_qualified::<dyn Engine>(&Qualifier::named("v6Engine"))
            .unwrap();
        assert_eq!(v6.cylinders(), 6);

        let all: Vec<u32> = context
            .get_beans_of_type::<dyn Engine>()
            .unwrap()
            .iter()
            .map(|e| e.cylinders())
            .collect();
        assert_eq!(all, vec![6, 8]);
    }
}

#[test]
fn lowest_order_breaks_ties_without_primary() {
    let v8_plain = BeanDefinition::builder(|_| Ok(V8Engine))
        .exposes::<dyn Engine, _>(|e| e as Arc<dyn Engine>)
        .order(-1)
        .build();
    let context = context(vec![v6(), v8_plain]);

    assert_eq!(context.get_bean::<dyn Engine>().unwrap().cylinders(), 8);
}

#[test]
fn equal_candidates_are_not_unique() {
    let twin = || {
        BeanDefinition::builder(|_| Ok(V6Engine))
            .exposes::<dyn Engine, _>(|e| e as Arc<dyn Engine>)
    };
    let context = context(vec![twin().name("left").build(), twin().name("right").build()]);

    match context.get_bean::<dyn Engine>() {
        Err(ContainerError::NonUniqueBean { candidates, .. }) => {
            assert_eq!(candidates, vec!["left".to_string(), "right".to_string()]);
        }
        other => panic!("Expected NonUniqueBean, got {:?}", other.map(|e| e.cylinders())),
    }
}

#[test]
fn conditions_gate_single_and_collection_lookups() {
    let turbo = BeanDefinition::builder(|_| Ok(V8Engine))
        .exposes::<dyn Engine, _>(|e| e as Arc<dyn Engine>)
        .condition(Condition::property("engine.turbo", PropertyExpectation::Truthy))
        .build();
    let fallback = BeanDefinition::builder(|_| Ok(V6Engine))
        .exposes::<dyn Engine, _>(|e| e as Arc<dyn Engine>)
        .condition(Condition::on_missing_bean::<dyn Engine>())
        .build();

    let without = context(vec![turbo.clone(), fallback.clone()]);
    assert_eq!(without.get_bean::<dyn Engine>().unwrap().cylinders(), 6);
    assert_eq!(without.get_beans_of_type::<dyn Engine>().unwrap().len(), 1);

    let mut builder = ApplicationContext::builder();
    builder
        .add_property_source(Box::new(
            MapPropertySource::new("test").with_property("engine.turbo", "yes"),
        ))
        .definitions(vec![turbo, fallback]);
    let with = builder.build().unwrap();
    assert_eq!(with.get_bean::<dyn Engine>().unwrap().cylinders(), 8);
    assert_eq!(with.get_beans_of_type::<dyn Engine>().unwrap().len(), 1);
}

#[test]
fn first_registered_fallback_wins() {
    let v6_fallback = BeanDefinition::builder(|_| Ok(V6Engine))
        .exposes::<dyn Engine, _>(|e| e as Arc<dyn Engine>)
        .condition(Condition::on_missing_bean::<dyn Engine>())
        .build();
    let v8_fallback = BeanDefinition::builder(|_| Ok(V8Engine))
        .exposes::<dyn Engine, _>(|e| e as Arc<dyn Engine>)
        .condition(Condition::on_missing_bean::<dyn Engine>())
        .build();

    let ordered = context(vec![v6_fallback.clone(), v8_fallback.clone()]);
    assert_eq!(ordered.get_bean::<dyn Engine>().unwrap().cylinders(), 6);
    assert_eq!(ordered.get_beans_of_type::<dyn Engine>().unwrap().len(), 1);

    let reversed = context(vec![v8_fallback, v6_fallback]);
    assert_eq!(reversed.get_bean::<dyn Engine>().unwrap().cylinders(), 8);
}

#[test]
fn profile_conditions_follow_active_profiles() {
    struct DevTools;

    let definition = || {
        BeanDefinition::builder(|_| Ok(DevTools))
            .condition(Condition::profiles(["dev"]))
            .build()
    };

    let mut builder = ApplicationContext::builder();
    builder.active_profiles(vec!["dev".to_string()]).definition(definition());
    assert!(builder.build().unwrap().get_bean::<DevTools>().is_ok());

    let production = context(vec![definition()]);
    assert!(matches!(
        production.get_bean::<DevTools>(),
        Err(ContainerError::NoSuchBean { .. })
    ));
    assert!(matches!(production.find_bean::<DevTools>(None), Ok(None)));
}

struct Left {
    right: Provider<Right>,
}

struct Right {
    left: Arc<Left>,
}

struct Ping {
    _pong: Arc<Pong>,
}

struct Pong {
    _ping: Arc<Ping>,
}

#[test]
fn direct_cycle_is_reported() {
    let context = context(vec![
        BeanDefinition::builder(|ctx| Ok(Ping { _pong: ctx.get_bean()? })).build(),
        BeanDefinition::builder(|ctx| Ok(Pong { _ping: ctx.get_bean()? })).build(),
    ]);

    let err = context.get_bean::<Ping>().err().unwrap();
    assert!(err.is_circular(), "unexpected error: {}", err);
    assert!(context.get_bean::<Pong>().err().unwrap().is_circular());
}

#[test]
fn provider_breaks_cycle() {
    let context = context(vec![
        BeanDefinition::builder(|ctx| {
            Ok(Left {
                right: ctx.get_provider(None),
            })
        })
        .injection_point(InjectionPoint::constructor::<Right>("right").provider())
        .build(),
        BeanDefinition::builder(|ctx| Ok(Right { left: ctx.get_bean()? }))
            .injection_point(InjectionPoint::constructor::<Left>("left"))
            .build(),
    ]);

    context.validate_dependencies().unwrap();
    let left = context.get_bean::<Left>().unwrap();
    let right = left.right.get().unwrap();
    assert!(Arc::ptr_eq(&left, &right.left));
}

#[test]
fn dependents_are_destroyed_first() {
    struct Database;
    struct Repository {
        _db: Arc<Database>,
    }

    let log = Arc::new(Mutex::new(Vec::new()));
    let (db_log, repo_log) = (Arc::clone(&log), Arc::clone(&log));

    let context = context(vec![
        BeanDefinition::builder(|_| Ok(Database))
            .pre_destroy("close", move |_| {
                db_log.lock().push("database");
                Ok(())
            })
            .build(),
        BeanDefinition::builder(|ctx| Ok(Repository { _db: ctx.get_bean()? }))
            .pre_destroy("flush", move |_| {
                repo_log.lock().push("repository");
                Ok(())
            })
            .build(),
    ]);

    context.get_bean::<Database>().unwrap();
    context.get_bean::<Repository>().unwrap();
    context.close();

    assert_eq!(*log.lock(), vec!["repository", "database"]);
}

#[test]
fn failing_pre_destroy_does_not_abort_shutdown() {
    struct Fragile;
    struct Sturdy;

    let destroyed = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&destroyed);

    let context = context(vec![
        BeanDefinition::builder(|_| Ok(Fragile))
            .pre_destroy("explode", |_| Err(anyhow!("socket already closed").into()))
            .build(),
        BeanDefinition::builder(|_| Ok(Sturdy))
            .pre_destroy("stop", move |_| {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .build(),
    ]);

    context.initialize().unwrap();
    context.close();
    assert!(destroyed.load(Ordering::SeqCst));
}

#[test]
fn singleton_finished_after_close_is_destroyed() {
    struct Slow;

    let started = Arc::new(Barrier::new(2));
    let destroyed = Arc::new(AtomicUsize::new(0));
    let factory_started = Arc::clone(&started);
    let counter = Arc::clone(&destroyed);
    let context = context(vec![BeanDefinition::builder(move |_| {
        factory_started.wait();
        thread::sleep(Duration::from_millis(100));
        Ok(Slow)
    })
    .pre_destroy("release", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
    .build()]);

    let result = thread::scope(|s| {
        let creating = s.spawn(|| context.get_bean::<Slow>().map(|_| ()));
        started.wait();
        context.close();
        creating.join().unwrap()
    });

    assert!(matches!(result, Err(ContainerError::ContextClosed)));
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    assert_eq!(context.bean_factory().singleton_count(), 0);
}

#[test]
fn concurrent_singleton_creation_runs_factory_once() {
    struct Expensive;

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let context = context(vec![BeanDefinition::builder(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        Ok(Expensive)
    })
    .build()]);

    let barrier = Barrier::new(8);
    let instances: Vec<Arc<Expensive>> = thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    context.get_bean::<Expensive>().unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(instances.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
}

#[test]
fn cross_thread_cycle_is_reported_instead_of_deadlocking() {
    struct North {
        _south: Arc<South>,
    }
    struct South {
        _north: Arc<North>,
    }

    let barrier = Arc::new(Barrier::new(2));
    let (north_barrier, south_barrier) = (Arc::clone(&barrier), Arc::clone(&barrier));
    let north_waited = Arc::new(AtomicBool::new(false));
    let south_waited = Arc::new(AtomicBool::new(false));

    let context = context(vec![
        BeanDefinition::builder(move |ctx| {
            if !north_waited.swap(true, Ordering::SeqCst) {
                north_barrier.wait();
            }
            Ok(North { _south: ctx.get_bean()? })
        })
        .build(),
        BeanDefinition::builder(move |ctx| {
            if !south_waited.swap(true, Ordering::SeqCst) {
                south_barrier.wait();
            }
            Ok(South { _north: ctx.get_bean()? })
        })
        .build(),
    ]);

    let (north, south) = thread::scope(|s| {
        let north = s.spawn(|| context.get_bean::<North>().map(|_| ()));
        let south = s.spawn(|| context.get_bean::<South>().map(|_| ()));
        (north.join().unwrap(), south.join().unwrap())
    });

    assert!(north.err().unwrap().is_circular());
    assert!(south.err().unwrap().is_circular());
}

#[test]
fn failed_post_construct_is_retried() {
    struct Connection;

    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let context = context(vec![BeanDefinition::builder(|_| Ok(Connection))
        .post_construct("connect", move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(anyhow!("connection refused").into())
            } else {
                Ok(())
            }
        })
        .build()]);

    assert!(matches!(
        context.get_bean::<Connection>(),
        Err(ContainerError::BeanInstantiation { .. })
    ));
    assert!(context.get_bean::<Connection>().is_ok());
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[test]
fn request_scope_is_isolated_per_request() {
    struct RequestId(usize);
    struct Audit {
        _request: Arc<RequestId>,
    }

    let sequence = Arc::new(AtomicUsize::new(0));
    let destroyed = Arc::new(AtomicUsize::new(0));
    let (seq, counter) = (Arc::clone(&sequence), Arc::clone(&destroyed));

    let context = context(vec![
        BeanDefinition::builder(move |_| Ok(RequestId(seq.fetch_add(1, Ordering::SeqCst))))
            .scope(Scope::Request)
            .pre_destroy("end", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .build(),
        BeanDefinition::builder(|ctx| Ok(Audit { _request: ctx.get_bean()? })).build(),
    ]);

    assert!(matches!(
        context.get_bean::<RequestId>(),
        Err(ContainerError::ScopeNotActive { .. })
    ));

    let first = context.create_request_scope();
    let a = first.get_bean::<RequestId>().unwrap();
    let b = first.get_bean::<RequestId>().unwrap();
    assert!(Arc::ptr_eq(&a, &b));

    // 单例创建时看不到调用方的请求作用域
    assert!(first.get_bean::<Audit>().is_err());

    let second = context.create_request_scope();
    assert_ne!(second.get_bean::<RequestId>().unwrap().0, a.0);

    first.close();
    drop(second);
    assert_eq!(destroyed.load(Ordering::SeqCst), 2);
}

#[test]
fn created_listener_sees_exposed_type() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&seen);

    let mut builder = ApplicationContext::builder();
    builder
        .definitions(vec![v6(), v8()])
        .created_listener(Arc::new(OnBeanCreated::<dyn Engine, _>::new(move |engine, _| {
            recorder.lock().push(engine.cylinders());
            Ok(())
        })));
    let context = builder.build().unwrap();
    context.initialize().unwrap();

    let mut cylinders = seen.lock().clone();
    cylinders.sort();
    assert_eq!(cylinders, vec![6, 8]);
}

#[tokio::test]
async fn graceful_shutdown_isolates_failing_participant() {
    use trellis_core::futures::future::BoxFuture;
    use trellis_core::futures::FutureExt;

    struct Drainer(Arc<AtomicBool>);
    struct Stuck;

    impl GracefulShutdownCapable for Drainer {
        fn shutdown_gracefully(&self) -> ContainerResult<BoxFuture<'static, ()>> {
            let drained = Arc::clone(&self.0);
            Ok(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                drained.store(true, Ordering::SeqCst);
            }
            .boxed())
        }
    }

    impl GracefulShutdownCapable for Stuck {
        fn shutdown_gracefully(&self) -> ContainerResult<BoxFuture<'static, ()>> {
            Err(anyhow!("listener not bound").into())
        }
    }

    let drained = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&drained);
    let context = context(vec![
        BeanDefinition::builder(|_| Ok(Stuck))
            .exposes::<dyn GracefulShutdownCapable, _>(|s| s as Arc<dyn GracefulShutdownCapable>)
            .build(),
        BeanDefinition::builder(move |_| Ok(Drainer(Arc::clone(&flag))))
            .exposes::<dyn GracefulShutdownCapable, _>(|d| d as Arc<dyn GracefulShutdownCapable>)
            .build(),
    ]);
    context.initialize().unwrap();

    let report = context.shutdown().await;

    assert!(drained.load(Ordering::SeqCst));
    assert_eq!(report.outcomes.len(), 2);
    assert_eq!(report.failures().len(), 1);
    assert!(context.is_closed());
}
