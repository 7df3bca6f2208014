//! Bean 作用域与作用域存储
//!
//! 每个作用域存储按 [`BeanIdentifier`] 维护一个槽位，槽位本身就是该标识的互斥点：
//! 同一标识的并发首次请求只有一个线程执行创建，其余线程等待结果；
//! 不同标识之间互不阻塞。

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex};

use crate::bean::{BeanIdentifier, BeanRegistration};
use crate::error::{ContainerError, ContainerResult};
use crate::utils::dependency::CreationTracker;

/// Bean 的作用域
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Scope {
    /// 单例模式 - 容器中只有一个实例
    #[default]
    Singleton,

    /// 原型模式 - 每次请求都创建新实例
    Prototype,

    /// 请求作用域 - 每个请求一个实例，请求结束时销毁
    Request,

    /// 可刷新作用域 - 配置刷新时销毁并在下次访问时重建
    Refreshable,

    /// 自定义作用域，由注册的 [`CustomScope`] 提供存储
    Custom(String),
}

impl Scope {
    pub fn name(&self) -> &str {
        match self {
            Scope::Singleton => "singleton",
            Scope::Prototype => "prototype",
            Scope::Request => "request",
            Scope::Refreshable => "refreshable",
            Scope::Custom(name) => name,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err("Scope name must not be empty".to_string()),
            "singleton" => Ok(Scope::Singleton),
            "prototype" => Ok(Scope::Prototype),
            "request" => Ok(Scope::Request),
            "refreshable" | "refresh" => Ok(Scope::Refreshable),
            other => Ok(Scope::Custom(other.to_string())),
        }
    }
}

/// 自定义作用域
///
/// 返回当前上下文（例如当前会话、当前任务）对应的存储；
/// 返回 `None` 表示作用域当前不可用。
pub trait CustomScope: Send + Sync {
    fn name(&self) -> &str;

    fn current_store(&self) -> Option<Arc<ScopeStore>>;
}

enum SlotState {
    Empty,
    Creating(ThreadId),
    Ready(Arc<BeanRegistration>),
}

struct Slot {
    state: Mutex<SlotState>,
    ready: Condvar,
}

impl Slot {
    fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::Empty),
            ready: Condvar::new(),
        }
    }
}

/// 创建失败或 panic 时把槽位恢复为空，并唤醒等待的线程
struct CreationGuard<'a> {
    slot: &'a Slot,
    tracker: &'a CreationTracker<BeanIdentifier>,
    identifier: &'a BeanIdentifier,
    completed: bool,
}

impl Drop for CreationGuard<'_> {
    fn drop(&mut self) {
        self.tracker.finish_creating(self.identifier);
        if !self.completed {
            *self.slot.state.lock() = SlotState::Empty;
            self.slot.ready.notify_all();
        }
    }
}

/// 作用域存储：`BeanIdentifier -> BeanRegistration`
pub struct ScopeStore {
    name: String,
    slots: Mutex<HashMap<BeanIdentifier, Arc<Slot>>>,
}

impl ScopeStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn slot(&self, identifier: &BeanIdentifier) -> Arc<Slot> {
        let mut slots = self.slots.lock();
        Arc::clone(
            slots
                .entry(identifier.clone())
                .or_insert_with(|| Arc::new(Slot::new())),
        )
    }

    /// 返回已缓存的注册信息，或调用 `create` 创建
    ///
    /// - 当前线程重入同一标识：循环依赖
    /// - 其他线程正在创建：等待其完成；若等待会形成跨线程的等待环，则报告循环依赖
    /// - 创建失败：槽位恢复为空，下次请求会重新尝试
    pub fn get_or_create<F>(
        &self,
        identifier: &BeanIdentifier,
        tracker: &CreationTracker<BeanIdentifier>,
        create: F,
    ) -> ContainerResult<Arc<BeanRegistration>>
    where
        F: FnOnce() -> ContainerResult<Arc<BeanRegistration>>,
    {
        let slot = self.slot(identifier);
        let current = thread::current().id();

        {
            let mut state = slot.state.lock();
            loop {
                match &*state {
                    SlotState::Ready(registration) => {
                        tracing::trace!("Returning cached instance of bean '{}'", identifier);
                        return Ok(Arc::clone(registration));
                    }
                    SlotState::Empty => {
                        tracker
                            .start_creating(identifier)
                            .map_err(|chain| ContainerError::CircularDependency { chain })?;
                        *state = SlotState::Creating(current);
                        break;
                    }
                    SlotState::Creating(owner) if *owner == current => {
                        let mut chain = tracker.current_chain();
                        chain.push(identifier.to_string());
                        return Err(ContainerError::CircularDependency { chain });
                    }
                    SlotState::Creating(owner) => {
                        let owner = *owner;
                        tracker
                            .begin_wait(identifier, owner)
                            .map_err(|chain| ContainerError::CircularDependency { chain })?;
                        tracing::trace!(
                            "Waiting for another thread to finish creating bean '{}'",
                            identifier
                        );
                        slot.ready.wait(&mut state);
                        tracker.end_wait();
                    }
                }
            }
        }

        let mut guard = CreationGuard {
            slot: &slot,
            tracker,
            identifier,
            completed: false,
        };

        let registration = create()?;

        *slot.state.lock() = SlotState::Ready(Arc::clone(&registration));
        guard.completed = true;
        slot.ready.notify_all();
        drop(guard);

        Ok(registration)
    }

    /// 获取已创建的注册信息
    pub fn get(&self, identifier: &BeanIdentifier) -> Option<Arc<BeanRegistration>> {
        let slot = self.slots.lock().get(identifier).cloned()?;
        let state = slot.state.lock();
        match &*state {
            SlotState::Ready(registration) => Some(Arc::clone(registration)),
            _ => None,
        }
    }

    pub fn contains(&self, identifier: &BeanIdentifier) -> bool {
        self.get(identifier).is_some()
    }

    /// 移除已创建的注册信息
    pub fn remove(&self, identifier: &BeanIdentifier) -> Option<Arc<BeanRegistration>> {
        let slot = self.slots.lock().get(identifier).cloned()?;
        let mut state = slot.state.lock();
        match std::mem::replace(&mut *state, SlotState::Empty) {
            SlotState::Ready(registration) => Some(registration),
            other => {
                *state = other;
                None
            }
        }
    }

    /// 移除所有满足条件的已创建注册信息，按创建顺序返回
    pub fn drain_where<P>(&self, predicate: P) -> Vec<Arc<BeanRegistration>>
    where
        P: Fn(&BeanRegistration) -> bool,
    {
        let slots: Vec<Arc<Slot>> = self.slots.lock().values().cloned().collect();
        let mut drained = Vec::new();

        for slot in slots {
            let mut state = slot.state.lock();
            let matches = matches!(&*state, SlotState::Ready(registration) if predicate(registration));
            if matches {
                if let SlotState::Ready(registration) = std::mem::replace(&mut *state, SlotState::Empty) {
                    drained.push(registration);
                }
            }
        }

        drained.sort_by_key(|r| r.sequence());
        drained
    }

    /// 移除所有已创建的注册信息，按创建顺序返回
    pub fn drain(&self) -> Vec<Arc<BeanRegistration>> {
        self.drain_where(|_| true)
    }

    /// 所有已创建的注册信息，按创建顺序返回
    pub fn registrations(&self) -> Vec<Arc<BeanRegistration>> {
        let slots: Vec<Arc<Slot>> = self.slots.lock().values().cloned().collect();
        let mut result: Vec<Arc<BeanRegistration>> = slots
            .iter()
            .filter_map(|slot| match &*slot.state.lock() {
                SlotState::Ready(registration) => Some(Arc::clone(registration)),
                _ => None,
            })
            .collect();
        result.sort_by_key(|r| r.sequence());
        result
    }

    pub fn len(&self) -> usize {
        self.registrations().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ScopeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeStore")
            .field("name", &self.name)
            .field("slots", &self.slots.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bean::{BeanDefinition, TypeKey};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::time::Duration;

    struct Counter;

    fn registration(sequence: u64) -> Arc<BeanRegistration> {
        let definition = Arc::new(BeanDefinition::builder(|_| Ok(Counter)).build());
        Arc::new(BeanRegistration::new(
            definition.identifier(),
            Arc::clone(&definition),
            Arc::new(Counter),
            Vec::new(),
            sequence,
        ))
    }

    fn identifier(name: &str) -> BeanIdentifier {
        BeanIdentifier::new(TypeKey::of::<Counter>(), name)
    }

    #[test]
    fn test_scope_from_str() {
        assert_eq!("singleton".parse::<Scope>().unwrap(), Scope::Singleton);
        assert_eq!("prototype".parse::<Scope>().unwrap(), Scope::Prototype);
        assert_eq!("refresh".parse::<Scope>().unwrap(), Scope::Refreshable);
        assert_eq!(
            "session".parse::<Scope>().unwrap(),
            Scope::Custom("session".to_string())
        );
        assert!("".parse::<Scope>().is_err());
        assert_eq!(Scope::default(), Scope::Singleton);
    }

    #[test]
    fn test_get_or_create_caches() {
        let store = ScopeStore::new("singleton");
        let tracker = CreationTracker::new();
        let id = identifier("counter");
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            store
                .get_or_create(&id, &tracker, || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(registration(1))
                })
                .unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(store.contains(&id));
    }

    #[test]
    fn test_failed_creation_is_not_cached() {
        let store = ScopeStore::new("singleton");
        let tracker = CreationTracker::new();
        let id = identifier("counter");

        let first = store.get_or_create(&id, &tracker, || {
            Err(ContainerError::Other(anyhow::anyhow!("boom")))
        });
        assert!(first.is_err());
        assert!(!store.contains(&id));

        let second = store.get_or_create(&id, &tracker, || Ok(registration(2)));
        assert!(second.is_ok());
    }

    #[test]
    fn test_reentrant_creation_is_circular() {
        let store = ScopeStore::new("singleton");
        let tracker = CreationTracker::new();
        let id = identifier("counter");

        let result = store.get_or_create(&id, &tracker, || {
            store.get_or_create(&id, &tracker, || Ok(registration(1)))
        });

        match result {
            Err(ContainerError::CircularDependency { chain }) => {
                assert_eq!(chain, vec!["counter", "counter"]);
            }
            other => panic!("Expected circular dependency, got {:?}", other),
        }
        assert!(!store.contains(&id));
    }

    #[test]
    fn test_concurrent_creation_runs_once() {
        let store = ScopeStore::new("singleton");
        let tracker = CreationTracker::new();
        let id = identifier("counter");
        let calls = AtomicUsize::new(0);
        let barrier = Barrier::new(8);

        let results: Vec<Arc<BeanRegistration>> = thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        store
                            .get_or_create(&id, &tracker, || {
                                calls.fetch_add(1, Ordering::SeqCst);
                                thread::sleep(Duration::from_millis(20));
                                Ok(registration(1))
                            })
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn test_drain_returns_creation_order() {
        let store = ScopeStore::new("request");
        let tracker = CreationTracker::new();

        store.get_or_create(&identifier("b"), &tracker, || Ok(registration(2))).unwrap();
        store.get_or_create(&identifier("a"), &tracker, || Ok(registration(1))).unwrap();

        let drained = store.drain();
        assert_eq!(drained.iter().map(|r| r.sequence()).collect::<Vec<_>>(), vec![1, 2]);
        assert!(store.is_empty());
    }
}
