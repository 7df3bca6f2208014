//! Bean Factory - 核心容器
//!
//! 负责候选解析、按作用域缓存、实例化流水线（构造 -> 字段注入 -> post-construct ->
//! 创建监听器）、依赖记录以及按依赖关系的销毁。

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::bean::{
    BeanDefinition, BeanIdentifier, BeanInstance, BeanRegistration, InjectionFailurePolicy,
    InstanceSupplier, TypeKey,
};
use crate::condition::ConditionEvaluator;
use crate::config::Environment;
use crate::error::{ContainerError, ContainerResult};
use crate::injection::{BeanArguments, InjectionContext, Provider};
use crate::lifecycle::{
    listener_applies, BeanCreatedEvent, BeanCreatedEventListener, BeanPreDestroyEvent,
    BeanPreDestroyEventListener,
};
use crate::qualifier::Qualifier;
use crate::registry::BeanDefinitionRegistry;
use crate::resolution::CandidateResolver;
use crate::scope::{CustomScope, Scope, ScopeStore};
use crate::utils::dependency::{destruction_order, validate_dependency_graph, CreationTracker};

/// BeanFactory - 按名称访问 Bean 的基础接口
///
/// 不包含泛型方法，可以作为 trait object 使用
pub trait BeanFactory: Send + Sync {
    /// 通过名称或别名获取 Bean
    fn get_bean_by_name(&self, name: &str) -> ContainerResult<BeanInstance>;

    /// 检查是否包含指定名称的有效 Bean
    fn contains_bean_name(&self, name: &str) -> bool;

    /// 所有有效 Bean 的名称
    fn get_bean_names(&self) -> Vec<String>;
}

/// 原型创建时维护创建栈，panic 时同样会出栈
struct TrackingGuard<'a> {
    tracker: &'a CreationTracker<BeanIdentifier>,
    identifier: &'a BeanIdentifier,
}

impl Drop for TrackingGuard<'_> {
    fn drop(&mut self) {
        self.tracker.finish_creating(self.identifier);
    }
}

fn concrete_type_id(instance: &BeanInstance) -> TypeId {
    let any: &dyn Any = &**instance;
    any.type_id()
}

/// 默认的可列举 Bean 工厂
pub struct DefaultListableBeanFactory {
    registry: Arc<BeanDefinitionRegistry>,
    environment: Arc<Environment>,

    singletons: ScopeStore,
    refreshable: ScopeStore,
    custom_scopes: HashMap<String, Arc<dyn CustomScope>>,

    /// 正在创建的 Bean（用于检测循环依赖）
    tracker: CreationTracker<BeanIdentifier>,

    /// 创建之后通过 Provider 解析到的依赖
    late_dependencies: Mutex<HashMap<BeanIdentifier, Vec<BeanIdentifier>>>,

    created_listeners: Vec<Arc<dyn BeanCreatedEventListener>>,
    pre_destroy_listeners: Vec<Arc<dyn BeanPreDestroyEventListener>>,

    closed: AtomicBool,
    sequence: AtomicU64,
    self_ref: Weak<DefaultListableBeanFactory>,
}

impl DefaultListableBeanFactory {
    pub fn builder(registry: BeanDefinitionRegistry) -> BeanFactoryBuilder {
        BeanFactoryBuilder::new(registry)
    }

    pub fn registry(&self) -> &BeanDefinitionRegistry {
        &self.registry
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn shared_environment(&self) -> Arc<Environment> {
        Arc::clone(&self.environment)
    }

    pub(crate) fn downgrade(&self) -> Weak<DefaultListableBeanFactory> {
        Weak::clone(&self.self_ref)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> ContainerResult<()> {
        if self.is_closed() {
            Err(ContainerError::ContextClosed)
        } else {
            Ok(())
        }
    }

    fn resolver(&self) -> CandidateResolver<'_> {
        CandidateResolver::new(&self.registry, &self.environment)
    }

    // ========== 类型查找 ==========

    /// 获取唯一的 Bean
    pub fn get_bean<T: ?Sized + Send + Sync + 'static>(&self) -> ContainerResult<Arc<T>> {
        self.lookup::<T>(None, None)
    }

    pub fn get_bean_qualified<T: ?Sized + Send + Sync + 'static>(
        &self,
        qualifier: &Qualifier,
    ) -> ContainerResult<Arc<T>> {
        self.lookup::<T>(Some(qualifier), None)
    }

    /// 获取可选的 Bean，没有候选时返回 `Ok(None)`
    pub fn find_bean<T: ?Sized + Send + Sync + 'static>(
        &self,
        qualifier: Option<&Qualifier>,
    ) -> ContainerResult<Option<Arc<T>>> {
        self.resolve_registration::<T>(qualifier, None)?
            .map(|registration| registration.cast_or_mismatch::<T>())
            .transpose()
    }

    /// 获取所有匹配的 Bean，按 order 排序
    pub fn get_beans_of_type<T: ?Sized + Send + Sync + 'static>(&self) -> ContainerResult<Vec<Arc<T>>> {
        self.resolve_all(TypeKey::of::<T>(), None, None)?
            .iter()
            .map(|registration| registration.cast_or_mismatch::<T>())
            .collect()
    }

    pub fn get_provider<T: ?Sized + Send + Sync + 'static>(&self, qualifier: Option<Qualifier>) -> Provider<T> {
        Provider::detached(self.downgrade(), qualifier)
    }

    /// 使用显式参数创建新实例，不经过作用域缓存
    pub fn create_bean<T: ?Sized + Send + Sync + 'static>(
        &self,
        qualifier: Option<&Qualifier>,
        arguments: BeanArguments,
    ) -> ContainerResult<Arc<T>> {
        self.ensure_open()?;
        let definition = self.require_definition::<T>(qualifier)?;
        let identifier = definition.identifier();
        let registration = self.create_untracked(&definition, &identifier, None, Some(&arguments))?;
        registration.cast_or_mismatch::<T>()
    }

    pub fn get_bean_registration<T: ?Sized + Send + Sync + 'static>(
        &self,
        qualifier: Option<&Qualifier>,
    ) -> ContainerResult<Arc<BeanRegistration>> {
        self.resolve_registration::<T>(qualifier, None)?
            .ok_or_else(|| no_such_bean::<T>(qualifier))
    }

    pub fn get_bean_definition<T: ?Sized + 'static>(
        &self,
        qualifier: Option<&Qualifier>,
    ) -> ContainerResult<Arc<BeanDefinition>> {
        self.require_definition::<T>(qualifier)
    }

    pub fn get_bean_definitions<T: ?Sized + 'static>(&self) -> Vec<Arc<BeanDefinition>> {
        self.resolver().find_candidates(TypeKey::of::<T>(), None)
    }

    pub fn contains_bean<T: ?Sized + 'static>(&self) -> bool {
        !self.get_bean_definitions::<T>().is_empty()
    }

    /// 已经创建的单例（包括可刷新作用域），不会触发创建
    pub fn get_instantiated_beans_of_type<T: ?Sized + Send + Sync + 'static>(&self) -> Vec<Arc<T>> {
        self.live_registrations()
            .iter()
            .filter_map(|registration| registration.cast::<T>())
            .collect()
    }

    pub fn singleton_count(&self) -> usize {
        self.singletons.len()
    }

    fn lookup<T: ?Sized + Send + Sync + 'static>(
        &self,
        qualifier: Option<&Qualifier>,
        request: Option<&Arc<ScopeStore>>,
    ) -> ContainerResult<Arc<T>> {
        self.resolve_registration::<T>(qualifier, request)?
            .ok_or_else(|| no_such_bean::<T>(qualifier))?
            .cast_or_mismatch::<T>()
    }

    fn require_definition<T: ?Sized + 'static>(
        &self,
        qualifier: Option<&Qualifier>,
    ) -> ContainerResult<Arc<BeanDefinition>> {
        self.resolver()
            .resolve_unique(TypeKey::of::<T>(), qualifier)?
            .ok_or_else(|| no_such_bean::<T>(qualifier))
    }

    pub(crate) fn resolve_registration<T: ?Sized + 'static>(
        &self,
        qualifier: Option<&Qualifier>,
        request: Option<&Arc<ScopeStore>>,
    ) -> ContainerResult<Option<Arc<BeanRegistration>>> {
        self.ensure_open()?;
        tracing::trace!("Requesting bean of type '{}'", TypeKey::of::<T>());
        match self.resolver().resolve_unique(TypeKey::of::<T>(), qualifier)? {
            Some(definition) => self.registration_for(&definition, request).map(Some),
            None => Ok(None),
        }
    }

    pub(crate) fn resolve_all(
        &self,
        key: TypeKey,
        qualifier: Option<&Qualifier>,
        request: Option<&Arc<ScopeStore>>,
    ) -> ContainerResult<Vec<Arc<BeanRegistration>>> {
        self.ensure_open()?;
        self.resolver()
            .find_candidates(key, qualifier)
            .iter()
            .map(|definition| self.registration_for(definition, request))
            .collect()
    }

    // ========== 实例化 ==========

    /// 按作用域返回缓存的实例或创建新实例
    ///
    /// 单例、可刷新和自定义作用域的 Bean 创建时看不到调用方的请求作用域；
    /// 请求和原型作用域的 Bean 继承调用方的请求作用域。
    pub(crate) fn registration_for(
        &self,
        definition: &Arc<BeanDefinition>,
        request: Option<&Arc<ScopeStore>>,
    ) -> ContainerResult<Arc<BeanRegistration>> {
        self.ensure_open()?;
        let identifier = definition.identifier();

        match definition.scope() {
            Scope::Singleton => self
                .singletons
                .get_or_create(&identifier, &self.tracker, || {
                    tracing::debug!("Creating shared instance of singleton bean '{}'", identifier);
                    self.instantiate(definition, &identifier, None, None)
                })
                .and_then(|registration| self.discard_if_closed(&self.singletons, registration)),
            Scope::Refreshable => self
                .refreshable
                .get_or_create(&identifier, &self.tracker, || {
                    tracing::debug!("Creating refreshable bean '{}'", identifier);
                    self.instantiate(definition, &identifier, None, None)
                })
                .and_then(|registration| self.discard_if_closed(&self.refreshable, registration)),
            Scope::Request => {
                let store = request.ok_or_else(|| ContainerError::ScopeNotActive {
                    scope: Scope::Request.to_string(),
                    bean: definition.name().to_string(),
                })?;
                store.get_or_create(&identifier, &self.tracker, || {
                    tracing::debug!("Creating request scoped bean '{}'", identifier);
                    self.instantiate(definition, &identifier, Some(store), None)
                })
            }
            Scope::Prototype => self.create_untracked(definition, &identifier, request, None),
            Scope::Custom(name) => {
                let scope = self.custom_scopes.get(name).ok_or_else(|| ContainerError::UnknownScope {
                    scope: name.clone(),
                    bean: definition.name().to_string(),
                })?;
                let store = scope.current_store().ok_or_else(|| ContainerError::ScopeNotActive {
                    scope: name.clone(),
                    bean: definition.name().to_string(),
                })?;
                store.get_or_create(&identifier, &self.tracker, || {
                    tracing::debug!("Creating bean '{}' in scope '{}'", identifier, name);
                    self.instantiate(definition, &identifier, None, None)
                })
            }
        }
    }

    /// 创建期间工厂被关闭时，关闭流程看不到这个实例，由创建方负责销毁
    fn discard_if_closed(
        &self,
        store: &ScopeStore,
        registration: Arc<BeanRegistration>,
    ) -> ContainerResult<Arc<BeanRegistration>> {
        if !self.is_closed() {
            return Ok(registration);
        }
        if let Some(orphan) = store.remove(registration.identifier()) {
            tracing::debug!("Bean factory closed while creating '{}', destroying it", orphan.identifier());
            if let Err(e) = self.destroy_registration(&orphan) {
                tracing::warn!("{}", e);
            }
        }
        Err(ContainerError::ContextClosed)
    }

    /// 创建不缓存的实例（原型或显式参数创建）
    fn create_untracked(
        &self,
        definition: &Arc<BeanDefinition>,
        identifier: &BeanIdentifier,
        request: Option<&Arc<ScopeStore>>,
        arguments: Option<&BeanArguments>,
    ) -> ContainerResult<Arc<BeanRegistration>> {
        self.tracker
            .start_creating(identifier)
            .map_err(|chain| ContainerError::CircularDependency { chain })?;
        let _guard = TrackingGuard {
            tracker: &self.tracker,
            identifier,
        };
        tracing::debug!("Creating new instance of prototype bean '{}'", identifier);
        self.instantiate(definition, identifier, request, arguments)
    }

    fn instantiate(
        &self,
        definition: &Arc<BeanDefinition>,
        identifier: &BeanIdentifier,
        request: Option<&Arc<ScopeStore>>,
        arguments: Option<&BeanArguments>,
    ) -> ContainerResult<Arc<BeanRegistration>> {
        let name = definition.name();
        let context = InjectionContext::new(self, definition, identifier, request, arguments);

        let mut instance: BeanInstance = match definition.supplier() {
            InstanceSupplier::Shared(instance) => Arc::clone(instance),
            InstanceSupplier::Factory(factory) => {
                let mut bean = factory(&context).map_err(|e| ContainerError::instantiating(name, e))?;

                for injector in definition.field_injectors() {
                    if let Err(e) = (injector.inject)(&mut *bean, &context) {
                        match definition.injection_failure_policy() {
                            InjectionFailurePolicy::Propagate => {
                                return Err(ContainerError::instantiating(name, e));
                            }
                            InjectionFailurePolicy::Ignore => {
                                tracing::warn!(
                                    "Ignoring failed injection of '{}' into bean '{}': {}",
                                    injector.name,
                                    name,
                                    e
                                );
                            }
                        }
                    }
                }

                for hook in definition.post_construct() {
                    tracing::trace!("  ├─ post-construct '{}' on bean '{}'", hook.name, name);
                    (hook.callback)(&mut *bean).map_err(|e| ContainerError::instantiating(name, e))?;
                }

                Arc::from(bean)
            }
        };

        for listener in &self.created_listeners {
            if !listener_applies(listener.bean_type(), listener.qualifier().as_ref(), definition) {
                continue;
            }
            let event = BeanCreatedEvent::new(identifier.clone(), Arc::clone(definition), Arc::clone(&instance));
            let replacement = listener
                .on_created(&event)
                .map_err(|e| ContainerError::instantiating(name, e))?;
            if let Some(replacement) = replacement {
                if concrete_type_id(&replacement) != concrete_type_id(&instance) {
                    return Err(ContainerError::instantiating(
                        name,
                        ContainerError::TypeMismatch {
                            expected: definition.bean_type().short_name(),
                            found: "replacement of a different type".to_string(),
                        },
                    ));
                }
                tracing::debug!("Bean '{}' replaced by created listener", name);
                instance = replacement;
            }
        }

        let dependencies = context.take_dependencies();
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(
            "Bean '{}' created with {} dependency(ies), sequence {}",
            identifier,
            dependencies.len(),
            sequence
        );

        Ok(Arc::new(BeanRegistration::new(
            identifier.clone(),
            Arc::clone(definition),
            instance,
            dependencies,
            sequence,
        )))
    }

    /// 记录创建之后通过 Provider 解析到的依赖，原型 Bean 不参与销毁排序
    pub(crate) fn record_late_dependency(&self, owner: &BeanIdentifier, registration: &BeanRegistration) {
        if registration.definition().scope() == &Scope::Prototype || registration.identifier() == owner {
            return;
        }
        let mut late = self.late_dependencies.lock();
        let deps = late.entry(owner.clone()).or_default();
        if !deps.contains(registration.identifier()) {
            deps.push(registration.identifier().clone());
        }
    }

    /// 预先创建所有非延迟的有效单例
    pub fn preinstantiate_singletons(&self) -> ContainerResult<usize> {
        let evaluator = ConditionEvaluator::new(&self.registry, &self.environment);
        let eager: Vec<&Arc<BeanDefinition>> = self
            .registry
            .definitions()
            .iter()
            .filter(|d| d.scope() == &Scope::Singleton && !d.is_lazy())
            .filter(|d| evaluator.is_eligible(d))
            .collect();

        tracing::debug!("Pre-instantiating {} singleton bean(s)", eager.len());
        for definition in &eager {
            self.registration_for(definition, None)?;
        }
        Ok(eager.len())
    }

    /// 根据注入点元数据校验依赖：缺失的必需依赖以及没有被 Provider 打断的循环
    pub fn validate_dependencies(&self) -> ContainerResult<()> {
        let evaluator = ConditionEvaluator::new(&self.registry, &self.environment);
        let resolver = self.resolver();
        let mut graph: HashMap<String, Vec<String>> = HashMap::new();

        for definition in self.registry.definitions() {
            if !evaluator.is_eligible(definition) {
                continue;
            }
            let mut deps = Vec::new();
            for point in definition.injection_points().iter().filter(|p| p.is_eager_required()) {
                match resolver.resolve_unique(point.target, point.qualifier.as_ref())? {
                    Some(dependency) => deps.push(dependency.name().to_string()),
                    None => deps.push(point.target.name().to_string()),
                }
            }
            graph.insert(definition.name().to_string(), deps);
        }

        validate_dependency_graph(&graph)
            .map_err(|e| ContainerError::DependencyValidationFailed(e.to_string()))?;
        tracing::debug!("Dependency validation passed for {} bean(s)", graph.len());
        Ok(())
    }

    // ========== 作用域 ==========

    /// 打开一个请求作用域
    pub fn create_request_scope(self: &Arc<Self>) -> RequestScope {
        RequestScope {
            factory: Arc::clone(self),
            store: Arc::new(ScopeStore::new(Scope::Request.name())),
            closed: AtomicBool::new(false),
        }
    }

    /// 销毁配置键变化影响到的可刷新 Bean，下次访问时重新创建
    pub fn refresh(&self, keys: &[String]) -> Vec<BeanIdentifier> {
        let drained = self.refreshable.drain_where(|r| r.definition().refreshes_on(keys));
        let refreshed: Vec<BeanIdentifier> = drained.iter().map(|r| r.identifier().clone()).collect();

        let failures = self.destroy_registrations(drained);
        if !failures.is_empty() {
            tracing::warn!(
                "{} refreshable bean(s) failed to destroy cleanly: {}",
                failures.len(),
                failures.join("; ")
            );
        }
        tracing::info!("Refreshed {} bean(s)", refreshed.len());
        refreshed
    }

    // ========== 销毁 ==========

    /// 销毁指定的 Bean 实例，返回是否找到
    ///
    /// 查找单例、可刷新以及各自定义作用域的当前存储。请求作用域的 Bean
    /// 属于各自的 [`RequestScope`]，由 [`RequestScope::close`] 销毁，这里返回 `Ok(false)`。
    pub fn destroy_bean(&self, identifier: &BeanIdentifier) -> ContainerResult<bool> {
        let removed = self
            .singletons
            .remove(identifier)
            .or_else(|| self.refreshable.remove(identifier))
            .or_else(|| {
                self.custom_scopes
                    .values()
                    .filter_map(|scope| scope.current_store())
                    .find_map(|store| store.remove(identifier))
            });

        match removed {
            Some(registration) => {
                self.destroy_registration(&registration)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// 执行销毁前监听器和 pre-destroy 回调
    ///
    /// 单个回调失败不影响后续回调，所有失败汇总为一个 `BeanDestruction` 错误
    pub fn destroy_registration(&self, registration: &BeanRegistration) -> ContainerResult<()> {
        let definition = registration.definition();
        let mut failures = Vec::new();

        for listener in &self.pre_destroy_listeners {
            if !listener_applies(listener.bean_type(), None, definition) {
                continue;
            }
            let event = BeanPreDestroyEvent::new(
                registration.identifier().clone(),
                Arc::clone(definition),
                Arc::clone(registration.instance()),
            );
            if let Err(e) = listener.on_pre_destroy(&event) {
                failures.push(format!("listener: {}", e));
            }
        }

        for hook in definition.pre_destroy() {
            tracing::trace!("  ├─ pre-destroy '{}' on bean '{}'", hook.name, registration.identifier());
            if let Err(e) = (hook.callback)(registration.instance()) {
                failures.push(format!("{}: {}", hook.name, e));
            }
        }

        self.late_dependencies.lock().remove(registration.identifier());

        if failures.is_empty() {
            tracing::debug!("Bean '{}' destroyed successfully", registration.identifier());
            Ok(())
        } else {
            Err(ContainerError::BeanDestruction {
                bean: registration.identifier().to_string(),
                message: failures.join("; "),
            })
        }
    }

    /// 销毁一个作用域存储中的所有 Bean，返回失败信息
    pub fn destroy_scope_store(&self, store: &ScopeStore) -> Vec<String> {
        self.destroy_registrations(store.drain())
    }

    /// 依赖方先于被依赖方销毁；存在循环时回退到逆创建顺序
    fn destroy_registrations(&self, registrations: Vec<Arc<BeanRegistration>>) -> Vec<String> {
        if registrations.is_empty() {
            return Vec::new();
        }

        let created: Vec<BeanIdentifier> = registrations.iter().map(|r| r.identifier().clone()).collect();
        let mut dependencies: HashMap<BeanIdentifier, Vec<BeanIdentifier>> = HashMap::new();
        {
            let late = self.late_dependencies.lock();
            for registration in &registrations {
                let mut deps = registration.dependencies().to_vec();
                if let Some(extra) = late.get(registration.identifier()) {
                    deps.extend(extra.iter().cloned());
                }
                dependencies.insert(registration.identifier().clone(), deps);
            }
        }

        let (order, cyclic) = destruction_order(&created, &dependencies);
        if !cyclic.is_empty() {
            tracing::warn!(
                "Circular dependencies among [{}], destroying them in reverse creation order",
                cyclic.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
            );
        }

        let by_id: HashMap<BeanIdentifier, Arc<BeanRegistration>> = registrations
            .into_iter()
            .map(|r| (r.identifier().clone(), r))
            .collect();

        let mut failures = Vec::new();
        for identifier in order {
            if let Some(registration) = by_id.get(&identifier) {
                if let Err(e) = self.destroy_registration(registration) {
                    tracing::warn!("{}", e);
                    failures.push(e.to_string());
                }
            }
        }
        failures
    }

    fn live_registrations(&self) -> Vec<Arc<BeanRegistration>> {
        let mut all = self.singletons.registrations();
        all.extend(self.refreshable.registrations());
        all.sort_by_key(|r| r.sequence());
        all
    }

    /// 关闭工厂并销毁所有单例和可刷新 Bean
    ///
    /// 尽力而为：销毁失败只记录日志并汇总为一条警告
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        tracing::info!("Destroying singleton beans");
        let mut all = self.singletons.drain();
        all.extend(self.refreshable.drain());
        all.sort_by_key(|r| r.sequence());
        let count = all.len();

        let failures = self.destroy_registrations(all);
        if failures.is_empty() {
            tracing::info!("Destroyed {} bean(s)", count);
        } else {
            tracing::warn!(
                "Destroyed {} bean(s), {} failed: {}",
                count,
                failures.len(),
                failures.join("; ")
            );
        }
    }
}

impl BeanFactory for DefaultListableBeanFactory {
    fn get_bean_by_name(&self, name: &str) -> ContainerResult<BeanInstance> {
        self.ensure_open()?;
        let evaluator = ConditionEvaluator::new(&self.registry, &self.environment);
        let definition = self
            .registry
            .get_by_name(name)
            .filter(|d| evaluator.is_eligible(d))
            .ok_or_else(|| ContainerError::NoSuchBean {
                bean_type: "any".to_string(),
                qualifier: Some(Qualifier::named(name).to_string()),
            })?;
        let registration = self.registration_for(definition, None)?;
        Ok(Arc::clone(registration.instance()))
    }

    fn contains_bean_name(&self, name: &str) -> bool {
        let evaluator = ConditionEvaluator::new(&self.registry, &self.environment);
        self.registry
            .get_by_name(name)
            .map(|d| evaluator.is_eligible(d))
            .unwrap_or(false)
    }

    fn get_bean_names(&self) -> Vec<String> {
        let evaluator = ConditionEvaluator::new(&self.registry, &self.environment);
        self.registry
            .definitions()
            .iter()
            .filter(|d| evaluator.is_eligible(d))
            .map(|d| d.name().to_string())
            .collect()
    }
}

impl fmt::Debug for DefaultListableBeanFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultListableBeanFactory")
            .field("definitions", &self.registry.len())
            .field("singletons", &self.singletons.len())
            .field("custom_scopes", &self.custom_scopes.keys().collect::<Vec<_>>())
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn no_such_bean<T: ?Sized + 'static>(qualifier: Option<&Qualifier>) -> ContainerError {
    ContainerError::NoSuchBean {
        bean_type: TypeKey::of::<T>().short_name(),
        qualifier: qualifier.map(ToString::to_string),
    }
}

/// Bean 工厂构建器
pub struct BeanFactoryBuilder {
    registry: BeanDefinitionRegistry,
    environment: Arc<Environment>,
    custom_scopes: HashMap<String, Arc<dyn CustomScope>>,
    created_listeners: Vec<Arc<dyn BeanCreatedEventListener>>,
    pre_destroy_listeners: Vec<Arc<dyn BeanPreDestroyEventListener>>,
}

impl BeanFactoryBuilder {
    pub fn new(registry: BeanDefinitionRegistry) -> Self {
        Self {
            registry,
            environment: Arc::new(Environment::new()),
            custom_scopes: HashMap::new(),
            created_listeners: Vec::new(),
            pre_destroy_listeners: Vec::new(),
        }
    }

    pub fn environment(mut self, environment: Arc<Environment>) -> Self {
        self.environment = environment;
        self
    }

    pub fn register_scope(mut self, scope: Arc<dyn CustomScope>) -> Self {
        self.custom_scopes.insert(scope.name().to_string(), scope);
        self
    }

    pub fn created_listener(mut self, listener: Arc<dyn BeanCreatedEventListener>) -> Self {
        self.created_listeners.push(listener);
        self
    }

    pub fn pre_destroy_listener(mut self, listener: Arc<dyn BeanPreDestroyEventListener>) -> Self {
        self.pre_destroy_listeners.push(listener);
        self
    }

    pub fn build(self) -> Arc<DefaultListableBeanFactory> {
        let mut created_listeners = self.created_listeners;
        created_listeners.sort_by_key(|l| l.order());
        let mut pre_destroy_listeners = self.pre_destroy_listeners;
        pre_destroy_listeners.sort_by_key(|l| l.order());

        tracing::debug!(
            "Bean factory built: {} definition(s), {} custom scope(s), {} lifecycle listener(s)",
            self.registry.len(),
            self.custom_scopes.len(),
            created_listeners.len() + pre_destroy_listeners.len()
        );

        let registry = Arc::new(self.registry);
        let environment = self.environment;
        let custom_scopes = self.custom_scopes;

        Arc::new_cyclic(|self_ref| DefaultListableBeanFactory {
            registry,
            environment,
            singletons: ScopeStore::new(Scope::Singleton.name()),
            refreshable: ScopeStore::new(Scope::Refreshable.name()),
            custom_scopes,
            tracker: CreationTracker::new(),
            late_dependencies: Mutex::new(HashMap::new()),
            created_listeners,
            pre_destroy_listeners,
            closed: AtomicBool::new(false),
            sequence: AtomicU64::new(1),
            self_ref: Weak::clone(self_ref),
        })
    }
}

/// 请求作用域句柄
///
/// 在该句柄上解析的请求作用域 Bean 属于这次请求；关闭（或 drop）时按依赖顺序销毁
pub struct RequestScope {
    factory: Arc<DefaultListableBeanFactory>,
    store: Arc<ScopeStore>,
    closed: AtomicBool,
}

impl RequestScope {
    pub fn get_bean<T: ?Sized + Send + Sync + 'static>(&self) -> ContainerResult<Arc<T>> {
        self.factory.lookup::<T>(None, Some(&self.store))
    }

    pub fn get_bean_qualified<T: ?Sized + Send + Sync + 'static>(
        &self,
        qualifier: &Qualifier,
    ) -> ContainerResult<Arc<T>> {
        self.factory.lookup::<T>(Some(qualifier), Some(&self.store))
    }

    pub fn find_bean<T: ?Sized + Send + Sync + 'static>(
        &self,
        qualifier: Option<&Qualifier>,
    ) -> ContainerResult<Option<Arc<T>>> {
        self.factory
            .resolve_registration::<T>(qualifier, Some(&self.store))?
            .map(|registration| registration.cast_or_mismatch::<T>())
            .transpose()
    }

    /// 当前请求中已创建的 Bean 数量
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let failures = self.factory.destroy_scope_store(&self.store);
        if !failures.is_empty() {
            tracing::warn!(
                "{} request scoped bean(s) failed to destroy: {}",
                failures.len(),
                failures.join("; ")
            );
        }
    }
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        self.close();
    }
}
