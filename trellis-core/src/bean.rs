//! Bean 元数据
//!
//! [`BeanDefinition`] 是注册阶段产生的不可变描述，容器只读取它；
//! [`BeanRegistration`] 是一个已创建的实例与其定义的绑定。

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

use crate::condition::Condition;
use crate::config::ConfigValue;
use crate::error::{ContainerError, ContainerResult};
use crate::injection::InjectionContext;
use crate::qualifier::Qualifier;
use crate::scope::Scope;
use crate::utils::naming;

/// 容器中保存的 Bean 实例
pub type BeanInstance = Arc<dyn Any + Send + Sync>;

/// 类型标识，支持 `dyn Trait` 等非 Sized 类型
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    /// 完整类型名
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// 去掉模块路径的类型名
    pub fn short_name(&self) -> String {
        naming::short_type_name(self.name)
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_name())
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_name())
    }
}

/// Bean 标识：(类型, 名称, 可选区分符)，作为作用域存储中的缓存键
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BeanIdentifier {
    bean_type: TypeKey,
    name: String,
    discriminator: Option<String>,
}

impl BeanIdentifier {
    pub fn new(bean_type: TypeKey, name: impl Into<String>) -> Self {
        Self {
            bean_type,
            name: name.into(),
            discriminator: None,
        }
    }

    pub fn with_discriminator(mut self, discriminator: impl Into<String>) -> Self {
        self.discriminator = Some(discriminator.into());
        self
    }

    pub fn bean_type(&self) -> TypeKey {
        self.bean_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn discriminator(&self) -> Option<&str> {
        self.discriminator.as_deref()
    }
}

impl fmt::Display for BeanIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.discriminator {
            Some(d) => write!(f, "{}#{}", self.name, d),
            None => write!(f, "{}", self.name),
        }
    }
}

type CastFn = Arc<dyn Fn(&BeanInstance) -> Option<Box<dyn Any + Send + Sync>> + Send + Sync>;

/// Bean 对外暴露的类型（自身类型或 trait object），以及把实例转换为该类型的函数
#[derive(Clone)]
pub struct ExposedType {
    key: TypeKey,
    type_args: Vec<TypeKey>,
    cast: CastFn,
}

impl ExposedType {
    fn concrete<T: Send + Sync + 'static>(type_args: Vec<TypeKey>) -> Self {
        let cast: CastFn = Arc::new(|instance: &BeanInstance| {
            Arc::clone(instance)
                .downcast::<T>()
                .ok()
                .map(|bean| Box::new(bean) as Box<dyn Any + Send + Sync>)
        });
        Self {
            key: TypeKey::of::<T>(),
            type_args,
            cast,
        }
    }

    fn via<T, I, F>(convert: F, type_args: Vec<TypeKey>) -> Self
    where
        T: Send + Sync + 'static,
        I: ?Sized + Send + Sync + 'static,
        F: Fn(Arc<T>) -> Arc<I> + Send + Sync + 'static,
    {
        let cast: CastFn = Arc::new(move |instance: &BeanInstance| {
            Arc::clone(instance)
                .downcast::<T>()
                .ok()
                .map(|bean| Box::new(convert(bean)) as Box<dyn Any + Send + Sync>)
        });
        Self {
            key: TypeKey::of::<I>(),
            type_args,
            cast,
        }
    }

    pub fn key(&self) -> TypeKey {
        self.key
    }

    /// 泛型参数（用于按类型参数限定）
    pub fn type_args(&self) -> &[TypeKey] {
        &self.type_args
    }
}

impl fmt::Debug for ExposedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExposedType")
            .field("key", &self.key)
            .field("type_args", &self.type_args)
            .finish()
    }
}

/// 注入点类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectionKind {
    Constructor,
    Field,
    Method,
}

/// 注入点包装方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InjectionWrapper {
    /// 直接注入单个 Bean
    Direct,
    /// 注入所有匹配的 Bean
    Collection,
    /// 延迟解析的 Provider
    Provider,
    /// 从配置中读取的值
    Value(String),
}

/// 注入点元数据
///
/// 工厂函数本身负责实际的解析，这里的描述用于启动时的依赖校验和诊断
#[derive(Debug, Clone)]
pub struct InjectionPoint {
    pub name: String,
    pub kind: InjectionKind,
    pub target: TypeKey,
    pub type_args: Vec<TypeKey>,
    pub qualifier: Option<Qualifier>,
    pub nullable: bool,
    pub wrapper: InjectionWrapper,
}

impl InjectionPoint {
    /// 构造函数参数注入点
    pub fn constructor<T: ?Sized + 'static>(name: impl Into<String>) -> Self {
        Self::new::<T>(name, InjectionKind::Constructor)
    }

    /// 字段注入点
    pub fn field<T: ?Sized + 'static>(name: impl Into<String>) -> Self {
        Self::new::<T>(name, InjectionKind::Field)
    }

    /// setter 方法注入点
    pub fn method<T: ?Sized + 'static>(name: impl Into<String>) -> Self {
        Self::new::<T>(name, InjectionKind::Method)
    }

    fn new<T: ?Sized + 'static>(name: impl Into<String>, kind: InjectionKind) -> Self {
        Self {
            name: name.into(),
            kind,
            target: TypeKey::of::<T>(),
            type_args: Vec::new(),
            qualifier: None,
            nullable: false,
            wrapper: InjectionWrapper::Direct,
        }
    }

    pub fn qualified(mut self, qualifier: Qualifier) -> Self {
        self.qualifier = Some(qualifier);
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn collection(mut self) -> Self {
        self.wrapper = InjectionWrapper::Collection;
        self
    }

    pub fn provider(mut self) -> Self {
        self.wrapper = InjectionWrapper::Provider;
        self
    }

    pub fn value(mut self, key: impl Into<String>) -> Self {
        self.wrapper = InjectionWrapper::Value(key.into());
        self
    }

    pub fn type_args(mut self, args: Vec<TypeKey>) -> Self {
        self.type_args = args;
        self
    }

    /// 是否需要在创建时立即解析到一个 Bean
    pub fn is_eager_required(&self) -> bool {
        self.wrapper == InjectionWrapper::Direct && !self.nullable
    }
}

/// 拦截器绑定：绑定名称、可选的方法名模式和声明时的属性
#[derive(Debug, Clone)]
pub struct InterceptorBinding {
    binding: String,
    members: Option<String>,
    attributes: Arc<HashMap<String, ConfigValue>>,
}

impl InterceptorBinding {
    pub fn new(binding: impl Into<String>) -> Self {
        Self {
            binding: binding.into(),
            members: None,
            attributes: Arc::new(HashMap::new()),
        }
    }

    /// 只拦截名称匹配 `pattern` 的方法
    pub fn members(mut self, pattern: impl Into<String>) -> Self {
        self.members = Some(pattern.into());
        self
    }

    pub fn attribute(mut self, key: impl Into<String>, value: ConfigValue) -> Self {
        Arc::make_mut(&mut self.attributes).insert(key.into(), value);
        self
    }

    pub fn binding(&self) -> &str {
        &self.binding
    }

    pub fn attributes(&self) -> &Arc<HashMap<String, ConfigValue>> {
        &self.attributes
    }

    /// 方法名匹配模式，`None` 表示拦截所有方法
    ///
    /// 支持 `*` 通配符、逗号分隔的多个模式以及 `regex:` 前缀的正则表达式
    pub fn member_pattern(&self) -> Option<&str> {
        self.members.as_deref()
    }
}

/// 字段 / setter 注入失败时的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InjectionFailurePolicy {
    /// 注入失败即 Bean 创建失败（默认）
    #[default]
    Propagate,
    /// 记录警告后忽略，需要显式开启
    Ignore,
}

pub(crate) type FactoryFn =
    Arc<dyn Fn(&InjectionContext<'_>) -> ContainerResult<Box<dyn Any + Send + Sync>> + Send + Sync>;
pub(crate) type FieldInjectorFn =
    Arc<dyn Fn(&mut (dyn Any + Send + Sync), &InjectionContext<'_>) -> ContainerResult<()> + Send + Sync>;
pub(crate) type PostConstructFn =
    Arc<dyn Fn(&mut (dyn Any + Send + Sync)) -> ContainerResult<()> + Send + Sync>;
pub(crate) type PreDestroyFn = Arc<dyn Fn(&BeanInstance) -> ContainerResult<()> + Send + Sync>;

fn factory_fn<F>(f: F) -> FactoryFn
where
    F: Fn(&InjectionContext<'_>) -> ContainerResult<Box<dyn Any + Send + Sync>> + Send + Sync + 'static,
{
    Arc::new(f)
}

fn field_injector_fn<F>(f: F) -> FieldInjectorFn
where
    F: Fn(&mut (dyn Any + Send + Sync), &InjectionContext<'_>) -> ContainerResult<()>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

fn post_construct_fn<F>(f: F) -> PostConstructFn
where
    F: Fn(&mut (dyn Any + Send + Sync)) -> ContainerResult<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

fn pre_destroy_fn<F>(f: F) -> PreDestroyFn
where
    F: Fn(&BeanInstance) -> ContainerResult<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

#[derive(Clone)]
pub(crate) enum InstanceSupplier {
    /// 通过工厂函数创建
    Factory(FactoryFn),
    /// 外部创建好的实例
    Shared(BeanInstance),
}

#[derive(Clone)]
pub(crate) struct FieldInjector {
    pub(crate) name: String,
    pub(crate) inject: FieldInjectorFn,
}

#[derive(Clone)]
pub(crate) struct PostConstructHook {
    pub(crate) name: String,
    pub(crate) callback: PostConstructFn,
}

#[derive(Clone)]
pub(crate) struct PreDestroyHook {
    pub(crate) name: String,
    pub(crate) callback: PreDestroyFn,
}

/// Bean 定义
///
/// 注册后不可变，由 [`BeanDefinitionRegistry`](crate::registry::BeanDefinitionRegistry) 共享持有。
/// 通过 [`BeanDefinition::builder`] 或 [`BeanDefinition::from_instance`] 创建。
#[derive(Clone)]
pub struct BeanDefinition {
    name: String,
    aliases: Vec<String>,
    stereotypes: Vec<String>,
    bean_type: TypeKey,
    exposed: Vec<ExposedType>,
    scope: Scope,
    primary: bool,
    order: i32,
    lazy: bool,
    discriminator: Option<String>,
    conditions: Vec<Condition>,
    injection_points: Vec<InjectionPoint>,
    supplier: InstanceSupplier,
    field_injectors: Vec<FieldInjector>,
    post_construct: Vec<PostConstructHook>,
    pre_destroy: Vec<PreDestroyHook>,
    interceptor_bindings: Vec<InterceptorBinding>,
    refresh_prefixes: Vec<String>,
    injection_failure_policy: InjectionFailurePolicy,
}

impl BeanDefinition {
    /// 使用工厂函数创建 Bean 定义构建器
    ///
    /// # 示例
    ///
    /// ```rust,ignore
    /// let definition = BeanDefinition::builder(|ctx| {
    ///     Ok(UserService::new(ctx.get_bean::<dyn UserRepository>()?))
    /// })
    /// .exposes::<dyn UserApi, _>(|service| service as Arc<dyn UserApi>)
    /// .build();
    /// ```
    pub fn builder<T, F>(factory: F) -> BeanDefinitionBuilder<T>
    where
        T: Send + Sync + 'static,
        F: Fn(&InjectionContext<'_>) -> ContainerResult<T> + Send + Sync + 'static,
    {
        let supplier = InstanceSupplier::Factory(factory_fn(move |ctx: &InjectionContext<'_>| {
            factory(ctx).map(|bean| Box::new(bean) as Box<dyn Any + Send + Sync>)
        }));
        BeanDefinitionBuilder::new(supplier)
    }

    /// 使用已有实例创建 Bean 定义构建器
    ///
    /// 外部实例总是单例，且不会执行 post-construct 回调
    pub fn from_instance<T: Send + Sync + 'static>(instance: Arc<T>) -> BeanDefinitionBuilder<T> {
        BeanDefinitionBuilder::new(InstanceSupplier::Shared(instance))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    /// 名称或别名是否匹配
    pub fn is_named(&self, name: &str) -> bool {
        self.name == name || self.aliases.iter().any(|a| a == name)
    }

    pub fn stereotypes(&self) -> &[String] {
        &self.stereotypes
    }

    pub fn bean_type(&self) -> TypeKey {
        self.bean_type
    }

    pub fn exposed_types(&self) -> &[ExposedType] {
        &self.exposed
    }

    pub fn exposed_type(&self, key: TypeKey) -> Option<&ExposedType> {
        self.exposed.iter().find(|e| e.key == key)
    }

    /// 是否可以按 `key` 类型查找到该 Bean
    pub fn exposes(&self, key: TypeKey) -> bool {
        self.exposed_type(key).is_some()
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub fn order(&self) -> i32 {
        self.order
    }

    pub fn is_lazy(&self) -> bool {
        self.lazy
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn injection_points(&self) -> &[InjectionPoint] {
        &self.injection_points
    }

    pub fn interceptor_bindings(&self) -> &[InterceptorBinding] {
        &self.interceptor_bindings
    }

    pub fn refresh_prefixes(&self) -> &[String] {
        &self.refresh_prefixes
    }

    pub fn injection_failure_policy(&self) -> InjectionFailurePolicy {
        self.injection_failure_policy
    }

    pub fn post_construct_hooks(&self) -> Vec<&str> {
        self.post_construct.iter().map(|h| h.name.as_str()).collect()
    }

    pub fn pre_destroy_hooks(&self) -> Vec<&str> {
        self.pre_destroy.iter().map(|h| h.name.as_str()).collect()
    }

    /// 该定义在作用域存储中的标识
    pub fn identifier(&self) -> BeanIdentifier {
        let id = BeanIdentifier::new(self.bean_type, self.name.clone());
        match &self.discriminator {
            Some(d) => id.with_discriminator(d.clone()),
            None => id,
        }
    }

    /// 配置键变化时，可刷新作用域的 Bean 是否需要重建
    ///
    /// 未声明前缀时，任何变化都会触发刷新
    pub fn refreshes_on(&self, keys: &[String]) -> bool {
        if self.refresh_prefixes.is_empty() || keys.is_empty() {
            return true;
        }
        keys.iter()
            .any(|key| self.refresh_prefixes.iter().any(|prefix| key.starts_with(prefix.as_str())))
    }

    /// 将实例转换为暴露的类型
    pub fn cast<T: ?Sized + Send + Sync + 'static>(&self, instance: &BeanInstance) -> Option<Arc<T>> {
        let exposed = self.exposed_type(TypeKey::of::<T>())?;
        (exposed.cast)(instance)
            .and_then(|boxed| boxed.downcast::<Arc<T>>().ok())
            .map(|arc| *arc)
    }

    pub(crate) fn supplier(&self) -> &InstanceSupplier {
        &self.supplier
    }

    pub(crate) fn field_injectors(&self) -> &[FieldInjector] {
        &self.field_injectors
    }

    pub(crate) fn post_construct(&self) -> &[PostConstructHook] {
        &self.post_construct
    }

    pub(crate) fn pre_destroy(&self) -> &[PreDestroyHook] {
        &self.pre_destroy
    }
}

impl fmt::Debug for BeanDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanDefinition")
            .field("name", &self.name)
            .field("bean_type", &self.bean_type)
            .field("exposed", &self.exposed.iter().map(|e| e.key).collect::<Vec<_>>())
            .field("scope", &self.scope)
            .field("primary", &self.primary)
            .field("order", &self.order)
            .field("lazy", &self.lazy)
            .field("conditions", &self.conditions.len())
            .field("interceptor_bindings", &self.interceptor_bindings)
            .finish()
    }
}

/// 类型安全的 Bean 定义构建器
pub struct BeanDefinitionBuilder<T> {
    definition: BeanDefinition,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> BeanDefinitionBuilder<T> {
    fn new(supplier: InstanceSupplier) -> Self {
        let bean_type = TypeKey::of::<T>();
        Self {
            definition: BeanDefinition {
                name: naming::default_bean_name(bean_type.name()),
                aliases: Vec::new(),
                stereotypes: Vec::new(),
                bean_type,
                exposed: vec![ExposedType::concrete::<T>(Vec::new())],
                scope: Scope::Singleton,
                primary: false,
                order: 0,
                lazy: false,
                discriminator: None,
                conditions: Vec::new(),
                injection_points: Vec::new(),
                supplier,
                field_injectors: Vec::new(),
                post_construct: Vec::new(),
                pre_destroy: Vec::new(),
                interceptor_bindings: Vec::new(),
                refresh_prefixes: Vec::new(),
                injection_failure_policy: InjectionFailurePolicy::Propagate,
            },
            _marker: PhantomData,
        }
    }

    /// 设置 Bean 名称（默认为类型名的 camelCase 形式）
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.definition.name = name.into();
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.definition.aliases.push(alias.into());
        self
    }

    /// 添加构造型标记，可通过 `Qualifier::Stereotype` 查找
    pub fn stereotype(mut self, stereotype: impl Into<String>) -> Self {
        self.definition.stereotypes.push(stereotype.into());
        self
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.definition.scope = scope;
        self
    }

    pub fn prototype(self) -> Self {
        self.scope(Scope::Prototype)
    }

    pub fn primary(mut self) -> Self {
        self.definition.primary = true;
        self
    }

    /// 排序值，越小越靠前
    pub fn order(mut self, order: i32) -> Self {
        self.definition.order = order;
        self
    }

    pub fn lazy(mut self, lazy: bool) -> Self {
        self.definition.lazy = lazy;
        self
    }

    pub fn discriminator(mut self, discriminator: impl Into<String>) -> Self {
        self.definition.discriminator = Some(discriminator.into());
        self
    }

    pub fn condition(mut self, condition: Condition) -> Self {
        self.definition.conditions.push(condition);
        self
    }

    pub fn injection_point(mut self, point: InjectionPoint) -> Self {
        self.definition.injection_points.push(point);
        self
    }

    /// 声明 Bean 自身类型的泛型参数
    pub fn type_args(mut self, args: Vec<TypeKey>) -> Self {
        if let Some(own) = self.definition.exposed.first_mut() {
            own.type_args = args;
        }
        self
    }

    /// 以另一个类型（通常是 trait object）暴露该 Bean
    pub fn exposes<I, F>(self, convert: F) -> Self
    where
        I: ?Sized + Send + Sync + 'static,
        F: Fn(Arc<T>) -> Arc<I> + Send + Sync + 'static,
    {
        self.exposes_with_args(Vec::new(), convert)
    }

    /// 以带泛型参数的类型暴露该 Bean，例如 `dyn Repository<User>` 的参数 `User`
    pub fn exposes_with_args<I, F>(mut self, type_args: Vec<TypeKey>, convert: F) -> Self
    where
        I: ?Sized + Send + Sync + 'static,
        F: Fn(Arc<T>) -> Arc<I> + Send + Sync + 'static,
    {
        let key = TypeKey::of::<I>();
        self.definition.exposed.retain(|e| e.key != key);
        self.definition
            .exposed
            .push(ExposedType::via::<T, I, F>(convert, type_args));
        self
    }

    /// 字段 / setter 注入，在实例创建后按声明顺序执行
    pub fn field<F>(mut self, name: impl Into<String>, inject: F) -> Self
    where
        F: Fn(&mut T, &InjectionContext<'_>) -> ContainerResult<()> + Send + Sync + 'static,
    {
        let name = name.into();
        let expected = self.definition.bean_type;
        self.definition.field_injectors.push(FieldInjector {
            name,
            inject: field_injector_fn(
                move |target: &mut (dyn Any + Send + Sync), ctx: &InjectionContext<'_>| {
                    let bean = target.downcast_mut::<T>().ok_or_else(|| mismatch(expected))?;
                    inject(bean, ctx)
                },
            ),
        });
        self
    }

    /// post-construct 回调，所有注入完成后按声明顺序执行
    pub fn post_construct<F>(mut self, name: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&mut T) -> ContainerResult<()> + Send + Sync + 'static,
    {
        let expected = self.definition.bean_type;
        self.definition.post_construct.push(PostConstructHook {
            name: name.into(),
            callback: post_construct_fn(move |target: &mut (dyn Any + Send + Sync)| {
                let bean = target.downcast_mut::<T>().ok_or_else(|| mismatch(expected))?;
                callback(bean)
            }),
        });
        self
    }

    /// pre-destroy 回调，销毁时按声明顺序执行
    pub fn pre_destroy<F>(mut self, name: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&T) -> ContainerResult<()> + Send + Sync + 'static,
    {
        let expected = self.definition.bean_type;
        self.definition.pre_destroy.push(PreDestroyHook {
            name: name.into(),
            callback: pre_destroy_fn(move |instance: &BeanInstance| {
                let bean = instance.downcast_ref::<T>().ok_or_else(|| mismatch(expected))?;
                callback(bean)
            }),
        });
        self
    }

    pub fn intercepted_by(mut self, binding: InterceptorBinding) -> Self {
        self.definition.interceptor_bindings.push(binding);
        self
    }

    /// 可刷新作用域：配置键以 `prefix` 开头时刷新
    pub fn refresh_on(mut self, prefix: impl Into<String>) -> Self {
        self.definition.refresh_prefixes.push(prefix.into());
        self
    }

    pub fn injection_failure_policy(mut self, policy: InjectionFailurePolicy) -> Self {
        self.definition.injection_failure_policy = policy;
        self
    }

    pub fn build(self) -> BeanDefinition {
        let mut definition = self.definition;
        if matches!(definition.supplier, InstanceSupplier::Shared(_)) {
            definition.scope = Scope::Singleton;
        }
        definition
    }
}

fn mismatch(expected: TypeKey) -> ContainerError {
    ContainerError::TypeMismatch {
        expected: expected.name().to_string(),
        found: "unknown".to_string(),
    }
}

/// 已创建的 Bean：实例与其定义、标识的绑定
pub struct BeanRegistration {
    identifier: BeanIdentifier,
    definition: Arc<BeanDefinition>,
    instance: BeanInstance,
    dependencies: Vec<BeanIdentifier>,
    sequence: u64,
    created_at: Instant,
}

impl BeanRegistration {
    pub(crate) fn new(
        identifier: BeanIdentifier,
        definition: Arc<BeanDefinition>,
        instance: BeanInstance,
        dependencies: Vec<BeanIdentifier>,
        sequence: u64,
    ) -> Self {
        Self {
            identifier,
            definition,
            instance,
            dependencies,
            sequence,
            created_at: Instant::now(),
        }
    }

    pub fn identifier(&self) -> &BeanIdentifier {
        &self.identifier
    }

    pub fn definition(&self) -> &Arc<BeanDefinition> {
        &self.definition
    }

    pub fn instance(&self) -> &BeanInstance {
        &self.instance
    }

    /// 创建该 Bean 时直接解析到的依赖
    pub fn dependencies(&self) -> &[BeanIdentifier] {
        &self.dependencies
    }

    /// 全局创建序号，越大越晚创建
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// 转换为任意暴露的类型
    pub fn cast<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.definition.cast::<T>(&self.instance)
    }

    pub(crate) fn cast_or_mismatch<T: ?Sized + Send + Sync + 'static>(&self) -> ContainerResult<Arc<T>> {
        self.cast::<T>().ok_or_else(|| ContainerError::TypeMismatch {
            expected: TypeKey::of::<T>().short_name(),
            found: self.definition.bean_type.short_name(),
        })
    }
}

impl fmt::Debug for BeanRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanRegistration")
            .field("identifier", &self.identifier)
            .field("bean_type", &self.definition.bean_type)
            .field("sequence", &self.sequence)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct EnglishGreeter;

    impl Greeter for EnglishGreeter {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    #[test]
    fn test_default_name_and_scope() {
        let definition = BeanDefinition::builder(|_| Ok(EnglishGreeter)).build();

        assert_eq!(definition.name(), "englishGreeter");
        assert_eq!(definition.scope(), &Scope::Singleton);
        assert!(!definition.is_primary());
        assert_eq!(definition.order(), 0);
        assert!(definition.exposes(TypeKey::of::<EnglishGreeter>()));
        assert!(!definition.exposes(TypeKey::of::<dyn Greeter>()));
    }

    #[test]
    fn test_cast_to_exposed_trait_object() {
        let definition = BeanDefinition::from_instance(Arc::new(EnglishGreeter))
            .exposes::<dyn Greeter, _>(|g| g as Arc<dyn Greeter>)
            .build();
        let instance: BeanInstance = Arc::new(EnglishGreeter);

        let greeter = definition.cast::<dyn Greeter>(&instance).unwrap();
        assert_eq!(greeter.greet(), "hello");
        assert!(definition.cast::<EnglishGreeter>(&instance).is_some());
        assert!(definition.cast::<String>(&instance).is_none());
    }

    #[test]
    fn test_shared_instance_is_always_singleton() {
        let definition = BeanDefinition::from_instance(Arc::new(EnglishGreeter))
            .prototype()
            .build();
        assert_eq!(definition.scope(), &Scope::Singleton);
    }

    #[test]
    fn test_identifier_includes_discriminator() {
        let definition = BeanDefinition::builder(|_| Ok(EnglishGreeter))
            .name("greeter")
            .discriminator("en")
            .build();
        let id = definition.identifier();

        assert_eq!(id.name(), "greeter");
        assert_eq!(id.discriminator(), Some("en"));
        assert_eq!(id.to_string(), "greeter#en");
    }

    #[test]
    fn test_refreshes_on_prefixes() {
        let any = BeanDefinition::builder(|_| Ok(EnglishGreeter)).build();
        assert!(any.refreshes_on(&["anything".to_string()]));

        let scoped = BeanDefinition::builder(|_| Ok(EnglishGreeter))
            .refresh_on("greeting.")
            .build();
        assert!(scoped.refreshes_on(&["greeting.language".to_string()]));
        assert!(!scoped.refreshes_on(&["database.url".to_string()]));
    }

    #[test]
    fn test_interceptor_binding_members() {
        let binding = InterceptorBinding::new("cache")
            .members("find*")
            .attribute("ttl", ConfigValue::Int(30));

        assert_eq!(binding.binding(), "cache");
        assert_eq!(binding.member_pattern(), Some("find*"));
        assert_eq!(InterceptorBinding::new("cache").member_pattern(), None);
        assert_eq!(binding.attributes().get("ttl").and_then(|v| v.as_i64()), Some(30));
    }

    #[test]
    fn test_lifecycle_hooks_keep_declaration_order() {
        let definition = BeanDefinition::builder(|_| Ok(EnglishGreeter))
            .post_construct("open", |_| Ok(()))
            .post_construct("warm_up", |_| Ok(()))
            .pre_destroy("close", |_| Ok(()))
            .build();

        assert_eq!(definition.post_construct_hooks(), vec!["open", "warm_up"]);
        assert_eq!(definition.pre_destroy_hooks(), vec!["close"]);
    }
}
