//! 条件装配
//!
//! 条件是候选定义、定义注册表和环境上的纯谓词。一个定义的全部条件都满足时，
//! 它才会成为解析候选。求值结果不跨查找缓存。

use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::bean::{BeanDefinition, TypeKey};
use crate::config::{Environment, OsFamily};
use crate::registry::BeanDefinitionRegistry;

/// 自定义条件
pub trait ConditionPredicate: Send + Sync {
    fn matches(&self, context: &ConditionContext<'_>) -> bool;

    /// 诊断日志中使用的描述
    fn describe(&self) -> String {
        "custom".to_string()
    }
}

impl<F> ConditionPredicate for F
where
    F: Fn(&ConditionContext<'_>) -> bool + Send + Sync,
{
    fn matches(&self, context: &ConditionContext<'_>) -> bool {
        self(context)
    }
}

/// 对配置值的期望
#[derive(Debug, Clone)]
pub enum PropertyExpectation {
    Present,
    Absent,
    Equals(String),
    NotEquals(String),
    /// true / yes / on / 1
    Truthy,
    Pattern(Regex),
}

/// 内置条件
#[derive(Clone)]
pub enum Condition {
    /// 所有类型都可用
    ClassPresent(Vec<String>),
    /// 所有类型都不可用
    ClassMissing(Vec<String>),
    /// 存在另一个有效的、暴露该类型的定义
    BeanPresent(TypeKey),
    /// 不存在另一个有效的、暴露该类型的定义
    MissingBean(TypeKey),
    Property {
        name: String,
        expectation: PropertyExpectation,
        default_value: Option<String>,
    },
    /// 任一 profile 处于激活状态
    Environments(Vec<String>),
    /// 所有 profile 都未激活
    NotEnvironments(Vec<String>),
    Os(Vec<OsFamily>),
    Custom(Arc<dyn ConditionPredicate>),
    All(Vec<Condition>),
    Any(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    pub fn on_class(name: impl Into<String>) -> Self {
        Condition::ClassPresent(vec![name.into()])
    }

    pub fn on_missing_class(name: impl Into<String>) -> Self {
        Condition::ClassMissing(vec![name.into()])
    }

    pub fn on_bean<T: ?Sized + 'static>() -> Self {
        Condition::BeanPresent(TypeKey::of::<T>())
    }

    pub fn on_missing_bean<T: ?Sized + 'static>() -> Self {
        Condition::MissingBean(TypeKey::of::<T>())
    }

    pub fn property(name: impl Into<String>, expectation: PropertyExpectation) -> Self {
        Condition::Property {
            name: name.into(),
            expectation,
            default_value: None,
        }
    }

    pub fn property_equals(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::property(name, PropertyExpectation::Equals(value.into()))
    }

    /// 设置配置缺失时使用的默认值，仅对 `Property` 条件生效
    pub fn with_default(self, value: impl Into<String>) -> Self {
        match self {
            Condition::Property {
                name, expectation, ..
            } => Condition::Property {
                name,
                expectation,
                default_value: Some(value.into()),
            },
            other => other,
        }
    }

    pub fn profiles<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Condition::Environments(names.into_iter().map(Into::into).collect())
    }

    pub fn not_profiles<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Condition::NotEnvironments(names.into_iter().map(Into::into).collect())
    }

    pub fn custom<P: ConditionPredicate + 'static>(predicate: P) -> Self {
        Condition::Custom(Arc::new(predicate))
    }

    pub fn negate(self) -> Self {
        Condition::Not(Box::new(self))
    }

    /// 是否要求不存在 `key` 类型的 Bean（顶层或 `All` 内）
    fn guards_missing(&self, key: TypeKey) -> bool {
        match self {
            Condition::MissingBean(k) => *k == key,
            Condition::All(all) => all.iter().any(|c| c.guards_missing(key)),
            _ => false,
        }
    }

    /// 在给定上下文中求值
    pub fn matches(&self, context: &ConditionContext<'_>) -> bool {
        let environment = context.environment();
        match self {
            Condition::ClassPresent(names) => names.iter().all(|n| context.is_type_present(n)),
            Condition::ClassMissing(names) => !names.iter().any(|n| context.is_type_present(n)),
            Condition::BeanPresent(key) => context.is_bean_present(*key),
            Condition::MissingBean(key) => !context.is_bean_present(*key),
            Condition::Property {
                name,
                expectation,
                default_value,
            } => {
                let value = environment.get_string(name).or_else(|| default_value.clone());
                match (expectation, value) {
                    (PropertyExpectation::Absent, value) => value.is_none(),
                    (_, None) => false,
                    (PropertyExpectation::Present, Some(_)) => true,
                    (PropertyExpectation::Equals(expected), Some(v)) => &v == expected,
                    (PropertyExpectation::NotEquals(expected), Some(v)) => &v != expected,
                    (PropertyExpectation::Truthy, Some(v)) => matches!(
                        v.trim().to_lowercase().as_str(),
                        "true" | "yes" | "on" | "1"
                    ),
                    (PropertyExpectation::Pattern(regex), Some(v)) => regex.is_match(&v),
                }
            }
            Condition::Environments(names) => names.iter().any(|n| environment.accepts_profiles(n)),
            Condition::NotEnvironments(names) => !names.iter().any(|n| environment.accepts_profiles(n)),
            Condition::Os(families) => families.contains(&environment.os_family()),
            Condition::Custom(predicate) => predicate.matches(context),
            Condition::All(all) => all.iter().all(|c| c.matches(context)),
            Condition::Any(any) => any.iter().any(|c| c.matches(context)),
            Condition::Not(inner) => !inner.matches(context),
        }
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::ClassPresent(names) => write!(f, "ClassPresent({:?})", names),
            Condition::ClassMissing(names) => write!(f, "ClassMissing({:?})", names),
            Condition::BeanPresent(key) => write!(f, "BeanPresent({})", key),
            Condition::MissingBean(key) => write!(f, "MissingBean({})", key),
            Condition::Property {
                name,
                expectation,
                default_value,
            } => f
                .debug_struct("Property")
                .field("name", name)
                .field("expectation", expectation)
                .field("default_value", default_value)
                .finish(),
            Condition::Environments(names) => write!(f, "Environments({:?})", names),
            Condition::NotEnvironments(names) => write!(f, "NotEnvironments({:?})", names),
            Condition::Os(families) => write!(f, "Os({:?})", families),
            Condition::Custom(predicate) => write!(f, "Custom({})", predicate.describe()),
            Condition::All(all) => f.debug_tuple("All").field(all).finish(),
            Condition::Any(any) => f.debug_tuple("Any").field(any).finish(),
            Condition::Not(inner) => f.debug_tuple("Not").field(inner).finish(),
        }
    }
}

/// 条件求值器
///
/// 只在一次查找内使用。`BeanPresent` / `MissingBean` 会递归求值其他定义的条件，
/// 正在求值中的定义视为不存在，避免互相引用的条件无限递归。
pub struct ConditionEvaluator<'a> {
    registry: &'a BeanDefinitionRegistry,
    environment: &'a Environment,
    in_progress: RefCell<Vec<String>>,
}

impl<'a> ConditionEvaluator<'a> {
    pub fn new(registry: &'a BeanDefinitionRegistry, environment: &'a Environment) -> Self {
        Self {
            registry,
            environment,
            in_progress: RefCell::new(Vec::new()),
        }
    }

    /// 定义的所有条件是否都满足
    pub fn is_eligible(&self, definition: &BeanDefinition) -> bool {
        if definition.conditions().is_empty() {
            return true;
        }
        if self.in_progress.borrow().iter().any(|n| n == definition.name()) {
            return false;
        }

        self.in_progress.borrow_mut().push(definition.name().to_string());
        let context = ConditionContext {
            evaluator: self,
            definition,
        };
        let mut failures = Vec::new();
        for condition in definition.conditions() {
            if !condition.matches(&context) {
                failures.push(format!("{:?}", condition));
            }
        }
        self.in_progress.borrow_mut().pop();

        if failures.is_empty() {
            true
        } else {
            tracing::debug!(
                "Bean '{}' skipped, unmet conditions: {}",
                definition.name(),
                failures.join(", ")
            );
            false
        }
    }
}

/// 条件求值上下文
pub struct ConditionContext<'a> {
    evaluator: &'a ConditionEvaluator<'a>,
    definition: &'a BeanDefinition,
}

impl<'a> ConditionContext<'a> {
    /// 正在求值的候选定义
    pub fn definition(&self) -> &BeanDefinition {
        self.definition
    }

    pub fn registry(&self) -> &BeanDefinitionRegistry {
        self.evaluator.registry
    }

    pub fn environment(&self) -> &Environment {
        self.evaluator.environment
    }

    /// 类型是否可用：环境中声明过，或由某个已注册定义暴露
    pub fn is_type_present(&self, type_name: &str) -> bool {
        if self.environment().is_type_available(type_name) {
            return true;
        }
        self.registry().definitions().iter().any(|definition| {
            definition.exposed_types().iter().any(|exposed| {
                exposed.key().name() == type_name || exposed.key().short_name() == type_name
            })
        })
    }

    /// 除当前定义外，是否存在暴露 `key` 的有效定义
    ///
    /// 多个暴露同一类型的后备定义都以 `MissingBean(key)` 为条件时，先注册的生效：
    /// 后备定义只把注册在它之前的其他后备定义视为竞争者。
    pub fn is_bean_present(&self, key: TypeKey) -> bool {
        let candidates = self.registry().candidates(key);
        let own_position = candidates
            .iter()
            .position(|candidate| candidate.name() == self.definition.name());
        let is_fallback = is_fallback_for(self.definition, key);

        candidates
            .iter()
            .enumerate()
            .filter(|(_, candidate)| candidate.name() != self.definition.name())
            .filter(|(index, candidate)| {
                let later = own_position.is_some_and(|own| *index > own);
                !(is_fallback && later && is_fallback_for(candidate, key))
            })
            .any(|(_, candidate)| self.evaluator.is_eligible(candidate))
    }
}

fn is_fallback_for(definition: &BeanDefinition, key: TypeKey) -> bool {
    definition.conditions().iter().any(|c| c.guards_missing(key))
}
