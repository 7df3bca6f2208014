//! 限定符：在多个同类型候选之间进行选择

use std::fmt;

use crate::bean::{BeanDefinition, TypeKey};

/// 限定符
#[derive(Debug, Clone, PartialEq)]
pub enum Qualifier {
    /// 按名称或别名
    Named(String),
    /// 按构造型标记
    Stereotype(String),
    /// 按第一个泛型参数，例如 `dyn Repository<User>` 中的 `User`
    TypeArgument(TypeKey),
    /// 按完整的泛型参数列表
    TypeArguments(Vec<TypeKey>),
    /// 只匹配 primary Bean
    Primary,
    /// 全部满足
    AllOf(Vec<Qualifier>),
    /// 任一满足
    AnyOf(Vec<Qualifier>),
}

impl Qualifier {
    pub fn named(name: impl Into<String>) -> Self {
        Qualifier::Named(name.into())
    }

    pub fn stereotype(stereotype: impl Into<String>) -> Self {
        Qualifier::Stereotype(stereotype.into())
    }

    pub fn type_argument<A: ?Sized + 'static>() -> Self {
        Qualifier::TypeArgument(TypeKey::of::<A>())
    }

    pub fn and(self, other: Qualifier) -> Self {
        match self {
            Qualifier::AllOf(mut all) => {
                all.push(other);
                Qualifier::AllOf(all)
            }
            first => Qualifier::AllOf(vec![first, other]),
        }
    }

    /// 检查以 `requested` 类型查找时，定义是否满足该限定符
    pub fn matches(&self, definition: &BeanDefinition, requested: TypeKey) -> bool {
        match self {
            Qualifier::Named(name) => definition.is_named(name),
            Qualifier::Stereotype(stereotype) => {
                definition.stereotypes().iter().any(|s| s == stereotype)
            }
            Qualifier::TypeArgument(arg) => definition
                .exposed_type(requested)
                .and_then(|exposed| exposed.type_args().first())
                .map(|first| first == arg)
                .unwrap_or(false),
            Qualifier::TypeArguments(args) => definition
                .exposed_type(requested)
                .map(|exposed| exposed.type_args() == args.as_slice())
                .unwrap_or(false),
            Qualifier::Primary => definition.is_primary(),
            Qualifier::AllOf(all) => all.iter().all(|q| q.matches(definition, requested)),
            Qualifier::AnyOf(any) => any.iter().any(|q| q.matches(definition, requested)),
        }
    }
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Qualifier::Named(name) => write!(f, "@Named(\"{}\")", name),
            Qualifier::Stereotype(s) => write!(f, "@{}", s),
            Qualifier::TypeArgument(arg) => write!(f, "<{}>", arg),
            Qualifier::TypeArguments(args) => {
                let names: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                write!(f, "<{}>", names.join(", "))
            }
            Qualifier::Primary => write!(f, "@Primary"),
            Qualifier::AllOf(all) => {
                let parts: Vec<String> = all.iter().map(|q| q.to_string()).collect();
                write!(f, "{}", parts.join(" & "))
            }
            Qualifier::AnyOf(any) => {
                let parts: Vec<String> = any.iter().map(|q| q.to_string()).collect();
                write!(f, "({})", parts.join(" | "))
            }
        }
    }
}
