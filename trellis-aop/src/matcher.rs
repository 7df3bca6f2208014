//! 方法名匹配
//!
//! 拦截器绑定可以通过成员模式限定拦截的方法：
//!
//! - `*` 匹配所有方法
//! - `find*`、`*_user`、`*cache*` 通配符匹配
//! - `find*, save*` 逗号分隔，任意一个匹配即可
//! - `regex:^(get|list)_.*$` 正则表达式

use std::fmt;

use regex::Regex;
use trellis_core::utils::pattern::glob_matches;
use trellis_core::InterceptorBinding;

const REGEX_PREFIX: &str = "regex:";

/// 方法名匹配器
#[derive(Clone)]
pub enum MemberMatcher {
    /// 匹配所有方法
    All,
    /// 精确匹配
    Exact(String),
    /// 通配符匹配
    Glob(String),
    /// 正则表达式匹配
    Regex(Regex),
    /// 任意一个匹配即可
    AnyOf(Vec<MemberMatcher>),
}

impl MemberMatcher {
    /// 解析成员模式
    pub fn parse(pattern: &str) -> Result<Self, regex::Error> {
        let pattern = pattern.trim();

        if let Some(expression) = pattern.strip_prefix(REGEX_PREFIX) {
            return Regex::new(expression.trim()).map(MemberMatcher::Regex);
        }

        let mut alternatives: Vec<MemberMatcher> = pattern
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(Self::single)
            .collect();

        match alternatives.len() {
            0 => Ok(MemberMatcher::All),
            1 => Ok(alternatives.remove(0)),
            _ => Ok(MemberMatcher::AnyOf(alternatives)),
        }
    }

    fn single(pattern: &str) -> Self {
        if pattern == "*" {
            MemberMatcher::All
        } else if pattern.contains('*') {
            MemberMatcher::Glob(pattern.to_string())
        } else {
            MemberMatcher::Exact(pattern.to_string())
        }
    }

    /// 从绑定的成员模式创建匹配器
    ///
    /// 无效的正则表达式会记录警告，并且不匹配任何方法
    pub fn for_binding(binding: &InterceptorBinding) -> Self {
        match binding.member_pattern() {
            None => MemberMatcher::All,
            Some(pattern) => Self::parse(pattern).unwrap_or_else(|e| {
                tracing::warn!(
                    "Invalid member pattern '{}' on binding '{}': {}",
                    pattern,
                    binding.binding(),
                    e
                );
                MemberMatcher::AnyOf(Vec::new())
            }),
        }
    }

    pub fn matches(&self, method_name: &str) -> bool {
        match self {
            MemberMatcher::All => true,
            MemberMatcher::Exact(name) => name == method_name,
            MemberMatcher::Glob(pattern) => glob_matches(pattern, method_name),
            MemberMatcher::Regex(regex) => regex.is_match(method_name),
            MemberMatcher::AnyOf(matchers) => matchers.iter().any(|m| m.matches(method_name)),
        }
    }
}

impl fmt::Debug for MemberMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberMatcher::All => write!(f, "All"),
            MemberMatcher::Exact(name) => write!(f, "Exact({})", name),
            MemberMatcher::Glob(pattern) => write!(f, "Glob({})", pattern),
            MemberMatcher::Regex(regex) => write!(f, "Regex({})", regex.as_str()),
            MemberMatcher::AnyOf(matchers) => f.debug_tuple("AnyOf").field(matchers).finish(),
        }
    }
}
