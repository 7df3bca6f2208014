//! 方法调用上下文
//!
//! 一次被拦截的方法调用由 [`MethodInvocationContext`] 驱动：按顺序调用拦截器，
//! 每个拦截器通过 [`MethodInvocationContext::proceed`] 进入下一层，最内层调用目标方法。
//!
//! ```text
//! NotStarted -> Running(0) -> Running(1) -> ... -> Running(n)  (目标方法)
//!                   |
//!                   +-> Completed | ShortCircuited | Failed
//! ```

use std::any::{type_name, Any};
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::FutureExt;
use trellis_core::utils::naming::short_type_name;
use trellis_core::{ConfigValue, InterceptorBinding};

use crate::chain::ChainEntry;
use crate::error::{InterceptorChainError, InvocationResult};

/// 类型擦除后的返回值
pub type AnyValue = Box<dyn Any + Send>;

/// 目标方法，由 continuation 消费参数后产生返回值
pub type Terminal<'a> = Box<dyn FnOnce(&mut Arguments) -> InvocationResult<ReturnValue> + Send + 'a>;

/// 被拦截的方法
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    target_type: String,
    method_name: String,
}

impl MethodDescriptor {
    pub fn new(target_type: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            target_type: target_type.into(),
            method_name: method_name.into(),
        }
    }

    /// 以类型的短名称作为目标类型
    pub fn of<T: ?Sized>(method_name: impl Into<String>) -> Self {
        Self::new(short_type_name(type_name::<T>()), method_name)
    }

    pub fn target_type(&self) -> &str {
        &self.target_type
    }

    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    /// 方法签名，格式为 `Type::method`
    pub fn signature(&self) -> String {
        format!("{}::{}", self.target_type, self.method_name)
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.target_type, self.method_name)
    }
}

/// 方法参数
///
/// 按名称保存，拦截器可以在调用目标方法之前读取或替换。
#[derive(Default)]
pub struct Arguments {
    values: Vec<(String, AnyValue)>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<T: Send + 'static>(mut self, name: impl Into<String>, value: T) -> Self {
        self.set(name, value);
        self
    }

    /// 设置参数，同名参数会被替换
    pub fn set<T: Send + 'static>(&mut self, name: impl Into<String>, value: T) {
        let name = name.into();
        let value: AnyValue = Box::new(value);
        match self.values.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.values.push((name, value)),
        }
    }

    pub fn get<T: 'static>(&self, name: &str) -> Option<&T> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.downcast_ref::<T>())
    }

    pub fn get_mut<T: 'static>(&mut self, name: &str) -> Option<&mut T> {
        self.values
            .iter_mut()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.downcast_mut::<T>())
    }

    /// 取出参数的所有权；类型不匹配时参数保持不变
    pub fn take<T: 'static>(&mut self, name: &str) -> Option<T> {
        let index = self.values.iter().position(|(n, _)| n == name)?;
        if !self.values[index].1.is::<T>() {
            return None;
        }
        let (_, value) = self.values.remove(index);
        value.downcast::<T>().ok().map(|v| *v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.iter().any(|(n, _)| n == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// 方法返回值
///
/// 同步方法返回 `Ready`，异步方法返回 `Deferred`，由调用方在拦截链结束后等待。
pub enum ReturnValue {
    Ready(AnyValue),
    Deferred(BoxFuture<'static, InvocationResult<AnyValue>>),
}

impl ReturnValue {
    pub fn ready<T: Send + 'static>(value: T) -> Self {
        ReturnValue::Ready(Box::new(value))
    }

    pub fn unit() -> Self {
        Self::ready(())
    }

    /// 包装异步方法的结果
    pub fn deferred<T, F>(future: F) -> Self
    where
        T: Send + 'static,
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        ReturnValue::Deferred(
            async move {
                future
                    .await
                    .map(|value| Box::new(value) as AnyValue)
                    .map_err(InterceptorChainError::Failed)
            }
            .boxed(),
        )
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, ReturnValue::Deferred(_))
    }

    /// 取出同步返回值
    pub fn downcast<T: 'static>(self, method: &MethodDescriptor) -> InvocationResult<T> {
        match self {
            ReturnValue::Ready(value) => downcast_value(value, method),
            ReturnValue::Deferred(_) => Err(InterceptorChainError::UnexpectedDeferred {
                method: method.signature(),
            }),
        }
    }

    /// 等待返回值（同步返回值立即就绪）
    pub async fn resolve<T: 'static>(self, method: &MethodDescriptor) -> InvocationResult<T> {
        let value = match self {
            ReturnValue::Ready(value) => value,
            ReturnValue::Deferred(future) => future.await?,
        };
        downcast_value(value, method)
    }
}

impl fmt::Debug for ReturnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnValue::Ready(_) => f.write_str("Ready(..)"),
            ReturnValue::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

pub(crate) fn downcast_value<T: 'static>(value: AnyValue, method: &MethodDescriptor) -> InvocationResult<T> {
    value
        .downcast::<T>()
        .map(|v| *v)
        .map_err(|_| InterceptorChainError::ReturnTypeMismatch {
            method: method.signature(),
            expected: type_name::<T>(),
        })
}

/// 调用状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    NotStarted,
    /// 正在执行第 n 个拦截器；n 等于拦截器数量时表示正在执行目标方法
    Running(usize),
    Completed,
    /// 某个拦截器没有调用 proceed 就返回了结果
    ShortCircuited,
    Failed,
}

/// 方法调用上下文，只在一次调用内使用，不跨线程共享
pub struct MethodInvocationContext<'a> {
    method: &'a MethodDescriptor,
    chain: &'a [ChainEntry],
    arguments: Arguments,
    terminal: Option<Terminal<'a>>,
    state: InvocationState,
    position: usize,
    proceeded: Vec<bool>,
    target_invoked: bool,
    started_at: Instant,
}

impl<'a> MethodInvocationContext<'a> {
    pub fn new(
        method: &'a MethodDescriptor,
        chain: &'a [ChainEntry],
        arguments: Arguments,
        terminal: Terminal<'a>,
    ) -> Self {
        Self {
            method,
            chain,
            arguments,
            terminal: Some(terminal),
            state: InvocationState::NotStarted,
            position: 0,
            proceeded: vec![false; chain.len()],
            target_invoked: false,
            started_at: Instant::now(),
        }
    }

    /// 从第一个拦截器开始执行整条链
    pub fn run(&mut self) -> InvocationResult<ReturnValue> {
        if self.state != InvocationState::NotStarted {
            return Err(InterceptorChainError::TerminalAlreadyInvoked {
                method: self.method.signature(),
            });
        }

        let result = self.dispatch(0);
        self.state = match &result {
            Err(_) => InvocationState::Failed,
            Ok(_) if self.target_invoked => InvocationState::Completed,
            Ok(_) => InvocationState::ShortCircuited,
        };
        tracing::trace!("Invocation of {} finished: {:?}", self.method, self.state);
        result
    }

    /// 进入下一个拦截器，最后一个拦截器进入目标方法
    ///
    /// 每个拦截器最多调用一次，第二次调用返回 [`InterceptorChainError::ProceedCalledTwice`]。
    pub fn proceed(&mut self) -> InvocationResult<ReturnValue> {
        match self.state {
            InvocationState::Running(_) => {}
            InvocationState::NotStarted => return self.run(),
            _ => {
                return Err(InterceptorChainError::TerminalAlreadyInvoked {
                    method: self.method.signature(),
                })
            }
        }

        let index = self.position;
        if self.proceeded[index] {
            return Err(InterceptorChainError::ProceedCalledTwice {
                interceptor: self.chain[index].interceptor().name().to_string(),
                method: self.method.signature(),
            });
        }
        self.proceeded[index] = true;

        let result = self.dispatch(index + 1);
        self.position = index;
        self.state = InvocationState::Running(index);
        result
    }

    /// 进入下一层，并在结果可用后执行 `continuation`
    ///
    /// 同步返回值立即执行；异步返回值在 future 完成后执行，不会阻塞当前线程。
    /// 只有业务错误会交给 `continuation`，调用协议错误直接返回。
    pub fn proceed_with<F>(&mut self, continuation: F) -> InvocationResult<ReturnValue>
    where
        F: FnOnce(InvocationResult<AnyValue>) -> InvocationResult<AnyValue> + Send + 'static,
    {
        match self.proceed() {
            Ok(ReturnValue::Ready(value)) => continuation(Ok(value)).map(ReturnValue::Ready),
            Ok(ReturnValue::Deferred(future)) => Ok(ReturnValue::Deferred(
                async move { continuation(future.await) }.boxed(),
            )),
            Err(error) if error.is_failed() => continuation(Err(error)).map(ReturnValue::Ready),
            Err(error) => Err(error),
        }
    }

    fn dispatch(&mut self, index: usize) -> InvocationResult<ReturnValue> {
        self.position = index;
        self.state = InvocationState::Running(index);

        let chain = self.chain;
        match chain.get(index) {
            Some(entry) => {
                tracing::trace!("  ├─ {} -> {}", self.method, entry.interceptor().name());
                entry.interceptor().intercept(self)
            }
            None => self.invoke_terminal(),
        }
    }

    fn invoke_terminal(&mut self) -> InvocationResult<ReturnValue> {
        let terminal = self
            .terminal
            .take()
            .ok_or_else(|| InterceptorChainError::TerminalAlreadyInvoked {
                method: self.method.signature(),
            })?;
        self.target_invoked = true;
        terminal(&mut self.arguments)
    }

    pub fn method(&self) -> &MethodDescriptor {
        self.method
    }

    pub fn state(&self) -> InvocationState {
        self.state
    }

    /// 目标方法是否已经被调用
    pub fn target_invoked(&self) -> bool {
        self.target_invoked
    }

    /// 自调用开始经过的时间
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn arguments(&self) -> &Arguments {
        &self.arguments
    }

    pub fn arguments_mut(&mut self) -> &mut Arguments {
        &mut self.arguments
    }

    /// 读取参数，缺失或类型不匹配时报错
    pub fn argument<T: 'static>(&self, name: &str) -> InvocationResult<&T> {
        self.arguments
            .get::<T>(name)
            .ok_or_else(|| InterceptorChainError::MissingArgument {
                method: self.method.signature(),
                name: name.to_string(),
            })
    }

    fn current_entry(&self) -> Option<&ChainEntry> {
        match self.state {
            InvocationState::Running(index) => self.chain.get(index),
            _ => None,
        }
    }

    /// 当前拦截器的名称
    pub fn interceptor_name(&self) -> Option<&str> {
        self.current_entry().map(|entry| entry.interceptor().name())
    }

    /// 当前拦截器对应的绑定
    pub fn binding(&self) -> Option<&InterceptorBinding> {
        self.current_entry().map(|entry| entry.binding())
    }

    /// 当前绑定上声明的属性
    pub fn attribute(&self, key: &str) -> Option<&ConfigValue> {
        self.binding().and_then(|binding| binding.attributes().get(key))
    }
}

impl fmt::Debug for MethodInvocationContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodInvocationContext")
            .field("method", &self.method.signature())
            .field("state", &self.state)
            .field("arguments", &self.arguments)
            .finish()
    }
}
