//! 拦截链

use std::fmt;
use std::sync::Arc;

use trellis_core::InterceptorBinding;

use crate::error::InvocationResult;
use crate::interceptor::MethodInterceptor;
use crate::invocation::{Arguments, MethodDescriptor, MethodInvocationContext, ReturnValue, Terminal};

/// 链中的一个拦截器及其绑定
#[derive(Clone)]
pub struct ChainEntry {
    interceptor: Arc<dyn MethodInterceptor>,
    binding: InterceptorBinding,
}

impl ChainEntry {
    pub fn new(interceptor: Arc<dyn MethodInterceptor>, binding: InterceptorBinding) -> Self {
        Self { interceptor, binding }
    }

    pub fn interceptor(&self) -> &Arc<dyn MethodInterceptor> {
        &self.interceptor
    }

    pub fn binding(&self) -> &InterceptorBinding {
        &self.binding
    }
}

impl fmt::Debug for ChainEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainEntry")
            .field("interceptor", &self.interceptor.name())
            .field("order", &self.interceptor.order())
            .field("binding", &self.binding.binding())
            .finish()
    }
}

/// 某个方法的有序拦截链
///
/// 拦截器已按 `order()` 升序、注册顺序排列；链本身不可变，可以被多次调用共享。
#[derive(Debug, Clone)]
pub struct InterceptorChain {
    method: MethodDescriptor,
    entries: Vec<ChainEntry>,
}

impl InterceptorChain {
    pub fn new(method: MethodDescriptor, entries: Vec<ChainEntry>) -> Self {
        Self { method, entries }
    }

    pub fn method(&self) -> &MethodDescriptor {
        &self.method
    }

    pub fn entries(&self) -> &[ChainEntry] {
        &self.entries
    }

    pub fn interceptor_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.interceptor.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 执行一次调用
    pub fn invoke<'a>(&'a self, arguments: Arguments, terminal: Terminal<'a>) -> InvocationResult<ReturnValue> {
        MethodInvocationContext::new(&self.method, &self.entries, arguments, terminal).run()
    }
}
