//! 工厂与回调抽象
//!
//! 提供工厂函数类型，以及可能挂起的回调结果 [`MaybeAsync`]

use crate::resolver::{Instance, ResolveContext, SharedResolveContext};
use futures::future::BoxFuture;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// 可能挂起的结果
///
/// 同步解析遇到 [`MaybeAsync::Pending`] 时以 `AsyncInSyncContext` 失败，
/// 异步解析则等待其完成。
pub enum MaybeAsync<T> {
    /// 已完成
    Ready(T),
    /// 需要等待
    Pending(BoxFuture<'static, T>),
}

impl<T> MaybeAsync<T> {
    /// 已完成的结果
    pub fn ready(value: T) -> Self {
        Self::Ready(value)
    }

    /// 需要等待的结果
    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Self::Pending(Box::pin(future))
    }

    /// 是否需要等待
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    /// 等待结果
    pub async fn settle(self) -> T {
        match self {
            Self::Ready(value) => value,
            Self::Pending(future) => future.await,
        }
    }
}

impl<T> std::fmt::Debug for MaybeAsync<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready(_) => f.write_str("MaybeAsync::Ready"),
            Self::Pending(_) => f.write_str("MaybeAsync::Pending"),
        }
    }
}

/// 同步工厂函数类型
pub type FactoryFn = Arc<
    dyn Fn(Option<Value>, &dyn ResolveContext) -> anyhow::Result<Instance> + Send + Sync,
>;

/// 异步工厂函数类型
pub type AsyncFactoryFn = Arc<
    dyn Fn(Option<Value>, SharedResolveContext) -> BoxFuture<'static, anyhow::Result<Instance>>
        + Send
        + Sync,
>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_maybe_async() {
        let ready = MaybeAsync::ready(1);
        assert!(!ready.is_pending());
        assert_eq!(ready.settle().await, 1);

        let pending = MaybeAsync::pending(async { 2 });
        assert!(pending.is_pending());
        assert_eq!(pending.settle().await, 2);
    }
}
