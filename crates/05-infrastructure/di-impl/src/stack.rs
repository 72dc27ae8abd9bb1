//! 深层解析的栈扩展
//!
//! 每一步解析在剩余栈空间不足 [`RED_ZONE`] 时切换到新分配的栈段，
//! 使解析深度只受 `ContainerConfig` 的上限约束，而不受线程栈大小约束。

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// 进入一步解析前要求的最小剩余栈空间
const RED_ZONE: usize = 128 * 1024;

/// 每次扩展分配的栈段大小
const STACK_SEGMENT: usize = 2 * 1024 * 1024;

/// 在足够的栈空间上执行
pub(crate) fn with_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_SEGMENT, f)
}

/// 轮询时保证栈空间的 future 包装
///
/// 嵌套的异步解析在一次轮询中逐层轮询子 future，每层都经过这里。
pub(crate) struct StackGrowing<F>(pub(crate) F);

impl<F: Future + Unpin> Future for StackGrowing<F> {
    type Output = F::Output;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let inner = &mut self.0;
        with_stack(|| Pin::new(inner).poll(cx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn depth(n: usize) -> usize {
        if n == 0 {
            0
        } else {
            with_stack(|| {
                let padding = std::hint::black_box([0_u8; 512]);
                depth(n - 1) + usize::from(padding[0]) + 1
            })
        }
    }

    #[test]
    fn test_deep_recursion_grows_stack() {
        assert_eq!(depth(100_000), 100_000);
    }

    #[test]
    fn test_wrapped_future_output() {
        let value = tokio_test::block_on(StackGrowing(Box::pin(async { 7_u8 })));
        assert_eq!(value, 7);
    }
}
