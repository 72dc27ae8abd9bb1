//! 前向引用
//!
//! 在目标实例已知之前交给消费者的单次赋值单元，用于打破构造循环。
//! 解析引擎保证在根解析调用返回前完成赋值。

use crate::resolver::Instance;
use infrastructure_common::InjectionToken;
use once_cell::sync::OnceCell;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use thiserror::Error;

/// 读取前向引用目标的错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ForwardRefError {
    #[error("前向引用在根解析调用完成前被读取")]
    Unresolved,

    #[error("前向引用的目标未注册（可选注入）")]
    Absent,

    #[error("弱前向引用的目标已被释放")]
    Released,

    #[error("前向引用的目标不是 {expected}")]
    TypeMismatch { expected: &'static str },
}

enum Target {
    Strong(Instance),
    Weak(Weak<dyn Any + Send + Sync>),
}

#[derive(Default)]
struct ForwardRefCell {
    target: OnceCell<Option<Target>>,
    sealed: AtomicBool,
    weak: bool,
}

/// 前向引用
///
/// 克隆后共享同一个目标。可选注入且目标未注册时，目标为空。
///
/// 强引用持有目标；指回所属对象图上层实例的引用应使用 [`ForwardRef::weak`]，
/// 否则对象图形成 `Arc` 环，在所有外部句柄释放后也不会被回收。
#[derive(Clone, Default)]
pub struct ForwardRef {
    cell: Arc<ForwardRefCell>,
}

impl ForwardRef {
    /// 创建未赋值的强前向引用
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建未赋值的弱前向引用，赋值时只保存目标的 `Weak`
    pub fn weak() -> Self {
        Self {
            cell: Arc::new(ForwardRefCell {
                weak: true,
                ..ForwardRefCell::default()
            }),
        }
    }

    /// 是否为弱前向引用
    pub fn is_weak(&self) -> bool {
        self.cell.weak
    }

    /// 赋值目标，只有第一次赋值生效
    pub fn set(&self, target: Option<Instance>) -> bool {
        if self.is_sealed() {
            return false;
        }
        let target = target.map(|instance| {
            if self.cell.weak {
                Target::Weak(Arc::downgrade(&instance))
            } else {
                Target::Strong(instance)
            }
        });
        self.cell.target.set(target).is_ok()
    }

    /// 是否已赋值
    pub fn is_resolved(&self) -> bool {
        self.cell.target.get().is_some()
    }

    /// 标记为已完成：根解析调用结束后不再接受赋值
    pub fn seal(&self) -> bool {
        self.cell.sealed.store(true, Ordering::Release);
        self.is_resolved()
    }

    /// 是否已被解析引擎标记完成
    pub fn is_sealed(&self) -> bool {
        self.cell.sealed.load(Ordering::Acquire)
    }

    /// 目标实例，未赋值、目标为空或弱引用目标已释放时返回 `None`
    pub fn instance(&self) -> Option<Instance> {
        self.lookup().ok()
    }

    /// 目标实例的具体类型，任何失败都返回 `None`
    pub fn try_get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.get::<T>().ok()
    }

    /// 目标实例的具体类型
    pub fn get<T: Any + Send + Sync>(&self) -> Result<Arc<T>, ForwardRefError> {
        self.lookup()?
            .downcast::<T>()
            .map_err(|_| ForwardRefError::TypeMismatch {
                expected: std::any::type_name::<T>(),
            })
    }

    fn lookup(&self) -> Result<Instance, ForwardRefError> {
        match self.cell.target.get() {
            None => Err(ForwardRefError::Unresolved),
            Some(None) => Err(ForwardRefError::Absent),
            Some(Some(Target::Strong(instance))) => Ok(instance.clone()),
            Some(Some(Target::Weak(weak))) => weak.upgrade().ok_or(ForwardRefError::Released),
        }
    }

    /// 两个前向引用是否指向同一个单元
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

impl fmt::Debug for ForwardRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForwardRef")
            .field("weak", &self.is_weak())
            .field("resolved", &self.is_resolved())
            .field("sealed", &self.is_sealed())
            .finish()
    }
}

/// 延迟令牌
///
/// 前向引用与令牌别名的目标，可以直接给出，也可以延迟到解析时再计算。
#[derive(Clone)]
pub enum LazyToken {
    /// 直接给出的令牌
    Token(InjectionToken),
    /// 延迟计算的令牌，返回 `None` 表示令牌未定义
    Provider(Arc<dyn Fn() -> Option<InjectionToken> + Send + Sync>),
}

impl LazyToken {
    /// 计算令牌
    pub fn token(&self) -> Option<InjectionToken> {
        match self {
            Self::Token(token) => Some(token.clone()),
            Self::Provider(provider) => provider(),
        }
    }
}

impl From<InjectionToken> for LazyToken {
    fn from(token: InjectionToken) -> Self {
        Self::Token(token)
    }
}

impl fmt::Debug for LazyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Token(token) => f.debug_tuple("Token").field(token).finish(),
            Self::Provider(_) => f.write_str("Provider(<function>)"),
        }
    }
}
