//! 注入令牌定义

use crate::metadata::short_type_name;
use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

/// 注入令牌
///
/// 注册表中的键。令牌由调用方或类型描述符提供，容器自身从不创建令牌。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InjectionToken {
    /// 以类型标识作为令牌
    Type {
        /// 类型ID
        id: TypeId,
        /// 类型名称，仅用于诊断
        name: &'static str,
    },
    /// 以符号名称作为令牌
    Named(Arc<str>),
}

impl InjectionToken {
    /// 以类型创建令牌
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::Type {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// 以名称创建令牌
    pub fn named(name: impl Into<Arc<str>>) -> Self {
        Self::Named(name.into())
    }

    /// 令牌的可读名称
    pub fn name(&self) -> &str {
        match self {
            Self::Type { name, .. } => short_type_name(name),
            Self::Named(name) => name,
        }
    }
}

impl fmt::Display for InjectionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<&'static str> for InjectionToken {
    fn from(name: &'static str) -> Self {
        Self::named(name)
    }
}

impl From<String> for InjectionToken {
    fn from(name: String) -> Self {
        Self::named(name)
    }
}

/// 获取令牌名称，令牌缺失时返回占位名称
pub fn token_name(token: Option<&InjectionToken>) -> String {
    token.map_or_else(|| "<undefined>".to_string(), ToString::to_string)
}
