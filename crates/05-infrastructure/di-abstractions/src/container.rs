//! 依赖注入容器抽象接口
//!
//! 提供注册表操作与容器配置

use crate::provider::Provider;
use crate::registry::{Registration, RegistrationEvent, RegistrationOptions};
use crate::resolver::Resolver;
use infrastructure_common::{InjectionToken, Lifecycle, ResolveChain, ResolveError, ResolveResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// 依赖注入容器 trait
///
/// 注册从不实例化任何对象；同一令牌重复注册时以最后一次为准。
pub trait DiContainer: Resolver {
    /// 注册令牌
    ///
    /// 类提供者的构造器必须已有类型描述符，否则以 `NotInjectable` 失败。
    fn register(&self, token: InjectionToken, provider: Provider, options: RegistrationOptions) -> ResolveResult<()>;

    /// 注册单例
    fn register_singleton(
        &self,
        token: InjectionToken,
        provider: Provider,
        options: RegistrationOptions,
    ) -> ResolveResult<()> {
        self.register(token, provider, options.with_lifecycle(Lifecycle::Singleton))
    }

    /// 检查是否已注册
    fn has_registration(&self, token: &InjectionToken) -> bool;

    /// 获取注册信息，不存在时返回 `None`
    fn try_registration(&self, token: &InjectionToken) -> Option<Arc<Registration>>;

    /// 获取注册信息，不存在时以 `NoProvider` 失败
    fn registration(&self, token: &InjectionToken) -> ResolveResult<Arc<Registration>> {
        self.try_registration(token).ok_or_else(|| ResolveError::NoProvider {
            token: token.clone(),
            chain: ResolveChain::new().add_token(token),
        })
    }

    /// 所有注册信息
    fn registrations(&self) -> Vec<Arc<Registration>>;

    /// 订阅注册变更事件
    fn subscribe(&self) -> broadcast::Receiver<RegistrationEvent>;

    /// 容器统计信息
    fn stats(&self) -> ContainerStats;
}

/// 容器配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// 最大解析深度（解析路径长度）
    pub max_resolve_depth: usize,
    /// 单次根解析调用的最大解析步数
    pub max_resolve_count: usize,
    /// 栈溢出错误中保留的解析路径长度
    pub error_chain_length: usize,
    /// 注册事件通道容量
    pub event_capacity: usize,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            max_resolve_depth: 5000,
            max_resolve_count: 5000,
            error_chain_length: 15,
            event_capacity: 64,
        }
    }
}

/// 容器统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContainerStats {
    /// 注册数量
    pub registrations: usize,
    /// 单例注册数量
    pub singleton_registrations: usize,
    /// 已缓存的单例实例数量
    pub cached_singletons: usize,
}
