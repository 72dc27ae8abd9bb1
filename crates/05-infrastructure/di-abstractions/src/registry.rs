//! 注册信息定义

use crate::factory::MaybeAsync;
use crate::provider::Provider;
use crate::resolver::{Instance, ResolveContext, SharedResolveContext};
use infrastructure_common::{stable_stringify, ArgumentIdentity, InjectionToken, Lifecycle};
use parking_lot::Mutex;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// 参数提供者函数类型
pub type ArgumentProviderFn =
    Arc<dyn Fn(&dyn ResolveContext) -> MaybeAsync<anyhow::Result<Option<Value>>> + Send + Sync>;

/// 参数提供者
///
/// 在没有显式参数与默认参数时计算解析参数，可以通过解析上下文解析其他令牌。
#[derive(Clone)]
pub struct ArgumentProvider(ArgumentProviderFn);

impl ArgumentProvider {
    /// 同步参数提供者
    pub fn new<F>(provider: F) -> Self
    where
        F: Fn(&dyn ResolveContext) -> anyhow::Result<Option<Value>> + Send + Sync + 'static,
    {
        Self(Arc::new(move |context: &dyn ResolveContext| MaybeAsync::ready(provider(context))))
    }

    /// 异步参数提供者，只能在异步解析中使用
    pub fn from_async<F, Fut>(provider: F) -> Self
    where
        F: Fn(SharedResolveContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<Value>>> + Send + 'static,
    {
        Self(Arc::new(move |context: &dyn ResolveContext| {
            MaybeAsync::pending(provider(context.share()))
        }))
    }

    /// 计算参数
    pub fn provide(&self, context: &dyn ResolveContext) -> MaybeAsync<anyhow::Result<Option<Value>>> {
        (self.0)(context)
    }
}

impl fmt::Debug for ArgumentProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ArgumentProvider(<function>)")
    }
}

/// 参数标识提供者函数类型
pub type ArgumentIdentityFn =
    Arc<dyn Fn(Option<&Value>) -> MaybeAsync<anyhow::Result<ArgumentIdentity>> + Send + Sync>;

/// 参数标识提供者
///
/// 将有效参数映射为生命周期缓存的键，只对单例与解析生命周期生效。
#[derive(Clone)]
pub struct ArgumentIdentityProvider(ArgumentIdentityFn);

impl ArgumentIdentityProvider {
    /// 同步参数标识提供者
    pub fn new<F>(provider: F) -> Self
    where
        F: Fn(Option<&Value>) -> anyhow::Result<ArgumentIdentity> + Send + Sync + 'static,
    {
        Self(Arc::new(move |argument: Option<&Value>| MaybeAsync::ready(provider(argument))))
    }

    /// 异步参数标识提供者，只能在异步解析中使用
    pub fn from_async<F, Fut>(provider: F) -> Self
    where
        F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<ArgumentIdentity>> + Send + 'static,
    {
        Self(Arc::new(move |argument: Option<&Value>| {
            MaybeAsync::pending(provider(argument.cloned()))
        }))
    }

    /// 对象键有序的 JSON 文本作为标识
    pub fn stable_json() -> Self {
        Self::new(|argument: Option<&Value>| {
            Ok(argument.map_or(ArgumentIdentity::NONE, |value| {
                ArgumentIdentity::new(stable_stringify(value))
            }))
        })
    }

    /// 计算标识
    pub fn identify(&self, argument: Option<&Value>) -> MaybeAsync<anyhow::Result<ArgumentIdentity>> {
        (self.0)(argument)
    }
}

impl fmt::Debug for ArgumentIdentityProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ArgumentIdentityProvider(<function>)")
    }
}

/// 初始化器函数类型
pub type InitializerFn = Arc<dyn Fn(Instance) -> MaybeAsync<anyhow::Result<()>> + Send + Sync>;

/// 初始化器
///
/// 在根解析调用结束时，按后解析先执行的顺序对每个新建实例调用。
#[derive(Clone)]
pub struct Initializer(InitializerFn);

impl Initializer {
    /// 同步初始化器
    pub fn new<T, F>(initializer: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(Arc<T>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self(Arc::new(move |instance: Instance| {
            MaybeAsync::ready(downcast::<T>(instance).and_then(|typed| initializer(typed)))
        }))
    }

    /// 异步初始化器，只能在异步解析中使用
    pub fn from_async<T, F, Fut>(initializer: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self(Arc::new(move |instance: Instance| match downcast::<T>(instance) {
            Ok(typed) => MaybeAsync::pending(initializer(typed)),
            Err(error) => MaybeAsync::ready(Err(error)),
        }))
    }

    /// 调用初始化器
    pub fn initialize(&self, instance: Instance) -> MaybeAsync<anyhow::Result<()>> {
        (self.0)(instance)
    }
}

impl fmt::Debug for Initializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Initializer(<function>)")
    }
}

fn downcast<T: Any + Send + Sync>(instance: Instance) -> anyhow::Result<Arc<T>> {
    instance
        .downcast::<T>()
        .map_err(|_| anyhow::anyhow!("初始化器期望 {}", std::any::type_name::<T>()))
}

/// 注册选项
#[derive(Debug, Clone, Default)]
pub struct RegistrationOptions {
    /// 生命周期
    pub lifecycle: Lifecycle,
    /// 没有显式解析参数时使用的默认参数
    pub default_argument: Option<Value>,
    /// 没有显式参数与默认参数时使用的参数提供者
    pub default_argument_provider: Option<ArgumentProvider>,
    /// 参数标识提供者，默认按参数值比较
    pub argument_identity_provider: Option<ArgumentIdentityProvider>,
    /// 解析后调用的初始化器
    pub initializer: Option<Initializer>,
    /// 自定义元数据
    pub metadata: HashMap<String, String>,
}

impl RegistrationOptions {
    /// 创建默认选项（瞬时生命周期）
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置生命周期
    pub fn with_lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// 设置默认参数
    pub fn with_default_argument(mut self, argument: Value) -> Self {
        self.default_argument = Some(argument);
        self
    }

    /// 设置默认参数提供者
    pub fn with_default_argument_provider(mut self, provider: ArgumentProvider) -> Self {
        self.default_argument_provider = Some(provider);
        self
    }

    /// 设置参数标识提供者
    pub fn with_argument_identity_provider(mut self, provider: ArgumentIdentityProvider) -> Self {
        self.argument_identity_provider = Some(provider);
        self
    }

    /// 设置初始化器
    pub fn with_initializer(mut self, initializer: Initializer) -> Self {
        self.initializer = Some(initializer);
        self
    }

    /// 添加元数据
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// 注册信息
///
/// 由注册表独占持有，生命周期与容器相同，直到令牌被重新注册。
pub struct Registration {
    /// 注册令牌
    pub token: InjectionToken,
    /// 构造策略
    pub provider: Provider,
    /// 注册选项
    pub options: RegistrationOptions,
    /// 单例实例缓存
    instances: Mutex<HashMap<ArgumentIdentity, Instance>>,
}

impl Registration {
    /// 创建注册信息
    pub fn new(token: InjectionToken, provider: Provider, options: RegistrationOptions) -> Self {
        Self {
            token,
            provider,
            options,
            instances: Mutex::new(HashMap::new()),
        }
    }

    /// 生命周期
    pub fn lifecycle(&self) -> Lifecycle {
        self.options.lifecycle
    }

    /// 获取缓存的单例实例
    pub fn cached_instance(&self, identity: &ArgumentIdentity) -> Option<Instance> {
        self.instances.lock().get(identity).cloned()
    }

    /// 缓存单例实例，返回缓存中的实例
    ///
    /// 同一参数标识已有实例时保留先缓存的实例，`instance` 被丢弃。
    pub fn cache_instance(&self, identity: ArgumentIdentity, instance: Instance) -> Instance {
        self.instances.lock().entry(identity).or_insert(instance).clone()
    }

    /// 已缓存的单例实例数量
    pub fn instance_count(&self) -> usize {
        self.instances.lock().len()
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("token", &self.token)
            .field("provider", &self.provider)
            .field("options", &self.options)
            .field("instances", &self.instance_count())
            .finish()
    }
}

/// 注册变更事件
///
/// 每次成功注册发出一次
#[derive(Debug, Clone)]
pub struct RegistrationEvent {
    /// 新的注册信息
    pub registration: Arc<Registration>,
    /// 注册时间
    pub registered_at: chrono::DateTime<chrono::Utc>,
}

impl RegistrationEvent {
    /// 创建注册事件
    pub fn new(registration: Arc<Registration>) -> Self {
        Self {
            registration,
            registered_at: chrono::Utc::now(),
        }
    }
}
