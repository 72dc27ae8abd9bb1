//! 类型描述符
//!
//! 类提供者所需的构造器注入元数据。Rust 没有运行时反射，
//! 描述符在启动时由调用方显式构建：按声明顺序的参数描述、
//! 属性描述、可选的解析后钩子以及构造函数。

use crate::factory::MaybeAsync;
use crate::forward_ref::{ForwardRef, LazyToken};
use crate::registry::ArgumentProvider;
use crate::resolver::Instance;
use dashmap::DashMap;
use infrastructure_common::{InjectionToken, TypeInfo};
use serde_json::Value;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use thiserror::Error;

/// 注入参数映射：由所属实例的参数计算依赖的解析参数
pub type ArgumentMapperFn = Arc<dyn Fn(Option<&Value>) -> anyhow::Result<Option<Value>> + Send + Sync>;

/// 注入值映射：由所属实例的参数直接计算注入值
pub type InjectArgumentMapperFn = Arc<dyn Fn(Option<&Value>) -> anyhow::Result<Instance> + Send + Sync>;

/// 注入实例映射
pub type InstanceMapperFn = Arc<dyn Fn(Instance) -> anyhow::Result<Instance> + Send + Sync>;

/// 构造函数
pub type ConstructorFn = Arc<dyn Fn(Injections) -> anyhow::Result<Instance> + Send + Sync>;

/// 解析后钩子
pub type AfterResolveFn = Arc<dyn Fn(Instance) -> MaybeAsync<anyhow::Result<()>> + Send + Sync>;

/// 解析后钩子 trait
///
/// 在根解析调用完成、前向引用全部赋值后，按后解析先执行的顺序调用。
pub trait AfterResolve: Send + Sync + 'static {
    /// 解析完成后调用
    fn after_resolve(self: Arc<Self>) -> MaybeAsync<anyhow::Result<()>>;
}

/// 注入描述（参数或属性）
#[derive(Clone, Default)]
pub struct InjectMetadata {
    /// 注入令牌，缺失时解析以 `UndefinedToken` 失败
    pub token: Option<InjectionToken>,
    /// 未注册时是否注入空值
    pub optional: bool,
    /// 前向引用令牌，设置后延迟到根解析调用结束前再解析
    pub forward_ref_token: Option<LazyToken>,
    /// 前向引用只保存目标的弱引用
    pub weak_ref: bool,
    /// 由所属实例的参数计算依赖的解析参数
    pub argument_mapper: Option<ArgumentMapperFn>,
    /// 通过解析上下文计算依赖的解析参数
    pub resolve_argument_provider: Option<ArgumentProvider>,
    /// 由所属实例的参数直接计算注入值，不进行解析
    pub inject_argument_mapper: Option<InjectArgumentMapperFn>,
    /// 对解析出的实例做映射
    pub mapper: Option<InstanceMapperFn>,
}

impl InjectMetadata {
    /// 注入指定令牌
    pub fn token(token: impl Into<InjectionToken>) -> Self {
        Self {
            token: Some(token.into()),
            ..Self::default()
        }
    }

    /// 注入指定类型
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::token(InjectionToken::of::<T>())
    }

    /// 以前向引用注入
    pub fn forward_ref(token: impl Into<LazyToken>) -> Self {
        Self {
            forward_ref_token: Some(token.into()),
            ..Self::default()
        }
    }

    /// 以前向引用注入，令牌延迟计算
    pub fn forward_ref_with<F>(provider: F) -> Self
    where
        F: Fn() -> Option<InjectionToken> + Send + Sync + 'static,
    {
        Self::forward_ref(LazyToken::Provider(Arc::new(provider)))
    }

    /// 由所属实例的参数直接计算注入值
    pub fn from_argument<T, F>(mapper: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(Option<&Value>) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        Self {
            inject_argument_mapper: Some(Arc::new(move |argument: Option<&Value>| {
                mapper(argument).map(|value| Arc::new(value) as Instance)
            })),
            ..Self::default()
        }
    }

    /// 前向引用不持有目标
    ///
    /// 用于指回对象图上层实例的引用，目标由上层的持有者负责保活。
    pub fn weak(mut self) -> Self {
        self.weak_ref = true;
        self
    }

    /// 设为可选注入
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// 由所属实例的参数计算依赖的解析参数
    pub fn map_argument<F>(mut self, mapper: F) -> Self
    where
        F: Fn(Option<&Value>) -> anyhow::Result<Option<Value>> + Send + Sync + 'static,
    {
        self.argument_mapper = Some(Arc::new(mapper));
        self
    }

    /// 通过解析上下文计算依赖的解析参数
    pub fn with_argument_provider(mut self, provider: ArgumentProvider) -> Self {
        self.resolve_argument_provider = Some(provider);
        self
    }

    /// 对解析出的实例做映射
    pub fn map<T, U, F>(mut self, mapper: F) -> Self
    where
        T: Any + Send + Sync,
        U: Any + Send + Sync,
        F: Fn(Arc<T>) -> anyhow::Result<U> + Send + Sync + 'static,
    {
        self.mapper = Some(Arc::new(move |instance: Instance| {
            let typed = instance.downcast::<T>().map_err(|_| {
                anyhow::anyhow!("注入映射期望 {}", std::any::type_name::<T>())
            })?;
            mapper(typed).map(|value| Arc::new(value) as Instance)
        }));
        self
    }
}

impl fmt::Debug for InjectMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectMetadata")
            .field("token", &self.token)
            .field("optional", &self.optional)
            .field("forward_ref_token", &self.forward_ref_token)
            .field("weak_ref", &self.weak_ref)
            .field("argument_mapper", &self.argument_mapper.is_some())
            .field("resolve_argument_provider", &self.resolve_argument_provider.is_some())
            .field("inject_argument_mapper", &self.inject_argument_mapper.is_some())
            .field("mapper", &self.mapper.is_some())
            .finish()
    }
}

/// 注入值
#[derive(Clone)]
pub enum Injected {
    /// 已解析的实例
    Instance(Instance),
    /// 前向引用，根解析调用返回前赋值
    Forward(ForwardRef),
    /// 可选注入且未注册
    Absent,
}

impl fmt::Debug for Injected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instance(_) => f.write_str("Instance"),
            Self::Forward(forward_ref) => fmt::Debug::fmt(forward_ref, f),
            Self::Absent => f.write_str("Absent"),
        }
    }
}

/// 构造器读取注入值时的错误
#[derive(Error, Debug)]
pub enum InjectionError {
    #[error("{constructor} 没有 {site}")]
    Missing { constructor: String, site: String },

    #[error("{constructor} 的 {site} 未注册")]
    Absent { constructor: String, site: String },

    #[error("{constructor} 的 {site} 是前向引用，请使用 forward 访问")]
    UnexpectedForwardRef { constructor: String, site: String },

    #[error("{constructor} 的 {site} 不是前向引用")]
    ForwardRefExpected { constructor: String, site: String },

    #[error("{constructor} 的 {site} 类型不是 {expected}")]
    TypeMismatch {
        constructor: String,
        site: String,
        expected: &'static str,
    },
}

/// 传递给构造函数的注入值
#[derive(Debug)]
pub struct Injections {
    constructor: TypeInfo,
    parameters: Vec<Injected>,
    properties: HashMap<String, Injected>,
}

impl Injections {
    /// 创建注入值集合
    pub fn new(constructor: TypeInfo, parameters: Vec<Injected>, properties: HashMap<String, Injected>) -> Self {
        Self {
            constructor,
            parameters,
            properties,
        }
    }

    /// 原始参数注入值
    pub fn raw_parameter(&self, index: usize) -> Option<&Injected> {
        self.parameters.get(index)
    }

    /// 原始属性注入值
    pub fn raw_property(&self, key: &str) -> Option<&Injected> {
        self.properties.get(key)
    }

    /// 必需的参数
    pub fn parameter<T: Any + Send + Sync>(&self, index: usize) -> Result<Arc<T>, InjectionError> {
        let site = format!("参数 {index}");
        self.required(self.parameters.get(index), site)
    }

    /// 可选的参数
    pub fn optional_parameter<T: Any + Send + Sync>(&self, index: usize) -> Result<Option<Arc<T>>, InjectionError> {
        let site = format!("参数 {index}");
        self.optional(self.parameters.get(index), site)
    }

    /// 以前向引用注入的参数
    pub fn forward_parameter(&self, index: usize) -> Result<ForwardRef, InjectionError> {
        let site = format!("参数 {index}");
        self.forward(self.parameters.get(index), site)
    }

    /// 必需的属性
    pub fn property<T: Any + Send + Sync>(&self, key: &str) -> Result<Arc<T>, InjectionError> {
        let site = format!("属性 {key}");
        self.required(self.properties.get(key), site)
    }

    /// 可选的属性
    pub fn optional_property<T: Any + Send + Sync>(&self, key: &str) -> Result<Option<Arc<T>>, InjectionError> {
        let site = format!("属性 {key}");
        self.optional(self.properties.get(key), site)
    }

    /// 以前向引用注入的属性
    pub fn forward_property(&self, key: &str) -> Result<ForwardRef, InjectionError> {
        let site = format!("属性 {key}");
        self.forward(self.properties.get(key), site)
    }

    fn required<T: Any + Send + Sync>(&self, injected: Option<&Injected>, site: String) -> Result<Arc<T>, InjectionError> {
        match self.optional(injected, site.clone())? {
            Some(value) => Ok(value),
            None => Err(InjectionError::Absent {
                constructor: self.constructor.name.clone(),
                site,
            }),
        }
    }

    fn optional<T: Any + Send + Sync>(&self, injected: Option<&Injected>, site: String) -> Result<Option<Arc<T>>, InjectionError> {
        match injected {
            None => Err(InjectionError::Missing {
                constructor: self.constructor.name.clone(),
                site,
            }),
            Some(Injected::Absent) => Ok(None),
            Some(Injected::Forward(_)) => Err(InjectionError::UnexpectedForwardRef {
                constructor: self.constructor.name.clone(),
                site,
            }),
            Some(Injected::Instance(instance)) => instance
                .clone()
                .downcast::<T>()
                .map(Some)
                .map_err(|_| InjectionError::TypeMismatch {
                    constructor: self.constructor.name.clone(),
                    site,
                    expected: std::any::type_name::<T>(),
                }),
        }
    }

    fn forward(&self, injected: Option<&Injected>, site: String) -> Result<ForwardRef, InjectionError> {
        match injected {
            None => Err(InjectionError::Missing {
                constructor: self.constructor.name.clone(),
                site,
            }),
            Some(Injected::Forward(forward_ref)) => Ok(forward_ref.clone()),
            Some(_) => Err(InjectionError::ForwardRefExpected {
                constructor: self.constructor.name.clone(),
                site,
            }),
        }
    }
}

/// 类型描述符
pub struct TypeDescriptor {
    /// 构造器类型信息
    pub type_info: TypeInfo,
    /// 按声明顺序的参数描述
    pub parameters: Vec<InjectMetadata>,
    /// 按声明顺序的属性描述
    pub properties: Vec<(String, InjectMetadata)>,
    after_resolve: Option<AfterResolveFn>,
    constructor: ConstructorFn,
}

impl TypeDescriptor {
    /// 为类型创建描述符构建器
    pub fn builder<T: Any + Send + Sync>() -> TypeDescriptorBuilder<T> {
        TypeDescriptorBuilder::new()
    }

    /// 调用构造函数
    pub fn construct(&self, injections: Injections) -> anyhow::Result<Instance> {
        (self.constructor)(injections)
    }

    /// 解析后钩子
    pub fn after_resolve(&self) -> Option<&AfterResolveFn> {
        self.after_resolve.as_ref()
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("type_info", &self.type_info)
            .field("parameters", &self.parameters)
            .field("properties", &self.properties)
            .field("after_resolve", &self.after_resolve.is_some())
            .field("constructor", &"<function>")
            .finish()
    }
}

/// 类型描述符构建器
pub struct TypeDescriptorBuilder<T> {
    parameters: Vec<InjectMetadata>,
    properties: Vec<(String, InjectMetadata)>,
    after_resolve: Option<AfterResolveFn>,
    component_type: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> TypeDescriptorBuilder<T> {
    /// 创建构建器
    pub fn new() -> Self {
        Self {
            parameters: Vec::new(),
            properties: Vec::new(),
            after_resolve: None,
            component_type: PhantomData,
        }
    }

    /// 追加构造器参数
    pub fn parameter(mut self, metadata: InjectMetadata) -> Self {
        self.parameters.push(metadata);
        self
    }

    /// 追加属性
    pub fn property(mut self, key: impl Into<String>, metadata: InjectMetadata) -> Self {
        self.properties.push((key.into(), metadata));
        self
    }

    /// 构建描述符
    pub fn build<F>(self, constructor: F) -> TypeDescriptor
    where
        F: Fn(Injections) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        TypeDescriptor {
            type_info: TypeInfo::of::<T>(),
            parameters: self.parameters,
            properties: self.properties,
            after_resolve: self.after_resolve,
            constructor: Arc::new(move |injections| constructor(injections).map(|value| Arc::new(value) as Instance)),
        }
    }
}

impl<T: AfterResolve> TypeDescriptorBuilder<T> {
    /// 启用实例自身的解析后钩子
    pub fn after_resolve(mut self) -> Self {
        self.after_resolve = Some(Arc::new(|instance: Instance| match instance.downcast::<T>() {
            Ok(typed) => typed.after_resolve(),
            Err(_) => MaybeAsync::ready(Err(anyhow::anyhow!(
                "afterResolve 期望 {}",
                std::any::type_name::<T>()
            ))),
        }));
        self
    }
}

impl<T: Any + Send + Sync> Default for TypeDescriptorBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// 类型描述符来源 trait
///
/// 容器只消费描述符，从不自行推导。
pub trait TypeDescriptorSource: Send + Sync {
    /// 获取构造器的描述符
    fn descriptor(&self, type_info: &TypeInfo) -> Option<Arc<TypeDescriptor>>;

    /// 是否包含构造器的描述符
    fn contains(&self, type_info: &TypeInfo) -> bool {
        self.descriptor(type_info).is_some()
    }
}

/// 默认的类型描述符存储
#[derive(Debug, Default)]
pub struct TypeDescriptorStore {
    descriptors: DashMap<TypeId, Arc<TypeDescriptor>>,
}

impl TypeDescriptorStore {
    /// 创建空存储
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加描述符，同一构造器的旧描述符被替换
    pub fn register(&self, descriptor: TypeDescriptor) {
        self.descriptors.insert(descriptor.type_info.id, Arc::new(descriptor));
    }

    /// 添加描述符（构建器风格）
    pub fn with(self, descriptor: TypeDescriptor) -> Self {
        self.register(descriptor);
        self
    }

    /// 描述符数量
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

impl TypeDescriptorSource for TypeDescriptorStore {
    fn descriptor(&self, type_info: &TypeInfo) -> Option<Arc<TypeDescriptor>> {
        self.descriptors.get(&type_info.id).map(|entry| entry.value().clone())
    }

    fn contains(&self, type_info: &TypeInfo) -> bool {
        self.descriptors.contains_key(&type_info.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::instance;

    #[derive(Debug)]
    struct Database;

    #[derive(Debug)]
    struct Repository {
        db: Arc<Database>,
        cache: Option<Arc<String>>,
    }

    fn repository_descriptor() -> TypeDescriptor {
        TypeDescriptor::builder::<Repository>()
            .parameter(InjectMetadata::of::<Database>())
            .property("cache", InjectMetadata::token("cache").optional())
            .build(|injections| {
                Ok(Repository {
                    db: injections.parameter(0)?,
                    cache: injections.optional_property("cache")?,
                })
            })
    }

    #[test]
    fn test_descriptor_construct() {
        let descriptor = repository_descriptor();
        assert_eq!(descriptor.parameters.len(), 1);
        assert_eq!(descriptor.properties[0].0, "cache");
        assert!(descriptor.after_resolve().is_none());

        let injections = Injections::new(
            descriptor.type_info.clone(),
            vec![Injected::Instance(instance(Database))],
            HashMap::from([("cache".to_string(), Injected::Absent)]),
        );
        let repository = descriptor.construct(injections).unwrap().downcast::<Repository>().unwrap();
        assert!(repository.cache.is_none());
        let _db: &Database = &repository.db;
    }

    #[test]
    fn test_injection_errors() {
        let injections = Injections::new(
            TypeInfo::of::<Repository>(),
            vec![Injected::Absent, Injected::Forward(ForwardRef::new()), Injected::Instance(instance(1_u8))],
            HashMap::new(),
        );

        assert!(matches!(injections.parameter::<Database>(0), Err(InjectionError::Absent { .. })));
        assert!(matches!(injections.parameter::<Database>(1), Err(InjectionError::UnexpectedForwardRef { .. })));
        assert!(injections.forward_parameter(1).is_ok());
        assert!(matches!(injections.parameter::<Database>(2), Err(InjectionError::TypeMismatch { .. })));
        assert!(matches!(injections.forward_parameter(2), Err(InjectionError::ForwardRefExpected { .. })));
        assert!(matches!(injections.parameter::<Database>(3), Err(InjectionError::Missing { .. })));
        assert!(matches!(injections.property::<Database>("nope"), Err(InjectionError::Missing { .. })));
    }

    #[test]
    fn test_inject_metadata_builders() {
        let metadata = InjectMetadata::forward_ref(InjectionToken::named("late")).optional();
        assert!(metadata.token.is_none());
        assert!(metadata.optional);
        assert!(metadata.forward_ref_token.is_some());
        assert!(!metadata.weak_ref);
        assert!(InjectMetadata::forward_ref(InjectionToken::named("late")).weak().weak_ref);

        let metadata = InjectMetadata::from_argument(|argument| Ok(argument.cloned().unwrap_or_default()));
        let mapper = metadata.inject_argument_mapper.unwrap();
        let value = mapper(Some(&serde_json::json!(3))).unwrap().downcast::<Value>().unwrap();
        assert_eq!(*value, serde_json::json!(3));

        let metadata = InjectMetadata::of::<u32>().map(|value: Arc<u32>| Ok(*value * 2));
        let doubled = (metadata.mapper.unwrap())(instance(21_u32)).unwrap();
        assert_eq!(*doubled.downcast::<u32>().unwrap(), 42);
    }

    #[test]
    fn test_store() {
        let store = TypeDescriptorStore::new().with(repository_descriptor());
        assert_eq!(store.len(), 1);
        assert!(store.contains(&TypeInfo::of::<Repository>()));
        assert!(store.descriptor(&TypeInfo::of::<Database>()).is_none());
    }
}
