//! 服务构造例程
//!
//! 每个服务携带一个构造能力（`ServiceFactory`），组合时以已解析引用的实例
//! 调用它，不依赖运行时类型反射。

use super::metadata::{PackageProperties, ServiceId};
use super::store::Instance;
use crate::errors::{BoxError, LookupError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// 实例销毁时调用的钩子
pub type TeardownHook = Box<dyn FnOnce() -> Result<(), BoxError> + Send>;

/// 构造例程的产出：实例值以及可选的销毁钩子
pub struct Constructed {
    pub(crate) value: Arc<dyn Any + Send + Sync>,
    pub(crate) type_name: &'static str,
    pub(crate) teardown: Option<TeardownHook>,
}

impl Constructed {
    pub fn new<T: Send + Sync + 'static>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    pub fn from_arc<T: Send + Sync + 'static>(value: Arc<T>) -> Self {
        Self {
            value: value as Arc<dyn Any + Send + Sync>,
            type_name: std::any::type_name::<T>(),
            teardown: None,
        }
    }

    /// 注册销毁钩子；组合拆除时按构造的逆序调用
    pub fn with_teardown<F>(mut self, hook: F) -> Self
    where
        F: FnOnce() -> Result<(), BoxError> + Send + 'static,
    {
        self.teardown = Some(Box::new(hook));
        self
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl std::fmt::Debug for Constructed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Constructed")
            .field("type_name", &self.type_name)
            .field("has_teardown", &self.teardown.is_some())
            .finish()
    }
}

/// 注入给构造例程的一个已绑定引用
#[derive(Debug, Clone)]
pub enum BoundReference {
    Single(Instance),
    /// 多值引用：按索引顺序排列的全部提供者实例
    All(Vec<Instance>),
}

/// 构造一个服务时可见的上下文
#[derive(Debug, Clone)]
pub struct ServiceContext {
    service: ServiceId,
    references: HashMap<String, BoundReference>,
    properties: Arc<PackageProperties>,
}

impl ServiceContext {
    pub(crate) fn new(
        service: ServiceId,
        references: HashMap<String, BoundReference>,
        properties: Arc<PackageProperties>,
    ) -> Self {
        Self {
            service,
            references,
            properties,
        }
    }

    pub fn service_id(&self) -> &ServiceId {
        &self.service
    }

    pub fn bound(&self, reference: &str) -> Option<&BoundReference> {
        self.references.get(reference)
    }

    /// 已绑定的引用名（无序）
    pub fn bound_names(&self) -> impl Iterator<Item = &str> {
        self.references.keys().map(String::as_str)
    }

    /// 获取单值引用的实例
    pub fn reference<T: Send + Sync + 'static>(&self, reference: &str) -> Result<Arc<T>, LookupError> {
        match self.references.get(reference) {
            Some(BoundReference::Single(instance)) => instance.downcast::<T>(),
            Some(BoundReference::All(_)) => Err(LookupError::MultiValuedReference {
                service: self.service.clone(),
                reference: reference.to_string(),
            }),
            None => Err(self.not_bound(reference)),
        }
    }

    /// 获取引用的全部实例；单值引用返回只含一个元素的列表
    pub fn references<T: Send + Sync + 'static>(
        &self,
        reference: &str,
    ) -> Result<Vec<Arc<T>>, LookupError> {
        match self.references.get(reference) {
            Some(BoundReference::Single(instance)) => Ok(vec![instance.downcast::<T>()?]),
            Some(BoundReference::All(instances)) => {
                instances.iter().map(|i| i.downcast::<T>()).collect()
            }
            None => Err(self.not_bound(reference)),
        }
    }

    pub fn properties(&self) -> &PackageProperties {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// 将属性反序列化为具体类型；属性不存在时返回 `Ok(None)`
    pub fn property_as<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, serde_json::Error> {
        self.properties
            .get(name)
            .map(|value| serde_json::from_value(value.clone()))
            .transpose()
    }

    fn not_bound(&self, reference: &str) -> LookupError {
        LookupError::ReferenceNotBound {
            service: self.service.clone(),
            reference: reference.to_string(),
        }
    }
}

/// 服务工厂trait
#[async_trait]
pub trait ServiceFactory: Send + Sync {
    /// 创建服务实例；可以在返回前挂起
    async fn create(&self, context: ServiceContext) -> Result<Constructed, BoxError>;
}

/// 函数式服务工厂
pub struct FnServiceFactory<F> {
    factory_fn: F,
}

impl<F> FnServiceFactory<F> {
    pub fn new(factory_fn: F) -> Self {
        Self { factory_fn }
    }
}

#[async_trait]
impl<F> ServiceFactory for FnServiceFactory<F>
where
    F: Fn(ServiceContext) -> Result<Constructed, BoxError> + Send + Sync + 'static,
{
    async fn create(&self, context: ServiceContext) -> Result<Constructed, BoxError> {
        (self.factory_fn)(context)
    }
}

/// 异步函数式服务工厂
pub struct AsyncFnServiceFactory<F> {
    factory_fn: F,
}

impl<F> AsyncFnServiceFactory<F> {
    pub fn new(factory_fn: F) -> Self {
        Self { factory_fn }
    }
}

#[async_trait]
impl<F, Fut> ServiceFactory for AsyncFnServiceFactory<F>
where
    F: Fn(ServiceContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Constructed, BoxError>> + Send + 'static,
{
    async fn create(&self, context: ServiceContext) -> Result<Constructed, BoxError> {
        (self.factory_fn)(context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[derive(Debug, PartialEq)]
    struct Greeter(&'static str);

    fn instance_of<T: Send + Sync + 'static>(package: &str, value: T) -> Instance {
        Instance::from_constructed(ServiceId::new(package, "svc"), Constructed::new(value)).0
    }

    fn context(references: HashMap<String, BoundReference>) -> ServiceContext {
        let properties: BTreeMap<String, Value> =
            BTreeMap::from([("zoom".to_string(), json!(4))]);
        ServiceContext::new(
            ServiceId::new("app", "consumer"),
            references,
            Arc::new(PackageProperties::from_values(properties)),
        )
    }

    #[test]
    fn test_single_and_multi_references() {
        let mut references = HashMap::new();
        references.insert(
            "greeter".to_string(),
            BoundReference::Single(instance_of("a", Greeter("hello"))),
        );
        references.insert(
            "all".to_string(),
            BoundReference::All(vec![
                instance_of("a", Greeter("hello")),
                instance_of("b", Greeter("hi")),
            ]),
        );
        let ctx = context(references);

        assert_eq!(*ctx.reference::<Greeter>("greeter").unwrap(), Greeter("hello"));
        assert_eq!(ctx.references::<Greeter>("greeter").unwrap().len(), 1);

        let all = ctx.references::<Greeter>("all").unwrap();
        assert_eq!(all.iter().map(|g| g.0).collect::<Vec<_>>(), vec!["hello", "hi"]);

        assert!(matches!(
            ctx.reference::<Greeter>("all"),
            Err(LookupError::MultiValuedReference { .. })
        ));
        assert!(matches!(
            ctx.reference::<Greeter>("missing"),
            Err(LookupError::ReferenceNotBound { .. })
        ));
        assert!(matches!(
            ctx.reference::<String>("greeter"),
            Err(LookupError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_property_access() {
        let ctx = context(HashMap::new());
        assert_eq!(ctx.property("zoom"), Some(&json!(4)));
        assert_eq!(ctx.property_as::<u32>("zoom").unwrap(), Some(4));
        assert_eq!(ctx.property_as::<u32>("absent").unwrap(), None);
        assert!(ctx.property_as::<String>("zoom").is_err());
    }

    #[tokio::test]
    async fn test_fn_factories() {
        let sync_factory = FnServiceFactory::new(|ctx: ServiceContext| {
            Ok::<_, BoxError>(Constructed::new(ctx.service_id().to_string()))
        });
        let created = sync_factory.create(context(HashMap::new())).await.unwrap();
        assert!(created.type_name().contains("String"));

        let async_factory = AsyncFnServiceFactory::new(|_ctx: ServiceContext| async {
            tokio::task::yield_now().await;
            Ok::<_, BoxError>(Constructed::new(42u8).with_teardown(|| Ok(())))
        });
        let created = async_factory.create(context(HashMap::new())).await.unwrap();
        assert!(created.teardown.is_some());
        assert_eq!(created.type_name(), "u8");
    }
}
