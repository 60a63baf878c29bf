//! 包元数据注册表
//!
//! 保存每个包声明的形状：服务、服务提供的接口、服务引用的接口以及包属性。
//! 注册表在组合开始时一次性加载并校验，之后只读。

use super::diagnostics::{Diagnostic, DiagnosticsReporter};
use super::factory::{
    AsyncFnServiceFactory, Constructed, FnServiceFactory, ServiceContext, ServiceFactory,
};
use crate::errors::BoxError;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// 服务的全局标识：包名 + 包内服务名
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ServiceId {
    pub package: String,
    pub service: String,
}

impl ServiceId {
    pub fn new(package: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            service: service.into(),
        }
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.package, self.service)
    }
}

/// 服务对某个接口的引用声明
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceDescriptor {
    /// 被引用的接口名
    pub interface: String,
    /// 为 true 时注入全部提供者（按索引顺序），否则要求唯一提供者
    pub multi_valued: bool,
    /// 只匹配带有该限定符的提供者
    pub qualifier: Option<String>,
}

impl ReferenceDescriptor {
    /// 单值引用
    pub fn single(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            multi_valued: false,
            qualifier: None,
        }
    }

    /// 注入全部提供者的引用
    pub fn all(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            multi_valued: true,
            qualifier: None,
        }
    }

    pub fn qualified(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }
}

/// 服务提供的接口声明
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvidedInterface {
    pub name: String,
    pub qualifier: Option<String>,
}

impl ProvidedInterface {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            qualifier: None,
        }
    }

    pub fn qualified(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }
}

impl From<&str> for ProvidedInterface {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ProvidedInterface {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// 服务描述：名称、构造例程、引用和提供的接口
#[derive(Clone)]
pub struct ServiceDescriptor {
    pub name: String,
    pub factory: Arc<dyn ServiceFactory>,
    /// 按声明顺序保存的引用（引用名, 描述）
    pub references: Vec<(String, ReferenceDescriptor)>,
    pub provides: Vec<ProvidedInterface>,
}

impl ServiceDescriptor {
    pub fn new(name: impl Into<String>, factory: Arc<dyn ServiceFactory>) -> Self {
        Self {
            name: name.into(),
            factory,
            references: Vec::new(),
            provides: Vec::new(),
        }
    }

    /// 使用同步构造函数创建服务描述
    pub fn from_fn<F>(name: impl Into<String>, factory_fn: F) -> Self
    where
        F: Fn(ServiceContext) -> Result<Constructed, BoxError> + Send + Sync + 'static,
    {
        Self::new(name, Arc::new(FnServiceFactory::new(factory_fn)))
    }

    /// 使用可挂起的构造函数创建服务描述
    pub fn from_async<F, Fut>(name: impl Into<String>, factory_fn: F) -> Self
    where
        F: Fn(ServiceContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Constructed, BoxError>> + Send + 'static,
    {
        Self::new(name, Arc::new(AsyncFnServiceFactory::new(factory_fn)))
    }

    pub fn reference(mut self, name: impl Into<String>, reference: ReferenceDescriptor) -> Self {
        self.references.push((name.into(), reference));
        self
    }

    pub fn provides(mut self, interface: impl Into<ProvidedInterface>) -> Self {
        self.provides.push(interface.into());
        self
    }
}

impl fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("name", &self.name)
            .field("references", &self.references)
            .field("provides", &self.provides)
            .finish_non_exhaustive()
    }
}

/// 包属性声明
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    /// 包定义的默认值
    pub value: Value,
    /// 应用是否必须提供该属性
    pub required: bool,
}

impl PropertyDescriptor {
    pub fn optional(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            required: false,
        }
    }

    pub fn required() -> Self {
        Self {
            value: Value::Null,
            required: true,
        }
    }
}

/// 包描述
#[derive(Debug, Clone)]
pub struct PackageDescriptor {
    pub name: String,
    pub services: Vec<ServiceDescriptor>,
    pub properties: BTreeMap<String, PropertyDescriptor>,
    /// UI 层允许请求的接口
    pub ui_references: Vec<String>,
}

impl PackageDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            services: Vec::new(),
            properties: BTreeMap::new(),
            ui_references: Vec::new(),
        }
    }

    pub fn service(mut self, service: ServiceDescriptor) -> Self {
        self.services.push(service);
        self
    }

    pub fn property(mut self, name: impl Into<String>, property: PropertyDescriptor) -> Self {
        self.properties.insert(name.into(), property);
        self
    }

    pub fn ui_reference(mut self, interface: impl Into<String>) -> Self {
        self.ui_references.push(interface.into());
        self
    }
}

/// 一个包的生效属性（应用值优先于包默认值）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackageProperties {
    values: BTreeMap<String, Value>,
}

impl PackageProperties {
    #[cfg(test)]
    pub(crate) fn from_values(values: BTreeMap<String, Value>) -> Self {
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// 属性求值结果
#[derive(Debug, Default)]
pub struct ResolvedProperties {
    pub(crate) by_package: HashMap<String, Arc<PackageProperties>>,
    /// 缺少必填属性的包，其服务不会被构造
    pub(crate) incomplete: HashSet<String>,
}

impl ResolvedProperties {
    pub fn package(&self, name: &str) -> Arc<PackageProperties> {
        self.by_package.get(name).cloned().unwrap_or_default()
    }

    pub fn is_incomplete(&self, package: &str) -> bool {
        self.incomplete.contains(package)
    }
}

/// 注册表中的一个服务条目；条目在 `entries` 中的位置即图中的节点下标
#[derive(Debug, Clone)]
pub(crate) struct ServiceEntry {
    pub id: ServiceId,
    pub package: usize,
    pub service: usize,
}

/// 元数据注册表
#[derive(Debug)]
pub struct MetadataRegistry {
    packages: Vec<PackageDescriptor>,
    entries: Vec<ServiceEntry>,
    by_id: HashMap<ServiceId, usize>,
}

impl MetadataRegistry {
    /// 加载并校验包描述；任何结构问题都会以诊断列表返回
    pub fn load(packages: Vec<PackageDescriptor>) -> Result<Self, Vec<Diagnostic>> {
        let problems = validate(&packages);
        if !problems.is_empty() {
            return Err(problems);
        }

        let mut entries = Vec::new();
        let mut by_id = HashMap::new();
        for (package_pos, package) in packages.iter().enumerate() {
            for (service_pos, service) in package.services.iter().enumerate() {
                let id = ServiceId::new(&package.name, &service.name);
                by_id.insert(id.clone(), entries.len());
                entries.push(ServiceEntry {
                    id,
                    package: package_pos,
                    service: service_pos,
                });
            }
        }

        Ok(Self {
            packages,
            entries,
            by_id,
        })
    }

    pub fn packages(&self) -> &[PackageDescriptor] {
        &self.packages
    }

    pub fn package(&self, name: &str) -> Option<&PackageDescriptor> {
        self.packages.iter().find(|p| p.name == name)
    }

    /// 按注册顺序（包顺序，然后服务声明顺序）遍历所有服务
    pub fn services(&self) -> impl Iterator<Item = (&ServiceId, &ServiceDescriptor)> {
        self.entries
            .iter()
            .map(move |entry| (&entry.id, self.descriptor_of(entry)))
    }

    pub fn service(&self, id: &ServiceId) -> Option<&ServiceDescriptor> {
        self.by_id
            .get(id)
            .map(|&node| self.descriptor_of(&self.entries[node]))
    }

    pub fn service_count(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn descriptor_at(&self, node: usize) -> &ServiceDescriptor {
        self.descriptor_of(&self.entries[node])
    }

    fn descriptor_of(&self, entry: &ServiceEntry) -> &ServiceDescriptor {
        &self.packages[entry.package].services[entry.service]
    }

    /// 计算每个包的生效属性
    ///
    /// 应用提供的值覆盖包默认值；必填但未提供的属性产生 `MissingProperty`，
    /// 应用提供了但包未声明的属性产生 `UnknownProperty`（该值被忽略）。
    pub fn resolve_properties(
        &self,
        overrides: &BTreeMap<String, BTreeMap<String, Value>>,
        reporter: &mut DiagnosticsReporter,
    ) -> ResolvedProperties {
        let mut resolved = ResolvedProperties::default();

        for package in &self.packages {
            let supplied = overrides.get(&package.name);
            let mut values = BTreeMap::new();

            for (name, declared) in &package.properties {
                match supplied.and_then(|s| s.get(name)) {
                    Some(value) => {
                        values.insert(name.clone(), value.clone());
                    }
                    None if declared.required => {
                        reporter.report(Diagnostic::MissingProperty {
                            package: package.name.clone(),
                            property: name.clone(),
                        });
                        resolved.incomplete.insert(package.name.clone());
                    }
                    None => {
                        values.insert(name.clone(), declared.value.clone());
                    }
                }
            }

            if let Some(supplied) = supplied {
                for name in supplied.keys() {
                    if !package.properties.contains_key(name) {
                        reporter.report(Diagnostic::UnknownProperty {
                            package: package.name.clone(),
                            property: name.clone(),
                        });
                    }
                }
            }

            resolved
                .by_package
                .insert(package.name.clone(), Arc::new(PackageProperties { values }));
        }

        for package in overrides.keys() {
            if self.package(package).is_none() {
                tracing::warn!(package = %package, "Properties supplied for unknown package");
            }
        }

        resolved
    }
}

fn validate(packages: &[PackageDescriptor]) -> Vec<Diagnostic> {
    let mut problems = Vec::new();
    let mut package_names = HashSet::new();

    let malformed = |package: &str, problem: String| Diagnostic::MalformedMetadata {
        package: package.to_string(),
        problem,
    };

    for package in packages {
        if package.name.trim().is_empty() {
            problems.push(malformed(&package.name, "package name is empty".into()));
        } else if !package_names.insert(package.name.as_str()) {
            problems.push(malformed(
                &package.name,
                format!("package name '{}' is registered more than once", package.name),
            ));
        }

        let mut service_names = HashSet::new();
        for service in &package.services {
            if service.name.trim().is_empty() {
                problems.push(malformed(&package.name, "service name is empty".into()));
                continue;
            }
            if !service_names.insert(service.name.as_str()) {
                problems.push(Diagnostic::DuplicateServiceName {
                    service: ServiceId::new(&package.name, &service.name),
                });
                continue;
            }

            let mut provided = HashSet::new();
            for interface in &service.provides {
                if interface.name.trim().is_empty() {
                    problems.push(malformed(
                        &package.name,
                        format!("service '{}' provides an interface with an empty name", service.name),
                    ));
                } else if !provided.insert(interface.name.as_str()) {
                    problems.push(malformed(
                        &package.name,
                        format!(
                            "service '{}' provides interface '{}' more than once",
                            service.name, interface.name
                        ),
                    ));
                }
            }

            let mut reference_names = HashSet::new();
            for (name, reference) in &service.references {
                if !reference_names.insert(name.as_str()) {
                    problems.push(malformed(
                        &package.name,
                        format!("service '{}' declares reference '{}' more than once", service.name, name),
                    ));
                }
                if reference.interface.trim().is_empty() {
                    problems.push(malformed(
                        &package.name,
                        format!("reference '{}' of service '{}' names no interface", name, service.name),
                    ));
                }
            }
        }

        if package.ui_references.iter().any(|i| i.trim().is_empty()) {
            problems.push(malformed(&package.name, "ui reference with an empty interface name".into()));
        }
    }

    problems
}
