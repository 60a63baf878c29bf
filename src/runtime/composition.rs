//! 组合上下文
//!
//! 一次组合 = 注册表 -> 接口索引 -> 依赖图 -> 解析器 -> 实例存储。
//! 每次组合创建自己的上下文对象，进程内不存在全局可变注册表。

use super::diagnostics::{CompositionReport, Diagnostic, DiagnosticsReporter};
use super::graph::DependencyGraph;
use super::index::InterfaceIndex;
use super::metadata::{MetadataRegistry, PackageDescriptor, ServiceId};
use super::resolver::{ResolveFailure, Resolver};
use super::store::InstanceStore;
use crate::config::RuntimeConfig;
use crate::errors::CompositionError;
use crate::logging::OperationTimer;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// 组合器：携带应用提供的包属性值
#[derive(Debug, Clone, Default)]
pub struct Composer {
    properties: BTreeMap<String, BTreeMap<String, Value>>,
}

impl Composer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从运行时配置中读取应用属性
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            properties: config.properties.clone(),
        }
    }

    /// 为某个包设置属性值，覆盖包声明的默认值
    pub fn with_properties<I, K>(mut self, package: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let entry = self.properties.entry(package.into()).or_default();
        for (name, value) in values {
            entry.insert(name.into(), value);
        }
        self
    }

    /// 执行一次完整的组合
    ///
    /// 只有元数据结构错误、环路和构造失败是致命的；缺失或歧义的接口作为
    /// 诊断随结果返回，存储中包含所有能够构造的服务。
    pub async fn compose(&self, packages: Vec<PackageDescriptor>) -> Result<Composition, CompositionError> {
        let timer = OperationTimer::new("compose").with_metadata("packages", &packages.len().to_string());
        tracing::info!(packages = packages.len(), "Starting composition");

        let mut reporter = DiagnosticsReporter::new();

        let registry = match MetadataRegistry::load(packages) {
            Ok(registry) => registry,
            Err(problems) => {
                reporter.extend(problems);
                return Err(CompositionError::MalformedMetadata {
                    report: reporter.finish(),
                });
            }
        };

        let properties = registry.resolve_properties(&self.properties, &mut reporter);
        let index = Arc::new(InterfaceIndex::build(&registry));
        let graph = DependencyGraph::build(&registry, &index, &mut reporter);
        tracing::debug!(
            services = graph.len(),
            edges = graph.edge_count(),
            "Dependency graph built"
        );

        let ui_references: HashMap<String, HashSet<String>> = registry
            .packages()
            .iter()
            .map(|p| (p.name.clone(), p.ui_references.iter().cloned().collect()))
            .collect();
        let store = InstanceStore::new(index.clone(), ui_references);

        let resolver = Resolver::new(&registry, &graph, &properties);
        if let Err(failure) = resolver.run(&store, &mut reporter).await {
            let report = reporter.finish();
            return Err(match failure {
                ResolveFailure::Cycle(path) => CompositionError::CyclicDependency { path, report },
                ResolveFailure::Construction { service, source } => {
                    CompositionError::ConstructionFailure {
                        service,
                        source,
                        report,
                    }
                }
            });
        }

        let report = reporter.finish();
        tracing::info!(
            constructed = store.len(),
            services = registry.service_count(),
            diagnostics = report.len(),
            "Composition finished"
        );
        timer.finish();

        Ok(Composition {
            store,
            report,
            index,
            graph,
        })
    }
}

/// 使用默认设置组合一组包
pub async fn compose(packages: Vec<PackageDescriptor>) -> Result<Composition, CompositionError> {
    Composer::new().compose(packages).await
}

/// 一次成功（可能带有非致命诊断）的组合
#[derive(Debug)]
pub struct Composition {
    store: InstanceStore,
    report: CompositionReport,
    index: Arc<InterfaceIndex>,
    graph: DependencyGraph,
}

impl Composition {
    pub fn store(&self) -> &InstanceStore {
        &self.store
    }

    pub fn report(&self) -> &CompositionReport {
        &self.report
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        self.report.diagnostics()
    }

    pub fn index(&self) -> &InterfaceIndex {
        &self.index
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// 实际构造的服务，按构造顺序
    pub fn construction_order(&self) -> Vec<ServiceId> {
        self.store.construction_order()
    }

    /// 是否所有服务都已构造且没有任何诊断
    pub fn is_complete(&self) -> bool {
        self.report.is_empty() && self.store.len() == self.graph.len()
    }

    /// 按构造的逆序销毁所有实例；返回失败的销毁钩子数量
    pub fn teardown(&self) -> usize {
        self.store.teardown()
    }

    pub fn into_parts(self) -> (InstanceStore, CompositionReport) {
        (self.store, self.report)
    }
}
