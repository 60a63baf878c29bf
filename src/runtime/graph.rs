//! 依赖图构建
//!
//! 对每个服务的每个引用查询接口索引，生成“服务依赖提供者”的有向边。
//! 个别引用失败不会中断构建：能形成的边全部保留，所有问题一起报告。

use super::diagnostics::{Consumer, Diagnostic, DiagnosticsReporter};
use super::index::InterfaceIndex;
use super::metadata::{MetadataRegistry, ReferenceDescriptor, ServiceId};

/// 引用解析后的绑定目标（节点下标）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingTarget {
    One(usize),
    /// 多值引用，按索引顺序
    Many(Vec<usize>),
}

impl BindingTarget {
    pub fn nodes(&self) -> &[usize] {
        match self {
            BindingTarget::One(node) => std::slice::from_ref(node),
            BindingTarget::Many(nodes) => nodes,
        }
    }
}

/// 一个引用与其提供者的配对
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderBinding {
    pub reference: String,
    pub target: BindingTarget,
}

#[derive(Debug, Clone)]
pub struct GraphNode {
    pub id: ServiceId,
    pub bindings: Vec<ProviderBinding>,
    /// 去重后的依赖节点，保持首次出现的顺序
    pub edges: Vec<usize>,
    /// 至少一个引用无法解析
    pub unresolved: bool,
}

/// 依赖图；节点下标与注册表的服务顺序一致
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<GraphNode>,
}

impl DependencyGraph {
    pub fn build(
        registry: &MetadataRegistry,
        index: &InterfaceIndex,
        reporter: &mut DiagnosticsReporter,
    ) -> Self {
        let mut nodes = Vec::with_capacity(registry.service_count());

        for (id, descriptor) in registry.services() {
            let mut node = GraphNode {
                id: id.clone(),
                bindings: Vec::new(),
                edges: Vec::new(),
                unresolved: false,
            };

            for (name, reference) in &descriptor.references {
                let consumer = Consumer::service(id.clone());
                match resolve_reference(index, &consumer, reference) {
                    Ok(target) => {
                        for &provider in target.nodes() {
                            if !node.edges.contains(&provider) {
                                node.edges.push(provider);
                            }
                        }
                        tracing::debug!(
                            service = %id,
                            reference = %name,
                            interface = %reference.interface,
                            providers = target.nodes().len(),
                            "Reference resolved"
                        );
                        node.bindings.push(ProviderBinding {
                            reference: name.clone(),
                            target,
                        });
                    }
                    Err(diagnostic) => {
                        node.unresolved = true;
                        reporter.report(diagnostic);
                    }
                }
            }

            nodes.push(node);
        }

        for package in registry.packages() {
            let consumer = Consumer::ui(&package.name);
            for interface in &package.ui_references {
                let reference = ReferenceDescriptor::single(interface.as_str());
                if let Err(diagnostic) = resolve_reference(index, &consumer, &reference) {
                    reporter.report(diagnostic);
                }
            }
        }

        Self { nodes }
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> &GraphNode {
        &self.nodes[index]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.iter().map(|n| n.edges.len()).sum()
    }

    /// `from` 是否直接依赖 `to`
    pub fn has_edge(&self, from: &ServiceId, to: &ServiceId) -> bool {
        self.nodes
            .iter()
            .find(|n| &n.id == from)
            .map(|n| n.edges.iter().any(|&e| &self.nodes[e].id == to))
            .unwrap_or(false)
    }
}

/// 0 个候选 -> 缺失；1 个 -> 单边；多个且单值 -> 歧义；多个且多值 -> 每个候选一条边
fn resolve_reference(
    index: &InterfaceIndex,
    consumer: &Consumer,
    reference: &ReferenceDescriptor,
) -> Result<BindingTarget, Diagnostic> {
    let candidates = index.candidates(&reference.interface, reference.qualifier.as_deref());

    match candidates.as_slice() {
        [] => Err(Diagnostic::MissingInterface {
            consumer: consumer.clone(),
            interface: reference.interface.clone(),
        }),
        [only] if !reference.multi_valued => Ok(BindingTarget::One(only.node)),
        _ if reference.multi_valued => Ok(BindingTarget::Many(
            candidates.iter().map(|p| p.node).collect(),
        )),
        _ => Err(Diagnostic::AmbiguousInterface {
            consumer: consumer.clone(),
            interface: reference.interface.clone(),
            candidates: candidates.iter().map(|p| p.service.clone()).collect(),
        }),
    }
}
