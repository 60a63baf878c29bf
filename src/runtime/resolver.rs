//! 解析与实例化
//!
//! 1. 三色深度优先遍历求拓扑序，遇到回边即报告完整环路；
//! 2. 标记可构造的服务（自身引用全部解析、包属性完整、依赖均可构造）；
//! 3. 按拓扑序依次调用构造例程，前一个构造（包括挂起）完成后才开始下一个；
//! 4. 任何构造失败时，逆序销毁本轮已创建的实例。

use super::diagnostics::{Diagnostic, DiagnosticsReporter};
use super::factory::{BoundReference, ServiceContext, TeardownHook};
use super::graph::{BindingTarget, DependencyGraph};
use super::metadata::{MetadataRegistry, ResolvedProperties, ServiceId};
use super::store::{Instance, InstanceStore};
use crate::errors::BoxError;
use std::collections::HashMap;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// 解析器中止的原因
#[derive(Debug)]
pub enum ResolveFailure {
    /// 环路，首尾是同一个服务
    Cycle(Vec<ServiceId>),
    Construction { service: ServiceId, source: BoxError },
}

/// 求构造顺序：依赖在前，相互独立的服务按注册顺序
///
/// 出现环路时返回环上的节点序列（首尾相同）。
pub fn construction_order(graph: &DependencyGraph) -> Result<Vec<usize>, Vec<usize>> {
    let mut marks = vec![Mark::Unvisited; graph.len()];
    let mut order = Vec::with_capacity(graph.len());

    for root in 0..graph.len() {
        if marks[root] != Mark::Unvisited {
            continue;
        }

        // (节点, 下一条待访问的边)
        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
        marks[root] = Mark::InProgress;

        while let Some(frame) = stack.last_mut() {
            let node = frame.0;
            let edges = &graph.node(node).edges;

            if frame.1 == edges.len() {
                marks[node] = Mark::Done;
                order.push(node);
                stack.pop();
                continue;
            }

            let dependency = edges[frame.1];
            frame.1 += 1;

            match marks[dependency] {
                Mark::Unvisited => {
                    marks[dependency] = Mark::InProgress;
                    stack.push((dependency, 0));
                }
                Mark::InProgress => {
                    let start = stack
                        .iter()
                        .position(|&(n, _)| n == dependency)
                        .unwrap_or(0);
                    let mut cycle: Vec<usize> = stack[start..].iter().map(|&(n, _)| n).collect();
                    cycle.push(dependency);
                    return Err(cycle);
                }
                Mark::Done => {}
            }
        }
    }

    Ok(order)
}

/// 解析器：持有一次组合过程的只读输入
pub struct Resolver<'a> {
    registry: &'a MetadataRegistry,
    graph: &'a DependencyGraph,
    properties: &'a ResolvedProperties,
}

impl<'a> Resolver<'a> {
    pub fn new(
        registry: &'a MetadataRegistry,
        graph: &'a DependencyGraph,
        properties: &'a ResolvedProperties,
    ) -> Self {
        Self {
            registry,
            graph,
            properties,
        }
    }

    /// 计算顺序并构造所有可构造的服务，实例写入 `store`
    ///
    /// 失败时 `store` 已被清空，本轮创建的实例都已按逆序销毁。
    pub async fn run(
        &self,
        store: &InstanceStore,
        reporter: &mut DiagnosticsReporter,
    ) -> Result<(), ResolveFailure> {
        let order = match construction_order(self.graph) {
            Ok(order) => order,
            Err(cycle) => {
                let path: Vec<ServiceId> = cycle
                    .into_iter()
                    .map(|node| self.graph.node(node).id.clone())
                    .collect();
                reporter.report(Diagnostic::CyclicDependency { path: path.clone() });
                return Err(ResolveFailure::Cycle(path));
            }
        };

        let viable = self.viable_nodes(&order, reporter);
        let mut constructed: Vec<Option<Instance>> = vec![None; self.graph.len()];

        for &node in &order {
            if !viable[node] {
                continue;
            }

            let id = &self.graph.node(node).id;
            match self.construct(node, &constructed).await {
                Ok((instance, hook)) => {
                    store.insert(instance.clone(), hook);
                    constructed[node] = Some(instance);
                }
                Err(source) => {
                    reporter.report(Diagnostic::ConstructionFailure {
                        service: id.clone(),
                        cause: source.to_string(),
                    });
                    let failures = store.teardown();
                    if failures > 0 {
                        tracing::warn!(failures, "Teardown hooks failed while unwinding composition");
                    }
                    return Err(ResolveFailure::Construction {
                        service: id.clone(),
                        source,
                    });
                }
            }
        }

        Ok(())
    }

    /// 按拓扑序判断每个节点能否构造；因依赖不可用而跳过的服务会得到诊断
    fn viable_nodes(&self, order: &[usize], reporter: &mut DiagnosticsReporter) -> Vec<bool> {
        let mut viable = vec![false; self.graph.len()];

        for &node in order {
            let graph_node = self.graph.node(node);
            if graph_node.unresolved || self.properties.is_incomplete(&graph_node.id.package) {
                continue;
            }

            match graph_node.edges.iter().find(|&&dep| !viable[dep]) {
                Some(&dep) => reporter.report(Diagnostic::UnavailableDependency {
                    service: graph_node.id.clone(),
                    dependency: self.graph.node(dep).id.clone(),
                }),
                None => viable[node] = true,
            }
        }

        viable
    }

    async fn construct(
        &self,
        node: usize,
        constructed: &[Option<Instance>],
    ) -> Result<(Instance, Option<TeardownHook>), BoxError> {
        let graph_node = self.graph.node(node);
        let descriptor = self.registry.descriptor_at(node);

        let mut references = HashMap::with_capacity(graph_node.bindings.len());
        for binding in &graph_node.bindings {
            let bound = match &binding.target {
                BindingTarget::One(provider) => BoundReference::Single(instance_at(constructed, *provider)?),
                BindingTarget::Many(providers) => BoundReference::All(
                    providers
                        .iter()
                        .map(|&p| instance_at(constructed, p))
                        .collect::<Result<Vec<_>, _>>()?,
                ),
            };
            references.insert(binding.reference.clone(), bound);
        }

        let context = ServiceContext::new(
            graph_node.id.clone(),
            references,
            self.properties.package(&graph_node.id.package),
        );

        let started = Instant::now();
        let output = descriptor.factory.create(context).await?;
        let (instance, hook) = Instance::from_constructed(graph_node.id.clone(), output);

        tracing::debug!(
            service = %graph_node.id,
            type_name = instance.type_name(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "Service constructed"
        );

        Ok((instance, hook))
    }
}

fn instance_at(constructed: &[Option<Instance>], node: usize) -> Result<Instance, BoxError> {
    constructed[node]
        .clone()
        .ok_or_else(|| format!("provider node {} was not constructed before its consumer", node).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::factory::Constructed;
    use crate::runtime::index::InterfaceIndex;
    use crate::runtime::metadata::{PackageDescriptor, ReferenceDescriptor, ServiceDescriptor};
    use rand::{rngs::StdRng, Rng, SeedableRng};

    /// 每个服务 `s{i}` 提供接口 `I{i}`，并引用 `deps[i]` 中各服务的接口
    fn graph_of(deps: &[Vec<usize>]) -> DependencyGraph {
        let mut package = PackageDescriptor::new("p");
        for (i, targets) in deps.iter().enumerate() {
            let mut service = ServiceDescriptor::from_fn(format!("s{}", i), |_| Ok(Constructed::new(())))
                .provides(format!("I{}", i));
            for target in targets {
                service = service.reference(format!("r{}", target), ReferenceDescriptor::single(format!("I{}", target)));
            }
            package = package.service(service);
        }
        let registry = MetadataRegistry::load(vec![package]).unwrap();
        let index = InterfaceIndex::build(&registry);
        let mut reporter = DiagnosticsReporter::new();
        let graph = DependencyGraph::build(&registry, &index, &mut reporter);
        assert!(reporter.is_empty());
        graph
    }

    #[test]
    fn test_order_places_dependencies_first() {
        // 0 -> 2, 1 -> 0, 2 无依赖
        let graph = graph_of(&[vec![2], vec![0], vec![]]);
        assert_eq!(construction_order(&graph).unwrap(), vec![2, 0, 1]);
    }

    #[test]
    fn test_independent_services_keep_registration_order() {
        let graph = graph_of(&[vec![], vec![], vec![]]);
        assert_eq!(construction_order(&graph).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_random_dags_are_topologically_valid() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let size = rng.gen_range(1..30);
            // 只允许指向更小下标的边，保证无环；再打乱声明顺序
            let mut deps: Vec<Vec<usize>> = (0..size)
                .map(|i| (0..i).filter(|_| rng.gen_bool(0.2)).collect())
                .collect();
            let shift = rng.gen_range(0..size);
            deps.rotate_left(shift);
            for targets in deps.iter_mut() {
                for t in targets.iter_mut() {
                    *t = (*t + size - shift) % size;
                }
            }

            let graph = graph_of(&deps);
            let order = construction_order(&graph).unwrap();
            assert_eq!(order.len(), size);

            let position: HashMap<usize, usize> =
                order.iter().enumerate().map(|(pos, &node)| (node, pos)).collect();
            for (node, targets) in deps.iter().enumerate() {
                for target in targets {
                    assert!(position[target] < position[&node]);
                }
            }
        }
    }

    #[test]
    fn test_cycle_path_is_a_true_cycle() {
        // 0 -> 1 -> 2 -> 3 -> 1
        let graph = graph_of(&[vec![1], vec![2], vec![3], vec![1]]);
        let cycle = construction_order(&graph).unwrap_err();
        assert_eq!(cycle, vec![1, 2, 3, 1]);
        assert_eq!(cycle.first(), cycle.last());
        for pair in cycle.windows(2) {
            assert!(graph.node(pair[0]).edges.contains(&pair[1]));
        }
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let graph = graph_of(&[vec![0]]);
        assert_eq!(construction_order(&graph).unwrap_err(), vec![0, 0]);
    }
}
