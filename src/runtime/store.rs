//! 实例存储
//!
//! 服务标识 -> 实例 的单例注册表。只在解析器成功构造服务时写入，每个服务
//! 最多写一次；组合完成后所有查询都是纯读操作，只有整体拆除会修改它。

use super::factory::{Constructed, TeardownHook};
use super::index::InterfaceIndex;
use super::metadata::ServiceId;
use crate::errors::LookupError;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// 一个服务在本次组合中构造出的运行时对象
#[derive(Clone)]
pub struct Instance {
    service: ServiceId,
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Instance {
    pub(crate) fn from_constructed(
        service: ServiceId,
        constructed: Constructed,
    ) -> (Self, Option<TeardownHook>) {
        let instance = Self {
            service,
            value: constructed.value,
            type_name: constructed.type_name,
        };
        (instance, constructed.teardown)
    }

    pub fn service(&self) -> &ServiceId {
        &self.service
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// 安全的类型转换
    pub fn downcast<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, LookupError> {
        self.value
            .clone()
            .downcast::<T>()
            .map_err(|_| LookupError::TypeMismatch {
                service: self.service.clone(),
                expected: std::any::type_name::<T>(),
                actual: self.type_name,
            })
    }

    /// 两个句柄是否指向同一个实例
    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("service", &self.service)
            .field("type_name", &self.type_name)
            .finish()
    }
}

/// 内部统计信息（原子计数器）
#[derive(Default)]
struct InnerStats {
    lookups: AtomicUsize,
    failed_lookups: AtomicUsize,
}

/// 存储统计信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub lookups: usize,
    pub failed_lookups: usize,
    pub instances: usize,
}

impl StoreStats {
    pub fn hit_rate(&self) -> f64 {
        if self.lookups == 0 {
            0.0
        } else {
            self.lookups.saturating_sub(self.failed_lookups) as f64 / self.lookups as f64
        }
    }
}

struct StoreInner {
    index: Arc<InterfaceIndex>,
    ui_references: HashMap<String, HashSet<String>>,
    instances: DashMap<ServiceId, Instance>,
    /// 构造顺序，拆除时逆序遍历
    order: Mutex<Vec<ServiceId>>,
    teardown_hooks: Mutex<Vec<(ServiceId, TeardownHook)>>,
    stats: InnerStats,
}

/// 实例存储；克隆是廉价的，所有克隆共享同一份内容
#[derive(Clone)]
pub struct InstanceStore {
    inner: Arc<StoreInner>,
}

impl InstanceStore {
    pub(crate) fn new(
        index: Arc<InterfaceIndex>,
        ui_references: HashMap<String, HashSet<String>>,
    ) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                index,
                ui_references,
                instances: DashMap::new(),
                order: Mutex::new(Vec::new()),
                teardown_hooks: Mutex::new(Vec::new()),
                stats: InnerStats::default(),
            }),
        }
    }

    /// 写入一个新构造的实例；同一服务只能写入一次
    pub(crate) fn insert(&self, instance: Instance, teardown: Option<TeardownHook>) -> bool {
        let service = instance.service.clone();
        match self.inner.instances.entry(service.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                tracing::warn!(service = %service, "Instance already stored, ignoring second write");
                return false;
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(instance);
            }
        }

        self.inner.order.lock().push(service.clone());
        if let Some(hook) = teardown {
            self.inner.teardown_hooks.lock().push((service, hook));
        }
        true
    }

    /// 按服务标识精确查找
    pub fn get_instance(&self, service: &ServiceId) -> Result<Instance, LookupError> {
        let result = self
            .inner
            .instances
            .get(service)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| LookupError::ServiceNotFound(service.clone()));
        self.record(result)
    }

    /// 按接口名查找唯一的已构造提供者
    pub fn get_instance_by_interface(&self, interface: &str) -> Result<Instance, LookupError> {
        let result = self.lookup_interface(interface, None);
        self.record(result)
    }

    /// 按接口名和提供者限定符查找
    pub fn get_instance_by_interface_qualified(
        &self,
        interface: &str,
        qualifier: &str,
    ) -> Result<Instance, LookupError> {
        let result = self.lookup_interface(interface, Some(qualifier));
        self.record(result)
    }

    /// 接口的全部已构造提供者，按索引顺序
    pub fn get_all_instances_by_interface(&self, interface: &str) -> Vec<Instance> {
        self.inner.stats.lookups.fetch_add(1, Ordering::Relaxed);
        self.constructed_candidates(interface, None)
    }

    /// UI 层的查找：只允许包在 ui references 中声明过的接口
    pub fn get_ui_instance(&self, package: &str, interface: &str) -> Result<Instance, LookupError> {
        let declared = self
            .inner
            .ui_references
            .get(package)
            .map(|interfaces| interfaces.contains(interface))
            .unwrap_or(false);

        let result = if declared {
            self.lookup_interface(interface, None)
        } else {
            Err(LookupError::UndeclaredUiReference {
                package: package.to_string(),
                interface: interface.to_string(),
            })
        };
        self.record(result)
    }

    /// 类型化的精确查找
    pub fn get<T: Send + Sync + 'static>(&self, service: &ServiceId) -> Result<Arc<T>, LookupError> {
        self.get_instance(service)?.downcast::<T>()
    }

    /// 类型化的接口查找
    pub fn resolve<T: Send + Sync + 'static>(&self, interface: &str) -> Result<Arc<T>, LookupError> {
        self.get_instance_by_interface(interface)?.downcast::<T>()
    }

    pub fn contains(&self, service: &ServiceId) -> bool {
        self.inner.instances.contains_key(service)
    }

    pub fn len(&self) -> usize {
        self.inner.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.instances.is_empty()
    }

    /// 已构造服务，按构造顺序
    pub fn construction_order(&self) -> Vec<ServiceId> {
        self.inner.order.lock().clone()
    }

    pub fn get_stats(&self) -> StoreStats {
        StoreStats {
            lookups: self.inner.stats.lookups.load(Ordering::Relaxed),
            failed_lookups: self.inner.stats.failed_lookups.load(Ordering::Relaxed),
            instances: self.len(),
        }
    }

    /// 按构造的逆序调用销毁钩子并清空存储
    ///
    /// 钩子失败只记录日志，不会中断拆除。重复调用不会再次执行钩子。
    /// 返回失败的钩子数量。
    pub fn teardown(&self) -> usize {
        let hooks = std::mem::take(&mut *self.inner.teardown_hooks.lock());
        let order = std::mem::take(&mut *self.inner.order.lock());
        let mut hooks: HashMap<ServiceId, TeardownHook> = hooks.into_iter().collect();
        let mut failures = 0;

        for service in order.iter().rev() {
            if let Some(hook) = hooks.remove(service) {
                tracing::debug!(service = %service, "Running teardown hook");
                if let Err(e) = hook() {
                    failures += 1;
                    tracing::warn!(service = %service, error = %e, "Teardown hook failed");
                }
            }
            self.inner.instances.remove(service);
        }

        if !order.is_empty() {
            tracing::info!(services = order.len(), failures, "Instance store torn down");
        }
        failures
    }

    /// 按索引判断唯一性：索引中多个候选即为歧义，即使其中有未构造的提供者
    fn lookup_interface(&self, interface: &str, qualifier: Option<&str>) -> Result<Instance, LookupError> {
        let candidates = self.inner.index.candidates(interface, qualifier);
        match candidates.as_slice() {
            [] => Err(LookupError::MissingInterface {
                interface: interface.to_string(),
            }),
            [only] => self
                .inner
                .instances
                .get(&only.service)
                .map(|entry| entry.value().clone())
                .ok_or_else(|| LookupError::MissingInterface {
                    interface: interface.to_string(),
                }),
            _ => Err(LookupError::AmbiguousInterface {
                interface: interface.to_string(),
                candidates: candidates.iter().map(|p| p.service.clone()).collect(),
            }),
        }
    }

    fn constructed_candidates(&self, interface: &str, qualifier: Option<&str>) -> Vec<Instance> {
        self.inner
            .index
            .candidates(interface, qualifier)
            .into_iter()
            .filter_map(|provider| {
                self.inner
                    .instances
                    .get(&provider.service)
                    .map(|entry| entry.value().clone())
            })
            .collect()
    }

    fn record<T>(&self, result: Result<T, LookupError>) -> Result<T, LookupError> {
        self.inner.stats.lookups.fetch_add(1, Ordering::Relaxed);
        if result.is_err() {
            self.inner.stats.failed_lookups.fetch_add(1, Ordering::Relaxed);
        }
        result
    }
}

impl fmt::Debug for InstanceStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceStore")
            .field("instances", &self.len())
            .finish_non_exhaustive()
    }
}
