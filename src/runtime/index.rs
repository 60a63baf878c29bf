//! 接口索引
//!
//! 由注册表派生：接口名 -> 提供该接口的服务列表。列表顺序为包注册顺序，
//! 其次为服务声明顺序；歧义诊断和多值引用都依赖这个顺序。

use super::metadata::{MetadataRegistry, ServiceId};
use std::collections::{BTreeMap, HashMap};

/// 索引中的一个提供者
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEntry {
    pub service: ServiceId,
    pub qualifier: Option<String>,
    pub(crate) node: usize,
}

impl ProviderEntry {
    fn matches(&self, qualifier: Option<&str>) -> bool {
        match qualifier {
            Some(q) => self.qualifier.as_deref() == Some(q),
            None => true,
        }
    }
}

#[derive(Debug, Default)]
pub struct InterfaceIndex {
    providers: HashMap<String, Vec<ProviderEntry>>,
}

impl InterfaceIndex {
    /// 扫描一次所有服务的 provides 列表
    pub fn build(registry: &MetadataRegistry) -> Self {
        let mut providers: HashMap<String, Vec<ProviderEntry>> = HashMap::new();

        for (node, (id, descriptor)) in registry.services().enumerate() {
            for interface in &descriptor.provides {
                providers
                    .entry(interface.name.clone())
                    .or_default()
                    .push(ProviderEntry {
                        service: id.clone(),
                        qualifier: interface.qualifier.clone(),
                        node,
                    });
            }
        }

        tracing::debug!(interfaces = providers.len(), "Interface index built");
        Self { providers }
    }

    /// 接口 X 的全部提供者
    pub fn providers(&self, interface: &str) -> &[ProviderEntry] {
        self.providers
            .get(interface)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// 按限定符过滤后的候选提供者，保持索引顺序
    pub fn candidates(&self, interface: &str, qualifier: Option<&str>) -> Vec<&ProviderEntry> {
        self.providers(interface)
            .iter()
            .filter(|p| p.matches(qualifier))
            .collect()
    }

    /// 接口 X 是否恰好只有一个提供者
    pub fn unique_provider(&self, interface: &str) -> Option<&ProviderEntry> {
        match self.providers(interface) {
            [only] => Some(only),
            _ => None,
        }
    }

    pub fn contains(&self, interface: &str) -> bool {
        self.providers.contains_key(interface)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// 按接口名排序的视图
    pub fn sorted(&self) -> BTreeMap<&str, &[ProviderEntry]> {
        self.providers
            .iter()
            .map(|(name, entries)| (name.as_str(), entries.as_slice()))
            .collect()
    }
}
