//! 部署清单
//!
//! 以 TOML 描述一组包的元数据，用于在不运行真实构造例程的情况下检查组合。
//! 清单中的每个服务都使用占位构造例程，实例为 [`PlaceholderService`]。

use crate::errors::ConfigError;
use crate::runtime::{
    Constructed, PackageDescriptor, PropertyDescriptor, ProvidedInterface, ReferenceDescriptor,
    ServiceDescriptor, ServiceId,
};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// 清单根节点
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub packages: Vec<ManifestPackage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestPackage {
    pub name: String,
    #[serde(default)]
    pub ui_references: Vec<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, ManifestProperty>,
    #[serde(default)]
    pub services: Vec<ManifestService>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestProperty {
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestService {
    pub name: String,
    #[serde(default)]
    pub provides: Vec<ManifestProvide>,
    /// 引用名 -> 引用描述；按名称排序
    #[serde(default)]
    pub references: BTreeMap<String, ManifestReference>,
}

/// `"Logger"` 或 `{ name = "Logger", qualifier = "file" }`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ManifestProvide {
    Name(String),
    Qualified {
        name: String,
        qualifier: Option<String>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestReference {
    pub interface: String,
    #[serde(default)]
    pub multi_valued: bool,
    #[serde(default)]
    pub qualifier: Option<String>,
}

/// 清单服务的占位实例
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderService {
    pub id: ServiceId,
    pub bound_references: Vec<String>,
}

impl Manifest {
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::TomlParse("<manifest>".to_string(), e))
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let content =
            fs::read_to_string(path).map_err(|e| ConfigError::FileRead(display.clone(), e))?;
        toml::from_str(&content).map_err(|e| ConfigError::TomlParse(display, e))
    }

    /// 转换为运行时的包描述
    pub fn into_packages(self) -> Vec<PackageDescriptor> {
        self.packages.into_iter().map(ManifestPackage::into_descriptor).collect()
    }
}

impl ManifestPackage {
    fn into_descriptor(self) -> PackageDescriptor {
        let mut package = PackageDescriptor::new(self.name);

        for (name, property) in self.properties {
            let descriptor = match (property.required, property.value) {
                (true, Some(value)) => PropertyDescriptor {
                    value,
                    required: true,
                },
                (true, None) => PropertyDescriptor::required(),
                (false, value) => PropertyDescriptor::optional(value.unwrap_or(Value::Null)),
            };
            package = package.property(name, descriptor);
        }

        for interface in self.ui_references {
            package = package.ui_reference(interface);
        }

        for service in self.services {
            package = package.service(service.into_descriptor());
        }

        package
    }
}

impl ManifestService {
    fn into_descriptor(self) -> ServiceDescriptor {
        let mut descriptor = ServiceDescriptor::from_fn(self.name, |context| {
            let mut bound_references: Vec<String> = context.bound_names().map(str::to_string).collect();
            bound_references.sort();
            Ok(Constructed::new(PlaceholderService {
                id: context.service_id().clone(),
                bound_references,
            }))
        });

        for provide in self.provides {
            descriptor = descriptor.provides(ProvidedInterface::from(provide));
        }

        for (name, reference) in self.references {
            let mut descriptor_ref = if reference.multi_valued {
                ReferenceDescriptor::all(reference.interface)
            } else {
                ReferenceDescriptor::single(reference.interface)
            };
            if let Some(qualifier) = reference.qualifier {
                descriptor_ref = descriptor_ref.qualified(qualifier);
            }
            descriptor = descriptor.reference(name, descriptor_ref);
        }

        descriptor
    }
}

impl From<ManifestProvide> for ProvidedInterface {
    fn from(provide: ManifestProvide) -> Self {
        match provide {
            ManifestProvide::Name(name) => ProvidedInterface::new(name),
            ManifestProvide::Qualified { name, qualifier } => {
                let interface = ProvidedInterface::new(name);
                match qualifier {
                    Some(qualifier) => interface.qualified(qualifier),
                    None => interface,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const MANIFEST: &str = r#"
        [[packages]]
        name = "logging"

        [[packages.services]]
        name = "console"
        provides = ["Logger", { name = "Sink", qualifier = "console" }]

        [[packages]]
        name = "map"
        ui_references = ["Logger"]

        [packages.properties.zoom]
        value = 5

        [packages.properties.token]
        required = true

        [[packages.services]]
        name = "viewer"

        [packages.services.references.log]
        interface = "Logger"

        [packages.services.references.sinks]
        interface = "Sink"
        multi_valued = true
    "#;

    #[test]
    fn test_parse_manifest() {
        let manifest = Manifest::parse(MANIFEST).unwrap();
        assert_eq!(manifest.packages.len(), 2);
        assert_eq!(manifest.packages[1].ui_references, vec!["Logger".to_string()]);

        let packages = manifest.into_packages();
        let logging = &packages[0];
        assert_eq!(logging.services[0].provides.len(), 2);
        assert_eq!(logging.services[0].provides[1].qualifier.as_deref(), Some("console"));

        let map = &packages[1];
        assert_eq!(map.properties["zoom"], PropertyDescriptor::optional(json!(5)));
        assert!(map.properties["token"].required);

        let viewer = &map.services[0];
        let names: Vec<_> = viewer.references.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["log", "sinks"]);
        assert!(viewer.references[1].1.multi_valued);
    }

    #[test]
    fn test_invalid_manifest() {
        let err = Manifest::parse("[[packages]]\nservices = 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::TomlParse(..)));
    }
}
