use crate::runtime::diagnostics::{join_ids, join_path, CompositionReport, DiagnosticKind};
use crate::runtime::metadata::ServiceId;
use thiserror::Error;

/// 构造例程与销毁钩子使用的错误类型
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 使组合过程中止的错误
///
/// 每个变体都带有完整的组合报告，中止前收集到的诊断不会丢失。
#[derive(Debug, Error)]
pub enum CompositionError {
    #[error("package metadata is malformed:\n{report}")]
    MalformedMetadata { report: CompositionReport },

    #[error("cyclic dependency detected: {}", join_path(.path))]
    CyclicDependency {
        path: Vec<ServiceId>,
        report: CompositionReport,
    },

    #[error("construction of service {service} failed: {source}")]
    ConstructionFailure {
        service: ServiceId,
        #[source]
        source: BoxError,
        report: CompositionReport,
    },
}

impl CompositionError {
    pub fn report(&self) -> &CompositionReport {
        match self {
            CompositionError::MalformedMetadata { report }
            | CompositionError::CyclicDependency { report, .. }
            | CompositionError::ConstructionFailure { report, .. } => report,
        }
    }

    pub fn kind(&self) -> DiagnosticKind {
        match self {
            CompositionError::MalformedMetadata { report } => {
                if report.contains_kind(DiagnosticKind::MalformedMetadata) {
                    DiagnosticKind::MalformedMetadata
                } else {
                    DiagnosticKind::DuplicateServiceName
                }
            }
            CompositionError::CyclicDependency { .. } => DiagnosticKind::CyclicDependency,
            CompositionError::ConstructionFailure { .. } => DiagnosticKind::ConstructionFailure,
        }
    }
}

/// 查询实例存储或构造上下文时的错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("service {0} is not part of the composition")]
    ServiceNotFound(ServiceId),

    #[error("no constructed service provides interface '{interface}'")]
    MissingInterface { interface: String },

    #[error("interface '{interface}' is provided by multiple services: {}", join_ids(.candidates))]
    AmbiguousInterface {
        interface: String,
        candidates: Vec<ServiceId>,
    },

    #[error("instance of {service} is a {actual}, not a {expected}")]
    TypeMismatch {
        service: ServiceId,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("package '{package}' did not declare a ui reference to '{interface}'")]
    UndeclaredUiReference { package: String, interface: String },

    #[error("reference '{reference}' of service {service} is not bound")]
    ReferenceNotBound { service: ServiceId, reference: String },

    #[error("reference '{reference}' of service {service} is multi-valued")]
    MultiValuedReference { service: ServiceId, reference: String },
}

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read file '{0}': {1}")]
    FileRead(String, #[source] std::io::Error),
    #[error("Failed to parse TOML from file '{0}': {1}")]
    TomlParse(String, #[source] toml::de::Error),
    #[error("Invalid value '{value}' for '{key}'")]
    InvalidValue { key: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_error_messages() {
        let err = LookupError::AmbiguousInterface {
            interface: "Y".into(),
            candidates: vec![ServiceId::new("a", "1"), ServiceId::new("b", "2")],
        };
        assert_eq!(
            err.to_string(),
            "interface 'Y' is provided by multiple services: a::1, b::2"
        );

        let err = LookupError::ServiceNotFound(ServiceId::new("a", "s"));
        assert_eq!(err.to_string(), "service a::s is not part of the composition");
    }

    #[test]
    fn test_construction_failure_keeps_source() {
        let err = CompositionError::ConstructionFailure {
            service: ServiceId::new("p", "C"),
            source: "boom".into(),
            report: CompositionReport::default(),
        };
        assert_eq!(err.kind(), DiagnosticKind::ConstructionFailure);
        assert_eq!(err.to_string(), "construction of service p::C failed: boom");
        assert!(std::error::Error::source(&err).is_some());
    }
}
