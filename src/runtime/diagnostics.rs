//! 组合诊断
//!
//! 收集注册表校验、接口索引、依赖图构建和实例化过程中产生的所有问题，
//! 最终汇总为一份排序稳定的组合报告。

use super::metadata::ServiceId;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// 诊断中的“使用方”：某个服务，或某个包的 UI 层
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Consumer {
    Service { id: ServiceId },
    Ui { package: String },
}

impl Consumer {
    pub fn service(id: ServiceId) -> Self {
        Consumer::Service { id }
    }

    pub fn ui(package: impl Into<String>) -> Self {
        Consumer::Ui {
            package: package.into(),
        }
    }
}

impl fmt::Display for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Consumer::Service { id } => write!(f, "service {}", id),
            Consumer::Ui { package } => write!(f, "ui of package '{}'", package),
        }
    }
}

/// 诊断种类；声明顺序即报告中的分组顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    MalformedMetadata,
    DuplicateServiceName,
    MissingProperty,
    UnknownProperty,
    MissingInterface,
    AmbiguousInterface,
    UnavailableDependency,
    CyclicDependency,
    ConstructionFailure,
}

impl DiagnosticKind {
    /// 是否会中止整个组合过程
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            DiagnosticKind::MalformedMetadata
                | DiagnosticKind::DuplicateServiceName
                | DiagnosticKind::CyclicDependency
                | DiagnosticKind::ConstructionFailure
        )
    }
}

/// 一次解析失败的不可变记录
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    #[error("malformed metadata in package '{package}': {problem}")]
    MalformedMetadata { package: String, problem: String },

    #[error("service {service} is declared more than once")]
    DuplicateServiceName { service: ServiceId },

    #[error("required property '{property}' of package '{package}' has no value")]
    MissingProperty { package: String, property: String },

    #[error("property '{property}' is not declared by package '{package}'")]
    UnknownProperty { package: String, property: String },

    #[error("{consumer} references interface '{interface}' but no service provides it")]
    MissingInterface { consumer: Consumer, interface: String },

    #[error(
        "{consumer} references interface '{interface}' which is provided by multiple services: {}",
        join_ids(.candidates)
    )]
    AmbiguousInterface {
        consumer: Consumer,
        interface: String,
        candidates: Vec<ServiceId>,
    },

    #[error("service {service} cannot be constructed because its dependency {dependency} is unavailable")]
    UnavailableDependency {
        service: ServiceId,
        dependency: ServiceId,
    },

    #[error("cyclic dependency: {}", join_path(.path))]
    CyclicDependency { path: Vec<ServiceId> },

    #[error("construction of service {service} failed: {cause}")]
    ConstructionFailure { service: ServiceId, cause: String },
}

impl Diagnostic {
    pub fn kind(&self) -> DiagnosticKind {
        match self {
            Diagnostic::MalformedMetadata { .. } => DiagnosticKind::MalformedMetadata,
            Diagnostic::DuplicateServiceName { .. } => DiagnosticKind::DuplicateServiceName,
            Diagnostic::MissingProperty { .. } => DiagnosticKind::MissingProperty,
            Diagnostic::UnknownProperty { .. } => DiagnosticKind::UnknownProperty,
            Diagnostic::MissingInterface { .. } => DiagnosticKind::MissingInterface,
            Diagnostic::AmbiguousInterface { .. } => DiagnosticKind::AmbiguousInterface,
            Diagnostic::UnavailableDependency { .. } => DiagnosticKind::UnavailableDependency,
            Diagnostic::CyclicDependency { .. } => DiagnosticKind::CyclicDependency,
            Diagnostic::ConstructionFailure { .. } => DiagnosticKind::ConstructionFailure,
        }
    }
}

pub(crate) fn join_ids(ids: &[ServiceId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn join_path(path: &[ServiceId]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// 诊断收集器，按产生顺序记录
#[derive(Debug, Default)]
pub struct DiagnosticsReporter {
    raised: Vec<Diagnostic>,
}

impl DiagnosticsReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        if diagnostic.kind().is_fatal() {
            tracing::error!(kind = ?diagnostic.kind(), "{}", diagnostic);
        } else {
            tracing::warn!(kind = ?diagnostic.kind(), "{}", diagnostic);
        }
        self.raised.push(diagnostic);
    }

    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        for diagnostic in diagnostics {
            self.report(diagnostic);
        }
    }

    pub fn len(&self) -> usize {
        self.raised.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raised.is_empty()
    }

    /// 生成报告：先按种类分组，组内保持产生顺序
    pub fn finish(self) -> CompositionReport {
        let mut diagnostics = self.raised;
        diagnostics.sort_by_key(Diagnostic::kind);
        CompositionReport { diagnostics }
    }
}

/// 组合报告
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompositionReport {
    diagnostics: Vec<Diagnostic>,
}

impl CompositionReport {
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn of_kind(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.kind() == kind)
    }

    pub fn contains_kind(&self, kind: DiagnosticKind) -> bool {
        self.of_kind(kind).next().is_some()
    }

    pub fn has_fatal(&self) -> bool {
        self.diagnostics.iter().any(|d| d.kind().is_fatal())
    }
}

impl<'a> IntoIterator for &'a CompositionReport {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.diagnostics.iter()
    }
}

impl fmt::Display for CompositionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.diagnostics.is_empty() {
            return write!(f, "no diagnostics");
        }
        for (i, diagnostic) in self.diagnostics.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "[{:?}] {}", diagnostic.kind(), diagnostic)?;
        }
        Ok(())
    }
}
