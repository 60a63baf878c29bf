//! 组合运行时
//!
//! 读取各个包声明的元数据，跨包建立依赖图，求出合法的构造顺序（或证明不存在），
//! 每个服务只构造一次，并通过接口名对外提供实例。

pub mod composition;
pub mod diagnostics;
pub mod factory;
pub mod graph;
pub mod index;
pub mod metadata;
pub mod resolver;
pub mod store;

pub use composition::{compose, Composer, Composition};
pub use diagnostics::{CompositionReport, Consumer, Diagnostic, DiagnosticKind, DiagnosticsReporter};
pub use factory::{BoundReference, Constructed, ServiceContext, ServiceFactory, TeardownHook};
pub use graph::{BindingTarget, DependencyGraph, ProviderBinding};
pub use index::{InterfaceIndex, ProviderEntry};
pub use metadata::{
    MetadataRegistry, PackageDescriptor, PackageProperties, PropertyDescriptor, ProvidedInterface,
    ReferenceDescriptor, ServiceDescriptor, ServiceId,
};
pub use store::{Instance, InstanceStore, StoreStats};
