//! 部署清单的集成测试：从 TOML 文件组合并检查结果

use package_runtime::config::RuntimeConfig;
use package_runtime::manifest::{Manifest, PlaceholderService};
use package_runtime::runtime::DiagnosticKind;
use package_runtime::{Composer, CompositionError, ServiceId};
use std::fs;
use tempfile::TempDir;

const APP_MANIFEST: &str = r#"
[[packages]]
name = "storage"

[[packages.services]]
name = "sqlite"
provides = ["Database"]

[[packages]]
name = "web"
ui_references = ["Router"]

[packages.properties.port]
value = 8080

[packages.properties.secret]
required = true

[[packages.services]]
name = "router"
provides = ["Router"]

[packages.services.references.db]
interface = "Database"
"#;

fn write_manifest(dir: &TempDir, content: &str) -> std::path::PathBuf {
    let path = dir.path().join("app.toml");
    fs::write(&path, content).unwrap();
    path
}

#[tokio::test]
async fn test_manifest_composition_with_config_properties() {
    let temp_dir = TempDir::new().unwrap();
    let manifest_path = write_manifest(&temp_dir, APP_MANIFEST);
    let config_path = temp_dir.path().join("runtime.toml");
    fs::write(&config_path, "[properties.web]\nsecret = \"hunter2\"\n").unwrap();

    let config = RuntimeConfig::load_from(config_path).unwrap();
    let packages = Manifest::from_path(&manifest_path).unwrap().into_packages();
    let composition = Composer::from_config(&config).compose(packages).await.unwrap();

    assert!(composition.is_complete());
    assert_eq!(
        composition.construction_order(),
        vec![ServiceId::new("storage", "sqlite"), ServiceId::new("web", "router")]
    );

    let router = composition
        .store()
        .get_ui_instance("web", "Router")
        .unwrap()
        .downcast::<PlaceholderService>()
        .unwrap();
    assert_eq!(router.id, ServiceId::new("web", "router"));
    assert_eq!(router.bound_references, vec!["db".to_string()]);
}

#[tokio::test]
async fn test_manifest_without_required_property() {
    let temp_dir = TempDir::new().unwrap();
    let manifest_path = write_manifest(&temp_dir, APP_MANIFEST);

    let packages = Manifest::from_path(&manifest_path).unwrap().into_packages();
    let composition = Composer::new().compose(packages).await.unwrap();

    assert!(composition.report().contains_kind(DiagnosticKind::MissingProperty));
    assert_eq!(composition.store().len(), 1);
}

#[tokio::test]
async fn test_manifest_cycle() {
    let manifest = Manifest::parse(
        r#"
        [[packages]]
        name = "loop"

        [[packages.services]]
        name = "a"
        provides = ["A"]
        references = { next = { interface = "B" } }

        [[packages.services]]
        name = "b"
        provides = ["B"]
        references = { next = { interface = "A" } }
        "#,
    )
    .unwrap();

    let err = Composer::new().compose(manifest.into_packages()).await.unwrap_err();
    assert!(matches!(err, CompositionError::CyclicDependency { ref path, .. } if path.len() == 3));
}

#[test]
fn test_missing_manifest_file() {
    let temp_dir = TempDir::new().unwrap();
    assert!(Manifest::from_path(&temp_dir.path().join("nope.toml")).is_err());
}
