mod args;

use anyhow::Context;
use args::{Args, Command, OutputFormat};
use package_runtime::config::RuntimeConfig;
use package_runtime::logging::init_logging;
use package_runtime::manifest::Manifest;
use package_runtime::runtime::{Composer, InterfaceIndex, MetadataRegistry};
use package_runtime::CompositionReport;
use serde_json::json;
use std::path::Path;

/// 组合失败（致命错误）时的退出码
const EXIT_FATAL: i32 = 2;
/// 严格模式下存在诊断时的退出码
const EXIT_DIAGNOSTICS: i32 = 1;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => RuntimeConfig::load_from(path.clone()),
        None => RuntimeConfig::load(),
    }
    .context("failed to load runtime configuration")?;

    init_logging(config.logging.clone()).map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let code = match args.command {
        Command::Check {
            manifest,
            format,
            strict,
        } => handle_check(&config, &manifest, format, strict || config.strict).await?,
        Command::Index { manifest } => handle_index(&manifest)?,
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

async fn handle_check(
    config: &RuntimeConfig,
    manifest_path: &Path,
    format: OutputFormat,
    strict: bool,
) -> anyhow::Result<i32> {
    let packages = Manifest::from_path(manifest_path)?.into_packages();

    match Composer::from_config(config).compose(packages).await {
        Ok(composition) => {
            let order = composition.construction_order();
            match format {
                OutputFormat::Text => {
                    println!("Construction order:");
                    for (position, service) in order.iter().enumerate() {
                        println!("  {:>3}. {}", position + 1, service);
                    }
                    print_report(composition.report());
                }
                OutputFormat::Json => {
                    let output = json!({
                        "status": "ok",
                        "complete": composition.is_complete(),
                        "construction_order": order,
                        "diagnostics": composition.report(),
                    });
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
            }

            let failed_hooks = composition.teardown();
            if failed_hooks > 0 {
                tracing::warn!(failed_hooks, "Some teardown hooks failed");
            }

            if strict && !composition.report().is_empty() {
                Ok(EXIT_DIAGNOSTICS)
            } else {
                Ok(0)
            }
        }
        Err(error) => {
            match format {
                OutputFormat::Text => {
                    eprintln!("Composition failed: {}", error);
                    print_report(error.report());
                }
                OutputFormat::Json => {
                    let output = json!({
                        "status": "failed",
                        "kind": error.kind(),
                        "error": error.to_string(),
                        "diagnostics": error.report(),
                    });
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
            }
            Ok(EXIT_FATAL)
        }
    }
}

fn handle_index(manifest_path: &Path) -> anyhow::Result<i32> {
    let packages = Manifest::from_path(manifest_path)?.into_packages();

    let registry = match MetadataRegistry::load(packages) {
        Ok(registry) => registry,
        Err(problems) => {
            eprintln!("Package metadata is malformed:");
            for problem in problems {
                eprintln!("  {}", problem);
            }
            return Ok(EXIT_FATAL);
        }
    };

    let index = InterfaceIndex::build(&registry);
    for (interface, providers) in index.sorted() {
        println!("{}", interface);
        for provider in providers {
            match &provider.qualifier {
                Some(qualifier) => println!("  - {} [{}]", provider.service, qualifier),
                None => println!("  - {}", provider.service),
            }
        }
    }
    Ok(0)
}

fn print_report(report: &CompositionReport) {
    println!();
    println!("Diagnostics ({}):", report.len());
    println!("{}", report);
}
