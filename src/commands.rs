use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::Path;
use wiregraph::{Application, Contract, Manifest, ResolverConfig};

use crate::args::{ContractFormat, ReportFormat};

fn build_manifest(config: &ResolverConfig, path: &Path) -> Result<Application> {
    let manifest = Manifest::load(path)
        .with_context(|| format!("加载装配清单失败: {}", path.display()))?;
    let app = manifest
        .build(config)
        .with_context(|| format!("装配清单校验失败: {}", path.display()))?;
    Ok(app)
}

/// 解析并校验清单，输出报告
pub fn handle_check(config: &ResolverConfig, manifest: &Path, format: ReportFormat) -> Result<()> {
    let app = build_manifest(config, manifest)?;
    let report = app.report();

    match format {
        ReportFormat::Text => {
            print!("{}", report);
            let stats = app.stats();
            println!(
                "\n✅ {} 个作用域，{} 个绑定，已解析 {}，未解析的可选绑定 {}",
                stats.scopes, stats.bindings, stats.resolved, stats.unresolved_optional
            );
        }
        ReportFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

/// 输出作用域契约
pub fn handle_contract(
    config: &ResolverConfig,
    manifest: &Path,
    scope: Option<&str>,
    format: ContractFormat,
) -> Result<()> {
    let app = build_manifest(config, manifest)?;
    let scope_id = match scope {
        Some(path) => app
            .find_scope(path)
            .ok_or_else(|| anyhow!("未找到作用域: {}", path))?,
        None => app.root(),
    };
    let contract = app.contract_of(scope_id)?;

    match format {
        ContractFormat::Text => println!("{}", contract),
        ContractFormat::Json => println!("{}", serde_json::to_string_pretty(contract)?),
        ContractFormat::Toml => print!("{}", toml::to_string(contract)?),
    }
    Ok(())
}

/// 读取契约文件，按扩展名选择 JSON 或 TOML
pub fn load_contract(path: &Path) -> Result<Contract> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("读取契约文件失败: {}", path.display()))?;
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let contract = if is_json {
        serde_json::from_str(&content)
            .with_context(|| format!("解析契约文件失败: {}", path.display()))?
    } else {
        toml::from_str(&content)
            .with_context(|| format!("解析契约文件失败: {}", path.display()))?
    };
    Ok(contract)
}

/// 兼容性检查；返回是否兼容
pub fn handle_compat(old: &Path, new: &Path) -> Result<bool> {
    let older = load_contract(old)?;
    let newer = load_contract(new)?;

    let issues = newer.compatibility_issues(&older);
    if issues.is_empty() {
        println!("✅ {} 向后兼容 {}", new.display(), old.display());
        return Ok(true);
    }

    println!("❌ {} 不向后兼容 {}:", new.display(), old.display());
    for issue in &issues {
        println!("  - {}", issue);
    }
    Ok(false)
}
