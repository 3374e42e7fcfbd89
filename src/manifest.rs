//! 装配清单
//!
//! 用 TOML 声明作用域树、组件、操作以及它们的提供与绑定，
//! 代替外部扫描层驱动 [`BuildContext`]。
//!
//! ```toml
//! [root]
//! name = "app"
//!
//! [[root.beans]]
//! name = "Database"
//! provides = [{ key = "Db" }]
//!
//! [[root.children]]
//! name = "web"
//! exports = ["Api"]
//!
//! [[root.children.beans]]
//! name = "ApiHandler"
//! provides = [{ key = "Api" }]
//! binds = [{ key = "Db" }, { key = "Metrics", required = false }]
//! ```

use crate::config::ResolverConfig;
use crate::errors::ManifestError;
use crate::graph::{Application, BuildContext, Precedence, ScopeId, UnitId};
use crate::key::Key;
use indexmap::IndexMap;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// 装配清单
#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    pub root: ScopeSpec,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScopeSpec {
    pub name: String,
    /// 未设置时使用配置中的默认值
    #[serde(default)]
    pub export_all: Option<bool>,
    #[serde(default)]
    pub beans: Vec<BeanSpec>,
    /// 按键导出（本地提供或子作用域导出）
    #[serde(default)]
    pub exports: Vec<Key>,
    #[serde(default)]
    pub inject: Vec<InjectSpec>,
    #[serde(default)]
    pub children: Vec<ScopeSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BeanSpec {
    pub name: String,
    #[serde(default)]
    pub provides: Vec<ProvideSpec>,
    #[serde(default)]
    pub binds: Vec<BindSpec>,
    #[serde(default)]
    pub attach: Vec<AttachSpec>,
    #[serde(default)]
    pub contexts: Vec<ContextSpec>,
    #[serde(default)]
    pub operations: Vec<OperationSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OperationSpec {
    pub name: String,
    #[serde(default)]
    pub provides: Vec<ProvideSpec>,
    #[serde(default)]
    pub binds: Vec<BindSpec>,
    #[serde(default)]
    pub attach: Vec<AttachSpec>,
    #[serde(default)]
    pub contexts: Vec<ContextSpec>,
}

/// 单元上声明的提供与绑定
struct Wiring<'a> {
    provides: &'a [ProvideSpec],
    binds: &'a [BindSpec],
    attach: &'a [AttachSpec],
    contexts: &'a [ContextSpec],
}

impl BeanSpec {
    fn wiring(&self) -> Wiring<'_> {
        Wiring {
            provides: &self.provides,
            binds: &self.binds,
            attach: &self.attach,
            contexts: &self.contexts,
        }
    }
}

impl OperationSpec {
    fn wiring(&self) -> Wiring<'_> {
        Wiring {
            provides: &self.provides,
            binds: &self.binds,
            attach: &self.attach,
            contexts: &self.contexts,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProvideSpec {
    pub key: Key,
    #[serde(default = "default_true")]
    pub constant: bool,
    /// 同时导出该提供者
    #[serde(default)]
    pub export: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BindSpec {
    pub key: Key,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default)]
    pub precedence: Option<Precedence>,
}

/// 直接挂在当前单元上的提供者，`from` 为同一作用域中生产单元的名称
#[derive(Debug, Clone, Deserialize)]
pub struct AttachSpec {
    pub key: Key,
    pub from: String,
    #[serde(default = "default_true")]
    pub constant: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContextSpec {
    pub key: Key,
    pub context: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InjectSpec {
    pub key: Key,
    pub site: String,
}

fn default_true() -> bool {
    true
}

impl FromStr for Manifest {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(toml::from_str(s)?)
    }
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ManifestError::FileRead(path.to_string_lossy().to_string(), e))?;
        content.parse()
    }

    /// 按清单装配构建上下文（尚未解析）
    pub fn into_context(&self, config: &ResolverConfig) -> Result<BuildContext, ManifestError> {
        let mut ctx = BuildContext::with_config(self.root.name.as_str(), config);
        let root = ctx.root();
        assemble_scope(&mut ctx, root, &self.root)?;
        Ok(ctx)
    }

    /// 装配并构建
    pub fn build(&self, config: &ResolverConfig) -> Result<Application, ManifestError> {
        Ok(self.into_context(config)?.build()?)
    }
}

fn assemble_scope(
    ctx: &mut BuildContext,
    scope: ScopeId,
    spec: &ScopeSpec,
) -> Result<(), ManifestError> {
    if spec.export_all == Some(true) {
        ctx.enable_export_all(scope)?;
    }

    // 先登记全部单元，挂载提供者时可以引用后声明的单元
    let mut units: IndexMap<String, UnitId> = IndexMap::new();
    let mut declared: Vec<(UnitId, Wiring<'_>)> = Vec::new();
    for bean in &spec.beans {
        let bean_id = ctx.add_bean(scope, bean.name.as_str())?;
        register_unit(&mut units, spec, &bean.name, bean_id)?;
        declared.push((bean_id, bean.wiring()));

        for operation in &bean.operations {
            let op_id = ctx.add_operation(bean_id, &operation.name)?;
            let site = format!("{}#{}", bean.name, operation.name);
            register_unit(&mut units, spec, &site, op_id)?;
            declared.push((op_id, operation.wiring()));
        }
    }

    for (unit, wiring) in declared {
        for provide in wiring.provides {
            let provider = ctx.provide(unit, provide.key.clone(), provide.constant)?;
            if provide.export {
                ctx.export(provider)?;
            }
        }
        for bind in wiring.binds {
            match &bind.precedence {
                Some(precedence) => {
                    ctx.bind_with(unit, bind.key.clone(), bind.required, precedence.clone())?
                }
                None => ctx.bind(unit, bind.key.clone(), bind.required)?,
            };
        }
        for attach in wiring.attach {
            let producer = units
                .get(&attach.from)
                .copied()
                .ok_or_else(|| ManifestError::UnknownUnit {
                    scope: spec.name.clone(),
                    unit: attach.from.clone(),
                })?;
            ctx.provide_at_unit(unit, attach.key.clone(), producer, attach.constant)?;
        }
        for context in wiring.contexts {
            ctx.provide_context(unit, context.key.clone(), context.context.as_str())?;
        }
    }

    for inject in &spec.inject {
        ctx.inject_instance(scope, inject.key.clone(), inject.site.as_str())?;
    }
    for key in &spec.exports {
        ctx.export_key(scope, key.clone())?;
    }
    debug!(scope = %spec.name, units = units.len(), "Scope assembled from manifest");

    for child in &spec.children {
        let child_id = ctx.add_child(scope, child.name.as_str())?;
        assemble_scope(ctx, child_id, child)?;
    }
    Ok(())
}

fn register_unit(
    units: &mut IndexMap<String, UnitId>,
    spec: &ScopeSpec,
    name: &str,
    id: UnitId,
) -> Result<(), ManifestError> {
    if units.insert(name.to_string(), id).is_some() {
        return Err(ManifestError::DuplicateUnit {
            scope: spec.name.clone(),
            unit: name.to_string(),
        });
    }
    Ok(())
}
