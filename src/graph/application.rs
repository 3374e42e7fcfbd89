//! 已构建的应用
//!
//! 解析和校验全部通过后得到的不可变结果：每个绑定对应的提供者、
//! 每个作用域的契约，以及供诊断工具遍历的条目和提供者。

use super::entry::{Binding, BindingId, Entry, Provider, ProviderId, Resolution};
use super::precedence::BindingLevel;
use super::resolver::ResolveStats;
use super::scope::{ScopeId, ScopeNode, ScopeTree};
use super::unit::{Unit, UnitId, UnitKind};
use crate::contract::Contract;
use crate::errors::WireError;
use crate::key::Key;
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// 不可变的应用
#[derive(Debug, Clone)]
pub struct Application {
    tree: ScopeTree,
    units: Vec<Unit>,
    contracts: IndexMap<ScopeId, Contract>,
    stats: ResolveStats,
}

impl Application {
    pub(crate) fn new(
        tree: ScopeTree,
        units: Vec<Unit>,
        contracts: IndexMap<ScopeId, Contract>,
        stats: ResolveStats,
    ) -> Self {
        Self {
            tree,
            units,
            contracts,
            stats,
        }
    }

    pub fn root(&self) -> ScopeId {
        self.tree.root()
    }

    pub fn tree(&self) -> &ScopeTree {
        &self.tree
    }

    pub fn scope(&self, id: ScopeId) -> Result<&ScopeNode, WireError> {
        self.tree.node(id)
    }

    pub fn find_scope(&self, path: &str) -> Option<ScopeId> {
        self.tree.find_by_path(path)
    }

    pub fn stats(&self) -> ResolveStats {
        self.stats
    }

    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.units.get(id.index())
    }

    pub fn binding(&self, id: BindingId) -> Option<&Binding> {
        self.tree
            .node(id.scope())
            .ok()
            .and_then(|node| node.registry.binding(id))
    }

    pub fn provider(&self, id: ProviderId) -> Option<&Provider> {
        self.tree.provider(id)
    }

    /// 绑定最终使用的提供者；未解析的可选绑定返回 `None`
    pub fn resolved_provider_of(&self, binding: BindingId) -> Option<&Provider> {
        self.binding(binding)
            .and_then(Binding::resolved_provider)
            .and_then(|id| self.tree.provider(id))
    }

    pub fn resolution_of(&self, binding: BindingId) -> Option<Resolution> {
        self.binding(binding).and_then(Binding::resolution)
    }

    pub fn contract_of(&self, scope: ScopeId) -> Result<&Contract, WireError> {
        self.contracts
            .get(&scope)
            .ok_or(WireError::UnknownScope(scope))
    }

    pub fn verify(&self, scope: ScopeId) -> Result<(), WireError> {
        self.tree.node(scope)?.registry.verify()
    }

    /// 所有作用域中的条目
    pub fn entries(&self) -> impl Iterator<Item = (ScopeId, &Entry)> {
        self.tree
            .nodes()
            .flat_map(|node| node.registry.entries().map(move |entry| (node.id, entry)))
    }

    pub fn providers(&self) -> impl Iterator<Item = &Provider> {
        self.tree
            .nodes()
            .flat_map(|node| node.registry.providers().iter())
    }

    pub fn bindings(&self) -> impl Iterator<Item = &Binding> {
        self.tree
            .nodes()
            .flat_map(|node| node.registry.bindings().iter())
    }

    /// 根作用域对外导出的服务表
    pub fn services(&self) -> &IndexMap<Key, ProviderId> {
        self.tree.root_node().exported_services()
    }

    /// 整棵树的诊断快照
    pub fn report(&self) -> ScopeReport {
        self.report_scope(self.tree.root())
    }

    pub fn report_for(&self, scope: ScopeId) -> Result<ScopeReport, WireError> {
        self.tree.node(scope)?;
        Ok(self.report_scope(scope))
    }

    /// 按后序逐个生成快照，子作用域的快照先于父作用域完成
    fn report_scope(&self, id: ScopeId) -> ScopeReport {
        let mut finished: HashMap<ScopeId, ScopeReport> = HashMap::new();
        for scope in self.tree.post_order(id) {
            let Ok(node) = self.tree.node(scope) else {
                continue;
            };
            let children = node
                .children()
                .iter()
                .filter_map(|child| finished.remove(child))
                .collect();
            finished.insert(scope, self.report_node(node, children));
        }
        finished.remove(&id).unwrap_or_default()
    }

    fn report_node(&self, node: &ScopeNode, children: Vec<ScopeReport>) -> ScopeReport {
        let id = node.id;
        let site_of = |provider: ProviderId| {
            self.tree
                .provider(provider)
                .map(|p| p.site().to_string())
        };

        let entries = node
            .registry
            .entries()
            .map(|entry| EntryReport {
                key: entry.key().clone(),
                provider: entry.provider().and_then(site_of),
                bindings: entry.bindings().len(),
                required: entry.is_required(),
            })
            .collect();

        let providers = node
            .registry
            .providers()
            .iter()
            .map(|provider| ProviderReport {
                key: provider.key().clone(),
                site: provider.site().to_string(),
                source: provider.source().label(),
                constant: provider.is_constant(),
            })
            .collect();

        let bindings = node
            .registry
            .bindings()
            .iter()
            .map(|binding| BindingReport {
                key: binding.key().clone(),
                site: binding.site().to_string(),
                required: binding.is_required(),
                level: binding.resolution().map(|r| r.level),
                provider: binding.resolved_provider().and_then(site_of),
                provider_scope: binding
                    .resolved_provider()
                    .map(|p| self.tree.path(p.scope())),
            })
            .collect();

        ScopeReport {
            name: node.name().to_string(),
            path: self.tree.path(id),
            export_all: node.registry.is_export_all(),
            contract: self.contracts.get(&id).cloned().unwrap_or_default(),
            exports: node.exported_services().keys().cloned().collect(),
            entries,
            providers,
            bindings,
            children,
        }
    }
}

/// 推导作用域契约
///
/// - provides：作用域导出的键
/// - requires：子树中必需绑定所需、且不由子树内部生产的键（继承的、注入的或未解析的）
/// - requires_optional：同上的可选绑定，去掉已必需或已提供的键
pub(crate) fn derive_contract(
    tree: &ScopeTree,
    units: &[Unit],
    scope: ScopeId,
) -> Result<Contract, WireError> {
    let node = tree.node(scope)?;
    let provides: BTreeSet<Key> = node.registry.exports().keys().cloned().collect();

    let mut required = BTreeSet::new();
    let mut optional = BTreeSet::new();
    for id in tree.pre_order(scope) {
        for binding in tree.node(id)?.registry.bindings() {
            let internal = binding
                .resolved_provider()
                .and_then(|provider| tree.provider(provider))
                .is_some_and(|provider| is_internal(tree, units, scope, provider));
            if internal {
                continue;
            }
            if binding.is_required() {
                required.insert(binding.key().clone());
            } else {
                optional.insert(binding.key().clone());
            }
        }
    }

    let required: Vec<Key> = required.difference(&provides).cloned().collect();
    let optional: Vec<Key> = optional
        .into_iter()
        .filter(|key| !provides.contains(key) && !required.contains(key))
        .collect();

    let mut builder = Contract::builder();
    builder
        .provide(provides)?
        .require(required)?
        .require_optional(optional)?;
    Ok(builder.build())
}

/// 提供者由子树内部生产（注入的实例视为外部）
fn is_internal(tree: &ScopeTree, units: &[Unit], scope: ScopeId, provider: &Provider) -> bool {
    if !tree.is_within(provider.id().scope(), scope) {
        return false;
    }
    match provider.producing_unit().and_then(|unit| units.get(unit.index())) {
        Some(unit) => unit.kind() != UnitKind::Injected,
        None => true,
    }
}

/// 作用域诊断快照
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScopeReport {
    pub name: String,
    pub path: String,
    pub export_all: bool,
    pub contract: Contract,
    pub exports: Vec<Key>,
    pub entries: Vec<EntryReport>,
    pub providers: Vec<ProviderReport>,
    pub bindings: Vec<BindingReport>,
    pub children: Vec<ScopeReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntryReport {
    pub key: Key,
    pub provider: Option<String>,
    pub bindings: usize,
    pub required: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderReport {
    pub key: Key,
    pub site: String,
    pub source: &'static str,
    pub constant: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BindingReport {
    pub key: Key,
    pub site: String,
    pub required: bool,
    pub level: Option<BindingLevel>,
    pub provider: Option<String>,
    pub provider_scope: Option<String>,
}

impl ScopeReport {
    fn write_scope(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let pad = "  ".repeat(depth);
        let mode = if self.export_all { " (export-all)" } else { "" };
        writeln!(f, "{}scope {}{}", pad, self.path, mode)?;

        for provider in &self.providers {
            let constant = if provider.constant { ", constant" } else { "" };
            writeln!(
                f,
                "{}  provides {} <- {} [{}{}]",
                pad, provider.key, provider.site, provider.source, constant
            )?;
        }
        for binding in &self.bindings {
            let kind = if binding.required { "requires" } else { "optional" };
            match (&binding.provider, binding.level, &binding.provider_scope) {
                (Some(provider), Some(level), Some(scope)) => writeln!(
                    f,
                    "{}  {} {} @ {} -> {} in {} ({})",
                    pad, kind, binding.key, binding.site, provider, scope, level
                )?,
                _ => writeln!(
                    f,
                    "{}  {} {} @ {} -> unresolved",
                    pad, kind, binding.key, binding.site
                )?,
            }
        }
        if !self.exports.is_empty() {
            let exports: Vec<String> = self.exports.iter().map(ToString::to_string).collect();
            writeln!(f, "{}  exports {}", pad, exports.join(", "))?;
        }
        Ok(())
    }
}

impl fmt::Display for ScopeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut stack = vec![(self, 0)];
        while let Some((report, depth)) = stack.pop() {
            report.write_scope(f, depth)?;
            stack.extend(report.children.iter().rev().map(|child| (child, depth + 1)));
        }
        Ok(())
    }
}
