//! 跨作用域解析器
//!
//! 针对整棵作用域树计算每个绑定最终使用的提供者：
//! 1. 自底向上聚合导出：已解析服务 = 本地提供 ∪ 子作用域导出
//!    （兄弟作用域导出同一个键是冲突；本地提供者优先于子作用域导出）
//! 2. 自顶向下传播可见服务：父作用域视图去掉自身导出的键，再叠加注入实例
//! 3. 按每个绑定的优先级策略逐层查找，第一个命中的层级胜出

use super::entry::{Binding, ProviderId, Resolution};
use super::precedence::BindingLevel;
use super::registry::{duplicate_provider, ExportSlot};
use super::scope::{ScopeId, ScopeNode, ScopeTree};
use super::unit::Unit;
use crate::errors::{DuplicateReason, WireError};
use crate::key::Key;
use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, trace, warn};

/// 解析统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResolveStats {
    pub scopes: usize,
    pub bindings: usize,
    pub resolved: usize,
    pub unresolved_required: usize,
    pub unresolved_optional: usize,
    /// 因自身导出而从继承视图中去掉的键
    pub masked: usize,
}

/// 跨作用域解析器
pub struct Resolver<'a> {
    tree: &'a mut ScopeTree,
    units: &'a [Unit],
}

impl<'a> Resolver<'a> {
    pub fn new(tree: &'a mut ScopeTree, units: &'a [Unit]) -> Self {
        Self { tree, units }
    }

    /// 对根作用域下的整棵树执行两遍解析
    pub fn run(mut self) -> Result<ResolveStats, WireError> {
        let root = self.tree.root();
        self.aggregate_exports(root)?;
        let masked = self.propagate_visibility(root)?;
        let mut stats = self.resolve_bindings(root)?;
        stats.masked = masked;
        debug!(
            scopes = stats.scopes,
            bindings = stats.bindings,
            resolved = stats.resolved,
            unresolved_required = stats.unresolved_required,
            "Service graph resolved"
        );
        Ok(stats)
    }

    /// 自底向上：子作用域先于父作用域
    fn aggregate_exports(&mut self, root: ScopeId) -> Result<(), WireError> {
        for id in self.tree.post_order(root) {
            let (resolved, exported) = {
                let node = self.tree.node(id)?;
                let local = node.registry.local_services();
                let mut resolved = local.clone();

                for child in &node.children {
                    let child_node = self.tree.node(*child)?;
                    for (key, provider) in &child_node.exported {
                        match resolved.get(key) {
                            Some(existing) if existing == provider => {}
                            Some(_) if local.contains_key(key) => {
                                warn!(
                                    scope = %node.name,
                                    child = %child_node.name,
                                    key = %key,
                                    "Child export is masked by a local provider"
                                );
                            }
                            Some(existing) => {
                                return Err(self.collision(node, key, *existing, *provider));
                            }
                            None => {
                                resolved.insert(key.clone(), *provider);
                            }
                        }
                    }
                }

                let mut exported = IndexMap::new();
                for (key, slot) in node.registry.exports() {
                    let provider = match slot {
                        ExportSlot::Provider(provider) => *provider,
                        ExportSlot::Pending => match resolved.get(key) {
                            Some(provider) => *provider,
                            None => {
                                return Err(WireError::UnsatisfiedDependency {
                                    key: key.clone(),
                                    scope: node.name.to_string(),
                                    sites: vec![format!("export of scope {}", self.tree.path(id))],
                                });
                            }
                        },
                    };
                    exported.insert(key.clone(), provider);
                }

                debug!(
                    scope = %node.name,
                    resolved = resolved.len(),
                    exported = exported.len(),
                    "Aggregated exports"
                );
                (resolved, exported)
            };

            let node = self.tree.node_mut(id)?;
            node.resolved = resolved;
            node.exported = exported;
        }
        Ok(())
    }

    fn collision(
        &self,
        scope: &ScopeNode,
        key: &Key,
        existing: ProviderId,
        attempted: ProviderId,
    ) -> WireError {
        match (self.tree.provider(existing), self.tree.provider(attempted)) {
            (Some(existing), Some(attempted)) => {
                duplicate_provider(&scope.name, key, existing, attempted.unit, &attempted.site)
            }
            _ => WireError::DuplicateProvider {
                key: key.clone(),
                scope: scope.name.to_string(),
                existing: existing.to_string(),
                attempted: attempted.to_string(),
                reason: DuplicateReason::DifferentUnit,
            },
        }
    }

    /// 自顶向下：父作用域先于子作用域
    ///
    /// 作用域自己导出的键必须从继承视图中去掉，否则它会通过父作用域
    /// 看到自己的导出，形成与自身的环。
    fn propagate_visibility(&mut self, root: ScopeId) -> Result<usize, WireError> {
        let mut masked_total = 0;
        for id in self.tree.pre_order(root) {
            let (visible, masked) = {
                let node = self.tree.node(id)?;
                let mut visible = match node.parent {
                    Some(parent) => self.tree.node(parent)?.view_for_children(),
                    None => IndexMap::new(),
                };

                let mut masked = 0;
                for key in node.registry.exports().keys() {
                    if visible.shift_remove(key).is_some() {
                        masked += 1;
                        trace!(scope = %node.name, key = %key, "Own export masks inherited service");
                    }
                }
                for (key, provider) in &node.overrides {
                    visible.insert(key.clone(), *provider);
                }
                (visible, masked)
            };

            self.tree.node_mut(id)?.visible = visible;
            masked_total += masked;
        }
        Ok(masked_total)
    }

    fn resolve_bindings(&mut self, root: ScopeId) -> Result<ResolveStats, WireError> {
        let mut stats = ResolveStats::default();
        for id in self.tree.pre_order(root) {
            let resolutions: Vec<(usize, Resolution)> = {
                let node = self.tree.node(id)?;
                node.registry
                    .bindings()
                    .iter()
                    .enumerate()
                    .filter(|(_, binding)| !binding.is_resolved())
                    .filter_map(|(index, binding)| {
                        self.select(node, binding).map(|resolution| (index, resolution))
                    })
                    .collect()
            };

            let node = self.tree.node_mut(id)?;
            for (index, resolution) in resolutions {
                if let Some(binding) = node.registry.binding_mut(index) {
                    trace!(
                        binding = %binding.site,
                        key = %binding.key,
                        level = %resolution.level,
                        "Binding resolved"
                    );
                    binding.resolve(resolution);
                }
            }

            stats.scopes += 1;
            for binding in node.registry.bindings() {
                stats.bindings += 1;
                match (binding.is_resolved(), binding.required) {
                    (true, _) => stats.resolved += 1,
                    (false, true) => stats.unresolved_required += 1,
                    (false, false) => stats.unresolved_optional += 1,
                }
            }
        }
        Ok(stats)
    }

    /// 按优先级逐层查找，第一个非空层级胜出
    fn select(&self, node: &ScopeNode, binding: &Binding) -> Option<Resolution> {
        for level in binding.precedence.levels() {
            let found = match level {
                BindingLevel::Unit => node
                    .registry
                    .attached_to(binding.unit)
                    .and_then(|services| services.get(&binding.key))
                    .copied(),
                BindingLevel::Bean => {
                    let bean = self
                        .units
                        .get(binding.unit.index())
                        .map(Unit::owning_bean)
                        .unwrap_or(binding.unit);
                    node.registry
                        .attached_to(bean)
                        .and_then(|services| services.get(&binding.key))
                        .copied()
                }
                BindingLevel::Context => node
                    .registry
                    .contexts_of(binding.unit)
                    .and_then(|services| services.get(&binding.key))
                    .copied(),
                BindingLevel::Namespace => node.lookup(&binding.key),
            };
            if let Some(provider) = found {
                return Some(Resolution {
                    provider,
                    level: *level,
                });
            }
        }
        None
    }
}
