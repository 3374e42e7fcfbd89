//! 构建上下文
//!
//! 一次构建（装配 + 解析）的显式上下文：持有作用域树和全部单元，
//! 通过引用传给解析器和环路检测器，不存在全局状态。

use super::application::{derive_contract, Application};
use super::cycle::CycleDetector;
use super::entry::{BindingId, ProviderId, SourceKind};
use super::next_index;
use super::precedence::Precedence;
use super::registry::duplicate_provider;
use super::resolver::{ResolveStats, Resolver};
use super::scope::{ScopeId, ScopeNode, ScopeTree};
use super::unit::{Unit, UnitId, UnitKind};
use crate::config::ResolverConfig;
use crate::contract::Contract;
use crate::errors::WireError;
use crate::key::Key;
use crate::logging::OperationTimer;
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 构建上下文
#[derive(Debug, Clone)]
pub struct BuildContext {
    tree: ScopeTree,
    units: Vec<Unit>,
    default_precedence: Precedence,
    export_all_by_default: bool,
    stats: Option<ResolveStats>,
}

impl BuildContext {
    pub fn new(root_name: impl Into<Arc<str>>) -> Self {
        Self::with_config(root_name, &ResolverConfig::default())
    }

    pub fn with_config(root_name: impl Into<Arc<str>>, config: &ResolverConfig) -> Self {
        Self {
            tree: ScopeTree::new(root_name, config.export_all_by_default),
            units: Vec::new(),
            default_precedence: config.default_precedence.clone(),
            export_all_by_default: config.export_all_by_default,
            stats: None,
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

    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    pub fn unit(&self, id: UnitId) -> Result<&Unit, WireError> {
        self.units.get(id.index()).ok_or(WireError::UnknownUnit(id))
    }

    pub fn default_precedence(&self) -> &Precedence {
        &self.default_precedence
    }

    /// 最近一次解析的统计
    pub fn stats(&self) -> Option<ResolveStats> {
        self.stats
    }

    // ---- 作用域树 ----

    /// 新建一个尚未挂接的作用域
    pub fn add_scope(&mut self, name: impl Into<Arc<str>>) -> Result<ScopeId, WireError> {
        self.tree.add(name, self.export_all_by_default)
    }

    /// 新建作用域并挂接到父作用域下
    pub fn add_child(
        &mut self,
        parent: ScopeId,
        name: impl Into<Arc<str>>,
    ) -> Result<ScopeId, WireError> {
        self.tree.node(parent)?;
        let child = self.add_scope(name)?;
        self.tree.attach_child(parent, child)?;
        Ok(child)
    }

    pub fn attach_child(&mut self, parent: ScopeId, child: ScopeId) -> Result<(), WireError> {
        self.tree.attach_child(parent, child)
    }

    // ---- 单元 ----

    fn push_unit(
        &mut self,
        scope: ScopeId,
        name: Arc<str>,
        kind: UnitKind,
    ) -> Result<UnitId, WireError> {
        let id = UnitId(next_index(self.units.len(), "units")?);
        self.units.push(Unit::new(id, scope, name, kind));
        Ok(id)
    }

    pub fn add_bean(
        &mut self,
        scope: ScopeId,
        name: impl Into<Arc<str>>,
    ) -> Result<UnitId, WireError> {
        self.tree.node(scope)?;
        self.push_unit(scope, name.into(), UnitKind::Bean)
    }

    /// 在组件上添加操作，站点名为 `Bean#operation`
    pub fn add_operation(&mut self, bean: UnitId, name: &str) -> Result<UnitId, WireError> {
        let owner = self.unit(bean)?;
        if owner.kind() != UnitKind::Bean {
            return Err(WireError::UnknownUnit(bean));
        }
        let scope = owner.scope();
        let site: Arc<str> = format!("{}#{}", owner.site(), name).into();
        self.push_unit(scope, site, UnitKind::Operation { bean })
    }

    // ---- 绑定与提供 ----

    pub fn bind(&mut self, unit: UnitId, key: Key, required: bool) -> Result<BindingId, WireError> {
        let precedence = self.default_precedence.clone();
        self.bind_with(unit, key, required, precedence)
    }

    /// 使用指定优先级策略注册消费站点
    pub fn bind_with(
        &mut self,
        unit: UnitId,
        key: Key,
        required: bool,
        precedence: Precedence,
    ) -> Result<BindingId, WireError> {
        let consumer = self.units.get(unit.index()).ok_or(WireError::UnknownUnit(unit))?;
        let node = self.tree.node_mut(consumer.scope)?;
        let id = node.registry.bind(key, required, consumer, precedence)?;
        self.units[unit.index()].bindings.push(id);
        Ok(id)
    }

    /// 注册提供者，来源类型由单元类型推导
    pub fn provide(&mut self, unit: UnitId, key: Key, constant: bool) -> Result<ProviderId, WireError> {
        let source = self.source_of(unit)?;
        self.provide_with(unit, key, constant, source)
    }

    pub fn provide_with(
        &mut self,
        unit: UnitId,
        key: Key,
        constant: bool,
        source: SourceKind,
    ) -> Result<ProviderId, WireError> {
        let producer = self.units.get(unit.index()).ok_or(WireError::UnknownUnit(unit))?;
        let node = self.tree.node_mut(producer.scope)?;
        let id = node.registry.provide(key, producer, constant, source)?;
        self.units[unit.index()].providers.push(id);
        Ok(id)
    }

    /// 把提供者直接挂在消费单元上（unit 层级；挂在组件上时也服务于它的操作）
    pub fn provide_at_unit(
        &mut self,
        target: UnitId,
        key: Key,
        producer: UnitId,
        constant: bool,
    ) -> Result<ProviderId, WireError> {
        let source = self.source_of(producer)?;
        let consumer = self.units.get(target.index()).ok_or(WireError::UnknownUnit(target))?;
        let producing = self.units.get(producer.index()).ok_or(WireError::UnknownUnit(producer))?;
        let node = self.tree.node_mut(consumer.scope)?;
        let id = node.registry.attach(consumer, key, producing, constant, source)?;
        self.units[producer.index()].providers.push(id);
        Ok(id)
    }

    /// 为消费单元注册上下文派生的值
    pub fn provide_context(
        &mut self,
        unit: UnitId,
        key: Key,
        context: impl Into<Arc<str>>,
    ) -> Result<ProviderId, WireError> {
        let consumer = self.units.get(unit.index()).ok_or(WireError::UnknownUnit(unit))?;
        let node = self.tree.node_mut(consumer.scope)?;
        node.registry.provide_context(consumer, key, context.into())
    }

    /// 向作用域注入外部实例
    ///
    /// 注入的实例对该作用域及其后代可见，优先于命名空间中的其他服务。
    pub fn inject_instance(
        &mut self,
        scope: ScopeId,
        key: Key,
        site: impl Into<Arc<str>>,
    ) -> Result<ProviderId, WireError> {
        let site = site.into();
        let node = self.tree.node(scope)?;
        if let Some(existing) = node.overrides.get(&key) {
            let existing = node
                .registry
                .provider(*existing)
                .ok_or(WireError::UnknownScope(scope))?;
            return Err(duplicate_provider(&node.name, &key, existing, None, &site));
        }

        let unit = self.push_unit(scope, site, UnitKind::Injected)?;
        let injected = &self.units[unit.index()];
        let node = self.tree.node_mut(scope)?;
        let id = node.registry.add_detached_provider(
            key.clone(),
            injected,
            true,
            SourceKind::BeanInstance { bean: unit },
        )?;
        node.overrides.insert(key, id);
        self.units[unit.index()].providers.push(id);
        Ok(id)
    }

    fn source_of(&self, unit: UnitId) -> Result<SourceKind, WireError> {
        let unit = self.unit(unit)?;
        Ok(match unit.kind() {
            UnitKind::Bean | UnitKind::Injected => SourceKind::BeanInstance { bean: unit.id() },
            UnitKind::Operation { bean } => SourceKind::Operation {
                operation: unit.id(),
                bean,
            },
        })
    }

    // ---- 导出 ----

    /// 把本地提供者以其键导出到父作用域
    pub fn export(&mut self, provider: ProviderId) -> Result<(), WireError> {
        let node = self.tree.node_mut(provider.scope())?;
        let key = node
            .registry
            .provider(provider)
            .map(|p| p.key().clone())
            .ok_or(WireError::UnknownScope(provider.scope()))?;
        node.registry.export(key, provider)
    }

    /// 按键导出；提供者可以是本地的，也可以来自子作用域的导出
    pub fn export_key(&mut self, scope: ScopeId, key: Key) -> Result<(), WireError> {
        self.tree.node_mut(scope)?.registry.export_pending(key)
    }

    pub fn enable_export_all(&mut self, scope: ScopeId) -> Result<(), WireError> {
        self.tree.node_mut(scope)?.registry.enable_export_all();
        Ok(())
    }

    // ---- 解析与校验 ----

    /// 执行跨作用域解析
    pub fn resolve(&mut self) -> Result<ResolveStats, WireError> {
        for scope in self.tree.detached() {
            warn!(
                scope = %self.tree.path(scope),
                "Scope is not attached to the root and will not be resolved"
            );
        }
        let stats = Resolver::new(&mut self.tree, &self.units).run()?;
        self.stats = Some(stats);
        Ok(stats)
    }

    /// 环路检测，返回检查过的提供者数量
    pub fn detect_cycles(&self) -> Result<usize, WireError> {
        CycleDetector::new(&self.tree, &self.units).run()
    }

    pub fn verify(&self, scope: ScopeId) -> Result<(), WireError> {
        self.tree.node(scope)?.registry.verify()
    }

    /// 按先序校验根作用域下的所有作用域
    pub fn verify_all(&self) -> Result<(), WireError> {
        for scope in self.tree.pre_order(self.tree.root()) {
            self.verify(scope)?;
        }
        Ok(())
    }

    /// 构建要求每个作用域都挂接在根作用域下
    fn ensure_attached(&self) -> Result<(), WireError> {
        match self.tree.detached().first() {
            Some(scope) => Err(WireError::InvalidScopeLink {
                parent: self.tree.root_node().name().to_string(),
                child: self.tree.path(*scope),
                reason: "scope is not attached under the root".to_string(),
            }),
            None => Ok(()),
        }
    }

    pub fn contract_of(&self, scope: ScopeId) -> Result<Contract, WireError> {
        derive_contract(&self.tree, &self.units, scope)
    }

    /// 解析、环路检测、校验，然后生成不可变的应用
    pub fn build(mut self) -> Result<Application, WireError> {
        let timer = OperationTimer::new("build")
            .with_metadata("root", self.tree.path(self.tree.root()))
            .with_metadata("units", self.units.len());

        self.ensure_attached()?;
        let stats = self.resolve()?;
        let checked = self.detect_cycles()?;
        self.verify_all()?;

        let mut contracts = IndexMap::new();
        for scope in self.tree.pre_order(self.tree.root()) {
            contracts.insert(scope, self.contract_of(scope)?);
        }
        debug!(providers = checked, contracts = contracts.len(), "Build checks passed");
        timer.finish();

        info!(
            scopes = stats.scopes,
            bindings = stats.bindings,
            resolved = stats.resolved,
            "Application built"
        );
        Ok(Application::new(self.tree, self.units, contracts, stats))
    }
}
