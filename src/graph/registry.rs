//! 作用域注册表
//!
//! 每个作用域（容器）一个注册表，拥有该作用域内的所有条目、提供者、
//! 绑定和导出。注册只在装配阶段发生，解析完成后只读。

use super::entry::{Binding, BindingId, Entry, Provider, ProviderId, SourceKind};
use super::next_index;
use super::precedence::Precedence;
use super::scope::ScopeId;
use super::unit::{Unit, UnitId};
use crate::errors::{DuplicateReason, WireError};
use crate::key::Key;
use indexmap::IndexMap;
use std::sync::Arc;

/// 导出槽位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportSlot {
    /// 显式导出某个提供者
    Provider(ProviderId),
    /// 按键导出，提供者在自底向上聚合时确定（可以来自子作用域的导出）
    Pending,
}

/// 作用域注册表
#[derive(Debug, Clone)]
pub struct ScopeRegistry {
    scope: ScopeId,
    name: Arc<str>,
    entries: IndexMap<Key, Entry>,
    providers: Vec<Provider>,
    bindings: Vec<Binding>,
    exports: IndexMap<Key, ExportSlot>,
    export_all: bool,
    /// 直接挂在单元上的提供者（unit / bean 层级）
    attached: IndexMap<UnitId, IndexMap<Key, ProviderId>>,
    /// 单元可见的上下文派生值（context 层级）
    contexts: IndexMap<UnitId, IndexMap<Key, ProviderId>>,
}

impl ScopeRegistry {
    pub(crate) fn new(scope: ScopeId, name: Arc<str>, export_all: bool) -> Self {
        Self {
            scope,
            name,
            entries: IndexMap::new(),
            providers: Vec::new(),
            bindings: Vec::new(),
            exports: IndexMap::new(),
            export_all,
            attached: IndexMap::new(),
            contexts: IndexMap::new(),
        }
    }

    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn next_provider_id(&self) -> Result<ProviderId, WireError> {
        Ok(ProviderId {
            scope: self.scope,
            index: next_index(self.providers.len(), "providers")?,
        })
    }

    fn push_provider(
        &mut self,
        key: Key,
        unit: Option<UnitId>,
        site: Arc<str>,
        constant: bool,
        source: SourceKind,
    ) -> Result<ProviderId, WireError> {
        let id = self.next_provider_id()?;
        self.providers.push(Provider {
            id,
            key,
            unit,
            site,
            constant,
            source,
        });
        Ok(id)
    }

    /// 注册消费站点
    ///
    /// 按需创建条目，把新绑定追加到条目的绑定列表末尾；返回未解析的绑定。
    pub fn bind(
        &mut self,
        key: Key,
        required: bool,
        unit: &Unit,
        precedence: Precedence,
    ) -> Result<BindingId, WireError> {
        let id = BindingId {
            scope: self.scope,
            index: next_index(self.bindings.len(), "bindings")?,
        };
        self.bindings.push(Binding {
            id,
            key: key.clone(),
            required,
            unit: unit.id(),
            site: unit.site_arc(),
            precedence,
            resolution: None,
        });
        self.entries
            .entry(key.clone())
            .or_insert_with(|| Entry::new(key))
            .push_binding(id, required);
        Ok(id)
    }

    /// 注册提供者
    ///
    /// 同一作用域内同一个键只能有一个提供者；第二次提供是硬错误。
    /// 处于全部导出模式时同时导出该键。
    pub fn provide(
        &mut self,
        key: Key,
        unit: &Unit,
        constant: bool,
        source: SourceKind,
    ) -> Result<ProviderId, WireError> {
        let id = self.next_provider_id()?;
        let installed = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| Entry::new(key.clone()))
            .install(id);
        if let Err(existing) = installed {
            return Err(duplicate_provider(
                &self.name,
                &key,
                &self.providers[existing.index as usize],
                Some(unit.id()),
                unit.site(),
            ));
        }

        self.push_provider(key.clone(), Some(unit.id()), unit.site_arc(), constant, source)?;
        if self.export_all {
            self.auto_export(key, id);
        }
        Ok(id)
    }

    fn auto_export(&mut self, key: Key, provider: ProviderId) {
        match self.exports.get_mut(&key) {
            Some(slot @ ExportSlot::Pending) => *slot = ExportSlot::Provider(provider),
            Some(ExportSlot::Provider(_)) => {}
            None => {
                self.exports.insert(key, ExportSlot::Provider(provider));
            }
        }
    }

    /// 显式导出；同一个键导出两次是硬错误
    pub fn export(&mut self, key: Key, provider: ProviderId) -> Result<(), WireError> {
        if self.exports.contains_key(&key) {
            return Err(WireError::DuplicateExport {
                key,
                scope: self.name.to_string(),
            });
        }
        self.exports.insert(key, ExportSlot::Provider(provider));
        Ok(())
    }

    /// 按键导出，提供者稍后确定
    pub fn export_pending(&mut self, key: Key) -> Result<(), WireError> {
        if self.exports.contains_key(&key) {
            return Err(WireError::DuplicateExport {
                key,
                scope: self.name.to_string(),
            });
        }
        self.exports.insert(key, ExportSlot::Pending);
        Ok(())
    }

    /// 开启全部导出模式：已有和之后的本地提供者都会被导出
    pub fn enable_export_all(&mut self) {
        self.export_all = true;
        let local: Vec<(Key, ProviderId)> = self
            .entries
            .values()
            .filter_map(|entry| entry.provider().map(|p| (entry.key.clone(), p)))
            .collect();
        for (key, provider) in local {
            self.auto_export(key, provider);
        }
    }

    pub fn is_export_all(&self) -> bool {
        self.export_all
    }

    /// 为某个消费单元直接挂载提供者（unit 层级；挂在组件上时也服务于 bean 层级）
    pub fn attach(
        &mut self,
        target: &Unit,
        key: Key,
        producer: &Unit,
        constant: bool,
        source: SourceKind,
    ) -> Result<ProviderId, WireError> {
        if let Some(existing) = self
            .attached
            .get(&target.id())
            .and_then(|services| services.get(&key))
        {
            return Err(duplicate_provider(
                &self.name,
                &key,
                &self.providers[existing.index as usize],
                Some(producer.id()),
                producer.site(),
            ));
        }

        let id = self.push_provider(
            key.clone(),
            Some(producer.id()),
            producer.site_arc(),
            constant,
            source,
        )?;
        self.attached
            .entry(target.id())
            .or_default()
            .insert(key, id);
        Ok(id)
    }

    /// 为某个消费单元注册上下文派生的值（context 层级）
    pub fn provide_context(
        &mut self,
        unit: &Unit,
        key: Key,
        context: Arc<str>,
    ) -> Result<ProviderId, WireError> {
        let site: Arc<str> = format!("{}[context {}]", unit.site(), context).into();
        if let Some(existing) = self
            .contexts
            .get(&unit.id())
            .and_then(|services| services.get(&key))
        {
            return Err(duplicate_provider(
                &self.name,
                &key,
                &self.providers[existing.index as usize],
                None,
                &site,
            ));
        }

        let id = self.push_provider(key.clone(), None, site, false, SourceKind::Context { context })?;
        self.contexts.entry(unit.id()).or_default().insert(key, id);
        Ok(id)
    }

    /// 不进入条目表的提供者（例如外部注入的实例）
    pub(crate) fn add_detached_provider(
        &mut self,
        key: Key,
        unit: &Unit,
        constant: bool,
        source: SourceKind,
    ) -> Result<ProviderId, WireError> {
        self.push_provider(key, Some(unit.id()), unit.site_arc(), constant, source)
    }

    /// 校验：每个必需绑定都必须已解析
    ///
    /// 报告按条目插入顺序第一个不满足的键，并列出该键所有未解析的必需站点。
    pub fn verify(&self) -> Result<(), WireError> {
        for entry in self.entries.values() {
            if !entry.is_required() {
                continue;
            }
            let sites: Vec<String> = entry
                .bindings
                .iter()
                .map(|id| &self.bindings[id.index as usize])
                .filter(|binding| binding.required && !binding.is_resolved())
                .map(|binding| binding.site.to_string())
                .collect();
            if !sites.is_empty() {
                return Err(WireError::UnsatisfiedDependency {
                    key: entry.key.clone(),
                    scope: self.name.to_string(),
                    sites,
                });
            }
        }
        Ok(())
    }

    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }

    pub fn entry(&self, key: &Key) -> Option<&Entry> {
        self.entries.get(key)
    }

    pub fn providers(&self) -> &[Provider] {
        &self.providers
    }

    pub fn provider(&self, id: ProviderId) -> Option<&Provider> {
        if id.scope != self.scope {
            return None;
        }
        self.providers.get(id.index as usize)
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn binding(&self, id: BindingId) -> Option<&Binding> {
        if id.scope != self.scope {
            return None;
        }
        self.bindings.get(id.index as usize)
    }

    pub(crate) fn binding_mut(&mut self, index: usize) -> Option<&mut Binding> {
        self.bindings.get_mut(index)
    }

    pub fn exports(&self) -> &IndexMap<Key, ExportSlot> {
        &self.exports
    }

    pub fn exports_key(&self, key: &Key) -> bool {
        self.exports.contains_key(key)
    }

    /// 本地提供的服务（键 -> 提供者），按条目顺序
    pub fn local_services(&self) -> IndexMap<Key, ProviderId> {
        self.entries
            .values()
            .filter_map(|entry| entry.provider().map(|p| (entry.key.clone(), p)))
            .collect()
    }

    pub fn attached_to(&self, unit: UnitId) -> Option<&IndexMap<Key, ProviderId>> {
        self.attached.get(&unit)
    }

    pub fn contexts_of(&self, unit: UnitId) -> Option<&IndexMap<Key, ProviderId>> {
        self.contexts.get(&unit)
    }
}

/// 构造重复提供者错误，根据现有提供者区分诊断信息
pub(crate) fn duplicate_provider(
    scope: &str,
    key: &Key,
    existing: &Provider,
    attempted_unit: Option<UnitId>,
    attempted_site: &str,
) -> WireError {
    let reason = if existing.unit.is_some() && existing.unit == attempted_unit {
        DuplicateReason::SameUnit
    } else if existing.source.is_operation() {
        DuplicateReason::EmbeddedOperation
    } else {
        DuplicateReason::DifferentUnit
    };
    WireError::DuplicateProvider {
        key: key.clone(),
        scope: scope.to_string(),
        existing: existing.site.to_string(),
        attempted: attempted_site.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::unit::UnitKind;

    fn bean(id: u32, name: &str) -> Unit {
        Unit::new(UnitId(id), ScopeId(0), name.into(), UnitKind::Bean)
    }

    fn operation(id: u32, bean: u32, name: &str) -> Unit {
        Unit::new(
            UnitId(id),
            ScopeId(0),
            name.into(),
            UnitKind::Operation { bean: UnitId(bean) },
        )
    }

    fn registry() -> ScopeRegistry {
        ScopeRegistry::new(ScopeId(0), "app".into(), false)
    }

    fn instance(unit: &Unit) -> SourceKind {
        SourceKind::BeanInstance { bean: unit.id() }
    }

    #[test]
    fn test_bind_reuses_entry_and_upgrades_required() {
        let mut registry = registry();
        let repo = bean(0, "Repo");
        let key = Key::named("Db");

        let first = registry.bind(key.clone(), false, &repo, Precedence::default()).unwrap();
        let second = registry.bind(key.clone(), true, &repo, Precedence::default()).unwrap();

        let entry = registry.entry(&key).unwrap();
        assert_eq!(entry.bindings(), &[first, second]);
        assert!(entry.is_required());
        assert_eq!(registry.entries().count(), 1);
        assert!(!registry.binding(first).unwrap().is_resolved());
    }

    #[test]
    fn test_duplicate_provider_same_unit() {
        let mut registry = registry();
        let db = bean(0, "DbBean");
        let key = Key::named("Db");

        registry.provide(key.clone(), &db, true, instance(&db)).unwrap();
        let err = registry
            .provide(key, &db, true, instance(&db))
            .unwrap_err();
        assert!(matches!(
            err,
            WireError::DuplicateProvider {
                reason: DuplicateReason::SameUnit,
                ..
            }
        ));
        assert_eq!(registry.providers().len(), 1);
    }

    #[test]
    fn test_duplicate_provider_different_unit_names_both_sites() {
        let mut registry = registry();
        let db = bean(0, "DbBean");
        let other = bean(1, "OtherBean");
        let key = Key::named("Db");

        registry.provide(key.clone(), &db, true, instance(&db)).unwrap();
        let err = registry
            .provide(key, &other, true, instance(&other))
            .unwrap_err();
        match err {
            WireError::DuplicateProvider {
                existing,
                attempted,
                reason,
                ..
            } => {
                assert_eq!(existing, "DbBean");
                assert_eq!(attempted, "OtherBean");
                assert_eq!(reason, DuplicateReason::DifferentUnit);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_duplicate_provider_embedded_operation() {
        let mut registry = registry();
        let factory = operation(1, 0, "Factory#create");
        let other = bean(2, "OtherBean");
        let key = Key::named("Db");

        registry
            .provide(
                key.clone(),
                &factory,
                false,
                SourceKind::Operation {
                    operation: factory.id(),
                    bean: UnitId(0),
                },
            )
            .unwrap();
        let err = registry
            .provide(key, &other, true, instance(&other))
            .unwrap_err();
        assert!(matches!(
            err,
            WireError::DuplicateProvider {
                reason: DuplicateReason::EmbeddedOperation,
                ..
            }
        ));
    }

    #[test]
    fn test_duplicate_export() {
        let mut registry = registry();
        let db = bean(0, "DbBean");
        let key = Key::named("Db");
        let provider = registry.provide(key.clone(), &db, true, instance(&db)).unwrap();

        registry.export(key.clone(), provider).unwrap();
        let err = registry.export(key.clone(), provider).unwrap_err();
        assert!(matches!(err, WireError::DuplicateExport { .. }));
        assert!(matches!(
            registry.export_pending(key),
            Err(WireError::DuplicateExport { .. })
        ));
    }

    #[test]
    fn test_export_all_exports_existing_and_future_providers() {
        let mut registry = registry();
        let db = bean(0, "DbBean");
        let cache = bean(1, "CacheBean");

        let db_provider = registry
            .provide(Key::named("Db"), &db, true, instance(&db))
            .unwrap();
        registry.export_pending(Key::named("Cache")).unwrap();
        registry.enable_export_all();
        let cache_provider = registry
            .provide(Key::named("Cache"), &cache, true, instance(&cache))
            .unwrap();

        assert_eq!(
            registry.exports().get(&Key::named("Db")),
            Some(&ExportSlot::Provider(db_provider))
        );
        assert_eq!(
            registry.exports().get(&Key::named("Cache")),
            Some(&ExportSlot::Provider(cache_provider))
        );
    }

    #[test]
    fn test_verify_lists_unresolved_required_sites() {
        let mut registry = registry();
        let repo = bean(0, "Repo");
        let job = bean(1, "Job");
        let key = Key::named("Clock");

        registry.bind(key.clone(), true, &repo, Precedence::default()).unwrap();
        registry.bind(key.clone(), false, &job, Precedence::default()).unwrap();
        registry.bind(key, true, &job, Precedence::default()).unwrap();

        match registry.verify().unwrap_err() {
            WireError::UnsatisfiedDependency { key, sites, .. } => {
                assert_eq!(key, Key::named("Clock"));
                assert_eq!(sites, vec!["Repo".to_string(), "Job".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_verify_ignores_optional_bindings() {
        let mut registry = registry();
        let repo = bean(0, "Repo");
        registry.bind(Key::named("Metrics"), false, &repo, Precedence::default()).unwrap();
        assert!(registry.verify().is_ok());
    }

    #[test]
    fn test_context_provider_has_no_producing_unit() {
        let mut registry = registry();
        let handler = bean(0, "Handler");
        let key = Key::named("Request");

        let id = registry
            .provide_context(&handler, key.clone(), "web".into())
            .unwrap();
        let provider = registry.provider(id).unwrap();
        assert_eq!(provider.producing_unit(), None);
        assert_eq!(provider.source().label(), "context");
        assert!(registry.provide_context(&handler, key, "web".into()).is_err());
    }
}
