//! 生产/消费单元
//!
//! 单元是外部扫描层发现的组件（bean）或其上的操作（operation）。
//! 解析器只持有单元的引用与可读名称，不拥有组件本身。

use super::entry::{BindingId, ProviderId};
use super::scope::ScopeId;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// 单元ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct UnitId(pub(crate) u32);

impl UnitId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit#{}", self.0)
    }
}

/// 单元类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// 组件实例
    Bean,
    /// 组件上的操作（方法、工厂等）
    Operation { bean: UnitId },
    /// 由外部注入的实例（例如装配时显式传入的常量）
    Injected,
}

/// 生产/消费单元
#[derive(Debug, Clone)]
pub struct Unit {
    pub(crate) id: UnitId,
    pub(crate) scope: ScopeId,
    pub(crate) name: Arc<str>,
    pub(crate) kind: UnitKind,
    pub(crate) providers: Vec<ProviderId>,
    pub(crate) bindings: Vec<BindingId>,
}

impl Unit {
    pub(crate) fn new(id: UnitId, scope: ScopeId, name: Arc<str>, kind: UnitKind) -> Self {
        Self {
            id,
            scope,
            name,
            kind,
            providers: Vec::new(),
            bindings: Vec::new(),
        }
    }

    pub fn id(&self) -> UnitId {
        self.id
    }

    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    /// 可读的站点名称，用于诊断信息
    pub fn site(&self) -> &str {
        &self.name
    }

    pub(crate) fn site_arc(&self) -> Arc<str> {
        self.name.clone()
    }

    pub fn kind(&self) -> UnitKind {
        self.kind
    }

    /// 所属组件：操作返回其组件，其余返回自身
    pub fn owning_bean(&self) -> UnitId {
        match self.kind {
            UnitKind::Operation { bean } => bean,
            UnitKind::Bean | UnitKind::Injected => self.id,
        }
    }

    /// 该单元声明的所有提供者
    pub fn providers(&self) -> &[ProviderId] {
        &self.providers
    }

    /// 该单元的所有消费站点
    pub fn bindings(&self) -> &[BindingId] {
        &self.bindings
    }
}
