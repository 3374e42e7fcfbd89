//! 条目、绑定与提供者
//!
//! 每个作用域中的每个不同的键对应一个 [`Entry`]：至多一个提供者，
//! 以及按插入顺序排列的所有绑定（消费站点）。

use super::precedence::{BindingLevel, Precedence};
use super::scope::ScopeId;
use super::unit::UnitId;
use crate::key::Key;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// 提供者ID（所属作用域 + 作用域内序号）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ProviderId {
    pub(crate) scope: ScopeId,
    pub(crate) index: u32,
}

impl ProviderId {
    pub fn scope(self) -> ScopeId {
        self.scope
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/provider#{}", self.scope, self.index)
    }
}

/// 绑定ID（所属作用域 + 作用域内序号）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BindingId {
    pub(crate) scope: ScopeId,
    pub(crate) index: u32,
}

impl BindingId {
    pub fn scope(self) -> ScopeId {
        self.scope
    }
}

impl fmt::Display for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/binding#{}", self.scope, self.index)
    }
}

/// 提供者的来源类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    /// 组件实例本身
    BeanInstance { bean: UnitId },
    /// 调用组件上的操作
    Operation { operation: UnitId, bean: UnitId },
    /// 从环境上下文派生
    Context { context: Arc<str> },
    /// 委托给命名空间
    Namespace { namespace: Arc<str> },
}

impl SourceKind {
    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::BeanInstance { .. } => "bean-instance",
            SourceKind::Operation { .. } => "operation",
            SourceKind::Context { .. } => "context",
            SourceKind::Namespace { .. } => "namespace",
        }
    }

    pub fn is_operation(&self) -> bool {
        matches!(self, SourceKind::Operation { .. })
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::BeanInstance { bean } => write!(f, "bean-instance({})", bean),
            SourceKind::Operation { operation, bean } => {
                write!(f, "operation({} on {})", operation, bean)
            }
            SourceKind::Context { context } => write!(f, "context({})", context),
            SourceKind::Namespace { namespace } => write!(f, "namespace({})", namespace),
        }
    }
}

/// 提供者："单元 X 为键 K 提供值"
#[derive(Debug, Clone)]
pub struct Provider {
    pub(crate) id: ProviderId,
    pub(crate) key: Key,
    /// 上下文派生的值没有生产单元
    pub(crate) unit: Option<UnitId>,
    pub(crate) site: Arc<str>,
    pub(crate) constant: bool,
    pub(crate) source: SourceKind,
}

impl Provider {
    pub fn id(&self) -> ProviderId {
        self.id
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn producing_unit(&self) -> Option<UnitId> {
        self.unit
    }

    pub fn site(&self) -> &str {
        &self.site
    }

    /// 值是只计算一次（常量），还是每次请求计算
    pub fn is_constant(&self) -> bool {
        self.constant
    }

    pub fn source(&self) -> &SourceKind {
        &self.source
    }
}

/// 绑定解析结果：选中的提供者以及命中的层级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub provider: ProviderId,
    pub level: BindingLevel,
}

/// 绑定："消费者 X 需要键 K"
#[derive(Debug, Clone)]
pub struct Binding {
    pub(crate) id: BindingId,
    pub(crate) key: Key,
    pub(crate) required: bool,
    pub(crate) unit: UnitId,
    pub(crate) site: Arc<str>,
    pub(crate) precedence: Precedence,
    pub(crate) resolution: Option<Resolution>,
}

impl Binding {
    pub fn id(&self) -> BindingId {
        self.id
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn consuming_unit(&self) -> UnitId {
        self.unit
    }

    pub fn site(&self) -> &str {
        &self.site
    }

    pub fn precedence(&self) -> &Precedence {
        &self.precedence
    }

    pub fn resolution(&self) -> Option<Resolution> {
        self.resolution
    }

    pub fn resolved_provider(&self) -> Option<ProviderId> {
        self.resolution.map(|r| r.provider)
    }

    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }

    /// 只允许设置一次；已解析的绑定保持不变
    pub(crate) fn resolve(&mut self, resolution: Resolution) -> bool {
        if self.resolution.is_some() {
            return false;
        }
        self.resolution = Some(resolution);
        true
    }
}

/// 提供者槽位：未设置 / 已设置（设置后不可更改）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderSlot {
    #[default]
    Unset,
    Set(ProviderId),
}

impl ProviderSlot {
    pub fn get(self) -> Option<ProviderId> {
        match self {
            ProviderSlot::Unset => None,
            ProviderSlot::Set(id) => Some(id),
        }
    }

    pub fn is_set(self) -> bool {
        matches!(self, ProviderSlot::Set(_))
    }
}

/// 作用域内某个键的簿记信息
#[derive(Debug, Clone)]
pub struct Entry {
    pub(crate) key: Key,
    pub(crate) provider: ProviderSlot,
    pub(crate) bindings: Vec<BindingId>,
    pub(crate) required: bool,
}

impl Entry {
    pub(crate) fn new(key: Key) -> Self {
        Self {
            key,
            provider: ProviderSlot::Unset,
            bindings: Vec::new(),
            required: false,
        }
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn provider(&self) -> Option<ProviderId> {
        self.provider.get()
    }

    pub fn bindings(&self) -> &[BindingId] {
        &self.bindings
    }

    /// 任一绑定为必需即为必需
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// 安装提供者；已存在时返回现有提供者
    pub(crate) fn install(&mut self, provider: ProviderId) -> Result<(), ProviderId> {
        match self.provider {
            ProviderSlot::Set(existing) => Err(existing),
            ProviderSlot::Unset => {
                self.provider = ProviderSlot::Set(provider);
                Ok(())
            }
        }
    }

    pub(crate) fn push_binding(&mut self, binding: BindingId, required: bool) {
        self.bindings.push(binding);
        self.required |= required;
    }
}
