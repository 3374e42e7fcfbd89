//! 服务图
//!
//! 每个作用域（容器）拥有自己的注册表；装配完成后，由跨作用域解析器
//! 自底向上聚合导出、自顶向下传播可见服务，再由环路检测器校验整棵树。

pub mod application;
pub mod context;
pub mod cycle;
pub mod entry;
pub mod precedence;
pub mod registry;
pub mod resolver;
pub mod scope;
pub mod unit;

// 重新导出API
pub use application::{Application, BindingReport, EntryReport, ProviderReport, ScopeReport};
pub use context::BuildContext;
pub use entry::{Binding, BindingId, Entry, Provider, ProviderId, ProviderSlot, Resolution, SourceKind};
pub use precedence::{BindingLevel, Precedence};
pub use registry::{ExportSlot, ScopeRegistry};
pub use resolver::ResolveStats;
pub use scope::{ScopeId, ScopeNode, ScopeTree};
pub use unit::{Unit, UnitId, UnitKind};

/// 把数组长度转换为下一个ID的序号；超出 `u32` 范围时报错
pub(crate) fn next_index(len: usize, what: &'static str) -> Result<u32, crate::errors::WireError> {
    u32::try_from(len).map_err(|_| crate::errors::WireError::CapacityExceeded(what))
}
