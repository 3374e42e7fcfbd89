//! 错误类型
//!
//! 服务图解析过程中的所有失败都是静态配置错误：一旦出现即中止整个构建，
//! 不做部分恢复，也不重试。

use crate::graph::{ScopeId, UnitId};
use crate::key::Key;
use thiserror::Error;

/// 重复提供者的具体情形（只影响诊断信息，不影响行为）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateReason {
    /// 同一个生产单元再次提供同一个键
    SameUnit,
    /// 另一个单元已经提供了该键
    DifferentUnit,
    /// 已存在一个内嵌操作（operation）提供者
    EmbeddedOperation,
}

/// 解析器错误
#[derive(Debug, Error)]
pub enum WireError {
    #[error("{}", duplicate_message(.key, .scope, .existing, .attempted, .reason))]
    DuplicateProvider {
        key: Key,
        scope: String,
        existing: String,
        attempted: String,
        reason: DuplicateReason,
    },

    #[error("Key {key} is exported more than once from scope '{scope}'")]
    DuplicateExport { key: Key, scope: String },

    #[error("Unsatisfied dependency on {key} in scope '{scope}', required by: {}", .sites.join(", "))]
    UnsatisfiedDependency {
        key: Key,
        scope: String,
        sites: Vec<String>,
    },

    #[error("Circular dependency detected: {}", format_cycle(.chain))]
    CircularDependency { chain: Vec<Key> },

    #[error("Cannot attach scope '{child}' to '{parent}': {reason}")]
    InvalidScopeLink {
        parent: String,
        child: String,
        reason: String,
    },

    #[error("Unknown scope {0}")]
    UnknownScope(ScopeId),

    #[error("Unknown unit {0}")]
    UnknownUnit(UnitId),

    #[error("Too many {0} in one build (limit is {max})", max = u32::MAX)]
    CapacityExceeded(&'static str),

    #[error("Contract error: {0}")]
    Contract(#[from] ContractError),
}

/// 契约构建错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractError {
    #[error("Key {key} cannot be {requested} by a contract that already has it as {existing}")]
    RoleConflict {
        key: Key,
        existing: &'static str,
        requested: &'static str,
    },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read file '{0}': {1}")]
    FileRead(String, #[source] std::io::Error),
    #[error("Failed to parse TOML from file '{0}': {1}")]
    TomlParse(String, #[source] toml::de::Error),
    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// 装配清单（manifest）错误
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Failed to read manifest '{0}': {1}")]
    FileRead(String, #[source] std::io::Error),
    #[error("Failed to parse manifest: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Unknown unit '{unit}' in scope '{scope}'")]
    UnknownUnit { scope: String, unit: String },
    #[error("Duplicate unit name '{unit}' in scope '{scope}'")]
    DuplicateUnit { scope: String, unit: String },
    #[error(transparent)]
    Wire(#[from] WireError),
}

/// 键解析错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseKeyError {
    #[error("Key is empty")]
    Empty,
    #[error("Key '{0}' has an empty qualifier")]
    EmptyQualifier(String),
}

/// 绑定层级解析错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown binding level '{0}' (expected unit, bean, context or namespace)")]
pub struct ParseLevelError(pub String);

fn duplicate_message(
    key: &Key,
    scope: &str,
    existing: &str,
    attempted: &str,
    reason: &DuplicateReason,
) -> String {
    match reason {
        DuplicateReason::SameUnit => format!(
            "Duplicate provider for {} in scope '{}': {} already provides this key",
            key, scope, attempted
        ),
        DuplicateReason::DifferentUnit => format!(
            "Duplicate provider for {} in scope '{}': already provided by {}, cannot also be provided by {}",
            key, scope, existing, attempted
        ),
        DuplicateReason::EmbeddedOperation => format!(
            "Duplicate provider for {} in scope '{}': an embedded operation provider ({}) already exists, cannot be provided by {}",
            key, scope, existing, attempted
        ),
    }
}

/// 格式化环路：两个节点用 `A <-> B`，其余用 `A -> B -> ... -> A`
pub fn format_cycle(chain: &[Key]) -> String {
    match chain {
        [] => String::new(),
        [a, b] => format!("{} <-> {}", a, b),
        [first, ..] => {
            let mut out: Vec<String> = chain.iter().map(ToString::to_string).collect();
            out.push(first.to_string());
            out.join(" -> ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_cycle_shapes() {
        let a = Key::named("A");
        let b = Key::named("B");
        let c = Key::named("C");

        assert_eq!(format_cycle(&[a.clone()]), "A -> A");
        assert_eq!(format_cycle(&[a.clone(), b.clone()]), "A <-> B");
        assert_eq!(format_cycle(&[a, b, c]), "A -> B -> C -> A");
    }

    #[test]
    fn test_duplicate_messages_differ_by_reason() {
        let make = |reason| WireError::DuplicateProvider {
            key: Key::named("Db"),
            scope: "app".to_string(),
            existing: "DbBean".to_string(),
            attempted: "OtherBean".to_string(),
            reason,
        };

        let same = make(DuplicateReason::SameUnit).to_string();
        let different = make(DuplicateReason::DifferentUnit).to_string();
        let embedded = make(DuplicateReason::EmbeddedOperation).to_string();

        assert!(same.contains("already provides this key"));
        assert!(different.contains("already provided by DbBean"));
        assert!(embedded.contains("embedded operation provider (DbBean)"));
        assert_ne!(same, different);
        assert_ne!(different, embedded);
    }

    #[test]
    fn test_unsatisfied_lists_all_sites() {
        let err = WireError::UnsatisfiedDependency {
            key: Key::named("Clock"),
            scope: "app".to_string(),
            sites: vec!["A".to_string(), "B#run".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Unsatisfied dependency on Clock in scope 'app', required by: A, B#run"
        );
    }
}
