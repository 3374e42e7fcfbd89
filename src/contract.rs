//! 作用域契约
//!
//! 契约是作用域对外可见的摘要：必需依赖、可选依赖和提供的服务三个互不相交的键集合。
//! 契约不可变，相等性和哈希按三个集合做结构比较。

use crate::errors::ContractError;
use crate::key::Key;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// 不可变契约
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawContract")]
pub struct Contract {
    requires: BTreeSet<Key>,
    requires_optional: BTreeSet<Key>,
    provides: BTreeSet<Key>,
}

/// 反序列化用的中间形式，构造时经过构建器校验
#[derive(Deserialize)]
struct RawContract {
    #[serde(default)]
    requires: Vec<Key>,
    #[serde(default)]
    requires_optional: Vec<Key>,
    #[serde(default)]
    provides: Vec<Key>,
}

impl TryFrom<RawContract> for Contract {
    type Error = ContractError;

    fn try_from(raw: RawContract) -> Result<Self, Self::Error> {
        let mut builder = Contract::builder();
        builder
            .provide(raw.provides)?
            .require(raw.requires)?
            .require_optional(raw.requires_optional)?;
        Ok(builder.build())
    }
}

/// 向后兼容性问题
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompatibilityIssue {
    /// 新增了旧契约中没有的必需依赖
    NewRequirement(Key),
    /// 旧契约提供的服务被移除
    RemovedProvision(Key),
}

impl fmt::Display for CompatibilityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompatibilityIssue::NewRequirement(key) => write!(f, "new requirement: {}", key),
            CompatibilityIssue::RemovedProvision(key) => write!(f, "no longer provides: {}", key),
        }
    }
}

impl Contract {
    pub fn builder() -> ContractBuilder {
        ContractBuilder::default()
    }

    pub fn requires(&self) -> &BTreeSet<Key> {
        &self.requires
    }

    pub fn requires_optional(&self) -> &BTreeSet<Key> {
        &self.requires_optional
    }

    pub fn provides(&self) -> &BTreeSet<Key> {
        &self.provides
    }

    pub fn is_empty(&self) -> bool {
        self.requires.is_empty() && self.requires_optional.is_empty() && self.provides.is_empty()
    }

    /// 相对于旧契约的不兼容之处
    ///
    /// 可选依赖不受约束。
    pub fn compatibility_issues(&self, older: &Contract) -> Vec<CompatibilityIssue> {
        let new_requirements = self
            .requires
            .difference(&older.requires)
            .cloned()
            .map(CompatibilityIssue::NewRequirement);
        let removed = older
            .provides
            .difference(&self.provides)
            .cloned()
            .map(CompatibilityIssue::RemovedProvision);
        new_requirements.chain(removed).collect()
    }

    /// `self.requires ⊆ older.requires` 且 `older.provides ⊆ self.provides`
    pub fn is_backwards_compatible_with(&self, older: &Contract) -> bool {
        self.requires.is_subset(&older.requires) && older.provides.is_subset(&self.provides)
    }
}

impl fmt::Display for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |keys: &BTreeSet<Key>| {
            keys.iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };
        writeln!(f, "requires: [{}]", join(&self.requires))?;
        writeln!(f, "requires_optional: [{}]", join(&self.requires_optional))?;
        write!(f, "provides: [{}]", join(&self.provides))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Optional,
    Required,
    Provided,
}

impl Role {
    fn as_str(self) -> &'static str {
        match self {
            Role::Optional => "optional",
            Role::Required => "required",
            Role::Provided => "provided",
        }
    }
}

/// 契约构建器
///
/// 升级规则：可选 + 必需 → 必需；提供与（必需或可选）互斥，冲突时报错。
#[derive(Debug, Clone, Default)]
pub struct ContractBuilder {
    roles: IndexMap<Key, Role>,
}

impl ContractBuilder {
    pub fn require(
        &mut self,
        keys: impl IntoIterator<Item = Key>,
    ) -> Result<&mut Self, ContractError> {
        self.add_all(keys, Role::Required)
    }

    pub fn require_optional(
        &mut self,
        keys: impl IntoIterator<Item = Key>,
    ) -> Result<&mut Self, ContractError> {
        self.add_all(keys, Role::Optional)
    }

    pub fn provide(
        &mut self,
        keys: impl IntoIterator<Item = Key>,
    ) -> Result<&mut Self, ContractError> {
        self.add_all(keys, Role::Provided)
    }

    fn add_all(
        &mut self,
        keys: impl IntoIterator<Item = Key>,
        role: Role,
    ) -> Result<&mut Self, ContractError> {
        for key in keys {
            self.add(key, role)?;
        }
        Ok(self)
    }

    fn add(&mut self, key: Key, role: Role) -> Result<(), ContractError> {
        let Some(existing) = self.roles.get(&key).copied() else {
            self.roles.insert(key, role);
            return Ok(());
        };
        match (existing, role) {
            (Role::Provided, Role::Provided) => Ok(()),
            (Role::Provided, _) | (_, Role::Provided) => Err(ContractError::RoleConflict {
                key,
                existing: existing.as_str(),
                requested: role.as_str(),
            }),
            (Role::Optional, Role::Required) => {
                self.roles.insert(key, Role::Required);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// 按角色划分为三个集合
    pub fn build(&self) -> Contract {
        let mut contract = Contract::default();
        for (key, role) in &self.roles {
            let set = match role {
                Role::Required => &mut contract.requires,
                Role::Optional => &mut contract.requires_optional,
                Role::Provided => &mut contract.provides,
            };
            set.insert(key.clone());
        }
        contract
    }
}
