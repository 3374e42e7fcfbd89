//! 绑定层级与优先级策略
//!
//! 同一个消费站点可能有多个层级的提供者可以满足：直接挂在单元上的、
//! 挂在所属组件上的、从上下文派生的、以及作用域命名空间中的。
//! 按优先级顺序逐层查找，第一个非空层级胜出。

use crate::errors::ParseLevelError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 绑定层级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingLevel {
    /// 直接挂在消费单元上的提供者
    Unit,
    /// 挂在消费单元所属组件上的提供者
    Bean,
    /// 从环境上下文派生的值
    Context,
    /// 作用域命名空间（本地、子作用域导出、继承的可见服务）
    Namespace,
}

impl BindingLevel {
    pub const ALL: [BindingLevel; 4] = [
        BindingLevel::Unit,
        BindingLevel::Bean,
        BindingLevel::Context,
        BindingLevel::Namespace,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BindingLevel::Unit => "unit",
            BindingLevel::Bean => "bean",
            BindingLevel::Context => "context",
            BindingLevel::Namespace => "namespace",
        }
    }
}

impl fmt::Display for BindingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BindingLevel {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unit" | "operation" => Ok(BindingLevel::Unit),
            "bean" => Ok(BindingLevel::Bean),
            "context" => Ok(BindingLevel::Context),
            "namespace" => Ok(BindingLevel::Namespace),
            other => Err(ParseLevelError(other.to_string())),
        }
    }
}

/// 优先级策略：有序、无重复的层级列表
///
/// 默认顺序为 unit > bean > context > namespace。这只是约定俗成的默认策略，
/// 每个绑定站点都可以单独指定。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<BindingLevel>", into = "Vec<BindingLevel>")]
pub struct Precedence(Vec<BindingLevel>);

impl Precedence {
    /// 按给定顺序构建，重复的层级只保留第一次出现
    pub fn new(levels: impl IntoIterator<Item = BindingLevel>) -> Self {
        let mut ordered = Vec::with_capacity(BindingLevel::ALL.len());
        for level in levels {
            if !ordered.contains(&level) {
                ordered.push(level);
            }
        }
        Self(ordered)
    }

    /// 只在作用域命名空间中查找
    pub fn namespace_only() -> Self {
        Self(vec![BindingLevel::Namespace])
    }

    pub fn levels(&self) -> &[BindingLevel] {
        &self.0
    }

    pub fn contains(&self, level: BindingLevel) -> bool {
        self.0.contains(&level)
    }
}

impl Default for Precedence {
    fn default() -> Self {
        Self(BindingLevel::ALL.to_vec())
    }
}

impl From<Vec<BindingLevel>> for Precedence {
    fn from(levels: Vec<BindingLevel>) -> Self {
        Self::new(levels)
    }
}

impl From<Precedence> for Vec<BindingLevel> {
    fn from(precedence: Precedence) -> Self {
        precedence.0
    }
}

impl FromStr for Precedence {
    type Err = ParseLevelError;

    /// 逗号分隔，例如 `bean,namespace`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let levels = s
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(BindingLevel::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(levels))
    }
}

impl fmt::Display for Precedence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<&str> = self.0.iter().map(|l| l.as_str()).collect();
        f.write_str(&parts.join(" > "))
    }
}
