//! 作用域树
//!
//! 作用域（容器）构成一棵树：每个节点有自己的注册表、外部注入的实例，
//! 以及解析过程中计算出的已解析服务和可见服务。

use super::entry::{Provider, ProviderId};
use super::next_index;
use super::registry::ScopeRegistry;
use crate::errors::WireError;
use crate::key::Key;
use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// 作用域ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ScopeId(pub(crate) u32);

impl ScopeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope#{}", self.0)
    }
}

/// 作用域节点
#[derive(Debug, Clone)]
pub struct ScopeNode {
    pub(crate) id: ScopeId,
    pub(crate) name: Arc<str>,
    pub(crate) parent: Option<ScopeId>,
    pub(crate) children: Vec<ScopeId>,
    pub(crate) registry: ScopeRegistry,
    /// 外部注入的实例，优先于其他命名空间服务
    pub(crate) overrides: IndexMap<Key, ProviderId>,
    /// 本地提供 ∪ 子作用域导出（自底向上计算）
    pub(crate) resolved: IndexMap<Key, ProviderId>,
    /// 实际向父作用域导出的服务（自底向上计算）
    pub(crate) exported: IndexMap<Key, ProviderId>,
    /// 从父作用域继承、去掉自身导出后的服务，再叠加注入实例（自顶向下计算）
    pub(crate) visible: IndexMap<Key, ProviderId>,
}

impl ScopeNode {
    fn new(id: ScopeId, name: Arc<str>, export_all: bool) -> Self {
        Self {
            id,
            registry: ScopeRegistry::new(id, name.clone(), export_all),
            name,
            parent: None,
            children: Vec::new(),
            overrides: IndexMap::new(),
            resolved: IndexMap::new(),
            exported: IndexMap::new(),
            visible: IndexMap::new(),
        }
    }

    pub fn id(&self) -> ScopeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<ScopeId> {
        self.parent
    }

    pub fn children(&self) -> &[ScopeId] {
        &self.children
    }

    pub fn registry(&self) -> &ScopeRegistry {
        &self.registry
    }

    pub fn overrides(&self) -> &IndexMap<Key, ProviderId> {
        &self.overrides
    }

    pub fn resolved_services(&self) -> &IndexMap<Key, ProviderId> {
        &self.resolved
    }

    pub fn exported_services(&self) -> &IndexMap<Key, ProviderId> {
        &self.exported
    }

    pub fn visible_services(&self) -> &IndexMap<Key, ProviderId> {
        &self.visible
    }

    /// 命名空间层级的查找：注入实例 > 本作用域已解析服务 > 继承的可见服务
    pub fn lookup(&self, key: &Key) -> Option<ProviderId> {
        self.overrides
            .get(key)
            .or_else(|| self.resolved.get(key))
            .or_else(|| self.visible.get(key))
            .copied()
    }

    /// 交给子作用域的视图
    pub(crate) fn view_for_children(&self) -> IndexMap<Key, ProviderId> {
        let mut view = self.visible.clone();
        for (key, provider) in self.resolved.iter().chain(self.overrides.iter()) {
            view.insert(key.clone(), *provider);
        }
        view
    }
}

/// 作用域树
#[derive(Debug, Clone)]
pub struct ScopeTree {
    nodes: Vec<ScopeNode>,
    root: ScopeId,
}

impl ScopeTree {
    pub fn new(root_name: impl Into<Arc<str>>, export_all: bool) -> Self {
        let root = ScopeId(0);
        Self {
            nodes: vec![ScopeNode::new(root, root_name.into(), export_all)],
            root,
        }
    }

    pub fn root(&self) -> ScopeId {
        self.root
    }

    pub fn root_node(&self) -> &ScopeNode {
        &self.nodes[self.root.index()]
    }

    /// 新建一个尚未挂接的作用域
    pub fn add(&mut self, name: impl Into<Arc<str>>, export_all: bool) -> Result<ScopeId, WireError> {
        let id = ScopeId(next_index(self.nodes.len(), "scopes")?);
        self.nodes.push(ScopeNode::new(id, name.into(), export_all));
        Ok(id)
    }

    /// 挂接父子作用域
    pub fn attach_child(&mut self, parent: ScopeId, child: ScopeId) -> Result<(), WireError> {
        let parent_name = self.node(parent)?.name.to_string();
        let child_node = self.node(child)?;
        let link_error = |reason: &str| WireError::InvalidScopeLink {
            parent: parent_name.clone(),
            child: child_node.name.to_string(),
            reason: reason.to_string(),
        };

        if child == self.root {
            return Err(link_error("the root scope cannot have a parent"));
        }
        if child_node.parent.is_some() {
            return Err(link_error("scope is already attached"));
        }
        if self.is_within(parent, child) {
            return Err(link_error("scope would become its own ancestor"));
        }

        self.nodes[child.index()].parent = Some(parent);
        self.nodes[parent.index()].children.push(child);
        Ok(())
    }

    pub fn node(&self, id: ScopeId) -> Result<&ScopeNode, WireError> {
        self.nodes.get(id.index()).ok_or(WireError::UnknownScope(id))
    }

    pub fn node_mut(&mut self, id: ScopeId) -> Result<&mut ScopeNode, WireError> {
        self.nodes
            .get_mut(id.index())
            .ok_or(WireError::UnknownScope(id))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ScopeNode> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// `scope` 是否是 `ancestor` 本身或其后代
    pub fn is_within(&self, scope: ScopeId, ancestor: ScopeId) -> bool {
        let mut current = Some(scope);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.nodes.get(id.index()).and_then(|n| n.parent);
        }
        false
    }

    /// 先序遍历（父先于子）
    pub fn pre_order(&self, from: ScopeId) -> Vec<ScopeId> {
        let mut order = Vec::new();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            order.push(id);
            if let Some(node) = self.nodes.get(id.index()) {
                stack.extend(node.children.iter().rev());
            }
        }
        order
    }

    /// 后序遍历（子先于父）
    pub fn post_order(&self, from: ScopeId) -> Vec<ScopeId> {
        // 父先于子、子逆序收集，反转后即为后序
        let mut order = Vec::new();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            order.push(id);
            if let Some(node) = self.nodes.get(id.index()) {
                stack.extend(node.children.iter());
            }
        }
        order.reverse();
        order
    }

    /// 从根开始的路径，例如 `app/web/admin`
    pub fn path(&self, id: ScopeId) -> String {
        let mut names = Vec::new();
        let mut current = Some(id);
        while let Some(scope) = current {
            match self.nodes.get(scope.index()) {
                Some(node) => {
                    names.push(node.name.to_string());
                    current = node.parent;
                }
                None => break,
            }
        }
        names.reverse();
        names.join("/")
    }

    pub fn find_by_path(&self, path: &str) -> Option<ScopeId> {
        let path = path.trim_matches('/');
        self.pre_order(self.root)
            .into_iter()
            .find(|id| self.path(*id) == path)
    }

    /// 跨作用域查找提供者记录
    pub fn provider(&self, id: ProviderId) -> Option<&Provider> {
        self.nodes
            .get(id.scope.index())
            .and_then(|node| node.registry.provider(id))
    }

    /// 未挂接到根作用域下的游离作用域
    pub fn detached(&self) -> Vec<ScopeId> {
        self.nodes
            .iter()
            .filter(|node| !self.is_within(node.id, self.root))
            .map(|node| node.id)
            .collect()
    }
}
