//! 环路检测
//!
//! 图的节点是提供者；提供者 P 由单元 U 生产，U 的每个已解析绑定指向的
//! 提供者都是 P 的后继。由于边建立在解析结果之上，跨作用域的环同样可见。

use super::entry::ProviderId;
use super::scope::ScopeTree;
use super::unit::Unit;
use crate::errors::WireError;
use crate::key::Key;
use std::collections::HashSet;
use tracing::debug;

/// 遍历栈上的一帧
struct Frame {
    id: ProviderId,
    successors: Vec<ProviderId>,
    /// 下一个待检查的后继
    next: usize,
}

/// 深度优先环路检测器
pub struct CycleDetector<'a> {
    tree: &'a ScopeTree,
    units: &'a [Unit],
    /// 已完全检查过的节点
    done: HashSet<ProviderId>,
    /// 当前路径上的节点
    on_stack: HashSet<ProviderId>,
    /// 路径栈，用于输出环
    path: Vec<ProviderId>,
}

impl<'a> CycleDetector<'a> {
    pub fn new(tree: &'a ScopeTree, units: &'a [Unit]) -> Self {
        Self {
            tree,
            units,
            done: HashSet::new(),
            on_stack: HashSet::new(),
            path: Vec::new(),
        }
    }

    /// 检查根作用域下的整棵树
    ///
    /// 先处理作用域自身的提供者，再深入子作用域（先序）。
    /// 返回检查过的提供者数量。
    pub fn run(mut self) -> Result<usize, WireError> {
        for scope in self.tree.pre_order(self.tree.root()) {
            let node = self.tree.node(scope)?;
            for provider in node.registry.providers() {
                if !self.done.contains(&provider.id) {
                    self.visit(provider.id)?;
                }
            }
        }
        debug!(providers = self.done.len(), "No circular dependencies");
        Ok(self.done.len())
    }

    /// 用显式栈做深度优先遍历，依赖链的长度不受线程栈大小限制
    fn visit(&mut self, start: ProviderId) -> Result<(), WireError> {
        let mut frames: Vec<Frame> = Vec::new();
        self.enter(start, &mut frames);

        while let Some(frame) = frames.last_mut() {
            let Some(&next) = frame.successors.get(frame.next) else {
                let id = frame.id;
                frames.pop();
                self.path.pop();
                self.on_stack.remove(&id);
                self.done.insert(id);
                continue;
            };
            frame.next += 1;

            if self.done.contains(&next) {
                continue;
            }
            if self.on_stack.contains(&next) {
                return Err(self.cycle_from(next));
            }
            self.enter(next, &mut frames);
        }
        Ok(())
    }

    /// 叶子直接标记完成，否则入栈
    fn enter(&mut self, id: ProviderId, frames: &mut Vec<Frame>) {
        let successors = self.successors(id);
        if successors.is_empty() {
            self.done.insert(id);
            return;
        }
        self.on_stack.insert(id);
        self.path.push(id);
        frames.push(Frame {
            id,
            successors,
            next: 0,
        });
    }

    /// 生产单元的已解析绑定所指向的提供者
    ///
    /// 没有生产单元（上下文派生）或生产单元没有绑定的提供者是叶子。
    fn successors(&self, id: ProviderId) -> Vec<ProviderId> {
        let unit = self
            .tree
            .provider(id)
            .and_then(|provider| provider.producing_unit())
            .and_then(|unit| self.units.get(unit.index()));
        let Some(unit) = unit else {
            return Vec::new();
        };

        unit.bindings()
            .iter()
            .filter_map(|binding| {
                self.tree
                    .node(binding.scope())
                    .ok()
                    .and_then(|node| node.registry.binding(*binding))
                    .and_then(|binding| binding.resolved_provider())
            })
            .collect()
    }

    /// 从重复节点处截断路径
    fn cycle_from(&self, repeated: ProviderId) -> WireError {
        let start = self
            .path
            .iter()
            .position(|id| *id == repeated)
            .unwrap_or(0);
        let chain: Vec<Key> = self.path[start..]
            .iter()
            .filter_map(|id| self.tree.provider(*id).map(|p| p.key().clone()))
            .collect();
        WireError::CircularDependency { chain }
    }
}
