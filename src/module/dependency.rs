//! 模块依赖管理
//!
//! 本模块提供基于下标的依赖关系图：顶点是稠密下标，边是邻接表。
//!
//! # 主要组件
//!
//! - [`DependencyGraph`] - 依赖关系图，负责缺失依赖检查、循环检测和拓扑排序
//!
//! # 顺序约定
//!
//! 顶点下标就是模块的声明顺序。拓扑排序使用 Kahn 算法，
//! 多个模块同时就绪时，先声明的先输出；循环检测按声明顺序做深度优先遍历。
//! 因此同一组描述总是得到同样的激活顺序和同样的循环报告。
//!
//! # 示例
//!
//! ```rust
//! use chips_moduli::module::dependency::DependencyGraph;
//!
//! let mut graph = DependencyGraph::new();
//! let a = graph.add_node("a");
//! let b = graph.add_node("b");
//! let c = graph.add_node("c");
//! graph.add_edge(b, a);
//! graph.add_edge(c, a);
//! graph.add_edge(c, b);
//!
//! assert_eq!(graph.activation_order().unwrap(), vec!["a", "b", "c"]);
//! assert_eq!(graph.deactivation_order().unwrap(), vec!["c", "b", "a"]);
//! ```

use std::collections::{BTreeSet, HashMap};

use crate::module::descriptor::ModuleDescriptor;
use crate::utils::{CoreError, Result};

/// 深度优先遍历时的顶点标记
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Visiting,
    Done,
}

/// 模块依赖关系图
///
/// 边从模块指向它的依赖。
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// 下标 -> 模块 ID
    nodes: Vec<String>,
    /// 模块 ID -> 下标
    index: HashMap<String, usize>,
    /// 正向边：模块 -> 它依赖的模块（已去重）
    edges: Vec<Vec<usize>>,
    /// 反向边：模块 -> 依赖它的模块
    reverse: Vec<Vec<usize>>,
}

impl DependencyGraph {
    /// 创建一个空的依赖图
    ///
    /// ```rust
    /// use chips_moduli::module::dependency::DependencyGraph;
    ///
    /// let graph = DependencyGraph::new();
    /// assert!(graph.is_empty());
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// 从 (模块 ID, 依赖列表) 序列构建并校验依赖图
    ///
    /// 先加入全部顶点，再逐条解析依赖，因此描述可以按任意顺序给出。
    ///
    /// # Errors
    ///
    /// - 依赖的 ID 不在集合中时返回 `MissingDependency`
    /// - 图中存在环时返回 `CyclicDependency`，`cycle` 首尾为同一个模块
    ///
    /// ```rust
    /// use chips_moduli::module::dependency::DependencyGraph;
    /// use chips_moduli::CoreError;
    ///
    /// let deps_a = vec!["b".to_string()];
    /// let deps_b = vec!["a".to_string()];
    /// let err = DependencyGraph::build([("a", deps_a.as_slice()), ("b", deps_b.as_slice())])
    ///     .unwrap_err();
    ///
    /// match err {
    ///     CoreError::CyclicDependency { cycle } => assert_eq!(cycle, vec!["a", "b", "a"]),
    ///     other => panic!("unexpected error: {other}"),
    /// }
    /// ```
    pub fn build<'a, I>(modules: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a [String])>,
    {
        let modules: Vec<(&str, &[String])> = modules.into_iter().collect();

        let mut graph = Self::new();
        for (id, _) in &modules {
            graph.add_node(id);
        }

        for (id, dependencies) in &modules {
            let from = graph.index[*id];
            for dependency in dependencies.iter() {
                let to = graph.index_of(dependency).ok_or_else(|| {
                    CoreError::MissingDependency {
                        module: id.to_string(),
                        dependency: dependency.clone(),
                    }
                })?;
                graph.add_edge(from, to);
            }
        }

        if let Some(cycle) = graph.find_cycle() {
            return Err(CoreError::CyclicDependency { cycle });
        }

        Ok(graph)
    }

    /// 从模块描述构建依赖图
    pub fn from_descriptors(descriptors: &[ModuleDescriptor]) -> Result<Self> {
        Self::build(
            descriptors
                .iter()
                .map(|d| (d.id.as_str(), d.dependencies.as_slice())),
        )
    }

    /// 添加顶点，已存在时返回原下标
    pub fn add_node(&mut self, module_id: &str) -> usize {
        if let Some(&i) = self.index.get(module_id) {
            return i;
        }
        let i = self.nodes.len();
        self.nodes.push(module_id.to_string());
        self.index.insert(module_id.to_string(), i);
        self.edges.push(Vec::new());
        self.reverse.push(Vec::new());
        i
    }

    /// 添加边：`from` 依赖 `to`，重复的边被忽略
    ///
    /// # Panics
    ///
    /// 下标越界时 panic，下标只能来自 [`add_node`](Self::add_node)
    pub fn add_edge(&mut self, from: usize, to: usize) {
        if !self.edges[from].contains(&to) {
            self.edges[from].push(to);
            self.reverse[to].push(from);
        }
    }

    /// 模块的下标
    pub fn index_of(&self, module_id: &str) -> Option<usize> {
        self.index.get(module_id).copied()
    }

    /// 是否包含模块
    pub fn contains(&self, module_id: &str) -> bool {
        self.index.contains_key(module_id)
    }

    /// 模块的直接依赖
    pub fn dependencies(&self, module_id: &str) -> Vec<&str> {
        self.neighbours(module_id, &self.edges)
    }

    /// 直接依赖该模块的模块
    pub fn dependents(&self, module_id: &str) -> Vec<&str> {
        self.neighbours(module_id, &self.reverse)
    }

    fn neighbours<'g>(&'g self, module_id: &str, adjacency: &'g [Vec<usize>]) -> Vec<&'g str> {
        self.index_of(module_id)
            .map(|i| adjacency[i].iter().map(|&j| self.nodes[j].as_str()).collect())
            .unwrap_or_default()
    }

    /// 顶点数量
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 边数量
    pub fn edge_count(&self) -> usize {
        self.edges.iter().map(Vec::len).sum()
    }

    /// 检测是否存在循环依赖
    pub fn has_cycle(&self) -> bool {
        self.find_cycle().is_some()
    }

    /// 查找一个循环依赖
    ///
    /// 按声明顺序从每个未访问顶点出发做迭代式深度优先遍历，
    /// 返回第一个遇到的环，首尾为同一个模块，例如 `[a, b, a]`。
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut marks = vec![Mark::Unvisited; self.nodes.len()];
        // (顶点, 下一条待访问边的位置)，同时也是当前路径
        let mut stack: Vec<(usize, usize)> = Vec::new();

        for root in 0..self.nodes.len() {
            if marks[root] != Mark::Unvisited {
                continue;
            }
            marks[root] = Mark::Visiting;
            stack.push((root, 0));

            while let Some(frame) = stack.last_mut() {
                let node = frame.0;
                match self.edges[node].get(frame.1) {
                    Some(&next) => {
                        frame.1 += 1;
                        match marks[next] {
                            Mark::Unvisited => {
                                marks[next] = Mark::Visiting;
                                stack.push((next, 0));
                            }
                            Mark::Visiting => {
                                let start = stack
                                    .iter()
                                    .position(|&(n, _)| n == next)
                                    .unwrap_or(0);
                                let mut cycle: Vec<String> = stack[start..]
                                    .iter()
                                    .map(|&(n, _)| self.nodes[n].clone())
                                    .collect();
                                cycle.push(self.nodes[next].clone());
                                return Some(cycle);
                            }
                            Mark::Done => {}
                        }
                    }
                    None => {
                        marks[node] = Mark::Done;
                        stack.pop();
                    }
                }
            }
        }

        None
    }

    /// 计算激活顺序（依赖在前）
    ///
    /// Kahn 算法，就绪集合按声明下标排序。
    ///
    /// # Errors
    ///
    /// 存在环时返回 `CyclicDependency`
    pub fn activation_order(&self) -> Result<Vec<String>> {
        let mut pending: Vec<usize> = self.edges.iter().map(Vec::len).collect();
        let mut ready: BTreeSet<usize> = pending
            .iter()
            .enumerate()
            .filter(|(_, &count)| count == 0)
            .map(|(i, _)| i)
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(node) = ready.pop_first() {
            order.push(self.nodes[node].clone());
            for &dependent in &self.reverse[node] {
                pending[dependent] -= 1;
                if pending[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if order.len() != self.nodes.len() {
            // 兜底：build 已经拒绝过环，这里只会在手工构图时触发
            let cycle = self.find_cycle().unwrap_or_else(|| {
                pending
                    .iter()
                    .enumerate()
                    .filter(|(_, &count)| count > 0)
                    .map(|(i, _)| self.nodes[i].clone())
                    .collect()
            });
            return Err(CoreError::CyclicDependency { cycle });
        }

        Ok(order)
    }

    /// 计算停用顺序，恰为激活顺序的逆序
    pub fn deactivation_order(&self) -> Result<Vec<String>> {
        let mut order = self.activation_order()?;
        order.reverse();
        Ok(order)
    }

    /// 模块的全部传递依赖（按激活顺序）
    pub fn transitive_dependencies(&self, module_id: &str) -> Vec<String> {
        let Some(start) = self.index_of(module_id) else {
            return Vec::new();
        };

        let mut seen = vec![false; self.nodes.len()];
        let mut stack = self.edges[start].clone();
        while let Some(node) = stack.pop() {
            if !seen[node] {
                seen[node] = true;
                stack.extend(self.edges[node].iter().copied());
            }
        }

        match self.activation_order() {
            Ok(order) => order
                .into_iter()
                .filter(|id| self.index.get(id).map(|&i| seen[i]).unwrap_or(false))
                .collect(),
            Err(_) => (0..self.nodes.len())
                .filter(|&i| seen[i])
                .map(|i| self.nodes[i].clone())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_of(layout: &[(&str, &[&str])]) -> Result<DependencyGraph> {
        let owned: Vec<(String, Vec<String>)> = layout
            .iter()
            .map(|(id, deps)| (id.to_string(), deps.iter().map(|d| d.to_string()).collect()))
            .collect();
        DependencyGraph::build(owned.iter().map(|(id, deps)| (id.as_str(), deps.as_slice())))
    }

    fn position(order: &[String], id: &str) -> usize {
        order.iter().position(|x| x == id).unwrap()
    }

    #[test]
    fn test_empty_graph() {
        let graph = DependencyGraph::new();
        assert!(graph.is_empty());
        assert!(!graph.has_cycle());
        assert!(graph.activation_order().unwrap().is_empty());
    }

    #[test]
    fn test_add_node_is_idempotent() {
        let mut graph = DependencyGraph::new();
        let a = graph.add_node("a");
        assert_eq!(graph.add_node("a"), a);
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_add_edge_dedup() {
        let mut graph = DependencyGraph::new();
        let a = graph.add_node("a");
        let b = graph.add_node("b");
        graph.add_edge(a, b);
        graph.add_edge(a, b);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.dependencies("a"), vec!["b"]);
        assert_eq!(graph.dependents("b"), vec!["a"]);
    }

    #[test]
    fn test_abc_example() {
        let graph = graph_of(&[("A", &[]), ("B", &["A"]), ("C", &["A", "B"])]).unwrap();
        assert_eq!(graph.activation_order().unwrap(), vec!["A", "B", "C"]);
        assert_eq!(graph.deactivation_order().unwrap(), vec!["C", "B", "A"]);
    }

    #[test]
    fn test_declaration_order_out_of_dependency_order() {
        // 依赖声明在后面也能解析
        let graph = graph_of(&[("app", &["db", "cache"]), ("cache", &[]), ("db", &[])]).unwrap();
        let order = graph.activation_order().unwrap();
        assert_eq!(order, vec!["cache", "db", "app"]);
    }

    #[test]
    fn test_tie_break_by_declaration_order() {
        let graph = graph_of(&[("z", &[]), ("m", &[]), ("a", &[])]).unwrap();
        assert_eq!(graph.activation_order().unwrap(), vec!["z", "m", "a"]);
    }

    #[test]
    fn test_order_respects_every_edge() {
        let layout: &[(&str, &[&str])] = &[
            ("web", &["auth", "db", "cache"]),
            ("auth", &["db", "config"]),
            ("cache", &["config"]),
            ("db", &["config"]),
            ("config", &[]),
            ("metrics", &[]),
            ("jobs", &["db", "metrics"]),
        ];
        let graph = graph_of(layout).unwrap();
        let order = graph.activation_order().unwrap();
        assert_eq!(order.len(), layout.len());
        for (id, deps) in layout {
            for dep in deps.iter() {
                assert!(position(&order, dep) < position(&order, id), "{dep} before {id}");
            }
        }
    }

    #[test]
    fn test_order_is_deterministic() {
        let layout: &[(&str, &[&str])] = &[("c", &["a"]), ("b", &[]), ("a", &[]), ("d", &["b", "c"])];
        let first = graph_of(layout).unwrap().activation_order().unwrap();
        for _ in 0..10 {
            assert_eq!(graph_of(layout).unwrap().activation_order().unwrap(), first);
        }
    }

    #[test]
    fn test_missing_dependency() {
        let err = graph_of(&[("a", &[]), ("b", &["a", "ghost"])]).unwrap_err();
        match err {
            CoreError::MissingDependency { module, dependency } => {
                assert_eq!(module, "b");
                assert_eq!(dependency, "ghost");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_two_node_cycle() {
        let err = graph_of(&[("A", &["B"]), ("B", &["A"])]).unwrap_err();
        match err {
            CoreError::CyclicDependency { cycle } => assert_eq!(cycle, vec!["A", "B", "A"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_self_loop() {
        let err = graph_of(&[("solo", &["solo"])]).unwrap_err();
        match err {
            CoreError::CyclicDependency { cycle } => assert_eq!(cycle, vec!["solo", "solo"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_cycle_not_reachable_from_first_node() {
        let err = graph_of(&[("ok", &[]), ("x", &["y"]), ("y", &["z"]), ("z", &["x"])]).unwrap_err();
        match err {
            CoreError::CyclicDependency { cycle } => {
                assert_eq!(cycle, vec!["x", "y", "z", "x"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_activation_order_detects_manual_cycle() {
        let mut graph = DependencyGraph::new();
        let a = graph.add_node("a");
        let b = graph.add_node("b");
        graph.add_edge(a, b);
        graph.add_edge(b, a);
        assert!(graph.has_cycle());
        assert!(matches!(
            graph.activation_order(),
            Err(CoreError::CyclicDependency { .. })
        ));
    }

    #[test]
    fn test_from_descriptors() {
        let descriptors = vec![
            ModuleDescriptor::new("b").depends_on("a"),
            ModuleDescriptor::new("a"),
        ];
        let graph = DependencyGraph::from_descriptors(&descriptors).unwrap();
        assert!(graph.contains("a"));
        assert_eq!(graph.activation_order().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_transitive_dependencies() {
        let graph = graph_of(&[
            ("config", &[]),
            ("db", &["config"]),
            ("app", &["db"]),
            ("other", &[]),
        ])
        .unwrap();
        assert_eq!(graph.transitive_dependencies("app"), vec!["config", "db"]);
        assert!(graph.transitive_dependencies("config").is_empty());
        assert!(graph.transitive_dependencies("ghost").is_empty());
    }

    #[test]
    fn test_large_chain() {
        let ids: Vec<String> = (0..500).map(|i| format!("m{i}")).collect();
        let deps: Vec<Vec<String>> = (0..500)
            .map(|i| if i == 0 { vec![] } else { vec![ids[i - 1].clone()] })
            .collect();
        let graph =
            DependencyGraph::build(ids.iter().zip(&deps).map(|(id, d)| (id.as_str(), d.as_slice())))
                .unwrap();
        let order = graph.activation_order().unwrap();
        assert_eq!(order.first().map(String::as_str), Some("m0"));
        assert_eq!(order.last().map(String::as_str), Some("m499"));
    }
}
