// SPDX-FileCopyrightText: 2024 Rot127 <unisono@quyllur.org>
// SPDX-License-Identifier: LGPL-3.0-only

use std::collections::HashMap;
use std::fmt::{Debug, Display};

use helper::set_map::SetMap;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction::Outgoing;

use crate::config::SinkMatcher;
use crate::error::{Result, SseError};
use crate::ir::{ObjectKind, ParamBinding, RetBinding, Statement, SymbolTable, VarId};

/// Identifier of an ICFG node as assigned by the front-end.
#[derive(Clone, Copy, Hash, Eq, Ord, PartialEq, PartialOrd)]
pub struct NodeId(pub u32);

impl Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Debug for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl From<u32> for NodeId {
    fn from(value: u32) -> NodeId {
        NodeId(value)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    /// Entry of a graph without a dedicated global node.
    Entry,
    /// The unique global entry. Holds the global initializers.
    Global,
    FunctionEntry,
    FunctionExit,
    Intra,
    /// A call. The callee is `None` for indirect calls which were not resolved.
    Call {
        callee: Option<String>,
        args: Vec<VarId>,
    },
    /// The node control returns to after the call at `call_site`.
    ReturnSite { call_site: NodeId },
}

#[derive(Clone, Debug)]
pub struct Node {
    id: NodeId,
    kind: NodeKind,
    /// Name of the function this node belongs to.
    function: Option<String>,
    stmts: Vec<Statement>,
}

impl Node {
    pub fn new(id: NodeId, kind: NodeKind, function: Option<String>) -> Node {
        Node {
            id,
            kind,
            function,
            stmts: Vec::new(),
        }
    }

    pub fn get_id(&self) -> NodeId {
        self.id
    }

    pub fn get_kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn get_function(&self) -> Option<&str> {
        self.function.as_deref()
    }

    pub fn get_statements(&self) -> &[Statement] {
        &self.stmts
    }

    pub fn get_callee(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Call { callee, .. } => callee.as_deref(),
            _ => None,
        }
    }

    /// The actual arguments if this is a call node.
    pub fn get_args(&self) -> &[VarId] {
        match &self.kind {
            NodeKind::Call { args, .. } => args,
            _ => &[],
        }
    }
}

/// Condition on an intra-procedural edge. The edge is taken
/// if `cond` evaluates to `value`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BranchCondition {
    pub cond: VarId,
    pub value: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EdgeKind {
    Intra {
        condition: Option<BranchCondition>,
    },
    Call {
        call_site: NodeId,
        bindings: Vec<ParamBinding>,
    },
    Return {
        call_site: NodeId,
        binding: Option<RetBinding>,
    },
}

/// Interprocedural control flow graph together with the
/// memory objects its statements refer to.
pub struct Icfg {
    graph: DiGraph<Node, EdgeKind>,
    index: HashMap<NodeId, NodeIndex>,
    symbols: SymbolTable,
    /// Callee name -> call nodes.
    call_sites: SetMap<String, NodeId>,
    global_entry: Option<NodeId>,
}

impl Icfg {
    pub fn new() -> Icfg {
        Icfg {
            graph: DiGraph::new(),
            index: HashMap::new(),
            symbols: SymbolTable::new(),
            call_sites: SetMap::new(),
            global_entry: None,
        }
    }

    pub fn add_node(&mut self, id: NodeId, kind: NodeKind) -> Result<NodeIndex> {
        self.insert_node(Node::new(id, kind, None))
    }

    pub fn add_function_node(
        &mut self,
        id: NodeId,
        kind: NodeKind,
        function: &str,
    ) -> Result<NodeIndex> {
        self.insert_node(Node::new(id, kind, Some(function.to_owned())))
    }

    fn insert_node(&mut self, node: Node) -> Result<NodeIndex> {
        let id = node.get_id();
        if self.index.contains_key(&id) {
            return Err(SseError::DuplicateNode(id));
        }
        match node.get_kind() {
            NodeKind::Global => {
                if let Some(g) = self.global_entry {
                    return Err(SseError::InvalidSource(format!(
                        "Global entry {} already exists. Can not add {}",
                        g, id
                    )));
                }
                self.global_entry = Some(id);
            }
            NodeKind::Call {
                callee: Some(name), ..
            } => self.call_sites.insert(name.clone(), id),
            _ => (),
        }
        let idx = self.graph.add_node(node);
        self.index.insert(id, idx);
        Ok(idx)
    }

    pub fn add_statement(&mut self, node: NodeId, stmt: Statement) -> Result<()> {
        let idx = self.node_index(node)?;
        self.graph[idx].stmts.push(stmt);
        Ok(())
    }

    pub fn add_object(&mut self, var: VarId, kind: ObjectKind) {
        self.symbols.add_object(var, kind);
    }

    fn add_edge(&mut self, from: NodeId, to: NodeId, kind: EdgeKind) -> Result<EdgeIndex> {
        let a = self.node_index(from)?;
        let b = self.node_index(to)?;
        Ok(self.graph.add_edge(a, b, kind))
    }

    pub fn add_intra_edge(&mut self, from: NodeId, to: NodeId) -> Result<EdgeIndex> {
        self.add_edge(from, to, EdgeKind::Intra { condition: None })
    }

    /// Adds an edge which is taken if `cond == value`.
    pub fn add_branch_edge(
        &mut self,
        from: NodeId,
        to: NodeId,
        cond: VarId,
        value: i64,
    ) -> Result<EdgeIndex> {
        self.add_edge(
            from,
            to,
            EdgeKind::Intra {
                condition: Some(BranchCondition { cond, value }),
            },
        )
    }

    pub fn add_call_edge(
        &mut self,
        call_site: NodeId,
        callee_entry: NodeId,
        bindings: Vec<ParamBinding>,
    ) -> Result<EdgeIndex> {
        self.add_edge(
            call_site,
            callee_entry,
            EdgeKind::Call {
                call_site,
                bindings,
            },
        )
    }

    pub fn add_return_edge(
        &mut self,
        callee_exit: NodeId,
        return_site: NodeId,
        call_site: NodeId,
        binding: Option<RetBinding>,
    ) -> Result<EdgeIndex> {
        self.add_edge(
            callee_exit,
            return_site,
            EdgeKind::Return { call_site, binding },
        )
    }

    pub fn get_symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn node_index(&self, id: NodeId) -> Result<NodeIndex> {
        self.index
            .get(&id)
            .copied()
            .ok_or(SseError::UnknownNode(id))
    }

    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.index.get(&id).map(|idx| &self.graph[*idx])
    }

    pub fn node_at(&self, idx: NodeIndex) -> &Node {
        &self.graph[idx]
    }

    pub fn get_edge(&self, edge: EdgeIndex) -> Option<&EdgeKind> {
        self.graph.edge_weight(edge)
    }

    /// Source and target node id of an edge.
    pub fn edge_endpoints(&self, edge: EdgeIndex) -> Option<(NodeId, NodeId)> {
        self.graph
            .edge_endpoints(edge)
            .map(|(a, b)| (self.graph[a].id, self.graph[b].id))
    }

    /// Outgoing edges of a node, ordered by target id and insertion order.
    pub fn out_edges(&self, idx: NodeIndex) -> Vec<(EdgeIndex, NodeIndex)> {
        let mut edges: Vec<(EdgeIndex, NodeIndex)> = self
            .graph
            .edges_directed(idx, Outgoing)
            .map(|e| (e.id(), e.target()))
            .collect();
        edges.sort_by_key(|(e, t)| (self.graph[*t].id, e.index()));
        edges
    }

    pub fn has_edge(&self, from: NodeId, to: NodeId) -> bool {
        match (self.index.get(&from), self.index.get(&to)) {
            (Some(a), Some(b)) => self.graph.contains_edge(*a, *b),
            _ => false,
        }
    }

    /// The node all explorations start from: the global node or,
    /// for graphs without one, the single entry node.
    pub fn get_global_entry(&self) -> Result<NodeId> {
        if let Some(g) = self.global_entry {
            return Ok(g);
        }
        let entries: Vec<NodeId> = self
            .graph
            .node_weights()
            .filter(|n| n.kind == NodeKind::Entry)
            .map(|n| n.id)
            .collect();
        match entries.as_slice() {
            [entry] => Ok(*entry),
            [] => Err(SseError::InvalidSource(
                "Graph has neither a global nor an entry node".to_owned(),
            )),
            _ => Err(SseError::InvalidSource(format!(
                "Graph has multiple entry nodes: {:?}",
                entries
            ))),
        }
    }

    /// All call nodes whose callee matches a sink name. Sorted by id.
    pub fn get_sinks(&self, matcher: &SinkMatcher) -> Vec<NodeId> {
        self.call_sites
            .collect_where(|name| matcher.is_match(name))
            .into_iter()
            .copied()
            .collect()
    }

    pub fn num_nodes(&self) -> usize {
        self.graph.node_count()
    }

    pub fn num_edges(&self) -> usize {
        self.graph.edge_count()
    }
}
