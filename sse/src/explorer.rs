// SPDX-FileCopyrightText: 2024 Rot127 <unisono@quyllur.org>
// SPDX-License-Identifier: LGPL-3.0-only

use std::collections::{BTreeSet, HashSet};
use std::fmt::Display;
use std::time::Duration;

use helper::timer::Timer;
use log::{debug, info, warn};
use petgraph::graph::{EdgeIndex, NodeIndex};

use crate::call_stack::CallStack;
use crate::config::Config;
use crate::error::Result;
use crate::icfg::{EdgeKind, Icfg, NodeId};

/// A path through the ICFG: the source node and the traversed edges.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IcfgPath {
    source: NodeId,
    edges: Vec<EdgeIndex>,
}

impl IcfgPath {
    pub fn new(source: NodeId, edges: Vec<EdgeIndex>) -> IcfgPath {
        IcfgPath { source, edges }
    }

    pub fn get_source(&self) -> NodeId {
        self.source
    }

    pub fn get_edges(&self) -> &[EdgeIndex] {
        &self.edges
    }

    /// The visited node ids, starting with the source.
    pub fn nodes(&self, icfg: &Icfg) -> Vec<NodeId> {
        let mut nodes = vec![self.source];
        nodes.extend(
            self.edges
                .iter()
                .filter_map(|e| icfg.edge_endpoints(*e).map(|(_, to)| to)),
        );
        nodes
    }

    /// `START: <id>-><id>->...->END`
    pub fn to_path_string(&self, icfg: &Icfg) -> String {
        let ids: Vec<String> = self
            .nodes(icfg)
            .iter()
            .map(|n| n.to_string())
            .collect();
        format!("START: {}->END", ids.join("->"))
    }
}

/// Consumer of the paths the explorer completes.
pub trait PathHandler {
    /// Processes a path ending at `sink`.
    /// Returns true if the path is feasible and was processed completely.
    fn on_path(&mut self, path: &IcfgPath, sink: NodeId) -> Result<bool>;

    /// Invoked before the exploration towards each sink.
    fn reset(&mut self) {}
}

/// Accepts every path. Used to enumerate paths without encoding them.
pub struct AcceptAll;

impl PathHandler for AcceptAll {
    fn on_path(&mut self, _path: &IcfgPath, _sink: NodeId) -> Result<bool> {
        Ok(true)
    }
}

/// Bounds which guarantee termination under recursion.
#[derive(Clone, Copy, Debug)]
pub struct ExploreLimits {
    pub max_call_depth: usize,
    pub max_paths: usize,
    pub timeout: Option<Duration>,
}

impl From<&Config> for ExploreLimits {
    fn from(config: &Config) -> ExploreLimits {
        ExploreLimits {
            max_call_depth: config.max_call_depth,
            max_paths: config.max_paths,
            timeout: config.timeout,
        }
    }
}

/// An edge under a calling context.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct VisitedKey {
    edge: EdgeIndex,
    stack: CallStack,
}

#[derive(Clone, Debug, Default)]
pub struct ExploreOutcome {
    /// Path strings of all feasible paths.
    pub paths: BTreeSet<String>,
    /// Number of paths handed to the handler.
    pub completed: usize,
    /// Number of call edges not followed because of the call depth bound.
    pub bounded_calls: usize,
    /// Set if the search stopped early (path bound or timeout).
    pub truncated: bool,
}

impl Display for ExploreOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} feasible of {} completed paths, {} bounded calls{}",
            self.paths.len(),
            self.completed,
            self.bounded_calls,
            if self.truncated { ", truncated" } else { "" }
        )
    }
}

/// Context sensitive depth first search from a source to sinks.
///
/// An edge is traversed at most once per call stack on the current path.
/// So loops are unrolled at most once per calling context.
pub struct PathExplorer<'g> {
    icfg: &'g Icfg,
    limits: ExploreLimits,
    visited: HashSet<VisitedKey>,
    path: Vec<EdgeIndex>,
    outcome: ExploreOutcome,
    timer: Timer,
}

impl<'g> PathExplorer<'g> {
    pub fn new(icfg: &'g Icfg, limits: ExploreLimits) -> PathExplorer<'g> {
        PathExplorer {
            icfg,
            limits,
            visited: HashSet::new(),
            path: Vec::new(),
            outcome: ExploreOutcome::default(),
            timer: Timer::new(limits.timeout),
        }
    }

    /// Explores all paths from `source` to each of the `sinks`.
    /// Every sink is explored independently.
    pub fn explore<H: PathHandler>(
        &mut self,
        source: NodeId,
        sinks: &[NodeId],
        handler: &mut H,
    ) -> Result<ExploreOutcome> {
        let src_idx = self.icfg.node_index(source)?;
        self.outcome = ExploreOutcome::default();
        self.timer.start();
        for sink in sinks.iter() {
            let sink_idx = self.icfg.node_index(*sink)?;
            self.visited.clear();
            self.path.clear();
            handler.reset();
            debug!("Explore paths {} -> {}", source, sink);
            self.dfs(src_idx, &CallStack::new(), source, (sink_idx, *sink), handler)?;
            if self.outcome.truncated {
                break;
            }
        }
        self.timer.reset();
        info!("Exploration from {}: {}", source, self.outcome);
        Ok(std::mem::take(&mut self.outcome))
    }

    fn limit_reached(&mut self) -> bool {
        if self.outcome.truncated {
            return true;
        }
        if self.timer.timed_out() {
            warn!(
                "Exploration timed out after {}. Results are incomplete.",
                self.timer.elapsed_str()
            );
            self.outcome.truncated = true;
        } else if self.outcome.completed >= self.limits.max_paths {
            warn!(
                "Reached the maximum of {} paths. Results are incomplete.",
                self.limits.max_paths
            );
            self.outcome.truncated = true;
        }
        self.outcome.truncated
    }

    fn dfs<H: PathHandler>(
        &mut self,
        node: NodeIndex,
        stack: &CallStack,
        source: NodeId,
        sink: (NodeIndex, NodeId),
        handler: &mut H,
    ) -> Result<()> {
        if node == sink.0 {
            self.outcome.completed += 1;
            let path = IcfgPath::new(source, self.path.clone());
            if handler.on_path(&path, sink.1)? {
                self.outcome.paths.insert(path.to_path_string(self.icfg));
            } else {
                debug!("Pruned {}", path.to_path_string(self.icfg));
            }
            return Ok(());
        }
        for (edge, target) in self.icfg.out_edges(node) {
            if self.limit_reached() {
                return Ok(());
            }
            let next = match self.icfg.get_edge(edge) {
                Some(EdgeKind::Intra { .. }) => stack.clone(),
                Some(EdgeKind::Call { call_site, .. }) => {
                    if stack.depth() >= self.limits.max_call_depth {
                        debug!("Call depth bound hit at {}", call_site);
                        self.outcome.bounded_calls += 1;
                        continue;
                    }
                    stack.push(*call_site)
                }
                Some(EdgeKind::Return { call_site, .. }) => {
                    if stack.top() != Some(*call_site) {
                        continue;
                    }
                    match stack.pop() {
                        Some(caller) => caller,
                        None => continue,
                    }
                }
                None => continue,
            };
            let key = VisitedKey {
                edge,
                stack: stack.clone(),
            };
            if !self.visited.insert(key.clone()) {
                continue;
            }
            self.path.push(edge);
            let res = self.dfs(target, &next, source, sink, handler);
            self.path.pop();
            self.visited.remove(&key);
            res?;
        }
        Ok(())
    }
}
