// SPDX-FileCopyrightText: 2024 Rot127 <unisono@quyllur.org>
// SPDX-License-Identifier: LGPL-3.0-only

use thiserror::Error;

use crate::icfg::NodeId;
use crate::ir::VarId;

/// Faults which abort an exploration.
///
/// Infeasible paths and violated assertions are analysis results
/// and never reported through this type.
#[derive(Debug, Error)]
pub enum SseError {
    #[error("Node {0} is not part of the graph")]
    UnknownNode(NodeId),

    #[error("Edge {0} is not part of the graph")]
    UnknownEdge(usize),

    #[error("Node {0} was already added to the graph")]
    DuplicateNode(NodeId),

    #[error("Invalid exploration source: {0}")]
    InvalidSource(String),

    #[error("Return edge {from} -> {to} belongs to call site {expected}, but the call stack top is {found}")]
    CallStackMismatch {
        from: NodeId,
        to: NodeId,
        expected: NodeId,
        found: String,
    },

    #[error("Phi of ValVar{res} at node {node} has no operand for predecessor {pred}")]
    PhiWithoutPredecessor { node: NodeId, res: VarId, pred: String },

    #[error("Phi of ValVar{res} at node {node} has {count} operands for predecessor {pred}")]
    AmbiguousPhi {
        node: NodeId,
        res: VarId,
        pred: NodeId,
        count: usize,
    },

    #[error("Binding '{stmt}' at node {node} is not on the node entered by the matching call or return edge")]
    MisplacedBinding { node: NodeId, stmt: String },

    #[error("Dereferenced value {0} is not a virtual address")]
    NotAnAddress(i64),

    #[error("Variable {0} is not a memory object")]
    NotAnObject(VarId),

    #[error("Field offset {offset} of address {base:#x} exceeds the object stride {stride}")]
    FieldOutOfBounds { base: u32, offset: i64, stride: u32 },

    #[error("Out of virtual addresses. Can not assign more than {0} objects")]
    AddressSpaceExhausted(u32),

    #[error("Sink node {0} passes no argument to the assertion")]
    MissingSinkArgument(NodeId),

    #[error("Could not determine a concrete value for {0}")]
    Undetermined(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid sink pattern: {0}")]
    Regex(#[from] regex::Error),

    #[error("Logger setup failed: {0}")]
    Logger(#[from] flexi_logger::FlexiLoggerError),
}

pub type Result<T> = std::result::Result<T, SseError>;
