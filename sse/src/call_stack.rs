// SPDX-FileCopyrightText: 2024 Rot127 <unisono@quyllur.org>
// SPDX-License-Identifier: LGPL-3.0-only

use std::fmt::{Debug, Display};
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::icfg::NodeId;

struct Frame {
    site: NodeId,
    depth: usize,
    below: Option<Rc<Frame>>,
}

/// Persistent stack of call sites.
///
/// Pushing and popping return a new stack and leave `self` untouched.
/// So a stack stored as part of a key never changes afterwards.
#[derive(Clone, Default)]
pub struct CallStack {
    top: Option<Rc<Frame>>,
}

impl CallStack {
    pub fn new() -> CallStack {
        CallStack { top: None }
    }

    pub fn push(&self, site: NodeId) -> CallStack {
        CallStack {
            top: Some(Rc::new(Frame {
                site,
                depth: self.depth() + 1,
                below: self.top.clone(),
            })),
        }
    }

    /// The stack without its top. `None` if the stack is empty.
    pub fn pop(&self) -> Option<CallStack> {
        self.top.as_ref().map(|f| CallStack {
            top: f.below.clone(),
        })
    }

    pub fn top(&self) -> Option<NodeId> {
        self.top.as_ref().map(|f| f.site)
    }

    pub fn depth(&self) -> usize {
        self.top.as_ref().map_or(0, |f| f.depth)
    }

    pub fn is_empty(&self) -> bool {
        self.top.is_none()
    }

    /// Call sites from top to bottom.
    pub fn iter(&self) -> CallStackIter<'_> {
        CallStackIter {
            cur: self.top.as_deref(),
        }
    }

    /// Call sites from bottom (outermost call) to top.
    pub fn to_vec(&self) -> Vec<NodeId> {
        let mut sites: Vec<NodeId> = self.iter().collect();
        sites.reverse();
        sites
    }
}

pub struct CallStackIter<'a> {
    cur: Option<&'a Frame>,
}

impl<'a> Iterator for CallStackIter<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let f = self.cur?;
        self.cur = f.below.as_deref();
        Some(f.site)
    }
}

impl PartialEq for CallStack {
    fn eq(&self, other: &Self) -> bool {
        match (&self.top, &other.top) {
            (None, None) => true,
            (Some(a), Some(b)) if Rc::ptr_eq(a, b) => true,
            (Some(a), Some(b)) => a.depth == b.depth && self.iter().eq(other.iter()),
            _ => false,
        }
    }
}

impl Eq for CallStack {}

impl Hash for CallStack {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.depth().hash(state);
        for site in self.iter() {
            site.hash(state);
        }
    }
}

impl PartialOrd for CallStack {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CallStack {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.to_vec().cmp(&other.to_vec())
    }
}

impl Display for CallStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, site) in self.to_vec().iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", site)?;
        }
        write!(f, "]")
    }
}

impl Debug for CallStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CallStack{}", self)
    }
}
