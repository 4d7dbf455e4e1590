//! Cursor over the suffix tree.
//!
//! A cursor denotes a point on an edge or at a node as `(parent, child,
//! len)`: `len == 0` means "exactly at `parent`", otherwise the position is
//! `len` symbols down the edge from `parent` to `child` with
//! `0 < len < child.edge.len()`. Positions that reach the end of an edge are
//! normalized to "at the child".
//!
//! The engine owns exactly one cursor between inserts; insertion drives it
//! with `scan`/`retract`/`split_at`/`goto_suffix`.

use crate::node::{NodePool, NodeRef};
use crate::Symbol;

pub(crate) struct Cursor {
    pub(crate) parent: NodeRef,
    pub(crate) child: NodeRef,
    pub(crate) len: usize,
}

impl Cursor {
    pub(crate) fn at_root() -> Self {
        Cursor {
            parent: NodeRef::ROOT,
            child: NodeRef::NULL,
            len: 0,
        }
    }

    /// Position exactly at `n`.
    pub(crate) fn goto(&mut self, n: NodeRef) {
        self.parent = n;
        self.child = NodeRef::NULL;
        self.len = 0;
    }

    /// Move `distance` symbols shallower, ascending through parents as
    /// needed. The cursor must be at least that deep.
    pub(crate) fn retract<X: Symbol>(&mut self, pool: &NodePool<X>, mut distance: usize) {
        loop {
            if distance == 0 {
                return;
            }
            if self.len == 0 {
                // At a node: re-express as the end of its incoming edge.
                let n = self.parent;
                assert!(n != NodeRef::ROOT, "retract below the root");
                self.child = n;
                self.parent = pool[n].parent;
                self.len = pool[n].edge.len();
            }
            if self.len > distance {
                self.len -= distance;
                return;
            }
            distance -= self.len;
            self.len = 0;
        }
    }

    /// Try to extend one symbol along `array[index]`. On success the cursor
    /// advances (normalizing onto the child node when the edge is fully
    /// traversed) and `true` is returned; on a mismatch the position is
    /// untouched.
    pub(crate) fn scan<X: Symbol>(&mut self, pool: &NodePool<X>, array: &[X], index: usize) -> bool {
        let symbol = array[index];
        if self.len == 0 {
            let child = pool.find_child(self.parent, symbol);
            if child.is_null() {
                return false;
            }
            if pool[child].edge.len() == 1 {
                self.goto(child);
            } else {
                self.child = child;
                self.len = 1;
            }
            true
        } else {
            if pool[self.child].edge.symbol_at(self.len) != symbol {
                return false;
            }
            self.len += 1;
            if self.len == pool[self.child].edge.len() {
                self.goto(self.child);
            }
            true
        }
    }

    /// Ensure the cursor lies on a node, splitting the current edge if it is
    /// mid-edge, and return that node.
    pub(crate) fn split_at<X: Symbol>(&mut self, pool: &mut NodePool<X>) -> NodeRef {
        if self.len == 0 {
            return self.parent;
        }
        let mid = pool.split_edge(self.parent, self.child, self.len);
        self.goto(mid);
        mid
    }

    /// Position the cursor at the point representing `n`'s label with its
    /// first symbol removed: through `n`'s suffix link when present,
    /// otherwise through the parent's suffix plus a rescan of `n`'s edge.
    /// The result may be mid-edge.
    pub(crate) fn goto_suffix<X: Symbol>(&mut self, pool: &NodePool<X>, n: NodeRef) {
        if n == NodeRef::ROOT {
            self.goto(NodeRef::ROOT);
            return;
        }
        let link = pool[n].suffix_link;
        if !link.is_null() {
            self.goto(link);
            return;
        }
        let parent = pool[n].parent;
        let edge = pool[n].edge.clone();
        if parent == NodeRef::ROOT {
            self.goto(NodeRef::ROOT);
            if edge.len() > 1 {
                self.rescan(pool, edge.symbols(), 1);
            }
        } else {
            self.goto_suffix(pool, parent);
            self.rescan(pool, edge.symbols(), 0);
        }
    }

    /// Walk down along `symbols[offset..]`, which must already be a path
    /// from the current position. Whole edges are consumed by comparing
    /// first symbols only; intermediate comparisons are unnecessary because
    /// the path is known to exist.
    fn rescan<X: Symbol>(&mut self, pool: &NodePool<X>, symbols: &[X], offset: usize) {
        let mut pos = offset;
        while pos < symbols.len() {
            let remaining = symbols.len() - pos;
            if self.len == 0 {
                let child = pool.get_child(self.parent, symbols[pos]);
                let edge_len = pool[child].edge.len();
                if edge_len <= remaining {
                    self.goto(child);
                    pos += edge_len;
                } else {
                    self.child = child;
                    self.len = remaining;
                    pos += remaining;
                }
            } else {
                let capacity = pool[self.child].edge.len() - self.len;
                let step = capacity.min(remaining);
                self.len += step;
                pos += step;
                if self.len == pool[self.child].edge.len() {
                    self.goto(self.child);
                }
            }
        }
    }
}
