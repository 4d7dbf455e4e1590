//! Structural invariant checks and tree dumps for troubleshooting.

use std::fmt::Write as _;

use crate::engine::HeavyHitters;
use crate::node::NodeRef;
use crate::Symbol;

impl<X: Symbol> HeavyHitters<X> {
    /// Verify every structural invariant, panicking with a description of
    /// the first violation. Intended for tests and debugging; cost is
    /// O(nodes * depth).
    ///
    /// Checked:
    /// - `refcount == 2 * suffix_inrefs + 2 * has_count + children` for
    ///   every non-root node;
    /// - every suffix link points at the node labeled with the source's
    ///   label minus its first symbol;
    /// - count cells and nodes reference each other bijectively, at the
    ///   node's depth.
    pub fn check_invariants(&self) {
        let nodes = self.live_node_list();

        // Incoming suffix links per node.
        let mut inrefs: std::collections::HashMap<NodeRef, u32> = std::collections::HashMap::new();
        for &n in &nodes {
            let link = self.pool[n].suffix_link;
            if !link.is_null() && link != NodeRef::ROOT {
                *inrefs.entry(link).or_insert(0) += 1;
            }
        }

        for &n in &nodes {
            let node = &self.pool[n];
            let mut children = 0;
            let mut c = node.first_child;
            while !c.is_null() {
                assert_eq!(
                    self.pool[c].parent,
                    n,
                    "child {:?} of {:?} disagrees about its parent",
                    c,
                    n
                );
                children += 1;
                c = self.pool[c].next_sibling;
            }
            let has_count = u32::from(!node.data.is_null());
            let expected = 2 * inrefs.get(&n).copied().unwrap_or(0) + 2 * has_count + children;
            assert_eq!(
                node.refcount, expected,
                "refcount of {:?} is {}, expected {} (inrefs={}, count={}, children={})",
                n,
                node.refcount,
                expected,
                inrefs.get(&n).copied().unwrap_or(0),
                has_count,
                children
            );

            if !node.suffix_link.is_null() {
                let label = self.pool.label_of(n);
                let suffix_label = self.pool.label_of(node.suffix_link);
                assert_eq!(
                    suffix_label,
                    label[1..].to_vec(),
                    "suffix link of {:?} ({:?}) does not drop exactly the first symbol",
                    n,
                    label
                );
            }

            if !node.data.is_null() {
                let cell = node.data;
                assert_eq!(
                    self.queue.node(cell),
                    n,
                    "count cell of {:?} points back at the wrong node",
                    n
                );
                assert_eq!(
                    self.queue.depth(cell),
                    self.pool.depth_of(n),
                    "count cell of {:?} sits at the wrong depth",
                    n
                );
            }
        }

        // Every queued cell belongs to a live node that owns it.
        for depth in 0..self.queue.depth_count() {
            let mut cell = self.queue.head(depth);
            while !cell.is_null() {
                let n = self.queue.node(cell);
                assert!(
                    self.pool.is_live(n),
                    "queued cell at depth {} references a freed node",
                    depth
                );
                assert_eq!(
                    self.pool[n].data,
                    cell,
                    "queued cell at depth {} is not its node's cell",
                    depth
                );
                cell = self.queue.next(cell);
            }
        }
    }

    /// Render the tree, one node per line, for debugging.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.dump_node(NodeRef::ROOT, 0, &mut out);
        out
    }

    fn dump_node(&self, n: NodeRef, indent: usize, out: &mut String) {
        let pad = "  ".repeat(indent);
        if n == NodeRef::ROOT {
            let _ = writeln!(out, "{pad}(root)");
        } else {
            let node = &self.pool[n];
            let count = if node.data.is_null() {
                0
            } else {
                self.queue.count(node.data)
            };
            let _ = writeln!(
                out,
                "{pad}{:?} count={} refs={} mes={} mcs={}",
                node.edge.symbols(),
                count,
                node.refcount,
                node.max_edge_squashed,
                node.max_child_squashed,
            );
        }
        let children: Vec<NodeRef> = if n == NodeRef::ROOT {
            self.pool.root_children().collect()
        } else {
            let mut v = Vec::new();
            let mut c = self.pool[n].first_child;
            while !c.is_null() {
                v.push(c);
                c = self.pool[c].next_sibling;
            }
            v
        };
        for c in children {
            self.dump_node(c, indent + 1, out);
        }
    }

    fn live_node_list(&self) -> Vec<NodeRef> {
        let mut nodes = Vec::new();
        let mut stack: Vec<NodeRef> = self.pool.root_children().collect();
        while let Some(n) = stack.pop() {
            nodes.push(n);
            let mut c = self.pool[n].first_child;
            while !c.is_null() {
                stack.push(c);
                c = self.pool[c].next_sibling;
            }
        }
        nodes
    }
}
