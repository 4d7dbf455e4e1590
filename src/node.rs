//! Suffix-tree node records and their arena.
//!
//! Nodes live in a flat arena addressed by 4-byte [`NodeRef`]s with an
//! all-ones `NULL` sentinel; freed slots are recycled through a free list.
//! All cross-references (parent, suffix link, child/sibling wiring, queue
//! cells) are plain refs plus a manual `refcount`, never ownership:
//!
//! ```text
//! refcount = 2 * incoming_suffix_links + 2 * has_count + child_count
//! ```
//!
//! The root is slot 0. It dispatches children through a hash map keyed by
//! the first edge symbol (root fan-out is the number of distinct stream
//! heads); interior nodes use a singly linked sibling list (interior fan-out
//! is small in practice).

use std::collections::HashMap;
use std::ops::{Index, IndexMut};
use std::rc::Rc;

use crate::queue::CellRef;
use crate::Symbol;

/// Arena index of a node. `NULL` marks absence everywhere a link may be
/// missing (no suffix link yet, end of a sibling list, no parent on root).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub(crate) struct NodeRef(u32);

impl NodeRef {
    pub(crate) const NULL: NodeRef = NodeRef(u32::MAX);
    pub(crate) const ROOT: NodeRef = NodeRef(0);

    #[inline]
    pub(crate) fn is_null(self) -> bool {
        self == Self::NULL
    }

    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// An edge label: a slice `array[start..start + len]` of a shared symbol
/// array, with the first symbol cached for child dispatch.
///
/// Arrays are shared across nodes: a child and the interior node introduced
/// by splitting its edge refer to the same underlying array.
#[derive(Clone)]
pub(crate) struct Label<X> {
    array: Rc<[X]>,
    start: u32,
    len: u32,
    key: X,
}

impl<X: Symbol> Label<X> {
    pub(crate) fn new(array: &Rc<[X]>, start: usize, len: usize) -> Self {
        debug_assert!(start + len <= array.len());
        let key = if len == 0 { X::DUMMY } else { array[start] };
        Label {
            array: Rc::clone(array),
            start: start as u32,
            len: len as u32,
            key,
        }
    }

    pub(crate) fn empty() -> Self {
        Label {
            array: Rc::from(Vec::new()),
            start: 0,
            len: 0,
            key: X::DUMMY,
        }
    }

    /// First symbol of the label; `DUMMY` for the empty label.
    #[inline]
    pub(crate) fn key(&self) -> X {
        self.key
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len as usize
    }

    /// Symbol at offset `i` into the label.
    #[inline]
    pub(crate) fn symbol_at(&self, i: usize) -> X {
        debug_assert!(i < self.len());
        self.array[self.start as usize + i]
    }

    pub(crate) fn symbols(&self) -> &[X] {
        &self.array[self.start as usize..(self.start + self.len) as usize]
    }

    /// Drop the first `n` symbols (after an edge split the child keeps the
    /// tail of its old label).
    fn advance(&mut self, n: usize) {
        debug_assert!(n < self.len());
        self.start += n as u32;
        self.len -= n as u32;
        self.key = self.array[self.start as usize];
    }

    /// True when `tail` continues this label inside the same backing array,
    /// so a merge can widen the slice instead of allocating.
    fn is_contiguous_with(&self, tail: &Label<X>) -> bool {
        Rc::ptr_eq(&self.array, &tail.array) && self.start + self.len == tail.start
    }
}

/// Transient accumulator used only while a report is being generated.
#[derive(Clone, Copy, Default)]
pub(crate) struct OutputAcc {
    pub(crate) descendents: i64,
    pub(crate) heavy_descendents: i64,
}

/// A vertex of the suffix tree. See the module docs for the refcount rule.
pub(crate) struct Node<X> {
    /// Label on the incoming edge (empty on the root).
    pub(crate) edge: Label<X>,
    pub(crate) parent: NodeRef,
    /// Node labeled with this node's label minus its first symbol; `NULL`
    /// until Ukkonen's construction has linked it.
    pub(crate) suffix_link: NodeRef,
    pub(crate) first_child: NodeRef,
    pub(crate) next_sibling: NodeRef,
    pub(crate) refcount: u32,
    /// Count cell in the leaf queue, `NULL` when the node carries no count.
    pub(crate) data: CellRef,
    pub(crate) out: OutputAcc,
    /// Largest lossy-counting upper bound among counts squashed off this
    /// node's incoming edge. Never decreases.
    pub(crate) max_edge_squashed: u64,
    /// Largest such bound ever observed on any child edge; new leaves below
    /// inherit it. Never decreases.
    pub(crate) max_child_squashed: u64,
}

impl<X: Symbol> Node<X> {
    fn new(edge: Label<X>, parent: NodeRef, inherited_bound: u64) -> Self {
        Node {
            edge,
            parent,
            suffix_link: NodeRef::NULL,
            first_child: NodeRef::NULL,
            next_sibling: NodeRef::NULL,
            refcount: 0,
            data: CellRef::NULL,
            out: OutputAcc::default(),
            max_edge_squashed: inherited_bound,
            max_child_squashed: inherited_bound,
        }
    }
}

/// The node arena plus the root's hash-map child index.
pub(crate) struct NodePool<X: Symbol> {
    nodes: Vec<Node<X>>,
    free: Vec<NodeRef>,
    root_children: HashMap<X, NodeRef>,
}

impl<X: Symbol> Index<NodeRef> for NodePool<X> {
    type Output = Node<X>;

    #[inline]
    fn index(&self, r: NodeRef) -> &Node<X> {
        &self.nodes[r.index()]
    }
}

impl<X: Symbol> IndexMut<NodeRef> for NodePool<X> {
    #[inline]
    fn index_mut(&mut self, r: NodeRef) -> &mut Node<X> {
        &mut self.nodes[r.index()]
    }
}

impl<X: Symbol> NodePool<X> {
    pub(crate) fn new() -> Self {
        let root = Node::new(Label::empty(), NodeRef::NULL, 0);
        NodePool {
            nodes: vec![root],
            free: Vec::new(),
            root_children: HashMap::new(),
        }
    }

    fn alloc(&mut self, node: Node<X>) -> NodeRef {
        match self.free.pop() {
            Some(r) => {
                self.nodes[r.index()] = node;
                r
            }
            None => {
                let r = NodeRef(self.nodes.len() as u32);
                self.nodes.push(node);
                r
            }
        }
    }

    pub(crate) fn free_node(&mut self, n: NodeRef) {
        debug_assert!(n != NodeRef::ROOT, "root is never freed");
        // Clear links and poison the refcount so stale refs are detectable
        // until the slot is reused.
        let node = &mut self.nodes[n.index()];
        node.parent = NodeRef::NULL;
        node.suffix_link = NodeRef::NULL;
        node.first_child = NodeRef::NULL;
        node.refcount = u32::MAX;
        self.free.push(n);
    }

    /// False once `n` has been freed (and until its slot is reused). No
    /// nodes are allocated during a compression pass, so this is a reliable
    /// staleness test for refs held across squash cascades.
    pub(crate) fn is_live(&self, n: NodeRef) -> bool {
        self.nodes[n.index()].refcount != u32::MAX
    }

    pub(crate) fn live_nodes(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    pub(crate) fn capacity_bytes(&self) -> usize {
        self.nodes.capacity() * std::mem::size_of::<Node<X>>()
            + self.free.capacity() * std::mem::size_of::<NodeRef>()
            + self.root_children.capacity() * (std::mem::size_of::<X>() + 12)
    }

    pub(crate) fn root_children(&self) -> impl Iterator<Item = NodeRef> + '_ {
        self.root_children.values().copied()
    }

    /// Child of `n` whose edge starts with `key`, or `NULL`.
    pub(crate) fn find_child(&self, n: NodeRef, key: X) -> NodeRef {
        if n == NodeRef::ROOT {
            return self.root_children.get(&key).copied().unwrap_or(NodeRef::NULL);
        }
        let mut c = self[n].first_child;
        while !c.is_null() {
            if self[c].edge.key() == key {
                return c;
            }
            c = self[c].next_sibling;
        }
        NodeRef::NULL
    }

    /// Like [`find_child`](Self::find_child) but the child must exist.
    pub(crate) fn get_child(&self, n: NodeRef, key: X) -> NodeRef {
        let c = self.find_child(n, key);
        assert!(!c.is_null(), "missing child for {:?}", key);
        c
    }

    fn attach_child(&mut self, parent: NodeRef, child: NodeRef) {
        if parent == NodeRef::ROOT {
            let key = self[child].edge.key();
            let prev = self.root_children.insert(key, child);
            debug_assert!(prev.is_none(), "duplicate root child for {:?}", key);
        } else {
            let head = self[parent].first_child;
            self[child].next_sibling = head;
            self[parent].first_child = child;
            self[parent].refcount += 1;
        }
    }

    /// Unlink `child` from `parent`'s child set, decrementing `parent`'s
    /// refcount in the sibling-list case. The child itself is untouched.
    pub(crate) fn detach_child(&mut self, parent: NodeRef, child: NodeRef) {
        if parent == NodeRef::ROOT {
            let key = self[child].edge.key();
            let removed = self.root_children.remove(&key);
            debug_assert_eq!(removed, Some(child));
        } else {
            self.unlink_sibling(parent, child);
            self[parent].refcount -= 1;
        }
    }

    fn unlink_sibling(&mut self, parent: NodeRef, child: NodeRef) {
        let after = self[child].next_sibling;
        let mut c = self[parent].first_child;
        if c == child {
            self[parent].first_child = after;
            return;
        }
        loop {
            assert!(!c.is_null(), "child not on its parent's sibling list");
            let next = self[c].next_sibling;
            if next == child {
                self[c].next_sibling = after;
                return;
            }
            c = next;
        }
    }

    /// Swap `old` for `new` in `parent`'s child set without touching the
    /// parent's refcount. Both must share their first edge symbol.
    fn replace_child(&mut self, parent: NodeRef, old: NodeRef, new: NodeRef) {
        debug_assert_eq!(self[old].edge.key(), self[new].edge.key());
        if parent == NodeRef::ROOT {
            let key = self[new].edge.key();
            let prev = self.root_children.insert(key, new);
            debug_assert_eq!(prev, Some(old));
        } else {
            let after = self[old].next_sibling;
            self[new].next_sibling = after;
            let mut c = self[parent].first_child;
            if c == old {
                self[parent].first_child = new;
                return;
            }
            loop {
                assert!(!c.is_null(), "child not on its parent's sibling list");
                let next = self[c].next_sibling;
                if next == old {
                    self[c].next_sibling = new;
                    return;
                }
                c = next;
            }
        }
    }

    /// Create a leaf whose edge is `array[index..]` and attach it below
    /// `parent`. The fresh leaf starts from the parent's child-squash bound,
    /// so it inherits the worst delta already applying below that parent.
    pub(crate) fn add_leaf(&mut self, parent: NodeRef, array: &Rc<[X]>, index: usize) -> NodeRef {
        debug_assert!(index < array.len());
        let bound = self[parent].max_child_squashed;
        let edge = Label::new(array, index, array.len() - index);
        let leaf = self.alloc(Node::new(edge, parent, bound));
        self.attach_child(parent, leaf);
        leaf
    }

    /// Insert an interior node on the edge `parent -> child` covering the
    /// first `len` symbols of the child's edge. Returns `parent` unchanged
    /// when `len == 0`.
    pub(crate) fn split_edge(&mut self, parent: NodeRef, child: NodeRef, len: usize) -> NodeRef {
        if len == 0 {
            return parent;
        }
        debug_assert!(len < self[child].edge.len());
        debug_assert_eq!(self[child].parent, parent);

        let head = {
            let edge = &self[child].edge;
            Label::new(&edge.array, edge.start as usize, len)
        };
        // Squashes recorded on the old long edge could sit on either half.
        let bound = self[child].max_edge_squashed;
        let mut mid = Node::new(head, parent, bound);
        mid.first_child = child;
        mid.refcount = 1;
        let mid = self.alloc(mid);

        self.replace_child(parent, child, mid);
        let c = &mut self[child];
        c.edge.advance(len);
        c.parent = mid;
        c.next_sibling = NodeRef::NULL;
        mid
    }

    /// Collapse the degree-1 interior node `t` (no count, no incoming suffix
    /// links) into its sole child, concatenating the two edge labels. The
    /// caller releases `t`'s own suffix link.
    pub(crate) fn merge_child(&mut self, t: NodeRef) {
        debug_assert_eq!(self[t].refcount, 1);
        debug_assert!(self[t].data.is_null());
        let child = self[t].first_child;
        debug_assert!(!child.is_null());
        debug_assert!(self[child].next_sibling.is_null());

        let parent = self[t].parent;
        let joined = if self[t].edge.is_contiguous_with(&self[child].edge) {
            // Same backing array, adjacent slices: widen in place.
            let t_edge = &self[t].edge;
            Label::new(
                &t_edge.array,
                t_edge.start as usize,
                t_edge.len() + self[child].edge.len(),
            )
        } else {
            let mut symbols =
                Vec::with_capacity(self[t].edge.len() + self[child].edge.len());
            symbols.extend_from_slice(self[t].edge.symbols());
            symbols.extend_from_slice(self[child].edge.symbols());
            let array: Rc<[X]> = Rc::from(symbols);
            let len = array.len();
            Label::new(&array, 0, len)
        };

        let t_mes = self[t].max_edge_squashed;
        let t_mcs = self[t].max_child_squashed;
        {
            let c = &mut self[child];
            c.edge = joined;
            c.parent = parent;
            c.max_edge_squashed = c.max_edge_squashed.max(t_mes);
            c.max_child_squashed = c.max_child_squashed.max(t_mcs);
        }
        self.replace_child(parent, t, child);
        self.free_node(t);
    }

    /// Set `n`'s suffix link, bumping the target's refcount. The root is
    /// never refcounted.
    pub(crate) fn set_suffix(&mut self, n: NodeRef, target: NodeRef) {
        debug_assert!(self[n].suffix_link.is_null());
        debug_assert!(!target.is_null());
        self[n].suffix_link = target;
        if target != NodeRef::ROOT {
            self[target].refcount += 2;
        }
    }

    /// Full label of `n`, root to `n`. Used by reporting and diagnostics.
    pub(crate) fn label_of(&self, n: NodeRef) -> Vec<X> {
        let mut parts: Vec<NodeRef> = Vec::new();
        let mut cur = n;
        while cur != NodeRef::ROOT {
            parts.push(cur);
            cur = self[cur].parent;
        }
        let mut label = Vec::new();
        for r in parts.into_iter().rev() {
            label.extend_from_slice(self[r].edge.symbols());
        }
        label
    }

    /// Depth (label length) of `n`, recomputed by walking parents.
    pub(crate) fn depth_of(&self, n: NodeRef) -> usize {
        let mut depth = 0;
        let mut cur = n;
        while cur != NodeRef::ROOT {
            depth += self[cur].edge.len();
            cur = self[cur].parent;
        }
        depth
    }
}
