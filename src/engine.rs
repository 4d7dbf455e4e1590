//! The heavy-hitter engine: online suffix-tree insertion with lossy
//! counting, bucketed compression, and two-pass reporting.
//!
//! Counts are attached only to each inserted sequence's destination node;
//! interior totals are aggregated at report time by flowing weight to
//! parents (prefix direction) and suffix-link targets (suffix direction).
//! Compression walks the leaf queue deepest-first and squashes every count
//! whose upper bound sits below the current bucket, moving its mass to the
//! surviving neighbors and recording the bound so the lossy-counting error
//! guarantee survives arbitrary pruning.

use std::rc::Rc;

use crate::cursor::Cursor;
use crate::node::{NodePool, NodeRef, OutputAcc};
use crate::queue::{CellRef, LeafQueue};
use crate::Symbol;

/// One reported heavy hitter.
#[derive(Clone, Debug)]
pub struct Hitter<X> {
    /// The location sequence (a contiguous backtrace suffix).
    pub label: Vec<X>,
    /// Lower-bound weight attributable to this sequence alone, after
    /// subtracting weight already claimed by heavier extensions.
    pub light: u64,
    /// Mid estimate of the sequence's weight.
    pub total: u64,
    /// Upper bound: `total` plus the worst squashed delta on this node's
    /// incoming edge.
    pub upper: u64,
}

/// Result of [`HeavyHitters::output`].
#[derive(Clone, Debug)]
pub struct Report<X> {
    /// Hitters sorted by descending `light`.
    pub hitters: Vec<Hitter<X>>,
    /// Total weight inserted so far.
    pub grand_total: u64,
}

/// Approximate memory accounting, for bounded-memory checks and benches.
#[derive(Clone, Copy, Debug, Default)]
pub struct MemoryStats {
    /// Nodes currently in the tree (excluding recycled slots).
    pub live_nodes: usize,
    /// Count cells currently in the leaf queue.
    pub live_counts: usize,
    /// Bytes reserved by the node arena and root index.
    pub node_bytes: usize,
    /// Bytes reserved by the count-cell arena and depth lists.
    pub queue_bytes: usize,
}

/// Carryover between consecutive inserts.
enum Mode {
    /// The cursor still points at the previous destination; the next insert
    /// retracts it by the non-shared length and continues in place.
    Uncompressed,
    /// A compression pass may have destroyed the previous destination; the
    /// next insert recomposes its input from the saved label and restarts
    /// from the root.
    Compressed,
}

/// Streaming approximate heavy-hitter engine over suffix sequences.
///
/// See the crate docs for the input conventions ([`Symbol`]).
pub struct HeavyHitters<X: Symbol> {
    pub(crate) pool: NodePool<X>,
    pub(crate) queue: LeafQueue,
    cursor: Cursor,
    mode: Mode,
    /// Full label of the previous insert's destination.
    label: Vec<X>,
    bucket_size: u64,
    current_bucket: u64,
    remaining_in_bucket: u64,
    grand_total: u64,
    /// Interior nodes created mid-insert whose suffix links still need to be
    /// materialized once the cursor is free.
    dangling: Vec<NodeRef>,
}

impl<X: Symbol> HeavyHitters<X> {
    /// Create an engine with the given lossy-counting error bound.
    ///
    /// After `k` insertions any reported count is within `k * error` of the
    /// truth. Panics unless `0 < error < 1`.
    pub fn new(error: f64) -> Self {
        assert!(error > 0.0 && error < 1.0, "error must be in (0, 1)");
        let bucket_size = (1.0 / error).ceil() as u64;
        HeavyHitters {
            pool: NodePool::new(),
            queue: LeafQueue::new(),
            cursor: Cursor::at_root(),
            mode: Mode::Uncompressed,
            label: Vec::new(),
            bucket_size,
            current_bucket: 0,
            remaining_in_bucket: bucket_size,
            grand_total: 0,
            dangling: Vec::new(),
        }
    }

    /// Insert the sequence `previous[..common_prefix] ++ extension` with the
    /// given sample weight.
    ///
    /// `common_prefix` is the number of leading symbols shared with the
    /// previously inserted sequence (0 on the first insert). The last symbol
    /// of the composed sequence must be unique to it (see [`Symbol`]).
    pub fn insert(&mut self, common_prefix: usize, extension: &[X], count: u64) {
        let prev_len = self.label.len();
        assert!(
            common_prefix <= prev_len,
            "common_prefix {} exceeds previous length {}",
            common_prefix,
            prev_len
        );
        self.label.truncate(common_prefix);
        self.label.extend_from_slice(extension);
        let total_len = self.label.len();

        let (array, base): (Rc<[X]>, usize) = match self.mode {
            Mode::Uncompressed => {
                self.cursor.retract(&self.pool, prev_len - common_prefix);
                (Rc::from(extension), common_prefix)
            }
            Mode::Compressed => {
                self.cursor.goto(NodeRef::ROOT);
                (Rc::from(&self.label[..]), 0)
            }
        };

        let destination = self.build(&array, base, total_len);

        self.add_to_count(destination, total_len, count as i64);
        self.grand_total += count;

        self.remaining_in_bucket -= 1;
        if self.remaining_in_bucket == 0 {
            self.current_bucket += 1;
            self.remaining_in_bucket = self.bucket_size;
            // The cursor cannot survive compression: its nodes may be
            // merged or deleted.
            self.cursor.goto(NodeRef::ROOT);
            self.mode = Mode::Compressed;
            self.compress();
        } else {
            self.cursor.goto(destination);
            self.mode = Mode::Uncompressed;
        }
    }

    /// Ukkonen's online update for the working `array`, whose first symbol
    /// sits at absolute position `base` of the composed sequence. Returns
    /// the destination node for the full sequence.
    fn build(&mut self, array: &Rc<[X]>, base: usize, total_len: usize) -> NodeRef {
        let len = array.len();
        let mut index = 0; // position within `array`
        let mut j = 0; // suffixes completed so far (absolute)
        let mut first_leaf = NodeRef::NULL;
        let mut last_leaf = NodeRef::NULL;
        // The latest split-created node whose suffix link is unset. The
        // cursor sits exactly on its suffix target until the next scan or
        // split, which resolves it.
        let mut pending = NodeRef::NULL;

        while index < len {
            if j > base + index {
                // Every suffix up through this position is already present.
                debug_assert!(pending.is_null());
                index += 1;
            } else if self.scan_one(array, index, &mut pending) {
                index += 1;
            } else {
                // Mismatch: the active suffix ends here. Materialize its
                // node, attach the remainder as a fresh leaf, and move on to
                // the next suffix.
                let parent = self.cursor.split_at(&mut self.pool);
                if !pending.is_null() {
                    // No scan succeeded since the split that created
                    // `pending`, so `parent` is exactly its suffix target.
                    self.pool.set_suffix(pending, parent);
                }
                pending = if parent != NodeRef::ROOT && self.pool[parent].suffix_link.is_null() {
                    parent
                } else {
                    NodeRef::NULL
                };
                let leaf = self.pool.add_leaf(parent, array, index);
                if !last_leaf.is_null() {
                    self.pool.set_suffix(last_leaf, leaf);
                }
                if first_leaf.is_null() {
                    first_leaf = leaf;
                }
                last_leaf = leaf;
                self.cursor.goto_suffix(&self.pool, parent);
                j += 1;
            }
        }
        debug_assert!(pending.is_null());

        // The cursor now denotes the shortest suffix not completed as a
        // leaf; materialize it to close the leaf suffix chain, then resolve
        // any suffix links left dangling by mid-insert splits.
        let tail = self.cursor.split_at(&mut self.pool);
        let destination = if first_leaf.is_null() {
            tail
        } else {
            self.pool.set_suffix(last_leaf, tail);
            first_leaf
        };
        if tail != NodeRef::ROOT && self.pool[tail].suffix_link.is_null() {
            self.dangling.push(tail);
        }
        while let Some(n) = self.dangling.pop() {
            self.ensure_suffix(n);
        }
        debug_assert_eq!(self.pool.depth_of(destination), total_len);
        destination
    }

    /// One `scan` step, first resolving a pending suffix link: until the
    /// scan moves the cursor, the cursor position is exactly the pending
    /// node's suffix target. A target materialized here may itself lack a
    /// link; the cursor will not revisit its suffix, so it is deferred to
    /// the post-loop fixup.
    fn scan_one(&mut self, array: &Rc<[X]>, index: usize, pending: &mut NodeRef) -> bool {
        if !pending.is_null() {
            let target = self.cursor.split_at(&mut self.pool);
            debug_assert!(self.pool[*pending].suffix_link.is_null());
            self.pool.set_suffix(*pending, target);
            *pending = NodeRef::NULL;
            if target != NodeRef::ROOT && self.pool[target].suffix_link.is_null() {
                self.dangling.push(target);
            }
        }
        self.cursor.scan(&self.pool, array, index)
    }

    /// Walk the suffix chain from `n`, materializing targets (splitting
    /// mid-edge points into nodes) until every link on the chain is set.
    fn ensure_suffix(&mut self, n: NodeRef) {
        let mut cur = n;
        while cur != NodeRef::ROOT && self.pool[cur].suffix_link.is_null() {
            self.cursor.goto_suffix(&self.pool, cur);
            let target = self.cursor.split_at(&mut self.pool);
            self.pool.set_suffix(cur, target);
            cur = target;
        }
    }

    /// Add `delta` to the count at `node` (depth `depth`), creating and
    /// enqueueing the count cell on first use. The root is never counted.
    fn add_to_count(&mut self, node: NodeRef, depth: usize, delta: i64) {
        if delta == 0 || node == NodeRef::ROOT {
            return;
        }
        debug_assert!(!node.is_null());
        let cell = self.pool[node].data;
        if cell.is_null() {
            let cell = self.queue.push(depth, node, delta);
            self.pool[node].data = cell;
            self.pool[node].refcount += 2;
        } else {
            self.queue.add(cell, delta);
        }
    }

    /// Lossy-counting squash pass, run at every bucket boundary.
    ///
    /// Deep-to-shallow order guarantees that when a cell is examined, all
    /// deletions below its node have already happened, so its refcount is
    /// final; transfers only ever target strictly shallower depths, which
    /// have not been visited yet.
    fn compress(&mut self) {
        let threshold = self.current_bucket as i64;
        for depth in (1..self.queue.depth_count()).rev() {
            let mut cur = self.queue.head(depth);
            while !cur.is_null() {
                let next = self.queue.next(cur);
                let node = self.queue.node(cur);
                let count = self.queue.count(cur);
                let upper = count + self.pool[node].max_edge_squashed as i64;
                if upper < threshold {
                    self.queue.remove(cur);
                    self.pool[node].data = CellRef::NULL;
                    self.pool[node].refcount -= 2;
                    self.squash(node, depth, count, upper.max(0) as u64);
                }
                cur = next;
            }
        }
    }

    /// Delete a (possibly zero) count from `node`, recording `upper_bound`
    /// so the error guarantee survives, transferring the mass to the
    /// surviving neighbors, and reclaiming the node if nothing references
    /// it anymore.
    fn squash(&mut self, node: NodeRef, depth: usize, count: i64, upper_bound: u64) {
        let parent = self.pool[node].parent;
        let edge_len = self.pool[node].edge.len();
        debug_assert!(depth >= edge_len);
        let parent_depth = depth - edge_len;

        let mes = &mut self.pool[node].max_edge_squashed;
        *mes = (*mes).max(upper_bound);
        let mcs = &mut self.pool[parent].max_child_squashed;
        *mcs = (*mcs).max(upper_bound);

        // The parent and the suffix both claim the mass; the negative entry
        // on the parent's suffix corrects the double count.
        if parent != NodeRef::ROOT {
            let parent_suffix = self.pool[parent].suffix_link;
            debug_assert!(!parent_suffix.is_null());
            self.add_to_count(parent_suffix, parent_depth - 1, -count);
            self.add_to_count(parent, parent_depth, count);
        }
        let suffix = self.pool[node].suffix_link;
        debug_assert!(!suffix.is_null());
        self.add_to_count(suffix, depth - 1, count);

        match self.pool[node].refcount {
            0 => {
                self.pool.detach_child(parent, node);
                self.pool.free_node(node);
                self.release_suffix(suffix, depth - 1);
                self.collapse_if_needed(parent, parent_depth);
            }
            1 => self.merge(node, depth),
            _ => {}
        }
    }

    /// Drop one suffix reference to `s`, reclaiming or collapsing it when it
    /// was the last structural reason to keep `s` around.
    fn release_suffix(&mut self, s: NodeRef, depth: usize) {
        if s == NodeRef::ROOT {
            return;
        }
        debug_assert!(self.pool.is_live(s));
        self.pool[s].refcount -= 2;
        match self.pool[s].refcount {
            0 => {
                // No children, no count, no referrers: deletable once its
                // recorded bound is itself below threshold; otherwise it
                // stays as a bound carrier for future descendants.
                let bound = self.pool[s].max_edge_squashed;
                if bound < self.current_bucket {
                    self.squash(s, depth, 0, bound);
                }
            }
            1 => {
                if self.pool[s].data.is_null() {
                    self.merge(s, depth);
                }
            }
            _ => {}
        }
    }

    /// After removing a child of `parent`, collapse or reclaim the parent if
    /// that child was its last structural reason to exist. A suffix-chain
    /// cascade triggered between the detach and this call may already have
    /// reclaimed the parent (periodic labels put a node's parent on another
    /// node's suffix chain), in which case there is nothing left to do.
    fn collapse_if_needed(&mut self, parent: NodeRef, parent_depth: usize) {
        if parent == NodeRef::ROOT || !self.pool.is_live(parent) {
            return;
        }
        match self.pool[parent].refcount {
            0 => {
                let bound = self.pool[parent].max_edge_squashed;
                if bound < self.current_bucket {
                    self.squash(parent, parent_depth, 0, bound);
                }
            }
            1 => {
                if self.pool[parent].data.is_null() {
                    self.merge(parent, parent_depth);
                }
            }
            _ => {}
        }
    }

    /// Collapse the degree-1 interior node `t` into its sole child and drop
    /// `t`'s own suffix reference.
    fn merge(&mut self, t: NodeRef, depth: usize) {
        let suffix = self.pool[t].suffix_link;
        debug_assert!(!suffix.is_null());
        self.pool.merge_child(t);
        self.release_suffix(suffix, depth - 1);
    }

    /// Report every sequence whose lower-bound weight exceeds
    /// `frequency * grand_total`, sorted by descending lower bound.
    ///
    /// Calling this twice without intervening inserts returns identical
    /// results.
    pub fn output(&mut self, frequency: f64) -> Report<X> {
        assert!(
            (0.0..=1.0).contains(&frequency),
            "frequency must be in [0, 1]"
        );
        let grand_total = self.grand_total;
        let threshold = (frequency * grand_total as f64).floor() as i64;

        // Pass 1: group nodes by depth, clear accumulators, then flow
        // (total, heavy) pairs shallow-ward. Totals go to both the parent
        // and the suffix target, minus the parent-suffix double count;
        // heavy totals flow along suffix links only, so that a sequence is
        // only suppressed by heavy left-extensions of itself.
        let by_depth = self.nodes_by_depth();
        for depth in (1..by_depth.len()).rev() {
            for &n in &by_depth[depth] {
                let (total, light) = self.totals_of(n);
                let mes = self.pool[n].max_edge_squashed as i64;
                let heavy_total = if light + mes > threshold {
                    total
                } else {
                    self.pool[n].out.heavy_descendents
                };
                let parent = self.pool[n].parent;
                let suffix = self.pool[n].suffix_link;
                debug_assert!(!suffix.is_null());
                self.pool[parent].out.descendents += total;
                self.pool[suffix].out.descendents += total;
                self.pool[suffix].out.heavy_descendents += heavy_total;
                if parent != NodeRef::ROOT {
                    let parent_suffix = self.pool[parent].suffix_link;
                    self.pool[parent_suffix].out.descendents -= total;
                }
            }
        }

        // Pass 2: post-order selection, merging sibling results so the list
        // stays sorted by descending light total.
        let mut label = Vec::new();
        let hitters = self.select(NodeRef::ROOT, threshold, &mut label);
        Report {
            hitters,
            grand_total,
        }
    }

    /// `(total, light)` for `n` from its accumulator and own count.
    fn totals_of(&self, n: NodeRef) -> (i64, i64) {
        let cell = self.pool[n].data;
        let own = if cell.is_null() {
            0
        } else {
            self.queue.count(cell)
        };
        let acc = self.pool[n].out;
        let total = own + acc.descendents;
        (total, total - acc.heavy_descendents)
    }

    fn nodes_by_depth(&mut self) -> Vec<Vec<NodeRef>> {
        let mut by_depth: Vec<Vec<NodeRef>> = Vec::new();
        self.pool[NodeRef::ROOT].out = OutputAcc::default();
        let roots: Vec<NodeRef> = self.pool.root_children().collect();
        let mut stack: Vec<(NodeRef, usize)> = Vec::new();
        for r in roots {
            stack.push((r, self.pool[r].edge.len()));
        }
        while let Some((n, depth)) = stack.pop() {
            self.pool[n].out = OutputAcc::default();
            if by_depth.len() <= depth {
                by_depth.resize_with(depth + 1, Vec::new);
            }
            by_depth[depth].push(n);
            let mut c = self.pool[n].first_child;
            while !c.is_null() {
                stack.push((c, depth + self.pool[c].edge.len()));
                c = self.pool[c].next_sibling;
            }
        }
        by_depth
    }

    fn select(&self, n: NodeRef, threshold: i64, label: &mut Vec<X>) -> Vec<Hitter<X>> {
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

        let mut merged: Vec<Hitter<X>> = Vec::new();
        for child in children {
            let mark = label.len();
            label.extend_from_slice(self.pool[child].edge.symbols());
            let sub = self.select(child, threshold, label);
            label.truncate(mark);
            merged = merge_desc(merged, sub);
        }

        if n != NodeRef::ROOT {
            let (total, light) = self.totals_of(n);
            let mes = self.pool[n].max_edge_squashed;
            if light + mes as i64 > threshold {
                debug_assert!(light >= 0 && total >= 0, "net counts must be non-negative");
                let light = light.max(0) as u64;
                let total = total.max(0) as u64;
                let item = Hitter {
                    label: label.clone(),
                    light,
                    total,
                    upper: total + mes,
                };
                merged = merge_desc(vec![item], merged);
            }
        }
        merged
    }

    /// Approximate memory accounting.
    pub fn memory_stats(&self) -> MemoryStats {
        MemoryStats {
            live_nodes: self.pool.live_nodes(),
            live_counts: self.queue.live_cells(),
            node_bytes: self.pool.capacity_bytes(),
            queue_bytes: self.queue.capacity_bytes(),
        }
    }

    /// Total weight inserted so far.
    pub fn grand_total(&self) -> u64 {
        self.grand_total
    }
}

/// Stable two-way merge by descending `light`; on ties `a` precedes `b`.
fn merge_desc<X>(a: Vec<Hitter<X>>, b: Vec<Hitter<X>>) -> Vec<Hitter<X>> {
    if a.is_empty() {
        return b;
    }
    if b.is_empty() {
        return a;
    }
    let mut out = Vec::with_capacity(a.len() + b.len());
    let mut ita = a.into_iter().peekable();
    let mut itb = b.into_iter().peekable();
    loop {
        match (ita.peek(), itb.peek()) {
            (Some(x), Some(y)) => {
                if x.light >= y.light {
                    out.push(ita.next().unwrap());
                } else {
                    out.push(itb.next().unwrap());
                }
            }
            (Some(_), None) => out.push(ita.next().unwrap()),
            (None, Some(_)) => out.push(itb.next().unwrap()),
            (None, None) => break,
        }
    }
    out
}
