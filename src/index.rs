//! The index driver: owns the root and the page table, and is the only
//! place that resolves structural outcomes (`NeedsSplit`, `Underflow`,
//! `DidMerge`) into tree-shape changes. Leaf and internal pages never talk
//! to each other or to the page table directly — every cross-page
//! decision (which sibling to borrow from, when to collapse the root) is
//! made here.

use log::debug;

use crate::error::{IndexError, IndexResult};
use crate::internal::{InsertOutcome as InternalInsert, InternalPage, Lookup};
use crate::key::KeyCompare;
use crate::leaf::{InsertOutcome as LeafInsert, LeafPage, RemoveOutcome};
use crate::node::Page;
use crate::page::{internal_max_size, leaf_max_size, PageId};
use crate::page_table::PageTable;

/// An in-memory B+Tree index generic over a key type `K`, a value type
/// `V`, and a three-way comparator `C`.
///
/// Internal pages in this engine store the value alongside every
/// separator key, so an exact-match `get` can terminate at an internal
/// page without descending to a leaf (see [`crate::internal`]). That
/// choice is also why `K` and `V` must be [`Clone`]: a separator key and
/// value are materialized independently of whatever leaf they originated
/// from, and deletion's successor-synthesis and the borrow/merge
/// protocol both duplicate a pair across pages before one copy is retired.
pub struct BPlusTree<K, V, C> {
    table: PageTable<K, V>,
    root: PageId,
    comparator: C,
    leaf_max_size: usize,
    internal_max_size: usize,
}

/// Bubbles up from a recursive insert: either nothing structural happened,
/// or the child split and produced a pivot to install in the caller.
enum InsertBubble<K, V> {
    Done,
    Split { pivot: (K, V), new_child: PageId },
}

/// Bubbles up from a recursive remove: either nothing structural
/// happened, or the child merged away and the caller must check its own
/// occupancy (or, at the root, whether the tree should shrink).
enum RemoveBubble {
    Done,
    Merged,
}

impl<K: Clone, V: Clone, C: KeyCompare<K>> BPlusTree<K, V, C> {
    pub fn new(comparator: C) -> Self {
        let leaf_max_size = leaf_max_size::<K, V>();
        let internal_max_size = internal_max_size::<K, V>();
        let mut table = PageTable::new();
        let root = table.create(|id| Page::Leaf(LeafPage::new(id, leaf_max_size)));
        debug!(
            "new index: root leaf {:?}, leaf_max_size={}, internal_max_size={}",
            root, leaf_max_size, internal_max_size
        );
        BPlusTree {
            table,
            root,
            comparator,
            leaf_max_size,
            internal_max_size,
        }
    }

    // ---- insert -----------------------------------------------------

    pub fn insert(&mut self, key: K, value: V) -> IndexResult<()> {
        let bubble = match self.table.get(self.root) {
            Page::Leaf(_) => self.insert_into_leaf(self.root, key, value)?,
            Page::Internal(_) => self.insert_descend(self.root, key, value)?,
        };
        match bubble {
            InsertBubble::Done => Ok(()),
            InsertBubble::Split { pivot, new_child } => {
                self.grow_root(pivot, new_child);
                Ok(())
            }
        }
    }

    fn grow_root(&mut self, pivot: (K, V), new_child: PageId) {
        let old_root = self.root;
        let new_root_id = self.table.create(|id| {
            Page::Internal(InternalPage::new_root(id, self.internal_max_size, old_root, pivot, new_child))
        });
        debug!(
            "root grew: new internal root {:?} over {:?} and {:?}",
            new_root_id, old_root, new_child
        );
        self.root = new_root_id;
    }

    /// `page_id` must name an internal page — the contract this function
    /// and [`Self::insert`] maintain between them: a leaf is only ever
    /// handed to [`Self::insert_into_leaf`] directly, never recursed into
    /// here, so the pivot-reinsertion below can assume `page_id` is still
    /// an internal page once the child bubble comes back.
    fn insert_descend(&mut self, page_id: PageId, key: K, value: V) -> IndexResult<InsertBubble<K, V>> {
        let child = match self.table.get(page_id).as_internal().get_child_or_value(&key, &self.comparator) {
            Lookup::Value(_) => return Err(IndexError::KeyDuplicate),
            Lookup::Child(pid) => pid,
        };

        let child_bubble = if self.table.get(child).is_leaf() {
            self.insert_into_leaf(child, key, value)
        } else {
            self.insert_descend(child, key, value)
        }?;

        let (pivot, new_child) = match child_bubble {
            InsertBubble::Done => return Ok(InsertBubble::Done),
            InsertBubble::Split { pivot, new_child } => (pivot, new_child),
        };

        let outcome = self
            .table
            .get_mut(page_id)
            .as_internal_mut()
            .insert(pivot.0, pivot.1, new_child, &self.comparator);
        match outcome {
            InternalInsert::Ok => Ok(InsertBubble::Done),
            InternalInsert::NeedsSplit => {
                let new_id = self
                    .table
                    .create(|id| Page::Internal(InternalPage::new(id, self.internal_max_size)));
                let (pivot_k, pivot_v, new_internal) = self.table.get_mut(page_id).as_internal_mut().split(new_id);
                *self.table.get_mut(new_id) = Page::Internal(new_internal);
                Ok(InsertBubble::Split {
                    pivot: (pivot_k, pivot_v),
                    new_child: new_id,
                })
            }
        }
    }

    fn insert_into_leaf(&mut self, page_id: PageId, key: K, value: V) -> IndexResult<InsertBubble<K, V>> {
        match self.table.get_mut(page_id).as_leaf_mut().insert(key, value, &self.comparator) {
            LeafInsert::Ok => Ok(InsertBubble::Done),
            LeafInsert::KeyDuplicate => Err(IndexError::KeyDuplicate),
            LeafInsert::NeedsSplit => {
                let new_id = self.table.create(|id| Page::Leaf(LeafPage::new(id, self.leaf_max_size)));
                let (pivot_k, pivot_v, new_leaf) = self.table.get_mut(page_id).as_leaf_mut().split(new_id);
                *self.table.get_mut(new_id) = Page::Leaf(new_leaf);
                Ok(InsertBubble::Split {
                    pivot: (pivot_k, pivot_v),
                    new_child: new_id,
                })
            }
        }
    }

    // ---- update -------------------------------------------------------

    pub fn update(&mut self, key: K, value: V) -> IndexResult<()> {
        self.update_descend(self.root, key, value)
    }

    fn update_descend(&mut self, page_id: PageId, key: K, value: V) -> IndexResult<()> {
        let child = match self.table.get_mut(page_id) {
            Page::Leaf(leaf) => {
                return if leaf.update(&key, value, &self.comparator) {
                    Ok(())
                } else {
                    Err(IndexError::KeyNotFound)
                };
            }
            Page::Internal(internal) => match internal.get_child_or_value(&key, &self.comparator) {
                Lookup::Value(_) => None,
                Lookup::Child(pid) => Some(pid),
            },
        };

        match child {
            Some(pid) => self.update_descend(pid, key, value),
            None => {
                let internal = self.table.get_mut(page_id).as_internal_mut();
                let idx = internal
                    .find_exact(&key, &self.comparator)
                    .expect("exact separator match reported by get_child_or_value");
                *internal.value_mut_at(idx) = value;
                Ok(())
            }
        }
    }

    // ---- get ------------------------------------------------------------

    pub fn get(&self, key: &K) -> Option<&V> {
        let mut current = self.root;
        loop {
            match self.table.get(current) {
                Page::Leaf(leaf) => return leaf.get(key, &self.comparator),
                Page::Internal(internal) => match internal.get_child_or_value(key, &self.comparator) {
                    Lookup::Value(v) => return Some(v),
                    Lookup::Child(pid) => current = pid,
                },
            }
        }
    }

    // ---- remove -------------------------------------------------------

    pub fn remove(&mut self, key: &K) -> IndexResult<()> {
        match self.remove_descend(self.root, None, key)? {
            RemoveBubble::Done => {}
            RemoveBubble::Merged => self.maybe_shrink_root(),
        }
        Ok(())
    }

    fn maybe_shrink_root(&mut self) {
        let collapse_to = match self.table.get(self.root) {
            Page::Internal(internal) if internal.len() == 1 => Some(internal.pid_at(0)),
            _ => None,
        };
        if let Some(only_child) = collapse_to {
            debug!("root shrank: collapsing {:?} into lone child {:?}", self.root, only_child);
            self.root = only_child;
        }
    }

    /// `parent_id` is `None` exactly when `page_id` is the root — the
    /// root never borrows or merges against a parent; its own underflow
    /// is handled entirely by [`Self::maybe_shrink_root`] after this
    /// returns to [`Self::remove`].
    fn remove_descend(&mut self, page_id: PageId, parent_id: Option<PageId>, key: &K) -> IndexResult<RemoveBubble> {
        let is_root = parent_id.is_none();
        if self.table.get(page_id).is_leaf() {
            let outcome = self
                .table
                .get_mut(page_id)
                .as_leaf_mut()
                .remove_local(key, is_root, &self.comparator);
            return match outcome {
                RemoveOutcome::Ok => Ok(RemoveBubble::Done),
                RemoveOutcome::KeyNotFound => Err(IndexError::KeyNotFound),
                RemoveOutcome::Underflow => {
                    let parent_id = parent_id.expect("a non-root leaf always has a parent");
                    let merged = self.resolve_leaf_underflow(page_id, parent_id);
                    Ok(if merged { RemoveBubble::Merged } else { RemoveBubble::Done })
                }
            };
        }

        let (effective_key, rewritten_child) = self.rewrite_separator_if_matched(page_id, key);
        let child = match rewritten_child {
            Some(pid) => pid,
            None => match self.table.get(page_id).as_internal().get_child_or_value(&effective_key, &self.comparator) {
                Lookup::Child(pid) => pid,
                Lookup::Value(_) => unreachable!("get_child_or_value found a separator that find_exact missed"),
            },
        };

        match self.remove_descend(child, Some(page_id), &effective_key)? {
            RemoveBubble::Done => Ok(RemoveBubble::Done),
            RemoveBubble::Merged => {
                if is_root {
                    return Ok(RemoveBubble::Merged);
                }
                let internal = self.table.get(page_id).as_internal();
                if internal.len() >= internal.header.min_size() {
                    Ok(RemoveBubble::Done)
                } else {
                    let parent_id = parent_id.expect("a non-root internal page always has a parent");
                    self.resolve_internal_underflow(page_id, parent_id);
                    Ok(RemoveBubble::Merged)
                }
            }
        }
    }

    /// If `key` matches a separator of `page_id` exactly, replaces that
    /// separator with the in-subtree successor (the right child's
    /// leftmost leaf pair) and returns the successor's key together with
    /// `pids[idx]` — the subtree the caller must now descend into to
    /// actually delete that successor, since the separator no longer
    /// points at the caller's original key. The pid is handed back
    /// directly rather than left for the caller to re-derive: a second
    /// `get_child_or_value(&succ_key, …)` against this same page would
    /// exact-match the separator *this call just wrote*, not route past
    /// it. Otherwise (no match) returns `key` unchanged and `None`.
    fn rewrite_separator_if_matched(&mut self, page_id: PageId, key: &K) -> (K, Option<PageId>) {
        let matched = {
            let internal = self.table.get(page_id).as_internal();
            internal.find_exact(key, &self.comparator).map(|idx| (idx, internal.pid_at(idx)))
        };

        match matched {
            None => (key.clone(), None),
            Some((idx, right_child)) => {
                let (succ_key, succ_value) = self.leftmost_pair(right_child);
                self.table
                    .get_mut(page_id)
                    .as_internal_mut()
                    .set_pair_at(idx, succ_key.clone(), succ_value);
                (succ_key, Some(right_child))
            }
        }
    }

    fn leftmost_pair(&self, mut page_id: PageId) -> (K, V) {
        loop {
            match self.table.get(page_id) {
                Page::Leaf(leaf) => {
                    let (k, v) = leaf.min_pair();
                    return (k.clone(), v.clone());
                }
                Page::Internal(internal) => page_id = internal.pid_at(0),
            }
        }
    }

    /// Picks the sibling to borrow from or merge with: the right sibling
    /// if one exists, else the left. Returns `(sibling_id, is_right,
    /// sep_index)` where `sep_index` is the parent separator bordering
    /// `page_id` and the sibling.
    fn pick_sibling(&self, page_id: PageId, parent_id: PageId) -> (PageId, bool, usize) {
        let parent = self.table.get(parent_id).as_internal();
        let j = parent.index_of_pid(page_id);
        if j + 1 < parent.len() {
            (parent.pid_at(j + 1), true, j + 1)
        } else {
            (parent.pid_at(j - 1), false, j)
        }
    }

    /// Resolves a leaf's underflow by borrowing a pair from a sibling
    /// (rotating the parent separator through the leaf) if the sibling
    /// has spare capacity, or merging the two leaves otherwise. Returns
    /// whether a merge happened.
    fn resolve_leaf_underflow(&mut self, page_id: PageId, parent_id: PageId) -> bool {
        let (sibling_id, sibling_is_right, sep_index) = self.pick_sibling(page_id, parent_id);

        let sibling_has_surplus = {
            let sibling = self.table.get(sibling_id).as_leaf();
            sibling.len() > sibling.header.min_size()
        };

        if sibling_has_surplus {
            let (old_sep_k, old_sep_v) = {
                let (k, v) = self.table.get(parent_id).as_internal().pair_at(sep_index);
                (k.clone(), v.clone())
            };

            let (this, sibling) = self.table.get_pair_mut(page_id, sibling_id);
            let this = this.as_leaf_mut();
            let sibling = sibling.as_leaf_mut();

            let new_sep = if sibling_is_right {
                this.push_back(old_sep_k, old_sep_v);
                let (k, v) = sibling.pop_front();
                (k, v)
            } else {
                this.push_front(old_sep_k, old_sep_v);
                let (k, v) = sibling.pop_back();
                (k, v)
            };

            self.table.get_mut(parent_id).as_internal_mut().set_pair_at(sep_index, new_sep.0, new_sep.1);
            false
        } else {
            // The merger must be whichever page sits to the *left* in key
            // order, since `append_from` only ever extends a page's tail:
            // page ids grow monotonically at allocation time, but a later
            // split of the spatially-left sibling can hand it a larger id
            // than a spatially-right page allocated earlier, so picking by
            // raw id here would append a smaller-keyed page after a
            // larger-keyed one and break sort order.
            let (merger_id, mergee_id) = if sibling_is_right {
                (page_id, sibling_id)
            } else {
                (sibling_id, page_id)
            };
            let (old_sep_k, old_sep_v) = {
                let (k, v) = self.table.get(parent_id).as_internal().pair_at(sep_index);
                (k.clone(), v.clone())
            };
            let (merger, mergee) = self.table.get_pair_mut(merger_id, mergee_id);
            let merger = merger.as_leaf_mut();
            let mergee = mergee.as_leaf_mut();
            merger.push_back(old_sep_k, old_sep_v);
            merger.append_from(mergee);
            let parent = self.table.get_mut(parent_id).as_internal_mut();
            let mergee_pid_index = parent.index_of_pid(mergee_id);
            parent.remove_separator_and_pid(sep_index, mergee_pid_index);
            true
        }
    }

    fn resolve_internal_underflow(&mut self, page_id: PageId, parent_id: PageId) {
        let (sibling_id, sibling_is_right, sep_index) = self.pick_sibling(page_id, parent_id);

        let sibling_has_surplus = {
            let sibling = self.table.get(sibling_id).as_internal();
            sibling.len() > sibling.header.min_size()
        };

        if sibling_has_surplus {
            self.borrow_internal(page_id, sibling_id, sibling_is_right, parent_id, sep_index);
        } else {
            self.merge_internal(page_id, sibling_id, sibling_is_right, parent_id, sep_index);
        }
    }

    fn borrow_internal(
        &mut self,
        page_id: PageId,
        sibling_id: PageId,
        sibling_is_right: bool,
        parent_id: PageId,
        sep_index: usize,
    ) {
        let (sep_k, sep_v) = {
            let (k, v) = self.table.get(parent_id).as_internal().pair_at(sep_index);
            (k.clone(), v.clone())
        };

        let (this, sibling) = self.table.get_pair_mut(page_id, sibling_id);
        let this = this.as_internal_mut();
        let sibling = sibling.as_internal_mut();

        let new_sep = if sibling_is_right {
            let borrowed_pid = sibling.pid_at(0);
            this.push_back_pair_and_pid(sep_k, sep_v, borrowed_pid);
            sibling.pop_front_pair_and_pid().0
        } else {
            let borrowed_pid = sibling.pid_at(sibling.len() - 1);
            this.push_front_pair_and_pid(sep_k, sep_v, borrowed_pid);
            sibling.pop_back_pair_and_pid().0
        };

        self.table.get_mut(parent_id).as_internal_mut().set_pair_at(sep_index, new_sep.0, new_sep.1);
    }

    fn merge_internal(
        &mut self,
        page_id: PageId,
        sibling_id: PageId,
        sibling_is_right: bool,
        parent_id: PageId,
        sep_index: usize,
    ) {
        // See the matching comment in `resolve_leaf_underflow`: the merger
        // must be the spatially-left page, not the smaller-id page, since
        // `append_from` only extends a page's tail.
        let (merger_id, mergee_id) = if sibling_is_right {
            (page_id, sibling_id)
        } else {
            (sibling_id, page_id)
        };

        let mergee_pid_index = self.table.get(parent_id).as_internal().index_of_pid(mergee_id);
        let (sep_k, sep_v) = self
            .table
            .get_mut(parent_id)
            .as_internal_mut()
            .remove_separator_and_pid(sep_index, mergee_pid_index)
            .0;

        let (merger, mergee) = self.table.get_pair_mut(merger_id, mergee_id);
        let merger = merger.as_internal_mut();
        let mergee = mergee.as_internal_mut();
        let mergee_first_pid = mergee.pid_at(0);
        merger.push_back_pair_and_pid(sep_k, sep_v, mergee_first_pid);
        merger.append_from(mergee);
    }

    pub fn root_id(&self) -> PageId {
        self.root
    }

    pub fn table(&self) -> &PageTable<K, V> {
        &self.table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::NaturalOrder;

    fn tree() -> BPlusTree<i32, i32, NaturalOrder<i32>> {
        BPlusTree::new(NaturalOrder::new())
    }

    #[test]
    fn insert_then_get_round_trips() {
        let mut t = tree();
        for k in 0..50 {
            t.insert(k, k * 10).unwrap();
        }
        for k in 0..50 {
            assert_eq!(t.get(&k), Some(&(k * 10)));
        }
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut t = tree();
        t.insert(1, 1).unwrap();
        assert_eq!(t.insert(1, 2), Err(IndexError::KeyDuplicate));
        assert_eq!(t.get(&1), Some(&1));
    }

    #[test]
    fn update_changes_value_without_structural_change() {
        let mut t = tree();
        for k in 0..50 {
            t.insert(k, k).unwrap();
        }
        t.update(10, 999).unwrap();
        assert_eq!(t.get(&10), Some(&999));
        assert_eq!(t.update(1000, 1), Err(IndexError::KeyNotFound));
    }

    #[test]
    fn remove_then_get_returns_none() {
        let mut t = tree();
        for k in 0..50 {
            t.insert(k, k).unwrap();
        }
        for k in 0..50 {
            t.remove(&k).unwrap();
        }
        for k in 0..50 {
            assert_eq!(t.get(&k), None);
        }
    }

    #[test]
    fn removing_an_absent_key_errors() {
        let mut t = tree();
        t.insert(1, 1).unwrap();
        assert_eq!(t.remove(&2), Err(IndexError::KeyNotFound));
    }

    #[test]
    fn remove_in_reverse_order_stays_well_formed() {
        let mut t = tree();
        for k in 0..200 {
            t.insert(k, k).unwrap();
        }
        for k in (0..200).rev() {
            t.remove(&k).unwrap();
            assert_eq!(t.get(&k), None);
        }
    }

    #[test]
    fn reinsert_after_remove_sees_new_value() {
        let mut t = tree();
        t.insert(5, 50).unwrap();
        t.remove(&5).unwrap();
        t.insert(5, 500).unwrap();
        assert_eq!(t.get(&5), Some(&500));
    }

    /// Removing a key that is currently held as an internal page's
    /// separator (rather than sitting in a leaf) must rewrite that
    /// separator to the subtree's successor and descend straight into
    /// the successor's subtree, not re-look-up the key it just rewrote
    /// on the same page. A value type large enough to push
    /// `leaf_max_size` down to 5 (see `internal::tests`/`page::tests` for
    /// the same sizing) promotes `2` and `5` to root separators after
    /// `0..10` are inserted; removing either one directly used to panic.
    #[test]
    fn remove_of_a_separator_key_does_not_panic() {
        let mut t: BPlusTree<i32, [u8; 796], NaturalOrder<i32>> = BPlusTree::new(NaturalOrder::new());
        for k in 0..10 {
            t.insert(k, [k as u8; 796]).unwrap();
        }
        t.remove(&5).unwrap();
        assert_eq!(t.get(&5), None);
        for k in (0..10).filter(|&k| k != 5) {
            assert_eq!(t.get(&k), Some(&[k as u8; 796]));
        }
    }
}
