//! The internal (routing) page. Unlike a conventional B+Tree, this engine's
//! internal pages store the value alongside every separator key, not just
//! the key: an exact-match lookup can answer from an internal page without
//! descending to a leaf. The cost of that choice lands entirely on
//! deletion, which the index driver pays for in `remove_here_or_descend`.

use log::trace;

use crate::key::KeyCompare;
use crate::page::{internal_max_size, PageHeader, PageId, PageKind};

#[derive(Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    Ok,
    NeedsSplit,
}

/// What an exact-match lookup against an internal page's separators found.
pub enum Lookup<'a, V> {
    Value(&'a V),
    Child(PageId),
}

#[derive(Debug)]
pub struct InternalPage<K, V> {
    pub header: PageHeader,
    /// `pairs[0]` is unused padding: slot `i >= 1` is the separator
    /// bounding `pids[i-1]` and `pids[i]`. Keeping the 1-based convention
    /// from the specification avoids an off-by-one at every call site
    /// that reasons about "separator to the left of child i".
    pairs: Vec<Option<(K, V)>>,
    pids: Vec<PageId>,
}

/// Lower-bound search over `pairs[1..]`; slot 0 never participates.
fn lower_bound<K, V, C: KeyCompare<K>>(pairs: &[Option<(K, V)>], key: &K, cmp: &C) -> (usize, bool) {
    let mut lo = 1;
    let mut hi = pairs.len();
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        let (k, _) = pairs[mid].as_ref().unwrap();
        if cmp.compare(k, key) == std::cmp::Ordering::Less {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    let exact = lo < pairs.len()
        && pairs[lo]
            .as_ref()
            .map(|(k, _)| cmp.compare(k, key) == std::cmp::Ordering::Equal)
            .unwrap_or(false);
    (lo, exact)
}

impl<K, V> InternalPage<K, V> {
    pub fn new(page_id: PageId, max_size: usize) -> Self {
        InternalPage {
            header: PageHeader::new(page_id, PageKind::Internal, max_size),
            pairs: vec![None],
            pids: Vec::new(),
        }
    }

    pub fn with_derived_capacity(page_id: PageId) -> Self {
        Self::new(page_id, internal_max_size::<K, V>())
    }

    /// Builds the very first internal root from a split: the old root
    /// becomes `pids[0]`, the pivot becomes `pairs[1]`, the new sibling
    /// becomes `pids[1]`.
    pub fn new_root(page_id: PageId, max_size: usize, left: PageId, pivot: (K, V), right: PageId) -> Self {
        let mut page = InternalPage::new(page_id, max_size);
        page.pids.push(left);
        page.pairs.push(Some(pivot));
        page.pids.push(right);
        page.header.size = 2;
        page
    }

    pub fn page_id(&self) -> PageId {
        self.header.page_id
    }

    pub fn len(&self) -> usize {
        self.header.size
    }

    pub fn pid_at(&self, i: usize) -> PageId {
        self.pids[i]
    }

    pub fn pair_at(&self, i: usize) -> (&K, &V) {
        let (k, v) = self.pairs[i].as_ref().expect("separator slot 0 has no pair");
        (k, v)
    }

    pub fn index_of_pid(&self, pid: PageId) -> usize {
        self.pids
            .iter()
            .position(|&p| p == pid)
            .expect("pid is not a child of this internal page")
    }

    pub fn insert<C: KeyCompare<K>>(&mut self, key: K, value: V, child: PageId, cmp: &C) -> InsertOutcome {
        let (idx, exact) = lower_bound(&self.pairs, &key, cmp);
        debug_assert!(!exact, "inserting a separator that already exists");
        self.pairs.insert(idx, Some((key, value)));
        self.pids.insert(idx, child);
        self.header.size += 1;
        if !self.header.is_full() {
            InsertOutcome::Ok
        } else {
            trace!("internal {:?} reached max_size, needs split", self.header.page_id);
            InsertOutcome::NeedsSplit
        }
    }

    /// Splits around `min_size`. The pivot separator is dropped from both
    /// halves (it rises into the grandparent); the new page's slot 0
    /// child is the pivot's former right-hand child.
    pub fn split(&mut self, new_page_id: PageId) -> (K, V, InternalPage<K, V>) {
        let m = self.header.min_size();
        let (pivot_k, pivot_v) = self.pairs.remove(m).expect("pivot separator must exist");

        let tail_pairs = self.pairs.split_off(m);
        let new_pids = self.pids.split_off(m);
        let new_len = new_pids.len();

        let mut new_pairs = Vec::with_capacity(tail_pairs.len() + 1);
        new_pairs.push(None);
        new_pairs.extend(tail_pairs);

        let mut new_page = InternalPage::new(new_page_id, self.header.max_size);
        new_page.pairs = new_pairs;
        new_page.pids = new_pids;
        new_page.header.size = new_len;

        self.header.size = self.pids.len();
        trace!("internal split: {:?} -> {:?}", self.header.page_id, new_page_id);
        (pivot_k, pivot_v, new_page)
    }

    /// Exact-match separator hit answers here without descending;
    /// otherwise names the child to descend into.
    pub fn get_child_or_value<C: KeyCompare<K>>(&self, key: &K, cmp: &C) -> Lookup<'_, V> {
        let (idx, exact) = lower_bound(&self.pairs, key, cmp);
        if exact {
            let (_, v) = self.pairs[idx].as_ref().unwrap();
            Lookup::Value(v)
        } else if idx == self.pairs.len() {
            Lookup::Child(self.pids[self.header.size - 1])
        } else {
            Lookup::Child(self.pids[idx - 1])
        }
    }

    /// Index of the separator that matches `key` exactly, if any. Kept
    /// separate from a combined update-or-descend call so the driver can
    /// decide what to do with its owned `value` without it being consumed
    /// by a lookup that might not need it.
    pub fn find_exact<C: KeyCompare<K>>(&self, key: &K, cmp: &C) -> Option<usize> {
        let (idx, exact) = lower_bound(&self.pairs, key, cmp);
        exact.then_some(idx)
    }

    pub fn value_mut_at(&mut self, i: usize) -> &mut V {
        &mut self.pairs[i].as_mut().expect("separator slot 0 has no pair").1
    }

    /// Replaces the separator at `i` with a synthesized `(key, value)` —
    /// used when a `remove` target matches a separator exactly and its
    /// in-subtree successor must take its place.
    pub fn set_pair_at(&mut self, i: usize, key: K, value: V) {
        self.pairs[i] = Some((key, value));
    }

    /// Removes the separator and child pid at the same index `i`. Valid
    /// exactly when `pids[i]` is the page being merged away and `pairs[i]`
    /// is the separator that bordered it — true for both merge directions
    /// (see the index driver's borrow/merge orchestration).
    pub fn remove_pair_and_pid_at(&mut self, i: usize) -> ((K, V), PageId) {
        let pair = self.pairs.remove(i).expect("removing an empty separator slot");
        let pid = self.pids.remove(i);
        self.header.size -= 1;
        (pair, pid)
    }

    /// Removes the separator at `sep_index` together with the child pid at
    /// `pid_index`, where `pid_index` is either `sep_index` or
    /// `sep_index - 1`. The two indices coincide only when the absorbed
    /// child is the one to the separator's right; a merge that absorbs the
    /// page to the separator's left needs the split form, since the
    /// surviving child's pid (at the other index) must stay put.
    pub fn remove_separator_and_pid(&mut self, sep_index: usize, pid_index: usize) -> ((K, V), PageId) {
        let pair = self.pairs.remove(sep_index).expect("removing an empty separator slot");
        let pid = self.pids.remove(pid_index);
        self.header.size -= 1;
        (pair, pid)
    }

    pub fn push_back_pair_and_pid(&mut self, key: K, value: V, pid: PageId) {
        self.pairs.push(Some((key, value)));
        self.pids.push(pid);
        self.header.size += 1;
    }

    pub fn push_front_pair_and_pid(&mut self, key: K, value: V, pid: PageId) {
        self.pairs.insert(1, Some((key, value)));
        self.pids.insert(0, pid);
        self.header.size += 1;
    }

    pub fn pop_back_pair_and_pid(&mut self) -> ((K, V), PageId) {
        let pair = self.pairs.pop().unwrap().unwrap();
        let pid = self.pids.pop().unwrap();
        self.header.size -= 1;
        (pair, pid)
    }

    pub fn pop_front_pair_and_pid(&mut self) -> ((K, V), PageId) {
        let pair = self.pairs.remove(1).unwrap();
        let pid = self.pids.remove(0);
        self.header.size -= 1;
        (pair, pid)
    }

    /// Moves the rest of `other`'s pairs and pids onto the end of this
    /// page. The caller must first `push_back_pair_and_pid` the separator
    /// rotated down from the parent together with `other.pid_at(0)` —
    /// `other`'s own slot-0 pid has no separator of its own and is not
    /// touched by this call, so it is not double-counted.
    pub fn append_from(&mut self, other: &mut InternalPage<K, V>) {
        let moved = other.header.size - 1;
        self.pairs.extend(other.pairs.drain(1..));
        self.pids.extend(other.pids.drain(1..));
        self.header.size += moved;
        other.header.size = 1;
        trace!("internal merge: {:?} absorbs {:?}", self.header.page_id, other.header.page_id);
    }

    pub fn child_pids(&self) -> &[PageId] {
        &self.pids
    }

    /// Labeled separator keys for diagnostic output; slot 0 has none.
    pub fn separator_keys(&self) -> Vec<&K> {
        self.pairs[1..].iter().map(|p| &p.as_ref().unwrap().0).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::NaturalOrder;

    fn cmp() -> NaturalOrder<i32> {
        NaturalOrder::new()
    }

    fn page_with(entries: &[(i32, i32, usize)], max_size: usize) -> InternalPage<i32, i32> {
        // entries: (separator_key, separator_value, child_pid); there is
        // always one more child than separator, so the first entry's pid
        // is slot 0 and subsequent entries each add a separator + pid.
        let mut page = InternalPage::new(PageId(100), max_size);
        page.pids.push(PageId(entries[0].2));
        page.header.size = 1;
        for &(k, v, pid) in &entries[1..] {
            page.pairs.push(Some((k, v)));
            page.pids.push(PageId(pid));
            page.header.size += 1;
        }
        page
    }

    #[test]
    fn get_child_or_value_returns_value_on_exact_separator_match() {
        let page = page_with(&[(0, 0, 1), (5, 50, 2), (10, 100, 3)], 10);
        match page.get_child_or_value(&5, &cmp()) {
            Lookup::Value(v) => assert_eq!(*v, 50),
            Lookup::Child(_) => panic!("expected exact match"),
        }
    }

    #[test]
    fn get_child_or_value_routes_to_correct_child() {
        let page = page_with(&[(0, 0, 1), (5, 50, 2), (10, 100, 3)], 10);
        match page.get_child_or_value(&3, &cmp()) {
            Lookup::Child(pid) => assert_eq!(pid, PageId(1)),
            Lookup::Value(_) => panic!("expected descent"),
        }
        match page.get_child_or_value(&7, &cmp()) {
            Lookup::Child(pid) => assert_eq!(pid, PageId(2)),
            Lookup::Value(_) => panic!("expected descent"),
        }
        match page.get_child_or_value(&100, &cmp()) {
            Lookup::Child(pid) => assert_eq!(pid, PageId(3)),
            Lookup::Value(_) => panic!("expected descent"),
        }
    }

    #[test]
    fn split_drops_pivot_and_carries_its_right_child_to_new_page() {
        let mut page = page_with(&[(0, 0, 1), (2, 2, 2), (4, 4, 3), (6, 6, 4), (8, 8, 5)], 5);
        let (pivot_k, _, right) = page.split(PageId(200));
        assert_eq!(pivot_k, 4);
        assert_eq!(page.len(), 2);
        assert_eq!(right.len(), 2);
        assert_eq!(right.pid_at(0), PageId(3));
    }

    #[test]
    fn remove_pair_and_pid_at_drops_matching_indices() {
        let mut page = page_with(&[(0, 0, 1), (5, 50, 2), (10, 100, 3)], 10);
        let (pair, pid) = page.remove_pair_and_pid_at(1);
        assert_eq!(pair.0, 5);
        assert_eq!(pid, PageId(2));
        assert_eq!(page.len(), 2);
        assert_eq!(page.pid_at(0), PageId(1));
        assert_eq!(page.pid_at(1), PageId(3));
    }
}
