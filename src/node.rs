//! Ties the two page shapes together into the single type the page table
//! stores. Dispatch on `Leaf` vs `Internal` replaces what a disk-backed
//! port would otherwise need virtual dispatch for.

use crate::internal::InternalPage;
use crate::leaf::LeafPage;
use crate::page::PageHeader;

#[derive(Debug)]
pub enum Page<K, V> {
    Leaf(LeafPage<K, V>),
    Internal(InternalPage<K, V>),
}

impl<K, V> Page<K, V> {
    pub fn header(&self) -> &PageHeader {
        match self {
            Page::Leaf(l) => &l.header,
            Page::Internal(i) => &i.header,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Page::Leaf(_))
    }

    pub fn as_leaf(&self) -> &LeafPage<K, V> {
        match self {
            Page::Leaf(l) => l,
            Page::Internal(_) => panic!("expected a leaf page"),
        }
    }

    pub fn as_leaf_mut(&mut self) -> &mut LeafPage<K, V> {
        match self {
            Page::Leaf(l) => l,
            Page::Internal(_) => panic!("expected a leaf page"),
        }
    }

    pub fn as_internal(&self) -> &InternalPage<K, V> {
        match self {
            Page::Internal(i) => i,
            Page::Leaf(_) => panic!("expected an internal page"),
        }
    }

    pub fn as_internal_mut(&mut self) -> &mut InternalPage<K, V> {
        match self {
            Page::Internal(i) => i,
            Page::Leaf(_) => panic!("expected an internal page"),
        }
    }
}
