//! A single bag of a tree decomposition.

use fixedbitset::FixedBitSet;

use crate::ids::{BagId, VertexId};

/// A bag: an id plus the set of original-graph vertices it contains.
#[derive(Debug, Clone)]
pub struct Bag {
    id: BagId,
    vertices: FixedBitSet,
}

impl Bag {
    pub fn new(id: BagId, capacity: usize) -> Self {
        Self {
            id,
            vertices: FixedBitSet::with_capacity(capacity),
        }
    }

    pub fn from_vertices(id: BagId, capacity: usize, vertices: impl IntoIterator<Item = VertexId>) -> Self {
        let mut bag = Self::new(id, capacity);
        for v in vertices {
            bag.insert(v);
        }
        bag
    }

    pub fn id(&self) -> BagId {
        self.id
    }

    pub fn insert(&mut self, v: VertexId) {
        self.vertices.grow(self.vertices.len().max(v.index() + 1));
        self.vertices.insert(v.index());
    }

    pub fn contains(&self, v: VertexId) -> bool {
        self.vertices.contains(v.index())
    }

    pub fn len(&self) -> usize {
        self.vertices.count_ones(..)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn vertices(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.vertices.ones().map(VertexId::new)
    }

    pub fn bitset(&self) -> &FixedBitSet {
        &self.vertices
    }

    /// `true` iff every vertex of `other` is also in `self`.
    pub fn is_superset_of(&self, other: &Bag) -> bool {
        let mut diff = other.vertices.clone();
        diff.difference_with(&self.vertices);
        diff.count_ones(..) == 0
    }

    pub fn intersection_len(&self, other: &Bag) -> usize {
        let mut both = self.vertices.clone();
        both.intersect_with(&other.vertices);
        both.count_ones(..)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn superset_check() {
        let mut a = Bag::new(BagId::new(0), 4);
        a.insert(VertexId::new(0));
        a.insert(VertexId::new(1));
        let mut b = Bag::new(BagId::new(1), 4);
        b.insert(VertexId::new(0));
        assert!(a.is_superset_of(&b));
        assert!(!b.is_superset_of(&a));
    }

    #[test]
    fn intersection_len_counts_shared_vertices() {
        let mut a = Bag::from_vertices(BagId::new(0), 4, [VertexId::new(0), VertexId::new(1)]);
        let b = Bag::from_vertices(BagId::new(1), 4, [VertexId::new(1), VertexId::new(2)]);
        assert_eq!(a.intersection_len(&b), 1);
        a.insert(VertexId::new(2));
        assert_eq!(a.intersection_len(&b), 2);
    }
}
