//! Partitions and the arena-backed, distance-ordered lists holding them.
//!
//! A partition is a depth interval along the ray bounded by two hits.
//! Partitions live in a per-ray slot-map arena and are threaded into
//! doubly linked lists (the pending input list and the final output
//! list) by id, so splitting, moving and freeing them never touches the
//! allocator in the hot loop beyond the arena's own free list.

use std::fmt::Write as _;

use slotmap::{new_key_type, SlotMap};

use crate::model::{Model, RegionId};
use crate::ray::{HitRef, SegmentId, SegmentStore};

new_key_type! {
    /// Handle of a partition in a [`PartitionArena`].
    pub struct PartitionId;
}

/// A depth interval along the ray.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    /// Entry boundary.
    pub in_hit: HitRef,
    /// Exit boundary.
    pub out_hit: HitRef,
    /// Entry boundary is really an exit hit; its normal must be flipped.
    pub in_flip: bool,
    /// Exit boundary is really an entry hit; its normal must be flipped.
    pub out_flip: bool,
    /// Owning region, once finalized.
    pub region: Option<RegionId>,
    /// Every region that claimed this interval, when it was ambiguous.
    pub overlap_regions: Option<Vec<RegionId>>,
    segs: Vec<SegmentId>,
    prev: Option<PartitionId>,
    next: Option<PartitionId>,
}

impl Partition {
    /// Partition spanning exactly one segment.
    pub fn from_segment(seg: SegmentId) -> Self {
        Self {
            in_hit: HitRef::entry(seg),
            out_hit: HitRef::exit(seg),
            in_flip: false,
            out_flip: false,
            region: None,
            overlap_regions: None,
            segs: vec![seg],
            prev: None,
            next: None,
        }
    }

    /// Unlinked copy: same bounds, flips, region and segments, no
    /// overlap snapshot.
    pub fn duplicate(&self) -> Self {
        Self {
            overlap_regions: None,
            prev: None,
            next: None,
            ..self.clone()
        }
    }

    /// Segment providing the entry boundary.
    #[inline]
    pub fn in_seg(&self) -> SegmentId {
        self.in_hit.seg
    }

    /// Segment providing the exit boundary.
    #[inline]
    pub fn out_seg(&self) -> SegmentId {
        self.out_hit.seg
    }

    /// Every segment that contributed to this interval.
    #[inline]
    pub fn segments(&self) -> &[SegmentId] {
        &self.segs
    }

    /// Record a contributing segment. Returns false if already present.
    pub fn add_segment(&mut self, seg: SegmentId) -> bool {
        if self.segs.contains(&seg) {
            false
        } else {
            self.segs.push(seg);
            true
        }
    }

    /// Entry distance.
    #[inline]
    pub fn in_dist(&self, segs: &SegmentStore) -> f64 {
        segs.dist(self.in_hit)
    }

    /// Exit distance.
    #[inline]
    pub fn out_dist(&self, segs: &SegmentStore) -> f64 {
        segs.dist(self.out_hit)
    }

    /// Previous partition on the same list.
    #[inline]
    pub fn prev(&self) -> Option<PartitionId> {
        self.prev
    }

    /// Next partition on the same list.
    #[inline]
    pub fn next(&self) -> Option<PartitionId> {
        self.next
    }
}

/// Head and tail of one distance-ordered list threaded through a
/// [`PartitionArena`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartitionList {
    head: Option<PartitionId>,
    tail: Option<PartitionId>,
    len: usize,
}

impl PartitionList {
    /// Empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// First partition.
    #[inline]
    pub fn first(&self) -> Option<PartitionId> {
        self.head
    }

    /// Last partition.
    #[inline]
    pub fn last(&self) -> Option<PartitionId> {
        self.tail
    }

    /// Number of partitions on the list.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the list holds nothing.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }
}

/// Per-ray partition storage.
#[derive(Debug, Default, Clone)]
pub struct PartitionArena {
    parts: SlotMap<PartitionId, Partition>,
}

impl PartitionArena {
    /// Empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an unlinked partition.
    pub fn alloc(&mut self, part: Partition) -> PartitionId {
        self.parts.insert(part)
    }

    /// Release an unlinked partition.
    pub fn free(&mut self, id: PartitionId) {
        self.parts.remove(id);
    }

    /// Partition by id.
    #[inline]
    pub fn get(&self, id: PartitionId) -> &Partition {
        &self.parts[id]
    }

    /// Mutable partition by id.
    #[inline]
    pub fn get_mut(&mut self, id: PartitionId) -> &mut Partition {
        &mut self.parts[id]
    }

    /// Live partitions across all lists.
    pub fn live(&self) -> usize {
        self.parts.len()
    }

    /// Drop everything, keeping the allocation.
    pub fn clear(&mut self) {
        self.parts.clear();
    }

    /// Append `id` at the end of `list`.
    pub fn push_back(&mut self, list: &mut PartitionList, id: PartitionId) {
        match list.tail {
            Some(tail) => self.insert_after(list, id, tail),
            None => {
                let p = &mut self.parts[id];
                p.prev = None;
                p.next = None;
                list.head = Some(id);
                list.tail = Some(id);
                list.len = 1;
            }
        }
    }

    /// Prepend `id` at the start of `list`.
    pub fn push_front(&mut self, list: &mut PartitionList, id: PartitionId) {
        match list.head {
            Some(head) => self.insert_before(list, id, head),
            None => self.push_back(list, id),
        }
    }

    /// Link `id` immediately before `at`.
    pub fn insert_before(&mut self, list: &mut PartitionList, id: PartitionId, at: PartitionId) {
        let prev = self.parts[at].prev;
        {
            let p = &mut self.parts[id];
            p.prev = prev;
            p.next = Some(at);
        }
        self.parts[at].prev = Some(id);
        match prev {
            Some(prev) => self.parts[prev].next = Some(id),
            None => list.head = Some(id),
        }
        list.len += 1;
    }

    /// Link `id` immediately after `at`.
    pub fn insert_after(&mut self, list: &mut PartitionList, id: PartitionId, at: PartitionId) {
        let next = self.parts[at].next;
        {
            let p = &mut self.parts[id];
            p.prev = Some(at);
            p.next = next;
        }
        self.parts[at].next = Some(id);
        match next {
            Some(next) => self.parts[next].prev = Some(id),
            None => list.tail = Some(id),
        }
        list.len += 1;
    }

    /// Unlink `id` from `list`, leaving it allocated.
    pub fn unlink(&mut self, list: &mut PartitionList, id: PartitionId) {
        let (prev, next) = {
            let p = &mut self.parts[id];
            (p.prev.take(), p.next.take())
        };
        match prev {
            Some(prev) => self.parts[prev].next = next,
            None => list.head = next,
        }
        match next {
            Some(next) => self.parts[next].prev = prev,
            None => list.tail = prev,
        }
        list.len -= 1;
    }

    /// Unlink and free `id`.
    pub fn remove(&mut self, list: &mut PartitionList, id: PartitionId) {
        self.unlink(list, id);
        self.free(id);
    }

    /// Free every partition on `list` and empty it.
    pub fn free_list(&mut self, list: &mut PartitionList) {
        let mut cur = list.head;
        while let Some(id) = cur {
            cur = self.parts[id].next;
            self.free(id);
        }
        *list = PartitionList::new();
    }

    /// Ids of `list` in distance order.
    pub fn iter<'a>(&'a self, list: &PartitionList) -> ListIter<'a> {
        ListIter {
            arena: self,
            cur: list.head,
        }
    }
}

impl std::ops::Index<PartitionId> for PartitionArena {
    type Output = Partition;

    fn index(&self, id: PartitionId) -> &Partition {
        &self.parts[id]
    }
}

impl std::ops::IndexMut<PartitionId> for PartitionArena {
    fn index_mut(&mut self, id: PartitionId) -> &mut Partition {
        &mut self.parts[id]
    }
}

/// Iterator over the ids of a [`PartitionList`].
pub struct ListIter<'a> {
    arena: &'a PartitionArena,
    cur: Option<PartitionId>,
}

impl Iterator for ListIter<'_> {
    type Item = PartitionId;

    fn next(&mut self) -> Option<PartitionId> {
        let id = self.cur?;
        self.cur = self.arena.parts[id].next;
        Some(id)
    }
}

/// Render a partition list, one line per partition.
///
/// Used for trace logging and assertion messages.
pub fn describe_partitions(
    model: &Model,
    segs: &SegmentStore,
    arena: &PartitionArena,
    list: &PartitionList,
    title: &str,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "------ {} ({} partitions)", title, list.len());
    for id in arena.iter(list) {
        let p = &arena[id];
        let _ = write!(
            out,
            "  {}({:.6}, {:.6}){}",
            if p.in_flip { "!" } else { "" },
            p.in_dist(segs),
            p.out_dist(segs),
            if p.out_flip { "!" } else { "" },
        );
        let names: Vec<&str> = p
            .segments()
            .iter()
            .map(|&s| model.solid(segs.solid(s)).name.as_str())
            .collect();
        let _ = write!(out, " solids=[{}]", names.join(", "));
        match p.region {
            Some(r) => {
                let _ = write!(out, " region={}", model.region(r).name);
            }
            None => {
                let _ = write!(out, " region=<none>");
            }
        }
        if let Some(over) = &p.overlap_regions {
            let names: Vec<&str> = over.iter().map(|&r| model.region(r).name.as_str()).collect();
            let _ = write!(out, " overlap=[{}]", names.join(", "));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SolidId;
    use crate::ray::Segment;

    fn setup(n: usize) -> (SegmentStore, PartitionArena, PartitionList, Vec<PartitionId>) {
        let mut segs = SegmentStore::new();
        let mut arena = PartitionArena::new();
        let mut list = PartitionList::new();
        let mut ids = Vec::new();
        for i in 0..n {
            let s = segs.insert(Segment::new(SolidId(0), i as f64, i as f64 + 0.5));
            let id = arena.alloc(Partition::from_segment(s));
            arena.push_back(&mut list, id);
            ids.push(id);
        }
        (segs, arena, list, ids)
    }

    #[test]
    fn test_push_and_iterate() {
        let (segs, arena, list, ids) = setup(3);
        assert_eq!(list.len(), 3);
        assert_eq!(arena.iter(&list).collect::<Vec<_>>(), ids);
        assert_eq!(arena[ids[0]].in_dist(&segs), 0.0);
        assert_eq!(arena[ids[2]].out_dist(&segs), 2.5);
        assert_eq!(arena[ids[1]].prev(), Some(ids[0]));
        assert_eq!(arena[ids[1]].next(), Some(ids[2]));
    }

    #[test]
    fn test_insert_before_and_after() {
        let (mut segs, mut arena, mut list, ids) = setup(2);
        let s = segs.insert(Segment::new(SolidId(0), -1.0, -0.5));
        let front = arena.alloc(Partition::from_segment(s));
        arena.insert_before(&mut list, front, ids[0]);
        assert_eq!(list.first(), Some(front));

        let s = segs.insert(Segment::new(SolidId(0), 0.6, 0.7));
        let mid = arena.alloc(Partition::from_segment(s));
        arena.insert_after(&mut list, mid, ids[0]);

        let order: Vec<_> = arena.iter(&list).collect();
        assert_eq!(order, vec![front, ids[0], mid, ids[1]]);
        assert_eq!(list.last(), Some(ids[1]));
        assert_eq!(list.len(), 4);
    }

    #[test]
    fn test_unlink_and_move_between_lists() {
        let (_segs, mut arena, mut input, ids) = setup(3);
        let mut output = PartitionList::new();

        arena.unlink(&mut input, ids[1]);
        arena.push_back(&mut output, ids[1]);
        assert_eq!(arena.iter(&input).collect::<Vec<_>>(), vec![ids[0], ids[2]]);
        assert_eq!(arena.iter(&output).collect::<Vec<_>>(), vec![ids[1]]);
        assert_eq!(arena[ids[2]].prev(), Some(ids[0]));

        arena.remove(&mut input, ids[0]);
        arena.remove(&mut input, ids[2]);
        assert!(input.is_empty());
        assert_eq!(input.last(), None);
        assert_eq!(arena.live(), 1);

        arena.free_list(&mut output);
        assert_eq!(arena.live(), 0);
        assert!(output.is_empty());
    }

    #[test]
    fn test_segments_are_a_set() {
        let (_segs, mut arena, _list, ids) = setup(2);
        let other = arena[ids[1]].in_seg();
        let p = &mut arena[ids[0]];
        assert!(p.add_segment(other));
        assert!(!p.add_segment(other));
        assert_eq!(p.segments().len(), 2);

        let dup = p.duplicate();
        assert_eq!(dup.segments(), p.segments());
        assert_eq!(dup.prev(), None);
    }
}
