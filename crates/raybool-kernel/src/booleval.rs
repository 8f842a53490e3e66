//! Non-recursive evaluation of a region's Boolean formula over one
//! partition.
//!
//! The evaluator descends left children, pushing one frame per pending
//! operator, and rewrites the top of the stack as results come back.
//! UNION and INTERSECT short-circuit. A right operand replaces the
//! popped frame, so a right-leaning chain runs in constant stack depth
//! while a left-leaning one needs a frame per level.

use crate::partition::Partition;
use crate::ray::SegmentStore;
use crate::tree::{NodeIndex, RegionTree, TreeNode};

/// Result of evaluating a region over a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolValue {
    /// The region is absent.
    False,
    /// The region is present.
    True,
    /// Both operands of an XOR were present: an ambiguity, not a value.
    Guard,
}

impl BoolValue {
    /// True for [`BoolValue::True`].
    #[inline]
    pub fn is_true(self) -> bool {
        self == BoolValue::True
    }
}

#[derive(Debug, Clone, Copy)]
enum Frame {
    Top,
    Union(NodeIndex),
    Intersect(NodeIndex),
    Subtract(NodeIndex),
    Xor(NodeIndex),
    Not,
    Guard,
    Xnop,
}

/// Growable evaluation stack, reused across partitions and rays.
#[derive(Debug, Clone)]
pub struct BoolStack {
    frames: Vec<Frame>,
}

impl BoolStack {
    const INITIAL: usize = 128;

    /// Stack with the default initial capacity.
    pub fn new() -> Self {
        Self {
            frames: Vec::with_capacity(Self::INITIAL),
        }
    }

    /// Current capacity; grows geometrically on demand.
    pub fn capacity(&self) -> usize {
        self.frames.capacity()
    }
}

impl Default for BoolStack {
    fn default() -> Self {
        Self::new()
    }
}

/// Evaluate `tree` over `part`.
///
/// A solid leaf is true when any contributing segment of the partition
/// belongs to it. `Nop` is false.
pub fn booleval(
    tree: &RegionTree,
    part: &Partition,
    segs: &SegmentStore,
    stack: &mut BoolStack,
) -> BoolValue {
    let frames = &mut stack.frames;
    frames.clear();
    frames.push(Frame::Top);

    let mut node = tree.root();
    loop {
        // Descend to a leaf.
        let mut ret = loop {
            match tree.node(node) {
                TreeNode::Nop => break false,
                TreeNode::Solid(s) => {
                    break part.segments().iter().any(|&id| segs.solid(id) == s);
                }
                TreeNode::Not(child) => {
                    frames.push(Frame::Not);
                    node = child;
                }
                TreeNode::Union(l, r) => {
                    frames.push(Frame::Union(r));
                    node = l;
                }
                TreeNode::Intersect(l, r) => {
                    frames.push(Frame::Intersect(r));
                    node = l;
                }
                TreeNode::Subtract(l, r) => {
                    frames.push(Frame::Subtract(r));
                    node = l;
                }
                TreeNode::Xor(l, r) => {
                    frames.push(Frame::Xor(r));
                    node = l;
                }
            }
        };

        // Unwind until an operator needs its right side.
        loop {
            match frames.pop().unwrap_or(Frame::Top) {
                Frame::Top => {
                    return if ret { BoolValue::True } else { BoolValue::False };
                }
                Frame::Not => ret = !ret,
                Frame::Union(r) => {
                    if !ret {
                        node = r;
                        break;
                    }
                }
                Frame::Intersect(r) => {
                    if ret {
                        node = r;
                        break;
                    }
                }
                Frame::Subtract(r) => {
                    if ret {
                        frames.push(Frame::Not);
                        node = r;
                        break;
                    }
                }
                Frame::Xor(r) => {
                    frames.push(if ret { Frame::Guard } else { Frame::Xnop });
                    node = r;
                    break;
                }
                Frame::Guard => {
                    if ret {
                        return BoolValue::Guard;
                    }
                    ret = true;
                }
                Frame::Xnop => {}
            }
        }
    }
}
