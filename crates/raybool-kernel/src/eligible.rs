//! Eligibility of partitions whose exit may still move.

use crate::bits::SolidBits;
use crate::model::Model;
use crate::regiontable::RegionTable;

/// True when every solid of every candidate region has been shot, so
/// the partition can be evaluated before traversal is complete.
pub fn partition_eligible(model: &Model, table: &RegionTable, solids_shot: &SolidBits) -> bool {
    table
        .as_slice()
        .iter()
        .all(|&r| model.region(r).tree.all_solids_shot(solids_shot))
}
