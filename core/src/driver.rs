// Copyright 2024 Kevin Ludwig
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The outer defragmentation driver: walks the item table produced by
//! [`crate::table`] and calls the swap engine to pack each chain toward
//! the low end of the data area.

use f32defrag_ds::BlockDevice;
use f32defrag_err::Result;
use log::{debug, info};

use crate::{cluster, swap, table, volume::Volume};

/// Runs analysis only: builds the item table and reports the volume's
/// fragmentation percentage without mutating anything.
pub fn analyze<D: BlockDevice>(volume: &mut Volume<D>) -> Result<AnalysisReport> {
    let root = volume.root_cluster();
    volume.build_predecessor_index()?;
    let items = table::build(volume, root)?;
    let percent = table::fragmentation_percent(&items);
    Ok(AnalysisReport {
        item_count: items.len(),
        fragmentation_percent: percent,
    })
}

#[derive(Debug, Clone, Copy)]
pub struct AnalysisReport {
    pub item_count: usize,
    pub fragmentation_percent: f64,
}

/// Analyzes, then defragments if the rounded fragmentation percentage is
/// at least 1%. `progress` is called once per cluster touched (chain
/// walk or placement), mirroring the original's progress-bar driver.
pub fn defragment<D: BlockDevice>(
    volume: &mut Volume<D>,
    mut progress: impl FnMut(u64),
) -> Result<AnalysisReport> {
    let root = volume.root_cluster();
    volume.build_predecessor_index()?;
    let mut items = table::build(volume, root)?;
    let before = table::fragmentation_percent(&items);

    info!("fragmentation before defragmentation: {before:.2}%");
    if before.round() < 1.0 {
        debug!("fragmentation below threshold, skipping defragmentation");
        return Ok(AnalysisReport {
            item_count: items.len(),
            fragmentation_percent: before,
        });
    }

    let cluster_count = volume.geometry().cluster_count;
    let mut next_free_target: u32 = 2;

    for index in 0..items.len() {
        let start = items[index].start_cluster;
        if start < cluster::FIRST_DATA_CLUSTER {
            continue;
        }

        let placed = optimize_start(volume, &mut items, index, next_free_target, cluster_count)?;
        progress(1);
        if placed > next_free_target {
            next_free_target = placed;
        }

        let chain_end = linearize_chain(volume, &mut items, index, cluster_count, &mut progress)?;
        next_free_target = next_free_target.max(chain_end);
    }

    let after = table::fragmentation_percent(&items);
    info!("fragmentation after defragmentation: {after:.2}%");

    Ok(AnalysisReport {
        item_count: items.len(),
        fragmentation_percent: after,
    })
}

/// Scans forward from `next_free_target` for the first usable cluster
/// and, if it is lower-numbered than the item's current start, swaps
/// the item down to it. Returns the cluster examined (the new start if
/// a swap happened, otherwise the original).
fn optimize_start<D: BlockDevice>(
    volume: &mut Volume<D>,
    items: &mut [table::Item],
    index: usize,
    next_free_target: u32,
    cluster_count: u32,
) -> Result<u32> {
    let mut candidate = next_free_target;
    while candidate <= cluster_count {
        let value = volume.read_fat(candidate)?;
        if cluster::is_usable(value, candidate, cluster_count) {
            break;
        }
        candidate += 1;
    }

    let start = items[index].start_cluster;
    if candidate < start {
        swap::swap_clusters(volume, items, start, candidate)?;
    }
    Ok(candidate)
}

/// Walks the (possibly relocated) chain for `items[index]`, swapping any
/// out-of-place successor down to the first usable cluster at or past
/// `prev + 1`. Returns the chain's terminal cluster (the last one before
/// the EOC marker), mirroring `def_defragFile`'s return value, so the
/// caller can advance its placement origin past every cluster this item
/// now occupies rather than just past its start.
fn linearize_chain<D: BlockDevice>(
    volume: &mut Volume<D>,
    items: &mut [table::Item],
    index: usize,
    cluster_count: u32,
    progress: &mut impl FnMut(u64),
) -> Result<u32> {
    let mut prev = items[index].start_cluster;

    loop {
        let mut next = volume.next_cluster(prev)?;
        progress(1);

        if cluster::is_free(next)
            || cluster::is_reserved(next)
            || cluster::is_bad(next)
            || cluster::is_end_of_chain(next)
            || next > cluster_count + 1
        {
            break;
        }

        if next != prev + 1 {
            let mut target = prev + 1;
            while target <= cluster_count {
                let value = volume.read_fat(target)?;
                if cluster::is_usable(value, target, cluster_count) {
                    break;
                }
                target += 1;
            }
            if next > target {
                swap::swap_clusters(volume, items, next, target)?;
                next = target;
            }
        }

        prev = next;
    }

    Ok(prev)
}
