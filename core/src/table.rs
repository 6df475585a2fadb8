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

//! Builds the flat table of every file and directory on the volume by
//! walking the directory tree with an explicit work queue (the original
//! walks it recursively; an explicit [`VecDeque`] makes the walk's depth
//! independent of the host's stack, per `SPEC_FULL.md` §9).

use std::collections::VecDeque;

use f32defrag_ds::BlockDevice;
use f32defrag_err::{Error, Result};
use log::trace;
use zerocopy::FromBytes;

use crate::{cluster, dirent::DirEntry, volume::Volume};

/// One file or directory discovered on the volume. Item 0 is always the
/// root directory.
#[derive(Debug, Clone)]
pub struct Item {
    /// First cluster of this item's own data/contents.
    pub start_cluster: u32,
    /// Cluster of the directory holding this item's entry. 0 for the
    /// root, which names itself.
    pub entry_cluster: u32,
    /// Index of this item's 32-byte entry within `entry_cluster`.
    pub entry_index: u32,
    pub is_dir: bool,
    /// Number of clusters in this item's chain, filled in once the chain
    /// has been walked.
    pub cluster_count: u32,
    /// Number of `next != prev + 1` transitions found while walking this
    /// item's own chain.
    pub fragments: u32,
    /// Start cluster of the directory this item's naming entry lives in
    /// (the directory's *first* cluster, not necessarily `entry_cluster`,
    /// which may be a later cluster of a multi-cluster parent). Used by
    /// the swap engine to rewrite `..` with the true parent, rather than
    /// a FAT predecessor of the entry's own cluster.
    pub parent_start: u32,
}

/// A directory still queued for a scan.
struct PendingDir {
    /// Start cluster of the directory to scan (also its own identity).
    start_cluster: u32,
}

/// Walks every directory reachable from `root_cluster` and returns one
/// [`Item`] per file, directory, and the root itself, in discovery order
/// with the root first.
pub fn build<D: BlockDevice>(volume: &mut Volume<D>, root_cluster: u32) -> Result<Vec<Item>> {
    let (cluster_count, fragments) = walk_chain(volume, root_cluster)?;
    let mut items = vec![Item {
        start_cluster: root_cluster,
        entry_cluster: 0,
        entry_index: 0,
        is_dir: true,
        cluster_count,
        fragments,
        parent_start: 0,
    }];

    let mut queue = VecDeque::new();
    queue.push_back(PendingDir {
        start_cluster: root_cluster,
    });

    while let Some(dir) = queue.pop_front() {
        scan_directory(volume, &dir, &mut items, &mut queue)?;
    }

    Ok(items)
}

fn scan_directory<D: BlockDevice>(
    volume: &mut Volume<D>,
    dir: &PendingDir,
    items: &mut Vec<Item>,
    queue: &mut VecDeque<PendingDir>,
) -> Result<()> {
    let bytes_per_cluster = volume.geometry().bytes_per_cluster() as usize;
    let entries_per_cluster = bytes_per_cluster / DirEntry::SIZE;

    let mut cluster = dir.start_cluster;
    loop {
        let mut buffer = vec![0u8; bytes_per_cluster];
        volume.read_cluster(cluster, &mut buffer)?;

        for index in 0..entries_per_cluster {
            let offset = index * DirEntry::SIZE;
            let entry = DirEntry::ref_from_bytes(&buffer[offset..offset + DirEntry::SIZE])
                .expect("slice is exactly DirEntry::SIZE bytes");

            if entry.is_free() {
                return Ok(());
            }
            if entry.is_deleted() || entry.is_long_name_slot() {
                continue;
            }
            if entry.is_dot() || entry.is_dotdot() {
                continue;
            }

            let start_cluster = entry.start_cluster();
            if start_cluster == 0 {
                continue;
            }
            trace!(
                "found entry: cluster={cluster} index={index} start_cluster={start_cluster} dir={}",
                entry.is_directory()
            );

            // Out-of-range start clusters name a corrupt entry; skipped
            // silently (neither recursed into nor added to the table)
            // rather than treated as fatal.
            if start_cluster > volume.geometry().cluster_count {
                continue;
            }

            if entry.is_directory() && start_cluster != dir.start_cluster {
                queue.push_back(PendingDir { start_cluster });
            }

            let (cluster_count, fragments) = walk_chain(volume, start_cluster)?;

            // A pathological tree can grow the table without bound; a
            // fallible reservation turns an allocator abort into a
            // reportable error instead (see `Error::OutOfMemory`).
            items
                .try_reserve(1)
                .map_err(|_| Error::OutOfMemory)?;
            items.push(Item {
                start_cluster,
                entry_cluster: cluster,
                entry_index: index as u32,
                is_dir: entry.is_directory(),
                cluster_count,
                fragments,
                parent_start: dir.start_cluster,
            });
        }

        let next = volume.next_cluster(cluster)?;
        if cluster::is_end_of_chain(next) {
            break;
        }
        cluster = next;
    }

    Ok(())
}

/// Walks a chain from its first cluster, returning its total cluster
/// count and the number of `next != prev + 1` transitions. The terminal
/// EOC cluster counts toward the total but never toward a fragment, so
/// a single-cluster file totals 2 and a 3-real-cluster chain totals 4.
fn walk_chain<D: BlockDevice>(volume: &mut Volume<D>, start: u32) -> Result<(u32, u32)> {
    let mut count = 0;
    let mut fragments = 0;
    let mut cluster = start;
    loop {
        count += 1;
        let next = volume.next_cluster(cluster)?;
        if cluster::is_end_of_chain(next) {
            count += 1;
            break;
        }
        if next != cluster + 1 {
            fragments += 1;
        }
        cluster = next;
    }
    Ok((count, fragments))
}

/// Average per-item fragmentation percentage, divided by `itemCount - 1`
/// to exclude the root from the divisor (matching the original's
/// historical behavior). A volume with only the root reports 0.0 rather
/// than dividing by zero.
pub fn fragmentation_percent(items: &[Item]) -> f64 {
    if items.len() <= 1 {
        return 0.0;
    }
    let sum: f64 = items
        .iter()
        .map(|item| {
            if item.cluster_count == 0 {
                0.0
            } else {
                item.fragments as f64 / item.cluster_count as f64 * 100.0
            }
        })
        .sum();
    sum / (items.len() - 1) as f64
}
