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

//! The cluster-swap engine: transforms the volume so every logical
//! identity bound to cluster `a` becomes bound to `b` and vice versa,
//! preserving every invariant in the data model.

use f32defrag_ds::BlockDevice;
use f32defrag_err::Result;
use log::trace;
use zerocopy::{FromBytes, IntoBytes};

use crate::{cluster, dirent::DirEntry, table::Item, volume::Volume};

/// Swaps the logical identities of clusters `a` and `b`. A no-op if they
/// are equal. See the module-level algorithm outline; the ten steps
/// below are numbered to match it.
pub fn swap_clusters<D: BlockDevice>(
    volume: &mut Volume<D>,
    items: &mut [Item],
    a: u32,
    b: u32,
) -> Result<()> {
    // 1. Early exit.
    if a == b {
        return Ok(());
    }
    trace!("swap_clusters(a={a}, b={b})");

    // 2. Determine which side (if either) is a starting cluster.
    let starting_a = items.iter().position(|item| item.start_cluster == a);
    let starting_b = items.iter().position(|item| item.start_cluster == b);

    // 3. Parent-directory-entry (or BPB) rewrite for each starting side.
    if let Some(idx) = starting_a {
        rewrite_naming_slot(volume, &items[idx], b)?;
    }
    if let Some(idx) = starting_b {
        rewrite_naming_slot(volume, &items[idx], a)?;
    }

    // 4. Read current FAT values.
    let val_a = volume.read_fat(a)?;
    let val_b = volume.read_fat(b)?;

    // 5. Predecessor rewiring for non-starting clusters. A well-formed
    // FAT never has a cluster pointing at 0, so "not starting" alone is
    // the correct guard (see the open question on this in the design
    // notes: the value-not-zero check some revisions add is redundant).
    // When a and b are chain-adjacent, one's predecessor *is* the other;
    // that case is left for step 6's cycle-guarded FAT swap to resolve,
    // not rewired here (rewiring it here would race step 6 and produce
    // the self-loop the guard exists to avoid).
    let pred_a = volume.predecessor_of(a);
    let pred_b = volume.predecessor_of(b);
    if starting_a.is_none() && pred_a != 0 && pred_a != b {
        volume.write_fat(pred_a, b)?;
        volume.set_predecessor(b, pred_a);
        volume.set_predecessor(a, 0);
    }
    if starting_b.is_none() && pred_b != 0 && pred_b != a {
        volume.write_fat(pred_b, a)?;
        volume.set_predecessor(a, pred_b);
        volume.set_predecessor(b, 0);
    }

    // 6. FAT-value swap with adjacency cycle guard.
    let (new_a, new_b) = if val_a == b {
        (val_b, a)
    } else if val_b == a {
        (b, val_a)
    } else {
        (val_b, val_a)
    };
    volume.write_fat(a, new_a)?;
    volume.write_fat(b, new_b)?;

    // `a` no longer points at `val_a`, and `b` no longer points at
    // `val_b` (unless the adjacency guard above redirected one of them
    // to the other's old target instead). Clear whichever of those old
    // targets didn't end up re-claimed by `new_a`/`new_b`, or its
    // recorded predecessor goes stale and corrupts a later swap.
    let limit = volume.geometry().cluster_count + 1;
    let in_range = |c: u32| (cluster::FIRST_DATA_CLUSTER..=limit).contains(&c);
    if in_range(val_a) && val_a != new_a && val_a != new_b && volume.predecessor_of(val_a) == a {
        volume.set_predecessor(val_a, 0);
    }
    if in_range(val_b) && val_b != new_a && val_b != new_b && volume.predecessor_of(val_b) == b {
        volume.set_predecessor(val_b, 0);
    }

    // Whichever cluster `a` and `b` now point at has its predecessor
    // updated to match, regardless of which branch above fired.
    if in_range(new_a) {
        volume.set_predecessor(new_a, a);
    }
    if in_range(new_b) {
        volume.set_predecessor(new_b, b);
    }

    // 7. Update startCluster in the table for any starting cluster moved.
    if let Some(idx) = starting_a {
        items[idx].start_cluster = b;
    }
    if let Some(idx) = starting_b {
        items[idx].start_cluster = a;
    }

    // 8. Exchange entryCluster for every row naming a slot inside a or b.
    for item in items.iter_mut() {
        if item.entry_cluster == a {
            item.entry_cluster = b;
        } else if item.entry_cluster == b {
            item.entry_cluster = a;
        }
        if item.parent_start == a {
            item.parent_start = b;
        } else if item.parent_start == b {
            item.parent_start = a;
        }
    }

    // 9. Physically swap the data.
    let bytes_per_cluster = volume.geometry().bytes_per_cluster() as usize;
    let mut buf_a = vec![0u8; bytes_per_cluster];
    let mut buf_b = vec![0u8; bytes_per_cluster];
    volume.read_cluster(a, &mut buf_a)?;
    volume.read_cluster(b, &mut buf_b)?;
    volume.write_cluster(a, &buf_b)?;
    volume.write_cluster(b, &buf_a)?;

    // 10. `.`/`..` fixup for any directory that moved.
    if let Some(idx) = starting_a {
        if items[idx].is_dir {
            fixup_directory(volume, b)?;
        }
    }
    if let Some(idx) = starting_b {
        if items[idx].is_dir {
            fixup_directory(volume, a)?;
        }
    }

    Ok(())
}

/// Points the naming slot that identifies `item` at `new_cluster`: the
/// BPB's root cluster for the root, otherwise the parent directory
/// entry's start-cluster field.
fn rewrite_naming_slot<D: BlockDevice>(
    volume: &mut Volume<D>,
    item: &Item,
    new_cluster: u32,
) -> Result<()> {
    if item.entry_cluster == 0 {
        volume.set_root_cluster(new_cluster)?;
        return Ok(());
    }

    let bytes_per_cluster = volume.geometry().bytes_per_cluster() as usize;
    let mut buffer = vec![0u8; bytes_per_cluster];
    volume.read_cluster(item.entry_cluster, &mut buffer)?;

    let offset = item.entry_index as usize * DirEntry::SIZE;
    let entry = DirEntry::mut_from_bytes(&mut buffer[offset..offset + DirEntry::SIZE])
        .expect("slice is exactly DirEntry::SIZE bytes");
    entry.set_start_cluster(new_cluster);

    volume.write_cluster(item.entry_cluster, &buffer)
}

/// After a directory's data has physically moved to `new_start`, fixes
/// its own `.`/`..` entries and every live child's `..` back-pointer.
/// Walked across the directory's whole chain, since a subdirectory entry
/// (and, in principle, `.`/`..` themselves) may live in any cluster of a
/// multi-cluster directory.
fn fixup_directory<D: BlockDevice>(volume: &mut Volume<D>, new_start: u32) -> Result<()> {
    let bytes_per_cluster = volume.geometry().bytes_per_cluster() as usize;
    let entries_per_cluster = bytes_per_cluster / DirEntry::SIZE;

    let mut cluster = new_start;
    loop {
        let mut buffer = vec![0u8; bytes_per_cluster];
        volume.read_cluster(cluster, &mut buffer)?;
        let mut dirty = false;

        for index in 0..entries_per_cluster {
            let offset = index * DirEntry::SIZE;
            let entry = DirEntry::ref_from_bytes(&buffer[offset..offset + DirEntry::SIZE])
                .expect("slice is exactly DirEntry::SIZE bytes")
                .clone();

            if entry.is_free() {
                break;
            }
            if entry.is_deleted() || entry.is_long_name_slot() {
                continue;
            }

            if entry.is_dot() {
                let slot = DirEntry::mut_from_bytes(&mut buffer[offset..offset + DirEntry::SIZE])
                    .expect("slice is exactly DirEntry::SIZE bytes");
                slot.set_start_cluster(new_start);
                dirty = true;
                continue;
            }

            if entry.is_dotdot() {
                // `..`'s value is set by the caller's own fixup of *its*
                // parent; this cluster's `..` is fixed when its owning
                // directory (not this one) is the one that moved. Nothing
                // to do here for this directory's own `..` entry.
                continue;
            }

            if entry.is_directory() {
                let child_start = entry.start_cluster();
                if child_start >= cluster::FIRST_DATA_CLUSTER {
                    fixup_child_dotdot(volume, child_start, new_start)?;
                }
            }
        }

        if dirty {
            volume.write_cluster(cluster, &buffer)?;
        }

        let next = volume.next_cluster(cluster)?;
        if cluster::is_end_of_chain(next) {
            break;
        }
        cluster = next;
    }

    Ok(())
}

/// Rewrites the `..` entry in `child_start`'s first cluster to point at
/// `new_parent`.
fn fixup_child_dotdot<D: BlockDevice>(
    volume: &mut Volume<D>,
    child_start: u32,
    new_parent: u32,
) -> Result<()> {
    let bytes_per_cluster = volume.geometry().bytes_per_cluster() as usize;
    let mut buffer = vec![0u8; bytes_per_cluster];
    volume.read_cluster(child_start, &mut buffer)?;

    let entries_per_cluster = bytes_per_cluster / DirEntry::SIZE;
    for index in 0..entries_per_cluster {
        let offset = index * DirEntry::SIZE;
        let entry = DirEntry::ref_from_bytes(&buffer[offset..offset + DirEntry::SIZE])
            .expect("slice is exactly DirEntry::SIZE bytes");
        if entry.is_dotdot() {
            let slot = DirEntry::mut_from_bytes(&mut buffer[offset..offset + DirEntry::SIZE])
                .expect("slice is exactly DirEntry::SIZE bytes");
            slot.set_start_cluster(new_parent);
            volume.write_cluster(child_start, &buffer)?;
            return Ok(());
        }
        if entry.is_free() {
            break;
        }
    }
    Ok(())
}
