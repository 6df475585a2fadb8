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

//! The mounted FAT32 volume: BPB, derived geometry, and the one-sector
//! FAT cache, all owned by a single value (per the redesign note in
//! `SPEC_FULL.md` §4.2 — no process-global state).

use f32defrag_ds::BlockDevice;
use f32defrag_err::{Error, Result};
use log::debug;
use zerocopy::{FromBytes, IntoBytes};

use crate::{bpb::Bpb, cluster, geometry::Geometry};

/// A single cached FAT sector. Reading replaces it outright; every write
/// is flushed immediately (no deferred write-back).
struct FatCache {
    lba: Option<u64>,
    sector: Vec<u8>,
}

impl FatCache {
    fn new(bytes_per_sector: u32) -> Self {
        Self {
            lba: None,
            sector: vec![0; bytes_per_sector as usize],
        }
    }

    fn entry(&self, index: u32) -> u32 {
        let offset = index as usize * 4;
        u32::from_le_bytes(self.sector[offset..offset + 4].try_into().unwrap())
    }

    fn set_entry(&mut self, index: u32, value: u32) {
        let offset = index as usize * 4;
        self.sector[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }
}

pub struct Volume<D: BlockDevice> {
    device: D,
    bpb: Bpb,
    geometry: Geometry,
    fat_cache: FatCache,
    /// `predecessor[c]` is the cluster whose FAT entry points at `c`, or 0
    /// if none does. Built once by [`Self::build_predecessor_index`] and
    /// kept current by the swap engine, replacing the linear FAT scan the
    /// original performs on every predecessor lookup.
    predecessor: Vec<u32>,
}

impl<D: BlockDevice> Volume<D> {
    /// Reads the BPB from LBA 0, validates it is FAT32, and derives
    /// geometry. Fails closed with [`Error::WrongFilesystem`] on any
    /// other label.
    pub fn mount(device: D) -> Result<Self> {
        let mut raw = [0u8; Bpb::SIZE];
        let read = device.read_sectors(0, &mut raw, 1, Bpb::SIZE as u32)?;
        if read != 1 {
            return Err(Error::IoFailure {
                lba: 0,
                reason: std::io::Error::from(std::io::ErrorKind::UnexpectedEof),
            });
        }
        let bpb = Bpb::read_from_bytes(&raw)
            .map_err(|_| Error::BadArguments("malformed boot sector".into()))?;

        let geometry = Geometry::from_bpb(&bpb)?;

        debug!(
            "mounted FAT32 volume: bytes_per_sector={} sectors_per_cluster={} \
             fat_start=0x{:x} fat_size={} first_data_sector=0x{:x} cluster_count={} \
             mirroring={} root_cluster={}",
            geometry.bytes_per_sector,
            geometry.sectors_per_cluster,
            geometry.fat_start,
            geometry.fat_size,
            geometry.first_data_sector,
            geometry.cluster_count,
            geometry.fat_mirroring,
            bpb.root_cluster(),
        );

        let fat_cache = FatCache::new(geometry.bytes_per_sector);

        Ok(Self {
            device,
            bpb,
            geometry,
            fat_cache,
            predecessor: Vec::new(),
        })
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Scans every FAT entry once and records each cluster's predecessor.
    /// Must be called after mount and before the swap engine relies on
    /// [`Self::predecessor_of`].
    pub fn build_predecessor_index(&mut self) -> Result<()> {
        let limit = self.geometry.cluster_count + 1;
        let mut predecessor = vec![0u32; limit as usize + 1];
        for c in cluster::FIRST_DATA_CLUSTER..=limit {
            let value = self.read_fat(c)?;
            if (cluster::FIRST_DATA_CLUSTER..=limit).contains(&value) {
                predecessor[value as usize] = c;
            }
        }
        self.predecessor = predecessor;
        Ok(())
    }

    /// The cluster whose FAT entry points at `cluster`, or 0 if none does
    /// (a well-formed FAT never legitimately points at 0, so 0 doubles as
    /// "no predecessor recorded").
    pub fn predecessor_of(&self, cluster: u32) -> u32 {
        self.predecessor.get(cluster as usize).copied().unwrap_or(0)
    }

    pub fn set_predecessor(&mut self, cluster: u32, value: u32) {
        if let Some(slot) = self.predecessor.get_mut(cluster as usize) {
            *slot = value;
        }
    }

    pub fn root_cluster(&self) -> u32 {
        self.bpb.root_cluster()
    }

    /// Rewrites the BPB's root cluster and persists sector 0. Used only
    /// when the swap engine relocates the cluster currently holding the
    /// root directory.
    pub fn set_root_cluster(&mut self, cluster: u32) -> Result<()> {
        self.bpb.set_root_cluster(cluster);
        self.device
            .write_sectors(0, self.bpb.as_bytes(), 1, Bpb::SIZE as u32)?;
        Ok(())
    }

    fn load_fat_sector(&mut self, lba: u64) -> Result<()> {
        if self.fat_cache.lba != Some(lba) {
            let bps = self.geometry.bytes_per_sector;
            let read = self
                .device
                .read_sectors(lba, &mut self.fat_cache.sector, 1, bps)?;
            if read != 1 {
                return Err(Error::IoFailure {
                    lba,
                    reason: std::io::Error::from(std::io::ErrorKind::UnexpectedEof),
                });
            }
            self.fat_cache.lba = Some(lba);
        }
        Ok(())
    }

    /// Reads the 28-bit value of `cluster`'s FAT entry.
    pub fn read_fat(&mut self, cluster: u32) -> Result<u32> {
        let (lba, index) = self.geometry.fat_location(cluster)?;
        self.load_fat_sector(lba)?;
        Ok(self.fat_cache.entry(index) & cluster::ENTRY_MASK)
    }

    /// Writes `value`'s low 28 bits into `cluster`'s FAT entry, preserving
    /// the top four (reserved) bits of whatever was there before, then
    /// flushes the sector to every FAT copy when mirroring is enabled.
    pub fn write_fat(&mut self, cluster: u32, value: u32) -> Result<()> {
        let (lba, index) = self.geometry.fat_location(cluster)?;
        self.load_fat_sector(lba)?;
        let old = self.fat_cache.entry(index);
        let new = (old & !cluster::ENTRY_MASK) | (value & cluster::ENTRY_MASK);
        self.fat_cache.set_entry(index, new);

        let bps = self.geometry.bytes_per_sector;
        self.device.write_sectors(lba, &self.fat_cache.sector, 1, bps)?;

        if self.geometry.fat_mirroring {
            for copy in 1..self.geometry.num_fats as u64 {
                let mirror_lba = lba + copy * self.geometry.fat_size as u64;
                self.device
                    .write_sectors(mirror_lba, &self.fat_cache.sector, 1, bps)?;
            }
        }
        Ok(())
    }

    /// Follows one link in a cluster chain.
    pub fn next_cluster(&mut self, cluster: u32) -> Result<u32> {
        self.read_fat(cluster)
    }

    pub fn read_cluster(&self, cluster: u32, buffer: &mut [u8]) -> Result<()> {
        if cluster > self.geometry.cluster_count {
            return Err(Error::OutOfRangeCluster {
                cluster,
                limit: self.geometry.cluster_count,
            });
        }
        let lba = self.geometry.cluster_to_lba(cluster);
        let spc = self.geometry.sectors_per_cluster;
        let read = self
            .device
            .read_sectors(lba, buffer, spc, self.geometry.bytes_per_sector)?;
        if read != spc {
            return Err(Error::IoFailure {
                lba,
                reason: std::io::Error::from(std::io::ErrorKind::UnexpectedEof),
            });
        }
        Ok(())
    }

    pub fn write_cluster(&self, cluster: u32, buffer: &[u8]) -> Result<()> {
        if cluster > self.geometry.cluster_count {
            return Err(Error::OutOfRangeCluster {
                cluster,
                limit: self.geometry.cluster_count,
            });
        }
        let lba = self.geometry.cluster_to_lba(cluster);
        let spc = self.geometry.sectors_per_cluster;
        let written =
            self.device
                .write_sectors(lba, buffer, spc, self.geometry.bytes_per_sector)?;
        if written != spc {
            return Err(Error::IoFailure {
                lba,
                reason: std::io::Error::from(std::io::ErrorKind::UnexpectedEof),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use f32defrag_err::Error;

    use super::*;
    use crate::test_support::{ImageBuilder, MemoryBlockDevice};

    #[test]
    fn mount_rejects_non_fat32_label() {
        let image = ImageBuilder::new(1, 2, 16).fs_type_label(*b"FAT16   ").build();
        let device = MemoryBlockDevice::new(image);
        let err = Volume::mount(device).expect_err("FAT16 label must be rejected");
        assert!(matches!(err, Error::WrongFilesystem { label } if &label == b"FAT16   "));
    }

    #[test]
    fn fat_mirroring_keeps_every_copy_identical() {
        let mut builder = ImageBuilder::new(1, 3, 16).mirroring(true);
        builder.set_fat(2, cluster::EOC_MIN);
        let device = MemoryBlockDevice::new(builder.build());
        let mut volume = Volume::mount(device).unwrap();
        assert!(volume.geometry().fat_mirroring);

        volume.write_fat(5, 0x0000_1234).unwrap();

        let snapshot = volume.device.snapshot();
        let geometry = *volume.geometry();
        let (lba0, _) = geometry.fat_location(5).unwrap();
        for copy in 1..geometry.num_fats as u64 {
            let lba = lba0 + copy * geometry.fat_size as u64;
            let start = (lba * geometry.bytes_per_sector as u64) as usize;
            let end = start + geometry.bytes_per_sector as usize;
            let base_start = (lba0 * geometry.bytes_per_sector as u64) as usize;
            let base_end = base_start + geometry.bytes_per_sector as usize;
            assert_eq!(snapshot[start..end], snapshot[base_start..base_end]);
        }
    }

    #[test]
    fn out_of_range_cluster_is_rejected() {
        let image = ImageBuilder::new(1, 2, 4).build();
        let device = MemoryBlockDevice::new(image);
        let volume = Volume::mount(device).unwrap();
        let mut buffer = vec![0u8; volume.geometry().bytes_per_cluster() as usize];
        let err = volume
            .read_cluster(100, &mut buffer)
            .expect_err("cluster 100 is out of range");
        assert!(matches!(err, Error::OutOfRangeCluster { cluster: 100, .. }));
    }
}
