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

//! Geometry derived from the BPB, once at mount time.

use f32defrag_err::{Error, Result};

use crate::bpb::Bpb;

#[derive(Debug, Clone, Copy)]
pub struct Geometry {
    pub bytes_per_sector: u32,
    pub sectors_per_cluster: u32,
    pub num_fats: u32,
    pub fat_start: u64,
    pub fat_size: u32,
    pub first_data_sector: u64,
    pub cluster_count: u32,
    pub fat_mirroring: bool,
    /// FAT entries (4 bytes each) that fit in one sector.
    pub entries_per_fat_sector: u32,
}

impl Geometry {
    pub fn from_bpb(bpb: &Bpb) -> Result<Self> {
        if !bpb.is_fat32_label() {
            return Err(Error::WrongFilesystem {
                label: bpb.fs_type_label(),
            });
        }

        let bytes_per_sector = bpb.bytes_per_sector();
        let sectors_per_cluster = bpb.sectors_per_cluster();
        let num_fats = bpb.num_fats();
        let fat_size = bpb.fat_size();
        let reserved = bpb.reserved_sector_count();
        let fat_mirroring = bpb.fat_mirroring();

        let fat_start = if fat_mirroring {
            reserved as u64
        } else {
            reserved as u64 + bpb.active_fat() as u64 * fat_size as u64
        };

        let first_data_sector = reserved as u64 + num_fats as u64 * fat_size as u64;

        let total_sectors = bpb.total_sectors();
        let root_dir_sectors = bpb.root_dir_sector_count() as u64;
        let data_sectors = total_sectors
            .saturating_sub(reserved as u64 + num_fats as u64 * fat_size as u64 + root_dir_sectors);
        let cluster_count = (data_sectors / sectors_per_cluster.max(1) as u64) as u32;

        Ok(Self {
            bytes_per_sector,
            sectors_per_cluster,
            num_fats,
            fat_start,
            fat_size,
            first_data_sector,
            cluster_count,
            fat_mirroring,
            entries_per_fat_sector: bytes_per_sector / 4,
        })
    }

    /// Bytes in one cluster.
    pub fn bytes_per_cluster(&self) -> u32 {
        self.bytes_per_sector * self.sectors_per_cluster
    }

    pub fn cluster_to_lba(&self, cluster: u32) -> u64 {
        self.first_data_sector + (cluster - 2) as u64 * self.sectors_per_cluster as u64
    }

    /// The FAT sector and in-sector index (in 4-byte entries) for `cluster`.
    pub fn fat_location(&self, cluster: u32) -> Result<(u64, u32)> {
        let lba =
            self.fat_start + (cluster as u64 * 4) / self.bytes_per_sector as u64;
        if lba > self.fat_start + self.fat_size as u64 {
            return Err(Error::OutOfRangeCluster {
                cluster,
                limit: self.cluster_count,
            });
        }
        let index = cluster % self.entries_per_fat_sector;
        Ok((lba, index))
    }
}
