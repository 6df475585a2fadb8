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

//! Test-only helpers: an in-memory block device and a from-scratch FAT32
//! image builder, so the rest of the crate's tests can exercise the
//! volume/table/swap/driver machinery against synthetic images without
//! touching the filesystem.

use std::cell::RefCell;

use f32defrag_ds::BlockDevice;
use f32defrag_err::Result;

/// An in-memory block device for unit tests: a flat byte buffer
/// addressed exactly like the file-backed implementation.
pub struct MemoryBlockDevice {
    bytes: RefCell<Vec<u8>>,
}

impl MemoryBlockDevice {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes: RefCell::new(bytes),
        }
    }

    pub fn snapshot(&self) -> Vec<u8> {
        self.bytes.borrow().clone()
    }
}

impl BlockDevice for MemoryBlockDevice {
    fn is_mounted(&self) -> bool {
        true
    }

    fn read_sectors(
        &self,
        lba: u64,
        buffer: &mut [u8],
        count: u32,
        bytes_per_sector: u32,
    ) -> Result<u32> {
        let offset = lba as usize * bytes_per_sector as usize;
        let len = count as usize * bytes_per_sector as usize;
        let bytes = self.bytes.borrow();
        let len = len.min(bytes.len().saturating_sub(offset));
        buffer[..len].copy_from_slice(&bytes[offset..offset + len]);
        Ok((len / bytes_per_sector as usize) as u32)
    }

    fn write_sectors(
        &self,
        lba: u64,
        buffer: &[u8],
        count: u32,
        bytes_per_sector: u32,
    ) -> Result<u32> {
        let offset = lba as usize * bytes_per_sector as usize;
        let len = count as usize * bytes_per_sector as usize;
        let mut bytes = self.bytes.borrow_mut();
        bytes[offset..offset + len].copy_from_slice(&buffer[..len]);
        Ok(count)
    }
}

/// Byte offsets into the 512-byte BPB, independent of `crate::bpb::Bpb`'s
/// `repr(C)` layout so the builder exercises the real on-disk format
/// rather than the struct that parses it.
mod offsets {
    pub const BYTS_PER_SEC: usize = 11;
    pub const SEC_PER_CLUS: usize = 13;
    pub const RSVD_SEC_CNT: usize = 14;
    pub const NUM_FATS: usize = 16;
    pub const TOT_SEC32: usize = 32;
    pub const FAT_SZ32: usize = 36;
    pub const EXT_FLAGS: usize = 40;
    pub const ROOT_CLUS: usize = 44;
    pub const FIL_SYS_TYPE: usize = 82;
}

/// Byte offsets into a 32-byte directory entry, independent of
/// `crate::dirent::DirEntry`'s layout for the same reason.
mod dirent_offsets {
    pub const NAME: usize = 0;
    pub const ATTR: usize = 11;
    pub const START_HI: usize = 20;
    pub const START_LO: usize = 26;
    pub const SIZE: usize = 28;
}

pub const ATTR_DIRECTORY: u8 = 0x10;

/// `". "` padded to the 8-byte short-name field.
pub const DOT: [u8; 8] = *b".       ";
/// `".. "` padded to the 8-byte short-name field.
pub const DOTDOT: [u8; 8] = *b"..      ";

/// Builds a synthetic FAT32 image byte-for-byte, exposing direct pokes at
/// the FAT and at directory-entry slots so tests can set up exact chain
/// and directory-tree shapes without going through the production code
/// under test.
pub struct ImageBuilder {
    bytes_per_sector: u32,
    sectors_per_cluster: u32,
    num_fats: u32,
    reserved: u32,
    fat_size: u32,
    cluster_count: u32,
    mirroring: bool,
    active_fat: u32,
    root_cluster: u32,
    bytes: Vec<u8>,
}

impl ImageBuilder {
    /// `fat_size` (sectors per FAT copy) is picked automatically to hold
    /// `cluster_count + 2` entries.
    pub fn new(sectors_per_cluster: u32, num_fats: u32, cluster_count: u32) -> Self {
        let bytes_per_sector = 512u32;
        let entries_per_sector = bytes_per_sector / 4;
        let fat_size = (cluster_count + 2).div_ceil(entries_per_sector).max(1);
        let reserved = 1u32;
        let first_data_sector = reserved as u64 + num_fats as u64 * fat_size as u64;
        let total_sectors = first_data_sector + cluster_count as u64 * sectors_per_cluster as u64;

        let mut bytes = vec![0u8; (total_sectors * bytes_per_sector as u64) as usize];
        bytes[offsets::BYTS_PER_SEC..offsets::BYTS_PER_SEC + 2]
            .copy_from_slice(&(bytes_per_sector as u16).to_le_bytes());
        bytes[offsets::SEC_PER_CLUS] = sectors_per_cluster as u8;
        bytes[offsets::RSVD_SEC_CNT..offsets::RSVD_SEC_CNT + 2]
            .copy_from_slice(&(reserved as u16).to_le_bytes());
        bytes[offsets::NUM_FATS] = num_fats as u8;
        bytes[offsets::TOT_SEC32..offsets::TOT_SEC32 + 4]
            .copy_from_slice(&(total_sectors as u32).to_le_bytes());
        bytes[offsets::FAT_SZ32..offsets::FAT_SZ32 + 4].copy_from_slice(&fat_size.to_le_bytes());
        bytes[offsets::ROOT_CLUS..offsets::ROOT_CLUS + 4].copy_from_slice(&2u32.to_le_bytes());
        bytes[offsets::FIL_SYS_TYPE..offsets::FIL_SYS_TYPE + 8].copy_from_slice(b"FAT32   ");

        Self {
            bytes_per_sector,
            sectors_per_cluster,
            num_fats,
            reserved,
            fat_size,
            cluster_count,
            mirroring: true,
            active_fat: 0,
            root_cluster: 2,
            bytes,
        }
    }

    pub fn mirroring(mut self, on: bool) -> Self {
        self.mirroring = on;
        let flags: u16 = if on { 0 } else { 0x80 | self.active_fat as u16 };
        self.bytes[offsets::EXT_FLAGS..offsets::EXT_FLAGS + 2]
            .copy_from_slice(&flags.to_le_bytes());
        self
    }

    pub fn active_fat(mut self, index: u32) -> Self {
        self.active_fat = index;
        let flags: u16 = 0x80 | index as u16;
        self.mirroring = false;
        self.bytes[offsets::EXT_FLAGS..offsets::EXT_FLAGS + 2]
            .copy_from_slice(&flags.to_le_bytes());
        self
    }

    pub fn root_cluster(mut self, cluster: u32) -> Self {
        self.root_cluster = cluster;
        self.bytes[offsets::ROOT_CLUS..offsets::ROOT_CLUS + 4]
            .copy_from_slice(&cluster.to_le_bytes());
        self
    }

    pub fn fs_type_label(mut self, label: [u8; 8]) -> Self {
        self.bytes[offsets::FIL_SYS_TYPE..offsets::FIL_SYS_TYPE + 8].copy_from_slice(&label);
        self
    }

    pub fn bytes_per_cluster(&self) -> usize {
        (self.bytes_per_sector * self.sectors_per_cluster) as usize
    }

    fn cluster_lba(&self, cluster: u32) -> u64 {
        let first_data_sector = self.reserved as u64 + self.num_fats as u64 * self.fat_size as u64;
        first_data_sector + (cluster - 2) as u64 * self.sectors_per_cluster as u64
    }

    /// Writes `cluster`'s FAT entry. When mirroring is on, every FAT copy
    /// is updated; otherwise only the active copy is.
    pub fn set_fat(&mut self, cluster: u32, value: u32) {
        let entries_per_sector = self.bytes_per_sector / 4;
        let copies: Vec<u32> = if self.mirroring {
            (0..self.num_fats).collect()
        } else {
            vec![self.active_fat]
        };
        for copy in copies {
            let lba = self.reserved as u64
                + copy as u64 * self.fat_size as u64
                + (cluster as u64 * 4) / self.bytes_per_sector as u64;
            let index = cluster % entries_per_sector;
            let offset = (lba * self.bytes_per_sector as u64) as usize + index as usize * 4;
            self.bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
        }
    }

    pub fn fat(&self, cluster: u32) -> u32 {
        let entries_per_sector = self.bytes_per_sector / 4;
        let lba = self.reserved as u64 + (cluster as u64 * 4) / self.bytes_per_sector as u64;
        let index = cluster % entries_per_sector;
        let offset = (lba * self.bytes_per_sector as u64) as usize + index as usize * 4;
        u32::from_le_bytes(self.bytes[offset..offset + 4].try_into().unwrap())
    }

    /// Overwrites the whole of `cluster`'s data with `data`, truncated or
    /// zero-padded to one cluster's length.
    pub fn set_cluster_bytes(&mut self, cluster: u32, data: &[u8]) {
        let lba = self.cluster_lba(cluster);
        let offset = (lba * self.bytes_per_sector as u64) as usize;
        let len = data.len().min(self.bytes_per_cluster());
        self.bytes[offset..offset + len].copy_from_slice(&data[..len]);
    }

    /// Writes a single 32-byte directory entry into slot `index` of
    /// `cluster`. `name` is padded/truncated to the 8-byte short-name
    /// field (pass [`DOT`]/[`DOTDOT`] for `.`/`..`).
    pub fn set_dirent(
        &mut self,
        cluster: u32,
        index: usize,
        name: [u8; 8],
        attr: u8,
        start_cluster: u32,
        size: u32,
    ) {
        let lba = self.cluster_lba(cluster);
        let base = (lba * self.bytes_per_sector as u64) as usize + index * 32;
        self.bytes[base + dirent_offsets::NAME..base + dirent_offsets::NAME + 8]
            .copy_from_slice(&name);
        self.bytes[base + dirent_offsets::ATTR] = attr;
        let hi = ((start_cluster >> 16) & 0xFFFF) as u16;
        let lo = (start_cluster & 0xFFFF) as u16;
        self.bytes[base + dirent_offsets::START_HI..base + dirent_offsets::START_HI + 2]
            .copy_from_slice(&hi.to_le_bytes());
        self.bytes[base + dirent_offsets::START_LO..base + dirent_offsets::START_LO + 2]
            .copy_from_slice(&lo.to_le_bytes());
        self.bytes[base + dirent_offsets::SIZE..base + dirent_offsets::SIZE + 4]
            .copy_from_slice(&size.to_le_bytes());
    }

    /// Name a short-name slot from an ASCII string, space-padded to 8
    /// bytes (truncated if longer).
    pub fn name(label: &str) -> [u8; 8] {
        let mut name = [b' '; 8];
        let bytes = label.as_bytes();
        let len = bytes.len().min(8);
        name[..len].copy_from_slice(&bytes[..len]);
        name
    }

    pub fn cluster_count(&self) -> u32 {
        self.cluster_count
    }

    pub fn root(&self) -> u32 {
        self.root_cluster
    }

    pub fn build(self) -> Vec<u8> {
        self.bytes
    }
}
