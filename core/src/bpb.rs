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

//! The BIOS Parameter Block: the 512-byte record at LBA 0.

use zerocopy::{
    little_endian::{U16, U32},
    FromBytes, Immutable, IntoBytes, KnownLayout,
};

/// The eight-byte label that must be present for this tool to treat a
/// volume as FAT32. Per `BS_FilSysType`'s own documentation this field is
/// advisory; this tool, like the original, treats it as authoritative.
pub const FAT32_LABEL: [u8; 8] = *b"FAT32   ";

/// Bit 7 of `bpb_extflags`: when set, only one FAT copy (named by the low
/// nibble) is active; when clear, all copies are kept mirrored.
const EXTFLAGS_NOMIRROR: u8 = 0x80;

#[repr(C)]
#[derive(Debug, Clone, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct Bpb {
    bs_jmpboot: [u8; 3],
    bs_oemname: [u8; 8],

    bpb_bytspersec: U16,
    bpb_secperclus: u8,
    bpb_rsvdseccnt: U16,
    bpb_numfats: u8,
    bpb_rootentcnt: U16,
    bpb_totsec16: U16,
    bpb_media: u8,
    bpb_fatsz16: U16,
    bpb_secpertrk: U16,
    bpb_numheads: U16,
    bpb_hiddsec: U32,
    bpb_totsec32: U32,

    bpb_fatsz32: U32,
    bpb_extflags: U16,
    bpb_fsver: U16,
    bpb_rootclus: U32,
    bpb_fsinfo: U16,
    bpb_bkbootsec: U16,
    bpb_reserved: [u8; 12],

    bs_drvnum: u8,
    bs_reserved1: u8,
    bs_bootsig: u8,
    bs_volid: U32,
    bs_vollab: [u8; 11],
    bs_filsystype: [u8; 8],

    bootstrap: [u8; 420],
    signature_word: [u8; 2],
}

impl Bpb {
    pub const SIZE: usize = 512;

    pub fn bytes_per_sector(&self) -> u32 {
        self.bpb_bytspersec.get() as u32
    }

    pub fn sectors_per_cluster(&self) -> u32 {
        self.bpb_secperclus as u32
    }

    pub fn reserved_sector_count(&self) -> u32 {
        self.bpb_rsvdseccnt.get() as u32
    }

    pub fn num_fats(&self) -> u32 {
        self.bpb_numfats as u32
    }

    pub fn total_sectors(&self) -> u64 {
        if self.bpb_totsec16.get() != 0 {
            self.bpb_totsec16.get() as u64
        } else {
            self.bpb_totsec32.get() as u64
        }
    }

    pub fn root_dir_sector_count(&self) -> u32 {
        // FAT32 always has BPB_RootEntCnt == 0, so this is always 0; kept
        // for completeness and to mirror the original's formula.
        (self.bpb_rootentcnt.get() as u32 * 32 + (self.bytes_per_sector() - 1))
            / self.bytes_per_sector()
    }

    pub fn fat_size(&self) -> u32 {
        if self.bpb_fatsz16.get() != 0 {
            self.bpb_fatsz16.get() as u32
        } else {
            self.bpb_fatsz32.get()
        }
    }

    pub fn ext_flags(&self) -> u16 {
        self.bpb_extflags.get()
    }

    /// `true` when every FAT copy is kept byte-identical.
    pub fn fat_mirroring(&self) -> bool {
        self.ext_flags() & (EXTFLAGS_NOMIRROR as u16) == 0
    }

    /// Zero-based index of the active FAT copy, meaningful only when
    /// [`Self::fat_mirroring`] is `false`.
    pub fn active_fat(&self) -> u32 {
        (self.ext_flags() & 0x0F) as u32
    }

    pub fn root_cluster(&self) -> u32 {
        self.bpb_rootclus.get()
    }

    pub fn set_root_cluster(&mut self, cluster: u32) {
        self.bpb_rootclus.set(cluster);
    }

    pub fn fs_type_label(&self) -> [u8; 8] {
        self.bs_filsystype
    }

    pub fn is_fat32_label(&self) -> bool {
        self.bs_filsystype == FAT32_LABEL
    }
}

const _: () = assert!(core::mem::size_of::<Bpb>() == Bpb::SIZE);
