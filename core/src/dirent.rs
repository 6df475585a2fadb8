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

//! The 32-byte directory entry and the handful of fields the
//! defragmenter cares about.

use zerocopy::{
    little_endian::{U16, U32},
    FromBytes, Immutable, IntoBytes, KnownLayout,
};

pub const ATTR_DIRECTORY: u8 = 0x10;
pub const ATTR_LONG_NAME: u8 = 0x0F;

pub const NAME_FREE: u8 = 0x00;
pub const NAME_DELETED: u8 = 0xE5;

/// `". "` padded to the 8-byte short-name field.
pub(crate) const DOT: [u8; 8] = *b".       ";
/// `".. "` padded to the 8-byte short-name field.
pub(crate) const DOTDOT: [u8; 8] = *b"..      ";

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct DirEntry {
    pub name: [u8; 8],
    ext: [u8; 3],
    pub attr: u8,
    case_flag: u8,
    crt_time_tenth: u8,
    crt_time: U16,
    crt_date: U16,
    lst_acc_date: U16,
    start_cluster_hi: U16,
    wrt_time: U16,
    wrt_date: U16,
    start_cluster_lo: U16,
    pub size: U32,
}

impl DirEntry {
    pub const SIZE: usize = 32;

    pub fn start_cluster(&self) -> u32 {
        (self.start_cluster_hi.get() as u32) << 16 | self.start_cluster_lo.get() as u32
    }

    pub fn set_start_cluster(&mut self, cluster: u32) {
        self.start_cluster_lo.set((cluster & 0xFFFF) as u16);
        self.start_cluster_hi.set(((cluster >> 16) & 0xFFFF) as u16);
    }

    pub fn is_directory(&self) -> bool {
        self.attr & ATTR_DIRECTORY != 0
    }

    pub fn is_long_name_slot(&self) -> bool {
        self.attr == ATTR_LONG_NAME
    }

    pub fn is_free(&self) -> bool {
        self.name[0] == NAME_FREE
    }

    pub fn is_deleted(&self) -> bool {
        self.name[0] == NAME_DELETED
    }

    pub fn is_dot(&self) -> bool {
        self.name == DOT
    }

    pub fn is_dotdot(&self) -> bool {
        self.name == DOTDOT
    }
}

const _: () = assert!(core::mem::size_of::<DirEntry>() == DirEntry::SIZE);
