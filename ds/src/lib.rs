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

//! The block device abstraction the volume is built on top of.
//!
//! An implementor is considered mounted for its entire lifetime: `mount`
//! is folded into construction (e.g. `BlockDeviceFile::mount`) and
//! `unmount` into `Drop`, rather than toggled by a separate call, so
//! there is no state in which a `BlockDevice` value exists but
//! `is_mounted()` is false. The trait still exposes `is_mounted` because
//! callers (in particular the volume) use it as a precondition check
//! before issuing I/O, matching the original's `f32_mounted()` guard.

pub use f32defrag_err::{Error, Result};

/// Positional sector-addressed storage backing a FAT32 image.
///
/// No caching is performed here; every call is a direct positional I/O.
/// A short read or write is not itself an error — it is reported as a
/// sector count for the caller to judge.
pub trait BlockDevice {
    /// Whether the device is ready to serve I/O.
    fn is_mounted(&self) -> bool;

    /// Reads `count` sectors of `bytes_per_sector` bytes starting at
    /// `lba`, into `buffer`. Returns the number of whole sectors
    /// actually read.
    fn read_sectors(
        &self,
        lba: u64,
        buffer: &mut [u8],
        count: u32,
        bytes_per_sector: u32,
    ) -> Result<u32>;

    /// Writes `count` sectors of `bytes_per_sector` bytes from `buffer`
    /// to `lba`. Returns the number of whole sectors actually written.
    fn write_sectors(
        &self,
        lba: u64,
        buffer: &[u8],
        count: u32,
        bytes_per_sector: u32,
    ) -> Result<u32>;
}
