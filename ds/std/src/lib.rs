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

use std::{
    fs::{File, OpenOptions},
    os::unix::fs::FileExt,
    path::Path,
};

use f32defrag_ds::BlockDevice;
use f32defrag_err::{Error, Result};
use log::trace;

/// A FAT32 image backed by a regular file, addressed positionally.
pub struct BlockDeviceFile {
    file: File,
}

impl BlockDeviceFile {
    /// Opens `path` read-write. The returned value is mounted for its
    /// entire lifetime; dropping it is the unmount.
    pub fn mount(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|reason| Error::IoFailure { lba: 0, reason })?;
        Ok(Self { file })
    }
}

impl BlockDevice for BlockDeviceFile {
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
        let len = (count as usize) * (bytes_per_sector as usize);
        let buffer = &mut buffer[..len.min(buffer.len())];
        trace!("read_sectors(lba=0x{lba:x}, count={count})");
        let offset = lba * bytes_per_sector as u64;
        let read = self
            .file
            .read_at(buffer, offset)
            .map_err(|reason| Error::IoFailure { lba, reason })?;
        Ok((read / bytes_per_sector as usize) as u32)
    }

    fn write_sectors(
        &self,
        lba: u64,
        buffer: &[u8],
        count: u32,
        bytes_per_sector: u32,
    ) -> Result<u32> {
        let len = (count as usize) * (bytes_per_sector as usize);
        let buffer = &buffer[..len.min(buffer.len())];
        trace!("write_sectors(lba=0x{lba:x}, count={count})");
        let offset = lba * bytes_per_sector as u64;
        self.file
            .write_all_at(buffer, offset)
            .map_err(|reason| Error::IoFailure { lba, reason })?;
        Ok(count)
    }
}
