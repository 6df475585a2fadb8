//! The closed error taxonomy shared by every crate in the workspace.
//!
//! There is no recovery from any of these: every fatal error is printed
//! once, at the top of the call stack, and the process exits 1.

/// Bytes of the `BS_FilSysType` label, for diagnostics on a rejected mount.
pub type FsTypeLabel = [u8; 8];

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("I/O failure at LBA 0x{lba:x}: {reason}")]
    IoFailure { lba: u64, reason: std::io::Error },

    #[error("volume is not FAT32 (label: {})", String::from_utf8_lossy(label))]
    WrongFilesystem { label: FsTypeLabel },

    #[error("cluster 0x{cluster:x} is out of range (limit 0x{limit:x})")]
    OutOfRangeCluster { cluster: u32, limit: u32 },

    #[error("out of memory")]
    OutOfMemory,

    #[error("{0}")]
    BadArguments(String),
}

pub type Result<T> = core::result::Result<T, Error>;
