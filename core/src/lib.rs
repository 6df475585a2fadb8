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

//! FAT32 volume parsing and the cluster-swap defragmentation engine.
//!
//! [`volume::Volume`] owns a mounted image; [`table`] walks it into a
//! flat list of items; [`swap`] relocates one cluster at a time; and
//! [`driver`] drives the two together to pack every chain toward the
//! low end of the data area.

pub mod bpb;
pub mod cluster;
pub mod dirent;
pub mod driver;
pub mod geometry;
pub mod swap;
pub mod table;
#[cfg(test)]
pub(crate) mod test_support;
pub mod volume;

pub use driver::{analyze, defragment, AnalysisReport};
pub use table::Item;
pub use volume::Volume;
