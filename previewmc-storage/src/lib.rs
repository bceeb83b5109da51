//! Sampled world-preview storage.
//!
//! This crate indexes low-resolution world samples (biomes, heights,
//! structure starts) by quantized coordinate and channel so that a preview
//! never samples the same position twice:
//! - Key packing: one u64 per (section X, section Z, channel flag)
//! - Section variants: dense grids, value-deduplicating compressed grids,
//!   and sparse structure-start point sets
//! - A band-sharded store with lookup-or-create semantics
//! - A binary persistence codec for the whole store

mod key;
mod persist;
mod quart;
mod section;
mod store;

pub use key::{ChannelFlag, FLAG_MASK, X_SHIFT, XZ_MASK, Z_SHIFT, pack, pack_quart, unpack_flag, unpack_x, unpack_z};
pub use quart::{BlockPos, ChunkPos, quart_from_block, quart_from_section, quart_to_block};
pub use section::{
    CompressedSection, DenseSection, NO_DATA, SECTION_SHIFT, SECTION_SIZE, Section, Stride,
    StructureSection,
};
pub use store::{BAND_SHIFT, PreviewStore, StoreConfig};
