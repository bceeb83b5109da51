//! Band-sharded preview store.
//!
//! The store is an array of vertical bands, each guarding its own key ->
//! section map with a mutex. Bands are allocated once from the fixed
//! `[y_min, y_max]` range and never resized; contention only occurs between
//! callers touching the same band.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::key::{ChannelFlag, pack_quart};
use crate::quart::{BlockPos, ChunkPos, quart_from_block, quart_from_section, quart_to_block};
use crate::section::{NO_DATA, Section, Stride};

/// log2 of the band height in blocks (16-block bands).
pub const BAND_SHIFT: u32 = 4;

/// Configuration snapshot governing sections created by this store.
///
/// Fixed at construction so variant selection is deterministic for the
/// store's whole lifetime.
#[derive(Debug, Clone, Copy)]
pub struct StoreConfig {
    pub stride: Stride,
    pub compression: bool,
}

pub(crate) type Band = HashMap<u64, Arc<Section>>;

/// Top-level store for one preview session.
pub struct PreviewStore {
    y_min: i32,
    y_max: i32,
    config: StoreConfig,
    pub(crate) bands: Vec<Mutex<Band>>,
}

impl PreviewStore {
    /// Create an empty store covering the block range `[y_min, y_max]`.
    pub fn new(y_min: i32, y_max: i32, config: StoreConfig) -> Self {
        let band_count = (((y_max - y_min) >> BAND_SHIFT) + 1) as usize;
        let mut bands = Vec::with_capacity(band_count);
        bands.resize_with(band_count, || Mutex::new(Band::new()));
        Self { y_min, y_max, config, bands }
    }

    pub fn y_min(&self) -> i32 {
        self.y_min
    }

    pub fn y_max(&self) -> i32 {
        self.y_max
    }

    pub fn config(&self) -> StoreConfig {
        self.config
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    /// Band index for a block Y. Panics if `y_block` is outside
    /// `[y_min, y_max]`; callers are expected to stay inside the range the
    /// store was constructed with.
    #[inline]
    fn band_index(&self, y_block: i32) -> usize {
        ((y_block - self.y_min) >> BAND_SHIFT) as usize
    }

    /// Fetch or create the section holding `flag` data for a block position.
    pub fn section_at_block(&self, pos: BlockPos, flag: ChannelFlag) -> Arc<Section> {
        self.lookup_or_create(
            quart_from_block(pos.x),
            self.band_index(pos.y),
            quart_from_block(pos.z),
            flag,
        )
    }

    /// Fetch or create the section for a chunk position and block Y.
    pub fn section_at_chunk(&self, pos: ChunkPos, y_block: i32, flag: ChannelFlag) -> Arc<Section> {
        self.lookup_or_create(
            quart_from_section(pos.x),
            self.band_index(y_block),
            quart_from_section(pos.z),
            flag,
        )
    }

    /// Fetch or create the section for an already-quantized coordinate.
    pub fn section_at_quart(
        &self,
        quart_x: i32,
        quart_y: i32,
        quart_z: i32,
        flag: ChannelFlag,
    ) -> Arc<Section> {
        self.lookup_or_create(
            quart_x,
            self.band_index(quart_to_block(quart_y)),
            quart_z,
            flag,
        )
    }

    /// Single-flight lookup-or-create. The band lock is held across check,
    /// construct and insert, so exactly one section is ever published per
    /// (band, key) no matter how many threads race here. Construction is
    /// cheap next to the sampling work that follows, so the coarse lock is
    /// an acceptable trade.
    fn lookup_or_create(
        &self,
        quart_x: i32,
        band: usize,
        quart_z: i32,
        flag: ChannelFlag,
    ) -> Arc<Section> {
        let key = pack_quart(quart_x, quart_z, flag);
        let mut sections = self.bands[band].lock().expect("band lock poisoned");
        Arc::clone(sections.entry(key).or_insert_with(|| {
            Arc::new(Section::new(
                quart_x,
                quart_z,
                flag,
                self.config.stride,
                self.config.compression,
            ))
        }))
    }

    /// Read a single sampled value, or [`NO_DATA`] when nothing was stored.
    ///
    /// Only use this for scattered single-point queries: it takes the band
    /// lock on every call. Bulk consumers should fetch the section once via
    /// `section_at_*` and iterate its cells directly.
    pub fn sample(&self, quart_x: i32, quart_y: i32, quart_z: i32, flag: ChannelFlag) -> i16 {
        let band = self.band_index(quart_to_block(quart_y));
        let key = pack_quart(quart_x, quart_z, flag);
        let section = {
            let sections = self.bands[band].lock().expect("band lock poisoned");
            match sections.get(&key) {
                Some(section) => Arc::clone(section),
                None => return NO_DATA,
            }
        };
        section.get(quart_x - section.quart_x(), quart_z - section.quart_z())
    }

    /// Distinct-value counts of every compressed section across all bands.
    ///
    /// Telemetry for tuning the compression trade-off; the order of entries
    /// within one band follows map iteration and is unspecified.
    pub fn compression_statistics(&self) -> Vec<u16> {
        let mut stats = Vec::new();
        for band in &self.bands {
            let sections = band.lock().expect("band lock poisoned");
            for section in sections.values() {
                if let Section::Compressed(compressed) = section.as_ref() {
                    stats.push(compressed.distinct_values());
                }
            }
        }
        stats
    }

    /// Populated section count per band.
    pub fn section_counts(&self) -> Vec<usize> {
        self.bands
            .iter()
            .map(|band| band.lock().expect("band lock poisoned").len())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;

    fn test_store(compression: bool) -> PreviewStore {
        PreviewStore::new(
            -64,
            320,
            StoreConfig { stride: Stride::Quarter, compression },
        )
    }

    #[test]
    fn test_band_count_from_range() {
        let store = test_store(false);
        assert_eq!(store.band_count(), ((320 - (-64)) >> BAND_SHIFT) as usize + 1);
    }

    #[test]
    fn test_sample_miss_returns_sentinel() {
        let store = test_store(true);
        assert_eq!(store.sample(10, 0, 10, ChannelFlag::Biome), NO_DATA);
    }

    #[test]
    fn test_sample_reads_back_written_value() {
        let store = test_store(true);
        let section = store.section_at_quart(200, 0, -300, ChannelFlag::Biome);
        section.put(200 - section.quart_x(), -300 - section.quart_z(), 9);
        assert_eq!(store.sample(200, 0, -300, ChannelFlag::Biome), 9);
        // Same coordinate, different channel: still a miss
        assert_eq!(store.sample(200, 0, -300, ChannelFlag::Intersect), NO_DATA);
    }

    #[test]
    fn test_coordinate_forms_agree() {
        let store = test_store(false);
        let by_quart = store.section_at_quart(4, 0, 8, ChannelFlag::Height);
        let by_block = store.section_at_block(BlockPos::new(16, 0, 32), ChannelFlag::Height);
        let by_chunk = store.section_at_chunk(ChunkPos::new(1, 2), 0, ChannelFlag::Height);
        assert!(Arc::ptr_eq(&by_quart, &by_block));
        assert!(Arc::ptr_eq(&by_quart, &by_chunk));
    }

    #[test]
    fn test_bands_are_independent() {
        let store = test_store(false);
        let low = store.section_at_quart(0, 0, 0, ChannelFlag::Biome);
        let high = store.section_at_quart(0, 40, 0, ChannelFlag::Biome);
        assert!(!Arc::ptr_eq(&low, &high));
        assert_eq!(store.section_counts().iter().sum::<usize>(), 2);
    }

    #[test]
    fn test_single_flight_creation() {
        let store = Arc::new(test_store(true));
        let threads = 8;
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    store.section_at_quart(-1000, 5, 1000, ChannelFlag::Biome)
                })
            })
            .collect();

        let sections: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for section in &sections[1..] {
            assert!(Arc::ptr_eq(&sections[0], section));
        }
        // Exactly one section was constructed and published
        assert_eq!(store.section_counts().iter().sum::<usize>(), 1);
    }

    #[test]
    fn test_compression_statistics_cardinality() {
        let store = test_store(false);
        store.section_at_quart(0, 0, 0, ChannelFlag::Biome);
        assert!(store.compression_statistics().is_empty());

        let store = test_store(true);
        store.section_at_quart(0, 0, 0, ChannelFlag::Biome);
        store.section_at_quart(500, 0, 0, ChannelFlag::Intersect);
        // Height and structure starts never produce compressed sections
        store.section_at_quart(0, 0, 500, ChannelFlag::Height);
        store.section_at_quart(0, 0, -500, ChannelFlag::StructStart);
        assert_eq!(store.compression_statistics().len(), 2);
    }
}
