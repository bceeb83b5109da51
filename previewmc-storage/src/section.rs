//! Section variants and the variant factory.
//!
//! A section covers a fixed square of quarts anchored at an origin and holds
//! the sampled values of exactly one channel. The shape is fixed at creation:
//! - Dense: flat cell array, one atomic i16 per cell
//! - Compressed: palette of distinct values plus a per-cell code array,
//!   cheaper when many cells share a value (large uniform biome regions)
//! - Structure: sparse point records, since structure starts are rare

use anyhow::{Result, bail};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI16, Ordering};

use crate::key::ChannelFlag;

/// log2 of the section edge length in quarts.
pub const SECTION_SHIFT: u32 = 7;
/// Section edge length in quarts.
pub const SECTION_SIZE: i32 = 1 << SECTION_SHIFT;

/// Sentinel returned when a cell was never written.
///
/// Caution: this is also the minimal representable sample. Channels that can
/// legitimately produce i16::MIN cannot distinguish a miss from that value.
pub const NO_DATA: i16 = i16::MIN;

const EMPTY_CODE: u16 = u16::MAX;

/// Resolution stride: how many quarts one stored cell covers per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stride {
    Full,
    Half,
    Quarter,
}

impl Stride {
    /// Parse a configured stride. Anything but 1, 2 or 4 is a configuration
    /// error and must abort startup.
    pub fn from_quarts(quarts: u8) -> Result<Stride> {
        match quarts {
            1 => Ok(Stride::Full),
            2 => Ok(Stride::Half),
            4 => Ok(Stride::Quarter),
            other => bail!("unsupported quart stride {other}: must be 1, 2 or 4"),
        }
    }

    pub fn quarts(self) -> u8 {
        match self {
            Stride::Full => 1,
            Stride::Half => 2,
            Stride::Quarter => 4,
        }
    }

    /// log2 of `quarts()`, used to scale local quart offsets to cell indices.
    pub fn shift(self) -> u32 {
        match self {
            Stride::Full => 0,
            Stride::Half => 1,
            Stride::Quarter => 2,
        }
    }

    /// Cells per section axis at this stride.
    pub fn cells_per_axis(self) -> usize {
        (SECTION_SIZE as usize) >> self.shift()
    }
}

/// One stored section. The concrete variant is picked once at creation and
/// never changes.
pub enum Section {
    Dense(DenseSection),
    Compressed(CompressedSection),
    Structure(StructureSection),
}

impl Section {
    /// Variant factory.
    ///
    /// Structure starts always get the sparse point variant. Otherwise the
    /// compressed layout is used when enabled, except for the height channel
    /// whose values rarely repeat enough to be worth the indirection.
    pub fn new(
        quart_x: i32,
        quart_z: i32,
        flag: ChannelFlag,
        stride: Stride,
        compression: bool,
    ) -> Section {
        if flag == ChannelFlag::StructStart {
            return Section::Structure(StructureSection::new(quart_x, quart_z));
        }
        if compression && flag != ChannelFlag::Height {
            return Section::Compressed(CompressedSection::new(quart_x, quart_z, stride));
        }
        Section::Dense(DenseSection::new(quart_x, quart_z, stride))
    }

    /// Quart X of this section's origin (minimum corner).
    pub fn quart_x(&self) -> i32 {
        match self {
            Section::Dense(s) => s.quart_x,
            Section::Compressed(s) => s.quart_x,
            Section::Structure(s) => s.quart_x,
        }
    }

    /// Quart Z of this section's origin (minimum corner).
    pub fn quart_z(&self) -> i32 {
        match self {
            Section::Dense(s) => s.quart_z,
            Section::Compressed(s) => s.quart_z,
            Section::Structure(s) => s.quart_z,
        }
    }

    /// Read the cell covering the given local quart offset. Returns
    /// [`NO_DATA`] when the cell was never written.
    pub fn get(&self, local_x: i32, local_z: i32) -> i16 {
        match self {
            Section::Dense(s) => s.get(local_x, local_z),
            Section::Compressed(s) => s.get(local_x, local_z),
            Section::Structure(s) => s.get(local_x, local_z),
        }
    }

    /// Write the cell covering the given local quart offset.
    ///
    /// Concurrent writes to distinct cells are safe on every variant; the
    /// compressed palette growth is serialized internally.
    pub fn put(&self, local_x: i32, local_z: i32, value: i16) {
        match self {
            Section::Dense(s) => s.put(local_x, local_z, value),
            Section::Compressed(s) => s.put(local_x, local_z, value),
            Section::Structure(s) => s.put(local_x, local_z, value),
        }
    }
}

/// Dense flat-array section.
pub struct DenseSection {
    quart_x: i32,
    quart_z: i32,
    stride: Stride,
    cells: Vec<AtomicI16>,
}

#[inline]
fn origin(quart: i32) -> i32 {
    quart & !(SECTION_SIZE - 1)
}

impl DenseSection {
    pub fn new(quart_x: i32, quart_z: i32, stride: Stride) -> Self {
        let n = stride.cells_per_axis();
        let mut cells = Vec::with_capacity(n * n);
        cells.resize_with(n * n, || AtomicI16::new(NO_DATA));
        Self {
            quart_x: origin(quart_x),
            quart_z: origin(quart_z),
            stride,
            cells,
        }
    }

    pub fn stride(&self) -> Stride {
        self.stride
    }

    #[inline]
    fn index(&self, local_x: i32, local_z: i32) -> usize {
        let sh = self.stride.shift();
        let n = self.stride.cells_per_axis();
        (local_x >> sh) as usize * n + (local_z >> sh) as usize
    }

    pub fn get(&self, local_x: i32, local_z: i32) -> i16 {
        self.cells[self.index(local_x, local_z)].load(Ordering::Relaxed)
    }

    pub fn put(&self, local_x: i32, local_z: i32, value: i16) {
        self.cells[self.index(local_x, local_z)].store(value, Ordering::Relaxed);
    }

    pub(crate) fn raw_cells(&self) -> impl Iterator<Item = i16> + '_ {
        self.cells.iter().map(|c| c.load(Ordering::Relaxed))
    }

    pub(crate) fn from_raw(quart_x: i32, quart_z: i32, stride: Stride, raw: Vec<i16>) -> Self {
        Self {
            quart_x: origin(quart_x),
            quart_z: origin(quart_z),
            stride,
            cells: raw.into_iter().map(AtomicI16::new).collect(),
        }
    }
}

/// Value-deduplicating section: distinct values go into a palette, cells
/// store palette codes.
pub struct CompressedSection {
    quart_x: i32,
    quart_z: i32,
    stride: Stride,
    state: Mutex<CompressedState>,
}

struct CompressedState {
    /// code -> value
    palette: Vec<i16>,
    /// value -> code
    codes: HashMap<i16, u16>,
    cells: Vec<u16>,
}

impl CompressedSection {
    pub fn new(quart_x: i32, quart_z: i32, stride: Stride) -> Self {
        let n = stride.cells_per_axis();
        Self {
            quart_x: origin(quart_x),
            quart_z: origin(quart_z),
            stride,
            state: Mutex::new(CompressedState {
                palette: Vec::new(),
                codes: HashMap::new(),
                cells: vec![EMPTY_CODE; n * n],
            }),
        }
    }

    pub fn stride(&self) -> Stride {
        self.stride
    }

    #[inline]
    fn index(&self, local_x: i32, local_z: i32) -> usize {
        let sh = self.stride.shift();
        let n = self.stride.cells_per_axis();
        (local_x >> sh) as usize * n + (local_z >> sh) as usize
    }

    pub fn get(&self, local_x: i32, local_z: i32) -> i16 {
        let idx = self.index(local_x, local_z);
        let state = self.state.lock().expect("compressed section lock poisoned");
        match state.cells[idx] {
            EMPTY_CODE => NO_DATA,
            code => state.palette[code as usize],
        }
    }

    pub fn put(&self, local_x: i32, local_z: i32, value: i16) {
        let idx = self.index(local_x, local_z);
        let mut state = self.state.lock().expect("compressed section lock poisoned");
        let code = match state.codes.get(&value) {
            Some(&code) => code,
            None => {
                let code = state.palette.len() as u16;
                state.palette.push(value);
                state.codes.insert(value, code);
                code
            }
        };
        state.cells[idx] = code;
    }

    /// Number of distinct values observed so far. Diagnostic only.
    pub fn distinct_values(&self) -> u16 {
        self.state.lock().expect("compressed section lock poisoned").palette.len() as u16
    }

    pub(crate) fn snapshot(&self) -> (Vec<i16>, Vec<u16>) {
        let state = self.state.lock().expect("compressed section lock poisoned");
        (state.palette.clone(), state.cells.clone())
    }

    pub(crate) fn from_raw(
        quart_x: i32,
        quart_z: i32,
        stride: Stride,
        palette: Vec<i16>,
        cells: Vec<u16>,
    ) -> Self {
        let codes = palette
            .iter()
            .enumerate()
            .map(|(code, &value)| (value, code as u16))
            .collect();
        Self {
            quart_x: origin(quart_x),
            quart_z: origin(quart_z),
            stride,
            state: Mutex::new(CompressedState { palette, codes, cells }),
        }
    }
}

/// Sparse point section for structure starts.
///
/// Points are kept at full quart resolution regardless of the configured
/// stride: a structure origin is an exact position, not an area sample.
pub struct StructureSection {
    quart_x: i32,
    quart_z: i32,
    points: Mutex<HashMap<u32, i16>>,
}

impl StructureSection {
    pub fn new(quart_x: i32, quart_z: i32) -> Self {
        Self {
            quart_x: origin(quart_x),
            quart_z: origin(quart_z),
            points: Mutex::new(HashMap::new()),
        }
    }

    #[inline]
    fn point_key(local_x: i32, local_z: i32) -> u32 {
        (local_x as u32) << 16 | (local_z as u32 & 0xFFFF)
    }

    pub fn get(&self, local_x: i32, local_z: i32) -> i16 {
        self.points
            .lock()
            .expect("structure section lock poisoned")
            .get(&Self::point_key(local_x, local_z))
            .copied()
            .unwrap_or(NO_DATA)
    }

    pub fn put(&self, local_x: i32, local_z: i32, value: i16) {
        self.points
            .lock()
            .expect("structure section lock poisoned")
            .insert(Self::point_key(local_x, local_z), value);
    }

    /// All recorded points as absolute quart positions with their values.
    pub fn points(&self) -> Vec<(i32, i32, i16)> {
        self.points
            .lock()
            .expect("structure section lock poisoned")
            .iter()
            .map(|(&key, &value)| {
                let local_x = (key >> 16) as i32;
                let local_z = (key & 0xFFFF) as i32;
                (self.quart_x + local_x, self.quart_z + local_z, value)
            })
            .collect()
    }

    pub(crate) fn raw_points(&self) -> Vec<(u32, i16)> {
        self.points
            .lock()
            .expect("structure section lock poisoned")
            .iter()
            .map(|(&k, &v)| (k, v))
            .collect()
    }

    pub(crate) fn from_raw(quart_x: i32, quart_z: i32, raw: Vec<(u32, i16)>) -> Self {
        Self {
            quart_x: origin(quart_x),
            quart_z: origin(quart_z),
            points: Mutex::new(raw.into_iter().collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stride_from_quarts() {
        assert_eq!(Stride::from_quarts(1).unwrap(), Stride::Full);
        assert_eq!(Stride::from_quarts(2).unwrap(), Stride::Half);
        assert_eq!(Stride::from_quarts(4).unwrap(), Stride::Quarter);
        for bad in [0u8, 3, 5, 8] {
            assert!(Stride::from_quarts(bad).is_err(), "stride {bad} must fail");
        }
    }

    #[test]
    fn test_variant_selection_matrix() {
        for stride in [Stride::Full, Stride::Half, Stride::Quarter] {
            for compression in [false, true] {
                for flag in ChannelFlag::ALL {
                    let section = Section::new(0, 0, flag, stride, compression);
                    match (flag, compression) {
                        (ChannelFlag::StructStart, _) => {
                            assert!(matches!(section, Section::Structure(_)))
                        }
                        (ChannelFlag::Height, _) | (_, false) => {
                            assert!(
                                matches!(section, Section::Dense(_)),
                                "{flag:?} compression={compression}"
                            )
                        }
                        (_, true) => assert!(matches!(section, Section::Compressed(_))),
                    }
                }
            }
        }
    }

    #[test]
    fn test_origin_masked_to_section_boundary() {
        let section = Section::new(SECTION_SIZE + 5, -3, ChannelFlag::Biome, Stride::Full, false);
        assert_eq!(section.quart_x(), SECTION_SIZE);
        assert_eq!(section.quart_z(), -SECTION_SIZE);
    }

    #[test]
    fn test_dense_get_put_and_sentinel() {
        let section = DenseSection::new(0, 0, Stride::Full);
        assert_eq!(section.get(5, 9), NO_DATA);
        section.put(5, 9, 42);
        assert_eq!(section.get(5, 9), 42);
        assert_eq!(section.get(9, 5), NO_DATA);
    }

    #[test]
    fn test_dense_stride_groups_quarts() {
        let section = DenseSection::new(0, 0, Stride::Half);
        section.put(6, 10, 7);
        // The 2x2 quart group shares one cell
        assert_eq!(section.get(7, 11), 7);
        assert_eq!(section.get(6, 11), 7);
        assert_eq!(section.get(8, 10), NO_DATA);
    }

    #[test]
    fn test_compressed_deduplicates_values() {
        let section = CompressedSection::new(0, 0, Stride::Quarter);
        assert_eq!(section.distinct_values(), 0);
        for x in 0..16 {
            for z in 0..16 {
                section.put(x * 4, z * 4, 1);
            }
        }
        section.put(0, 4, 2);
        assert_eq!(section.distinct_values(), 2);
        assert_eq!(section.get(0, 4), 2);
        assert_eq!(section.get(4, 0), 1);
        assert_eq!(section.get(124, 127), 1);
    }

    #[test]
    fn test_structure_points() {
        let section = StructureSection::new(SECTION_SIZE, SECTION_SIZE);
        assert_eq!(section.get(3, 4), NO_DATA);
        section.put(3, 4, 17);
        section.put(100, 2, -5);
        assert_eq!(section.get(3, 4), 17);

        let mut points = section.points();
        points.sort();
        assert_eq!(
            points,
            vec![
                (SECTION_SIZE + 3, SECTION_SIZE + 4, 17),
                (SECTION_SIZE + 100, SECTION_SIZE + 2, -5)
            ]
        );
    }

    #[test]
    fn test_concurrent_puts_to_distinct_cells() {
        use std::sync::Arc;

        let section = Arc::new(Section::new(0, 0, ChannelFlag::Biome, Stride::Full, true));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let section = Arc::clone(&section);
                std::thread::spawn(move || {
                    for z in 0..SECTION_SIZE {
                        section.put(t * 16, z, (t * 16) as i16);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        for t in 0..8 {
            assert_eq!(section.get(t * 16, SECTION_SIZE - 1), (t * 16) as i16);
        }
    }
}
