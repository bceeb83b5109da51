//! Coordinate forms and quart conversions.
//!
//! A quart is the finest addressable grain of the preview: 4 blocks of
//! horizontal distance. Biome sampling happens at quart resolution, so all
//! storage in this crate is quart-addressed.

/// A block position in world space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

/// A chunk position (16x16 blocks horizontally).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl ChunkPos {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }
}

/// Convert a block coordinate to a quart coordinate.
#[inline]
pub fn quart_from_block(block: i32) -> i32 {
    block >> 2
}

/// Convert a quart coordinate back to its minimum block coordinate.
#[inline]
pub fn quart_to_block(quart: i32) -> i32 {
    quart << 2
}

/// Convert a chunk-section coordinate to a quart coordinate (4 quarts per
/// chunk).
#[inline]
pub fn quart_from_section(section: i32) -> i32 {
    section << 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quart_from_block() {
        assert_eq!(quart_from_block(0), 0);
        assert_eq!(quart_from_block(3), 0);
        assert_eq!(quart_from_block(4), 1);
        // Arithmetic shift keeps negatives flooring toward -inf
        assert_eq!(quart_from_block(-1), -1);
        assert_eq!(quart_from_block(-4), -1);
        assert_eq!(quart_from_block(-5), -2);
    }

    #[test]
    fn test_quart_block_round_trip() {
        for quart in [-1000, -1, 0, 1, 1000] {
            assert_eq!(quart_from_block(quart_to_block(quart)), quart);
        }
    }

    #[test]
    fn test_quart_from_section() {
        assert_eq!(quart_from_section(0), 0);
        assert_eq!(quart_from_section(1), 4);
        assert_eq!(quart_from_section(-2), -8);
        // A chunk is 16 blocks = 4 quarts
        assert_eq!(quart_from_section(3), quart_from_block(3 << 4));
    }
}
