//! Section key packing.
//!
//! Every stored section is addressed by a single u64 combining the section
//! X/Z coordinates (30 bits each, two's-complement truncated) and a 4-bit
//! channel flag:
//!
//! ```text
//! | 63 .. 34 | 33 .. 4 | 3 .. 0 |
//! | sectionX | sectionZ | flag  |
//! ```
//!
//! Negative section coordinates are represented purely by truncation to 30
//! bits; unpacking sign-extends them back. No bias is applied.

use crate::section::SECTION_SHIFT;

pub const FLAG_BITS: u32 = 4;
pub const FLAG_MASK: u64 = (1 << FLAG_BITS) - 1;

pub const XZ_BITS: u32 = 30;
pub const XZ_MASK: u64 = (1 << XZ_BITS) - 1;

pub const FLAG_SHIFT: u32 = 0;
pub const Z_SHIFT: u32 = FLAG_SHIFT + FLAG_BITS;
pub const X_SHIFT: u32 = Z_SHIFT + XZ_BITS;

/// What kind of sampled data a section holds.
///
/// Distinct channels at the same coordinate live in separate sections under
/// separate keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ChannelFlag {
    Biome = 0b0000,
    StructStart = 0b0001,
    Height = 0b0010,
    Intersect = 0b0011,
    StructRef = 0b1111,
}

impl ChannelFlag {
    pub const ALL: [ChannelFlag; 5] = [
        ChannelFlag::Biome,
        ChannelFlag::StructStart,
        ChannelFlag::Height,
        ChannelFlag::Intersect,
        ChannelFlag::StructRef,
    ];

    #[inline]
    pub fn bits(self) -> u64 {
        self as u64
    }
}

/// Pack section coordinates and a channel flag into a single key.
#[inline]
pub fn pack(section_x: i64, section_z: i64, flag: ChannelFlag) -> u64 {
    (section_x as u64 & XZ_MASK) << X_SHIFT
        | (section_z as u64 & XZ_MASK) << Z_SHIFT
        | (flag.bits() & FLAG_MASK) << FLAG_SHIFT
}

/// Pack from raw quart coordinates, shifting down to section coordinates
/// first.
#[inline]
pub fn pack_quart(quart_x: i32, quart_z: i32, flag: ChannelFlag) -> u64 {
    pack(
        (quart_x >> SECTION_SHIFT) as i64,
        (quart_z >> SECTION_SHIFT) as i64,
        flag,
    )
}

/// Recover the section X coordinate, sign-extending the 30-bit field.
#[inline]
pub fn unpack_x(key: u64) -> i64 {
    sign_extend((key >> X_SHIFT) & XZ_MASK)
}

/// Recover the section Z coordinate, sign-extending the 30-bit field.
#[inline]
pub fn unpack_z(key: u64) -> i64 {
    sign_extend((key >> Z_SHIFT) & XZ_MASK)
}

/// Recover the raw channel flag bits.
#[inline]
pub fn unpack_flag(key: u64) -> u8 {
    ((key >> FLAG_SHIFT) & FLAG_MASK) as u8
}

#[inline]
fn sign_extend(field: u64) -> i64 {
    ((field << (64 - XZ_BITS)) as i64) >> (64 - XZ_BITS)
}
