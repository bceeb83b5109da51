//! Whole-store persistence codec.
//!
//! Big-endian stream layout:
//!
//! ```text
//! band_count: i32
//! per band:  entry_count: i32
//! per entry: key: u64, payload
//! payload:   tag: u8, quart_x: i32, quart_z: i32, variant data
//! ```
//!
//! Every payload carries its own variant tag and stride, so a stream saved
//! under one stride/compression configuration loads correctly under another:
//! sections reconstruct to the shape they were saved with.

use anyhow::{Context, Result, bail, ensure};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};

use crate::section::{CompressedSection, DenseSection, Section, Stride, StructureSection};
use crate::store::{Band, PreviewStore};

const TAG_DENSE: u8 = 0;
const TAG_COMPRESSED: u8 = 1;
const TAG_STRUCTURE: u8 = 2;

impl PreviewStore {
    /// Serialize the whole store in one pass, bands in order.
    pub fn save<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_i32::<BigEndian>(self.bands.len() as i32)?;
        let mut total = 0usize;
        for band in &self.bands {
            let sections = band.lock().expect("band lock poisoned");
            writer.write_i32::<BigEndian>(sections.len() as i32)?;
            for (&key, section) in sections.iter() {
                writer.write_u64::<BigEndian>(key)?;
                write_section(writer, section)?;
            }
            total += sections.len();
        }
        log::debug!("saved {} sections across {} bands", total, self.bands.len());
        Ok(())
    }

    /// Deserialize a stream previously produced by [`PreviewStore::save`].
    ///
    /// The encoded band count must match the count computed from this
    /// store's `[y_min, y_max]`; a mismatch fails without touching the
    /// store. Any decode failure likewise leaves the store unmodified: the
    /// new bands replace the old ones only after the whole stream decoded.
    pub fn load<R: Read>(&mut self, reader: &mut R) -> Result<()> {
        let band_count = reader.read_i32::<BigEndian>().context("reading band count")?;
        ensure!(
            band_count as i64 == self.bands.len() as i64,
            "band count mismatch: stream has {} but store expects {}",
            band_count,
            self.bands.len(),
        );

        let mut bands = Vec::with_capacity(self.bands.len());
        let mut total = 0usize;
        for index in 0..self.bands.len() {
            let entry_count = reader
                .read_i32::<BigEndian>()
                .with_context(|| format!("reading entry count of band {index}"))?;
            ensure!(entry_count >= 0, "negative entry count {entry_count} in band {index}");

            let mut sections = Band::with_capacity(entry_count as usize);
            for _ in 0..entry_count {
                let key = reader.read_u64::<BigEndian>()?;
                let section = read_section(reader)
                    .with_context(|| format!("decoding section {key:#018x} in band {index}"))?;
                sections.insert(key, Arc::new(section));
            }
            total += sections.len();
            bands.push(Mutex::new(sections));
        }

        self.bands = bands;
        log::debug!("loaded {} sections across {} bands", total, self.bands.len());
        Ok(())
    }
}

fn write_section<W: Write>(writer: &mut W, section: &Section) -> Result<()> {
    match section {
        Section::Dense(dense) => {
            writer.write_u8(TAG_DENSE)?;
            writer.write_i32::<BigEndian>(section.quart_x())?;
            writer.write_i32::<BigEndian>(section.quart_z())?;
            writer.write_u8(dense.stride().quarts())?;
            for cell in dense.raw_cells() {
                writer.write_i16::<BigEndian>(cell)?;
            }
        }
        Section::Compressed(compressed) => {
            writer.write_u8(TAG_COMPRESSED)?;
            writer.write_i32::<BigEndian>(section.quart_x())?;
            writer.write_i32::<BigEndian>(section.quart_z())?;
            writer.write_u8(compressed.stride().quarts())?;
            let (palette, cells) = compressed.snapshot();
            writer.write_u16::<BigEndian>(palette.len() as u16)?;
            for value in palette {
                writer.write_i16::<BigEndian>(value)?;
            }
            for code in cells {
                writer.write_u16::<BigEndian>(code)?;
            }
        }
        Section::Structure(structure) => {
            writer.write_u8(TAG_STRUCTURE)?;
            writer.write_i32::<BigEndian>(section.quart_x())?;
            writer.write_i32::<BigEndian>(section.quart_z())?;
            let points = structure.raw_points();
            writer.write_u32::<BigEndian>(points.len() as u32)?;
            for (key, value) in points {
                writer.write_u32::<BigEndian>(key)?;
                writer.write_i16::<BigEndian>(value)?;
            }
        }
    }
    Ok(())
}

fn read_section<R: Read>(reader: &mut R) -> Result<Section> {
    let tag = reader.read_u8()?;
    let quart_x = reader.read_i32::<BigEndian>()?;
    let quart_z = reader.read_i32::<BigEndian>()?;
    match tag {
        TAG_DENSE => {
            let stride = Stride::from_quarts(reader.read_u8()?).context("dense section stride")?;
            let n = stride.cells_per_axis();
            let mut cells = Vec::with_capacity(n * n);
            for _ in 0..n * n {
                cells.push(reader.read_i16::<BigEndian>()?);
            }
            Ok(Section::Dense(DenseSection::from_raw(quart_x, quart_z, stride, cells)))
        }
        TAG_COMPRESSED => {
            let stride =
                Stride::from_quarts(reader.read_u8()?).context("compressed section stride")?;
            let palette_len = reader.read_u16::<BigEndian>()?;
            let mut palette = Vec::with_capacity(palette_len as usize);
            for _ in 0..palette_len {
                palette.push(reader.read_i16::<BigEndian>()?);
            }
            let n = stride.cells_per_axis();
            let mut cells = Vec::with_capacity(n * n);
            for _ in 0..n * n {
                let code = reader.read_u16::<BigEndian>()?;
                ensure!(
                    code == u16::MAX || (code as usize) < palette.len(),
                    "palette code {code} out of range (palette size {palette_len})",
                );
                cells.push(code);
            }
            Ok(Section::Compressed(CompressedSection::from_raw(
                quart_x, quart_z, stride, palette, cells,
            )))
        }
        TAG_STRUCTURE => {
            let count = reader.read_u32::<BigEndian>()?;
            let mut points = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let key = reader.read_u32::<BigEndian>()?;
                let value = reader.read_i16::<BigEndian>()?;
                points.push((key, value));
            }
            Ok(Section::Structure(StructureSection::from_raw(quart_x, quart_z, points)))
        }
        other => bail!("unknown section variant tag {other}"),
    }
}
