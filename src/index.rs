//! Flat tile index: a bare concatenation of fixed 24-byte records mapping
//! tile coordinates to byte ranges in a companion blob. Used by offline
//! export/import pipelines; records carry no required order at rest.

use std::io::Write;

use bytes::Buf;

use crate::tile::{Location, TileId};
use crate::TilesResult;

/// Serialized size of one [`IndexItem`].
pub const INDEX_ITEM_SIZE: usize = 24;

/// A single index record, little-endian on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexItem {
    pub x: u32,
    pub y: u32,
    pub z: u32,
    pub length: u32,
    pub offset: u64,
}

impl IndexItem {
    #[must_use]
    pub fn tile_id(&self) -> TileId {
        TileId::new(self.x, self.y, self.z)
    }

    #[must_use]
    pub fn location(&self) -> Location {
        Location {
            offset: self.offset,
            length: u64::from(self.length),
        }
    }
}

/// Writes one record.
pub fn write_index_item<W: Write>(item: &IndexItem, writer: &mut W) -> TilesResult<()> {
    writer.write_all(&item.x.to_le_bytes())?;
    writer.write_all(&item.y.to_le_bytes())?;
    writer.write_all(&item.z.to_le_bytes())?;
    writer.write_all(&item.length.to_le_bytes())?;
    writer.write_all(&item.offset.to_le_bytes())?;
    Ok(())
}

/// Writes all records back to back, without header or padding.
pub fn write_index<W: Write>(items: &[IndexItem], writer: &mut W) -> TilesResult<()> {
    for item in items {
        write_index_item(item, writer)?;
    }
    Ok(())
}

/// Reads all complete records; trailing partial bytes are ignored.
#[must_use]
pub fn read_index(data: &[u8]) -> Vec<IndexItem> {
    let mut data = data;
    let count = data.remaining() / INDEX_ITEM_SIZE;
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(IndexItem {
            x: data.get_u32_le(),
            y: data.get_u32_le(),
            z: data.get_u32_le(),
            length: data.get_u32_le(),
            offset: data.get_u64_le(),
        });
    }
    items
}

#[cfg(test)]
mod tests {
    use super::{read_index, write_index, IndexItem, INDEX_ITEM_SIZE};

    #[test]
    fn roundtrip() {
        let items = vec![
            IndexItem { x: 1, y: 2, z: 3, length: 4, offset: 5 },
            IndexItem { x: 0, y: 0, z: 0, length: 0, offset: u64::MAX },
            IndexItem { x: u32::MAX, y: u32::MAX, z: 31, length: 7, offset: 99 },
        ];
        let mut buffer = Vec::new();
        write_index(&items, &mut buffer).unwrap();
        assert_eq!(buffer.len(), items.len() * INDEX_ITEM_SIZE);
        assert_eq!(read_index(&buffer), items);
    }

    #[test]
    fn record_layout() {
        let item = IndexItem { x: 0x01, y: 0x02, z: 0x03, length: 0x04, offset: 0x05 };
        let mut buffer = Vec::new();
        write_index(&[item], &mut buffer).unwrap();
        assert_eq!(
            buffer,
            [
                1, 0, 0, 0, // x
                2, 0, 0, 0, // y
                3, 0, 0, 0, // z
                4, 0, 0, 0, // length
                5, 0, 0, 0, 0, 0, 0, 0, // offset
            ]
        );
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let mut buffer = Vec::new();
        write_index(&[IndexItem::default()], &mut buffer).unwrap();
        buffer.extend_from_slice(&[0xAB; 7]);
        assert_eq!(read_index(&buffer).len(), 1);
    }
}
