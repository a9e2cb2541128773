use bytes::Bytes;
use hilbert_2d::{h2xy_discrete, xy2h_discrete, Variant};

use crate::TilesResult;

/// Maximum zoom level addressable by a 64-bit tile code.
pub const MAX_ZOOM: u32 = 31;

/// Tile coordinates in the XYZ scheme (Tiled web map): y = 0 is the north edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl TileId {
    #[must_use]
    pub fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.z <= MAX_ZOOM
            && u64::from(self.x) < 1u64 << self.z
            && u64::from(self.y) < 1u64 << self.z
    }
}

/// Absolute location of tile data inside an archive file.
///
/// A zero length means the tile is not present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Location {
    pub offset: u64,
    pub length: u64,
}

impl Location {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

/// Encodes tile coordinates into their global ordinal along the
/// zoom-concatenated Hilbert curve.
///
/// Zoom level z occupies codes `[(4^z - 1) / 3, (4^(z+1) - 1) / 3)`.
#[must_use]
pub fn encode_tile_id(tile_id: TileId) -> u64 {
    if tile_id.z == 0 {
        return 0;
    }

    let base_id = ((1u64 << (2 * tile_id.z)) - 1) / 3;
    let hilbert = xy2h_discrete(
        tile_id.x as usize,
        tile_id.y as usize,
        tile_id.z as usize,
        Variant::Hilbert,
    );

    base_id + hilbert as u64
}

/// Inverse of [`encode_tile_id`]; valid for any code below `2^62`.
#[must_use]
pub fn decode_tile_id(tile_code: u64) -> TileId {
    if tile_code == 0 {
        return TileId::new(0, 0, 0);
    }

    let z = (63 - (3 * tile_code + 1).leading_zeros()) / 2;
    let base_id = ((1u64 << (2 * z)) - 1) / 3;
    let (x, y) = h2xy_discrete((tile_code - base_id) as usize, z as usize, Variant::Hilbert);

    TileId::new(x as u32, y as u32, z)
}

/// A tileset that tiles can be read from.
///
/// Absent tiles are empty byte strings, never errors.
pub trait TileSource {
    fn read_tile(&mut self, tile_id: TileId) -> TilesResult<Bytes>;

    /// Visits every tile in the tileset. An error returned by the visitor
    /// aborts the traversal and propagates to the caller.
    ///
    /// Tile order, upfront CPU and memory consumption are implementation-defined.
    fn visit_tiles(
        &mut self,
        visitor: &mut dyn FnMut(TileId, &[u8]) -> TilesResult<()>,
    ) -> TilesResult<()>;
}

/// A tileset that tiles can be written to.
pub trait TileSink {
    fn write_tile(&mut self, tile_id: TileId, data: &[u8]) -> TilesResult<()>;

    /// Completes the writing process: flushes buffers, writes headers and
    /// indices. Must be called before dropping the sink.
    fn finalize(&mut self) -> TilesResult<()>;
}

/// A tileset that knows the physical location of each tile without
/// materializing its data.
pub trait LocationSource {
    fn read_location(&mut self, tile_id: TileId) -> TilesResult<Location>;

    fn visit_locations(
        &mut self,
        visitor: &mut dyn FnMut(TileId, Location) -> TilesResult<()>,
    ) -> TilesResult<()>;
}

#[cfg(test)]
mod tests {
    use super::{decode_tile_id, encode_tile_id, TileId};

    #[test]
    fn known_tile_codes() {
        assert_eq!(encode_tile_id(TileId::new(0, 0, 0)), 0);
        assert_eq!(encode_tile_id(TileId::new(0, 0, 1)), 1);
        assert_eq!(encode_tile_id(TileId::new(1, 0, 1)), 4);
        assert_eq!(encode_tile_id(TileId::new(1, 3, 2)), 11);
        assert_eq!(encode_tile_id(TileId::new(3, 0, 3)), 26);
    }

    #[test]
    fn zoom_level_bases() {
        // First code of each level is (4^z - 1) / 3.
        for z in 0..=20 {
            let base = ((1u64 << (2 * z)) - 1) / 3;
            assert_eq!(encode_tile_id(TileId::new(0, 0, z)), base, "z = {z}");
        }
    }

    #[test]
    fn roundtrip_low_zooms() {
        for z in 0..=6u32 {
            for x in 0..1u32 << z {
                for y in 0..1u32 << z {
                    let tile_id = TileId::new(x, y, z);
                    assert_eq!(decode_tile_id(encode_tile_id(tile_id)), tile_id);
                }
            }
        }
    }

    #[test]
    fn roundtrip_deep_zooms() {
        for z in [12, 20, 27, 30] {
            let max = (1u64 << z) - 1;
            for (x, y) in [
                (0, 0),
                (max, 0),
                (0, max),
                (max, max),
                (max / 2, max / 3),
                (12345 % (max + 1), 54321 % (max + 1)),
            ] {
                let tile_id = TileId::new(x as u32, y as u32, z);
                assert_eq!(decode_tile_id(encode_tile_id(tile_id)), tile_id);
            }
        }
    }

    #[test]
    fn roundtrip_codes() {
        for code in (0..1_000_000u64).step_by(997) {
            assert_eq!(encode_tile_id(decode_tile_id(code)), code);
        }
    }

    #[test]
    fn validity() {
        assert!(TileId::new(0, 0, 0).is_valid());
        assert!(!TileId::new(1, 0, 0).is_valid());
        assert!(TileId::new(3, 3, 2).is_valid());
        assert!(!TileId::new(4, 0, 2).is_valid());
        assert!(!TileId::new(0, 0, 32).is_valid());
    }
}
