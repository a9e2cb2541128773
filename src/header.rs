use std::io::Write;

use bytes::{Buf, Bytes};

use crate::{TilesError, TilesResult};

/// Size of the serialized header in bytes.
pub const HEADER_SIZE: usize = 127;

/// The root directory must be contained in the first 16 KiB of the archive.
pub const MAX_INITIAL_BYTES: usize = 16_384;

/// Upper bound on the compressed root directory, `MAX_INITIAL_BYTES - HEADER_SIZE`.
pub const ROOT_DIR_MAX_LENGTH: usize = MAX_INITIAL_BYTES - HEADER_SIZE;

static V3_MAGIC: &str = "PMTiles";

/// The fixed-size header at offset 0 of a `PMTiles` archive.
///
/// Byte ranges and counts are maintained by the writer; the trailing
/// descriptive fields (zooms, bounds, center) pass through unvalidated.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub version: u8,
    pub root_offset: u64,
    pub root_length: u64,
    pub metadata_offset: u64,
    pub metadata_length: u64,
    pub leaf_offset: u64,
    pub leaf_length: u64,
    pub data_offset: u64,
    pub data_length: u64,
    pub addressed_tiles_count: u64,
    pub tile_entries_count: u64,
    pub tile_contents_count: u64,
    /// Whether the tile data segment is laid out in tile-code order.
    pub clustered: bool,
    /// Compression of the directories and the metadata blob.
    pub internal_compression: Compression,
    /// Compression of tile data. Descriptive only, tile bytes are never transcoded.
    pub tile_compression: Compression,
    pub tile_type: TileType,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub min_longitude: f64,
    pub min_latitude: f64,
    pub max_longitude: f64,
    pub max_latitude: f64,
    pub center_zoom: u8,
    pub center_longitude: f64,
    pub center_latitude: f64,
}

impl Header {
    pub(crate) fn new(tile_compression: Compression, tile_type: TileType) -> Self {
        Self {
            version: 3,
            root_offset: HEADER_SIZE as u64,
            root_length: 0,
            metadata_offset: 0,
            metadata_length: 0,
            leaf_offset: 0,
            leaf_length: 0,
            data_offset: 0,
            data_length: 0,
            addressed_tiles_count: 0,
            tile_entries_count: 0,
            tile_contents_count: 0,
            clustered: true,
            internal_compression: Compression::Gzip,
            tile_compression,
            tile_type,
            min_zoom: 0,
            max_zoom: 22,
            min_longitude: -180.0,
            min_latitude: -85.051_129,
            max_longitude: 180.0,
            max_latitude: 85.051_129,
            center_zoom: 0,
            center_longitude: 0.0,
            center_latitude: 0.0,
        }
    }

    fn read_coordinate_part<B: Buf>(mut buf: B) -> f64 {
        f64::from(buf.get_i32_le()) / 10_000_000.
    }

    #[expect(clippy::cast_possible_truncation)]
    fn write_coordinate_part<W: Write>(writer: &mut W, value: f64) -> std::io::Result<()> {
        writer.write_all(&((value * 10_000_000.0).round() as i32).to_le_bytes())
    }

    /// Attempts to parse a header from a byte buffer.
    ///
    /// # Errors
    ///
    /// [`TilesError::InvalidHeader`] if the buffer is truncated or the magic
    /// bytes are absent, [`TilesError::UnsupportedPmTilesVersion`] if the
    /// version byte is not 3.
    pub fn try_from_bytes(mut bytes: Bytes) -> TilesResult<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(TilesError::InvalidHeader);
        }

        let magic_bytes = bytes.split_to(V3_MAGIC.len());
        if magic_bytes != V3_MAGIC.as_bytes() {
            return Err(TilesError::InvalidHeader);
        }

        let version = bytes.get_u8();
        if version != 3 {
            return Err(TilesError::UnsupportedPmTilesVersion);
        }

        Ok(Self {
            version,
            root_offset: bytes.get_u64_le(),
            root_length: bytes.get_u64_le(),
            metadata_offset: bytes.get_u64_le(),
            metadata_length: bytes.get_u64_le(),
            leaf_offset: bytes.get_u64_le(),
            leaf_length: bytes.get_u64_le(),
            data_offset: bytes.get_u64_le(),
            data_length: bytes.get_u64_le(),
            addressed_tiles_count: bytes.get_u64_le(),
            tile_entries_count: bytes.get_u64_le(),
            tile_contents_count: bytes.get_u64_le(),
            clustered: bytes.get_u8() == 1,
            internal_compression: bytes.get_u8().try_into()?,
            tile_compression: bytes.get_u8().try_into()?,
            tile_type: bytes.get_u8().try_into()?,
            min_zoom: bytes.get_u8(),
            max_zoom: bytes.get_u8(),
            min_longitude: Self::read_coordinate_part(&mut bytes),
            min_latitude: Self::read_coordinate_part(&mut bytes),
            max_longitude: Self::read_coordinate_part(&mut bytes),
            max_latitude: Self::read_coordinate_part(&mut bytes),
            center_zoom: bytes.get_u8(),
            center_longitude: Self::read_coordinate_part(&mut bytes),
            center_latitude: Self::read_coordinate_part(&mut bytes),
        })
    }

    /// Writes the exact 127-byte little-endian header layout.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(V3_MAGIC.as_bytes())?;
        writer.write_all(&[self.version])?;

        writer.write_all(&self.root_offset.to_le_bytes())?;
        writer.write_all(&self.root_length.to_le_bytes())?;
        writer.write_all(&self.metadata_offset.to_le_bytes())?;
        writer.write_all(&self.metadata_length.to_le_bytes())?;
        writer.write_all(&self.leaf_offset.to_le_bytes())?;
        writer.write_all(&self.leaf_length.to_le_bytes())?;
        writer.write_all(&self.data_offset.to_le_bytes())?;
        writer.write_all(&self.data_length.to_le_bytes())?;
        writer.write_all(&self.addressed_tiles_count.to_le_bytes())?;
        writer.write_all(&self.tile_entries_count.to_le_bytes())?;
        writer.write_all(&self.tile_contents_count.to_le_bytes())?;
        writer.write_all(&[u8::from(self.clustered)])?;
        writer.write_all(&[self.internal_compression as u8])?;
        writer.write_all(&[self.tile_compression as u8])?;
        writer.write_all(&[self.tile_type as u8])?;
        writer.write_all(&[self.min_zoom])?;
        writer.write_all(&[self.max_zoom])?;
        Self::write_coordinate_part(writer, self.min_longitude)?;
        Self::write_coordinate_part(writer, self.min_latitude)?;
        Self::write_coordinate_part(writer, self.max_longitude)?;
        Self::write_coordinate_part(writer, self.max_latitude)?;
        writer.write_all(&[self.center_zoom])?;
        Self::write_coordinate_part(writer, self.center_longitude)?;
        Self::write_coordinate_part(writer, self.center_latitude)?;

        Ok(())
    }
}

/// Supported compression types for `PMTiles` data.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum Compression {
    /// Unknown compression.
    Unknown,
    /// No compression.
    None,
    /// Gzip compression.
    Gzip,
    /// Brotli compression.
    Brotli,
    /// Zstandard compression.
    Zstd,
}

impl TryInto<Compression> for u8 {
    type Error = TilesError;

    fn try_into(self) -> Result<Compression, Self::Error> {
        match self {
            0 => Ok(Compression::Unknown),
            1 => Ok(Compression::None),
            2 => Ok(Compression::Gzip),
            3 => Ok(Compression::Brotli),
            4 => Ok(Compression::Zstd),
            _ => Err(TilesError::InvalidCompression),
        }
    }
}

/// Supported tile types for `PMTiles`.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum TileType {
    /// Unknown tile type.
    Unknown,
    /// Mapbox Vector Tile.
    Mvt,
    /// PNG image tile.
    Png,
    /// JPEG image tile.
    Jpeg,
    /// WebP image tile.
    Webp,
    /// AVIF image tile.
    Avif,
}

impl TileType {
    #[must_use]
    /// Returns the MIME content type for this tile type.
    pub fn content_type(self) -> &'static str {
        match self {
            TileType::Mvt => "application/vnd.mapbox-vector-tile",
            TileType::Png => "image/png",
            TileType::Jpeg => "image/jpeg",
            TileType::Webp => "image/webp",
            TileType::Avif => "image/avif",
            TileType::Unknown => "application/octet-stream",
        }
    }
}

impl TryInto<TileType> for u8 {
    type Error = TilesError;

    fn try_into(self) -> Result<TileType, Self::Error> {
        match self {
            0 => Ok(TileType::Unknown),
            1 => Ok(TileType::Mvt),
            2 => Ok(TileType::Png),
            3 => Ok(TileType::Jpeg),
            4 => Ok(TileType::Webp),
            5 => Ok(TileType::Avif),
            _ => Err(TilesError::InvalidTileType),
        }
    }
}
