//! # libtiles
//!
//! Reading, writing and converting map-tile archives.
//!
//! The core of the crate is the `PMTiles` v3 archive engine: a single-file,
//! random-access, deduplicated tile container clustered along a Hilbert
//! space-filling curve, with a compressed hierarchical directory index.
//! Adapters for MBTiles databases, XYZ directory trees and a flat tile
//! index side format share the [`TileSource`] / [`TileSink`] contracts.
//!
//! ## Examples
//!
//! ### Writing an archive
//! ```no_run
//! use libtiles::{PmTilesWriter, TileId, TileType};
//!
//! # fn main() -> libtiles::TilesResult<()> {
//! let mut writer = PmTilesWriter::new(TileType::Png).create("tiles.pmtiles")?;
//! writer.write_tile(TileId::new(0, 0, 0), b"tile bytes")?;
//! writer.finalize()?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Reading it back
//! ```no_run
//! use libtiles::{PmTilesReader, TileId};
//!
//! # fn main() -> libtiles::TilesResult<()> {
//! let mut reader = PmTilesReader::open_file("tiles.pmtiles")?;
//! let data = reader.read_tile(TileId::new(0, 0, 0))?;
//! # Ok(())
//! # }
//! ```

mod compression;
mod directory;
mod error;
mod header;
mod index;
mod mbtiles;
mod reader;
mod tile;
mod writer;
mod xyz;

pub use compression::{compress, decompress};
pub use directory::{DirEntry, Directory};
pub use error::{TilesError, TilesResult};
pub use header::{
    Compression, Header, TileType, HEADER_SIZE, MAX_INITIAL_BYTES, ROOT_DIR_MAX_LENGTH,
};
pub use index::{read_index, write_index, write_index_item, IndexItem, INDEX_ITEM_SIZE};
pub use mbtiles::{MbTilesReader, MbTilesStreamWriter, MbTilesWriter};
pub use reader::{Backend, FileBackend, MemoryBackend, PmTilesReader};
pub use tile::{
    decode_tile_id, encode_tile_id, Location, LocationSource, TileId, TileSink, TileSource,
    MAX_ZOOM,
};
pub use writer::{PmTilesStreamWriter, PmTilesWriter};
pub use xyz::{XyzReader, XyzWriter};
