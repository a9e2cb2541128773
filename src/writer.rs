use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Seek, SeekFrom, Write};
use std::path::Path;

use countio::Counter;
use log::debug;
use md5::{Digest, Md5};

use crate::compression::compress;
use crate::directory::{build_directories, compact_entries, DirEntry};
use crate::error::into_u32;
use crate::header::{Header, HEADER_SIZE, MAX_INITIAL_BYTES};
use crate::tile::encode_tile_id;
use crate::{Compression, TileId, TileSink, TileType, TilesError, TilesResult};

/// Builder for creating a new archive writer.
pub struct PmTilesWriter {
    header: Header,
    metadata: Option<Vec<u8>>,
}

impl PmTilesWriter {
    /// Creates a new `PMTiles` writer with default values.
    ///
    /// MVT tiles default to gzip tile compression, everything else to none.
    #[must_use]
    pub fn new(tile_type: TileType) -> Self {
        let tile_compression = match tile_type {
            TileType::Mvt => Compression::Gzip,
            _ => Compression::None,
        };
        Self {
            header: Header::new(tile_compression, tile_type),
            metadata: None,
        }
    }

    /// Sets the compression for directories and metadata.
    #[must_use]
    pub fn internal_compression(mut self, compression: Compression) -> Self {
        self.header.internal_compression = compression;
        self
    }

    /// Sets the compression of the tile data.
    ///
    /// Descriptive only: the caller is responsible for compressing tile
    /// bytes accordingly, the writer never transcodes them.
    #[must_use]
    pub fn tile_compression(mut self, compression: Compression) -> Self {
        self.header.tile_compression = compression;
        self
    }

    /// Sets the minimum zoom level of the tiles.
    #[must_use]
    pub fn min_zoom(mut self, level: u8) -> Self {
        self.header.min_zoom = level;
        self
    }

    /// Sets the maximum zoom level of the tiles.
    #[must_use]
    pub fn max_zoom(mut self, level: u8) -> Self {
        self.header.max_zoom = level;
        self
    }

    /// Sets the bounds of the tiles.
    #[must_use]
    pub fn bounds(mut self, min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        self.header.min_longitude = min_lon;
        self.header.min_latitude = min_lat;
        self.header.max_longitude = max_lon;
        self.header.max_latitude = max_lat;
        self
    }

    /// Sets the center position.
    #[must_use]
    pub fn center(mut self, lon: f64, lat: f64) -> Self {
        self.header.center_longitude = lon;
        self.header.center_latitude = lat;
        self
    }

    /// Sets the center zoom level.
    #[must_use]
    pub fn center_zoom(mut self, level: u8) -> Self {
        self.header.center_zoom = level;
        self
    }

    /// Sets the JSON metadata blob, stored with the internal compression.
    #[must_use]
    pub fn metadata(mut self, metadata: impl Into<Vec<u8>>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }

    /// Creates the archive at `path`.
    ///
    /// The path must not already exist; there is no support for appending
    /// to an existing archive.
    ///
    /// # Errors
    ///
    /// [`TilesError::FileExists`] if the path exists.
    pub fn create<P: AsRef<Path>>(self, path: P) -> TilesResult<PmTilesStreamWriter> {
        let path = path.as_ref();
        let file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(TilesError::FileExists(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };

        let mut out = Counter::new(BufWriter::new(file));

        // The layout permits one forward pass for bulk data and a short
        // backward seek at finalize:
        // +--------+----------------+----------+-----------+------------------+
        // | Header | Root Directory | Metadata | Tile Data | Leaf Directories |
        // +--------+----------------+----------+-----------+------------------+

        // Reserve space for the header and root directory.
        out.write_all(&[0u8; MAX_INITIAL_BYTES])?;

        let mut header = self.header;
        if let Some(metadata) = &self.metadata {
            let compressed = compress(metadata, header.internal_compression)?;
            out.write_all(&compressed)?;
            header.metadata_offset = MAX_INITIAL_BYTES as u64;
            header.metadata_length = compressed.len() as u64;
        }
        header.data_offset = out.writer_bytes() as u64;

        Ok(PmTilesStreamWriter {
            out,
            header,
            entries: Vec::new(),
            tile_offset: 0,
            locations: HashMap::new(),
            finalized: false,
        })
    }
}

/// Streaming `PMTiles` archive writer with content-addressed deduplication.
///
/// Tiles may be written in any order; entries are sorted into tile-code
/// order at finalize. [`PmTilesStreamWriter::finalize`] must be called to
/// produce a valid archive, and if it fails the file is left in an
/// unspecified state.
pub struct PmTilesStreamWriter {
    out: Counter<BufWriter<File>>,
    header: Header,
    entries: Vec<DirEntry>,
    tile_offset: u64,
    locations: HashMap<[u8; 16], u32>, // content digest -> entry index
    finalized: bool,
}

impl PmTilesStreamWriter {
    /// Writes a single tile.
    ///
    /// Zero-length data is a no-op. Content already present in the archive
    /// is referenced instead of being stored twice.
    pub fn write_tile(&mut self, tile_id: TileId, data: &[u8]) -> TilesResult<()> {
        if self.finalized {
            return Err(TilesError::WriteAfterFinalize);
        }
        if data.is_empty() {
            return Ok(());
        }

        let digest: [u8; 16] = Md5::digest(data).into();

        if let Some(&index) = self.locations.get(&digest) {
            let existing = self.entries[index as usize];
            self.entries.push(DirEntry {
                tile_id: encode_tile_id(tile_id),
                offset: existing.offset,
                length: existing.length,
                run_length: 1,
            });
            return Ok(());
        }

        let entry = DirEntry {
            tile_id: encode_tile_id(tile_id),
            offset: self.tile_offset,
            length: into_u32(data.len())?,
            run_length: 1,
        };

        self.out.write_all(data)?;
        self.tile_offset += data.len() as u64;

        self.locations.insert(digest, into_u32(self.entries.len())?);
        self.entries.push(entry);

        Ok(())
    }

    /// Completes the archive: sorts and compacts the entries, builds the
    /// directories, and patches the header.
    ///
    /// # Errors
    ///
    /// [`TilesError::FinalizeTwice`] on a second call. Any I/O failure
    /// leaves the file unusable as an archive.
    pub fn finalize(&mut self) -> TilesResult<()> {
        if self.finalized {
            return Err(TilesError::FinalizeTwice);
        }
        self.finalized = true;

        self.header.data_length = self.tile_offset;

        debug!("sorting {} entries", self.entries.len());
        self.entries.sort_unstable_by_key(|entry| entry.tile_id);

        debug!("compacting runs");
        compact_entries(&mut self.entries);

        self.header.addressed_tiles_count = self
            .entries
            .iter()
            .map(|entry| u64::from(entry.run_length))
            .sum();
        self.header.tile_entries_count = self.entries.len() as u64;
        self.header.tile_contents_count = self.locations.len() as u64;

        debug!("serializing directories");
        let (root, leaves) = build_directories(&self.entries, self.header.internal_compression)?;

        debug!("writing {} leaf directory bytes", leaves.len());
        self.header.leaf_offset = self.header.data_offset + self.header.data_length;
        self.header.leaf_length = leaves.len() as u64;
        self.out.write_all(&leaves)?;

        debug!("writing root directory ({} bytes)", root.len());
        self.header.root_offset = HEADER_SIZE as u64;
        self.header.root_length = root.len() as u64;
        self.out.seek(SeekFrom::Start(HEADER_SIZE as u64))?;
        self.out.write_all(&root)?;

        debug!("writing header");
        self.out.rewind()?;
        self.header.write_to(&mut self.out)?;

        self.out.flush()?;
        self.out.get_mut().get_mut().sync_all()?;

        debug!("done");
        Ok(())
    }
}

impl TileSink for PmTilesStreamWriter {
    fn write_tile(&mut self, tile_id: TileId, data: &[u8]) -> TilesResult<()> {
        PmTilesStreamWriter::write_tile(self, tile_id, data)
    }

    fn finalize(&mut self) -> TilesResult<()> {
        PmTilesStreamWriter::finalize(self)
    }
}
