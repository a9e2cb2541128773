//! MBTiles adapter: tiles and metadata in an SQLite database.
//!
//! MBTiles stores rows in the TMS scheme (y = 0 at the south edge), so both
//! directions of the adapter flip the y coordinate.

use std::collections::HashMap;
use std::path::Path;

use bytes::Bytes;
use md5::{Digest, Md5};
use rusqlite::{params, Connection, OpenFlags};

use crate::tile::{TileId, TileSink, TileSource};
use crate::{TilesError, TilesResult};

fn flip_y(tile_id: TileId) -> (u32, u32, u32) {
    (
        tile_id.x,
        (1u32 << tile_id.z) - 1 - tile_id.y,
        tile_id.z,
    )
}

/// Read-only MBTiles tileset.
pub struct MbTilesReader {
    conn: Connection,
}

impl MbTilesReader {
    /// Opens an existing MBTiles file read-only.
    pub fn open<P: AsRef<Path>>(path: P) -> TilesResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn })
    }

    /// Reads the `metadata` table into a map.
    pub fn read_metadata(&self) -> TilesResult<HashMap<String, String>> {
        let mut stmt = self.conn.prepare("SELECT name, value FROM metadata")?;
        let mut rows = stmt.query([])?;

        let mut metadata = HashMap::new();
        while let Some(row) = rows.next()? {
            metadata.insert(row.get(0)?, row.get(1)?);
        }
        Ok(metadata)
    }
}

impl TileSource for MbTilesReader {
    fn read_tile(&mut self, tile_id: TileId) -> TilesResult<Bytes> {
        let (x, y, z) = flip_y(tile_id);
        let mut stmt = self.conn.prepare_cached(
            "SELECT tile_data FROM tiles WHERE zoom_level = ?1 AND tile_column = ?2 AND tile_row = ?3",
        )?;

        match stmt.query_row(params![z, x, y], |row| row.get::<_, Vec<u8>>(0)) {
            Ok(data) => Ok(Bytes::from(data)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(Bytes::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn visit_tiles(
        &mut self,
        visitor: &mut dyn FnMut(TileId, &[u8]) -> TilesResult<()>,
    ) -> TilesResult<()> {
        let mut stmt = self
            .conn
            .prepare("SELECT zoom_level, tile_column, tile_row, tile_data FROM tiles")?;
        let mut rows = stmt.query([])?;

        while let Some(row) = rows.next()? {
            let z: u32 = row.get(0)?;
            let x: u32 = row.get(1)?;
            let y: u32 = row.get(2)?;
            let data: Vec<u8> = row.get(3)?;

            let tile_id = TileId::new(x, (1u32 << z) - 1 - y, z);
            visitor(tile_id, &data)?;
        }
        Ok(())
    }
}

/// Builder for creating a new MBTiles tileset.
pub struct MbTilesWriter {
    metadata: HashMap<String, String>,
    deduplicate: bool,
    optimizations: bool,
}

impl Default for MbTilesWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl MbTilesWriter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            metadata: HashMap::new(),
            deduplicate: true,
            optimizations: true,
        }
    }

    /// Sets the rows of the `metadata` table.
    #[must_use]
    pub fn metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Enables or disables content deduplication (enabled by default).
    ///
    /// When enabled, tile data is stored once in an `images` table and the
    /// `tiles` view joins it with the coordinate `map`.
    #[must_use]
    pub fn deduplicate(mut self, enable: bool) -> Self {
        self.deduplicate = enable;
        self
    }

    /// Enables or disables SQLite performance pragmas (enabled by default).
    ///
    /// When enabled, journaling and synchronous writes are off, so a crash
    /// or power loss can corrupt the output file.
    #[must_use]
    pub fn optimizations(mut self, enable: bool) -> Self {
        self.optimizations = enable;
        self
    }

    /// Creates the tileset at `path`. The path must not already exist.
    pub fn create<P: AsRef<Path>>(self, path: P) -> TilesResult<MbTilesStreamWriter> {
        let path = path.as_ref();
        if path.exists() {
            return Err(TilesError::FileExists(path.to_path_buf()));
        }

        let conn = Connection::open(path)?;

        if self.optimizations {
            conn.pragma_update(None, "synchronous", "OFF")?;
            conn.query_row("PRAGMA journal_mode = MEMORY", [], |_| Ok(()))?;
        }

        conn.execute_batch(
            "CREATE TABLE metadata (name TEXT, value TEXT);
             CREATE UNIQUE INDEX name ON metadata (name);",
        )?;
        for (name, value) in &self.metadata {
            conn.execute(
                "INSERT INTO metadata (name, value) VALUES (?1, ?2)",
                params![name, value],
            )?;
        }

        let data_ids = if self.deduplicate {
            conn.execute_batch(
                "CREATE TABLE map (
                     zoom_level INTEGER,
                     tile_column INTEGER,
                     tile_row INTEGER,
                     tile_id INTEGER,
                     PRIMARY KEY (zoom_level, tile_column, tile_row)
                 ) WITHOUT ROWID;
                 CREATE TABLE images (tile_id INTEGER PRIMARY KEY, tile_data BLOB);
                 CREATE VIEW tiles AS
                     SELECT zoom_level, tile_column, tile_row, tile_data
                     FROM map JOIN images USING (tile_id);",
            )?;
            Some(HashMap::new())
        } else {
            conn.execute_batch(
                "CREATE TABLE tiles (
                     zoom_level INTEGER,
                     tile_column INTEGER,
                     tile_row INTEGER,
                     tile_data BLOB
                 );",
            )?;
            None
        };

        Ok(MbTilesStreamWriter {
            conn,
            data_ids,
            finalized: false,
        })
    }
}

/// MBTiles tileset being written. [`TileSink::finalize`] must be called
/// before dropping it, otherwise the flat layout is left without its tile
/// index.
pub struct MbTilesStreamWriter {
    conn: Connection,
    data_ids: Option<HashMap<[u8; 16], i64>>, // content digest -> images row
    finalized: bool,
}

impl TileSink for MbTilesStreamWriter {
    fn write_tile(&mut self, tile_id: TileId, data: &[u8]) -> TilesResult<()> {
        if self.finalized {
            return Err(TilesError::WriteAfterFinalize);
        }
        let (x, y, z) = flip_y(tile_id);

        match &mut self.data_ids {
            Some(data_ids) => {
                let digest: [u8; 16] = Md5::digest(data).into();
                let tile_data_id = match data_ids.get(&digest) {
                    Some(&id) => id,
                    None => {
                        let id = data_ids.len() as i64;
                        data_ids.insert(digest, id);
                        self.conn
                            .prepare_cached(
                                "INSERT INTO images (tile_id, tile_data) VALUES (?1, ?2)",
                            )?
                            .execute(params![id, data])?;
                        id
                    }
                };
                self.conn
                    .prepare_cached(
                        "INSERT INTO map (zoom_level, tile_column, tile_row, tile_id)
                         VALUES (?1, ?2, ?3, ?4)",
                    )?
                    .execute(params![z, x, y, tile_data_id])?;
            }
            None => {
                self.conn
                    .prepare_cached(
                        "INSERT INTO tiles (zoom_level, tile_column, tile_row, tile_data)
                         VALUES (?1, ?2, ?3, ?4)",
                    )?
                    .execute(params![z, x, y, data])?;
            }
        }
        Ok(())
    }

    fn finalize(&mut self) -> TilesResult<()> {
        if self.finalized {
            return Err(TilesError::FinalizeTwice);
        }
        self.finalized = true;

        if self.data_ids.is_none() {
            self.conn.execute_batch(
                "CREATE UNIQUE INDEX tile_index ON tiles (zoom_level, tile_column, tile_row);",
            )?;
        }
        Ok(())
    }
}
