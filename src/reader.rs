use std::collections::VecDeque;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use bytes::Bytes;

use crate::compression::decompress;
use crate::directory::{DirEntry, Directory};
use crate::header::{Header, HEADER_SIZE};
use crate::tile::{decode_tile_id, encode_tile_id, Location};
use crate::{LocationSource, TileId, TileSource, TilesError, TilesResult};

/// An abstract range-read source: local files, memory buffers, or anything
/// else that can serve byte ranges.
pub trait Backend {
    /// Reads exactly `length` bytes starting at `offset`.
    fn read(&mut self, offset: u64, length: usize) -> TilesResult<Bytes>;
}

/// Range reads on a local file.
pub struct FileBackend {
    file: File,
}

impl FileBackend {
    pub fn open<P: AsRef<Path>>(path: P) -> TilesResult<Self> {
        Ok(Self {
            file: File::open(path)?,
        })
    }
}

impl Backend for FileBackend {
    fn read(&mut self, offset: u64, length: usize) -> TilesResult<Bytes> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0; length];
        self.file.read_exact(&mut buffer)?;
        Ok(Bytes::from(buffer))
    }
}

/// Range reads on an in-memory buffer.
pub struct MemoryBackend {
    data: Bytes,
}

impl MemoryBackend {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }
}

impl Backend for MemoryBackend {
    fn read(&mut self, offset: u64, length: usize) -> TilesResult<Bytes> {
        let start = usize::try_from(offset).map_err(|_| eof())?;
        let end = start.checked_add(length).ok_or_else(eof)?;
        if end > self.data.len() {
            return Err(eof());
        }
        Ok(self.data.slice(start..end))
    }
}

fn eof() -> TilesError {
    std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into()
}

/// `PMTiles` archive reader over an abstract [`Backend`].
///
/// Non-existent tiles are empty results, never errors.
pub struct PmTilesReader<B> {
    backend: B,
    header: Header,
}

impl PmTilesReader<FileBackend> {
    /// Opens an archive from a local file path.
    pub fn open_file<P: AsRef<Path>>(path: P) -> TilesResult<Self> {
        Self::try_from_backend(FileBackend::open(path)?)
    }
}

impl PmTilesReader<MemoryBackend> {
    /// Opens an archive held in memory.
    pub fn open_memory(data: impl Into<Bytes>) -> TilesResult<Self> {
        Self::try_from_backend(MemoryBackend::new(data))
    }
}

impl<B: Backend> PmTilesReader<B> {
    /// Creates a reader from a range-read source, validating the header.
    pub fn try_from_backend(mut backend: B) -> TilesResult<Self> {
        let header_bytes = backend.read(0, HEADER_SIZE)?;
        let header = Header::try_from_bytes(header_bytes)?;
        Ok(Self { backend, header })
    }

    /// Access header information.
    #[must_use]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Reads and decompresses the metadata blob. Empty when absent.
    pub fn read_metadata(&mut self) -> TilesResult<Vec<u8>> {
        if self.header.metadata_length == 0 {
            return Ok(Vec::new());
        }
        let compressed = self.backend.read(
            self.header.metadata_offset,
            self.header.metadata_length as usize,
        )?;
        decompress(&compressed, self.header.internal_compression)
    }

    /// Resolves the location of a tile by walking the root directory and,
    /// if indicated, a leaf directory.
    ///
    /// Returns a zero [`Location`] when the tile is not present.
    pub fn read_location(&mut self, tile_id: TileId) -> TilesResult<Location> {
        let tile_code = encode_tile_id(tile_id);
        let mut dir_offset = self.header.root_offset;
        let mut dir_length = self.header.root_length as usize;

        loop {
            let directory = self.read_directory(dir_offset, dir_length)?;
            let Some(entry) = directory.find_tile_id(tile_code) else {
                return Ok(Location::default());
            };
            if entry.run_length > 0 {
                return Ok(Location {
                    offset: self.header.data_offset + entry.offset,
                    length: u64::from(entry.length),
                });
            }
            dir_offset = self.header.leaf_offset + entry.offset;
            dir_length = entry.length as usize;
        }
    }

    /// Reads a single tile. Empty bytes when the tile is not present.
    pub fn read_tile(&mut self, tile_id: TileId) -> TilesResult<Bytes> {
        let location = self.read_location(tile_id)?;
        if location.is_empty() {
            return Ok(Bytes::new());
        }
        self.backend
            .read(location.offset, location.length as usize)
    }

    /// Visits the location of every addressed tile in Hilbert-code order.
    pub fn visit_locations(
        &mut self,
        visitor: &mut dyn FnMut(TileId, Location) -> TilesResult<()>,
    ) -> TilesResult<()> {
        let data_offset = self.header.data_offset;
        self.visit_entries(&mut |_, entry| {
            let location = Location {
                offset: data_offset + entry.offset,
                length: u64::from(entry.length),
            };
            for i in 0..entry.run_length {
                visitor(decode_tile_id(entry.tile_id + u64::from(i)), location)?;
            }
            Ok(())
        })
    }

    /// Visits every addressed tile and its data in Hilbert-code order.
    ///
    /// A run of deduplicated tiles is read from the archive once and handed
    /// to the visitor once per addressed tile.
    pub fn visit_tiles(
        &mut self,
        visitor: &mut dyn FnMut(TileId, &[u8]) -> TilesResult<()>,
    ) -> TilesResult<()> {
        let data_offset = self.header.data_offset;
        self.visit_entries(&mut |backend, entry| {
            let data = backend.read(data_offset + entry.offset, entry.length as usize)?;
            for i in 0..entry.run_length {
                visitor(decode_tile_id(entry.tile_id + u64::from(i)), &data)?;
            }
            Ok(())
        })
    }

    /// Pre-order traversal over all non-pointer entries. Entries of a leaf
    /// directory are spliced in place of their pointer to preserve order.
    fn visit_entries(
        &mut self,
        visit: &mut dyn FnMut(&mut B, &DirEntry) -> TilesResult<()>,
    ) -> TilesResult<()> {
        let root = self.read_directory(self.header.root_offset, self.header.root_length as usize)?;
        let mut queue: VecDeque<DirEntry> = root.into_entries().into();

        while let Some(entry) = queue.pop_front() {
            if entry.is_leaf() {
                let leaf = self
                    .read_directory(self.header.leaf_offset + entry.offset, entry.length as usize)?;
                for child in leaf.into_entries().into_iter().rev() {
                    queue.push_front(child);
                }
            } else {
                visit(&mut self.backend, &entry)?;
            }
        }

        Ok(())
    }

    fn read_directory(&mut self, offset: u64, length: usize) -> TilesResult<Directory> {
        let compressed = self.backend.read(offset, length)?;
        let data = decompress(&compressed, self.header.internal_compression)?;
        Directory::try_from(Bytes::from(data))
    }
}

impl<B: Backend> TileSource for PmTilesReader<B> {
    fn read_tile(&mut self, tile_id: TileId) -> TilesResult<Bytes> {
        PmTilesReader::read_tile(self, tile_id)
    }

    fn visit_tiles(
        &mut self,
        visitor: &mut dyn FnMut(TileId, &[u8]) -> TilesResult<()>,
    ) -> TilesResult<()> {
        PmTilesReader::visit_tiles(self, visitor)
    }
}

impl<B: Backend> LocationSource for PmTilesReader<B> {
    fn read_location(&mut self, tile_id: TileId) -> TilesResult<Location> {
        PmTilesReader::read_location(self, tile_id)
    }

    fn visit_locations(
        &mut self,
        visitor: &mut dyn FnMut(TileId, Location) -> TilesResult<()>,
    ) -> TilesResult<()> {
        PmTilesReader::visit_locations(self, visitor)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::{Backend, MemoryBackend, PmTilesReader};
    use crate::TilesError;

    #[test]
    fn memory_backend_ranges() {
        let mut backend = MemoryBackend::new(Bytes::from_static(b"0123456789"));
        assert_eq!(backend.read(0, 3).unwrap(), "012");
        assert_eq!(backend.read(7, 3).unwrap(), "789");
        assert!(backend.read(7, 4).is_err());
        assert!(backend.read(11, 0).is_err());
    }

    #[test]
    fn header_too_short() {
        let result = PmTilesReader::open_memory(Bytes::from_static(b"foobar"));
        assert!(matches!(result, Err(TilesError::Io(_))));
    }

    #[test]
    fn header_garbage() {
        let result = PmTilesReader::open_memory(vec![0xA5; 127]);
        assert!(matches!(result, Err(TilesError::InvalidHeader)));
    }
}
