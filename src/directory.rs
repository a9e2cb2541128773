use std::fmt::{Debug, Formatter};
use std::io::Write;

use bytes::{Buf, Bytes};
use varint_rs::{VarintReader, VarintWriter};

use crate::compression::compress;
use crate::error::into_u32;
use crate::header::{Compression, ROOT_DIR_MAX_LENGTH};
use crate::{TilesError, TilesResult};

/// A single directory record.
///
/// A `run_length` of zero marks a pointer into the leaf directory segment;
/// a positive `run_length` covers that many consecutive tile codes sharing
/// one data blob.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub tile_id: u64,
    pub offset: u64,
    pub length: u32,
    pub run_length: u32,
}

impl DirEntry {
    /// Whether this entry points at a leaf directory rather than tile data.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.run_length == 0
    }
}

/// A sorted list of directory entries.
pub struct Directory {
    entries: Vec<DirEntry>,
}

impl Debug for Directory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("Directory [entries: {}]", self.entries.len()))
    }
}

impl Directory {
    #[must_use]
    pub fn from_entries(entries: Vec<DirEntry>) -> Self {
        Self { entries }
    }

    #[must_use]
    pub fn entries(&self) -> &[DirEntry] {
        &self.entries
    }

    #[must_use]
    pub fn into_entries(self) -> Vec<DirEntry> {
        self.entries
    }

    /// Finds the entry covering `tile_id`: the greatest entry whose code is
    /// not above it, provided the run (if any) actually reaches `tile_id`.
    /// Pointer entries match unconditionally; the caller continues the
    /// search in the referenced leaf directory.
    #[must_use]
    pub fn find_tile_id(&self, tile_id: u64) -> Option<&DirEntry> {
        let next_idx = self.entries.partition_point(|e| e.tile_id <= tile_id);
        let entry = self.entries.get(next_idx.checked_sub(1)?)?;

        if entry.run_length == 0 || tile_id < entry.tile_id + u64::from(entry.run_length) {
            Some(entry)
        } else {
            None
        }
    }

    pub(crate) fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        serialize_entries(&self.entries, writer)
    }
}

/// Serializes entries as four columns of varints: delta-coded tile ids,
/// run lengths, lengths, and offsets (0 = contiguous with the previous blob,
/// otherwise the offset plus one).
fn serialize_entries<W: Write>(entries: &[DirEntry], writer: &mut W) -> std::io::Result<()> {
    writer.write_usize_varint(entries.len())?;

    let mut last_id = 0;
    for entry in entries {
        writer.write_u64_varint(entry.tile_id - last_id)?;
        last_id = entry.tile_id;
    }

    for entry in entries {
        writer.write_u32_varint(entry.run_length)?;
    }

    for entry in entries {
        writer.write_u32_varint(entry.length)?;
    }

    let mut next_offset = 0;
    for (i, entry) in entries.iter().enumerate() {
        if i > 0 && entry.offset == next_offset {
            writer.write_u64_varint(0)?;
        } else {
            writer.write_u64_varint(entry.offset + 1)?;
        }
        next_offset = entry.offset + u64::from(entry.length);
    }

    Ok(())
}

fn serialized_entries(entries: &[DirEntry]) -> TilesResult<Vec<u8>> {
    let mut buffer = Vec::new();
    serialize_entries(entries, &mut buffer)?;
    Ok(buffer)
}

impl TryFrom<Bytes> for Directory {
    type Error = TilesError;

    fn try_from(buffer: Bytes) -> TilesResult<Self> {
        let available = buffer.len();
        let mut buffer = buffer.reader();
        let n_entries = buffer
            .read_usize_varint()
            .map_err(|_| TilesError::InvalidDirectory)?;

        // Each entry occupies at least one byte per column.
        if n_entries > available / 4 {
            return Err(TilesError::InvalidDirectory);
        }

        let mut entries = vec![DirEntry::default(); n_entries];

        let mut next_tile_id = 0;
        for entry in &mut entries {
            next_tile_id += buffer
                .read_u64_varint()
                .map_err(|_| TilesError::InvalidDirectory)?;
            entry.tile_id = next_tile_id;
        }

        for entry in &mut entries {
            entry.run_length = buffer
                .read_u32_varint()
                .map_err(|_| TilesError::InvalidDirectory)?;
        }

        for entry in &mut entries {
            entry.length = buffer
                .read_u32_varint()
                .map_err(|_| TilesError::InvalidDirectory)?;
        }

        let mut previous: Option<(u64, u32)> = None;
        for entry in &mut entries {
            let offset = buffer
                .read_u64_varint()
                .map_err(|_| TilesError::InvalidDirectory)?;
            entry.offset = if offset == 0 {
                let (prev_offset, prev_length) = previous.ok_or(TilesError::InvalidDirectory)?;
                prev_offset + u64::from(prev_length)
            } else {
                offset - 1
            };
            previous = Some((entry.offset, entry.length));
        }

        Ok(Directory { entries })
    }
}

/// Merges consecutive entries with contiguous tile codes and an identical
/// blob into run-length entries. Every input entry must carry a run length
/// of one; each absorbed entry extends the run by exactly one.
pub(crate) fn compact_entries(entries: &mut Vec<DirEntry>) {
    if entries.is_empty() {
        return;
    }

    let mut wi = 0;
    for ri in 1..entries.len() {
        let current = entries[ri];
        let target = &mut entries[wi];
        if current.offset == target.offset
            && current.tile_id == target.tile_id + u64::from(target.run_length)
        {
            target.run_length += 1;
        } else {
            wi += 1;
            entries[wi] = current;
        }
    }
    entries.truncate(wi + 1);
}

/// Builds the compressed root directory and the concatenated leaf blob from
/// a sorted, compacted entry list.
///
/// The whole list is first tried as the root. When it exceeds the reserved
/// root window, entries are split into leaf chunks whose size grows
/// geometrically until the pointer-only root fits.
pub(crate) fn build_directories(
    entries: &[DirEntry],
    compression: Compression,
) -> TilesResult<(Vec<u8>, Vec<u8>)> {
    let mut root_compressed = compress(&serialized_entries(entries)?, compression)?;
    let mut leaves_compressed = Vec::new();

    if entries.is_empty() {
        return Ok((root_compressed, leaves_compressed));
    }

    let entry_count = entries.len() as f64;
    let entry_size = root_compressed.len() as f64 / entry_count;
    let target_root_size = ROOT_DIR_MAX_LENGTH as f64 * 0.9;

    let max_root_entries = target_root_size / entry_size;
    let min_leaf_entries = (entry_count / max_root_entries).max(4096.0);
    let mut leaf_num_entries = min_leaf_entries.max(entry_count.sqrt());

    while root_compressed.len() > ROOT_DIR_MAX_LENGTH {
        let mut root_entries = Vec::new();
        leaves_compressed.clear();

        for leaf_entries in entries.chunks(leaf_num_entries as usize) {
            let leaf_compressed = compress(&serialized_entries(leaf_entries)?, compression)?;

            root_entries.push(DirEntry {
                tile_id: leaf_entries[0].tile_id,
                offset: leaves_compressed.len() as u64,
                length: into_u32(leaf_compressed.len())?,
                run_length: 0,
            });

            leaves_compressed.extend_from_slice(&leaf_compressed);
        }

        root_compressed = compress(&serialized_entries(&root_entries)?, compression)?;

        leaf_num_entries *= 1.1;
    }

    Ok((root_compressed, leaves_compressed))
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::{build_directories, compact_entries, serialized_entries, DirEntry, Directory};
    use crate::compression::decompress;
    use crate::header::ROOT_DIR_MAX_LENGTH;
    use crate::{Compression, TilesError};

    fn roundtrip(entries: Vec<DirEntry>) -> Vec<DirEntry> {
        let data = serialized_entries(&entries).unwrap();
        Directory::try_from(Bytes::from(data)).unwrap().into_entries()
    }

    #[test]
    fn roundtrip_empty() {
        assert_eq!(serialized_entries(&[]).unwrap(), vec![0]);
        assert!(roundtrip(Vec::new()).is_empty());
    }

    #[test]
    fn roundtrip_entries() {
        let entries = vec![
            DirEntry { tile_id: 0, offset: 0, length: 100, run_length: 1 },
            DirEntry { tile_id: 1, offset: 100, length: 400, run_length: 4 },
            DirEntry { tile_id: 17, offset: 0, length: 100, run_length: 1 },
            DirEntry { tile_id: 25, offset: 500, length: 3, run_length: 2 },
        ];
        assert_eq!(roundtrip(entries.clone()), entries);
    }

    #[test]
    fn contiguous_offsets_encode_as_zero() {
        // Three contiguous blobs take one offset varint each; the trailing
        // two collapse to a single zero byte.
        let contiguous = vec![
            DirEntry { tile_id: 0, offset: 0, length: 10, run_length: 1 },
            DirEntry { tile_id: 1, offset: 10, length: 10, run_length: 1 },
            DirEntry { tile_id: 2, offset: 20, length: 10, run_length: 1 },
        ];
        let mut scattered = contiguous.clone();
        scattered[1].offset = 40;
        scattered[2].offset = 20;

        let contiguous_data = serialized_entries(&contiguous).unwrap();
        let scattered_data = serialized_entries(&scattered).unwrap();
        assert!(contiguous_data.len() < scattered_data.len());

        assert_eq!(roundtrip(contiguous.clone()), contiguous);
        assert_eq!(roundtrip(scattered.clone()), scattered);
    }

    #[test]
    fn truncated_input() {
        let entries = vec![
            DirEntry { tile_id: 5, offset: 1000, length: 50, run_length: 1 },
            DirEntry { tile_id: 9, offset: 2000, length: 60, run_length: 1 },
        ];
        let data = serialized_entries(&entries).unwrap();
        for cut in 1..data.len() {
            let result = Directory::try_from(Bytes::copy_from_slice(&data[..cut]));
            assert!(
                matches!(result, Err(TilesError::InvalidDirectory)),
                "cut = {cut}"
            );
        }
    }

    #[test]
    fn oversized_count_is_rejected() {
        // Claims 2^32 entries in a 3-byte buffer.
        let data = vec![0x80, 0x80, 0x80, 0x80, 0x10];
        let result = Directory::try_from(Bytes::from(data));
        assert!(matches!(result, Err(TilesError::InvalidDirectory)));
    }

    #[test]
    fn find_tile_id_runs_and_pointers() {
        let directory = Directory::from_entries(vec![
            DirEntry { tile_id: 5, offset: 0, length: 10, run_length: 3 },
            DirEntry { tile_id: 10, offset: 10, length: 10, run_length: 1 },
            DirEntry { tile_id: 20, offset: 20, length: 30, run_length: 0 },
        ]);

        assert!(directory.find_tile_id(4).is_none());
        assert_eq!(directory.find_tile_id(5).unwrap().offset, 0);
        assert_eq!(directory.find_tile_id(7).unwrap().offset, 0);
        assert!(directory.find_tile_id(8).is_none());
        assert_eq!(directory.find_tile_id(10).unwrap().offset, 10);
        assert!(directory.find_tile_id(11).is_none());
        // Pointer entries cover everything at or past their code.
        assert!(directory.find_tile_id(20).unwrap().is_leaf());
        assert!(directory.find_tile_id(1u64 << 40).unwrap().is_leaf());
    }

    #[test]
    fn compaction_merges_contiguous_runs() {
        let mut entries = vec![
            DirEntry { tile_id: 0, offset: 0, length: 1, run_length: 1 },
            DirEntry { tile_id: 1, offset: 0, length: 1, run_length: 1 },
            DirEntry { tile_id: 2, offset: 0, length: 1, run_length: 1 },
            DirEntry { tile_id: 3, offset: 0, length: 1, run_length: 1 },
            DirEntry { tile_id: 5, offset: 0, length: 1, run_length: 1 },
            DirEntry { tile_id: 6, offset: 1, length: 1, run_length: 1 },
        ];
        compact_entries(&mut entries);
        assert_eq!(
            entries,
            vec![
                DirEntry { tile_id: 0, offset: 0, length: 1, run_length: 4 },
                DirEntry { tile_id: 5, offset: 0, length: 1, run_length: 1 },
                DirEntry { tile_id: 6, offset: 1, length: 1, run_length: 1 },
            ]
        );
    }

    #[test]
    fn small_directory_fits_in_root() {
        let entries: Vec<DirEntry> = (0..100)
            .map(|i| DirEntry { tile_id: i, offset: i * 10, length: 10, run_length: 1 })
            .collect();
        let (root, leaves) = build_directories(&entries, Compression::Gzip).unwrap();
        assert!(root.len() <= ROOT_DIR_MAX_LENGTH);
        assert!(leaves.is_empty());

        let decoded = decompress(&root, Compression::Gzip).unwrap();
        let directory = Directory::try_from(Bytes::from(decoded)).unwrap();
        assert_eq!(directory.into_entries(), entries);
    }

    #[test]
    fn large_directory_splits_into_leaves() {
        let entries: Vec<DirEntry> = (0..100_000u64)
            .map(|i| DirEntry {
                tile_id: i * 3,
                offset: i * 1000,
                length: 997,
                run_length: 1,
            })
            .collect();

        let (root, leaves) = build_directories(&entries, Compression::Gzip).unwrap();
        assert!(root.len() <= ROOT_DIR_MAX_LENGTH);
        assert!(!leaves.is_empty());

        // Walking every pointer reassembles the input list in order.
        let decoded = decompress(&root, Compression::Gzip).unwrap();
        let root_directory = Directory::try_from(Bytes::from(decoded)).unwrap();
        let mut reassembled = Vec::new();
        for pointer in root_directory.entries() {
            assert!(pointer.is_leaf());
            let start = usize::try_from(pointer.offset).unwrap();
            let end = start + pointer.length as usize;
            let leaf = decompress(&leaves[start..end], Compression::Gzip).unwrap();
            let leaf_directory = Directory::try_from(Bytes::from(leaf)).unwrap();
            assert_eq!(pointer.tile_id, leaf_directory.entries()[0].tile_id);
            reassembled.extend_from_slice(leaf_directory.entries());
        }
        assert_eq!(reassembled, entries);
    }
}
