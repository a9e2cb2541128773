//! XYZ directory-tree adapter: tiles stored as individual files with paths
//! derived from a pattern like `tiles/{z}/{x}/{y}.png`.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use regex::Regex;
use walkdir::WalkDir;

use crate::tile::{TileId, TileSink, TileSource};
use crate::{TilesError, TilesResult};

fn validate_pattern(pattern: &str) -> TilesResult<()> {
    for placeholder in ["{x}", "{y}", "{z}"] {
        if !pattern.contains(placeholder) {
            return Err(TilesError::InvalidPattern(format!(
                "placeholder {placeholder} not found"
            )));
        }
    }
    Ok(())
}

fn format_pattern(pattern: &str, tile_id: TileId) -> String {
    pattern
        .replace("{x}", &tile_id.x.to_string())
        .replace("{y}", &tile_id.y.to_string())
        .replace("{z}", &tile_id.z.to_string())
}

/// Reads tiles from a directory tree.
pub struct XyzReader {
    pattern: String,
    root_dir: PathBuf,
    path_regex: Regex,
}

impl XyzReader {
    /// Creates a reader for the given file pattern
    /// (e.g. `/home/user/tiles/{z}/{x}/{y}.png`).
    pub fn new(pattern: &str) -> TilesResult<Self> {
        validate_pattern(pattern)?;

        let escaped = regex::escape(pattern)
            .replace(r"\{x\}", r"(?P<x>\d+)")
            .replace(r"\{y\}", r"(?P<y>\d+)")
            .replace(r"\{z\}", r"(?P<z>\d+)");
        let path_regex = Regex::new(&format!("^{escaped}$"))
            .map_err(|e| TilesError::InvalidPattern(e.to_string()))?;

        // The walk root is the longest common ancestor of any two formatted paths.
        let mut path0 = PathBuf::from(format_pattern(pattern, TileId::new(0, 0, 0)));
        let mut path1 = PathBuf::from(format_pattern(pattern, TileId::new(1, 1, 1)));
        while path0 != path1 {
            path0 = path0.parent().map(Path::to_path_buf).unwrap_or_default();
            path1 = path1.parent().map(Path::to_path_buf).unwrap_or_default();
        }

        Ok(Self {
            pattern: pattern.to_string(),
            root_dir: path0,
            path_regex,
        })
    }
}

impl TileSource for XyzReader {
    fn read_tile(&mut self, tile_id: TileId) -> TilesResult<Bytes> {
        match fs::read(format_pattern(&self.pattern, tile_id)) {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Bytes::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn visit_tiles(
        &mut self,
        visitor: &mut dyn FnMut(TileId, &[u8]) -> TilesResult<()>,
    ) -> TilesResult<()> {
        for entry in WalkDir::new(&self.root_dir) {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path().to_string_lossy();
            let Some(captures) = self.path_regex.captures(&path) else {
                continue;
            };
            let (Ok(x), Ok(y), Ok(z)) = (
                captures["x"].parse(),
                captures["y"].parse(),
                captures["z"].parse(),
            ) else {
                continue;
            };

            let data = fs::read(entry.path())?;
            visitor(TileId::new(x, y, z), &data)?;
        }
        Ok(())
    }
}

/// Writes tiles into a directory tree, creating directories as needed.
pub struct XyzWriter {
    pattern: String,
}

impl XyzWriter {
    /// Creates a writer for the given file pattern
    /// (e.g. `/home/user/tiles/{z}/{x}/{y}.png`).
    pub fn new(pattern: &str) -> TilesResult<Self> {
        validate_pattern(pattern)?;
        Ok(Self {
            pattern: pattern.to_string(),
        })
    }
}

impl TileSink for XyzWriter {
    fn write_tile(&mut self, tile_id: TileId, data: &[u8]) -> TilesResult<()> {
        let file_path = PathBuf::from(format_pattern(&self.pattern, tile_id));
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(file_path, data)?;
        Ok(())
    }

    fn finalize(&mut self) -> TilesResult<()> {
        Ok(())
    }
}
