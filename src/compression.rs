use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::header::Compression;
use crate::{TilesError, TilesResult};

/// Compresses a byte buffer with the given compression.
///
/// Only [`Compression::None`] and [`Compression::Gzip`] are supported;
/// everything else fails with [`TilesError::UnsupportedCompression`].
pub fn compress(data: &[u8], compression: Compression) -> TilesResult<Vec<u8>> {
    match compression {
        Compression::None => Ok(data.to_vec()),
        Compression::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::best());
            encoder.write_all(data)?;
            Ok(encoder.finish()?)
        }
        other => Err(TilesError::UnsupportedCompression(other)),
    }
}

/// Inverse of [`compress`]. Accepts any conforming gzip stream.
pub fn decompress(data: &[u8], compression: Compression) -> TilesResult<Vec<u8>> {
    match compression {
        Compression::None => Ok(data.to_vec()),
        Compression::Gzip => {
            let mut decoder = GzDecoder::new(data);
            let mut result = Vec::new();
            decoder.read_to_end(&mut result)?;
            Ok(result)
        }
        other => Err(TilesError::UnsupportedCompression(other)),
    }
}
