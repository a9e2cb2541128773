use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use clap::Parser;
use libtiles::{
    Compression, Header, MbTilesReader, MbTilesWriter, PmTilesReader, PmTilesWriter, TileSink,
    TileSource, TileType, XyzReader, XyzWriter,
};

use crate::formats::{deduce_format, spinner, Format};

#[derive(Parser, Debug)]
pub struct Args {
    /// Input path
    #[arg(short = 'i', long = "input")]
    input: String,
    /// Input format; deduced from the path suffix when omitted
    #[arg(long = "if", value_enum, value_name = "FORMAT")]
    input_format: Option<Format>,
    /// Output path
    #[arg(short = 'o', long = "output")]
    output: String,
    /// Output format; deduced from the path suffix when omitted
    #[arg(long = "of", value_enum, value_name = "FORMAT")]
    output_format: Option<Format>,
    /// Deduplicate tiles (for the mbtiles output format)
    #[arg(short = 'd', long = "dedup", default_value_t = true, action = clap::ArgAction::Set, value_name = "BOOL")]
    deduplicate: bool,
}

pub fn run(args: Args) -> anyhow::Result<()> {
    let input_format = deduce_format(args.input_format, &args.input).unwrap_or(Format::Xyz);
    let output_format = deduce_format(args.output_format, &args.output).unwrap_or(Format::Xyz);

    let mut mb_metadata: HashMap<String, String> = HashMap::new();
    let mut pm_header: Option<Header> = None;
    let mut pm_json_metadata: Option<Vec<u8>> = None;

    let mut source: Box<dyn TileSource> = match input_format {
        Format::Mbtiles => {
            let reader = MbTilesReader::open(&args.input)
                .with_context(|| format!("failed to open {}", args.input))?;
            mb_metadata = reader.read_metadata()?;
            Box::new(reader)
        }
        Format::Pmtiles => {
            let mut reader = PmTilesReader::open_file(&args.input)
                .with_context(|| format!("failed to open {}", args.input))?;
            pm_header = Some(reader.header().clone());
            pm_json_metadata = Some(reader.read_metadata()?);
            Box::new(reader)
        }
        Format::Xyz => Box::new(XyzReader::new(&args.input)?),
    };

    let mut sink: Box<dyn TileSink> = match output_format {
        Format::Mbtiles => {
            let metadata = match &pm_header {
                Some(header) => metadata_pm_to_mb(header, &args.input),
                None => mb_metadata.clone(),
            };
            Box::new(
                MbTilesWriter::new()
                    .metadata(metadata)
                    .deduplicate(args.deduplicate)
                    .create(&args.output)?,
            )
        }
        Format::Pmtiles => {
            let mut builder = match input_format {
                Format::Mbtiles => metadata_mb_to_pm(&mb_metadata)?,
                Format::Pmtiles => builder_from_header(pm_header.as_ref().context("missing header")?),
                Format::Xyz => PmTilesWriter::new(TileType::Unknown),
            };
            if let Some(metadata) = pm_json_metadata.take().filter(|m| !m.is_empty()) {
                builder = builder.metadata(metadata);
            } else if let Some(json) = mb_metadata.get("json") {
                builder = builder.metadata(json.clone().into_bytes());
            }
            Box::new(builder.create(&args.output)?)
        }
        Format::Xyz => Box::new(XyzWriter::new(&args.output)?),
    };

    let progress = spinner();
    let result = source.visit_tiles(&mut |tile_id, data| {
        sink.write_tile(tile_id, data)?;
        progress.inc(1);
        Ok(())
    });
    progress.finish();
    result.context("conversion failed")?;

    sink.finalize().context("failed to finalize output")?;
    Ok(())
}

/// Maps MBTiles metadata rows onto PMTiles header fields.
fn metadata_mb_to_pm(metadata: &HashMap<String, String>) -> anyhow::Result<PmTilesWriter> {
    let (tile_type, tile_compression) = match metadata.get("format").map(String::as_str) {
        Some("pbf") => (TileType::Mvt, Compression::Gzip),
        Some("png") => (TileType::Png, Compression::None),
        Some("jpg") => (TileType::Jpeg, Compression::None),
        Some("webp") => (TileType::Webp, Compression::None),
        Some("avif") => (TileType::Avif, Compression::None),
        _ => (TileType::Unknown, Compression::Unknown),
    };
    let mut builder = PmTilesWriter::new(tile_type).tile_compression(tile_compression);

    if let Some(bounds) = metadata.get("bounds") {
        let coords = parse_floats(bounds, 4).context("invalid bounds metadata")?;
        builder = builder.bounds(coords[0], coords[1], coords[2], coords[3]);
    }
    if let Some(center) = metadata.get("center") {
        let parts = parse_floats(center, 3).context("invalid center metadata")?;
        builder = builder.center(parts[0], parts[1]).center_zoom(parts[2] as u8);
    }
    if let Some(minzoom) = metadata.get("minzoom") {
        builder = builder.min_zoom(minzoom.trim().parse().context("invalid minzoom metadata")?);
    }
    if let Some(maxzoom) = metadata.get("maxzoom") {
        builder = builder.max_zoom(maxzoom.trim().parse().context("invalid maxzoom metadata")?);
    }

    Ok(builder)
}

/// Maps PMTiles header fields onto MBTiles metadata rows.
fn metadata_pm_to_mb(header: &Header, input_path: &str) -> HashMap<String, String> {
    let mut metadata = HashMap::new();

    let format = match header.tile_type {
        TileType::Mvt => Some("pbf"),
        TileType::Png => Some("png"),
        TileType::Jpeg => Some("jpg"),
        TileType::Webp => Some("webp"),
        TileType::Avif => Some("avif"),
        TileType::Unknown => None,
    };
    if let Some(format) = format {
        metadata.insert("format".to_string(), format.to_string());
    }
    if let Some(name) = Path::new(input_path).file_name() {
        metadata.insert("name".to_string(), name.to_string_lossy().into_owned());
    }

    metadata
}

fn builder_from_header(header: &Header) -> PmTilesWriter {
    let mut builder = PmTilesWriter::new(header.tile_type)
        .tile_compression(header.tile_compression)
        .min_zoom(header.min_zoom)
        .max_zoom(header.max_zoom)
        .bounds(
            header.min_longitude,
            header.min_latitude,
            header.max_longitude,
            header.max_latitude,
        )
        .center(header.center_longitude, header.center_latitude)
        .center_zoom(header.center_zoom);
    if header.internal_compression != Compression::Unknown {
        builder = builder.internal_compression(header.internal_compression);
    }
    builder
}

fn parse_floats(value: &str, count: usize) -> anyhow::Result<Vec<f64>> {
    let parts: Vec<f64> = value
        .split(',')
        .map(|part| part.trim().parse())
        .collect::<Result<_, _>>()?;
    anyhow::ensure!(parts.len() == count, "expected {count} comma-separated values");
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::{metadata_mb_to_pm, parse_floats};
    use std::collections::HashMap;

    #[test]
    fn parses_bounds_and_center() {
        assert_eq!(
            parse_floats("-180, -85.05, 180, 85.05", 4).unwrap(),
            vec![-180.0, -85.05, 180.0, 85.05]
        );
        assert!(parse_floats("1,2,3", 4).is_err());
        assert!(parse_floats("1,x,3,4", 4).is_err());
    }

    #[test]
    fn rejects_malformed_metadata() {
        let mut metadata = HashMap::new();
        metadata.insert("minzoom".to_string(), "abc".to_string());
        assert!(metadata_mb_to_pm(&metadata).is_err());
    }
}
