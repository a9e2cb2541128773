use std::fs::File;
use std::io::{BufWriter, Write};

use anyhow::{bail, Context};
use clap::Parser;
use libtiles::{
    write_index, write_index_item, IndexItem, MbTilesReader, PmTilesReader, TileSource, TilesError,
};

use crate::formats::{deduce_format, spinner, Format};

#[derive(Parser, Debug)]
pub struct Args {
    /// Input file path
    #[arg(short = 'i', long = "input")]
    input: String,
    /// Input format (mbtiles, pmtiles); deduced from the path suffix when omitted
    #[arg(long = "if", value_enum, value_name = "FORMAT")]
    input_format: Option<Format>,
    /// Output index file path
    #[arg(short = 'o', long = "output")]
    output_index: String,
    /// Output tiles file path (required for sources without location info)
    #[arg(short = 't', long = "tiles")]
    output_tiles: Option<String>,
}

pub fn run(args: Args) -> anyhow::Result<()> {
    match deduce_format(args.input_format, &args.input) {
        // A PMTiles source knows every tile's physical location, so the
        // index can be exported without copying any tile data.
        Some(Format::Pmtiles) => export_locations(&args),
        Some(Format::Mbtiles) => export_tiles(&args),
        _ => bail!("invalid input format: expected mbtiles or pmtiles"),
    }
}

fn export_locations(args: &Args) -> anyhow::Result<()> {
    let mut reader = PmTilesReader::open_file(&args.input)
        .with_context(|| format!("failed to open {}", args.input))?;

    let mut items = Vec::new();
    reader.visit_locations(&mut |tile_id, location| {
        items.push(IndexItem {
            x: tile_id.x,
            y: tile_id.y,
            z: tile_id.z,
            length: u32::try_from(location.length).map_err(|_| TilesError::IndexEntryOverflow)?,
            offset: location.offset,
        });
        Ok(())
    })?;

    let mut index_writer = BufWriter::new(File::create(&args.output_index)?);
    write_index(&items, &mut index_writer)?;
    index_writer.flush()?;
    Ok(())
}

fn export_tiles(args: &Args) -> anyhow::Result<()> {
    let Some(tiles_path) = &args.output_tiles else {
        bail!("output tiles path (-t) is required for this input format");
    };

    let mut reader = MbTilesReader::open(&args.input)
        .with_context(|| format!("failed to open {}", args.input))?;

    let mut index_writer = BufWriter::new(File::create(&args.output_index)?);
    let mut tiles_writer = BufWriter::new(File::create(tiles_path)?);
    let mut offset = 0u64;

    let progress = spinner();
    reader.visit_tiles(&mut |tile_id, data| {
        let item = IndexItem {
            x: tile_id.x,
            y: tile_id.y,
            z: tile_id.z,
            length: u32::try_from(data.len()).map_err(|_| TilesError::IndexEntryOverflow)?,
            offset,
        };
        write_index_item(&item, &mut index_writer)?;
        tiles_writer.write_all(data)?;
        offset += data.len() as u64;
        progress.inc(1);
        Ok(())
    })?;
    progress.finish();

    tiles_writer.flush()?;
    index_writer.flush()?;
    Ok(())
}
