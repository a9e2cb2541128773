use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};

use anyhow::{bail, Context};
use clap::Parser;
use indicatif::ProgressBar;
use libtiles::{read_index, MbTilesWriter, PmTilesWriter, TileSink, TileType};

use crate::formats::{deduce_format, Format};

#[derive(Parser, Debug)]
pub struct Args {
    /// Input index file path
    #[arg(short = 'i', long = "input")]
    input_index: String,
    /// Input tiles file path
    #[arg(short = 't', long = "tiles")]
    input_tiles: String,
    /// Output file path
    #[arg(short = 'o', long = "output")]
    output: String,
    /// Output format (mbtiles, pmtiles); deduced from the path suffix when omitted
    #[arg(long = "of", value_enum, value_name = "FORMAT")]
    output_format: Option<Format>,
}

pub fn run(args: Args) -> anyhow::Result<()> {
    let index_data = fs::read(&args.input_index)
        .with_context(|| format!("failed to read {}", args.input_index))?;
    let mut items = read_index(&index_data);

    let mut tiles_file = File::open(&args.input_tiles)
        .with_context(|| format!("failed to open {}", args.input_tiles))?;

    let mut sink: Box<dyn TileSink> = match deduce_format(args.output_format, &args.output) {
        Some(Format::Mbtiles) => Box::new(MbTilesWriter::new().create(&args.output)?),
        Some(Format::Pmtiles) => {
            Box::new(PmTilesWriter::new(TileType::Unknown).create(&args.output)?)
        }
        _ => bail!("invalid output format: expected mbtiles or pmtiles"),
    };

    // Sequential reads from the companion blob.
    items.sort_unstable_by_key(|item| item.offset);

    let max_length = items.iter().map(|item| item.length).max().unwrap_or(0);
    let mut buffer = vec![0u8; max_length as usize];

    let progress = ProgressBar::new(items.len() as u64);
    for item in &items {
        let data = &mut buffer[..item.length as usize];
        tiles_file.seek(SeekFrom::Start(item.offset))?;
        tiles_file.read_exact(data)?;
        sink.write_tile(item.tile_id(), data)?;
        progress.inc(1);
    }
    progress.finish();

    sink.finalize().context("failed to finalize output")?;
    Ok(())
}
