//! Cross-format round trips through the `TileSource` / `TileSink` contracts.

use std::collections::HashMap;

use libtiles::{
    decode_tile_id, MbTilesReader, MbTilesWriter, PmTilesReader, PmTilesWriter, TileId, TileSink,
    TileSource, TileType, XyzReader, XyzWriter,
};

fn sample_tiles() -> Vec<(TileId, Vec<u8>)> {
    // Distinct tiles across several zoom levels, with some shared blobs.
    let mut tiles = Vec::new();
    for z in 0..=5u32 {
        let base = ((1u64 << (2 * z)) - 1) / 3;
        let count = 1u64 << z.min(4);
        for i in 0..count {
            let data = if i % 5 == 0 {
                b"shared blob".to_vec()
            } else {
                format!("tile-{z}-{i}").into_bytes()
            };
            tiles.push((decode_tile_id(base + i), data));
        }
    }
    tiles
}

fn drain_into(source: &mut dyn TileSource, sink: &mut dyn TileSink) {
    source
        .visit_tiles(&mut |tile_id, data| sink.write_tile(tile_id, data))
        .unwrap();
    sink.finalize().unwrap();
}

fn collect(source: &mut dyn TileSource) -> HashMap<TileId, Vec<u8>> {
    let mut tiles = HashMap::new();
    source
        .visit_tiles(&mut |tile_id, data| {
            tiles.insert(tile_id, data.to_vec());
            Ok(())
        })
        .unwrap();
    tiles
}

#[test]
fn mbtiles_to_pmtiles_preserves_the_set() {
    let dir = tempfile::tempdir().unwrap();
    let mb_path = dir.path().join("source.mbtiles");
    let pm_path = dir.path().join("target.pmtiles");

    let tiles = sample_tiles();
    let mut mb_writer = MbTilesWriter::new().create(&mb_path).unwrap();
    for (tile_id, data) in &tiles {
        mb_writer.write_tile(*tile_id, data).unwrap();
    }
    mb_writer.finalize().unwrap();

    let mut mb_reader = MbTilesReader::open(&mb_path).unwrap();
    let mut pm_writer = PmTilesWriter::new(TileType::Png).create(&pm_path).unwrap();
    drain_into(&mut mb_reader, &mut pm_writer);

    let mut pm_reader = PmTilesReader::open_file(&pm_path).unwrap();
    let expected: HashMap<TileId, Vec<u8>> = tiles.into_iter().collect();
    assert_eq!(collect(&mut pm_reader), expected);

    // The y convention survives both adapters: the archive is XYZ-native.
    for (tile_id, data) in &expected {
        assert_eq!(pm_reader.read_tile(*tile_id).unwrap(), &data[..]);
    }
}

#[test]
fn pmtiles_to_mbtiles_and_back() {
    let dir = tempfile::tempdir().unwrap();
    let pm_path = dir.path().join("source.pmtiles");
    let mb_path = dir.path().join("target.mbtiles");

    let tiles = sample_tiles();
    let mut pm_writer = PmTilesWriter::new(TileType::Png).create(&pm_path).unwrap();
    for (tile_id, data) in &tiles {
        pm_writer.write_tile(*tile_id, data).unwrap();
    }
    pm_writer.finalize().unwrap();

    let mut pm_reader = PmTilesReader::open_file(&pm_path).unwrap();
    let mut mb_writer = MbTilesWriter::new().create(&mb_path).unwrap();
    drain_into(&mut pm_reader, &mut mb_writer);

    let mut mb_reader = MbTilesReader::open(&mb_path).unwrap();
    assert_eq!(collect(&mut mb_reader), tiles.into_iter().collect());
}

#[test]
fn xyz_to_pmtiles() {
    let dir = tempfile::tempdir().unwrap();
    let pattern = format!("{}/{{z}}/{{x}}/{{y}}.png", dir.path().join("xyz").display());
    let pm_path = dir.path().join("target.pmtiles");

    let tiles = sample_tiles();
    let mut xyz_writer = XyzWriter::new(&pattern).unwrap();
    for (tile_id, data) in &tiles {
        xyz_writer.write_tile(*tile_id, data).unwrap();
    }
    xyz_writer.finalize().unwrap();

    let mut xyz_reader = XyzReader::new(&pattern).unwrap();
    let mut pm_writer = PmTilesWriter::new(TileType::Png).create(&pm_path).unwrap();
    drain_into(&mut xyz_reader, &mut pm_writer);

    let mut pm_reader = PmTilesReader::open_file(&pm_path).unwrap();
    assert_eq!(collect(&mut pm_reader), tiles.into_iter().collect());
}
