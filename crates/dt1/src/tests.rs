use super::*;
use proptest::prelude::*;
use std::io::Cursor;

#[derive(Clone)]
struct BlockSpec {
    x: i16,
    y: i16,
    grid: (u8, u8),
    format: u8,
    payload: Vec<u8>,
}

#[derive(Clone)]
struct TileSpec {
    width: i32,
    height: i32,
    tile_type: i32,
    subtile_flags: [u8; SUBTILE_COUNT],
    blocks: Vec<BlockSpec>,
}

fn block(grid: (u8, u8), format: u8, payload: &[u8]) -> BlockSpec {
    BlockSpec {
        x: i16::from(grid.0) * 32,
        y: -i16::from(grid.1) * 16,
        grid,
        format,
        payload: payload.to_vec(),
    }
}

fn tile(width: i32, height: i32, blocks: Vec<BlockSpec>) -> TileSpec {
    let mut subtile_flags = [0u8; SUBTILE_COUNT];
    subtile_flags[0] = 0x01;
    subtile_flags[24] = 0x80;
    TileSpec {
        width,
        height,
        tile_type: 3,
        subtile_flags,
        blocks,
    }
}

fn push_i32(out: &mut Vec<u8>, value: i32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn push_i16(out: &mut Vec<u8>, value: i16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn build_header(tile_count: i32, tile_array_pointer: i32) -> Vec<u8> {
    let mut out = Vec::new();
    push_i32(&mut out, 7);
    push_i32(&mut out, 6);
    out.extend_from_slice(&[0u8; HEADER_RESERVED_SIZE]);
    push_i32(&mut out, tile_count);
    push_i32(&mut out, tile_array_pointer);
    out
}

fn tile_record(spec: &TileSpec, block_pointer: i32, block_data_length: i32) -> Vec<u8> {
    let mut out = Vec::new();
    push_i32(&mut out, 2); // direction
    push_i16(&mut out, 80); // roof height
    push_i16(&mut out, 0x0101); // material flags
    push_i32(&mut out, spec.height);
    push_i32(&mut out, spec.width);
    out.extend_from_slice(&[0u8; 4]);
    push_i32(&mut out, spec.tile_type);
    push_i32(&mut out, 4); // style
    push_i32(&mut out, 5); // sequence
    push_i32(&mut out, 6); // rarity
    out.extend_from_slice(&[0u8; 4]);
    out.extend_from_slice(&spec.subtile_flags);
    out.extend_from_slice(&[0u8; 7]);
    push_i32(&mut out, block_pointer);
    push_i32(&mut out, block_data_length);
    push_i32(
        &mut out,
        i32::try_from(spec.blocks.len()).expect("block count overflow in test"),
    );
    out.extend_from_slice(&[0u8; 12]);
    assert_eq!(out.len(), TileLayout::Current.record_size());
    out
}

fn block_record(spec: &BlockSpec, length: i32, file_offset: i32) -> Vec<u8> {
    let mut out = Vec::new();
    push_i16(&mut out, spec.x);
    push_i16(&mut out, spec.y);
    out.extend_from_slice(&[0u8; 2]);
    out.push(spec.grid.0);
    out.push(spec.grid.1);
    out.push(spec.format);
    out.push(0);
    push_i32(&mut out, length);
    out.extend_from_slice(&[0u8; 2]);
    push_i32(&mut out, file_offset);
    assert_eq!(out.len(), BLOCK_RECORD_SIZE);
    out
}

fn to_i32(value: usize) -> i32 {
    i32::try_from(value).expect("offset overflow in test")
}

/// Header, tile array, then for each tile its block array followed by the payloads.
fn build_dt1(tiles: &[TileSpec]) -> Vec<u8> {
    let tile_array = HEADER_SIZE;
    let mut out = build_header(to_i32(tiles.len()), to_i32(tile_array));

    let mut block_area = Vec::new();
    let mut records = Vec::new();
    let mut cursor = tile_array + tiles.len() * TileLayout::Current.record_size();
    for spec in tiles {
        let block_pointer = cursor;
        let table_size = spec.blocks.len() * BLOCK_RECORD_SIZE;
        let data_length: usize = spec.blocks.iter().map(|b| b.payload.len()).sum();

        let mut relative = table_size;
        for block in &spec.blocks {
            block_area.extend(block_record(
                block,
                to_i32(block.payload.len()),
                to_i32(relative),
            ));
            relative += block.payload.len();
        }
        for block in &spec.blocks {
            block_area.extend_from_slice(&block.payload);
        }

        records.extend(tile_record(
            spec,
            to_i32(block_pointer),
            to_i32(data_length),
        ));
        cursor += table_size + data_length;
    }

    out.extend(records);
    out.extend(block_area);
    assert_eq!(out.len(), cursor);
    out
}

fn sample_tiles() -> Vec<TileSpec> {
    vec![
        tile(
            160,
            -80,
            vec![
                block((0, 0), ISOMETRIC_FORMAT, &[0xAA; 256]),
                block((1, 0), 0, &[1, 2, 3]),
            ],
        ),
        tile(-160, 80, Vec::new()),
        tile(32, 32, vec![block((2, 3), 0, &[9, 8, 7, 6])]),
    ]
}

#[test]
fn dt1_parses_header_fields() {
    let payload = build_header(12, 276);
    let mut reader = RecordReader::new(Cursor::new(payload));
    let header = parse_tile_container_header(&mut reader).expect("failed to parse header");
    assert_eq!(header.major_version, 7);
    assert_eq!(header.minor_version, 6);
    assert_eq!(header.tile_count, 12);
    assert_eq!(header.tile_array_pointer, 276);
    assert_eq!(reader.position(), HEADER_SIZE as u64);
}

#[test]
fn dt1_short_header_is_truncated() {
    let payload = build_header(1, 276);
    let mut reader = RecordReader::new(Cursor::new(&payload[..HEADER_SIZE - 1]));
    assert!(matches!(
        parse_tile_container_header(&mut reader),
        Err(Error::Record(common::Error::TruncatedRecord {
            offset: 0,
            expected: HEADER_SIZE,
            ..
        }))
    ));
}

#[test]
fn dt1_walks_tiles_and_block_payloads() {
    let payload = build_dt1(&sample_tiles());
    let dt1 = Dt1::open(Cursor::new(payload)).expect("failed to open dt1");

    assert_eq!(dt1.layout, TileLayout::Current);
    assert_eq!(dt1.tiles.len(), 3);
    assert_eq!(dt1.block_count(), 3);

    let first = &dt1.tiles[0];
    assert_eq!(first.direction, 2);
    assert_eq!(first.roof_height, 80);
    assert_eq!(first.material_flags, 0x0101);
    assert_eq!((first.width, first.height), (160, 80));
    assert_eq!(
        (first.tile_type, first.style, first.sequence, first.rarity),
        (3, 4, 5, 6)
    );
    assert_eq!(first.subtile_flags[0], 0x01);
    assert_eq!(first.subtile_flags[24], 0x80);
    assert_eq!(first.block_count, 2);
    assert_eq!(first.block_data_length, 259);

    let iso = &first.blocks[0];
    assert!(iso.is_isometric());
    assert_eq!(iso.file_offset, 40);
    assert_eq!(iso.payload, vec![0xAA; 256]);

    let rle = &first.blocks[1];
    assert!(!rle.is_isometric());
    assert_eq!((rle.x, rle.y), (32, 0));
    assert_eq!((rle.grid_x, rle.grid_y), (1, 0));
    assert_eq!(rle.file_offset, 40 + 256);
    assert_eq!(rle.payload, vec![1, 2, 3]);

    assert!(dt1.tiles[1].blocks.is_empty());

    let last = &dt1.tiles[2].blocks[0];
    assert_eq!((last.grid_x, last.grid_y), (2, 3));
    assert_eq!(last.y, -48);
    assert_eq!(last.payload, vec![9, 8, 7, 6]);
}

#[test]
fn dt1_payload_address_is_relative_to_block_pointer() {
    let payload = build_dt1(&sample_tiles());
    let len = payload.len() as u64;
    let dt1 = Dt1::open(Cursor::new(payload.clone())).expect("failed to open dt1");

    let tile = &dt1.tiles[2];
    let block = &tile.blocks[0];
    let range = resolve_block_payload(tile.block_pointer, block.file_offset, block.length, len)
        .expect("payload must resolve");
    assert_eq!(range.start, u64::try_from(tile.block_pointer).expect("pointer") + 20);
    assert_eq!(range.end, len);
    let start = usize::try_from(range.start).expect("start");
    assert_eq!(&payload[start..], block.payload.as_slice());
}

#[test]
fn dt1_negative_dimensions_are_normalized() {
    let payload = build_dt1(&[tile(-160, -80, Vec::new()), tile(i32::MIN, 1, Vec::new())]);
    let dt1 = Dt1::open(Cursor::new(payload)).expect("failed to open dt1");
    assert_eq!((dt1.tiles[0].width, dt1.tiles[0].height), (160, 80));
    assert_eq!(dt1.tiles[1].width, 1u32 << 31);
}

#[test]
fn dt1_payload_past_end_is_truncated() {
    let mut payload = build_dt1(&[tile(32, 32, vec![block((0, 0), 0, &[1, 2, 3, 4])])]);
    payload.truncate(payload.len() - 1);

    match Dt1::open(Cursor::new(payload)) {
        Err(Error::Record(common::Error::TruncatedRecord {
            expected, actual, ..
        })) => {
            assert_eq!(expected, 4);
            assert_eq!(actual, 3);
        }
        other => panic!("expected truncated record, got {other:?}"),
    }
}

#[test]
fn dt1_block_offset_past_end_is_truncated() {
    let tiles = [tile(32, 32, vec![block((0, 0), 0, &[5, 5])])];
    let mut payload = build_dt1(&tiles);
    let file_offset_at = HEADER_SIZE + TileLayout::Current.record_size() + 16;
    payload[file_offset_at..file_offset_at + 4].copy_from_slice(&1000i32.to_le_bytes());

    assert!(matches!(
        Dt1::open(Cursor::new(payload)),
        Err(Error::Record(common::Error::TruncatedRecord { .. }))
    ));
}

#[test]
fn dt1_tile_array_past_end_is_truncated() {
    let mut payload = build_header(2, 276);
    payload.extend(tile_record(&tile(1, 1, Vec::new()), 0, 0));
    assert!(matches!(
        Dt1::open(Cursor::new(payload)),
        Err(Error::Record(common::Error::TruncatedRecord {
            offset: 276,
            expected: 192,
            actual: 96
        }))
    ));

    let far = build_header(1, 100_000);
    assert!(matches!(
        Dt1::open(Cursor::new(far)),
        Err(Error::Record(common::Error::TruncatedRecord {
            offset: 100_000,
            ..
        }))
    ));
}

#[test]
fn dt1_block_array_past_end_is_truncated() {
    let spec = tile(1, 1, vec![block((0, 0), 0, &[1])]);
    let mut payload = build_header(1, 276);
    payload.extend(tile_record(&spec, 5000, 1));
    assert!(matches!(
        Dt1::open(Cursor::new(payload)),
        Err(Error::Record(common::Error::TruncatedRecord {
            offset: 5000,
            expected: BLOCK_RECORD_SIZE,
            ..
        }))
    ));
}

#[test]
fn dt1_errors_for_negative_counts_and_pointers() {
    let negative_tiles = build_header(-1, 276);
    assert!(matches!(
        Dt1::open(Cursor::new(negative_tiles)),
        Err(Error::InvalidTileCount { got: -1 })
    ));

    let negative_pointer = build_header(1, -276);
    assert!(matches!(
        Dt1::open(Cursor::new(negative_pointer)),
        Err(Error::InvalidPointer {
            field: "tile array",
            value: -276
        })
    ));

    let mut negative_blocks = build_header(1, 276);
    let mut record = tile_record(&tile(1, 1, Vec::new()), 372, 0);
    record[80..84].copy_from_slice(&(-3i32).to_le_bytes());
    negative_blocks.extend(record);
    assert!(matches!(
        Dt1::open(Cursor::new(negative_blocks)),
        Err(Error::InvalidBlockCount { tile: 0, got: -3 })
    ));
}

#[test]
fn dt1_resolve_block_payload_checks_every_level() {
    assert_eq!(resolve_block_payload(100, 20, 30, 150).expect("fits"), 120..150);
    assert_eq!(resolve_block_payload(0, 0, 0, 0).expect("empty fits"), 0..0);
    assert!(matches!(
        resolve_block_payload(100, 20, 31, 150),
        Err(Error::Record(common::Error::TruncatedRecord {
            offset: 120,
            expected: 31,
            actual: 30
        }))
    ));
    assert!(matches!(
        resolve_block_payload(-1, 0, 0, 10),
        Err(Error::InvalidPointer {
            field: "block array",
            ..
        })
    ));
    assert!(matches!(
        resolve_block_payload(0, -8, 0, 10),
        Err(Error::InvalidPointer {
            field: "block payload",
            ..
        })
    ));
    assert!(matches!(
        resolve_block_payload(0, 0, -1, 10),
        Err(Error::InvalidBlockLength { length: -1 })
    ));
}

#[test]
fn dt1_legacy_layout_has_no_blocks() {
    let mut payload = build_header(2, 276);
    for spec in [tile(64, -32, Vec::new()), tile(16, 16, Vec::new())] {
        let record = tile_record(&spec, 0, 0);
        payload.extend_from_slice(&record[..TileLayout::Legacy.record_size()]);
    }

    let dt1 = Dt1::open_with(Cursor::new(payload.clone()), TileLayout::Legacy)
        .expect("failed to open legacy dt1");
    assert_eq!(dt1.layout, TileLayout::Legacy);
    assert_eq!(dt1.tiles.len(), 2);
    assert_eq!((dt1.tiles[0].width, dt1.tiles[0].height), (64, 32));
    assert_eq!(dt1.tiles[1].block_count, 0);
    assert_eq!(dt1.block_count(), 0);

    assert!(matches!(
        Dt1::open(Cursor::new(payload)),
        Err(Error::Record(common::Error::TruncatedRecord { .. }))
    ));
}

#[test]
fn dt1_walk_functions_share_a_reader() {
    let payload = build_dt1(&sample_tiles());
    let mut reader = RecordReader::new(Cursor::new(payload));
    let header = parse_tile_container_header(&mut reader).expect("failed to parse header");
    let tiles = walk_tiles(&mut reader, &header).expect("failed to walk tiles");
    assert_eq!(tiles.len(), 3);
    assert_eq!(tiles[0].blocks.len(), 2);
    assert!(!reader.is_poisoned());
}

#[test]
fn dt1_json_dump_skips_payloads() {
    let payload = build_dt1(&sample_tiles());
    let dt1 = Dt1::open(Cursor::new(payload)).expect("failed to open dt1");
    let json = serde_json::to_value(&dt1).expect("failed to serialize");

    assert_eq!(json["header"]["tile_count"], 3);
    assert!(json["header"].get("reserved").is_none());
    assert_eq!(json["layout"], "Current");
    let first_block = &json["tiles"][0]["blocks"][0];
    assert_eq!(first_block["format"], 1);
    assert!(first_block.get("payload").is_none());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn open_never_panics_on_random_bytes(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
        let _ = Dt1::open(Cursor::new(data.clone()));
        let _ = Dt1::open_with(Cursor::new(data), TileLayout::Legacy);
    }

    #[test]
    fn walk_never_panics_on_corrupted_tiles(
        flips in proptest::collection::vec((0usize..1024, any::<u8>()), 1..16),
    ) {
        let mut payload = build_dt1(&sample_tiles());
        let len = payload.len();
        for (at, value) in flips {
            payload[HEADER_SIZE + at % (len - HEADER_SIZE)] = value;
        }
        let _ = Dt1::open(Cursor::new(payload));
    }
}
