use super::*;
use std::fs;
use tempfile::tempdir;

// -------------------- Helpers --------------------

fn open_temp(dir: &tempfile::TempDir) -> BlockFile {
    BlockFile::open(dir.path().join("data.kv"), false).unwrap()
}

// -------------------- Bit-exact layout --------------------

#[test]
fn used_block_layout_is_bit_exact() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.kv");

    {
        let mut f = BlockFile::open(&path, false).unwrap();
        // header(2) + key "ab\0"(3) + value "xyz\0"(4) = 9, padded to 12
        f.write_block(0, 12, &"ab".to_string(), &"xyz".to_string())
            .unwrap();
        f.flush().unwrap();
    }

    let data = fs::read(&path).unwrap();
    assert_eq!(
        data,
        vec![
            12, 0, // header 12 LE
            b'a', b'b', 0, // key + terminator
            b'x', b'y', b'z', 0, // value + terminator
            0, 0, 0, // zero padding
        ]
    );
}

#[test]
fn fixed_width_fields_are_little_endian() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.kv");

    {
        let mut f = BlockFile::open(&path, false).unwrap();
        // header(2) + u32 key(4) + u16 value(2) = 8, no padding
        f.write_block(0, 8, &0xAABBCCDDu32, &0x1122u16).unwrap();
        f.flush().unwrap();
    }

    let data = fs::read(&path).unwrap();
    assert_eq!(data, vec![8, 0, 0xDD, 0xCC, 0xBB, 0xAA, 0x22, 0x11]);
}

// -------------------- Round trips --------------------

#[test]
fn write_then_read_used_block() {
    let dir = tempdir().unwrap();
    let mut f = open_temp(&dir);

    f.write_block(0, 32, &7u32, &"payload".to_string()).unwrap();

    match f.read_block::<u32, String>(0, false).unwrap() {
        Block::Used { len, key, value } => {
            assert_eq!(len, 32);
            assert_eq!(key, 7);
            assert_eq!(value.as_deref(), Some("payload"));
        }
        other => panic!("expected used block, got {:?}", other),
    }
}

#[test]
fn skip_value_leaves_value_none() {
    let dir = tempdir().unwrap();
    let mut f = open_temp(&dir);

    f.write_block(0, 24, &"k".to_string(), &"v".to_string())
        .unwrap();

    match f.read_block::<String, String>(0, true).unwrap() {
        Block::Used { key, value, .. } => {
            assert_eq!(key, "k");
            assert!(value.is_none());
        }
        other => panic!("expected used block, got {:?}", other),
    }
}

#[test]
fn read_block_at_nonzero_offset() {
    let dir = tempdir().unwrap();
    let mut f = open_temp(&dir);

    f.write_block(0, 16, &1u32, &100u64).unwrap();
    f.write_block(16, 16, &2u32, &200u64).unwrap();

    match f.read_block::<u32, u64>(16, false).unwrap() {
        Block::Used { key, value, .. } => {
            assert_eq!(key, 2);
            assert_eq!(value, Some(200));
        }
        other => panic!("expected used block, got {:?}", other),
    }
}

// -------------------- Free blocks --------------------

#[test]
fn negative_header_reads_as_free() {
    let dir = tempdir().unwrap();
    let mut f = open_temp(&dir);

    f.write_block(0, 20, &3u32, &"gone".to_string()).unwrap();
    f.write_header(0, -20).unwrap();

    assert_eq!(f.read_header(0).unwrap(), -20);
    match f.read_block::<u32, String>(0, false).unwrap() {
        Block::Free { len } => assert_eq!(len, 20),
        other => panic!("expected free block, got {:?}", other),
    }
}

#[test]
fn free_block_read_ignores_stale_payload() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.kv");

    // Free block whose payload bytes are garbage that would not decode.
    let mut data = Vec::new();
    data.extend_from_slice(&(-6i16).to_le_bytes());
    data.extend_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF]);
    fs::write(&path, &data).unwrap();

    let mut f = BlockFile::open(&path, false).unwrap();
    match f.read_block::<String, String>(0, false).unwrap() {
        Block::Free { len } => assert_eq!(len, 6),
        other => panic!("expected free block, got {:?}", other),
    }
}

// -------------------- In-place value rewrite --------------------

#[test]
fn write_value_preserves_header_and_key() {
    let dir = tempdir().unwrap();
    let mut f = open_temp(&dir);

    let key = "counter".to_string();
    f.write_block(0, 32, &key, &"one".to_string()).unwrap();

    let value_off = HEADER_LEN as u32 + key.encoded_len() as u32;
    f.write_value(value_off, &"two".to_string()).unwrap();

    match f.read_block::<String, String>(0, false).unwrap() {
        Block::Used { len, key, value } => {
            assert_eq!(len, 32);
            assert_eq!(key, "counter");
            assert_eq!(value.as_deref(), Some("two"));
        }
        other => panic!("expected used block, got {:?}", other),
    }
}

// -------------------- Corruption detection --------------------

#[test]
fn zero_header_is_corrupt() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.kv");
    fs::write(&path, [0u8, 0, 1, 2, 3]).unwrap();

    let mut f = BlockFile::open(&path, false).unwrap();
    assert!(matches!(f.read_header(0), Err(BlockError::Corrupt)));
    assert!(matches!(
        f.read_block::<u32, u32>(0, false),
        Err(BlockError::Corrupt)
    ));
}

#[test]
fn missing_string_terminator_is_corrupt() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.kv");

    // Used block of 5 bytes whose body has no zero byte at all.
    let mut data = Vec::new();
    data.extend_from_slice(&5i16.to_le_bytes());
    data.extend_from_slice(b"abc");
    fs::write(&path, &data).unwrap();

    let mut f = BlockFile::open(&path, false).unwrap();
    assert!(matches!(
        f.read_block::<String, String>(0, false),
        Err(BlockError::Corrupt)
    ));
}

#[test]
fn truncated_block_body_is_io_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.kv");

    // Header promises 32 bytes but the file ends after 4.
    let mut data = Vec::new();
    data.extend_from_slice(&32i16.to_le_bytes());
    data.extend_from_slice(&[1, 2]);
    fs::write(&path, &data).unwrap();

    let mut f = BlockFile::open(&path, false).unwrap();
    assert!(matches!(
        f.read_block::<u32, u32>(0, false),
        Err(BlockError::Io(_))
    ));
}

// -------------------- File lifecycle --------------------

#[test]
fn open_preserves_create_truncates() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.kv");

    {
        let mut f = BlockFile::open(&path, false).unwrap();
        f.write_block(0, 16, &1u32, &2u32).unwrap();
        f.flush().unwrap();
    }
    {
        let f = BlockFile::open(&path, false).unwrap();
        assert_eq!(f.len().unwrap(), 16);
    }
    {
        let f = BlockFile::create(&path, false).unwrap();
        assert_eq!(f.len().unwrap(), 0);
        assert!(f.is_empty().unwrap());
    }
}

#[test]
fn sync_mode_flush_does_not_error() {
    let dir = tempdir().unwrap();
    let mut f = BlockFile::open(dir.path().join("data.kv"), true).unwrap();
    f.write_block(0, 16, &1u32, &2u32).unwrap();
    f.flush().unwrap();
}

// -------------------- Field encodings --------------------

#[test]
fn string_encoded_len_counts_terminator() {
    assert_eq!("".to_string().encoded_len(), 1);
    assert_eq!("abc".to_string().encoded_len(), 4);
    assert!(String::IS_VARIABLE_LEN);
    assert!(!u32::IS_VARIABLE_LEN);
}

#[test]
fn empty_string_round_trips() {
    let dir = tempdir().unwrap();
    let mut f = open_temp(&dir);

    f.write_block(0, 8, &"".to_string(), &"".to_string()).unwrap();
    match f.read_block::<String, String>(0, false).unwrap() {
        Block::Used { key, value, .. } => {
            assert_eq!(key, "");
            assert_eq!(value.as_deref(), Some(""));
        }
        other => panic!("expected used block, got {:?}", other),
    }
}

#[test]
fn fixed_byte_string_round_trips() {
    let dir = tempdir().unwrap();
    let mut f = open_temp(&dir);

    let key: [u8; 4] = *b"key0";
    f.write_block(0, 16, &key, &3.5f64).unwrap();
    match f.read_block::<[u8; 4], f64>(0, false).unwrap() {
        Block::Used { key, value, .. } => {
            assert_eq!(&key, b"key0");
            assert_eq!(value, Some(3.5));
        }
        other => panic!("expected used block, got {:?}", other),
    }
}
