use pakrat_core::blocktype::BlockType;

/// The full block-type table this game build ships with.
const TABLE: [(&str, u8, &str); 19] = [
    ("InitAudio", 1, "07A1BB91"),
    ("InitBundle", 2, "0CE8FA57"),
    ("BundleManifest", 3, "1CDDBF1F"),
    ("InitialExtendData", 5, "3C9D9D2D"),
    ("Audio", 11, "24ED34CF"),
    ("Bundle", 12, "7064D8E2"),
    ("DynamicStreaming", 13, "23D53F5D"),
    ("Table", 14, "42A8FCA6"),
    ("Video", 15, "55FC21C6"),
    ("IV", 16, "A63D7E6A"),
    ("Streaming", 17, "C3442D43"),
    ("JsonData", 18, "775A31D1"),
    ("Lua", 19, "19E3AE45"),
    ("IFixPatchOut", 21, "DAFE52C9"),
    ("ExtendData", 22, "D6E622F7"),
    ("AudioChinese", 30, "E1E7D7CE"),
    ("AudioEnglish", 31, "A31457D0"),
    ("AudioJapanese", 32, "F668D4EE"),
    ("AudioKorean", 33, "E9D31017"),
];

#[test]
fn table_is_exact() {
    assert_eq!(BlockType::ALL.len(), TABLE.len());
    for (name, id, hash) in TABLE {
        let bt: BlockType = name.parse().unwrap();
        assert_eq!(bt.name(), name);
        assert_eq!(bt.id(), id);
        assert_eq!(bt.dir_hash(), hash);
        assert_eq!(BlockType::from_id(id), Some(bt));
    }
}

#[test]
fn parses_numeric_ids_and_ignores_name_case() {
    assert_eq!("14".parse::<BlockType>().unwrap(), BlockType::Table);
    assert_eq!("table".parse::<BlockType>().unwrap(), BlockType::Table);
    assert_eq!("AUDIOKOREAN".parse::<BlockType>().unwrap(), BlockType::AudioKorean);
    assert_eq!("iv".parse::<BlockType>().unwrap(), BlockType::Iv);
}

#[test]
fn unknown_names_and_ids_are_rejected() {
    assert!("NoSuchBlock".parse::<BlockType>().is_err());
    assert!("4".parse::<BlockType>().is_err()); // gap in the id space
    assert!("0".parse::<BlockType>().is_err());
    assert!(BlockType::from_id(200).is_none());
}

#[test]
fn hashes_are_unique() {
    let mut hashes: Vec<&str> = BlockType::ALL.iter().map(|t| t.dir_hash()).collect();
    hashes.sort();
    hashes.dedup();
    assert_eq!(hashes.len(), BlockType::ALL.len());
}
