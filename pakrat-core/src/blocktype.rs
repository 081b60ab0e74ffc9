use std::fmt;
use std::str::FromStr;

/// Logical VFS block types and their precomputed directory hashes.
///
/// The hash strings are matched case-insensitively against on-disk directory
/// names; the numeric ids are what the block index stores.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub enum BlockType {
    InitAudio,
    InitBundle,
    BundleManifest,
    InitialExtendData,
    Audio,
    Bundle,
    DynamicStreaming,
    Table,
    Video,
    Iv,
    Streaming,
    JsonData,
    Lua,
    IFixPatchOut,
    ExtendData,
    AudioChinese,
    AudioEnglish,
    AudioJapanese,
    AudioKorean,
}

impl BlockType {
    pub const ALL: [BlockType; 19] = [
        BlockType::InitAudio,
        BlockType::InitBundle,
        BlockType::BundleManifest,
        BlockType::InitialExtendData,
        BlockType::Audio,
        BlockType::Bundle,
        BlockType::DynamicStreaming,
        BlockType::Table,
        BlockType::Video,
        BlockType::Iv,
        BlockType::Streaming,
        BlockType::JsonData,
        BlockType::Lua,
        BlockType::IFixPatchOut,
        BlockType::ExtendData,
        BlockType::AudioChinese,
        BlockType::AudioEnglish,
        BlockType::AudioJapanese,
        BlockType::AudioKorean,
    ];

    pub fn id(self) -> u8 {
        match self {
            BlockType::InitAudio => 1,
            BlockType::InitBundle => 2,
            BlockType::BundleManifest => 3,
            BlockType::InitialExtendData => 5,
            BlockType::Audio => 11,
            BlockType::Bundle => 12,
            BlockType::DynamicStreaming => 13,
            BlockType::Table => 14,
            BlockType::Video => 15,
            BlockType::Iv => 16,
            BlockType::Streaming => 17,
            BlockType::JsonData => 18,
            BlockType::Lua => 19,
            BlockType::IFixPatchOut => 21,
            BlockType::ExtendData => 22,
            BlockType::AudioChinese => 30,
            BlockType::AudioEnglish => 31,
            BlockType::AudioJapanese => 32,
            BlockType::AudioKorean => 33,
        }
    }

    /// Uppercase-hex directory name under the VFS root.
    pub fn dir_hash(self) -> &'static str {
        match self {
            BlockType::InitAudio => "07A1BB91",
            BlockType::InitBundle => "0CE8FA57",
            BlockType::BundleManifest => "1CDDBF1F",
            BlockType::InitialExtendData => "3C9D9D2D",
            BlockType::Audio => "24ED34CF",
            BlockType::Bundle => "7064D8E2",
            BlockType::DynamicStreaming => "23D53F5D",
            BlockType::Table => "42A8FCA6",
            BlockType::Video => "55FC21C6",
            BlockType::Iv => "A63D7E6A",
            BlockType::Streaming => "C3442D43",
            BlockType::JsonData => "775A31D1",
            BlockType::Lua => "19E3AE45",
            BlockType::IFixPatchOut => "DAFE52C9",
            BlockType::ExtendData => "D6E622F7",
            BlockType::AudioChinese => "E1E7D7CE",
            BlockType::AudioEnglish => "A31457D0",
            BlockType::AudioJapanese => "F668D4EE",
            BlockType::AudioKorean => "E9D31017",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BlockType::InitAudio => "InitAudio",
            BlockType::InitBundle => "InitBundle",
            BlockType::BundleManifest => "BundleManifest",
            BlockType::InitialExtendData => "InitialExtendData",
            BlockType::Audio => "Audio",
            BlockType::Bundle => "Bundle",
            BlockType::DynamicStreaming => "DynamicStreaming",
            BlockType::Table => "Table",
            BlockType::Video => "Video",
            BlockType::Iv => "IV",
            BlockType::Streaming => "Streaming",
            BlockType::JsonData => "JsonData",
            BlockType::Lua => "Lua",
            BlockType::IFixPatchOut => "IFixPatchOut",
            BlockType::ExtendData => "ExtendData",
            BlockType::AudioChinese => "AudioChinese",
            BlockType::AudioEnglish => "AudioEnglish",
            BlockType::AudioJapanese => "AudioJapanese",
            BlockType::AudioKorean => "AudioKorean",
        }
    }

    pub fn from_id(id: u8) -> Option<BlockType> {
        BlockType::ALL.iter().copied().find(|t| t.id() == id)
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BlockType {
    type Err = String;

    /// Accepts the block name (case-insensitive) or its numeric id.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(id) = s.parse::<u8>() {
            return BlockType::from_id(id).ok_or_else(|| format!("unknown block type id {}", id));
        }
        BlockType::ALL
            .iter()
            .copied()
            .find(|t| t.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown block type {:?}", s))
    }
}
