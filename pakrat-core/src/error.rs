use std::path::PathBuf;

/// Failure kinds surfaced by the parsers and codecs.
///
/// Dispatchers compose these with `anyhow`; the variants stay downcastable so
/// callers can distinguish a wrong key from a short read.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("not found: {0}")]
    NotFound(PathBuf),
    #[error("corrupt data or wrong key: {0}")]
    CorruptOrWrongKey(String),
    #[error("unsupported endianness flag 0x{0:08X}")]
    UnsupportedEndianness(u32),
    #[error("unsupported field tag {tag} in {context}")]
    UnsupportedField { tag: u8, context: String },
    #[error("unsupported codec: {0}")]
    UnsupportedCodec(String),
    #[error("truncated input: {0}")]
    TruncatedInput(String),
}
