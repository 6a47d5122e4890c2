use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Decoding failures for a single class image.
///
/// Every variant maps to a per-file failure in the analysis service; a
/// malformed class never aborts a batch.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid magic number 0x{0:08x}")]
    InvalidMagic(u32),

    #[error("unexpected end of class image")]
    UnexpectedEof,

    #[error("invalid constant pool tag {0}")]
    InvalidConstantPoolTag(u8),

    #[error("invalid constant pool index {0}")]
    InvalidConstantPoolIndex(u16),

    #[error("constant pool entry {index} is {found}, expected {expected}")]
    ConstantPoolTypeMismatch {
        index: u16,
        expected: &'static str,
        found: &'static str,
    },

    #[error("invalid modified UTF-8 in constant pool")]
    InvalidModifiedUtf8,

    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("invalid bytecode at offset {0}")]
    InvalidBytecode(usize),

    #[error("malformed class: {0}")]
    Malformed(&'static str),
}
