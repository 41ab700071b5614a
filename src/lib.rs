//! # Static Huffman Compression
//!
//! Compress a byte stream with a Huffman code built from the symbol frequencies of the
//! whole message, and store it as a self-describing artifact:
//!
//! * preorder code tree (`1` + symbol for a leaf, `0` + left + right for a branch)
//! * 3 bit count of the zero bits that pad the last byte
//! * the packed payload
//!
//! The `static_huff` module holds the codec, the `tools` module holds the bit streams
//! and the tree.

mod tools;
pub mod static_huff;

pub use tools::bit_io::{BitReader,BitWriter};
pub use tools::huff_tree::{HuffmanNode,CodeTrie,CodeTable,bits_to_string};

type DYNERR = Box<dyn std::error::Error>;

/// Codec Errors
#[derive(thiserror::Error,Debug)]
pub enum Error {
    #[error("file format mismatch")]
    FileFormatMismatch,
    #[error("file too large")]
    FileTooLarge,
    #[error("bit stream is closed")]
    StreamClosed,
    #[error("unexpected end of bit stream")]
    EndOfStream,
    #[error("cannot move {0} bits at once")]
    BitCount(usize),
    #[error("symbol {0:#04x} is not in the code table")]
    SymbolNotFound(u8),
    #[error("code table is not a usable prefix code")]
    InvalidCodeTable,
    #[error("payload does not match the code tree")]
    CorruptPayload,
    #[error(transparent)]
    Io(#[from] std::io::Error)
}

/// Options controlling compression
#[derive(Clone)]
pub struct Options {
    /// starting position in the input file
    pub in_offset: u64,
    /// starting position in the output file
    pub out_offset: u64,
    /// return error if file is larger
    pub max_file_size: u64
}

pub const STD_OPTIONS: Options = Options {
    in_offset: 0,
    out_offset: 0,
    max_file_size: u32::MAX as u64/4
};
