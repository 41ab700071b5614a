//! Building blocks shared by the codec: bit streams and the Huffman tree.

pub mod bit_io;
pub mod huff_tree;
