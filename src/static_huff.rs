//! Static Huffman Coding
//!
//! The code is built once from the symbol frequencies of the whole message, so the
//! tree has to travel with the data.  The artifact is a single bit stream:
//!
//! * the tree in preorder, `1` + 8 bit symbol for a leaf, `0` + left + right for a branch
//! * 3 bit count of zero bits padding the last byte (the "discard" bits)
//! * the payload, i.e., the code of every symbol in message order, then the padding
//!
//! Bits fill each byte from the MSB.  The symbol and the discard count are multi-bit
//! values, these go out starting from their own LSB (see `tools::bit_io`).
//! An empty message produces an empty artifact.
//!
//! Tree construction always pops the lightest node first, ties go to the node that
//! was queued first, where leaves are queued in ascending symbol order.  As a result
//! the same message always produces the same artifact.

use bit_vec::BitVec;
use std::collections::BTreeMap;
use std::io::{Cursor,Read,Write,Seek,SeekFrom,BufReader,BufWriter};
use std::path::Path;
use crate::tools::bit_io::{BitReader,BitWriter};
use crate::tools::huff_tree::{HuffmanNode,CodeTrie,CodeTable};
use crate::{DYNERR,Error,Options};

/// Relative frequency of each distinct symbol, i.e., count divided by message length.
pub fn frequencies(message: &[u8]) -> BTreeMap<u8,f64> {
    let mut counts: BTreeMap<u8,usize> = BTreeMap::new();
    for c in message {
        *counts.entry(*c).or_insert(0) += 1;
    }
    counts.into_iter().map(|(c,n)| (c,n as f64 / message.len() as f64)).collect()
}

/// Zero bits needed to byte-align the artifact.  The count includes the tree
/// and the 3 header bits, so it is only valid for a stream that starts aligned.
pub fn discard_bits(tree_bits: u64,payload_bits: u64) -> u8 {
    ((8 - (tree_bits + payload_bits + 3) % 8) % 8) as u8
}

/// Concatenate the code of each symbol in message order.
pub fn encode_message(message: &[u8],codes: &CodeTable) -> Result<BitVec,Error> {
    let mut ans = BitVec::new();
    for c in message {
        let code = codes.get(c).ok_or(Error::SymbolNotFound(*c))?;
        ans.extend(code.iter());
    }
    Ok(ans)
}

/// Holds one message together with everything derived from it.
/// Whether we got here by encoding or decoding, all fields are consistent.
pub struct StaticHuffman {
    message: Vec<u8>,
    encoded: BitVec,
    root: Option<HuffmanNode>,
    codes: CodeTable,
    freq: BTreeMap<u8,f64>
}

impl Default for StaticHuffman {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticHuffman {
    /// Codec holding the empty message
    pub fn new() -> Self {
        Self {
            message: Vec::new(),
            encoded: BitVec::new(),
            root: None,
            codes: CodeTable::new(),
            freq: BTreeMap::new()
        }
    }
    /// Codec holding the encoding of `message`
    pub fn create(message: &[u8]) -> Result<Self,Error> {
        let mut ans = Self::new();
        ans.encode(message)?;
        Ok(ans)
    }
    /// Build frequencies, tree, codes, and the encoded bits for `message`.
    pub fn encode(&mut self,message: &[u8]) -> Result<(),Error> {
        let freq = frequencies(message);
        let root = HuffmanNode::build(&freq);
        let codes = match &root {
            Some(node) => node.code_table(),
            None => CodeTable::new()
        };
        let encoded = encode_message(message,&codes)?;
        log::debug!("{} symbols, {} distinct, {} bits encoded",message.len(),codes.len(),encoded.len());
        self.message = message.to_vec();
        self.encoded = encoded;
        self.root = root;
        self.codes = codes;
        self.freq = freq;
        Ok(())
    }
    /// Encode text from a stream.  Lines end with LF, CRLF, or a lone CR, they are
    /// joined with LF and the final line terminator is dropped.  The text must be UTF-8.
    pub fn encode_stream<R: Read>(&mut self,src: R) -> Result<(),Error> {
        let mut text = String::new();
        BufReader::new(src).read_to_string(&mut text)?;
        let text = text.replace("\r\n","\n").replace('\r',"\n");
        let lines: Vec<&str> = text.split_terminator('\n').collect();
        self.encode(lines.join("\n").as_bytes())
    }
    /// Encode text from a file, see `encode_stream`.
    pub fn encode_file<P: AsRef<Path>>(&mut self,path: P) -> Result<(),Error> {
        let file = std::fs::File::open(path)?;
        self.encode_stream(file)
    }
    /// Write the artifact, returns the number of bytes written.
    pub fn write<W: Write>(&self,dst: W) -> Result<u64,Error> {
        let root = match &self.root {
            Some(node) => node,
            None => {
                log::debug!("empty message, nothing to write");
                return Ok(0);
            }
        };
        let mut writer = BitWriter::new(dst);
        let tree_bits = root.write(&mut writer)?;
        let discard = discard_bits(tree_bits,self.encoded.len() as u64);
        log::debug!("tree {} bits, payload {} bits, discard {} bits",tree_bits,self.encoded.len(),discard);
        writer.put_bits(discard,3)?;
        for bit in self.encoded.iter() {
            writer.put_bit(bit)?;
        }
        writer.flush()?;
        let ans = writer.bytes_written();
        writer.close()?;
        Ok(ans)
    }
    /// Write the artifact to a new file, returns the number of bytes written.
    pub fn save<P: AsRef<Path>>(&self,path: P) -> Result<u64,Error> {
        let file = std::fs::File::create(path)?;
        self.write(BufWriter::new(file))
    }
    /// Read an artifact and recover the message, codes, and frequencies.
    /// Weights in the recovered tree are 0, the frequencies are counted from the message.
    pub fn decode<R: Read>(&mut self,src: R) -> Result<(),Error> {
        let mut reader = BitReader::new(src);
        if !reader.has_next()? {
            log::debug!("empty artifact");
            *self = Self::new();
            return reader.close();
        }
        let root = HuffmanNode::read(&mut reader)?;
        log::debug!("tree with {} leaves in {} bits",root.leaf_count(),reader.bits_read());
        let discard = reader.get_bits(3)? as usize;
        let mut payload = BitVec::new();
        while reader.has_next()? {
            payload.push(reader.get_bit()?);
        }
        reader.close()?;
        if discard > payload.len() {
            log::error!("{} discard bits but only {} payload bits",discard,payload.len());
            return Err(Error::CorruptPayload);
        }
        let kept = payload.len() - discard;
        if payload.iter().skip(kept).any(|b| b) {
            log::error!("discard bits are not zero");
            return Err(Error::CorruptPayload);
        }
        payload.truncate(kept);
        log::debug!("payload {} bits, discard {} bits",payload.len(),discard);
        let message = root.decode_bits(&payload)?;
        self.freq = frequencies(&message);
        self.codes = root.code_table();
        self.message = message;
        self.encoded = payload;
        self.root = Some(root);
        Ok(())
    }
    /// Decode an artifact file, see `decode`.
    pub fn decode_file<P: AsRef<Path>>(&mut self,path: P) -> Result<(),Error> {
        let file = std::fs::File::open(path)?;
        self.decode(BufReader::new(file))
    }
    /// Decode bare payload bits using a code table, which must be prefix free.
    /// The table need not be complete, bits that lead nowhere are a corrupt payload.
    /// The tree is only kept if the table is complete.
    pub fn decode_bits(&mut self,code: BitVec,dictionary: CodeTable) -> Result<(),Error> {
        let trie = CodeTrie::from_code_table(&dictionary)?;
        let message = trie.decode_bits(&code)?;
        self.freq = frequencies(&message);
        self.message = message;
        self.encoded = code;
        self.root = HuffmanNode::from_code_table(&dictionary).ok().flatten();
        self.codes = dictionary;
        Ok(())
    }
    pub fn message(&self) -> &[u8] {
        &self.message
    }
    /// the message as text, invalid UTF-8 sequences are replaced
    pub fn message_string(&self) -> String {
        String::from_utf8_lossy(&self.message).to_string()
    }
    pub fn encoded(&self) -> &BitVec {
        &self.encoded
    }
    pub fn tree(&self) -> Option<&HuffmanNode> {
        self.root.as_ref()
    }
    pub fn code(&self,symbol: u8) -> Option<&BitVec> {
        self.codes.get(&symbol)
    }
    pub fn code_table(&self) -> &CodeTable {
        &self.codes
    }
    /// frequency of `symbol`, 0 if it does not appear
    pub fn frequency(&self,symbol: u8) -> f64 {
        *self.freq.get(&symbol).unwrap_or(&0.0)
    }
    pub fn frequencies(&self) -> &BTreeMap<u8,f64> {
        &self.freq
    }
    /// bits per symbol of a fixed length code over the same alphabet
    pub fn naive_code_length(&self) -> f64 {
        match self.codes.len() {
            0 => 0.0,
            n => (n as f64).log2()
        }
    }
    /// expected bits per symbol of the Huffman code
    pub fn average_code_length(&self) -> f64 {
        self.codes.iter().map(|(s,code)| self.frequency(*s) * code.len() as f64).sum()
    }
}

/// Main compression function.
/// `expanded_in` is an object with `Read` and `Seek` traits, usually `std::fs::File`, or `std::io::Cursor<&[u8]>`.
/// `compressed_out` is an object with `Write` and `Seek` traits, usually `std::fs::File`, or `std::io::Cursor<Vec<u8>>`.
/// The input is taken byte for byte.  Returns (in_size,out_size) or error.
pub fn compress<R,W>(expanded_in: &mut R, compressed_out: &mut W, opt: &Options) -> Result<(u64,u64),DYNERR>
where R: Read + Seek, W: Write + Seek {
    let mut reader = BufReader::new(expanded_in);
    let mut expanded_length = reader.seek(SeekFrom::End(0))?;
    if opt.in_offset > expanded_length {
        return Err(Box::new(Error::FileFormatMismatch));
    }
    expanded_length -= opt.in_offset;
    if expanded_length > opt.max_file_size {
        return Err(Box::new(Error::FileTooLarge));
    }
    reader.seek(SeekFrom::Start(opt.in_offset))?;
    let mut ibuf = Vec::new();
    reader.read_to_end(&mut ibuf)?;
    let codec = StaticHuffman::create(&ibuf)?;
    let mut writer = BufWriter::new(compressed_out);
    writer.seek(SeekFrom::Start(opt.out_offset))?;
    let out_size = codec.write(&mut writer)?;
    writer.flush()?;
    Ok((expanded_length,out_size))
}

/// Main decompression function.
/// `compressed_in` is an object with `Read` and `Seek` traits, usually `std::fs::File`, or `std::io::Cursor<&[u8]>`.
/// `expanded_out` is an object with `Write` and `Seek` traits, usually `std::fs::File`, or `std::io::Cursor<Vec<u8>>`.
/// Returns (in_size,out_size) or error.
pub fn expand<R,W>(compressed_in: &mut R, expanded_out: &mut W, opt: &Options) -> Result<(u64,u64),DYNERR>
where R: Read + Seek, W: Write + Seek {
    let mut reader = BufReader::new(compressed_in);
    let mut compressed_size = reader.seek(SeekFrom::End(0))?;
    if opt.in_offset > compressed_size {
        return Err(Box::new(Error::FileFormatMismatch));
    }
    compressed_size -= opt.in_offset;
    if compressed_size > opt.max_file_size {
        return Err(Box::new(Error::FileTooLarge));
    }
    reader.seek(SeekFrom::Start(opt.in_offset))?;
    let mut codec = StaticHuffman::new();
    codec.decode(&mut reader)?;
    let mut writer = BufWriter::new(expanded_out);
    writer.seek(SeekFrom::Start(opt.out_offset))?;
    writer.write_all(codec.message())?;
    writer.flush()?;
    Ok((compressed_size,codec.message().len() as u64))
}

/// Convenience function, calls `compress` with a slice returning a Vec
pub fn compress_slice(slice: &[u8],opt: &Options) -> Result<Vec<u8>,DYNERR> {
    let mut src = Cursor::new(slice);
    let mut ans: Cursor<Vec<u8>> = Cursor::new(Vec::new());
    compress(&mut src,&mut ans,opt)?;
    Ok(ans.into_inner())
}

/// Convenience function, calls `expand` with a slice returning a Vec
pub fn expand_slice(slice: &[u8],opt: &Options) -> Result<Vec<u8>,DYNERR> {
    let mut src = Cursor::new(slice);
    let mut ans: Cursor<Vec<u8>> = Cursor::new(Vec::new());
    expand(&mut src,&mut ans,opt)?;
    Ok(ans.into_inner())
}

// *************** TESTS *****************

#[cfg(test)]
use crate::STD_OPTIONS;
#[cfg(test)]
use crate::tools::huff_tree::bits_to_string;

#[test]
fn compression_works() {
    let test_data = "abracadabra".as_bytes();
    let huff_str = "61 8E 34 99 46 A7 56 E8 AD C0";
    let compressed = compress_slice(test_data,&STD_OPTIONS).expect("compression failed");
    assert_eq!(compressed,hex::decode(huff_str.replace(" ","")).unwrap());

    let test_data = "aaaa".as_bytes();
    let compressed = compress_slice(test_data,&STD_OPTIONS).expect("compression failed");
    assert_eq!(compressed,hex::decode("C300").unwrap());
}

#[test]
fn invertibility() {
    let test_data = "I am Sam. Sam I am. I do not like this Sam I am.\n".as_bytes();
    let compressed = compress_slice(test_data,&STD_OPTIONS).expect("compression failed");
    let expanded = expand_slice(&compressed,&STD_OPTIONS).expect("expansion failed");
    assert_eq!(test_data.to_vec(),expanded);

    let test_data: Vec<u8> = (0..=255).chain((0..=255).rev()).chain([0,0,0,7]).collect();
    let compressed = compress_slice(&test_data,&STD_OPTIONS).expect("compression failed");
    let expanded = expand_slice(&compressed,&STD_OPTIONS).expect("expansion failed");
    assert_eq!(test_data,expanded);
}

#[test]
fn abracadabra_tables() {
    let codec = StaticHuffman::create(b"abracadabra").expect("encode failed");
    let expected = [(b'a',5.0,"0"),(b'b',2.0,"110"),(b'c',1.0,"100"),(b'd',1.0,"101"),(b'r',2.0,"111")];
    for (symbol,count,code) in expected {
        assert!((codec.frequency(symbol) - count/11.0).abs() < 1e-12);
        assert_eq!(bits_to_string(codec.code(symbol).expect("missing code")),code);
    }
    assert_eq!(codec.frequency(b'z'),0.0);
    assert!(codec.code(b'z').is_none());
    assert_eq!(bits_to_string(codec.encoded()),"01101110100010101101110");
    assert!((codec.average_code_length() - 23.0/11.0).abs() < 1e-9);
    assert!((codec.naive_code_length() - 5f64.log2()).abs() < 1e-9);
}

#[test]
fn single_symbol() {
    let codec = StaticHuffman::create(b"aaaa").expect("encode failed");
    assert_eq!(codec.code_table().len(),1);
    assert_eq!(bits_to_string(codec.code(b'a').unwrap()),"0");
    assert_eq!(bits_to_string(codec.encoded()),"0000");
    assert_eq!(discard_bits(9,4),0);
    assert!(codec.tree().unwrap().is_leaf());
    for n in 1..20 {
        let test_data = vec![b'x';n];
        let compressed = compress_slice(&test_data,&STD_OPTIONS).expect("compression failed");
        let expanded = expand_slice(&compressed,&STD_OPTIONS).expect("expansion failed");
        assert_eq!(test_data,expanded);
    }
}

#[test]
fn empty_message() {
    let codec = StaticHuffman::create(b"").expect("encode failed");
    assert!(codec.code_table().is_empty());
    assert!(codec.frequencies().is_empty());
    assert!(codec.tree().is_none());
    assert!(codec.encoded().is_empty());
    assert_eq!(codec.naive_code_length(),0.0);
    let mut artifact = Vec::new();
    assert_eq!(codec.write(&mut artifact).expect("write failed"),0);
    assert!(artifact.is_empty());
    let mut decoded = StaticHuffman::create(b"leftover").expect("encode failed");
    decoded.decode(Cursor::new(artifact)).expect("decode failed");
    assert!(decoded.message().is_empty());
    assert!(decoded.code_table().is_empty());
    assert!(expand_slice(&[],&STD_OPTIONS).expect("expansion failed").is_empty());
}

#[test]
fn text_round_trips() {
    let printable: String = (32u8..127).map(|c| c as char).collect();
    let msgs = [
        printable.as_str(),
        "line one\nline two\r\n\ttabbed\x07\x00end",
        "ab",
        "mississippi",
        "the quick brown fox jumps over the lazy dog"
    ];
    for msg in msgs {
        let codec = StaticHuffman::create(msg.as_bytes()).expect("encode failed");
        let total: f64 = codec.frequencies().values().sum();
        assert!((total - 1.0).abs() < 1e-9);
        let mut artifact = Vec::new();
        let n = codec.write(&mut artifact).expect("write failed");
        assert_eq!(n as usize,artifact.len());
        let mut decoded = StaticHuffman::new();
        decoded.decode(Cursor::new(&artifact)).expect("decode failed");
        assert_eq!(decoded.message_string(),msg);
        assert_eq!(decoded.code_table(),codec.code_table());
        assert_eq!(decoded.encoded(),codec.encoded());
        for (symbol,f) in codec.frequencies() {
            assert!((decoded.frequency(*symbol) - f).abs() < 1e-12);
        }
    }
}

#[test]
fn discard_bound() {
    for len in 1..40 {
        let test_data: Vec<u8> = (0..len).map(|i| b"abcde"[(i*i) % 5]).collect();
        let codec = StaticHuffman::create(&test_data).expect("encode failed");
        let mut writer = BitWriter::new(Vec::new());
        let tree_bits = codec.tree().unwrap().write(&mut writer).unwrap();
        let discard = discard_bits(tree_bits,codec.encoded().len() as u64);
        assert!(discard < 8);
        assert_eq!((tree_bits + 3 + codec.encoded().len() as u64 + discard as u64) % 8,0);
        let mut artifact = Vec::new();
        codec.write(&mut artifact).unwrap();
        let mut reader = BitReader::new(Cursor::new(artifact));
        HuffmanNode::read(&mut reader).unwrap();
        assert_eq!(reader.get_bits(3).unwrap(),discard as u64);
    }
}

#[test]
fn stream_input_joins_lines() {
    let mut codec = StaticHuffman::new();
    codec.encode_stream(Cursor::new("line one\r\nline two\n\nlast\n")).expect("encode failed");
    assert_eq!(codec.message(),b"line one\nline two\n\nlast");
    codec.encode_stream(Cursor::new("a\rb\r\rc\r")).expect("encode failed");
    assert_eq!(codec.message(),b"a\nb\n\nc");
    codec.encode_stream(Cursor::new("mac\rdos\r\nunix\n\r")).expect("encode failed");
    assert_eq!(codec.message(),b"mac\ndos\nunix\n");
    let mut codec = StaticHuffman::new();
    match codec.encode_stream(Cursor::new(vec![0x61,0xff,0xfe])) {
        Err(Error::Io(e)) => assert_eq!(e.kind(),std::io::ErrorKind::InvalidData),
        _ => panic!("invalid UTF-8 was accepted")
    }
}

#[test]
fn files() {
    let temp_dir = tempfile::tempdir().expect("no temp dir");
    let txt_path = temp_dir.path().join("hamlet.txt");
    let huff_path = temp_dir.path().join("hamlet.huff");
    std::fs::write(&txt_path,"To be, or not to be, that is the question:\n").unwrap();
    let mut codec = StaticHuffman::new();
    codec.encode_file(&txt_path).expect("encode failed");
    let n = codec.save(&huff_path).expect("save failed");
    assert_eq!(std::fs::metadata(&huff_path).unwrap().len(),n);
    let mut decoded = StaticHuffman::new();
    decoded.decode_file(&huff_path).expect("decode failed");
    assert_eq!(decoded.message_string(),"To be, or not to be, that is the question:");
    let missing = temp_dir.path().join("missing.huff");
    assert!(matches!(decoded.decode_file(&missing),Err(Error::Io(_))));
}

#[test]
fn decode_with_dictionary() {
    let codec = StaticHuffman::create(b"mississippi").expect("encode failed");
    let mut decoded = StaticHuffman::new();
    decoded.decode_bits(codec.encoded().clone(),codec.code_table().clone()).expect("decode failed");
    assert_eq!(decoded.message(),b"mississippi");
    assert!((decoded.frequency(b's') - 4.0/11.0).abs() < 1e-12);

    let mut decoded = StaticHuffman::new();
    decoded.decode_bits(BitVec::new(),CodeTable::new()).expect("decode failed");
    assert!(decoded.message().is_empty());
    assert!(matches!(decoded.decode_bits(BitVec::from_elem(3,true),CodeTable::new()),Err(Error::CorruptPayload)));

    // prefix free but incomplete, `11` is not the start of any code
    let mut dictionary = CodeTable::new();
    dictionary.insert(b'a',BitVec::from_elem(1,false));
    let mut b_code = BitVec::from_elem(2,false);
    b_code.set(0,true);
    dictionary.insert(b'b',b_code);
    let mut code = BitVec::from_elem(3,false);
    code.set(1,true);
    decoded.decode_bits(code,dictionary.clone()).expect("decode failed");
    assert_eq!(decoded.message(),b"ab");
    assert!(decoded.tree().is_none());
    assert!(matches!(decoded.decode_bits(BitVec::from_elem(2,true),dictionary),Err(Error::CorruptPayload)));
}

#[test]
fn missing_symbol() {
    let codec = StaticHuffman::create(b"abc").expect("encode failed");
    assert!(matches!(encode_message(b"abd",codec.code_table()),Err(Error::SymbolNotFound(b'd'))));
}

#[test]
fn corrupt_artifacts() {
    // payload ends in the middle of a code
    let codec = StaticHuffman::create(b"abracadabra").expect("encode failed");
    let mut writer = BitWriter::new(Vec::new());
    codec.tree().unwrap().write(&mut writer).unwrap();
    writer.put_bits(0u8,3).unwrap();
    writer.put_bits(0b1111u8,4).unwrap();
    let artifact = writer.finish().unwrap();
    let mut decoded = StaticHuffman::new();
    assert!(matches!(decoded.decode(Cursor::new(artifact)),Err(Error::CorruptPayload)));

    // more discard bits than payload bits
    let mut writer = BitWriter::new(Vec::new());
    HuffmanNode::leaf(1.0,b'a').write(&mut writer).unwrap();
    writer.put_bits(7u8,3).unwrap();
    writer.put_bits(0u8,4).unwrap();
    let artifact = writer.finish().unwrap();
    assert!(matches!(decoded.decode(Cursor::new(artifact)),Err(Error::CorruptPayload)));

    // padding that is not zero, abracadabra ends in C0
    let mut compressed = compress_slice(b"abracadabra",&STD_OPTIONS).unwrap();
    *compressed.last_mut().unwrap() = 0xC1;
    assert!(matches!(decoded.decode(Cursor::new(&compressed)),Err(Error::CorruptPayload)));

    // truncated tree
    let compressed = compress_slice(b"abracadabra",&STD_OPTIONS).unwrap();
    assert!(matches!(decoded.decode(Cursor::new(&compressed[0..3])),Err(Error::EndOfStream)));
}

#[test]
fn options() {
    let mut opt = STD_OPTIONS;
    opt.in_offset = 100;
    let err = compress_slice(b"abc",&opt).expect_err("offset was accepted");
    assert!(matches!(err.downcast_ref::<Error>(),Some(Error::FileFormatMismatch)));

    let mut opt = STD_OPTIONS;
    opt.max_file_size = 2;
    let err = compress_slice(b"abc",&opt).expect_err("size was accepted");
    assert!(matches!(err.downcast_ref::<Error>(),Some(Error::FileTooLarge)));

    let mut opt = STD_OPTIONS;
    opt.in_offset = 4;
    let compressed = compress_slice(b"HDR:abracadabra",&opt).expect("compression failed");
    assert_eq!(compressed,compress_slice(b"abracadabra",&STD_OPTIONS).unwrap());
    opt.in_offset = 0;
    opt.out_offset = 2;
    let expanded = expand_slice(&compressed,&opt).expect("expansion failed");
    let mut expected = vec![0u8,0];
    expected.extend_from_slice(b"abracadabra");
    assert_eq!(expanded,expected);
}
