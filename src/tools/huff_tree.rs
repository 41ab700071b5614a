//! Module to build, store, and walk the static Huffman tree.
//! This is used by the `static_huff` module.
//!
//! Children are owned by their parent through a `Box`, there are no parent links.
//! The tree is built once from the frequency table, or read back from the artifact,
//! and is not modified after that.

use std::collections::{BTreeMap,BinaryHeap};
use std::cmp::Ordering;
use std::io::{Read,Write};
use bit_vec::BitVec;
use super::bit_io::{BitReader,BitWriter};
use crate::Error;

/// map from symbol to its code, bit 0 of the code is the first branch taken from the root
pub type CodeTable = BTreeMap<u8,BitVec>;

/// Deepest branch that can exist in a tree over 256 symbols.
/// Anything deeper in a stored tree means the data is not ours.
const MAX_BRANCH_DEPTH: usize = 254;

#[derive(Debug,Clone,PartialEq)]
pub enum HuffmanNode {
    Leaf {
        weight: f64,
        symbol: u8
    },
    Internal {
        weight: f64,
        left: Box<HuffmanNode>,
        right: Box<HuffmanNode>
    }
}

/// Entry in the priority queue used to build the tree.
/// The heap pops the lowest weight first, ties go to the lowest sequence number.
/// Leaves are numbered in ascending symbol order, merged nodes in order of creation.
struct Pending {
    node: HuffmanNode,
    seq: usize
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        other.node.weight().total_cmp(&self.node.weight())
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Pending {}

/// Render a code as a string of `0` and `1`
pub fn bits_to_string(bits: &BitVec) -> String {
    bits.iter().map(|b| if b { '1' } else { '0' }).collect()
}

impl HuffmanNode {
    pub fn leaf(weight: f64,symbol: u8) -> Self {
        Self::Leaf { weight, symbol }
    }
    /// New branch, weight is the sum of the children
    pub fn merge(left: HuffmanNode,right: HuffmanNode) -> Self {
        Self::Internal {
            weight: left.weight() + right.weight(),
            left: Box::new(left),
            right: Box::new(right)
        }
    }
    pub fn weight(&self) -> f64 {
        match self {
            Self::Leaf { weight, .. } => *weight,
            Self::Internal { weight, .. } => *weight
        }
    }
    pub fn is_leaf(&self) -> bool {
        matches!(self,Self::Leaf { .. })
    }
    pub fn symbol(&self) -> Option<u8> {
        match self {
            Self::Leaf { symbol, .. } => Some(*symbol),
            Self::Internal { .. } => None
        }
    }
    pub fn left(&self) -> Option<&HuffmanNode> {
        match self {
            Self::Internal { left, .. } => Some(&**left),
            Self::Leaf { .. } => None
        }
    }
    pub fn right(&self) -> Option<&HuffmanNode> {
        match self {
            Self::Internal { right, .. } => Some(&**right),
            Self::Leaf { .. } => None
        }
    }
    pub fn leaf_count(&self) -> usize {
        match self {
            Self::Leaf { .. } => 1,
            Self::Internal { left, right, .. } => left.leaf_count() + right.leaf_count()
        }
    }
    /// Build the tree by repeatedly merging the two lightest nodes.
    /// The first node popped goes on the left.  Returns `None` for an empty table.
    pub fn build(freq: &BTreeMap<u8,f64>) -> Option<Self> {
        let mut heap = BinaryHeap::new();
        let mut seq = 0;
        for (symbol,weight) in freq {
            heap.push(Pending { node: Self::leaf(*weight,*symbol), seq });
            seq += 1;
        }
        while heap.len() > 1 {
            let left = heap.pop()?;
            let right = heap.pop()?;
            log::trace!("merge {} and {}",left.seq,right.seq);
            heap.push(Pending { node: Self::merge(left.node,right.node), seq });
            seq += 1;
        }
        heap.pop().map(|p| p.node)
    }
    /// Derive the code of every leaf, 0 for left and 1 for right.
    /// A tree that is just a leaf gets the code `0`.
    pub fn code_table(&self) -> CodeTable {
        let mut table = CodeTable::new();
        match self {
            Self::Leaf { symbol, .. } => {
                table.insert(*symbol,BitVec::from_elem(1,false));
            },
            Self::Internal { .. } => {
                let mut path = BitVec::new();
                self.collect_codes(&mut path,&mut table);
            }
        }
        table
    }
    fn collect_codes(&self,path: &mut BitVec,table: &mut CodeTable) {
        match self {
            Self::Leaf { symbol, .. } => {
                table.insert(*symbol,path.clone());
            },
            Self::Internal { left, right, .. } => {
                path.push(false);
                left.collect_codes(path,table);
                path.pop();
                path.push(true);
                right.collect_codes(path,table);
                path.pop();
            }
        }
    }
    /// Write the tree in preorder, returns the number of bits written.
    pub fn write<W: Write>(&self,writer: &mut BitWriter<W>) -> Result<u64,Error> {
        match self {
            Self::Leaf { symbol, .. } => {
                writer.put_bit(true)?;
                writer.put_byte(*symbol)?;
                Ok(9)
            },
            Self::Internal { left, right, .. } => {
                writer.put_bit(false)?;
                let left_bits = left.write(writer)?;
                let right_bits = right.write(writer)?;
                Ok(1 + left_bits + right_bits)
            }
        }
    }
    /// Read a tree written by `write`.  Weights are not stored, so they come back as 0.
    pub fn read<R: Read>(reader: &mut BitReader<R>) -> Result<Self,Error> {
        let mut seen = [false;256];
        Self::read_node(reader,&mut seen,0)
    }
    fn read_node<R: Read>(reader: &mut BitReader<R>,seen: &mut [bool;256],depth: usize) -> Result<Self,Error> {
        if reader.get_bit()? {
            let symbol = reader.get_byte()?;
            if seen[symbol as usize] {
                log::error!("symbol {} appears twice in the tree",symbol);
                return Err(Error::FileFormatMismatch);
            }
            seen[symbol as usize] = true;
            return Ok(Self::leaf(0.0,symbol));
        }
        if depth > MAX_BRANCH_DEPTH {
            log::error!("tree is deeper than any code over 256 symbols");
            return Err(Error::FileFormatMismatch);
        }
        let left = Self::read_node(reader,seen,depth+1)?;
        let right = Self::read_node(reader,seen,depth+1)?;
        Ok(Self::merge(left,right))
    }
    /// Rebuild a tree from a code table, which must be a complete prefix code,
    /// otherwise use `CodeTrie`.  The table `{s: 0}` gives a single leaf.
    /// Returns `None` for an empty table.
    pub fn from_code_table(table: &CodeTable) -> Result<Option<Self>,Error> {
        if table.is_empty() {
            return Ok(None);
        }
        if table.values().any(|code| code.is_empty()) {
            return Err(Error::InvalidCodeTable);
        }
        if table.len() == 1 {
            return match table.iter().next() {
                Some((symbol,code)) if code.len()==1 && !code[0] => Ok(Some(Self::leaf(0.0,*symbol))),
                _ => Err(Error::InvalidCodeTable)
            };
        }
        let entries: Vec<(u8,&BitVec)> = table.iter().map(|(s,c)| (*s,c)).collect();
        Ok(Some(Self::branch_from_codes(&entries,0)?))
    }
    /// `entries` all share the first `depth` bits
    fn branch_from_codes(entries: &[(u8,&BitVec)],depth: usize) -> Result<Self,Error> {
        match entries {
            [] => Err(Error::InvalidCodeTable),
            [(symbol,code)] if code.len()==depth => Ok(Self::leaf(0.0,*symbol)),
            _ => {
                if entries.iter().any(|(_,code)| code.len()==depth) {
                    // this code is a prefix of the others
                    return Err(Error::InvalidCodeTable);
                }
                let (ones,zeros): (Vec<(u8,&BitVec)>,Vec<(u8,&BitVec)>) = entries.iter()
                    .partition(|(_,code)| code[depth]);
                let left = Self::branch_from_codes(&zeros,depth+1)?;
                let right = Self::branch_from_codes(&ones,depth+1)?;
                Ok(Self::merge(left,right))
            }
        }
    }
    /// Walk from the root for each bit, emit the symbol at each leaf and start over.
    /// Bits left over at the end, or a 1 under a single leaf tree, mean corrupt data.
    pub fn decode_bits(&self,bits: &BitVec) -> Result<Vec<u8>,Error> {
        let mut ans = Vec::new();
        if let Self::Leaf { symbol, .. } = self {
            for bit in bits.iter() {
                if bit {
                    log::error!("bit {} does not match the only code",ans.len());
                    return Err(Error::CorruptPayload);
                }
                ans.push(*symbol);
            }
            return Ok(ans);
        }
        let mut node = self;
        for bit in bits.iter() {
            if let Self::Internal { left, right, .. } = node {
                node = match bit {
                    true => &**right,
                    false => &**left
                };
            }
            if let Self::Leaf { symbol, .. } = node {
                ans.push(*symbol);
                node = self;
            }
        }
        if !std::ptr::eq(node,self) {
            log::error!("payload ends in the middle of a code");
            return Err(Error::CorruptPayload);
        }
        Ok(ans)
    }
}

/// Decoding trie for a code table supplied from outside.
/// Unlike `HuffmanNode`, a branch may be missing a side.
#[derive(Default)]
struct TrieNode {
    symbol: Option<u8>,
    sons: [Option<Box<TrieNode>>;2]
}

/// Decodes bits with any prefix-free code table, complete or not.
pub struct CodeTrie {
    root: TrieNode
}

impl CodeTrie {
    /// Rejects empty codes, duplicate codes, and codes that are a prefix of another code.
    pub fn from_code_table(table: &CodeTable) -> Result<Self,Error> {
        let mut root = TrieNode::default();
        for (symbol,code) in table {
            if code.is_empty() {
                return Err(Error::InvalidCodeTable);
            }
            let mut node = &mut root;
            for bit in code.iter() {
                if node.symbol.is_some() {
                    // an earlier code is a prefix of this one
                    return Err(Error::InvalidCodeTable);
                }
                node = &mut **node.sons[bit as usize].get_or_insert_with(Box::default);
            }
            if node.symbol.is_some() || node.sons.iter().any(|son| son.is_some()) {
                return Err(Error::InvalidCodeTable);
            }
            node.symbol = Some(*symbol);
        }
        Ok(Self { root })
    }
    /// Same walk as `HuffmanNode::decode_bits`, a bit that leads nowhere is corrupt data.
    pub fn decode_bits(&self,bits: &BitVec) -> Result<Vec<u8>,Error> {
        let mut ans = Vec::new();
        let mut node = &self.root;
        for bit in bits.iter() {
            node = match &node.sons[bit as usize] {
                Some(son) => &**son,
                None => {
                    log::error!("missing branch after {} symbols",ans.len());
                    return Err(Error::CorruptPayload);
                }
            };
            if let Some(symbol) = node.symbol {
                ans.push(symbol);
                node = &self.root;
            }
        }
        if !std::ptr::eq(node,&self.root) {
            log::error!("payload ends in the middle of a code");
            return Err(Error::CorruptPayload);
        }
        Ok(ans)
    }
}

// *************** TESTS *****************

#[cfg(test)]
fn bits(s: &str) -> BitVec {
    s.chars().map(|c| c=='1').collect()
}

#[cfg(test)]
fn counted(msg: &str) -> BTreeMap<u8,f64> {
    let mut counts: BTreeMap<u8,usize> = BTreeMap::new();
    for c in msg.bytes() {
        *counts.entry(c).or_insert(0) += 1;
    }
    counts.into_iter().map(|(c,n)| (c,n as f64 / msg.len() as f64)).collect()
}

#[test]
fn build_abracadabra() {
    let root = HuffmanNode::build(&counted("abracadabra")).expect("no tree");
    assert_eq!(root.leaf_count(),5);
    assert!((root.weight() - 1.0).abs() < 1e-9);
    let table = root.code_table();
    let expected = [(b'a',"0"),(b'b',"110"),(b'c',"100"),(b'd',"101"),(b'r',"111")];
    assert_eq!(table.len(),expected.len());
    for (symbol,code) in expected {
        assert_eq!(bits_to_string(&table[&symbol]),code);
    }
}

#[test]
fn single_and_empty() {
    assert!(HuffmanNode::build(&BTreeMap::new()).is_none());
    let root = HuffmanNode::build(&counted("zzz")).expect("no tree");
    assert!(root.is_leaf());
    assert_eq!(root.symbol(),Some(b'z'));
    let table = root.code_table();
    assert_eq!(bits_to_string(&table[&b'z']),"0");
}

#[test]
fn codes_are_prefix_free() {
    let msgs = [
        "abracadabra",
        "the quick brown fox jumps over the lazy dog",
        "aaaaaaaaaaaaaaaabbbbbbbbccccddeeffgh\n\t\r",
        "ab"
    ];
    for msg in msgs {
        let table = HuffmanNode::build(&counted(msg)).expect("no tree").code_table();
        for (s1,c1) in &table {
            for (s2,c2) in &table {
                if s1==s2 {
                    continue;
                }
                let n = c1.len().min(c2.len());
                let is_prefix = (0..n).all(|i| c1[i]==c2[i]);
                assert!(!is_prefix,"{} and {} collide in {:?}",s1,s2,msg);
            }
        }
    }
}

#[test]
fn store_and_restore() {
    let root = HuffmanNode::build(&counted("abracadabra")).expect("no tree");
    let mut writer = BitWriter::new(Vec::new());
    // 4 branches and 5 leaves
    assert_eq!(root.write(&mut writer).expect("write failed"),49);
    let bytes = writer.finish().expect("flush failed");
    assert_eq!(bytes.len(),7);
    let mut reader = BitReader::new(std::io::Cursor::new(bytes));
    let restored = HuffmanNode::read(&mut reader).expect("read failed");
    assert_eq!(reader.bits_read(),49);
    assert_eq!(restored.code_table(),root.code_table());
}

#[test]
fn runaway_tree() {
    let mut reader = BitReader::new(std::io::Cursor::new(vec![0u8;64]));
    assert!(matches!(HuffmanNode::read(&mut reader),Err(Error::FileFormatMismatch)));
    let mut reader = BitReader::new(std::io::Cursor::new(vec![0u8;4]));
    assert!(matches!(HuffmanNode::read(&mut reader),Err(Error::EndOfStream)));
}

#[test]
fn duplicate_leaf() {
    let mut writer = BitWriter::new(Vec::new());
    HuffmanNode::merge(HuffmanNode::leaf(0.5,b'x'),HuffmanNode::leaf(0.5,b'x')).write(&mut writer).unwrap();
    let bytes = writer.finish().unwrap();
    let mut reader = BitReader::new(std::io::Cursor::new(bytes));
    assert!(matches!(HuffmanNode::read(&mut reader),Err(Error::FileFormatMismatch)));
}

#[test]
fn tree_from_table() {
    let root = HuffmanNode::build(&counted("mississippi river")).expect("no tree");
    let table = root.code_table();
    let rebuilt = HuffmanNode::from_code_table(&table).expect("bad table").expect("no tree");
    assert_eq!(rebuilt.code_table(),table);

    let mut single = CodeTable::new();
    single.insert(b'q',bits("0"));
    let rebuilt = HuffmanNode::from_code_table(&single).expect("bad table").expect("no tree");
    assert_eq!(rebuilt.symbol(),Some(b'q'));

    assert!(HuffmanNode::from_code_table(&CodeTable::new()).expect("bad table").is_none());
}

#[test]
fn bad_tables() {
    let cases: [&[(u8,&str)];4] = [
        &[(b'a',"0"),(b'b',"01")],
        &[(b'a',"01"),(b'b',"0")],
        &[(b'a',"0"),(b'b',"0")],
        &[(b'a',""),(b'b',"1")]
    ];
    for case in cases {
        let table: CodeTable = case.iter().map(|(s,c)| (*s,bits(c))).collect();
        assert!(matches!(HuffmanNode::from_code_table(&table),Err(Error::InvalidCodeTable)));
        assert!(matches!(CodeTrie::from_code_table(&table),Err(Error::InvalidCodeTable)));
    }
}

#[test]
fn incomplete_tables() {
    let table: CodeTable = [(b'a',bits("0")),(b'b',bits("10"))].into_iter().collect();
    // a tree needs both sides of every branch
    assert!(matches!(HuffmanNode::from_code_table(&table),Err(Error::InvalidCodeTable)));
    let trie = CodeTrie::from_code_table(&table).expect("bad table");
    assert_eq!(trie.decode_bits(&bits("010")).unwrap(),b"ab".to_vec());
    assert!(matches!(trie.decode_bits(&bits("011")),Err(Error::CorruptPayload)));
    assert!(matches!(trie.decode_bits(&bits("01")),Err(Error::CorruptPayload)));

    let table: CodeTable = [(b'z',bits("1"))].into_iter().collect();
    let trie = CodeTrie::from_code_table(&table).expect("bad table");
    assert_eq!(trie.decode_bits(&bits("11")).unwrap(),b"zz".to_vec());
    assert!(matches!(trie.decode_bits(&bits("0")),Err(Error::CorruptPayload)));

    let trie = CodeTrie::from_code_table(&CodeTable::new()).expect("bad table");
    assert!(trie.decode_bits(&BitVec::new()).unwrap().is_empty());
}

#[test]
fn abracadabra_shape() {
    let root = HuffmanNode::build(&counted("abracadabra")).expect("no tree");
    assert_eq!(root.left().and_then(|n| n.symbol()),Some(b'a'));
    let upper = root.right().expect("missing right side");
    let cd = upper.left().expect("missing left side");
    let br = upper.right().expect("missing right side");
    assert_eq!(cd.left().and_then(|n| n.symbol()),Some(b'c'));
    assert_eq!(cd.right().and_then(|n| n.symbol()),Some(b'd'));
    assert_eq!(br.left().and_then(|n| n.symbol()),Some(b'b'));
    assert_eq!(br.right().and_then(|n| n.symbol()),Some(b'r'));
    assert!((cd.weight() - 2.0/11.0).abs() < 1e-12);
    let a = root.left().unwrap();
    assert!(a.left().is_none() && a.right().is_none());
}

#[test]
fn walk_decoding() {
    let root = HuffmanNode::build(&counted("abracadabra")).expect("no tree");
    let ans = root.decode_bits(&bits("01101110100010101101110")).expect("decode failed");
    assert_eq!(ans,b"abracadabra".to_vec());
    assert!(matches!(root.decode_bits(&bits("011011")),Err(Error::CorruptPayload)));

    let leaf = HuffmanNode::leaf(1.0,b'a');
    assert_eq!(leaf.decode_bits(&bits("000")).unwrap(),b"aaa".to_vec());
    assert!(matches!(leaf.decode_bits(&bits("001")),Err(Error::CorruptPayload)));
    assert!(root.decode_bits(&BitVec::new()).unwrap().is_empty());
}
