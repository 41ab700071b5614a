//! Bit streams layered over byte streams.
//!
//! Bits are packed into each byte starting from the MSB.  Multi-bit values are moved
//! one bit at a time starting from the LSB of the value, and `get_bits` puts them back
//! together in the same order.  The artifact format depends on both conventions.

use std::io::{Read,Write,ErrorKind};
use num_traits::PrimInt;
use crate::Error;

/// Accumulates bits and emits each byte as soon as it is complete.
pub struct BitWriter<W: Write> {
    /// `None` once the stream is closed
    writer: Option<W>,
    buf: u8,
    /// number of bits waiting in `buf`
    count: u8,
    bits_written: u64
}

/// Hands out bits from a byte source, one byte is buffered at a time.
pub struct BitReader<R: Read> {
    /// `None` once the stream is closed
    reader: Option<R>,
    buf: u8,
    /// number of bits in `buf` not yet handed out
    remaining: u8,
    bits_read: u64
}

impl <W: Write> BitWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Some(writer),
            buf: 0,
            count: 0,
            bits_written: 0
        }
    }
    /// Append one bit, the byte is written out when the 8th bit arrives.
    pub fn put_bit(&mut self,bit: bool) -> Result<(),Error> {
        let sink = self.writer.as_mut().ok_or(Error::StreamClosed)?;
        self.buf = self.buf << 1 | bit as u8;
        self.count += 1;
        self.bits_written += 1;
        if self.count == 8 {
            sink.write_all(&[self.buf])?;
            self.buf = 0;
            self.count = 0;
        }
        Ok(())
    }
    /// Append the `num_bits` least significant bits of `val`, starting with bit 0.
    pub fn put_bits<T: PrimInt>(&mut self,val: T,num_bits: usize) -> Result<(),Error> {
        if num_bits > std::mem::size_of::<T>() * 8 {
            return Err(Error::BitCount(num_bits));
        }
        for i in 0..num_bits {
            self.put_bit((val >> i) & T::one() != T::zero())?;
        }
        Ok(())
    }
    /// Bytes go through `put_bits`, so `get_byte` recovers them at any alignment.
    pub fn put_byte(&mut self,val: u8) -> Result<(),Error> {
        self.put_bits(val,8)
    }
    pub fn put_bytes(&mut self,vals: &[u8]) -> Result<(),Error> {
        for val in vals {
            self.put_byte(*val)?;
        }
        Ok(())
    }
    /// Write the text as its UTF-8 bytes, with no length or terminator.
    pub fn put_str(&mut self,val: &str) -> Result<(),Error> {
        self.put_bytes(val.as_bytes())
    }
    /// IEEE 754 bit pattern, 32 bits
    pub fn put_f32(&mut self,val: f32) -> Result<(),Error> {
        self.put_bits(val.to_bits(),32)
    }
    /// IEEE 754 bit pattern, 64 bits
    pub fn put_f64(&mut self,val: f64) -> Result<(),Error> {
        self.put_bits(val.to_bits(),64)
    }
    /// zero bits that `flush` would add to complete the current byte
    pub fn padding(&self) -> u8 {
        (8 - self.count) % 8
    }
    /// total bits accepted so far, including padding
    pub fn bits_written(&self) -> u64 {
        self.bits_written
    }
    /// number of complete bytes passed to the sink
    pub fn bytes_written(&self) -> u64 {
        self.bits_written / 8
    }
    /// Pad the current byte with zeros, write it, and flush the sink.
    pub fn flush(&mut self) -> Result<(),Error> {
        while self.count > 0 {
            self.put_bit(false)?;
        }
        match self.writer.as_mut() {
            Some(sink) => Ok(sink.flush()?),
            None => Err(Error::StreamClosed)
        }
    }
    /// Flush and release the sink, any further operation is an error.
    pub fn close(&mut self) -> Result<(),Error> {
        self.flush()?;
        self.writer = None;
        Ok(())
    }
    /// Flush and give back the sink.
    pub fn finish(mut self) -> Result<W,Error> {
        self.flush()?;
        self.writer.take().ok_or(Error::StreamClosed)
    }
}

impl <W: Write> Drop for BitWriter<W> {
    fn drop(&mut self) {
        if self.writer.is_some() {
            let _ = self.flush();
        }
    }
}

impl <R: Read> BitReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: Some(reader),
            buf: 0,
            remaining: 0,
            bits_read: 0
        }
    }
    /// Load the next byte, returns false at end of stream.
    fn fill(&mut self) -> Result<bool,Error> {
        let reader = self.reader.as_mut().ok_or(Error::StreamClosed)?;
        let mut by: [u8;1] = [0];
        match reader.read_exact(&mut by) {
            Ok(()) => {
                self.buf = by[0];
                self.remaining = 8;
                Ok(true)
            },
            Err(e) if e.kind()==ErrorKind::UnexpectedEof => Ok(false),
            Err(e) => Err(Error::Io(e))
        }
    }
    /// Is there another bit, reads from the source if necessary.
    pub fn has_next(&mut self) -> Result<bool,Error> {
        if self.reader.is_none() {
            return Err(Error::StreamClosed);
        }
        if self.remaining > 0 {
            return Ok(true);
        }
        self.fill()
    }
    pub fn get_bit(&mut self) -> Result<bool,Error> {
        if !self.has_next()? {
            return Err(Error::EndOfStream);
        }
        self.remaining -= 1;
        self.bits_read += 1;
        Ok((self.buf >> self.remaining) & 1 == 1)
    }
    /// Read `num_bits` into a value, the first bit read is bit 0.
    pub fn get_bits(&mut self,num_bits: usize) -> Result<u64,Error> {
        if num_bits > 64 {
            return Err(Error::BitCount(num_bits));
        }
        let mut ans: u64 = 0;
        for i in 0..num_bits {
            ans |= (self.get_bit()? as u64) << i;
        }
        Ok(ans)
    }
    pub fn get_byte(&mut self) -> Result<u8,Error> {
        Ok(self.get_bits(8)? as u8)
    }
    pub fn get_char(&mut self) -> Result<char,Error> {
        Ok(self.get_byte()? as char)
    }
    pub fn get_i32(&mut self) -> Result<i32,Error> {
        Ok(self.get_bits(32)? as u32 as i32)
    }
    pub fn get_f32(&mut self) -> Result<f32,Error> {
        Ok(f32::from_bits(self.get_bits(32)? as u32))
    }
    pub fn get_f64(&mut self) -> Result<f64,Error> {
        Ok(f64::from_bits(self.get_bits(64)?))
    }
    pub fn bits_read(&self) -> u64 {
        self.bits_read
    }
    pub fn close(&mut self) -> Result<(),Error> {
        match self.reader.take() {
            Some(_) => Ok(()),
            None => Err(Error::StreamClosed)
        }
    }
}

#[test]
fn msb_first_packing() {
    let mut writer = BitWriter::new(Vec::new());
    for bit in [true,false,true,true,false,false,false,true,true] {
        writer.put_bit(bit).expect("write failed");
    }
    assert_eq!(writer.padding(),7);
    let ans = writer.finish().expect("flush failed");
    assert_eq!(ans,vec![0b1011_0001,0b1000_0000]);
}

#[test]
fn multi_bit_values_start_at_lsb() {
    let mut writer = BitWriter::new(Vec::new());
    writer.put_bits(0b110u8,3).expect("write failed");
    writer.put_byte(b'a').expect("write failed");
    assert_eq!(writer.bits_written(),11);
    assert_eq!(writer.bytes_written(),1);
    let ans = writer.finish().expect("flush failed");
    // 011 then 0x61 from bit 0: 10000110, then 5 bits padding
    assert_eq!(ans,hex::decode("70C0").unwrap());
}

#[test]
fn signed_values() {
    let mut writer = BitWriter::new(Vec::new());
    writer.put_bits(-1i32,5).expect("write failed");
    assert_eq!(writer.finish().unwrap(),vec![0b1111_1000]);
}

#[test]
fn symmetry() {
    let vals: [u64;5] = [0,1,u64::MAX,0x0123_4567_89ab_cdef,0xa5a5_5a5a_f00f_0ff0];
    let mut writer = BitWriter::new(Vec::new());
    for num_bits in 1..=64 {
        for v in vals {
            writer.put_bits(v,num_bits).expect("write failed");
        }
    }
    let bytes = writer.finish().expect("flush failed");
    let mut reader = BitReader::new(std::io::Cursor::new(bytes));
    for num_bits in 1..=64 {
        let mask = match num_bits {
            64 => u64::MAX,
            n => (1u64 << n) - 1
        };
        for v in vals {
            assert_eq!(reader.get_bits(num_bits).expect("read failed"),v & mask);
        }
    }
}

#[test]
fn padding_completes_the_byte() {
    for n in 0..16 {
        let mut writer = BitWriter::new(Vec::new());
        writer.put_bits(0u16,n).expect("write failed");
        let expected_pad = (8 - n % 8) % 8;
        assert_eq!(writer.padding() as usize,expected_pad);
        writer.flush().expect("flush failed");
        assert_eq!(writer.bits_written() as usize,n + expected_pad);
        assert_eq!(writer.bits_written() % 8,0);
    }
}

#[test]
fn end_of_stream() {
    let mut reader = BitReader::new(std::io::Cursor::new(vec![0x80u8]));
    assert!(reader.has_next().unwrap());
    assert!(reader.get_bit().unwrap());
    assert_eq!(reader.get_bits(7).unwrap(),0);
    assert_eq!(reader.bits_read(),8);
    assert!(!reader.has_next().unwrap());
    assert!(!reader.has_next().unwrap());
    assert!(matches!(reader.get_bit(),Err(Error::EndOfStream)));
}

#[test]
fn closed_streams() {
    let mut writer = BitWriter::new(Vec::new());
    writer.put_bit(true).unwrap();
    writer.close().expect("close failed");
    assert!(matches!(writer.put_bit(true),Err(Error::StreamClosed)));
    assert!(matches!(writer.close(),Err(Error::StreamClosed)));
    let mut reader = BitReader::new(std::io::Cursor::new(vec![0u8]));
    reader.close().expect("close failed");
    assert!(matches!(reader.has_next(),Err(Error::StreamClosed)));
    assert!(matches!(reader.get_bit(),Err(Error::StreamClosed)));
}

#[test]
fn too_many_bits() {
    let mut writer = BitWriter::new(Vec::new());
    assert!(matches!(writer.put_bits(0u8,9),Err(Error::BitCount(9))));
    assert!(matches!(writer.put_bits(0u64,65),Err(Error::BitCount(65))));
    let mut reader = BitReader::new(std::io::Cursor::new(vec![0u8;16]));
    assert!(matches!(reader.get_bits(65),Err(Error::BitCount(65))));
}

#[test]
fn drop_flushes_partial_byte() {
    let mut ans: Vec<u8> = Vec::new();
    {
        let mut writer = BitWriter::new(&mut ans);
        writer.put_bits(0b11u8,2).unwrap();
    }
    assert_eq!(ans,vec![0b1100_0000]);
}

#[test]
fn bytes_and_chars() {
    let mut writer = BitWriter::new(Vec::new());
    writer.put_bit(false).unwrap();
    writer.put_bytes("Sam".as_bytes()).unwrap();
    let mut reader = BitReader::new(std::io::Cursor::new(writer.finish().unwrap()));
    assert!(!reader.get_bit().unwrap());
    assert_eq!(reader.get_char().unwrap(),'S');
    assert_eq!(reader.get_byte().unwrap(),b'a');
    assert_eq!(reader.get_char().unwrap(),'m');
    assert_eq!(reader.get_bits(7).unwrap(),0);
    assert!(!reader.has_next().unwrap());
}

#[test]
fn numbers_and_text() {
    let mut writer = BitWriter::new(Vec::new());
    writer.put_bits(1u8,3).unwrap();
    writer.put_bits(-12345i32,32).unwrap();
    writer.put_f32(-0.15625).unwrap();
    writer.put_f64(std::f64::consts::PI).unwrap();
    writer.put_str("né").unwrap();
    assert_eq!(writer.bits_written(),3 + 32 + 32 + 64 + 24);
    let mut reader = BitReader::new(std::io::Cursor::new(writer.finish().unwrap()));
    assert_eq!(reader.get_bits(3).unwrap(),1);
    assert_eq!(reader.get_i32().unwrap(),-12345);
    assert_eq!(reader.get_f32().unwrap(),-0.15625);
    assert_eq!(reader.get_f64().unwrap(),std::f64::consts::PI);
    let mut text = Vec::new();
    for _ in 0..3 {
        text.push(reader.get_byte().unwrap());
    }
    assert_eq!(String::from_utf8(text).unwrap(),"né");
    assert_eq!(reader.get_bits(5).unwrap(),0);
    assert!(matches!(reader.get_f64(),Err(Error::EndOfStream)));
}
