//! Run-length and delta column codecs layered on top of the bitstream
//! primitives. A column is a sequence of `Option<T>` values; runs of equal
//! non-null values collapse to `(count, value)`, singleton runs coalesce into
//! literal runs, and null runs collapse to a single count.

use crate::bitstream::{Decodable, Decoder, Encodable, Encoder};
use crate::error::DecodingError;

#[derive(Debug, Clone)]
enum RleState<T> {
    Empty,
    InitialNullRun(usize),
    NullRun(usize),
    LiteralRun(T, Vec<T>),
    LoneVal(T),
    Run(T, usize),
}

/// Encodes a sequence of `Option<T>` into the RLE column format described in
/// the header-sign dispatch: positive header = run, negative = literal run,
/// zero = null run.
pub struct RleEncoder<T> {
    buf: Encoder,
    state: RleState<T>,
}

impl<T: Clone + PartialEq + Encodable> RleEncoder<T> {
    pub fn new() -> Self {
        Self {
            buf: Encoder::new(),
            state: RleState::Empty,
        }
    }

    fn take_state(&mut self) -> RleState<T> {
        std::mem::replace(&mut self.state, RleState::Empty)
    }

    fn flush_run(&mut self, val: &T, len: usize) {
        self.buf.append_int(len as i64);
        val.encode(&mut self.buf);
    }

    fn flush_null_run(&mut self, len: usize) {
        self.buf.append_int(0);
        self.buf.append_uint(len as u64);
    }

    fn flush_lit_run(&mut self, mut run: Vec<T>) {
        self.buf.append_int(-(run.len() as i64));
        for val in run.drain(..) {
            val.encode(&mut self.buf);
        }
    }

    pub fn append_null(&mut self) {
        self.state = match self.take_state() {
            RleState::Empty => RleState::InitialNullRun(1),
            RleState::InitialNullRun(n) => RleState::InitialNullRun(n + 1),
            RleState::NullRun(n) => RleState::NullRun(n + 1),
            RleState::LoneVal(val) => {
                self.flush_lit_run(vec![val]);
                RleState::NullRun(1)
            }
            RleState::Run(val, n) => {
                self.flush_run(&val, n);
                RleState::NullRun(1)
            }
            RleState::LiteralRun(last, mut run) => {
                run.push(last);
                self.flush_lit_run(run);
                RleState::NullRun(1)
            }
        };
    }

    pub fn append_value(&mut self, value: T) {
        self.state = match self.take_state() {
            RleState::Empty => RleState::LoneVal(value),
            RleState::InitialNullRun(n) => {
                self.flush_null_run(n);
                RleState::LoneVal(value)
            }
            RleState::NullRun(n) => {
                self.flush_null_run(n);
                RleState::LoneVal(value)
            }
            RleState::LoneVal(last) => {
                if last == value {
                    RleState::Run(value, 2)
                } else {
                    RleState::LiteralRun(value, vec![last])
                }
            }
            RleState::Run(last, n) => {
                if last == value {
                    RleState::Run(value, n + 1)
                } else {
                    self.flush_run(&last, n);
                    RleState::LoneVal(value)
                }
            }
            RleState::LiteralRun(last, mut run) => {
                if last == value {
                    self.flush_lit_run(run);
                    RleState::Run(value, 2)
                } else {
                    run.push(last);
                    RleState::LiteralRun(value, run)
                }
            }
        };
    }

    pub fn append(&mut self, value: Option<T>) {
        match value {
            Some(v) => self.append_value(v),
            None => self.append_null(),
        }
    }

    pub fn finish(mut self) -> Vec<u8> {
        match self.take_state() {
            RleState::Empty => {}
            RleState::InitialNullRun(_) => {}
            RleState::NullRun(n) => self.flush_null_run(n),
            RleState::LoneVal(val) => self.flush_lit_run(vec![val]),
            RleState::Run(val, n) => self.flush_run(&val, n),
            RleState::LiteralRun(last, mut run) => {
                run.push(last);
                self.flush_lit_run(run);
            }
        }
        self.buf.into_bytes()
    }
}

impl<T: Clone + PartialEq + Encodable> Default for RleEncoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Decodes an RLE column, yielding `Option<T>` one element at a time.
pub struct RleDecoder<'a, T> {
    decoder: Decoder<'a>,
    last_value: Option<T>,
    count: isize,
    literal: bool,
}

impl<'a, T: Decodable> RleDecoder<'a, T> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            decoder: Decoder::new(bytes),
            last_value: None,
            count: 0,
            literal: false,
        }
    }

    pub fn done(&self) -> bool {
        self.count == 0 && self.decoder.done()
    }
}

impl<'a, T: Decodable + Clone> Iterator for RleDecoder<'a, T> {
    type Item = Result<Option<T>, DecodingError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.count == 0 {
                if self.decoder.done() {
                    return None;
                }
                let header = match self.decoder.read_int() {
                    Ok(h) => h,
                    Err(e) => return Some(Err(e)),
                };
                if header > 0 {
                    self.count = header as isize;
                    self.literal = false;
                    self.last_value = match T::decode(&mut self.decoder) {
                        Ok(v) => Some(v),
                        Err(e) => return Some(Err(e)),
                    };
                } else if header < 0 {
                    self.count = -header as isize;
                    self.literal = true;
                } else {
                    let null_count = match self.decoder.read_uint() {
                        Ok(n) => n,
                        Err(e) => return Some(Err(e)),
                    };
                    if null_count == 0 {
                        continue;
                    }
                    self.count = null_count as isize;
                    self.literal = false;
                    self.last_value = None;
                }
            }
            self.count -= 1;
            return if self.literal {
                Some(T::decode(&mut self.decoder).map(Some))
            } else {
                Some(Ok(self.last_value.clone()))
            };
        }
    }
}

/// Delta-encodes a column of integers as the RLE-encoded sequence of
/// successive differences; a null means "no value", not a zero delta.
pub struct DeltaEncoder {
    rle: RleEncoder<i64>,
    absolute_value: i64,
}

impl DeltaEncoder {
    pub fn new() -> Self {
        Self {
            rle: RleEncoder::new(),
            absolute_value: 0,
        }
    }

    pub fn append_value(&mut self, value: i64) {
        let delta = value - self.absolute_value;
        self.absolute_value = value;
        self.rle.append_value(delta);
    }

    pub fn append_null(&mut self) {
        self.rle.append_null();
    }

    pub fn append(&mut self, value: Option<i64>) {
        match value {
            Some(v) => self.append_value(v),
            None => self.append_null(),
        }
    }

    pub fn finish(self) -> Vec<u8> {
        self.rle.finish()
    }
}

impl Default for DeltaEncoder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct DeltaDecoder<'a> {
    rle: RleDecoder<'a, i64>,
    absolute_value: i64,
}

impl<'a> DeltaDecoder<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            rle: RleDecoder::new(bytes),
            absolute_value: 0,
        }
    }

    pub fn done(&self) -> bool {
        self.rle.done()
    }
}

impl<'a> Iterator for DeltaDecoder<'a> {
    type Item = Result<Option<i64>, DecodingError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.rle.next()? {
            Ok(Some(delta)) => {
                self.absolute_value += delta;
                Some(Ok(Some(self.absolute_value)))
            }
            Ok(None) => Some(Ok(None)),
            Err(e) => Some(Err(e)),
        }
    }
}
