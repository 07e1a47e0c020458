// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Byte-oriented input/output streams with bounded-length substreams.
//!
//! Field callbacks are stored as plain `fn` pointers in `'static`
//! [`crate::descriptor::MessageDescriptor`] tables, so the stream types here
//! use trait objects (`dyn Read`/`dyn Write`) rather than a generic reader
//! or writer type parameter — a generic stream would force every descriptor
//! to be generic over its I/O type, which breaks the "one immutable,
//! shareable descriptor per message type" model the wire primitives rely
//! on. This mirrors the reference implementation's use of a plain function
//! pointer callback plus an opaque `state` pointer.

use std::io::{self, Read, Write};

use crate::error::{Error, Result};
use crate::wire;

/// Input stream: `read`/`skip` with a `bytes_left` budget. A caller that
/// wants to skip a field never needs to allocate a scratch buffer — `skip`
/// discards bytes directly from the underlying reader.
pub struct InputStream<'a> {
    reader: &'a mut dyn Read,
    bytes_left: u64,
    error: Option<Error>,
}

impl<'a> InputStream<'a> {
    /// Wraps `reader`, treating the next `len` bytes as the message body.
    pub fn new(reader: &'a mut dyn Read, len: u64) -> Self {
        InputStream {
            reader,
            bytes_left: len,
            error: None,
        }
    }

    pub fn from_buffer(buf: &'a mut &[u8]) -> InputStream<'a> {
        let len = buf.len() as u64;
        InputStream::new(buf, len)
    }

    pub fn bytes_left(&self) -> u64 {
        self.bytes_left
    }

    /// The first error recorded on this stream, if any ("sticky" error:
    /// later failures never overwrite it).
    pub fn error(&self) -> Option<Error> {
        self.error
    }

    fn fail(&mut self, err: Error) -> Error {
        if self.error.is_none() {
            self.error = Some(err);
        }
        err
    }

    /// Reads exactly `dst.len()` bytes, failing with [`Error::EndOfStream`]
    /// if fewer remain in the budget.
    pub fn read(&mut self, dst: &mut [u8]) -> Result<()> {
        let n = dst.len() as u64;
        if n > self.bytes_left {
            return Err(self.fail(Error::EndOfStream));
        }
        self.reader
            .read_exact(dst)
            .map_err(|_| self.fail(Error::Io))?;
        self.bytes_left -= n;
        Ok(())
    }

    pub fn read_byte(&mut self) -> Result<u8> {
        let mut b = [0u8; 1];
        self.read(&mut b)?;
        Ok(b[0])
    }

    /// Discards `n` bytes without requiring a scratch buffer.
    pub fn skip(&mut self, n: u64) -> Result<()> {
        if n > self.bytes_left {
            return Err(self.fail(Error::EndOfStream));
        }
        let copied = io::copy(&mut self.reader.by_ref().take(n), &mut io::sink())
            .map_err(|_| Error::Io)?;
        if copied != n {
            return Err(self.fail(Error::EndOfStream));
        }
        self.bytes_left -= n;
        Ok(())
    }

    /// Decodes the tag for the next field. Returns `Ok(None)` at a
    /// zero-valued tag, which callers treat either as end-of-message
    /// (`NULLTERMINATED` mode) or as a hard error, depending on the active
    /// decode mode.
    pub fn decode_tag(&mut self) -> Result<Option<(u32, wire::WireType)>> {
        let mut byte = [0u8; 1];
        // A tag at exactly the message boundary is a clean end-of-message,
        // not an error; peek via bytes_left rather than reading first.
        if self.bytes_left == 0 {
            return Ok(None);
        }
        self.read(&mut byte)?;
        let (value, tag_byte) = if byte[0] & 0x80 == 0 {
            (byte[0] as u64, byte[0])
        } else {
            let mut buf = vec![byte[0]];
            loop {
                let b = self.read_byte()?;
                buf.push(b);
                if b & 0x80 == 0 {
                    break;
                }
            }
            let (v, _) = wire::decode_varint(&buf)?;
            (v, 0)
        };
        let _ = tag_byte;
        if value == 0 {
            return Ok(None);
        }
        let (field_number, wire_type) = wire::split_tag(value)?;
        if field_number == 0 {
            return Err(self.fail(Error::ZeroTag));
        }
        Ok(Some((field_number, wire_type)))
    }

    pub fn decode_varint(&mut self) -> Result<u64> {
        let mut buf = Vec::with_capacity(4);
        loop {
            let b = self.read_byte()?;
            buf.push(b);
            if b & 0x80 == 0 {
                break;
            }
            if buf.len() > 10 {
                return Err(self.fail(Error::VarintOverflow));
            }
        }
        let (v, _) = wire::decode_varint(&buf).map_err(|e| self.fail(e))?;
        Ok(v)
    }

    pub fn decode_varint32(&mut self) -> Result<u32> {
        let mut buf = Vec::with_capacity(4);
        loop {
            let b = self.read_byte()?;
            buf.push(b);
            if b & 0x80 == 0 {
                break;
            }
            if buf.len() > 10 {
                return Err(self.fail(Error::VarintOverflow));
            }
        }
        let (v, _) = wire::decode_varint32(&buf).map_err(|e| self.fail(e))?;
        Ok(v)
    }

    pub fn decode_fixed32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    pub fn decode_fixed64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Skips the payload of a field with the given wire type.
    pub fn skip_field(&mut self, wire_type: wire::WireType) -> Result<()> {
        match wire_type {
            wire::WireType::Varint => {
                self.decode_varint()?;
                Ok(())
            }
            wire::WireType::Bit64 => self.skip(8),
            wire::WireType::Bit32 => self.skip(4),
            wire::WireType::String => {
                let len = self.decode_varint32()?;
                self.skip(len as u64)
            }
        }
    }

    /// Opens a bounded substream covering a length-delimited field's body.
    /// `L` must not exceed the remaining parent budget.
    pub fn make_string_substream(&mut self) -> Result<InputStream<'_>> {
        let len = self.decode_varint32()? as u64;
        if len > self.bytes_left {
            return Err(self.fail(Error::ParentStreamTooShort));
        }
        self.bytes_left -= len;
        Ok(InputStream {
            reader: self.reader,
            bytes_left: len,
            error: None,
        })
    }

    /// Drains any bytes the substream left unread back into the parent's
    /// accounting; propagates the substream's sticky error if any.
    pub fn close_string_substream(&mut self, mut substream: InputStream<'_>) -> Result<()> {
        if substream.bytes_left > 0 {
            substream.skip(substream.bytes_left)?;
        }
        if let Some(err) = substream.error {
            return Err(self.fail(err));
        }
        Ok(())
    }
}

/// Output stream: `write` against a `max_size` budget, or a sizing stream
/// (no underlying writer) that only counts bytes.
pub struct OutputStream<'a> {
    writer: Option<&'a mut dyn Write>,
    bytes_written: u64,
    max_size: u64,
    error: Option<Error>,
}

impl<'a> OutputStream<'a> {
    pub fn new(writer: &'a mut dyn Write, max_size: u64) -> Self {
        OutputStream {
            writer: Some(writer),
            bytes_written: 0,
            max_size,
            error: None,
        }
    }

    /// A sizing stream: counts bytes without performing any I/O. Used for
    /// the first pass of submessage/array double-pass sizing.
    pub fn sizing() -> Self {
        OutputStream {
            writer: None,
            bytes_written: 0,
            max_size: u64::MAX,
            error: None,
        }
    }

    pub fn is_sizing(&self) -> bool {
        self.writer.is_none()
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn error(&self) -> Option<Error> {
        self.error
    }

    fn fail(&mut self, err: Error) -> Error {
        if self.error.is_none() {
            self.error = Some(err);
        }
        err
    }

    pub fn write(&mut self, buf: &[u8]) -> Result<()> {
        let n = buf.len() as u64;
        let (sum, overflowed) = self.bytes_written.overflowing_add(n);
        if overflowed || sum > self.max_size {
            return Err(self.fail(Error::StreamFull));
        }
        if let Some(writer) = self.writer.as_deref_mut() {
            writer.write_all(buf).map_err(|_| Error::Io)?;
        }
        self.bytes_written = sum;
        Ok(())
    }

    pub fn encode_varint(&mut self, value: u64) -> Result<()> {
        let mut buf = Vec::with_capacity(10);
        wire::encode_varint(value, &mut buf);
        self.write(&buf)
    }

    pub fn encode_svarint(&mut self, value: i64) -> Result<()> {
        self.encode_varint(wire::zigzag_encode64(value))
    }

    pub fn encode_fixed32(&mut self, value: u32) -> Result<()> {
        self.write(&value.to_le_bytes())
    }

    pub fn encode_fixed64(&mut self, value: u64) -> Result<()> {
        self.write(&value.to_le_bytes())
    }

    pub fn encode_tag(&mut self, wire_type: wire::WireType, field_number: u32) -> Result<()> {
        self.encode_varint(wire::make_tag(field_number, wire_type))
    }

    pub fn encode_string(&mut self, bytes: &[u8]) -> Result<()> {
        self.encode_varint(bytes.len() as u64)?;
        self.write(bytes)
    }

    /// Encodes a submessage body with the spec-mandated two-pass sizing:
    /// `size_pass` is invoked once against a sizing stream and once against
    /// a bounded real substream; the two invocations must agree on the byte
    /// count or the encode fails with [`Error::SubmsgSizeChanged`].
    pub fn encode_length_delimited(
        &mut self,
        mut body: impl FnMut(&mut OutputStream<'_>) -> Result<()>,
    ) -> Result<()> {
        let mut sizing = OutputStream::sizing();
        body(&mut sizing)?;
        let size = sizing.bytes_written();

        self.encode_varint(size)?;

        if self.writer.is_none() {
            // Just sizing: advance the outer counter without writing.
            return self.write_zeroes(size);
        }

        if self.bytes_written + size > self.max_size {
            return Err(self.fail(Error::StreamFull));
        }

        let mut sub_bytes_written = 0u64;
        let result = {
            let writer: &mut dyn Write = self.writer.as_deref_mut().unwrap();
            let mut substream = OutputStream {
                writer: Some(writer),
                bytes_written: 0,
                max_size: size,
                error: None,
            };
            let r = body(&mut substream);
            sub_bytes_written = substream.bytes_written;
            r.and(Ok(substream.error))
        };

        self.bytes_written += sub_bytes_written;

        match result {
            Ok(Some(err)) => return Err(self.fail(err)),
            Err(e) => return Err(self.fail(e)),
            Ok(None) => {}
        }

        if sub_bytes_written != size {
            return Err(self.fail(Error::SubmsgSizeChanged));
        }

        Ok(())
    }

    /// Only valid on a sizing stream: advances the byte counter by `n`
    /// without touching any writer.
    fn write_zeroes(&mut self, n: u64) -> Result<()> {
        let (sum, overflowed) = self.bytes_written.overflowing_add(n);
        if overflowed || sum > self.max_size {
            return Err(self.fail(Error::StreamFull));
        }
        self.bytes_written = sum;
        Ok(())
    }
}
