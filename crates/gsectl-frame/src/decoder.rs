use bytes::{Buf, BytesMut};
use tracing::warn;

use crate::codec::decode;
use crate::error::Result;
use crate::schema::Schema;
use crate::value::Value;

/// Outcome of [`StreamDecoder::feed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fed {
    /// An empty read: the peer closed its side.
    Eof,
    /// Bytes were appended; holds the total now buffered.
    Buffered(usize),
}

/// Turns an arbitrarily chunked byte stream into whole frames of one schema.
///
/// Handles partial reads internally: bytes are accumulated with [`feed`] and
/// complete frames are pulled out with [`drain`]. A trailing partial frame is
/// kept for the next `feed`.
///
/// [`feed`]: StreamDecoder::feed
/// [`drain`]: StreamDecoder::drain
#[derive(Debug)]
pub struct StreamDecoder {
    schema: &'static Schema,
    buf: BytesMut,
    decoded: u64,
    rejected: u64,
}

impl StreamDecoder {
    /// Create a decoder for frames of `schema`.
    pub fn new(schema: &'static Schema) -> Self {
        Self {
            schema,
            buf: BytesMut::with_capacity(schema.size() * 4),
            decoded: 0,
            rejected: 0,
        }
    }

    /// Append freshly read bytes.
    ///
    /// Feeding an empty slice reports [`Fed::Eof`]; what to do about it is
    /// up to the caller.
    pub fn feed(&mut self, bytes: &[u8]) -> Fed {
        if bytes.is_empty() {
            return Fed::Eof;
        }
        self.buf.extend_from_slice(bytes);
        Fed::Buffered(self.buf.len())
    }

    /// Pull every complete frame currently buffered.
    ///
    /// The iterator is lazy; dropping it early leaves the remaining frames
    /// buffered for the next call. A frame that fails to decode is discarded
    /// (exactly one frame size) and yielded as an error, and extraction
    /// continues with the bytes after it.
    pub fn drain(&mut self) -> Drain<'_> {
        Drain { decoder: self }
    }

    /// Schema this decoder frames.
    pub fn schema(&self) -> &'static Schema {
        self.schema
    }

    /// Bytes waiting for the rest of their frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Frames decoded successfully so far.
    pub fn decoded(&self) -> u64 {
        self.decoded
    }

    /// Frames discarded as corrupt so far.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }
}

/// Iterator returned by [`StreamDecoder::drain`].
#[derive(Debug)]
pub struct Drain<'a> {
    decoder: &'a mut StreamDecoder,
}

impl Iterator for Drain<'_> {
    type Item = Result<Vec<Value>>;

    fn next(&mut self) -> Option<Self::Item> {
        let decoder = &mut *self.decoder;
        let size = decoder.schema.size();
        if decoder.buf.len() < size {
            return None;
        }

        let result = decode(decoder.schema, &decoder.buf[..size]);
        decoder.buf.advance(size);

        match &result {
            Ok(_) => decoder.decoded += 1,
            Err(err) => {
                decoder.rejected += 1;
                warn!(schema = decoder.schema.name, error = %err, "discarding corrupt frame");
            }
        }
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::*;
    use crate::codec::encode_into;
    use crate::error::FrameError;
    use crate::schema::{FieldKind, ECU_COMMAND, GSE_COMMAND, GSE_TELEMETRY};

    fn telemetry(timestamp: u32) -> Vec<Value> {
        GSE_TELEMETRY
            .fields
            .iter()
            .map(|field| match field.kind {
                FieldKind::U32 => Value::U32(timestamp),
                FieldKind::Bool => Value::Bool(timestamp % 2 == 1),
                FieldKind::F32 => Value::F32(timestamp as f32 / 10.0),
            })
            .collect()
    }

    fn stream_of(count: u32) -> (BytesMut, Vec<Vec<Value>>) {
        let mut wire = BytesMut::new();
        let mut frames = Vec::new();
        for ts in 0..count {
            let values = telemetry(ts);
            encode_into(&GSE_TELEMETRY, &values, &mut wire).unwrap();
            frames.push(values);
        }
        (wire, frames)
    }

    #[test]
    fn empty_feed_is_eof() {
        let mut decoder = StreamDecoder::new(&GSE_TELEMETRY);
        assert_eq!(decoder.feed(&[]), Fed::Eof);
        assert_eq!(decoder.feed(&[1, 2, 3]), Fed::Buffered(3));
    }

    #[test]
    fn partial_frame_is_retained() {
        let (wire, frames) = stream_of(1);
        let mut decoder = StreamDecoder::new(&GSE_TELEMETRY);

        decoder.feed(&wire[..40]);
        assert_eq!(decoder.drain().count(), 0);
        assert_eq!(decoder.buffered(), 40);

        decoder.feed(&wire[40..]);
        let out: Vec<_> = decoder.drain().collect::<Result<_>>().unwrap();
        assert_eq!(out, frames);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn one_read_with_several_frames_yields_all() {
        let (mut wire, frames) = stream_of(3);
        wire.extend_from_slice(&[0xAA; 10]);

        let mut decoder = StreamDecoder::new(&GSE_TELEMETRY);
        decoder.feed(&wire);
        let out: Vec<_> = decoder.drain().collect::<Result<_>>().unwrap();

        assert_eq!(out, frames);
        assert_eq!(decoder.buffered(), 10);
        assert_eq!(decoder.decoded(), 3);
    }

    #[test]
    fn chunk_boundaries_do_not_matter() {
        let (wire, frames) = stream_of(7);

        for chunk in [1usize, 2, 5, 13, 66, 67, 68, 134, 500] {
            let mut decoder = StreamDecoder::new(&GSE_TELEMETRY);
            let mut out = Vec::new();
            for piece in wire.chunks(chunk) {
                decoder.feed(piece);
                for frame in decoder.drain() {
                    out.push(frame.unwrap());
                }
            }
            assert_eq!(out, frames, "chunk size {chunk}");
            assert_eq!(decoder.buffered(), 0);
        }
    }

    #[test]
    fn corrupt_frame_resynchronizes() {
        let mut wire = BytesMut::new();
        let mut frames = Vec::new();
        for i in 0..5 {
            let values: Vec<Value> = (0..4).map(|b| Value::Bool((i + b) % 2 == 0)).collect();
            encode_into(&ECU_COMMAND, &values, &mut wire).unwrap();
            frames.push(values);
        }
        // Corrupt frame 2's payload.
        wire[2 * 8 + 1] ^= 0x01;

        let mut decoder = StreamDecoder::new(&ECU_COMMAND);
        decoder.feed(&wire);
        let results: Vec<_> = decoder.drain().collect();

        assert_eq!(results.len(), 5);
        assert!(matches!(
            results[2],
            Err(FrameError::ChecksumMismatch { .. })
        ));
        for i in [0, 1, 3, 4] {
            assert_eq!(results[i].as_ref().unwrap(), &frames[i]);
        }
        assert_eq!(decoder.decoded(), 4);
        assert_eq!(decoder.rejected(), 1);
    }

    #[test]
    fn drain_is_lazy_and_restartable() {
        let (wire, frames) = stream_of(3);
        let mut decoder = StreamDecoder::new(&GSE_TELEMETRY);
        decoder.feed(&wire);

        let first = decoder.drain().next().unwrap().unwrap();
        assert_eq!(first, frames[0]);
        assert_eq!(decoder.buffered(), 2 * GSE_TELEMETRY.size());

        let rest: Vec<_> = decoder.drain().collect::<Result<_>>().unwrap();
        assert_eq!(rest, frames[1..].to_vec());
    }

    #[test]
    fn command_decoder_frames_sixteen_bytes() {
        let mut wire = BytesMut::new();
        encode_into(&GSE_COMMAND, &[Value::Bool(true); 12], &mut wire).unwrap();
        let mut decoder = StreamDecoder::new(&GSE_COMMAND);
        decoder.feed(&wire);
        assert_eq!(decoder.drain().count(), 1);
        assert_eq!(decoder.schema().size(), 16);
    }
}
