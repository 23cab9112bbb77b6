use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::schema::{FieldKind, Schema};
use crate::value::Value;

/// Width of the CRC-32 trailer on command frames.
pub const CHECKSUM_SIZE: usize = 4;

/// CRC-32 (IEEE 802.3, zlib-compatible) over `bytes`.
pub fn checksum(bytes: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

/// Encode one frame into a fresh buffer.
///
/// See [`encode_into`] for the accepted value layouts.
pub fn encode(schema: &Schema, values: &[Value]) -> Result<Bytes> {
    let mut dst = BytesMut::with_capacity(schema.size());
    encode_into(schema, values, &mut dst)?;
    Ok(dst.freeze())
}

/// Encode one frame, appending it to `dst`.
///
/// `values` must list the schema's data fields in order. Checksummed schemas
/// also accept one trailing `U32` in the checksum slot; it is ignored and the
/// CRC is always recomputed.
///
/// Wire format (command schemas):
/// ```text
/// ┌──────────────────────────────┬──────────────────────┐
/// │ Data fields (packed, LE)     │ CRC-32 of data (4B LE)│
/// └──────────────────────────────┴──────────────────────┘
/// ```
pub fn encode_into(schema: &Schema, values: &[Value], dst: &mut BytesMut) -> Result<()> {
    let data = check_values(schema, values)?;

    let start = dst.len();
    dst.reserve(schema.size());
    for value in data {
        match *value {
            Value::Bool(v) => dst.put_u8(u8::from(v)),
            Value::U32(v) => dst.put_u32_le(v),
            Value::F32(v) => dst.put_f32_le(v),
        }
    }

    if schema.checksum {
        let crc = checksum(&dst[start..]);
        dst.put_u32_le(crc);
    }
    Ok(())
}

/// Decode one frame from the front of `src`.
///
/// Bytes past the first frame are ignored. Checksummed schemas are verified
/// before any field is interpreted, and the returned values exclude the
/// checksum so that `decode(encode(v)) == v`.
pub fn decode(schema: &Schema, src: &[u8]) -> Result<Vec<Value>> {
    let size = schema.size();
    if src.len() < size {
        return Err(FrameError::ShortBuffer {
            schema: schema.name,
            needed: size,
            actual: src.len(),
        });
    }

    let data_size = schema.data_size();
    if schema.checksum {
        let received = u32::from_le_bytes([
            src[data_size],
            src[data_size + 1],
            src[data_size + 2],
            src[data_size + 3],
        ]);
        let computed = checksum(&src[..data_size]);
        if received != computed {
            return Err(FrameError::ChecksumMismatch {
                schema: schema.name,
                received,
                computed,
            });
        }
    }

    let mut cursor = &src[..data_size];
    let mut values = Vec::with_capacity(schema.fields.len());
    for field in schema.fields {
        let value = match field.kind {
            FieldKind::Bool => match cursor.get_u8() {
                0 => Value::Bool(false),
                1 => Value::Bool(true),
                byte => {
                    return Err(FrameError::FieldTypeError {
                        schema: schema.name,
                        field: field.name,
                        kind: field.kind,
                        byte,
                    })
                }
            },
            FieldKind::U32 => Value::U32(cursor.get_u32_le()),
            FieldKind::F32 => Value::F32(cursor.get_f32_le()),
        };
        values.push(value);
    }

    Ok(values)
}

/// Validate `values` against `schema`, returning the data-field slice.
fn check_values<'a>(schema: &Schema, values: &'a [Value]) -> Result<&'a [Value]> {
    let expected = schema.fields.len();
    let data = match values.len() {
        n if n == expected => values,
        n if schema.checksum && n == expected + 1 => {
            let slot = &values[expected];
            if slot.kind() != FieldKind::U32 {
                return Err(mismatch(
                    schema,
                    format!("checksum slot must be u32, got {}", slot.kind()),
                ));
            }
            &values[..expected]
        }
        n => {
            return Err(mismatch(
                schema,
                format!("expected {expected} values, got {n}"),
            ))
        }
    };

    for (field, value) in schema.fields.iter().zip(data) {
        if field.kind != value.kind() {
            return Err(mismatch(
                schema,
                format!(
                    "field {} expects {}, got {}",
                    field.name,
                    field.kind,
                    value.kind()
                ),
            ));
        }
    }
    Ok(data)
}

fn mismatch(schema: &Schema, reason: String) -> FrameError {
    FrameError::SchemaMismatch {
        schema: schema.name,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ECU_COMMAND, ECU_TELEMETRY, GSE_COMMAND, GSE_TELEMETRY};

    fn sample_values(schema: &Schema) -> Vec<Value> {
        schema
            .fields
            .iter()
            .enumerate()
            .map(|(i, field)| match field.kind {
                FieldKind::Bool => Value::Bool(i % 2 == 0),
                FieldKind::U32 => Value::U32(1_700_000_000 + i as u32),
                FieldKind::F32 => Value::F32(i as f32 * 0.25 - 3.0),
            })
            .collect()
    }

    #[test]
    fn roundtrip_every_schema() {
        for schema in [&GSE_TELEMETRY, &GSE_COMMAND, &ECU_TELEMETRY, &ECU_COMMAND] {
            let values = sample_values(schema);
            let wire = encode(schema, &values).unwrap();
            assert_eq!(wire.len(), schema.size(), "{}", schema.name);
            assert_eq!(decode(schema, &wire).unwrap(), values, "{}", schema.name);
        }
    }

    /// Compare by wire representation so -0.0 and NaN payloads count.
    fn bits(values: &[Value]) -> Vec<u64> {
        values
            .iter()
            .map(|value| match *value {
                Value::Bool(b) => b as u64,
                Value::U32(v) => u64::from(v) | 1 << 32,
                Value::F32(v) => u64::from(v.to_bits()) | 2 << 32,
            })
            .collect()
    }

    fn boundary_values(schema: &Schema, flag: bool, word: u32, floats: &[f32]) -> Vec<Value> {
        let mut floats = floats.iter().copied().cycle();
        schema
            .fields
            .iter()
            .map(|field| match field.kind {
                FieldKind::Bool => Value::Bool(flag),
                FieldKind::U32 => Value::U32(word),
                FieldKind::F32 => Value::F32(floats.next().unwrap_or_default()),
            })
            .collect()
    }

    #[test]
    fn roundtrip_boundary_values() {
        let tuples: [(bool, u32, &[f32]); 3] = [
            (false, 0, &[0.0, -0.0]),
            (true, u32::MAX, &[f32::MIN, f32::MAX, f32::INFINITY, f32::NEG_INFINITY]),
            (
                true,
                1,
                &[f32::from_bits(1), f32::MIN_POSITIVE, -f32::from_bits(0x007F_FFFF), f32::NAN],
            ),
        ];
        for schema in [&GSE_TELEMETRY, &GSE_COMMAND, &ECU_TELEMETRY, &ECU_COMMAND] {
            for (flag, word, floats) in tuples {
                let values = boundary_values(schema, flag, word, floats);
                let wire = encode(schema, &values).unwrap();
                let decoded = decode(schema, &wire).unwrap();
                assert_eq!(bits(&decoded), bits(&values), "{} {flag} {word}", schema.name);
            }
        }
    }

    #[test]
    fn gse_setall_frame_layout() {
        let mut values = vec![Value::Bool(false); 12];
        values[0] = Value::Bool(true);

        let wire = encode(&GSE_COMMAND, &values).unwrap();

        assert_eq!(wire.len(), 16);
        assert_eq!(wire[0], 1);
        assert!(wire[1..12].iter().all(|b| *b == 0));
        let crc = u32::from_le_bytes(wire[12..16].try_into().unwrap());
        assert_eq!(crc, checksum(&wire[..12]));
    }

    #[test]
    fn checksum_matches_known_vector() {
        // Standard CRC-32 check value.
        assert_eq!(checksum(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn caller_checksum_is_ignored() {
        let mut values = vec![Value::Bool(true); 4];
        values.push(Value::U32(0xDEAD_BEEF));

        let wire = encode(&ECU_COMMAND, &values).unwrap();
        let crc = u32::from_le_bytes(wire[4..8].try_into().unwrap());
        assert_eq!(crc, checksum(&[1, 1, 1, 1]));
        assert_eq!(decode(&ECU_COMMAND, &wire).unwrap(), values[..4].to_vec());
    }

    #[test]
    fn any_single_bit_flip_is_detected() {
        let values = sample_values(&GSE_COMMAND);
        let wire = encode(&GSE_COMMAND, &values).unwrap();

        for bit in 0..wire.len() * 8 {
            let mut corrupted = wire.to_vec();
            corrupted[bit / 8] ^= 1 << (bit % 8);
            let err = decode(&GSE_COMMAND, &corrupted).unwrap_err();
            assert!(
                matches!(err, FrameError::ChecksumMismatch { .. }),
                "bit {bit}: {err:?}"
            );
        }
    }

    #[test]
    fn wrong_value_count_is_schema_mismatch() {
        let err = encode(&GSE_COMMAND, &[Value::Bool(true); 11]).unwrap_err();
        assert!(matches!(err, FrameError::SchemaMismatch { .. }));

        // Telemetry has no checksum slot to absorb an extra value.
        let mut values = sample_values(&GSE_TELEMETRY);
        values.push(Value::U32(0));
        let err = encode(&GSE_TELEMETRY, &values).unwrap_err();
        assert!(matches!(err, FrameError::SchemaMismatch { .. }));
    }

    #[test]
    fn wrong_value_type_is_schema_mismatch() {
        let mut values = sample_values(&GSE_TELEMETRY);
        values[0] = Value::F32(1.0);
        let err = encode(&GSE_TELEMETRY, &values).unwrap_err();
        assert!(err.to_string().contains("timestamp"));

        let mut values = vec![Value::Bool(false); 4];
        values.push(Value::Bool(true));
        let err = encode(&ECU_COMMAND, &values).unwrap_err();
        assert!(matches!(err, FrameError::SchemaMismatch { .. }));
    }

    #[test]
    fn short_buffer_reports_sizes() {
        let err = decode(&GSE_TELEMETRY, &[0u8; 66]).unwrap_err();
        assert_eq!(
            err,
            FrameError::ShortBuffer {
                schema: "gse-telemetry",
                needed: 67,
                actual: 66,
            }
        );
    }

    #[test]
    fn invalid_bool_byte_is_field_type_error() {
        let wire = encode(&GSE_TELEMETRY, &sample_values(&GSE_TELEMETRY)).unwrap();
        let mut corrupted = wire.to_vec();
        corrupted[4] = 0x7F;

        let err = decode(&GSE_TELEMETRY, &corrupted).unwrap_err();
        assert!(matches!(
            err,
            FrameError::FieldTypeError {
                field: "igniterArmed",
                byte: 0x7F,
                ..
            }
        ));
    }

    #[test]
    fn decode_ignores_trailing_bytes() {
        let values = sample_values(&ECU_COMMAND);
        let mut wire = BytesMut::new();
        encode_into(&ECU_COMMAND, &values, &mut wire).unwrap();
        wire.put_slice(&[0xFF, 0xFF]);
        assert_eq!(decode(&ECU_COMMAND, &wire).unwrap(), values);
    }

    #[test]
    fn encode_into_appends() {
        let mut wire = BytesMut::new();
        encode_into(&ECU_COMMAND, &[Value::Bool(false); 4], &mut wire).unwrap();
        encode_into(&ECU_COMMAND, &[Value::Bool(true); 4], &mut wire).unwrap();
        assert_eq!(wire.len(), 16);
        assert_eq!(&wire[8..12], &[1, 1, 1, 1]);
        assert_eq!(decode(&ECU_COMMAND, &wire[8..]).unwrap(), vec![Value::Bool(true); 4]);
    }

    #[test]
    fn telemetry_is_little_endian_packed() {
        let mut values = vec![Value::U32(0x0102_0304)];
        values.extend([Value::Bool(true), Value::Bool(false), Value::Bool(true)]);
        values.extend(std::iter::repeat(Value::F32(1.0)).take(15));

        let wire = encode(&GSE_TELEMETRY, &values).unwrap();
        assert_eq!(&wire[..7], &[0x04, 0x03, 0x02, 0x01, 1, 0, 1]);
        assert_eq!(&wire[7..11], &1.0f32.to_le_bytes());
    }
}
