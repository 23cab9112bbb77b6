//! Frame layouts.
//!
//! A schema is data only: a name, the ordered data fields, and whether a
//! CRC-32 trailer follows them. Field widths are fixed (bool = 1 byte,
//! u32/f32 = 4 bytes) and fields are packed without padding.

use std::fmt;

/// Wire type of a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Bool,
    U32,
    F32,
}

impl FieldKind {
    /// Encoded width in bytes.
    pub const fn width(self) -> usize {
        match self {
            FieldKind::Bool => 1,
            FieldKind::U32 | FieldKind::F32 => 4,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FieldKind::Bool => "bool",
            FieldKind::U32 => "u32",
            FieldKind::F32 => "f32",
        })
    }
}

/// A named, typed field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl Field {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind }
    }
}

/// A fixed-length frame layout.
#[derive(Debug, PartialEq, Eq)]
pub struct Schema {
    /// Human-readable schema name, used in errors and logs.
    pub name: &'static str,
    /// Data fields in wire order. The checksum is not listed here.
    pub fields: &'static [Field],
    /// Whether a little-endian CRC-32 of the data bytes trails the fields.
    pub checksum: bool,
}

/// Name reported for the CRC trailer of command frames.
pub const CHECKSUM_FIELD: &str = "crc";

impl Schema {
    /// Bytes covered by the data fields.
    pub const fn data_size(&self) -> usize {
        let mut size = 0;
        let mut i = 0;
        while i < self.fields.len() {
            size += self.fields[i].kind.width();
            i += 1;
        }
        size
    }

    /// Total wire size of one frame, checksum included.
    pub const fn size(&self) -> usize {
        if self.checksum {
            self.data_size() + crate::codec::CHECKSUM_SIZE
        } else {
            self.data_size()
        }
    }

    /// Data fields in wire order.
    pub fn data_fields(&self) -> &'static [Field] {
        self.fields
    }

    /// Position of a data field by name.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.name == name)
    }

    /// Iterator over the data field names.
    pub fn field_names(&self) -> impl Iterator<Item = &'static str> {
        self.fields.iter().map(|field| field.name)
    }
}

const fn b(name: &'static str) -> Field {
    Field::new(name, FieldKind::Bool)
}

const fn u(name: &'static str) -> Field {
    Field::new(name, FieldKind::U32)
}

const fn f(name: &'static str) -> Field {
    Field::new(name, FieldKind::F32)
}

/// GSE telemetry: 67 bytes, no checksum.
pub static GSE_TELEMETRY: Schema = Schema {
    name: "gse-telemetry",
    fields: &[
        u("timestamp"),
        b("igniterArmed"),
        b("igniter1Continuity"),
        b("igniter2Continuity"),
        f("supplyVoltage1"),
        f("supplyVoltage2"),
        f("solenoidCurrentGn2Fill"),
        f("solenoidCurrentGn2Vent"),
        f("solenoidCurrentMvasFill"),
        f("solenoidCurrentMvasVent"),
        f("solenoidCurrentMvas"),
        f("solenoidCurrentLoxFill"),
        f("solenoidCurrentLoxVent"),
        f("solenoidCurrentLngFill"),
        f("solenoidCurrentLngVent"),
        f("temperatureLox"),
        f("temperatureLng"),
        f("pressureGn2"),
    ],
    checksum: false,
};

/// GSE command: 12 booleans + CRC-32, 16 bytes.
pub static GSE_COMMAND: Schema = Schema {
    name: "gse-command",
    fields: &[
        b("igniter0Fire"),
        b("igniter1Fire"),
        b("alarm"),
        b("solenoidStateGn2Fill"),
        b("solenoidStateGn2Vent"),
        b("solenoidStateMvasFill"),
        b("solenoidStateMvasVent"),
        b("solenoidStateMvas"),
        b("solenoidStateLoxFill"),
        b("solenoidStateLoxVent"),
        b("solenoidStateLngFill"),
        b("solenoidStateLngVent"),
    ],
    checksum: true,
};

/// ECU telemetry: 137 bytes, no checksum.
pub static ECU_TELEMETRY: Schema = Schema {
    name: "ecu-telemetry",
    fields: &[
        u("timestamp"),
        b("gpsLock"),
        f("rssi"),
        f("loss"),
        f("supplyVoltage"),
        f("batteryVoltage"),
        f("solenoidCurrentCopvVent"),
        f("solenoidCurrentPv1"),
        f("solenoidCurrentPv2"),
        f("solenoidCurrentVent"),
        f("temperatureLox"),
        f("temperatureLng"),
        f("pressureCopv"),
        f("pressureLox"),
        f("pressureLng"),
        f("pressureInjectorLox"),
        f("pressureInjectorLng"),
        f("angularVelocityX"),
        f("angularVelocityY"),
        f("angularVelocityZ"),
        f("accelerationX"),
        f("accelerationY"),
        f("accelerationZ"),
        f("magneticFieldX"),
        f("magneticFieldY"),
        f("magneticFieldZ"),
        f("altitude"),
        f("ecefPositionX"),
        f("ecefPositionY"),
        f("ecefPositionZ"),
        f("ecefPositionAccuracy"),
        f("ecefVelocityX"),
        f("ecefVelocityY"),
        f("ecefVelocityZ"),
        f("ecefVelocityAccuracy"),
    ],
    checksum: false,
};

/// ECU command: 4 booleans + CRC-32, 8 bytes.
pub static ECU_COMMAND: Schema = Schema {
    name: "ecu-command",
    fields: &[
        b("solenoidStateCopvVent"),
        b("solenoidStatePv1"),
        b("solenoidStatePv2"),
        b("solenoidStateVent"),
    ],
    checksum: true,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_sizes_match_device_firmware() {
        assert_eq!(GSE_TELEMETRY.size(), 67);
        assert_eq!(GSE_COMMAND.size(), 16);
        assert_eq!(ECU_TELEMETRY.size(), 137);
        assert_eq!(ECU_COMMAND.size(), 8);
    }

    #[test]
    fn command_schemas_are_all_bool() {
        for schema in [&GSE_COMMAND, &ECU_COMMAND] {
            assert!(schema.checksum);
            assert!(schema.fields.iter().all(|f| f.kind == FieldKind::Bool));
        }
        assert_eq!(GSE_COMMAND.fields.len(), 12);
        assert_eq!(ECU_COMMAND.fields.len(), 4);
    }

    #[test]
    fn field_names_are_unique() {
        for schema in [&GSE_TELEMETRY, &GSE_COMMAND, &ECU_TELEMETRY, &ECU_COMMAND] {
            let mut names: Vec<_> = schema.field_names().collect();
            names.sort_unstable();
            names.dedup();
            assert_eq!(names.len(), schema.fields.len(), "{}", schema.name);
            assert!(schema.field_index(CHECKSUM_FIELD).is_none());
        }
    }

    #[test]
    fn field_index_lookup() {
        assert_eq!(GSE_COMMAND.field_index("igniter0Fire"), Some(0));
        assert_eq!(GSE_COMMAND.field_index("igniter1Fire"), Some(1));
        assert_eq!(GSE_COMMAND.field_index("solenoidStateLngVent"), Some(11));
        assert_eq!(GSE_COMMAND.field_index("nope"), None);
    }
}
