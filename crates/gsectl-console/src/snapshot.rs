//! Latest decoded telemetry per device.
//!
//! The multiplexer is the only writer. Readings are immutable and swapped in
//! whole through a `watch` channel, so a reader sees either the previous or
//! the new reading and never a half-written one.

use std::sync::Arc;
use std::time::SystemTime;

use gsectl_frame::{Schema, Value};
use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;
use tokio::sync::watch;

use crate::role::Device;

/// One decoded telemetry frame.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryReading {
    pub device: Device,
    /// 1 for the first reading of this device, then +1 per decoded frame.
    pub sequence: u64,
    pub received_at: SystemTime,
    values: Vec<Value>,
}

impl TelemetryReading {
    pub fn schema(&self) -> &'static Schema {
        self.device.telemetry_schema()
    }

    /// Values in schema order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Value of one named field.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.schema().field_index(name).map(|i| self.values[i])
    }

    /// `(field name, value)` pairs in schema order.
    pub fn fields(&self) -> impl Iterator<Item = (&'static str, Value)> + '_ {
        self.schema().field_names().zip(self.values.iter().copied())
    }
}

struct FieldMap<'a>(&'a TelemetryReading);

impl Serialize for FieldMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.fields())
    }
}

impl Serialize for TelemetryReading {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let received_at_ms = self
            .received_at
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let mut state = serializer.serialize_struct("TelemetryReading", 4)?;
        state.serialize_field("device", &self.device)?;
        state.serialize_field("sequence", &self.sequence)?;
        state.serialize_field("received_at_ms", &received_at_ms)?;
        state.serialize_field("fields", &FieldMap(self))?;
        state.end()
    }
}

type Slot = Option<Arc<TelemetryReading>>;

/// Writer side, owned by the multiplexer.
#[derive(Debug)]
pub struct TelemetrySnapshot {
    gse: watch::Sender<Slot>,
    ecu: watch::Sender<Slot>,
}

impl Default for TelemetrySnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetrySnapshot {
    pub fn new() -> Self {
        let (gse, _) = watch::channel(None);
        let (ecu, _) = watch::channel(None);
        Self { gse, ecu }
    }

    fn slot(&self, device: Device) -> &watch::Sender<Slot> {
        match device {
            Device::Gse => &self.gse,
            Device::Ecu => &self.ecu,
        }
    }

    /// A reader handle for observers on other tasks or threads.
    pub fn reader(&self) -> SnapshotReader {
        SnapshotReader {
            gse: self.gse.subscribe(),
            ecu: self.ecu.subscribe(),
        }
    }

    /// Replace the device's reading with freshly decoded values.
    pub fn publish(&self, device: Device, values: Vec<Value>) -> Arc<TelemetryReading> {
        let slot = self.slot(device);
        let sequence = slot.borrow().as_ref().map_or(0, |r| r.sequence) + 1;
        let reading = Arc::new(TelemetryReading {
            device,
            sequence,
            received_at: SystemTime::now(),
            values,
        });
        slot.send_replace(Some(Arc::clone(&reading)));
        reading
    }

    /// Latest reading for `device`.
    pub fn latest(&self, device: Device) -> Option<Arc<TelemetryReading>> {
        self.slot(device).borrow().clone()
    }
}

/// Read-only view of the snapshot; cheap to clone.
#[derive(Debug, Clone)]
pub struct SnapshotReader {
    gse: watch::Receiver<Slot>,
    ecu: watch::Receiver<Slot>,
}

impl SnapshotReader {
    fn slot(&self, device: Device) -> &watch::Receiver<Slot> {
        match device {
            Device::Gse => &self.gse,
            Device::Ecu => &self.ecu,
        }
    }

    fn slot_mut(&mut self, device: Device) -> &mut watch::Receiver<Slot> {
        match device {
            Device::Gse => &mut self.gse,
            Device::Ecu => &mut self.ecu,
        }
    }

    /// Latest reading for `device`, if one has been decoded.
    pub fn latest(&self, device: Device) -> Option<Arc<TelemetryReading>> {
        self.slot(device).borrow().clone()
    }

    /// Wait for the next reading of `device`.
    ///
    /// Returns `None` once the writer is gone.
    pub async fn changed(&mut self, device: Device) -> Option<Arc<TelemetryReading>> {
        let slot = self.slot_mut(device);
        slot.changed().await.ok()?;
        slot.borrow_and_update().clone()
    }
}
