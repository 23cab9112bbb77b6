//! Last-issued command fields per device.
//!
//! Devices take whole frames only, so changing one solenoid means re-sending
//! every field. Keeping the committed values here lets `set <field>=<v>`
//! re-encode the full state instead of zeroing everything it didn't name.

use std::collections::BTreeMap;

use bytes::Bytes;
use gsectl_frame::{encode, Schema, Value};

use crate::error::{ConsoleError, Result};
use crate::role::Device;

/// A fully encoded command that has not been committed yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedCommand {
    device: Device,
    values: Vec<bool>,
    frame: Bytes,
}

impl StagedCommand {
    pub fn device(&self) -> Device {
        self.device
    }

    /// Field values in schema order.
    pub fn values(&self) -> &[bool] {
        &self.values
    }

    /// Encoded, checksummed frame.
    pub fn frame(&self) -> &Bytes {
        &self.frame
    }
}

/// Committed command fields for one device.
#[derive(Debug, Clone)]
pub struct CommandState {
    device: Device,
    schema: &'static Schema,
    values: Vec<bool>,
}

impl CommandState {
    /// All fields start at zero (solenoids closed, igniters safe).
    pub fn new(device: Device) -> Self {
        let schema = device.command_schema();
        Self {
            device,
            schema,
            values: vec![false; schema.fields.len()],
        }
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn schema(&self) -> &'static Schema {
        self.schema
    }

    /// Committed values in schema order.
    pub fn values(&self) -> &[bool] {
        &self.values
    }

    /// Committed value of one field.
    pub fn get(&self, name: &str) -> Option<bool> {
        self.schema.field_index(name).map(|i| self.values[i])
    }

    /// Replace every field and commit; returns the frame to send.
    pub fn set_all(&mut self, values: &[bool]) -> Result<Bytes> {
        let staged = self.stage_all(values)?;
        Ok(self.commit(staged))
    }

    /// Change one field and commit; returns a frame carrying every field.
    pub fn set_field(&mut self, name: &str, value: bool) -> Result<Bytes> {
        let staged = self.stage_field(name, value)?;
        Ok(self.commit(staged))
    }

    /// Build the frame `set_all` would produce without committing it.
    pub fn stage_all(&self, values: &[bool]) -> Result<StagedCommand> {
        let expected = self.schema.fields.len();
        if values.len() != expected {
            return Err(ConsoleError::Arity {
                device: self.device,
                expected,
                actual: values.len(),
            });
        }
        self.stage(values.to_vec())
    }

    /// Build the frame `set_field` would produce without committing it.
    pub fn stage_field(&self, name: &str, value: bool) -> Result<StagedCommand> {
        let index = self
            .schema
            .field_index(name)
            .ok_or_else(|| ConsoleError::UnknownField {
                device: self.device,
                field: name.to_string(),
            })?;
        let mut values = self.values.clone();
        values[index] = value;
        self.stage(values)
    }

    /// Make a staged command the committed state; returns its frame.
    pub fn commit(&mut self, staged: StagedCommand) -> Bytes {
        debug_assert_eq!(staged.device, self.device);
        self.values = staged.values;
        staged.frame
    }

    /// Frame for the currently committed state.
    pub fn frame(&self) -> Result<Bytes> {
        Ok(self.stage(self.values.clone())?.frame)
    }

    fn stage(&self, values: Vec<bool>) -> Result<StagedCommand> {
        let fields: Vec<Value> = values.iter().copied().map(Value::Bool).collect();
        let frame = encode(self.schema, &fields)?;
        Ok(StagedCommand {
            device: self.device,
            values,
            frame,
        })
    }
}

/// Command state for every device, created on first use.
#[derive(Debug, Default)]
pub struct CommandStates {
    states: BTreeMap<Device, CommandState>,
}

impl CommandStates {
    pub fn new() -> Self {
        Self::default()
    }

    /// State for `device`, if any command has been issued to it.
    pub fn get(&self, device: Device) -> Option<&CommandState> {
        self.states.get(&device)
    }

    /// State for `device`, created zeroed on first access.
    pub fn state_mut(&mut self, device: Device) -> &mut CommandState {
        self.states
            .entry(device)
            .or_insert_with(|| CommandState::new(device))
    }
}
