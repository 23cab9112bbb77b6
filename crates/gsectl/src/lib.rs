//! Ground support console for a rocket's GSE and ECU.
//!
//! gsectl keeps TCP links to the ground support equipment and the engine
//! control unit, decodes their fixed-layout telemetry, and sends checksummed
//! command frames that drive solenoids and igniters.
//!
//! # Crate Structure
//!
//! - [`transport`] — TCP endpoints and bounded connects
//! - [`frame`] — Frame schemas, CRC-32 codec and stream decoding
//! - [`console`] — Command state, connection registry and the multiplexer

/// Re-export transport types.
pub mod transport {
    pub use gsectl_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use gsectl_frame::*;
}

/// Re-export console types.
pub mod console {
    pub use gsectl_console::*;
}
