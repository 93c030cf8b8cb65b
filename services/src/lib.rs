//! oxircd services glue
//!
//! Boundary encoding for the services link: TS6 identifiers and the ENCAP
//! frames SASL and SVSLOGIN travel in.

pub mod ts6;

pub use ts6::{SaslFrame, SvsloginFrame};
