//! Background processes for the check-in subsystem.

pub mod background;
pub mod config;
