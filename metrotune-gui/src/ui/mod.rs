//! # UI Module
//!
//! Views and canvas widgets for the Metrotune application.

pub mod beat_indicator;
pub mod cent_meter;
pub mod main_display;
