//! Normalization of raw engine progress ticks.
//!
//! The transcoding engine only reports its position in the output stream. The
//! normalizer turns that position into a clamped percentage of the probed
//! duration plus a naive remaining-time estimate.

mod normalizer;

pub use normalizer::{normalize, parse_timemark, ProgressEvent};
