//! Scale-out procedure (C6): clones a container under memory/CPU
//! pressure and hands the result to the LB control plane.

pub mod scaler;

pub use scaler::{ScaleError, Scaler};
