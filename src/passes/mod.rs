//! Per-stem hit extraction passes, run in order on a [`StemState`](crate::audio::StemState)

pub mod pass_0;
pub mod pass_1;
pub mod pass_2;
