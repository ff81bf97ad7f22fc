//! Generic projection helpers shared by factors.

pub mod projection;
