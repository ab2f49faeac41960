//! Wire-level encoding: the compact binary envelope and the layered message
//! codec built on top of it.

pub mod codec;
pub mod envelope;
