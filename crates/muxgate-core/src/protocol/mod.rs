//! Protocol-level types: constants shared by every layer and the parsed
//! control-packet boundary exchanged with the external packet codec.

pub mod constants;
pub mod packet;
