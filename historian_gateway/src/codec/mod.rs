//! Pure byte-level encoding of controller field types.

pub mod code_page;
pub mod fields;
pub mod strings;

pub use fields::{byte_len, check_len, coerce, decode_value, encode_value};
