pub mod password;
pub mod token;

pub use token::{decode_token, encode_token, Claims, TokenError};
