//! RAOP (`AirPlay` 1) authentication

mod auth;
pub mod digest;


pub use auth::{RESPONSE_MESSAGE_SIZE, build_response_message, generate_response, normalize_ip};
