/// Security utilities.
pub mod security;
