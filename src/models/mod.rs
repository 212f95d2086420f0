//! Data models for the Great Baladis admin API.

pub mod user;

pub use user::User;
