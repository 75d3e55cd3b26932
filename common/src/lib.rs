pub mod card5;
pub mod card6;
pub mod error;
pub mod frame;
pub mod punch;
pub mod time;
pub mod validate;

pub type Result<T> = core::result::Result<T, error::Error>;
