pub mod accumulator;
pub mod driver;
pub mod error;
pub mod events;
pub mod port;

pub type Result<T> = std::result::Result<T, error::Error>;
