use thiserror::Error;

#[derive(Debug, Error, Eq, PartialEq)]
pub enum Error {
    #[error("Card data is too short")]
    TruncatedData,
    #[error("Unknown card series")]
    UnknownCardSeries,
    #[error("No courses to validate against")]
    NoCourses,
}
