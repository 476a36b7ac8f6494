pub mod domain;
pub mod error;
pub mod protocol;
pub mod validation;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;
