//! Certificate and seal validation.
pub mod canonical;
pub mod certificate;
