use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistrationError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image format error: {0}")]
    ImageFormat(#[from] image::ImageError),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Numeric degeneracy: {0}")]
    NumericDegeneracy(String),

    #[error("Shape mismatch: expected {expected:?}, got {actual:?} ({what})")]
    ShapeMismatch {
        what: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Observer failed: {0}")]
    Observer(String),
}

impl RegistrationError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn numeric_degeneracy(msg: impl Into<String>) -> Self {
        Self::NumericDegeneracy(msg.into())
    }

    pub fn observer(msg: impl Into<String>) -> Self {
        Self::Observer(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, RegistrationError>;
