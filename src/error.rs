//! Define a general purpose DomeError struct.

use regex::Error as RegexError;
use std::{
    error::Error,
    fmt::{self, Debug},
    result,
};

pub type DomeResult<T> = result::Result<T, DomeError>;

#[derive(Debug)]
pub struct DomeError {
    err_msg: String,
}

impl Error for DomeError {}

impl fmt::Display for DomeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let err_msg = &self.err_msg;
        write!(f, "DomeError::{err_msg}")
    }
}

impl DomeError {
    pub fn new(err_msg: &str) -> DomeError {
        DomeError {
            err_msg: String::from(err_msg),
        }
    }

    pub fn from_error(error: impl Error) -> DomeError {
        DomeError {
            err_msg: error.to_string(),
        }
    }

    pub fn get_error_message(&self) -> &str {
        &self.err_msg
    }
}

impl From<Box<dyn Error>> for DomeError {
    fn from(item: Box<dyn Error>) -> DomeError {
        DomeError::new(&item.to_string())
    }
}

impl From<std::io::Error> for DomeError {
    fn from(item: std::io::Error) -> DomeError {
        DomeError::new(&item.to_string())
    }
}

impl From<tokio_serial::Error> for DomeError {
    fn from(item: tokio_serial::Error) -> DomeError {
        DomeError::new(&item.to_string())
    }
}

impl From<serde_json::Error> for DomeError {
    fn from(item: serde_json::Error) -> DomeError {
        DomeError::new(&item.to_string())
    }
}

impl From<RegexError> for DomeError {
    fn from(item: RegexError) -> DomeError {
        DomeError::new(&item.to_string())
    }
}

impl From<std::num::ParseIntError> for DomeError {
    fn from(item: std::num::ParseIntError) -> DomeError {
        DomeError::new(&item.to_string())
    }
}

impl From<std::num::ParseFloatError> for DomeError {
    fn from(item: std::num::ParseFloatError) -> DomeError {
        DomeError::new(&item.to_string())
    }
}
