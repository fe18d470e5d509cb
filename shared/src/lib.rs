// shared/src/lib.rs

use std::fmt;

/// Error type a resolver hands back on failure. Carried to the caller untouched.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Why a lookup came back empty
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Miss {
    Absent,
    Expired,
}

impl fmt::Display for Miss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Miss::Absent => f.write_str("not found"),
            Miss::Expired => f.write_str("has expired"),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("key ({key}) {miss}")]
    NotFound { key: String, miss: Miss },
    #[error(transparent)]
    Resolver(BoxError),
    #[error("cache worker is unavailable")]
    Unavailable,
}

impl Error {
    pub fn not_found(key: &impl fmt::Debug, miss: Miss) -> Self {
        Error::NotFound {
            key: format!("{key:?}"),
            miss,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    pub fn is_resolver(&self) -> bool {
        matches!(self, Error::Resolver(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub mod config;
