use thiserror::Error;

/// Faults detected while computing one advice cycle.
///
/// None of these ever reach the pump: `Engine::advise` turns them into a
/// zero-dose `Advice` with phase `error`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid therapy settings: {0}")]
    InvalidTherapy(&'static str),
    #[error("learning store error: {0}")]
    Store(String),
    #[error("learning store io: {0}")]
    StoreIo(String),
    #[error("learning store corrupt: {0}")]
    StoreCorrupt(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing learning store")]
    MissingStore,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
