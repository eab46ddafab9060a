use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CorrectnessError {
    #[error("sample has no usable reference answer")]
    NoReferences,
}
