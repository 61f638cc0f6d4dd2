
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IqlError {
    #[error("Parse failure at {position}: expected {expected}")]
    ParseFailure { message: String, position: String, expected: String },
    #[error("Incorrect input: {message}: \"{expression}\"")]
    IncorrectInput { message: String, expression: String },
    #[error("Unbound name: {name} (available: {available})")]
    UnboundName { name: String, available: String },
    #[error("Clause compilation failed: {0}")]
    Compile(String),
    #[error("Execution error: {0}")]
    Execution(String),
    #[error("Model provider error: {0}")]
    Provider(String),
}

pub type Result<T> = std::result::Result<T, IqlError>;

impl IqlError {
    /// User-error constructor carrying the unparsed offending expression.
    pub fn incorrect_input(message: impl Into<String>, expression: impl Into<String>) -> Self {
        Self::IncorrectInput { message: message.into(), expression: expression.into() }
    }
}
