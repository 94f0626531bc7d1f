use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Input error: {message}")]
    Input { message: String },

    #[error("External service error ({service}): {message}")]
    ExternalService { service: String, message: String },

    #[error("Report storage error: {message}")]
    Io { message: String },

    #[error("Entity not found: {entity}")]
    NotFound { entity: String },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl Error {
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input { message: message.into() }
    }

    pub fn external(service: impl Into<String>, message: impl ToString) -> Self {
        Self::ExternalService {
            service: service.into(),
            message: message.to_string(),
        }
    }

    pub fn io(message: impl ToString) -> Self {
        Self::Io { message: message.to_string() }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::io(err)
    }
}
