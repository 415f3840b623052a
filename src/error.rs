//! Error types for the Kusi Voz core
//!
//! Speech-engine failures are not errors in this sense: they are classified into
//! [`TtsErrorKind`](crate::speech::TtsErrorKind) and recorded as wrapper state.
//! `KusiError` covers configuration, bad input and internal plumbing.

use thiserror::Error;

/// Kusi Voz errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KusiError {
    /// Configuration file could not be read, parsed or validated
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Utterance request violates the text/rate/pitch/volume constraints
    #[error("Invalid utterance: {0}")]
    InvalidUtterance(String),

    /// No contact with the given id
    #[error("Unknown contact: {0}")]
    UnknownContact(String),

    /// No health reminder with the given id
    #[error("Unknown health reminder: {0}")]
    UnknownReminder(String),

    /// No help request with the given id
    #[error("Unknown help request: {0}")]
    UnknownHelpRequest(String),

    /// Channel communication error
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// File system I/O error
    #[error("IO error: {0}")]
    IOError(String),
}

impl From<std::io::Error> for KusiError {
    fn from(e: std::io::Error) -> Self {
        KusiError::IOError(e.to_string())
    }
}

impl KusiError {
    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            KusiError::ConfigError(_) => false,
            // Bad input from the presentation layer; the session is untouched
            KusiError::InvalidUtterance(_) => true,
            KusiError::UnknownContact(_) => true,
            KusiError::UnknownReminder(_) => true,
            KusiError::UnknownHelpRequest(_) => true,
            KusiError::ChannelError(_) => false,
            KusiError::IOError(_) => false,
        }
    }

    /// Get a user-friendly description, in the language of the interface
    pub fn user_message(&self) -> String {
        match self {
            KusiError::ConfigError(_) => {
                "Error de configuración. Revise los ajustes.".to_string()
            }
            KusiError::InvalidUtterance(_) => {
                "No se pudo preparar el mensaje de voz.".to_string()
            }
            KusiError::UnknownContact(_) => "No se encontró el contacto.".to_string(),
            KusiError::UnknownReminder(_) => {
                "No se encontró el recordatorio.".to_string()
            }
            KusiError::UnknownHelpRequest(_) => {
                "No se encontró la solicitud de ayuda.".to_string()
            }
            KusiError::ChannelError(_) => {
                "Error interno. Por favor reinicie la aplicación.".to_string()
            }
            KusiError::IOError(_) => "Error al leer archivos.".to_string(),
        }
    }
}

/// Result type alias for Kusi Voz operations
pub type Result<T> = std::result::Result<T, KusiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: KusiError = io.into();
        assert!(matches!(err, KusiError::IOError(_)));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_lookup_errors_are_recoverable() {
        assert!(KusiError::UnknownContact("9".into()).is_recoverable());
        assert!(KusiError::UnknownReminder("9".into()).is_recoverable());
        assert!(!KusiError::ChannelError("closed".into()).is_recoverable());
    }

    #[test]
    fn test_user_message_never_leaks_detail() {
        let err = KusiError::ConfigError("timing.capture_window_ms must be > 0".into());
        assert!(!err.user_message().contains("capture_window_ms"));
        assert!(err.to_string().contains("capture_window_ms"));
    }
}
