use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Success,
    UnexpectedError,
    IllegalArgument,
    TaskNotFound,
}

/// Sobre de estado que acompaña a todas las respuestas del coordinador.
/// Los fallos viajan aquí en vez de como errores HTTP o panics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub error_code: ErrorCode,
    #[serde(default)]
    pub reason: String,
}

impl Status {
    pub fn success() -> Self {
        Self {
            error_code: ErrorCode::Success,
            reason: String::new(),
        }
    }

    pub fn error(error_code: ErrorCode, reason: impl Into<String>) -> Self {
        Self {
            error_code,
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error_code == ErrorCode::Success
    }
}
