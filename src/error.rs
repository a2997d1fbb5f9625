/// Exit code for bad input: malformed files, invalid flags, inconsistent arrays.
pub const EXIT_INPUT: u8 = 2;
/// Exit code for an empty or unusable dataset.
pub const EXIT_NO_DATA: u8 = 3;
/// Exit code for numerical failures (non-convergence, non-finite results).
pub const EXIT_NUMERIC: u8 = 4;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn input(message: impl Into<String>) -> Self {
        Self::new(EXIT_INPUT, message)
    }

    pub fn no_data(message: impl Into<String>) -> Self {
        Self::new(EXIT_NO_DATA, message)
    }

    pub fn numeric(message: impl Into<String>) -> Self {
        Self::new(EXIT_NUMERIC, message)
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::input(format!("I/O error: {err}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::input(format!("Invalid JSON: {err}"))
    }
}
