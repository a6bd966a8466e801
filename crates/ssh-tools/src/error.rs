use thiserror::Error;

#[derive(Error, Debug)]
pub enum SshToolsError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The session was established but running the command failed.
    #[error("command failed: {0}")]
    Command(String),

    #[error("invalid arguments: {0}")]
    InvalidArgument(String),

    #[error("no tool named '{0}'")]
    ToolNotFound(String),
}

impl SshToolsError {
    /// Scrub the device password out of the carried message.
    pub fn sanitized(self, password: &str) -> Self {
        let scrub = |m: String| crate::redact::sanitize_error(&m, password);
        match self {
            SshToolsError::Config(m) => SshToolsError::Config(scrub(m)),
            SshToolsError::Connection(m) => SshToolsError::Connection(scrub(m)),
            SshToolsError::Authentication(m) => SshToolsError::Authentication(scrub(m)),
            SshToolsError::Command(m) => SshToolsError::Command(scrub(m)),
            SshToolsError::InvalidArgument(m) => SshToolsError::InvalidArgument(scrub(m)),
            SshToolsError::ToolNotFound(m) => SshToolsError::ToolNotFound(scrub(m)),
        }
    }
}

pub type Result<T> = std::result::Result<T, SshToolsError>;
