/// Failure reported by a call to the forge.
///
/// Only server-side (5xx) failures are transient; everything else, network
/// I/O included, is fatal and must not be retried.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("server error {status}: {message}")]
    Transient { status: u16, message: String },

    #[error(transparent)]
    Fatal(#[from] anyhow::Error),
}

impl RemoteError {
    pub fn transient(status: u16, message: impl Into<String>) -> Self {
        RemoteError::Transient {
            status,
            message: message.into(),
        }
    }
}

impl From<octocrab::Error> for RemoteError {
    fn from(err: octocrab::Error) -> Self {
        match &err {
            octocrab::Error::GitHub { source, .. } if source.status_code.is_server_error() => {
                RemoteError::transient(source.status_code.as_u16(), source.message.clone())
            }
            _ => RemoteError::Fatal(anyhow::Error::new(err)),
        }
    }
}
