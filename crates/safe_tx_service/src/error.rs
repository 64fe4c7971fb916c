/// Broad category of a [`SafeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Required,
    InvalidFormat,
    Unauthorized,
    Inaccessible,
    RemoteFailure,
}

/// Errors produced while validating input or talking to the transaction service.
///
/// The message is the serialized form of the error: it always names the subject and embeds
/// the original input, so identical inputs produce identical text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SafeError {
    /// A value was missing or blank.
    #[error("{0}")]
    Required(String),
    /// A value failed its grammar (hex, address, URL, version, unsigned integer).
    #[error("{0}")]
    InvalidFormat(String),
    /// The signer is not allowed to perform the operation.
    #[error("{0}")]
    Unauthorized(String),
    /// A field of an untrusted object could not be read.
    #[error("{0}")]
    Inaccessible(String),
    /// A collaborator (signer or transaction service) rejected the call.
    #[error("{0}")]
    RemoteFailure(String),
}

impl SafeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SafeError::Required(_) => ErrorKind::Required,
            SafeError::InvalidFormat(_) => ErrorKind::InvalidFormat,
            SafeError::Unauthorized(_) => ErrorKind::Unauthorized,
            SafeError::Inaccessible(_) => ErrorKind::Inaccessible,
            SafeError::RemoteFailure(_) => ErrorKind::RemoteFailure,
        }
    }

    /// Wraps a collaborator failure, prefixing it with the stage that failed.
    pub(crate) fn remote(stage: &str, err: eyre::Report) -> Self {
        SafeError::RemoteFailure(format!("{stage}: {err}"))
    }
}

pub type Result<T, E = SafeError> = std::result::Result<T, E>;
