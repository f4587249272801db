use core::error::Error;

/// Errors that can occur while setting up the Kubernetes connection.
#[derive(Debug, derive_more::Display)]
pub enum KubernetesError {
    #[display("Failed to connect to Kubernetes API: {message}")]
    ConnectionFailed { message: String },
}

impl Error for KubernetesError {}
