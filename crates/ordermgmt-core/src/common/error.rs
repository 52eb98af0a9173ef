//! Error types for the order-management service.
//!
//! This module defines the central `Error` enum shared by every RPC handler.
//! It implements `From<Error>` for `tonic::Status` so handlers can bubble
//! errors with `?` and callers receive a status code that matches the
//! failure.
//!
//! ## Error Cases
//! - `NotFound`: A product or order lookup missed. Recoverable by the caller.
//! - `IdGeneration`: The product id source failed to produce an id.
//! - `ChannelError`: The response channel to the client closed mid-stream.
//! - `Stream`: The inbound client stream yielded a non-EOF error; the status
//!   is passed through unchanged.
//! - `RequestCancelled`: The client went away before the call completed.
//! - `ServiceShutdown`: The server is shutting down.

use tonic::Status;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the order-management service.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// No record with the given id exists.
    #[error("{kind} {id} does not exist")]
    NotFound { kind: &'static str, id: String },

    /// Generating a fresh product id failed.
    #[error("ID generation error: {reason}")]
    IdGeneration { reason: String },

    /// Internal channel send failure (e.g., the response stream was dropped).
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// Receiving from the client stream failed with something other than a
    /// clean end of input.
    #[error("Stream error: {0}")]
    Stream(#[from] Status),

    /// The client aborted the request.
    #[error("Request cancelled by client")]
    RequestCancelled,

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

impl Error {
    pub fn product_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "Product",
            id: id.into(),
        }
    }

    pub fn order_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "Order",
            id: id.into(),
        }
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound { kind, id } => Status::not_found(format!("{kind} {id} does not exist")),
            Error::IdGeneration { reason } => {
                Status::internal(format!("Error while generating Product ID: {reason}"))
            }
            Error::ChannelError { context } => {
                Status::internal(format!("Channel error: {context}"))
            }
            Error::Stream(status) => status,
            Error::RequestCancelled => Status::cancelled("Request was cancelled"),
            Error::ServiceShutdown => Status::unavailable("Service is shutting down"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Code;

    #[test]
    fn not_found_maps_to_not_found_status() {
        let status: Status = Error::order_not_found("42").into();
        assert_eq!(status.code(), Code::NotFound);
        assert_eq!(status.message(), "Order 42 does not exist");

        let status: Status = Error::product_not_found("p-1").into();
        assert_eq!(status.code(), Code::NotFound);
    }

    #[test]
    fn id_generation_maps_to_internal() {
        let status: Status = Error::IdGeneration {
            reason: "entropy exhausted".to_string(),
        }
        .into();
        assert_eq!(status.code(), Code::Internal);
    }

    #[test]
    fn stream_status_passes_through() {
        let status: Status = Error::from(Status::data_loss("truncated frame")).into();
        assert_eq!(status.code(), Code::DataLoss);
        assert_eq!(status.message(), "truncated frame");
    }
}
