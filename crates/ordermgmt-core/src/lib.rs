#![doc = include_str!("../README.md")]

mod common;
pub use common::*;

/// Generated protobuf messages and gRPC stubs for the `ordermgmt` package.
pub mod proto {
    tonic::include_proto!("ordermgmt");

    /// Encoded file descriptor set, registered with the reflection service.
    pub const FILE_DESCRIPTOR_SET: &[u8] =
        tonic::include_file_descriptor_set!("ordermgmt_descriptor");
}
