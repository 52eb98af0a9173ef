/// Builds the gRPC client and server code for `ordermgmt.proto` using
/// `tonic-prost-build`.
///
/// # Serde on `Order`
///
/// The seed data file read at server boot is a JSON object of `Order`
/// records keyed by id. Rather than keeping a parallel domain struct, the
/// generated `Order` message derives `serde` directly. `#[serde(default)]`
/// lets seed records omit fields, falling back to the prost defaults.
///
/// # Files and Paths
///
/// - Proto file: `proto/ordermgmt.proto`
/// - Includes: `proto/`
/// - Descriptor set: `$OUT_DIR/ordermgmt_descriptor.bin` (served by
///   `tonic-reflection`)
///
/// # Output
///
/// ```rust,ignore
/// pub mod proto {
///     tonic::include_proto!("ordermgmt");
/// }
/// ```
use std::env;
use std::path::PathBuf;
fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let descriptor_path = out_dir.join("ordermgmt_descriptor.bin");

    let mut config = tonic_prost_build::Config::new();

    config
        .type_attribute(
            ".ordermgmt.Order",
            "#[derive(serde::Deserialize, serde::Serialize)]",
        )
        .type_attribute(".ordermgmt.Order", "#[serde(default)]")
        .file_descriptor_set_path(&descriptor_path);

    tonic_prost_build::configure()
        .compile_with_config(config, &["proto/ordermgmt.proto"], &["proto"])
        .unwrap();
}
