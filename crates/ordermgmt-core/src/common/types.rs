//! # Shared Order-Management Constants
//!
//! Values that are part of the wire contract between the server and its
//! clients. Clients matching on shipment ids or summary text should use these
//! rather than hard-coding the strings.

/// Prefix of every [`CombinedShipment`](crate::proto::CombinedShipment) id.
/// The full id is this prefix followed by the destination.
pub const SHIPMENT_ID_PREFIX: &str = "cmb - ";

/// Status assigned to every shipment emitted by `ProcessOrders`.
pub const SHIPMENT_STATUS_PROCESSED: &str = "Processed";

/// Leading text of the `UpdateOrders` summary, followed by each updated
/// order id and `", "`.
pub const UPDATE_SUMMARY_PREFIX: &str = "Orders processed Updated Order IDs: ";

/// Default number of order ids per `ProcessOrders` batching window.
pub const DEFAULT_BATCH_SIZE: usize = 3;

/// Returns the shipment id for orders bound to `destination`.
pub fn shipment_id(destination: &str) -> String {
    format!("{SHIPMENT_ID_PREFIX}{destination}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shipment_id_prefixes_destination() {
        assert_eq!(shipment_id("San Jose, CA"), "cmb - San Jose, CA");
        assert_eq!(shipment_id(""), SHIPMENT_ID_PREFIX);
    }
}
