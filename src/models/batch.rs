// Outbound request shapes

use serde::{Deserialize, Serialize};

use super::MetricSample;

/// One request per dispatcher tick: the drained samples, oldest first, tagged with the
/// registered instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricBatch {
    pub application_instance_id: i32,
    pub metrics: Vec<MetricSample>,
}

/// A single observed call between two services, fed to the relation indicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCallObservation {
    pub source_service_id: i32,
    pub dest_service_id: i32,
    /// Epoch millis of the call.
    pub time: i64,
}
