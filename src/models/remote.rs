// Generic positional record shared by every indicator kind on the node-to-node wire.
// Each kind owns a fixed slot layout over the three scalar sequences.

use serde::{Deserialize, Serialize};
use wincode::{SchemaRead, SchemaWrite};

use crate::indicator::{IndicatorError, IndicatorKind};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, SchemaRead, SchemaWrite)]
#[serde(rename_all = "camelCase")]
pub struct RemoteData {
    pub data_integers: Vec<i32>,
    pub data_longs: Vec<i64>,
    pub data_strings: Vec<String>,
}

impl RemoteData {
    pub fn integer(&self, index: usize) -> Result<i32, IndicatorError> {
        self.data_integers
            .get(index)
            .copied()
            .ok_or(IndicatorError::MissingSlot {
                slot: "integer",
                index,
            })
    }

    pub fn long(&self, index: usize) -> Result<i64, IndicatorError> {
        self.data_longs
            .get(index)
            .copied()
            .ok_or(IndicatorError::MissingSlot {
                slot: "long",
                index,
            })
    }

    pub fn string(&self, index: usize) -> Result<&str, IndicatorError> {
        self.data_strings
            .get(index)
            .map(String::as_str)
            .ok_or(IndicatorError::MissingSlot {
                slot: "string",
                index,
            })
    }
}

/// Envelope forwarded between collector nodes: the kind selects the slot layout of `data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SchemaRead, SchemaWrite)]
#[serde(rename_all = "camelCase")]
pub struct RemoteMessage {
    pub kind: IndicatorKind,
    pub data: RemoteData,
}

impl RemoteMessage {
    pub fn encode(&self) -> anyhow::Result<Vec<u8>> {
        wincode::serialize(self).map_err(|e| anyhow::anyhow!("wincode: {}", e))
    }

    pub fn decode(bytes: &[u8]) -> anyhow::Result<Self> {
        wincode::deserialize(bytes).map_err(|e| anyhow::anyhow!("wincode deserialize: {}", e))
    }
}
