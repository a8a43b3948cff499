//! Recorded write scenarios.
//!
//! A scenario names a collection, its query order and a list of ticks. Each
//! tick is a list of writes committed atomically.
//!
//! ```json
//! {
//!   "collection": "animals",
//!   "order_by": { "field": "rank" },
//!   "ticks": [
//!     [{ "op": "set", "id": "ant", "data": { "rank": 1 } }],
//!     [{ "op": "delete", "id": "ant" }]
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};

use docsync_core::WriteError;

use crate::collection::{MemoryCollection, OrderBy, WriteOp};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub description: Option<String>,
    pub collection: String,
    #[serde(default)]
    pub order_by: OrderBy,
    #[serde(default)]
    pub ticks: Vec<Vec<WriteOp>>,
}

impl Scenario {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// An empty collection configured for this scenario.
    pub fn collection(&self) -> MemoryCollection {
        MemoryCollection::new(self.collection.clone(), self.order_by.clone())
    }

    /// Commit tick `index` to `store`. Out-of-range ticks are a no-op.
    pub fn apply_tick(&self, store: &MemoryCollection, index: usize) -> Result<(), WriteError> {
        match self.ticks.get(index) {
            Some(ops) => store.write_batch(ops),
            None => Ok(()),
        }
    }
}
