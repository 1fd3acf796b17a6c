//! The hydration payload: what a producing pass hands to a consuming pass.
//!
//! Wire shape (language-neutral JSON):
//!
//! ```json
//! {
//! 	"contextId": 1,
//! 	"observables": { "0": 5, "3": "hello" },
//! 	"components": { "c0": [["#text"], ["div", 0]] }
//! }
//! ```
//!
//! Only root observables appear; derived values are recomputed after
//! restore. A payload is created once at the end of a producing pass,
//! consumed once at the start of a reconciliation pass, then discarded.

use std::collections::BTreeMap;

use grappelli_reactive::CellId;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::structure::StructureMap;

/// The global variable the script-tag transport assigns the payload to.
pub const STATE_VAR: &str = "__GRAPPELLI_STATE__";

/// Serialized output of one producing pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HydrationPayload {
	/// Identity shared by the producing and consuming passes.
	pub context_id: u64,
	/// Root observable values, keyed by cell id.
	#[serde(
		serialize_with = "serialize_observables",
		deserialize_with = "deserialize_observables",
		default
	)]
	pub observables: BTreeMap<CellId, serde_json::Value>,
	/// Structure maps, keyed by component id.
	#[serde(default)]
	pub components: BTreeMap<String, StructureMap>,
}

impl HydrationPayload {
	/// Serializes the payload to JSON.
	pub fn to_json(&self) -> Result<String, serde_json::Error> {
		serde_json::to_string(self)
	}

	/// Serializes the payload to pretty-printed JSON.
	pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
		serde_json::to_string_pretty(self)
	}

	/// Deserializes a payload from JSON.
	pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
		serde_json::from_str(json)
	}

	/// Generates a `<script>` tag assigning the payload to [`STATE_VAR`].
	pub fn to_script_tag(&self) -> String {
		let json = self.to_json().unwrap_or_else(|_| "{}".to_string());
		format!(
			r#"<script id="grappelli-state" type="application/json">window.{} = {};</script>"#,
			STATE_VAR, json
		)
	}

	/// Whether the payload carries no state at all.
	pub fn is_empty(&self) -> bool {
		self.observables.is_empty() && self.components.is_empty()
	}
}

fn serialize_observables<S: Serializer>(
	observables: &BTreeMap<CellId, serde_json::Value>,
	serializer: S,
) -> Result<S::Ok, S::Error> {
	serializer.collect_map(observables.iter().map(|(id, value)| (id.to_string(), value)))
}

fn deserialize_observables<'de, D: Deserializer<'de>>(
	deserializer: D,
) -> Result<BTreeMap<CellId, serde_json::Value>, D::Error> {
	let raw = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
	raw.into_iter()
		.map(|(key, value)| {
			key.parse::<CellId>()
				.map(|id| (id, value))
				.map_err(serde::de::Error::custom)
		})
		.collect()
}
