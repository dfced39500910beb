use serde_json::{json, Value};

use crate::model::PageLinks;

pub mod requests;

pub use requests::router;

/// Success envelope for single resources.
pub fn data_envelope(data: Value) -> Value {
    json!({ "data": data })
}

/// Success envelope for paginated lists.
pub fn page_envelope(data: Value, links: PageLinks) -> Value {
    json!({ "data": data, "links": links })
}
