//! Scan templates — named default argument sets per scan type.
//!
//! Builtin templates ship with each service; user templates are stored
//! in the database and take precedence during fallback resolution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::service::Service;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: Uuid,
    pub service: Service,
    pub name: String,
    pub description: String,
    pub scan_type: String,
    /// Default config bag applied when a request omits `config`.
    pub arguments: serde_json::Value,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

impl Template {
    pub fn builtin(
        service: Service,
        name: &str,
        description: &str,
        scan_type: &str,
        arguments: serde_json::Value,
        is_default: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            service,
            name: name.to_owned(),
            description: description.to_owned(),
            scan_type: scan_type.to_owned(),
            arguments,
            is_default,
            created_at: Utc::now(),
        }
    }
}
