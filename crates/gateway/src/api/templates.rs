//! Template CRUD endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::Extension;
use serde::Deserialize;
use uuid::Uuid;

use argus_domain::service::Service;
use argus_domain::template::Template;

use crate::state::AppState;
use crate::templates;

fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /api/<domain>/templates
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn list_templates(
    State(state): State<AppState>,
    Extension(service): Extension<Service>,
) -> Response {
    match state.db.list_templates(service).await {
        Ok(templates) => Json(serde_json::json!(templates)).into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("database: {e}")),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /api/<domain>/templates/builtin
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn builtin_templates(Extension(service): Extension<Service>) -> Response {
    Json(serde_json::json!(templates::builtin_templates(service))).into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/<domain>/templates
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct TemplateRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub scan_type: String,
    #[serde(default)]
    pub arguments: Option<serde_json::Value>,
    #[serde(default)]
    pub is_default: bool,
}

impl TemplateRequest {
    fn validate(&self, service: Service) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name is required".into());
        }
        if !service.accepts(&self.scan_type) {
            return Err(format!(
                "unknown scan_type '{}' for service '{service}'",
                self.scan_type
            ));
        }
        if let Some(arguments) = &self.arguments {
            if !arguments.is_object() {
                return Err("arguments must be an object".into());
            }
        }
        Ok(())
    }
}

pub async fn create_template(
    State(state): State<AppState>,
    Extension(service): Extension<Service>,
    Json(body): Json<TemplateRequest>,
) -> Response {
    if let Err(message) = body.validate(service) {
        return api_error(StatusCode::BAD_REQUEST, message);
    }

    let template = Template::builtin(
        service,
        body.name.trim(),
        body.description.trim(),
        &body.scan_type,
        body.arguments.unwrap_or_else(|| serde_json::json!({})),
        body.is_default,
    );

    match state.db.create_template(&template).await {
        Ok(()) => (StatusCode::CREATED, Json(serde_json::json!(template))).into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("database: {e}")),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PUT /api/<domain>/templates/:id
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn update_template(
    State(state): State<AppState>,
    Extension(service): Extension<Service>,
    Path(id): Path<Uuid>,
    Json(body): Json<TemplateRequest>,
) -> Response {
    if let Err(message) = body.validate(service) {
        return api_error(StatusCode::BAD_REQUEST, message);
    }

    let existing = match state.db.get_template(id).await {
        Ok(Some(template)) if template.service == service => template,
        Ok(_) => return api_error(StatusCode::NOT_FOUND, "template not found"),
        Err(e) => {
            return api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("database: {e}"))
        }
    };

    let updated = Template {
        name: body.name.trim().to_owned(),
        description: body.description.trim().to_owned(),
        scan_type: body.scan_type,
        arguments: body.arguments.unwrap_or_else(|| serde_json::json!({})),
        is_default: body.is_default,
        ..existing
    };

    match state.db.update_template(&updated).await {
        Ok(true) => Json(serde_json::json!(updated)).into_response(),
        Ok(false) => api_error(StatusCode::NOT_FOUND, "template not found"),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("database: {e}")),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DELETE /api/<domain>/templates/:id
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn delete_template(
    State(state): State<AppState>,
    Extension(service): Extension<Service>,
    Path(id): Path<Uuid>,
) -> Response {
    match state.db.get_template(id).await {
        Ok(Some(template)) if template.service == service => {}
        Ok(_) => return api_error(StatusCode::NOT_FOUND, "template not found"),
        Err(e) => {
            return api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("database: {e}"))
        }
    }

    match state.db.delete_template(id).await {
        Ok(true) => Json(serde_json::json!({ "deleted": true })).into_response(),
        Ok(false) => api_error(StatusCode::NOT_FOUND, "template not found"),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("database: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(scan_type: &str) -> TemplateRequest {
        TemplateRequest {
            name: "mine".into(),
            description: String::new(),
            scan_type: scan_type.into(),
            arguments: Some(serde_json::json!({ "rate": 500 })),
            is_default: false,
        }
    }

    #[test]
    fn validation_accepts_known_scan_types() {
        assert!(request("masscan_quick").validate(Service::Network).is_ok());
        assert!(request("nuclei").validate(Service::Vuln).is_ok());
    }

    #[test]
    fn validation_rejects_foreign_scan_types() {
        assert!(request("masscan_quick").validate(Service::Cms).is_err());
        assert!(request("drupal").validate(Service::Cms).is_err());
    }

    #[test]
    fn validation_rejects_non_object_arguments() {
        let mut bad = request("nmap");
        bad.arguments = Some(serde_json::json!([1, 2]));
        assert!(bad.validate(Service::Network).is_err());
    }

    #[test]
    fn validation_requires_name() {
        let mut bad = request("nmap");
        bad.name = "   ".into();
        assert!(bad.validate(Service::Network).is_err());
    }
}
