//! API surface discovery — route probing, parameter discovery, GraphQL
//! introspection, and OpenAPI/Swagger document hunting.
//!
//! This adapter talks HTTP directly instead of shelling out. Probes run
//! with bounded concurrency and each sub-type emits its own result
//! shape.

use std::time::Duration;

use argus_domain::results::{ApiParameter, ApiRoute, GraphqlSchema, OpenApiSpec};
use argus_domain::scan::{LogLevel, Scan};
use argus_engine::{ScanContext, ScanError, ScanResult, ToolAdapter};
use async_trait::async_trait;
use futures_util::stream::{FuturesUnordered, StreamExt};
use serde::Deserialize;

use crate::decode_config;
use crate::screenshot::ensure_scheme;
use crate::wordlists::{API_PARAM_WORDS, API_ROUTE_WORDS, GRAPHQL_PATHS, OPENAPI_PATHS};

const PROBE_CONCURRENCY: usize = 10;

const INTROSPECTION_QUERY: &str = r#"{"query":"query { __schema { types { name kind } queryType { fields { name } } mutationType { fields { name } } subscriptionType { fields { name } } } }"}"#;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiDiscoveryConfig {
    /// Methods used by the parameter-discovery matrix.
    #[serde(default = "d_methods")]
    pub methods: Vec<String>,
    /// Per-request timeout in seconds.
    #[serde(default = "d_request_timeout")]
    pub request_timeout: u64,
    #[serde(default)]
    pub timeout: Option<u64>,
}

fn d_methods() -> Vec<String> {
    vec!["GET".into(), "POST".into()]
}

fn d_request_timeout() -> u64 {
    10
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
struct IntrospectionResponse {
    data: Option<IntrospectionData>,
}

#[derive(Debug, Deserialize)]
struct IntrospectionData {
    #[serde(rename = "__schema")]
    schema: IntrospectionSchema,
}

#[derive(Debug, Deserialize)]
struct IntrospectionSchema {
    #[serde(default)]
    types: Vec<NamedField>,
    #[serde(rename = "queryType", default)]
    query_type: Option<FieldsHolder>,
    #[serde(rename = "mutationType", default)]
    mutation_type: Option<FieldsHolder>,
    #[serde(rename = "subscriptionType", default)]
    subscription_type: Option<FieldsHolder>,
}

#[derive(Debug, Deserialize)]
struct NamedField {
    name: String,
}

#[derive(Debug, Deserialize)]
struct FieldsHolder {
    #[serde(default)]
    fields: Vec<NamedField>,
}

/// Parse a GraphQL introspection response body into the schema record.
pub fn parse_introspection(url: &str, body: &str) -> Option<GraphqlSchema> {
    let response: IntrospectionResponse = serde_json::from_str(body).ok()?;
    let schema = response.data?.schema;

    let names = |holder: Option<FieldsHolder>| -> Vec<String> {
        holder
            .map(|h| h.fields.into_iter().map(|f| f.name).collect())
            .unwrap_or_default()
    };

    Some(GraphqlSchema {
        url: url.to_owned(),
        types: schema
            .types
            .into_iter()
            .map(|t| t.name)
            .filter(|name| !name.starts_with("__"))
            .collect(),
        queries: names(schema.query_type),
        mutations: names(schema.mutation_type),
        subscriptions: names(schema.subscription_type),
    })
}

/// Parse a Swagger/OpenAPI document into the spec record.
pub fn parse_openapi_doc(url: &str, body: &str) -> Option<OpenApiSpec> {
    let doc: serde_json::Value = serde_json::from_str(body).ok()?;
    let spec_version = doc
        .get("openapi")
        .or_else(|| doc.get("swagger"))
        .and_then(|v| v.as_str())
        .map(str::to_owned)?;

    let mut paths: Vec<String> = doc
        .get("paths")
        .and_then(|v| v.as_object())
        .map(|map| map.keys().cloned().collect())
        .unwrap_or_default();
    paths.sort();

    Some(OpenApiSpec {
        url: url.to_owned(),
        title: doc
            .pointer("/info/title")
            .and_then(|v| v.as_str())
            .map(str::to_owned),
        spec_version: Some(spec_version),
        path_count: paths.len(),
        paths,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ApiDiscoveryAdapter;

impl ApiDiscoveryAdapter {
    pub fn new() -> Self {
        Self
    }

    fn client(config: &ApiDiscoveryConfig) -> ScanResult<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout))
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| ScanError::Tool(format!("http client: {e}")))
    }

    async fn discover_routes(
        &self,
        ctx: &ScanContext,
        client: &reqwest::Client,
        base: &str,
    ) -> ScanResult<usize> {
        let base = base.trim_end_matches('/');
        let mut found = 0usize;
        let total = API_ROUTE_WORDS.len();
        let mut completed = 0usize;

        let mut pending = API_ROUTE_WORDS.iter().copied();
        let mut in_flight = FuturesUnordered::new();

        let probe = |word: &'static str| {
            let url = format!("{base}/{word}");
            async move {
                let result = client.get(&url).send().await;
                (url, result)
            }
        };

        for word in pending.by_ref().take(PROBE_CONCURRENCY) {
            in_flight.push(probe(word));
        }

        while let Some((url, result)) = in_flight.next().await {
            ctx.checkpoint()?;
            completed += 1;

            if let Ok(response) = result {
                let status = response.status().as_u16();
                if status != 404 {
                    let length = response.content_length().unwrap_or(0);
                    let route = ApiRoute {
                        url: url.clone(),
                        method: "GET".into(),
                        status_code: status,
                        content_length: length,
                    };
                    ctx.append(&route).await?;
                    found += 1;
                    ctx.log(LogLevel::Success, format!("route {url} [{status}]")).await;
                }
            }

            if let Some(word) = pending.next() {
                in_flight.push(probe(word));
            }
            if completed % 10 == 0 {
                ctx.progress((100 * completed / total) as u8).await;
            }
        }

        Ok(found)
    }

    async fn discover_params(
        &self,
        ctx: &ScanContext,
        client: &reqwest::Client,
        base: &str,
        methods: &[String],
    ) -> ScanResult<usize> {
        let mut found = 0usize;
        let total = methods.len().max(1) * API_PARAM_WORDS.len();
        let mut completed = 0usize;

        for method in methods {
            let method = method.to_uppercase();
            let Ok(parsed_method) = reqwest::Method::from_bytes(method.as_bytes()) else {
                ctx.log(LogLevel::Warning, format!("unknown method '{method}', skipping"))
                    .await;
                continue;
            };

            // Baseline without any probe parameter.
            let baseline = client
                .request(parsed_method.clone(), base)
                .send()
                .await
                .ok()
                .map(|r| r.status().as_u16());

            for name in API_PARAM_WORDS {
                ctx.checkpoint()?;
                completed += 1;

                let url = format!(
                    "{base}{}{}=1",
                    if base.contains('?') { "&" } else { "?" },
                    name
                );
                if let Ok(response) = client.request(parsed_method.clone(), &url).send().await {
                    let status = response.status().as_u16();
                    // A parameter that changes the response is surface.
                    if Some(status) != baseline {
                        let param = ApiParameter {
                            url: base.to_owned(),
                            method: method.clone(),
                            name: (*name).to_owned(),
                            status_code: status,
                        };
                        ctx.append(&param).await?;
                        found += 1;
                        ctx.log(
                            LogLevel::Success,
                            format!("parameter '{name}' on {method} {base} → {status}"),
                        )
                        .await;
                    }
                }

                if completed % 10 == 0 {
                    ctx.progress((100 * completed / total) as u8).await;
                }
            }
        }

        Ok(found)
    }

    async fn introspect_graphql(
        &self,
        ctx: &ScanContext,
        client: &reqwest::Client,
        base: &str,
    ) -> ScanResult<usize> {
        let base = base.trim_end_matches('/');
        let total = GRAPHQL_PATHS.len().max(1);

        for (index, path) in GRAPHQL_PATHS.iter().enumerate() {
            ctx.checkpoint()?;
            let url = format!("{base}{path}");

            let response = client
                .post(&url)
                .header("Content-Type", "application/json")
                .body(INTROSPECTION_QUERY)
                .send()
                .await;

            if let Ok(response) = response {
                if response.status().is_success() {
                    if let Ok(body) = response.text().await {
                        if let Some(schema) = parse_introspection(&url, &body) {
                            ctx.log(
                                LogLevel::Success,
                                format!(
                                    "GraphQL schema at {url}: {} types, {} queries, {} mutations",
                                    schema.types.len(),
                                    schema.queries.len(),
                                    schema.mutations.len()
                                ),
                            )
                            .await;
                            ctx.append(&schema).await?;
                            ctx.progress(100).await;
                            return Ok(1);
                        }
                    }
                }
            }
            ctx.progress((100 * (index + 1) / total) as u8).await;
        }

        ctx.log(LogLevel::Info, "no GraphQL endpoint answered introspection")
            .await;
        Ok(0)
    }

    async fn discover_openapi(
        &self,
        ctx: &ScanContext,
        client: &reqwest::Client,
        base: &str,
    ) -> ScanResult<usize> {
        let base = base.trim_end_matches('/');
        let mut found = 0usize;
        let total = OPENAPI_PATHS.len().max(1);

        for (index, path) in OPENAPI_PATHS.iter().enumerate() {
            ctx.checkpoint()?;
            let url = format!("{base}{path}");

            if let Ok(response) = client.get(&url).send().await {
                if response.status().is_success() {
                    if let Ok(body) = response.text().await {
                        if let Some(spec) = parse_openapi_doc(&url, &body) {
                            ctx.log(
                                LogLevel::Success,
                                format!(
                                    "OpenAPI document at {url}: {} paths",
                                    spec.path_count
                                ),
                            )
                            .await;
                            ctx.append(&spec).await?;
                            found += 1;
                        }
                    }
                }
            }
            ctx.progress((100 * (index + 1) / total) as u8).await;
        }

        Ok(found)
    }
}

impl Default for ApiDiscoveryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolAdapter for ApiDiscoveryAdapter {
    fn name(&self) -> &'static str {
        "api-discovery"
    }

    async fn scan(&self, ctx: &ScanContext, scan: &Scan) -> ScanResult<()> {
        let config: ApiDiscoveryConfig = decode_config(&scan.configuration)?;
        let client = Self::client(&config)?;
        let base = ensure_scheme(&scan.target);

        ctx.log(
            LogLevel::Info,
            format!("API discovery ({}) against {base}", scan.scan_type),
        )
        .await;
        ctx.progress(5).await;

        let found = match scan.scan_type.as_str() {
            "routes" => self.discover_routes(ctx, &client, &base).await?,
            "params" => {
                self.discover_params(ctx, &client, &base, &config.methods)
                    .await?
            }
            "graphql" => self.introspect_graphql(ctx, &client, &base).await?,
            "openapi" => self.discover_openapi(ctx, &client, &base).await?,
            other => {
                return Err(ScanError::Config(format!(
                    "unsupported api scan type '{other}'"
                )))
            }
        };

        ctx.log(
            LogLevel::Info,
            format!("API discovery finished: {found} records"),
        )
        .await;
        ctx.progress(100).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_introspection_response() {
        let body = r#"{"data": {"__schema": {
            "types": [{"name": "User", "kind": "OBJECT"}, {"name": "__Schema", "kind": "OBJECT"}],
            "queryType": {"fields": [{"name": "user"}, {"name": "users"}]},
            "mutationType": {"fields": [{"name": "createUser"}]},
            "subscriptionType": null
        }}}"#;
        let schema = parse_introspection("https://api.example.test/graphql", body).unwrap();
        assert_eq!(schema.types, vec!["User"]);
        assert_eq!(schema.queries, vec!["user", "users"]);
        assert_eq!(schema.mutations, vec!["createUser"]);
        assert!(schema.subscriptions.is_empty());
    }

    #[test]
    fn introspection_requires_data() {
        assert!(parse_introspection("u", r#"{"errors": [{"message": "denied"}]}"#).is_none());
        assert!(parse_introspection("u", "<html>not json</html>").is_none());
    }

    #[test]
    fn parses_openapi_document() {
        let body = r#"{"openapi": "3.0.1", "info": {"title": "Pet API", "version": "1.0"},
                       "paths": {"/pets": {}, "/pets/{id}": {}}}"#;
        let spec = parse_openapi_doc("https://api.example.test/openapi.json", body).unwrap();
        assert_eq!(spec.title.as_deref(), Some("Pet API"));
        assert_eq!(spec.spec_version.as_deref(), Some("3.0.1"));
        assert_eq!(spec.path_count, 2);
        assert_eq!(spec.paths, vec!["/pets", "/pets/{id}"]);
    }

    #[test]
    fn swagger_two_is_accepted() {
        let body = r#"{"swagger": "2.0", "info": {"title": "Legacy"}, "paths": {"/v1/x": {}}}"#;
        let spec = parse_openapi_doc("u", body).unwrap();
        assert_eq!(spec.spec_version.as_deref(), Some("2.0"));
    }

    #[test]
    fn non_spec_json_is_rejected() {
        assert!(parse_openapi_doc("u", r#"{"status": "ok"}"#).is_none());
        assert!(parse_openapi_doc("u", "plain text").is_none());
    }

    #[test]
    fn config_defaults() {
        let config: ApiDiscoveryConfig = decode_config(&serde_json::json!({})).unwrap();
        assert_eq!(config.methods, vec!["GET", "POST"]);
        assert_eq!(config.request_timeout, 10);
    }
}
