//! AI structured research over entity names.
//!
//! Builds a JSON-schema response format from the caller's field definitions,
//! asks a chat-completions style endpoint to research one entity, and parses
//! the structured answer back into a flat record. Exhausted retries degrade
//! to a record of empty field values so a batch never fails outright.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map as JsonMap, Value as JsonValue};
use tracing::{error, warn};

use crate::retry::{retry_after, Backoff, FailureClass, MAX_ATTEMPTS};

/// Output field kinds a research run can request.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    #[default]
    Text,
    Numeric,
    YesNo,
    Url,
    Boolean,
    CustomEnum,
}

/// Field kinds with the human-readable descriptions served by the API.
pub fn field_types() -> Vec<(&'static str, &'static str)> {
    vec![
        ("text", "Text (any string)"),
        ("numeric", "Number (integer or decimal)"),
        ("yes_no", "Yes/No/Unknown"),
        ("url", "Website URL"),
        ("boolean", "True/False"),
        ("custom_enum", "Custom dropdown (define options)"),
    ]
}

/// Configuration for one requested output field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchField {
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub enum_values: Option<Vec<String>>,
}

/// JSON schema for the structured response covering `fields`.
pub fn build_schema(fields: &[ResearchField]) -> JsonValue {
    let mut properties = JsonMap::new();
    let mut required = Vec::new();

    for field in fields {
        let property = match field.field_type {
            FieldType::Numeric => json!({ "type": "number" }),
            FieldType::Boolean => json!({ "type": "boolean" }),
            FieldType::YesNo => json!({ "type": "string", "enum": ["Yes", "No", "Unknown"] }),
            FieldType::CustomEnum => match field.enum_values.as_deref() {
                Some(values) if !values.is_empty() => {
                    json!({ "type": "string", "enum": values })
                }
                _ => json!({ "type": "string" }),
            },
            FieldType::Text | FieldType::Url => json!({ "type": "string" }),
        };
        properties.insert(field.name.clone(), property);
        if !field.optional {
            required.push(JsonValue::String(field.name.clone()));
        }
    }

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// The research prompt for one entity: a numbered list of field descriptions.
pub fn build_query(entity: &str, fields: &[ResearchField]) -> String {
    let mut query = format!("Research {entity} and provide:\n");
    for (idx, field) in fields.iter().enumerate() {
        let description = field.description.as_deref().unwrap_or(&field.name);
        query.push_str(&format!("{}. {description}\n", idx + 1));
    }
    query.truncate(query.trim_end().len());
    query
}

/// A record with every requested field blank (the degraded result).
pub fn blank_record(entity: &str, fields: &[ResearchField]) -> JsonMap<String, JsonValue> {
    let mut record = JsonMap::new();
    for field in fields {
        record.insert(field.name.clone(), JsonValue::String(String::new()));
    }
    record.insert("name".to_string(), JsonValue::String(entity.to_string()));
    record
}

/// Client for a chat-completions research endpoint with structured output.
pub struct ResearchClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    backoff: Backoff,
    request_timeout: Duration,
}

impl ResearchClient {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: "sonar-pro".to_string(),
            backoff: Backoff::research(),
            request_timeout: Duration::from_secs(90),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Research a single entity. Always returns a record (possibly blank);
    /// the `name` key carries the entity itself.
    pub async fn research_entity(
        &self,
        entity: &str,
        fields: &[ResearchField],
    ) -> JsonMap<String, JsonValue> {
        if entity.is_empty() {
            return blank_record(entity, fields);
        }

        let query = build_query(entity, fields);
        let schema = build_schema(fields);

        for attempt in 0..MAX_ATTEMPTS {
            let response = self
                .http
                .post(&self.endpoint)
                .timeout(self.request_timeout)
                .bearer_auth(&self.api_key)
                .json(&json!({
                    "model": self.model,
                    "messages": [{ "role": "user", "content": query }],
                    "response_format": {
                        "type": "json_schema",
                        "json_schema": { "schema": schema },
                    },
                }))
                .send()
                .await;

            let class = match response {
                Ok(response) => {
                    let status = response.status();
                    if status.as_u16() == 429 {
                        FailureClass::RateLimited(retry_after(response.headers()))
                    } else if !status.is_success() {
                        FailureClass::Server
                    } else {
                        match response.json::<JsonValue>().await {
                            Ok(body) => {
                                let content = body
                                    .pointer("/choices/0/message/content")
                                    .and_then(JsonValue::as_str)
                                    .unwrap_or("{}");
                                match serde_json::from_str::<JsonMap<String, JsonValue>>(content) {
                                    Ok(mut record) => {
                                        record.insert(
                                            "name".to_string(),
                                            JsonValue::String(entity.to_string()),
                                        );
                                        return record;
                                    }
                                    Err(_) => {
                                        error!(entity, "research response was not valid JSON");
                                        return blank_record(entity, fields);
                                    }
                                }
                            }
                            Err(e) => {
                                warn!("failed to read research response: {e}");
                                FailureClass::Server
                            }
                        }
                    }
                }
                Err(e) if e.is_timeout() => FailureClass::Timeout,
                Err(e) => {
                    warn!("research transport error: {e}");
                    FailureClass::Transport
                }
            };

            if attempt + 1 < MAX_ATTEMPTS {
                let delay = self.backoff.delay(&class, attempt);
                warn!(entity, ?class, attempt, ?delay, "retrying research call");
                tokio::time::sleep(delay).await;
            }
        }

        blank_record(entity, fields)
    }
}
