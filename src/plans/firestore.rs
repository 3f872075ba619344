//! Firestore REST plan store and the typed-value codec it needs.
//!
//! Firestore documents carry every value wrapped in a single-key object naming
//! its type (`{"stringValue": "x"}`). [`encode`] and [`decode`] convert between
//! that form and plain JSON; both are total and `decode(&encode(v)) == v` for
//! any JSON value whose integers fit in an `i64`.

use std::collections::BTreeMap;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use tracing::{debug, error};
use uuid::Uuid;

use super::{ensure_owner, PlanStore};
use crate::config::FirestoreConfig;
use crate::planner::model::SavedPlan;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldValue {
    NullValue(()),
    StringValue(String),
    BooleanValue(bool),
    IntegerValue(#[serde(with = "integer_text")] i64),
    DoubleValue(f64),
    /// Only produced by Firestore itself; decoded as its RFC 3339 text.
    TimestampValue(String),
    ArrayValue(ArrayValue),
    MapValue(MapValue),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArrayValue {
    #[serde(default)]
    pub values: Vec<FieldValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapValue {
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
}

/// `integerValue` travels as a decimal string but is accepted as a number too.
mod integer_text {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &i64, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&v.to_string())
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
        match Raw::deserialize(d)? {
            Raw::Int(n) => Ok(n),
            Raw::Text(s) => s.trim().parse().map_err(de::Error::custom),
        }
    }
}

pub fn encode(value: &Value) -> FieldValue {
    match value {
        Value::Null => FieldValue::NullValue(()),
        Value::Bool(b) => FieldValue::BooleanValue(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => FieldValue::IntegerValue(i),
            None => FieldValue::DoubleValue(n.as_f64().unwrap_or(0.0)),
        },
        Value::String(s) => FieldValue::StringValue(s.clone()),
        Value::Array(items) => FieldValue::ArrayValue(ArrayValue {
            values: items.iter().map(encode).collect(),
        }),
        Value::Object(map) => FieldValue::MapValue(MapValue {
            fields: map.iter().map(|(k, v)| (k.clone(), encode(v))).collect(),
        }),
    }
}

pub fn decode(value: &FieldValue) -> Value {
    match value {
        FieldValue::NullValue(()) => Value::Null,
        FieldValue::BooleanValue(b) => Value::Bool(*b),
        FieldValue::IntegerValue(i) => Value::from(*i),
        FieldValue::DoubleValue(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
        FieldValue::StringValue(s) | FieldValue::TimestampValue(s) => Value::String(s.clone()),
        FieldValue::ArrayValue(a) => Value::Array(a.values.iter().map(decode).collect()),
        FieldValue::MapValue(m) => Value::Object(
            m.fields
                .iter()
                .map(|(k, v)| (k.clone(), decode(v)))
                .collect::<Map<String, Value>>(),
        ),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDocumentsResponse {
    #[serde(default)]
    documents: Vec<Document>,
    next_page_token: Option<String>,
}

/// The document id lives in the path, so `id` is not stored as a field.
pub fn to_document(plan: &SavedPlan) -> anyhow::Result<Document> {
    let Value::Object(mut map) = serde_json::to_value(plan).context("encode plan")? else {
        anyhow::bail!("plan did not serialize to an object");
    };
    map.remove("id");
    Ok(Document {
        name: String::new(),
        fields: map.iter().map(|(k, v)| (k.clone(), encode(v))).collect(),
    })
}

pub fn from_document(doc: &Document) -> anyhow::Result<SavedPlan> {
    let mut map: Map<String, Value> = doc
        .fields
        .iter()
        .map(|(k, v)| (k.clone(), decode(v)))
        .collect();
    let id = doc.name.rsplit('/').next().unwrap_or_default();
    map.insert("id".into(), Value::String(id.to_string()));
    serde_json::from_value(Value::Object(map)).with_context(|| format!("decode plan {}", id))
}

#[derive(Clone)]
pub struct FirestorePlanStore {
    http: Client,
    config: FirestoreConfig,
}

impl FirestorePlanStore {
    pub fn new(config: FirestoreConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    fn collection_url(&self, user_id: Uuid) -> String {
        format!(
            "{}/projects/{}/databases/(default)/documents/users/{}/plans",
            self.config.base_url.trim_end_matches('/'),
            self.config.project_id,
            user_id
        )
    }

    fn with_key(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => req.query(&[("key", key.as_str())]),
            None => req,
        }
    }
}

#[async_trait]
impl PlanStore for FirestorePlanStore {
    async fn list(&self, user_id: Uuid) -> anyhow::Result<Vec<SavedPlan>> {
        let url = self.collection_url(user_id);
        let mut plans = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut req = self
                .with_key(self.http.get(&url))
                .query(&[("orderBy", "createdAt desc")]);
            if let Some(token) = &page_token {
                req = req.query(&[("pageToken", token.as_str())]);
            }
            let res = req.send().await.context("firestore list")?;
            // No documents for a new user.
            if res.status() == StatusCode::NOT_FOUND {
                return Ok(plans);
            }
            if !res.status().is_success() {
                let status = res.status();
                let body = res.text().await.unwrap_or_default();
                error!(%status, body = %body, "firestore list failed");
                anyhow::bail!("firestore list failed with {}", status);
            }
            let page: ListDocumentsResponse = res.json().await.context("firestore list body")?;
            for doc in &page.documents {
                plans.push(from_document(doc)?);
            }
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        debug!(user_id = %user_id, count = plans.len(), "firestore plans loaded");
        Ok(plans)
    }

    async fn create(&self, plan: &SavedPlan, user_id: Uuid) -> anyhow::Result<()> {
        ensure_owner(plan, user_id)?;
        let doc = to_document(plan)?;
        let res = self
            .with_key(self.http.post(self.collection_url(user_id)))
            .query(&[("documentId", plan.id.as_str())])
            .json(&doc)
            .send()
            .await
            .context("firestore create")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            error!(%status, body = %body, plan_id = %plan.id, "firestore create failed");
            anyhow::bail!("firestore create failed with {}", status);
        }
        Ok(())
    }
}
