//! Airtable adapter (candidate store).
//!
//! Lists pending records through a filter formula and writes decisions back
//! as single-record partial updates.

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use pab_core::{
    config::{AirtableConfig, FieldNames},
    domain::{Candidate, ModerationFlags, RecordId},
    errors::Error,
    ports::CandidateStore,
    Result,
};

pub const API_BASE: &str = "https://api.airtable.com/v0";

/// Largest page the list endpoint returns.
const PAGE_SIZE: u32 = 100;

#[derive(Clone, Debug)]
pub struct AirtableStore {
    cfg: AirtableConfig,
    api_base: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    records: Vec<RecordDto>,
    #[serde(default)]
    offset: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RecordDto {
    id: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

impl AirtableStore {
    pub fn new(cfg: AirtableConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| Error::External(format!("airtable client build error: {e}")))?;
        Ok(Self {
            cfg,
            api_base: API_BASE.to_string(),
            http,
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// `{api_base}/{base}/{table}[/{record}]`, each segment percent-encoded.
    fn table_url(&self, record: Option<&RecordId>) -> Result<Url> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|e| Error::Config(format!("invalid airtable api url: {e}")))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| Error::Config("airtable api url cannot be a base".to_string()))?;
            segments
                .pop_if_empty()
                .push(&self.cfg.base_id)
                .push(&self.cfg.table_name);
            if let Some(record) = record {
                segments.push(&record.0);
            }
        }
        Ok(url)
    }

    fn list_query(&self, offset: Option<&str>) -> Vec<(&'static str, String)> {
        let fields = &self.cfg.fields;
        let mut query = vec![
            ("view", self.cfg.view.clone()),
            ("filterByFormula", pending_formula(fields)),
            ("fields[]", fields.title.clone()),
            ("fields[]", fields.guid.clone()),
            ("cellFormat", "string".to_string()),
            ("timeZone", self.cfg.time_zone.clone()),
            ("userLocale", self.cfg.locale.clone()),
            ("pageSize", PAGE_SIZE.to_string()),
        ];
        if let Some(max) = self.cfg.max_records {
            query.push(("maxRecords", max.to_string()));
        }
        if let Some(offset) = offset {
            query.push(("offset", offset.to_string()));
        }
        query
    }

    async fn list_page(&self, offset: Option<&str>) -> Result<ListResponse> {
        let url = self.table_url(None)?;
        tracing::debug!(%url, ?offset, "airtable list request");

        let resp = self
            .http
            .get(url)
            .bearer_auth(&self.cfg.api_key)
            .query(&self.list_query(offset))
            .send()
            .await
            .map_err(|e| Error::External(format!("airtable request error: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::External(format!("airtable response error: {e}")))?;
        if !status.is_success() {
            return Err(api_error("list", status, &body));
        }

        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl CandidateStore for AirtableStore {
    async fn pending_candidates(&self) -> Result<Vec<Candidate>> {
        let mut out = Vec::new();
        let mut offset: Option<String> = None;

        loop {
            let page = self.list_page(offset.as_deref()).await?;
            for rec in page.records {
                let id = rec.id.clone();
                match record_to_candidate(rec, &self.cfg.fields) {
                    Some(c) => out.push(c),
                    None => tracing::warn!(record = %id, "record without guid skipped"),
                }
            }

            match page.offset {
                Some(next) if !next.is_empty() => {
                    offset = Some(next);
                    tokio::time::sleep(self.cfg.request_delay).await;
                }
                _ => break,
            }
        }

        tracing::debug!(count = out.len(), "pending candidates fetched");
        Ok(out)
    }

    async fn update_flags(&self, record: &RecordId, flags: ModerationFlags) -> Result<()> {
        let url = self.table_url(Some(record))?;
        tracing::debug!(%url, ?flags, "airtable update request");

        let resp = self
            .http
            .patch(url)
            .bearer_auth(&self.cfg.api_key)
            .json(&update_body(&self.cfg.fields, flags))
            .send()
            .await
            .map_err(|e| Error::External(format!("airtable request error: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(api_error("update", status, &body));
        }
        Ok(())
    }
}

/// Rows nobody has looked at yet.
pub fn pending_formula(fields: &FieldNames) -> String {
    format!(
        "AND({{{}}} = 0, {{{}}} = 0, {{{}}} = 0)",
        fields.under_investigation, fields.approved, fields.rejected
    )
}

fn update_body(fields: &FieldNames, flags: ModerationFlags) -> Value {
    let mut map = Map::new();
    map.insert(fields.approved.clone(), Value::Bool(flags.approved));
    map.insert(fields.rejected.clone(), Value::Bool(flags.rejected));
    map.insert(
        fields.under_investigation.clone(),
        Value::Bool(flags.under_investigation),
    );
    json!({ "fields": map })
}

fn record_to_candidate(rec: RecordDto, names: &FieldNames) -> Option<Candidate> {
    let guid = rec
        .fields
        .get(&names.guid)
        .and_then(|v| v.as_str())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())?
        .to_string();
    let title = rec
        .fields
        .get(&names.title)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    // Checkbox columns are omitted by Airtable when unchecked.
    let flag = |name: &str| rec.fields.get(name).map(is_truthy).unwrap_or(false);
    let flags = ModerationFlags {
        approved: flag(names.approved.as_str()),
        rejected: flag(names.rejected.as_str()),
        under_investigation: flag(names.under_investigation.as_str()),
    };

    Some(Candidate {
        record_id: RecordId(rec.id),
        guid,
        title,
        flags,
    })
}

fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64().map(|n| n != 0).unwrap_or(false),
        Value::String(s) => matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "checked"
        ),
        _ => false,
    }
}

/// Airtable errors come as `{"error": {"type", "message"}}` or `{"error": "TYPE"}`.
fn api_error(op: &str, status: StatusCode, body: &str) -> Error {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| match v.get("error") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Object(o)) => o
                .get("message")
                .or_else(|| o.get("type"))
                .and_then(|m| m.as_str())
                .map(|s| s.to_string()),
            _ => None,
        })
        .unwrap_or_else(|| body.chars().take(200).collect());

    Error::External(format!("airtable {op} failed: {status} {detail}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn cfg() -> AirtableConfig {
        AirtableConfig {
            api_key: "pat".to_string(),
            base_id: "appBase".to_string(),
            table_name: "Posts Queue".to_string(),
            view: "view_1".to_string(),
            time_zone: "Europe/Moscow".to_string(),
            locale: "ru".to_string(),
            timeout: Duration::from_secs(5),
            request_delay: Duration::from_millis(0),
            max_records: None,
            fields: FieldNames::default(),
        }
    }

    fn record(v: Value) -> RecordDto {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn formula_filters_all_three_flags() {
        assert_eq!(
            pending_formula(&FieldNames::default()),
            "AND({ToInvistigate} = 0, {IsApproved} = 0, {IsRejected} = 0)"
        );
    }

    #[test]
    fn urls_encode_table_and_record() {
        let store = AirtableStore::new(cfg()).unwrap();
        assert_eq!(
            store.table_url(None).unwrap().as_str(),
            "https://api.airtable.com/v0/appBase/Posts%20Queue"
        );
        assert_eq!(
            store
                .table_url(Some(&RecordId("rec42".to_string())))
                .unwrap()
                .as_str(),
            "https://api.airtable.com/v0/appBase/Posts%20Queue/rec42"
        );

        let local = AirtableStore::new(cfg())
            .unwrap()
            .with_api_base("http://127.0.0.1:9999/v0/");
        assert_eq!(
            local.table_url(None).unwrap().as_str(),
            "http://127.0.0.1:9999/v0/appBase/Posts%20Queue"
        );
    }

    #[test]
    fn list_query_projects_title_and_guid() {
        let mut c = cfg();
        c.max_records = Some(300);
        let store = AirtableStore::new(c).unwrap();
        let q = store.list_query(Some("itr123/rec9"));

        let get = |k: &str| -> Vec<&str> {
            q.iter()
                .filter(|(key, _)| *key == k)
                .map(|(_, v)| v.as_str())
                .collect()
        };
        assert_eq!(get("fields[]"), vec!["Title", "guid"]);
        assert_eq!(get("view"), vec!["view_1"]);
        assert_eq!(get("cellFormat"), vec!["string"]);
        assert_eq!(get("timeZone"), vec!["Europe/Moscow"]);
        assert_eq!(get("userLocale"), vec!["ru"]);
        assert_eq!(get("maxRecords"), vec!["300"]);
        assert_eq!(get("offset"), vec!["itr123/rec9"]);
    }

    #[test]
    fn parses_list_page_and_drops_records_without_guid() {
        let page: ListResponse = serde_json::from_value(json!({
            "records": [
                { "id": "rec1", "createdTime": "2024-01-01T00:00:00.000Z",
                  "fields": { "Title": "First", "guid": "https://t.me/c/1" } },
                { "id": "rec2", "fields": { "Title": "No guid" } },
                { "id": "rec3", "fields": { "guid": "  " } }
            ],
            "offset": "itrNext"
        }))
        .unwrap();
        assert_eq!(page.offset.as_deref(), Some("itrNext"));

        let names = FieldNames::default();
        let out: Vec<Candidate> = page
            .records
            .into_iter()
            .filter_map(|r| record_to_candidate(r, &names))
            .collect();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].record_id, RecordId("rec1".to_string()));
        assert_eq!(out[0].title, "First");
        assert!(out[0].flags.is_pending());
    }

    #[test]
    fn reads_flags_in_json_and_string_cell_formats() {
        let names = FieldNames::default();
        let c = record_to_candidate(
            record(json!({ "id": "r", "fields": {
                "guid": "g", "IsApproved": true, "IsRejected": "checked", "ToInvistigate": 0
            }})),
            &names,
        )
        .unwrap();
        assert!(c.flags.approved);
        assert!(c.flags.rejected);
        assert!(!c.flags.under_investigation);
        assert_eq!(c.title, "");
    }

    #[test]
    fn update_body_writes_all_three_flags() {
        let body = update_body(&FieldNames::default(), ModerationFlags::REJECTED);
        assert_eq!(
            body,
            json!({ "fields": { "IsApproved": false, "IsRejected": true, "ToInvistigate": false } })
        );
    }

    #[test]
    fn api_error_extracts_message() {
        let err = api_error(
            "update",
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"error":{"type":"INVALID_VALUE_FOR_COLUMN","message":"Field \"IsApproved\" cannot accept the provided value"}}"#,
        );
        let msg = err.to_string();
        assert!(msg.contains("422"));
        assert!(msg.contains("cannot accept"));

        let err = api_error("list", StatusCode::NOT_FOUND, r#"{"error":"NOT_FOUND"}"#);
        assert!(err.to_string().ends_with("NOT_FOUND"));

        let err = api_error("list", StatusCode::BAD_GATEWAY, "<html>bad gateway</html>");
        assert!(err.to_string().contains("<html>"));
    }

    mod http {
        use super::*;
        use wiremock::matchers::{header, method, path, query_param};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        const TABLE_PATH: &str = "/v0/appBase/Posts";

        async fn store(server: &MockServer) -> AirtableStore {
            let mut c = cfg();
            c.table_name = "Posts".to_string();
            AirtableStore::new(c)
                .unwrap()
                .with_api_base(format!("{}/v0", server.uri()))
        }

        #[tokio::test]
        async fn follows_offset_across_pages_in_view_order() {
            let server = MockServer::start().await;

            Mock::given(method("GET"))
                .and(path(TABLE_PATH))
                .and(query_param("offset", "itrPage2"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "records": [
                        { "id": "rec3", "fields": { "Title": "Third", "guid": "g3" } }
                    ]
                })))
                .with_priority(1)
                .expect(1)
                .mount(&server)
                .await;

            Mock::given(method("GET"))
                .and(path(TABLE_PATH))
                .and(header("authorization", "Bearer pat"))
                .and(query_param("cellFormat", "string"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "records": [
                        { "id": "rec1", "fields": { "Title": "First", "guid": "g1" } },
                        { "id": "rec2", "fields": { "Title": "No guid" } }
                    ],
                    "offset": "itrPage2"
                })))
                .expect(1)
                .mount(&server)
                .await;

            let out = store(&server).await.pending_candidates().await.unwrap();
            let guids: Vec<&str> = out.iter().map(|c| c.guid.as_str()).collect();
            assert_eq!(guids, vec!["g1", "g3"]);
            assert_eq!(out[1].record_id, RecordId("rec3".to_string()));

            let requests = server.received_requests().await.unwrap();
            assert_eq!(requests.len(), 2);
            let offsets: Vec<Option<String>> = requests
                .iter()
                .map(|r| {
                    r.url
                        .query_pairs()
                        .find(|(k, _)| k == "offset")
                        .map(|(_, v)| v.into_owned())
                })
                .collect();
            assert_eq!(offsets, vec![None, Some("itrPage2".to_string())]);
        }

        #[tokio::test]
        async fn list_failure_carries_airtable_message() {
            let server = MockServer::start().await;

            Mock::given(method("GET"))
                .and(path(TABLE_PATH))
                .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                    "error": { "type": "AUTHENTICATION_REQUIRED", "message": "Authentication required" }
                })))
                .mount(&server)
                .await;

            let err = store(&server).await.pending_candidates().await.unwrap_err();
            let msg = err.to_string();
            assert!(matches!(err, Error::External(_)));
            assert!(msg.contains("401"), "{msg}");
            assert!(msg.contains("Authentication required"), "{msg}");
        }

        #[tokio::test]
        async fn update_patches_the_record() {
            let server = MockServer::start().await;

            Mock::given(method("PATCH"))
                .and(path(format!("{TABLE_PATH}/rec7")))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "id": "rec7", "fields": {}
                })))
                .expect(1)
                .mount(&server)
                .await;

            store(&server)
                .await
                .update_flags(&RecordId("rec7".to_string()), ModerationFlags::APPROVED)
                .await
                .unwrap();

            let requests = server.received_requests().await.unwrap();
            let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
            assert_eq!(
                body,
                json!({ "fields": { "IsApproved": true, "IsRejected": false, "ToInvistigate": false } })
            );
        }
    }
}
