//! etcd v3 adapter
//!
//! Talks to etcd through its gRPC JSON gateway (`POST /v3/kv/range` and
//! friends), which every etcd >= 3.4 serves on the client port. Keys and
//! values travel base64-encoded; 64-bit integers arrive as JSON strings and
//! zero-valued fields are omitted entirely.
//!
//! Endpoints are tried in order: a transport failure (refused connection,
//! timeout, TLS handshake) moves on to the next one, an HTTP error response
//! from a reachable member is returned as is.

use crate::traits::KvStore;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use keytree_common::config::{StoreConfig, TlsConfig};
use keytree_common::{Error, LeaseId, Record, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Path prefix of the JSON gateway
const API_PREFIX: &str = "/v3";

/// Serde helper for proto3 JSON int64 (string or number)
mod int64 {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(i64),
        Text(String),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Ok(n),
            Repr::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

#[derive(Debug, Serialize)]
struct RangeRequest {
    key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    range_end: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sort_order: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sort_target: Option<&'static str>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RangeResponse {
    kvs: Vec<KeyValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct KeyValue {
    key: String,
    value: String,
    #[serde(deserialize_with = "int64::deserialize")]
    create_revision: i64,
    #[serde(deserialize_with = "int64::deserialize")]
    mod_revision: i64,
    #[serde(deserialize_with = "int64::deserialize")]
    version: i64,
    #[serde(deserialize_with = "int64::deserialize")]
    lease: i64,
}

#[derive(Debug, Serialize)]
struct PutRequest {
    key: String,
    value: String,
    lease: LeaseId,
}

#[derive(Debug, Serialize)]
struct DeleteRangeRequest {
    key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    range_end: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DeleteRangeResponse {
    #[serde(deserialize_with = "int64::deserialize")]
    deleted: i64,
}

#[derive(Debug, Serialize)]
struct LeaseGrantRequest {
    #[serde(rename = "TTL")]
    ttl: i64,
    #[serde(rename = "ID")]
    id: LeaseId,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LeaseGrantResponse {
    #[serde(rename = "ID", deserialize_with = "int64::deserialize")]
    id: LeaseId,
    error: String,
}

#[derive(Debug, Serialize)]
struct LeaseTimeToLiveRequest {
    #[serde(rename = "ID")]
    id: LeaseId,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LeaseTimeToLiveResponse {
    #[serde(rename = "TTL", deserialize_with = "int64::deserialize")]
    ttl: i64,
}

/// Responses whose body keytree does not need
#[derive(Debug, Default, Deserialize)]
struct Ack {}

/// Exclusive end of the range covering every key with `prefix`.
///
/// Increments the last byte that is not `0xff` and truncates after it; a
/// prefix made only of `0xff` bytes (or an empty one) ranges to the end of
/// the keyspace, spelled `"\0"`.
#[must_use]
pub fn prefix_range_end(prefix: &[u8]) -> Vec<u8> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < 0xff {
            end.push(last + 1);
            return end;
        }
    }
    vec![0]
}

fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

fn decode_bytes(field: &str, encoded: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(encoded)
        .map_err(|e| Error::Serialization(format!("invalid base64 in {field}: {e}")))
}

/// Keys must be valid UTF-8: a lossy decode could merge distinct keys
fn decode_key(encoded: &str) -> Result<String> {
    let bytes = decode_bytes("key", encoded)?;
    String::from_utf8(bytes).map_err(|e| {
        let lossy = String::from_utf8_lossy(e.as_bytes()).into_owned();
        Error::malformed_key(lossy, "key is not valid UTF-8")
    })
}

fn decode_value(encoded: &str) -> Result<String> {
    let bytes = decode_bytes("value", encoded)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

impl KeyValue {
    fn into_record(self) -> Result<Record> {
        Ok(Record {
            key: decode_key(&self.key)?,
            value: decode_value(&self.value)?,
            lease: self.lease,
            create_revision: self.create_revision,
            mod_revision: self.mod_revision,
            version: self.version,
        })
    }
}

/// [`KvStore`] backed by an etcd v3 cluster
pub struct EtcdStore {
    endpoints: Vec<String>,
    base_urls: Vec<String>,
    http_client: reqwest::Client,
    closed: AtomicBool,
}

impl EtcdStore {
    /// Build a client for the configured endpoints.
    ///
    /// No request is made here; an unreachable cluster shows up on first use.
    pub fn connect(config: &StoreConfig) -> Result<Self> {
        if config.endpoints.is_empty() {
            return Err(Error::configuration("no etcd endpoints configured"));
        }

        let mut builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.dial_timeout_ms))
            .timeout(Duration::from_millis(config.request_timeout_ms));
        if let Some(tls) = &config.tls {
            builder = apply_tls(builder, tls)?;
        }
        let http_client = builder
            .build()
            .map_err(|e| Error::configuration(e.to_string()))?;

        let scheme = if config.uses_tls() { "https" } else { "http" };
        let base_urls = config
            .endpoints
            .iter()
            .map(|ep| {
                if ep.starts_with("http://") || ep.starts_with("https://") {
                    ep.trim_end_matches('/').to_string()
                } else {
                    format!("{scheme}://{ep}")
                }
            })
            .collect();

        Ok(Self {
            endpoints: config.endpoints.clone(),
            base_urls,
            http_client,
            closed: AtomicBool::new(false),
        })
    }

    /// POST `body` to `path` on the first reachable endpoint
    async fn call<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::NotConnected);
        }
        let mut last_error = Error::transport("no etcd endpoints configured");

        for base in &self.base_urls {
            let url = format!("{base}{API_PREFIX}{path}");
            let response = match self.http_client.post(&url).json(body).send().await {
                Ok(response) => response,
                Err(e) => {
                    warn!("etcd endpoint {} failed: {}", base, e);
                    last_error = if e.is_timeout() {
                        Error::Timeout
                    } else {
                        Error::transport(e.to_string())
                    };
                    continue;
                }
            };

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(Error::transport(format!(
                    "etcd returned status {status}: {body}"
                )));
            }

            return response.json().await.map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout
                } else {
                    Error::Serialization(format!("invalid etcd response from {path}: {e}"))
                }
            });
        }

        Err(last_error)
    }

    async fn range_request(&self, request: RangeRequest) -> Result<Vec<Record>> {
        let response: RangeResponse = self.call("/kv/range", &request).await?;
        response
            .kvs
            .into_iter()
            .map(KeyValue::into_record)
            .collect()
    }
}

fn apply_tls(
    mut builder: reqwest::ClientBuilder,
    tls: &TlsConfig,
) -> Result<reqwest::ClientBuilder> {
    builder = builder.use_rustls_tls();

    if let Some(ca_path) = &tls.ca_cert {
        let pem = std::fs::read(ca_path)
            .map_err(|e| Error::Tls(format!("reading {}: {e}", ca_path.display())))?;
        let certs = reqwest::Certificate::from_pem_bundle(&pem)
            .map_err(|e| Error::Tls(format!("parsing {}: {e}", ca_path.display())))?;
        for cert in certs {
            builder = builder.add_root_certificate(cert);
        }
    }

    if let (Some(cert_path), Some(key_path)) = (&tls.cert, &tls.key) {
        let mut pem = std::fs::read(cert_path)
            .map_err(|e| Error::Tls(format!("reading {}: {e}", cert_path.display())))?;
        pem.push(b'\n');
        pem.extend(
            std::fs::read(key_path)
                .map_err(|e| Error::Tls(format!("reading {}: {e}", key_path.display())))?,
        );
        let identity =
            reqwest::Identity::from_pem(&pem).map_err(|e| Error::Tls(e.to_string()))?;
        builder = builder.identity(identity);
    }

    if tls.insecure_skip_verify {
        builder = builder.danger_accept_invalid_certs(true);
    }
    Ok(builder)
}

#[async_trait]
impl KvStore for EtcdStore {
    fn name(&self) -> &str {
        "etcd"
    }

    fn endpoints(&self) -> Vec<String> {
        self.endpoints.clone()
    }

    async fn get(&self, key: &str) -> Result<Option<Record>> {
        let records = self
            .range_request(RangeRequest {
                key: encode(key.as_bytes()),
                range_end: None,
                sort_order: None,
                sort_target: None,
            })
            .await?;
        Ok(records.into_iter().next())
    }

    async fn range(&self, prefix: &str) -> Result<Vec<Record>> {
        self.range_request(RangeRequest {
            key: encode(prefix.as_bytes()),
            range_end: Some(encode(&prefix_range_end(prefix.as_bytes()))),
            sort_order: Some("ASCEND"),
            sort_target: Some("KEY"),
        })
        .await
    }

    async fn put(&self, key: &str, value: &str, lease: LeaseId) -> Result<()> {
        let _: Ack = self
            .call(
                "/kv/put",
                &PutRequest {
                    key: encode(key.as_bytes()),
                    value: encode(value.as_bytes()),
                    lease,
                },
            )
            .await?;
        Ok(())
    }

    async fn grant_lease(&self, ttl_secs: i64) -> Result<LeaseId> {
        let response: LeaseGrantResponse = self
            .call("/lease/grant", &LeaseGrantRequest { ttl: ttl_secs, id: 0 })
            .await?;
        if !response.error.is_empty() {
            return Err(Error::invalid_argument(response.error));
        }
        Ok(response.id)
    }

    async fn delete(&self, key: &str) -> Result<u64> {
        let response: DeleteRangeResponse = self
            .call(
                "/kv/deleterange",
                &DeleteRangeRequest {
                    key: encode(key.as_bytes()),
                    range_end: None,
                },
            )
            .await?;
        Ok(u64::try_from(response.deleted).unwrap_or(0))
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64> {
        let response: DeleteRangeResponse = self
            .call(
                "/kv/deleterange",
                &DeleteRangeRequest {
                    key: encode(prefix.as_bytes()),
                    range_end: Some(encode(&prefix_range_end(prefix.as_bytes()))),
                },
            )
            .await?;
        Ok(u64::try_from(response.deleted).unwrap_or(0))
    }

    async fn lease_time_to_live(&self, lease: LeaseId) -> Result<i64> {
        let response: LeaseTimeToLiveResponse = self
            .call("/lease/timetolive", &LeaseTimeToLiveRequest { id: lease })
            .await?;
        Ok(response.ttl)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        debug!("Closing etcd client for {:?}", self.endpoints);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keytree_common::config::StoreConfig;

    #[test]
    fn test_prefix_range_end() {
        assert_eq!(prefix_range_end(b"/foo/"), b"/foo0".to_vec());
        assert_eq!(prefix_range_end(b"a\xff"), b"b".to_vec());
        assert_eq!(prefix_range_end(b"\xff\xff"), vec![0]);
        assert_eq!(prefix_range_end(b""), vec![0]);
    }

    #[test]
    fn test_decode_range_response() {
        // Shape produced by the etcd gateway: int64 as strings, zero fields omitted
        let body = r#"{
            "header": {"cluster_id": "14841639068965178418", "revision": "12"},
            "kvs": [
                {"key": "L2Zvby9h", "create_revision": "5", "mod_revision": "9",
                 "version": "2", "value": "MQ==", "lease": "7587862039428870165"},
                {"key": "L2Zvby9i", "create_revision": 6, "mod_revision": 6, "version": 1}
            ],
            "count": "2"
        }"#;
        let response: RangeResponse = serde_json::from_str(body).unwrap();
        let records: Vec<Record> = response
            .kvs
            .into_iter()
            .map(KeyValue::into_record)
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(records[0].key, "/foo/a");
        assert_eq!(records[0].value, "1");
        assert_eq!(records[0].lease, 7_587_862_039_428_870_165);
        assert_eq!(records[0].create_revision, 5);
        assert_eq!(records[0].mod_revision, 9);
        assert_eq!(records[1].key, "/foo/b");
        assert_eq!(records[1].value, "");
        assert_eq!(records[1].lease, 0);
    }

    #[test]
    fn test_decode_empty_range_response() {
        let response: RangeResponse =
            serde_json::from_str(r#"{"header": {"revision": "3"}}"#).unwrap();
        assert!(response.kvs.is_empty());
    }

    #[test]
    fn test_decode_lease_responses() {
        let grant: LeaseGrantResponse =
            serde_json::from_str(r#"{"ID": "7587862039428870165", "TTL": "60"}"#).unwrap();
        assert_eq!(grant.id, 7_587_862_039_428_870_165);
        assert!(grant.error.is_empty());

        let ttl: LeaseTimeToLiveResponse =
            serde_json::from_str(r#"{"ID": "1", "TTL": "-1"}"#).unwrap();
        assert_eq!(ttl.ttl, -1);
    }

    #[test]
    fn test_request_encoding() {
        let request = RangeRequest {
            key: encode(b"/foo/"),
            range_end: Some(encode(&prefix_range_end(b"/foo/"))),
            sort_order: Some("ASCEND"),
            sort_target: Some("KEY"),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["key"], "L2Zvby8=");
        assert_eq!(json["range_end"], "L2ZvbzA=");
        assert_eq!(json["sort_order"], "ASCEND");

        let exact = serde_json::to_value(RangeRequest {
            key: encode(b"/foo"),
            range_end: None,
            sort_order: None,
            sort_target: None,
        })
        .unwrap();
        assert!(exact.get("range_end").is_none());

        let grant = serde_json::to_value(LeaseGrantRequest { ttl: 30, id: 0 }).unwrap();
        assert_eq!(grant["TTL"], 30);
    }

    #[test]
    fn test_connect_builds_urls() {
        let config = StoreConfig::default()
            .with_endpoints(vec!["10.0.0.1:2379".into(), "https://etcd.local:2379/".into()]);
        let store = EtcdStore::connect(&config).unwrap();
        assert_eq!(
            store.base_urls,
            vec!["http://10.0.0.1:2379", "https://etcd.local:2379"]
        );
        assert_eq!(store.endpoints().len(), 2);
    }

    #[test]
    fn test_connect_requires_endpoints() {
        let config = StoreConfig::default().with_endpoints(Vec::new());
        assert!(EtcdStore::connect(&config).is_err());
    }

    #[test]
    fn test_non_utf8_keys_are_rejected() {
        // "/foo/\xff" and "/foo/\xfe" would both decode lossily to "/foo/\u{fffd}"
        for encoded in ["L2Zvby//", "L2Zvby/+"] {
            let kv = KeyValue {
                key: encoded.to_string(),
                value: "MQ==".to_string(),
                ..KeyValue::default()
            };
            let err = kv.into_record().unwrap_err();
            assert!(matches!(err, Error::MalformedKey { .. }), "unexpected error: {err}");
        }
    }

    #[test]
    fn test_non_utf8_values_are_decoded_lossily() {
        let kv = KeyValue {
            key: encode(b"/foo/a"),
            value: encode(b"ok\xff"),
            ..KeyValue::default()
        };
        let record = kv.into_record().unwrap();
        assert_eq!(record.key, "/foo/a");
        assert_eq!(record.value, "ok\u{fffd}");
    }

    #[tokio::test]
    async fn test_closed_store_rejects_requests() {
        let config = StoreConfig::default().with_endpoints(vec!["127.0.0.1:1".into()]);
        let store = EtcdStore::connect(&config).unwrap();

        store.close().await;
        assert!(matches!(store.get("/foo").await, Err(Error::NotConnected)));
        assert!(matches!(store.range("/foo/").await, Err(Error::NotConnected)));
        assert!(matches!(store.put("/foo", "v", 0).await, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let mut config = StoreConfig::default().with_endpoints(vec!["127.0.0.1:1".into()]);
        config.dial_timeout_ms = 200;
        config.request_timeout_ms = 500;
        let store = EtcdStore::connect(&config).unwrap();

        let err = store.get("/foo").await.unwrap_err();
        assert!(err.is_retryable(), "unexpected error: {err}");
    }
}
