use crate::{
    Error,
    Result,
    types::{
        Address,
        Mist,
        ObjectId,
    },
};
use base64::{
    Engine,
    engine::general_purpose::STANDARD as BASE64,
};
use serde::{
    Deserialize,
    Deserializer,
    de::DeserializeOwned,
};
use serde_json::{
    Value,
    json,
};
use std::{
    fmt,
    future::Future,
    sync::atomic::{
        AtomicU64,
        Ordering,
    },
    time::Duration,
};

pub mod ptb;

pub use ptb::{
    ReturnValue,
    TransactionKind,
};

const SUI_COIN_TYPE: &str = "0x2::sui::SUI";

/// Object data as returned by the chain's read API.
#[derive(Clone, Debug, PartialEq)]
pub struct SuiObject {
    pub object_id: ObjectId,
    pub version: u64,
    pub owner: Option<Owner>,
    pub content: Option<ObjectContent>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ObjectContent {
    MoveObject { type_: String, fields: Value },
    Package,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Owner {
    AddressOwner(Address),
    ObjectOwner(Address),
    Shared { initial_shared_version: u64 },
    Immutable,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SuiEvent {
    pub type_: String,
    pub sender: Option<Address>,
    pub parsed_json: Value,
    pub timestamp_ms: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventQuery {
    pub package: ObjectId,
    pub module: String,
    pub limit: usize,
    pub descending: bool,
}

/// Read-only surface of the chain indexing service.
pub trait SuiRpc: Send + Sync + 'static {
    /// `Ok(None)` when the object does not exist or was deleted.
    fn get_object(
        &self,
        id: &ObjectId,
    ) -> impl Future<Output = Result<Option<SuiObject>>> + Send;

    /// Simulates `tx` as `sender` and returns the first command's return values.
    fn dev_inspect(
        &self,
        sender: &Address,
        tx: &TransactionKind,
    ) -> impl Future<Output = Result<Vec<ReturnValue>>> + Send;

    fn query_events(
        &self,
        query: &EventQuery,
    ) -> impl Future<Output = Result<Vec<SuiEvent>>> + Send;

    fn get_balance(&self, owner: &Address) -> impl Future<Output = Result<Mist>> + Send;
}

/// JSON-RPC 2.0 client for a Sui fullnode.
pub struct HttpSuiRpc {
    url: String,
    http: reqwest::Client,
    next_id: AtomicU64,
}

impl HttpSuiRpc {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let url = url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            url,
            http,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        tracing::debug!(method, url = %self.url, "rpc request");
        let res = self.http.post(&self.url).json(&body).send().await?;
        let status = res.status();
        let bytes = res.bytes().await?;
        if !status.is_success() {
            let body = String::from_utf8_lossy(&bytes);
            return Err(Error::Network(format!(
                "node responded with {status} to {method}: {body}"
            )));
        }
        let envelope: RpcResponseDto<T> = serde_json::from_slice(&bytes)
            .map_err(|e| Error::Network(format!("invalid {method} response: {e}")))?;
        match (envelope.result, envelope.error) {
            (_, Some(err)) => Err(Error::Network(format!(
                "{method} failed with code {}: {}",
                err.code, err.message
            ))),
            (Some(result), None) => Ok(result),
            (None, None) => Err(Error::Network(format!("{method} returned no result"))),
        }
    }
}

impl SuiRpc for HttpSuiRpc {
    async fn get_object(&self, id: &ObjectId) -> Result<Option<SuiObject>> {
        let params = json!([
            id.to_string(),
            { "showContent": true, "showType": true, "showOwner": true }
        ]);
        let dto: ObjectResponseDto = self.call("sui_getObject", params).await?;
        if let Some(err) = dto.error {
            tracing::debug!(%id, ?err, "object lookup returned an error");
            return Ok(None);
        }
        dto.data.map(SuiObject::try_from).transpose()
    }

    async fn dev_inspect(
        &self,
        sender: &Address,
        tx: &TransactionKind,
    ) -> Result<Vec<ReturnValue>> {
        let tx_bytes = BASE64.encode(tx.to_bcs()?);
        let params = json!([sender.to_string(), tx_bytes, Value::Null, Value::Null]);
        let dto: DevInspectDto = self.call("sui_devInspectTransactionBlock", params).await?;
        if let Some(err) = dto.error {
            return Err(Error::Network(format!(
                "simulated call to {} failed: {err}",
                tx.function()
            )));
        }
        let first = dto
            .results
            .unwrap_or_default()
            .into_iter()
            .next()
            .ok_or_else(|| {
                Error::invalid(tx.function(), "simulated call produced no results")
            })?;
        Ok(first
            .return_values
            .into_iter()
            .map(|(bytes, type_tag)| ReturnValue::new(bytes, type_tag))
            .collect())
    }

    async fn query_events(&self, query: &EventQuery) -> Result<Vec<SuiEvent>> {
        let filter = json!({
            "MoveModule": {
                "package": query.package.to_string(),
                "module": query.module,
            }
        });
        let params = json!([filter, Value::Null, query.limit, query.descending]);
        let page: EventPageDto = self.call("suix_queryEvents", params).await?;
        Ok(page.data.into_iter().map(Into::into).collect())
    }

    async fn get_balance(&self, owner: &Address) -> Result<Mist> {
        let params = json!([owner.to_string(), SUI_COIN_TYPE]);
        let dto: BalanceDto = self.call("suix_getBalance", params).await?;
        Ok(Mist(dto.total_balance))
    }
}

impl fmt::Display for HttpSuiRpc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// Reads an integer the node may render either as a number or a string.
pub(crate) fn value_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

pub(crate) fn de_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    value_as_u64(&value)
        .ok_or_else(|| serde::de::Error::custom(format!("expected integer, got {value}")))
}

fn de_opt_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_as_u64))
}

fn parse_owner(value: &Value) -> Option<Owner> {
    match value {
        Value::String(s) if s == "Immutable" => Some(Owner::Immutable),
        Value::Object(map) => {
            if let Some(shared) = map.get("Shared") {
                let version = shared.get("initial_shared_version").and_then(value_as_u64)?;
                return Some(Owner::Shared {
                    initial_shared_version: version,
                });
            }
            if let Some(addr) = map.get("AddressOwner").and_then(Value::as_str) {
                return addr.parse().ok().map(Owner::AddressOwner);
            }
            if let Some(addr) = map.get("ObjectOwner").and_then(Value::as_str) {
                return addr.parse().ok().map(Owner::ObjectOwner);
            }
            None
        }
        _ => None,
    }
}

#[derive(Deserialize)]
struct RpcResponseDto<T> {
    result: Option<T>,
    error: Option<RpcErrorDto>,
}

#[derive(Deserialize)]
struct RpcErrorDto {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct ObjectResponseDto {
    data: Option<ObjectDataDto>,
    error: Option<Value>,
}

#[derive(Deserialize)]
struct ObjectDataDto {
    #[serde(rename = "objectId")]
    object_id: Address,
    #[serde(deserialize_with = "de_u64")]
    version: u64,
    #[serde(default)]
    owner: Option<Value>,
    #[serde(default)]
    content: Option<ContentDto>,
}

#[derive(Deserialize)]
#[serde(tag = "dataType")]
enum ContentDto {
    #[serde(rename = "moveObject")]
    MoveObject {
        #[serde(rename = "type")]
        type_: String,
        fields: Value,
    },
    #[serde(rename = "package")]
    Package {},
}

impl TryFrom<ObjectDataDto> for SuiObject {
    type Error = Error;

    fn try_from(dto: ObjectDataDto) -> Result<Self> {
        let owner = match dto.owner {
            Some(raw) => {
                let parsed = parse_owner(&raw);
                if parsed.is_none() {
                    tracing::warn!(id = %dto.object_id, %raw, "unrecognised owner shape");
                }
                parsed
            }
            None => None,
        };
        let content = dto.content.map(|content| match content {
            ContentDto::MoveObject { type_, fields } => {
                ObjectContent::MoveObject { type_, fields }
            }
            ContentDto::Package {} => ObjectContent::Package,
        });
        Ok(SuiObject {
            object_id: dto.object_id,
            version: dto.version,
            owner,
            content,
        })
    }
}

#[derive(Deserialize)]
struct DevInspectDto {
    #[serde(default)]
    results: Option<Vec<ExecutionResultDto>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct ExecutionResultDto {
    #[serde(rename = "returnValues", default)]
    return_values: Vec<(Vec<u8>, String)>,
}

#[derive(Deserialize)]
struct EventPageDto {
    data: Vec<EventDto>,
}

#[derive(Deserialize)]
struct EventDto {
    #[serde(rename = "type")]
    type_: String,
    #[serde(default)]
    sender: Option<Address>,
    #[serde(rename = "parsedJson", default)]
    parsed_json: Value,
    #[serde(rename = "timestampMs", default, deserialize_with = "de_opt_u64")]
    timestamp_ms: Option<u64>,
}

impl From<EventDto> for SuiEvent {
    fn from(dto: EventDto) -> Self {
        SuiEvent {
            type_: dto.type_,
            sender: dto.sender,
            parsed_json: dto.parsed_json,
            timestamp_ms: dto.timestamp_ms,
        }
    }
}

#[derive(Deserialize)]
struct BalanceDto {
    #[serde(rename = "totalBalance", deserialize_with = "de_u64")]
    total_balance: u64,
}
