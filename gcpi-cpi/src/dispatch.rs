//! JSON action dispatch.
//!
//! One request names a method and its positional arguments; the response
//! carries either a result or a typed error.

use std::collections::BTreeMap;

use gcpi_compute::{CpiError, DesiredNetworkConfig, NetworkEngine, Networks};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

const CLOUD_ERROR: &str = "Bosh::Clouds::CloudError";
const NOT_SUPPORTED: &str = "Bosh::Clouds::NotSupported";
const NOT_IMPLEMENTED: &str = "Bosh::Clouds::NotImplemented";

#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    pub method: String,
    #[serde(default)]
    pub arguments: Vec<Value>,
    #[serde(default)]
    pub context: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub result: Value,
    pub error: Option<ResponseError>,
    pub log: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseError {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub ok_to_retry: bool,
}

impl Response {
    pub fn ok(result: Value) -> Self {
        Self {
            result,
            error: None,
            log: String::new(),
        }
    }

    pub fn failure(err: &ActionError) -> Self {
        Self {
            result: Value::Null,
            error: Some(ResponseError {
                kind: err.kind().to_string(),
                message: err.to_string(),
                ok_to_retry: err.ok_to_retry(),
            }),
            log: String::new(),
        }
    }
}

/// Errors produced while handling one request.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("method '{0}' is not implemented")]
    NotImplemented(String),

    #[error("invalid arguments for '{method}': {reason}")]
    InvalidArguments { method: String, reason: String },

    #[error(transparent)]
    Cpi(#[from] CpiError),
}

impl ActionError {
    fn kind(&self) -> &'static str {
        match self {
            ActionError::NotImplemented(_) => NOT_IMPLEMENTED,
            ActionError::Cpi(e) if e.is_recreate_required() => NOT_SUPPORTED,
            _ => CLOUD_ERROR,
        }
    }

    fn ok_to_retry(&self) -> bool {
        match self {
            ActionError::Cpi(e) => e.ok_to_retry(),
            _ => false,
        }
    }
}

pub struct Dispatcher {
    engine: NetworkEngine,
}

impl Dispatcher {
    pub fn new(engine: NetworkEngine) -> Self {
        Self { engine }
    }

    pub async fn dispatch(&self, request: Request) -> Response {
        let director = request
            .context
            .get("director_uuid")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let span = info_span!(
            "request",
            id = %Uuid::new_v4(),
            method = %request.method,
            director = %director
        );
        async {
            info!("Handling request");
            match self.call(&request).await {
                Ok(result) => Response::ok(result),
                Err(e) => {
                    error!("Request failed: {}", e);
                    Response::failure(&e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn call(&self, request: &Request) -> Result<Value, ActionError> {
        let method = request.method.as_str();
        match method {
            "configure_networks" => {
                let (vm_cid, networks): (String, Networks) = arguments(method, &request.arguments)?;
                let desired = DesiredNetworkConfig::from_networks(&networks)?;
                self.engine.configure_networks(&vm_cid, &desired).await?;
                Ok(Value::Null)
            }
            "update_networks" => {
                let (vm_cid, networks): (String, Networks) = arguments(method, &request.arguments)?;
                let desired = DesiredNetworkConfig::from_networks(&networks)?;
                self.engine.update_networks(&vm_cid, &desired).await?;
                Ok(Value::Null)
            }
            "set_vm_metadata" => {
                let (vm_cid, metadata): (String, BTreeMap<String, Value>) =
                    arguments(method, &request.arguments)?;
                self.engine
                    .set_metadata(&vm_cid, &metadata_strings(metadata))
                    .await?;
                Ok(Value::Null)
            }
            other => Err(ActionError::NotImplemented(other.to_string())),
        }
    }
}

/// Decodes positional arguments into a tuple.
fn arguments<T: DeserializeOwned>(method: &str, args: &[Value]) -> Result<T, ActionError> {
    serde_json::from_value(Value::Array(args.to_vec())).map_err(|e| ActionError::InvalidArguments {
        method: method.to_string(),
        reason: e.to_string(),
    })
}

/// Metadata values are stored as strings; non-string JSON keeps its JSON text.
fn metadata_strings(metadata: BTreeMap<String, Value>) -> BTreeMap<String, String> {
    metadata
        .into_iter()
        .map(|(key, value)| match value {
            Value::String(s) => (key, s),
            other => (key, other.to_string()),
        })
        .collect()
}
