// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, bail};
use fleetdesk_app::{BodyShape, Collection, CollectionEndpoint, Envelope, RemoteError};
use reqwest::StatusCode;
use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignIn {
    pub jwt: String,
    pub username: String,
}

#[derive(Debug, Clone)]
pub struct Client {
    base_url: String,
    base: Url,
    timeout: Duration,
    http: HttpClient,
}

impl Client {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_owned();
        if base_url.is_empty() {
            bail!("api.base_url must not be empty -- set it in the config file");
        }
        let base = Url::parse(&base_url)
            .with_context(|| format!("api.base_url {base_url:?} is not a valid URL"))?;
        if !matches!(base.scheme(), "http" | "https") {
            bail!(
                "api.base_url must use http or https, got {:?}",
                base.scheme()
            );
        }
        if timeout.is_zero() {
            bail!("api.timeout must be positive");
        }

        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;

        Ok(Self {
            base_url,
            base,
            timeout,
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn sign_in(&self, identifier: &str, password: &str) -> Result<SignIn> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            bail!("sign-in identifier is required -- pass a username or email");
        }
        if password.is_empty() {
            bail!("password is required -- set FLEETDESK_PASSWORD and retry");
        }

        let url = self.endpoint_url(&["auth", "local"]);
        let request = self.http.post(url.as_str()).json(&SignInRequest {
            identifier,
            password,
        });
        let response = self.send("POST", url.path(), request)?;
        let parsed: SignInResponse = response.json().context("decode sign-in response")?;
        if parsed.jwt.trim().is_empty() {
            bail!("server returned an empty token -- check the account and retry");
        }

        let username = parsed
            .user
            .and_then(|user| user.username.or(user.email))
            .unwrap_or_else(|| identifier.to_owned());
        info!(username = %username, "signed in");
        Ok(SignIn {
            jwt: parsed.jwt,
            username,
        })
    }

    fn endpoint_url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn collection_url(&self, collection: Collection, key: Option<&str>) -> Url {
        let mut segments = collection.path().split('/').collect::<Vec<_>>();
        segments.extend(key);
        self.endpoint_url(&segments)
    }

    fn send(
        &self,
        method: &'static str,
        path: &str,
        request: RequestBuilder,
    ) -> Result<Response, RemoteError> {
        let response = request
            .send()
            .map_err(|error| connection_error(&self.base_url, error))?;
        let status = response.status();
        debug!(method, path, status = status.as_u16(), "api request");

        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(clean_error_response(status, &body));
        }
        Ok(response)
    }
}

impl CollectionEndpoint for Client {
    fn list(&self, collection: Collection, token: &str) -> Result<Vec<Value>, RemoteError> {
        let url = self.collection_url(collection, None);
        let request = self.http.get(url.as_str()).bearer_auth(token);
        let response = self.send("GET", url.path(), request)?;
        decode_list(collection, read_json(response, collection.path())?)
    }

    fn get(&self, collection: Collection, key: &str, token: &str) -> Result<Value, RemoteError> {
        let url = self.collection_url(collection, Some(key));
        let request = self.http.get(url.as_str()).bearer_auth(token);
        let response = self.send("GET", url.path(), request)?;
        Ok(unwrap_record(read_json(response, collection.path())?))
    }

    fn create(
        &self,
        collection: Collection,
        record: &Map<String, Value>,
        token: &str,
    ) -> Result<Value, RemoteError> {
        let url = self.collection_url(collection, None);
        let request = self
            .http
            .post(url.as_str())
            .bearer_auth(token)
            .json(&write_body(collection, record));
        let response = self.send("POST", url.path(), request)?;
        Ok(unwrap_record(read_json(response, collection.path())?))
    }

    fn update(
        &self,
        collection: Collection,
        key: &str,
        record: &Map<String, Value>,
        token: &str,
    ) -> Result<Value, RemoteError> {
        let url = self.collection_url(collection, Some(key));
        let request = self
            .http
            .put(url.as_str())
            .bearer_auth(token)
            .json(&write_body(collection, record));
        let response = self.send("PUT", url.path(), request)?;
        Ok(unwrap_record(read_json(response, collection.path())?))
    }

    fn delete(&self, collection: Collection, key: &str, token: &str) -> Result<(), RemoteError> {
        let url = self.collection_url(collection, Some(key));
        let request = self.http.delete(url.as_str()).bearer_auth(token);
        self.send("DELETE", url.path(), request)?;
        Ok(())
    }
}

// Every known envelope is accepted, whatever the collection.
pub fn decode_list(collection: Collection, body: Value) -> Result<Vec<Value>, RemoteError> {
    let expected = match collection.envelope() {
        Envelope::Data => Some("data"),
        Envelope::Keyed(key) => Some(key),
        Envelope::Bare => None,
    };
    match body {
        Value::Array(records) => Ok(records),
        Value::Object(mut object) => {
            for key in expected.into_iter().chain(["data", "roles", "results"]) {
                if let Some(Value::Array(records)) = object.remove(key) {
                    return Ok(records);
                }
            }
            Err(RemoteError::Decode {
                context: collection.path().to_owned(),
                message: "response has no record list".to_owned(),
            })
        }
        other => Err(RemoteError::Decode {
            context: collection.path().to_owned(),
            message: format!("expected a list, got {}", json_kind(&other)),
        }),
    }
}

pub fn unwrap_record(body: Value) -> Value {
    match body {
        Value::Object(mut object) if matches!(object.get("data"), Some(Value::Object(_))) => {
            object.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn write_body(collection: Collection, record: &Map<String, Value>) -> Value {
    match collection.body_shape() {
        BodyShape::Wrapped => serde_json::json!({ "data": record }),
        BodyShape::Raw => Value::Object(record.clone()),
    }
}

fn read_json(response: Response, context: &str) -> Result<Value, RemoteError> {
    let text = response.text().map_err(|error| RemoteError::Decode {
        context: context.to_owned(),
        message: error.to_string(),
    })?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text).map_err(|error| RemoteError::Decode {
        context: context.to_owned(),
        message: error.to_string(),
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn connection_error(base_url: &str, error: reqwest::Error) -> RemoteError {
    RemoteError::Unreachable {
        url: base_url.to_owned(),
        message: error.to_string(),
    }
}

fn clean_error_response(status: StatusCode, body: &str) -> RemoteError {
    let message = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope {
            error: Some(ErrorDetail { message: Some(message) }),
            ..
        }) if !message.trim().is_empty() => message,
        Ok(ErrorEnvelope {
            message: Some(message),
            ..
        }) if !message.trim().is_empty() => message,
        _ if !body.trim().is_empty() && body.len() < 100 && !body.contains('{') => {
            body.trim().to_owned()
        }
        _ => format!("server returned {}", status.as_u16()),
    };
    RemoteError::Status {
        status: status.as_u16(),
        message,
    }
}

#[derive(Debug, Serialize)]
struct SignInRequest<'a> {
    identifier: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct SignInResponse {
    jwt: String,
    user: Option<SignInUser>,
}

#[derive(Debug, Deserialize)]
struct SignInUser {
    username: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorDetail>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: Option<String>,
}
