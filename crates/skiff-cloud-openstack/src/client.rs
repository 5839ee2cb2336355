//! Nova compute API client
//!
//! Thin typed wrapper over the HTTP wire. Every response status maps
//! onto one `CloudError` variant here; the gateway layer never looks at
//! HTTP status codes.

use crate::auth::{self, Session};
use reqwest::{Method, Response, StatusCode, header};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use skiff_cloud::{CloudError, Result};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::OnceCell;

/// Credentials for Keystone v2 password auth
#[derive(Debug, Clone)]
pub struct OpenStackCredentials {
    pub auth_url: String,
    pub username: String,
    pub password: String,
    pub tenant_name: String,
    pub region: Option<String>,
}

pub struct NovaClient {
    http: reqwest::Client,
    credentials: OpenStackCredentials,
    session: OnceCell<Session>,
}

impl NovaClient {
    pub fn new(credentials: OpenStackCredentials) -> Self {
        Self {
            http: reqwest::Client::new(),
            credentials,
            session: OnceCell::new(),
        }
    }

    pub fn auth_url(&self) -> &str {
        &self.credentials.auth_url
    }

    async fn session(&self) -> Result<&Session> {
        self.session
            .get_or_try_init(|| auth::authenticate(&self.http, &self.credentials))
            .await
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Response> {
        let session = self.session().await?;
        let url = format!("{}{path}", session.compute_url);

        let mut request = self
            .http
            .request(method, &url)
            .header("X-Auth-Token", &session.token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(wire_error)?;
        check(response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.request(Method::GET, path, None).await?;
        response.json().await.map_err(wire_error)
    }

    async fn post_json<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T> {
        let response = self.request(Method::POST, path, Some(body)).await?;
        response.json().await.map_err(wire_error)
    }

    pub async fn list_servers(&self) -> Result<Vec<ServerDetail>> {
        let wrap: ServersWrap = self.get_json("/servers/detail").await?;
        Ok(wrap.servers)
    }

    pub async fn get_server(&self, id: &str) -> Result<ServerDetail> {
        let wrap: ServerWrap = self.get_json(&format!("/servers/{id}")).await?;
        Ok(wrap.server)
    }

    /// Create a server and return its full detail record. The creation
    /// response only carries the id.
    pub async fn create_server(&self, payload: &Value) -> Result<ServerDetail> {
        let wrap: ServerWrap = self.post_json("/servers", payload).await?;
        self.get_server(&wrap.server.id).await
    }

    pub async fn delete_server(&self, id: &str) -> Result<()> {
        self.request(Method::DELETE, &format!("/servers/{id}"), None)
            .await?;
        Ok(())
    }

    /// Fire a server action (`addFloatingIp`, `createImage`, ...) and
    /// hand back the raw response for callers that need its headers.
    pub async fn server_action(&self, id: &str, body: &Value) -> Result<Response> {
        self.request(Method::POST, &format!("/servers/{id}/action"), Some(body))
            .await
    }

    pub async fn list_floating_ips(&self) -> Result<Vec<FloatingIpDetail>> {
        let wrap: FloatingIpsWrap = self.get_json("/os-floating-ips").await?;
        Ok(wrap.floating_ips)
    }

    pub async fn allocate_floating_ip(&self) -> Result<FloatingIpDetail> {
        let wrap: FloatingIpWrap = self
            .post_json("/os-floating-ips", &serde_json::json!({}))
            .await?;
        Ok(wrap.floating_ip)
    }

    pub async fn list_security_groups(&self) -> Result<Vec<SecurityGroupDetail>> {
        let wrap: SecurityGroupsWrap = self.get_json("/os-security-groups").await?;
        Ok(wrap.security_groups)
    }

    pub async fn create_security_group(&self, name: &str) -> Result<SecurityGroupDetail> {
        let body = serde_json::json!({
            "security_group": {"name": name, "description": name}
        });
        let wrap: SecurityGroupWrap = self.post_json("/os-security-groups", &body).await?;
        Ok(wrap.security_group)
    }

    pub async fn create_security_group_rule(&self, body: &Value) -> Result<()> {
        self.request(Method::POST, "/os-security-group-rules", Some(body))
            .await?;
        Ok(())
    }

    pub async fn list_keypairs(&self) -> Result<Vec<KeyPairDetail>> {
        let wrap: KeyPairsWrap = self.get_json("/os-keypairs").await?;
        Ok(wrap.keypairs.into_iter().map(|k| k.keypair).collect())
    }

    pub async fn create_keypair(&self, name: &str, public_key: &str) -> Result<()> {
        let body = serde_json::json!({
            "keypair": {"name": name, "public_key": public_key}
        });
        self.request(Method::POST, "/os-keypairs", Some(&body))
            .await?;
        Ok(())
    }

    pub async fn list_images(&self) -> Result<Vec<NamedResource>> {
        let wrap: ImagesWrap = self.get_json("/images/detail").await?;
        Ok(wrap.images)
    }

    pub async fn list_flavors(&self) -> Result<Vec<NamedResource>> {
        let wrap: FlavorsWrap = self.get_json("/flavors/detail").await?;
        Ok(wrap.flavors)
    }
}

/// Map transport-level failures. Connection and timeout failures mean
/// the endpoint itself is bad; anything else is an API fault.
pub(crate) fn wire_error(error: reqwest::Error) -> CloudError {
    if error.is_connect() || error.is_timeout() || error.is_builder() {
        CloudError::BadEndpoint(error.to_string())
    } else {
        CloudError::Api(error.to_string())
    }
}

/// Map a non-success HTTP status onto the error taxonomy.
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_secs);

    let body = response.text().await.unwrap_or_default();
    let message = fault_message(&body, status);

    Err(match status {
        StatusCode::NOT_FOUND => CloudError::NotFound(message),
        StatusCode::BAD_REQUEST => CloudError::BadEndpoint(message),
        StatusCode::CONFLICT => CloudError::AlreadyExists(message),
        StatusCode::PAYLOAD_TOO_LARGE | StatusCode::TOO_MANY_REQUESTS => CloudError::OverLimit {
            message,
            retry_after,
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            CloudError::Api(format!("request rejected: {message}"))
        }
        _ => CloudError::Api(message),
    })
}

/// Nova wraps faults as `{"computeFault": {"message": ...}}` with a
/// fault-specific key; dig out the message, fall back to the status.
fn fault_message(body: &str, status: StatusCode) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .as_ref()
        .and_then(|value| value.as_object())
        .and_then(|object| object.values().next())
        .and_then(|fault| fault.get("message"))
        .and_then(|message| message.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{status}: {body}"))
}

// Wire records

#[derive(Deserialize)]
struct ServersWrap {
    servers: Vec<ServerDetail>,
}

#[derive(Deserialize)]
struct ServerWrap {
    server: ServerDetail,
}

#[derive(Debug, Deserialize)]
pub struct ServerDetail {
    pub id: String,
    pub name: String,

    #[serde(default)]
    pub status: String,

    #[serde(default)]
    pub addresses: HashMap<String, Vec<AddressDetail>>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct AddressDetail {
    pub addr: String,
}

#[derive(Deserialize)]
struct FloatingIpsWrap {
    floating_ips: Vec<FloatingIpDetail>,
}

#[derive(Deserialize)]
struct FloatingIpWrap {
    floating_ip: FloatingIpDetail,
}

#[derive(Debug, Deserialize)]
pub struct FloatingIpDetail {
    pub ip: String,

    #[serde(default, deserialize_with = "opt_id_string")]
    pub instance_id: Option<String>,
}

#[derive(Deserialize)]
struct SecurityGroupsWrap {
    security_groups: Vec<SecurityGroupDetail>,
}

#[derive(Deserialize)]
struct SecurityGroupWrap {
    security_group: SecurityGroupDetail,
}

#[derive(Debug, Deserialize)]
pub struct SecurityGroupDetail {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub name: String,
}

#[derive(Deserialize)]
struct KeyPairsWrap {
    keypairs: Vec<KeyPairEntry>,
}

#[derive(Deserialize)]
struct KeyPairEntry {
    keypair: KeyPairDetail,
}

#[derive(Debug, Deserialize)]
pub struct KeyPairDetail {
    pub name: String,
    pub fingerprint: Option<String>,
}

#[derive(Deserialize)]
struct ImagesWrap {
    images: Vec<NamedResource>,
}

#[derive(Deserialize)]
struct FlavorsWrap {
    flavors: Vec<NamedResource>,
}

#[derive(Debug, Deserialize)]
pub struct NamedResource {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub name: String,
}

// Nova reports numeric ids for some resources and UUID strings for
// others; normalize both to strings.
fn id_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("invalid id: {other}"))),
    }
}

fn opt_id_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(serde::de::Error::custom(format!("invalid id: {other}"))),
    }
}
