//! Keystone v2 password authentication

use crate::client::{OpenStackCredentials, wire_error};
use serde::Deserialize;
use serde_json::json;
use skiff_cloud::{CloudError, Result};

/// An authenticated compute session: the token plus the Nova endpoint
/// picked from the service catalog.
#[derive(Debug, Clone)]
pub(crate) struct Session {
    pub token: String,
    pub compute_url: String,
}

#[derive(Deserialize)]
struct AccessWrap {
    access: Access,
}

#[derive(Deserialize)]
struct Access {
    token: Token,
    #[serde(rename = "serviceCatalog", default)]
    service_catalog: Vec<CatalogEntry>,
}

#[derive(Deserialize)]
struct Token {
    id: String,
}

#[derive(Deserialize)]
pub(crate) struct CatalogEntry {
    #[serde(rename = "type")]
    pub service_type: String,

    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

#[derive(Deserialize)]
pub(crate) struct Endpoint {
    #[serde(rename = "publicURL")]
    pub public_url: String,

    pub region: Option<String>,
}

pub(crate) async fn authenticate(
    http: &reqwest::Client,
    credentials: &OpenStackCredentials,
) -> Result<Session> {
    let url = format!("{}/tokens", credentials.auth_url.trim_end_matches('/'));
    let body = json!({
        "auth": {
            "passwordCredentials": {
                "username": credentials.username,
                "password": credentials.password,
            },
            "tenantName": credentials.tenant_name,
        }
    });

    let response = http.post(&url).json(&body).send().await.map_err(wire_error)?;
    let status = response.status();
    if !status.is_success() {
        return Err(match status.as_u16() {
            401 => CloudError::Api("authentication rejected; check credentials".into()),
            _ => CloudError::BadEndpoint(format!("auth endpoint returned {status}")),
        });
    }

    let access: AccessWrap = response.json().await.map_err(wire_error)?;
    let compute_url = select_compute_endpoint(
        &access.access.service_catalog,
        credentials.region.as_deref(),
    )?;
    tracing::debug!(endpoint = %compute_url, "authenticated, compute endpoint selected");

    Ok(Session {
        token: access.access.token.id,
        compute_url,
    })
}

/// Pick the compute endpoint from the catalog, honoring the configured
/// region when one is set.
pub(crate) fn select_compute_endpoint(
    catalog: &[CatalogEntry],
    region: Option<&str>,
) -> Result<String> {
    let endpoints = catalog
        .iter()
        .find(|entry| entry.service_type == "compute")
        .map(|entry| entry.endpoints.as_slice())
        .unwrap_or_default();

    let endpoint = match region {
        Some(region) => endpoints
            .iter()
            .find(|endpoint| endpoint.region.as_deref() == Some(region)),
        None => endpoints.first(),
    };

    endpoint
        .map(|endpoint| endpoint.public_url.trim_end_matches('/').to_string())
        .ok_or_else(|| {
            CloudError::BadEndpoint(match region {
                Some(region) => format!("no compute endpoint in region `{region}`"),
                None => "no compute endpoint in the service catalog".to_string(),
            })
        })
}
