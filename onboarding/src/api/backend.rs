// Cooperative platform REST backend
//
// JSON over HTTPS, bearer token where the endpoint needs one. Every response goes through
// `models::responses::decode`/`normalize`; nothing above this file sees raw JSON.

use crate::config::ApiSettings;
use crate::error::{ClientError, ClientResult};
use crate::models::requests::{BankInfoUpdateRequest, LandDetailsRequest};
use crate::models::responses::{self, BankInfo, LandDetails, LocationOption, RegistrationResult};
use crate::session::SessionData;
use crate::utils::logging::mask_account_number;
use crate::wizard::cascade::{CascadeLevel, LocationDirectory};
use crate::wizard::submission::{RegistrationApi, RegistrationPayload};
use async_trait::async_trait;
use log::{info, warn};
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Duration;

pub struct RestBackend {
    client: reqwest::Client,
    base_url: String,
}

impl RestBackend {
    pub fn new(settings: &ApiSettings) -> ClientResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| ClientError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn execute(
        &self,
        step: &str,
        request: reqwest::RequestBuilder,
    ) -> ClientResult<(u16, String)> {
        let resp = request.send().await.map_err(|e| {
            warn!("[PHASE: api] [STEP: {}] Request failed: {}", step, e);
            ClientError::network(e.to_string())
        })?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        if !(200..300).contains(&status) {
            warn!("[PHASE: api] [STEP: {}] HTTP {}", step, status);
        }
        Ok((status, body))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        step: &str,
        path: &str,
        token: Option<&str>,
    ) -> ClientResult<T> {
        let mut req = self.client.get(self.url(path));
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        let (status, body) = self.execute(step, req).await?;
        responses::decode(status, &body)
    }

    pub async fn fetch_bank_info(&self, session: &SessionData) -> ClientResult<BankInfo> {
        self.get_json(
            "bank_info",
            &format!("bank-info/{}", session.user_id),
            Some(&session.auth_token),
        )
        .await
    }

    pub async fn update_bank_info(
        &self,
        session: &SessionData,
        request: &BankInfoUpdateRequest,
    ) -> ClientResult<()> {
        info!(
            "[PHASE: api] [STEP: bank_info] Updating bank info for user {} (account {})",
            session.user_id,
            mask_account_number(&request.account_number)
        );
        let req = self
            .client
            .put(self.url(&format!("bank-info/{}", session.user_id)))
            .bearer_auth(&session.auth_token)
            .json(request);
        let (status, body) = self.execute("bank_info", req).await?;
        responses::normalize(status, &body)?;
        Ok(())
    }

    pub async fn fetch_land_details(
        &self,
        session: &SessionData,
    ) -> ClientResult<Vec<LandDetails>> {
        self.get_json(
            "land_details",
            &format!("land-details/{}", session.user_id),
            Some(&session.auth_token),
        )
        .await
    }
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

async fn build_multipart(payload: &RegistrationPayload) -> ClientResult<Form> {
    let mut form = Form::new();
    for (name, value) in &payload.fields {
        form = form.text(name.clone(), value.clone());
    }
    for doc in &payload.documents {
        let bytes = tokio::fs::read(&doc.path).await.map_err(|e| {
            ClientError::validation(doc.field.clone(), format!("Unable to read file: {}", e))
        })?;
        let file_name = doc
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| doc.field.clone());
        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime_for(&doc.path))?;
        form = form.part(doc.field.clone(), part);
    }
    Ok(form)
}

#[async_trait]
impl LocationDirectory for RestBackend {
    async fn states(&self) -> ClientResult<Vec<LocationOption>> {
        self.get_json("cascade", "locations/states", None).await
    }

    async fn children(
        &self,
        level: CascadeLevel,
        parent_id: &str,
    ) -> ClientResult<Vec<LocationOption>> {
        let path = match level {
            CascadeLevel::State => return self.states().await,
            CascadeLevel::District => format!("locations/districts/{}", parent_id),
            CascadeLevel::Taluk => format!("locations/taluks/{}", parent_id),
            CascadeLevel::Village => format!("locations/villages/{}", parent_id),
        };
        self.get_json("cascade", &path, None).await
    }
}

#[async_trait]
impl RegistrationApi for RestBackend {
    async fn register(&self, payload: &RegistrationPayload) -> ClientResult<RegistrationResult> {
        let form = build_multipart(payload).await?;
        let req = self.client.post(self.url("users/register")).multipart(form);
        let (status, body) = self.execute("register", req).await?;
        responses::decode(status, &body)
    }

    async fn submit_land_details(
        &self,
        auth_token: &str,
        request: &LandDetailsRequest,
    ) -> ClientResult<()> {
        let mut req = self.client.post(self.url("land-details")).json(request);
        if !auth_token.is_empty() {
            req = req.bearer_auth(auth_token);
        }
        let (status, body) = self.execute("land_details", req).await?;
        responses::normalize(status, &body)?;
        Ok(())
    }
}
