use super::remote::{AuthUser, Document, DocumentStore};
use crate::error::SiteError;
use async_trait::async_trait;
use log::debug;
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Deserialize)]
struct Created {
    id: String,
}

#[derive(Deserialize)]
struct Stored {
    url: String,
}

/// [`DocumentStore`] over the service's JSON REST interface.
pub struct HttpDocumentStore {
    client: reqwest::Client,
    base: Url,
    api_key: Option<String>,
}

/// Ids that would move the request to another path.
fn is_plain_segment(segment: &str) -> bool {
    !matches!(segment, "" | "." | "..")
}

impl HttpDocumentStore {
    pub fn new(base: &str, api_key: Option<String>, timeout: Duration) -> Result<Self, SiteError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("showreel/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        let base = Url::parse(base)
            .map_err(|err| SiteError::Backend(format!("invalid remote URL {}: {}", base, err)))?;
        if base.cannot_be_a_base() {
            return Err(SiteError::Backend(format!("invalid remote URL {}", base)));
        }
        Ok(HttpDocumentStore {
            client,
            base,
            api_key,
        })
    }

    /// Appends each segment percent-encoded, so ids can never add path levels or a query.
    fn url(&self, segments: &[&str]) -> Result<Url, SiteError> {
        let mut url = self.base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| SiteError::Backend(format!("invalid remote URL {}", self.base)))?;
            path.pop_if_empty();
            for segment in segments {
                if !is_plain_segment(segment) {
                    return Err(SiteError::validation(format!("Invalid id: {:?}", segment)));
                }
                path.push(segment);
            }
        }
        Ok(url)
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("x-api-key", key),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, SiteError> {
        let response = self.request(builder).send().await?;
        debug!("{} {}", response.status(), response.url());
        Ok(response)
    }

    async fn json<T: DeserializeOwned>(response: Response) -> Result<T, SiteError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SiteError::Backend(format!("{}: {}", status, body)));
        }
        Ok(response.json().await?)
    }

    async fn credentials(
        &self,
        action: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthUser, SiteError> {
        let response = self
            .send(
                self.client
                    .post(self.url(&["auth", action])?)
                    .json(&json!({ "email": email, "password": password })),
            )
            .await?;
        match response.status() {
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let body = response.text().await.unwrap_or_default();
                Err(SiteError::Auth(if body.is_empty() {
                    "Invalid email or password".to_owned()
                } else {
                    body
                }))
            }
            _ => Self::json(response).await,
        }
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn get_all(&self, collection: &str) -> Result<Vec<Document>, SiteError> {
        let url = self.url(&["v1", collection])?;
        Self::json(self.send(self.client.get(url)).await?).await
    }

    async fn get_subresources(
        &self,
        collection: &str,
        id: &str,
        subcollection: &str,
    ) -> Result<Vec<Document>, SiteError> {
        let url = self.url(&["v1", collection, id, subcollection])?;
        Self::json(self.send(self.client.get(url)).await?).await
    }

    async fn get_one(&self, collection: &str, id: &str) -> Result<Option<Document>, SiteError> {
        if !is_plain_segment(id) {
            return Ok(None);
        }
        let url = self.url(&["v1", collection, id])?;
        let response = self.send(self.client.get(url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::json(response).await.map(Some)
    }

    async fn add(&self, collection: &str, fields: Value) -> Result<String, SiteError> {
        let url = self.url(&["v1", collection])?;
        let created: Created = Self::json(self.send(self.client.post(url).json(&fields)).await?).await?;
        Ok(created.id)
    }

    async fn set(&self, collection: &str, id: &str, fields: Value) -> Result<(), SiteError> {
        let url = self.url(&["v1", collection, id])?;
        let response = self.send(self.client.put(url).json(&fields)).await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(SiteError::Backend(format!("{} writing {}/{}", response.status(), collection, id)))
        }
    }

    async fn add_subresource(
        &self,
        collection: &str,
        id: &str,
        subcollection: &str,
        fields: Value,
    ) -> Result<String, SiteError> {
        let url = self.url(&["v1", collection, id, subcollection])?;
        let created: Created = Self::json(self.send(self.client.post(url).json(&fields)).await?).await?;
        Ok(created.id)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, SiteError> {
        self.credentials("sign-in", email, password).await
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser, SiteError> {
        self.credentials("sign-up", email, password).await
    }

    async fn sign_out(&self, token: &str) -> Result<(), SiteError> {
        let response = self
            .send(self.client.post(self.url(&["auth", "sign-out"])?).bearer_auth(token))
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(SiteError::Backend(format!("{} signing out", response.status())))
        }
    }

    async fn auth_state(&self, token: &str) -> Result<Option<AuthUser>, SiteError> {
        let response = self
            .send(self.client.get(self.url(&["auth", "session"])?).bearer_auth(token))
            .await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Ok(None);
        }
        Self::json(response).await.map(Some)
    }

    async fn put_object(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, SiteError> {
        let mut segments = vec!["objects"];
        segments.extend(path.split('/'));
        let url = self.url(&segments)?;
        let builder = self
            .client
            .put(url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes);
        let stored: Stored = Self::json(self.send(builder).await?).await?;
        Ok(stored.url)
    }
}
