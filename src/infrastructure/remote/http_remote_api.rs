use crate::application::ports::remote_api::{RemoteApi, RemoteError};
use crate::domain::value_objects::EntityType;
use crate::shared::config::RemoteConfig;
use crate::shared::error::AppError;
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use serde_json::Value;
use tracing::debug;

/// REST adapter: `POST {base}/{collection}` creates, `PUT`, `DELETE` and
/// `GET` address `{base}/{collection}/{id}`.
pub struct HttpRemoteApi {
    client: Client,
    base_url: Url,
    api_token: Option<String>,
}

impl HttpRemoteApi {
    pub fn new(config: &RemoteConfig) -> Result<Self, AppError> {
        let base_url = Url::parse(&config.base_url).map_err(|err| {
            AppError::ConfigurationError(format!("Invalid API base URL {}: {err}", config.base_url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::ConfigurationError(format!(
                "API base URL cannot hold a path: {}",
                config.base_url
            )));
        }

        let client = Client::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            client,
            base_url,
            api_token: config
                .api_token
                .clone()
                .filter(|token| !token.trim().is_empty()),
        })
    }

    fn url(&self, entity_type: EntityType, id: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(entity_type.collection());
            if let Some(id) = id {
                segments.push(id);
            }
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<(StatusCode, String), RemoteError> {
        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        debug!(status = %status, "Remote API responded");
        Ok((status, body))
    }
}

fn transport_error(err: reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        RemoteError::Timeout
    } else {
        RemoteError::Connectivity(err.to_string())
    }
}

fn expect_success(status: StatusCode, body: String) -> Result<String, RemoteError> {
    if status.is_success() {
        Ok(body)
    } else {
        Err(RemoteError::Status {
            code: status.as_u16(),
            body,
        })
    }
}

fn parse_body(body: &str) -> Result<Value, RemoteError> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(body).map_err(|err| RemoteError::Malformed(err.to_string()))
}

#[async_trait]
impl RemoteApi for HttpRemoteApi {
    async fn create(&self, entity_type: EntityType, body: Value) -> Result<Value, RemoteError> {
        let builder = self
            .request(Method::POST, self.url(entity_type, None))
            .json(&body);
        let (status, text) = self.send(builder).await?;
        parse_body(&expect_success(status, text)?)
    }

    async fn update(
        &self,
        entity_type: EntityType,
        id: &str,
        body: Value,
    ) -> Result<Value, RemoteError> {
        let builder = self
            .request(Method::PUT, self.url(entity_type, Some(id)))
            .json(&body);
        let (status, text) = self.send(builder).await?;
        parse_body(&expect_success(status, text)?)
    }

    async fn delete(&self, entity_type: EntityType, id: &str) -> Result<(), RemoteError> {
        let builder = self.request(Method::DELETE, self.url(entity_type, Some(id)));
        let (status, text) = self.send(builder).await?;
        expect_success(status, text).map(|_| ())
    }

    async fn fetch(&self, entity_type: EntityType, id: &str) -> Result<Option<Value>, RemoteError> {
        let builder = self.request(Method::GET, self.url(entity_type, Some(id)));
        let (status, text) = self.send(builder).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        match parse_body(&expect_success(status, text)?)? {
            Value::Null => Err(RemoteError::Malformed("empty response".to_string())),
            payload => Ok(Some(payload)),
        }
    }
}
