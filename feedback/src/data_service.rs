use crate::config::DataServiceConfig;
use crate::errors::DataServiceError;
use crate::submission::FeedbackRecord;
use crate::types::{Experiment, Lab};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::time::timeout;
use url::Url;

/// Read and write access to the catalog/feedback store.
///
/// Lookups return every match; callers treat the first one as authoritative.
#[async_trait]
pub trait DataService: Send + Sync {
    async fn find_lab_by_hosted_url(&self, url: &str) -> Result<Vec<Lab>, DataServiceError>;

    async fn find_experiment_by_content_url(
        &self,
        url: &str,
    ) -> Result<Vec<Experiment>, DataServiceError>;

    async fn find_experiment_by_simulation_url(
        &self,
        url: &str,
    ) -> Result<Vec<Experiment>, DataServiceError>;

    /// Succeeds only when the store answers 200 OK.
    async fn submit_feedback(&self, record: &FeedbackRecord) -> Result<(), DataServiceError>;
}

pub struct HttpDataService {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpDataService {
    pub fn new(config: &DataServiceConfig) -> Self {
        HttpDataService {
            client: reqwest::Client::new(),
            base_url: config.url.as_str().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, DataServiceError> {
        Ok(Url::parse(&format!("{}/{}", self.base_url, path))?)
    }

    async fn lookup<T: DeserializeOwned>(
        &self,
        path: &str,
        key: &str,
        value: &str,
    ) -> Result<Vec<T>, DataServiceError> {
        let mut url = self.endpoint(path)?;
        // Percent-encodes the referrer
        url.query_pairs_mut().append_pair(key, value);

        let request = async {
            let response = self.client.get(url).send().await?;

            if !response.status().is_success() {
                return Err(DataServiceError::UnexpectedStatus(response.status()));
            }

            Ok(response.json::<Vec<T>>().await?)
        };

        timeout(self.timeout, request)
            .await
            .map_err(|_| DataServiceError::Timeout(self.timeout))?
    }
}

#[async_trait]
impl DataService for HttpDataService {
    async fn find_lab_by_hosted_url(&self, url: &str) -> Result<Vec<Lab>, DataServiceError> {
        self.lookup("labs", "hosted_url", url).await
    }

    async fn find_experiment_by_content_url(
        &self,
        url: &str,
    ) -> Result<Vec<Experiment>, DataServiceError> {
        self.lookup("experiments", "content_url", url).await
    }

    async fn find_experiment_by_simulation_url(
        &self,
        url: &str,
    ) -> Result<Vec<Experiment>, DataServiceError> {
        self.lookup("experiments", "simulation_url", url).await
    }

    async fn submit_feedback(&self, record: &FeedbackRecord) -> Result<(), DataServiceError> {
        let url = self.endpoint("feedback")?;

        let request = async {
            let response = self.client.post(url).json(record).send().await?;

            match response.status() {
                StatusCode::OK => Ok(()),
                status => Err(DataServiceError::UnexpectedStatus(status)),
            }
        };

        timeout(self.timeout, request)
            .await
            .map_err(|_| DataServiceError::Timeout(self.timeout))?
    }
}
