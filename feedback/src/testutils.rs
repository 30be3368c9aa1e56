use crate::data_service::DataService;
use crate::errors::{DataServiceError, NotifyError};
use crate::notifier::Notifier;
use crate::submission::FeedbackRecord;
use crate::types::{Experiment, Lab, LabRef};
use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::CONTENT_TYPE;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use lettre::message::Mailbox;
use reqwest::StatusCode;
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

pub fn lab(id: i64, name: &str, hosted_url: &str) -> Lab {
    Lab {
        id: id.into(),
        name: name.to_string(),
        hosted_url: Some(hosted_url.to_string()),
    }
}

pub fn experiment(
    id: i64,
    name: &str,
    content_url: Option<&str>,
    simulation_url: Option<&str>,
    owner: &Lab,
) -> Experiment {
    Experiment {
        id: id.into(),
        name: name.to_string(),
        content_url: content_url.map(String::from),
        simulation_url: simulation_url.map(String::from),
        lab: LabRef {
            id: owner.id.clone(),
            name: owner.name.clone(),
        },
    }
}

/// In-memory catalog that records which lookups were made.
#[derive(Default)]
pub struct MemoryDataService {
    labs: Vec<Lab>,
    experiments: Vec<Experiment>,
    fail_lookups: bool,
    reject_submissions: bool,
    lookups: Mutex<Vec<&'static str>>,
    submitted: Mutex<Vec<FeedbackRecord>>,
}

impl MemoryDataService {
    pub fn with_lab(mut self, lab: Lab) -> Self {
        self.labs.push(lab);
        self
    }

    pub fn with_experiment(mut self, experiment: Experiment) -> Self {
        self.experiments.push(experiment);
        self
    }

    pub fn failing_lookups(mut self) -> Self {
        self.fail_lookups = true;
        self
    }

    pub fn rejecting_submissions(mut self) -> Self {
        self.reject_submissions = true;
        self
    }

    pub fn lookups(&self) -> Vec<&'static str> {
        self.lookups.lock().unwrap().clone()
    }

    pub fn submitted(&self) -> Vec<FeedbackRecord> {
        self.submitted.lock().unwrap().clone()
    }

    fn record_lookup(&self, name: &'static str) -> Result<(), DataServiceError> {
        self.lookups.lock().unwrap().push(name);
        if self.fail_lookups {
            return Err(DataServiceError::Timeout(Duration::from_secs(10)));
        }
        Ok(())
    }

    fn experiments_where<F>(&self, predicate: F) -> Vec<Experiment>
    where
        F: Fn(&Experiment) -> bool,
    {
        self.experiments
            .iter()
            .filter(|e| predicate(e))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl DataService for MemoryDataService {
    async fn find_lab_by_hosted_url(&self, url: &str) -> Result<Vec<Lab>, DataServiceError> {
        self.record_lookup("labs.hosted_url")?;
        Ok(self
            .labs
            .iter()
            .filter(|lab| lab.hosted_url.as_deref() == Some(url))
            .cloned()
            .collect())
    }

    async fn find_experiment_by_content_url(
        &self,
        url: &str,
    ) -> Result<Vec<Experiment>, DataServiceError> {
        self.record_lookup("experiments.content_url")?;
        Ok(self.experiments_where(|e| e.content_url.as_deref() == Some(url)))
    }

    async fn find_experiment_by_simulation_url(
        &self,
        url: &str,
    ) -> Result<Vec<Experiment>, DataServiceError> {
        self.record_lookup("experiments.simulation_url")?;
        Ok(self.experiments_where(|e| e.simulation_url.as_deref() == Some(url)))
    }

    async fn submit_feedback(&self, record: &FeedbackRecord) -> Result<(), DataServiceError> {
        self.submitted.lock().unwrap().push(record.clone());
        if self.reject_submissions {
            return Err(DataServiceError::UnexpectedStatus(
                StatusCode::INTERNAL_SERVER_ERROR,
            ));
        }
        Ok(())
    }
}

#[derive(Default)]
enum Delivery {
    #[default]
    Deliver,
    Fail,
    Stall,
}

#[derive(Default)]
pub struct RecordingNotifier {
    delivery: Delivery,
    attempts: AtomicUsize,
    sent: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        RecordingNotifier {
            delivery: Delivery::Fail,
            ..Default::default()
        }
    }

    pub fn stalled() -> Self {
        RecordingNotifier {
            delivery: Delivery::Stall,
            ..Default::default()
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, body: &str) -> Result<(), NotifyError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        match self.delivery {
            Delivery::Deliver => {
                self.sent.lock().unwrap().push(body.to_string());
                Ok(())
            }
            Delivery::Fail => {
                let error = "nobody".parse::<Mailbox>().unwrap_err();
                Err(error.into())
            }
            Delivery::Stall => std::future::pending().await,
        }
    }
}

pub struct CannedResponse {
    status: u16,
    body: &'static str,
    delay_ms: u64,
}

impl CannedResponse {
    pub fn ok(body: &'static str) -> Self {
        Self::status(200, body)
    }

    pub fn status(status: u16, body: &'static str) -> Self {
        CannedResponse {
            status,
            body,
            delay_ms: 0,
        }
    }

    pub fn delayed(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }
}

#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: String,
    pub path_and_query: String,
    pub body: Bytes,
}

pub struct CatalogServer {
    pub port: u16,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl CatalogServer {
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

/// Data service stand-in answering with `responses` in order, then 404.
pub async fn start_catalog_server(responses: Vec<CannedResponse>) -> CatalogServer {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind to address");
    let port = listener.local_addr().unwrap().port();

    let requests = Arc::new(Mutex::new(Vec::new()));
    let responses = Arc::new(responses);
    let recorded = requests.clone();

    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            let io = TokioIo::new(stream);
            let requests = recorded.clone();
            let responses = responses.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let requests = requests.clone();
                    let responses = responses.clone();
                    async move { Ok::<_, Infallible>(answer(req, &requests, &responses).await) }
                });

                let _ = Builder::new(TokioExecutor::new())
                    .serve_connection(io, service)
                    .await;
            });
        }
    });

    CatalogServer { port, requests }
}

async fn answer(
    req: Request<Incoming>,
    requests: &Mutex<Vec<RecordedRequest>>,
    responses: &[CannedResponse],
) -> Response<Full<Bytes>> {
    let method = req.method().to_string();
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.to_string())
        .unwrap_or_default();
    let body = req
        .into_body()
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .unwrap_or_default();

    let index = {
        let mut requests = requests.lock().unwrap();
        requests.push(RecordedRequest {
            method,
            path_and_query,
            body,
        });
        requests.len() - 1
    };

    match responses.get(index) {
        Some(canned) => {
            if canned.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(canned.delay_ms)).await;
            }
            Response::builder()
                .status(canned.status)
                .header(CONTENT_TYPE, "application/json")
                .body(Full::new(Bytes::from_static(canned.body.as_bytes())))
                .unwrap()
        }
        None => Response::builder()
            .status(404)
            .body(Full::new(Bytes::new()))
            .unwrap(),
    }
}
