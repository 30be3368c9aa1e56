use crate::data_service::DataService;
use crate::errors::DataServiceError;
use crate::metrics_defs::SUBMISSIONS;
use crate::notifier::NotificationDispatcher;
use serde::Serialize;
use serde_json::{Map, Value, json};
use shared::counter;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Form fields that refer to catalog entries and are sent as `{"id": ...}`.
const ENTITY_FIELDS: &[&str] = &["lab", "experiment"];

/// Feedback as sent to the data service and mailed to maintainers.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FeedbackRecord(Map<String, Value>);

impl FeedbackRecord {
    /// Builds a record from submitted form fields.
    ///
    /// The first value wins for repeated field names. Non-empty `lab` and
    /// `experiment` values are nested as `{"id": value}`, empty ones stay
    /// plain strings. `ip` always holds the requester address.
    pub fn from_form<I, K, V>(fields: I, ip: IpAddr) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut map = Map::new();
        for (name, value) in fields {
            let name: String = name.into();
            map.entry(name).or_insert_with(|| Value::String(value.into()));
        }

        for field in ENTITY_FIELDS {
            let nested = match map.get(*field) {
                Some(Value::String(id)) if !id.is_empty() => json!({ "id": id }),
                _ => continue,
            };
            map.insert(field.to_string(), nested);
        }

        map.insert("ip".to_string(), Value::String(ip.to_canonical().to_string()));

        FeedbackRecord(map)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn to_json(&self) -> String {
        Value::Object(self.0.clone()).to_string()
    }
}

#[derive(Debug)]
pub enum Submission {
    /// Stored. The notification runs in the background.
    Accepted { notification: JoinHandle<()> },
    Rejected(DataServiceError),
}

pub struct FeedbackSubmitter {
    data_service: Arc<dyn DataService>,
    dispatcher: NotificationDispatcher,
}

impl FeedbackSubmitter {
    pub fn new(data_service: Arc<dyn DataService>, dispatcher: NotificationDispatcher) -> Self {
        FeedbackSubmitter {
            data_service,
            dispatcher,
        }
    }

    pub async fn submit(&self, record: FeedbackRecord) -> Submission {
        match self.data_service.submit_feedback(&record).await {
            Ok(()) => {
                tracing::info!("Stored feedback");
                counter!(SUBMISSIONS, "outcome" => "accepted").increment(1);
                let notification = self.dispatcher.dispatch(record.to_json());
                Submission::Accepted { notification }
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to store feedback");
                counter!(SUBMISSIONS, "outcome" => "rejected").increment(1);
                Submission::Rejected(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{MemoryDataService, RecordingNotifier};
    use std::net::{Ipv4Addr, Ipv6Addr};
    use std::time::Duration;

    const REQUESTER: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20));

    fn submitter(
        data_service: Arc<MemoryDataService>,
        notifier: Arc<RecordingNotifier>,
    ) -> FeedbackSubmitter {
        FeedbackSubmitter::new(
            data_service,
            NotificationDispatcher::new(notifier, Duration::from_secs(1)),
        )
    }

    #[test]
    fn test_record_from_form() {
        let record = FeedbackRecord::from_form(
            [("name", "Alice"), ("lab", "42"), ("comments", "Great")],
            REQUESTER,
        );

        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({
                "name": "Alice",
                "lab": {"id": "42"},
                "comments": "Great",
                "ip": "192.168.1.20"
            })
        );
    }

    #[test]
    fn test_record_overwrites_client_ip() {
        let record = FeedbackRecord::from_form(
            [("ip", "1.2.3.4"), ("experiment", "e-9")],
            REQUESTER,
        );

        assert_eq!(record.get("ip"), Some(&json!("192.168.1.20")));
        assert_eq!(record.get("experiment"), Some(&json!({"id": "e-9"})));
    }

    #[test]
    fn test_record_edge_cases() {
        let mapped = IpAddr::V6(Ipv4Addr::new(10, 1, 2, 3).to_ipv6_mapped());
        let record = FeedbackRecord::from_form(
            [("name", "first"), ("name", "second"), ("lab", "")],
            mapped,
        );

        assert_eq!(record.get("name"), Some(&json!("first")));
        assert_eq!(record.get("lab"), Some(&json!("")));
        assert_eq!(record.get("ip"), Some(&json!("10.1.2.3")));

        let record = FeedbackRecord::from_form(
            [("name", "Alice"), ("lab", ""), ("experiment", "")],
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
        );
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({"name": "Alice", "lab": "", "experiment": "", "ip": "10.0.0.1"})
        );

        let record = FeedbackRecord::from_form(
            Vec::<(String, String)>::new(),
            IpAddr::V6(Ipv6Addr::LOCALHOST),
        );
        assert_eq!(record.to_json(), r#"{"ip":"::1"}"#);
    }

    #[tokio::test]
    async fn test_accepted_submission_notifies_once() {
        let data_service = Arc::new(MemoryDataService::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let submitter = submitter(data_service.clone(), notifier.clone());

        let record = FeedbackRecord::from_form([("name", "Alice")], REQUESTER);
        match submitter.submit(record.clone()).await {
            Submission::Accepted { notification } => notification.await.unwrap(),
            Submission::Rejected(e) => panic!("unexpected rejection: {e}"),
        }

        assert_eq!(data_service.submitted(), vec![record.clone()]);
        assert_eq!(notifier.sent(), vec![record.to_json()]);
    }

    #[tokio::test]
    async fn test_rejected_submission_does_not_notify() {
        let data_service = Arc::new(MemoryDataService::default().rejecting_submissions());
        let notifier = Arc::new(RecordingNotifier::default());
        let submitter = submitter(data_service.clone(), notifier.clone());

        let record = FeedbackRecord::from_form([("name", "Alice")], REQUESTER);
        assert!(matches!(
            submitter.submit(record).await,
            Submission::Rejected(DataServiceError::UnexpectedStatus(_))
        ));

        assert_eq!(data_service.submitted().len(), 1);
        assert_eq!(notifier.attempts(), 0);
    }

    #[tokio::test]
    async fn test_notification_failure_keeps_submission() {
        let data_service = Arc::new(MemoryDataService::default());
        let notifier = Arc::new(RecordingNotifier::failing());
        let submitter = submitter(data_service, notifier.clone());

        let record = FeedbackRecord::from_form([("name", "Alice")], REQUESTER);
        match submitter.submit(record).await {
            Submission::Accepted { notification } => assert!(notification.await.is_ok()),
            Submission::Rejected(e) => panic!("unexpected rejection: {e}"),
        }
        assert_eq!(notifier.attempts(), 1);
    }
}
