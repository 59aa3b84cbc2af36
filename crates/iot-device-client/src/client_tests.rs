//! Tests for the device queue client.

use super::*;
use crate::signer::FixedClock;
use crate::transport::HttpResponse;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

// ============================================================================
// Recording Transport for Testing
// ============================================================================

/// Records every request and replies with queued responses (default 204).
#[derive(Default)]
struct RecordingTransport {
    requests: Mutex<Vec<HttpRequest>>,
    responses: Mutex<VecDeque<Result<HttpResponse, String>>>,
}

impl RecordingTransport {
    fn with_responses(responses: Vec<HttpResponse>) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            responses: Mutex::new(responses.into_iter().map(Ok).collect()),
        })
    }

    fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            responses: Mutex::new(VecDeque::from(vec![Err(message.to_string())])),
        })
    }

    fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for RecordingTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, DeviceClientError> {
        self.requests.lock().unwrap().push(request);
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(DeviceClientError::Transport { message }),
            None => Ok(HttpResponse::new(204)),
        }
    }
}

const BASE: &str = "https://h.azure-devices.net/devices/d/messages/";

/// Client for hub "h", device "d", key base64("secret"), clock frozen at T=1000
fn create_test_client(
    transport: Arc<RecordingTransport>,
) -> QueueClient<Arc<RecordingTransport>> {
    let credentials = DeviceCredentials::new("h", "d", "c2VjcmV0").unwrap();
    QueueClient::new(credentials, transport).with_clock(Arc::new(FixedClock(1000)))
}

// ============================================================================
// Construction and Token Tests
// ============================================================================

mod token_tests {
    use super::*;

    #[test]
    fn test_base_url_uses_lowercased_names() {
        let credentials = DeviceCredentials::new("MyHub", "Sensor-01", "c2VjcmV0").unwrap();
        let client = QueueClient::new(credentials, RecordingTransport::with_responses(vec![]));

        assert_eq!(
            client.base_url(),
            "https://myhub.azure-devices.net/devices/sensor-01/messages/"
        );
    }

    #[test]
    fn test_no_token_until_refreshed() {
        let client = create_test_client(RecordingTransport::with_responses(vec![]));

        assert!(client.current_token().is_none());
    }

    /// Hub "h", device "d", key base64("secret"), T=1000, ttl=600.
    #[test]
    fn test_refresh_token_scopes_to_device_resource() {
        let client = create_test_client(RecordingTransport::with_responses(vec![]));

        let token = client.refresh_token(600);

        assert_eq!(token.expiry(), 1600);
        assert!(token
            .header_value()
            .contains("sr=h.azure-devices.net%2Fdevices%2Fd"));
        assert!(token.header_value().contains("se=1600"));
        assert_eq!(client.current_token(), Some(token));
    }

    /// Operations without an issued token fail locally and send nothing.
    #[tokio::test]
    async fn test_operations_require_issued_token() {
        let transport = RecordingTransport::with_responses(vec![]);
        let client = create_test_client(Arc::clone(&transport));

        let publish = client.publish(&OutboundMessage::json("{}")).await;
        let read = client.read().await;
        let complete = client.complete(&MessageId::new("msg1")).await;

        assert!(matches!(publish, Err(DeviceClientError::TokenNotIssued)));
        assert!(matches!(read, Err(DeviceClientError::TokenNotIssued)));
        assert!(matches!(complete, Err(DeviceClientError::TokenNotIssued)));
        assert!(transport.requests().is_empty());
    }

    /// Every request carries whichever token was issued last.
    #[tokio::test]
    async fn test_requests_use_latest_token() {
        let transport = RecordingTransport::with_responses(vec![]);
        let client = create_test_client(Arc::clone(&transport));

        let first = client.refresh_token(600);
        client.publish(&OutboundMessage::json("{}")).await.unwrap();
        let second = client.refresh_token(60);
        client.publish(&OutboundMessage::json("{}")).await.unwrap();

        let requests = transport.requests();
        assert_eq!(
            requests[0].header("Authorization"),
            Some(first.header_value().as_str())
        );
        assert_eq!(
            requests[1].header("Authorization"),
            Some(second.header_value().as_str())
        );
    }

    /// An expired token is still sent; the hub decides what to do with it.
    #[tokio::test]
    async fn test_expired_token_is_sent_unchanged() {
        let transport = RecordingTransport::with_responses(vec![HttpResponse::new(401)]);
        let client = create_test_client(Arc::clone(&transport));

        let token = client.refresh_token(-60);
        let status = client.publish(&OutboundMessage::json("{}")).await.unwrap();

        assert_eq!(status, 401);
        assert_eq!(
            transport.requests()[0].header("Authorization"),
            Some(token.header_value().as_str())
        );
        assert_eq!(client.current_token(), Some(token));
    }
}

// ============================================================================
// Publish Tests
// ============================================================================

mod publish_tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_returns_204_unchanged() {
        let transport = RecordingTransport::with_responses(vec![HttpResponse::new(204)]);
        let client = create_test_client(Arc::clone(&transport));
        client.refresh_token(600);

        let status = client
            .publish(&OutboundMessage::new(&b"{\"x\":1}"[..]))
            .await
            .unwrap();

        assert_eq!(status, 204);
        assert_eq!(transport.requests().len(), 1, "no retries");
    }

    #[tokio::test]
    async fn test_publish_request_shape() {
        let transport = RecordingTransport::with_responses(vec![]);
        let client = create_test_client(Arc::clone(&transport));
        client.refresh_token(600);

        client
            .publish(&OutboundMessage::new(&b"{\"x\":1}"[..]))
            .await
            .unwrap();

        let request = &transport.requests()[0];
        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(
            request.url,
            format!("{}events?api-version=2015-08-15-preview", BASE)
        );
        assert_eq!(request.header("Content-Type"), Some("application/json"));
        assert_eq!(request.body.as_ref(), b"{\"x\":1}");
    }

    /// Error statuses pass through as plain values.
    #[tokio::test]
    async fn test_publish_passes_error_status_through() {
        let transport = RecordingTransport::with_responses(vec![HttpResponse::new(500)]);
        let client = create_test_client(Arc::clone(&transport));
        client.refresh_token(600);

        let status = client.publish(&OutboundMessage::json("{}")).await.unwrap();

        assert_eq!(status, 500);
        assert_eq!(transport.requests().len(), 1, "no retries");
    }

    #[tokio::test]
    async fn test_publish_transport_failure_is_propagated() {
        let transport = RecordingTransport::failing("connection reset");
        let client = create_test_client(Arc::clone(&transport));
        client.refresh_token(600);

        let result = client.publish(&OutboundMessage::json("{}")).await;

        match result {
            Err(DeviceClientError::Transport { message }) => {
                assert_eq!(message, "connection reset")
            }
            other => panic!("Expected transport error, got {:?}", other),
        }
        assert_eq!(transport.requests().len(), 1, "no retries");
    }
}

// ============================================================================
// Read Tests
// ============================================================================

mod read_tests {
    use super::*;

    #[tokio::test]
    async fn test_read_request_shape() {
        let transport = RecordingTransport::with_responses(vec![]);
        let client = create_test_client(Arc::clone(&transport));
        client.refresh_token(600);

        client.read().await.unwrap();

        let request = &transport.requests()[0];
        assert_eq!(request.method, HttpMethod::Get);
        assert_eq!(
            request.url,
            format!("{}devicebound?api-version=2015-08-15-preview", BASE)
        );
        assert!(request.body.is_empty());
        assert!(request.header("Authorization").is_some());
    }

    #[tokio::test]
    async fn test_read_with_etag_yields_message_id() {
        let transport = RecordingTransport::with_responses(vec![HttpResponse::new(200)
            .with_header("ETag", "\"abc123\"")
            .with_body("{\"command\":\"reboot\"}")]);
        let client = create_test_client(transport);
        client.refresh_token(600);

        let message = client.read().await.unwrap();

        assert_eq!(message.message_id, Some(MessageId::new("abc123")));
        assert_eq!(message.status_code, 200);
        assert_eq!(message.text(), "{\"command\":\"reboot\"}");
    }

    /// An empty queue is a normal outcome, not an error.
    #[tokio::test]
    async fn test_read_empty_queue_has_no_message_id() {
        let transport = RecordingTransport::with_responses(vec![HttpResponse::new(204)]);
        let client = create_test_client(transport);
        client.refresh_token(600);

        let message = client.read().await.unwrap();

        assert!(message.message_id.is_none());
        assert_eq!(message.status_code, 204);
        assert!(message.body.is_empty());
    }
}

// ============================================================================
// Settlement Tests
// ============================================================================

mod settlement_tests {
    use super::*;

    #[tokio::test]
    async fn test_complete_request_shape() {
        let transport = RecordingTransport::with_responses(vec![]);
        let client = create_test_client(Arc::clone(&transport));
        client.refresh_token(600);

        let status = client.complete(&MessageId::new("msg1")).await.unwrap();

        assert_eq!(status, 204);
        let request = &transport.requests()[0];
        assert_eq!(request.method, HttpMethod::Delete);
        assert_eq!(
            request.url,
            format!("{}devicebound/msg1?api-version=2015-08-15-preview", BASE)
        );
    }

    #[tokio::test]
    async fn test_reject_request_shape() {
        let transport = RecordingTransport::with_responses(vec![]);
        let client = create_test_client(Arc::clone(&transport));
        client.refresh_token(600);

        client.reject(&MessageId::new("msg1")).await.unwrap();

        let request = &transport.requests()[0];
        assert_eq!(request.method, HttpMethod::Delete);
        assert_eq!(
            request.url,
            format!(
                "{}devicebound/msg1?reject&api-version=2015-08-15-preview",
                BASE
            )
        );
    }

    /// abandon issues exactly one POST with an empty body and the current token.
    #[tokio::test]
    async fn test_abandon_request_shape() {
        let transport = RecordingTransport::with_responses(vec![]);
        let client = create_test_client(Arc::clone(&transport));
        let token = client.refresh_token(600);

        client.abandon(&MessageId::new("msg1")).await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(
            request.url,
            format!(
                "{}devicebound/msg1/abandon?api-version=2015-08-15-preview",
                BASE
            )
        );
        assert!(request.body.is_empty());
        assert_eq!(
            request.header("Authorization"),
            Some(token.header_value().as_str())
        );
    }

    /// Unknown ids are not validated locally; the hub's status is returned.
    #[tokio::test]
    async fn test_stale_message_id_status_passes_through() {
        let transport = RecordingTransport::with_responses(vec![HttpResponse::new(412)]);
        let client = create_test_client(transport);
        client.refresh_token(600);

        let status = client.complete(&MessageId::new("stale")).await.unwrap();

        assert_eq!(status, 412);
    }

    #[tokio::test]
    async fn test_settle_dispatches_to_operation() {
        let transport = RecordingTransport::with_responses(vec![]);
        let client = create_test_client(Arc::clone(&transport));
        client.refresh_token(600);
        let id = MessageId::new("msg1");

        client.settle(&id, Settlement::Complete).await.unwrap();
        client.settle(&id, Settlement::Reject).await.unwrap();
        client.settle(&id, Settlement::Abandon).await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 3);
        assert!(requests[0].url.contains("devicebound/msg1?api-version"));
        assert!(requests[1].url.contains("devicebound/msg1?reject&"));
        assert!(requests[2].url.contains("devicebound/msg1/abandon?"));
    }

    /// Read then complete, the typical receive loop.
    #[tokio::test]
    async fn test_read_then_complete_uses_etag_id() {
        let transport = RecordingTransport::with_responses(vec![
            HttpResponse::new(200)
                .with_header("ETag", "\"7e1d\"")
                .with_body("hello"),
            HttpResponse::new(204),
        ]);
        let client = create_test_client(Arc::clone(&transport));
        client.refresh_token(600);

        let message = client.read().await.unwrap();
        let id = message.message_id.expect("message expected");
        let status = client.complete(&id).await.unwrap();

        assert_eq!(status, 204);
        assert_eq!(
            transport.requests()[1].url,
            format!("{}devicebound/7e1d?api-version=2015-08-15-preview", BASE)
        );
    }

    #[test]
    fn test_settlement_parsing_and_terminality() {
        assert_eq!("complete".parse::<Settlement>().unwrap(), Settlement::Complete);
        assert_eq!("REJECT".parse::<Settlement>().unwrap(), Settlement::Reject);
        assert_eq!("abandon".parse::<Settlement>().unwrap(), Settlement::Abandon);
        assert!("retry".parse::<Settlement>().is_err());

        assert!(Settlement::Complete.is_terminal());
        assert!(Settlement::Reject.is_terminal());
        assert!(!Settlement::Abandon.is_terminal());
    }
}

// ============================================================================
// Base URL Override
// ============================================================================

mod base_url_tests {
    use super::*;
    use crate::transport::ReqwestTransport;
    use wiremock::matchers::{body_bytes, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// The full stack against a local server: publish, read, abandon.
    #[tokio::test]
    async fn test_round_trip_against_local_server() {
        let mock_server = MockServer::start().await;
        let credentials = DeviceCredentials::new("h", "d", "c2VjcmV0").unwrap();
        let client = QueueClient::new(credentials, ReqwestTransport::new().unwrap())
            .with_clock(Arc::new(FixedClock(1000)))
            .with_base_url(format!("{}/devices/d/messages/", mock_server.uri()));
        let token = client.refresh_token(600);

        Mock::given(method("POST"))
            .and(path("/devices/d/messages/events"))
            .and(query_param("api-version", "2015-08-15-preview"))
            .and(header("authorization", token.header_value().as_str()))
            .and(body_bytes(b"{\"x\":1}".to_vec()))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/devices/d/messages/devicebound"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("ETag", "\"msg1\"")
                    .set_body_string("ping"),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/devices/d/messages/devicebound/msg1/abandon"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock_server)
            .await;

        let status = client
            .publish(&OutboundMessage::new(&b"{\"x\":1}"[..]))
            .await
            .unwrap();
        assert_eq!(status, 204);

        let message = client.read().await.unwrap();
        assert_eq!(message.text(), "ping");
        let id = message.message_id.unwrap();

        let status = client.abandon(&id).await.unwrap();
        assert_eq!(status, 204);
    }
}
