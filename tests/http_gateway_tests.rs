use crossbeam_channel::Receiver;
use noq_request::api::{ApiError, ApiGateway, HttpGateway, TypeaheadQuery};
use noq_request::config::Settings;
use noq_request::{RequestFile, SelfServiceRequest};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::time::Duration;

/// What the stub server saw.
#[derive(Debug)]
struct Received {
    request_line: String,
    headers: BTreeMap<String, String>,
    body: String,
}

/// Serve one canned HTTP response on a local port, after `delay`.
fn serve_once(status: u16, body: &'static str, delay: Duration) -> (String, Receiver<Received>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = crossbeam_channel::unbounded();

    std::thread::spawn(move || {
        let Ok((stream, _)) = listener.accept() else {
            return;
        };
        let mut reader = BufReader::new(stream.try_clone().unwrap());

        let mut request_line = String::new();
        reader.read_line(&mut request_line).unwrap();
        let mut headers = BTreeMap::new();
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                headers.insert(name.trim().to_lowercase(), value.trim().to_string());
            }
        }
        let length: usize = headers
            .get("content-length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let mut raw = vec![0; length];
        reader.read_exact(&mut raw).unwrap();

        let _ = tx.send(Received {
            request_line: request_line.trim_end().to_string(),
            headers,
            body: String::from_utf8(raw).unwrap(),
        });

        std::thread::sleep(delay);
        let mut stream = stream;
        let _ = write!(
            stream,
            "HTTP/1.1 {} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
    });

    (format!("http://{}", addr), rx)
}

fn settings(api_url: String, token: Option<&str>, csrf: Option<&str>, timeout_secs: u64) -> Settings {
    Settings {
        api_url,
        token: token.map(str::to_string),
        csrf_token: csrf.map(str::to_string),
        timeout: Duration::from_secs(timeout_secs),
        typeahead_debounce: Duration::from_millis(300),
    }
}

fn received(rx: &Receiver<Received>) -> Received {
    rx.recv_timeout(Duration::from_secs(5)).unwrap()
}

#[test]
fn providers_call_carries_credentials() {
    let (url, rx) = serve_once(
        200,
        r#"{"status_code": 200, "data": [{"provider": "aws", "sub_type": "s3"}]}"#,
        Duration::ZERO,
    );
    let gateway = HttpGateway::new(&settings(url, Some("tok-123"), Some("csrf-9"), 5)).unwrap();

    let providers = gateway.configured_providers().unwrap();
    assert_eq!(providers[0].to_string(), "aws/s3");

    let req = received(&rx);
    assert_eq!(req.request_line, "GET /api/v4/providers HTTP/1.1");
    assert_eq!(req.headers.get("authorization").map(String::as_str), Some("Bearer tok-123"));
    assert_eq!(req.headers.get("x-xsrf-token").map(String::as_str), Some("csrf-9"));
    assert_eq!(req.headers.get("accept").map(String::as_str), Some("application/json"));
}

#[test]
fn missing_token_sends_no_authorization() {
    let (url, rx) = serve_once(200, r#"{"status_code": 200, "data": []}"#, Duration::ZERO);
    let gateway = HttpGateway::new(&settings(url, None, None, 5)).unwrap();

    assert!(gateway.configured_providers().unwrap().is_empty());
    let req = received(&rx);
    assert!(!req.headers.contains_key("authorization"));
    assert!(!req.headers.contains_key("x-xsrf-token"));
}

#[test]
fn definition_query_string() {
    let (url, rx) = serve_once(
        200,
        r#"{"status_code": 200, "data": {"template_id": "s3", "provider": "aws", "fields": [{"name": "bucket_name", "required": true}]}}"#,
        Duration::ZERO,
    );
    let gateway = HttpGateway::new(&settings(url, Some("t"), None, 5)).unwrap();

    let definition = gateway.template_definition("aws", "s3").unwrap();
    assert!(definition.fields[0].required);

    let req = received(&rx);
    assert_eq!(
        req.request_line,
        "GET /api/v4/providers/definitions?provider=aws&template_id=s3 HTTP/1.1"
    );
}

#[test]
fn typeahead_prefix_is_encoded() {
    let (url, rx) = serve_once(
        200,
        r#"{"status_code": 200, "data": [{"label": "my bucket", "value": "arn:aws:s3:::my-bucket"}]}"#,
        Duration::ZERO,
    );
    let gateway = HttpGateway::new(&settings(url, Some("t"), None, 5)).unwrap();

    let hits = gateway
        .resource_typeahead(&TypeaheadQuery {
            provider: "aws".to_string(),
            template_id: "s3".to_string(),
            field: "bucket_name".to_string(),
            prefix: "my bucket&x".to_string(),
        })
        .unwrap();
    assert_eq!(hits[0].value, "arn:aws:s3:::my-bucket");

    let req = received(&rx);
    assert_eq!(
        req.request_line,
        "GET /api/v4/self-service/typeahead?provider=aws&template_id=s3&field=bucket_name&prefix=my+bucket%26x HTTP/1.1"
    );
}

#[test]
fn unauthorized_is_session_expired() {
    let (url, _rx) = serve_once(401, r#"{"message": "login required"}"#, Duration::ZERO);
    let gateway = HttpGateway::new(&settings(url, Some("stale"), None, 5)).unwrap();

    assert_eq!(gateway.configured_providers(), Err(ApiError::SessionExpired));
}

#[test]
fn stalled_response_times_out() {
    let (url, _rx) = serve_once(200, r#"{"data": []}"#, Duration::from_secs(4));
    let gateway = HttpGateway::new(&settings(url, Some("t"), None, 1)).unwrap();

    assert_eq!(gateway.configured_providers(), Err(ApiError::Timeout(1)));
}

#[test]
fn submit_posts_json_and_surfaces_rejection() {
    let (url, rx) = serve_once(
        400,
        r#"{"status_code": 400, "data": {"message": "invalid template"}}"#,
        Duration::ZERO,
    );
    let gateway = HttpGateway::new(&settings(url, Some("t"), Some("c"), 5)).unwrap();

    let request = SelfServiceRequest {
        provider: "aws".to_string(),
        sub_type: "s3".to_string(),
        fields: BTreeMap::from([("bucket_name".to_string(), serde_json::json!("logs"))]),
        justification: "audit".to_string(),
        files: vec![RequestFile {
            file_path: "resources/aws/s3/logs.yaml".to_string(),
            repo_name: None,
            previous_body: String::new(),
            template_body: "bucket_name: logs\n".to_string(),
            additions: 1,
        }],
    };

    let err = gateway.submit_request(&request).unwrap_err();
    assert_eq!(
        err,
        ApiError::Rejected {
            status: 400,
            message: "invalid template".to_string()
        }
    );

    let req = received(&rx);
    assert_eq!(req.request_line, "POST /api/v4/self-service/requests HTTP/1.1");
    assert_eq!(req.headers.get("x-xsrf-token").map(String::as_str), Some("c"));
    let sent: SelfServiceRequest = serde_json::from_str(&req.body).unwrap();
    assert_eq!(sent, request);
}
