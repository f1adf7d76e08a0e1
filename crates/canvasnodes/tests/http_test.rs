use canvascore::{EventEmitter, ExecutionError, Node, NodeContext, NodeExecutor, Value};
use canvasnodes::{HttpRequestExecutor, HTTP_REQUEST_TYPE};
use canvasruntime::RuntimeConfig;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

// Accepts one connection, hands back the raw request and answers with a
// canned response.
async fn respond_once(
    status_line: &'static str,
    body: &'static str,
) -> (String, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        let _ = tx.send(request);
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status_line,
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        let _ = socket.shutdown().await;
    });

    (format!("http://{}", addr), rx)
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf);
        if let Some(end) = text.find("\r\n\r\n") {
            let length = text[..end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    if name.eq_ignore_ascii_case("content-length") {
                        value.trim().parse::<usize>().ok()
                    } else {
                        None
                    }
                })
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn create_test_context(node: Node) -> NodeContext {
    NodeContext::new(node, EventEmitter::detached("http"))
}

fn request_node(url: &str) -> Node {
    Node::new("http", HTTP_REQUEST_TYPE).with_data("url", url)
}

#[tokio::test]
async fn test_http_json_response_is_the_result() {
    let (base, request) = respond_once("200 OK", r#"{"items": [1, 2], "ok": true}"#).await;
    let executor = HttpRequestExecutor::new(&RuntimeConfig::default());

    let result = executor
        .execute(create_test_context(request_node(&format!("{}/items", base))))
        .await
        .unwrap();

    assert_eq!(
        result,
        Value::object([
            ("items", Value::Array(vec![Value::Number(1.0), Value::Number(2.0)])),
            ("ok", Value::Bool(true)),
        ])
    );
    let request = request.await.unwrap();
    assert!(request.starts_with("GET /items HTTP/1.1"));
    assert!(request
        .to_lowercase()
        .contains("content-type: application/json"));
}

#[tokio::test]
async fn test_http_error_status_halts_with_status() {
    let (base, _request) = respond_once("500 Internal Server Error", "{}").await;
    let executor = HttpRequestExecutor::new(&RuntimeConfig::default());

    let err = executor
        .execute(create_test_context(request_node(&base)))
        .await
        .unwrap_err();

    assert_eq!(err, ExecutionError::remote_status(500));
}

#[tokio::test]
async fn test_http_empty_body_is_null() {
    let (base, _request) = respond_once("200 OK", "").await;
    let executor = HttpRequestExecutor::new(&RuntimeConfig::default());

    let result = executor
        .execute(create_test_context(request_node(&base)))
        .await
        .unwrap();

    assert_eq!(result, Value::Null);
}

#[tokio::test]
async fn test_http_proxy_prefix_is_applied() {
    let (base, request) = respond_once("200 OK", "[]").await;
    let config = RuntimeConfig {
        proxy_prefix: format!("{}/proxy/", base),
        ..RuntimeConfig::default()
    };
    let executor = HttpRequestExecutor::new(&config);
    let node = request_node("https://api.example.com/users").with_data("useProxy", true);

    executor.execute(create_test_context(node)).await.unwrap();

    let request = request.await.unwrap();
    assert!(
        request.starts_with("GET /proxy/https://api.example.com/users HTTP/1.1"),
        "unexpected request: {}",
        request
    );
}

#[tokio::test]
async fn test_http_post_sends_structured_body_as_json() {
    let (base, request) = respond_once("201 Created", r#"{"id": 7}"#).await;
    let executor = HttpRequestExecutor::new(&RuntimeConfig::default());
    let node = request_node(&base)
        .with_data("method", "POST")
        .with_data("body", Value::object([("name", Value::from("canvas"))]));

    let result = executor.execute(create_test_context(node)).await.unwrap();

    assert_eq!(result.get("id"), Some(&Value::Number(7.0)));
    let request = request.await.unwrap();
    assert!(request.starts_with("POST / HTTP/1.1"));
    assert!(request.ends_with(r#"{"name":"canvas"}"#));
}

#[tokio::test]
async fn test_http_connection_failure_has_no_status() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let executor = HttpRequestExecutor::new(&RuntimeConfig::default());

    let err = executor
        .execute(create_test_context(request_node(&format!("http://{}", addr))))
        .await
        .unwrap_err();

    assert!(matches!(err, ExecutionError::RemoteCall { status: None, .. }));
}
