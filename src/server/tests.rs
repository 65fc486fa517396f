//! Tests for the HTTP server implementation.

#[cfg(test)]
mod server_tests {
    use std::io::{self, Cursor};
    use std::pin::Pin;
    use std::sync::Arc;
    use std::task::{Context, Poll};
    use serde_json::{json, Value};
    use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

    use crate::dispatch::{ArgumentList, Dispatcher, HandlerDescriptor, Outcome};
    use crate::server::{Error, HttpResponse, HttpServer, ServerConfig, StatusCode};

    // Mock TcpStream for testing
    struct MockTcpStream {
        read_data: Cursor<Vec<u8>>,
        write_data: Vec<u8>,
    }

    impl MockTcpStream {
        fn new(read_data: Vec<u8>) -> Self {
            Self {
                read_data: Cursor::new(read_data),
                write_data: Vec::new(),
            }
        }

        fn written_data(&self) -> &[u8] {
            &self.write_data
        }

        fn written_body(&self) -> Value {
            let text = String::from_utf8_lossy(&self.write_data);
            let (_, body) = text.split_once("\r\n\r\n").expect("response has a header block");
            serde_json::from_str(body).expect("response body is JSON")
        }
    }

    impl AsyncRead for MockTcpStream {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            let this = self.get_mut();
            let n = std::io::Read::read(&mut this.read_data, buf.initialize_unfilled())?;
            buf.advance(n);
            Poll::Ready(Ok(()))
        }
    }

    impl AsyncWrite for MockTcpStream {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            let this = self.get_mut();
            this.write_data.extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn test_dispatcher() -> Arc<Dispatcher> {
        let mut dispatcher = Dispatcher::new();
        dispatcher
            .get("/products/{id}", HandlerDescriptor::callable(|args: ArgumentList| {
                Ok(Outcome::success(json!({ "id": args.require_param(0)? })))
            }))
            .unwrap()
            .post("/products", HandlerDescriptor::callable(|args: ArgumentList| {
                Ok(Outcome::created(json!({ "received": args.body(0) })))
            }))
            .unwrap()
            .get("/boom", HandlerDescriptor::callable(|_args: ArgumentList| {
                Err("inventory service unavailable".into())
            }))
            .unwrap();
        Arc::new(dispatcher)
    }

    async fn roundtrip(request: &[u8], config: &ServerConfig) -> (Result<(), Error>, MockTcpStream) {
        let mut stream = MockTcpStream::new(request.to_vec());
        let result = HttpServer::handle_connection(&mut stream, test_dispatcher(), config).await;
        (result, stream)
    }

    #[tokio::test]
    async fn test_server_creation() {
        let config = ServerConfig {
            addr: "127.0.0.1:8080".parse().unwrap(),
            max_connections: 100,
            read_buffer_size: 4096,
            max_request_size: 65536,
        };

        let server = HttpServer::new(config.clone(), Dispatcher::new());
        assert_eq!(server.config.addr, config.addr);
        assert_eq!(server.config.max_connections, config.max_connections);
        assert_eq!(server.config.read_buffer_size, config.read_buffer_size);
        assert!(server.dispatcher.routes().is_empty());
    }

    #[tokio::test]
    async fn test_server_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.addr, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.max_connections, 1024);
        assert_eq!(config.read_buffer_size, 8192);
        assert_eq!(config.max_request_size, 1024 * 1024);
    }

    #[tokio::test]
    async fn test_handle_connection_with_valid_request() {
        let request = b"GET /products/42 HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let (result, stream) = roundtrip(request, &ServerConfig::default()).await;

        assert!(result.is_ok());
        let response = String::from_utf8_lossy(stream.written_data());
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.contains("Content-Type: application/json\r\n"));
        assert!(response.contains("Access-Control-Allow-Origin: *\r\n"));
        assert_eq!(stream.written_body(), json!({ "success": true, "data": { "id": "42" } }));
    }

    #[tokio::test]
    async fn test_handle_connection_with_not_found() {
        let request = b"GET /does/not/exist HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let (result, stream) = roundtrip(request, &ServerConfig::default()).await;

        assert!(result.is_ok());
        let response = String::from_utf8_lossy(stream.written_data());
        assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert_eq!(stream.written_body(), json!({ "error": "Not Found" }));
    }

    #[tokio::test]
    async fn test_handle_connection_with_invalid_request() {
        let request = b"INVALID REQUEST";
        let (result, stream) = roundtrip(request, &ServerConfig::default()).await;

        assert!(matches!(result, Err(Error::ParseError(_))));
        let response = String::from_utf8_lossy(stream.written_data());
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        let body = stream.written_body();
        assert!(body["error"].as_str().unwrap().starts_with("Error parsing request:"));
    }

    #[tokio::test]
    async fn test_body_spanning_several_reads() {
        let body = r#"{"title":"Lamp","price":19}"#;
        let request = format!(
            "POST /products HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        let config = ServerConfig {
            read_buffer_size: 16,
            ..ServerConfig::default()
        };
        let (result, stream) = roundtrip(request.as_bytes(), &config).await;

        assert!(result.is_ok());
        let response = String::from_utf8_lossy(stream.written_data());
        assert!(response.starts_with("HTTP/1.1 201 Created\r\n"));
        assert_eq!(stream.written_body(), json!({ "received": { "title": "Lamp", "price": 19 } }));
    }

    #[tokio::test]
    async fn test_payload_too_large() {
        let request = b"POST /products HTTP/1.1\r\nHost: localhost\r\nContent-Length: 5000\r\n\r\nabc";
        let config = ServerConfig {
            max_request_size: 1024,
            ..ServerConfig::default()
        };
        let (result, stream) = roundtrip(request, &config).await;

        assert!(matches!(result, Err(Error::PayloadTooLarge(1024))));
        let response = String::from_utf8_lossy(stream.written_data());
        assert!(response.starts_with("HTTP/1.1 413 Payload Too Large\r\n"));
    }

    #[tokio::test]
    async fn test_content_length_beyond_usize() {
        let request = b"POST /products HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: 18446744073709551615\r\n\r\n{}";
        let (result, stream) = roundtrip(request, &ServerConfig::default()).await;

        assert!(matches!(result, Err(Error::PayloadTooLarge(1048576))));
        let response = String::from_utf8_lossy(stream.written_data());
        assert!(response.starts_with("HTTP/1.1 413 Payload Too Large\r\n"));
        assert_eq!(stream.written_body(), json!({ "error": "Request exceeds 1048576 bytes" }));
    }

    #[tokio::test]
    async fn test_preflight_over_the_wire() {
        let request = b"OPTIONS /products/1 HTTP/1.1\r\nHost: localhost\r\nOrigin: http://admin.local\r\n\r\n";
        let (result, stream) = roundtrip(request, &ServerConfig::default()).await;

        assert!(result.is_ok());
        let response = String::from_utf8_lossy(stream.written_data());
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.contains("Access-Control-Max-Age: 86400\r\n"));
        assert!(response.contains("Content-Length: 0\r\n"));
        assert!(response.ends_with("\r\n\r\n"));
    }

    #[tokio::test]
    async fn test_handler_error_does_not_stop_later_requests() {
        let dispatcher = test_dispatcher();
        let config = ServerConfig::default();

        let mut failing = MockTcpStream::new(b"GET /boom HTTP/1.1\r\nHost: localhost\r\n\r\n".to_vec());
        let result = HttpServer::handle_connection(&mut failing, dispatcher.clone(), &config).await;
        assert!(result.is_ok());
        let response = String::from_utf8_lossy(failing.written_data());
        assert!(response.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
        assert_eq!(failing.written_body(), json!({ "error": "inventory service unavailable" }));

        let mut next = MockTcpStream::new(b"GET /products/7 HTTP/1.1\r\nHost: localhost\r\n\r\n".to_vec());
        let result = HttpServer::handle_connection(&mut next, dispatcher, &config).await;
        assert!(result.is_ok());
        assert!(String::from_utf8_lossy(next.written_data()).starts_with("HTTP/1.1 200 OK\r\n"));
    }

    #[tokio::test]
    async fn test_empty_connection() {
        let (result, stream) = roundtrip(b"", &ServerConfig::default()).await;
        assert!(result.is_ok());
        assert!(stream.written_data().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_dispatcher() {
        let dispatcher = test_dispatcher();
        let config = Arc::new(ServerConfig::default());

        let mut handles = Vec::new();
        for i in 0..8 {
            let dispatcher = dispatcher.clone();
            let config = config.clone();
            handles.push(tokio::spawn(async move {
                let request = format!("GET /products/{i} HTTP/1.1\r\nHost: localhost\r\n\r\n");
                let mut stream = MockTcpStream::new(request.into_bytes());
                HttpServer::handle_connection(&mut stream, dispatcher, &config).await.unwrap();
                (i, stream.written_body())
            }));
        }

        for handle in handles {
            let (i, body) = handle.await.unwrap();
            assert_eq!(body["data"]["id"], json!(i.to_string()));
        }
    }

    #[test]
    fn test_status_code_reason_phrase() {
        assert_eq!(StatusCode::Ok.reason_phrase(), "OK");
        assert_eq!(StatusCode::NotFound.reason_phrase(), "Not Found");
        assert_eq!(StatusCode::PayloadTooLarge.reason_phrase(), "Payload Too Large");
        assert_eq!(StatusCode::Created.code(), 201);
        assert!(StatusCode::Created.is_success());
        assert!(!StatusCode::NotFound.is_success());
    }

    #[test]
    fn test_http_response_with_body_string() {
        let body = "Hello, world!";
        let response = HttpResponse::new(StatusCode::Ok).with_body_string(body);

        assert_eq!(response.body, body.as_bytes());
        assert_eq!(response.get_header("Content-Length"), Some("13"));
        assert_eq!(response.get_header("Server"), Some("cms-dispatch"));
    }

    #[test]
    fn test_http_response_header_replacement() {
        let mut response = HttpResponse::new(StatusCode::Ok)
            .with_header("X-Custom", "one")
            .with_header("x-custom", "two");
        assert_eq!(response.header_count("X-Custom"), 1);
        assert_eq!(response.get_header("X-CUSTOM"), Some("two"));

        response.append_header("X-Custom", "three");
        assert_eq!(response.header_count("X-Custom"), 2);

        response.remove_header("X-Custom");
        assert_eq!(response.header_count("X-Custom"), 0);
    }

    #[test]
    fn test_http_response_with_json() {
        let response = HttpResponse::new(StatusCode::Created)
            .with_json(&json!({ "id": 5 }))
            .unwrap();
        assert_eq!(response.get_header("Content-Type"), Some("application/json"));
        assert_eq!(response.json_body().unwrap(), json!({ "id": 5 }));
    }

    #[test]
    fn test_http_response_to_bytes() {
        let response = HttpResponse::new(StatusCode::Ok)
            .with_content_type("text/plain")
            .with_body_string("Hello, world!");

        let bytes = response.to_bytes();
        let response_str = String::from_utf8_lossy(&bytes);

        assert!(response_str.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response_str.contains("Content-Type: text/plain\r\n"));
        assert!(response_str.contains("Content-Length: 13\r\n"));
        assert!(response_str.contains("Server: cms-dispatch\r\n"));
        assert!(response_str.ends_with("\r\n\r\nHello, world!"));
    }

    #[test]
    fn test_to_bytes_adds_missing_content_length() {
        let bytes = HttpResponse::new(StatusCode::NoContent).to_bytes();
        let response_str = String::from_utf8_lossy(&bytes);
        assert!(response_str.starts_with("HTTP/1.1 204 No Content\r\n"));
        assert!(response_str.contains("Content-Length: 0\r\n"));
    }
}
