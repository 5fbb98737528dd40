//! Utility code to help writing relaybot tests.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Mutex};
use url::Url;

use relaybot::telegram::{ChatSink, OutgoingMessage};
use relaybot::tracker::TrackerClient;

pub const TRACKER_TOKEN: &str = "perm:test-token";
pub const TELEGRAM_TOKEN: &str = "test-token";

/// The callback type for HTTP route handlers.
pub type RequestCallback = Box<dyn Send + Fn(Request) -> Response>;

/// HTTP method.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    GET,
    POST,
}

impl Method {
    fn from_str(s: &str) -> Method {
        match s {
            "GET" => Method::GET,
            "POST" => Method::POST,
            _ => panic!("unexpected HTTP method {s}"),
        }
    }
}

/// A builder for preparing a test server.
#[derive(Default)]
pub struct TestBuilder {
    pub handlers: HashMap<(Method, &'static str), RequestCallback>,
}

/// A request received on the HTTP server.
#[derive(Clone, Debug)]
pub struct Request {
    /// The path of the request, such as `/api/issues`.
    pub path: String,
    /// The HTTP method.
    pub method: Method,
    /// Components in the path that were captured with the `{foo}` syntax.
    pub components: HashMap<String, String>,
    /// The query components of the URL (the stuff after `?`).
    pub query: Vec<(String, String)>,
    /// HTTP headers, with lowercase names.
    pub headers: HashMap<String, String>,
    /// The body of the HTTP request (usually a JSON blob).
    pub body: Vec<u8>,
}

impl Request {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// The response the HTTP server should send to the client.
pub struct Response {
    pub code: u32,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new() -> Response {
        Response {
            code: 200,
            body: Vec::new(),
        }
    }

    pub fn json(value: serde_json::Value) -> Response {
        Response::new().body(value.to_string().as_bytes())
    }

    pub fn code(mut self, code: u32) -> Self {
        self.code = code;
        self
    }

    pub fn body(mut self, body: &[u8]) -> Self {
        self.body = Vec::from(body);
        self
    }
}

/// A recording of HTTP requests which can then be validated they are
/// performed in the correct order.
#[derive(Clone)]
pub struct Events(Arc<Mutex<Vec<(Method, String)>>>);

impl Events {
    pub fn new() -> Events {
        Events(Arc::new(Mutex::new(Vec::new())))
    }

    fn push(&self, method: Method, path: String) {
        let mut es = self.0.lock().unwrap();
        es.push((method, path));
    }

    pub fn assert_eq(&self, expected: &[(Method, &str)]) {
        let es = self.0.lock().unwrap();
        for (actual, expected) in es.iter().zip(expected.iter()) {
            if actual.0 != expected.0 || actual.1 != expected.1 {
                panic!("expected request to {expected:?}, but next event was {actual:?}");
            }
        }
        if es.len() > expected.len() {
            panic!(
                "got unexpected extra requests, \
                make sure the event assertion lists all events\n\
                Extras are: {:?} ",
                &es[expected.len()..]
            );
        } else if es.len() < expected.len() {
            panic!(
                "expected additional requests that were never made, \
                make sure the event assertion lists the correct requests\n\
                Extra expected are: {:?}",
                &expected[es.len()..]
            );
        }
    }
}

/// A primitive HTTP server standing in for the tracker and the chat API.
pub struct HttpServer {
    listener: TcpListener,
    /// Handlers to call for specific routes.
    handlers: HashMap<(Method, &'static str), RequestCallback>,
    /// A recording of all requests.
    events: Events,
}

/// A reference on how to connect to the test HTTP server.
pub struct HttpServerHandle {
    pub addr: SocketAddr,
    pub events: Events,
}

impl HttpServerHandle {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn tracker(&self) -> TrackerClient {
        TrackerClient::new(&self.base_url(), TRACKER_TOKEN.to_string().into(), None).unwrap()
    }
}

impl Drop for HttpServerHandle {
    fn drop(&mut self) {
        if let Ok(mut stream) = TcpStream::connect(self.addr) {
            // shut down the server
            let _ = stream.write_all(b"STOP");
            let _ = stream.flush();
        }
    }
}

impl TestBuilder {
    /// Adds an HTTP handler.
    ///
    /// The `path` is the route without the leading slash, like `api/issues`.
    /// A generic route can be configured using curly braces. For example,
    /// `bot{token}/sendMessage` does not match since a component must be a
    /// whole segment, but `{bot}/sendMessage` does, with the value available
    /// in [`Request::components`].
    pub fn handler<R: 'static + Send + Fn(Request) -> Response>(
        mut self,
        method: Method,
        path: &'static str,
        responder: R,
    ) -> Self {
        self.handlers.insert((method, path), Box::new(responder));
        self
    }

    pub fn start(self) -> HttpServerHandle {
        self.maybe_enable_logging();
        HttpServer::new(self.handlers, Events::new())
    }

    /// Enables logging if `TRACKER_TEST_LOG` is set. This can help with
    /// debugging a test.
    pub fn maybe_enable_logging(&self) {
        const LOG_VAR: &str = "TRACKER_TEST_LOG";
        use std::sync::Once;
        static DO_INIT: Once = Once::new();
        if std::env::var_os(LOG_VAR).is_some() {
            DO_INIT.call_once(|| {
                dotenvy::dotenv().ok();
                tracing_subscriber::fmt::Subscriber::builder()
                    .with_env_filter(tracing_subscriber::EnvFilter::from_env(LOG_VAR))
                    .with_ansi(std::env::var_os("DISABLE_COLOR").is_none())
                    .try_init()
                    .unwrap();
            });
        }
    }
}

impl HttpServer {
    pub fn new(
        handlers: HashMap<(Method, &'static str), RequestCallback>,
        events: Events,
    ) -> HttpServerHandle {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = HttpServer {
            listener,
            handlers,
            events: events.clone(),
        };
        std::thread::spawn(move || server.start());
        HttpServerHandle { addr, events }
    }

    fn start(&self) {
        let mut line = String::new();
        'server: loop {
            let (socket, _) = self.listener.accept().unwrap();
            let mut buf = BufReader::new(socket);
            line.clear();
            if buf.read_line(&mut line).unwrap() == 0 {
                // Connection terminated.
                eprintln!("unexpected client drop");
                continue;
            }
            // Read the "GET path HTTP/1.1" line.
            let mut parts = line.split_ascii_whitespace();
            let method = parts.next().unwrap().to_ascii_uppercase();
            if method == "STOP" {
                // Shutdown the server.
                return;
            }
            let path = parts.next().unwrap();
            // The host here doesn't matter, we're just interested in parsing
            // the query string.
            let url = Url::parse(&format!("http://tracker.test{path}")).unwrap();

            let mut headers = HashMap::new();
            let mut content_len = None;
            loop {
                line.clear();
                if buf.read_line(&mut line).unwrap() == 0 {
                    continue 'server;
                }
                if line == "\r\n" {
                    // End of headers.
                    line.clear();
                    break;
                }
                let (name, value) = line.split_once(':').unwrap();
                let name = name.trim().to_ascii_lowercase();
                let value = value.trim().to_string();
                if name == "content-length" {
                    content_len = Some(value.parse::<u64>().unwrap());
                }
                headers.insert(name, value);
            }
            let mut body = vec![0u8; content_len.unwrap_or(0) as usize];
            buf.read_exact(&mut body).unwrap();

            let method = Method::from_str(&method);
            self.events.push(method, url.path().to_string());
            let response = self.route(method, &url, headers, body);

            let buf = buf.get_mut();
            write!(buf, "HTTP/1.1 {}\r\n", response.code).unwrap();
            write!(buf, "Content-Type: application/json\r\n").unwrap();
            write!(buf, "Content-Length: {}\r\n", response.body.len()).unwrap();
            write!(buf, "Connection: close\r\n").unwrap();
            write!(buf, "\r\n").unwrap();
            buf.write_all(&response.body).unwrap();
            buf.flush().unwrap();
        }
    }

    /// Route the request
    fn route(
        &self,
        method: Method,
        url: &Url,
        headers: HashMap<String, String>,
        body: Vec<u8>,
    ) -> Response {
        eprintln!("route {method:?} {url}",);
        let query = url
            .query_pairs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let segments: Vec<_> = url.path_segments().unwrap().collect();
        let path = url.path().to_string();
        for ((route_method, route_pattern), responder) in &self.handlers {
            if *route_method != method {
                continue;
            }
            if let Some(components) = match_route(route_pattern, &segments) {
                let request = Request {
                    method,
                    path,
                    query,
                    components,
                    headers,
                    body,
                };
                tracing::debug!("request={request:?}");
                return responder(request);
            }
        }
        eprintln!(
            "route {method:?} {url} has no handler.\n\
            Add a handler to the context for this route."
        );
        Response::new().code(404).body(b"404 not found")
    }
}

fn match_route(route_pattern: &str, segments: &[&str]) -> Option<HashMap<String, String>> {
    let mut segments = segments.iter();
    let mut components = HashMap::new();
    for part in route_pattern.split('/') {
        match segments.next() {
            None => return None,
            Some(actual) => {
                if part.starts_with('{') {
                    let part = part[1..part.len() - 1].to_string();
                    components.insert(part, actual.to_string());
                } else if *actual != part {
                    return None;
                }
            }
        }
    }
    if segments.next().is_some() {
        return None;
    }
    Some(components)
}

/// Collects everything sent to the chat.
#[derive(Clone, Default)]
pub struct RecordingSink {
    pub sent: Arc<Mutex<Vec<OutgoingMessage>>>,
    /// When set, every delivery fails.
    pub broken: bool,
}

impl RecordingSink {
    pub fn messages(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ChatSink for RecordingSink {
    async fn send(&self, message: &OutgoingMessage) -> anyhow::Result<()> {
        if self.broken {
            anyhow::bail!("chat is down");
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// A notification element as the tracker would send it.
#[bon::builder]
pub fn notification(
    id: &str,
    content: Option<serde_json::Value>,
    metadata: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut obj = serde_json::json!({ "id": id });
    if let Some(content) = content {
        obj["content"] = content;
    }
    if let Some(metadata) = metadata {
        obj["metadata"] = metadata;
    }
    obj
}

/// An issue element as the tracker would send it.
#[bon::builder]
pub fn issue(
    id_readable: &str,
    summary: Option<&str>,
    updated: i64,
    state: Option<&str>,
) -> serde_json::Value {
    let number = id_readable.rsplit('-').next().unwrap_or("0");
    serde_json::json!({
        "id": format!("2-{number}"),
        "idReadable": id_readable,
        "summary": summary.unwrap_or("Something broke"),
        "description": null,
        "updated": updated,
        "customFields": [
            {"name": "Priority", "value": {"name": "Normal"}},
            {"name": "State", "value": state.map(|name| serde_json::json!({"name": name}))}
        ]
    })
}
