use std::sync::{Arc, Mutex};
use std::thread;

use tiny_http::{Header, Response, Server};

#[derive(Debug, Clone)]
pub(crate) struct CapturedRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(header_name, _)| header_name.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }
}

pub(crate) struct MockReply {
    status: u16,
    content_type: Option<&'static str>,
    body: String,
}

impl MockReply {
    pub fn json(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: Some("application/json"),
            body: body.to_string(),
        }
    }

    pub fn html(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: Some("text/html; charset=utf-8"),
            body: body.to_string(),
        }
    }
}

/// Recognizer stand-in: a real HTTP server on `127.0.0.1:0` answering with
/// whatever the handler returns and recording every request it saw.
pub(crate) struct MockBackend {
    server: Arc<Server>,
    addr: String,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    join: Option<thread::JoinHandle<()>>,
}

impl MockBackend {
    pub fn start<F>(handler: F) -> Self
    where
        F: Fn(&CapturedRequest) -> MockReply + Send + 'static,
    {
        let server = Arc::new(Server::http("127.0.0.1:0").expect("bind mock backend"));
        let addr = server
            .server_addr()
            .to_ip()
            .map(|a| a.to_string())
            .expect("mock backend addr");
        let requests = Arc::new(Mutex::new(Vec::new()));

        let server_for_thread = Arc::clone(&server);
        let requests_for_thread = Arc::clone(&requests);
        let join = thread::spawn(move || {
            for mut request in server_for_thread.incoming_requests() {
                let mut body = Vec::new();
                let _ = request.as_reader().read_to_end(&mut body);
                let captured = CapturedRequest {
                    method: request.method().as_str().to_string(),
                    url: request.url().to_string(),
                    headers: request
                        .headers()
                        .iter()
                        .map(|h| (h.field.as_str().as_str().to_string(), h.value.as_str().to_string()))
                        .collect(),
                    body,
                };
                let reply = handler(&captured);
                if let Ok(mut seen) = requests_for_thread.lock() {
                    seen.push(captured);
                }
                let mut response =
                    Response::from_data(reply.body.into_bytes()).with_status_code(reply.status);
                if let Some(content_type) = reply.content_type {
                    if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], content_type.as_bytes()) {
                        response = response.with_header(header);
                    }
                }
                let _ = request.respond(response);
            }
        });

        Self {
            server,
            addr,
            requests,
            join: Some(join),
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().map(|seen| seen.clone()).unwrap_or_default()
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.server.unblock();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}
