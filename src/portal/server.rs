//! HTTP plumbing for the provisioning portal.
//!
//! Uses `tiny_http`, which works on both host and ESP32 (via `std::net`).
//! The server is polled with a short receive timeout from the single
//! control loop, so serving requests never blocks the device for longer
//! than one poll.

use super::{parse_form, PortalRequest, ProvisioningSession, SessionAction};
use crate::storage::{ConfigStore, Eeprom};
use log::{info, warn};
use std::net::SocketAddr;
use std::time::Duration;
use tiny_http::{Response, Server};

/// How long one poll waits for an incoming request.
pub const PORTAL_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// The provisioning web server.
pub struct PortalServer {
    server: Server,
}

impl PortalServer {
    /// Bind the portal to the given address, e.g. `192.168.1.1:80`.
    pub fn bind(addr: &str) -> Result<Self, std::io::Error> {
        let server = Server::http(addr).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::AddrInUse, format!("{}", e))
        })?;
        info!("Provisioning portal listening on http://{}/", addr);
        Ok(Self { server })
    }

    /// The bound address (useful when binding to an ephemeral port).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.server_addr().to_ip()
    }

    /// Serve at most one pending request, then return.
    ///
    /// Returns the session's requested side effect; the caller owns the
    /// actual teardown and restart. The response is flushed before the
    /// restart signal is reported, so the "Rebooting" page reaches the user.
    pub fn poll<E: Eeprom>(
        &self,
        session: &mut ProvisioningSession,
        store: &mut ConfigStore<E>,
    ) -> Result<SessionAction, std::io::Error> {
        let mut request = match self.server.recv_timeout(PORTAL_POLL_TIMEOUT)? {
            Some(request) => request,
            None => return Ok(SessionAction::None),
        };

        let decoded = Self::decode_request(&mut request);
        let (response, action) = session.handle(&decoded, store);

        let content_type =
            tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"text/html"[..])
                .expect("static header");
        let http_response = Response::from_string(response.body)
            .with_status_code(response.status)
            .with_header(content_type);
        if let Err(e) = request.respond(http_response) {
            warn!("Failed to send portal response: {}", e);
        }

        Ok(action)
    }

    /// Decode a `tiny_http` request into the session's representation,
    /// merging query-string and form-body arguments.
    fn decode_request(request: &mut tiny_http::Request) -> PortalRequest {
        let method = request.method().to_string();
        let url = request.url().to_string();
        let (path, query) = match url.split_once('?') {
            Some((path, query)) => (path.to_string(), query.to_string()),
            None => (url, String::new()),
        };

        let mut args = parse_form(&query);

        let mut body = String::new();
        if let Err(e) = request.as_reader().read_to_string(&mut body) {
            warn!("Failed to read request body: {}", e);
        }
        if !body.is_empty() {
            args.extend(parse_form(&body));
        }

        PortalRequest { method, path, args }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_collector_addr;
    use crate::storage::MemoryEeprom;
    use std::io::{Read, Write};
    use std::net::TcpStream;

    /// Blocking raw HTTP exchange against the portal.
    fn http_exchange(addr: SocketAddr, raw_request: String) -> String {
        let mut stream = TcpStream::connect(addr).expect("connect failed");
        stream
            .write_all(raw_request.as_bytes())
            .expect("write failed");
        let mut response = String::new();
        stream
            .read_to_string(&mut response)
            .expect("read failed");
        response
    }

    /// Poll the server until the client thread finishes, collecting any
    /// restart signal along the way.
    fn poll_until_done(
        server: &PortalServer,
        session: &mut ProvisioningSession,
        store: &mut ConfigStore<MemoryEeprom>,
        client: std::thread::JoinHandle<String>,
    ) -> (String, SessionAction) {
        let mut action = SessionAction::None;
        let mut polls = 0;
        while !client.is_finished() {
            if server.poll(session, store).expect("poll failed") == SessionAction::Restart {
                action = SessionAction::Restart;
            }
            polls += 1;
            assert!(polls < 200, "client never completed");
        }
        (client.join().expect("client panicked"), action)
    }

    #[test]
    fn test_get_root_serves_form_over_http() {
        let server = PortalServer::bind("127.0.0.1:0").expect("bind failed");
        let addr = server.local_addr().expect("no local addr");
        let mut session = ProvisioningSession::new();
        let mut store = ConfigStore::new(MemoryEeprom::new());

        let client = std::thread::spawn(move || {
            http_exchange(
                addr,
                "GET / HTTP/1.1\r\nHost: portal\r\nConnection: close\r\n\r\n".to_string(),
            )
        });
        let (response, action) = poll_until_done(&server, &mut session, &mut store, client);

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("<form"));
        assert_eq!(action, SessionAction::None);
    }

    #[test]
    fn test_post_submission_and_save_over_http() {
        let server = PortalServer::bind("127.0.0.1:0").expect("bind failed");
        let addr = server.local_addr().expect("no local addr");
        let mut session = ProvisioningSession::new();
        let mut store = ConfigStore::new(MemoryEeprom::new());

        let body = "ssid=Home&password=secret123&targetIp=192.168.1.50";
        let post = format!(
            "POST / HTTP/1.1\r\nHost: portal\r\nConnection: close\r\n\
             Content-Type: application/x-www-form-urlencoded\r\n\
             Content-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        let client = std::thread::spawn(move || http_exchange(addr, post));
        let (response, action) = poll_until_done(&server, &mut session, &mut store, client);
        assert!(response.contains("Save settings and reboot"));
        assert_eq!(action, SessionAction::None);

        let client = std::thread::spawn(move || {
            http_exchange(
                addr,
                "GET /saveSettingsAndReboot HTTP/1.1\r\nHost: portal\r\nConnection: close\r\n\r\n"
                    .to_string(),
            )
        });
        let (response, action) = poll_until_done(&server, &mut session, &mut store, client);
        assert!(response.contains("Rebooting"));
        assert_eq!(action, SessionAction::Restart);

        let stored = store.load();
        assert_eq!(stored.ssid, "Home");
        assert_eq!(stored.collector_addr, parse_collector_addr("192.168.1.50"));
    }

    #[test]
    fn test_query_string_arguments_accepted() {
        let server = PortalServer::bind("127.0.0.1:0").expect("bind failed");
        let addr = server.local_addr().expect("no local addr");
        let mut session = ProvisioningSession::new();
        let mut store = ConfigStore::new(MemoryEeprom::new());

        let client = std::thread::spawn(move || {
            http_exchange(
                addr,
                "GET /?ssid=Home&password=x&targetIp=10.0.0.1 HTTP/1.1\r\n\
                 Host: portal\r\nConnection: close\r\n\r\n"
                    .to_string(),
            )
        });
        let (response, _) = poll_until_done(&server, &mut session, &mut store, client);
        assert!(response.contains("Save settings and reboot"));
    }

    #[test]
    fn test_unknown_path_is_404_over_http() {
        let server = PortalServer::bind("127.0.0.1:0").expect("bind failed");
        let addr = server.local_addr().expect("no local addr");
        let mut session = ProvisioningSession::new();
        let mut store = ConfigStore::new(MemoryEeprom::new());

        let client = std::thread::spawn(move || {
            http_exchange(
                addr,
                "GET /nope HTTP/1.1\r\nHost: portal\r\nConnection: close\r\n\r\n".to_string(),
            )
        });
        let (response, _) = poll_until_done(&server, &mut session, &mut store, client);
        assert!(response.starts_with("HTTP/1.1 404"));
        assert!(response.contains("/nope"));
    }

    #[test]
    fn test_poll_without_traffic_returns_promptly() {
        let server = PortalServer::bind("127.0.0.1:0").expect("bind failed");
        let mut session = ProvisioningSession::new();
        let mut store = ConfigStore::new(MemoryEeprom::new());

        let start = std::time::Instant::now();
        let action = server.poll(&mut session, &mut store).expect("poll failed");
        assert_eq!(action, SessionAction::None);
        assert!(start.elapsed() < PORTAL_POLL_TIMEOUT + Duration::from_millis(100));
    }
}
