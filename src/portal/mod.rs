//! Provisioning portal: the out-of-box configuration flow.
//!
//! While the node is unconfigured it hosts an access point and serves a
//! single-page form where a human enters the network name, secret, and
//! collector address. This module is the platform-independent session
//! logic: route resolution, form decoding, candidate handling, and the
//! persist-then-restart step. The HTTP plumbing lives in [`server`].
//!
//! The route set is closed and resolved once per request rather than
//! string-matched across handlers.

use crate::config::{parse_collector_addr, NetworkConfig};
use crate::storage::{ConfigStore, Eeprom};
use log::{info, warn};

pub mod server;

pub use server::PortalServer;

/// Form field: network name.
pub const FIELD_SSID: &str = "ssid";

/// Form field: network secret.
pub const FIELD_PASSWORD: &str = "password";

/// Form field: collector address.
pub const FIELD_TARGET_IP: &str = "targetIp";

/// Path of the persist-and-restart trigger.
pub const SAVE_PATH: &str = "/saveSettingsAndReboot";

/// The portal's closed route set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Root without a complete submission: serve the static form.
    ShowForm,
    /// Root with all three fields: echo the candidate for confirmation.
    Confirm,
    /// Explicit second user action: persist the candidate and restart.
    Persist,
    /// Anything else: diagnostic echo of the offending request.
    NotFound,
}

impl Route {
    /// Resolve a request to a route.
    pub fn resolve(path: &str, has_all_fields: bool) -> Self {
        match path {
            "/" | "" => {
                if has_all_fields {
                    Self::Confirm
                } else {
                    Self::ShowForm
                }
            }
            SAVE_PATH => Self::Persist,
            _ => Self::NotFound,
        }
    }
}

/// A decoded portal request, independent of the HTTP library.
#[derive(Debug, Clone)]
pub struct PortalRequest {
    /// Request method as text (GET/POST).
    pub method: String,
    /// Path without the query string.
    pub path: String,
    /// Decoded arguments from the query string and form body.
    pub args: Vec<(String, String)>,
}

impl PortalRequest {
    /// Look up an argument by name.
    pub fn arg(&self, name: &str) -> Option<&str> {
        self.args
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn has_all_fields(&self) -> bool {
        self.arg(FIELD_SSID).is_some()
            && self.arg(FIELD_PASSWORD).is_some()
            && self.arg(FIELD_TARGET_IP).is_some()
    }
}

/// Response produced by the session.
#[derive(Debug, Clone)]
pub struct PortalResponse {
    /// HTTP status code.
    pub status: u16,
    /// HTML body.
    pub body: String,
}

/// Side effect requested by the session after the response is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    /// Keep serving.
    None,
    /// Tear down the portal and restart the device.
    Restart,
}

/// Decode an `application/x-www-form-urlencoded` query or body.
pub fn parse_form(input: &str) -> Vec<(String, String)> {
    input
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (percent_decode(key), percent_decode(value))
        })
        .collect()
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => match (hex_val(bytes[i + 1]), hex_val(bytes[i + 2])) {
                (Some(hi), Some(lo)) => {
                    out.push(hi << 4 | lo);
                    i += 3;
                }
                _ => {
                    out.push(b'%');
                    i += 1;
                }
            },
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Escape user input echoed back into HTML.
fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

/// The static provisioning form.
const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Air Quality Node Setup</title>
</head>
<body>
<center>
<h1>Air Quality Node Setup</h1>
<form action="/" method="post">
<p>
<label>SSID:&nbsp;</label><input maxlength="32" name="ssid"><br>
<label>Password:&nbsp;</label><input maxlength="63" name="password"><br>
<label>Target IP:&nbsp;</label><input maxlength="15" name="targetIp"><br>
<input type="submit" value="Send"> <input type="reset">
</p>
</form>
</center>
</body>
</html>"#;

/// Provisioning session state.
///
/// Holds the candidate record between the confirmation step and the
/// explicit "save and reboot" trigger. The session never exits in-process;
/// a successful persist ends with a device restart.
#[derive(Debug, Default)]
pub struct ProvisioningSession {
    candidate: Option<NetworkConfig>,
}

impl ProvisioningSession {
    /// Create a session with no submission yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle one request against the session and the durable store.
    pub fn handle<E: Eeprom>(
        &mut self,
        request: &PortalRequest,
        store: &mut ConfigStore<E>,
    ) -> (PortalResponse, SessionAction) {
        match Route::resolve(&request.path, request.has_all_fields()) {
            Route::ShowForm => (
                PortalResponse {
                    status: 200,
                    body: INDEX_HTML.to_string(),
                },
                SessionAction::None,
            ),
            Route::Confirm => (self.confirm(request), SessionAction::None),
            Route::Persist => self.persist(store),
            Route::NotFound => (Self::not_found(request), SessionAction::None),
        }
    }

    fn confirm(&mut self, request: &PortalRequest) -> PortalResponse {
        // has_all_fields held for this route, so the unwraps cannot fire;
        // default to empty to keep the handler total anyway.
        let ssid = request.arg(FIELD_SSID).unwrap_or_default();
        let password = request.arg(FIELD_PASSWORD).unwrap_or_default();
        let target_ip = request.arg(FIELD_TARGET_IP).unwrap_or_default();

        let candidate = NetworkConfig::new(ssid, password, parse_collector_addr(target_ip));
        info!("Provisioning candidate submitted: {}", candidate);

        let mut body = format!(
            "<p>The ssid is: {}<br>The password is: {}<br>The target IP address is: {}</p><br>\
             <h2><a href=\"/\">Reenter settings</a></h2><br>",
            html_escape(ssid),
            html_escape(password),
            html_escape(target_ip),
        );
        if candidate.is_valid() {
            body.push_str(&format!(
                "<h2><a href=\"{}\">Save settings and reboot</a></h2><br>",
                SAVE_PATH
            ));
        } else {
            warn!("Submitted target address {:?} did not parse", target_ip);
            body.push_str("<p>The target IP address is not valid.</p>");
        }
        self.candidate = Some(candidate);

        PortalResponse { status: 200, body }
    }

    fn persist<E: Eeprom>(&mut self, store: &mut ConfigStore<E>) -> (PortalResponse, SessionAction) {
        let candidate = match &self.candidate {
            Some(c) if c.is_valid() => c,
            _ => {
                warn!("Rejecting save: no valid submission in this session");
                return (
                    PortalResponse {
                        status: 200,
                        body: "<p>Rejecting because no settings were submitted.".to_string(),
                    },
                    SessionAction::None,
                );
            }
        };

        match store.save(candidate) {
            Ok(()) => (
                PortalResponse {
                    status: 200,
                    body: "<p>Rebooting".to_string(),
                },
                SessionAction::Restart,
            ),
            Err(e) => (
                // Leave the candidate in place so the user can simply retry.
                PortalResponse {
                    status: 500,
                    body: format!("<p>Saving settings failed ({}). Please try again.", e),
                },
                SessionAction::None,
            ),
        }
    }

    fn not_found(request: &PortalRequest) -> PortalResponse {
        let mut body = format!(
            "File Not Found\n\nURI: {}\nMethod: {}\nArguments: {}\n",
            html_escape(&request.path),
            html_escape(&request.method),
            request.args.len()
        );
        for (name, value) in &request.args {
            body.push_str(&format!(
                " {}: {}\n",
                html_escape(name),
                html_escape(value)
            ));
        }
        body.push_str("<h2><a href=\"/\">Enter settings</a></h2><br>");
        PortalResponse { status: 404, body }
    }
}
