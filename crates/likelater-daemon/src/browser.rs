//! Desktop stand-in for the platform webview session: open the
//! authorization URL in the system browser and catch the provider redirect
//! on a loopback listener.  Resolves with the full callback URL.

use async_trait::async_trait;
use likelater_core::auth::AuthPresenter;
use likelater_core::error::CoreError;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{info, warn};
use url::Url;

pub struct LoopbackPresenter {
    redirect_uri: String,
}

impl LoopbackPresenter {
    pub fn new(redirect_uri: String) -> Self {
        Self { redirect_uri }
    }

    fn bind_address(&self) -> Result<String, CoreError> {
        let url = Url::parse(&self.redirect_uri)
            .map_err(|e| CoreError::AuthCallback(format!("bad redirect uri: {}", e)))?;
        let host = url.host_str().unwrap_or("127.0.0.1").to_string();
        let port = url.port().unwrap_or(80);
        Ok(format!("{}:{}", host, port))
    }
}

#[async_trait]
impl AuthPresenter for LoopbackPresenter {
    async fn present(&self, auth_url: &str, _callback_scheme: &str) -> Result<String, CoreError> {
        // Bind first: if the port is taken we fail before sending the
        // operator to the browser.
        let addr = self.bind_address()?;
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| CoreError::AuthCallback(format!("bind {} failed: {}", addr, e)))?;

        if let Err(e) = open::that(auth_url) {
            warn!("could not open browser automatically: {}", e);
        }
        info!(
            "Waiting for Spotify redirect on http://{} (if no browser opened, visit {})",
            addr, auth_url
        );

        let (mut socket, _) = listener
            .accept()
            .await
            .map_err(|e| CoreError::AuthCallback(format!("accept failed: {}", e)))?;

        let mut buffer = [0u8; 4096];
        let n = socket
            .read(&mut buffer)
            .await
            .map_err(|e| CoreError::AuthCallback(format!("read failed: {}", e)))?;
        let request = String::from_utf8_lossy(&buffer[..n]);

        let callback = request_line_to_callback(&request, &self.redirect_uri)
            .ok_or_else(|| CoreError::AuthCallback("no callback path in request".to_string()))?;

        let body = "You can close this tab and return to LikeLater.";
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.ok();
        socket.flush().await.ok();

        Ok(callback)
    }
}

/// Rebuild the full callback URL from the HTTP request line, e.g.
/// `GET /callback?code=... HTTP/1.1` joined against the redirect URI.
fn request_line_to_callback(request: &str, redirect_uri: &str) -> Option<String> {
    let first_line = request.lines().next()?;
    let path = first_line.split_whitespace().nth(1)?;
    let base = Url::parse(redirect_uri).ok()?;
    let joined = base.join(path).ok()?;
    Some(joined.to_string())
}
