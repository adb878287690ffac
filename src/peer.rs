//! Peer client: fetches a blob from another node's internal-only endpoint.

use reqwest::{Client, Response, StatusCode};
use std::time::Duration;

use crate::error::{CoreError, CoreResult};

const PEER_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Thin wrapper around a shared [`reqwest::Client`] used to pull blob bytes
/// from a peer's `GET /api/v1/internal/files/{uuid}` endpoint.
pub struct PeerClient {
    http: Client,
}

impl PeerClient {
    /// The client is built with a connect timeout only, not a request
    /// timeout: a hang mid-body-transfer is accepted, matching the reference
    /// implementation, which bounds neither. The connect timeout is
    /// defensive configuration against an unreachable peer, not a substitute
    /// for a full deadline.
    pub fn new() -> Self {
        let http = Client::builder()
            .connect_timeout(PEER_CONNECT_TIMEOUT)
            .build()
            .expect("reqwest client configuration is static and valid");
        Self { http }
    }

    /// Issues the GET against `advertise_addr`'s internal endpoint and
    /// validates the response status, returning the response with its body
    /// unread so the caller can stream it onward without buffering.
    ///
    /// Only a `2xx` response counts as success — a transport error or a
    /// non-2xx status both surface as [`CoreError::Unavailable`] so the
    /// caller can uniformly try the next peer.
    pub async fn fetch_internal(&self, advertise_addr: &str, uuid: &str) -> CoreResult<Response> {
        let url = format!(
            "{}/api/v1/internal/files/{}",
            advertise_addr.trim_end_matches('/'),
            uuid
        );

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|_| CoreError::Unavailable)?;

        if !is_success(response.status()) {
            return Err(CoreError::Unavailable);
        }

        Ok(response)
    }
}

impl Default for PeerClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Only a status in `200..300` counts as a successful peer response. The
/// reference implementation instead treated "no transport error OR status
/// != 200" as success, which is true for nearly every response including
/// hard failures; this is the corrected condition.
fn is_success(status: StatusCode) -> bool {
    status.is_success()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_2xx_counts_as_success() {
        assert!(is_success(StatusCode::OK));
        assert!(is_success(StatusCode::NO_CONTENT));
        assert!(!is_success(StatusCode::NOT_FOUND));
        assert!(!is_success(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!is_success(StatusCode::MOVED_PERMANENTLY));
    }
}
