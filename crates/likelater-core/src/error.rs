use thiserror::Error;

/// Failure taxonomy for the capture/reconcile/auth core.
///
/// A 204 from the currently-playing endpoint is deliberately not in here:
/// "no active playback" is a defined outcome (the capture is removed), not
/// a failure.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The Spotify client id has not been configured.  Fatal to the auth
    /// flow; callers must not have issued any network traffic.
    #[error("spotify client id is not configured")]
    MissingClientId,

    /// An authenticated call was attempted without an access token.
    #[error("not connected to spotify")]
    NotConnected,

    /// The authorization callback was unusable: missing code, lost
    /// verifier, or a dismissed browser session.  The flow returns to
    /// disconnected.
    #[error("authorization callback rejected: {0}")]
    AuthCallback(String),

    /// Transport failure talking to a remote endpoint.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote payload did not have the expected shape or status.
    #[error("unexpected response: {0}")]
    Decode(String),

    /// Reading or writing the queue document failed.
    #[error("queue persistence failed: {0}")]
    Persistence(#[from] std::io::Error),
}
