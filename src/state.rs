use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::auth::AuthService;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<AuthService>,
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(service: Arc<AuthService>, shutdown: CancellationToken) -> Self {
        Self { service, shutdown }
    }

    /// Per-request context, cancelled when the server starts shutting down.
    pub fn request_ctx(&self) -> CancellationToken {
        self.shutdown.child_token()
    }
}
