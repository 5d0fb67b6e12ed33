//! Generation lifecycle: validation, transport selection, timing and the
//! single-flight busy guard.

use crate::config::ImagenConfig;
use crate::credential::CredentialStore;
use crate::error::{ImagenError, Result};
use crate::image::providers::{DirectClient, RelayClient};
use crate::image::{GenerationOutcome, GenerationRequest, ImageTransport, TransportMode};
use secrecy::ExposeSecret;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Where the controller is in the request lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ControllerState {
    /// Ready for a submission.
    #[default]
    Idle,
    /// Checking the request and the selected transport's inputs.
    Validating,
    /// Waiting on the provider.
    Requesting,
    /// The provider answered; about to return to idle.
    Succeeded,
    /// The submission failed; about to return to idle.
    Failed,
}

/// What the user should see after a failed submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    /// Top-level error message.
    pub message: String,
    /// Underlying causes, outermost first.
    pub trace: Vec<String>,
}

impl FailureReport {
    fn from_error(err: &ImagenError) -> Self {
        let mut trace = Vec::new();
        let mut source = std::error::Error::source(err);
        while let Some(cause) = source {
            trace.push(cause.to_string());
            source = cause.source();
        }
        Self {
            message: err.to_string(),
            trace,
        }
    }
}

/// Runs image generations for one user session.
///
/// At most one submission is in flight at a time; a concurrent
/// [`submit`](Self::submit) fails immediately with [`ImagenError::Busy`].
pub struct GenerationController {
    config: ImagenConfig,
    credentials: CredentialStore,
    http: reqwest::Client,
    busy: AtomicBool,
    state: Mutex<ControllerState>,
    last_failure: Mutex<Option<FailureReport>>,
}

impl GenerationController {
    /// Creates a controller with the given settings and key store.
    pub fn new(config: ImagenConfig, credentials: CredentialStore) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            config,
            credentials,
            http: builder.build()?,
            busy: AtomicBool::new(false),
            state: Mutex::new(ControllerState::Idle),
            last_failure: Mutex::new(None),
        })
    }

    /// Creates a controller from the environment, with a file-backed key store.
    pub fn from_env() -> Result<Self> {
        let config = ImagenConfig::from_env();
        let credentials = CredentialStore::open(config.credential_path.clone());
        Self::new(config, credentials)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ControllerState {
        *lock(&self.state)
    }

    /// Returns true while a submission is outstanding.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Report for the most recent failed submission, cleared on success.
    pub fn last_failure(&self) -> Option<FailureReport> {
        lock(&self.last_failure).clone()
    }

    /// The settings this controller was built with.
    pub fn config(&self) -> &ImagenConfig {
        &self.config
    }

    /// The user's key store.
    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Mutable access to the key store. Not available while a submission
    /// borrows the controller.
    pub fn credentials_mut(&mut self) -> &mut CredentialStore {
        &mut self.credentials
    }

    /// Generates images for `request` over the chosen transport.
    ///
    /// Fails with [`ImagenError::Validation`] before any network call when
    /// the prompt is empty or the transport's input is missing, with
    /// [`ImagenError::Busy`] when another submission is outstanding, and
    /// with [`ImagenError::Transport`] or [`ImagenError::Network`] when the
    /// exchange fails. An empty image list is a success.
    pub async fn submit(
        &self,
        request: &GenerationRequest,
        mode: TransportMode,
    ) -> Result<GenerationOutcome> {
        let _guard = BusyGuard::acquire(self).ok_or(ImagenError::Busy)?;

        self.set_state(ControllerState::Validating);
        let transport = match self.transport_for(request, mode) {
            Ok(transport) => transport,
            Err(e) => {
                tracing::debug!(%mode, error = %e, "submission rejected");
                self.record_failure(&e);
                return Err(e);
            }
        };

        self.set_state(ControllerState::Requesting);
        tracing::info!(
            %mode,
            transport = transport.name(),
            count = request.count(),
            aspect_ratio = %request.aspect_ratio(),
            "generation started"
        );
        let start = Instant::now();

        match transport.request_images(request).await {
            Ok(sources) => {
                self.set_state(ControllerState::Succeeded);
                let outcome = GenerationOutcome {
                    sources,
                    elapsed: start.elapsed(),
                    mode,
                };
                if outcome.is_empty() {
                    tracing::warn!(%mode, "no images returned; check the log or switch transport");
                }
                tracing::info!(
                    %mode,
                    images = outcome.sources.len(),
                    elapsed_ms = outcome.elapsed.as_millis() as u64,
                    "generation finished"
                );
                *lock(&self.last_failure) = None;
                Ok(outcome)
            }
            Err(e) => {
                self.set_state(ControllerState::Failed);
                tracing::error!(%mode, error = %e, "generation failed");
                self.record_failure(&e);
                Err(e)
            }
        }
    }

    fn transport_for(
        &self,
        request: &GenerationRequest,
        mode: TransportMode,
    ) -> Result<Box<dyn ImageTransport>> {
        if request.prompt().is_empty() {
            return Err(ImagenError::Validation("prompt is required".into()));
        }

        match mode {
            TransportMode::Relay => {
                let endpoint = self.config.relay_endpoint.trim();
                if endpoint.is_empty() {
                    return Err(ImagenError::Validation("relay endpoint is required".into()));
                }
                let client = RelayClient::builder()
                    .endpoint(endpoint)
                    .client(self.http.clone())
                    .build()?;
                Ok(Box::new(client))
            }
            TransportMode::Direct => {
                let key = self
                    .credentials
                    .get()
                    .map(|key| key.expose_secret().trim())
                    .filter(|key| !key.is_empty())
                    .ok_or_else(|| {
                        ImagenError::Validation("an API key is required for direct mode".into())
                    })?;
                let client = DirectClient::builder()
                    .api_key(key)
                    .endpoint(&self.config.direct_endpoint)
                    .client(self.http.clone())
                    .build()?;
                Ok(Box::new(client))
            }
        }
    }

    fn set_state(&self, state: ControllerState) {
        *lock(&self.state) = state;
    }

    fn record_failure(&self, err: &ImagenError) {
        *lock(&self.last_failure) = Some(FailureReport::from_error(err));
    }
}

/// Holds the busy flag for one submission and returns the controller to
/// `Idle` when dropped, including when the submission future is dropped.
struct BusyGuard<'a> {
    controller: &'a GenerationController,
}

impl<'a> BusyGuard<'a> {
    fn acquire(controller: &'a GenerationController) -> Option<Self> {
        controller
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { controller })
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.controller.set_state(ControllerState::Idle);
        self.controller.busy.store(false, Ordering::Release);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
