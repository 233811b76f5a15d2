//! `reqwest` clients for remote collaborators.
//!
//! Each client implements the matching port from `nexus_core::collaborators`
//! so a deployment can swap an in-process service for a remote one without
//! touching the runtime. Calls carry no retry; the timeout comes from the
//! shared [`reqwest::Client`].
//!
//! Response classification:
//!
//! | Outcome | Error |
//! |---------|-------|
//! | transport failure, timeout, 5xx | [`CollaboratorError::Unreachable`] |
//! | 4xx | [`CollaboratorError::Rejected`] with the body's `message` |
//! | 2xx with an unreadable body | [`CollaboratorError::InvalidResponse`] |

use futures::future::BoxFuture;
use nexus_core::collaborators::{
    CapacityConsumer, CrewCollaborator, PowerCollaborator, PowerGrant, PowerRequest,
    SummaryProvider,
};
use nexus_core::{CollaboratorError, SectionId, ShipId};
use reqwest::{Client, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::time::Duration;

/// Build the shared HTTP client.
///
/// # Errors
///
/// Returns the `reqwest` error if the TLS backend cannot be initialised.
pub fn http_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder().timeout(timeout).build()
}

/// Body of an error response, as rendered by `AppError`.
#[derive(serde::Deserialize)]
struct ErrorBody {
    message: String,
}

/// Base URL plus the collaborator name used in errors.
#[derive(Clone)]
struct Endpoint {
    http: Client,
    base_url: String,
    collaborator: &'static str,
}

impl Endpoint {
    fn new(http: Client, base_url: &str, collaborator: &'static str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            collaborator,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn unreachable(&self, message: impl ToString) -> CollaboratorError {
        CollaboratorError::Unreachable {
            collaborator: self.collaborator.to_string(),
            message: message.to_string(),
        }
    }

    async fn check(&self, response: Response) -> Result<Response, CollaboratorError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.message)
            .unwrap_or(text);

        if status.is_client_error() {
            Err(CollaboratorError::Rejected {
                collaborator: self.collaborator.to_string(),
                message,
            })
        } else {
            Err(self.unreachable(format!("{status}: {message}")))
        }
    }

    async fn decode<R: DeserializeOwned>(&self, response: Response) -> Result<R, CollaboratorError> {
        response
            .json::<R>()
            .await
            .map_err(|e| CollaboratorError::InvalidResponse {
                collaborator: self.collaborator.to_string(),
                message: e.to_string(),
            })
    }

    async fn post<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<Response, CollaboratorError> {
        let response = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;
        self.check(response).await
    }

    async fn get(&self, path: &str) -> Result<Response, CollaboratorError> {
        let response = self
            .http
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;
        self.check(response).await
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Power
// ═══════════════════════════════════════════════════════════════════════

/// Remote power service.
#[derive(Clone)]
pub struct HttpPowerClient {
    endpoint: Endpoint,
}

impl HttpPowerClient {
    /// Client for the power service at `base_url`.
    #[must_use]
    pub fn new(http: Client, base_url: &str) -> Self {
        Self {
            endpoint: Endpoint::new(http, base_url, "power"),
        }
    }
}

#[derive(Serialize)]
struct DeallocateBody<'a> {
    system: &'a str,
}

impl PowerCollaborator for HttpPowerClient {
    fn allocate(&self, request: PowerRequest) -> BoxFuture<'_, Result<PowerGrant, CollaboratorError>> {
        Box::pin(async move {
            let response = self.endpoint.post("/api/power/allocate", &request).await?;
            self.endpoint.decode(response).await
        })
    }

    fn deallocate<'a>(&'a self, system: &'a str) -> BoxFuture<'a, Result<(), CollaboratorError>> {
        Box::pin(async move {
            self.endpoint
                .post("/api/power/deallocate", &DeallocateBody { system })
                .await?;
            Ok(())
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Crew
// ═══════════════════════════════════════════════════════════════════════

/// Remote crew service.
#[derive(Clone)]
pub struct HttpCrewClient {
    endpoint: Endpoint,
}

impl HttpCrewClient {
    /// Client for the crew service at `base_url`.
    #[must_use]
    pub fn new(http: Client, base_url: &str) -> Self {
        Self {
            endpoint: Endpoint::new(http, base_url, "crew"),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ArrivalBody {
    ship_id: ShipId,
    crew_count: i32,
}

impl CrewCollaborator for HttpCrewClient {
    fn register_arrival<'a>(
        &'a self,
        ship_id: ShipId,
        ship_name: &'a str,
        crew_count: i32,
    ) -> BoxFuture<'a, Result<(), CollaboratorError>> {
        Box::pin(async move {
            tracing::debug!(ship_id = %ship_id, ship_name, crew_count, "Registering crew arrival");
            self.endpoint
                .post("/api/crew/arrival", &ArrivalBody { ship_id, crew_count })
                .await?;
            Ok(())
        })
    }

    fn register_departure<'a>(&'a self, ship_name: &'a str) -> BoxFuture<'a, Result<(), CollaboratorError>> {
        // The crew service tracks departures implicitly.
        Box::pin(async move {
            tracing::info!(ship_name, "Crew departure noted");
            Ok(())
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Life support
// ═══════════════════════════════════════════════════════════════════════

/// Remote life-support service as a capacity consumer.
#[derive(Clone)]
pub struct HttpCapacityConsumer {
    endpoint: Endpoint,
}

impl HttpCapacityConsumer {
    /// Client for the life-support service at `base_url`.
    #[must_use]
    pub fn new(http: Client, base_url: &str) -> Self {
        Self {
            endpoint: Endpoint::new(http, base_url, "life-support"),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AdjustCapacityBody {
    section_id: SectionId,
    occupancy_change: i32,
}

impl CapacityConsumer for HttpCapacityConsumer {
    fn adjust_capacity(
        &self,
        section_id: SectionId,
        delta: i32,
    ) -> BoxFuture<'_, Result<(), CollaboratorError>> {
        Box::pin(async move {
            self.endpoint
                .post(
                    "/api/life-support/adjust-capacity",
                    &AdjustCapacityBody {
                        section_id,
                        occupancy_change: delta,
                    },
                )
                .await?;
            Ok(())
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Summaries
// ═══════════════════════════════════════════════════════════════════════

/// Summary fetched as JSON from a remote service.
pub struct HttpSummaryProvider<T> {
    name: String,
    endpoint: Endpoint,
    path: String,
    _summary: PhantomData<fn() -> T>,
}

impl<T> HttpSummaryProvider<T> {
    /// Provider `name` reading `GET {base_url}{path}`.
    #[must_use]
    pub fn new(http: Client, name: &'static str, base_url: &str, path: &str) -> Self {
        Self {
            name: name.to_string(),
            endpoint: Endpoint::new(http, base_url, name),
            path: path.to_string(),
            _summary: PhantomData,
        }
    }
}

impl<T> SummaryProvider<T> for HttpSummaryProvider<T>
where
    T: DeserializeOwned + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn summary(&self) -> BoxFuture<'_, Result<T, CollaboratorError>> {
        Box::pin(async move {
            let response = self.endpoint.get(&self.path).await?;
            self.endpoint.decode(response).await
        })
    }

    fn ping(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move { self.endpoint.get(&self.path).await.is_ok() })
    }
}
