use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex as StdMutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use shared::{protocol::ErrorBody, OptimizeRequest, OptimizeResponse};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::{error::SolverError, grid_store::GridStore};

pub type SharedGridStore = Arc<Mutex<GridStore>>;

/// Remote solver seam. Returns the raw 2xx body; validation happens in the
/// orchestrator so every client gets the same contract checks.
#[async_trait]
pub trait SolverClient: Send + Sync {
    async fn optimize(&self, request: &OptimizeRequest) -> Result<Value, SolverError>;
}

pub struct HttpSolverClient {
    http: Client,
    api_url: String,
}

impl HttpSolverClient {
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self, SolverError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl SolverClient for HttpSolverClient {
    async fn optimize(&self, request: &OptimizeRequest) -> Result<Value, SolverError> {
        let response = self
            .http
            .post(format!("{}/optimize", self.api_url))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|body| body.message)
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("request failed")
                        .to_string()
                });
            return Err(SolverError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|err| SolverError::Decode(err.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    NoFitWarning {
        platform: String,
        tech: String,
    },
    OptimizeTech {
        platform: String,
        tech: String,
        solve_method: String,
        supercharged: bool,
    },
}

pub trait Telemetry: Send + Sync {
    fn record(&self, event: TelemetryEvent);
}

/// Emits telemetry as `tracing` events on the `telemetry` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

impl Telemetry for TracingTelemetry {
    fn record(&self, event: TelemetryEvent) {
        match event {
            TelemetryEvent::NoFitWarning { platform, tech } => {
                info!(target: "telemetry", event = "no_fit_warning", %platform, %tech);
            }
            TelemetryEvent::OptimizeTech {
                platform,
                tech,
                solve_method,
                supercharged,
            } => {
                info!(
                    target: "telemetry",
                    event = "optimize_tech",
                    %platform,
                    %tech,
                    %solve_method,
                    supercharged
                );
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OptimizeOutcome {
    Solved {
        solve_method: String,
        max_bonus: Option<f64>,
        solved_bonus: Option<f64>,
        grid_applied: bool,
    },
    /// The solver could not fit the pattern; a forced retry may still place it.
    PatternNoFit,
    Failed,
}

#[derive(Debug, Default)]
struct OptimizerStatus {
    pattern_no_fit_tech: Option<String>,
    show_error: bool,
}

/// Sends optimization requests for the shared [`GridStore`] and writes the
/// outcome back into it. Never returns an error: failures become
/// [`OptimizeOutcome::Failed`] plus the `show_error` flag.
///
/// Calls are not sequenced. Overlapping calls for the same tech race and the
/// last response to land wins.
pub struct Optimizer {
    store: SharedGridStore,
    solver: Arc<dyn SolverClient>,
    telemetry: Arc<dyn Telemetry>,
    status: StdMutex<OptimizerStatus>,
    in_flight: AtomicUsize,
}

struct SolvingGuard<'a>(&'a AtomicUsize);

impl<'a> SolvingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for SolvingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Optimizer {
    pub fn new(store: SharedGridStore, solver: Arc<dyn SolverClient>) -> Self {
        Self::with_telemetry(store, solver, Arc::new(TracingTelemetry))
    }

    pub fn with_telemetry(
        store: SharedGridStore,
        solver: Arc<dyn SolverClient>,
        telemetry: Arc<dyn Telemetry>,
    ) -> Self {
        Self {
            store,
            solver,
            telemetry,
            status: StdMutex::new(OptimizerStatus::default()),
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn store(&self) -> &SharedGridStore {
        &self.store
    }

    pub fn is_solving(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    pub fn show_error(&self) -> bool {
        self.status().show_error
    }

    pub fn dismiss_error(&self) {
        self.status().show_error = false;
    }

    pub fn pattern_no_fit_tech(&self) -> Option<String> {
        self.status().pattern_no_fit_tech.clone()
    }

    pub fn clear_pattern_no_fit(&self) {
        self.status().pattern_no_fit_tech = None;
    }

    pub async fn optimize(&self, tech: &str, forced: bool) -> OptimizeOutcome {
        let _solving = SolvingGuard::enter(&self.in_flight);
        {
            let mut status = self.status();
            status.show_error = false;
            if forced || status.pattern_no_fit_tech.as_deref() == Some(tech) {
                status.pattern_no_fit_tech = None;
            }
        }

        let request = {
            let store = self.store.lock().await;
            OptimizeRequest {
                platform: store.platform().to_string(),
                tech: tech.to_string(),
                selected_module_ids: store
                    .annotations()
                    .module_selection(tech)
                    .map(<[String]>::to_vec)
                    .unwrap_or_default(),
                grid: store.grid().without_tech(tech),
                forced,
            }
        };
        info!(
            tech = %tech,
            platform = %request.platform,
            modules = request.selected_module_ids.len(),
            forced,
            "sending optimization request"
        );

        let response = match self.solver.optimize(&request).await {
            Ok(body) => OptimizeResponse::from_value(body).map_err(SolverError::from),
            Err(err) => Err(err),
        };
        let response = match response {
            Ok(response) => response,
            Err(err) => {
                error!(tech = %tech, "optimization failed: {err}");
                self.status().show_error = true;
                self.store.lock().await.set_result(None, tech);
                return OptimizeOutcome::Failed;
            }
        };

        if response.is_pattern_no_fit() && !forced {
            info!(tech = %tech, "pattern does not fit; forced retry available");
            self.status().pattern_no_fit_tech = Some(tech.to_string());
            self.telemetry.record(TelemetryEvent::NoFitWarning {
                platform: request.platform,
                tech: tech.to_string(),
            });
            return OptimizeOutcome::PatternNoFit;
        }

        {
            let mut status = self.status();
            if status.pattern_no_fit_tech.as_deref() == Some(tech) {
                status.pattern_no_fit_tech = None;
            }
        }

        let grid_applied = {
            let mut store = self.store.lock().await;
            store.set_result(Some(response.clone()), tech);
            match response.grid.clone() {
                Some(grid) => {
                    store.set_grid(grid);
                    true
                }
                None => {
                    warn!(
                        tech = %tech,
                        solve_method = %response.solve_method,
                        "solver succeeded without a grid; keeping current grid"
                    );
                    false
                }
            }
        };

        self.telemetry.record(TelemetryEvent::OptimizeTech {
            platform: request.platform,
            tech: tech.to_string(),
            solve_method: response.solve_method.clone(),
            supercharged: response.max_bonus.is_some_and(|bonus| bonus > 100.0),
        });
        info!(
            tech = %tech,
            solve_method = %response.solve_method,
            max_bonus = ?response.max_bonus,
            solved_bonus = ?response.solved_bonus,
            "optimization applied"
        );

        OptimizeOutcome::Solved {
            solve_method: response.solve_method,
            max_bonus: response.max_bonus,
            solved_bonus: response.solved_bonus,
            grid_applied,
        }
    }

    /// Re-runs the tech flagged by the last pattern-no-fit answer with
    /// `forced` set. Returns `None` without a request when nothing is flagged.
    pub async fn force_retry_current_pnf(&self) -> Option<OptimizeOutcome> {
        let tech = self.pattern_no_fit_tech()?;
        Some(self.optimize(&tech, true).await)
    }

    fn status(&self) -> std::sync::MutexGuard<'_, OptimizerStatus> {
        self.status
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
#[path = "tests/optimizer_tests.rs"]
mod tests;
