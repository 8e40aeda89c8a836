//! Qualification Run Coordinator.
//!
//! Walks employers × positions strictly in order, pages through each
//! search, and drives every listed candidate through the filter chain.
//! Accepted candidates get their resume saved before they are committed to
//! the run buffer; a failed save turns the acceptance into a rejection.
//! The final flush is guaranteed by a `FlushGuard` however the run ends.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::browser::ExtractionError;
use crate::config::OutputLayout;
use crate::errors::AppError;
use crate::models::{EmployerTarget, RunConfiguration};
use crate::output::archive::bundle_employer;
use crate::output::checkpoint::{Checkpointer, FlushGuard};
use crate::output::documents::{document_stem, save_resume};
use crate::qualification::filters::{
    Acceptance, EarlyStop, FilterChain, Rejection, Stage, Verdict,
};
use crate::retry::BackoffPolicy;
use crate::site::{CandidateFeed, ProfileView};
use crate::state::{RunPhase, RunState};

/// Random pause between candidates.
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    min: Duration,
    max: Duration,
}

impl Pacing {
    pub fn polite() -> Self {
        Self {
            min: Duration::from_secs(3),
            max: Duration::from_secs(7),
        }
    }

    #[cfg(test)]
    pub fn none() -> Self {
        Self {
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    async fn wait(&self) {
        if self.max.is_zero() {
            return;
        }
        let millis = rand::rng().random_range(self.min.as_millis() as u64..=self.max.as_millis() as u64);
        tokio::time::sleep(Duration::from_millis(millis)).await;
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub qualified: u64,
    pub processed: u64,
    pub sheet: Option<PathBuf>,
    pub bundles: Vec<PathBuf>,
    pub cancelled: bool,
}

/// Accepted-candidate tally of one employer across its positions.
#[derive(Debug, Default)]
struct EmployerProgress {
    accepted: u32,
    documents: Vec<PathBuf>,
}

enum PassEnd {
    Exhausted,
    QuotaReached,
    EarlyStopped,
    Cancelled,
}

pub struct Coordinator<F: CandidateFeed> {
    feed: F,
    chain: FilterChain,
    config: RunConfiguration,
    layout: OutputLayout,
    source_label: String,
    state: Arc<RunState>,
    checkpointer: Arc<Checkpointer>,
    pacing: Pacing,
    persist_policy: BackoffPolicy,
}

impl<F: CandidateFeed> Coordinator<F> {
    pub fn new(
        feed: F,
        chain: FilterChain,
        config: RunConfiguration,
        layout: OutputLayout,
        source_label: impl Into<String>,
        state: Arc<RunState>,
        checkpointer: Arc<Checkpointer>,
    ) -> Self {
        Self {
            feed,
            chain,
            config,
            layout,
            source_label: source_label.into(),
            state,
            checkpointer,
            pacing: Pacing::polite(),
            persist_policy: BackoffPolicy::constant(3, Duration::from_secs(1)),
        }
    }

    #[cfg(test)]
    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    #[cfg(test)]
    pub fn with_persist_policy(mut self, policy: BackoffPolicy) -> Self {
        self.persist_policy = policy;
        self
    }

    pub async fn run(&self) -> Result<RunSummary, AppError> {
        let guard = FlushGuard::new(&self.checkpointer, &self.state);
        let mut bundles = Vec::new();

        for employer in &self.config.employers {
            if self.state.is_cancelled() {
                break;
            }
            let progress = self.run_employer(employer).await;
            info!(
                "Finished {}: {} accepted",
                employer.name, progress.accepted
            );
            match bundle_employer(
                &self.layout.zips_dir,
                &self.source_label,
                &employer.name,
                &self.config.zip_label,
                &progress.documents,
            ) {
                Ok(Some(path)) => bundles.push(path),
                Ok(None) => debug!("No documents to bundle for {}", employer.name),
                Err(e) => error!("Bundling documents for {} failed: {e}", employer.name),
            }
        }

        let report = guard.finish()?;
        let (qualified, processed) = self.state.counts();
        Ok(RunSummary {
            run_id: self.state.run_id(),
            qualified,
            processed,
            sheet: report.map(|r| r.path),
            bundles,
            cancelled: self.state.is_cancelled(),
        })
    }

    async fn run_employer(&self, employer: &EmployerTarget) -> EmployerProgress {
        let mut progress = EmployerProgress::default();
        let briefing = self.config.briefing_for(&employer.name);

        for position in self.config.search_positions() {
            if employer.quota_reached(progress.accepted) {
                info!("Quota reached for {}; skipping remaining positions", employer.name);
                break;
            }
            if self.state.is_cancelled() {
                break;
            }
            if !position.is_empty() {
                self.state.note_position(&position);
            }
            self.state.set_phase(RunPhase::Searching {
                employer: employer.name.clone(),
                position: position.clone(),
            });
            info!("Searching '{}' / '{}'", employer.name, position);

            match self.run_pass(employer, &position, &briefing, &mut progress).await {
                Ok(PassEnd::Exhausted) => debug!("No more results for '{}' / '{position}'", employer.name),
                Ok(PassEnd::QuotaReached) => {
                    info!("Quota reached for {}", employer.name);
                    break;
                }
                Ok(PassEnd::EarlyStopped) => warn!(
                    "Too many consecutive failures for '{}' / '{position}'; moving on",
                    employer.name
                ),
                Ok(PassEnd::Cancelled) => break,
                Err(e) => warn!("Search '{}' / '{position}' aborted: {e}", employer.name),
            }
        }
        progress
    }

    async fn run_pass(
        &self,
        employer: &EmployerTarget,
        position: &str,
        briefing: &str,
        progress: &mut EmployerProgress,
    ) -> Result<PassEnd, ExtractionError> {
        self.feed.begin_search(&employer.name, position).await?;
        let mut budget = EarlyStop::default();

        loop {
            let entries = self.feed.listing().await?;
            debug!("{} candidates on this page", entries.len());

            for entry in &entries {
                if self.state.is_cancelled() {
                    return Ok(PassEnd::Cancelled);
                }
                self.state.wait_while_paused().await;
                if self.state.is_cancelled() {
                    return Ok(PassEnd::Cancelled);
                }
                let processed = self.state.mark_processed();

                debug!("Evaluating candidate #{processed}");
                let (verdict, document) = self.process_entry(entry, employer, briefing).await;
                verdict.log();
                budget.record(&verdict);

                if let Some(path) = document {
                    progress.accepted += 1;
                    progress.documents.push(path);
                    let (qualified, processed) = self.state.counts();
                    info!("Progress: {qualified}/{processed} qualified/processed");
                }

                self.pacing.wait().await;

                if employer.quota_reached(progress.accepted) {
                    return Ok(PassEnd::QuotaReached);
                }
                if budget.exhausted() {
                    return Ok(PassEnd::EarlyStopped);
                }
            }

            if !self.feed.next_page().await? {
                return Ok(PassEnd::Exhausted);
            }
            debug!("Moved to next result page");
        }
    }

    /// Opens, evaluates and closes one candidate. Returns the resume path
    /// alongside an accept verdict.
    async fn process_entry(
        &self,
        entry: &F::Entry,
        employer: &EmployerTarget,
        briefing: &str,
    ) -> (Verdict, Option<PathBuf>) {
        let profile = match self.feed.open_profile(entry).await {
            Ok(profile) => profile,
            Err(e) => {
                return (
                    Verdict::Inconclusive(Rejection::new(
                        Stage::Extraction,
                        "listing entry",
                        format!("profile did not open: {e}"),
                    )),
                    None,
                )
            }
        };

        let verdict = self
            .chain
            .evaluate(&profile, &self.config, &employer.name, briefing, &self.state)
            .await;
        let outcome = match verdict {
            Verdict::Accept(acceptance) => self.persist(&profile, *acceptance).await,
            other => (other, None),
        };

        self.feed.close_profile(profile).await;
        outcome
    }

    async fn persist(&self, profile: &F::Profile, acceptance: Acceptance) -> (Verdict, Option<PathBuf>) {
        let stem = document_stem(
            self.state.next_sequence(),
            &self.source_label,
            &acceptance.record.display_name,
        );
        let path = match save_resume(
            &self.layout.resumes_dir,
            &stem,
            &acceptance.html,
            &self.persist_policy,
        )
        .await
        {
            Ok(path) => path,
            Err(e) => {
                return (
                    Verdict::Reject(Rejection::new(
                        Stage::Persistence,
                        &acceptance.record.display_name,
                        e.to_string(),
                    )),
                    None,
                )
            }
        };

        if self.config.view_phone {
            let shot = path.with_extension("png");
            if let Err(e) = profile.capture_contact(&shot).await {
                warn!("Contact capture for {} failed: {e}", acceptance.record.display_name);
            }
        }

        let sequence = self
            .state
            .commit(acceptance.record.clone(), acceptance.signature.clone());
        debug!("Committed {} as #{sequence}", acceptance.record.display_name);
        (Verdict::Accept(Box::new(acceptance)), Some(path))
    }
}
