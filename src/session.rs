use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_retry::Retry;
use tokio_retry::strategy::FixedInterval;
use tracing::Instrument;
use uuid::Uuid;

use crate::Result;
use crate::config::{Credentials, SessionConfig, SiteConfig};
use crate::models::{PriceReading, ScrapeOutcome};
use crate::plugins::traits::{AutomationFactory, PageAutomation};
use crate::scheduler::panic_message;

/// Anything that can produce one scrape outcome per call.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch(&self) -> ScrapeOutcome;
}

/// Position in one login attempt. Each step waits for the element that
/// leads to the next state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    AwaitingEntryButton,
    AwaitingRegistrationLoginButton,
    AwaitingLoginForm,
    CredentialsSubmitted,
    SessionConfirmed,
    SessionNotConfirmed,
}

impl LoginState {
    pub fn is_terminal(self) -> bool {
        matches!(self, LoginState::SessionConfirmed | LoginState::SessionNotConfirmed)
    }
}

/// Drives one end-to-end scrape: page load, login, extraction, teardown.
pub struct ScrapeSession {
    factory: Arc<dyn AutomationFactory>,
    credentials: Credentials,
    config: SessionConfig,
    site: SiteConfig,
}

impl ScrapeSession {
    pub fn new(
        factory: Arc<dyn AutomationFactory>,
        credentials: Credentials,
        config: SessionConfig,
        site: SiteConfig,
    ) -> Self {
        Self {
            factory,
            credentials,
            config,
            site,
        }
    }

    /// Runs one scrape. Never fails: every problem is folded into the
    /// outcome, and the browser session is closed exactly once whenever
    /// one was opened.
    pub async fn run(&self) -> ScrapeOutcome {
        let session_id = Uuid::new_v4();
        let span = tracing::info_span!("scrape_session", %session_id);

        let outcome = self.run_once().instrument(span).await;
        metrics::counter!("fuel_watcher_scrape_outcomes_total", "outcome" => outcome.kind()).increment(1);
        outcome
    }

    async fn run_once(&self) -> ScrapeOutcome {
        let page = match self.factory.open().await {
            Ok(page) => page,
            Err(e) => {
                tracing::error!(error = %e, "Could not open browser session");
                return ScrapeOutcome::extraction_failed(format!("could not open browser session: {}", e));
            }
        };

        let outcome = match AssertUnwindSafe(self.drive(page.as_ref())).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(panic = %message, "Scrape session panicked");
                ScrapeOutcome::extraction_failed(format!("session panicked: {}", message))
            }
        };

        if let Err(e) = page.close().await {
            tracing::warn!(error = %e, "Failed to close browser session");
        }

        tracing::info!(outcome = %outcome, "Scrape session finished");
        outcome
    }

    async fn drive(&self, page: &dyn PageAutomation) -> ScrapeOutcome {
        if let Err(e) = self.load_page(page).await {
            return ScrapeOutcome::extraction_failed(format!(
                "page load failed after {} attempts: {}",
                self.config.page_load_attempts, e
            ));
        }

        if self.already_logged_in(page).await {
            tracing::info!("Existing session detected, skipping login");
        } else if !self.login(page).await {
            return ScrapeOutcome::LoginFailed;
        }

        match self.extract(page).await {
            Ok(reading) => ScrapeOutcome::Success(reading),
            Err(e) => {
                tracing::warn!(error = %e, "Price extraction failed");
                ScrapeOutcome::extraction_failed(e)
            }
        }
    }

    async fn load_page(&self, page: &dyn PageAutomation) -> Result<()> {
        let url = self.site.url.as_str();
        let timeout = self.config.page_load_timeout();
        let retries = self.config.page_load_attempts.saturating_sub(1) as usize;
        let strategy = FixedInterval::new(self.config.page_load_backoff()).take(retries);

        let mut attempt = 0u32;
        Retry::spawn(strategy, || {
            attempt += 1;
            let attempt = attempt;
            async move {
                match page.navigate(url, timeout).await {
                    Ok(()) => {
                        tracing::info!(url, attempt, "Page loaded");
                        Ok(())
                    }
                    Err(e) => {
                        tracing::warn!(url, attempt, error = %e, "Page load failed");
                        Err(e)
                    }
                }
            }
        })
        .await
    }

    async fn already_logged_in(&self, page: &dyn PageAutomation) -> bool {
        page.wait_until_visible(&self.site.post_login_marker, self.config.logged_in_probe())
            .await
            .is_ok()
    }

    /// Runs login attempts until one is confirmed or the budget is spent.
    async fn login(&self, page: &dyn PageAutomation) -> bool {
        let budget = self.config.login_attempts;
        for attempt in 1..=budget {
            match self.attempt_login(page).await {
                LoginState::SessionConfirmed => {
                    tracing::info!(attempt, "Login confirmed");
                    return true;
                }
                state => {
                    tracing::warn!(attempt, budget, ?state, "Login attempt failed");
                }
            }
        }

        tracing::error!(budget, "Login attempts exhausted");
        false
    }

    async fn attempt_login(&self, page: &dyn PageAutomation) -> LoginState {
        let mut state = LoginState::AwaitingEntryButton;
        while !state.is_terminal() {
            state = match self.advance(page, state).await {
                Ok(next) => next,
                Err(e) if e.is_element_failure() => {
                    tracing::debug!(?state, error = %e, "Login step timed out");
                    return state;
                }
                Err(e) => {
                    tracing::warn!(?state, error = %e, "Login step failed");
                    return state;
                }
            };
        }
        state
    }

    async fn advance(&self, page: &dyn PageAutomation, state: LoginState) -> Result<LoginState> {
        let step = self.config.step_timeout();
        let site = &self.site;

        let next = match state {
            LoginState::AwaitingEntryButton => {
                let button = page.wait_until_clickable(&site.entry_button, step).await?;
                page.click(&button).await?;
                LoginState::AwaitingRegistrationLoginButton
            }
            LoginState::AwaitingRegistrationLoginButton => {
                let button = page.wait_until_clickable(&site.registration_login_button, step).await?;
                page.click(&button).await?;
                LoginState::AwaitingLoginForm
            }
            LoginState::AwaitingLoginForm => {
                page.wait_until_visible(&site.login_form, step).await?;
                let email = page.wait_until_clickable(&site.email_input, step).await?;
                page.type_text(&email, &self.credentials.email).await?;
                let password = page.wait_until_clickable(&site.password_input, step).await?;
                page.type_text(&password, &self.credentials.password).await?;
                let submit = page.wait_until_clickable(&site.submit_button, step).await?;
                page.click(&submit).await?;
                LoginState::CredentialsSubmitted
            }
            LoginState::CredentialsSubmitted => {
                match page
                    .wait_until_visible(&site.post_login_marker, self.config.confirmation_timeout())
                    .await
                {
                    Ok(_) => LoginState::SessionConfirmed,
                    Err(e) => {
                        tracing::debug!(error = %e, "Post-login marker not seen");
                        LoginState::SessionNotConfirmed
                    }
                }
            }
            terminal => terminal,
        };
        Ok(next)
    }

    async fn extract(&self, page: &dyn PageAutomation) -> Result<PriceReading> {
        let timeout = self.config.extraction_timeout();
        let site = &self.site;

        page.wait_until_absent(&site.preloader, timeout).await?;

        let resources = page.wait_until_clickable(&site.resources_button, timeout).await?;
        page.click(&resources).await?;
        let fuel = page.wait_until_visible(&site.fuel_price, timeout).await?;
        let raw_fuel = page.read_text(&fuel).await?;
        tracing::debug!(raw_fuel = %raw_fuel, "Read fuel price text");

        let co2_tab = page.wait_until_visible(&site.co2_button, timeout).await?;
        page.click(&co2_tab).await?;
        let co2 = page.wait_until_visible(&site.co2_price, timeout).await?;
        let raw_co2 = page.read_text(&co2).await?;
        tracing::debug!(raw_co2 = %raw_co2, "Read co2 price text");

        Ok(PriceReading::parse(&raw_fuel, &raw_co2))
    }
}

#[async_trait]
impl PriceSource for ScrapeSession {
    async fn fetch(&self) -> ScrapeOutcome {
        self.run().await
    }
}
