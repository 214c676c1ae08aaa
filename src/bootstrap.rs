//! Bootstrap decision procedure.
//!
//! [`decide`] is pure: it maps what has happened so far to the next thing the
//! pool manager should do. All I/O (validation, fetching, prompting) happens in
//! the driver, [`crate::ProxyPool::bootstrap`].

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

/// Terminal status of a bootstrap run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapStatus {
    /// Pool is usable.
    Ready,
    /// A top-up fetch still left the pool below the minimum.
    Insufficient,
    /// Running without proxies.
    NoProxies,
    /// The user chose to stop.
    Exit,
}

/// Where the working proxies came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Saved,
    Mixed,
    New,
    None,
}

/// First question when no working proxy is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserChoice {
    ProceedWithout,
    FetchAndWait,
    Abort,
}

/// Question asked when a fresh fetch found nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackChoice {
    ProceedWithout,
    Abort,
}

/// The choice recorded in the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChoiceTaken {
    NoProxies,
    Wait,
    NoProxiesAfterFetch,
    Exit,
    Interrupt,
}

/// Outcome of a bootstrap run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BootstrapReport {
    pub status: BootstrapStatus,
    pub working_proxies: usize,
    pub source: Provenance,
    pub user_choice: Option<ChoiceTaken>,
}

impl BootstrapReport {
    fn new(status: BootstrapStatus, working_proxies: usize, source: Provenance) -> Self {
        Self {
            status,
            working_proxies,
            source,
            user_choice: None,
        }
    }

    fn chosen(mut self, choice: ChoiceTaken) -> Self {
        self.user_choice = Some(choice);
        self
    }

    /// Report for a run stopped by the user.
    pub fn exit(choice: ChoiceTaken) -> Self {
        Self::new(BootstrapStatus::Exit, 0, Provenance::None).chosen(choice)
    }
}

impl fmt::Display for BootstrapReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}: {} working proxies (source: {:?})",
            self.status, self.working_proxies, self.source
        )?;
        if let Some(choice) = self.user_choice {
            write!(f, ", choice: {:?}", choice)?;
        }
        Ok(())
    }
}

/// What has happened so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Saved pools were read; `saved` endpoints in total.
    Loaded { saved: usize },
    /// Saved endpoints were validated.
    SavedValidated { working: usize },
    /// The single top-up fetch finished; `working` is the pool total.
    ToppedUp { working: usize },
    /// The user answered the first question.
    Chose(UserChoice),
    /// A fresh fetch finished with no usable saved pool.
    FreshFetched { working: usize },
    /// The user answered the question after an empty fetch.
    ChoseAfterEmptyFetch(FallbackChoice),
}

/// What the driver must do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ValidateSaved,
    /// Persist the partial pool, then run one fetch pass.
    TopUp,
    /// Ask [`UserChoice`].
    Ask,
    /// Ask [`FallbackChoice`].
    AskAfterEmptyFetch,
    FetchFresh,
    /// Persist if anything is pooled, then stop with this report.
    Finish(BootstrapReport),
}

/// Fixed inputs of a run.
#[derive(Debug, Clone, Copy)]
pub struct DecisionContext {
    pub min_working_proxies: usize,
    pub interactive: bool,
}

/// Next action for `step`.
pub fn decide(step: Step, ctx: &DecisionContext) -> Action {
    match step {
        Step::Loaded { saved: 0 } => no_working_proxies(ctx),
        Step::Loaded { .. } => Action::ValidateSaved,
        Step::SavedValidated { working } if working >= ctx.min_working_proxies && working > 0 => {
            Action::Finish(BootstrapReport::new(BootstrapStatus::Ready, working, Provenance::Saved))
        }
        Step::SavedValidated { working: 0 } => no_working_proxies(ctx),
        Step::SavedValidated { .. } => Action::TopUp,
        Step::ToppedUp { working } if working >= ctx.min_working_proxies => {
            Action::Finish(BootstrapReport::new(BootstrapStatus::Ready, working, Provenance::Mixed))
        }
        Step::ToppedUp { working } => Action::Finish(BootstrapReport::new(
            BootstrapStatus::Insufficient,
            working,
            Provenance::Mixed,
        )),
        Step::Chose(UserChoice::ProceedWithout) => Action::Finish(
            BootstrapReport::new(BootstrapStatus::NoProxies, 0, Provenance::None)
                .chosen(ChoiceTaken::NoProxies),
        ),
        Step::Chose(UserChoice::FetchAndWait) => Action::FetchFresh,
        Step::Chose(UserChoice::Abort) => Action::Finish(BootstrapReport::exit(ChoiceTaken::Exit)),
        Step::FreshFetched { working: 0 } if ctx.interactive => Action::AskAfterEmptyFetch,
        Step::FreshFetched { working: 0 } => decide(
            Step::ChoseAfterEmptyFetch(FallbackChoice::ProceedWithout),
            ctx,
        ),
        Step::FreshFetched { working } => Action::Finish(
            BootstrapReport::new(BootstrapStatus::Ready, working, Provenance::New)
                .chosen(ChoiceTaken::Wait),
        ),
        Step::ChoseAfterEmptyFetch(FallbackChoice::ProceedWithout) => Action::Finish(
            BootstrapReport::new(BootstrapStatus::NoProxies, 0, Provenance::None)
                .chosen(ChoiceTaken::NoProxiesAfterFetch),
        ),
        Step::ChoseAfterEmptyFetch(FallbackChoice::Abort) => {
            Action::Finish(BootstrapReport::exit(ChoiceTaken::Exit))
        }
    }
}

/// Ask interactively; otherwise fetch and wait.
fn no_working_proxies(ctx: &DecisionContext) -> Action {
    if ctx.interactive {
        Action::Ask
    } else {
        decide(Step::Chose(UserChoice::FetchAndWait), ctx)
    }
}

/// Source of answers for an interactive bootstrap.
#[async_trait]
pub trait BootstrapPrompt: Send + Sync {
    /// Ask how to proceed without working proxies. `None` means the user
    /// interrupted the prompt.
    async fn choose(&self, min_working_proxies: usize) -> Option<UserChoice>;

    /// Ask how to proceed after a fetch found nothing.
    async fn choose_after_empty_fetch(&self) -> Option<FallbackChoice>;
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERACTIVE: DecisionContext = DecisionContext {
        min_working_proxies: 3,
        interactive: true,
    };
    const BATCH: DecisionContext = DecisionContext {
        min_working_proxies: 3,
        interactive: false,
    };

    fn finish(action: Action) -> BootstrapReport {
        match action {
            Action::Finish(report) => report,
            other => panic!("expected Finish, got {:?}", other),
        }
    }

    #[test]
    fn test_nothing_saved() {
        assert_eq!(decide(Step::Loaded { saved: 0 }, &INTERACTIVE), Action::Ask);
        assert_eq!(decide(Step::Loaded { saved: 0 }, &BATCH), Action::FetchFresh);
        assert_eq!(decide(Step::Loaded { saved: 4 }, &BATCH), Action::ValidateSaved);
    }

    #[test]
    fn test_saved_pool_outcomes() {
        let ready = finish(decide(Step::SavedValidated { working: 5 }, &BATCH));
        assert_eq!(ready.status, BootstrapStatus::Ready);
        assert_eq!(ready.source, Provenance::Saved);
        assert_eq!(ready.working_proxies, 5);
        assert_eq!(ready.user_choice, None);

        assert_eq!(decide(Step::SavedValidated { working: 1 }, &BATCH), Action::TopUp);
        assert_eq!(decide(Step::SavedValidated { working: 0 }, &BATCH), Action::FetchFresh);
        assert_eq!(decide(Step::SavedValidated { working: 0 }, &INTERACTIVE), Action::Ask);
    }

    #[test]
    fn test_top_up_outcomes() {
        let ready = finish(decide(Step::ToppedUp { working: 5 }, &BATCH));
        assert_eq!((ready.status, ready.source), (BootstrapStatus::Ready, Provenance::Mixed));

        let short = finish(decide(Step::ToppedUp { working: 2 }, &BATCH));
        assert_eq!((short.status, short.working_proxies), (BootstrapStatus::Insufficient, 2));
    }

    #[test]
    fn test_user_choices() {
        let without = finish(decide(Step::Chose(UserChoice::ProceedWithout), &INTERACTIVE));
        assert_eq!(without.status, BootstrapStatus::NoProxies);
        assert_eq!(without.user_choice, Some(ChoiceTaken::NoProxies));

        assert_eq!(
            decide(Step::Chose(UserChoice::FetchAndWait), &INTERACTIVE),
            Action::FetchFresh
        );

        let abort = finish(decide(Step::Chose(UserChoice::Abort), &INTERACTIVE));
        assert_eq!(abort.status, BootstrapStatus::Exit);
    }

    #[test]
    fn test_fresh_fetch_outcomes() {
        let ready = finish(decide(Step::FreshFetched { working: 2 }, &BATCH));
        assert_eq!(ready.status, BootstrapStatus::Ready);
        assert_eq!(ready.source, Provenance::New);
        assert_eq!(ready.user_choice, Some(ChoiceTaken::Wait));

        let empty = finish(decide(Step::FreshFetched { working: 0 }, &BATCH));
        assert_eq!(empty.status, BootstrapStatus::NoProxies);
        assert_eq!(empty.working_proxies, 0);
        assert_eq!(empty.user_choice, Some(ChoiceTaken::NoProxiesAfterFetch));

        assert_eq!(
            decide(Step::FreshFetched { working: 0 }, &INTERACTIVE),
            Action::AskAfterEmptyFetch
        );
        let abort = finish(decide(
            Step::ChoseAfterEmptyFetch(FallbackChoice::Abort),
            &INTERACTIVE,
        ));
        assert_eq!(abort.status, BootstrapStatus::Exit);
    }

    #[test]
    fn test_zero_minimum_still_needs_one_proxy_from_saved() {
        let ctx = DecisionContext {
            min_working_proxies: 0,
            interactive: false,
        };
        assert_eq!(decide(Step::SavedValidated { working: 0 }, &ctx), Action::FetchFresh);
    }
}
