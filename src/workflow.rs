//! Challenge workflow state machine.
//!
//! One instance per user session. The machine owns the active challenge, the
//! solution draft, and the displayed verdict, and sequences them through the
//! phases Idle -> Loading -> Active -> Submitting -> Resolved.
//!
//! All transitions are synchronous; the async collaborators (pattern source,
//! evaluator gateway) run elsewhere and report back through `complete_load`
//! and `apply_verdict`. Both completion paths are guarded against stale
//! results: loads by a generation counter, verdicts by the submission token.
//! Cancellation is logical only. We never abort an in-flight call, we just
//! refuse to apply its result once it has been superseded.

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::{Challenge, Phase, SubmissionToken, Verdict};
use crate::source::SourceUnavailable;

/// Local validation failures for `begin_submit`. Rejected before any
/// gateway call is issued.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("solution draft is empty")]
    EmptySolution,
    #[error("a submission is already in flight")]
    AlreadySubmitting,
    #[error("no active challenge to submit against")]
    NoActiveChallenge,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EditError {
    #[error("no active challenge to edit")]
    NoActiveChallenge,
}

/// Read-only view of the workflow, handed to presentation layers.
#[derive(Clone, Debug)]
pub struct WorkflowSnapshot {
    pub phase: Phase,
    pub challenge: Option<Challenge>,
    pub draft: String,
    pub verdict: Option<Verdict>,
    pub source_error: Option<String>,
}

/// Outcome of feeding an evaluator response into the machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Applied {
    /// Token matched the current draft snapshot; verdict now displayed.
    Resolved,
    /// Token was superseded; response dropped, state untouched or returned
    /// to Active so the user can resubmit.
    Stale,
}

pub struct Workflow {
    phase: Phase,
    challenge: Option<Challenge>,
    draft: String,
    verdict: Option<Verdict>,
    source_error: Option<String>,

    /// Monotonic ticket for challenge loads; completions carrying an older
    /// ticket are dropped.
    load_gen: u64,
    /// Token of the most recent `begin_submit`, cleared once its response
    /// has been applied or superseded.
    expected_token: Option<SubmissionToken>,
    /// Every verdict ever applied this session, in order. Editing after
    /// Resolved clears the display but never rewrites this.
    history: Vec<Verdict>,
}

impl Default for Workflow {
    fn default() -> Self {
        Self::new()
    }
}

impl Workflow {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            challenge: None,
            draft: String::new(),
            verdict: None,
            source_error: None,
            load_gen: 0,
            expected_token: None,
            history: Vec::new(),
        }
    }

    // Field accessors; production code reads through `snapshot` instead.
    #[allow(dead_code)]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[allow(dead_code)]
    pub fn challenge(&self) -> Option<&Challenge> {
        self.challenge.as_ref()
    }

    #[allow(dead_code)]
    pub fn draft(&self) -> &str {
        &self.draft
    }

    #[allow(dead_code)]
    pub fn verdict(&self) -> Option<&Verdict> {
        self.verdict.as_ref()
    }

    #[allow(dead_code)]
    pub fn history(&self) -> &[Verdict] {
        &self.history
    }

    pub fn snapshot(&self) -> WorkflowSnapshot {
        WorkflowSnapshot {
            phase: self.phase,
            challenge: self.challenge.clone(),
            draft: self.draft.clone(),
            verdict: self.verdict.clone(),
            source_error: self.source_error.clone(),
        }
    }

    /// Start a new challenge load. Legal from any phase.
    ///
    /// Logically cancels whatever was in flight: the previous expected token
    /// is dropped, so a late evaluator response for the old challenge can
    /// never be applied. Returns the load ticket the eventual
    /// `complete_load` call must present.
    pub fn begin_load(&mut self) -> u64 {
        self.load_gen += 1;
        if self.expected_token.take().is_some() {
            debug!(target: "workflow", "Pending submission logically cancelled by new challenge request");
        }
        self.phase = Phase::Loading;
        self.challenge = None;
        self.draft.clear();
        self.verdict = None;
        self.source_error = None;
        self.load_gen
    }

    /// Apply the result of a challenge load started with `begin_load`.
    ///
    /// A ticket other than the latest means a newer request superseded this
    /// load; the result is dropped. On success the machine enters Active
    /// with a fresh empty draft bound to the new challenge. On failure it
    /// returns to Idle with the source error surfaced.
    pub fn complete_load(
        &mut self,
        ticket: u64,
        result: Result<Challenge, SourceUnavailable>,
    ) -> Applied {
        if ticket != self.load_gen {
            debug!(target: "workflow", ticket, current = self.load_gen, "Dropping stale challenge load");
            return Applied::Stale;
        }
        match result {
            Ok(ch) => {
                info!(target: "workflow", id = %ch.id, difficulty = %ch.difficulty, "Challenge loaded");
                self.challenge = Some(ch);
                self.draft.clear();
                self.verdict = None;
                self.source_error = None;
                self.phase = Phase::Active;
            }
            Err(e) => {
                warn!(target: "workflow", error = %e, "Challenge load failed");
                self.challenge = None;
                self.source_error = Some(e.to_string());
                self.phase = Phase::Idle;
            }
        }
        Applied::Resolved
    }

    /// Replace the draft text. Legal in Active, Submitting, and Resolved.
    ///
    /// Editing after Resolved returns to Active and clears the displayed
    /// verdict (it stays in `history`). Editing while Submitting does not
    /// cancel the in-flight call; its response simply fails the token
    /// comparison when it arrives.
    pub fn edit(&mut self, text: &str) -> Result<(), EditError> {
        match self.phase {
            Phase::Active | Phase::Submitting => {
                self.draft = text.to_string();
                Ok(())
            }
            Phase::Resolved => {
                self.draft = text.to_string();
                self.verdict = None;
                self.phase = Phase::Active;
                Ok(())
            }
            Phase::Idle | Phase::Loading => Err(EditError::NoActiveChallenge),
        }
    }

    /// Capture the submission snapshot and enter Submitting.
    ///
    /// Legal in Active, and in Resolved as a resubmit (the EvaluationFailed
    /// retry path). Empty or whitespace-only drafts are rejected here,
    /// before the gateway is ever contacted.
    pub fn begin_submit(&mut self) -> Result<(SubmissionToken, Challenge), SubmitError> {
        match self.phase {
            Phase::Submitting => return Err(SubmitError::AlreadySubmitting),
            Phase::Idle | Phase::Loading => return Err(SubmitError::NoActiveChallenge),
            Phase::Active | Phase::Resolved => {}
        }
        if self.draft.trim().is_empty() {
            return Err(SubmitError::EmptySolution);
        }
        let ch = match &self.challenge {
            Some(c) => c.clone(),
            None => return Err(SubmitError::NoActiveChallenge),
        };
        let token = SubmissionToken {
            challenge_id: ch.id.clone(),
            text: self.draft.clone(),
        };
        self.expected_token = Some(token.clone());
        self.verdict = None;
        self.phase = Phase::Submitting;
        info!(target: "workflow", challenge_id = %token.challenge_id, text_len = token.text.len(), "Submission snapshot captured");
        Ok((token, ch))
    }

    /// Feed an evaluator response into the machine.
    ///
    /// Tie-break rule: the response is applied only if its token is the one
    /// of the most recent `begin_submit` AND still matches the current
    /// (challenge id, draft text) snapshot exactly. Anything else is stale
    /// and silently dropped. A stale-by-edit response additionally returns
    /// the machine from Submitting to Active so the user can resubmit.
    pub fn apply_verdict(&mut self, token: &SubmissionToken, verdict: Verdict) -> Applied {
        let expected = match &self.expected_token {
            Some(t) if t == token => t.clone(),
            _ => {
                // Older submission or superseded challenge. Nothing to do.
                debug!(target: "workflow", challenge_id = %token.challenge_id, "Dropping stale evaluator response (token mismatch)");
                return Applied::Stale;
            }
        };

        let still_current = self.phase == Phase::Submitting
            && self
                .challenge
                .as_ref()
                .map(|c| c.id == expected.challenge_id)
                .unwrap_or(false)
            && self.draft == expected.text;

        if !still_current {
            // The user edited past this submission while it was in flight.
            // Drop the verdict and hand the phase back so they can resubmit.
            self.expected_token = None;
            if self.phase == Phase::Submitting {
                self.phase = Phase::Active;
            }
            debug!(target: "workflow", challenge_id = %token.challenge_id, "Dropping stale evaluator response (draft changed)");
            return Applied::Stale;
        }

        info!(target: "workflow", challenge_id = %token.challenge_id, accepted = verdict.is_accepted(), "Verdict applied");
        self.expected_token = None;
        self.history.push(verdict.clone());
        self.verdict = Some(verdict);
        self.phase = Phase::Resolved;
        Applied::Resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChallengeSource;

    fn challenge(id: &str) -> Challenge {
        Challenge {
            id: id.into(),
            difficulty: "easy".into(),
            language: "rust".into(),
            source: ChallengeSource::Seed,
            prompt: "Implement a two-pointer pair sum.".into(),
            key_points: vec![],
            checklist: None,
        }
    }

    fn accepted() -> Verdict {
        Verdict::Accepted { score: 90.0, explanation: "ok".into() }
    }

    fn load(wf: &mut Workflow, id: &str) {
        let t = wf.begin_load();
        assert_eq!(wf.phase(), Phase::Loading);
        assert_eq!(wf.complete_load(t, Ok(challenge(id))), Applied::Resolved);
        assert_eq!(wf.phase(), Phase::Active);
    }

    #[test]
    fn starts_idle_and_empty() {
        let wf = Workflow::new();
        assert_eq!(wf.phase(), Phase::Idle);
        assert!(wf.challenge().is_none());
        assert_eq!(wf.draft(), "");
        assert!(wf.verdict().is_none());
    }

    #[test]
    fn draft_tracks_latest_edit() {
        let mut wf = Workflow::new();
        load(&mut wf, "c1");
        wf.edit("fn a() {}").unwrap();
        wf.edit("fn b() {}").unwrap();
        assert_eq!(wf.draft(), "fn b() {}");
    }

    #[test]
    fn edit_rejected_without_challenge() {
        let mut wf = Workflow::new();
        assert_eq!(wf.edit("x"), Err(EditError::NoActiveChallenge));
        wf.begin_load();
        assert_eq!(wf.edit("x"), Err(EditError::NoActiveChallenge));
    }

    #[test]
    fn draft_resets_when_challenge_changes() {
        let mut wf = Workflow::new();
        load(&mut wf, "c1");
        wf.edit("let x = 1;").unwrap();
        load(&mut wf, "c2");
        assert_eq!(wf.draft(), "");
        assert_eq!(wf.challenge().unwrap().id, "c2");
    }

    #[test]
    fn empty_submit_rejected_locally() {
        let mut wf = Workflow::new();
        load(&mut wf, "c1");
        assert_eq!(wf.begin_submit().unwrap_err(), SubmitError::EmptySolution);
        wf.edit("   \n\t ").unwrap();
        assert_eq!(wf.begin_submit().unwrap_err(), SubmitError::EmptySolution);
        // still editable, no phase damage
        assert_eq!(wf.phase(), Phase::Active);
    }

    #[test]
    fn submit_illegal_while_submitting_or_idle() {
        let mut wf = Workflow::new();
        assert_eq!(wf.begin_submit().unwrap_err(), SubmitError::NoActiveChallenge);
        load(&mut wf, "c1");
        wf.edit("x").unwrap();
        wf.begin_submit().unwrap();
        assert_eq!(wf.begin_submit().unwrap_err(), SubmitError::AlreadySubmitting);
    }

    #[test]
    fn accepted_round_trip() {
        let mut wf = Workflow::new();
        load(&mut wf, "c1");
        wf.edit("x").unwrap();
        let (token, ch) = wf.begin_submit().unwrap();
        assert_eq!(ch.id, "c1");
        assert_eq!(token.text, "x");
        assert_eq!(wf.phase(), Phase::Submitting);
        assert_eq!(wf.apply_verdict(&token, accepted()), Applied::Resolved);
        assert_eq!(wf.phase(), Phase::Resolved);
        assert!(wf.verdict().unwrap().is_accepted());
    }

    #[test]
    fn edit_after_resolved_returns_to_active_and_clears_display() {
        let mut wf = Workflow::new();
        load(&mut wf, "c1");
        wf.edit("x").unwrap();
        let (token, _) = wf.begin_submit().unwrap();
        wf.apply_verdict(&token, accepted());

        wf.edit("y").unwrap();
        assert_eq!(wf.phase(), Phase::Active);
        assert!(wf.verdict().is_none());
        assert_eq!(wf.draft(), "y");
        // judged history is untouched
        assert_eq!(wf.history().len(), 1);
    }

    #[test]
    fn evaluation_failure_resolves_and_allows_retry() {
        let mut wf = Workflow::new();
        load(&mut wf, "c1");
        wf.edit("x").unwrap();
        let (token, _) = wf.begin_submit().unwrap();
        let failed = Verdict::EvaluationFailed { reason: "judge offline".into() };
        assert_eq!(wf.apply_verdict(&token, failed.clone()), Applied::Resolved);
        assert_eq!(wf.phase(), Phase::Resolved);
        assert_eq!(wf.verdict(), Some(&failed));
        // draft survived; retry without editing
        assert_eq!(wf.draft(), "x");
        let (token2, _) = wf.begin_submit().unwrap();
        assert_eq!(wf.apply_verdict(&token2, accepted()), Applied::Resolved);
        assert!(wf.verdict().unwrap().is_accepted());
    }

    #[test]
    fn edit_while_submitting_discards_inflight_verdict() {
        let mut wf = Workflow::new();
        load(&mut wf, "c1");
        wf.edit("x").unwrap();
        let (token, _) = wf.begin_submit().unwrap();
        wf.edit("y").unwrap();
        assert_eq!(wf.phase(), Phase::Submitting);

        assert_eq!(wf.apply_verdict(&token, accepted()), Applied::Stale);
        // back in Active so the edited draft can be submitted
        assert_eq!(wf.phase(), Phase::Active);
        assert!(wf.verdict().is_none());
        assert_eq!(wf.draft(), "y");
    }

    #[test]
    fn latest_submission_wins_even_if_earlier_arrives_later() {
        let mut wf = Workflow::new();
        load(&mut wf, "c1");
        wf.edit("a").unwrap();
        let (token_a, _) = wf.begin_submit().unwrap();
        // edit past the first submission, then resubmit
        wf.edit("b").unwrap();
        assert_eq!(wf.apply_verdict(&token_a, accepted()), Applied::Stale);
        let (token_b, _) = wf.begin_submit().unwrap();

        // first response straggles in after the second submit
        let rejected = Verdict::Rejected { score: 20.0, explanation: "nope".into() };
        assert_eq!(wf.apply_verdict(&token_a, rejected), Applied::Stale);
        assert_eq!(wf.phase(), Phase::Submitting);

        assert_eq!(wf.apply_verdict(&token_b, accepted()), Applied::Resolved);
        assert!(wf.verdict().unwrap().is_accepted());
        assert_eq!(wf.history().len(), 1);
    }

    #[test]
    fn new_challenge_request_cancels_inflight_submission() {
        let mut wf = Workflow::new();
        load(&mut wf, "c1");
        wf.edit("x").unwrap();
        let (token, _) = wf.begin_submit().unwrap();

        // user abandons the challenge mid-evaluation
        let ticket = wf.begin_load();
        assert_eq!(wf.complete_load(ticket, Ok(challenge("c2"))), Applied::Resolved);

        // late verdict for the superseded challenge is dropped
        assert_eq!(wf.apply_verdict(&token, accepted()), Applied::Stale);
        assert_eq!(wf.phase(), Phase::Active);
        assert_eq!(wf.challenge().unwrap().id, "c2");
        assert!(wf.verdict().is_none());
    }

    #[test]
    fn stale_load_ticket_is_dropped() {
        let mut wf = Workflow::new();
        let t1 = wf.begin_load();
        let t2 = wf.begin_load();
        assert_eq!(wf.complete_load(t1, Ok(challenge("old"))), Applied::Stale);
        assert_eq!(wf.phase(), Phase::Loading);
        assert_eq!(wf.complete_load(t2, Ok(challenge("new"))), Applied::Resolved);
        assert_eq!(wf.challenge().unwrap().id, "new");
    }

    #[test]
    fn source_failure_returns_to_idle_with_error() {
        let mut wf = Workflow::new();
        let t = wf.begin_load();
        let err = SourceUnavailable("bank empty".into());
        assert_eq!(wf.complete_load(t, Err(err)), Applied::Resolved);
        assert_eq!(wf.phase(), Phase::Idle);
        assert!(wf.challenge().is_none());
        assert!(wf.snapshot().source_error.unwrap().contains("bank empty"));
        // retry clears the surfaced error
        let t = wf.begin_load();
        assert!(wf.snapshot().source_error.is_none());
        wf.complete_load(t, Ok(challenge("c1")));
        assert_eq!(wf.phase(), Phase::Active);
    }

    #[test]
    fn duplicate_response_after_resolve_is_ignored() {
        let mut wf = Workflow::new();
        load(&mut wf, "c1");
        wf.edit("x").unwrap();
        let (token, _) = wf.begin_submit().unwrap();
        assert_eq!(wf.apply_verdict(&token, accepted()), Applied::Resolved);
        // gateway retry delivers the same verdict twice
        let rejected = Verdict::Rejected { score: 0.0, explanation: "dup".into() };
        assert_eq!(wf.apply_verdict(&token, rejected), Applied::Stale);
        assert!(wf.verdict().unwrap().is_accepted());
        assert_eq!(wf.history().len(), 1);
    }
}
