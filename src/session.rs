//! Per-user session driver around the workflow state machine.
//!
//! The machine itself is synchronous; this wrapper gives it the async shape
//! the collaborators' contracts demand. All transitions happen under one
//! mutex (single logical owner), while the pattern-source fetch and the
//! evaluator call run in spawned tasks so the caller keeps accepting edits
//! and new-challenge requests while a call is outstanding. Task completions
//! re-acquire the lock and go through the machine's staleness guards.
//!
//! Presentation layers observe the session through a `watch` channel of
//! snapshots; every applied transition publishes a fresh one.

use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tracing::instrument;

use crate::domain::Verdict;
use crate::gateway::EvaluatorGateway;
use crate::source::PatternSource;
use crate::workflow::{EditError, SubmitError, Workflow, WorkflowSnapshot};

pub struct Session {
    workflow: Mutex<Workflow>,
    source: Arc<dyn PatternSource>,
    gateway: Arc<dyn EvaluatorGateway>,
    updates: watch::Sender<WorkflowSnapshot>,
}

impl Session {
    pub fn new(source: Arc<dyn PatternSource>, gateway: Arc<dyn EvaluatorGateway>) -> Arc<Self> {
        let workflow = Workflow::new();
        let (updates, _) = watch::channel(workflow.snapshot());
        Arc::new(Self {
            workflow: Mutex::new(workflow),
            source,
            gateway,
            updates,
        })
    }

    /// Latest published snapshot, without touching the workflow lock.
    pub fn snapshot(&self) -> WorkflowSnapshot {
        self.updates.borrow().clone()
    }

    /// Subscribe to snapshot updates (one per applied transition).
    pub fn subscribe(&self) -> watch::Receiver<WorkflowSnapshot> {
        self.updates.subscribe()
    }

    fn publish(&self, wf: &Workflow) {
        self.updates.send_replace(wf.snapshot());
    }

    /// Kick off a challenge load and return immediately. The session enters
    /// Loading; the fetch completes in the background and lands in Active or
    /// Idle through the machine's ticket guard.
    #[instrument(level = "info", skip(self), fields(%difficulty))]
    pub async fn request_challenge(self: &Arc<Self>, difficulty: String) {
        let ticket = {
            let mut wf = self.workflow.lock().await;
            let t = wf.begin_load();
            self.publish(&wf);
            t
        };
        let sess = self.clone();
        tokio::spawn(async move {
            let result = sess.source.fetch_challenge(&difficulty).await;
            let mut wf = sess.workflow.lock().await;
            wf.complete_load(ticket, result);
            sess.publish(&wf);
        });
    }

    #[instrument(level = "debug", skip(self, text), fields(text_len = text.len()))]
    pub async fn edit(&self, text: &str) -> Result<(), EditError> {
        let mut wf = self.workflow.lock().await;
        wf.edit(text)?;
        self.publish(&wf);
        Ok(())
    }

    /// Snapshot the current (challenge, draft) pair and send it out for
    /// judgment. Local validation failures (`EmptySolution` etc.) are
    /// returned synchronously; the gateway is never contacted for them.
    #[instrument(level = "info", skip(self))]
    pub async fn submit(self: &Arc<Self>) -> Result<(), SubmitError> {
        let (token, challenge) = {
            let mut wf = self.workflow.lock().await;
            let pair = wf.begin_submit()?;
            self.publish(&wf);
            pair
        };
        let sess = self.clone();
        tokio::spawn(async move {
            let verdict = match sess.gateway.evaluate(&challenge, &token.text).await {
                Ok(j) if j.accepted => Verdict::Accepted { score: j.score, explanation: j.explanation },
                Ok(j) => Verdict::Rejected { score: j.score, explanation: j.explanation },
                Err(e) => Verdict::EvaluationFailed { reason: e.to_string() },
            };
            let mut wf = sess.workflow.lock().await;
            wf.apply_verdict(&token, verdict);
            sess.publish(&wf);
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::{mpsc, oneshot};

    use crate::domain::{Challenge, ChallengeSource, Phase};
    use crate::gateway::{GatewayError, Judgment};
    use crate::source::SourceUnavailable;

    fn challenge(id: &str) -> Challenge {
        Challenge {
            id: id.into(),
            difficulty: "easy".into(),
            language: "rust".into(),
            source: ChallengeSource::Seed,
            prompt: "Implement a sliding-window maximum.".into(),
            key_points: vec![],
            checklist: None,
        }
    }

    /// Source that answers immediately with a fixed challenge id.
    struct FixedSource(String);

    #[async_trait]
    impl PatternSource for FixedSource {
        async fn fetch_challenge(&self, _d: &str) -> Result<Challenge, SourceUnavailable> {
            Ok(challenge(&self.0))
        }
    }

    /// Source whose completions are scripted by the test.
    struct ManualSource {
        calls: mpsc::UnboundedSender<oneshot::Sender<Result<Challenge, SourceUnavailable>>>,
    }

    #[async_trait]
    impl PatternSource for ManualSource {
        async fn fetch_challenge(&self, _d: &str) -> Result<Challenge, SourceUnavailable> {
            let (tx, rx) = oneshot::channel();
            self.calls.send(tx).unwrap();
            rx.await.unwrap_or_else(|_| Err(SourceUnavailable("test dropped".into())))
        }
    }

    type GatewayCall = (String, oneshot::Sender<Result<Judgment, GatewayError>>);

    /// Gateway whose responses the test releases in a chosen order.
    struct ManualGateway {
        calls: mpsc::UnboundedSender<GatewayCall>,
    }

    #[async_trait]
    impl EvaluatorGateway for ManualGateway {
        async fn evaluate(&self, _ch: &Challenge, solution: &str) -> Result<Judgment, GatewayError> {
            let (tx, rx) = oneshot::channel();
            self.calls.send((solution.to_string(), tx)).unwrap();
            rx.await
                .unwrap_or_else(|_| Err(GatewayError("test dropped".into())))
        }
    }

    fn accepted() -> Result<Judgment, GatewayError> {
        Ok(Judgment { accepted: true, score: 95.0, explanation: "good".into() })
    }

    fn rejected() -> Result<Judgment, GatewayError> {
        Ok(Judgment { accepted: false, score: 10.0, explanation: "bad".into() })
    }

    struct Rig {
        session: Arc<Session>,
        source_calls: mpsc::UnboundedReceiver<oneshot::Sender<Result<Challenge, SourceUnavailable>>>,
        gateway_calls: mpsc::UnboundedReceiver<GatewayCall>,
    }

    fn rig() -> Rig {
        let (src_tx, source_calls) = mpsc::unbounded_channel();
        let (gw_tx, gateway_calls) = mpsc::unbounded_channel();
        let session = Session::new(
            Arc::new(ManualSource { calls: src_tx }),
            Arc::new(ManualGateway { calls: gw_tx }),
        );
        Rig { session, source_calls, gateway_calls }
    }

    async fn wait_phase(session: &Arc<Session>, phase: Phase) -> WorkflowSnapshot {
        let mut sub = session.subscribe();
        let snap = sub.wait_for(|s| s.phase == phase).await.unwrap().clone();
        snap
    }

    /// Drive a rig to Active with the given challenge id.
    async fn activate(rig: &mut Rig, id: &str) {
        rig.session.request_challenge("easy".into()).await;
        let respond = rig.source_calls.recv().await.unwrap();
        respond.send(Ok(challenge(id))).unwrap();
        wait_phase(&rig.session, Phase::Active).await;
    }

    #[tokio::test]
    async fn accepted_submission_resolves() {
        let mut rig = rig();
        activate(&mut rig, "c1").await;
        rig.session.edit("x").await.unwrap();
        rig.session.submit().await.unwrap();
        assert_eq!(rig.session.snapshot().phase, Phase::Submitting);

        let (text, respond) = rig.gateway_calls.recv().await.unwrap();
        assert_eq!(text, "x");
        respond.send(accepted()).unwrap();

        let snap = wait_phase(&rig.session, Phase::Resolved).await;
        assert!(snap.verdict.unwrap().is_accepted());
        assert_eq!(snap.challenge.unwrap().id, "c1");
    }

    #[tokio::test]
    async fn empty_draft_never_reaches_the_gateway() {
        let mut rig = rig();
        activate(&mut rig, "c1").await;
        rig.session.edit("  \n ").await.unwrap();
        assert_eq!(rig.session.submit().await.unwrap_err(), SubmitError::EmptySolution);
        assert!(rig.gateway_calls.try_recv().is_err());
        assert_eq!(rig.session.snapshot().phase, Phase::Active);
    }

    #[tokio::test]
    async fn edits_are_accepted_while_submitting_and_discard_the_inflight_result() {
        let mut rig = rig();
        activate(&mut rig, "c1").await;
        rig.session.edit("a").await.unwrap();
        rig.session.submit().await.unwrap();

        // still responsive mid-flight
        rig.session.edit("b").await.unwrap();
        assert_eq!(rig.session.snapshot().draft, "b");

        let (_, respond) = rig.gateway_calls.recv().await.unwrap();
        respond.send(accepted()).unwrap();

        // stale verdict dropped, session handed back for a resubmit
        let snap = wait_phase(&rig.session, Phase::Active).await;
        assert!(snap.verdict.is_none());
        assert_eq!(snap.draft, "b");
    }

    #[tokio::test]
    async fn superseded_challenge_keeps_its_late_verdict_off_screen() {
        let mut rig = rig();
        activate(&mut rig, "c1").await;
        rig.session.edit("x").await.unwrap();
        rig.session.submit().await.unwrap();
        let (_, respond_old) = rig.gateway_calls.recv().await.unwrap();

        // user abandons c1 while its evaluation is still in flight
        rig.session.request_challenge("easy".into()).await;
        let respond_load = rig.source_calls.recv().await.unwrap();
        respond_load.send(Ok(challenge("c2"))).unwrap();
        wait_phase(&rig.session, Phase::Active).await;

        respond_old.send(accepted()).unwrap();
        // give the spawned task a chance to (not) apply it
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let snap = rig.session.snapshot();
        assert_eq!(snap.challenge.unwrap().id, "c2");
        assert!(snap.verdict.is_none());
        assert_eq!(snap.phase, Phase::Active);
    }

    #[tokio::test]
    async fn only_the_latest_text_snapshot_is_applied() {
        let mut rig = rig();
        activate(&mut rig, "c1").await;
        rig.session.edit("a").await.unwrap();
        rig.session.submit().await.unwrap();
        let (text_a, respond_a) = rig.gateway_calls.recv().await.unwrap();
        assert_eq!(text_a, "a");

        // edit past the first submission; its response hands us back Active
        rig.session.edit("b").await.unwrap();
        respond_a.send(rejected()).unwrap();
        wait_phase(&rig.session, Phase::Active).await;

        rig.session.submit().await.unwrap();
        let (text_b, respond_b) = rig.gateway_calls.recv().await.unwrap();
        assert_eq!(text_b, "b");
        respond_b.send(accepted()).unwrap();

        let snap = wait_phase(&rig.session, Phase::Resolved).await;
        assert!(snap.verdict.unwrap().is_accepted());
        assert_eq!(snap.draft, "b");
    }

    #[tokio::test]
    async fn source_failure_surfaces_and_stays_recoverable() {
        let mut rig = rig();
        rig.session.request_challenge("easy".into()).await;
        let respond = rig.source_calls.recv().await.unwrap();
        respond.send(Err(SourceUnavailable("bank offline".into()))).unwrap();

        let snap = wait_phase(&rig.session, Phase::Idle).await;
        assert!(snap.challenge.is_none());
        assert!(snap.source_error.unwrap().contains("bank offline"));

        // retry succeeds
        activate(&mut rig, "c1").await;
        assert!(rig.session.snapshot().source_error.is_none());
    }

    #[tokio::test]
    async fn gateway_failure_resolves_as_evaluation_failed_and_retries() {
        let mut rig = rig();
        activate(&mut rig, "c1").await;
        rig.session.edit("x").await.unwrap();
        rig.session.submit().await.unwrap();
        let (_, respond) = rig.gateway_calls.recv().await.unwrap();
        respond.send(Err(GatewayError("503 from judge".into()))).unwrap();

        let snap = wait_phase(&rig.session, Phase::Resolved).await;
        match snap.verdict.unwrap() {
            Verdict::EvaluationFailed { reason } => assert!(reason.contains("503")),
            other => panic!("expected EvaluationFailed, got {:?}", other),
        }
        // draft intact, retry allowed without editing
        assert_eq!(snap.draft, "x");
        rig.session.submit().await.unwrap();
        let (_, respond) = rig.gateway_calls.recv().await.unwrap();
        respond.send(accepted()).unwrap();
        let snap = rig
            .session
            .subscribe()
            .wait_for(|s| s.verdict.as_ref().map(|v| v.is_accepted()).unwrap_or(false))
            .await
            .unwrap()
            .clone();
        assert_eq!(snap.phase, Phase::Resolved);
    }

    #[tokio::test]
    async fn fixed_source_round_trip() {
        let (gw_tx, mut gateway_calls) = mpsc::unbounded_channel();
        let session = Session::new(
            Arc::new(FixedSource("seed-1".into())),
            Arc::new(ManualGateway { calls: gw_tx }),
        );
        session.request_challenge("easy".into()).await;
        let snap = wait_phase(&session, Phase::Active).await;
        assert_eq!(snap.challenge.unwrap().id, "seed-1");
        session.edit("answer").await.unwrap();
        session.submit().await.unwrap();
        let (_, respond) = gateway_calls.recv().await.unwrap();
        respond.send(accepted()).unwrap();
        wait_phase(&session, Phase::Resolved).await;
    }
}
