#![forbid(unsafe_code)]

use std::collections::VecDeque;

use web_time::Instant;

use crate::{
    AbrOptions, BufferState, ControllerMode, DecisionReason, NetworkClass, NetworkSample,
    QualityDecision, QualityLevel,
};

/// Upper bound on the decision history, whatever the options ask for.
pub const MAX_HISTORY: usize = 10;

/// A proposed switch waiting for its rendition to resolve.
#[derive(Clone, Copy, Debug)]
struct Pending {
    decision: QualityDecision,
    /// Stability window start to restore if the switch is rejected.
    stable_since: Option<Instant>,
}

/// Failure bookkeeping for the one-retry rule.
#[derive(Clone, Copy, Debug, Default)]
struct Failures {
    target: Option<QualityLevel>,
    count: u32,
    /// Failed decision to re-issue on the next evaluation.
    retry: Option<QualityDecision>,
}

impl Failures {
    fn abandoned(&self, target: QualityLevel) -> bool {
        self.target == Some(target) && self.count >= 2
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Adaptive bitrate state machine.
///
/// Advanced only by [`evaluate`](Self::evaluate),
/// [`set_manual_quality`](Self::set_manual_quality) and
/// [`enable_auto_mode`](Self::enable_auto_mode). A switching decision is only a
/// proposal: the caller resolves the rendition and then calls
/// [`commit`](Self::commit) or [`reject`](Self::reject). Until then the
/// current level is unchanged.
#[derive(Debug)]
pub struct QualityDecisionEngine {
    opts: AbrOptions,
    mode: ControllerMode,
    current: QualityLevel,
    recommended: QualityLevel,
    started: bool,
    last_decision: Option<QualityDecision>,
    history: VecDeque<QualityDecision>,
    pending: Option<Pending>,
    failures: Failures,
    /// Start of the current no-switch, no-stall stretch.
    stable_since: Option<Instant>,
    stall_baseline: u32,
    low_buffer_armed: bool,
    below_current_streak: u32,
    last_class: Option<NetworkClass>,
    last_sample: Option<NetworkSample>,
    last_buffer: BufferState,
}

impl QualityDecisionEngine {
    pub fn new(opts: AbrOptions) -> Self {
        Self {
            recommended: NetworkClass::Unknown
                .max_sustainable_level()
                .min(opts.max_level),
            current: NetworkClass::Unknown
                .max_sustainable_level()
                .min(opts.max_level),
            history: VecDeque::with_capacity(opts.history_capacity.clamp(1, MAX_HISTORY)),
            opts,
            mode: ControllerMode::Auto,
            started: false,
            last_decision: None,
            pending: None,
            failures: Failures::default(),
            stable_since: None,
            stall_baseline: 0,
            low_buffer_armed: true,
            below_current_streak: 0,
            last_class: None,
            last_sample: None,
            last_buffer: BufferState::default(),
        }
    }

    pub fn options(&self) -> &AbrOptions {
        &self.opts
    }

    pub fn current_level(&self) -> QualityLevel {
        self.current
    }

    pub fn recommended_level(&self) -> QualityLevel {
        self.recommended
    }

    pub fn mode(&self) -> ControllerMode {
        self.mode
    }

    pub fn is_auto_mode(&self) -> bool {
        self.mode.is_auto()
    }

    pub fn last_decision(&self) -> Option<&QualityDecision> {
        self.last_decision.as_ref()
    }

    /// Recent decisions, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &QualityDecision> {
        self.history.iter()
    }

    /// Switch proposal awaiting commit or rejection.
    pub fn pending(&self) -> Option<&QualityDecision> {
        self.pending.as_ref().map(|p| &p.decision)
    }

    fn level_for(&self, sample: &NetworkSample) -> QualityLevel {
        sample
            .class
            .max_sustainable_level()
            .min(self.opts.max_level)
    }

    /// Begin a session: Auto mode at the highest level the first sample supports.
    pub fn start(&mut self, sample: &NetworkSample, buffer: &BufferState, now: Instant) -> QualityDecision {
        let level = self.level_for(sample);
        self.mode = ControllerMode::Auto;
        self.current = level;
        self.recommended = level;
        self.started = true;
        self.history.clear();
        self.last_decision = None;
        self.pending = None;
        self.failures.clear();
        self.stable_since = Some(now);
        self.stall_baseline = buffer.stall_event_count;
        self.low_buffer_armed = true;
        self.below_current_streak = 0;
        self.last_class = Some(sample.class.effective());
        self.last_sample = Some(*sample);
        self.last_buffer = *buffer;

        tracing::debug!(%level, class = %sample.class, "ABR start");
        self.record(QualityDecision::hold(level, DecisionReason::Initial, now))
    }

    /// Feed the latest inputs and get the resulting decision.
    ///
    /// Returns `None` when the outcome repeats the previous decision or a
    /// matching switch is already pending; such evaluations leave no trace in
    /// the history.
    pub fn evaluate(
        &mut self,
        sample: &NetworkSample,
        buffer: &BufferState,
        now: Instant,
    ) -> Option<QualityDecision> {
        if !self.started {
            return Some(self.start(sample, buffer, now));
        }

        self.last_sample = Some(*sample);
        self.last_buffer = *buffer;

        let class = sample.class.effective();
        if self.last_class != Some(class) {
            self.failures.clear();
            self.last_class = Some(class);
        }
        self.recommended = self.level_for(sample);

        let stalled = buffer.stall_event_count > self.stall_baseline;
        self.stall_baseline = buffer.stall_event_count;
        if stalled {
            self.stable_since = Some(now);
            self.failures.clear();
        }

        let low_buffer = buffer.primed && buffer.seconds_buffered < self.opts.low_buffer_secs;
        let low_buffer_edge = low_buffer && self.low_buffer_armed;
        self.low_buffer_armed = !low_buffer;

        if self.recommended < self.current {
            self.below_current_streak = self.below_current_streak.saturating_add(1);
        } else {
            self.below_current_streak = 0;
        }

        let candidate = match self.mode {
            ControllerMode::Manual(level) => {
                (level != self.current).then(|| {
                    QualityDecision::switch(self.current, level, DecisionReason::Manual, now)
                })
            }
            ControllerMode::Auto => self.auto_candidate(stalled || low_buffer_edge, buffer, now),
        };

        tracing::debug!(
            current = %self.current,
            recommended = %self.recommended,
            class = %sample.class,
            buffered = buffer.seconds_buffered,
            stalls = buffer.stall_event_count,
            stalled,
            low_buffer_edge,
            candidate = ?candidate.map(|d| d.to_level),
            "ABR evaluate"
        );

        match candidate {
            Some(decision) => self.propose(decision),
            None => {
                if self.pending.is_some() {
                    return None;
                }
                let reason = match self.mode {
                    ControllerMode::Manual(_) => DecisionReason::Manual,
                    ControllerMode::Auto => self
                        .last_decision
                        .map_or(DecisionReason::Initial, |d| d.reason),
                };
                let hold = QualityDecision::hold(self.current, reason, now);
                if self
                    .last_decision
                    .is_some_and(|last| last.same_transition(&hold))
                {
                    return None;
                }
                Some(self.record(hold))
            }
        }
    }

    fn auto_candidate(
        &mut self,
        urgent: bool,
        buffer: &BufferState,
        now: Instant,
    ) -> Option<QualityDecision> {
        let current = self.current;
        let recommended = self.recommended;

        let natural = if urgent {
            current.step_down().map(|down| {
                QualityDecision::switch(
                    current,
                    down.min(recommended),
                    DecisionReason::DowngradeStall,
                    now,
                )
            })
        } else if recommended < current
            && self.below_current_streak >= self.opts.network_downgrade_confirmations
        {
            Some(QualityDecision::switch(
                current,
                recommended,
                DecisionReason::DowngradeNetwork,
                now,
            ))
        } else if recommended > current
            && self.is_stable(now)
            && buffer.seconds_buffered >= self.opts.min_buffer_for_upgrade_secs
        {
            current.step_up().map(|up| {
                QualityDecision::switch(current, up, DecisionReason::UpgradeStable, now)
            })
        } else {
            None
        };

        match natural {
            Some(decision) => {
                if self
                    .failures
                    .retry
                    .is_some_and(|r| r.to_level != decision.to_level)
                {
                    self.failures.retry = None;
                }
                Some(decision)
            }
            None => self.take_retry(now),
        }
    }

    /// Re-issue the last failed switch once, if it still makes sense.
    fn take_retry(&mut self, now: Instant) -> Option<QualityDecision> {
        let failed = self.failures.retry?;
        if failed.from_level != self.current {
            self.failures.retry = None;
            return None;
        }
        let still_valid = match failed.reason {
            DecisionReason::DowngradeStall | DecisionReason::DowngradeNetwork => {
                failed.to_level < self.current
            }
            // Upgrades keep honouring the stability window.
            DecisionReason::UpgradeStable => {
                failed.to_level <= self.recommended && self.is_stable(now)
            }
            DecisionReason::Manual | DecisionReason::Initial => false,
        };
        if !still_valid {
            if failed.reason != DecisionReason::UpgradeStable {
                self.failures.retry = None;
            }
            return None;
        }
        self.failures.retry = None;
        tracing::debug!(to = %failed.to_level, reason = ?failed.reason, "ABR retrying failed switch");
        Some(QualityDecision::switch(
            failed.from_level,
            failed.to_level,
            failed.reason,
            now,
        ))
    }

    fn propose(&mut self, decision: QualityDecision) -> Option<QualityDecision> {
        if self.failures.abandoned(decision.to_level) {
            tracing::debug!(to = %decision.to_level, "ABR target abandoned after repeated failures");
            return None;
        }
        if self
            .pending
            .is_some_and(|p| p.decision.to_level == decision.to_level)
        {
            return None;
        }
        if decision.should_switch {
            self.pending = Some(Pending {
                decision,
                stable_since: self.stable_since,
            });
            self.stable_since = Some(decision.decided_at);
        }
        Some(self.record(decision))
    }

    /// Manual override: disable Auto evaluation and request `level`.
    pub fn set_manual_quality(&mut self, level: QualityLevel, now: Instant) -> QualityDecision {
        self.mode = ControllerMode::Manual(level);
        self.failures.clear();
        let decision = QualityDecision::switch(self.current, level, DecisionReason::Manual, now);
        self.pending = decision.should_switch.then_some(Pending {
            decision,
            stable_since: self.stable_since,
        });
        tracing::debug!(from = %self.current, to = %level, "ABR manual override");
        self.record(decision)
    }

    /// Return to Auto mode with a fresh stability window.
    ///
    /// Issued as an `Initial` decision towards the level the latest sample supports.
    pub fn enable_auto_mode(&mut self, now: Instant) -> QualityDecision {
        self.mode = ControllerMode::Auto;
        self.started = true;
        self.failures.clear();
        self.stable_since = Some(now);
        self.stall_baseline = self.last_buffer.stall_event_count;
        self.low_buffer_armed = true;
        self.below_current_streak = 0;

        let target = self
            .last_sample
            .unwrap_or_else(|| NetworkSample::unknown(now))
            .class
            .max_sustainable_level()
            .min(self.opts.max_level);
        self.recommended = target;

        let decision = QualityDecision::switch(self.current, target, DecisionReason::Initial, now);
        self.pending = decision.should_switch.then_some(Pending {
            decision,
            stable_since: self.stable_since,
        });
        tracing::debug!(from = %self.current, to = %target, "ABR auto mode enabled");
        self.record(decision)
    }

    /// Apply a switch whose rendition resolved.
    ///
    /// Returns `false` if `decision` is no longer the pending proposal.
    pub fn commit(&mut self, decision: &QualityDecision, now: Instant) -> bool {
        if !self.is_pending(decision) {
            tracing::trace!(to = %decision.to_level, "ABR commit ignored: superseded");
            return false;
        }
        self.pending = None;
        self.current = decision.to_level;
        self.stable_since = Some(now);
        self.below_current_streak = 0;
        self.failures.clear();
        tracing::debug!(from = %decision.from_level, to = %decision.to_level, reason = ?decision.reason, "ABR switch committed");
        true
    }

    /// Roll back a switch whose rendition failed to resolve.
    ///
    /// The current level and its stability window stay as they were before the
    /// proposal; the switch is retried once on the next evaluation and
    /// abandoned after a second failure.
    pub fn reject(&mut self, decision: &QualityDecision) -> bool {
        let Some(pending) = self.pending.filter(|_| self.is_pending(decision)) else {
            tracing::trace!(to = %decision.to_level, "ABR reject ignored: superseded");
            return false;
        };
        self.pending = None;
        self.stable_since = pending.stable_since;
        if self.failures.target == Some(decision.to_level) {
            self.failures.count = self.failures.count.saturating_add(1);
        } else {
            self.failures.target = Some(decision.to_level);
            self.failures.count = 1;
        }
        self.failures.retry = (self.failures.count < 2).then_some(*decision);
        tracing::warn!(
            from = %decision.from_level,
            to = %decision.to_level,
            failures = self.failures.count,
            "ABR switch rolled back"
        );
        true
    }

    fn is_pending(&self, decision: &QualityDecision) -> bool {
        self.pending.is_some_and(|p| {
            p.decision.same_transition(decision)
                && p.decision.decided_at == decision.decided_at
                && decision.from_level == self.current
        })
    }

    fn is_stable(&self, now: Instant) -> bool {
        self.stable_since
            .is_some_and(|t| now.saturating_duration_since(t) >= self.opts.stability_window)
    }

    fn record(&mut self, decision: QualityDecision) -> QualityDecision {
        let duplicate = self
            .history
            .back()
            .is_some_and(|last| last.same_transition(&decision) && !decision.should_switch);
        if !duplicate {
            if self.history.len() >= self.opts.history_capacity.clamp(1, MAX_HISTORY) {
                self.history.pop_front();
            }
            self.history.push_back(decision);
        }
        self.last_decision = Some(decision);
        decision
    }
}

impl Default for QualityDecisionEngine {
    fn default() -> Self {
        Self::new(AbrOptions::default())
    }
}
