//! Authoritative session phase machine
//!
//! Exactly one [`Phase`] is active at a time and each one is represented to
//! observers by a replicated object. Moving between phases is always done by
//! issuing a named transition, which lives as its own replicated object until
//! something completes it. Completion is an event: the transition's work, or
//! any other holder of its [`Completer`], fires it and the service commits
//! the change on its next tick.
//!
//! Committing exits the old phase, enters the target, and only then disposes
//! of the transition object, so observers never see a moment with no phase
//! object alive.
//!
//! At most one transition is in flight. An in-flight transition cannot be
//! cancelled.

use crate::config::{ConfigError, PhaseTable};
use log::{debug, error, info};
use shared::{ObjectId, Phase, Replicator, TransitionId};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhaseError {
    #[error("transition `{0}` is not in the phase table")]
    UnknownTransition(TransitionId),
    #[error("phase service has not been started")]
    NotStarted,
    #[error("phase service is already running")]
    AlreadyStarted,
    #[error("cannot issue `{requested}` while `{in_flight}` is in flight")]
    TransitionInFlight {
        requested: TransitionId,
        in_flight: TransitionId,
    },
    #[error("`{transition}` starts from `{expected}` but `{active}` is active")]
    WrongSource {
        transition: TransitionId,
        expected: Phase,
        active: Phase,
    },
}

/// A committed phase change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseChange {
    pub from: Phase,
    pub to: Phase,
    pub via: TransitionId,
}

/// Handle that marks one particular in-flight transition as complete.
///
/// Firing a completer whose transition already committed has no effect.
#[derive(Debug, Clone)]
pub struct Completer {
    tx: mpsc::UnboundedSender<(u64, TransitionId)>,
    flight: u64,
    transition: TransitionId,
}

impl Completer {
    pub fn transition(&self) -> TransitionId {
        self.transition
    }

    pub fn complete(&self) {
        if self.tx.send((self.flight, self.transition)).is_err() {
            debug!(
                "Completion of `{}` dropped, phase service is gone",
                self.transition
            );
        }
    }
}

/// Work that runs while a transition is in flight and decides when it
/// completes.
pub trait TransitionWork: Send + Sync {
    /// Called once when the transition is issued.
    fn begin(&mut self, completer: &Completer);

    /// Called every service tick until the transition commits.
    fn update(&mut self, dt: f32, completer: &Completer);
}

/// Completes after a fixed amount of simulated time. A zero duration
/// completes on the first tick after issue.
#[derive(Debug)]
pub struct TimedTransition {
    remaining: f32,
    fired: bool,
}

impl TimedTransition {
    pub fn new(duration_secs: f32) -> Self {
        Self {
            remaining: duration_secs.max(0.0),
            fired: false,
        }
    }

    fn fire(&mut self, completer: &Completer) {
        if !self.fired {
            self.fired = true;
            completer.complete();
        }
    }
}

impl TransitionWork for TimedTransition {
    fn begin(&mut self, completer: &Completer) {
        if self.remaining <= 0.0 {
            self.fire(completer);
        }
    }

    fn update(&mut self, dt: f32, completer: &Completer) {
        self.remaining -= dt;
        if self.remaining <= 0.0 {
            self.fire(completer);
        }
    }
}

struct ActivePhase {
    phase: Phase,
    object: ObjectId,
    prefab: String,
}

struct InFlight {
    transition: TransitionId,
    target: Phase,
    object: ObjectId,
    prefab: String,
    flight: u64,
    work: Box<dyn TransitionWork>,
}

pub struct GsService<R: Replicator> {
    table: PhaseTable,
    replicator: R,
    active: Option<ActivePhase>,
    in_flight: Option<InFlight>,
    next_flight: u64,
    completions_tx: mpsc::UnboundedSender<(u64, TransitionId)>,
    completions_rx: mpsc::UnboundedReceiver<(u64, TransitionId)>,
}

impl<R: Replicator> GsService<R> {
    pub fn new(table: PhaseTable, replicator: R) -> Result<Self, ConfigError> {
        table.validate()?;
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();

        Ok(Self {
            table,
            replicator,
            active: None,
            in_flight: None,
            next_flight: 0,
            completions_tx,
            completions_rx,
        })
    }

    /// Enters the table's initial phase. Only valid once.
    pub fn start(&mut self) -> Result<Phase, PhaseError> {
        if self.active.is_some() {
            error!("Phase service start requested twice");
            return Err(PhaseError::AlreadyStarted);
        }

        let phase = self.table.initial_phase;
        self.active = Some(self.enter(phase));
        info!("Phase service started in {}", phase);
        Ok(phase)
    }

    /// Issues `id` with the timed work configured in the phase table.
    pub fn issue_transition(&mut self, id: TransitionId) -> Result<(), PhaseError> {
        let duration = self
            .table
            .transition(id)
            .map(|spec| spec.duration_secs)
            .unwrap_or_default();
        self.issue_transition_with(id, Box::new(TimedTransition::new(duration)))
    }

    /// Issues `id`, handing `work` the completer for this flight.
    pub fn issue_transition_with(
        &mut self,
        id: TransitionId,
        mut work: Box<dyn TransitionWork>,
    ) -> Result<(), PhaseError> {
        if let Err(e) = self.check_issue(id) {
            error!("Rejected transition {}: {}", id, e);
            return Err(e);
        }

        let (target, prefab) = match self.table.transition(id) {
            Some(spec) => (spec.target, spec.object.clone()),
            None => return Err(PhaseError::UnknownTransition(id)),
        };

        let flight = self.next_flight;
        self.next_flight += 1;

        let object = self.replicator.spawn(&prefab);
        let completer = self.completer_for(flight, id);
        info!("Transition {} issued toward {}", id, target);

        work.begin(&completer);
        self.in_flight = Some(InFlight {
            transition: id,
            target,
            object,
            prefab,
            flight,
            work,
        });

        Ok(())
    }

    fn check_issue(&self, id: TransitionId) -> Result<(), PhaseError> {
        let spec = self
            .table
            .transition(id)
            .ok_or(PhaseError::UnknownTransition(id))?;
        let active = self.active.as_ref().ok_or(PhaseError::NotStarted)?;

        if let Some(in_flight) = &self.in_flight {
            return Err(PhaseError::TransitionInFlight {
                requested: id,
                in_flight: in_flight.transition,
            });
        }

        if spec.source != active.phase {
            return Err(PhaseError::WrongSource {
                transition: id,
                expected: spec.source,
                active: active.phase,
            });
        }

        Ok(())
    }

    /// Advances in-flight work by `dt` seconds and commits a pending
    /// completion, if any.
    pub fn tick(&mut self, dt: f32) -> Option<PhaseChange> {
        if let Some(in_flight) = self.in_flight.as_mut() {
            let completer = Completer {
                tx: self.completions_tx.clone(),
                flight: in_flight.flight,
                transition: in_flight.transition,
            };
            in_flight.work.update(dt, &completer);
        }

        let mut change = None;
        while let Ok((flight, transition)) = self.completions_rx.try_recv() {
            let current = self.in_flight.as_ref().map(|in_flight| in_flight.flight);
            if change.is_none() && current == Some(flight) {
                change = self.commit();
            } else {
                debug!("Ignoring stale completion of {}", transition);
            }
        }

        change
    }

    fn commit(&mut self) -> Option<PhaseChange> {
        let in_flight = self.in_flight.take()?;
        let previous = self.active.take()?;

        self.replicator.destroy(previous.object);
        self.active = Some(self.enter(in_flight.target));
        self.replicator.destroy(in_flight.object);

        info!(
            "Phase {} -> {} via {}",
            previous.phase, in_flight.target, in_flight.transition
        );

        Some(PhaseChange {
            from: previous.phase,
            to: in_flight.target,
            via: in_flight.transition,
        })
    }

    fn enter(&mut self, phase: Phase) -> ActivePhase {
        let prefab = self
            .table
            .phase(phase)
            .map(|spec| spec.object.clone())
            .unwrap_or_else(|| phase.to_string());
        let object = self.replicator.spawn(&prefab);
        ActivePhase {
            phase,
            object,
            prefab,
        }
    }

    fn completer_for(&self, flight: u64, transition: TransitionId) -> Completer {
        Completer {
            tx: self.completions_tx.clone(),
            flight,
            transition,
        }
    }

    /// Completer for the transition currently in flight.
    pub fn completer(&self) -> Option<Completer> {
        self.in_flight
            .as_ref()
            .map(|in_flight| self.completer_for(in_flight.flight, in_flight.transition))
    }

    pub fn active_phase(&self) -> Option<Phase> {
        self.active.as_ref().map(|active| active.phase)
    }

    pub fn in_flight(&self) -> Option<TransitionId> {
        self.in_flight.as_ref().map(|in_flight| in_flight.transition)
    }

    /// Every replicated object the service currently keeps alive.
    pub fn live_objects(&self) -> Vec<(ObjectId, String)> {
        let mut objects = Vec::new();
        if let Some(active) = &self.active {
            objects.push((active.object, active.prefab.clone()));
        }
        if let Some(in_flight) = &self.in_flight {
            objects.push((in_flight.object, in_flight.prefab.clone()));
        }
        objects
    }

    pub fn replicator(&self) -> &R {
        &self.replicator
    }
}
