//! Phase-ordered pipeline construction.

use std::sync::Arc;

use super::{InsertionMode, Middleware, PipelineKind, PipelinePhase, ResolvePipeline};
use crate::error::{ResolveError, ResolveResult};

/// Builds a [`ResolvePipeline`] from middleware, keeping the chain sorted
/// by phase.
///
/// Insertion places each new entry relative to existing entries of equal or
/// later phase: [`InsertionMode::EndOfPhase`] lands after equal-phase
/// entries, [`InsertionMode::StartOfPhase`] before them. Bulk insertion via
/// [`add_range`](PipelineBuilder::add_range) preserves caller order and
/// requires the sequence to be phase-monotonic non-decreasing.
pub struct PipelineBuilder {
    kind: PipelineKind,
    stages: Vec<Arc<dyn Middleware>>,
}

impl PipelineBuilder {
    /// Creates an empty builder for the given pipeline kind.
    pub fn new(kind: PipelineKind) -> Self {
        Self {
            kind,
            stages: Vec::new(),
        }
    }

    /// The kind of pipeline this builder produces.
    pub fn kind(&self) -> PipelineKind {
        self.kind
    }

    /// Inserts one middleware.
    pub fn add(
        &mut self,
        middleware: Arc<dyn Middleware>,
        mode: InsertionMode,
    ) -> ResolveResult<()> {
        let phase = middleware.phase();
        if !self.kind.accepts(phase) {
            return Err(ResolveError::PipelinePhaseViolation {
                phase,
                kind: self.kind,
            });
        }

        let position = match mode {
            InsertionMode::EndOfPhase => self
                .stages
                .iter()
                .position(|existing| existing.phase() > phase)
                .unwrap_or(self.stages.len()),
            InsertionMode::StartOfPhase => self
                .stages
                .iter()
                .position(|existing| existing.phase() >= phase)
                .unwrap_or(self.stages.len()),
        };
        self.stages.insert(position, middleware);
        Ok(())
    }

    /// Inserts a phase-monotonic sequence of middleware, preserving caller
    /// order.
    pub fn add_range(
        &mut self,
        middleware: impl IntoIterator<Item = Arc<dyn Middleware>>,
        mode: InsertionMode,
    ) -> ResolveResult<()> {
        let batch: Vec<Arc<dyn Middleware>> = middleware.into_iter().collect();

        let mut previous: Option<PipelinePhase> = None;
        for entry in &batch {
            let phase = entry.phase();
            if !self.kind.accepts(phase) {
                return Err(ResolveError::PipelinePhaseViolation {
                    phase,
                    kind: self.kind,
                });
            }
            if let Some(prev) = previous {
                if phase < prev {
                    return Err(ResolveError::InvalidRegistrationState {
                        reason: format!(
                            "bulk middleware insertion must be phase-monotonic \
                             ({prev:?} followed by {phase:?})"
                        ),
                    });
                }
            }
            previous = Some(phase);
        }

        match mode {
            InsertionMode::EndOfPhase => {
                for entry in batch {
                    self.add(entry, InsertionMode::EndOfPhase)?;
                }
            }
            InsertionMode::StartOfPhase => {
                // Inserting in reverse keeps the caller order within each
                // phase group.
                for entry in batch.into_iter().rev() {
                    self.add(entry, InsertionMode::StartOfPhase)?;
                }
            }
        }
        Ok(())
    }

    /// Composes the chain into an immutable pipeline.
    pub fn build(&self) -> ResolvePipeline {
        ResolvePipeline::new(self.stages.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::ResolveRequestContext;
    use crate::pipeline::Next;

    struct Probe {
        phase: PipelinePhase,
        name: &'static str,
    }

    impl Middleware for Probe {
        fn phase(&self) -> PipelinePhase {
            self.phase
        }

        fn name(&self) -> &'static str {
            self.name
        }

        fn invoke(
            &self,
            ctx: &mut ResolveRequestContext<'_>,
            next: Next<'_>,
        ) -> ResolveResult<()> {
            next.proceed(ctx)
        }
    }

    fn probe(phase: PipelinePhase, name: &'static str) -> Arc<dyn Middleware> {
        Arc::new(Probe { phase, name })
    }

    #[test]
    fn end_of_phase_lands_after_equal_phase_entries() {
        let mut b = PipelineBuilder::new(PipelineKind::Service);
        b.add(probe(PipelinePhase::Decoration, "a"), InsertionMode::EndOfPhase)
            .unwrap();
        b.add(probe(PipelinePhase::Decoration, "b"), InsertionMode::EndOfPhase)
            .unwrap();
        b.add(
            probe(PipelinePhase::ResolveRequestStart, "start"),
            InsertionMode::EndOfPhase,
        )
        .unwrap();
        assert_eq!(b.build().stage_names(), vec!["start", "a", "b"]);
    }

    #[test]
    fn start_of_phase_lands_before_equal_phase_entries() {
        let mut b = PipelineBuilder::new(PipelineKind::Service);
        b.add(probe(PipelinePhase::Decoration, "a"), InsertionMode::EndOfPhase)
            .unwrap();
        b.add(
            probe(PipelinePhase::Decoration, "b"),
            InsertionMode::StartOfPhase,
        )
        .unwrap();
        assert_eq!(b.build().stage_names(), vec!["b", "a"]);
    }

    #[test]
    fn phase_outside_kind_range_is_rejected() {
        let mut service = PipelineBuilder::new(PipelineKind::Service);
        let err = service
            .add(probe(PipelinePhase::Activation, "x"), InsertionMode::EndOfPhase)
            .unwrap_err();
        assert!(matches!(
            err,
            ResolveError::PipelinePhaseViolation {
                phase: PipelinePhase::Activation,
                kind: PipelineKind::Service,
            }
        ));

        let mut registration = PipelineBuilder::new(PipelineKind::Registration);
        assert!(registration
            .add(probe(PipelinePhase::Decoration, "x"), InsertionMode::EndOfPhase)
            .is_err());
    }

    #[test]
    fn range_must_be_monotonic() {
        let mut b = PipelineBuilder::new(PipelineKind::Service);
        let err = b
            .add_range(
                vec![
                    probe(PipelinePhase::Decoration, "a"),
                    probe(PipelinePhase::ResolveRequestStart, "b"),
                ],
                InsertionMode::EndOfPhase,
            )
            .unwrap_err();
        assert!(matches!(err, ResolveError::InvalidRegistrationState { .. }));
    }

    #[test]
    fn start_of_phase_range_preserves_caller_order() {
        let mut b = PipelineBuilder::new(PipelineKind::Service);
        b.add(probe(PipelinePhase::Decoration, "existing"), InsertionMode::EndOfPhase)
            .unwrap();
        b.add_range(
            vec![
                probe(PipelinePhase::Decoration, "a"),
                probe(PipelinePhase::Decoration, "b"),
            ],
            InsertionMode::StartOfPhase,
        )
        .unwrap();
        assert_eq!(b.build().stage_names(), vec!["a", "b", "existing"]);
    }
}
