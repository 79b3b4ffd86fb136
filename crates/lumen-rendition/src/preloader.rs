#![forbid(unsafe_code)]

use lumen_abr::{QualityDecision, QualityLevel};
use lumen_core::{Epoch, SourceRef};

use crate::{
    catalog::{RenditionCatalog, ResolvedUrl},
    error::ResolutionError,
};

/// A proposed switch handed to the preloader.
#[derive(Clone, Debug)]
pub struct SwitchPlan {
    pub decision: QualityDecision,
    pub source: SourceRef,
    /// Generation the decision belongs to.
    pub epoch: Epoch,
}

impl SwitchPlan {
    pub fn target(&self) -> QualityLevel {
        self.decision.to_level
    }
}

/// Result of preloading a switch target.
#[derive(Clone, Debug, PartialEq)]
pub enum PreloadOutcome {
    /// Target resolved; the switch may be committed.
    Ready(ResolvedUrl),
    /// Resolution failed; the switch must be rolled back.
    Failed(ResolutionError),
    /// The plan's generation was superseded; drop the result.
    Stale,
    /// The decision does not switch.
    Skipped,
}

/// Resolves a switch target before the visible source changes.
#[derive(Clone, Debug)]
pub struct RenditionPreloader {
    catalog: RenditionCatalog,
}

impl RenditionPreloader {
    pub fn new(catalog: RenditionCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &RenditionCatalog {
        &self.catalog
    }

    pub async fn preload(&self, plan: &SwitchPlan) -> PreloadOutcome {
        if !plan.decision.should_switch {
            return PreloadOutcome::Skipped;
        }
        if plan.epoch.is_stale() {
            return PreloadOutcome::Stale;
        }

        let target = plan.target();
        let result = tokio::select! {
            biased;
            () = plan.epoch.cancelled() => {
                tracing::trace!(epoch = plan.epoch.id(), %target, "preload cancelled");
                return PreloadOutcome::Stale;
            }
            r = self.catalog.resolve(target, &plan.source) => r,
        };

        if plan.epoch.is_stale() {
            tracing::trace!(epoch = plan.epoch.id(), %target, "preload finished for a stale generation");
            return PreloadOutcome::Stale;
        }

        match result {
            Ok(resolved) => {
                tracing::debug!(
                    from = %plan.decision.from_level,
                    to = %target,
                    from_cache = resolved.from_cache,
                    "switch target preloaded"
                );
                PreloadOutcome::Ready(resolved)
            }
            Err(error) => {
                tracing::warn!(
                    from = %plan.decision.from_level,
                    to = %target,
                    %error,
                    "switch target failed to resolve"
                );
                PreloadOutcome::Failed(error)
            }
        }
    }

    /// Resolve the levels one step around `current` into the shared cache.
    ///
    /// Failures are ignored. Returns how many neighbours are now cached.
    pub async fn warm_neighbors(&self, current: QualityLevel, source: &SourceRef, epoch: &Epoch) -> usize {
        let mut warmed = 0;
        for level in [current.step_down(), current.step_up()].into_iter().flatten() {
            if epoch.is_stale() {
                break;
            }
            let resolved = tokio::select! {
                biased;
                () = epoch.cancelled() => break,
                r = self.catalog.resolve(level, source) => r,
            };
            match resolved {
                Ok(_) => warmed += 1,
                Err(error) => tracing::trace!(%level, %error, "neighbour warm-up failed"),
            }
        }
        warmed
    }
}
