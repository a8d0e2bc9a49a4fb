//! Bounded probabilistic follow-up cascade.
//!
//! After an inactivity post, each stage draws once. A successful draw picks a
//! bot other than the previous responder and advances; the first failed draw
//! ends the cascade for good.

use super::types::BotId;
use rand::Rng;
use rand::seq::IndexedRandom;
use std::sync::Arc;

pub const DEFAULT_CHAIN_PROBABILITIES: [f64; 4] = [0.9, 0.5, 0.8, 0.2];

#[derive(Debug, Clone, PartialEq)]
pub struct ChainCascade {
    probabilities: Arc<[f64]>,
    stage: usize,
    last_responder: BotId,
    stopped: bool,
}

impl ChainCascade {
    pub fn new(probabilities: Arc<[f64]>, last_responder: BotId) -> Self {
        Self {
            probabilities,
            stage: 0,
            last_responder,
            stopped: false,
        }
    }

    pub fn stage(&self) -> usize {
        self.stage
    }

    pub fn last_responder(&self) -> &BotId {
        &self.last_responder
    }

    /// True once a draw failed, the candidate set was empty, or every stage ran.
    pub fn is_exhausted(&self) -> bool {
        self.stopped || self.stage >= self.probabilities.len()
    }

    /// Run one stage with the uniform draw `draw` in `[0, 1)`.
    ///
    /// Returns the next responder, or `None` when the cascade ends here.
    pub fn step<R: Rng + ?Sized>(
        &mut self,
        draw: f64,
        bots: &[BotId],
        rng: &mut R,
    ) -> Option<BotId> {
        if self.is_exhausted() {
            return None;
        }
        if draw >= self.probabilities[self.stage] {
            self.stopped = true;
            return None;
        }

        let candidates: Vec<&BotId> = bots
            .iter()
            .filter(|bot| **bot != self.last_responder)
            .collect();
        let Some(next) = candidates.choose(rng).map(|bot| (*bot).clone()) else {
            self.stopped = true;
            return None;
        };

        self.stage += 1;
        self.last_responder = next.clone();
        Some(next)
    }

    /// Lazily evaluate the rest of the cascade against a stream of draws.
    ///
    /// Stops when the cascade ends or the draws run out.
    pub fn responders<'a, D, R>(
        self,
        draws: D,
        bots: &'a [BotId],
        rng: &'a mut R,
    ) -> Responders<'a, D::IntoIter, R>
    where
        D: IntoIterator<Item = f64>,
        R: Rng + ?Sized,
    {
        Responders {
            cascade: self,
            draws: draws.into_iter(),
            bots,
            rng,
        }
    }
}

/// Iterator returned by [`ChainCascade::responders`].
pub struct Responders<'a, D, R: ?Sized> {
    cascade: ChainCascade,
    draws: D,
    bots: &'a [BotId],
    rng: &'a mut R,
}

impl<D, R> Iterator for Responders<'_, D, R>
where
    D: Iterator<Item = f64>,
    R: Rng + ?Sized,
{
    type Item = BotId;

    fn next(&mut self) -> Option<BotId> {
        if self.cascade.is_exhausted() {
            return None;
        }
        let draw = self.draws.next()?;
        self.cascade.step(draw, self.bots, &mut *self.rng)
    }
}
