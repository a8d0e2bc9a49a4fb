use super::SchedulerSettings;
use super::types::{BotId, Sender};
use rand::Rng;
use rand::seq::IndexedRandom;
use std::time::Duration;

/// Responders chosen for one posted message, with their delays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchPlan {
    pub primary: (BotId, Duration),
    pub secondaries: Vec<(BotId, Duration)>,
}

impl DispatchPlan {
    pub fn responders(&self) -> impl Iterator<Item = &(BotId, Duration)> {
        std::iter::once(&self.primary).chain(self.secondaries.iter())
    }
}

/// Pick a primary responder and independent secondaries for a message from
/// `sender`. Returns `None` when no bot is eligible.
pub fn plan_dispatch<R: Rng + ?Sized>(
    bots: &[BotId],
    sender: &Sender,
    settings: &SchedulerSettings,
    rng: &mut R,
) -> Option<DispatchPlan> {
    let candidates: Vec<&BotId> = match sender {
        Sender::User => bots.iter().collect(),
        Sender::Bot(author) => bots.iter().filter(|bot| *bot != author).collect(),
    };
    let primary = (*candidates.choose(rng)?).clone();

    let (low, high) = ordered_millis(settings.secondary_delay_min, settings.secondary_delay_max);
    let secondaries = candidates
        .iter()
        .filter(|bot| ***bot != primary)
        .filter_map(|bot| {
            if rng.random::<f64>() >= settings.secondary_probability {
                return None;
            }
            let delay = Duration::from_millis(rng.random_range(low..=high));
            Some(((*bot).clone(), delay))
        })
        .collect();

    Some(DispatchPlan {
        primary: (primary, settings.primary_delay),
        secondaries,
    })
}

fn ordered_millis(a: Duration, b: Duration) -> (u64, u64) {
    let a = u64::try_from(a.as_millis()).unwrap_or(u64::MAX);
    let b = u64::try_from(b.as_millis()).unwrap_or(u64::MAX);
    if a <= b { (a, b) } else { (b, a) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn bots() -> Vec<BotId> {
        ["Pi", "Moti", "Sol", "Math"].map(BotId::from).to_vec()
    }

    #[test]
    fn user_message_draws_from_all_bots() {
        let bots = bots();
        let settings = SchedulerSettings::default();
        for seed in 0..32 {
            let mut rng = StdRng::seed_from_u64(seed);
            let plan = plan_dispatch(&bots, &Sender::User, &settings, &mut rng).unwrap();
            assert!(bots.contains(&plan.primary.0));
            assert_eq!(plan.primary.1, settings.primary_delay);
            assert!(plan.secondaries.len() <= 3);
        }
    }

    #[test]
    fn bot_sender_never_responds_to_itself() {
        let bots = bots();
        let settings = SchedulerSettings::default();
        let sender = Sender::Bot("Sol".into());
        for seed in 0..64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let plan = plan_dispatch(&bots, &sender, &settings, &mut rng).unwrap();
            assert!(plan.responders().all(|(bot, _)| bot.as_str() != "Sol"));
        }
    }

    #[test]
    fn secondaries_are_distinct_and_within_window() {
        let bots = bots();
        let settings = SchedulerSettings {
            secondary_probability: 1.0,
            ..SchedulerSettings::default()
        };
        let mut rng = StdRng::seed_from_u64(42);
        let plan = plan_dispatch(&bots, &Sender::User, &settings, &mut rng).unwrap();

        assert_eq!(plan.responders().count(), 4);
        for (bot, delay) in &plan.secondaries {
            assert_ne!(bot, &plan.primary.0);
            assert!(*delay >= settings.secondary_delay_min);
            assert!(*delay <= settings.secondary_delay_max);
        }
    }

    #[test]
    fn zero_probability_means_primary_only() {
        let settings = SchedulerSettings {
            secondary_probability: 0.0,
            ..SchedulerSettings::default()
        };
        let mut rng = StdRng::seed_from_u64(1);
        let plan = plan_dispatch(&bots(), &Sender::User, &settings, &mut rng).unwrap();
        assert!(plan.secondaries.is_empty());
    }

    #[test]
    fn no_candidates_is_a_no_op() {
        let bots = vec![BotId::from("Pi")];
        let mut rng = StdRng::seed_from_u64(1);
        let plan = plan_dispatch(
            &bots,
            &Sender::Bot("Pi".into()),
            &SchedulerSettings::default(),
            &mut rng,
        );
        assert!(plan.is_none());
        let none: [BotId; 0] = [];
        assert!(plan_dispatch(&none, &Sender::User, &SchedulerSettings::default(), &mut rng).is_none());
    }
}
