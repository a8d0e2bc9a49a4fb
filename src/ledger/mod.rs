//! Consecutive-responder streaks and per-bot score/reward bookkeeping.

use crate::drip::DripAccumulator;
use crate::scheduler::types::{BotId, Sender, WallId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// How the bonus for a completed streak is valued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RewardPolicy {
    /// Constant bonus per streak.
    Fixed { amount: f64 },
    /// A fraction of the current drip value, optionally debited from it.
    DripShare {
        #[serde(default = "default_drip_fraction")]
        fraction: f64,
        #[serde(default = "default_true")]
        debit_drip: bool,
    },
}

fn default_drip_fraction() -> f64 {
    0.05
}

fn default_true() -> bool {
    true
}

impl Default for RewardPolicy {
    fn default() -> Self {
        Self::DripShare {
            fraction: default_drip_fraction(),
            debit_drip: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerSettings {
    pub streak_threshold: u32,
    pub policy: RewardPolicy,
    /// When any bot's score reaches this, every score resets to zero.
    pub score_reset_at: Option<u64>,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            streak_threshold: 2,
            policy: RewardPolicy::default(),
            score_reset_at: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BotAccount {
    pub score: u64,
    pub reward: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Streak {
    pub last: BotId,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RewardGrant {
    pub wall: WallId,
    pub bot: BotId,
    pub amount: f64,
    /// Score after this grant, before any global reset.
    pub score: u64,
    /// Whether this grant triggered a reset of all scores.
    pub scores_reset: bool,
}

#[derive(Debug, Clone)]
pub struct ScoreLedger {
    settings: LedgerSettings,
    streaks: HashMap<WallId, Streak>,
    accounts: BTreeMap<BotId, BotAccount>,
}

impl ScoreLedger {
    pub fn new<'a>(settings: LedgerSettings, bots: impl IntoIterator<Item = &'a BotId>) -> Self {
        Self {
            settings,
            streaks: HashMap::new(),
            accounts: bots
                .into_iter()
                .map(|bot| (bot.clone(), BotAccount::default()))
                .collect(),
        }
    }

    pub fn settings(&self) -> &LedgerSettings {
        &self.settings
    }

    pub fn streak(&self, wall: &WallId) -> Option<&Streak> {
        self.streaks.get(wall)
    }

    pub fn account(&self, bot: &BotId) -> Option<&BotAccount> {
        self.accounts.get(bot)
    }

    pub fn accounts(&self) -> impl Iterator<Item = (&BotId, &BotAccount)> {
        self.accounts.iter()
    }

    /// Update the wall's streak for one committed post and grant a bonus when
    /// the streak reaches the threshold.
    pub fn record_post(
        &mut self,
        wall: &WallId,
        sender: &Sender,
        drip: &mut DripAccumulator,
    ) -> Option<RewardGrant> {
        let bot = match sender {
            Sender::User => {
                self.streaks.remove(wall);
                return None;
            }
            Sender::Bot(bot) => bot,
        };

        let streak = self
            .streaks
            .entry(wall.clone())
            .and_modify(|streak| {
                if &streak.last == bot {
                    streak.count += 1;
                } else {
                    streak.last = bot.clone();
                    streak.count = 1;
                }
            })
            .or_insert_with(|| Streak {
                last: bot.clone(),
                count: 1,
            });

        if streak.count < self.settings.streak_threshold {
            return None;
        }
        self.streaks.remove(wall);

        let amount = match self.settings.policy {
            RewardPolicy::Fixed { amount } => amount,
            RewardPolicy::DripShare {
                fraction,
                debit_drip,
            } => {
                let share = drip.value() * fraction;
                if debit_drip { drip.withdraw(share) } else { share }
            }
        };

        let account = self.accounts.entry(bot.clone()).or_default();
        account.score += 1;
        account.reward += amount;
        let score = account.score;

        let scores_reset = self
            .settings
            .score_reset_at
            .is_some_and(|limit| score >= limit);
        if scores_reset {
            self.reset_scores();
        }

        Some(RewardGrant {
            wall: wall.clone(),
            bot: bot.clone(),
            amount,
            score,
            scores_reset,
        })
    }

    /// Zero every score. Rewards are kept.
    pub fn reset_scores(&mut self) {
        for account in self.accounts.values_mut() {
            account.score = 0;
        }
    }

    /// Clear streaks, scores and rewards.
    pub fn reset(&mut self) {
        self.streaks.clear();
        for account in self.accounts.values_mut() {
            *account = BotAccount::default();
        }
    }
}
