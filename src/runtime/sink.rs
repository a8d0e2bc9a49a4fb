use crate::ledger::RewardGrant;
use crate::scheduler::{WallId, WallMessage};

/// Where committed posts and reward grants are rendered.
pub trait WallSink: Send + Sync {
    fn on_post(&self, wall: &WallId, message: &WallMessage);

    fn on_reward(&self, _grant: &RewardGrant) {}
}

/// Prints every wall to stdout.
pub struct ConsoleSink;

impl ConsoleSink {
    pub fn new() -> Self {
        Self
    }
}

impl WallSink for ConsoleSink {
    fn on_post(&self, wall: &WallId, message: &WallMessage) {
        println!("{}", format_post(wall, message));
    }

    fn on_reward(&self, grant: &RewardGrant) {
        println!("{}", format_reward(grant));
    }
}

pub fn format_post(wall: &WallId, message: &WallMessage) -> String {
    format!(
        "[{wall}] {:>7.1}s {:<8} {}: {}",
        message.at.as_secs_f64(),
        format!("({})", message.tag),
        message.sender,
        message.text
    )
}

pub fn format_reward(grant: &RewardGrant) -> String {
    let mut line = format!(
        "🏆 {} earned {:.4} on {} (score {})",
        grant.bot, grant.amount, grant.wall, grant.score
    );
    if grant.scores_reset {
        line.push_str(", scores reset");
    }
    line
}
