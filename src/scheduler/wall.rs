use super::SchedulerError;
use super::timer::TimerHandle;
use super::types::{BotId, PostTag, Sender, WallId, WallMessage};
use std::time::Duration;

/// A conversation panel owned by one bot.
#[derive(Debug)]
pub struct Wall {
    id: WallId,
    messages: Vec<WallMessage>,
    pub(crate) inactivity: Option<TimerHandle>,
}

impl Wall {
    fn new(id: WallId) -> Self {
        Self {
            id,
            messages: Vec::new(),
            inactivity: None,
        }
    }

    pub fn id(&self) -> &WallId {
        &self.id
    }

    pub fn messages(&self) -> &[WallMessage] {
        &self.messages
    }

    pub fn last_message(&self) -> Option<&WallMessage> {
        self.messages.last()
    }

    pub fn inactivity_timer(&self) -> Option<TimerHandle> {
        self.inactivity
    }
}

/// Fixed set of walls, one per bot, in creation order.
#[derive(Debug, Default)]
pub struct WallRegistry {
    bots: Vec<BotId>,
    walls: Vec<Wall>,
    next_seq: u64,
}

impl WallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bots<I>(bots: I) -> Result<Self, SchedulerError>
    where
        I: IntoIterator<Item = BotId>,
    {
        let mut registry = Self::new();
        for bot in bots {
            registry.create_wall(bot)?;
        }
        Ok(registry)
    }

    /// Register a bot and its wall. Walls are never removed.
    pub fn create_wall(&mut self, identity: BotId) -> Result<(), SchedulerError> {
        if self.bots.contains(&identity) {
            return Err(SchedulerError::DuplicateWall(identity.to_string()));
        }
        self.bots.push(identity.clone());
        self.walls.push(Wall::new(identity));
        Ok(())
    }

    pub fn bots(&self) -> &[BotId] {
        &self.bots
    }

    pub fn len(&self) -> usize {
        self.walls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.walls.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Wall> {
        self.walls.iter()
    }

    pub fn get(&self, id: &WallId) -> Result<&Wall, SchedulerError> {
        self.walls
            .iter()
            .find(|wall| &wall.id == id)
            .ok_or_else(|| SchedulerError::UnknownWall(id.to_string()))
    }

    pub(crate) fn get_mut(&mut self, id: &WallId) -> Result<&mut Wall, SchedulerError> {
        self.walls
            .iter_mut()
            .find(|wall| &wall.id == id)
            .ok_or_else(|| SchedulerError::UnknownWall(id.to_string()))
    }

    /// Resolve a wall name case-insensitively, as typed by a user.
    pub fn resolve(&self, name: &str) -> Option<&WallId> {
        let name = name.trim();
        self.bots
            .iter()
            .find(|bot| bot.as_str().eq_ignore_ascii_case(name))
    }

    pub(crate) fn append(
        &mut self,
        id: &WallId,
        sender: Sender,
        text: String,
        tag: PostTag,
        at: Duration,
    ) -> Result<&WallMessage, SchedulerError> {
        let seq = self.next_seq;
        let wall = self
            .walls
            .iter_mut()
            .find(|wall| &wall.id == id)
            .ok_or_else(|| SchedulerError::UnknownWall(id.to_string()))?;
        self.next_seq += 1;
        let index = wall.messages.len();
        wall.messages.push(WallMessage {
            seq,
            sender,
            text,
            tag,
            at,
        });
        Ok(&wall.messages[index])
    }

    /// Texts of the last `limit` messages on a wall, oldest first.
    pub fn context(&self, id: &WallId, limit: usize) -> Result<Vec<String>, SchedulerError> {
        let messages = self.get(id)?.messages();
        let start = messages.len().saturating_sub(limit);
        Ok(messages[start..]
            .iter()
            .map(|message| format!("{}: {}", message.sender, message.text))
            .collect())
    }
}
