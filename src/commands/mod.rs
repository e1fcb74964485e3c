pub mod channel;
pub mod facts;

use crate::{Data, Error};

/// Every slash command the bot registers.
pub fn all() -> Vec<poise::Command<Data, Error>> {
    vec![channel::register(), channel::unregister(), facts::facts()]
}
