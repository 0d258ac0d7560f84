//! In-process command and event buses.

mod command;
mod event;

pub use command::{Command, CommandBus, CommandHandler};
pub use event::{EventBus, EventSubscriber};
