pub mod app_config;
pub mod database;
#[cfg(feature = "kafka")]
pub mod events;
pub mod memory;
pub mod notifiers;
pub mod waitlist_repo;

pub use database::DbClient;
#[cfg(feature = "kafka")]
pub use events::KafkaNotifier;
pub use memory::InMemoryWaitlistRepository;
pub use notifiers::{BroadcastNotifier, FanoutNotifier, LogNotifier};
pub use waitlist_repo::PgWaitlistRepository;
