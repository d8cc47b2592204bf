#[macro_use]
mod macros;

pub mod backoff;
pub mod display;
pub mod guild;
pub use self::guild::{Guild, GuildChannel, GuildDirectory, GuildRole};
pub mod models;
pub use self::models::{
    normalize_account, NewSubscription, Platform, PlatformKind, RuntimeState, Subscription,
};

pub mod notification;
pub use self::notification::{Embed, EmbedField, LinkButton, NotificationContent};

mod pt_duration;
pub use self::pt_duration::PtDuration;

pub mod sink;
pub use self::sink::{NotificationSink, SinkError};

pub mod store;
pub use self::store::{MemoryStore, SubscriptionStore};

/// A boxed future.
pub type BoxFuture<'a, T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;
