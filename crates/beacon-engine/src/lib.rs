//! The reconciliation engine which keeps notification messages in line with
//! what the platforms report.

pub mod admin;
pub use self::admin::{Admin, AdminError, Proposals};

mod locks;
pub use self::locks::{LockGuard, LockMap};

mod push;
pub use self::push::PushScheduler;

mod reconciler;
pub use self::reconciler::{Outcome, Reconciler};

pub mod render;

mod sources;
pub use self::sources::Sources;

pub mod sweep;
pub use self::sweep::SweepReport;

pub mod transition;

#[cfg(test)]
mod testing;
