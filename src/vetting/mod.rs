//! Player vetting
//!
//! Decides whether a joining player may stay, from the whitelist and the
//! signals the identity provider reports for them.

mod engine;
mod signals;
mod verdict;
mod vetter;

pub use engine::{RESERVED_DENY_XUID, TITLE_PLATFORM_PREFIX, VettingEngine};
#[cfg(test)]
pub use signals::MockSignalFetcher;
pub use signals::{IdentitySignals, PlayerIdentity, SignalFetcher, TitleRecord};
pub use verdict::{Denial, DenialContext, ReasonCode, Verdict};
pub use vetter::Vetter;
