//! Vetting verdicts
//!
//! A verdict is produced once per vetting pass and handed to the enforcer,
//! which uses the already-rendered message as the kick reason.

use crate::config::KickMessages;
use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Why a player was denied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum ReasonCode {
    #[display("Banned Device")]
    BannedDevice,
    #[display("Low Gamerscore")]
    LowGameScore,
    #[display("Low Reputation")]
    LowReputation,
    #[display("Private History")]
    PrivateHistory,
    #[display("Device Spoofing")]
    DeviceSpoofing,
    #[display("Internal Error")]
    InternalError,
}

/// Values that triggered a denial, used for message templating and logs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenialContext {
    /// Device the player reported on connect
    pub device: Option<String>,
    pub score: Option<i64>,
    pub reputation: Option<String>,
    /// Banned platform found in the player's recent title history
    pub detected_platform: Option<String>,
}

/// A denial with its rendered kick message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    pub reason: ReasonCode,
    pub context: DenialContext,
    /// Message shown to the player
    pub message: String,
}

impl Denial {
    /// Build a denial, rendering the template configured for `reason`
    #[must_use]
    pub fn new(reason: ReasonCode, context: DenialContext, messages: &KickMessages) -> Self {
        let template = match reason {
            ReasonCode::BannedDevice => &messages.banned_device,
            ReasonCode::LowGameScore => &messages.low_game_score,
            ReasonCode::LowReputation => &messages.low_reputation,
            ReasonCode::PrivateHistory => &messages.private_history,
            ReasonCode::DeviceSpoofing => &messages.device_spoofing,
            ReasonCode::InternalError => &messages.internal_error,
        };
        let message = render(template, &context);
        Self {
            reason,
            context,
            message,
        }
    }
}

/// Substitute `{device}`, `{score}` and `{reputation}` in a template
fn render(template: &str, context: &DenialContext) -> String {
    let mut message = template.to_string();
    if let Some(device) = &context.device {
        message = message.replace("{device}", device);
    }
    if let Some(score) = context.score {
        message = message.replace("{score}", &score.to_string());
    }
    if let Some(reputation) = &context.reputation {
        message = message.replace("{reputation}", reputation);
    }
    message
}

/// Outcome of a vetting pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Admit,
    Deny(Denial),
}

impl Verdict {
    #[must_use]
    pub fn is_admit(&self) -> bool {
        matches!(self, Self::Admit)
    }

    /// The denial reason, if any
    #[must_use]
    pub fn reason(&self) -> Option<ReasonCode> {
        match self {
            Self::Admit => None,
            Self::Deny(denial) => Some(denial.reason),
        }
    }

    #[must_use]
    pub fn denial(&self) -> Option<&Denial> {
        match self {
            Self::Admit => None,
            Self::Deny(denial) => Some(denial),
        }
    }
}
