//! Response classification for the 2captcha API.
//!
//! Every response is an envelope `{"status": 0|1, "request": "..."}`. A
//! status of 1 carries the payload (task id or solution). A status of 0
//! carries an error code, mapped here to the action the pool takes.

use super::{FatalKind, PollOutcome, RateLimitTier, SubmitOutcome};
use crate::task::TaskId;

const NOT_READY: &str = "CAPCHA_NOT_READY";
const NO_SLOT: &str = "ERROR_NO_SLOT_AVAILABLE";

/// Classified service response, before it is narrowed to a stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// Status 1 with its payload.
    Ready(String),
    NotReady,
    NoSlot,
    RateLimited(RateLimitTier),
    Fatal(FatalKind),
    Unclassified(String),
}

/// Map a status-0 error code to its class.
pub fn classify_code(code: &str) -> Classification {
    let code = code.trim();

    if let Some(number) = code.strip_prefix("ERROR: ") {
        return match number.trim().parse::<u32>() {
            Ok(1003) => Classification::RateLimited(RateLimitTier::Short),
            Ok(1002) | Ok(1005) => Classification::RateLimited(RateLimitTier::Medium),
            Ok(1001) | Ok(1004) => Classification::RateLimited(RateLimitTier::Long),
            // Includes "ERROR: 1": a status-0 body carries no id or token to hand on.
            _ => Classification::Unclassified(code.to_string()),
        };
    }

    match code {
        NOT_READY => Classification::NotReady,
        NO_SLOT => Classification::NoSlot,
        "MAX_USER_TURN" => Classification::RateLimited(RateLimitTier::Brief),

        "ERROR_WRONG_USER_KEY" | "ERROR_KEY_DOES_NOT_EXIST" => {
            Classification::Fatal(FatalKind::AuthInvalid)
        }
        "ERROR_BAD_TOKEN_OR_PAGEURL"
        | "ERROR_BAD_PARAMETERS"
        | "ERROR_BAD_PROXY"
        | "ERROR_ZERO_CAPTCHA_FILESIZE"
        | "ERROR_TOO_BIG_CAPTCHA_FILESIZE"
        | "ERROR_WRONG_FILE_EXTENSION"
        | "ERROR_IMAGE_TYPE_NOT_SUPPORTED"
        | "ERROR_UPLOAD"
        | "ERROR_CAPTCHAIMAGE_BLOCKED" => Classification::Fatal(FatalKind::BadParameters),
        "ERROR_GOOGLEKEY" => Classification::Fatal(FatalKind::InvalidSiteKey),
        "ERROR_CAPTCHA_UNSOLVABLE" => Classification::Fatal(FatalKind::Unsolvable),
        "ERROR_WRONG_ID_FORMAT" => Classification::Fatal(FatalKind::MalformedId),
        "ERROR_WRONG_CAPTCHA_ID" => Classification::Fatal(FatalKind::UnknownId),
        "ERROR_BAD_DUPLICATES" => Classification::Fatal(FatalKind::InsufficientMatches),
        "ERROR_EMPTY_ACTION" => Classification::Fatal(FatalKind::EmptyAction),
        "ERROR_ZERO_BALANCE" => Classification::Fatal(FatalKind::ZeroBalance),
        "IP_BANNED" | "ERROR_IP_NOT_ALLOWED" => Classification::Fatal(FatalKind::IpBanned),

        other => Classification::Unclassified(other.to_string()),
    }
}

/// Classify a decoded response envelope.
pub fn classify_envelope(status: i64, request: String) -> Classification {
    if status == 1 {
        Classification::Ready(request)
    } else {
        classify_code(&request)
    }
}

impl Classification {
    /// Narrow to a submit response. A not-ready answer has no meaning here.
    pub fn into_submit(self) -> SubmitOutcome {
        match self {
            Classification::Ready(id) => SubmitOutcome::Accepted(TaskId::new(id)),
            Classification::NotReady => SubmitOutcome::Unclassified(NOT_READY.to_string()),
            Classification::NoSlot => SubmitOutcome::NoSlot,
            Classification::RateLimited(tier) => SubmitOutcome::RateLimited(tier),
            Classification::Fatal(kind) => SubmitOutcome::Fatal(kind),
            Classification::Unclassified(code) => SubmitOutcome::Unclassified(code),
        }
    }

    /// Narrow to a poll response. A no-slot answer has no meaning here.
    pub fn into_poll(self) -> PollOutcome {
        match self {
            Classification::Ready(value) => PollOutcome::Ready(value),
            Classification::NotReady => PollOutcome::NotReady,
            Classification::NoSlot => PollOutcome::Unclassified(NO_SLOT.to_string()),
            Classification::RateLimited(tier) => PollOutcome::RateLimited(tier),
            Classification::Fatal(kind) => PollOutcome::Fatal(kind),
            Classification::Unclassified(code) => PollOutcome::Unclassified(code),
        }
    }
}
