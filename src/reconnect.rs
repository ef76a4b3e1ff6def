//! Close-code classification and reconnect backoff.
//!
//! Classification is a pure function of the numeric close code: the same
//! code always yields the same [`CloseAction`]. Codes outside a policy's
//! table are treated as fatal; silently retrying an unknown condition risks
//! hammering a peer that is telling us to go away.

use std::time::Duration;

/// What the session does after a classified close.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CloseAction {
    /// Reconnect after the standard backoff interval.
    Retry,
    /// Reconnect after the longer rate-limit backoff interval.
    RateLimited,
    /// Stop permanently; a fresh `start()` is required to resume.
    Fatal,
}

impl CloseAction {
    /// Whether this classification permits a reconnect attempt.
    #[must_use]
    pub fn is_retryable(self) -> bool { !matches!(self, CloseAction::Fatal) }
}

/// Classifies numeric close codes for one protocol instance.
pub trait ClosePolicy: Send + Sync + 'static {
    /// Classify `code`. Must be pure: equal codes yield equal actions.
    fn classify(&self, code: u16) -> CloseAction;
}

/// Close table of the local-socket protocol instance.
///
/// Transport-level closes (normal, going away, abnormal) are transient and
/// retried. The 4xxx codes all describe a misconfigured client (wrong id,
/// origin, version, or encoding), except the rate-limit code, which retries
/// on the longer interval.
#[derive(Clone, Copy, Debug, Default)]
pub struct RpcClosePolicy;

impl RpcClosePolicy {
    /// Clean close at the peer's initiative.
    pub const CLOSE_NORMAL: u16 = 1000;
    /// Peer is shutting down.
    pub const CLOSE_GOING_AWAY: u16 = 1001;
    /// Connection dropped without a close handshake.
    pub const CLOSE_ABNORMAL: u16 = 1006;
    /// The client id was not recognised.
    pub const INVALID_CLIENT_ID: u16 = 4000;
    /// The connecting origin is not allowed for this client id.
    pub const INVALID_ORIGIN: u16 = 4001;
    /// Too many connection attempts; retry on the long interval.
    pub const RATE_LIMITED: u16 = 4002;
    /// The token backing this session was revoked.
    pub const TOKEN_REVOKED: u16 = 4003;
    /// The peer does not speak the requested protocol version.
    pub const INVALID_VERSION: u16 = 4004;
    /// The peer rejected the payload encoding.
    pub const INVALID_ENCODING: u16 = 4005;
}

impl ClosePolicy for RpcClosePolicy {
    fn classify(&self, code: u16) -> CloseAction {
        match code {
            Self::CLOSE_NORMAL | Self::CLOSE_GOING_AWAY | Self::CLOSE_ABNORMAL => {
                CloseAction::Retry
            }
            Self::RATE_LIMITED => CloseAction::RateLimited,
            _ => CloseAction::Fatal,
        }
    }
}

/// Close table of the gateway protocol instance.
///
/// Most gateway closes describe transient session problems and retry; the
/// fatal codes are those where retrying can never succeed (bad credentials,
/// bad intents, unsupported version, invalid shard).
#[derive(Clone, Copy, Debug, Default)]
pub struct GatewayClosePolicy;

impl GatewayClosePolicy {
    /// Unknown error; safe to retry.
    pub const UNKNOWN_ERROR: u16 = 4000;
    /// Invalid gateway opcode sent by us.
    pub const UNKNOWN_OPCODE: u16 = 4001;
    /// Payload failed to decode on the peer.
    pub const DECODE_ERROR: u16 = 4002;
    /// Payload sent before identifying.
    pub const NOT_AUTHENTICATED: u16 = 4003;
    /// The account token is wrong.
    pub const AUTHENTICATION_FAILED: u16 = 4004;
    /// Identify sent twice on one session.
    pub const ALREADY_AUTHENTICATED: u16 = 4005;
    /// Resume sequence was invalid.
    pub const INVALID_SEQ: u16 = 4007;
    /// Payloads sent too quickly; retry on the long interval.
    pub const RATE_LIMITED: u16 = 4008;
    /// Session timed out on the peer.
    pub const SESSION_TIMEOUT: u16 = 4009;
    /// An invalid shard was sent when identifying.
    pub const INVALID_SHARD: u16 = 4010;
    /// The session would handle too many guilds; topology must change
    /// before reconnecting (the `before_reconnect` hook's use case).
    pub const SHARDING_REQUIRED: u16 = 4011;
    /// Unsupported gateway version.
    pub const INVALID_API_VERSION: u16 = 4012;
    /// Invalid intent bits.
    pub const INVALID_INTENTS: u16 = 4013;
    /// Intents the account is not approved for.
    pub const DISALLOWED_INTENTS: u16 = 4014;
}

impl ClosePolicy for GatewayClosePolicy {
    fn classify(&self, code: u16) -> CloseAction {
        match code {
            Self::UNKNOWN_ERROR
            | Self::UNKNOWN_OPCODE
            | Self::DECODE_ERROR
            | Self::NOT_AUTHENTICATED
            | Self::ALREADY_AUTHENTICATED
            | Self::INVALID_SEQ
            | Self::SESSION_TIMEOUT
            | Self::SHARDING_REQUIRED => CloseAction::Retry,
            Self::RATE_LIMITED => CloseAction::RateLimited,
            _ => CloseAction::Fatal,
        }
    }
}

/// Fixed reconnect intervals.
///
/// The rate-limited interval must be the longer of the two.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Interval before reconnecting after an ordinary retryable close or a
    /// failed connection attempt.
    pub standard: Duration,
    /// Interval before reconnecting after a rate-limited close.
    pub rate_limited: Duration,
}

impl BackoffPolicy {
    /// Build a policy from explicit intervals.
    #[must_use]
    pub const fn new(standard: Duration, rate_limited: Duration) -> Self {
        Self {
            standard,
            rate_limited,
        }
    }

    /// Interval to sleep before reconnecting after `action`.
    #[must_use]
    pub fn delay_for(&self, action: CloseAction) -> Duration {
        match action {
            CloseAction::RateLimited => self.rate_limited,
            CloseAction::Retry | CloseAction::Fatal => self.standard,
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            standard: Duration::from_secs(5),
            rate_limited: Duration::from_secs(60),
        }
    }
}
