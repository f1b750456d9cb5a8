//! Gateway close codes and how a shard recovers from each

/// Close codes the gateway sends when it drops a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum CloseCode {
    /// Something went wrong on the gateway; reconnect
    UnknownError = 4000,
    /// Client sent an opcode the gateway does not know
    UnknownOpcode = 4001,
    /// Client sent a payload the gateway could not decode
    DecodeError = 4002,
    /// Client sent a payload before identifying
    NotAuthenticated = 4003,
    /// Token in Identify was rejected
    AuthenticationFailed = 4004,
    /// Client identified more than once
    AlreadyAuthenticated = 4005,
    /// Sequence sent with Resume was invalid
    InvalidSequence = 4007,
    /// Client sent payloads too quickly
    RateLimited = 4008,
    /// Session expired; a new one is needed
    SessionTimedOut = 4009,
    /// Shard in Identify was invalid
    InvalidShard = 4010,
    /// Session would handle too many guilds; more shards are needed
    ShardingRequired = 4011,
    /// Gateway version in the URL is invalid
    InvalidApiVersion = 4012,
    /// Intents bitfield was malformed
    InvalidIntents = 4013,
    /// Intents include privileged ones the application may not use
    DisallowedIntents = 4014,
}

/// What a shard does after a close
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Reconnect, resuming if a session is held
    Reconnect,
    /// Drop the session, then reconnect with a fresh Identify
    NewSession,
    /// Stop and shut the client down
    Fatal,
}

impl CloseCode {
    /// Parse a raw close code; codes outside the gateway range give `None`
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            4000 => Some(Self::UnknownError),
            4001 => Some(Self::UnknownOpcode),
            4002 => Some(Self::DecodeError),
            4003 => Some(Self::NotAuthenticated),
            4004 => Some(Self::AuthenticationFailed),
            4005 => Some(Self::AlreadyAuthenticated),
            4007 => Some(Self::InvalidSequence),
            4008 => Some(Self::RateLimited),
            4009 => Some(Self::SessionTimedOut),
            4010 => Some(Self::InvalidShard),
            4011 => Some(Self::ShardingRequired),
            4012 => Some(Self::InvalidApiVersion),
            4013 => Some(Self::InvalidIntents),
            4014 => Some(Self::DisallowedIntents),
            _ => None,
        }
    }

    /// Numeric code as sent in the close frame
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// How a shard recovers from this close
    #[must_use]
    pub const fn recovery(self) -> Recovery {
        match self {
            Self::AuthenticationFailed
            | Self::DisallowedIntents
            | Self::InvalidIntents
            | Self::ShardingRequired
            | Self::InvalidShard
            | Self::InvalidApiVersion => Recovery::Fatal,
            Self::InvalidSequence | Self::SessionTimedOut => Recovery::NewSession,
            _ => Recovery::Reconnect,
        }
    }

    /// Human-readable reason
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::UnknownError => "Unknown error",
            Self::UnknownOpcode => "Unknown opcode sent",
            Self::DecodeError => "Invalid payload sent",
            Self::NotAuthenticated => "Payload sent before identifying",
            Self::AuthenticationFailed => "Authentication failed",
            Self::AlreadyAuthenticated => "Identified twice",
            Self::InvalidSequence => "Invalid resume sequence",
            Self::RateLimited => "Sending too fast",
            Self::SessionTimedOut => "Session timed out",
            Self::InvalidShard => "Invalid shard",
            Self::ShardingRequired => "Sharding required",
            Self::InvalidApiVersion => "Invalid API version",
            Self::InvalidIntents => "Invalid intents",
            Self::DisallowedIntents => "Disallowed intents",
        }
    }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.description(), self.as_u16())
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        code.as_u16()
    }
}
