//! Closed protocol and state enumerations plus the decoded connection record

use crate::error::ConnstatError;
use crate::{
    TCP_BOUND_INACTIVE, TCP_CLOSE, TCP_CLOSE_WAIT, TCP_CLOSING, TCP_ESTABLISHED, TCP_FIN_WAIT1,
    TCP_FIN_WAIT2, TCP_LAST_ACK, TCP_LISTEN, TCP_NEW_SYN_RECV, TCP_SYN_RECV, TCP_SYN_SENT,
    TCP_TIME_WAIT,
};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// PROTOCOL
// ============================================================================

/// Transport protocol and address family of a socket
///
/// One variant per kernel table: /proc/net/tcp, tcp6, udp, udp6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Protocol {
    Tcp4,
    Tcp6,
    Udp4,
    Udp6,
}

impl Protocol {
    pub const ALL: [Protocol; 4] = [Protocol::Tcp4, Protocol::Tcp6, Protocol::Udp4, Protocol::Udp6];

    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Protocol::Tcp4 => "tcp4",
            Protocol::Tcp6 => "tcp6",
            Protocol::Udp4 => "udp4",
            Protocol::Udp6 => "udp6",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ConnstatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp4" => Ok(Protocol::Tcp4),
            "tcp6" => Ok(Protocol::Tcp6),
            "udp4" => Ok(Protocol::Udp4),
            "udp6" => Ok(Protocol::Udp6),
            other => Err(ConnstatError::UnsupportedProtocol(other.to_string())),
        }
    }
}

impl Serialize for Protocol {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// ============================================================================
// CONNECTION STATE
// ============================================================================

/// Connection state as reported by the kernel or by netstat
///
/// === WHY A CLOSED ENUM ===
/// Every count matrix row must hold exactly these 12 entries. Matching on
/// the enum makes the compiler check that every state is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConnectionState {
    Established,
    SynSent,
    SynRecv,
    FinWait1,
    FinWait2,
    TimeWait,
    Close,
    CloseWait,
    LastAck,
    Listen,
    Closing,
    Unknown,
}

impl ConnectionState {
    /// Number of distinct states
    pub const COUNT: usize = 12;

    /// All states, in report order
    pub const ALL: [ConnectionState; Self::COUNT] = [
        ConnectionState::Established,
        ConnectionState::SynSent,
        ConnectionState::SynRecv,
        ConnectionState::FinWait1,
        ConnectionState::FinWait2,
        ConnectionState::TimeWait,
        ConnectionState::Close,
        ConnectionState::CloseWait,
        ConnectionState::LastAck,
        ConnectionState::Listen,
        ConnectionState::Closing,
        ConnectionState::Unknown,
    ];

    /// Translate a kernel state code (the "st" column) into a state
    ///
    /// === MATCH EXPRESSION ===
    /// Codes 12 and 13 exist in the kernel table but describe
    /// kernel-internal sockets, so they land on `Unknown` together with
    /// 0 and everything above 13.
    #[inline]
    #[must_use]
    pub const fn from_code(code: u8) -> Self {
        match code {
            TCP_ESTABLISHED => ConnectionState::Established,
            TCP_SYN_SENT => ConnectionState::SynSent,
            TCP_SYN_RECV => ConnectionState::SynRecv,
            TCP_FIN_WAIT1 => ConnectionState::FinWait1,
            TCP_FIN_WAIT2 => ConnectionState::FinWait2,
            TCP_TIME_WAIT => ConnectionState::TimeWait,
            TCP_CLOSE => ConnectionState::Close,
            TCP_CLOSE_WAIT => ConnectionState::CloseWait,
            TCP_LAST_ACK => ConnectionState::LastAck,
            TCP_LISTEN => ConnectionState::Listen,
            TCP_CLOSING => ConnectionState::Closing,
            TCP_NEW_SYN_RECV | TCP_BOUND_INACTIVE => ConnectionState::Unknown,
            _ => ConnectionState::Unknown,
        }
    }

    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Established => "ESTABLISHED",
            ConnectionState::SynSent => "SYN_SENT",
            ConnectionState::SynRecv => "SYN_RECV",
            ConnectionState::FinWait1 => "FIN_WAIT1",
            ConnectionState::FinWait2 => "FIN_WAIT2",
            ConnectionState::TimeWait => "TIME_WAIT",
            ConnectionState::Close => "CLOSE",
            ConnectionState::CloseWait => "CLOSE_WAIT",
            ConnectionState::LastAck => "LAST_ACK",
            ConnectionState::Listen => "LISTEN",
            ConnectionState::Closing => "CLOSING",
            ConnectionState::Unknown => "UNKNOWN",
        }
    }

    /// Position of this state in [`ConnectionState::ALL`]
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionState {
    type Err = ConnstatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConnectionState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| ConnstatError::UnsupportedState(s.to_string()))
    }
}

impl Serialize for ConnectionState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// ============================================================================
// CONNECTION RECORD
// ============================================================================

/// One decoded socket from a /proc/net table
///
/// === OWNERSHIP NOTES ===
/// Addresses are owned Strings so a record outlives the line it was
/// decoded from. IPv4 addresses are dotted quads, IPv6 addresses are eight
/// uncompressed lower-case groups ("0000:0000:...:0001").
///
/// The bookkeeping fields after `state` are not needed for counting but
/// are kept so the record mirrors the full kernel line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionRecord {
    pub protocol: Protocol,
    pub local_address: String,
    pub local_port: u16,
    pub remote_address: String,
    pub remote_port: u16,
    pub state: ConnectionState,
    pub slot: u32,          // "sl" column
    pub tx_queue: u32,      // Bytes waiting to be sent
    pub rx_queue: u32,      // Bytes waiting to be received
    pub timer_active: u32,  // "tr" column: which kernel timer is pending
    pub timer_jiffies: u32, // "tm->when" column
    pub retransmits: u32,   // "retrnsmt" column
    pub uid: u32,
    pub timeout: u32,
    pub inode: u64,
}

impl ConnectionRecord {
    /// "address:port" of the local end
    #[must_use]
    pub fn local_endpoint(&self) -> String {
        format!("{}:{}", self.local_address, self.local_port)
    }

    /// "address:port" of the remote end
    #[must_use]
    pub fn remote_endpoint(&self) -> String {
        format!("{}:{}", self.remote_address, self.remote_port)
    }
}
