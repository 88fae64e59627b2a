// ============================================================================
// CONNECTION STATISTICS LIBRARY
// ============================================================================
// This library takes a snapshot of the kernel's connection tables and counts
// connections by transport protocol and connection state.
//
// === KEY FEATURES ===
// 1. Decode the packed hex tables in /proc/net/{tcp,tcp6,udp,udp6}
// 2. Decode the whitespace-aligned output of 'netstat'
// 3. Count records into a dense protocol x state matrix with tcp/udp/all roll-ups
// 4. Check that a serialized report has the expected shape
//
// === DATA FLOW ===
//   raw source -> decoder (proc_table or netstat) -> records
//              -> count_connections() -> CountMatrix -> JSON
//
// Everything here is a single-shot transform: no shared state, no caching.
// Each call builds its output from its arguments alone.

// === MODULE DECLARATIONS ===
pub mod aggregate;
pub mod error;
pub mod model;
pub mod netstat;
pub mod proc_table;
pub mod validate;

pub use aggregate::{CountMatrix, Countable, MatrixKey, count_connections};
pub use error::{ConnstatError, Result};
pub use model::{ConnectionRecord, ConnectionState, Protocol};
pub use netstat::{NetstatRow, parse_netstat_output, run_netstat};
pub use proc_table::{ProcTables, decode_proc_tables, read_proc_tables};
pub use validate::{ShapeError, validate_json, validate_report};

// ============================================================================
// CONFIGURATION CONSTANTS
// ============================================================================
// Compile-time defaults for the input collaborators. The binary lets the
// user override the proc root and the netstat program on the command line.

/// Default location of the proc filesystem
pub const DEFAULT_PROC_ROOT: &str = "/proc";

/// Default connection-listing program for the tabular path
pub const NETSTAT_PROGRAM: &str = "netstat";

/// Numeric addresses, wide columns, IPv4 and IPv6 families
pub const NETSTAT_ARGS: [&str; 4] = ["-n", "-W", "-A", "inet,inet6"];

/// Locale forced on the child so the header row is in English
pub const NETSTAT_LOCALE: &str = "C";

// ============================================================================
// TCP STATE CONSTANTS
// ============================================================================
// These match the values used by the Linux kernel in /proc/net/tcp
// (include/net/tcp_states.h). UDP sockets reuse the same numbering:
// a connected UDP socket reports ESTABLISHED, an unconnected one CLOSE.
pub const TCP_ESTABLISHED: u8 = 0x01; // Active connection, data flowing
pub const TCP_SYN_SENT: u8 = 0x02; // Client sent connection request
pub const TCP_SYN_RECV: u8 = 0x03; // Server received connection request
pub const TCP_FIN_WAIT1: u8 = 0x04; // Closing connection (stage 1)
pub const TCP_FIN_WAIT2: u8 = 0x05; // Closing connection (stage 2)
pub const TCP_TIME_WAIT: u8 = 0x06; // Waiting for network to clear old packets
pub const TCP_CLOSE: u8 = 0x07; // Connection closed
pub const TCP_CLOSE_WAIT: u8 = 0x08; // Remote side closed, waiting for local close
pub const TCP_LAST_ACK: u8 = 0x09; // Waiting for final acknowledgment
pub const TCP_LISTEN: u8 = 0x0A; // Listening for incoming connections
pub const TCP_CLOSING: u8 = 0x0B; // Both sides closing simultaneously
pub const TCP_NEW_SYN_RECV: u8 = 0x0C; // Kernel-internal request socket
pub const TCP_BOUND_INACTIVE: u8 = 0x0D; // Bound but never listened or connected

#[cfg(test)]
mod tests;
