//! Packed-table decoder for /proc/net/{tcp,tcp6,udp,udp6}
//!
//! # /proc/net/tcp FORMAT
//!
//! One socket per line, all numbers in hex except uid, timeout and inode:
//!
//! ```text
//!   sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
//!    0: 0100007F:0277 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 21344 1 ...
//! ```
//!
//! The UDP tables use the same columns. IPv6 tables carry 32 hex digit
//! addresses instead of 8.
//!
//! # Byte Order
//!
//! Addresses are dumped as the raw in-kernel 32-bit words printed with
//! `%08X`, so on little-endian hosts each word reads byte-reversed:
//! 127.0.0.1 is stored as `0100007F`.

use crate::error::{ConnstatError, Result};
use crate::model::{ConnectionRecord, ConnectionState, Protocol};
use regex::Regex;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, trace};

/// Remote address of an IPv4 socket with no peer
const IPV4_ANY: &str = "0.0.0.0";

/// Remote address of an IPv6 socket with no peer, in decoder output form
const IPV6_ANY: &str = "0000:0000:0000:0000:0000:0000:0000:0000";

// ============================================================================
// LINE GRAMMAR
// ============================================================================
// Ports are always 4 hex digits; only the address width (8 or 32) varies
// with the address family.
static PROC_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^",
        r"([0-9]+):",                        // sl
        r"\s+",
        r"([0-9A-Fa-f]{32}|[0-9A-Fa-f]{8})", // local address
        r":",
        r"([0-9A-Fa-f]{4})",                 // local port
        r"\s+",
        r"([0-9A-Fa-f]{32}|[0-9A-Fa-f]{8})", // remote address
        r":",
        r"([0-9A-Fa-f]{4})",                 // remote port
        r"\s+",
        r"([0-9A-Fa-f]{2})",                 // st
        r"\s+",
        r"([0-9A-Fa-f]+)",                   // tx_queue
        r":",
        r"([0-9A-Fa-f]+)",                   // rx_queue
        r"\s+",
        r"([0-9A-Fa-f]+)",                   // tr
        r":",
        r"([0-9A-Fa-f]+)",                   // tm->when
        r"\s+",
        r"([0-9A-Fa-f]+)",                   // retrnsmt
        r"\s+",
        r"([0-9]+)",                         // uid
        r"\s+",
        r"([0-9]+)",                         // timeout
        r"\s+",
        r"([0-9]+)",                         // inode
        r"\s+",
        r"(.*)$",                            // ref count, socket pointer, ...
    ))
    .expect("proc line grammar is a valid regex")
});

// ============================================================================
// DATA STRUCTURES
// ============================================================================

/// Header-stripped lines of the four kernel tables
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcTables {
    pub tcp4: Vec<String>,
    pub tcp6: Vec<String>,
    pub udp4: Vec<String>,
    pub udp6: Vec<String>,
}

impl ProcTables {
    /// Tables paired with the protocol they describe, in output order
    #[must_use]
    pub fn by_protocol(&self) -> [(Protocol, &[String]); 4] {
        [
            (Protocol::Tcp4, self.tcp4.as_slice()),
            (Protocol::Tcp6, self.tcp6.as_slice()),
            (Protocol::Udp4, self.udp4.as_slice()),
            (Protocol::Udp6, self.udp6.as_slice()),
        ]
    }
}

/// Fields of one table line, still in their textual form
///
/// Borrows from the line, nothing is allocated until post-processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawProcEntry<'a> {
    pub slot: &'a str,
    pub local_address: &'a str,
    pub local_port: &'a str,
    pub remote_address: &'a str,
    pub remote_port: &'a str,
    pub state: &'a str,
    pub tx_queue: &'a str,
    pub rx_queue: &'a str,
    pub timer_active: &'a str,
    pub timer_jiffies: &'a str,
    pub retransmits: &'a str,
    pub uid: &'a str,
    pub timeout: &'a str,
    pub inode: &'a str,
}

// ============================================================================
// READING
// ============================================================================

/// Read the four connection tables below `proc_root`
///
/// Each file is split into trimmed, non-empty lines and its header line is
/// removed.
///
/// # Errors
///
/// - `SourceUnavailable` if `proc_root` does not exist
/// - `Io` if one of the table files cannot be read
pub fn read_proc_tables(proc_root: &Path) -> Result<ProcTables> {
    if !proc_root.exists() {
        return Err(ConnstatError::SourceUnavailable(proc_root.to_path_buf()));
    }

    let net = proc_root.join("net");
    Ok(ProcTables {
        tcp4: read_table_lines(&net.join("tcp"))?,
        tcp6: read_table_lines(&net.join("tcp6"))?,
        udp4: read_table_lines(&net.join("udp"))?,
        udp6: read_table_lines(&net.join("udp6"))?,
    })
}

fn read_table_lines(path: &Path) -> Result<Vec<String>> {
    let io_error = |source| ConnstatError::Io {
        path: PathBuf::from(path),
        source,
    };

    let file = File::open(path).map_err(io_error)?;
    let reader = BufReader::new(file);

    let mut lines = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(io_error)?;
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            lines.push(trimmed.to_string());
        }
    }

    // Skip header
    if !lines.is_empty() {
        lines.remove(0);
    }
    Ok(lines)
}

// ============================================================================
// DECODING
// ============================================================================

/// Match one trimmed table line against the fixed field grammar
///
/// # Errors
///
/// `MalformedLine` carrying the line when it does not match.
pub fn parse_proc_line(line: &str) -> Result<RawProcEntry<'_>> {
    let caps = PROC_LINE
        .captures(line)
        .ok_or_else(|| ConnstatError::MalformedLine(line.to_string()))?;

    // Every group is mandatory in the grammar, so a successful match has all 15
    let field = |i: usize| caps.get(i).map_or("", |m| m.as_str());

    Ok(RawProcEntry {
        slot: field(1),
        local_address: field(2),
        local_port: field(3),
        remote_address: field(4),
        remote_port: field(5),
        state: field(6),
        tx_queue: field(7),
        rx_queue: field(8),
        timer_active: field(9),
        timer_jiffies: field(10),
        retransmits: field(11),
        uid: field(12),
        timeout: field(13),
        inode: field(14),
    })
}

/// Convert a hex address field into its printable form
///
/// === WHAT THIS DOES ===
/// - 8 digits: one little-endian word, rendered as a dotted quad
///   ("0100007F" -> "127.0.0.1")
/// - 32 digits: four little-endian words, each byte-reversed on its own,
///   rendered as eight lower-case 4-digit groups joined by colons
///
/// The IPv6 form is never compressed ("::1" stays
/// "0000:0000:0000:0000:0000:0000:0000:0001"), so the remote-any check in
/// [`decode_proc_line`] can compare strings.
///
/// === RETURN TYPE ===
/// `Ok(String)` with the rendered address.
///
/// # Errors
///
/// `InvalidAddressFormat` for any other length or for non-hex input.
pub fn hex_to_address(text: &str) -> Result<String> {
    let invalid = || ConnstatError::InvalidAddressFormat(text.to_string());

    // === HEX DIGITS ONLY ===
    // from_str_radix accepts a leading '+', so check the digits up front
    if !text.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(invalid());
    }

    match text.len() {
        8 => {
            // u32 parse + to_le_bytes is the same as reading the
            // byte pairs at [6:8], [4:6], [2:4], [0:2]
            let word = u32::from_str_radix(text, 16).map_err(|_| invalid())?;
            Ok(Ipv4Addr::from(word.to_le_bytes()).to_string())
        }
        32 => {
            let mut groups = Vec::with_capacity(8);
            // All bytes are ASCII here, so byte offsets are char offsets
            for start in (0..32).step_by(8) {
                let word =
                    u32::from_str_radix(&text[start..start + 8], 16).map_err(|_| invalid())?;
                let swapped = word.swap_bytes();
                groups.push(format!("{:04x}", swapped >> 16));
                groups.push(format!("{:04x}", swapped & 0xFFFF));
            }
            Ok(groups.join(":"))
        }
        _ => Err(invalid()),
    }
}

/// Decode one table line into a record
///
/// === WHAT THIS DOES ===
/// 1. Match the line against the field grammar ([`parse_proc_line`])
/// 2. Decode the remote address first; sockets without a peer stop here
/// 3. Decode the local address, both ports and the state code
/// 4. Convert the bookkeeping fields (hex queues and timers, decimal uid,
///    timeout and inode)
///
/// === PARAMETERS ===
/// * `line` - one trimmed, non-header table line
/// * `protocol` - the table the line came from; the line itself does not
///   say
///
/// === RETURN TYPE ===
/// - `Ok(Some(record))` for a socket with a peer
/// - `Ok(None)` for sockets without a peer (remote address 0.0.0.0 or
///   all-zero IPv6), which netstat does not list either
///
/// # Errors
///
/// `MalformedLine` or `InvalidAddressFormat`; both mean the table format is
/// not the one this decoder understands.
pub fn decode_proc_line(line: &str, protocol: Protocol) -> Result<Option<ConnectionRecord>> {
    let raw = parse_proc_line(line)?;

    // === REMOTE-ANY FILTER ===
    let remote_address = hex_to_address(raw.remote_address)?;
    if remote_address == IPV4_ANY || remote_address == IPV6_ANY {
        return Ok(None);
    }

    // A field can match the grammar and still overflow its integer type,
    // which the kernel never prints
    let malformed = |_| ConnstatError::MalformedLine(line.to_string());
    let hex_u32 = |text: &str| u32::from_str_radix(text, 16).map_err(malformed);
    let dec_u32 = |text: &str| text.parse::<u32>().map_err(malformed);

    // Two hex digits always fit a u8
    let state_code = u8::from_str_radix(raw.state, 16).map_err(malformed)?;

    Ok(Some(ConnectionRecord {
        protocol,
        local_address: hex_to_address(raw.local_address)?,
        local_port: u16::from_str_radix(raw.local_port, 16).map_err(malformed)?,
        remote_address,
        remote_port: u16::from_str_radix(raw.remote_port, 16).map_err(malformed)?,
        state: ConnectionState::from_code(state_code),
        slot: dec_u32(raw.slot)?,
        tx_queue: hex_u32(raw.tx_queue)?,
        rx_queue: hex_u32(raw.rx_queue)?,
        timer_active: hex_u32(raw.timer_active)?,
        timer_jiffies: hex_u32(raw.timer_jiffies)?,
        retransmits: hex_u32(raw.retransmits)?,
        uid: dec_u32(raw.uid)?,
        timeout: dec_u32(raw.timeout)?,
        inode: raw.inode.parse::<u64>().map_err(malformed)?,
    }))
}

/// Decode all four tables
///
/// Output order is tcp4, tcp6, udp4, udp6, each in its original line order.
///
/// # Errors
///
/// The first malformed line aborts the whole decode; no partial output is
/// returned.
pub fn decode_proc_tables(tables: &ProcTables) -> Result<Vec<ConnectionRecord>> {
    let mut records = Vec::with_capacity(
        tables.tcp4.len() + tables.tcp6.len() + tables.udp4.len() + tables.udp6.len(),
    );

    for (protocol, lines) in tables.by_protocol() {
        let mut dropped = 0_usize;
        for line in lines {
            match decode_proc_line(line, protocol)? {
                Some(record) => {
                    trace!(
                        local = %record.local_endpoint(),
                        remote = %record.remote_endpoint(),
                        state = %record.state,
                        "decoded connection"
                    );
                    records.push(record);
                }
                None => dropped += 1,
            }
        }
        debug!(
            protocol = %protocol,
            lines = lines.len(),
            dropped,
            "decoded proc table"
        );
    }

    Ok(records)
}
