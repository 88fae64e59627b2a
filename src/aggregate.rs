//! Count matrix: connections per protocol and state
//!
//! # Layout
//!
//! Seven rows (`tcp4`, `tcp6`, `tcp`, `udp4`, `udp6`, `udp`, `all`) by the
//! 12 states of [`ConnectionState::ALL`]. Every cell exists from the start,
//! so an empty snapshot still serializes as a full table of zeros.
//!
//! Only the four base rows are ever incremented. `tcp`, `udp` and `all` are
//! roll-ups, recomputed from the base rows after counting.

use crate::error::Result;
use crate::model::{ConnectionRecord, ConnectionState, Protocol};
use crate::netstat::NetstatRow;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;
use tracing::{debug, warn};

// ============================================================================
// MATRIX KEYS
// ============================================================================

/// Row key of the count matrix: a base protocol or a roll-up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MatrixKey {
    Tcp4,
    Tcp6,
    Tcp,
    Udp4,
    Udp6,
    Udp,
    All,
}

impl MatrixKey {
    pub const COUNT: usize = 7;

    /// All keys, in report order
    pub const ALL: [MatrixKey; Self::COUNT] = [
        MatrixKey::Tcp4,
        MatrixKey::Tcp6,
        MatrixKey::Tcp,
        MatrixKey::Udp4,
        MatrixKey::Udp6,
        MatrixKey::Udp,
        MatrixKey::All,
    ];

    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            MatrixKey::Tcp4 => "tcp4",
            MatrixKey::Tcp6 => "tcp6",
            MatrixKey::Tcp => "tcp",
            MatrixKey::Udp4 => "udp4",
            MatrixKey::Udp6 => "udp6",
            MatrixKey::Udp => "udp",
            MatrixKey::All => "all",
        }
    }

    /// True for `tcp`, `udp` and `all`
    #[inline]
    #[must_use]
    pub const fn is_rollup(self) -> bool {
        matches!(self, MatrixKey::Tcp | MatrixKey::Udp | MatrixKey::All)
    }

    #[inline]
    const fn index(self) -> usize {
        self as usize
    }
}

impl From<Protocol> for MatrixKey {
    fn from(protocol: Protocol) -> Self {
        match protocol {
            Protocol::Tcp4 => MatrixKey::Tcp4,
            Protocol::Tcp6 => MatrixKey::Tcp6,
            Protocol::Udp4 => MatrixKey::Udp4,
            Protocol::Udp6 => MatrixKey::Udp6,
        }
    }
}

impl fmt::Display for MatrixKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// COUNT MATRIX
// ============================================================================

/// Dense protocol x state table of connection counts
///
/// === MEMORY REPRESENTATION ===
/// A fixed 7 x 12 array on the stack. Enum discriminants index it directly,
/// so there is no way to address a cell that does not exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountMatrix {
    cells: [[u64; ConnectionState::COUNT]; MatrixKey::COUNT],
}

impl Default for CountMatrix {
    fn default() -> Self {
        Self::new()
    }
}

impl CountMatrix {
    /// All-zero matrix
    #[must_use]
    pub const fn new() -> Self {
        Self {
            cells: [[0; ConnectionState::COUNT]; MatrixKey::COUNT],
        }
    }

    #[inline]
    #[must_use]
    pub const fn get(&self, key: MatrixKey, state: ConnectionState) -> u64 {
        self.cells[key.index()][state.index()]
    }

    /// Counts of one row, indexed like [`ConnectionState::ALL`]
    #[must_use]
    pub const fn row(&self, key: MatrixKey) -> &[u64; ConnectionState::COUNT] {
        &self.cells[key.index()]
    }

    /// Sum over all states of one row
    #[must_use]
    pub fn total(&self, key: MatrixKey) -> u64 {
        self.row(key).iter().sum()
    }

    /// Count one connection into its base row
    pub fn increment(&mut self, protocol: Protocol, state: ConnectionState) {
        self.cells[MatrixKey::from(protocol).index()][state.index()] += 1;
    }

    /// Overwrite the roll-up rows with the sums of their base rows
    ///
    /// tcp = tcp4 + tcp6, udp = udp4 + udp6, all = tcp + udp
    pub fn recompute_rollups(&mut self) {
        for state in ConnectionState::ALL {
            let s = state.index();
            let tcp = self.cells[MatrixKey::Tcp4.index()][s] + self.cells[MatrixKey::Tcp6.index()][s];
            let udp = self.cells[MatrixKey::Udp4.index()][s] + self.cells[MatrixKey::Udp6.index()][s];
            self.cells[MatrixKey::Tcp.index()][s] = tcp;
            self.cells[MatrixKey::Udp.index()][s] = udp;
            self.cells[MatrixKey::All.index()][s] = tcp + udp;
        }
    }

    /// Iterate `(key, state, count)` over every cell in report order
    pub fn iter(&self) -> impl Iterator<Item = (MatrixKey, ConnectionState, u64)> + '_ {
        MatrixKey::ALL.into_iter().flat_map(move |key| {
            ConnectionState::ALL
                .into_iter()
                .map(move |state| (key, state, self.get(key, state)))
        })
    }
}

/// One serialized row: `{"ESTABLISHED": n, ...}`
struct RowView<'a>(&'a [u64; ConnectionState::COUNT]);

impl Serialize for RowView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(ConnectionState::COUNT))?;
        for state in ConnectionState::ALL {
            map.serialize_entry(state.as_str(), &self.0[state.index()])?;
        }
        map.end()
    }
}

impl Serialize for CountMatrix {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(MatrixKey::COUNT))?;
        for key in MatrixKey::ALL {
            map.serialize_entry(key.as_str(), &RowView(self.row(key)))?;
        }
        map.end()
    }
}

// ============================================================================
// COUNTING
// ============================================================================

/// A record that can be counted into the matrix
///
/// Both accessors validate against the closed sets. An `Err` means the
/// source reported a value this crate does not know; the record is skipped.
pub trait Countable {
    /// # Errors
    ///
    /// `UnsupportedProtocol` when the protocol is outside the closed set.
    fn protocol(&self) -> Result<Protocol>;

    /// # Errors
    ///
    /// `UnsupportedState` when the state is outside the closed set.
    fn state(&self) -> Result<ConnectionState>;
}

impl Countable for ConnectionRecord {
    fn protocol(&self) -> Result<Protocol> {
        Ok(self.protocol)
    }

    fn state(&self) -> Result<ConnectionState> {
        Ok(self.state)
    }
}

impl Countable for NetstatRow {
    fn protocol(&self) -> Result<Protocol> {
        self.protocol_label().unwrap_or("<missing>").parse()
    }

    fn state(&self) -> Result<ConnectionState> {
        self.state_label().unwrap_or("<missing>").parse()
    }
}

/// Count records by protocol and state
///
/// === WHAT THIS DOES ===
/// 1. Start from an all-zero matrix, so every cell exists even for an
///    empty snapshot
/// 2. For each record, validate protocol and state against the closed sets
///    and bump the matching base-row cell
/// 3. Recompute the `tcp`, `udp` and `all` roll-ups from the base rows
///
/// === UNSUPPORTED VALUES ===
/// A record with an unknown protocol (netstat's `raw6`) or state is logged
/// with `warn!` and skipped; newer kernels or tools may report values this
/// crate does not know yet. One bad record never aborts the count.
///
/// === GENERICS ===
/// `R: Countable` lets the same loop count decoded kernel records and
/// netstat rows; each source checks its own values.
#[must_use]
pub fn count_connections<R: Countable>(records: &[R]) -> CountMatrix {
    let mut matrix = CountMatrix::new();
    let mut skipped = 0_usize;

    for record in records {
        let counted = record
            .protocol()
            .and_then(|protocol| record.state().map(|state| (protocol, state)));
        match counted {
            Ok((protocol, state)) => matrix.increment(protocol, state),
            Err(e) => {
                warn!("{e}, skipping record");
                skipped += 1;
            }
        }
    }

    matrix.recompute_rollups();

    for key in MatrixKey::ALL.into_iter().filter(|key| !key.is_rollup()) {
        debug!(protocol = %key, total = matrix.total(key), "base row");
    }
    debug!(
        records = records.len(),
        skipped,
        total = matrix.total(MatrixKey::All),
        "counted connections"
    );
    matrix
}
