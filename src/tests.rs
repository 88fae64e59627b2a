// Unit tests for the connstat library
// Tests use line samples captured from real /proc/net tables and netstat
// runs, plus the edge cases the decoders have to reject.

use crate::proc_table::{decode_proc_line, hex_to_address};
use crate::*;
use std::fs;
use std::path::Path;

/// Build a tcp4 line with the given address fields and state code
fn tcp_line(local: &str, remote: &str, state: &str) -> String {
    format!(
        "0: {local} {remote} {state} 00000000:00000000 00:00000000 00000000  1000        0 52719 1 0000000000000000 20 4 30 10 -1"
    )
}

// ============================================================================
// Tests for ConnectionState::from_code()
// ============================================================================
mod test_state_from_code {
    use super::*;

    #[test]
    fn test_named_states() {
        let expected = [
            (TCP_ESTABLISHED, "ESTABLISHED"),
            (TCP_SYN_SENT, "SYN_SENT"),
            (TCP_SYN_RECV, "SYN_RECV"),
            (TCP_FIN_WAIT1, "FIN_WAIT1"),
            (TCP_FIN_WAIT2, "FIN_WAIT2"),
            (TCP_TIME_WAIT, "TIME_WAIT"),
            (TCP_CLOSE, "CLOSE"),
            (TCP_CLOSE_WAIT, "CLOSE_WAIT"),
            (TCP_LAST_ACK, "LAST_ACK"),
            (TCP_LISTEN, "LISTEN"),
            (TCP_CLOSING, "CLOSING"),
        ];
        for (code, name) in expected {
            assert_eq!(ConnectionState::from_code(code).as_str(), name);
        }
    }

    #[test]
    fn test_listen_is_0a() {
        assert_eq!(ConnectionState::from_code(0x0A), ConnectionState::Listen);
    }

    #[test]
    fn test_kernel_internal_states_are_unknown() {
        assert_eq!(ConnectionState::from_code(0x0C), ConnectionState::Unknown);
        assert_eq!(ConnectionState::from_code(0x0D), ConnectionState::Unknown);
    }

    #[test]
    fn test_out_of_table_codes_are_unknown() {
        // Edge case: 0 and everything from 14 up
        assert_eq!(ConnectionState::from_code(0x00), ConnectionState::Unknown);
        for code in 14..=u8::MAX {
            assert_eq!(ConnectionState::from_code(code), ConnectionState::Unknown);
        }
    }

    #[test]
    fn test_state_names_round_trip_through_from_str() {
        for state in ConnectionState::ALL {
            assert_eq!(state.as_str().parse::<ConnectionState>().unwrap(), state);
        }
        assert!("ESTAB".parse::<ConnectionState>().is_err());
    }

    #[test]
    fn test_protocol_labels() {
        assert_eq!("tcp6".parse::<Protocol>().unwrap(), Protocol::Tcp6);
        assert!(matches!(
            "tcp".parse::<Protocol>(),
            Err(ConnstatError::UnsupportedProtocol(ref p)) if p == "tcp"
        ));
    }
}

// ============================================================================
// Tests for hex_to_address()
// ============================================================================
mod test_hex_to_address {
    use super::*;

    #[test]
    fn test_loopback() {
        assert_eq!(hex_to_address("0100007F").unwrap(), "127.0.0.1");
    }

    #[test]
    fn test_real_ip_192_168_21_201() {
        // From real /proc/net/tcp data: C915A8C0 = 192.168.21.201
        assert_eq!(hex_to_address("C915A8C0").unwrap(), "192.168.21.201");
    }

    #[test]
    fn test_lower_case_input() {
        assert_eq!(hex_to_address("a012a8c0").unwrap(), "192.168.18.160");
    }

    #[test]
    fn test_ipv4_any() {
        assert_eq!(hex_to_address("00000000").unwrap(), "0.0.0.0");
    }

    #[test]
    fn test_ipv6_loopback() {
        assert_eq!(
            hex_to_address("00000000000000000000000001000000").unwrap(),
            "0000:0000:0000:0000:0000:0000:0000:0001"
        );
    }

    #[test]
    fn test_ipv6_words_reversed_independently() {
        // fe80::1e69:7aff:fe0b:4c3d as dumped by the kernel
        assert_eq!(
            hex_to_address("000080FE00000000FF7A691E3D4C0BFE").unwrap(),
            "fe80:0000:0000:0000:1e69:7aff:fe0b:4c3d"
        );
    }

    #[test]
    fn test_ipv4_mapped_ipv6() {
        assert_eq!(
            hex_to_address("0000000000000000FFFF00000100007F").unwrap(),
            "0000:0000:0000:0000:0000:ffff:7f00:0001"
        );
    }

    #[test]
    fn test_invalid_length() {
        assert!(matches!(
            hex_to_address("0100007F00"),
            Err(ConnstatError::InvalidAddressFormat(ref t)) if t == "0100007F00"
        ));
    }
}

// ============================================================================
// Tests for decode_proc_line() / decode_proc_tables()
// ============================================================================
mod test_decode_proc {
    use super::*;

    #[test]
    fn test_end_to_end_single_established() {
        let tables = ProcTables {
            tcp4: vec![tcp_line("0100007F:0050", "0100007F:01BB", "01")],
            ..ProcTables::default()
        };

        let records = decode_proc_tables(&tables).unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.protocol, Protocol::Tcp4);
        assert_eq!(record.state, ConnectionState::Established);
        assert_eq!(record.local_address, "127.0.0.1");
        assert_eq!(record.local_port, 80);
        assert_eq!(record.remote_address, "127.0.0.1");
        assert_eq!(record.remote_port, 443);
        assert_eq!(record.uid, 1000);

        let matrix = count_connections(&records);
        assert_eq!(matrix.get(MatrixKey::Tcp4, ConnectionState::Established), 1);
        assert_eq!(matrix.get(MatrixKey::Tcp, ConnectionState::Established), 1);
        assert_eq!(matrix.get(MatrixKey::All, ConnectionState::Established), 1);
        let nonzero = matrix.iter().filter(|(_, _, n)| *n != 0).count();
        assert_eq!(nonzero, 3);
    }

    #[test]
    fn test_port_0050_is_80() {
        let line = tcp_line("0100007F:0050", "0100007F:0050", "01");
        let record = decode_proc_line(&line, Protocol::Tcp4).unwrap().unwrap();
        assert_eq!(record.local_port, 80);
    }

    #[test]
    fn test_unconnected_sockets_are_dropped() {
        let v4 = tcp_line("0100007F:0050", "00000000:0000", "0A");
        let v6 = tcp_line(
            "00000000000000000000000001000000:0050",
            "00000000000000000000000000000000:0000",
            "0A",
        );
        assert_eq!(decode_proc_line(&v4, Protocol::Tcp4).unwrap(), None);
        assert_eq!(decode_proc_line(&v6, Protocol::Tcp6).unwrap(), None);
    }

    #[test]
    fn test_unknown_state_code_still_builds_record() {
        let line = tcp_line("0100007F:0050", "0100007F:01BB", "0C");
        let record = decode_proc_line(&line, Protocol::Tcp4).unwrap().unwrap();
        assert_eq!(record.state, ConnectionState::Unknown);

        let line = tcp_line("0100007F:0050", "0100007F:01BB", "FF");
        let record = decode_proc_line(&line, Protocol::Tcp4).unwrap().unwrap();
        assert_eq!(record.state, ConnectionState::Unknown);
    }

    #[test]
    fn test_output_order_follows_tables() {
        let tables = ProcTables {
            tcp4: vec![tcp_line("0100007F:0001", "0100007F:0002", "01")],
            tcp6: vec![tcp_line(
                "00000000000000000000000001000000:0003",
                "00000000000000000000000001000000:0004",
                "06",
            )],
            udp4: vec![tcp_line("0100007F:0005", "0100007F:0006", "01")],
            udp6: vec![tcp_line(
                "00000000000000000000000001000000:0007",
                "00000000000000000000000001000000:0008",
                "01",
            )],
        };

        let protocols: Vec<Protocol> = decode_proc_tables(&tables)
            .unwrap()
            .iter()
            .map(|r| r.protocol)
            .collect();
        assert_eq!(protocols, Protocol::ALL.to_vec());
    }

    #[test]
    fn test_malformed_line_aborts_decode() {
        let tables = ProcTables {
            tcp4: vec![
                tcp_line("0100007F:0050", "0100007F:01BB", "01"),
                "1: 0100007F:0050 0100007F".to_string(),
            ],
            ..ProcTables::default()
        };

        match decode_proc_tables(&tables) {
            Err(ConnstatError::MalformedLine(line)) => {
                assert_eq!(line, "1: 0100007F:0050 0100007F");
            }
            other => panic!("expected MalformedLine, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_colon_is_malformed() {
        let line = tcp_line("0100007F0050", "0100007F:01BB", "01");
        assert!(matches!(
            decode_proc_line(&line, Protocol::Tcp4),
            Err(ConnstatError::MalformedLine(_))
        ));
    }
}

// ============================================================================
// Tests for read_proc_tables()
// ============================================================================
mod test_read_proc_tables {
    use super::*;

    const HEADER: &str = "  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode";

    fn write_table(root: &Path, name: &str, lines: &[&str]) {
        let net = root.join("net");
        fs::create_dir_all(&net).unwrap();
        let mut content = String::from(HEADER);
        content.push('\n');
        for line in lines {
            content.push_str("   ");
            content.push_str(line);
            content.push('\n');
        }
        content.push('\n');
        fs::write(net.join(name), content).unwrap();
    }

    #[test]
    fn test_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no-such-proc");
        assert!(matches!(
            read_proc_tables(&missing),
            Err(ConnstatError::SourceUnavailable(ref p)) if p == &missing
        ));
    }

    #[test]
    fn test_missing_table_file() {
        let dir = tempfile::tempdir().unwrap();
        write_table(dir.path(), "tcp", &[]);
        assert!(matches!(
            read_proc_tables(dir.path()),
            Err(ConnstatError::Io { .. })
        ));
    }

    #[test]
    fn test_reads_and_strips_headers() {
        let dir = tempfile::tempdir().unwrap();
        let estab = tcp_line("0100007F:0050", "0100007F:01BB", "01");
        let listen = tcp_line("00000000:0016", "00000000:0000", "0A");
        write_table(dir.path(), "tcp", &[&estab, &listen]);
        write_table(dir.path(), "tcp6", &[]);
        write_table(dir.path(), "udp", &[]);
        write_table(dir.path(), "udp6", &[]);

        let tables = read_proc_tables(dir.path()).unwrap();
        assert_eq!(tables.tcp4, vec![estab, listen]);
        assert!(tables.tcp6.is_empty());
        assert!(tables.udp4.is_empty());
        assert!(tables.udp6.is_empty());

        let matrix = count_connections(&decode_proc_tables(&tables).unwrap());
        assert_eq!(matrix.total(MatrixKey::All), 1);
        assert_eq!(matrix.get(MatrixKey::Tcp4, ConnectionState::Listen), 0);
    }
}

// ============================================================================
// Tests for parse_netstat_output()
// ============================================================================
mod test_netstat {
    use super::*;
    use crate::netstat::tokenize_header;

    const OUTPUT: &str = "\
Active Internet connections (w/o servers)
Proto Recv-Q Send-Q Local Address           Foreign Address         State
tcp        0      0 192.168.21.201:22       192.168.18.160:55584    ESTABLISHED
tcp        0     36 192.168.21.201:22       192.168.18.100:51514    ESTABLISHED
tcp6       0      0 fe80::1e69:7aff:fe0:631 fe80::1e69:7aff:fe0:999 TIME_WAIT
udp        0      0 192.168.21.201:68       192.168.21.1:67         ESTABLISHED
";

    #[test]
    fn test_header_keeps_multi_word_labels() {
        let rows = ["tcp        0      0 192.168.1.10:22"];
        let labels = tokenize_header("Proto Recv-Q Send-Q Local Address", &rows);
        assert_eq!(labels, vec!["Proto", "Recv-Q", "Send-Q", "Local Address"]);
    }

    #[test]
    fn test_parse_full_output() {
        let rows = parse_netstat_output(OUTPUT).unwrap();
        assert_eq!(rows.len(), 4);

        let headers: Vec<&str> = rows[0].columns().iter().map(|(h, _)| h.as_str()).collect();
        assert_eq!(
            headers,
            vec!["Proto", "Recv-Q", "Send-Q", "Local Address", "Foreign Address", "State"]
        );
        assert_eq!(rows[0].protocol_label(), Some("tcp4"));
        assert_eq!(rows[1].get("Send-Q"), Some("36"));
        assert_eq!(rows[2].protocol_label(), Some("tcp6"));
        assert_eq!(rows[3].protocol_label(), Some("udp4"));
        assert_eq!(rows[3].get("Foreign Address"), Some("192.168.21.1:67"));
    }

    #[test]
    fn test_count_parsed_rows() {
        let rows = parse_netstat_output(OUTPUT).unwrap();
        let matrix = count_connections(&rows);
        assert_eq!(matrix.get(MatrixKey::Tcp4, ConnectionState::Established), 2);
        assert_eq!(matrix.get(MatrixKey::Tcp6, ConnectionState::TimeWait), 1);
        assert_eq!(matrix.get(MatrixKey::Udp4, ConnectionState::Established), 1);
        assert_eq!(matrix.get(MatrixKey::All, ConnectionState::Established), 3);
    }

    #[test]
    fn test_too_few_lines() {
        assert!(matches!(
            parse_netstat_output("Active Internet connections\n\n   \n"),
            Err(ConnstatError::TooFewLines(1))
        ));
        assert!(matches!(
            parse_netstat_output(""),
            Err(ConnstatError::TooFewLines(0))
        ));
    }

    #[test]
    fn test_header_only_gives_no_rows() {
        let output = "Active Internet connections\nProto Recv-Q Send-Q Local Address Foreign Address State\n";
        assert!(parse_netstat_output(output).unwrap().is_empty());
    }

    #[test]
    fn test_column_count_mismatch() {
        let output = "\
Active Internet connections (servers and established)
Proto Recv-Q Send-Q Local Address           Foreign Address         State
tcp        0      0 0.0.0.0:22              0.0.0.0:*               LISTEN
udp        0      0 0.0.0.0:68              0.0.0.0:*
";
        match parse_netstat_output(output) {
            Err(ConnstatError::ColumnCountMismatch {
                expected, found, ..
            }) => {
                assert_eq!(expected, 6);
                assert_eq!(found, 5);
            }
            other => panic!("expected ColumnCountMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_unsupported_protocol_is_skipped() {
        let output = "\
Active Internet connections (w/o servers)
Proto Recv-Q Send-Q Local Address           Foreign Address         State
raw6       0      0 ::1:58                  ::1:58                  ESTABLISHED
tcp        0      0 10.0.0.1:22             10.0.0.2:40000          ESTABLISHED
";
        let rows = parse_netstat_output(output).unwrap();
        assert_eq!(rows.len(), 2);
        let matrix = count_connections(&rows);
        assert_eq!(matrix.total(MatrixKey::All), 1);
    }
}

// ============================================================================
// Tests for count_connections()
// ============================================================================
mod test_count_connections {
    use super::*;

    fn record(protocol: Protocol, state: ConnectionState) -> ConnectionRecord {
        ConnectionRecord {
            protocol,
            local_address: "10.0.0.1".to_string(),
            local_port: 1234,
            remote_address: "10.0.0.2".to_string(),
            remote_port: 80,
            state,
            slot: 0,
            tx_queue: 0,
            rx_queue: 0,
            timer_active: 0,
            timer_jiffies: 0,
            retransmits: 0,
            uid: 0,
            timeout: 0,
            inode: 0,
        }
    }

    fn mixed_records() -> Vec<ConnectionRecord> {
        vec![
            record(Protocol::Tcp4, ConnectionState::Established),
            record(Protocol::Tcp4, ConnectionState::Established),
            record(Protocol::Tcp6, ConnectionState::TimeWait),
            record(Protocol::Tcp6, ConnectionState::Established),
            record(Protocol::Udp4, ConnectionState::Established),
            record(Protocol::Udp6, ConnectionState::Close),
            record(Protocol::Udp6, ConnectionState::Unknown),
        ]
    }

    fn assert_rollups_consistent(matrix: &CountMatrix) {
        for state in ConnectionState::ALL {
            let base = matrix.get(MatrixKey::Tcp4, state)
                + matrix.get(MatrixKey::Tcp6, state)
                + matrix.get(MatrixKey::Udp4, state)
                + matrix.get(MatrixKey::Udp6, state);
            assert_eq!(matrix.get(MatrixKey::All, state), base, "state {state}");
            assert_eq!(
                matrix.get(MatrixKey::Tcp, state),
                matrix.get(MatrixKey::Tcp4, state) + matrix.get(MatrixKey::Tcp6, state)
            );
            assert_eq!(
                matrix.get(MatrixKey::Udp, state),
                matrix.get(MatrixKey::Udp4, state) + matrix.get(MatrixKey::Udp6, state)
            );
        }
    }

    #[test]
    fn test_empty_input_is_all_zero() {
        let matrix = count_connections::<ConnectionRecord>(&[]);
        assert_eq!(matrix, CountMatrix::new());
        assert_rollups_consistent(&matrix);
    }

    #[test]
    fn test_mixed_counts() {
        let matrix = count_connections(&mixed_records());
        assert_eq!(matrix.get(MatrixKey::Tcp4, ConnectionState::Established), 2);
        assert_eq!(matrix.get(MatrixKey::Tcp, ConnectionState::Established), 3);
        assert_eq!(matrix.get(MatrixKey::Udp, ConnectionState::Established), 1);
        assert_eq!(matrix.get(MatrixKey::All, ConnectionState::Established), 4);
        assert_eq!(matrix.get(MatrixKey::Udp6, ConnectionState::Unknown), 1);
        assert_eq!(matrix.total(MatrixKey::All), 7);
        assert_rollups_consistent(&matrix);
    }

    #[test]
    fn test_counting_is_idempotent() {
        let records = mixed_records();
        assert_eq!(count_connections(&records), count_connections(&records));
    }

    #[test]
    fn test_unsupported_state_is_skipped() {
        let rows = vec![
            netstat::NetstatRow::new(vec![
                ("Proto".to_string(), "tcp4".to_string()),
                ("State".to_string(), "SYN_RECV".to_string()),
            ]),
            netstat::NetstatRow::new(vec![
                ("Proto".to_string(), "tcp4".to_string()),
                ("State".to_string(), "BOGUS".to_string()),
            ]),
            netstat::NetstatRow::new(vec![("Proto".to_string(), "udp6".to_string())]),
        ];
        let matrix = count_connections(&rows);
        assert_eq!(matrix.total(MatrixKey::All), 1);
        assert_eq!(matrix.get(MatrixKey::Tcp4, ConnectionState::SynRecv), 1);
    }

    #[test]
    fn test_report_passes_validation() {
        let matrix = count_connections(&mixed_records());
        let json = serde_json::to_string_pretty(&matrix).unwrap();
        assert_eq!(validate_json(&json), Ok(()));
    }
}
