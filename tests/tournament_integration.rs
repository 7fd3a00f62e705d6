use heat_timer::capture::{CaptureReader, CaptureSink};
use heat_timer::persist::{read_heat_log, ResultsWriter};
use heat_timer::record::CaptureFrame;
use heat_timer::transport::ReplaySource;
use heat_timer::{HeatReport, LaneAssignment, ListenState, PipelineEvent, Tournament, TransportError};
use std::fs;
use std::time::Duration;

fn tournament(dir: &std::path::Path, names: &[&str]) -> Tournament {
    let mut t = Tournament::new(ResultsWriter::new(dir.join("race_results"), "20240101_120000"))
        .with_idle_backoff(Duration::from_millis(1));
    for n in names {
        t.register(n).unwrap();
    }
    t
}

/// Listen once with the given chunks and return the heat report, if any,
/// plus the final listener state.
fn run_heat(t: &mut Tournament, chunks: Vec<Vec<u8>>, lanes: LaneAssignment) -> (Option<Box<HeatReport>>, ListenState) {
    let events = t.events();
    t.connect(Box::new(ReplaySource::new(chunks))).unwrap();
    t.start_listening(lanes).unwrap();
    let mut report = None;
    loop {
        match events.recv_timeout(Duration::from_secs(5)).expect("pipeline stalled") {
            PipelineEvent::Heat(r) => report = Some(r),
            PipelineEvent::State(ListenState::Listening { .. }) | PipelineEvent::Line(_) => {}
            PipelineEvent::State(state) => {
                t.wait().unwrap();
                return (report, state);
            }
        }
    }
}

#[test]
fn alice_and_bob_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let mut t = tournament(dir.path(), &["Alice", "Bob"]);
    let lanes = LaneAssignment::from_pairs([(1, "Alice"), (2, "Bob")]).unwrap();

    let (report, state) = run_heat(&mut t, vec![b"1.2345 1.1111 \n".to_vec()], lanes);
    assert!(matches!(state, ListenState::Idle));
    let report = report.expect("heat report");
    assert_eq!(*report.result.times(), [Some(1.2345), Some(1.1111), None, None]);
    assert_eq!(report.winner.map(|w| w.lane), Some(2));
    assert_eq!(report.outcome.winner.as_deref(), Some("Bob"));
    assert!(report.persistence.is_empty());

    let ledger = t.ledger().unwrap();
    let bob = ledger.get("Bob").unwrap();
    assert_eq!((bob.best_time(), bob.races_count()), (Some(1.1111), 1));
    let alice = ledger.get("Alice").unwrap();
    assert_eq!((alice.best_time(), alice.races_count()), (Some(1.2345), 1));

    let standings = t.standings().unwrap();
    assert_eq!(standings[0].name, "Bob");
    assert_eq!(standings[1].name, "Alice");
    assert_eq!(report.standings, standings);
    assert_eq!(t.heat_number().unwrap(), 2);

    let snapshot = fs::read_to_string(dir.path().join("race_results/standings_20240101_120000.csv")).unwrap();
    assert_eq!(
        snapshot,
        "Rank,Name,Best Time,Average Time,Total Races\n1,Bob,1.1111,1.1111,1\n2,Alice,1.2345,1.2345,1\n"
    );
}

#[test]
fn stats_accumulate_over_heats() {
    let dir = tempfile::tempdir().unwrap();
    let mut t = tournament(dir.path(), &["X", "Y", "Z"]);
    let heats: [(&[u8], [(usize, &str); 2]); 3] = [
        (b"A=2.5000 B=3.0000\r\n", [(1, "X"), (2, "Y")]),
        (b"READY\r\n1.7500 2.2500\n", [(2, "X"), (1, "Y")]),
        (b"9.0000\n", [(3, "X"), (1, "Y")]),
    ];
    for (bytes, pairs) in heats {
        let lanes = LaneAssignment::from_pairs(pairs).unwrap();
        let (report, _) = run_heat(&mut t, vec![bytes.to_vec()], lanes);
        assert!(report.is_some());
    }
    let ledger = t.ledger().unwrap();
    let x = ledger.get("X").unwrap();
    // heat 3: X in lane 3 had no time, a DNF
    assert_eq!(x.races_count(), 2);
    assert_eq!(x.best_time(), Some(2.25));
    assert_eq!(x.total_time(), 4.75);
    let y = ledger.get("Y").unwrap();
    assert_eq!(y.races_count(), 3);
    assert_eq!(y.best_time(), Some(1.75));
    assert_eq!(y.total_time(), 13.75);

    let rows = t.standings().unwrap();
    assert_eq!(rows.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(), vec!["Y", "X", "Z"]);
    assert_eq!(rows[2].average_time, None);

    let log = read_heat_log(&t.heats_path().unwrap()).unwrap();
    assert_eq!(log.iter().map(|h| h.heat_number).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert_eq!(log[2].winner.as_deref(), Some("Y"));
}

#[test]
fn heat_log_failure_is_reported_and_next_heat_still_logged() {
    let dir = tempfile::tempdir().unwrap();
    let mut t = tournament(dir.path(), &["A", "B"]);
    let lanes = LaneAssignment::from_pairs([(1, "A"), (2, "B")]).unwrap();
    run_heat(&mut t, vec![b"1.0000 2.0000\n".to_vec()], lanes.clone());

    let heats_path = t.heats_path().unwrap();
    let parked = dir.path().join("parked.csv");
    fs::rename(&heats_path, &parked).unwrap();
    fs::create_dir(&heats_path).unwrap();

    let (report, _) = run_heat(&mut t, vec![b"3.0000 0.5000\n".to_vec()], lanes.clone());
    let report = report.unwrap();
    assert_eq!(report.persistence.len(), 1);
    assert!(matches!(report.persistence[0], heat_timer::PersistenceError::HeatLog { heat: 2, .. }));
    // the in-memory standings still reflect heat 2
    assert_eq!(report.standings[0].name, "B");
    assert_eq!(t.ledger().unwrap().get("B").unwrap().best_time(), Some(0.5));

    fs::remove_dir(&heats_path).unwrap();
    fs::rename(&parked, &heats_path).unwrap();
    let (report, _) = run_heat(&mut t, vec![b"1.5000 1.5000\n".to_vec()], lanes);
    assert!(report.unwrap().persistence.is_empty());

    let log = read_heat_log(&heats_path).unwrap();
    assert_eq!(log.iter().map(|h| h.heat_number).collect::<Vec<_>>(), vec![1, 3]);
    assert_eq!(log[1].winner.as_deref(), Some("A"));
}

#[test]
fn transport_error_keeps_state_and_allows_reconnect() {
    let dir = tempfile::tempdir().unwrap();
    let mut t = tournament(dir.path(), &["A"]);
    let lanes = LaneAssignment::from_pairs([(1, "A")]).unwrap();

    t.connect(Box::new(ReplaySource::new([b"1.00".to_vec()]).then_fail(TransportError::Disconnected)))
        .unwrap();
    let events = t.events();
    t.start_listening(lanes.clone()).unwrap();
    let state = loop {
        if let PipelineEvent::State(s) = events.recv_timeout(Duration::from_secs(5)).unwrap() {
            if !matches!(s, ListenState::Listening { .. }) {
                break s;
            }
        }
    };
    assert!(matches!(state, ListenState::Error(TransportError::Disconnected)));
    t.wait().unwrap();
    assert!(!t.is_connected());
    assert_eq!(t.heat_number().unwrap(), 1);
    assert_eq!(t.ledger().unwrap().get("A").unwrap().races_count(), 0);

    // the partial "1.00" from the dead link must not leak into the next heat
    let (report, _) = run_heat(&mut t, vec![b"00 2.0000\n".to_vec()], lanes);
    let report = report.unwrap();
    assert_eq!(report.outcome.heat_number, 1);
    assert_eq!(*report.result.times(), [Some(2.0), None, None, None]);
}

#[test]
fn capture_records_every_line() {
    let dir = tempfile::tempdir().unwrap();
    let cap = dir.path().join("session.bin");
    let mut t = tournament(dir.path(), &["A"]).with_capture(CaptureSink::spawn(cap.clone(), "test"));
    let lanes = LaneAssignment::from_pairs([(1, "A")]).unwrap();
    run_heat(&mut t, vec![b"READY\n".to_vec(), b"1.2345\n".to_vec()], lanes);
    drop(t);

    let lines: Vec<(u32, String)> = CaptureReader::open(&cap)
        .unwrap()
        .filter_map(|f| match f.unwrap() {
            CaptureFrame::Line(l) => Some((l.heat_number, l.text)),
            CaptureFrame::Header(_) => None,
        })
        .collect();
    assert_eq!(lines, vec![(1, "READY".to_string()), (1, "1.2345".to_string())]);
}
