mod common;

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{FakeBackend, SyntheticSource};
use crossbeam_channel::Receiver;
use metrotune_core::{
    AudioEngine, BeatCallback, BeatNumber, EngineConfig, EngineError, LoopState,
    MetronomeControl, NoteName, PitchCallback, PitchEstimate, RemoteLink, Source, SourceKind,
    Tempo, TunerControl,
};

const TIMEOUT: Duration = Duration::from_secs(2);

/// Connects a link to a fresh loopback listener and returns both ends.
fn linked_pair() -> (RemoteLink, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let link = RemoteLink::connect(&addr, TIMEOUT).unwrap();
    let (device, _) = listener.accept().unwrap();
    device.set_read_timeout(Some(TIMEOUT)).unwrap();
    (link, device)
}

fn read_lines(device: &TcpStream, count: usize) -> Vec<String> {
    let mut reader = BufReader::new(device.try_clone().unwrap());
    (0..count)
        .map(|_| {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            line
        })
        .collect()
}

fn beat_channel() -> (BeatCallback, Receiver<u8>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    let callback: BeatCallback = Box::new(move |beat: BeatNumber| {
        let _ = tx.send(beat.get());
    });
    (callback, rx)
}

fn pitch_channel() -> (PitchCallback, Receiver<PitchEstimate>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    let callback: PitchCallback = Box::new(move |estimate: PitchEstimate| {
        let _ = tx.send(estimate);
    });
    (callback, rx)
}

#[test]
fn test_metronome_commands_and_beats() {
    let (mut link, mut device) = linked_pair();
    let (on_beat, beats) = beat_channel();

    link.start_metronome(Tempo::new(100).unwrap(), on_beat).unwrap();
    assert_eq!(read_lines(&device, 2), vec!["SET_BPM:100\n", "START_METRO:\n"]);

    device.write_all(b"BEAT:1\nBEAT:2\r\nBEAT:9\nFREQ:440|NOTE:A|CENTS:0\nBEAT:3\n").unwrap();
    let received: Vec<u8> = (0..3).map(|_| beats.recv_timeout(TIMEOUT).unwrap()).collect();
    assert_eq!(received, vec![1, 2, 3]);

    link.update_tempo(Tempo::new(180).unwrap()).unwrap();
    link.stop_metronome().unwrap();
    assert_eq!(read_lines(&device, 2), vec!["SET_BPM:180\n", "STOP_METRO:\n"]);

    // Beats after stop are not delivered.
    device.write_all(b"BEAT:4\n").unwrap();
    assert!(beats.recv_timeout(Duration::from_millis(200)).is_err());
}

#[test]
fn test_tuner_readings_are_validated() {
    let (mut link, mut device) = linked_pair();
    let (on_pitch, estimates) = pitch_channel();

    link.start_tuner(on_pitch).unwrap();
    assert_eq!(read_lines(&device, 1), vec!["START_TUNER:\n"]);

    device
        .write_all(b"FREQ:0|NOTE:|CENTS:0\nNOTE:E|CENTS:-3|FREQ:329.1\nFREQ:98.0|NOTE:?\n")
        .unwrap();
    let estimate = estimates.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(estimate.note, NoteName::E);
    assert_eq!(estimate.cents, -3);
    assert!((estimate.frequency_hz - 329.1).abs() < 1e-3);
    assert!(estimates.recv_timeout(Duration::from_millis(200)).is_err());

    link.stop_tuner().unwrap();
    assert_eq!(read_lines(&device, 1), vec!["STOP_TUNER:\n"]);
}

#[test]
fn test_garbled_bytes_do_not_end_telemetry() {
    let (mut link, mut device) = linked_pair();
    let (on_beat, beats) = beat_channel();
    link.start_metronome(Tempo::new(100).unwrap(), on_beat).unwrap();
    read_lines(&device, 2);

    device.write_all(b"BEAT:1\n\xff\xfe\nBEAT:2\n").unwrap();
    assert_eq!(beats.recv_timeout(TIMEOUT).unwrap(), 1);
    assert_eq!(beats.recv_timeout(TIMEOUT).unwrap(), 2);
    assert!(link.is_connected());
}

#[test]
fn test_overlong_line_is_dropped() {
    let (mut link, mut device) = linked_pair();
    let (on_beat, beats) = beat_channel();
    link.start_metronome(Tempo::new(100).unwrap(), on_beat).unwrap();
    read_lines(&device, 2);

    // A runaway line without a newline for a long stretch, then normal traffic.
    let mut noise = b"BEAT:1".to_vec();
    noise.extend(std::iter::repeat(b'x').take(64 * 1024));
    noise.extend_from_slice(b"\nBEAT:3\n");
    device.write_all(&noise).unwrap();

    assert_eq!(beats.recv_timeout(TIMEOUT).unwrap(), 3);
    assert!(beats.recv_timeout(Duration::from_millis(200)).is_err());
    assert!(link.is_connected());
}

#[test]
fn test_device_hangup_is_surfaced() {
    let (mut link, device) = linked_pair();
    assert!(link.is_connected());
    drop(device);

    let deadline = Instant::now() + TIMEOUT;
    while link.is_connected() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(!link.is_connected());
    assert!(matches!(link.send(metrotune_core::protocol::Command::StartTuner), Err(EngineError::LinkClosed)));
}

#[test]
fn test_unreachable_device_fails_to_connect() {
    // Bind then drop to get a port nobody listens on.
    let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
    let result = RemoteLink::connect(&format!("127.0.0.1:{}", port), Duration::from_millis(500));
    assert!(matches!(result, Err(EngineError::Link(_))));
}

#[test]
fn test_switching_source_stops_the_local_engine() {
    let backend = FakeBackend::new(Arc::new(SyntheticSource::new(Vec::new())));
    let output = Arc::clone(&backend.output);
    let engine = AudioEngine::with_backend(EngineConfig::default(), Box::new(backend));
    let mut source = Source::Local(engine);
    assert_eq!(source.kind(), SourceKind::Local);

    let (on_beat, local_beats) = beat_channel();
    source.start_metronome(Tempo::new(240).unwrap(), on_beat).unwrap();
    local_beats.recv_timeout(TIMEOUT).unwrap();

    let (link, mut device) = linked_pair();
    source.switch_to(Source::Remote(link));
    assert_eq!(source.kind(), SourceKind::Remote);

    // The local loop is gone: its callback was dropped with the engine.
    while local_beats.try_recv().is_ok() {}
    assert!(local_beats.recv_timeout(Duration::from_millis(300)).is_err());
    assert!(output.cancellations.load(std::sync::atomic::Ordering::SeqCst) >= 1);

    let (on_beat, remote_beats) = beat_channel();
    source.start_metronome(Tempo::new(90).unwrap(), on_beat).unwrap();
    assert_eq!(read_lines(&device, 2), vec!["SET_BPM:90\n", "START_METRO:\n"]);
    device.write_all(b"BEAT:1\n").unwrap();
    assert_eq!(remote_beats.recv_timeout(TIMEOUT).unwrap(), 1);

    source.shutdown();
    assert_eq!(read_lines(&device, 1), vec!["STOP_METRO:\n"]);
}

#[test]
fn test_local_source_reports_loop_state() {
    let backend = FakeBackend::new(Arc::new(SyntheticSource::new(Vec::new())));
    let mut engine = AudioEngine::with_backend(EngineConfig::default(), Box::new(backend));
    let (on_beat, _beats) = beat_channel();
    engine.start_metronome(Tempo::default(), on_beat).unwrap();
    let mut source = Source::Local(engine);
    source.stop_metronome().unwrap();
    let Source::Local(engine) = &source else {
        panic!("expected local source");
    };
    assert_eq!(engine.metronome_state(), LoopState::Idle);
}
