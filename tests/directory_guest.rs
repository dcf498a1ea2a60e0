use std::fs;

use ds4qb_bridge::backend::{BackendCall, RecordingBackend};
use ds4qb_bridge::protocol::binary::{BinaryProtocol, Opcode, NAME_FIELD_LEN};
use ds4qb_bridge::protocol::clipboard::ClipboardProtocol;
use ds4qb_bridge::transport::DirectoryGuest;
use ds4qb_bridge::{AdapterConfig, Engine, PollingLoop, TickOutcome};
use tempfile::TempDir;

fn load_snd(slot: u16, file: &str) -> Vec<u8> {
    let mut buf = (Opcode::LoadSnd as u16).to_le_bytes().to_vec();
    buf.extend_from_slice(&slot.to_le_bytes());
    let mut name = vec![0u8; NAME_FIELD_LEN];
    name[..file.len()].copy_from_slice(file.as_bytes());
    buf.extend_from_slice(&name);
    buf.extend_from_slice(&0u32.to_le_bytes());
    buf
}

#[test]
fn binary_commands_round_trip_through_host_files() {
    let dir = TempDir::new().unwrap();
    let config = AdapterConfig {
        root: dir.path().to_path_buf(),
        working_dir: "GAME".into(),
        ..AdapterConfig::default()
    };
    fs::create_dir_all(dir.path().join("game")).unwrap();
    fs::write(dir.path().join("game").join("boom.wav"), [0u8; 16]).unwrap();

    let guest = DirectoryGuest::new(&config.root, &config.signal_file, &config.clipboard_file);
    let mut driver = PollingLoop::new(
        BinaryProtocol::new(config.working_dir.clone()),
        Engine::new(RecordingBackend::new()),
        guest,
    );
    assert_eq!(driver.tick(), TickOutcome::Idle);

    fs::write(dir.path().join("game").join("DS4QB.QBW"), load_snd(2, "BOOM.WAV")).unwrap();
    fs::write(dir.path().join(&config.signal_file), 1u16.to_le_bytes()).unwrap();
    assert_eq!(driver.tick(), TickOutcome::Dispatched);
    assert!(driver.engine().sounds().contains(2));
    assert!(matches!(
        driver.engine().backend().calls().first(),
        Some(BackendCall::LoadSample { len: 16, .. })
    ));
    assert_eq!(fs::read(dir.path().join(&config.signal_file)).unwrap(), vec![0, 0]);

    let mut query = (Opcode::GetMusicLength as u16).to_le_bytes().to_vec();
    query.extend_from_slice(&9u16.to_le_bytes());
    fs::write(dir.path().join("game").join("DS4QB.QBW"), query).unwrap();
    fs::write(dir.path().join(&config.signal_file), 1u16.to_le_bytes()).unwrap();
    assert_eq!(driver.tick(), TickOutcome::Dispatched);
    assert!(!dir.path().join("game").join("DS4QB.VCW").exists());
}

#[test]
fn clipboard_file_is_consumed_only_with_marker() {
    let dir = TempDir::new().unwrap();
    let clip = dir.path().join("DS4QB.CLP");
    let guest = DirectoryGuest::new(dir.path(), "DS4QB.SIG", "DS4QB.CLP");
    let mut driver = PollingLoop::new(ClipboardProtocol::new(), Engine::new(RecordingBackend::new()), guest);

    fs::write(&clip, b"just some text").unwrap();
    assert_eq!(driver.tick(), TickOutcome::Idle);
    assert!(clip.exists());

    fs::write(&clip, b"DS4QBREMOVESAMPLES|").unwrap();
    assert_eq!(driver.tick(), TickOutcome::Dispatched);
    assert!(!clip.exists());
}

#[test]
fn config_file_drives_guest_layout() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bridge.json");
    fs::write(
        &path,
        r#"{ "protocol": "token", "root": "/srv/dos", "working_dir": "GAME", "poll_interval_ms": 20 }"#,
    )
    .unwrap();

    let config = AdapterConfig::load(&path).unwrap();
    config.validate().unwrap();
    assert_eq!(config.interval(), std::time::Duration::from_millis(20));
    assert_eq!(config.signal_file, "DS4QB.SIG");
}
