mod common;

use std::time::Duration;

use attendance_kiosk::kiosk::{Flow, Kiosk, KioskCommand};
use attendance_kiosk::upload::VALIDATION_MESSAGE;
use attendance_kiosk::{NotificationKind, Settings};
use common::{harness, settings_for, Call, MockServer};

fn kiosk(settings: &Settings) -> (Kiosk, attendance_kiosk::Notifier) {
    let h = harness(settings);
    let notifier = h.notifier.clone();
    (Kiosk::new(h.uploader, h.triggers, h.notifier, settings.single_flight), notifier)
}

#[tokio::test]
async fn form_commands_fill_the_upload() {
    let server = MockServer::with_defaults().await;
    let (mut kiosk, notifier) = kiosk(&settings_for(&server.url));

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("bob.png");
    std::fs::write(&file, b"png").unwrap();

    assert_eq!(kiosk.handle(KioskCommand::File(file.clone())).await, Flow::Continue);
    assert_eq!(kiosk.handle(KioskCommand::Label("21CS007".to_string())).await, Flow::Continue);
    assert_eq!(kiosk.form().file.as_deref(), Some(file.as_path()));
    assert_eq!(kiosk.form().label, "21CS007");

    kiosk.handle(KioskCommand::Upload).await;
    kiosk.drain().await;

    let state = notifier.state();
    assert_eq!(state.message, "File uploaded successfully");
    assert_eq!(state.kind, NotificationKind::Success);

    let calls = server.calls();
    assert!(matches!(
        calls.as_slice(),
        [Call::Upload { file_name: Some(name), .. }] if name == "21CS007.png"
    ));
}

#[tokio::test]
async fn empty_upload_is_reported_locally() {
    let server = MockServer::with_defaults().await;
    let (mut kiosk, notifier) = kiosk(&settings_for(&server.url));

    kiosk.handle(KioskCommand::Upload).await;
    kiosk.drain().await;

    assert_eq!(notifier.state().message, VALIDATION_MESSAGE);
    assert!(server.calls().is_empty());
}

#[tokio::test]
async fn overlapping_triggers_are_allowed_by_default() {
    let server = MockServer::with_defaults().await;
    let (mut kiosk, _) = kiosk(&settings_for(&server.url));

    kiosk.handle(KioskCommand::Capture).await;
    kiosk.handle(KioskCommand::Capture).await;
    kiosk.drain().await;

    assert_eq!(server.calls().len(), 2);
}

#[tokio::test]
async fn single_flight_drops_repeated_clicks() {
    let server = MockServer::with_defaults().await;
    let settings = Settings {
        single_flight: true,
        ..settings_for(&server.url)
    };
    let (mut kiosk, _) = kiosk(&settings);

    // both handled before the first task gets to run
    kiosk.handle(KioskCommand::Capture).await;
    kiosk.handle(KioskCommand::Capture).await;
    kiosk.handle(KioskCommand::Shutdown).await;
    kiosk.drain().await;

    let calls = server.calls();
    assert_eq!(calls.iter().filter(|c| matches!(c, Call::Capture { .. })).count(), 1);
    assert_eq!(calls.iter().filter(|c| matches!(c, Call::Shutdown)).count(), 1);

    // released once the request finished
    kiosk.handle(KioskCommand::Capture).await;
    kiosk.drain().await;
    assert_eq!(server.calls().len(), 3);
}

#[tokio::test]
async fn scripted_session_runs_to_quit() {
    let server = MockServer::with_defaults().await;
    let (kiosk, notifier) = kiosk(&settings_for(&server.url));

    let script: &[u8] = b"\nlabel Alice\nbogus\ncapture\nquit\ncapture\n";
    tokio::time::timeout(Duration::from_secs(10), kiosk.run(script))
        .await
        .unwrap()
        .unwrap();

    // only the capture before quit went out
    assert_eq!(server.calls().len(), 1);
    assert_eq!(notifier.state().message, "Attendance marked for Alice");
}
