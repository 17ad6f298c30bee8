//! A saved configuration file driving a stream on the simulated controller

use grbllink_communication::{prepare_program, LinkCommand, LinkHandle, VirtualPort};
use grbllink_core::{LinkEvent, RunState};
use grbllink_settings::LinkConfig;
use std::time::Duration;
use tempfile::tempdir;
use tokio::sync::broadcast;
use tokio::time::timeout;

async fn wait_for(
    rx: &mut broadcast::Receiver<LinkEvent>,
    pred: impl Fn(&LinkEvent) -> bool,
) -> LinkEvent {
    timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

#[tokio::test]
async fn test_saved_config_drives_a_stream() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("link.toml");

    let mut config = LinkConfig::default();
    config.connection.port = "sim".to_string();
    config.connection.settle_delay_ms = 0;
    config.save_to_file(&path).unwrap();
    let config = LinkConfig::load_from_file(&path).unwrap();

    let port = VirtualPort::simulated();
    let handle = LinkHandle::open(Box::new(port.clone()), config);
    let mut events = handle.subscribe();
    handle.send(LinkCommand::Connect).await.unwrap();
    wait_for(&mut events, |e| matches!(e, LinkEvent::Connected { .. })).await;

    let program = prepare_program("G21\nG90\nG0 X5 Y5\nG2 X15 Y5 R5 F400\n");
    handle
        .send(LinkCommand::RunProgram {
            lines: program,
            step_mode: false,
        })
        .await
        .unwrap();

    let done = wait_for(&mut events, |e| e.ends_stream()).await;
    assert_eq!(done, LinkEvent::StreamCompleted { lines: 4 });

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.state, RunState::Idle);
    // Radius arcs go out in center form.
    assert!(port
        .sent_lines()
        .iter()
        .any(|line| line.starts_with("G2 X15 Y5") && line.contains('I')));

    handle.shutdown().await.unwrap();
}
