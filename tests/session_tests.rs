// Integration tests for the capture session state machine
//
// These drive CaptureSession against a scripted input provider and an
// in-memory remote, so no audio hardware or server is involved.

mod common;

use anyhow::Result;
use common::{MockRemote, Script, ScriptedProvider};
use meeting_recorder::audio::wav::HEADER_LEN;
use meeting_recorder::{
    CaptureError, CaptureSession, SessionConfig, SessionStatus, WavHeader,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

fn standup_script() -> Script {
    Script::steady(3.2, 16_000, 2, 0.25)
}

async fn session_with(
    provider: Arc<ScriptedProvider>,
    remote: Arc<MockRemote>,
) -> Result<CaptureSession> {
    let mut session = CaptureSession::new(provider, remote, SessionConfig::default());
    session.list_devices().await?;
    Ok(session)
}

#[tokio::test]
async fn test_list_devices_keeps_inputs_only() -> Result<()> {
    let provider = Arc::new(ScriptedProvider::new(standup_script()));
    let remote = Arc::new(MockRemote::new());
    let mut session = CaptureSession::new(provider.clone(), remote, SessionConfig::default());

    let devices = session.list_devices().await?.to_vec();

    let ids: Vec<&str> = devices.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["default", "mic-1"]);
    assert!(devices[0].is_default);

    // The permission request must not keep the device open
    assert_eq!(provider.opens(), 1);
    assert_eq!(provider.live_handles(), 0);

    Ok(())
}

#[tokio::test]
async fn test_list_devices_permission_denied() -> Result<()> {
    let provider = Arc::new(ScriptedProvider::new(standup_script()));
    provider.deny_permission();
    let mut session = CaptureSession::new(provider, Arc::new(MockRemote::new()), SessionConfig::default());

    let result = session.list_devices().await;

    assert!(matches!(result, Err(CaptureError::PermissionDenied(_))));
    assert!(session.devices().devices().is_empty());
    assert_eq!(session.status(), SessionStatus::Idle);

    Ok(())
}

#[tokio::test]
async fn test_select_unknown_device() -> Result<()> {
    let provider = Arc::new(ScriptedProvider::new(standup_script()));
    let mut session = session_with(provider, Arc::new(MockRemote::new())).await?;

    let result = session.select("speakers");

    assert!(matches!(result, Err(CaptureError::UnknownDevice(_))));
    assert!(session.devices().selected().is_none());

    Ok(())
}

#[tokio::test]
async fn test_start_without_selection() -> Result<()> {
    let provider = Arc::new(ScriptedProvider::new(standup_script()));
    let remote = Arc::new(MockRemote::new());
    let mut session = session_with(provider.clone(), remote.clone()).await?;

    let result = session.start(None).await;

    assert_eq!(result, Err(CaptureError::NoDeviceSelected));
    assert_eq!(session.status(), SessionStatus::Idle);
    assert_eq!(provider.opens(), 1);
    assert!(remote.calls().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_start_opens_device_once_then_starts_remote() -> Result<()> {
    let provider = Arc::new(ScriptedProvider::new(standup_script()));
    let remote = Arc::new(MockRemote::observing(provider.live_counter()));
    let mut session = session_with(provider.clone(), remote.clone()).await?;
    let opens_before = provider.opens();

    session.select("mic-1")?;
    session.start(Some("Standup".to_string())).await?;

    assert_eq!(session.status(), SessionStatus::Recording);
    assert_eq!(provider.opens() - opens_before, 1);
    assert_eq!(provider.live_handles(), 1);

    // Local capture was live before the server was asked to start
    assert_eq!(remote.live_at_start(), Some(1));
    assert_eq!(remote.calls(), vec!["start:Standup".to_string()]);

    let stats = session.stats();
    assert_eq!(stats.device_id.as_deref(), Some("mic-1"));
    assert_eq!(stats.title.as_deref(), Some("Standup"));
    assert_eq!(stats.remote_session_id.as_deref(), Some("meeting-42"));
    assert!(stats.started_at.is_some());
    assert!(stats.last_error.is_none());

    session.reset();
    assert_eq!(provider.live_handles(), 0);

    Ok(())
}

#[tokio::test]
async fn test_start_while_recording_is_rejected() -> Result<()> {
    let provider = Arc::new(ScriptedProvider::new(standup_script()));
    let remote = Arc::new(MockRemote::new());
    let mut session = session_with(provider.clone(), remote.clone()).await?;
    session.select("mic-1")?;
    session.start(None).await?;
    let opens = provider.opens();

    let result = session.start(None).await;

    assert_eq!(result, Err(CaptureError::SessionActive));
    assert_eq!(session.status(), SessionStatus::Recording);
    assert_eq!(provider.opens(), opens);
    assert_eq!(remote.calls().len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_stop_when_not_recording() -> Result<()> {
    let provider = Arc::new(ScriptedProvider::new(standup_script()));
    let remote = Arc::new(MockRemote::new());
    let mut session = session_with(provider, remote.clone()).await?;

    let result = session.stop().await;

    assert!(matches!(result, Err(CaptureError::NotRecording)));
    assert_eq!(session.status(), SessionStatus::Idle);
    assert!(remote.calls().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_stop_from_error_leaves_error_in_place() -> Result<()> {
    let provider = Arc::new(ScriptedProvider::new(standup_script()));
    let remote = Arc::new(MockRemote::new());
    remote.fail_start();
    let mut session = session_with(provider, remote).await?;
    session.select("mic-1")?;
    let _ = session.start(None).await;
    assert_eq!(session.status(), SessionStatus::Error);

    let result = session.stop().await;

    assert!(matches!(result, Err(CaptureError::NotRecording)));
    assert_eq!(session.status(), SessionStatus::Error);
    assert!(matches!(
        session.last_error(),
        Some(CaptureError::RemoteStartFailed(_))
    ));

    Ok(())
}

#[tokio::test]
async fn test_remote_start_failure_releases_device() -> Result<()> {
    let provider = Arc::new(ScriptedProvider::new(standup_script()));
    let remote = Arc::new(MockRemote::observing(provider.live_counter()));
    remote.fail_start();
    let mut session = session_with(provider.clone(), remote.clone()).await?;
    session.select("mic-1")?;

    let result = session.start(None).await;

    match result {
        Err(CaptureError::RemoteStartFailed(message)) => {
            assert!(message.contains("recorder busy"));
        }
        other => panic!("expected RemoteStartFailed, got {:?}", other),
    }
    assert_eq!(remote.live_at_start(), Some(1));
    assert_eq!(provider.live_handles(), 0);
    assert_eq!(session.status(), SessionStatus::Error);
    assert!(session.visualization_frame().is_none());

    Ok(())
}

#[tokio::test]
async fn test_permission_denied_on_start() -> Result<()> {
    let provider = Arc::new(ScriptedProvider::new(standup_script()));
    let remote = Arc::new(MockRemote::new());
    let mut session = session_with(provider.clone(), remote.clone()).await?;
    session.select("mic-1")?;
    provider.deny_permission();

    let result = session.start(None).await;

    assert!(matches!(result, Err(CaptureError::PermissionDenied(_))));
    assert_eq!(session.status(), SessionStatus::Error);
    assert_eq!(provider.live_handles(), 0);
    assert!(remote.calls().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_standup_capture_produces_exact_wav() -> Result<()> {
    let provider = Arc::new(ScriptedProvider::new(standup_script()));
    let remote = Arc::new(MockRemote::new());
    let mut session = session_with(provider.clone(), remote.clone()).await?;
    session.select("mic-1")?;
    session.start(Some("Standup".to_string())).await?;

    let outcome = session.stop().await?;

    assert_eq!(session.status(), SessionStatus::Completed);
    assert_eq!(provider.live_handles(), 0);
    assert_eq!(
        remote.calls(),
        vec!["start:Standup".to_string(), "stop".to_string()]
    );
    assert_eq!(outcome.audio_path.as_deref(), Some("recordings/meeting-42.wav"));
    assert!(outcome.remote_error.is_none());

    let recording = &outcome.recording;
    assert_eq!(recording.sample_rate, 16_000);
    assert_eq!(recording.channels, 2);
    assert_eq!(recording.frames, 51_200);
    assert!((recording.duration_seconds - 3.2).abs() < 1e-9);
    assert_eq!(recording.title.as_deref(), Some("Standup"));

    let header = WavHeader::parse(recording.wav_bytes()).expect("valid header");
    assert_eq!(header.channels, 2);
    assert_eq!(header.sample_rate, 16_000);
    assert_eq!(header.bits_per_sample, 16);
    assert_eq!(header.data_size, 51_200 * 2 * 2);
    assert_eq!(header.riff_size, 36 + header.data_size);
    assert_eq!(recording.len(), HEADER_LEN + header.data_size as usize);

    // 0.25 * 32767 truncated
    let first = i16::from_le_bytes([
        recording.wav_bytes()[HEADER_LEN],
        recording.wav_bytes()[HEADER_LEN + 1],
    ]);
    assert_eq!(first, 8191);

    let stats = session.stats();
    assert_eq!(stats.status, SessionStatus::Completed);
    assert_eq!(stats.segments_captured, 4);

    Ok(())
}

#[tokio::test]
async fn test_remote_stop_failure_keeps_recording() -> Result<()> {
    let provider = Arc::new(ScriptedProvider::new(standup_script()));
    let remote = Arc::new(MockRemote::new());
    remote.fail_stop();
    let mut session = session_with(provider.clone(), remote).await?;
    session.select("mic-1")?;
    session.start(None).await?;

    let outcome = session.stop().await?;

    assert!(matches!(
        outcome.remote_error,
        Some(CaptureError::RemoteStopFailed(_))
    ));
    assert!(outcome.audio_path.is_none());
    assert!(!outcome.recording.is_empty());
    assert_eq!(outcome.recording.frames, 51_200);
    assert_eq!(session.status(), SessionStatus::Error);
    assert_eq!(provider.live_handles(), 0);

    Ok(())
}

#[tokio::test]
async fn test_short_capture_is_flushed_on_stop() -> Result<()> {
    let provider = Arc::new(ScriptedProvider::new(Script::steady(0.25, 8_000, 1, -0.5)));
    let mut session = session_with(provider, Arc::new(MockRemote::new())).await?;
    session.select("default")?;
    session.start(None).await?;

    let outcome = session.stop().await?;

    assert_eq!(outcome.recording.frames, 2_000);
    assert_eq!(outcome.recording.channels, 1);
    let first = i16::from_le_bytes([
        outcome.recording.wav_bytes()[HEADER_LEN],
        outcome.recording.wav_bytes()[HEADER_LEN + 1],
    ]);
    assert_eq!(first, -16384);

    Ok(())
}

#[tokio::test]
async fn test_empty_capture_fails_encoding() -> Result<()> {
    let provider = Arc::new(ScriptedProvider::new(Script::steady(0.0, 16_000, 1, 0.0)));
    let mut session = session_with(provider.clone(), Arc::new(MockRemote::new())).await?;
    session.select("mic-1")?;
    session.start(None).await?;

    let result = session.stop().await;

    assert!(matches!(result, Err(CaptureError::EncodingFailed(_))));
    assert_eq!(session.status(), SessionStatus::Error);
    assert_eq!(provider.live_handles(), 0);

    Ok(())
}

#[tokio::test]
async fn test_visualization_only_while_recording() -> Result<()> {
    let provider = Arc::new(ScriptedProvider::new(standup_script()));
    let mut session = session_with(provider, Arc::new(MockRemote::new())).await?;
    assert!(session.visualization_frame().is_none());
    assert!(session.subscribe_visualization().is_none());

    session.select("mic-1")?;
    session.start(None).await?;

    let frame = session.visualization_frame().expect("recording").clone();
    assert_eq!(frame.len(), 1024);
    // 0.25 maps to 128 * 1.25
    assert!(frame.as_bytes().iter().all(|&b| b == 160));
    assert!((frame.peak() - 0.25).abs() < 1e-6);
    assert!(session.subscribe_visualization().is_some());

    session.stop().await?;
    assert!(session.visualization_frame().is_none());

    Ok(())
}

#[tokio::test]
async fn test_reset_is_idempotent() -> Result<()> {
    let provider = Arc::new(ScriptedProvider::new(standup_script()));
    let remote = Arc::new(MockRemote::new());
    let mut session = session_with(provider.clone(), remote.clone()).await?;
    session.select("mic-1")?;
    session.start(Some("Retro".to_string())).await?;

    session.reset();
    session.reset();

    assert_eq!(session.status(), SessionStatus::Idle);
    assert_eq!(provider.live_handles(), 0);
    // Reset never talks to the server
    assert_eq!(remote.calls(), vec!["start:Retro".to_string()]);

    let stats = session.stats();
    assert!(stats.device_id.is_none());
    assert!(stats.remote_session_id.is_none());
    assert_eq!(stats.elapsed_secs, 0.0);

    // Selection survives a reset
    session.start(None).await?;
    assert_eq!(session.status(), SessionStatus::Recording);

    Ok(())
}

#[tokio::test]
async fn test_dropping_session_releases_device() -> Result<()> {
    let provider = Arc::new(ScriptedProvider::new(standup_script()));
    let mut session = session_with(provider.clone(), Arc::new(MockRemote::new())).await?;
    session.select("mic-1")?;
    session.start(None).await?;
    assert_eq!(provider.live_handles(), 1);

    drop(session);

    assert_eq!(provider.live_handles(), 0);

    Ok(())
}

#[tokio::test]
async fn test_zero_flush_interval_is_rejected_before_opening() -> Result<()> {
    let provider = Arc::new(ScriptedProvider::new(standup_script()));
    let remote = Arc::new(MockRemote::new());
    let config = SessionConfig {
        flush_interval: Duration::ZERO,
        ..SessionConfig::default()
    };
    let mut session = CaptureSession::new(provider.clone(), remote.clone(), config);
    session.list_devices().await?;
    session.select("mic-1")?;
    let opens = provider.opens();

    let result = session.start(None).await;

    assert!(matches!(result, Err(CaptureError::InvalidConfig(_))));
    assert_eq!(session.status(), SessionStatus::Idle);
    assert_eq!(provider.opens(), opens);
    assert_eq!(provider.live_handles(), 0);
    assert!(remote.calls().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_failed_refresh_forgets_devices_and_selection() -> Result<()> {
    let provider = Arc::new(ScriptedProvider::new(standup_script()));
    let mut session = session_with(provider.clone(), Arc::new(MockRemote::new())).await?;
    session.select("mic-1")?;
    provider.deny_permission();

    let result = session.list_devices().await;

    assert!(matches!(result, Err(CaptureError::PermissionDenied(_))));
    assert!(session.devices().devices().is_empty());
    assert!(session.devices().selected().is_none());
    assert!(matches!(
        session.start(None).await,
        Err(CaptureError::NoDeviceSelected)
    ));
    assert_eq!(session.status(), SessionStatus::Idle);

    Ok(())
}

#[tokio::test]
async fn test_cancelled_start_releases_device() -> Result<()> {
    let provider = Arc::new(ScriptedProvider::new(standup_script()));
    let remote = Arc::new(MockRemote::new());
    remote.hang_start(true);
    let mut session = session_with(provider.clone(), remote.clone()).await?;
    session.select("mic-1")?;

    let result = timeout(Duration::from_millis(50), session.start(None)).await;

    assert!(result.is_err(), "start should still be waiting on the server");
    assert_eq!(provider.live_handles(), 0);
    assert_eq!(session.status(), SessionStatus::RequestingDevice);

    session.reset();
    assert_eq!(session.status(), SessionStatus::Idle);

    remote.hang_start(false);
    session.start(Some("Retry".to_string())).await?;
    assert_eq!(session.status(), SessionStatus::Recording);
    assert_eq!(provider.live_handles(), 1);
    assert_eq!(
        remote.calls(),
        vec!["start:".to_string(), "start:Retry".to_string()]
    );

    Ok(())
}

#[tokio::test]
async fn test_cancelled_stop_releases_device() -> Result<()> {
    let provider = Arc::new(ScriptedProvider::new(standup_script()));
    let remote = Arc::new(MockRemote::new());
    remote.hang_stop(true);
    let mut session = session_with(provider.clone(), remote.clone()).await?;
    session.select("mic-1")?;
    session.start(None).await?;

    let result = timeout(Duration::from_millis(50), session.stop()).await;

    assert!(result.is_err(), "stop should still be waiting on the server");
    assert_eq!(provider.live_handles(), 0);
    assert_eq!(session.status(), SessionStatus::Finalizing);
    assert_eq!(session.stats().segments_captured, 4);

    session.reset();
    assert_eq!(session.status(), SessionStatus::Idle);

    remote.hang_stop(false);
    session.start(None).await?;
    assert_eq!(session.status(), SessionStatus::Recording);
    let outcome = session.stop().await?;
    assert_eq!(outcome.recording.frames, 51_200);
    assert_eq!(session.status(), SessionStatus::Completed);

    Ok(())
}

#[tokio::test]
async fn test_stopping_reports_buffered_segments() -> Result<()> {
    let provider = Arc::new(ScriptedProvider::new(standup_script()));
    provider.hold_final_flush(true);
    let remote = Arc::new(MockRemote::new());
    let mut session = session_with(provider.clone(), remote.clone()).await?;
    session.select("mic-1")?;
    session.start(Some("Sync".to_string())).await?;

    // Let the collector drain the three 1s ticks
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(session.stats().segments_captured, 3);

    let result = timeout(Duration::from_millis(50), session.stop()).await;

    assert!(result.is_err(), "stop should still be waiting on the final flush");
    let stats = session.stats();
    assert_eq!(stats.status, SessionStatus::Stopping);
    assert_eq!(stats.segments_captured, 3);
    assert_eq!(stats.title.as_deref(), Some("Sync"));
    assert_eq!(stats.remote_session_id.as_deref(), Some("meeting-42"));
    assert_eq!(provider.live_handles(), 0);
    // The remote stop is only sent after the final flush
    assert_eq!(remote.calls(), vec!["start:Sync".to_string()]);

    session.reset();
    assert_eq!(session.status(), SessionStatus::Idle);

    Ok(())
}
