use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use parking_lot::Mutex;

use vidplay::media_types::{StreamType, VideoFrame};
use vidplay::{
    DeviceError, NullOutput, OverflowPolicy, PlaybackState, Player, PlayerConfig, PlayerError,
    SyntheticBackend, SyntheticMedia,
};

type Presented = Arc<Mutex<Vec<Duration>>>;

fn player_with(media: SyntheticMedia, config: PlayerConfig) -> Player {
    let player = Player::new(SyntheticBackend::new(media), NullOutput, config).unwrap();
    player.set_data_source("clip.mp4");
    player
}

fn player(media: SyntheticMedia) -> Player {
    player_with(media, PlayerConfig::default().with_audio_buffer_ms(20))
}

/**
    Attach a surface that records the timestamp of every presented frame.
*/
fn record(player: &Player) -> Presented {
    let presented = Presented::default();
    let sink = Arc::clone(&presented);
    player.attach_surface(move |frame: &VideoFrame| -> Result<(), DeviceError> {
        if let Some(ts) = frame.presentation_time() {
            sink.lock().push(ts);
        }
        Ok(())
    });
    presented
}

fn assert_strictly_increasing(timestamps: &[Duration]) {
    for pair in timestamps.windows(2) {
        assert!(pair[0] < pair[1], "{:?} presented after {:?}", pair[1], pair[0]);
    }
}

#[test]
fn presents_every_frame_once_in_order() {
    let player = player(SyntheticMedia::new(Duration::from_secs(2)));
    let presented = record(&player);

    player.start().unwrap();
    assert!(player.wait_for_end(Duration::from_secs(6)));
    assert_eq!(player.last_error(), None);

    let presented = presented.lock();
    assert_eq!(presented.first(), Some(&Duration::ZERO));
    assert_strictly_increasing(&presented);

    let stats = player.stats();
    assert_eq!(stats.frames_presented as usize, presented.len());
    assert_eq!(stats.frames_presented + stats.frames_dropped, 50);
    assert_eq!(stats.last_video_pts, presented.last().copied());
}

#[test]
fn seek_to_zero_reproduces_the_first_frame() {
    let player = player(SyntheticMedia::new(Duration::from_secs(10)));
    let presented = record(&player);

    player.start().unwrap();
    sleep(Duration::from_millis(500));
    player.seek(0.0).unwrap();
    sleep(Duration::from_millis(300));

    let presented = presented.lock();
    let restart = presented
        .iter()
        .rposition(|&ts| ts == Duration::ZERO)
        .unwrap();
    assert!(restart > 0, "playback never restarted from the first frame");
    assert_strictly_increasing(&presented[..restart]);
    assert_strictly_increasing(&presented[restart..]);
}

#[test]
fn nothing_from_before_a_seek_is_presented_after_it() {
    let player = player(SyntheticMedia::new(Duration::from_secs(10)).with_video(32, 18, 25, 50));
    let presented = record(&player);

    player.start().unwrap();
    sleep(Duration::from_millis(300));

    // Keyframes every two seconds: decoding restarts at 4.0s for a 5.1s target
    let target = Duration::from_millis(5100);
    player.seek_to(target).unwrap();
    sleep(Duration::from_millis(400));

    let presented = presented.lock();
    let jump = presented.iter().position(|&ts| ts >= target).unwrap();
    assert!(presented[..jump].iter().all(|&ts| ts < Duration::from_secs(1)));
    assert!(presented[jump..].iter().all(|&ts| ts >= target), "{presented:?}");
    assert!(presented[jump] < Duration::from_millis(5200));
    assert_strictly_increasing(&presented[jump..]);
}

#[test]
fn small_queues_apply_backpressure_without_losing_frames() {
    let config = PlayerConfig::default()
        .with_audio_buffer_ms(20)
        .with_packet_capacity(4, 8)
        .with_frame_capacity(2, 2);
    let player = player_with(SyntheticMedia::new(Duration::from_secs(2)), config);
    let presented = record(&player);

    player.start().unwrap();
    assert!(player.wait_for_end(Duration::from_secs(6)));

    let stats = player.stats();
    assert_eq!(stats.frames_overflowed, 0);
    assert_eq!(stats.frames_presented + stats.frames_dropped, 50);
    assert_strictly_increasing(&presented.lock());
}

#[test]
fn drop_oldest_policy_never_duplicates() {
    let config = PlayerConfig::default()
        .with_audio_buffer_ms(20)
        .with_frame_capacity(2, 8)
        .with_video_overflow(OverflowPolicy::DropOldest);
    let player = player_with(SyntheticMedia::new(Duration::from_secs(2)), config);
    let presented = record(&player);

    player.start().unwrap();
    assert!(player.wait_for_end(Duration::from_secs(6)));

    let stats = player.stats();
    assert_eq!(stats.frames_presented + stats.frames_dropped + stats.frames_overflowed, 50);
    assert_strictly_increasing(&presented.lock());
}

#[test]
fn isolated_decode_errors_are_skipped() {
    let media = SyntheticMedia::new(Duration::from_secs(2))
        .with_corrupt_packets(StreamType::Video, [10, 30])
        .with_corrupt_packets(StreamType::Audio, [5]);
    let player = player(media);
    let presented = record(&player);

    player.start().unwrap();
    assert!(player.wait_for_end(Duration::from_secs(6)));
    assert_eq!(player.state(), PlaybackState::End);
    assert_eq!(player.last_error(), None);

    let stats = player.stats();
    assert_eq!(stats.decode_errors, 3);
    assert_eq!(stats.frames_presented + stats.frames_dropped, 48);

    let presented = presented.lock();
    assert!(!presented.contains(&Duration::from_millis(400)));
    assert!(!presented.contains(&Duration::from_millis(1200)));
}

#[test]
fn sustained_decode_errors_end_the_session() {
    let media = SyntheticMedia::new(Duration::from_secs(4))
        .with_corrupt_packets(StreamType::Video, 20..40);
    let player = player(media);

    player.start().unwrap();
    assert!(player.wait_for_end(Duration::from_secs(5)));
    assert_eq!(player.state(), PlaybackState::End);
    assert!(matches!(
        player.last_error(),
        Some(PlayerError::Decode {
            stream: StreamType::Video,
            ..
        })
    ));
    assert!(player.stats().decode_errors > 8);
}

#[test]
fn plays_video_only_media_on_the_wall_clock() {
    let player = player(SyntheticMedia::new(Duration::from_secs(1)).without_audio());
    let presented = record(&player);

    player.start().unwrap();
    assert!(!player.media_info().unwrap().has_audio());
    assert!(player.wait_for_end(Duration::from_secs(4)));
    assert_eq!(player.last_error(), None);

    let stats = player.stats();
    assert_eq!(stats.audio_frames_played, 0);
    assert!(stats.frames_presented >= 20);
    assert_strictly_increasing(&presented.lock());
}

#[test]
fn plays_audio_only_media() {
    let player = player(SyntheticMedia::new(Duration::from_secs(1)).without_video());

    player.start().unwrap();
    assert!(!player.media_info().unwrap().has_video());
    sleep(Duration::from_millis(400));
    assert!(player.position() >= Duration::from_millis(250));
    assert!(player.wait_for_end(Duration::from_secs(4)));
    assert_eq!(player.last_error(), None);

    let stats = player.stats();
    assert_eq!(stats.frames_presented, 0);
    assert!(stats.audio_frames_played >= 40);
}

#[test]
fn frames_are_consumed_without_a_surface() {
    let player = player(SyntheticMedia::new(Duration::from_secs(1)));
    let presented = record(&player);
    assert!(player.detach_surface().is_some());

    player.start().unwrap();
    assert!(player.wait_for_end(Duration::from_secs(4)));
    assert!(presented.lock().is_empty());
    assert!(player.stats().frames_presented > 0);
}

#[test]
fn failing_surface_is_detached_and_playback_continues() {
    let player = player(SyntheticMedia::new(Duration::from_secs(1)));
    player.attach_surface(|_: &VideoFrame| -> Result<(), DeviceError> {
        Err(DeviceError::Surface("window closed".into()))
    });

    player.start().unwrap();
    assert!(player.wait_for_end(Duration::from_secs(4)));
    assert_eq!(player.last_error(), None);
    assert!(player.detach_surface().is_none());
}

#[test]
fn pause_stops_presentation() {
    let player = player(SyntheticMedia::new(Duration::from_secs(10)));
    let presented = record(&player);

    player.start().unwrap();
    sleep(Duration::from_millis(300));
    player.pause(true);
    sleep(Duration::from_millis(50));

    let count = presented.lock().len();
    sleep(Duration::from_millis(300));
    assert_eq!(presented.lock().len(), count);

    player.pause(false);
    sleep(Duration::from_millis(300));
    assert!(presented.lock().len() > count);
}
