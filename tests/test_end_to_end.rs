//! Integration tests exercising the façade against synthetic, in-memory
//! `.osr`-shaped replays rather than real downloaded fixtures (none ship in
//! this crate's pack, and the façade's analysis engines don't care where
//! the bytes came from).

#![cfg(feature = "api")]

use circleguard::beatmap::Beatmap;
use circleguard::circleguard::{order, replay_pairs, KeylessCircleguard};
use circleguard::hitobject::Hitobject;
use circleguard::loadable::ReplayString;
use circleguard::loadable::ReplayLoadable;
use circleguard::math::Point;
use circleguard::mods::Mods;
use circleguard::replay::lzma_compress;
use circleguard::similarity::{Method, ModsUnknown};

fn write_uleb128_string(out: &mut Vec<u8>, s: &str) {
    if s.is_empty() {
        out.push(0x00);
        return;
    }
    out.push(0x0b);
    let mut len = s.len() as u64;
    loop {
        let mut byte = (len & 0b0111_1111) as u8;
        len >>= 7;
        if len != 0 {
            byte |= 0b1000_0000;
        }
        out.push(byte);
        if len == 0 {
            break;
        }
    }
    out.extend_from_slice(s.as_bytes());
}

/// Builds a minimal but well-formed `.osr` byte stream around a raw
/// action-data string, the same shape `parse_osr` expects.
fn osr_bytes(action_data: &[u8], username: &str, timestamp: u64) -> Vec<u8> {
    let compressed = lzma_compress(action_data).unwrap();

    let mut bytes = Vec::new();
    bytes.push(0u8); // mode: std
    bytes.extend_from_slice(&20210101u32.to_le_bytes());
    write_uleb128_string(&mut bytes, "hash");
    write_uleb128_string(&mut bytes, username);
    write_uleb128_string(&mut bytes, "replayhash");
    for _ in 0..6 {
        bytes.extend_from_slice(&0u16.to_le_bytes());
    }
    bytes.extend_from_slice(&0u32.to_le_bytes()); // score
    bytes.extend_from_slice(&0u16.to_le_bytes()); // max combo
    bytes.push(1); // perfect
    bytes.extend_from_slice(&Mods::NONE.bits().to_le_bytes());
    write_uleb128_string(&mut bytes, ""); // life bar graph
    bytes.extend_from_slice(&timestamp.to_le_bytes());
    bytes.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&compressed);
    bytes.extend_from_slice(&12345u64.to_le_bytes()); // replay id
    bytes
}

fn wandering_action_data(n: usize) -> String {
    let mut out = String::from("0|0|0|0");
    for i in 1..n {
        let x = 256.0 + 50.0 * (i as f64 * 0.2).sin();
        let y = 192.0 + 50.0 * (i as f64 * 0.2).cos();
        out.push_str(&format!(",16|{:.4}|{:.4}|1", x, y));
    }
    out
}

#[tokio::test]
async fn identical_replays_are_perfectly_similar_end_to_end() {
    let kcg = KeylessCircleguard::in_memory().unwrap();
    let action_data = wandering_action_data(40);

    let mut r1 = ReplayLoadable::String(ReplayString::new(
        osr_bytes(action_data.as_bytes(), "player1", 1000),
        None,
    ));
    let mut r2 = ReplayLoadable::String(ReplayString::new(
        osr_bytes(action_data.as_bytes(), "player2", 2000),
        None,
    ));

    let result = kcg
        .similarity(&mut r1, &mut r2, Method::Similarity, 5, ModsUnknown::Best)
        .await
        .unwrap();
    assert!(result.value().abs() < 1e-6);
}

#[tokio::test]
async fn frametime_over_a_loaded_synthetic_replay_is_the_frame_interval() {
    let kcg = KeylessCircleguard::in_memory().unwrap();
    let action_data = wandering_action_data(20);
    let mut r = ReplayLoadable::String(ReplayString::new(
        osr_bytes(action_data.as_bytes(), "player1", 1000),
        None,
    ));
    let ft = kcg.frametime(&mut r).await.unwrap();
    assert!((ft - 16.0).abs() < 1e-6);
}

#[tokio::test]
async fn judgments_end_to_end_against_a_synthetic_beatmap() {
    let kcg = KeylessCircleguard::in_memory().unwrap();
    // A single circle at t=16 that the second frame (t=16) clicks dead on.
    let action_data = "0|0|0|0,16|256|192|1,16|256|192|1";
    let mut r = ReplayLoadable::String(ReplayString::new(
        osr_bytes(action_data.as_bytes(), "player1", 1000),
        None,
    ));

    let beatmap = Beatmap {
        cs: 4.0,
        ar: 9.0,
        od: 5.0,
        hp: 5.0,
        hit_objects: vec![Hitobject::Circle {
            t: 16,
            xy: Point::new(256.0, 192.0),
            radius: 30.0,
        }],
    };

    let judgments = kcg.judgments(&mut r, &beatmap).await.unwrap();
    assert_eq!(judgments.len(), 1);
}

#[test]
fn order_and_replay_pairs_compose_over_timestamped_replays() {
    use circleguard::game_version::GameVersion;
    use circleguard::replay::Replay;
    use circleguard::weight::RatelimitWeight;

    fn stub(timestamp: u64) -> Replay {
        Replay {
            timestamp: Some(timestamp),
            beatmap_id: None,
            user_id: None,
            username: None,
            mods: None,
            replay_id: None,
            weight: RatelimitWeight::None,
            game_version: GameVersion::Unknown,
            t: Vec::new(),
            xy: Vec::new(),
            k: Vec::new(),
        }
    }

    let replays = vec![stub(300), stub(100), stub(200)];
    let pairs = replay_pairs(&replays, None);
    assert_eq!(pairs.len(), 3);
    for (a, b) in pairs {
        let (earlier, later) = order(a, b).unwrap();
        assert!(earlier.timestamp <= later.timestamp);
    }
}
