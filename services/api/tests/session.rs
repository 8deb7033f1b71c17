//! End-to-end voice session tests over a real WebSocket connection

use approx::assert_abs_diff_eq;
use futures_util::SinkExt;
use std::time::Duration;
use tokio_tungstenite::tungstenite::protocol::Message;

mod common;
use common::{Recognition, Speech, TestServer, ask};

#[tokio::test]
async fn test_recognized_reminder_is_confirmed() {
    let server = TestServer::start(
        Recognition::Heard("remind alice to call at 5pm", 0.9),
        true,
        None,
    )
    .await;
    let mut client = server.connect().await;

    let answer = ask(&mut client, &[b"\x01\x00\x02\x00", b"\x03\x00"]).await;
    let envelope = answer.envelope();

    assert_eq!(envelope["status"], 0);
    assert_eq!(envelope["message"], "OK, I will remind Alice to call at 5pm.");
    assert_eq!(envelope["command"], "remind alice to call at 5pm");
    assert_abs_diff_eq!(envelope["confidence"].as_f64().unwrap(), 0.9, epsilon = 1e-6);
    assert_eq!(answer.audio.len(), 2);
    assert_eq!(&answer.audio[0][..], b"RIFF");

    assert_eq!(*server.tokens.lock().unwrap(), ["tok"]);
    let requests = server.synthesized.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].text,
        "<express-as type=\"\">OK, I will remind Alice to call at 5pm.</express-as>"
    );
    assert_eq!(requests[0].accept, "audio/wav");
}

#[tokio::test]
async fn test_logs_match_what_was_exchanged() {
    let server = TestServer::start(
        Recognition::Heard("remind alice to call at 5pm", 0.9),
        true,
        None,
    )
    .await;
    let mut client = server.connect().await;

    let answer = ask(&mut client, &[b"\x01\x00\x02\x00", b"\x03\x00"]).await;

    let raw = server.logs("raw");
    let json = server.logs("json");
    assert_eq!(raw.len(), 1);
    assert_eq!(json.len(), 1);
    assert_eq!(raw[0].file_stem(), json[0].file_stem());
    let log_id = raw[0].file_stem().unwrap().to_string_lossy().into_owned();
    assert_eq!(log_id.len(), 10);
    assert!(log_id.chars().all(|c| c.is_ascii_alphanumeric()));

    let expected_audio = b"\x01\x00\x02\x00\x03\x00".to_vec();
    assert_eq!(std::fs::read(&raw[0]).unwrap(), expected_audio);
    assert_eq!(*server.received_audio.lock().unwrap(), expected_audio);
    assert_eq!(std::fs::read_to_string(&json[0]).unwrap(), answer.json);
}

#[tokio::test]
async fn test_recognition_failure_answers_with_unknown_command() {
    let server = TestServer::start(Recognition::Unavailable, true, None).await;
    let mut client = server.connect().await;

    let answer = ask(&mut client, &[b"\x00\x00"]).await;

    assert_eq!(
        answer.json,
        r#"{"status":100,"message":"Sorry, the service is not available at the moment.","command":"<unknown>","confidence":0.0}"#
    );
    assert!(server.tokens.lock().unwrap().is_empty());
    let requests = server.synthesized.lock().unwrap();
    assert_eq!(
        requests[0].text,
        "<express-as type=\"Apology\">Sorry, the service is not available at the moment.</express-as>"
    );
}

#[tokio::test]
async fn test_unparseable_command_is_reported() {
    let server = TestServer::start(Recognition::Heard("asdf qwerty", 0.4), true, None).await;
    let mut client = server.connect().await;

    let envelope = ask(&mut client, &[b"\x00\x00"]).await.envelope();

    assert_eq!(envelope["status"], 1);
    assert_eq!(envelope["message"], "I did not understand that. Can you repeat?");
    assert_eq!(envelope["command"], "asdf qwerty");
    assert_abs_diff_eq!(envelope["confidence"].as_f64().unwrap(), 0.4, epsilon = 1e-6);
    assert!(server.tokens.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_save_failure_is_reported() {
    let server = TestServer::start(
        Recognition::Heard("remind alice to call at 5pm", 0.9),
        false,
        None,
    )
    .await;
    let mut client = server.connect().await;

    let envelope = ask(&mut client, &[b"\x00\x00"]).await.envelope();

    assert_eq!(envelope["status"], 3);
    assert_eq!(envelope["message"], "Sorry, I was not able to save this reminder.");
    assert_eq!(envelope["command"], "remind alice to call at 5pm");
}

#[tokio::test]
async fn test_annotations_are_removed_from_command() {
    let server = TestServer::start(
        Recognition::Heard("remind alice to [COUGH]call at 5pm", 0.8),
        true,
        None,
    )
    .await;
    let mut client = server.connect().await;

    let envelope = ask(&mut client, &[b"\x00\x00"]).await.envelope();

    assert_eq!(envelope["status"], 0);
    assert_eq!(envelope["command"], "remind alice to call at 5pm");
}

#[tokio::test]
async fn test_stalled_recognition_times_out() {
    let server = TestServer::start(Recognition::Hang, true, Some(Duration::from_millis(200))).await;
    let mut client = server.connect().await;

    let envelope = ask(&mut client, &[b"\x00\x00"]).await.envelope();

    assert_eq!(envelope["status"], 100);
    assert_eq!(envelope["command"], "<unknown>");
}

#[tokio::test]
async fn test_frames_other_than_audio_are_ignored() {
    let server = TestServer::start(
        Recognition::Heard("remind alice to call at 5pm", 0.9),
        true,
        None,
    )
    .await;
    let mut client = server.connect().await;

    client.send(Message::text("hello")).await.unwrap();
    client.send(Message::Ping(vec![1].into())).await.unwrap();
    let envelope = ask(&mut client, &[b"\x05\x00"]).await.envelope();

    assert_eq!(envelope["status"], 0);
    assert_eq!(*server.received_audio.lock().unwrap(), b"\x05\x00");
}

#[tokio::test]
async fn test_disconnect_before_end_of_stream_gets_no_answer() {
    let server = TestServer::start(
        Recognition::Heard("remind alice to call at 5pm", 0.9),
        true,
        None,
    )
    .await;
    let mut client = server.connect().await;

    client.send(Message::binary(&b"\x01\x00"[..])).await.unwrap();
    client.close(None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(server.logs("json").is_empty());
    assert!(server.tokens.lock().unwrap().is_empty());
    assert!(server.synthesized.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_probes_respond() {
    let server = TestServer::start(Recognition::Unavailable, true, None).await;
    let base = format!("http://{}", server.addr);

    let ready = reqwest::get(format!("{base}/")).await.unwrap();
    assert!(ready.status().is_success());
    let body: serde_json::Value = ready.json().await.unwrap();
    assert_eq!(body, serde_json::json!({ "status": "approved" }));

    let alive = reqwest::get(format!("{base}/health")).await.unwrap();
    assert_eq!(alive.text().await.unwrap(), "I am alive!");
}

#[tokio::test]
async fn test_synthesis_failure_still_delivers_envelope() {
    let server = TestServer::start_with(
        Recognition::Heard("remind alice to call at 5pm", 0.9),
        true,
        None,
        Speech::Unavailable,
    )
    .await;
    let mut client = server.connect().await;

    let answer = ask(&mut client, &[b"\x00\x00"]).await;

    assert_eq!(answer.envelope()["status"], 0);
    assert!(answer.audio.is_empty());
    let json = server.logs("json");
    assert_eq!(json.len(), 1);
    assert_eq!(std::fs::read_to_string(&json[0]).unwrap(), answer.json);
}

#[tokio::test]
async fn test_broken_speech_stream_ends_the_answer() {
    let server = TestServer::start_with(
        Recognition::Heard("remind alice to call at 5pm", 0.9),
        true,
        None,
        Speech::BreaksOff,
    )
    .await;
    let mut client = server.connect().await;

    let answer = ask(&mut client, &[b"\x00\x00"]).await;

    assert_eq!(answer.envelope()["status"], 0);
    assert_eq!(answer.audio.len(), 1);
    assert_eq!(&answer.audio[0][..], b"RIFF");
    let json = server.logs("json");
    assert_eq!(std::fs::read_to_string(&json[0]).unwrap(), answer.json);
}

#[tokio::test]
async fn test_disconnect_while_recognizing_abandons_the_session() {
    let server = TestServer::start(Recognition::Hang, true, None).await;
    let mut client = server.connect().await;

    client.send(Message::binary(&b"\x01\x00"[..])).await.unwrap();
    client.send(Message::text("EOS")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    client.close(None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(*server.received_audio.lock().unwrap(), b"\x01\x00");
    assert!(server.logs("json").is_empty());
    assert!(server.tokens.lock().unwrap().is_empty());
    assert!(server.synthesized.lock().unwrap().is_empty());
}
