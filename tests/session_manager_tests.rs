//! Session lifecycle tests against in-memory upstream services.

mod mock_services;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use gusto_gateway::core::call::{
    CallMetadata, ReplyDelivery, SessionManager, TransportEvent, TransportRoute,
};
use gusto_gateway::core::codec::encode_media_payload;
use gusto_gateway::core::llm::ChatRole;
use gusto_gateway::core::stt::{STTConfig, STTError, STTResult};
use gusto_gateway::core::tts::{AudioArtifactStore, AudioFormat};
use mock_services::*;
use tempfile::TempDir;
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(2);

struct Harness {
    manager: SessionManager,
    stt: Arc<FakeSTTConnector>,
    model: Arc<FakeChatModel>,
    tts: Arc<RecordingSynthesizer>,
    announcer: Arc<RecordingAnnouncer>,
    leads: Arc<RecordingLeadSink>,
    audio_dir: TempDir,
}

impl Harness {
    fn new(model: Arc<FakeChatModel>) -> Self {
        Self::announcing(model, RecordingSynthesizer::new())
    }

    fn announcing(model: Arc<FakeChatModel>, tts: Arc<RecordingSynthesizer>) -> Self {
        let announcer = RecordingAnnouncer::new();
        let delivery = ReplyDelivery::announce(announcer.clone(), "Polly.Joanna");
        Self::with_delivery(model, tts, delivery, announcer)
    }

    fn streaming(model: Arc<FakeChatModel>) -> Self {
        Self::with_delivery(
            model,
            RecordingSynthesizer::new(),
            ReplyDelivery::stream(),
            RecordingAnnouncer::new(),
        )
    }

    fn with_delivery(
        model: Arc<FakeChatModel>,
        tts: Arc<RecordingSynthesizer>,
        delivery: ReplyDelivery,
        announcer: Arc<RecordingAnnouncer>,
    ) -> Self {
        let stt = FakeSTTConnector::new();
        let leads = RecordingLeadSink::new();
        let audio_dir = TempDir::new().unwrap();

        let manager = SessionManager::builder(
            stt.clone(),
            STTConfig::default(),
            model.generator(),
            tts.clone(),
        )
        .delivery(delivery)
        .artifacts(AudioArtifactStore::new(audio_dir.path()))
        .lead_sink(leads.clone())
        .build();

        Self {
            manager,
            stt,
            model,
            tts,
            announcer,
            leads,
            audio_dir,
        }
    }

    async fn connect(&self) -> (String, mpsc::Receiver<TransportRoute>) {
        let (tx, rx) = mpsc::channel(256);
        let id = self.manager.on_connect(tx).await.unwrap();
        (id, rx)
    }

    async fn start(&self, id: &str, call_sid: &str, from: Option<&str>) {
        let mut parameters = HashMap::new();
        if let Some(from) = from {
            parameters.insert("from".to_string(), from.to_string());
        }
        let call = CallMetadata {
            call_sid: call_sid.to_string(),
            stream_sid: format!("MZ-{call_sid}"),
            parameters,
        };
        self.manager
            .on_transport_event(id, TransportEvent::Start(call))
            .await;
    }
}

fn silence_frame() -> String {
    encode_media_payload(&[0xFF; 160])
}

#[tokio::test]
async fn test_connect_registers_session() {
    let h = Harness::new(FakeChatModel::new());
    let (id, _rx) = h.connect().await;

    assert!(h.manager.is_active(&id));
    assert_eq!(h.manager.session_count(), 1);
    assert_eq!(h.stt.stream_count(), 1);
    assert!(h.stt.latest().is_connected());

    let conversation = h.manager.conversation(&id).unwrap();
    assert_eq!(conversation.history_len(), 0);
    assert!(!conversation.is_generating());
}

#[tokio::test]
async fn test_connect_failure_registers_nothing() {
    let h = Harness::new(FakeChatModel::new());
    h.stt.refuse_connections();

    let (tx, _rx) = mpsc::channel(8);
    let result = h.manager.on_connect(tx).await;

    assert!(result.is_err());
    assert_eq!(h.manager.session_count(), 0);
}

#[tokio::test]
async fn test_media_frames_forwarded_in_order() {
    let h = Harness::new(FakeChatModel::new());
    let (id, _rx) = h.connect().await;

    for byte in [0x01u8, 0x02, 0x03] {
        h.manager
            .on_transport_event(&id, TransportEvent::Media(encode_media_payload(&[byte; 160])))
            .await;
    }

    let frames = h.stt.latest().audio_frames();
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0][0], 0x01);
    assert_eq!(frames[2][0], 0x03);
    assert_eq!(frames[1].len(), 160);
}

#[tokio::test]
async fn test_malformed_media_dropped_session_survives() {
    let h = Harness::new(FakeChatModel::new());
    let (id, _rx) = h.connect().await;

    h.manager
        .on_transport_event(&id, TransportEvent::Media("not*base64!".to_string()))
        .await;
    h.manager
        .on_transport_event(&id, TransportEvent::Media(String::new()))
        .await;

    assert!(h.manager.is_active(&id));
    assert!(h.stt.latest().audio_frames().is_empty());

    h.manager
        .on_transport_event(&id, TransportEvent::Media(silence_frame()))
        .await;
    assert_eq!(h.stt.latest().audio_frames().len(), 1);
}

#[tokio::test]
async fn test_full_turn_announces_reply() {
    let h = Harness::new(FakeChatModel::new());
    let (id, _rx) = h.connect().await;
    h.start(&id, "CA100", None).await;

    h.stt.latest().emit_final("I need a shower door").await;

    let announcer = h.announcer.clone();
    assert!(wait_for(WAIT, || announcer.announcements().len() == 1).await);

    let (call_sid, twiml) = h.announcer.announcements().remove(0);
    assert_eq!(call_sid.as_deref(), Some("CA100"));
    assert!(twiml.contains(r#"<Say voice="Polly.Joanna">Reply to: I need a shower door</Say>"#));
    assert!(twiml.contains(r#"<Pause length="30"/>"#));

    let history = h.manager.conversation(&id).unwrap().history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, ChatRole::User);
    assert_eq!(history[0].content, "I need a shower door");
    assert_eq!(history[1].role, ChatRole::Assistant);
    assert_eq!(history[1].content, "Reply to: I need a shower door");

    let calls = h.tts.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "Reply to: I need a shower door");
    assert_eq!(calls[0].1.format, AudioFormat::Mp3);

    let artifact = h.audio_dir.path().join(format!("reply_{id}.mp3"));
    assert_eq!(std::fs::read(artifact).unwrap(), b"ID3fake-mp3");
}

#[tokio::test]
async fn test_rapid_transcripts_are_serialized() {
    let h = Harness::new(FakeChatModel::gated());
    let (id, _rx) = h.connect().await;
    h.start(&id, "CA200", None).await;

    let probe = h.stt.latest();
    probe.emit_final("first question").await;
    probe.emit_final("second question").await;

    let model = h.model.clone();
    assert!(wait_for(WAIT, || model.call_count() == 1).await);
    // The second transcript waits for the first reply
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.model.call_count(), 1);

    h.model.open_gate(2);

    let announcer = h.announcer.clone();
    assert!(wait_for(WAIT, || announcer.announcements().len() == 2).await);
    assert_eq!(h.model.max_in_flight(), 1);
    assert_eq!(
        h.tts.texts(),
        vec!["Reply to: first question", "Reply to: second question"]
    );

    // Second request carries the first exchange
    let requests = h.model.requests();
    let second: Vec<&str> = requests[1]
        .messages
        .iter()
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(second.len(), 4);
    assert_eq!(second[1], "first question");
    assert_eq!(second[2], "Reply to: first question");
    assert_eq!(second[3], "second question");

    assert_eq!(h.manager.conversation(&id).unwrap().history_len(), 4);
}

#[tokio::test]
async fn test_generation_failure_keeps_session() {
    let h = Harness::new(FakeChatModel::new());
    h.model.fail_next();
    let (id, _rx) = h.connect().await;
    h.start(&id, "CA300", None).await;

    h.stt.latest().emit_final("hello").await;

    let conversation = h.manager.conversation(&id).unwrap();
    let probe = conversation.clone();
    assert!(wait_for(WAIT, || probe.stats().turns_failed == 1).await);
    assert!(h.manager.is_active(&id));
    assert_eq!(conversation.history_len(), 0);
    assert!(!conversation.is_generating());
    assert!(h.announcer.announcements().is_empty());

    h.stt.latest().emit_final("hello again").await;
    let announcer = h.announcer.clone();
    assert!(wait_for(WAIT, || announcer.announcements().len() == 1).await);
    assert_eq!(conversation.history_len(), 2);
    assert_eq!(conversation.stats().turns_completed, 1);
}

#[tokio::test]
async fn test_stop_during_generation_discards_reply() {
    let h = Harness::new(FakeChatModel::gated());
    let (id, _rx) = h.connect().await;
    h.start(&id, "CA400", None).await;

    let conversation = h.manager.conversation(&id).unwrap();
    h.stt.latest().emit_final("are you there").await;

    let model = h.model.clone();
    assert!(wait_for(WAIT, || model.call_count() == 1).await);

    h.manager.on_transport_event(&id, TransportEvent::Stop).await;
    assert!(!h.manager.is_active(&id));

    h.model.open_gate(1);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(h.tts.calls().is_empty());
    assert!(h.announcer.announcements().is_empty());
    assert_eq!(conversation.history_len(), 0);
}

#[tokio::test]
async fn test_stop_during_synthesis_writes_no_artifact() {
    let h = Harness::announcing(FakeChatModel::new(), RecordingSynthesizer::gated());
    let (id, _rx) = h.connect().await;
    h.start(&id, "CA401", None).await;

    h.stt.latest().emit_final("how thick is the glass").await;

    let tts = h.tts.clone();
    assert!(wait_for(WAIT, || tts.calls().len() == 1).await);

    h.manager.on_transport_event(&id, TransportEvent::Stop).await;
    assert!(!h.manager.is_active(&id));

    h.tts.open_gate(1);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let files: Vec<_> = std::fs::read_dir(h.audio_dir.path())
        .map(|entries| entries.filter_map(Result::ok).map(|e| e.file_name()).collect())
        .unwrap_or_default();
    assert!(files.is_empty(), "unexpected artifacts: {files:?}");
    assert!(h.announcer.announcements().is_empty());
}

#[tokio::test]
async fn test_teardown_is_idempotent() {
    let h = Harness::new(FakeChatModel::new());
    let (id, mut rx) = h.connect().await;
    let probe = h.stt.latest();

    assert!(h.manager.teardown(&id, "test").await);
    assert!(!h.manager.teardown(&id, "test").await);
    h.manager.on_transport_close(&id).await;

    assert_eq!(probe.disconnect_count(), 1);
    assert!(!probe.is_connected());
    assert_eq!(h.manager.session_count(), 0);

    let closes = drain_routes(&mut rx)
        .into_iter()
        .filter(|r| *r == TransportRoute::Close)
        .count();
    assert_eq!(closes, 1);
}

#[tokio::test]
async fn test_transport_error_tears_down() {
    let h = Harness::new(FakeChatModel::new());
    let (id, _rx) = h.connect().await;

    let err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
    h.manager.on_transport_error(&id, &err).await;

    assert!(!h.manager.is_active(&id));
    assert_eq!(h.stt.latest().disconnect_count(), 1);
}

#[tokio::test]
async fn test_transcription_error_keeps_session_open() {
    let h = Harness::new(FakeChatModel::new());
    let (id, _rx) = h.connect().await;
    h.start(&id, "CA500", None).await;

    let probe = h.stt.latest();
    probe
        .emit_error(STTError::ProviderError("hiccup".to_string()))
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.manager.is_active(&id));

    probe.emit_final("still here").await;
    let announcer = h.announcer.clone();
    assert!(wait_for(WAIT, || announcer.announcements().len() == 1).await);
}

#[tokio::test]
async fn test_lead_handed_off_on_teardown() {
    let h = Harness::new(FakeChatModel::new());
    let (id, _rx) = h.connect().await;
    h.start(&id, "CA600", Some("+15550001111")).await;

    h.stt.latest().emit_final("I need a mirror cut").await;
    let announcer = h.announcer.clone();
    assert!(wait_for(WAIT, || announcer.announcements().len() == 1).await);

    h.manager.on_transport_event(&id, TransportEvent::Stop).await;

    let leads = h.leads.leads();
    assert_eq!(leads.len(), 1);
    assert_eq!(leads[0].phone.as_deref(), Some("+15550001111"));
    let notes = leads[0].notes.as_deref().unwrap();
    assert!(notes.contains("Voice call CA600"));
    assert!(notes.contains("Caller: I need a mirror cut"));
}

#[tokio::test]
async fn test_no_lead_without_caller_number() {
    let h = Harness::new(FakeChatModel::new());
    let (id, _rx) = h.connect().await;
    h.start(&id, "CA700", None).await;

    h.manager.teardown(&id, "test").await;
    assert!(h.leads.leads().is_empty());
}

#[tokio::test]
async fn test_stream_mode_sends_media_and_mark() {
    let h = Harness::streaming(FakeChatModel::new());
    let (id, mut rx) = h.connect().await;
    h.start(&id, "CA800", None).await;

    h.stt.latest().emit_final("what glass is safest").await;

    let mut routes = Vec::new();
    while routes.len() < 3 {
        let route = tokio::time::timeout(WAIT, rx.recv())
            .await
            .expect("timed out waiting for reply audio")
            .expect("transport closed");
        routes.push(route);
    }

    assert!(matches!(
        &routes[0],
        TransportRoute::Media { stream_sid, .. } if stream_sid == "MZ-CA800"
    ));
    assert!(matches!(&routes[1], TransportRoute::Media { .. }));
    assert_eq!(
        routes[2],
        TransportRoute::Mark {
            stream_sid: "MZ-CA800".to_string(),
            name: "reply-2".to_string(),
        }
    );

    assert_eq!(h.tts.calls()[0].1.format, AudioFormat::Pcm);
    assert!(h.announcer.announcements().is_empty());
    assert!(h.audio_dir.path().join(format!("reply_{id}.wav")).exists());
}

#[tokio::test]
async fn test_events_for_unknown_session_ignored() {
    let h = Harness::new(FakeChatModel::new());

    h.manager
        .on_transport_event("missing", TransportEvent::Media(silence_frame()))
        .await;
    h.manager
        .on_transport_event("missing", TransportEvent::Stop)
        .await;
    h.manager.on_transport_close("missing").await;

    assert!(!h.manager.teardown("missing", "test").await);
    assert_eq!(h.manager.session_count(), 0);
}

#[tokio::test]
async fn test_blank_and_interim_transcripts_ignored() {
    let h = Harness::new(FakeChatModel::new());
    let (id, _rx) = h.connect().await;
    h.start(&id, "CA900", None).await;

    let probe = h.stt.latest();
    probe
        .emit(STTResult::new("   ".to_string(), true, true, 0.9))
        .await;
    probe
        .emit(STTResult::new("I want".to_string(), false, false, 0.5))
        .await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(h.model.call_count(), 0);
    assert_eq!(h.manager.conversation(&id).unwrap().history_len(), 0);
}

#[tokio::test]
async fn test_sessions_are_isolated() {
    let h = Harness::new(FakeChatModel::new());
    let (first, _rx1) = h.connect().await;
    let (second, _rx2) = h.connect().await;
    assert_ne!(first, second);
    h.start(&first, "CA-A", None).await;
    h.start(&second, "CA-B", None).await;

    let streams = h.stt.streams();
    assert_eq!(streams.len(), 2);
    streams[0].emit_final("only for the first call").await;

    let announcer = h.announcer.clone();
    assert!(wait_for(WAIT, || announcer.announcements().len() == 1).await);
    assert_eq!(
        h.announcer.announcements()[0].0.as_deref(),
        Some("CA-A")
    );
    assert_eq!(h.manager.conversation(&first).unwrap().history_len(), 2);
    assert_eq!(h.manager.conversation(&second).unwrap().history_len(), 0);

    h.manager.teardown(&first, "test").await;
    assert!(h.manager.is_active(&second));
    assert!(streams[1].is_connected());
    assert_eq!(streams[0].disconnect_count(), 1);
}

#[tokio::test]
async fn test_shutdown_all_closes_every_session() {
    let h = Harness::new(FakeChatModel::new());
    let (_a, mut rx_a) = h.connect().await;
    let (_b, mut rx_b) = h.connect().await;

    h.manager.shutdown_all().await;

    assert_eq!(h.manager.session_count(), 0);
    assert!(drain_routes(&mut rx_a).contains(&TransportRoute::Close));
    assert!(drain_routes(&mut rx_b).contains(&TransportRoute::Close));
}
