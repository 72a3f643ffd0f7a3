//! Multi-participant scenarios over the in-memory relay and the headless
//! media engine.

use std::sync::Arc;
use std::time::Duration;

use huddle_room::transport::Subscription;
use huddle_room::{
    DeviceMode, FailPoint, HeadlessDevices, HeadlessEngine, MemoryHub, NegotiationState,
    ParticipantIdentity, PresenceRecord, RoomError, RoomEvent, RoomSession, RoomSnapshot,
    RoomStatus, SessionConfig, SessionDeps, SignalEnvelope, SignalKind, SignalTransport,
    StaticDirectory,
};
use tokio::sync::broadcast;
use tokio::time::Instant;

const ROOM: &str = "room:r1";
const WAIT: Duration = Duration::from_secs(60);

struct Participant {
    session: RoomSession,
    engine: HeadlessEngine,
    devices: Arc<HeadlessDevices>,
}

impl Participant {
    fn id(&self) -> &str {
        &self.session.identity().id
    }

    async fn settle(
        &self,
        what: &str,
        cond: impl FnMut(&RoomSnapshot) -> bool,
    ) -> RoomSnapshot {
        let mut rx = self.session.snapshots();
        let snapshot = match tokio::time::timeout(WAIT, rx.wait_for(cond)).await {
            Ok(Ok(snapshot)) => Some(snapshot.clone()),
            _ => None,
        };
        snapshot.unwrap_or_else(|| {
            panic!(
                "{}: timed out waiting for {what}; peers = {:?}",
                self.id(),
                rx.borrow().peer_ids()
            )
        })
    }

    async fn settle_mesh(&self, n: usize) -> RoomSnapshot {
        self.settle("full mesh", |s| all_connected(s, n)).await
    }

    async fn all_tracks_stopped(&self) -> bool {
        self.devices
            .acquired_tracks()
            .await
            .iter()
            .all(|t| t.is_stopped())
    }
}

struct Room {
    hub: MemoryHub,
    moderators: Vec<String>,
}

impl Room {
    fn new() -> Self {
        Self {
            hub: MemoryHub::new(),
            moderators: Vec::new(),
        }
    }

    fn with_moderators(ids: &[&str]) -> Self {
        Self {
            hub: MemoryHub::new(),
            moderators: ids.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn deps(&self, id: &str, devices: &Arc<HeadlessDevices>) -> (SessionDeps, HeadlessEngine) {
        let engine = HeadlessEngine::new();
        let directory = StaticDirectory::new(ParticipantIdentity::new(id, id.to_uppercase()))
            .with_moderators(self.moderators.iter().cloned());
        let deps = SessionDeps {
            transport: Arc::new(self.hub.clone()),
            directory: Arc::new(directory),
            devices: devices.clone(),
            engine: Arc::new(engine.clone()),
        };
        (deps, engine)
    }

    async fn try_join(
        &self,
        id: &str,
        devices: HeadlessDevices,
    ) -> (Result<RoomSession, RoomError>, Arc<HeadlessDevices>) {
        let devices = Arc::new(devices);
        let (deps, _) = self.deps(id, &devices);
        (RoomSession::join(SessionConfig::new(ROOM), deps).await, devices)
    }

    async fn join_with(&self, id: &str, devices: HeadlessDevices) -> Participant {
        let devices = Arc::new(devices);
        let (deps, engine) = self.deps(id, &devices);
        let session = RoomSession::join(SessionConfig::new(ROOM), deps)
            .await
            .unwrap_or_else(|e| panic!("{id} failed to join: {e}"));
        Participant {
            session,
            engine,
            devices,
        }
    }

    async fn join(&self, id: &str) -> Participant {
        self.join_with(id, HeadlessDevices::new()).await
    }

    /// A bare subscriber that can inject presence and envelopes.
    async fn raw(&self, id: &str) -> Subscription {
        let sub = self.hub.subscribe(ROOM).await.unwrap();
        self.hub
            .track(
                &sub.handle,
                &PresenceRecord::new(ParticipantIdentity::new(id, id), false),
            )
            .await
            .unwrap();
        sub
    }
}

fn all_connected(s: &RoomSnapshot, n: usize) -> bool {
    s.peers.len() == n
        && s
            .peers
            .iter()
            .all(|p| p.connection_state == NegotiationState::Connected)
}

fn remote_counts(s: &RoomSnapshot, peer: &str) -> (usize, usize) {
    s.peer(peer)
        .and_then(|p| p.remote_stream.as_ref())
        .map_or((0, 0), |stream| {
            (stream.audio_tracks().count(), stream.video_tracks().count())
        })
}

async fn next_event(
    rx: &mut broadcast::Receiver<RoomEvent>,
    mut pred: impl FnMut(&RoomEvent) -> bool,
) -> RoomEvent {
    tokio::time::timeout(WAIT, async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(e) => panic!("event stream ended: {e}"),
            }
        }
    })
    .await
    .expect("timed out waiting for room event")
}

#[tokio::test(start_paused = true)]
async fn full_mesh_connects_every_pair_once() {
    let room = Room::new();
    let ids = ["a", "b", "c", "d"];
    let mut participants = Vec::new();
    for id in ids {
        participants.push(room.join(id).await);
    }

    let mut connections = 0;
    for p in &participants {
        let snapshot = p.settle_mesh(ids.len() - 1).await;
        connections += snapshot.peers.len();
        for other in ids.iter().filter(|id| **id != p.id()) {
            let stats = p.engine.stats(other).expect("connection created");
            assert_eq!(stats.created, 1, "{} -> {other}", p.id());
            assert_eq!(stats.closed, 0);
        }
    }
    assert_eq!(connections / 2, ids.len() * (ids.len() - 1) / 2);
}

#[tokio::test(start_paused = true)]
async fn two_party_join_then_process_exit() {
    let room = Room::new();
    let a = room.join("a").await;
    let b = room.join("b").await;

    let seen_by_a = a
        .settle("b connected and speaking", |s| {
            all_connected(s, 1)
                && remote_counts(s, "b") == (1, 0)
                && s.peer("b").is_some_and(|p| p.is_speaking)
        })
        .await;
    assert_eq!(seen_by_a.peer_ids(), vec!["b"]);
    let seen_by_b = b.settle_mesh(1).await;
    assert_eq!(seen_by_b.peer_ids(), vec!["a"]);

    let b_devices = Arc::clone(&b.devices);
    drop(b);
    a.settle("b gone", |s| s.peers.is_empty()).await;
    assert!(b_devices.acquired_tracks().await.iter().all(|t| t.is_stopped()));
    assert_eq!(a.engine.stats("b").unwrap().closed, 1);
    assert_eq!(room.hub.member_count(ROOM).await, 1);
}

#[tokio::test(start_paused = true)]
async fn repeated_presence_sync_changes_nothing() {
    let room = Room::new();
    let a = room.join("a").await;
    let mut events = a.session.subscribe();

    let zed = room.raw("zed").await;
    let record = PresenceRecord::new(ParticipantIdentity::new("zed", "zed"), false);
    room.hub.track(&zed.handle, &record).await.unwrap();
    room.hub.track(&zed.handle, &record).await.unwrap();
    room.hub
        .broadcast(
            &zed.handle,
            &SignalEnvelope::new(SignalKind::Message, "zed").with_text("marker"),
        )
        .await
        .unwrap();

    let mut joined = 0;
    next_event(&mut events, |e| {
        if matches!(e, RoomEvent::PeerJoined(id) if id == "zed") {
            joined += 1;
        }
        matches!(e, RoomEvent::Message { .. })
    })
    .await;
    assert_eq!(joined, 1);
    let snapshot = a.session.snapshot();
    assert_eq!(snapshot.peer_ids(), vec!["zed"]);
    // Presence alone never starts a negotiation.
    assert!(a.engine.stats("zed").is_none());
}

#[tokio::test(start_paused = true)]
async fn reaction_round_trip_and_expiry() {
    let room = Room::new();
    let a = room.join("a").await;
    let b = room.join("b").await;
    let c = room.join("c").await;
    for p in [&a, &b, &c] {
        p.settle_mesh(2).await;
    }

    let start = Instant::now();
    a.session.send_reaction("🎉").await.unwrap();
    assert_eq!(a.session.snapshot().reaction.as_deref(), Some("🎉"));
    for p in [&b, &c] {
        p.settle("reaction shown", |s| {
            s.peer("a").and_then(|peer| peer.reaction.as_deref()) == Some("🎉")
        })
        .await;
    }

    for p in [&b, &c] {
        p.settle("reaction cleared", |s| {
            s.peer("a").is_some_and(|peer| peer.reaction.is_none())
        })
        .await;
    }
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(3), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(3500), "{elapsed:?}");
    assert!(a.session.snapshot().reaction.is_none());

    // Connection state is untouched by overlay expiry.
    assert!(all_connected(&b.session.snapshot(), 2));
}

#[tokio::test(start_paused = true)]
async fn newer_message_replaces_and_restarts_timer() {
    let room = Room::new();
    let a = room.join("a").await;
    let b = room.join("b").await;
    b.settle_mesh(1).await;

    let start = Instant::now();
    a.session.send_message("first").await.unwrap();
    tokio::time::sleep(Duration::from_secs(4)).await;
    a.session.send_message("  second  ").await.unwrap();

    b.settle("second bubble", |s| {
        s.peer("a").and_then(|p| p.message.as_deref()) == Some("second")
    })
    .await;
    b.settle("bubble cleared", |s| {
        s.peer("a").is_some_and(|p| p.message.is_none())
    })
    .await;
    assert!(start.elapsed() >= Duration::from_secs(10));

    assert!(matches!(
        a.session.send_message("   ").await,
        Err(RoomError::InvalidInput(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn simultaneous_renegotiation_converges_on_one_connection() {
    let room = Room::new();
    let alice = room.join("alice").await;
    let bob = room.join("bob").await;
    alice.settle_mesh(1).await;
    bob.settle_mesh(1).await;

    let (ra, rb) = tokio::join!(
        alice.session.start_screen_share(),
        bob.session.start_screen_share()
    );
    ra.unwrap();
    rb.unwrap();

    alice
        .settle("bob's screen", |s| {
            all_connected(s, 1) && remote_counts(s, "bob") == (1, 1)
        })
        .await;
    bob.settle("alice's screen", |s| {
        all_connected(s, 1) && remote_counts(s, "alice") == (1, 1)
    })
    .await;
    assert_eq!(alice.engine.stats("bob").unwrap().created, 1);
    assert_eq!(bob.engine.stats("alice").unwrap().created, 1);
}

#[tokio::test(start_paused = true)]
async fn screen_share_adds_video_and_keeps_audio() {
    let room = Room::new();
    let a = room.join("a").await;
    let b = room.join("b").await;
    let c = room.join("c").await;
    let mut audio_before = Vec::new();
    for p in [&a, &b] {
        let snapshot = p.settle("audio from c", |s| remote_counts(s, "c") == (1, 0)).await;
        let stream = snapshot.peer("c").unwrap().remote_stream.clone().unwrap();
        audio_before.push(stream.tracks[0].id().to_string());
    }

    c.session.start_screen_share().await.unwrap();
    assert!(c.session.snapshot().screen_stream.is_some());
    for (p, audio_id) in [&a, &b].into_iter().zip(&audio_before) {
        let snapshot = p.settle("video from c", |s| remote_counts(s, "c") == (1, 1)).await;
        let stream = snapshot.peer("c").unwrap().remote_stream.clone().unwrap();
        let audio = stream.audio_tracks().next().unwrap();
        assert_eq!(audio.id(), audio_id);
        assert!(!audio.is_stopped());
        assert_eq!(p.engine.stats("c").unwrap().created, 1);
    }

    c.session.stop_screen_share().await.unwrap();
    for p in [&a, &b] {
        p.settle("video from c ended", |s| remote_counts(s, "c") == (1, 0)).await;
    }
    let screen: Vec<_> = c
        .devices
        .acquired_tracks()
        .await
        .into_iter()
        .filter(|t| t.label() == "screen")
        .collect();
    assert!(screen.iter().all(|t| t.is_stopped()));
}

#[tokio::test(start_paused = true)]
async fn mute_propagates_through_presence() {
    let room = Room::new();
    let a = room.join("a").await;
    let b = room.join("b").await;
    let c = room.join("c").await;

    assert!(a.session.toggle_mute().await.unwrap());
    let local = a.session.snapshot();
    assert!(local.is_muted);
    assert!(local
        .local_stream
        .unwrap()
        .audio_tracks()
        .all(|t| !t.is_enabled()));

    for p in [&b, &c] {
        p.settle("a muted", |s| s.peer("a").is_some_and(|peer| peer.is_muted))
            .await;
    }

    a.session.set_muted(false).await.unwrap();
    b.settle("a unmuted", |s| s.peer("a").is_some_and(|peer| !peer.is_muted))
        .await;
}

#[tokio::test(start_paused = true)]
async fn force_mute_is_revalidated_by_target() {
    let room = Room::with_moderators(&["mod"]);
    let moderator = room.join("mod").await;
    let member = room.join("member").await;
    let target = room.join("target").await;
    for p in [&moderator, &member, &target] {
        p.settle_mesh(2).await;
    }
    let mut events = target.session.subscribe();

    assert!(matches!(
        member.session.mute_user("target").await,
        Err(RoomError::NotPermitted(_))
    ));

    // A forged command skips the sender-side check entirely.
    let mallory = room.raw("mallory").await;
    room.hub
        .broadcast(
            &mallory.handle,
            &SignalEnvelope::new(SignalKind::ForceMute, "mallory").to("target"),
        )
        .await
        .unwrap();
    let rejected = next_event(&mut events, |e| {
        matches!(e, RoomEvent::ModerationRejected { .. })
    })
    .await;
    assert!(matches!(rejected, RoomEvent::ModerationRejected { from, .. } if from == "mallory"));
    assert!(!target.session.snapshot().is_muted);

    moderator.session.mute_user("target").await.unwrap();
    let muted = next_event(&mut events, |e| matches!(e, RoomEvent::ForceMuted { .. })).await;
    assert!(matches!(muted, RoomEvent::ForceMuted { by } if by == "mod"));
    assert!(target.session.snapshot().is_muted);
    member
        .settle("target muted", |s| {
            s.peer("target").is_some_and(|p| p.is_muted)
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn kick_is_final() {
    let room = Room::with_moderators(&["mod"]);
    let moderator = room.join("mod").await;
    let other = room.join("other").await;
    let x = room.join("x").await;
    for p in [&moderator, &other, &x] {
        p.settle_mesh(2).await;
    }

    assert!(matches!(
        moderator.session.kick_user("mod").await,
        Err(RoomError::InvalidInput(_))
    ));
    assert!(matches!(
        moderator.session.kick_user("nobody").await,
        Err(RoomError::InvalidInput(_))
    ));

    moderator.session.kick_user("x").await.unwrap();
    let kicked = x.settle("kicked", |s| s.status == RoomStatus::Kicked).await;
    assert!(kicked.peers.is_empty());
    assert!(kicked.local_stream.is_none());
    assert!(x.all_tracks_stopped().await);
    assert_eq!(x.engine.stats("mod").unwrap().closed, 1);
    assert_eq!(x.engine.stats("other").unwrap().closed, 1);

    for (p, remaining) in [(&moderator, "other"), (&other, "mod")] {
        p.settle("x removed", |s| s.peer_ids() == vec![remaining])
            .await;
    }
    assert!(matches!(
        x.session.send_reaction("👋").await,
        Err(RoomError::Kicked)
    ));
    assert!(matches!(
        x.session.start_screen_share().await,
        Err(RoomError::Kicked)
    ));
    x.session.leave().await.unwrap();
    assert_eq!(x.session.status(), RoomStatus::Kicked);
    assert_eq!(room.hub.member_count(ROOM).await, 2);
}

#[tokio::test(start_paused = true)]
async fn lost_answer_is_recovered_by_retry() {
    let room = Room::new();
    let a = room.join("a").await;
    room.hub.drop_next(SignalKind::Answer, 1).await;

    let start = Instant::now();
    let b = room.join("b").await;
    a.settle_mesh(1).await;
    b.settle_mesh(1).await;

    assert!(start.elapsed() >= Duration::from_secs(10));
    assert_eq!(room.hub.sent_count(SignalKind::Offer).await, 2);
    assert_eq!(a.engine.stats("b").unwrap().created, 1);
}

#[tokio::test(start_paused = true)]
async fn denied_microphone_joins_listen_only() {
    let room = Room::new();
    let speaker = room.join("speaker").await;
    let listener = room
        .join_with("listener", HeadlessDevices::new().microphone(DeviceMode::Denied))
        .await;

    let mut events = listener.session.subscribe();
    let unavailable =
        next_event(&mut events, |e| matches!(e, RoomEvent::MediaUnavailable(_))).await;
    assert!(matches!(
        unavailable,
        RoomEvent::MediaUnavailable(huddle_room::MediaError::PermissionDenied(_))
    ));

    let snapshot = listener.session.snapshot();
    assert!(snapshot.local_stream.is_none());
    assert!(snapshot.is_muted);
    assert!(matches!(
        listener.session.toggle_mute().await,
        Err(RoomError::InvalidInput(_))
    ));

    let heard = listener
        .settle("speaker audio", |s| {
            all_connected(s, 1)
                && remote_counts(s, "speaker") == (1, 0)
                && s.peer("speaker").is_some_and(|p| p.is_speaking)
        })
        .await;
    assert_eq!(heard.status, RoomStatus::Connected);
    let seen = speaker.settle_mesh(1).await;
    assert!(seen.peer("listener").unwrap().is_muted);
    assert!(!seen.peer("listener").unwrap().is_speaking);
    assert!(seen.peer("listener").unwrap().remote_stream.is_none());
}

#[tokio::test(start_paused = true)]
async fn failed_joins_leak_nothing() {
    let room = Room::new();

    room.hub.set_failing(FailPoint::Subscribe, true).await;
    for _ in 0..3 {
        let (result, devices) = room.try_join("a", HeadlessDevices::new()).await;
        assert!(matches!(result, Err(RoomError::ConnectFailed(_))));
        let tracks = devices.acquired_tracks().await;
        assert_eq!(tracks.len(), 1);
        assert!(tracks.iter().all(|t| t.is_stopped()));
    }
    room.hub.set_failing(FailPoint::Subscribe, false).await;

    room.hub.set_failing(FailPoint::Track, true).await;
    let (result, devices) = room.try_join("a", HeadlessDevices::new()).await;
    assert!(matches!(result, Err(RoomError::ConnectFailed(_))));
    assert!(devices.acquired_tracks().await.iter().all(|t| t.is_stopped()));
    assert_eq!(room.hub.member_count(ROOM).await, 0);
    room.hub.set_failing(FailPoint::Track, false).await;

    let a = room.join("a").await;
    assert_eq!(a.session.status(), RoomStatus::Connected);
    assert_eq!(room.hub.member_count(ROOM).await, 1);
}

#[tokio::test(start_paused = true)]
async fn leave_is_idempotent_and_rejoin_gets_fresh_connection() {
    let room = Room::new();
    let a = room.join("a").await;
    let b = room.join("b").await;
    a.settle_mesh(1).await;

    b.session.leave().await.unwrap();
    b.session.leave().await.unwrap();
    assert_eq!(b.session.status(), RoomStatus::Left);
    assert!(b.all_tracks_stopped().await);
    assert!(matches!(
        b.session.toggle_mute().await,
        Err(RoomError::Closed)
    ));
    a.settle("b left", |s| s.peers.is_empty()).await;

    let b2 = room.join("b").await;
    a.settle_mesh(1).await;
    b2.settle_mesh(1).await;
    let stats = a.engine.stats("b").unwrap();
    assert_eq!(stats.created, 2);
    assert_eq!(stats.closed, 1);
}

#[tokio::test(start_paused = true)]
async fn presence_blip_reforms_the_mesh() {
    let room = Room::new();
    let a = room.join("a").await;
    let b = room.join("b").await;
    a.settle_mesh(1).await;
    b.settle_mesh(1).await;
    let mut events = a.session.subscribe();

    room.hub.blip_presence(ROOM, "b").await;
    next_event(&mut events, |e| matches!(e, RoomEvent::PeerLeft(id) if id == "b")).await;
    next_event(&mut events, |e| matches!(e, RoomEvent::PeerJoined(id) if id == "b")).await;

    a.settle("b reconnected with audio", |s| {
        all_connected(s, 1) && remote_counts(s, "b") == (1, 0)
    })
    .await;
    b.settle_mesh(1).await;
    let stats = a.engine.stats("b").unwrap();
    assert_eq!(stats.created, 2);
    assert_eq!(stats.closed, 1);
    // b never lost its side and renegotiated the existing connection.
    assert_eq!(b.engine.stats("a").unwrap().created, 1);
}

#[tokio::test(start_paused = true)]
async fn relay_reconnect_rebuilds_connections() {
    let room = Room::new();
    let a = room.join("a").await;
    let b = room.join("b").await;
    let c = room.join("c").await;
    for p in [&a, &b, &c] {
        p.settle_mesh(2).await;
    }

    room.hub.reconnect(ROOM, "b").await;

    b.settle("connections rebuilt", |s| {
        all_connected(s, 2)
            && ["a", "c"]
                .iter()
                .all(|id| b.engine.stats(id).is_some_and(|st| st.created == 2))
    })
    .await;
    for p in [&a, &c] {
        p.settle("b back", |s| {
            all_connected(s, 2) && p.engine.stats("b").is_some_and(|st| st.created == 2)
        })
        .await;
    }
    for other in ["a", "c"] {
        assert_eq!(b.engine.stats(other).unwrap().closed, 1);
    }
    assert_eq!(a.engine.stats("c").unwrap().created, 1);
    assert_eq!(b.session.status(), RoomStatus::Connected);
}

#[tokio::test(start_paused = true)]
async fn reconnect_drops_participants_missing_from_fresh_state() {
    let room = Room::new();
    let a = room.join("a").await;
    let mut events = a.session.subscribe();

    let zed = room.raw("zed").await;
    next_event(&mut events, |e| matches!(e, RoomEvent::PeerJoined(id) if id == "zed")).await;

    // zed's key vanishes from the roster without a leave ever being sent.
    room.hub
        .track(
            &zed.handle,
            &PresenceRecord::new(ParticipantIdentity::new("zoe", "zoe"), false),
        )
        .await
        .unwrap();
    room.hub
        .broadcast(
            &zed.handle,
            &SignalEnvelope::new(SignalKind::Message, "zoe").with_text("marker"),
        )
        .await
        .unwrap();
    next_event(&mut events, |e| matches!(e, RoomEvent::Message { .. })).await;
    assert_eq!(a.session.snapshot().peer_ids(), vec!["zed", "zoe"]);

    room.hub.reconnect(ROOM, "a").await;
    next_event(&mut events, |e| matches!(e, RoomEvent::PeerLeft(id) if id == "zed")).await;
    a.settle("zed dropped", |s| s.peer_ids() == vec!["zoe"]).await;
    assert_eq!(a.session.status(), RoomStatus::Connected);
}

#[tokio::test(start_paused = true)]
async fn failed_mute_update_is_rolled_back() {
    let room = Room::new();
    let a = room.join("a").await;
    let b = room.join("b").await;
    b.settle("a present", |s| s.peer("a").is_some()).await;

    room.hub.set_failing(FailPoint::Track, true).await;
    assert!(matches!(
        a.session.toggle_mute().await,
        Err(RoomError::Transport(_))
    ));
    room.hub.set_failing(FailPoint::Track, false).await;

    let local = a.session.snapshot();
    assert!(!local.is_muted);
    assert!(local
        .local_stream
        .unwrap()
        .audio_tracks()
        .all(|t| t.is_enabled()));
    tokio::time::sleep(WAIT).await;
    assert_eq!(
        b.session.snapshot().peer("a").map(|p| p.is_muted),
        Some(false)
    );

    // A retry after the failure mutes rather than flipping back.
    assert!(a.session.toggle_mute().await.unwrap());
    b.settle("a muted", |s| s.peer("a").is_some_and(|p| p.is_muted))
        .await;
}

#[tokio::test(start_paused = true)]
async fn forced_mute_is_republished_once_presence_recovers() {
    let room = Room::with_moderators(&["mod"]);
    let moderator = room.join("mod").await;
    let member = room.join("member").await;
    let target = room.join("target").await;
    for p in [&moderator, &member, &target] {
        p.settle_mesh(2).await;
    }
    let mut events = target.session.subscribe();

    room.hub.set_failing(FailPoint::Track, true).await;
    moderator.session.mute_user("target").await.unwrap();
    next_event(&mut events, |e| matches!(e, RoomEvent::ForceMuted { .. })).await;
    assert!(target.session.snapshot().is_muted);
    assert!(!member.session.snapshot().peer("target").unwrap().is_muted);

    room.hub.set_failing(FailPoint::Track, false).await;
    member
        .settle("target muted", |s| {
            s.peer("target").is_some_and(|p| p.is_muted)
        })
        .await;
    assert!(target.session.snapshot().is_muted);
}

#[tokio::test(start_paused = true)]
async fn lost_transport_ends_session_and_frees_participant() {
    let room = Room::new();
    let a = room.join("a").await;
    let b = room.join("b").await;
    let c = room.join("c").await;
    for p in [&a, &b, &c] {
        p.settle_mesh(2).await;
    }
    let mut a_events = a.session.subscribe();

    room.hub.disconnect_participant(ROOM, "b").await;

    let lost = b
        .settle("transport error", |s| matches!(s.status, RoomStatus::Error(_)))
        .await;
    assert!(lost.peers.is_empty());
    assert!(lost.local_stream.is_none());
    assert!(b.all_tracks_stopped().await);
    for other in ["a", "c"] {
        assert_eq!(b.engine.stats(other).unwrap().closed, 1);
    }
    assert!(matches!(
        b.session.toggle_mute().await,
        Err(RoomError::ConnectFailed(_))
    ));

    next_event(&mut a_events, |e| matches!(e, RoomEvent::PeerLeft(id) if id == "b")).await;
    for (p, remaining) in [(&a, "c"), (&c, "a")] {
        let snapshot = p.settle("b removed", |s| s.peer_ids() == vec![remaining]).await;
        assert!(all_connected(&snapshot, 1));
    }
    tokio::time::sleep(Duration::from_secs(1)).await;
    for p in [&a, &c] {
        assert_eq!(p.engine.stats("b").unwrap().closed, 1);
    }
    assert_eq!(room.hub.member_count(ROOM).await, 2);
}

#[tokio::test(start_paused = true)]
async fn failed_overlay_broadcast_clears_local_overlay() {
    let room = Room::new();
    let a = room.join("a").await;
    let b = room.join("b").await;
    a.settle_mesh(1).await;
    b.settle_mesh(1).await;

    room.hub.set_failing(FailPoint::Broadcast, true).await;
    assert!(matches!(
        a.session.send_reaction("🎉").await,
        Err(RoomError::Transport(_))
    ));
    assert!(matches!(
        a.session.send_message("hello").await,
        Err(RoomError::Transport(_))
    ));
    let snapshot = a.session.snapshot();
    assert!(snapshot.reaction.is_none());
    assert!(snapshot.message.is_none());
    room.hub.set_failing(FailPoint::Broadcast, false).await;

    a.session.send_message("hello").await.unwrap();
    assert_eq!(a.session.snapshot().message.as_deref(), Some("hello"));
    b.settle("message shown", |s| {
        s.peer("a").is_some_and(|p| p.message.as_deref() == Some("hello"))
    })
    .await;
}
