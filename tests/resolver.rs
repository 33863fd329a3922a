mod common;

use std::sync::Arc;
use std::time::Duration;

use chorus_bridge::config::ResourceConfig;
use chorus_bridge::domains::resource::{
    AttemptFailure, AttemptState, ResolveMode, ResolveOutcome,
};
use chorus_bridge::services::audio::HttpAudioPlayer;
use chorus_bridge::services::correlator::CancelFlag;
use chorus_bridge::services::resolver::ResourceResolver;
use chorus_bridge::session::Session;
use common::{LoadBehaviour, RecordingPlayer};
use httpmock::Method::GET;
use httpmock::MockServer;

fn three_endpoints(attempt_timeout_ms: u64) -> ResourceConfig {
    ResourceConfig {
        proxy_template: Some("https://a.test/{cid}".to_string()),
        gateway_templates: Some(vec![
            "https://b.test/{cid}".to_string(),
            "https://c.test/{cid}".to_string(),
        ]),
        attempt_timeout_ms: Some(attempt_timeout_ms),
        ..ResourceConfig::default()
    }
}

#[tokio::test]
async fn endpoints_are_tried_in_order_until_one_loads() {
    let player = Arc::new(RecordingPlayer::new(vec![
        ("https://a.test/QmSong", LoadBehaviour::Fail("502".to_string())),
        ("https://b.test/QmSong", LoadBehaviour::Fail("404".to_string())),
        ("https://c.test/QmSong", LoadBehaviour::Ready),
    ]));
    let resolver = ResourceResolver::new(player.clone(), &three_endpoints(5_000));
    let session = Session::new(None);

    let outcome = resolver
        .resolve(&session, "QmSong", ResolveMode::Once)
        .await;

    match &outcome {
        ResolveOutcome::Succeeded { endpoint, attempts } => {
            assert_eq!(endpoint, "https://c.test/QmSong");
            assert!(matches!(
                attempts[0].state,
                AttemptState::Failed(AttemptFailure::LoadError(_))
            ));
            assert!(matches!(
                attempts[1].state,
                AttemptState::Failed(AttemptFailure::LoadError(_))
            ));
            assert_eq!(attempts[2].state, AttemptState::Succeeded);
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(
        player.loads().await,
        vec![
            "https://a.test/QmSong",
            "https://b.test/QmSong",
            "https://c.test/QmSong",
        ]
    );
    // one before the walk, one after each failure
    assert_eq!(player.teardowns(), 3);
    assert!(session.has_played("QmSong"));
}

#[tokio::test(start_paused = true)]
async fn slow_endpoint_fails_over_after_the_attempt_timeout() {
    let player = Arc::new(RecordingPlayer::new(vec![
        ("https://a.test/QmSong", LoadBehaviour::Hang),
        ("https://b.test/QmSong", LoadBehaviour::Ready),
    ]));
    let resolver = ResourceResolver::new(player.clone(), &three_endpoints(5_000));
    let started = tokio::time::Instant::now();

    let outcome = resolver
        .resolve(&Session::new(None), "QmSong", ResolveMode::Once)
        .await;

    assert_eq!(outcome.attempts()[0].state, AttemptState::Failed(AttemptFailure::TimedOut));
    assert!(matches!(
        outcome,
        ResolveOutcome::Succeeded { ref endpoint, .. } if endpoint == "https://b.test/QmSong"
    ));
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(5_000));
    assert!(elapsed < Duration::from_millis(10_000));
}

#[tokio::test]
async fn played_resource_is_not_fetched_again_unless_replayed() {
    let player = Arc::new(RecordingPlayer::new(vec![(
        "https://a.test/QmSong",
        LoadBehaviour::Ready,
    )]));
    let resolver = ResourceResolver::new(player.clone(), &three_endpoints(5_000));
    let session = Session::new(None);

    assert!(resolver
        .resolve(&session, "QmSong", ResolveMode::Once)
        .await
        .is_ready());
    assert_eq!(
        resolver.resolve(&session, "QmSong", ResolveMode::Once).await,
        ResolveOutcome::AlreadyPlayed
    );
    assert_eq!(player.loads().await.len(), 1);

    assert!(resolver
        .resolve(&session, "QmSong", ResolveMode::Replay)
        .await
        .is_ready());
    assert_eq!(player.loads().await.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn concurrent_once_resolves_load_the_resource_once() {
    let player = Arc::new(RecordingPlayer::new(vec![(
        "https://a.test/QmSong",
        LoadBehaviour::Slow(Duration::from_millis(200)),
    )]));
    let resolver = ResourceResolver::new(player.clone(), &three_endpoints(5_000));
    let session = Session::new(None);

    let (first, second) = tokio::join!(
        resolver.resolve(&session, "QmSong", ResolveMode::Once),
        resolver.resolve(&session, "QmSong", ResolveMode::Once),
    );

    let outcomes = [first, second];
    assert_eq!(
        outcomes
            .iter()
            .filter(|outcome| matches!(outcome, ResolveOutcome::Succeeded { .. }))
            .count(),
        1
    );
    assert!(outcomes.contains(&ResolveOutcome::AlreadyPlayed));
    assert_eq!(player.loads().await.len(), 1);
    // only the winner tore down before loading
    assert_eq!(player.teardowns(), 1);
}

#[tokio::test]
async fn ipfs_uri_and_bare_id_count_as_the_same_resource() {
    let player = Arc::new(RecordingPlayer::new(vec![(
        "https://a.test/QmSong",
        LoadBehaviour::Ready,
    )]));
    let resolver = ResourceResolver::new(player.clone(), &three_endpoints(5_000));
    let session = Session::new(None);

    assert!(resolver
        .resolve(&session, "ipfs://QmSong", ResolveMode::Once)
        .await
        .is_ready());
    assert_eq!(
        resolver.resolve(&session, "QmSong", ResolveMode::Once).await,
        ResolveOutcome::AlreadyPlayed
    );
    assert!(session.has_played("QmSong"));
    assert_eq!(player.loads().await.len(), 1);
}

#[tokio::test]
async fn every_endpoint_failing_is_an_outcome_not_an_error() {
    let player = Arc::new(RecordingPlayer::new(Vec::new()));
    let resolver = ResourceResolver::new(player.clone(), &three_endpoints(5_000));
    let session = Session::new(None);

    let outcome = resolver
        .resolve(&session, "QmGone", ResolveMode::Once)
        .await;

    match &outcome {
        ResolveOutcome::Exhausted { attempts } => {
            assert_eq!(attempts.len(), 3);
            assert!(attempts
                .iter()
                .all(|attempt| matches!(attempt.state, AttemptState::Failed(_))));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(!outcome.is_ready());
    assert!(!session.has_played("QmGone"));
}

#[tokio::test]
async fn local_assets_skip_the_endpoint_chain() {
    let player = Arc::new(RecordingPlayer::new(vec![(
        "assets/intro.mp3",
        LoadBehaviour::Ready,
    )]));
    let resolver = ResourceResolver::new(player.clone(), &three_endpoints(5_000));

    let outcome = resolver
        .resolve(&Session::new(None), "assets/intro.mp3", ResolveMode::Once)
        .await;

    assert_eq!(
        outcome,
        ResolveOutcome::Local {
            uri: "assets/intro.mp3".to_string()
        }
    );
    assert_eq!(player.loads().await, vec!["assets/intro.mp3"]);
}

#[tokio::test]
async fn custom_local_check_is_honoured() {
    let player = Arc::new(RecordingPlayer::new(vec![("bundled:7", LoadBehaviour::Ready)]));
    let resolver = ResourceResolver::new(player.clone(), &three_endpoints(5_000))
        .with_local_check(|content_id| content_id.starts_with("bundled:"));

    let outcome = resolver
        .resolve(&Session::new(None), "bundled:7", ResolveMode::Once)
        .await;
    assert!(matches!(outcome, ResolveOutcome::Local { .. }));
}

#[tokio::test]
async fn ipfs_uri_is_normalized_before_expansion() {
    let player = Arc::new(RecordingPlayer::new(vec![(
        "https://a.test/QmSong",
        LoadBehaviour::Ready,
    )]));
    let resolver = ResourceResolver::new(player.clone(), &three_endpoints(5_000));

    let outcome = resolver
        .resolve(&Session::new(None), "ipfs://QmSong", ResolveMode::Once)
        .await;
    assert!(outcome.is_ready());
    assert_eq!(player.loads().await, vec!["https://a.test/QmSong"]);
}

#[tokio::test]
async fn cancelled_walk_stops_before_loading() {
    let player = Arc::new(RecordingPlayer::new(Vec::new()));
    let resolver = ResourceResolver::new(player.clone(), &three_endpoints(5_000));
    let cancel = CancelFlag::new();
    cancel.cancel();

    let outcome = resolver
        .resolve_with_cancel(&Session::new(None), "QmSong", ResolveMode::Once, &cancel)
        .await;

    assert!(matches!(outcome, ResolveOutcome::Cancelled { .. }));
    assert!(player.loads().await.is_empty());
}

#[tokio::test]
async fn http_player_falls_back_from_broken_proxy_to_gateway() {
    let server = MockServer::start_async().await;
    let proxy = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/audio-proxy").query_param("cid", "QmSong");
            then.status(502);
        })
        .await;
    let gateway = server
        .mock_async(|when, then| {
            when.method(GET).path("/ipfs/QmSong");
            then.status(200)
                .header("content-type", "audio/mpeg")
                .body("ID3-audio-bytes");
        })
        .await;

    let config = ResourceConfig {
        gateway_templates: Some(vec![server.url("/ipfs/{cid}")]),
        proxy_base_url: Some(server.base_url()),
        ..ResourceConfig::default()
    };
    let player = Arc::new(HttpAudioPlayer::new(config.proxy_base_url.clone()).unwrap());
    let resolver = ResourceResolver::new(player.clone(), &config);

    let outcome = resolver
        .resolve(&Session::new(None), "QmSong", ResolveMode::Once)
        .await;

    assert!(outcome.is_ready());
    proxy.assert_async().await;
    gateway.assert_async().await;
    let loaded = player.current().await.unwrap();
    assert_eq!(loaded.content_type.as_deref(), Some("audio/mpeg"));
    assert_eq!(&loaded.bytes[..], b"ID3-audio-bytes");
}

#[tokio::test]
async fn http_player_rejects_empty_bodies() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/ipfs/QmEmpty");
            then.status(200);
        })
        .await;

    let config = ResourceConfig {
        proxy_template: Some(server.url("/ipfs/{cid}")),
        gateway_templates: Some(Vec::new()),
        ..ResourceConfig::default()
    };
    let player = Arc::new(HttpAudioPlayer::new(None).unwrap());
    let resolver = ResourceResolver::new(player.clone(), &config);

    let outcome = resolver
        .resolve(&Session::new(None), "QmEmpty", ResolveMode::Once)
        .await;
    assert!(matches!(outcome, ResolveOutcome::Exhausted { .. }));
    assert!(player.current().await.is_none());
}
