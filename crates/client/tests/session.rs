mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{draft, harness, FakeAuthApi, FakeRideApi, LoopbackConnector, RefusingConnector};
use futures_util::StreamExt;
use ridewave_client::storage::{Storage, ROLE_KEY, TOKEN_KEY};
use ridewave_client::stores::RideError;
use ridewave_client::ws::SERVER_UNREACHABLE_MESSAGE;
use ridewave_client::Route;
use ridewave_shared::{ApiError, RideStatus, Role, WsEnvelope, EVENT_CONNECT_FAILED};

#[tokio::test]
async fn test_rider_books_gets_captain_and_cancels() {
    let server = Arc::new(LoopbackConnector::default());
    let h = harness(FakeRideApi::new(), FakeAuthApi::issuing("abc123"), server.clone());

    let outcome = h.app.login("rider@example.com", "secret", Role::Rider).await.unwrap();
    assert_eq!(outcome.landing, Route::Home);

    let ride = h.app.request_ride(&draft((1.0, 1.0), (2.0, 2.0))).await.unwrap();
    let active = h.app.rides().active_ride().unwrap();
    assert_eq!(active.id, ride.id);
    assert_eq!(active.status, RideStatus::Requested);

    let (mut from_client, to_client) = server.accept().await;
    let auth: WsEnvelope = serde_json::from_str(&from_client.next().await.unwrap()).unwrap();
    assert_eq!(auth.event, "authenticate");
    assert_eq!(auth.data["token"], "abc123");
    let join: WsEnvelope = serde_json::from_str(&from_client.next().await.unwrap()).unwrap();
    assert_eq!(join.event, "join");
    assert_eq!(join.data["userId"], "rider");
    assert_eq!(join.data["userType"], "user");

    let mut changes = h.app.rides().watch();
    to_client
        .unbounded_send(
            serde_json::json!({
                "event": "ride_update",
                "data": {
                    "id": ride.id,
                    "status": "accepted",
                    "assignedCaptain": { "id": "c1" }
                }
            })
            .to_string(),
        )
        .unwrap();
    tokio::time::timeout(
        Duration::from_secs(5),
        changes.wait_for(|s| {
            s.active
                .as_ref()
                .is_some_and(|r| r.status == RideStatus::Accepted)
        }),
    )
    .await
    .unwrap()
    .unwrap();

    let active = h.app.rides().active_ride().unwrap();
    assert_eq!(active.assigned_captain.map(|c| c.id).as_deref(), Some("c1"));

    h.app.cancel_ride(&ride.id).await.unwrap();
    assert!(h.app.rides().active_ride().is_none());
    h.app.shutdown();
}

#[tokio::test]
async fn test_offline_session_makes_no_network_calls() {
    let connector = Arc::new(RefusingConnector::default());
    let rides = FakeRideApi::new();
    let h = harness(rides.clone(), FakeAuthApi::issuing("abc123"), connector.clone());

    let outcome = h.app.login_offline("explorer@example.com", Role::Rider);
    assert!(outcome.session.token.starts_with("mock_token_"));
    assert!(h.app.monitor().is_offline_mode());
    assert!(!h.app.rides().is_attached());

    assert!(!h.app.transport().initialize(&outcome.session));
    assert_eq!(h.app.fetch_active_ride().await, Ok(None));
    assert!(h.app.fetch_ride_history().await.is_empty());
    h.app.monitor().check_now().await;
    assert!(!h.app.transport().emit("ping", serde_json::json!({})));
    assert_eq!(
        h.app.request_ride(&draft((1.0, 1.0), (2.0, 2.0))).await,
        Err(RideError::Offline)
    );

    tokio::task::yield_now().await;
    assert_eq!(connector.attempts.load(Ordering::SeqCst), 0);
    assert_eq!(rides.calls(), 0);
    assert_eq!(h.health.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.auth.calls.load(Ordering::SeqCst), 0);

    h.app.logout().await;
    assert_eq!(h.auth.logout_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_logout_clears_storage_even_when_server_fails() {
    let h = harness(
        FakeRideApi::new(),
        FakeAuthApi::issuing("abc123"),
        Arc::new(RefusingConnector::default()),
    );
    h.app.login("rider@example.com", "secret", Role::Rider).await.unwrap();
    assert_eq!(h.storage.get(TOKEN_KEY).as_deref(), Some("abc123"));
    assert_eq!(h.storage.get(ROLE_KEY).as_deref(), Some("user"));
    assert!(h.app.rides().is_attached());

    let route = h.app.logout().await;
    assert_eq!(route, Some(Route::login_for(Role::Rider)));
    assert_eq!(h.auth.logout_calls.load(Ordering::SeqCst), 1);
    assert!(h.storage.is_empty());
    assert_eq!(h.credential.get(), None);
    assert!(h.app.auth().session().is_none());
    assert!(!h.app.rides().is_attached());
}

#[tokio::test]
async fn test_auth_failure_redirects_once() {
    let rides = FakeRideApi::new();
    *rides.request_error.lock().unwrap() = Some(ApiError::Unauthorized("jwt expired".into()));
    let h = harness(
        rides,
        FakeAuthApi::issuing("abc123"),
        Arc::new(RefusingConnector::default()),
    );
    h.app.login("rider@example.com", "secret", Role::Rider).await.unwrap();

    let err = h
        .app
        .request_ride(&draft((1.0, 1.0), (2.0, 2.0)))
        .await
        .unwrap_err();
    assert!(err.is_unauthorized());
    assert!(!h.app.auth().is_authenticated());
    assert!(!h.storage.exists(TOKEN_KEY));
    assert_eq!(h.app.take_redirect(), Some(Route::login_for(Role::Rider)));
    assert_eq!(h.app.take_redirect(), None);

    // Nothing left to tear down, so no second redirect.
    assert_eq!(h.app.handle_auth_failure(), None);
    let expired = h
        .app
        .notifier()
        .active()
        .into_iter()
        .filter(|n| n.message.contains("expired"))
        .count();
    assert_eq!(expired, 1);
}

#[tokio::test]
async fn test_rejected_profile_update_ends_session() {
    let h = harness(
        FakeRideApi::new(),
        FakeAuthApi::issuing("abc123"),
        Arc::new(RefusingConnector::default()),
    );
    h.app.login("captain@example.com", "secret", Role::Captain).await.unwrap();
    assert!(h
        .app
        .update_profile(&serde_json::json!({ "phone": "555-0100" }))
        .await
        .is_err());
    assert_eq!(h.app.take_redirect(), Some(Route::login_for(Role::Captain)));
}

#[tokio::test]
async fn test_restart_restores_session() {
    let h = harness(
        FakeRideApi::new(),
        FakeAuthApi::issuing("abc123"),
        Arc::new(RefusingConnector::default()),
    );
    h.app.login_offline("explorer@example.com", Role::Captain);
    h.app.shutdown();

    let again = harness(
        FakeRideApi::new(),
        FakeAuthApi::issuing("abc123"),
        Arc::new(RefusingConnector::default()),
    );
    for key in [TOKEN_KEY, ROLE_KEY, "captain"] {
        again.storage.set(key, &h.storage.get(key).unwrap());
    }
    let restored = again.app.start().unwrap();
    assert_eq!(restored.role, Role::Captain);
    assert!(again.app.auth().is_synthetic());
    // Offline sessions never subscribe to ride pushes.
    assert!(!again.app.rides().is_attached());
    again.app.shutdown();
    assert!(!again.app.monitor().is_running());
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_gives_up_after_five_attempts() {
    let connector = Arc::new(RefusingConnector::default());
    let h = harness(FakeRideApi::new(), FakeAuthApi::issuing("abc123"), connector.clone());
    h.app.login("rider@example.com", "secret", Role::Rider).await.unwrap();

    let gave_up = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = gave_up.clone();
    h.app.dispatcher().subscribe(EVENT_CONNECT_FAILED, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(connector.attempts.load(Ordering::SeqCst), 5);
    assert_eq!(gave_up.load(Ordering::SeqCst), 1);
    let unreachable = h
        .app
        .notifier()
        .active()
        .into_iter()
        .filter(|n| n.message == SERVER_UNREACHABLE_MESSAGE)
        .count();
    assert_eq!(unreachable, 1);
}

#[tokio::test]
async fn test_rejected_history_fetch_ends_session() {
    let rides = FakeRideApi::new();
    *rides.history.lock().unwrap() = Some(Err(ApiError::Unauthorized("jwt expired".into())));
    let h = harness(
        rides,
        FakeAuthApi::issuing("abc123"),
        Arc::new(RefusingConnector::default()),
    );
    h.app.login("rider@example.com", "secret", Role::Rider).await.unwrap();

    assert!(h.app.fetch_ride_history().await.is_empty());
    assert!(!h.app.auth().is_authenticated());
    assert_eq!(h.app.take_redirect(), Some(Route::login_for(Role::Rider)));
    let expired = h
        .app
        .notifier()
        .active()
        .into_iter()
        .filter(|n| n.message.contains("expired"))
        .count();
    assert_eq!(expired, 1);
}

#[tokio::test(start_paused = true)]
async fn test_handshake_is_repeated_after_reconnect() {
    let server = Arc::new(LoopbackConnector::default());
    let h = harness(FakeRideApi::new(), FakeAuthApi::issuing("abc123"), server.clone());
    h.app.login("rider@example.com", "secret", Role::Rider).await.unwrap();

    let (mut from_client, to_client) = server.accept().await;
    let auth: WsEnvelope = serde_json::from_str(&from_client.next().await.unwrap()).unwrap();
    assert_eq!(auth.event, "authenticate");

    // Server hangs up.
    drop(to_client);
    drop(from_client);

    let (mut from_client, _to_client) = server.accept().await;
    let auth: WsEnvelope = serde_json::from_str(&from_client.next().await.unwrap()).unwrap();
    assert_eq!(auth.event, "authenticate");
    assert_eq!(auth.data["token"], "abc123");
    let join: WsEnvelope = serde_json::from_str(&from_client.next().await.unwrap()).unwrap();
    assert_eq!(join.event, "join");
    assert_eq!(join.data["userId"], "rider");
    assert_eq!(server.attempts.load(Ordering::SeqCst), 2);
    h.app.shutdown();
}
