//! Ridewave Client - headless entry point
//!
//! Restores the saved session, keeps its ride in sync and prints ride changes
//! and notifications until Ctrl-C.

use ridewave_client::{logging, App, ClientConfig};
use ridewave_shared::EVENT_NEW_RIDE_REQUEST;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init(logging::DEFAULT_FILTER);

    let config = ClientConfig::from_env();
    ridewave_client::log_info!("API {} / realtime {}", config.api_url, config.ws_url);

    let app = App::new(config);
    let Some(session) = app.start() else {
        println!("No saved session. Log in from the app first.");
        app.shutdown();
        return Ok(());
    };
    println!(
        "Signed in as {} ({})",
        session.subject_id(),
        session.role.as_str()
    );

    let mut notifications = app.notifier().subscribe();
    tokio::spawn(async move {
        while let Ok(n) = notifications.recv().await {
            println!("[{:?}] {}", n.level, n.message);
        }
    });

    let mut rides = app.rides().watch();
    tokio::spawn(async move {
        while rides.changed().await.is_ok() {
            let line = match &rides.borrow_and_update().active {
                Some(ride) => format!("Active ride {}: {}", ride.id, ride.status),
                None => "No active ride".to_string(),
            };
            println!("{line}");
        }
    });

    app.dispatcher().subscribe(EVENT_NEW_RIDE_REQUEST, |event| {
        println!("New ride request: {:?}", event);
        Ok(())
    });

    if let Err(e) = app.fetch_active_ride().await {
        println!("{}", e.user_message());
    }
    let history = app.fetch_ride_history().await;
    println!("{} past rides", history.len());

    tokio::signal::ctrl_c().await?;
    app.shutdown();
    Ok(())
}
