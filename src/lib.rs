pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod events;
pub mod lifecycle;
pub mod models;
pub mod presence;
pub mod rate_limit;
pub mod rooms;
pub mod routes;
pub mod typing;

use config::Config;
use db::Db;
use events::EventBus;
use lifecycle::LifecycleEngine;
use presence::PresenceRegistry;
use rate_limit::{RateLimitConfig, RateLimiter};
use rocket_cors::CorsOptions;
use rooms::RoomRouter;
use std::sync::Arc;
use typing::TypingTracker;

pub fn rocket() -> rocket::Rocket<rocket::Build> {
    let config = Config::from_env();
    build_rocket(config)
}

pub fn rocket_with_config(config: Config) -> rocket::Rocket<rocket::Build> {
    build_rocket(config)
}

fn build_rocket(config: Config) -> rocket::Rocket<rocket::Build> {
    if let Some(parent) = std::path::Path::new(&config.database_path).parent() {
        std::fs::create_dir_all(parent).ok();
    }

    let config = Arc::new(config);
    let db = Arc::new(Db::new(&config.database_path));
    let events = Arc::new(EventBus::new());
    let rate_limit_config = RateLimitConfig::from_env();
    let rate_limiter = Arc::new(RateLimiter::new());
    let presence = Arc::new(PresenceRegistry::new());
    let rooms = Arc::new(RoomRouter::new());
    let typing_tracker = Arc::new(TypingTracker::new(config.typing_idle_ms));
    let lifecycle = Arc::new(LifecycleEngine::new(
        Arc::clone(&db),
        Arc::clone(&rooms),
        Arc::clone(&presence),
        Arc::clone(&config),
    ));

    let cors = CorsOptions::default()
        .to_cors()
        .expect("Failed to create CORS");

    let figment = rocket::Config::figment().merge(("limits.json", 1024 * 1024));

    println!("🔌 duoline chat core booting, db={}", config.database_path);

    rocket::custom(figment)
        .manage(config)
        .manage(db)
        .manage(events)
        .manage(rate_limit_config)
        .manage(rate_limiter)
        .manage(presence)
        .manage(rooms)
        .manage(typing_tracker)
        .manage(lifecycle)
        .attach(cors)
        .register(
            "/",
            rocket::catchers![routes::too_many_requests, routes::not_found],
        )
        .mount(
            "/",
            rocket::routes![
                routes::health,
                routes::stats,
                routes::bootstrap_conversation,
                routes::get_messages,
                routes::send_message,
                routes::read_message,
                routes::mark_all_read,
                routes::notify_typing,
                routes::message_stream,
            ],
        )
        .attach(rocket::fairing::AdHoc::on_liftoff(
            "Typing Reaper",
            move |rocket| {
                Box::pin(async move {
                    let tracker = rocket
                        .state::<Arc<TypingTracker>>()
                        .expect("typing tracker must be managed")
                        .clone();
                    let rooms = rocket
                        .state::<Arc<RoomRouter>>()
                        .expect("room router must be managed")
                        .clone();
                    let db = rocket
                        .state::<Arc<Db>>()
                        .expect("db must be managed")
                        .clone();
                    typing::spawn_typing_reaper(tracker, rooms, db);
                    println!("🧹 Typing reaper started");
                })
            },
        ))
}
