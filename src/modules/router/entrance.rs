// src/modules/router/entrance.rs

use crate::core::response;
use crate::middlewares;
use crate::modules::{app, catalog, docker, mods, monitor, servers, settings, stream};
use axum::{
    response::Response,
    routing::{delete, get, post},
    Router,
};

pub fn app_router() -> Router {
    let router = Router::new()
        .route("/", get(app::root::get_root_handler))
        .route("/v1/ping", get(app::root::get_ping_handler))
        .route("/v1/logs", get(app::root::get_logs_handler))
        // Settings
        .route("/v1/settings", get(settings::handlers::get_settings_handler))
        .route("/v1/settings", post(settings::handlers::save_settings_handler))
        // Servers
        .route("/v1/servers", get(servers::list::list_handler))
        .route("/v1/servers", post(servers::deploy::deploy_handler))
        .route("/v1/servers/{id}", get(servers::details::details_handler))
        .route("/v1/servers/{id}", delete(servers::control::delete_handler))
        .route("/v1/servers/{id}/update", post(servers::update::update_handler))
        .route("/v1/servers/{id}/control/{cmd}", post(servers::control::control_handler))
        .route("/v1/servers/{id}/console", get(servers::console::logs_handler))
        .route("/v1/servers/{id}/console", post(servers::console::command_handler))
        .route("/v1/servers/{id}/players", get(servers::players::players_handler))
        .route("/v1/servers/{id}/players/banned", get(servers::players::banned_handler))
        .route(
            "/v1/servers/{id}/players/{player}/{action}",
            post(servers::players::player_action_handler),
        )
        .route("/v1/servers/{id}/updates", get(mods::manage::server_updates_handler))
        .route("/v1/servers/{id}/hub-update", get(docker::hub::hub_update_handler))
        // Mod management
        .route("/v1/servers/{id}/mods", get(mods::manage::list_handler))
        .route("/v1/servers/{id}/mods", post(mods::manage::install_handler))
        .route("/v1/servers/{id}/mods/scan", get(mods::manage::scan_handler))
        .route("/v1/servers/{id}/mods/list", get(mods::manage::cached_list_handler))
        .route("/v1/servers/{id}/mods/updates", get(mods::manage::scan_updates_handler))
        .route("/v1/servers/{id}/mods/identify", post(mods::manage::identify_handler))
        .route("/v1/servers/{id}/mods/{file}", delete(mods::manage::delete_handler))
        .route("/v1/servers/{id}/mods/{file}/update", post(mods::manage::update_file_handler))
        .route("/v1/servers/{id}/manifest", post(mods::manage::manifest_handler))
        // Catalogs
        .route("/v1/modpacks", get(catalog::handlers::modpacks_handler))
        .route("/v1/mods/search", get(catalog::handlers::mod_search_handler))
        .route("/v1/mods/{source}/{mod_id}/files", get(catalog::handlers::mod_files_handler))
        .route("/v1/java/detect", get(catalog::handlers::java_detect_handler))
        // Backups
        .route("/v1/backups", get(servers::backups::list_handler))
        .route("/v1/backups/{name}", delete(servers::backups::delete_handler))
        .route("/v1/backups/{name}/restore", post(servers::backups::restore_handler))
        .route("/v1/servers/{id}/backups", post(servers::backups::create_handler))
        // Telemetry
        .route("/v1/agents/start", post(monitor::agent::start_agents_handler))
        .route("/v1/stream", get(stream::events::stream_handler))
        .fallback(handler_404);
    middlewares::middleware::stack(router)
}

async fn handler_404() -> Response {
    response::not_found()
}
