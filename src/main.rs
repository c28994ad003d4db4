#[cfg(not(target_arch = "wasm32"))]
use anyhow::Result;
#[cfg(not(target_arch = "wasm32"))]
use std::sync::Arc;
#[cfg(not(target_arch = "wasm32"))]
use storyteller::core::config::Config;
#[cfg(not(target_arch = "wasm32"))]
use storyteller::core::session::FileSession;
#[cfg(not(target_arch = "wasm32"))]
use storyteller::services::{api::HttpStoryApi, auth::AuthService, chat::ChatController, setup, terminal};

#[cfg(not(target_arch = "wasm32"))]
#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    // 1. Load or create config
    let mut config = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            eprintln!("Please fix or remove 'config.yml'.");
            return Err(e);
        }
    };

    // 2. Session and API client
    let session = Arc::new(FileSession::new(&config.session_file));
    let api = Arc::new(HttpStoryApi::new(&config.api)?);
    let auth = AuthService::new(api.clone(), session.clone());

    // 3. Interactive setup (login, story selection)
    let story_id = setup::run_setup(&mut config, &auth).await?;

    // 4. Chat
    let controller = ChatController::new(api, session, story_id, &config.genre);
    terminal::run_chat(&controller, &auth).await?;

    Ok(())
}

#[cfg(target_arch = "wasm32")]
fn main() {}
