// Módulos de la aplicación
mod api;
mod app_state;
mod chat;
mod config;
mod console;
mod help;
mod knowledge;
mod links;
mod models;
mod render;

use crate::app_state::AppState;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Cargar .env e inicializar logging (a stderr, para no mezclarlo con la consola)
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // 2. Cargar configuración
    let cfg = config::AppConfig::from_env()?;
    info!("Backend del supervisor en {}", cfg.api_base_url);

    // 3. Crear estado compartido (cliente HTTP + motores de chat y conocimiento)
    let app_state = AppState::from_config(cfg);

    // 4. Consola interactiva hasta :quit o fin de la entrada
    console::run(app_state).await?;

    info!("✅ Cliente cerrado correctamente.");
    Ok(())
}
