use simple_code_review::AppState;
use simple_code_review::ai::AiCodeReviewer;
use simple_code_review::api;
use simple_code_review::config::ReviewConfig;
use simple_code_review::error::{Result, ReviewError};
use simple_code_review::github::GitHubClient;
use simple_code_review::logging::setup_logging;
use simple_code_review::notify::NotifierSet;
use simple_code_review::service::{ReviewOptions, ReviewService};
use simple_code_review::signature::SignatureValidator;
use std::sync::Arc;
use tracing::info;

const DEFAULT_CONFIG_PATH: &str = "review_config.toml";

fn build_service(config: &ReviewConfig) -> Result<ReviewService> {
    let github = GitHubClient::new(&config.github.token, config.github.api_base_url.as_str())?;

    let (api_key, base_url) = config
        .ai
        .endpoint()
        .ok_or_else(|| ReviewError::ConfigError("No AI API key configured".into()))?;
    let analyzer = AiCodeReviewer::new(&api_key, base_url, config.ai.model.as_str())?;

    let notifiers = NotifierSet::from_config(config)?;

    Ok(ReviewService::new(
        SignatureValidator::new(config.github.webhook_secret.as_str()),
        Arc::new(github),
        Arc::new(analyzer),
        notifiers,
        ReviewOptions {
            push_review_enabled: config.github.push_review_enabled,
            pr_review_enabled: config.github.pr_review_enabled,
        },
    ))
}

async fn run() -> Result<()> {
    dotenv::dotenv().ok();

    let config_path =
        std::env::var("REVIEW_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = ReviewConfig::load(&config_path)?;

    let (events, _log_guard) = setup_logging(&config.logging)?;
    info!("Using config at {:?}", config_path);

    let service = build_service(&config)?;
    info!(
        channels = ?service.notifiers().channel_names(),
        push_review = config.github.push_review_enabled,
        pr_review = config.github.pr_review_enabled,
        "Review service ready"
    );

    let bind_address = config.server.bind_address.clone();
    let state = Arc::new(AppState::new(Arc::new(service), Arc::new(config), events));
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!("Listening on {}", bind_address);
    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Fatal error: {}", e);
        std::process::exit(1);
    }
}
