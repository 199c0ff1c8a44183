use std::sync::Arc;

use clap::Parser;
use gangsheet::api;
use gangsheet::assembler::Assembler;
use gangsheet::config::ServerConfig;
use gangsheet::extractor::InMemoryDesignLookup;
use gangsheet::render::SvgRenderer;
use gangsheet::settings::{InMemorySettingsStore, SettingsResolver};
use gangsheet::store::InMemoryGangsheetStore;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::parse();

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_file)?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_target(false)
        .with_ansi(false)
        .with_max_level(Level::INFO)
        .init();

    let _sentry = config.sentry_dsn.as_deref().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    let lookup = match &config.designs_file {
        Some(path) => {
            let lookup = InMemoryDesignLookup::from_json(&std::fs::read_to_string(path)?)?;
            tracing::info!(path = %path.display(), "loaded design records");
            lookup
        }
        None => InMemoryDesignLookup::default(),
    };

    let assembler = Arc::new(Assembler::new(
        SettingsResolver::new(Arc::new(InMemorySettingsStore::default())),
        Arc::new(lookup),
        Arc::new(InMemoryGangsheetStore::default()),
        Arc::new(SvgRenderer::new(
            config.render_dir.clone(),
            config.public_base_url.clone(),
        )),
        config.render_timeout(),
    ));

    let app = api::router(assembler).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, render_dir = %config.render_dir.display(), "listening");
    eprintln!("Listening on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
