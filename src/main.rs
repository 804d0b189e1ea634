use booking_wizard::config::Settings;
use booking_wizard::route_handler::router;
use booking_wizard::state::new_application_state;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,booking_wizard=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env()?;
    let state = new_application_state(&settings)?;
    let router = router(state);

    let listener = tokio::net::TcpListener::bind(settings.listen_addr).await?;
    tracing::info!(
        addr = %settings.listen_addr,
        backend = %settings.backend_base_url,
        "booking wizard listening"
    );
    axum::serve(listener, router).await?;
    Ok(())
}
