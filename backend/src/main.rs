use backend::{app, AppState, Config};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "backend=info,santa_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().expect("config");
    let addr = config.listen_addr.clone();
    let app = app(AppState::from_config(config));
    info!(%addr, "starting server");
    axum::serve(
        tokio::net::TcpListener::bind(&addr).await.expect("bind"),
        app,
    )
    .await
    .expect("server error");
}
