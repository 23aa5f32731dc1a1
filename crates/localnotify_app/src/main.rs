use localnotify_app::app::{run, AppConfig};

fn main() {
    tracing_subscriber::fmt::init();
    let config = AppConfig::from_env().unwrap_or_default();
    match run(config) {
        Ok(summary) => tracing::info!(?summary, "demo finished"),
        Err(err) => eprintln!("Local notification demo failed: {err:#}"),
    }
}
