use route_line_demo::{Settings, logging, run};

fn main() {
    logging::setup_logging();
    let settings = Settings::from_cli();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to start the async runtime: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(settings)) {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}
