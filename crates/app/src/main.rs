//! Conditions CLI

use std::{future, process, time::Duration};

use tokio::{signal, time};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use conditions_app::{config::AppConfig, context::AppContext, observability};

#[tokio::main]
pub async fn main() {
    // Load configuration from .env and CLI arguments
    let config = AppConfig::load().unwrap_or_else(|e| e.exit());

    if let Err(init_error) = observability::init(&config.logging) {
        eprintln!("{init_error}");

        process::exit(1);
    }

    let app = match AppContext::from_config(&config.database).await {
        Ok(app) => app,
        Err(init_error) => {
            error!("failed to initialize app context: {init_error}");

            process::exit(1);
        }
    };

    let cancel = CancellationToken::new();
    let timeout = Duration::from_millis(config.resolution.timeout_ms);

    tokio::spawn(cancel_on_deadline_or_interrupt(cancel.clone(), timeout));

    let point_in_time = config.resolution.point_in_time();

    info!(%point_in_time, "running command");

    match config
        .command
        .run(app.conditions.as_ref(), point_in_time, &cancel)
        .await
    {
        Ok(value) => match serde_json::to_string_pretty(&value) {
            Ok(output) => println!("{output}"),
            Err(encode_error) => {
                error!("failed to encode output: {encode_error}");

                process::exit(1);
            }
        },
        Err(run_error) => {
            error!("{run_error}");

            process::exit(1);
        }
    }
}

async fn cancel_on_deadline_or_interrupt(cancel: CancellationToken, timeout: Duration) {
    let interrupted = async {
        if let Err(source) = signal::ctrl_c().await {
            warn!("failed to install Ctrl+C handler: {source}");

            future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = time::sleep(timeout) => warn!(?timeout, "deadline reached, cancelling"),
        () = interrupted => info!("ctrl_c signal received, cancelling"),
    }

    cancel.cancel();
}
