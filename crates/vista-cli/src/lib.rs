//! Shared plumbing of the `vista` and `vista-worker` binaries.

use anyhow::Context;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use vista_core::models::content_type_from_key;
use vista_infra::{init_telemetry, LogFormat};

/// Install the tracing subscriber for a binary.
pub fn init_tracing(service_name: &str) -> anyhow::Result<()> {
    init_telemetry(service_name, LogFormat::from_env())
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))
}

pub fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

/// The explicit content type if given, otherwise one derived from the key's
/// extension.
pub fn resolve_content_type(key: &str, explicit: Option<String>) -> anyhow::Result<String> {
    match explicit {
        Some(content_type) => Ok(content_type),
        None => content_type_from_key(key).map(String::from).with_context(|| {
            format!(
                "Cannot infer a content type for {:?}, pass --content-type",
                key
            )
        }),
    }
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM.
///
/// # Panics
/// Panics if a signal handler cannot be installed.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal");
        },
    }
}

/// A token cancelled on the first shutdown signal.
pub fn cancel_on_signal() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        trigger.cancel();
    });
    token
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_content_type_wins() {
        let resolved = resolve_content_type("abc123.png", Some("image/webp".into())).unwrap();
        assert_eq!(resolved, "image/webp");
    }

    #[test]
    fn test_content_type_from_extension() {
        assert_eq!(resolve_content_type("abc123.png", None).unwrap(), "image/png");
        assert_eq!(
            resolve_content_type("clips/x.mov", None).unwrap(),
            "video/quicktime"
        );
    }

    #[test]
    fn test_unknown_extension_needs_flag() {
        let err = resolve_content_type("abc123", None).unwrap_err();
        assert!(err.to_string().contains("--content-type"));
    }
}
