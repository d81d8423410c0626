#![allow(missing_docs)]

use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;

use crate::{MlClient, MlConfig};

/// Serve `app` on an ephemeral local port and return its base URL.
///
/// Stands in for the external ML service so the real HTTP client, timeouts
/// and error handling are exercised.
pub(crate) async fn spawn_test_ml_service(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Could not bind test ML service");
    let address = listener
        .local_addr()
        .expect("Could not get test ML service address");

    tokio::spawn(async move {
        axum::serve(listener, app)
            .await
            .expect("Test ML service failed");
    });

    format!("http://{address}")
}

pub(crate) fn test_ml_client(base_url: String, timeout: Duration) -> MlClient {
    MlClient::new(MlConfig {
        base_url,
        api_key: None,
        timeout,
    })
    .expect("Could not create ML client")
}
