//! A throwaway HTTP server for exercising adapters end to end.

use axum::Router;
use tokio::net::TcpListener;

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn serve(router: Router) -> String {
  let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test server");
  let addr = listener.local_addr().expect("local addr");
  tokio::spawn(async move {
    axum::serve(listener, router).await.expect("test server");
  });
  format!("http://{addr}")
}
