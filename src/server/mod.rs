use axum::Router;
use axum::routing::post;
use tokio::net::TcpListener;

use crate::error::Result;

pub mod handlers;
pub mod helpers;
pub mod state;

use state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/submitTask", post(handlers::submit_task))
        .route("/dryrun/assignment-policy", post(handlers::dry_run_assignment))
        .route("/dryrun/end-to-end", post(handlers::dry_run_end_to_end))
        .route("/dryrun/validate-graph", post(handlers::dry_run_validate_graph))
        .with_state(state)
}

pub async fn serve(bind: &str, state: AppState) -> Result<()> {
    let listener = TcpListener::bind(bind).await?;
    log::info!("vDAG API listening on http://{}", bind);

    axum::serve(listener, router(state)).await?;
    Ok(())
}
