pub mod metrics;
pub mod process;

pub use metrics::get_metrics;
pub use process::{get_host, list_processes};

use actix_web::{web, HttpResponse, Responder};

use crate::state::AppState;

pub async fn health(data: web::Data<AppState>) -> impl Responder {
    let hostname = match data.lock() {
        Ok(state) => state.hostname.clone(),
        Err(poisoned) => poisoned.into_inner().hostname.clone(),
    };
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "hostname": hostname
    }))
}
