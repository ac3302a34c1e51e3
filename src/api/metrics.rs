use actix_web::{HttpResponse, Responder};

use crate::metrics::METRICS;

/// gauge 由状态发布周期更新，这里只负责渲染
pub async fn get_metrics() -> impl Responder {
    match METRICS.render() {
        Ok(metrics_text) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(metrics_text),
        Err(e) => {
            log::error!("Failed to render metrics: {}", e);
            HttpResponse::InternalServerError().body("Failed to render metrics")
        }
    }
}
