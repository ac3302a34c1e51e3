use actix_web::{web, HttpResponse, Responder};

use crate::state::AppState;

/// 最近一次发布的进程表快照
pub async fn list_processes(data: web::Data<AppState>) -> impl Responder {
    let state = match data.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };

    match &state.last_procs {
        Some(snapshot) => HttpResponse::Ok().json(snapshot),
        None => HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "status": "error",
            "message": "no process snapshot published yet"
        })),
    }
}

/// 最近一次发布的主机状态
pub async fn get_host(data: web::Data<AppState>) -> impl Responder {
    let state = match data.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };

    match &state.last_host {
        Some(snapshot) => HttpResponse::Ok().json(snapshot),
        None => HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "status": "error",
            "message": "no host snapshot published yet"
        })),
    }
}
