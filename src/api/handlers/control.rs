use actix_web::{web, HttpResponse, Responder};
use log::debug;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::archive::engine::ArchiveEngine;
use crate::models::packet::ArchivePacket;
use crate::utils::error::ArchiveError;

/// Map a core error onto an HTTP status with a uniform
/// status/message body
pub fn error_response(error: &ArchiveError) -> HttpResponse {
    let body = serde_json::json!({
        "status": "error",
        "message": error.to_string(),
    });
    match error {
        ArchiveError::NotFound(_) => HttpResponse::NotFound().json(body),
        ArchiveError::AlreadyPresent(_) | ArchiveError::TableNotLoaded(_) => {
            HttpResponse::Conflict().json(body)
        }
        ArchiveError::ReservedIdentifier
        | ArchiveError::TableFull
        | ArchiveError::BadIndex { .. }
        | ArchiveError::BadValue(_)
        | ArchiveError::StringTooLong { .. }
        | ArchiveError::FileNameTooLong(_) => HttpResponse::BadRequest().json(body),
        _ => HttpResponse::InternalServerError().json(body),
    }
}

/// Submit one packet for filtering and archiving
pub async fn ingest_packet(
    engine: web::Data<Arc<RwLock<ArchiveEngine>>>,
    packet: web::Json<ArchivePacket>,
) -> impl Responder {
    let packet = packet.into_inner();
    debug!(
        "Ingesting packet {:#06x} ({} bytes)",
        packet.packet_id,
        packet.len()
    );
    let disposition = engine.write().await.process_packet(&packet);
    HttpResponse::Ok().json(disposition)
}

/// Enable packet archiving
pub async fn enable_archiving(engine: web::Data<Arc<RwLock<ArchiveEngine>>>) -> impl Responder {
    engine.write().await.set_app_enabled(true);
    HttpResponse::Ok().json(serde_json::json!({
        "status": "success",
        "enabled": true
    }))
}

/// Disable packet archiving
pub async fn disable_archiving(engine: web::Data<Arc<RwLock<ArchiveEngine>>>) -> impl Responder {
    engine.write().await.set_app_enabled(false);
    HttpResponse::Ok().json(serde_json::json!({
        "status": "success",
        "enabled": false
    }))
}

/// Close one destination's current file
pub async fn close_dest(
    engine: web::Data<Arc<RwLock<ArchiveEngine>>>,
    path: web::Path<usize>,
) -> impl Responder {
    let dest = path.into_inner();
    match engine.write().await.close_dest(dest) {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "status": "success",
            "message": format!("Destination {} closed", dest)
        })),
        Err(e) => error_response(&e),
    }
}

/// Close every destination's current file
pub async fn close_all(engine: web::Data<Arc<RwLock<ArchiveEngine>>>) -> impl Responder {
    engine.write().await.close_all();
    HttpResponse::Ok().json(serde_json::json!({
        "status": "success",
        "message": "All destinations closed"
    }))
}

/// Per-destination status snapshots plus the application enable flag
pub async fn get_status(engine: web::Data<Arc<RwLock<ArchiveEngine>>>) -> impl Responder {
    let engine = engine.read().await;
    HttpResponse::Ok().json(serde_json::json!({
        "enabled": engine.app_enabled(),
        "destinations": engine.status_snapshot(),
    }))
}

/// Running counters since startup
pub async fn get_counters(engine: web::Data<Arc<RwLock<ArchiveEngine>>>) -> impl Responder {
    HttpResponse::Ok().json(engine.read().await.counters())
}
