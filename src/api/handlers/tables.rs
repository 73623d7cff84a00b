use actix_web::{web, HttpResponse, Responder};
use log::info;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::api::handlers::control::error_response;
use crate::archive::dest::DestFileTable;
use crate::archive::engine::ArchiveEngine;
use crate::archive::filter::{FilterTable, FilterType};
use crate::archive::name::FileNameType;
use crate::utils::error::{ArchiveError, ArchiveResult};

/// Request to add a packet identifier to the filter table
#[derive(Deserialize)]
pub struct AddIdentifierRequest {
    pub packet_id: u32,
}

/// Request to change one filter rule; absent fields are left alone.
/// N/X/O travel together because they are validated as a unit.
#[derive(Deserialize)]
pub struct UpdateRuleRequest {
    pub dest_index: Option<u16>,
    pub clear_dest: Option<bool>,
    pub filter_type: Option<FilterType>,
    pub n: Option<u16>,
    pub x: Option<u16>,
    pub o: Option<u16>,
}

/// Request to change destination configuration; absent fields are left alone
#[derive(Deserialize)]
pub struct UpdateDestRequest {
    pub enabled: Option<bool>,
    pub name_type: Option<FileNameType>,
    pub max_size: Option<u64>,
    pub max_age_secs: Option<u32>,
    pub seq_count: Option<u32>,
    pub path: Option<String>,
    pub base: Option<String>,
    pub extension: Option<String>,
    pub move_path: Option<String>,
    pub clear_move_path: Option<bool>,
}

/// Load a whole filter table image
pub async fn load_filter_table(
    engine: web::Data<Arc<RwLock<ArchiveEngine>>>,
    table: web::Json<FilterTable>,
) -> impl Responder {
    let table = table.into_inner();
    info!("Filter table load requested: \"{}\"", table.descriptor);
    let summary = engine.write().await.load_filter_table(table);
    if summary.is_ok() {
        HttpResponse::Ok().json(summary)
    } else {
        HttpResponse::BadRequest().json(summary)
    }
}

/// Dump the current filter table image
pub async fn get_filter_table(engine: web::Data<Arc<RwLock<ArchiveEngine>>>) -> impl Responder {
    match engine.read().await.filter_table() {
        Some(table) => HttpResponse::Ok().json(table),
        None => error_response(&ArchiveError::TableNotLoaded("filter")),
    }
}

/// Load a whole destination table image
pub async fn load_dest_table(
    engine: web::Data<Arc<RwLock<ArchiveEngine>>>,
    table: web::Json<DestFileTable>,
) -> impl Responder {
    let table = table.into_inner();
    info!("Destination table load requested: \"{}\"", table.descriptor);
    let summary = engine.write().await.load_dest_table(table);
    if summary.is_ok() {
        HttpResponse::Ok().json(summary)
    } else {
        HttpResponse::BadRequest().json(summary)
    }
}

/// Dump the current destination table image
pub async fn get_dest_table(engine: web::Data<Arc<RwLock<ArchiveEngine>>>) -> impl Responder {
    match engine.read().await.dest_table() {
        Some(table) => HttpResponse::Ok().json(table),
        None => error_response(&ArchiveError::TableNotLoaded("destination")),
    }
}

/// Add a packet identifier to the filter table
pub async fn add_identifier(
    engine: web::Data<Arc<RwLock<ArchiveEngine>>>,
    req: web::Json<AddIdentifierRequest>,
) -> impl Responder {
    match engine.write().await.add_identifier(req.packet_id) {
        Ok(slot) => HttpResponse::Created().json(serde_json::json!({
            "status": "success",
            "slot": slot
        })),
        Err(e) => error_response(&e),
    }
}

/// Remove a packet identifier from the filter table
pub async fn remove_identifier(
    engine: web::Data<Arc<RwLock<ArchiveEngine>>>,
    path: web::Path<u32>,
) -> impl Responder {
    let packet_id = path.into_inner();
    match engine.write().await.remove_identifier(packet_id) {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "status": "success",
            "message": format!("Packet identifier {:#06x} removed", packet_id)
        })),
        Err(e) => error_response(&e),
    }
}

fn apply_rule_update(
    engine: &mut ArchiveEngine,
    packet_id: u32,
    rule_index: usize,
    req: &UpdateRuleRequest,
) -> ArchiveResult<()> {
    if req.clear_dest.unwrap_or(false) {
        engine.set_rule_dest(packet_id, rule_index, None)?;
    } else if let Some(dest) = req.dest_index {
        engine.set_rule_dest(packet_id, rule_index, Some(dest))?;
    }
    if let Some(filter_type) = req.filter_type {
        engine.set_rule_type(packet_id, rule_index, filter_type)?;
    }
    match (req.n, req.x, req.o) {
        (Some(n), Some(x), Some(o)) => engine.set_rule_params(packet_id, rule_index, n, x, o)?,
        (None, None, None) => {}
        _ => {
            return Err(ArchiveError::BadValue(
                "n, x and o must be supplied together".to_string(),
            ))
        }
    }
    Ok(())
}

/// Update one rule of a filter table entry
pub async fn update_rule(
    engine: web::Data<Arc<RwLock<ArchiveEngine>>>,
    path: web::Path<(u32, usize)>,
    req: web::Json<UpdateRuleRequest>,
) -> impl Responder {
    let (packet_id, rule_index) = path.into_inner();
    let req = req.into_inner();
    let mut engine = engine.write().await;
    match apply_rule_update(&mut engine, packet_id, rule_index, &req) {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "status": "success",
            "message": format!("Rule {} of {:#06x} updated", rule_index, packet_id)
        })),
        Err(e) => error_response(&e),
    }
}

fn apply_dest_update(
    engine: &mut ArchiveEngine,
    dest: usize,
    req: &UpdateDestRequest,
) -> ArchiveResult<()> {
    if let Some(enabled) = req.enabled {
        engine.set_dest_enabled(dest, enabled)?;
    }
    if let Some(name_type) = req.name_type {
        engine.set_dest_name_type(dest, name_type)?;
    }
    if let Some(max_size) = req.max_size {
        engine.set_dest_max_size(dest, max_size)?;
    }
    if let Some(max_age_secs) = req.max_age_secs {
        engine.set_dest_max_age(dest, max_age_secs)?;
    }
    if let Some(seq_count) = req.seq_count {
        engine.set_dest_seq_count(dest, seq_count)?;
    }
    if let Some(path) = &req.path {
        engine.set_dest_path(dest, path)?;
    }
    if let Some(base) = &req.base {
        engine.set_dest_base(dest, base)?;
    }
    if let Some(extension) = &req.extension {
        engine.set_dest_extension(dest, extension)?;
    }
    if req.clear_move_path.unwrap_or(false) {
        engine.set_dest_move_path(dest, None)?;
    } else if let Some(move_path) = &req.move_path {
        engine.set_dest_move_path(dest, Some(move_path))?;
    }
    Ok(())
}

/// Update one destination's configuration fields
pub async fn update_dest(
    engine: web::Data<Arc<RwLock<ArchiveEngine>>>,
    path: web::Path<usize>,
    req: web::Json<UpdateDestRequest>,
) -> impl Responder {
    let dest = path.into_inner();
    let req = req.into_inner();
    let mut engine = engine.write().await;
    match apply_dest_update(&mut engine, dest, &req) {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "status": "success",
            "message": format!("Destination {} updated", dest)
        })),
        Err(e) => error_response(&e),
    }
}
