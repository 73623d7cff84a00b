use actix_web::{web, HttpResponse, Responder};
use serde_json::json;

use crate::api::handlers::{
    control::{
        close_all, close_dest, disable_archiving, enable_archiving, get_counters, get_status,
        ingest_packet,
    },
    tables::{
        add_identifier, get_dest_table, get_filter_table, load_dest_table, load_filter_table,
        remove_identifier, update_dest, update_rule,
    },
};

/// Root endpoint to provide information about the API
async fn index() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "name": "pktarchive API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "A selective telemetry packet archiver with REST API",
        "endpoints": [
            {
                "path": "/api/packets",
                "method": "POST",
                "description": "Submit a packet for filtering and archiving"
            },
            {
                "path": "/api/control/enable",
                "method": "PUT",
                "description": "Enable packet archiving"
            },
            {
                "path": "/api/control/disable",
                "method": "PUT",
                "description": "Disable packet archiving"
            },
            {
                "path": "/api/control/close/{index}",
                "method": "POST",
                "description": "Close one destination's current file"
            },
            {
                "path": "/api/control/close-all",
                "method": "POST",
                "description": "Close every destination's current file"
            },
            {
                "path": "/api/status",
                "method": "GET",
                "description": "Per-destination status snapshots"
            },
            {
                "path": "/api/counters",
                "method": "GET",
                "description": "Running archive counters"
            },
            {
                "path": "/api/tables/filter",
                "method": "PUT",
                "description": "Load a filter table image"
            },
            {
                "path": "/api/tables/filter",
                "method": "GET",
                "description": "Dump the current filter table image"
            },
            {
                "path": "/api/tables/filter/identifiers",
                "method": "POST",
                "description": "Add a packet identifier"
            },
            {
                "path": "/api/tables/filter/identifiers/{id}",
                "method": "DELETE",
                "description": "Remove a packet identifier"
            },
            {
                "path": "/api/tables/filter/identifiers/{id}/rules/{rule}",
                "method": "PUT",
                "description": "Update one filter rule"
            },
            {
                "path": "/api/tables/dest",
                "method": "PUT",
                "description": "Load a destination table image"
            },
            {
                "path": "/api/tables/dest",
                "method": "GET",
                "description": "Dump the current destination table image"
            },
            {
                "path": "/api/tables/dest/{index}",
                "method": "PUT",
                "description": "Update one destination's configuration"
            }
        ]
    }))
}

/// Configure API routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        // Root endpoint
        .route("/", web::get().to(index))
        .service(
            web::scope("/api")
                // Packet ingest (the message-bus boundary)
                .route("/packets", web::post().to(ingest_packet))
                // Archiving control
                .service(
                    web::scope("/control")
                        .route("/enable", web::put().to(enable_archiving))
                        .route("/disable", web::put().to(disable_archiving))
                        .route("/close/{index}", web::post().to(close_dest))
                        .route("/close-all", web::post().to(close_all)),
                )
                // Telemetry reporting
                .route("/status", web::get().to(get_status))
                .route("/counters", web::get().to(get_counters))
                // Table management
                .service(
                    web::scope("/tables")
                        .route("/filter", web::put().to(load_filter_table))
                        .route("/filter", web::get().to(get_filter_table))
                        .route("/filter/identifiers", web::post().to(add_identifier))
                        .route(
                            "/filter/identifiers/{id}",
                            web::delete().to(remove_identifier),
                        )
                        .route(
                            "/filter/identifiers/{id}/rules/{rule}",
                            web::put().to(update_rule),
                        )
                        .route("/dest", web::put().to(load_dest_table))
                        .route("/dest", web::get().to(get_dest_table))
                        .route("/dest/{index}", web::put().to(update_dest)),
                ),
        );
}
