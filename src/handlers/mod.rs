//! HTTP handlers

pub mod health;
pub mod records;
pub mod rules;

use axum::{
    extract::{FromRequest, FromRequestParts},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::AppError;

/// Query string extractor that fails with the failure envelope
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

/// JSON body extractor that fails with the failure envelope
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Success envelope shared by the management endpoints
pub fn succeed<T: Serialize>(result: T) -> Json<Value> {
    Json(json!({
        "status": "succeed",
        "error": null,
        "result": result
    }))
}
