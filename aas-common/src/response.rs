use std::fmt::{Debug, Display};

use anyhow::Error;
use axum::Json;
use axum::response::{IntoResponse, Response};
use reqwest::StatusCode;

pub fn print_error<T>(e: T)
where
    T: Into<Error> + Display + Debug,
{
    tracing::error!("{:?}", e.into());
}

fn err_resp<T>(e: T, code: StatusCode) -> Response
where
    T: Into<Error> + Display + Debug,
{
    let reason = format!("{e}");
    print_error(e);
    (code, Json(serde_json::json!({"reason": reason}))).into_response()
}

pub fn not_found<T>(e: T) -> Response
where
    T: Into<Error> + Display + Debug,
{
    err_resp(e, StatusCode::NOT_FOUND)
}

pub fn conflict<T>(e: T) -> Response
where
    T: Into<Error> + Display + Debug,
{
    err_resp(e, StatusCode::CONFLICT)
}

pub fn error<T>(e: T) -> Response
where
    T: Into<Error> + Display + Debug,
{
    err_resp(e, StatusCode::INTERNAL_SERVER_ERROR)
}

pub fn created(message: &str) -> Response {
    (StatusCode::CREATED, Json(serde_json::json!({"message": message}))).into_response()
}
