use actix_web::{get, HttpResponse, Responder};
use chrono::NaiveDateTime;
use once_cell::sync::OnceCell;
use serde::Serialize;

static START_TIME: OnceCell<NaiveDateTime> = OnceCell::new();

pub fn init() {
    START_TIME
        .set(chrono::Utc::now().naive_utc())
        .expect("failed to set START_TIME");
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    started_at: String,
    uptime_seconds: i64,
}

#[get("/status")]
pub async fn view_status() -> impl Responder {
    let started = *START_TIME.get().expect("status::init() was not called");
    let now = chrono::Utc::now().naive_utc();

    HttpResponse::Ok().json(StatusResponse {
        status: "ok",
        started_at: started.format("%Y-%m-%d %H:%M:%S").to_string(),
        uptime_seconds: (now - started).num_seconds(),
    })
}
