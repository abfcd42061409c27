//! HTTP API handlers.
//!
//! Defines the Actix routes for uploads, transport control, status and debug info.
//! Player calls can wait on the queue lock, so they run on the blocking pool.

use actix_multipart::Multipart;
use actix_web::guard::GuardContext;
use actix_web::http::{StatusCode, header};
use actix_web::{HttpResponse, Responder, get, mime, post, web};
use futures_util::StreamExt;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct QueuedResponse {
    /// Absolute queue index of the uploaded track.
    pub queued: u64,
}

#[derive(Serialize)]
pub struct QueuedBatchResponse {
    /// Queue indices of the uploaded files, in form order.
    pub queued: Vec<u64>,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(code: StatusCode, error: impl std::fmt::Display) -> HttpResponse {
    HttpResponse::build(code).json(ErrorResponse {
        error: error.to_string(),
    })
}

fn internal_error(error: impl std::fmt::Display) -> HttpResponse {
    error_response(StatusCode::INTERNAL_SERVER_ERROR, error)
}

fn is_form(ctx: &GuardContext) -> bool {
    ctx.header::<header::ContentType>().is_some_and(|ct| {
        ct.0.type_() == mime::MULTIPART && ct.0.subtype() == mime::FORM_DATA
    })
}

/// Register every API route on `cfg`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(upload_form)
        .service(upload)
        .service(play)
        .service(pause)
        .service(next)
        .service(previous)
        .service(status)
        .service(debug);
}

#[post("/music")]
/// Enqueue the raw request body as one track. Used for any non-form content type.
pub async fn upload(state: web::Data<AppState>, body: web::Bytes) -> impl Responder {
    state.count_request();
    let size = body.len();
    let player = state.player.clone();
    let result = web::block(move || player.enqueue_copy(&mut body.as_ref())).await;
    match result {
        Ok(Ok(index)) => {
            tracing::info!(index, size, "track uploaded");
            HttpResponse::Ok().json(QueuedResponse { queued: index })
        }
        Ok(Err(e)) => {
            tracing::warn!(size, "upload rejected: {e}");
            internal_error(e)
        }
        Err(e) => internal_error(e),
    }
}

#[post("/music", guard = "is_form")]
/// Enqueue every file part of a `multipart/form-data` body.
///
/// Non-file fields are skipped. The combined size of the file parts is capped at
/// the upload limit.
pub async fn upload_form(state: web::Data<AppState>, mut form: Multipart) -> impl Responder {
    state.count_request();
    let mut queued = Vec::new();
    let mut total = 0usize;

    while let Some(field) = form.next().await {
        let mut field = match field {
            Ok(field) => field,
            Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
        };
        let is_file = field
            .content_disposition()
            .is_some_and(|cd| cd.get_filename().is_some());
        if !is_file {
            continue;
        }

        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
            };
            total += chunk.len();
            if total > state.max_upload {
                tracing::warn!(total, limit = state.max_upload, "form upload too large");
                return error_response(
                    StatusCode::PAYLOAD_TOO_LARGE,
                    "upload exceeds size limit",
                );
            }
            data.extend_from_slice(&chunk);
        }

        let size = data.len();
        let player = state.player.clone();
        match web::block(move || player.enqueue_copy(&mut data.as_slice())).await {
            Ok(Ok(index)) => {
                tracing::info!(index, size, "track uploaded");
                queued.push(index);
            }
            Ok(Err(e)) => {
                tracing::warn!(size, "upload rejected: {e}");
                return internal_error(e);
            }
            Err(e) => return internal_error(e),
        }
    }

    HttpResponse::Ok().json(QueuedBatchResponse { queued })
}

#[post("/play")]
/// Start or resume playback.
pub async fn play(state: web::Data<AppState>) -> impl Responder {
    state.count_request();
    let player = state.player.clone();
    control(move || player.play()).await
}

#[post("/pause")]
/// Pause playback.
pub async fn pause(state: web::Data<AppState>) -> impl Responder {
    state.count_request();
    let player = state.player.clone();
    control(move || player.pause()).await
}

#[post("/next")]
/// Skip to the next track.
pub async fn next(state: web::Data<AppState>) -> impl Responder {
    state.count_request();
    let player = state.player.clone();
    control(move || player.next()).await
}

#[post("/previous")]
/// Go back one track and replay it.
pub async fn previous(state: web::Data<AppState>) -> impl Responder {
    state.count_request();
    let player = state.player.clone();
    control(move || player.previous()).await
}

#[get("/status")]
pub async fn status(state: web::Data<AppState>) -> impl Responder {
    let player = state.player.clone();
    match web::block(move || player.status()).await {
        Ok(status) => HttpResponse::Ok().json(status),
        Err(e) => internal_error(e),
    }
}

#[get("/debug")]
/// Plain-text process info.
pub async fn debug(state: web::Data<AppState>) -> impl Responder {
    let requests = state.count_request();
    let body = format!(
        "iom-server {}\nrequests: {}\nuptime: {}s\n",
        env!("CARGO_PKG_VERSION"),
        requests,
        state.uptime().as_secs()
    );
    HttpResponse::Ok().content_type("text/plain; charset=utf-8").body(body)
}

async fn control<F>(f: F) -> HttpResponse
where
    F: FnOnce() + Send + 'static,
{
    match web::block(f).await {
        Ok(()) => HttpResponse::Ok().finish(),
        Err(e) => internal_error(e),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use actix_web::{App, test};
    use iom_player::output::{AudioOutput, DoneCallback, TrackInfo};
    use iom_player::samples::SampleQueue;
    use iom_player::{Player, PlayerConfig, QueueConfig};
    use tempfile::TempDir;

    use super::*;

    /// Accepts streams and never finishes them.
    #[derive(Clone, Default)]
    struct SilentOutput {
        played: Arc<Mutex<Vec<u64>>>,
    }

    impl AudioOutput for SilentOutput {
        fn init(&mut self, sample_rate: u32, _buffer_frames: u32) -> anyhow::Result<u32> {
            Ok(sample_rate)
        }

        fn play(
            &mut self,
            _samples: Arc<SampleQueue>,
            info: TrackInfo,
            _on_done: DoneCallback,
        ) -> anyhow::Result<()> {
            self.played.lock().unwrap().push(info.index);
            Ok(())
        }

        fn clear(&mut self) {}

        fn set_paused(&mut self, _paused: bool) {}
    }

    fn make_state(dir: &TempDir, max_upload: usize) -> (web::Data<AppState>, SilentOutput) {
        let output = SilentOutput::default();
        let queue = QueueConfig {
            spill_dir: dir.path().to_path_buf(),
            ..QueueConfig::default()
        };
        let player = Player::new(queue, PlayerConfig::default(), Box::new(output.clone()));
        (
            web::Data::new(AppState::new(Arc::new(player), max_upload)),
            output,
        )
    }

    /// 16-bit mono PCM WAV of `frames` silent frames.
    fn wav(frames: u32) -> Vec<u8> {
        let data_len = frames * 2;
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVEfmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&44_100u32.to_le_bytes());
        out.extend_from_slice(&88_200u32.to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        out.resize(out.len() + data_len as usize, 0);
        out
    }

    #[actix_web::test]
    async fn upload_returns_queue_index() {
        let dir = TempDir::new().unwrap();
        let (state, _) = make_state(&dir, 1 << 20);
        let app = test::init_service(App::new().app_data(state.clone()).configure(configure)).await;

        for expected in 0..2u64 {
            let req = test::TestRequest::post()
                .uri("/music")
                .set_payload(wav(64))
                .to_request();
            let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
            assert_eq!(resp["queued"], expected);
        }
        assert_eq!(state.player.status().queued, 2);
    }

    fn form_body(boundary: &str, parts: &[(&str, Option<&str>, Vec<u8>)]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, filename, data) in parts {
            body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
            let disposition = match filename {
                Some(file) => format!("form-data; name=\"{name}\"; filename=\"{file}\""),
                None => format!("form-data; name=\"{name}\""),
            };
            body.extend_from_slice(format!("Content-Disposition: {disposition}\r\n").as_bytes());
            if filename.is_some() {
                body.extend_from_slice(b"Content-Type: application/octet-stream\r\n");
            }
            body.extend_from_slice(b"\r\n");
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
        body
    }

    #[actix_web::test]
    async fn form_upload_enqueues_every_file_part() {
        let dir = TempDir::new().unwrap();
        let (state, output) = make_state(&dir, 1 << 20);
        let app = test::init_service(App::new().app_data(state.clone()).configure(configure)).await;

        let body = form_body(
            "iomboundary",
            &[
                ("first", Some("a.wav"), wav(64)),
                ("note", None, b"not a track".to_vec()),
                ("second", Some("b.wav"), wav(32)),
            ],
        );
        let req = test::TestRequest::post()
            .uri("/music")
            .insert_header((
                header::CONTENT_TYPE,
                "multipart/form-data; boundary=iomboundary",
            ))
            .set_payload(body)
            .to_request();
        let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp["queued"], serde_json::json!([0, 1]));
        assert_eq!(state.player.status().queued, 2);

        // The stored item is the file itself, not the form envelope.
        state.player.play();
        let mut started = false;
        for _ in 0..200 {
            if output.played.lock().unwrap().as_slice() == [0] {
                started = true;
                break;
            }
            actix_web::rt::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(started);
        assert!(state.player.status().last_error.is_none());
        state.player.shutdown().unwrap();
    }

    #[actix_web::test]
    async fn oversized_form_upload_is_rejected() {
        let dir = TempDir::new().unwrap();
        let (state, _) = make_state(&dir, 256);
        let app = test::init_service(App::new().app_data(state.clone()).configure(configure)).await;

        let body = form_body("iomboundary", &[("big", Some("big.wav"), wav(1024))]);
        let req = test::TestRequest::post()
            .uri("/music")
            .insert_header((
                header::CONTENT_TYPE,
                "multipart/form-data; boundary=iomboundary",
            ))
            .set_payload(body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(state.player.status().queued, 0);
    }

    #[actix_web::test]
    async fn oversized_upload_is_rejected() {
        let dir = TempDir::new().unwrap();
        let (state, _) = make_state(&dir, 16);
        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .app_data(web::PayloadConfig::new(16))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/music")
            .set_payload(vec![0u8; 64])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_client_error());
        assert_eq!(state.player.status().queued, 0);
    }

    #[actix_web::test]
    async fn play_on_empty_queue_succeeds_without_starting() {
        let dir = TempDir::new().unwrap();
        let (state, output) = make_state(&dir, 1 << 20);
        let app = test::init_service(App::new().app_data(state.clone()).configure(configure)).await;

        let req = test::TestRequest::post().uri("/play").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let req = test::TestRequest::get().uri("/status").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["handling"], false);
        assert!(body["index"].is_null());
        assert!(output.played.lock().unwrap().is_empty());
    }

    #[actix_web::test]
    async fn transport_routes_drive_the_player() {
        let dir = TempDir::new().unwrap();
        let (state, output) = make_state(&dir, 1 << 20);
        let app = test::init_service(App::new().app_data(state.clone()).configure(configure)).await;

        for _ in 0..2 {
            let req = test::TestRequest::post()
                .uri("/music")
                .set_payload(wav(64))
                .to_request();
            assert!(test::call_service(&app, req).await.status().is_success());
        }

        for uri in ["/play", "/pause"] {
            let req = test::TestRequest::post().uri(uri).to_request();
            assert!(test::call_service(&app, req).await.status().is_success());
        }

        let mut started = false;
        for _ in 0..200 {
            if output.played.lock().unwrap().as_slice() == [0] {
                started = true;
                break;
            }
            actix_web::rt::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(started);

        let req = test::TestRequest::get().uri("/status").to_request();
        let body: PlayerStatusJson = test::call_and_read_body_json(&app, req).await;
        assert!(body.paused);
        assert!(body.handling);
        assert_eq!(body.index, Some(0));
        assert_eq!(body.queued, 2);

        let req = test::TestRequest::post().uri("/next").to_request();
        assert!(test::call_service(&app, req).await.status().is_success());
        let mut advanced = false;
        for _ in 0..200 {
            if output.played.lock().unwrap().as_slice() == [0, 1] {
                advanced = true;
                break;
            }
            actix_web::rt::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(advanced);

        let req = test::TestRequest::post().uri("/previous").to_request();
        assert!(test::call_service(&app, req).await.status().is_success());

        state.player.shutdown().unwrap();
    }

    #[derive(serde::Deserialize)]
    struct PlayerStatusJson {
        paused: bool,
        handling: bool,
        index: Option<u64>,
        queued: u64,
    }

    #[actix_web::test]
    async fn debug_reports_request_count() {
        let dir = TempDir::new().unwrap();
        let (state, _) = make_state(&dir, 1 << 20);
        let app = test::init_service(App::new().app_data(state.clone()).configure(configure)).await;

        let req = test::TestRequest::post().uri("/pause").to_request();
        test::call_service(&app, req).await;

        let req = test::TestRequest::get().uri("/debug").to_request();
        let body = test::call_and_read_body(&app, req).await;
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.starts_with("iom-server "));
        assert!(text.contains("requests: 2"));
        assert_eq!(state.request_count(), 2);
    }
}
