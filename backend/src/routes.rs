use actix_multipart::Multipart;
use actix_web::http::header;
use actix_web::{Error, HttpResponse, web};
use futures::{StreamExt, TryStreamExt};
use log::{error, info};
use serde::Serialize;
use serde_json::json;

use crate::auth::middleware::AuthenticatedUser;
use crate::error::PredictionError;
use crate::inference::ModelSlot;
use crate::ingest::ImageUpload;
use crate::service::PredictionService;
use crate::storage::{StorageError, content_type_for};

const MAX_CROP_FIELD_BYTES: usize = 256;

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/health").route(web::get().to(health)))
        .service(web::resource("/api/predict").route(web::post().to(handle_prediction)))
        .service(web::resource("/api/history").route(web::get().to(history)))
        .service(web::resource("/api/crops").route(web::get().to(crops)))
        .service(web::resource("/auth/me").route(web::get().to(me)))
        .service(web::resource("/uploads/{filename}").route(web::get().to(uploaded_file)));
}

struct PredictionForm {
    crop: Option<String>,
    image: ImageUpload,
}

async fn read_prediction_form(
    mut payload: Multipart,
    max_image_bytes: usize,
) -> Result<PredictionForm, Error> {
    let mut form = PredictionForm {
        crop: None,
        image: ImageUpload::default(),
    };

    while let Some(mut field) = payload.try_next().await? {
        let name = field.name().unwrap_or_default().to_string();
        let limit = match name.as_str() {
            "crop" => MAX_CROP_FIELD_BYTES,
            "image" => max_image_bytes,
            _ => 0,
        };
        if name == "image" {
            form.image.filename = field
                .content_disposition()
                .and_then(|cd| cd.get_filename())
                .map(str::to_string);
        }

        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk?;
            if limit == 0 {
                continue;
            }
            if data.len() + chunk.len() > limit {
                let message = format!("field '{}' exceeds {} bytes", name, limit);
                return Err(match name.as_str() {
                    "image" => PredictionError::InvalidUpload(message).into(),
                    _ => actix_web::error::ErrorBadRequest(message),
                });
            }
            data.extend_from_slice(&chunk);
        }

        match name.as_str() {
            "crop" => {
                let crop = String::from_utf8(data)
                    .map_err(|_| actix_web::error::ErrorBadRequest("crop is not valid UTF-8"))?;
                form.crop = Some(crop);
            }
            "image" => form.image.bytes = data,
            _ => {}
        }
    }
    Ok(form)
}

async fn handle_prediction(
    user: AuthenticatedUser,
    service: web::Data<PredictionService>,
    payload: Multipart,
) -> Result<HttpResponse, Error> {
    let form = read_prediction_form(payload, service.max_upload_bytes()).await?;
    let crop = form.crop.unwrap_or_default();
    info!("Prediction requested by {} for crop '{}'", user.id(), crop);

    let response = service
        .handle_prediction(user.id(), &crop, form.image)
        .await
        .map_err(|e| {
            error!("Prediction failed for {}: {}", user.id(), e);
            e
        })?;
    Ok(HttpResponse::Ok().json(response))
}

async fn history(
    user: AuthenticatedUser,
    service: web::Data<PredictionService>,
) -> Result<HttpResponse, Error> {
    let history = service.history(user.id()).await?;
    info!("Returning {} history records for {}", history.records.len(), user.id());
    Ok(HttpResponse::Ok().json(history))
}

async fn crops(service: web::Data<PredictionService>) -> HttpResponse {
    HttpResponse::Ok().json(service.dispatcher().registry().describe())
}

async fn me(user: AuthenticatedUser) -> HttpResponse {
    HttpResponse::Ok().json(user.0)
}

async fn health(model: web::Data<ModelSlot>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "model_loaded": model.is_loaded(),
    }))
}

async fn uploaded_file(
    service: web::Data<PredictionService>,
    path: web::Path<String>,
) -> HttpResponse {
    let filename = path.into_inner();
    match service.image(&filename).await {
        Ok(bytes) => HttpResponse::Ok()
            .insert_header((header::CONTENT_TYPE, content_type_for(&filename)))
            .insert_header((header::CACHE_CONTROL, "private, max-age=86400, immutable"))
            .body(bytes),
        Err(StorageError::NotFound(_)) | Err(StorageError::InvalidName(_)) => {
            HttpResponse::NotFound().json(ErrorResponse {
                error: "Image not found".into(),
            })
        }
        Err(e) => {
            error!("Error reading upload {}: {}", filename, e);
            HttpResponse::BadGateway().json(ErrorResponse {
                error: "Image storage unavailable".into(),
            })
        }
    }
}
