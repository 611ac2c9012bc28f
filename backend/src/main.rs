use actix_cors::Cors;
use actix_web::{App, HttpServer, web};
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::Client as DynamoDbClient;
use aws_sdk_s3::Client as S3Client;
use std::env;
use std::sync::Arc;

use cropdoc::auth::jwt::JwtService;
use cropdoc::auth::middleware::AuthMiddleware;
use cropdoc::config::{AppConfig, BlobBackend, ClassifierConfig, RecordBackend};
use cropdoc::db::{DynamoDbRepository, MemoryRepository, RecordStore, SupabaseRepository};
use cropdoc::dispatch::{Dispatcher, StrategyRegistry};
use cropdoc::inference::{ClassificationEngine, ModelSlot, Preprocessor};
use cropdoc::ingest::ImageIngestor;
use cropdoc::routes::configure_routes;
use cropdoc::service::PredictionService;
use cropdoc::storage::{BlobStore, LocalDirStore, S3Service};

fn startup_error(context: &str, e: impl std::fmt::Display) -> std::io::Error {
    log::error!("{}: {}", context, e);
    std::io::Error::other(format!("{}: {}", context, e))
}

#[cfg(feature = "torch")]
fn load_model(
    config: &AppConfig,
    classifier: &ClassifierConfig,
    slot: &ModelSlot,
) -> std::io::Result<()> {
    let model = cropdoc::inference::TorchModel::load(
        &config.model_path,
        classifier.model.apply_softmax,
    )
    .map_err(|e| startup_error("Model loading failed", e))?;
    slot.install(Arc::new(model));
    Ok(())
}

#[cfg(not(feature = "torch"))]
fn load_model(
    config: &AppConfig,
    _classifier: &ClassifierConfig,
    _slot: &ModelSlot,
) -> std::io::Result<()> {
    log::warn!(
        "Built without the `torch` feature; {} not loaded, model-backed crops are unavailable",
        config.model_path.display()
    );
    Ok(())
}

async fn build_blob_store(
    config: &AppConfig,
    aws_config: Option<&aws_config::SdkConfig>,
) -> std::io::Result<Arc<dyn BlobStore>> {
    match (config.blob_backend, &config.s3, aws_config) {
        (BlobBackend::S3, Some(s3), Some(aws_config)) => {
            log::info!("Storing uploads in s3://{}/{}", s3.bucket, s3.key_prefix);
            Ok(Arc::new(S3Service::new(
                S3Client::new(aws_config),
                s3.bucket.clone(),
                s3.key_prefix.clone(),
                config.public_upload_prefix.clone(),
            )))
        }
        (BlobBackend::S3, _, _) => Err(startup_error("S3 storage", "missing S3 settings")),
        (BlobBackend::Local, _, _) => {
            tokio::fs::create_dir_all(&config.upload_dir)
                .await
                .map_err(|e| startup_error("Creating upload directory", e))?;
            log::info!("Storing uploads in {}", config.upload_dir.display());
            Ok(Arc::new(LocalDirStore::new(
                config.upload_dir.clone(),
                config.public_upload_prefix.clone(),
            )))
        }
    }
}

fn build_record_store(
    config: &AppConfig,
    aws_config: Option<&aws_config::SdkConfig>,
) -> std::io::Result<Arc<dyn RecordStore>> {
    match config.record_backend {
        RecordBackend::Memory => {
            log::warn!("Using in-memory prediction history; records are lost on restart");
            Ok(Arc::new(MemoryRepository::new()))
        }
        RecordBackend::DynamoDb => {
            let (Some(settings), Some(aws_config)) = (&config.dynamodb, aws_config) else {
                return Err(startup_error("DynamoDB history", "missing DynamoDB settings"));
            };
            log::info!("Prediction history in DynamoDB table '{}'", settings.table);
            Ok(Arc::new(DynamoDbRepository::new(
                DynamoDbClient::new(aws_config),
                settings.table.clone(),
                settings.user_index.clone(),
            )))
        }
        RecordBackend::Supabase => {
            let Some(settings) = &config.supabase else {
                return Err(startup_error("Supabase history", "missing Supabase settings"));
            };
            log::info!("Prediction history in Supabase table '{}'", settings.table);
            let repo = SupabaseRepository::new(
                reqwest::Client::new(),
                &settings.url,
                settings.key.clone(),
                &settings.table,
            )
            .map_err(|e| startup_error("Supabase history", e))?;
            Ok(Arc::new(repo))
        }
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    } else {
        log::error!("Failed to get the current working directory.");
    }

    let config = AppConfig::from_env().map_err(|e| startup_error("Invalid configuration", e))?;
    let classifier_config = ClassifierConfig::load(&config.classifier_config)
        .map_err(|e| startup_error("Invalid classifier config", e))?;

    // The model must be in place before the server accepts requests.
    let model_slot = ModelSlot::empty();
    load_model(&config, &classifier_config, &model_slot)?;

    let needs_aws = config.blob_backend == BlobBackend::S3
        || config.record_backend == RecordBackend::DynamoDb;
    let aws_config = if needs_aws {
        Some(aws_config::defaults(BehaviorVersion::latest()).load().await)
    } else {
        None
    };

    let blobs = build_blob_store(&config, aws_config.as_ref()).await?;
    let records = build_record_store(&config, aws_config.as_ref())?;

    let preprocessor = Preprocessor::from_config(&classifier_config)
        .map_err(|e| startup_error("Invalid classifier config", e))?;
    let engine = ClassificationEngine::new(
        model_slot.clone(),
        preprocessor,
        classifier_config.model.classes.clone(),
        classifier_config.model.method.clone(),
    );
    let registry = StrategyRegistry::from_config(&classifier_config, Arc::new(engine));
    for crop in registry.describe().crops {
        log::info!("Crop '{}' -> {} strategy", crop.crop, crop.strategy);
    }

    let service = PredictionService::new(
        ImageIngestor::new(blobs.clone(), config.max_upload_bytes),
        Dispatcher::new(registry, blobs),
        records,
    );

    let auth_middleware = AuthMiddleware::new(JwtService::new(
        &config.jwt_secret,
        config.jwt_audience.clone(),
    ));

    let bind_address = format!("0.0.0.0:{}", config.port);
    log::info!("Starting server on {}", bind_address);

    let service = web::Data::new(service);
    let model_slot = web::Data::new(model_slot);
    HttpServer::new(move || {
        App::new()
            .wrap(auth_middleware.clone())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::AUTHORIZATION,
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(service.clone())
            .app_data(model_slot.clone())
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}
