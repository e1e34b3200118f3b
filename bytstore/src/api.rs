//! API REST du dépôt de programmes
//!
//! Surface de lecture consommée par les nœuds (`/programs`, `/metadata`,
//! `/snapshot`, `/fingerprint`) et surface d'écriture utilisée par l'outil
//! d'édition. Le routeur est relatif : il est monté sous `/api`.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

use crate::metadata::ProgramMetadata;
use crate::program::Program;
use crate::snapshot::Snapshot;
use crate::store::ProgramStore;
use crate::StoreError;

/// Routeur `/api` du dépôt de programmes.
pub fn store_api_router(store: Arc<ProgramStore>) -> Router {
    Router::new()
        .route("/programs", get(list_programs))
        .route(
            "/programs/{id}",
            get(get_program).put(put_program).delete(delete_program),
        )
        .route("/metadata", get(get_metadata))
        .route("/metadata/{id}", put(put_metadata))
        .route("/snapshot", get(get_snapshot))
        .route("/fingerprint", get(get_fingerprint))
        .with_state(store)
}

/// Programme et ses métadonnées effectives.
#[derive(Debug, Serialize, ToSchema)]
pub struct ProgramDetailResponse {
    #[serde(flatten)]
    #[schema(inline)]
    pub program: Program,
    pub metadata: ProgramMetadata,
}

/// Requête de création ou de remplacement d'un programme.
#[derive(Debug, Deserialize, ToSchema)]
pub struct PutProgramRequest {
    #[schema(example = "load(\"render.star\", \"render\")")]
    pub content: String,
}

/// Empreinte courante du dépôt.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FingerprintResponse {
    #[schema(example = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08")]
    pub fingerprint: String,
}

/// Réponse d'erreur REST générique.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[utoipa::path(
    get,
    path = "/api/programs",
    tag = "programs",
    responses(
        (status = 200, description = "Liste de tous les programmes", body = [Program])
    )
)]
pub async fn list_programs(State(store): State<Arc<ProgramStore>>) -> Response {
    match store.snapshot().await {
        Ok(set) => {
            let programs: Vec<Program> = set.programs().cloned().collect();
            (StatusCode::OK, Json(programs)).into_response()
        }
        Err(err) => map_error(err),
    }
}

#[utoipa::path(
    get,
    path = "/api/programs/{id}",
    tag = "programs",
    params(("id" = String, Path, description = "Nom du fichier .star")),
    responses(
        (status = 200, description = "Programme et métadonnées", body = ProgramDetailResponse),
        (status = 404, description = "Programme introuvable", body = ErrorResponse)
    )
)]
pub async fn get_program(
    State(store): State<Arc<ProgramStore>>,
    Path(id): Path<String>,
) -> Response {
    match store.get(&id).await {
        Ok(Some((program, metadata))) => {
            (StatusCode::OK, Json(ProgramDetailResponse { program, metadata })).into_response()
        }
        Ok(None) => map_error(StoreError::ProgramNotFound(id)),
        Err(err) => map_error(err),
    }
}

#[utoipa::path(
    put,
    path = "/api/programs/{id}",
    tag = "programs",
    params(("id" = String, Path, description = "Nom du fichier .star")),
    request_body = PutProgramRequest,
    responses(
        (status = 200, description = "Programme enregistré", body = Program),
        (status = 400, description = "Identifiant invalide", body = ErrorResponse)
    )
)]
pub async fn put_program(
    State(store): State<Arc<ProgramStore>>,
    Path(id): Path<String>,
    Json(req): Json<PutProgramRequest>,
) -> Response {
    match store.put_program(&id, &req.content).await {
        Ok(program) => (StatusCode::OK, Json(program)).into_response(),
        Err(err) => map_error(err),
    }
}

#[utoipa::path(
    delete,
    path = "/api/programs/{id}",
    tag = "programs",
    params(("id" = String, Path, description = "Nom du fichier .star")),
    responses(
        (status = 204, description = "Programme supprimé"),
        (status = 404, description = "Programme introuvable", body = ErrorResponse)
    )
)]
pub async fn delete_program(
    State(store): State<Arc<ProgramStore>>,
    Path(id): Path<String>,
) -> Response {
    match store.delete_program(&id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => map_error(err),
    }
}

#[utoipa::path(
    get,
    path = "/api/metadata",
    tag = "metadata",
    responses(
        (status = 200, description = "Document program_metadata.json", body = Object)
    )
)]
pub async fn get_metadata(State(store): State<Arc<ProgramStore>>) -> Response {
    match store.metadata().await {
        Ok(metadata) => (StatusCode::OK, Json(metadata)).into_response(),
        Err(err) => map_error(err),
    }
}

#[utoipa::path(
    put,
    path = "/api/metadata/{id}",
    tag = "metadata",
    params(("id" = String, Path, description = "Nom du fichier .star")),
    request_body = ProgramMetadata,
    responses(
        (status = 200, description = "Métadonnées enregistrées", body = ProgramMetadata),
        (status = 400, description = "Identifiant invalide", body = ErrorResponse)
    )
)]
pub async fn put_metadata(
    State(store): State<Arc<ProgramStore>>,
    Path(id): Path<String>,
    Json(metadata): Json<ProgramMetadata>,
) -> Response {
    match store.update_metadata(&id, metadata.clone()).await {
        Ok(()) => (StatusCode::OK, Json(metadata)).into_response(),
        Err(err) => map_error(err),
    }
}

#[utoipa::path(
    get,
    path = "/api/snapshot",
    tag = "sync",
    responses(
        (status = 200, description = "Ensemble complet avec son empreinte", body = Object)
    )
)]
pub async fn get_snapshot(State(store): State<Arc<ProgramStore>>) -> Response {
    match store.snapshot().await {
        Ok(set) => {
            let snapshot: Snapshot = set.into_snapshot();
            (StatusCode::OK, Json(snapshot)).into_response()
        }
        Err(err) => map_error(err),
    }
}

#[utoipa::path(
    get,
    path = "/api/fingerprint",
    tag = "sync",
    responses(
        (status = 200, description = "Empreinte courante", body = FingerprintResponse)
    )
)]
pub async fn get_fingerprint(State(store): State<Arc<ProgramStore>>) -> Response {
    match store.fingerprint().await {
        Ok(fp) => (
            StatusCode::OK,
            Json(FingerprintResponse {
                fingerprint: fp.to_string(),
            }),
        )
            .into_response(),
        Err(err) => map_error(err),
    }
}

fn map_error(error: StoreError) -> Response {
    let (status, code) = match &error {
        StoreError::ProgramNotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        StoreError::InvalidId(_) => (StatusCode::BAD_REQUEST, "INVALID_ID"),
        StoreError::InvalidMetadata(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INVALID_METADATA"),
        StoreError::HashMismatch { .. } | StoreError::FingerprintMismatch { .. } => {
            (StatusCode::CONFLICT, "INTEGRITY_ERROR")
        }
        StoreError::PersistenceError(_) | StoreError::Io(_) | StoreError::Json(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR")
        }
    };

    if status.is_server_error() {
        error!(error = %error, "Program store request failed");
    }

    (
        status,
        Json(ErrorResponse {
            error: code.to_string(),
            message: error.to_string(),
        }),
    )
        .into_response()
}
