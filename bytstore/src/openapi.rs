//! Documentation OpenAPI du dépôt de programmes.

use utoipa::OpenApi;

/// Documentation OpenAPI pour l'API du dépôt.
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::list_programs,
        crate::api::get_program,
        crate::api::put_program,
        crate::api::delete_program,
        crate::api::get_metadata,
        crate::api::put_metadata,
        crate::api::get_snapshot,
        crate::api::get_fingerprint,
    ),
    components(
        schemas(
            crate::program::Program,
            crate::metadata::ProgramMetadata,
            crate::metadata::DurationUnit,
            crate::api::ProgramDetailResponse,
            crate::api::PutProgramRequest,
            crate::api::FingerprintResponse,
            crate::api::ErrorResponse,
        )
    ),
    tags(
        (name = "programs", description = "Programmes .star"),
        (name = "metadata", description = "Paramètres d'affichage par programme"),
        (name = "sync", description = "Détection de changements pour les nœuds")
    ),
    info(
        title = "DIYbyt Program Store API",
        version = "0.1.0",
        description = r#"
# Dépôt de programmes

Les nœuds interrogent `/api/fingerprint` à intervalle fixe et ne
téléchargent `/api/snapshot` que si l'empreinte a changé.
        "#,
        license(
            name = "MIT",
        ),
    )
)]
pub struct ApiDoc;
