use utoipa::OpenApi;

use crate::routes::v1;

#[derive(OpenApi)]
#[openapi(info(
    title = "zylu-server",
    description = "Resumable chat-generation API",
    version = "0.1.0",
))]
pub struct ApiDoc;

pub fn get_docs() -> utoipa::openapi::OpenApi {
    let mut root = ApiDoc::openapi();
    root.merge(v1::api_docs());
    root
}
