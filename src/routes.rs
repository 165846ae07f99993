use std::sync::Arc;

use axum::{
    body::Body,
    extract::{
        multipart::MultipartError,
        DefaultBodyLimit,
        FromRequest,
        MatchedPath,
        Multipart,
        OriginalUri,
        Path,
        Request,
        State,
    },
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{Html, Response},
    routing::get,
    Router,
};
use bytes::Bytes;
use image_store::ImageStore;
use sha1::{Digest, Sha1};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, info};

use crate::{auth, config::ServerConfig, http_objects::GatewayAPIError};

/// Upper bound on the decoded size of one uploaded file.
pub const MAX_UPLOAD_BYTES: usize = 1_000_000;

// Room for multipart boundaries and part headers on a maximum-size upload,
// so the transport limit never undercuts the decoded-size cap.
const MULTIPART_FRAMING_ALLOWANCE: usize = 64 * 1024;

/// Stored objects are always labeled `image/png`, whatever the payload
/// actually is. Downstream consumers depend on this.
pub const IMAGE_CONTENT_TYPE: &str = "image/png";

const IMAGE_EXTENSION: &str = ".png";
const NAME_HEX_CHARS: usize = 16;

const LANDING_PAGE: &str = r#"<!doctype html>
<meta charset="utf-8" />
<title>Pixelbin</title>
<style>
body {
  font-size: 40px;
  text-align: center;
}
</style>
<body>
  <h1>Pixelbin</h1>
  Content-addressed image hosting: POST an image, GET it back by its hash.
</body>
"#;

#[derive(Clone)]
pub struct RouteState {
    pub config: Arc<ServerConfig>,
    pub image_store: Arc<ImageStore>,
}

pub fn create_routes(route_state: RouteState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index).post(upload_image))
        .route("/{*key}", get(serve_image).post(upload_image))
        .with_state(route_state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request| {
                    let method = req.method();
                    let uri = req.uri();

                    let matched_path = req
                        .extensions()
                        .get::<MatchedPath>()
                        .map(|matched_path| matched_path.as_str());

                    tracing::debug_span!("request", %method, %uri, matched_path)
                })
                .on_failure(()),
        )
        .layer(cors)
        .layer(DefaultBodyLimit::max(
            MAX_UPLOAD_BYTES + MULTIPART_FRAMING_ALLOWANCE,
        ))
}

/// Derive the storage name for uploaded content: the first 16 hex
/// characters of its SHA-1 digest plus a fixed `.png` extension.
/// Identical content always maps to the same name.
pub fn object_name(content: &[u8]) -> String {
    let mut digest = hex::encode(Sha1::digest(content));
    digest.truncate(NAME_HEX_CHARS);
    format!("{}{}", digest, IMAGE_EXTENSION)
}

async fn index() -> Html<&'static str> {
    Html(LANDING_PAGE)
}

async fn serve_image(
    Path(key): Path<String>,
    State(state): State<RouteState>,
) -> Result<Response, GatewayAPIError> {
    let object = state
        .image_store
        .get(&key)
        .await
        .map_err(GatewayAPIError::internal_error)?
        .ok_or_else(|| GatewayAPIError::not_found("Not Found"))?;

    let mut response = Response::builder().header(header::CONTENT_TYPE, object.content_type);
    if let Some(etag) = object.etag {
        response = response.header(header::ETAG, etag);
    }
    response
        .body(Body::from(object.content))
        .map_err(|e| GatewayAPIError::internal_error_str(&e.to_string()))
}

async fn upload_image(
    State(state): State<RouteState>,
    OriginalUri(uri): OriginalUri,
    request: Request,
) -> Result<String, GatewayAPIError> {
    // The authenticator runs before the body is touched; any failure
    // stops all further processing. Format failures and credential
    // mismatches are deliberately indistinguishable to the client.
    if let Err(err) = authorize(request.headers(), &state.config) {
        debug!("rejecting upload: {}", err);
        return Err(GatewayAPIError::not_authenticated());
    }
    let url = request_url(request.headers(), &uri);

    let multipart = Multipart::from_request(request, &())
        .await
        .map_err(|e| GatewayAPIError::new(e.status(), &e.body_text()))?;
    let content = first_file_field(multipart).await?;
    if content.len() > MAX_UPLOAD_BYTES {
        return Err(GatewayAPIError::payload_too_large("Payload Too Large"));
    }

    let name = object_name(&content);
    state
        .image_store
        .put(&name, content, IMAGE_CONTENT_TYPE)
        .await
        .map_err(GatewayAPIError::internal_error)?;
    info!("stored image: {}", name);
    Ok(format!("{}{}", url, name))
}

fn authorize(headers: &HeaderMap, config: &ServerConfig) -> Result<(), auth::AuthError> {
    let header = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(auth::AuthError::InvalidCredentialFormat)?;
    auth::parse_basic_authorization(header)?.verify(&config.auth)
}

/// Take the content of the first field carrying a filename; any other
/// fields are ignored.
async fn first_file_field(mut multipart: Multipart) -> Result<Bytes, GatewayAPIError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.file_name().is_none() {
            continue;
        }
        return field.bytes().await.map_err(multipart_error);
    }
    Err(GatewayAPIError::bad_request(
        "missing file field in multipart body",
    ))
}

fn multipart_error(e: MultipartError) -> GatewayAPIError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        GatewayAPIError::payload_too_large("Payload Too Large")
    } else {
        GatewayAPIError::bad_request(&e.to_string())
    }
}

/// Reconstruct the request URL the way the upstream proxy saw it; the
/// upload response is this URL concatenated verbatim with the derived
/// object name.
fn request_url(headers: &HeaderMap, uri: &Uri) -> String {
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("http");
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("localhost");
    format!("{}://{}{}", scheme, host, uri.path())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn object_name_matches_known_sha1_vectors() {
        // sha1("hello") = aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d
        assert_eq!(object_name(b"hello"), "aaf4c61ddcc5e8a2.png");
        // sha1("") = da39a3ee5e6b4b0d3255bfef95601890afd80709
        assert_eq!(object_name(b""), "da39a3ee5e6b4b0d.png");
    }

    #[test]
    fn object_name_is_deterministic() {
        assert_eq!(object_name(b"same bytes"), object_name(b"same bytes"));
    }

    #[test]
    fn object_names_are_distinct_across_many_inputs() {
        let mut seen = HashSet::new();
        for i in 0u32..4096 {
            assert!(seen.insert(object_name(&i.to_le_bytes())));
        }
    }

    #[test]
    fn request_url_uses_forwarded_proto_and_host() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, "img.example.com".parse().unwrap());
        headers.insert("x-forwarded-proto", "https".parse().unwrap());
        let uri: Uri = "/".parse().unwrap();
        assert_eq!(request_url(&headers, &uri), "https://img.example.com/");
    }

    #[test]
    fn request_url_defaults_scheme_to_http() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, "img.example.com".parse().unwrap());
        let uri: Uri = "/uploads".parse().unwrap();
        assert_eq!(
            request_url(&headers, &uri),
            "http://img.example.com/uploads"
        );
    }
}
