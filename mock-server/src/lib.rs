use std::{collections::HashMap, sync::Arc};

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};

pub const OCTET_STREAM: &str = "application/octet-stream";

#[derive(Clone, Debug)]
pub struct Firmware {
    pub image: Vec<u8>,
    pub last_modified: String,
    pub content_type: String,
}

impl Firmware {
    pub fn new(image: impl Into<Vec<u8>>, last_modified: &str) -> Self {
        Self {
            image: image.into(),
            last_modified: last_modified.to_string(),
            content_type: OCTET_STREAM.to_string(),
        }
    }
}

/// Summary row returned by `GET /`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FirmwareInfo {
    pub name: String,
    pub size: usize,
    pub last_modified: String,
    pub content_type: String,
}

/// Credentials the server demands, if any.
#[derive(Clone, Debug, Default)]
pub enum Auth {
    #[default]
    None,
    Bearer(String),
    Basic { username: String, password: String },
}

impl Auth {
    fn accepts(&self, headers: &HeaderMap) -> bool {
        let expected = match self {
            Auth::None => return true,
            Auth::Bearer(token) => format!("Bearer {token}"),
            Auth::Basic { username, password } => {
                format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
            }
        };
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == expected)
    }
}

pub type Catalog = Arc<RwLock<HashMap<String, Firmware>>>;

#[derive(Clone, Default)]
pub struct AppState {
    pub catalog: Catalog,
    pub auth: Arc<Auth>,
}

impl AppState {
    pub fn new(auth: Auth) -> Self {
        Self {
            catalog: Catalog::default(),
            auth: Arc::new(auth),
        }
    }

    /// Add or replace an image in the catalog. Clones of this state share
    /// the catalog and see the entry too.
    ///
    /// Blocks if a handler currently holds the catalog lock, so call it from
    /// outside the runtime once the server is running.
    pub fn with_firmware(mut self, name: &str, firmware: Firmware) -> Self {
        let name = name.to_string();
        if let Some(catalog) = Arc::get_mut(&mut self.catalog) {
            catalog.get_mut().insert(name, firmware);
        } else if let Ok(mut catalog) = self.catalog.try_write() {
            catalog.insert(name, firmware);
        } else {
            self.catalog.blocking_write().insert(name, firmware);
        }
        self
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(list_firmware))
        .route("/{name}", get(get_firmware).put(put_firmware))
        .with_state(state)
}

pub async fn run(listener: TcpListener, state: AppState) -> Result<(), std::io::Error> {
    axum::serve(listener, app(state)).await
}

async fn list_firmware(State(state): State<AppState>) -> Json<Vec<FirmwareInfo>> {
    let catalog = state.catalog.read().await;
    let mut rows: Vec<FirmwareInfo> = catalog
        .iter()
        .map(|(name, fw)| FirmwareInfo {
            name: name.clone(),
            size: fw.image.len(),
            last_modified: fw.last_modified.clone(),
            content_type: fw.content_type.clone(),
        })
        .collect();
    rows.sort_by(|a, b| a.name.cmp(&b.name));
    Json(rows)
}

async fn get_firmware(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Result<Response, StatusCode> {
    if !state.auth.accepts(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let catalog = state.catalog.read().await;
    let fw = catalog.get(&name).ok_or(StatusCode::NOT_FOUND)?;

    let since = headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok());
    if since == Some(fw.last_modified.as_str()) {
        return Ok(StatusCode::NOT_MODIFIED.into_response());
    }

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, fw.content_type.clone()),
            (header::LAST_MODIFIED, fw.last_modified.clone()),
        ],
        fw.image.clone(),
    )
        .into_response())
}

/// Replace an image. The new `Last-Modified` comes from the request header.
async fn put_firmware(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, StatusCode> {
    if !state.auth.accepts(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let last_modified = headers
        .get(header::LAST_MODIFIED)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::BAD_REQUEST)?;
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(OCTET_STREAM);

    let firmware = Firmware {
        image: body.to_vec(),
        last_modified: last_modified.to_string(),
        content_type: content_type.to_string(),
    };
    let replaced = state.catalog.write().await.insert(name, firmware).is_some();
    Ok(if replaced { StatusCode::NO_CONTENT } else { StatusCode::CREATED })
}
