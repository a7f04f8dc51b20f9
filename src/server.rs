//! Native host: actix-web in front of the same router the Spin component uses.

use std::sync::{Arc, Mutex};

use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use tracing::{error, info};

use crate::config::Settings;
use crate::core::db::init_test_data;
use crate::core::store::MemoryStore;
use crate::{handlers, Blog};

/// Shared across workers. Requests that touch several keys take `writes`
/// so their updates do not interleave.
#[derive(Clone)]
pub struct ServerState {
    store: MemoryStore,
    settings: Settings,
    writes: Arc<Mutex<()>>,
}

impl ServerState {
    pub fn new(store: MemoryStore, settings: Settings) -> Self {
        Self {
            store,
            settings,
            writes: Arc::new(Mutex::new(())),
        }
    }

    pub fn blog(&self) -> Blog {
        Blog::new(self.store.clone(), self.settings.clone())
    }
}

mod adapter {
    use actix_web::HttpRequest;
    use spin_sdk::http::{Method, Request, Response};

    /// Response headers carried back to the client.
    const FORWARDED_HEADERS: [&str; 3] = ["content-type", "location", "set-cookie"];

    pub fn actix_to_spin_request(req: &HttpRequest, body: actix_web::web::Bytes) -> Request {
        let method = match req.method().as_str() {
            "GET" => Method::Get,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            "HEAD" => Method::Head,
            "OPTIONS" => Method::Options,
            "PATCH" => Method::Patch,
            other => Method::Other(other.to_string()),
        };

        let uri = req.uri().to_string();

        let mut builder = Request::builder();
        builder.method(method).uri(uri);
        for (name, value) in req.headers() {
            if let Ok(val_str) = value.to_str() {
                builder.header(name.as_str(), val_str);
            }
        }

        builder.body(body.to_vec()).build()
    }

    pub fn spin_to_actix_response(spin_resp: Response) -> actix_web::HttpResponse {
        let status = *spin_resp.status();

        let mut response = actix_web::HttpResponse::build(
            actix_web::http::StatusCode::from_u16(status)
                .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR),
        );
        for name in FORWARDED_HEADERS {
            if let Some(value) = spin_resp.header(name).and_then(|v| v.as_str()) {
                response.insert_header((name, value.to_string()));
            }
        }

        response.body(spin_resp.body().to_vec())
    }
}

/// Requests that change more than one stored value. Follow, unfollow and
/// logout do so on GET too. Single-key updates, like the index cache, are
/// atomic in the store and need no lock.
fn needs_write_lock(req: &HttpRequest) -> bool {
    if req.method() != actix_web::http::Method::GET && req.method() != actix_web::http::Method::HEAD {
        return true;
    }
    let path = req.path().trim_end_matches('/');
    let toggles_follow =
        path.starts_with("/profile/") && (path.ends_with("/follow") || path.ends_with("/unfollow"));
    toggles_follow || path == "/auth/logout"
}

pub async fn handle_all(
    state: web::Data<ServerState>,
    req: HttpRequest,
    body: web::Bytes,
) -> HttpResponse {
    let spin_req = adapter::actix_to_spin_request(&req, body);
    let blog = state.blog();

    let result = if needs_write_lock(&req) {
        match state.writes.lock() {
            Ok(_guard) => handlers::route(&blog, spin_req),
            Err(_) => Err(anyhow::anyhow!("write lock poisoned")),
        }
    } else {
        handlers::route(&blog, spin_req)
    };

    match result {
        Ok(spin_resp) => adapter::spin_to_actix_response(spin_resp),
        Err(e) => {
            error!(error = %e, path = %req.path(), "internal server error");
            HttpResponse::InternalServerError().body("Internal server error")
        }
    }
}

pub async fn run(settings: Settings) -> std::io::Result<()> {
    let store = MemoryStore::new();
    if settings.seed {
        init_test_data(&store).map_err(std::io::Error::other)?;
    }

    let bind = settings.bind.clone();
    let state = web::Data::new(ServerState::new(store, settings));
    info!(%bind, "server listening");

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .default_service(web::route().to(handle_all))
    })
    .bind(bind)?
    .run()
    .await
}
