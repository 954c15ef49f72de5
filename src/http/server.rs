//! Serveur HTTP du runtime.
//!
//! Abstraction au-dessus d'Axum : routes enregistrées dynamiquement (les
//! endpoints UPnP d'un device ne sont connus qu'au montage de son arbre),
//! arrêt gracieux par `CancellationToken`, et comptage des requêtes en vol
//! pour le drainage au `quit()`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Request, State};
use axum::handler::Handler;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{any, get, post};
use axum::Router;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::HttpError;

/// Serveur HTTP d'un orchestrateur (host ou control point).
pub struct HttpServer {
    name: String,
    http_port: u16,
    bound_addr: Option<SocketAddr>,
    listener: Option<tokio::net::TcpListener>,
    router: Arc<RwLock<Router>>,
    join_handle: Option<JoinHandle<()>>,
    shutdown_token: CancellationToken,
    active_requests: Arc<AtomicUsize>,
}

impl HttpServer {
    /// Crée un serveur non démarré.
    ///
    /// # Arguments
    ///
    /// * `name` - Nom du serveur (pour les logs)
    /// * `http_port` - Port à écouter ; `0` pour un port éphémère
    pub fn new(name: impl Into<String>, http_port: u16) -> Self {
        Self {
            name: name.into(),
            http_port,
            bound_addr: None,
            listener: None,
            router: Arc::new(RwLock::new(Router::new())),
            join_handle: None,
            shutdown_token: CancellationToken::new(),
            active_requests: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Retourne une copie du token d'arrêt gracieux.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Nombre de requêtes actuellement en cours de traitement.
    pub fn active_request_count(&self) -> usize {
        self.active_requests.load(Ordering::SeqCst)
    }

    /// L'adresse effectivement liée, une fois le serveur démarré.
    pub fn bound_addr(&self) -> Option<SocketAddr> {
        self.bound_addr
    }

    /// L'URL de base `http://<ip>:<port>` du serveur lié.
    pub fn base_url(&self, host_ip: &str) -> Option<String> {
        self.bound_addr
            .map(|addr| format!("http://{}:{}", host_ip, addr.port()))
    }

    /// Ajoute un handler GET avec état.
    pub async fn add_handler_with_state<H, T, S>(&mut self, path: &str, handler: H, state: S)
    where
        H: Handler<T, S> + Clone + Send + 'static,
        T: 'static,
        S: Clone + Send + Sync + 'static,
    {
        let route = Router::new()
            .route("/", get(handler.clone()))
            .with_state(state);
        self.mount(path, route).await;
    }

    /// Ajoute un handler POST avec état.
    pub async fn add_post_handler_with_state<H, T, S>(&mut self, path: &str, handler: H, state: S)
    where
        H: Handler<T, S> + Clone + Send + 'static,
        T: 'static,
        S: Clone + Send + Sync + 'static,
    {
        let route = Router::new()
            .route("/", post(handler.clone()))
            .with_state(state);
        self.mount(path, route).await;
    }

    /// Ajoute un handler acceptant tous les verbes (SUBSCRIBE, NOTIFY…).
    pub async fn add_any_handler_with_state<H, T, S>(&mut self, path: &str, handler: H, state: S)
    where
        H: Handler<T, S> + Clone + Send + 'static,
        T: 'static,
        S: Clone + Send + Sync + 'static,
    {
        let route = Router::new()
            .route("/", any(handler.clone()))
            .with_state(state);
        self.mount(path, route).await;
    }

    async fn mount(&mut self, path: &str, route: Router) {
        let mut r = self.router.write().await;
        *r = if path == "/" {
            std::mem::take(&mut *r).merge(route)
        } else {
            std::mem::take(&mut *r).nest(path, route)
        };
    }

    /// Lie le port sans servir : l'adresse effective est connue avant
    /// l'enregistrement des routes (qui dépendent du port pour composer les
    /// URL publiées).
    ///
    /// # Errors
    ///
    /// `HttpError::Socket` si le bind échoue — fatal pour l'orchestrateur.
    pub async fn bind(&mut self) -> Result<SocketAddr, HttpError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.http_port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| HttpError::Socket(format!("bind {}: {}", addr, e)))?;
        let bound = listener
            .local_addr()
            .map_err(|e| HttpError::Socket(e.to_string()))?;

        self.listener = Some(listener);
        self.bound_addr = Some(bound);
        Ok(bound)
    }

    /// Sert le routeur tel qu'enregistré à cet instant.
    pub async fn serve(&mut self) -> Result<(), HttpError> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| HttpError::Socket("serve() before bind()".into()))?;

        info!(
            "✅ HTTP server {} listening on {}",
            self.name,
            self.bound_addr.expect("bound in bind()")
        );

        let router = self.router.clone();
        let shutdown = self.shutdown_token.clone();
        let counter = self.active_requests.clone();

        self.join_handle = Some(tokio::spawn(async move {
            let r = router
                .read()
                .await
                .clone()
                .layer(middleware::from_fn_with_state(counter, count_requests));

            let result = axum::serve(listener, r.into_make_service())
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await;

            if let Err(e) = result {
                warn!("❌ HTTP server stopped with error: {}", e);
            }
        }));

        Ok(())
    }

    /// Bind puis service immédiat, pour les serveurs dont toutes les routes
    /// sont déjà enregistrées.
    pub async fn start(&mut self) -> Result<SocketAddr, HttpError> {
        let bound = self.bind().await?;
        self.serve().await?;
        Ok(bound)
    }

    /// Arrêt gracieux : lève le drapeau, attend la fin du serveur (bornée à
    /// 5 s) puis le drainage des requêtes en vol.
    pub async fn stop(&mut self) {
        self.shutdown_token.cancel();

        if let Some(handle) = self.join_handle.take() {
            if tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .is_err()
            {
                warn!("❌ HTTP server {} did not stop within 5s", self.name);
            }
        }

        // Les handlers encore actifs tiennent le compteur.
        let mut waited = Duration::ZERO;
        while self.active_request_count() > 0 && waited < Duration::from_secs(5) {
            tokio::time::sleep(Duration::from_millis(50)).await;
            waited += Duration::from_millis(50);
        }

        info!("👋 HTTP server {} stopped", self.name);
    }
}

async fn count_requests(
    State(counter): State<Arc<AtomicUsize>>,
    request: Request,
    next: Next,
) -> Response {
    counter.fetch_add(1, Ordering::SeqCst);
    let response = next.run(request).await;
    counter.fetch_sub(1, Ordering::SeqCst);
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn hello() -> &'static str {
        "hello"
    }

    #[tokio::test]
    async fn test_start_on_ephemeral_port_and_stop() {
        let mut server = HttpServer::new("test", 0);
        server.add_handler_with_state("/hello", hello, ()).await;

        let addr = server.start().await.unwrap();
        assert_ne!(addr.port(), 0);

        let body = reqwest::get(format!("http://127.0.0.1:{}/hello", addr.port()))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "hello");

        server.stop().await;
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let mut server = HttpServer::new("test", 0);
        let addr = server.start().await.unwrap();

        let status = reqwest::get(format!("http://127.0.0.1:{}/nope", addr.port()))
            .await
            .unwrap()
            .status();
        assert_eq!(status.as_u16(), 404);

        server.stop().await;
    }
}
