//! Orchestrateur device host.
//!
//! Cycle de vie : `Uninitialized → Initializing → Initialized → Exiting →
//! Uninitialized`. `init()` démarre le serveur HTTP, monte les arbres de
//! devices depuis leurs descriptions, câble le notifier d'événements, lie le
//! moteur SSDP puis lance les annonces ; tout échec déroule complètement.

mod config;

use std::sync::Arc;

pub use config::{
    DescriptionSource, DeviceConfiguration, DeviceCreator, DeviceHostConfiguration, HostHook,
};

use axum::body::Bytes;
use axum::extract::{Request, State};
use axum::response::Response;
use tracing::{info, warn};
use url::Url;

use crate::description::{description_document, parse_device_description, scpd_document, build_device, compose_location};
use crate::devices::{Device, DeviceStorage};
use crate::errors::UpnpError;
use crate::eventing::EventPublisher;
use crate::http::{responses, HttpClient, HttpServer};
use crate::services::{Service, ServiceUrls};
use crate::soap::handle_control_request;
use crate::types::{Udn, ValidationLevel};

/// État de l'orchestrateur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostState {
    #[default]
    Uninitialized,
    Initializing,
    Initialized,
    Exiting,
}

/// Hôte de devices UPnP.
pub struct DeviceHost {
    config: DeviceHostConfiguration,
    state: HostState,
    server: Option<HttpServer>,
    storage: Arc<DeviceStorage>,
    publisher: Option<Arc<EventPublisher>>,
    announcer: Option<Arc<crate::ssdp::SsdpAnnouncer>>,
    base_url: Option<Url>,
}

impl DeviceHost {
    pub fn new(config: DeviceHostConfiguration) -> Self {
        Self {
            config,
            state: HostState::Uninitialized,
            server: None,
            storage: Arc::new(DeviceStorage::new()),
            publisher: None,
            announcer: None,
            base_url: None,
        }
    }

    pub fn state(&self) -> HostState {
        self.state
    }

    /// Le stockage des devices publiés.
    pub fn storage(&self) -> &Arc<DeviceStorage> {
        &self.storage
    }

    /// L'URL de base du serveur HTTP, une fois initialisé.
    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    /// Le gestionnaire d'abonnements entrants, une fois initialisé.
    pub fn publisher(&self) -> Option<&Arc<EventPublisher>> {
        self.publisher.as_ref()
    }

    /// Initialise et publie tous les devices configurés.
    ///
    /// # Errors
    ///
    /// - `AlreadyInitialized` hors de l'état `Uninitialized` ;
    /// - `InvalidConfiguration` : aucune configuration de device, UDN
    ///   dupliqué, description illisible ;
    /// - `UndefinedFailure` si le bind HTTP échoue ;
    /// - `CommunicationsError` si le bind SSDP échoue.
    ///
    /// Tout échec revient à `Uninitialized` après déroulage complet.
    pub async fn init(&mut self) -> Result<(), UpnpError> {
        if self.state != HostState::Uninitialized {
            return Err(UpnpError::AlreadyInitialized);
        }
        self.state = HostState::Initializing;

        match self.try_init().await {
            Ok(()) => {
                self.state = HostState::Initialized;
                info!("✅ Device host initialized ({} roots)", self.storage.len());
                Ok(())
            }
            Err(e) => {
                warn!("❌ Device host init failed: {}", e);
                self.teardown().await;
                self.state = HostState::Uninitialized;
                Err(e)
            }
        }
    }

    async fn try_init(&mut self) -> Result<(), UpnpError> {
        if self.config.devices.is_empty() {
            return Err(UpnpError::InvalidConfiguration(
                "no device configurations".into(),
            ));
        }

        // 1. Serveur HTTP ; l'échec du bind est une UndefinedFailure. Le
        // serveur est tenu par `self` dès ici pour que le déroulage d'erreur
        // l'arrête ; il ne sert qu'une fois toutes les routes enregistrées.
        let mut server = HttpServer::new("upnp-host", self.config.http_port);
        let addr = server
            .bind()
            .await
            .map_err(|e| UpnpError::UndefinedFailure(format!("HTTP bind: {}", e)))?;

        let shutdown = server.shutdown_token();
        self.server = Some(server);
        let host_ip = match &self.config.host_ip {
            Some(ip) => ip.clone(),
            None => detect_host_ip(),
        };
        let base_url = Url::parse(&format!("http://{}:{}", host_ip, addr.port()))
            .map_err(|e| UpnpError::InvalidConfiguration(e.to_string()))?;

        let http = HttpClient::new(shutdown.clone());
        let publisher = Arc::new(EventPublisher::new(http, shutdown.clone()));
        publisher.start_sweeper();

        // 2. Montage des arbres et enregistrement des routes.
        let mut announced: Vec<(Arc<Device>, u32)> = Vec::new();
        for device_config in self.config.devices.clone() {
            let xml = load_description(&device_config.description)?;
            let description = parse_device_description(
                xml.as_bytes(),
                &base_url,
                ValidationLevel::Strict,
            )?;
            let scpds = load_scpds(&device_config, &description)?;
            let device = build_device(&description, &scpds)?;

            rewrite_service_urls(&device);

            if let Some(creator) = &device_config.device_creator {
                for service in device.all_services() {
                    creator.setup_service(&service).map_err(|e| {
                        UpnpError::InvalidConfiguration(format!(
                            "device creator failed on {}: {}",
                            service.id(),
                            e
                        ))
                    })?;
                }
            }

            let location = device_location(&base_url, device.udn());
            self.storage
                .insert_root(device.clone(), location)
                .map_err(|e| UpnpError::InvalidConfiguration(e.to_string()))?;

            let server = self.server.as_mut().expect("server started above");
            register_device_routes(server, &publisher, &device).await;

            for service in device.all_services() {
                publisher.attach_service(&service);
            }

            announced.push((device, device_config.cache_control_max_age));
        }

        self.publisher = Some(publisher);
        self.base_url = Some(base_url.clone());

        self.server
            .as_mut()
            .expect("server bound above")
            .serve()
            .await
            .map_err(|e| UpnpError::UndefinedFailure(e.to_string()))?;

        // 3. Moteur SSDP ; l'échec du bind est une CommunicationsError.
        let announcer = Arc::new(
            crate::ssdp::SsdpAnnouncer::start(
                self.config.individual_advertisement_count,
                shutdown.clone(),
            )
            .await?,
        );

        // 4. Hook utilisateur ; un échec déroule tout.
        if let Some(hook) = &self.config.on_init {
            hook().map_err(UpnpError::UndefinedFailure)?;
        }

        // 5. Annonces initiales et timers de demi-vie, un flux par racine.
        for (device, max_age) in announced {
            let location = self
                .storage
                .location_of(device.udn())
                .unwrap_or_else(|| base_url.clone());
            announcer.add_root(&device, location, max_age);
        }

        self.announcer = Some(announcer);
        Ok(())
    }

    /// Arrête l'hôte : timers coupés, byebye par créneau, serveurs fermés,
    /// requêtes drainées, arbres disposés.
    pub async fn quit(&mut self) -> Result<(), UpnpError> {
        if self.state == HostState::Uninitialized {
            return Err(UpnpError::NotStarted);
        }
        self.state = HostState::Exiting;
        self.teardown().await;
        self.state = HostState::Uninitialized;
        info!("👋 Device host stopped");
        Ok(())
    }

    async fn teardown(&mut self) {
        if let Some(announcer) = self.announcer.take() {
            announcer.shutdown().await;
        }
        if let Some(mut server) = self.server.take() {
            server.stop().await;
        }
        // Un service dont le device est retiré n'a plus d'abonnement vivant.
        if let Some(publisher) = self.publisher.take() {
            for root in self.storage.roots() {
                for service in root.all_services() {
                    publisher.remove_service_subscriptions(&service.key());
                }
            }
        }
        self.base_url = None;
        for device in self.storage.drain() {
            device.dispose();
        }
    }
}

/// Réécrit les URL des services selon la topologie du serveur :
/// `/<udn>/<service-id>/{scpd.xml,control,event}`.
fn rewrite_service_urls(root: &Arc<Device>) {
    for device in root.embedded_devices(crate::devices::VisitMode::ThisRecursively) {
        let udn = device.udn().as_str().to_string();
        for service in device.services() {
            let prefix = format!("/{}/{}", udn, service.id());
            service.set_urls(ServiceUrls {
                scpd: format!("{}/scpd.xml", prefix),
                control: format!("{}/control", prefix),
                event_sub: format!("{}/event", prefix),
            });
        }
    }
}

fn device_location(base_url: &Url, udn: &Udn) -> Url {
    // `Url::join` traiterait `uuid:…` comme un schéma : on passe par le
    // chemin.
    let mut location = compose_location(base_url, udn, true);
    let mut path = location.path().to_string();
    path.push_str("/description.xml");
    location.set_path(&path);
    location
}

async fn register_device_routes(
    server: &mut HttpServer,
    publisher: &Arc<EventPublisher>,
    root: &Arc<Device>,
) {
    for device in root.embedded_devices(crate::devices::VisitMode::ThisRecursively) {
        let udn = device.udn().as_str().to_string();

        server
            .add_handler_with_state(
                &format!("/{}/description.xml", udn),
                description_handler,
                root.clone(),
            )
            .await;

        for service in device.services() {
            let prefix = format!("/{}/{}", udn, service.id());

            server
                .add_handler_with_state(
                    &format!("{}/scpd.xml", prefix),
                    scpd_handler,
                    service.clone(),
                )
                .await;
            server
                .add_post_handler_with_state(
                    &format!("{}/control", prefix),
                    control_handler,
                    service.clone(),
                )
                .await;
            server
                .add_any_handler_with_state(
                    &format!("{}/event", prefix),
                    event_handler,
                    (service.clone(), publisher.clone()),
                )
                .await;
        }
    }
}

async fn description_handler(State(device): State<Arc<Device>>) -> Response {
    responses::ok_xml(description_document(&device))
}

async fn scpd_handler(State(service): State<Arc<Service>>) -> Response {
    responses::ok_xml(scpd_document(&service))
}

async fn control_handler(State(service): State<Arc<Service>>, body: Bytes) -> Response {
    handle_control_request(service, &body).await
}

async fn event_handler(
    State((service, publisher)): State<(Arc<Service>, Arc<EventPublisher>)>,
    request: Request,
) -> Response {
    let method = request.method().as_str().to_string();
    publisher
        .handle_event_request(service, &method, request.headers())
        .await
}

fn load_description(source: &DescriptionSource) -> Result<String, UpnpError> {
    match source {
        DescriptionSource::Inline(xml) => Ok(xml.clone()),
        DescriptionSource::File(path) => std::fs::read_to_string(path).map_err(|e| {
            UpnpError::InvalidConfiguration(format!("description {}: {}", path.display(), e))
        }),
    }
}

/// Rassemble les SCPD d'un device : documents en mémoire d'abord, fichiers à
/// côté de la description sinon. Indexés par URL résolue, comme attendu par
/// `build_device`.
fn load_scpds(
    config: &DeviceConfiguration,
    description: &crate::description::DeviceDescription,
) -> Result<std::collections::HashMap<String, crate::description::Scpd>, UpnpError> {
    let mut scpds = std::collections::HashMap::new();

    for (_, stub) in description.root.all_service_stubs() {
        let inline = config
            .scpd_documents
            .iter()
            .find(|(path, _)| path == &stub.scpd_path)
            .map(|(_, xml)| xml.clone());

        let xml = match (inline, &config.description) {
            (Some(xml), _) => xml,
            (None, DescriptionSource::File(description_path)) => {
                let dir = description_path
                    .parent()
                    .unwrap_or_else(|| std::path::Path::new("."));
                let relative = stub.scpd_path.trim_start_matches('/');
                std::fs::read_to_string(dir.join(relative)).map_err(|e| {
                    UpnpError::InvalidConfiguration(format!(
                        "SCPD {} for {}: {}",
                        stub.scpd_path, stub.id, e
                    ))
                })?
            }
            (None, DescriptionSource::Inline(_)) => {
                return Err(UpnpError::InvalidConfiguration(format!(
                    "no SCPD document supplied for {} ({})",
                    stub.id, stub.scpd_path
                )));
            }
        };

        let scpd = crate::description::parse_scpd(xml.as_bytes())?;
        scpds.insert(stub.scpd_url.as_str().to_string(), scpd);
    }

    Ok(scpds)
}

pub(crate) fn detect_host_ip() -> String {
    match get_if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces
            .into_iter()
            .find_map(|iface| match iface.ip() {
                std::net::IpAddr::V4(ip) if !ip.is_loopback() => Some(ip.to_string()),
                _ => None,
            })
            .unwrap_or_else(|| "127.0.0.1".to_string()),
        Err(_) => "127.0.0.1".to_string(),
    }
}
