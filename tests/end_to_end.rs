//! Scénarios de bout en bout sur boucle locale : publication d'un device,
//! récupération de sa description, contrôle SOAP, abonnement GENA et ordre
//! des notifications.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use url::Url;

use upnpcore::description::{
    build_device, parse_device_description, parse_scpd, DescriptionFetcher, HttpFetcher, Scpd,
};
use upnpcore::devices::Device;
use upnpcore::errors::UpnpError;
use upnpcore::eventing::{parse_propertyset, EventSubscriptionManager};
use upnpcore::host::{
    DescriptionSource, DeviceConfiguration, DeviceCreator, DeviceHost, DeviceHostConfiguration,
};
use upnpcore::http::{HttpClient, HttpServer};
use upnpcore::services::{Service, ServiceError};
use upnpcore::soap::invoke_action_typed;
use upnpcore::types::{Udn, ValidationLevel};

const UDN: &str = "uuid:00000000-0000-0000-0000-000000000001";

fn init_tracing() {
    // Plusieurs tests partagent le process : seule la première installation
    // compte.
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

const DESCRIPTION: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <specVersion><major>1</major><minor>1</minor></specVersion>
  <device>
    <deviceType>urn:schemas-upnp-org:device:Basic:1</deviceType>
    <friendlyName>Loopback Test Device</friendlyName>
    <manufacturer>PMO Project</manufacturer>
    <modelName>Loopback</modelName>
    <UDN>uuid:00000000-0000-0000-0000-000000000001</UDN>
    <serviceList>
      <service>
        <serviceType>urn:schemas-upnp-org:service:Counter:1</serviceType>
        <serviceId>urn:upnp-org:serviceId:Counter</serviceId>
        <SCPDURL>/counter-scpd.xml</SCPDURL>
        <controlURL>/counter/control</controlURL>
        <eventSubURL>/counter/event</eventSubURL>
      </service>
    </serviceList>
  </device>
</root>"#;

const SCPD: &str = r#"<?xml version="1.0"?>
<scpd xmlns="urn:schemas-upnp-org:service-1-0">
  <specVersion><major>1</major><minor>1</minor></specVersion>
  <actionList>
    <action>
      <name>Set</name>
      <argumentList>
        <argument>
          <name>Value</name>
          <direction>in</direction>
          <relatedStateVariable>Level</relatedStateVariable>
        </argument>
      </argumentList>
    </action>
  </actionList>
  <serviceStateTable>
    <stateVariable sendEvents="no">
      <name>Level</name>
      <dataType>ui1</dataType>
      <defaultValue>0</defaultValue>
      <allowedValueRange>
        <minimum>0</minimum>
        <maximum>100</maximum>
        <step>1</step>
      </allowedValueRange>
    </stateVariable>
    <stateVariable sendEvents="yes">
      <name>A</name>
      <dataType>ui4</dataType>
      <defaultValue>0</defaultValue>
    </stateVariable>
    <stateVariable sendEvents="yes">
      <name>B</name>
      <dataType>ui4</dataType>
      <defaultValue>0</defaultValue>
    </stateVariable>
  </serviceStateTable>
</scpd>"#;

struct CounterCreator;

impl DeviceCreator for CounterCreator {
    fn setup_service(&self, service: &Arc<Service>) -> Result<(), ServiceError> {
        service.set_action_handler(
            "Set",
            Arc::new(|_inputs| Box::pin(async { Ok(vec![]) })),
        )
    }
}

async fn start_host() -> DeviceHost {
    init_tracing();

    let mut config = DeviceHostConfiguration::new()
        .add_device(
            DeviceConfiguration::new(DescriptionSource::Inline(DESCRIPTION.to_string()))
                .with_scpd("/counter-scpd.xml", SCPD)
                .with_max_age(30)
                .with_creator(Arc::new(CounterCreator)),
        )
        .with_http_port(0);
    config.host_ip = Some("127.0.0.1".to_string());

    let mut host = DeviceHost::new(config);
    host.init().await.expect("host init");
    host
}

fn udn() -> Udn {
    Udn::parse(UDN, ValidationLevel::Strict).unwrap()
}

fn description_location(host: &DeviceHost) -> Url {
    host.storage().location_of(&udn()).expect("location")
}

/// Reconstruit le device côté control point depuis le réseau, comme le fait
/// une tâche de construction.
async fn fetch_remote_device(host: &DeviceHost, http: &HttpClient) -> Arc<Device> {
    let fetcher = HttpFetcher::new(http.clone());
    let location = description_location(host);

    let xml = fetcher.fetch(&location).await.expect("description fetch");
    let description =
        parse_device_description(xml.as_bytes(), &location, ValidationLevel::Lenient)
            .expect("description parse");

    let mut scpds: HashMap<String, Scpd> = HashMap::new();
    for (_, stub) in description.root.all_service_stubs() {
        let scpd_xml = fetcher.fetch(&stub.scpd_url).await.expect("scpd fetch");
        scpds.insert(
            stub.scpd_url.as_str().to_string(),
            parse_scpd(scpd_xml.as_bytes()).expect("scpd parse"),
        );
    }

    build_device(&description, &scpds).expect("device build")
}

async fn wait_until<F: Fn() -> bool>(what: &str, predicate: F) {
    for _ in 0..100 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("timed out waiting for {}", what);
}

#[tokio::test]
async fn test_description_round_trip_over_http() {
    let mut host = start_host().await;

    let http = HttpClient::new(tokio_util::sync::CancellationToken::new());
    let device = fetch_remote_device(&host, &http).await;

    assert_eq!(device.udn().as_str(), UDN);
    assert_eq!(device.friendly_name(), "Loopback Test Device");

    let service = device.service_by_id("urn:upnp-org:serviceId:Counter").unwrap();
    assert!(service.is_evented());
    assert!(service.action("Set").is_some());
    assert_eq!(service.state_variable("A").unwrap().value_string(), "0");

    host.quit().await.unwrap();
    // Un second quit() sur un hôte désinitialisé est sans effet.
    assert!(matches!(host.quit().await, Err(UpnpError::NotStarted)));
}

#[tokio::test]
async fn test_soap_invoke_and_fault() {
    let mut host = start_host().await;

    let http = HttpClient::new(tokio_util::sync::CancellationToken::new());
    let device = fetch_remote_device(&host, &http).await;
    let service = device.service_by_id("urn:upnp-org:serviceId:Counter").unwrap();
    let control_url = Url::parse(&service.control_url()).unwrap();

    // Invocation valide.
    let outputs = invoke_action_typed(
        &http,
        &control_url,
        &service,
        "Set",
        &[("Value".to_string(), "50".to_string())],
    )
    .await
    .expect("valid invocation");
    assert!(outputs.is_empty());

    // Valeur hors plage : fault 601 avec sa description.
    let err = invoke_action_typed(
        &http,
        &control_url,
        &service,
        "Set",
        &[("Value".to_string(), "150".to_string())],
    )
    .await
    .unwrap_err();

    match err {
        UpnpError::Action(fault) => {
            assert_eq!(fault.code, 601);
            assert_eq!(fault.description, "Argument Value Out of Range");
        }
        other => panic!("expected an action fault, got {:?}", other),
    }

    host.quit().await.unwrap();
}

type NotifyRecords = Arc<Mutex<Vec<(Option<u32>, Vec<(String, String)>)>>>;

async fn recording_notify_handler(
    State((manager, records)): State<(Arc<EventSubscriptionManager>, NotifyRecords)>,
    request: Request,
) -> Response {
    let sid = request
        .headers()
        .get("SID")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());
    let seq = request
        .headers()
        .get("SEQ")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    let body = axum::body::to_bytes(request.into_body(), 1 << 20)
        .await
        .unwrap_or_default();

    let pairs = parse_propertyset(&body).unwrap_or_default();
    records
        .lock()
        .unwrap()
        .push((seq.as_deref().and_then(|s| s.parse().ok()), pairs));

    let status = manager.on_notify(sid.as_deref(), seq.as_deref(), &body);
    StatusCode::from_u16(status)
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
        .into_response()
}

#[tokio::test]
async fn test_subscribe_and_notify_ordering() {
    let mut host = start_host().await;

    // Serveur de callbacks du control point.
    let mut callback_server = HttpServer::new("cb", 0);
    let token = callback_server.shutdown_token();
    let http = HttpClient::new(token.clone());
    let manager = Arc::new(EventSubscriptionManager::new(http.clone(), token));
    let records: NotifyRecords = Arc::new(Mutex::new(Vec::new()));

    callback_server
        .add_any_handler_with_state(
            "/event-sink",
            recording_notify_handler,
            (manager.clone(), records.clone()),
        )
        .await;
    let addr = callback_server.start().await.unwrap();
    manager.set_callback_roots(vec![
        Url::parse(&format!("http://127.0.0.1:{}/", addr.port())).unwrap()
    ]);

    // Device distant reconstruit, puis abonnement.
    let device = fetch_remote_device(&host, &http).await;
    let service = device.service_by_id("urn:upnp-org:serviceId:Counter").unwrap();
    manager.subscribe(&service, 300).await.expect("subscribe");

    // Notification initiale : SEQ 0, l'état complet des variables
    // événementielles.
    {
        let records = records.clone();
        wait_until("initial notify", move || !records.lock().unwrap().is_empty()).await;
    }
    {
        let records = records.lock().unwrap();
        let (seq, pairs) = &records[0];
        assert_eq!(*seq, Some(0));
        assert!(pairs.contains(&("A".to_string(), "0".to_string())));
        assert!(pairs.contains(&("B".to_string(), "0".to_string())));
    }

    // Deux mises à jour côté hôte : deux NOTIFY, SEQ 1 puis SEQ 2, sans
    // réordonnancement.
    let host_service = host
        .storage()
        .device_by_udn(&udn())
        .unwrap()
        .service_by_id("urn:upnp-org:serviceId:Counter")
        .unwrap();
    host_service.update("A", "1").unwrap();
    host_service.update("B", "2").unwrap();

    {
        let records = records.clone();
        wait_until("ordered notifies", move || {
            records.lock().unwrap().len() >= 3
        })
        .await;
    }
    {
        let records = records.lock().unwrap();
        assert_eq!(records[1].0, Some(1));
        assert_eq!(records[1].1, vec![("A".to_string(), "1".to_string())]);
        assert_eq!(records[2].0, Some(2));
        assert_eq!(records[2].1, vec![("B".to_string(), "2".to_string())]);
    }

    // L'état observé côté control point a suivi les notifications.
    assert_eq!(service.state_variable("A").unwrap().value_string(), "1");
    assert_eq!(service.state_variable("B").unwrap().value_string(), "2");

    callback_server.stop().await;
    host.quit().await.unwrap();
}
