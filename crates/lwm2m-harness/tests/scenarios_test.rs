//! End-to-end orchestration scenarios: the same `Runtime` that drives a
//! real socket in production, driven here against [`SimDriver`] so timing,
//! packet loss, and peer responses are under the test's full control.

use std::time::Duration;

use bytes::Bytes;
use lwm2m_app::{ClientConfig, OperationalServer, Runtime};
use lwm2m_client::{
    LifecycleConfig, LifecycleState, Lwm2mClient,
    objects::{AccessControlInstance, DeviceObject},
};
use lwm2m_core::{AttributeSet, AttributeState, ObjectHandler, Permission};
use lwm2m_harness::{SimDriver, SimEnv};
use lwm2m_proto::{BlockOption, Code, CoapOption, Message, MessageType, TlvElement, content_format, number};

fn device() -> DeviceObject {
    DeviceObject::new(
        "Contoso".to_string(),
        "Widget-9000".to_string(),
        "SN-0001".to_string(),
        "1.0.0".to_string(),
    )
}

fn short_lifecycle() -> LifecycleConfig {
    LifecycleConfig { hold_off: Duration::from_secs(1), lifetime: Duration::from_secs(100), ..LifecycleConfig::default() }
}

fn respond(request: &Message, code: Code, options: Vec<CoapOption>) -> Vec<u8> {
    let response = Message {
        msg_type: MessageType::Acknowledgement,
        code,
        mid: request.mid,
        token: request.token.clone(),
        options,
        payload: Bytes::new(),
    };
    let mut buf = bytes::BytesMut::new();
    response.encode(&mut buf).unwrap();
    buf.to_vec()
}

fn decode(bytes: &[u8]) -> Message {
    Message::decode(bytes).unwrap()
}

/// Encode a one-off Confirmable request a server would send, as if it
/// arrived over the wire.
fn request(mid: u16, code: Code, path: &[&str], options: Vec<CoapOption>, payload: Bytes) -> (Message, Vec<u8>) {
    let mut all_options: Vec<CoapOption> =
        path.iter().map(|segment| CoapOption::string(number::URI_PATH, *segment)).collect();
    all_options.extend(options);
    let message = Message {
        msg_type: MessageType::Confirmable,
        code,
        mid,
        token: Bytes::from_static(b"tok0"),
        options: all_options,
        payload,
    };
    let mut buf = bytes::BytesMut::new();
    message.encode(&mut buf).unwrap();
    (message, buf.to_vec())
}

fn encode_tlv(element: &TlvElement) -> Bytes {
    let mut buf = bytes::BytesMut::new();
    element.encode(&mut buf).unwrap();
    buf.freeze()
}

/// Register then renew at 0.9x lifetime: a preconfigured operational
/// server sends Register once the hold-off elapses, and renews with
/// Update once the lifetime timer fires — with no Bootstrap-Request ever
/// sent, since this server was never configured as a bootstrap server.
#[tokio::test]
async fn register_then_lifetime_update() {
    let env = SimEnv::with_seed(1);
    let mut driver = SimDriver::new(env.clone(), "urn:imei:123456789012345");
    let peer = driver.peer_for("coap://server1");

    let mut config = ClientConfig { lifecycle: short_lifecycle(), ..ClientConfig::default() };
    config.operational_servers.push(OperationalServer { uri: "coap://server1".to_string(), short_server_id: 1 });

    let client = Lwm2mClient::new(device());
    let mut runtime = Runtime::new(driver, env.clone(), client, &config);

    // Hold-off elapses: Register goes out, no Bootstrap-Request.
    env.advance(config.lifecycle.hold_off);
    runtime.process_cycle().await.unwrap();

    let sent = runtime.driver_mut().take_sent(peer);
    assert_eq!(sent.len(), 1);
    let register = decode(&sent[0]);
    assert_eq!(register.code, Code::POST);
    assert!(register.options.iter().any(|o| {
        o.number == number::URI_PATH && lwm2m_proto::option_as_str(o).is_ok_and(|v| v == "rd")
    }));

    let location = respond(
        &register,
        Code::CREATED,
        vec![CoapOption::string(number::LOCATION_PATH, "rd"), CoapOption::string(number::LOCATION_PATH, "0")],
    );
    runtime.driver_mut().inject_datagram(peer, location);
    runtime.process_cycle().await.unwrap();
    assert_eq!(runtime.sessions()[0].lifecycle.state(), LifecycleState::Registered);

    // Advance to just past the 0.9x lifetime renewal deadline.
    env.advance(config.lifecycle.lifetime.mul_f64(0.95));
    runtime.process_cycle().await.unwrap();
    let sent = runtime.driver_mut().take_sent(peer);
    assert_eq!(sent.len(), 1);
    let update = decode(&sent[0]);
    assert_eq!(update.code, Code::POST);

    let changed = respond(&update, Code::CHANGED, Vec::new());
    runtime.driver_mut().inject_datagram(peer, changed);
    runtime.process_cycle().await.unwrap();
    assert_eq!(runtime.sessions()[0].lifecycle.state(), LifecycleState::Registered);
}

/// Retransmit then give up: a Register request that never gets a
/// response is retried up to the fixed retry budget, then the exchange
/// times out and the session drops its resolved peer to reconnect.
#[tokio::test]
async fn retransmit_then_give_up() {
    let env = SimEnv::with_seed(2);
    let driver = SimDriver::new(env.clone(), "urn:imei:1");

    let mut config = ClientConfig { lifecycle: short_lifecycle(), ..ClientConfig::default() };
    config.operational_servers.push(OperationalServer { uri: "coap://server1".to_string(), short_server_id: 1 });

    let client = Lwm2mClient::new(device());
    let mut runtime = Runtime::new(driver, env.clone(), client, &config);

    env.advance(config.lifecycle.hold_off);
    runtime.process_cycle().await.unwrap();

    // The server never responds. Step the clock in small increments,
    // driving process_cycle each time, until the session gives up and
    // forgets its resolved peer.
    let mut gave_up = false;
    for _ in 0..2000 {
        env.advance(Duration::from_millis(100));
        runtime.process_cycle().await.unwrap();
        if runtime.sessions()[0].peer.is_none() {
            gave_up = true;
            break;
        }
    }

    assert!(gave_up, "session never gave up on an unresponsive server");
}

/// Fresh bootstrap: a device with no preconfigured operational server
/// bootstraps, is provisioned with a Security and Server instance by the
/// bootstrap server, gets the `/bs` finish signal, and then registers
/// with the newly provisioned operational server rather than lingering
/// on the bootstrap peer.
#[tokio::test]
async fn fresh_bootstrap_then_register_with_provisioned_server() {
    let env = SimEnv::with_seed(3);
    let mut driver = SimDriver::new(env.clone(), "urn:imei:300000000000003");
    let bootstrap_peer = driver.peer_for("coap://bootstrap.example");

    let config = ClientConfig {
        bootstrap_uri: Some("coap://bootstrap.example".to_string()),
        lifecycle: short_lifecycle(),
        ..ClientConfig::default()
    };

    let client = Lwm2mClient::new(device());
    let mut runtime = Runtime::new(driver, env.clone(), client, &config);
    let operational_peer = runtime.driver_mut().peer_for("coap://operational.example:5683");

    env.advance(config.lifecycle.hold_off);
    runtime.process_cycle().await.unwrap();

    let sent = runtime.driver_mut().take_sent(bootstrap_peer);
    assert_eq!(sent.len(), 1);
    let bootstrap_request = decode(&sent[0]);
    assert_eq!(bootstrap_request.code, Code::POST);
    assert!(bootstrap_request.options.iter().any(|o| {
        o.number == number::URI_PATH && lwm2m_proto::option_as_str(o).is_ok_and(|v| v == "bs")
    }));

    let changed = respond(&bootstrap_request, Code::CHANGED, Vec::new());
    runtime.driver_mut().inject_datagram(bootstrap_peer, changed);
    runtime.process_cycle().await.unwrap();
    assert_eq!(runtime.sessions()[0].lifecycle.state(), LifecycleState::BootstrapWait);

    // Provision a Security instance naming the operational server, as a
    // whole-instance write (only `Short Server ID` carried).
    use lwm2m_client::objects::security::resource as sec_resource;
    let security_payload = encode_tlv(&TlvElement::instance(1, vec![TlvElement::integer(sec_resource::SHORT_SERVER_ID, 2)]));
    let (_, bytes) = request(
        10,
        Code::PUT,
        &["0", "1"],
        vec![CoapOption::uint(number::CONTENT_FORMAT, u32::from(content_format::TLV))],
        security_payload,
    );
    runtime.driver_mut().inject_datagram(bootstrap_peer, bytes);
    runtime.process_cycle().await.unwrap();
    assert_eq!(decode(&runtime.driver_mut().take_sent(bootstrap_peer)[0]).code, Code::CHANGED);

    // The Server URI itself arrives separately as a single-resource write,
    // carried as plain text (TLV can't distinguish an arbitrary-length
    // string from opaque bytes).
    let (_, bytes) = request(
        11,
        Code::PUT,
        &["0", "1", "0"],
        vec![CoapOption::uint(number::CONTENT_FORMAT, u32::from(content_format::PLAIN_TEXT))],
        Bytes::from_static(b"coap://operational.example:5683"),
    );
    runtime.driver_mut().inject_datagram(bootstrap_peer, bytes);
    runtime.process_cycle().await.unwrap();
    assert_eq!(decode(&runtime.driver_mut().take_sent(bootstrap_peer)[0]).code, Code::CHANGED);

    // Provision the matching Server instance.
    use lwm2m_client::objects::server::resource as srv_resource;
    let server_payload = encode_tlv(&TlvElement::instance(
        1,
        vec![TlvElement::integer(srv_resource::SHORT_SERVER_ID, 2), TlvElement::integer(srv_resource::LIFETIME, 300)],
    ));
    let (_, bytes) = request(
        12,
        Code::PUT,
        &["1", "1"],
        vec![CoapOption::uint(number::CONTENT_FORMAT, u32::from(content_format::TLV))],
        server_payload,
    );
    runtime.driver_mut().inject_datagram(bootstrap_peer, bytes);
    runtime.process_cycle().await.unwrap();
    assert_eq!(decode(&runtime.driver_mut().take_sent(bootstrap_peer)[0]).code, Code::CHANGED);

    // The bootstrap server signals it is done; the device repoints this
    // session at the operational server it was just handed and registers
    // with it in the same cycle.
    let (_, bytes) = request(13, Code::POST, &["bs"], Vec::new(), Bytes::new());
    runtime.driver_mut().inject_datagram(bootstrap_peer, bytes);
    runtime.process_cycle().await.unwrap();
    assert_eq!(decode(&runtime.driver_mut().take_sent(bootstrap_peer)[0]).code, Code::CHANGED);

    assert_eq!(runtime.sessions()[0].lifecycle.state(), LifecycleState::Register);
    assert_eq!(runtime.sessions()[0].server_uri, "coap://operational.example:5683");

    let sent = runtime.driver_mut().take_sent(operational_peer);
    assert_eq!(sent.len(), 1);
    let register = decode(&sent[0]);
    assert_eq!(register.code, Code::POST);
    assert!(register.options.iter().any(|o| {
        o.number == number::URI_PATH && lwm2m_proto::option_as_str(o).is_ok_and(|v| v == "rd")
    }));
}

/// Observe value change: an operational server subscribes to Battery
/// Level with a narrow step attribute, and a telemetry sample crossing
/// that step produces a notification carrying the new reading.
#[tokio::test]
async fn observe_notifies_on_battery_level_step_change() {
    let env = SimEnv::with_seed(4);
    let mut driver = SimDriver::new(env.clone(), "urn:imei:400000000000004");
    let peer = driver.peer_for("coap://server1");

    let mut config = ClientConfig { lifecycle: short_lifecycle(), ..ClientConfig::default() };
    config.operational_servers.push(OperationalServer { uri: "coap://server1".to_string(), short_server_id: 1 });

    let client = Lwm2mClient::new(device());
    let mut runtime = Runtime::new(driver, env.clone(), client, &config);

    env.advance(config.lifecycle.hold_off);
    runtime.process_cycle().await.unwrap();
    let sent = runtime.driver_mut().take_sent(peer);
    let register = decode(&sent[0]);
    let location = respond(
        &register,
        Code::CREATED,
        vec![CoapOption::string(number::LOCATION_PATH, "rd"), CoapOption::string(number::LOCATION_PATH, "0")],
    );
    runtime.driver_mut().inject_datagram(peer, location);
    runtime.process_cycle().await.unwrap();

    runtime.client_mut().acls_mut().acl_for(3, 0).set_entry(1, Permission::READ);

    let (_, bytes) =
        request(20, Code::GET, &["3", "0", "9"], vec![CoapOption::uint(number::OBSERVE, 0)], Bytes::new());
    runtime.driver_mut().inject_datagram(peer, bytes);
    runtime.process_cycle().await.unwrap();
    // Drain the registration's own value response plus the immediate
    // notification the freshly-seeded default attribute state fires.
    runtime.driver_mut().take_sent(peer);

    runtime.sessions_mut()[0]
        .attributes
        .insert("/3/0/9".to_string(), AttributeState::new(AttributeSet { pmin: Some(5), st: Some(2.0), ..AttributeSet::default() }));

    runtime.client_mut().device_mut().set_battery_level(53);
    env.advance(Duration::from_secs(10));
    runtime.process_cycle().await.unwrap();

    let sent = runtime.driver_mut().take_sent(peer);
    assert_eq!(sent.len(), 1);
    let notification = decode(&sent[0]);
    assert_eq!(notification.code, Code::CONTENT);
    let mut payload = notification.payload.clone();
    let element = TlvElement::decode(&mut payload).unwrap();
    assert_eq!(element.as_integer().unwrap(), 53);
}

/// ACL denial: a server lacking Delete permission on an Access Control
/// instance is rejected with 4.01 Unauthorized, and the instance survives.
#[tokio::test]
async fn delete_without_permission_is_unauthorized() {
    let env = SimEnv::with_seed(5);
    let mut driver = SimDriver::new(env.clone(), "urn:imei:500000000000005");
    let peer = driver.peer_for("coap://server1");

    let mut config = ClientConfig { lifecycle: short_lifecycle(), ..ClientConfig::default() };
    config.operational_servers.push(OperationalServer { uri: "coap://server1".to_string(), short_server_id: 101 });

    let client = Lwm2mClient::new(device());
    let mut runtime = Runtime::new(driver, env.clone(), client, &config);

    env.advance(config.lifecycle.hold_off);
    runtime.process_cycle().await.unwrap();
    let sent = runtime.driver_mut().take_sent(peer);
    let register = decode(&sent[0]);
    let location = respond(
        &register,
        Code::CREATED,
        vec![CoapOption::string(number::LOCATION_PATH, "rd"), CoapOption::string(number::LOCATION_PATH, "0")],
    );
    runtime.driver_mut().inject_datagram(peer, location);
    runtime.process_cycle().await.unwrap();

    runtime.client_mut().access_control_mut().put_instance(AccessControlInstance {
        instance_id: 0,
        target_object_id: 3,
        target_instance_id: 0,
    });
    runtime.client_mut().acls_mut().acl_for(2, 0).set_owner(102);
    runtime.client_mut().acls_mut().acl_for(2, 0).set_entry(101, Permission::READ);

    let (_, bytes) = request(30, Code::DELETE, &["2", "0"], Vec::new(), Bytes::new());
    runtime.driver_mut().inject_datagram(peer, bytes);
    runtime.process_cycle().await.unwrap();

    let sent = runtime.driver_mut().take_sent(peer);
    assert_eq!(sent.len(), 1);
    let response = decode(&sent[0]);
    assert_eq!(response.code, Code::UNAUTHORIZED);
    assert!(runtime.client().access_control().instance_ids().contains(&0));
}

/// Block1 write: a pushed firmware image arrives as four 512-byte
/// segments. Intermediate segments acknowledge with 2.31 Continue and
/// leave the download in progress; the final segment (no more-flag)
/// lands with 2.04 Changed and completes it.
#[tokio::test]
async fn block1_push_firmware_completes_after_final_segment() {
    let env = SimEnv::with_seed(6);
    let mut driver = SimDriver::new(env.clone(), "urn:imei:600000000000006");
    let peer = driver.peer_for("coap://server1");

    let mut config = ClientConfig { lifecycle: short_lifecycle(), ..ClientConfig::default() };
    config.operational_servers.push(OperationalServer { uri: "coap://server1".to_string(), short_server_id: 7 });

    let client = Lwm2mClient::new(device());
    let mut runtime = Runtime::new(driver, env.clone(), client, &config);

    env.advance(config.lifecycle.hold_off);
    runtime.process_cycle().await.unwrap();
    let sent = runtime.driver_mut().take_sent(peer);
    let register = decode(&sent[0]);
    let location = respond(
        &register,
        Code::CREATED,
        vec![CoapOption::string(number::LOCATION_PATH, "rd"), CoapOption::string(number::LOCATION_PATH, "0")],
    );
    runtime.driver_mut().inject_datagram(peer, location);
    runtime.process_cycle().await.unwrap();

    runtime.client_mut().acls_mut().acl_for(5, 0).set_entry(7, Permission::WRITE);

    for num in 0..3u32 {
        let block = BlockOption::new(num, true, 512).unwrap();
        let options = vec![CoapOption::uint(number::BLOCK1, block.to_u32())];
        let (_, bytes) = request(40 + num as u16, Code::PUT, &["5", "0", "0"], options, Bytes::from(vec![0u8; 512]));
        runtime.driver_mut().inject_datagram(peer, bytes);
        runtime.process_cycle().await.unwrap();

        let sent = runtime.driver_mut().take_sent(peer);
        assert_eq!(sent.len(), 1);
        assert_eq!(decode(&sent[0]).code, Code::CONTINUE);
        assert_eq!(runtime.client().firmware().state(), lwm2m_client::objects::FirmwareState::Downloading);
    }

    let last_block = BlockOption::new(3, false, 512).unwrap();
    let options = vec![CoapOption::uint(number::BLOCK1, last_block.to_u32())];
    let (_, bytes) = request(50, Code::PUT, &["5", "0", "0"], options, Bytes::from(vec![0u8; 512]));
    runtime.driver_mut().inject_datagram(peer, bytes);
    runtime.process_cycle().await.unwrap();

    let sent = runtime.driver_mut().take_sent(peer);
    assert_eq!(sent.len(), 1);
    assert_eq!(decode(&sent[0]).code, Code::CHANGED);
    assert_eq!(runtime.client().firmware().state(), lwm2m_client::objects::FirmwareState::Downloaded);
}
