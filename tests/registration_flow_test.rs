//! End-to-end registration: datagram -> event -> decision -> directory

use sipdir::application::{resolve_target, Manager, RegistrationDecision, RegistrationService, RejectReason};
use sipdir::config::Config;
use sipdir::domain::directory::Directory;
use sipdir::domain::event::Event;
use sipdir::domain::shared::value_objects::Address;
use sipdir::domain::store::{AuthorizeRow, DirectoryStore, ExtensionRow};
use sipdir::infrastructure::persistence::MemoryDirectoryStore;
use sipdir::infrastructure::protocols::sip::{DigestAlgorithm, DigestAuth, UdpContext};
use std::net::SocketAddr;
use std::sync::Arc;

const REALM: &str = "pbx.example.com";
const PHONE: &str = "192.0.2.10:5062";

const SEED: &str = r#"{
    "extensions": [
        {"number": 1001, "alias": "alice", "display": "Alice"},
        {"number": 1002, "alias": "bob"}
    ],
    "authorize": [
        {"userid": "alice", "number": 1001, "secret": "s3cret"},
        {"userid": "ghost", "number": 4040, "secret": "boo"}
    ]
}"#;

struct Harness {
    context: UdpContext,
    directory: Arc<Directory>,
    store: Arc<MemoryDirectoryStore>,
    service: RegistrationService,
    _manager: Manager,
}

async fn harness() -> Harness {
    let store = Arc::new(MemoryDirectoryStore::from_json(SEED).unwrap());
    let directory = Arc::new(Directory::new());
    directory.reload(store.extensions().await.unwrap()).unwrap();

    let mut config = Config::default();
    config.switch.realm = Some(REALM.to_string());
    let (manager, handle) = Manager::new(&config, directory.clone(), store.clone());

    let service = RegistrationService::new(
        directory.clone(),
        store.clone(),
        Arc::new(DigestAuth::new(DigestAlgorithm::Md5)),
        handle.subscribe(),
    );
    let context = UdpContext::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();

    Harness {
        context,
        directory,
        store,
        service,
        _manager: manager,
    }
}

fn register(cseq: u32, user: &str, extra_headers: &str, contact: &str) -> Vec<u8> {
    format!(
        "REGISTER sip:{realm} SIP/2.0\r\n\
         Via: SIP/2.0/UDP {phone};branch=z9hG4bK{cseq}\r\n\
         Max-Forwards: 70\r\n\
         From: <sip:{user}@{realm}>;tag=4711\r\n\
         To: <sip:{user}@{realm}>\r\n\
         Call-ID: reg-{user}@192.0.2.10\r\n\
         CSeq: {cseq} REGISTER\r\n\
         Contact: {contact}\r\n\
         {extra_headers}\
         Content-Length: 0\r\n\r\n",
        realm = REALM,
        phone = PHONE,
        cseq = cseq,
        user = user,
        contact = contact,
        extra_headers = extra_headers,
    )
    .into_bytes()
}

fn authorization(user: &str, secret: &str, nonce: &str) -> String {
    let uri = format!("sip:{}", REALM);
    let response = DigestAuth::calculate_response(
        DigestAlgorithm::Md5,
        user,
        secret,
        REALM,
        nonce,
        "REGISTER",
        &uri,
    );
    format!(
        "Authorization: Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", response=\"{}\", algorithm=MD5\r\n",
        user, REALM, nonce, uri, response
    )
}

fn receive(h: &Harness, datagram: &[u8]) -> Event {
    let source: SocketAddr = PHONE.parse().unwrap();
    h.context.handle_datagram(datagram, source).unwrap()
}

async fn challenge_nonce(h: &Harness, user: &str) -> String {
    let contact = format!("<sip:{}@{}>", user, PHONE);
    let event = receive(h, &register(1, user, "", &contact));
    match h.service.handle(&event).await.unwrap() {
        RegistrationDecision::Challenge(challenge) => {
            assert_eq!(challenge.realm, REALM);
            challenge.nonce
        }
        other => panic!("expected a challenge, got {:?}", other),
    }
}

#[tokio::test]
async fn test_register_then_unregister() {
    let h = harness().await;
    let nonce = challenge_nonce(&h, "alice").await;
    let phone = Address::from(PHONE.parse::<SocketAddr>().unwrap());

    let contact = format!("<sip:alice@{}>;expires=600", PHONE);
    let event = receive(&h, &register(2, "alice", &authorization("alice", "s3cret", &nonce), &contact));
    assert_eq!(event.source(), Some(phone));
    assert!(!event.is_natted());

    let RegistrationDecision::Accept { expires, contacts, .. } = h.service.handle(&event).await.unwrap() else {
        panic!("registration was not accepted");
    };
    assert_eq!(expires, 600);
    assert_eq!(contacts.len(), 1);
    assert_eq!(contacts[0].address(), phone);

    let target = resolve_target(&h.directory, "alice").unwrap();
    assert_eq!(target.registry.number(), Some(1001));
    assert_eq!(target.endpoints.len(), 1);
    assert!(h.store.authorize("alice").await.unwrap().unwrap().last.is_some());

    // Expires: 0 on the request removes contacts without their own expiry
    let contact = format!("<sip:alice@{}>", PHONE);
    let extra = format!("{}Expires: 0\r\n", authorization("alice", "s3cret", &nonce));
    let event = receive(&h, &register(3, "alice", &extra, &contact));
    let RegistrationDecision::Accept { contacts, .. } = h.service.handle(&event).await.unwrap() else {
        panic!("unregistration was not accepted");
    };
    assert!(contacts.is_empty());
    assert!(!resolve_target(&h.directory, "1001").unwrap().is_reachable());
    assert_eq!(h.directory.total_endpoints(), 0);
}

#[tokio::test]
async fn test_bad_password_is_challenged_again() {
    let h = harness().await;
    let nonce = challenge_nonce(&h, "alice").await;

    let contact = format!("<sip:alice@{}>", PHONE);
    let event = receive(&h, &register(2, "alice", &authorization("alice", "guess", &nonce), &contact));

    match h.service.handle(&event).await.unwrap() {
        RegistrationDecision::Challenge(challenge) => assert_ne!(challenge.nonce, nonce),
        other => panic!("expected a new challenge, got {:?}", other),
    }
    assert_eq!(h.directory.total_endpoints(), 0);
}

#[tokio::test]
async fn test_unknown_user_and_missing_extension() {
    let h = harness().await;
    let nonce = challenge_nonce(&h, "mallory").await;

    let contact = format!("<sip:mallory@{}>", PHONE);
    let event = receive(&h, &register(2, "mallory", &authorization("mallory", "x", &nonce), &contact));
    assert_eq!(
        h.service.handle(&event).await.unwrap(),
        RegistrationDecision::Reject(RejectReason::Forbidden)
    );

    let contact = format!("<sip:ghost@{}>", PHONE);
    let event = receive(&h, &register(3, "ghost", &authorization("ghost", "boo", &nonce), &contact));
    assert_eq!(
        h.service.handle(&event).await.unwrap(),
        RegistrationDecision::Reject(RejectReason::NotFound)
    );
}

#[tokio::test]
async fn test_reload_through_manager() {
    let store = Arc::new(MemoryDirectoryStore::from_json(SEED).unwrap());
    let directory = Arc::new(Directory::new());
    let (manager, handle) = Manager::new(&Config::default(), directory.clone(), store.clone());
    let task = tokio::spawn(manager.run());

    let report = handle.reload().await.unwrap();
    assert_eq!(report.created, 2);
    assert!(directory.lookup("bob").is_some());

    store.set_extensions(vec![
        ExtensionRow::new(1001).with_alias("alice"),
        ExtensionRow::new(1003).with_alias("carol"),
    ]);
    store.add_authorize(AuthorizeRow {
        userid: "carol".to_string(),
        number: Some(1003),
        secret: "pw".to_string(),
        digest: "MD5".to_string(),
        last: None,
    });

    let report = handle.reload().await.unwrap();
    assert_eq!((report.created, report.updated, report.removed), (1, 1, 1));
    assert!(directory.lookup("bob").is_none());
    assert_eq!(directory.lookup("carol").unwrap().number(), Some(1003));

    handle.shutdown().await.unwrap();
    assert!(task.await.unwrap().is_ok());
}
