//! Identity service integration tests over the directory store

use std::sync::Arc;

use propolis::envelope::{Content, ContentRegistry, Envelope, EnvelopeError, Post, CONTENT_TYPE_POST};
use propolis::identity::{
    derive_identity_id, Address, CreateIdentityParams, IdentityError, IdentityId, IdentityService,
};
use propolis::store::{DirectoryIdentityStore, PublicKeyCacheConfig, StoreError};
use propolis::ErrorClass;

fn params(handle: &str, password: &str) -> CreateIdentityParams {
    CreateIdentityParams {
        handle: handle.to_string(),
        email: format!("{handle}@example.com"),
        password: password.to_string(),
    }
}

async fn service(dir: &std::path::Path) -> IdentityService {
    let store = DirectoryIdentityStore::open(dir).await.expect("open store");
    IdentityService::with_memory_cache(Arc::new(store), PublicKeyCacheConfig::default())
}

#[tokio::test]
async fn test_identities_survive_restart() {
    let dir = tempfile::tempdir().unwrap();

    let created = service(dir.path())
        .await
        .create(&params("alice", "pw1"))
        .await
        .unwrap();

    // A fresh service has a cold cache and must read from disk
    let restarted = service(dir.path()).await;
    let fetched = restarted.fetch(&created.id).await.unwrap();
    assert_eq!(fetched.handle, "alice");
    assert_eq!(fetched.public_key, created.public_key);

    let key = restarted
        .public_key_for(&Address::from(&created.id))
        .await
        .unwrap();
    assert_eq!(derive_identity_id(&key), created.id);

    let signing_key = restarted.unlock(&created.id, "pw1").await.unwrap();
    assert_eq!(derive_identity_id(signing_key.verifying_key()), created.id);
}

#[tokio::test]
async fn test_public_profile_hides_secrets() {
    let dir = tempfile::tempdir().unwrap();
    let identity = service(dir.path())
        .await
        .create(&params("bob", "pw1"))
        .await
        .unwrap();

    let json = serde_json::to_value(identity.public_profile()).unwrap();
    assert_eq!(json["id"], identity.id.as_str());
    assert_eq!(json["handle"], "bob");
    assert!(json.get("passwordHash").is_none());
    assert!(json.get("privateKey").is_none());
    assert!(json.get("publicKey").is_some());
}

#[tokio::test]
async fn test_post_between_identities() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(dir.path()).await;

    let alice = service.create(&params("alice", "pw-a")).await.unwrap();
    let bob = service.create(&params("bob", "pw-b")).await.unwrap();

    let original = service
        .compose(
            &alice.id,
            "pw-a",
            CONTENT_TYPE_POST,
            &Post {
                content: "hello bob".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let reply = Post {
        content: "hi alice".to_string(),
        in_reply_to: Some(original.id.clone()),
        ..Default::default()
    };
    let signed = service
        .compose(&bob.id, "pw-b", CONTENT_TYPE_POST, &reply)
        .await
        .unwrap();

    let envelope = Envelope::parse_with(&signed.text, &service).await.unwrap();
    assert_eq!(envelope.sender(), &Address::from(&bob.id));
    assert_eq!(
        ContentRegistry::standard().decode(&envelope).unwrap(),
        Content::Post(reply)
    );
}

#[tokio::test]
async fn test_compose_with_wrong_password() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(dir.path()).await;
    let identity = service.create(&params("carol", "pw1")).await.unwrap();

    let result = service
        .compose(&identity.id, "nope", "post", &serde_json::json!({ "a": 1 }))
        .await;
    let err = result.unwrap_err();
    assert!(matches!(err, IdentityError::InvalidCredentials));
    assert_eq!(err.class(), ErrorClass::Unauthorized);
}

#[tokio::test]
async fn test_unknown_and_invalid_ids() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(dir.path()).await;

    let err = service
        .fetch(&IdentityId::from("3GFQNuSg3dPqDD1emxv5bqX42oxq"))
        .await
        .unwrap_err();
    assert!(matches!(err, IdentityError::Store(StoreError::NotFound(_))));
    assert_eq!(err.class(), ErrorClass::NotFound);

    let err = service
        .fetch(&IdentityId::from("../../etc/passwd"))
        .await
        .unwrap_err();
    assert!(matches!(err, IdentityError::Store(StoreError::InvalidKey(_))));
    assert_eq!(err.class(), ErrorClass::BadRequest);
}

#[tokio::test]
async fn test_envelope_from_remote_sender_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(dir.path()).await;

    let (signing_key, verifying_key) = propolis::keys::generate_keypair().unwrap();
    let remote = Address::new(format!(
        "{}@elsewhere.example",
        derive_identity_id(&verifying_key)
    ));
    let signed = Envelope::build(&"hi", &remote, "post", &signing_key).unwrap();

    let err = Envelope::parse_with(&signed.text, &service).await.unwrap_err();
    assert!(matches!(err, EnvelopeError::KeyResolution(_)));
    assert_eq!(err.class(), ErrorClass::Unauthorized);
}
