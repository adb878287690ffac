//! End-to-end scenarios against a small in-process cluster.

mod common;

use std::sync::Arc;

use blobmesh::storage::MemoryMetadataGateway;
use blobmesh::MetadataGateway;
use common::{test_uuid, TestNode};

fn shared_gateway() -> Arc<dyn MetadataGateway> {
    Arc::new(MemoryMetadataGateway::new())
}

async fn upload_bytes(base_url: &str, uuid: &str, data: &'static [u8]) -> reqwest::Response {
    let client = reqwest::Client::new();
    let form = reqwest::multipart::Form::new().part(
        "file",
        reqwest::multipart::Part::bytes(data).file_name("blob.bin"),
    );
    client
        .post(format!("{base_url}/api/v1/external/files/{uuid}"))
        .multipart(form)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn single_node_upload_then_download_round_trips() {
    let gateway = shared_gateway();
    let node = TestNode::start("n1", gateway).await;
    let uuid = test_uuid();

    let resp = upload_bytes(&node.base_url, &uuid, b"hello world").await;
    assert_eq!(resp.status(), 200);

    let resp = reqwest::get(node.external_url(&uuid)).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.bytes().await.unwrap().as_ref(), b"hello world");
}

#[tokio::test]
async fn duplicate_upload_is_conflict() {
    let gateway = shared_gateway();
    let node = TestNode::start("n1", gateway).await;
    let uuid = test_uuid();

    let first = upload_bytes(&node.base_url, &uuid, b"first").await;
    assert_eq!(first.status(), 200);

    let second = upload_bytes(&node.base_url, &uuid, b"second").await;
    assert_eq!(second.status(), 409);
}

#[tokio::test]
async fn download_proxies_from_peer_that_holds_the_blob() {
    let gateway = shared_gateway();
    let holder = TestNode::start("holder", gateway.clone()).await;
    let requester = TestNode::start("requester", gateway).await;
    let uuid = test_uuid();

    let resp = upload_bytes(&holder.base_url, &uuid, b"peer payload").await;
    assert_eq!(resp.status(), 200);

    // The requester has never seen this blob locally; it must proxy.
    let resp = reqwest::get(requester.external_url(&uuid)).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.bytes().await.unwrap().as_ref(), b"peer payload");
}

#[tokio::test]
async fn sync_sweep_materializes_missing_blobs_locally() {
    let gateway = shared_gateway();
    let holder = TestNode::start("holder", gateway.clone()).await;
    let follower = TestNode::start("follower", gateway.clone()).await;
    let uuid = test_uuid();

    upload_bytes(&holder.base_url, &uuid, b"replicate me")
        .await;
    assert!(!follower.blob_store.exists(&uuid).await);

    let sync = blobmesh::sync::SyncManager::new(
        follower.node_id,
        follower.gateway.clone(),
        follower.blob_store.clone(),
        follower.lease.clone(),
        Arc::new(blobmesh::PeerClient::new()),
    );
    sync.sweep().await.unwrap();

    assert!(follower.blob_store.exists(&uuid).await);
    assert_eq!(follower.blob_store.read(&uuid).await.unwrap(), b"replicate me");
}

#[tokio::test]
async fn download_skips_a_node_with_an_expired_lease() {
    let gateway = shared_gateway();
    let stale_holder = TestNode::start("stale", gateway.clone()).await;
    let live_holder = TestNode::start("live", gateway.clone()).await;
    let requester = TestNode::start("requester", gateway.clone()).await;
    let uuid = test_uuid();

    upload_bytes(&stale_holder.base_url, &uuid, b"from stale").await;
    gateway
        .add_file_to_node(
            live_holder.node_id,
            gateway
                .get_file_by_uuid_and_state(&uuid, 1)
                .await
                .unwrap()
                .unwrap()
                .id,
        )
        .await
        .unwrap();
    upload_copy_to_disk(&live_holder, &uuid, b"from stale").await;

    // The stale node's lease expires; only the live one should be tried.
    stale_holder.lease.release().await.unwrap();

    let resp = reqwest::get(requester.external_url(&uuid)).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.bytes().await.unwrap().as_ref(), b"from stale");
}

async fn upload_copy_to_disk(node: &TestNode, uuid: &str, data: &[u8]) {
    node.blob_store.write(uuid, data, &node.lease).await.unwrap();
}

#[tokio::test]
async fn download_is_not_found_when_the_only_holder_is_dead() {
    let gateway = shared_gateway();
    let stale_holder = TestNode::start("stale", gateway.clone()).await;
    let requester = TestNode::start("requester", gateway.clone()).await;
    let uuid = test_uuid();

    upload_bytes(&stale_holder.base_url, &uuid, b"from stale").await;

    // The only node that ever held this blob goes dark; its lease expires
    // and it must not appear in the peer list, leaving no candidate at all.
    stale_holder.lease.release().await.unwrap();

    let resp = reqwest::get(requester.external_url(&uuid)).await.unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn responses_carry_a_request_id_header() {
    let gateway = shared_gateway();
    let node = TestNode::start("n1", gateway).await;
    let uuid = test_uuid();

    let resp = upload_bytes(&node.base_url, &uuid, b"tagged").await;
    assert!(resp.headers().contains_key("x-request-id"));

    let resp = reqwest::get(node.external_url(&uuid)).await.unwrap();
    assert!(resp.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn invalid_uuid_is_bad_request() {
    let gateway = shared_gateway();
    let node = TestNode::start("n1", gateway).await;

    let resp = reqwest::get(node.external_url("not-a-uuid")).await.unwrap();
    assert_eq!(resp.status(), 400);

    let resp = upload_bytes(&node.base_url, "not-a-uuid", b"x").await;
    assert_eq!(resp.status(), 400);
}
