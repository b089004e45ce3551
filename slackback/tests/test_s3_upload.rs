//! `S3Store` against a mock S3 endpoint.

use serde_json::json;
use slackback::{
    archive::{ArchiveFormat, ArchiveWriter},
    s3::{AwsCredentials, S3Config, S3Store},
    ship::StorageShipper,
};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn store_for(server: &MockServer) -> S3Store {
    let config = S3Config {
        endpoint: Some(server.uri()),
        ..S3Config::new("backups")
    };
    S3Store::with_credentials(&config, &AwsCredentials::new("AKIATEST", "secret")).unwrap()
}

#[test_log::test(tokio::test)]
async fn presigned_put_reaches_bucket_path() {
    let server = MockServer::start().await;
    let temp = tempfile::tempdir().unwrap();
    let archive = ArchiveWriter::new(temp.path(), ArchiveFormat::Plain);
    let users = archive.write_json(&json!([{"id": "U1"}]), "users.json").unwrap();
    let general = archive
        .write_json(&json!([]), "general/all.json")
        .unwrap();

    for key in ["users.json", "general/all.json"] {
        Mock::given(method("PUT"))
            .and(path(format!("/backups/run-1/{key}")))
            .and(query_param("X-Amz-Algorithm", "AWS4-HMAC-SHA256"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
    }

    let store = store_for(&server);
    let report = StorageShipper::new(&store, &archive)
        .ship_with_prefix("run-1", &[users, general])
        .await
        .unwrap();
    assert_eq!(report.keys.len(), 2);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].body, b"[\n  {\n    \"id\": \"U1\"\n  }\n]\n");
}

#[test_log::test(tokio::test)]
async fn rejected_put_stops_upload() {
    let server = MockServer::start().await;
    let temp = tempfile::tempdir().unwrap();
    let archive = ArchiveWriter::new(temp.path(), ArchiveFormat::Plain);
    let first = archive.write_json(&json!([]), "users.json").unwrap();
    let second = archive.write_json(&json!([]), "channels.json").unwrap();

    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(403).set_body_string("AccessDenied"))
        .mount(&server)
        .await;

    let store = store_for(&server);
    let err = StorageShipper::new(&store, &archive)
        .ship_with_prefix("p", &[first, second])
        .await
        .unwrap_err();

    assert!(format!("{err:#}").contains("AccessDenied"));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}
