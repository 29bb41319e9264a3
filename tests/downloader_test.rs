// Tests for SourceFetcher
// Uses mockito for HTTP mocking

use mockito::Server;
use plant_quality_etl::importers::downloader::{DownloadError, SourceFetcher, SpreadsheetSource};
use std::path::PathBuf;

#[tokio::test]
async fn test_download_success() {
    let mut server = Server::new_async().await;

    let mock = server
        .mock("GET", "/Resultados_Planta.xlsx")
        .with_status(200)
        .with_header(
            "content-type",
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        )
        .with_body(b"fake excel data")
        .create_async()
        .await;

    let fetcher = SourceFetcher::new();
    let url = format!("{}/Resultados_Planta.xlsx", server.url());
    let source = fetcher.resolve(&url).await.unwrap();

    match &source {
        SpreadsheetSource::Remote { url: fetched, bytes } => {
            assert_eq!(fetched, &url);
            assert_eq!(bytes, b"fake excel data");
        }
        other => panic!("Expected remote source, got {other:?}"),
    }
    assert_eq!(source.into_bytes().unwrap(), b"fake excel data");

    mock.assert_async().await;
}

#[tokio::test]
async fn test_download_404() {
    let mut server = Server::new_async().await;

    let mock = server
        .mock("GET", "/missing.xlsx")
        .with_status(404)
        .create_async()
        .await;

    let fetcher = SourceFetcher::new();
    let url = format!("{}/missing.xlsx", server.url());
    let result = fetcher.resolve(&url).await;

    match result.unwrap_err() {
        DownloadError::Status { url: failed, status } => {
            assert_eq!(status, 404);
            assert!(failed.ends_with("/missing.xlsx"));
        }
        other => panic!("Expected Status error, got {other:?}"),
    }

    mock.assert_async().await;
}

#[tokio::test]
async fn test_download_server_error() {
    let mut server = Server::new_async().await;

    let mock = server
        .mock("GET", "/plant.xlsx")
        .with_status(500)
        .with_body("Internal Server Error")
        .create_async()
        .await;

    let fetcher = SourceFetcher::new();
    let result = fetcher
        .resolve(&format!("{}/plant.xlsx", server.url()))
        .await;

    assert!(matches!(
        result,
        Err(DownloadError::Status { status: 500, .. })
    ));

    mock.assert_async().await;
}

#[tokio::test]
async fn test_unreachable_host_is_http_error() {
    let fetcher = SourceFetcher::new();
    // Port 9 (discard) on localhost is not expected to serve HTTP
    let result = fetcher.resolve("http://127.0.0.1:9/plant.xlsx").await;
    assert!(matches!(result, Err(DownloadError::HttpError(_))));
}

#[tokio::test]
async fn test_local_path_passes_through() {
    let fetcher = SourceFetcher::new();
    let source = fetcher.resolve("data/Resultados Planta.xlsx").await.unwrap();
    assert_eq!(
        source,
        SpreadsheetSource::Local(PathBuf::from("data/Resultados Planta.xlsx"))
    );
}
