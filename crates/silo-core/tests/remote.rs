//! Install and push flows against mock blob storage and an in-memory
//! catalog fake.

use silo_core::{CoreError, Dataset, Engine, RowValue};
use silo_remote::{Catalog, InstallSource, RemoteError};
use silo_store::{archive_package, NoProgress, StoreError};
use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};

/// Catalog fake handing out URLs into the mock blob server.
struct FakeCatalog {
    download_url: Mutex<Option<String>>,
    upload_url: Mutex<Option<String>>,
    install_version: u64,
    assigned_version: u64,
}

impl FakeCatalog {
    fn for_install(url: String, version: u64) -> Self {
        Self {
            download_url: Mutex::new(Some(url)),
            upload_url: Mutex::new(None),
            install_version: version,
            assigned_version: 0,
        }
    }

    fn for_push(url: String, assigned_version: u64) -> Self {
        Self {
            download_url: Mutex::new(None),
            upload_url: Mutex::new(Some(url)),
            install_version: 0,
            assigned_version,
        }
    }
}

impl Catalog for FakeCatalog {
    fn latest_version(&self, name: &str) -> Result<InstallSource, RemoteError> {
        let url = self
            .download_url
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| RemoteError::Api(format!("dataset '{name}' does not exist")))?;
        Ok(InstallSource {
            version: self.install_version,
            signed_url: url,
        })
    }

    fn create_upload_session(&self, _name: &str) -> Result<String, RemoteError> {
        Ok("session-1".to_owned())
    }

    fn upload_url(&self, _session_id: &str, _filename: &str) -> Result<String, RemoteError> {
        Ok(self.upload_url.lock().unwrap().clone().unwrap())
    }

    fn complete_upload(&self, _session_id: &str) -> Result<u64, RemoteError> {
        Ok(self.assigned_version)
    }
}

fn read_headers(reader: &mut BufReader<TcpStream>) -> Option<(String, HashMap<String, String>)> {
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).is_err() || request_line.is_empty() {
        return None;
    }
    let method = request_line.split(' ').next()?.to_owned();
    let mut headers = HashMap::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).is_err() || line.trim().is_empty() {
            break;
        }
        if let Some((k, v)) = line.trim().split_once(": ") {
            headers.insert(k.to_lowercase(), v.to_owned());
        }
    }
    Some((method, headers))
}

fn read_body(reader: &mut BufReader<TcpStream>, headers: &HashMap<String, String>) -> Vec<u8> {
    if headers.get("transfer-encoding").map(String::as_str) == Some("chunked") {
        let mut body = Vec::new();
        loop {
            let mut size_line = String::new();
            if reader.read_line(&mut size_line).is_err() {
                break;
            }
            let size = usize::from_str_radix(size_line.trim(), 16).unwrap_or(0);
            if size == 0 {
                let mut crlf = String::new();
                let _ = reader.read_line(&mut crlf);
                break;
            }
            let mut chunk = vec![0u8; size];
            if reader.read_exact(&mut chunk).is_err() {
                break;
            }
            body.extend_from_slice(&chunk);
            let mut crlf = String::new();
            let _ = reader.read_line(&mut crlf);
        }
        body
    } else {
        let len: usize = headers
            .get("content-length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let mut body = vec![0u8; len];
        if len > 0 {
            let _ = reader.read_exact(&mut body);
        }
        body
    }
}

/// Serves one archive for GET requests.
fn start_download_server(archive: Vec<u8>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/archive", listener.local_addr().unwrap());
    std::thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            if read_headers(&mut reader).is_none() {
                continue;
            }
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                archive.len()
            );
            let _ = stream.write_all(response.as_bytes());
            let _ = stream.write_all(&archive);
            let _ = stream.flush();
        }
    });
    url
}

/// Accepts a resumable upload session; records received bytes.
fn start_upload_server() -> (String, Arc<Mutex<Vec<u8>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let local = listener.local_addr().unwrap();
    let signed_url = format!("http://{local}/signed");
    let session_url = format!("http://{local}/session");
    let received: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));

    let received_clone = Arc::clone(&received);
    std::thread::spawn(move || {
        let mut total = 0usize;
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let Some((method, headers)) = read_headers(&mut reader) else {
                continue;
            };
            let body = read_body(&mut reader, &headers);

            let response = match method.as_str() {
                "POST" => format!(
                    "HTTP/1.1 201 Created\r\nContent-Length: 0\r\nLocation: {session_url}\r\nConnection: close\r\n\r\n"
                ),
                "PUT" => {
                    let content_range = headers.get("content-range").cloned().unwrap_or_default();
                    if content_range.starts_with("bytes */") && body.is_empty() {
                        if let Some(t) = content_range
                            .strip_prefix("bytes */")
                            .and_then(|t| t.parse::<usize>().ok())
                        {
                            total = t;
                        }
                        let received = received_clone.lock().unwrap();
                        if !received.is_empty() && received.len() >= total {
                            let etag = blake3::hash(&received).to_hex();
                            format!(
                                "HTTP/1.1 200 OK\r\nContent-Length: 0\r\nETag: \"{etag}\"\r\nConnection: close\r\n\r\n"
                            )
                        } else {
                            "HTTP/1.1 308 Resume Incomplete\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                                .to_owned()
                        }
                    } else {
                        let mut received = received_clone.lock().unwrap();
                        received.extend_from_slice(&body);
                        if received.len() >= total && total > 0 {
                            let etag = blake3::hash(&received).to_hex();
                            format!(
                                "HTTP/1.1 200 OK\r\nContent-Length: 0\r\nETag: \"{etag}\"\r\nConnection: close\r\n\r\n"
                            )
                        } else {
                            let range = format!("Range: bytes=0-{}", received.len() - 1);
                            format!(
                                "HTTP/1.1 308 Resume Incomplete\r\nContent-Length: 0\r\n{range}\r\nConnection: close\r\n\r\n"
                            )
                        }
                    }
                }
                _ => "HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                    .to_owned(),
            };
            let _ = stream.write_all(response.as_bytes());
            let _ = stream.flush();
        }
    });

    (signed_url, received)
}

fn build_local_package(engine: &Engine, name: &str) {
    let source = tempfile::tempdir().unwrap();
    fs::write(
        source.path().join("config.json"),
        r#"{
            "columns": [
                {"name": "label", "type": "category"},
                {"name": "count", "type": "integer"}
            ],
            "path": "data.csv"
        }"#,
    )
    .unwrap();
    fs::write(source.path().join("data.csv"), "label,count\nup,1\ndown,2\n").unwrap();
    engine
        .build(name, &source.path().join("config.json"), &NoProgress)
        .unwrap();
}

/// Archive of a built package, as a push would produce it.
fn published_archive() -> Vec<u8> {
    let base = tempfile::tempdir().unwrap();
    let engine = Engine::new(base.path());
    build_local_package(&engine, "acme/widgets");
    let package_dir = base
        .path()
        .join("silo_datasets")
        .join("acme")
        .join("widgets");
    let tar_path = base.path().join("dataset.tar");
    archive_package(&package_dir, &tar_path).unwrap();
    fs::read(&tar_path).unwrap()
}

#[test]
fn install_downloads_extracts_and_versions() {
    let url = start_download_server(published_archive());
    let catalog = FakeCatalog::for_install(url, 7);

    let base = tempfile::tempdir().unwrap();
    let engine = Engine::new(base.path());
    let report = engine
        .install("acme/widgets", &catalog, &NoProgress)
        .unwrap();
    assert_eq!(report.version, 7);

    let details = engine.info("acme/widgets").unwrap();
    assert_eq!(details.version, Some(7));
    assert_eq!(details.rows, 2);

    let dataset = Dataset::open("acme/widgets", base.path()).unwrap();
    assert_eq!(dataset.row(0).unwrap()[0], RowValue::Category("up".to_owned()));
}

#[test]
fn install_twice_fails() {
    let url = start_download_server(published_archive());
    let catalog = FakeCatalog::for_install(url, 7);

    let base = tempfile::tempdir().unwrap();
    let engine = Engine::new(base.path());
    engine
        .install("acme/widgets", &catalog, &NoProgress)
        .unwrap();
    let err = engine
        .install("acme/widgets", &catalog, &NoProgress)
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::Store(StoreError::AlreadyInstalled(_))
    ));
}

#[test]
fn install_unknown_dataset_surfaces_catalog_error() {
    let catalog = FakeCatalog {
        download_url: Mutex::new(None),
        upload_url: Mutex::new(None),
        install_version: 0,
        assigned_version: 0,
    };
    let base = tempfile::tempdir().unwrap();
    let engine = Engine::new(base.path());
    let err = engine
        .install("acme/widgets", &catalog, &NoProgress)
        .unwrap_err();
    assert!(matches!(err, CoreError::Remote(RemoteError::Api(_))));
}

#[test]
fn push_uploads_archive_and_records_version() {
    let (signed_url, received) = start_upload_server();
    let catalog = FakeCatalog::for_push(signed_url, 2);

    let base = tempfile::tempdir().unwrap();
    let engine = Engine::new(base.path());
    build_local_package(&engine, "acme/widgets");

    let version = engine.push("acme/widgets", &catalog, &NoProgress).unwrap();
    assert_eq!(version, 2);
    assert_eq!(engine.info("acme/widgets").unwrap().version, Some(2));

    let received = received.lock().unwrap();
    assert!(!received.is_empty(), "archive bytes must reach the server");
    // the uploaded archive extracts back into the same package contents
    let dest = tempfile::tempdir().unwrap();
    silo_store::extract_archive(received.as_slice(), dest.path()).unwrap();
    assert!(dest.path().join("table/attrs.json").is_file());
}

#[test]
fn push_twice_fails_with_already_pushed() {
    let (signed_url, _received) = start_upload_server();
    let catalog = FakeCatalog::for_push(signed_url, 2);

    let base = tempfile::tempdir().unwrap();
    let engine = Engine::new(base.path());
    build_local_package(&engine, "acme/widgets");

    engine.push("acme/widgets", &catalog, &NoProgress).unwrap();
    let err = engine
        .push("acme/widgets", &catalog, &NoProgress)
        .unwrap_err();
    assert!(matches!(err, CoreError::Store(StoreError::AlreadyPushed(_))));
}

#[test]
fn push_unbuilt_package_fails() {
    let (signed_url, _received) = start_upload_server();
    let catalog = FakeCatalog::for_push(signed_url, 2);

    let base = tempfile::tempdir().unwrap();
    let engine = Engine::new(base.path());
    let err = engine
        .push("acme/widgets", &catalog, &NoProgress)
        .unwrap_err();
    assert!(matches!(err, CoreError::Store(StoreError::NotInstalled(_))));
}

#[test]
fn installed_archive_does_not_carry_marker() {
    // a freshly published archive must not smuggle version state; the
    // install assigns it from the catalog
    let archive = published_archive();
    let dest = tempfile::tempdir().unwrap();
    silo_store::extract_archive(archive.as_slice(), dest.path()).unwrap();
    assert!(!dest.path().join(".silo").exists());
}
